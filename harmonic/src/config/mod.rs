//! Configuration module for training settings.
//!
//! - `core`: resolved options, default tables and the defaulting rule
//! - `enums`: dataset, optimizer and record element types

pub mod core;
pub mod enums;

pub use self::core::{
    general, DatasetDefaults, DisplayStep, TrainingOptions, UserOptions, REQUIRED_KEYS,
};
pub(crate) use self::core::Resolver;
pub use enums::{DatasetKind, OptimizerKind, RecordDtype};
