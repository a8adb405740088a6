//! # Harmonic Settings
//!
//! Training-settings assembly for harmonic-network image classifiers.
//!
//! A run starts from a loose JSON dictionary of user options. [`Settings`]
//! checks the required keys, resolves the model name through a
//! [`ModelRegistry`], fills every remaining option with the defaults of the
//! chosen dataset and builds the [`DataOptions`] the input pipeline consumes.
//!
//! ```no_run
//! use harmonic_settings::{LocalOnly, ModelRegistry, Settings};
//! use serde_json::json;
//!
//! let user = json!({
//!     "device_idxs": [0],
//!     "dataset": "rotated_mnist",
//!     "model": "deep_mnist",
//!     "data_dir": "./data",
//! });
//! let mut settings = Settings::new(
//!     user.as_object().cloned().unwrap_or_default(),
//!     &ModelRegistry::builtin(),
//! )?;
//! settings.create_options(&LocalOnly)?;
//! # Ok::<(), harmonic_settings::SettingsError>(())
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod models;
mod settings;

#[cfg(test)]
mod tests;

pub use config::{
    general, DatasetDefaults, DatasetKind, DisplayStep, OptimizerKind, RecordDtype,
    TrainingOptions, UserOptions, REQUIRED_KEYS,
};
pub use data::{
    DataDecode, DataOptions, DataProcess, DatasetDownloader, ImagenetAugmentConfig, InMemoryData,
    LocalOnly, QueueConfig, QueueOptions, RecordFiles,
};
pub use error::{SettingsError, SettingsResult};
pub use models::{LayerSpec, ModelBlueprint, ModelFn, ModelRegistry};
pub use settings::{build_data_options, Settings};
