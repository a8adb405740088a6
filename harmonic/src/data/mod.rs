//! Data options: what the input pipeline reads and how.
//!
//! - `arrays`: `.npz` splits held in memory
//! - `records`: record-file discovery and input-queue parameters
//! - `transform`: record decoding and per-example processing
//! - `download`: fetching datasets missing from disk

pub mod arrays;
pub mod download;
pub mod records;
pub mod transform;

pub use arrays::{load_dataset, load_npz_split, ArraySplit, InMemoryData};
pub use download::{DatasetDownloader, LocalOnly};
pub use records::{discover_records, QueueConfig, QueueOptions, RecordFiles};
pub use transform::{
    per_image_standardization, DataDecode, DataProcess, ImagenetAugmentConfig, RecordFeatures,
    Sample,
};

/// The data side of the settings.
#[derive(Clone, Debug)]
pub enum DataOptions {
    /// Arrays loaded up front.
    InMemory(InMemoryData),
    /// Records streamed through input queues.
    Queued(QueueOptions),
}

impl DataOptions {
    #[must_use]
    pub const fn as_in_memory(&self) -> Option<&InMemoryData> {
        match self {
            Self::InMemory(data) => Some(data),
            Self::Queued(_) => None,
        }
    }

    #[must_use]
    pub const fn as_queued(&self) -> Option<&QueueOptions> {
        match self {
            Self::Queued(queue) => Some(queue),
            Self::InMemory(_) => None,
        }
    }
}
