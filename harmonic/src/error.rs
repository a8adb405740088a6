use std::path::PathBuf;

use thiserror::Error;

/// The error type for settings assembly.
///
/// Covers everything from missing user options to failures while loading
/// the arrays or record files a dataset branch points at.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// One or more of the required options were not supplied.
    #[error("Missing required options: {}", keys.join(", "))]
    MissingOptions {
        /// The missing keys, in declaration order.
        keys: Vec<String>,
    },

    /// The model name has no builder in the registry.
    #[error("Unknown model: {name}")]
    UnknownModel {
        /// The name that failed to resolve.
        name: String,
    },

    /// The dataset name is not one of the supported datasets.
    #[error("Unsupported dataset: {name}")]
    UnsupportedDataset {
        /// The dataset name as given by the user.
        name: String,
    },

    /// A value was supplied for a known option but it has the wrong type or range.
    #[error("Invalid value for option [{key}]: {reason}")]
    InvalidOption {
        /// The option key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The resolved options have no field with this name.
    #[error("Unknown option: {key}")]
    UnknownOption {
        /// The option key.
        key: String,
    },

    /// Resolved options were requested before `create_options` ran.
    #[error("Options have not been resolved yet")]
    NotResolved,

    /// The dataset directory does not exist and could not be downloaded.
    #[error("Dataset not found: {}", path.display())]
    DatasetMissing {
        /// The expected dataset directory.
        path: PathBuf,
    },

    /// Reading or writing a file or directory failed.
    #[error("Failed to access {}", path.display())]
    Io {
        /// The file or directory being accessed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// An `.npz` archive was unreadable or lacked a required array.
    #[error("Failed to load arrays from {}: {reason}", path.display())]
    Npz {
        /// The archive path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Record file discovery found nothing usable.
    #[error("Record discovery failed in {}: {reason}", path.display())]
    RecordDiscovery {
        /// The directory that was searched.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Array contents do not match the shape the options describe.
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// The expected shape.
        expected: String,
        /// The actual shape.
        actual: String,
    },

    /// A record could not be decoded into an image/label pair.
    #[error("Decode failed: {reason}")]
    Decode {
        /// What went wrong.
        reason: String,
    },

    /// JSON (de)serialization failure.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// A specialized `Result` type for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_options_lists_every_key() {
        let err = SettingsError::MissingOptions {
            keys: vec!["dataset".into(), "data_dir".into()],
        };
        assert_eq!(err.to_string(), "Missing required options: dataset, data_dir");
    }
}
