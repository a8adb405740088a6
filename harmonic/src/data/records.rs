//! Record-file datasets read through input queues.

use std::path::{Path, PathBuf};

use burn::prelude::*;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::transform::{DataDecode, DataProcess};
use crate::{
    config::{DatasetKind, RecordDtype},
    error::{SettingsError, SettingsResult},
};

/// File extension of record files.
pub const RECORD_EXTENSION: &str = "tfrecords";

/// Record files of each split, sorted by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFiles {
    pub train: Vec<PathBuf>,
    pub valid: Vec<PathBuf>,
    pub test: Vec<PathBuf>,
}

/// Find the record files below `dir` and keep `train_fraction` of the
/// training files.
///
/// Files are assigned to a split by name: `test`, then `valid`/`val`, then
/// `train`. Anything else is skipped.
///
/// # Errors
///
/// Returns `Err(SettingsError::DatasetMissing)` if `dir` does not exist and
/// `Err(SettingsError::RecordDiscovery)` if it holds no training records.
pub fn discover_records(dir: &Path, train_fraction: f64) -> SettingsResult<RecordFiles> {
    if !dir.is_dir() {
        return Err(SettingsError::DatasetMissing {
            path: dir.to_path_buf(),
        });
    }
    if !(train_fraction > 0.0 && train_fraction <= 1.0) {
        return Err(SettingsError::InvalidOption {
            key: "train_data_fraction".into(),
            reason: format!("must be in (0, 1], got {train_fraction}"),
        });
    }

    let mut files = RecordFiles::default();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| SettingsError::RecordDiscovery {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION)
        {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.contains("test") {
            files.test.push(path.to_path_buf());
        } else if name.contains("val") {
            files.valid.push(path.to_path_buf());
        } else if name.contains("train") {
            files.train.push(path.to_path_buf());
        } else {
            debug!("Skipping record file without split name: {}", path.display());
        }
    }

    if files.train.is_empty() {
        return Err(SettingsError::RecordDiscovery {
            path: dir.to_path_buf(),
            reason: "no training record files".into(),
        });
    }

    let available = files.train.len();
    let keep = ((available as f64 * train_fraction).ceil() as usize).clamp(1, available);
    files.train.truncate(keep);

    info!(
        "Using {keep}/{available} train, {} valid, {} test record files from {}",
        files.valid.len(),
        files.test.len(),
        dir.display()
    );
    Ok(files)
}

/// Input-queue parameters.
#[derive(Config, Debug)]
pub struct QueueConfig {
    /// Minimum number of examples left in the shuffle buffer after a dequeue.
    #[config(default = 5000)]
    pub min_after_dequeue: usize,
    /// Maximum number of buffered examples.
    #[config(default = 8000)]
    pub capacity: usize,
    /// Element type of the stored images.
    #[config(default = "RecordDtype::U8")]
    pub x_type: RecordDtype,
    /// Element type of the stored labels.
    #[config(default = "RecordDtype::I64")]
    pub y_type: RecordDtype,
    /// Shape images are reshaped to; empty means unchanged.
    pub x_target_shape: Vec<usize>,
    /// Shape labels are reshaped to before being squeezed.
    #[config(default = "vec![1]")]
    pub y_target_shape: Vec<usize>,
}

impl QueueConfig {
    /// Queue parameters for `dataset`.
    #[must_use]
    pub fn for_dataset(dataset: DatasetKind) -> Self {
        match dataset {
            DatasetKind::RotatedMnist => Self::new(vec![28, 28, 1, 1, 1]),
            DatasetKind::Cifar10 => Self::new(vec![32, 32, 3, 1, 1]),
            DatasetKind::Imagenet => Self::new(vec![224, 224, 3, 1, 1])
                .with_min_after_dequeue(3000)
                .with_capacity(5000),
        }
    }

    /// Channel count of the target image shape, 3 if unspecified.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.x_target_shape.get(2).copied().unwrap_or(3)
    }
}

/// Everything a record-reading input pipeline needs.
#[derive(Clone, Debug)]
pub struct QueueOptions {
    pub records: RecordFiles,
    pub queue: QueueConfig,
    pub num_threads: usize,
    pub decode: DataDecode,
    pub process: DataProcess,
}
