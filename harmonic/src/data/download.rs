//! Fetching datasets that are not on disk yet.

use std::path::Path;

use crate::{
    config::DatasetKind,
    error::{SettingsError, SettingsResult},
};

/// Places a dataset under `data_dir` in the layout the loaders expect.
pub trait DatasetDownloader {
    /// Download `dataset` into `data_dir`.
    fn download(&self, dataset: DatasetKind, data_dir: &Path) -> SettingsResult<()>;
}

impl<F> DatasetDownloader for F
where
    F: Fn(DatasetKind, &Path) -> SettingsResult<()>,
{
    fn download(&self, dataset: DatasetKind, data_dir: &Path) -> SettingsResult<()> {
        self(dataset, data_dir)
    }
}

/// Never downloads; a missing dataset is an error.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalOnly;

impl DatasetDownloader for LocalOnly {
    fn download(&self, dataset: DatasetKind, data_dir: &Path) -> SettingsResult<()> {
        let dir = dataset
            .array_directory()
            .unwrap_or_else(|| dataset.record_directory());
        Err(SettingsError::DatasetMissing {
            path: data_dir.join(dir),
        })
    }
}
