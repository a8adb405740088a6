//! The settings object: validated user options, the resolved model builder,
//! and, after [`Settings::create_options`], the resolved training and data
//! options.

use std::path::Path;

use log::info;
use serde_json::Value;

use crate::{
    config::{general, DatasetKind, Resolver, TrainingOptions, UserOptions, REQUIRED_KEYS},
    data::{
        discover_records, load_dataset, DataDecode, DataOptions, DataProcess, DatasetDownloader,
        ImagenetAugmentConfig, InMemoryData, QueueConfig, QueueOptions,
    },
    error::{SettingsError, SettingsResult},
    models::{ModelBlueprint, ModelFn, ModelRegistry},
};

/// Training settings for one run.
#[derive(Debug)]
pub struct Settings {
    user: UserOptions,
    model_fn: ModelFn,
    num_threads_per_queue: usize,
    options: Option<TrainingOptions>,
    data: Option<DataOptions>,
}

impl Settings {
    /// Validate the required keys and resolve the model name.
    ///
    /// # Errors
    ///
    /// Returns `Err(SettingsError::MissingOptions)` listing every absent
    /// required key, or `Err(SettingsError::UnknownModel)`.
    pub fn new(user: UserOptions, registry: &ModelRegistry) -> SettingsResult<Self> {
        let num_threads_per_queue = Resolver::new(&user)
            .maybe_create("num_threads_per_queue", general::NUM_THREADS_PER_QUEUE)?;

        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| !user.contains_key(**key))
            .map(|key| (*key).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SettingsError::MissingOptions { keys: missing });
        }

        let model: String = Resolver::new(&user).required("model")?;
        let model_fn = registry.resolve(&model)?;

        Ok(Self {
            user,
            model_fn,
            num_threads_per_queue,
            options: None,
            data: None,
        })
    }

    /// Fill in every default for the chosen dataset and build the data options.
    ///
    /// `downloader` is asked for in-memory datasets missing from `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns `Err(SettingsError::UnsupportedDataset)` for unknown dataset
    /// names, `Err(SettingsError::InvalidOption)` for ill-typed user values,
    /// and any loading error of the dataset branch.
    pub fn create_options(&mut self, downloader: &dyn DatasetDownloader) -> SettingsResult<()> {
        let name: String = Resolver::new(&self.user).required("dataset")?;
        let dataset: DatasetKind = name.parse()?;

        let options = TrainingOptions::resolve(&self.user, dataset, self.num_threads_per_queue)?;
        let data = build_data_options(&options, downloader)?;
        info!(
            "Resolved options for {dataset}: model {}, batch size {}, {} epochs, lr {}",
            options.model, options.batch_size, options.n_epochs, options.lr
        );

        self.options = Some(options);
        self.data = Some(data);
        Ok(())
    }

    /// The options exactly as the user gave them.
    #[must_use]
    pub const fn user_options(&self) -> &UserOptions {
        &self.user
    }

    /// Resolved options; `None` before [`Settings::create_options`].
    #[must_use]
    pub const fn options(&self) -> Option<&TrainingOptions> {
        self.options.as_ref()
    }

    /// Resolved data options; `None` before [`Settings::create_options`].
    #[must_use]
    pub const fn data_options(&self) -> Option<&DataOptions> {
        self.data.as_ref()
    }

    /// The model-building function the model name resolved to.
    #[must_use]
    pub const fn model_fn(&self) -> ModelFn {
        self.model_fn
    }

    /// Lay out the model from the resolved options.
    pub fn build_model(&self) -> SettingsResult<ModelBlueprint> {
        let options = self.options.as_ref().ok_or(SettingsError::NotResolved)?;
        Ok((self.model_fn)(options))
    }

    /// Replace one resolved option by name.
    pub fn set_option(&mut self, key: &str, value: Value) -> SettingsResult<()> {
        self.options
            .as_mut()
            .ok_or(SettingsError::NotResolved)?
            .set(key, value)
    }

    /// Replace the data options.
    pub fn set_data_options(&mut self, data: DataOptions) {
        self.data = Some(data);
    }

    /// Write the resolved options as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> SettingsResult<()> {
        self.options
            .as_ref()
            .ok_or(SettingsError::NotResolved)?
            .save(path)
    }
}

/// Build the data side of the settings for resolved `options`.
pub fn build_data_options(
    options: &TrainingOptions,
    downloader: &dyn DatasetDownloader,
) -> SettingsResult<DataOptions> {
    let dataset = options.dataset;
    if options.use_io_queues {
        return queue_options(options).map(DataOptions::Queued);
    }

    let Some(array_dir) = dataset.array_directory() else {
        return queue_options(options).map(DataOptions::Queued);
    };
    let dir = options.data_dir.join(array_dir);
    if !dir.exists() {
        info!("{} not found, downloading {dataset}", dir.display());
        downloader.download(dataset, &options.data_dir)?;
        if !dir.exists() {
            return Err(SettingsError::DatasetMissing { path: dir });
        }
    }

    let data = match dataset {
        DatasetKind::RotatedMnist => InMemoryData::load(&dir, "rotated_")?,
        _ => load_dataset(&options.data_dir, array_dir)?,
    };
    Ok(DataOptions::InMemory(data))
}

fn queue_options(options: &TrainingOptions) -> SettingsResult<QueueOptions> {
    let dataset = options.dataset;
    let records = discover_records(
        &options.data_dir.join(dataset.record_directory()),
        options.train_data_fraction,
    )?;
    let queue = QueueConfig::for_dataset(dataset);
    let process = match dataset {
        DatasetKind::Imagenet => DataProcess::ImagenetAugment(
            ImagenetAugmentConfig::new().with_crop_size(options.dim as u32),
        ),
        DatasetKind::RotatedMnist | DatasetKind::Cifar10 => DataProcess::Standardize,
    };
    Ok(QueueOptions {
        records,
        decode: DataDecode::JpegWithRawLabel {
            y_type: queue.y_type,
        },
        queue,
        num_threads: options.num_threads_per_queue,
        process,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;
    use crate::data::{arrays::tests::write_split, LocalOnly};

    fn user(dataset: &str, model: &str, data_dir: &Path) -> UserOptions {
        json!({
            "device_idxs": [0, 1],
            "dataset": dataset,
            "model": model,
            "data_dir": data_dir,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn write_mnist(data_dir: &Path) {
        let dir = data_dir.join("mnist_rotation_new");
        fs::create_dir_all(&dir).unwrap();
        for name in ["train", "valid", "test"] {
            write_split(&dir.join(format!("rotated_{name}.npz")), 4, 28);
        }
    }

    #[test]
    fn missing_keys_are_all_reported() {
        let user = json!({ "model": "deep_mnist" }).as_object().cloned().unwrap();
        match Settings::new(user, &ModelRegistry::builtin()) {
            Err(SettingsError::MissingOptions { keys }) => {
                assert_eq!(keys, ["device_idxs", "dataset", "data_dir"]);
            }
            other => panic!("Expected MissingOptions, got {other:?}"),
        }
    }

    #[test]
    fn unknown_model_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::new(
            user("rotated_mnist", "resnet9000", dir.path()),
            &ModelRegistry::builtin(),
        );
        assert!(matches!(result, Err(SettingsError::UnknownModel { .. })));
    }

    #[test]
    fn unsupported_dataset_fails_option_creation() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings =
            Settings::new(user("svhn", "deep_mnist", dir.path()), &ModelRegistry::builtin())
                .unwrap();
        assert!(matches!(
            settings.create_options(&LocalOnly),
            Err(SettingsError::UnsupportedDataset { .. })
        ));
        assert!(settings.options().is_none());
    }

    #[test]
    fn mnist_loads_arrays_into_memory() {
        let dir = tempfile::tempdir().unwrap();
        write_mnist(dir.path());
        let mut settings = Settings::new(
            user("rotated_mnist", "deep_mnist", dir.path()),
            &ModelRegistry::builtin(),
        )
        .unwrap();
        settings.create_options(&LocalOnly).unwrap();

        let options = settings.options().unwrap();
        assert_eq!(options.device_idxs, vec![0, 1]);
        assert_eq!(options.num_threads_per_queue, 1);
        let data = settings.data_options().unwrap().as_in_memory().unwrap();
        assert_eq!(data.train.len(), 4);
        assert_eq!(settings.build_model().unwrap().name, "deep_mnist");
    }

    #[test]
    fn missing_dataset_asks_the_downloader() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::new(
            user("rotated_mnist", "deep_mnist", dir.path()),
            &ModelRegistry::builtin(),
        )
        .unwrap();

        let fetch = |dataset: DatasetKind, data_dir: &Path| -> SettingsResult<()> {
            assert_eq!(dataset, DatasetKind::RotatedMnist);
            write_mnist(data_dir);
            Ok(())
        };
        settings.create_options(&fetch).unwrap();
        assert!(settings.data_options().unwrap().as_in_memory().is_some());
    }

    #[test]
    fn local_only_reports_missing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::new(
            user("cifar10", "deep_cifar", dir.path()),
            &ModelRegistry::builtin(),
        )
        .unwrap();
        match settings.create_options(&LocalOnly) {
            Err(SettingsError::DatasetMissing { path }) => {
                assert_eq!(path, dir.path().join("cifar_numpy"));
            }
            other => panic!("Expected DatasetMissing, got {other:?}"),
        }
    }

    #[test]
    fn imagenet_uses_record_queues() {
        let dir = tempfile::tempdir().unwrap();
        let records = dir.path().join("imagenet");
        fs::create_dir_all(&records).unwrap();
        for name in ["train-0.tfrecords", "train-1.tfrecords", "validation-0.tfrecords"] {
            fs::write(records.join(name), b"").unwrap();
        }
        let mut options = user("imagenet", "deep_imagenet", dir.path());
        options.insert("train_data_fraction".into(), json!(0.5));
        options.insert("num_threads_per_queue".into(), json!(4));

        let mut settings = Settings::new(options, &ModelRegistry::builtin()).unwrap();
        settings.create_options(&LocalOnly).unwrap();

        let queue = settings.data_options().unwrap().as_queued().unwrap();
        assert_eq!(queue.records.train.len(), 1);
        assert_eq!(queue.records.valid.len(), 1);
        assert_eq!(queue.num_threads, 4);
        assert_eq!(queue.queue.capacity, 5000);
        assert!(matches!(queue.process, DataProcess::ImagenetAugment(_)));
        assert!(settings.options().unwrap().use_io_queues);
    }

    #[test]
    fn set_option_requires_resolution() {
        let dir = tempfile::tempdir().unwrap();
        write_mnist(dir.path());
        let mut settings = Settings::new(
            user("rotated_mnist", "deep_mnist", dir.path()),
            &ModelRegistry::builtin(),
        )
        .unwrap();
        assert!(matches!(
            settings.set_option("lr", json!(0.1)),
            Err(SettingsError::NotResolved)
        ));

        settings.create_options(&LocalOnly).unwrap();
        assert!(matches!(
            settings.set_option("use_io_queues", json!(true)),
            Err(SettingsError::InvalidOption { .. })
        ));
        assert!(!settings.options().unwrap().use_io_queues);
        assert!(settings.data_options().unwrap().as_in_memory().is_some());

        settings.set_option("n_filters", json!(12)).unwrap();
        let model = settings.build_model().unwrap();
        assert_eq!(model.feature_channels(), 10);
        assert_eq!(settings.options().unwrap().n_filters, 12);
    }
}
