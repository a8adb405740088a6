//! Resolved training options and the per-dataset default tables.
//!
//! User options arrive as a free-form JSON object. Resolution walks every
//! known key once: a user value wins (and is logged), otherwise the general
//! default applies, otherwise the dataset default. General and dataset
//! tables never name the same key.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use super::enums::{DatasetKind, OptimizerKind};
use crate::error::{SettingsError, SettingsResult};

/// The user's option dictionary.
pub type UserOptions = Map<String, Value>;

/// Keys that must be present in [`UserOptions`].
pub const REQUIRED_KEYS: [&str; 4] = ["device_idxs", "dataset", "model", "data_dir"];

/// Defaults shared by every dataset.
pub mod general {
    pub const NUM_THREADS_PER_QUEUE: usize = 1;
    pub const SAVE_STEP: usize = 10;
    pub const TRIAL_NUM: &str = "A";
    pub const LR_DIV: f64 = 10.0;
    pub const AUGMENT: bool = false;
    pub const IS_BSD: bool = false;
    pub const TRAIN_DATA_FRACTION: f64 = 1.0;
}

/// How often training progress is reported.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DisplayStep {
    /// Every `n` steps.
    Every(usize),
    /// `passes` times per `examples` training examples, so it scales with batch size.
    PerExamples { examples: usize, passes: f64 },
}

impl DisplayStep {
    /// Resolve to a step count for the given batch size.
    #[must_use]
    pub fn steps(&self, batch_size: usize) -> usize {
        match *self {
            Self::Every(n) => n,
            Self::PerExamples { examples, passes } => {
                ((examples as f64 / batch_size.max(1) as f64 * passes) as usize).max(1)
            }
        }
    }
}

/// Default table for one dataset branch.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetDefaults {
    /// Whether data is fed from record files. Fixed per dataset.
    pub use_io_queues: bool,
    pub aug_crop: usize,
    pub n_epochs: usize,
    pub batch_size: usize,
    pub lr: f64,
    pub optimizer: OptimizerKind,
    pub momentum: f64,
    pub std_mult: f64,
    pub delay: usize,
    pub psi_preconditioner: f64,
    pub filter_gain: f64,
    pub filter_size: usize,
    pub n_filters: usize,
    pub resnet_block_multiplicity: Option<usize>,
    pub display_step: DisplayStep,
    pub is_classification: bool,
    pub combine_train_val: bool,
    pub dim: usize,
    pub crop_shape: usize,
    pub n_channels: usize,
    pub n_classes: usize,
    pub log_path: &'static str,
    pub checkpoint_path: &'static str,
}

impl DatasetDefaults {
    /// The default table for `dataset`.
    #[must_use]
    pub const fn for_dataset(dataset: DatasetKind) -> Self {
        match dataset {
            DatasetKind::RotatedMnist => Self::rotated_mnist(),
            DatasetKind::Cifar10 => Self::cifar10(),
            DatasetKind::Imagenet => Self::imagenet(),
        }
    }

    const fn rotated_mnist() -> Self {
        Self {
            use_io_queues: false,
            aug_crop: 0,
            n_epochs: 200,
            batch_size: 46,
            lr: 0.0076,
            optimizer: OptimizerKind::Adam,
            momentum: 0.93,
            std_mult: 0.7,
            delay: 12,
            psi_preconditioner: 7.8,
            filter_gain: 2.0,
            filter_size: 3,
            n_filters: 8,
            resnet_block_multiplicity: None,
            display_step: DisplayStep::PerExamples {
                examples: 10_000,
                passes: 3.0,
            },
            is_classification: true,
            combine_train_val: false,
            dim: 28,
            crop_shape: 0,
            n_channels: 1,
            n_classes: 10,
            log_path: "./logs/deep_mnist",
            checkpoint_path: "./checkpoints/deep_mnist",
        }
    }

    const fn cifar10() -> Self {
        Self {
            use_io_queues: false,
            aug_crop: 3,
            n_epochs: 250,
            batch_size: 32,
            lr: 0.01,
            optimizer: OptimizerKind::Adam,
            momentum: 0.93,
            std_mult: 0.4,
            delay: 8,
            psi_preconditioner: 7.8,
            filter_gain: 2.0,
            filter_size: 3,
            // Wide ResNet, widening factor 10
            n_filters: 4 * 10,
            resnet_block_multiplicity: Some(3),
            display_step: DisplayStep::Every(25),
            is_classification: true,
            combine_train_val: false,
            dim: 32,
            crop_shape: 0,
            n_channels: 3,
            n_classes: 10,
            log_path: "./logs/deep_cifar",
            checkpoint_path: "./checkpoints/deep_cifar",
        }
    }

    const fn imagenet() -> Self {
        Self {
            use_io_queues: true,
            aug_crop: 3,
            n_epochs: 250,
            batch_size: 2,
            lr: 0.01,
            optimizer: OptimizerKind::Momentum,
            momentum: 0.93,
            std_mult: 0.4,
            delay: 8,
            psi_preconditioner: 7.8,
            filter_gain: 2.0,
            filter_size: 3,
            n_filters: 4 * 10,
            resnet_block_multiplicity: Some(3),
            display_step: DisplayStep::Every(25),
            is_classification: true,
            combine_train_val: false,
            dim: 224,
            crop_shape: 0,
            n_channels: 3,
            n_classes: 1000,
            log_path: "./logs/imagenet",
            checkpoint_path: "./checkpoints/imagenet",
        }
    }
}

/// Applies the "user value wins, otherwise default" rule over [`UserOptions`].
pub(crate) struct Resolver<'a> {
    user: &'a UserOptions,
}

impl<'a> Resolver<'a> {
    pub(crate) const fn new(user: &'a UserOptions) -> Self {
        Self { user }
    }

    /// Use the user's value for `key` if present, `default` otherwise.
    pub(crate) fn maybe_create<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> SettingsResult<T> {
        match self.user.get(key) {
            Some(value) => {
                info!("Option [{key}] is specified by user. Not using default.");
                parse_value(key, value)
            }
            None => Ok(default),
        }
    }

    /// The user's value for a key validated as present.
    pub(crate) fn required<T: DeserializeOwned>(&self, key: &str) -> SettingsResult<T> {
        let value = self.user.get(key).ok_or_else(|| SettingsError::MissingOptions {
            keys: vec![key.to_string()],
        })?;
        parse_value(key, value)
    }

    /// A value the dataset branch fixes regardless of user input.
    pub(crate) fn forced<T: Serialize>(&self, key: &str, value: T) -> T {
        if let Some(user_value) = self.user.get(key) {
            if serde_json::to_value(&value).ok().as_ref() != Some(user_value) {
                warn!("Option [{key}] is fixed by the dataset. Ignoring user value {user_value}.");
            }
        }
        value
    }
}

fn parse_value<T: DeserializeOwned>(key: &str, value: &Value) -> SettingsResult<T> {
    serde_json::from_value(value.clone()).map_err(|e| SettingsError::InvalidOption {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Fully resolved training options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingOptions {
    /// Indices of the devices training runs on.
    pub device_idxs: Vec<usize>,
    pub dataset: DatasetKind,
    /// Name of the model builder in the registry.
    pub model: String,
    pub data_dir: PathBuf,

    pub num_threads_per_queue: usize,
    /// Checkpoint every `save_step` epochs.
    pub save_step: usize,
    /// Free-form tag distinguishing repeated runs.
    pub trial_num: String,
    /// Factor the learning rate is divided by on each decay.
    pub lr_div: f64,
    pub augment: bool,
    /// Whether the run targets the BSD500 boundary task.
    pub is_bsd: bool,
    /// Fraction of training record files to read, in `(0, 1]`.
    pub train_data_fraction: f64,

    pub use_io_queues: bool,
    /// Margin of the random-crop augmentation, in pixels.
    pub aug_crop: usize,
    pub n_epochs: usize,
    pub batch_size: usize,
    pub lr: f64,
    pub optimizer: OptimizerKind,
    pub momentum: f64,
    /// Multiplier on the initialisation standard deviation.
    pub std_mult: f64,
    /// Epochs before the first learning-rate decay.
    pub delay: usize,
    pub psi_preconditioner: f64,
    pub filter_gain: f64,
    pub filter_size: usize,
    pub n_filters: usize,
    #[serde(default)]
    pub resnet_block_multiplicity: Option<usize>,
    pub display_step: usize,
    pub is_classification: bool,
    pub combine_train_val: bool,
    /// Side length of the (square) input images.
    pub dim: usize,
    pub crop_shape: usize,
    pub n_channels: usize,
    pub n_classes: usize,
    pub log_path: PathBuf,
    pub checkpoint_path: PathBuf,

    /// User keys that are not part of the schema, carried through untouched.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub unrecognised: Map<String, Value>,
}

impl TrainingOptions {
    /// Resolve every option for `dataset` from the user's dictionary.
    pub(crate) fn resolve(
        user: &UserOptions,
        dataset: DatasetKind,
        num_threads_per_queue: usize,
    ) -> SettingsResult<Self> {
        let r = Resolver::new(user);
        let d = DatasetDefaults::for_dataset(dataset);

        let batch_size = r.maybe_create("batch_size", d.batch_size)?;

        let mut options = Self {
            device_idxs: r.required("device_idxs")?,
            dataset,
            model: r.required("model")?,
            data_dir: r.required("data_dir")?,

            num_threads_per_queue,
            save_step: r.maybe_create("save_step", general::SAVE_STEP)?,
            trial_num: r.maybe_create("trial_num", general::TRIAL_NUM.to_string())?,
            lr_div: r.maybe_create("lr_div", general::LR_DIV)?,
            augment: r.maybe_create("augment", general::AUGMENT)?,
            is_bsd: r.maybe_create("is_bsd", general::IS_BSD)?,
            train_data_fraction: r
                .maybe_create("train_data_fraction", general::TRAIN_DATA_FRACTION)?,

            use_io_queues: r.forced("use_io_queues", d.use_io_queues),
            aug_crop: r.maybe_create("aug_crop", d.aug_crop)?,
            n_epochs: r.maybe_create("n_epochs", d.n_epochs)?,
            batch_size,
            lr: r.maybe_create("lr", d.lr)?,
            optimizer: r.maybe_create("optimizer", d.optimizer)?,
            momentum: r.maybe_create("momentum", d.momentum)?,
            std_mult: r.maybe_create("std_mult", d.std_mult)?,
            delay: r.maybe_create("delay", d.delay)?,
            psi_preconditioner: r.maybe_create("psi_preconditioner", d.psi_preconditioner)?,
            filter_gain: r.maybe_create("filter_gain", d.filter_gain)?,
            filter_size: r.maybe_create("filter_size", d.filter_size)?,
            n_filters: r.maybe_create("n_filters", d.n_filters)?,
            resnet_block_multiplicity: r
                .maybe_create("resnet_block_multiplicity", d.resnet_block_multiplicity)?,
            display_step: r.maybe_create("display_step", d.display_step.steps(batch_size))?,
            is_classification: r.maybe_create("is_classification", d.is_classification)?,
            combine_train_val: r.maybe_create("combine_train_val", d.combine_train_val)?,
            dim: r.maybe_create("dim", d.dim)?,
            crop_shape: r.maybe_create("crop_shape", d.crop_shape)?,
            n_channels: r.maybe_create("n_channels", d.n_channels)?,
            n_classes: r.maybe_create("n_classes", d.n_classes)?,
            log_path: r.maybe_create("log_path", PathBuf::from(d.log_path))?,
            checkpoint_path: r.maybe_create("checkpoint_path", PathBuf::from(d.checkpoint_path))?,

            unrecognised: Map::new(),
        };

        let known = options.keys()?;
        options.unrecognised = user
            .iter()
            .filter(|(key, _)| !known.iter().any(|k| k == *key))
            .map(|(key, value)| {
                debug!("Carrying unrecognised option [{key}]");
                (key.clone(), value.clone())
            })
            .collect();

        options.validate()?;
        Ok(options)
    }

    /// Check value ranges that the types alone do not enforce.
    ///
    /// # Errors
    ///
    /// Returns `Err(SettingsError::InvalidOption)` naming the first offending key.
    pub fn validate(&self) -> SettingsResult<()> {
        let invalid = |key: &str, reason: String| {
            Err(SettingsError::InvalidOption {
                key: key.to_string(),
                reason,
            })
        };

        if self.device_idxs.is_empty() {
            return invalid("device_idxs", "at least one device is required".into());
        }
        if self.batch_size == 0 {
            return invalid("batch_size", "must be greater than 0".into());
        }
        if self.n_epochs == 0 {
            return invalid("n_epochs", "must be greater than 0".into());
        }
        if !(self.lr > 0.0) {
            return invalid("lr", format!("must be positive, got {}", self.lr));
        }
        if !(self.train_data_fraction > 0.0 && self.train_data_fraction <= 1.0) {
            return invalid(
                "train_data_fraction",
                format!("must be in (0, 1], got {}", self.train_data_fraction),
            );
        }
        if self.display_step == 0 {
            return invalid("display_step", "must be greater than 0".into());
        }
        if self.filter_size == 0 {
            return invalid("filter_size", "must be greater than 0".into());
        }
        if self.dim == 0 || self.n_channels == 0 || self.n_classes == 0 {
            return invalid("dim", "image and label dimensions must be non-zero".into());
        }
        Ok(())
    }

    /// Names of every schema field.
    fn keys(&self) -> SettingsResult<Vec<String>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map.into_iter().map(|(k, _)| k).collect()),
            _ => Ok(Vec::new()),
        }
    }

    /// Replace one option by name.
    ///
    /// `dataset`, `model` and `use_io_queues` decide the branch, builder and
    /// data options, so they cannot be changed after resolution. Only `key`
    /// changes: options derived from it at resolution, such as
    /// `display_step` from `batch_size`, keep their value.
    pub(crate) fn set(&mut self, key: &str, value: Value) -> SettingsResult<()> {
        if matches!(key, "dataset" | "model" | "use_io_queues") {
            return Err(SettingsError::InvalidOption {
                key: key.to_string(),
                reason: "fixed once options are resolved".into(),
            });
        }
        let Value::Object(mut map) = serde_json::to_value(&*self)? else {
            return Err(SettingsError::UnknownOption {
                key: key.to_string(),
            });
        };
        if key == "unrecognised" || !map.contains_key(key) {
            return Err(SettingsError::UnknownOption {
                key: key.to_string(),
            });
        }
        map.insert(key.to_string(), value);
        let updated: Self =
            serde_json::from_value(Value::Object(map)).map_err(|e| SettingsError::InvalidOption {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Write the options as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> SettingsResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read options previously written by [`TrainingOptions::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> SettingsResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let options: Self = serde_json::from_str(&json)?;
        options.validate()?;
        Ok(options)
    }
}
