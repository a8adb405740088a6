//! Enumeration types for training settings.
//!
//! These are the closed sets of names a user may pick from: which dataset
//! branch to take, which optimizer the trainer should build, and which
//! element type the record files store.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{SettingsError, SettingsResult};

/// Defines the dataset whose defaults are applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// MNIST digits with random rotations (mnist-rot).
    RotatedMnist,
    /// CIFAR-10 natural images.
    Cifar10,
    /// ImageNet (ILSVRC) read from record files.
    Imagenet,
}

impl DatasetKind {
    /// All supported datasets.
    pub const ALL: [Self; 3] = [Self::RotatedMnist, Self::Cifar10, Self::Imagenet];

    /// The name used in user options.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RotatedMnist => "rotated_mnist",
            Self::Cifar10 => "cifar10",
            Self::Imagenet => "imagenet",
        }
    }

    /// Directory below `data_dir` that holds the record files.
    #[must_use]
    pub const fn record_directory(&self) -> &'static str {
        match self {
            Self::RotatedMnist => "mnist_rotation_new",
            Self::Cifar10 => "cifar10",
            Self::Imagenet => "imagenet",
        }
    }

    /// Directory below `data_dir` that holds the `.npz` arrays.
    ///
    /// ImageNet is only ever read through record files, so it has none.
    #[must_use]
    pub const fn array_directory(&self) -> Option<&'static str> {
        match self {
            Self::RotatedMnist => Some("mnist_rotation_new"),
            Self::Cifar10 => Some("cifar_numpy"),
            Self::Imagenet => None,
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = SettingsError;

    fn from_str(name: &str) -> SettingsResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| SettingsError::UnsupportedDataset {
                name: name.to_string(),
            })
    }
}

/// Defines the optimizer the trainer builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Adam.
    Adam,
    /// SGD with momentum, using the `momentum` option.
    Momentum,
}

/// Defines the element type stored in a record field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordDtype {
    /// Unsigned byte.
    U8,
    /// Little-endian 64-bit signed integer.
    I64,
    /// Little-endian 32-bit float.
    F32,
}

impl RecordDtype {
    /// Size of one element in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I64 => 8,
            Self::F32 => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_names_round_trip_through_from_str() {
        for kind in DatasetKind::ALL {
            assert_eq!(kind.as_str().parse::<DatasetKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_dataset_is_rejected() {
        match "svhn".parse::<DatasetKind>() {
            Err(SettingsError::UnsupportedDataset { name }) => assert_eq!(name, "svhn"),
            other => panic!("Expected UnsupportedDataset, got {other:?}"),
        }
    }

    #[test]
    fn dataset_serializes_as_user_name() {
        let json = serde_json::to_string(&DatasetKind::RotatedMnist).unwrap();
        assert_eq!(json, "\"rotated_mnist\"");
        let optimizer: OptimizerKind = serde_json::from_str("\"momentum\"").unwrap();
        assert_eq!(optimizer, OptimizerKind::Momentum);
    }

    #[test]
    fn only_imagenet_lacks_arrays() {
        assert_eq!(DatasetKind::Cifar10.array_directory(), Some("cifar_numpy"));
        assert_eq!(DatasetKind::Imagenet.array_directory(), None);
    }
}
