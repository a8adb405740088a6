//! In-memory datasets loaded from `.npz` archives.

use std::{
    fs::File,
    io::{Read, Seek},
    path::{Path, PathBuf},
};

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use log::info;
use ndarray::{ArrayD, IxDyn, OwnedRepr};
use ndarray_npy::NpzReader;

use crate::error::{SettingsError, SettingsResult};

/// Images and labels of one split.
///
/// `x` is always `f32` with the sample index first; `y` is always `i64` with
/// one label per sample.
#[derive(Debug, Clone)]
pub struct ArraySplit {
    pub x: TensorData,
    pub y: TensorData,
}

impl ArraySplit {
    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.shape.first().copied().unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert to tensors with images laid out as `[N, dim, dim, channels]`.
    ///
    /// # Errors
    ///
    /// Returns `Err(SettingsError::ShapeMismatch)` if the stored images do not
    /// hold exactly `dim * dim * channels` values per sample.
    pub fn to_tensors<B: Backend>(
        &self,
        dim: usize,
        channels: usize,
        device: &B::Device,
    ) -> SettingsResult<(Tensor<B, 4>, Tensor<B, 1, Int>)> {
        let n = self.len();
        let expected = n * dim * dim * channels;
        let numel: usize = self.x.shape.iter().product();
        if numel != expected {
            return Err(SettingsError::ShapeMismatch {
                expected: format!("{:?}", [n, dim, dim, channels]),
                actual: format!("{:?}", self.x.shape),
            });
        }

        let pixels = self
            .x
            .to_vec::<f32>()
            .map_err(|e| SettingsError::Decode {
                reason: format!("{e:?}"),
            })?;
        let labels = self
            .y
            .to_vec::<i64>()
            .map_err(|e| SettingsError::Decode {
                reason: format!("{e:?}"),
            })?;
        if labels.len() != n {
            return Err(SettingsError::ShapeMismatch {
                expected: format!("[{n}]"),
                actual: format!("{:?}", self.y.shape),
            });
        }

        let images = Tensor::<B, 1>::from_data(TensorData::new(pixels, [expected]), device)
            .reshape([n, dim, dim, channels]);
        let labels = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [n]), device);
        Ok((images, labels))
    }
}

/// Train, validation and test splits held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryData {
    pub train: ArraySplit,
    pub valid: ArraySplit,
    pub test: ArraySplit,
}

impl InMemoryData {
    /// Load `<prefix>train.npz`, `<prefix>valid.npz` and `<prefix>test.npz` from `dir`.
    pub fn load(dir: &Path, prefix: &str) -> SettingsResult<Self> {
        let [train, valid, test] = split_paths(dir, prefix).map(|path| load_npz_split(&path));
        let data = Self {
            train: train?,
            valid: valid?,
            test: test?,
        };
        info!(
            "Loaded {} train / {} valid / {} test samples from {}",
            data.train.len(),
            data.valid.len(),
            data.test.len(),
            dir.display()
        );
        Ok(data)
    }
}

/// Load the dataset stored as `.npz` splits in `data_dir/name`.
pub fn load_dataset(data_dir: &Path, name: &str) -> SettingsResult<InMemoryData> {
    InMemoryData::load(&data_dir.join(name), "")
}

/// Read the `x` and `y` arrays of one `.npz` archive.
///
/// `x` may be stored as `f32`, `f64` or `u8`; `y` as `i64`, `i32` or `u8`.
pub fn load_npz_split(path: &Path) -> SettingsResult<ArraySplit> {
    let npz_error = |reason: String| SettingsError::Npz {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut npz = NpzReader::new(file).map_err(|e| npz_error(e.to_string()))?;
    let names = npz.names().map_err(|e| npz_error(e.to_string()))?;

    let x_name = entry_name(&names, "x").ok_or_else(|| npz_error("no `x` array".into()))?;
    let y_name = entry_name(&names, "y").ok_or_else(|| npz_error("no `y` array".into()))?;
    let x = read_images(&mut npz, &x_name).map_err(npz_error)?;
    let y = read_labels(&mut npz, &y_name).map_err(npz_error)?;

    let n_labels: usize = y.shape.iter().product();
    let n_images = x.shape.first().copied().unwrap_or(0);
    if n_labels != n_images {
        return Err(npz_error(format!(
            "{n_images} images but {n_labels} labels"
        )));
    }
    Ok(ArraySplit { x, y })
}

fn entry_name(names: &[String], key: &str) -> Option<String> {
    let with_ext = format!("{key}.npy");
    names
        .iter()
        .find(|name| name.as_str() == key || *name == &with_ext)
        .cloned()
}

fn read_images<R: Read + Seek>(npz: &mut NpzReader<R>, name: &str) -> Result<TensorData, String> {
    if let Ok(array) = npz.by_name::<OwnedRepr<f32>, IxDyn>(name) {
        return Ok(float_data(&array));
    }
    if let Ok(array) = npz.by_name::<OwnedRepr<f64>, IxDyn>(name) {
        return Ok(float_data(&array.mapv(|v| v as f32)));
    }
    npz.by_name::<OwnedRepr<u8>, IxDyn>(name)
        .map(|array| float_data(&array.mapv(f32::from)))
        .map_err(|e| format!("`{name}` is not f32, f64 or u8: {e}"))
}

fn read_labels<R: Read + Seek>(npz: &mut NpzReader<R>, name: &str) -> Result<TensorData, String> {
    if let Ok(array) = npz.by_name::<OwnedRepr<i64>, IxDyn>(name) {
        return Ok(label_data(&array));
    }
    if let Ok(array) = npz.by_name::<OwnedRepr<i32>, IxDyn>(name) {
        return Ok(label_data(&array.mapv(i64::from)));
    }
    npz.by_name::<OwnedRepr<u8>, IxDyn>(name)
        .map(|array| label_data(&array.mapv(i64::from)))
        .map_err(|e| format!("`{name}` is not i64, i32 or u8: {e}"))
}

fn float_data(array: &ArrayD<f32>) -> TensorData {
    TensorData::new(array.iter().copied().collect::<Vec<_>>(), array.shape().to_vec())
}

fn label_data(array: &ArrayD<i64>) -> TensorData {
    let n = array.len();
    TensorData::new(array.iter().copied().collect::<Vec<_>>(), [n])
}

/// Paths of the three split archives under `dir`.
#[must_use]
pub fn split_paths(dir: &Path, prefix: &str) -> [PathBuf; 3] {
    ["train", "valid", "test"].map(|name| dir.join(format!("{prefix}{name}.npz")))
}
