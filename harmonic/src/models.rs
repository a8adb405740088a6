//! Model registry.
//!
//! Users name a model in their options; the registry swaps that name for the
//! function that lays the network out from the resolved options.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    config::TrainingOptions,
    error::{SettingsError, SettingsResult},
};

/// A model-building function.
pub type ModelFn = fn(&TrainingOptions) -> ModelBlueprint;

/// One stage of a network as laid out by a [`ModelFn`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LayerSpec {
    /// Rotation-equivariant convolution with circular-harmonic filters.
    HarmonicConv {
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        /// Highest rotation order of the filters.
        max_order: usize,
        stride: usize,
        std_mult: f64,
        filter_gain: f64,
    },
    /// Batch norm over the magnitudes of each rotation order.
    BatchNorm { channels: usize },
    /// Mean pooling with a square window.
    MeanPool { kernel_size: usize },
    /// Two harmonic convolutions with a skip connection.
    ResidualBlock {
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
    },
    /// Global average of magnitudes into class logits.
    Readout { in_channels: usize, n_classes: usize },
}

/// The network a builder produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelBlueprint {
    pub name: String,
    /// `[height, width, channels]`.
    pub input_shape: [usize; 3],
    pub layers: Vec<LayerSpec>,
    pub n_classes: usize,
}

impl ModelBlueprint {
    /// Number of harmonic convolutions, counting two per residual block.
    #[must_use]
    pub fn conv_count(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| match layer {
                LayerSpec::HarmonicConv { .. } => 1,
                LayerSpec::ResidualBlock { .. } => 2,
                _ => 0,
            })
            .sum()
    }

    /// Output channels of the last convolutional stage.
    #[must_use]
    pub fn feature_channels(&self) -> usize {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| match layer {
                LayerSpec::HarmonicConv { out_channels, .. }
                | LayerSpec::ResidualBlock { out_channels, .. } => Some(*out_channels),
                _ => None,
            })
            .unwrap_or(0)
    }
}

/// Name → [`ModelFn`] lookup.
#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    builders: BTreeMap<String, ModelFn>,
}

impl ModelRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the bundled harmonic networks.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("deep_mnist", deep_mnist);
        registry.register("deep_cifar", deep_cifar);
        registry.register("deep_imagenet", deep_imagenet);
        registry
    }

    /// Add or replace a builder.
    pub fn register(&mut self, name: impl Into<String>, builder: ModelFn) {
        self.builders.insert(name.into(), builder);
    }

    /// Look up the builder for `name`.
    ///
    /// # Errors
    ///
    /// Returns `Err(SettingsError::UnknownModel)` if no builder has that name.
    pub fn resolve(&self, name: &str) -> SettingsResult<ModelFn> {
        self.builders
            .get(name)
            .copied()
            .ok_or_else(|| SettingsError::UnknownModel {
                name: name.to_string(),
            })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }
}

fn conv(
    opt: &TrainingOptions,
    in_channels: usize,
    out_channels: usize,
    stride: usize,
) -> LayerSpec {
    LayerSpec::HarmonicConv {
        in_channels,
        out_channels,
        kernel_size: opt.filter_size,
        max_order: 1,
        stride,
        std_mult: opt.std_mult,
        filter_gain: opt.filter_gain,
    }
}

fn blueprint(name: &str, opt: &TrainingOptions, layers: Vec<LayerSpec>) -> ModelBlueprint {
    ModelBlueprint {
        name: name.to_string(),
        input_shape: [opt.dim, opt.dim, opt.n_channels],
        layers,
        n_classes: opt.n_classes,
    }
}

/// Seven harmonic convolutions in three widths, two pooling stages.
pub fn deep_mnist(opt: &TrainingOptions) -> ModelBlueprint {
    let nf = opt.n_filters;
    let (nf2, nf3) = (2 * nf, 4 * nf);
    let layers = vec![
        conv(opt, opt.n_channels, nf, 1),
        conv(opt, nf, nf, 1),
        LayerSpec::BatchNorm { channels: nf },
        LayerSpec::MeanPool { kernel_size: 2 },
        conv(opt, nf, nf2, 1),
        conv(opt, nf2, nf2, 1),
        LayerSpec::BatchNorm { channels: nf2 },
        LayerSpec::MeanPool { kernel_size: 2 },
        conv(opt, nf2, nf3, 1),
        conv(opt, nf3, nf3, 1),
        LayerSpec::BatchNorm { channels: nf3 },
        conv(opt, nf3, opt.n_classes, 1),
        LayerSpec::Readout {
            in_channels: opt.n_classes,
            n_classes: opt.n_classes,
        },
    ];
    blueprint("deep_mnist", opt, layers)
}

/// Wide residual stack: a stem convolution, then `widths.len()` stages of
/// `resnet_block_multiplicity` blocks each, downsampling at every stage after
/// the first.
fn wide_resnet(name: &str, opt: &TrainingOptions, widths: &[usize]) -> ModelBlueprint {
    let blocks = opt.resnet_block_multiplicity.unwrap_or(1).max(1);
    let stem = widths.first().copied().unwrap_or(opt.n_filters) / 2;
    let mut layers = vec![conv(opt, opt.n_channels, stem.max(1), 1)];
    let mut in_channels = stem.max(1);

    for (stage, &width) in widths.iter().enumerate() {
        for block in 0..blocks {
            let stride = if stage > 0 && block == 0 { 2 } else { 1 };
            layers.push(LayerSpec::ResidualBlock {
                in_channels,
                out_channels: width,
                kernel_size: opt.filter_size,
                stride,
            });
            in_channels = width;
        }
        layers.push(LayerSpec::BatchNorm { channels: width });
    }
    layers.push(LayerSpec::Readout {
        in_channels,
        n_classes: opt.n_classes,
    });
    blueprint(name, opt, layers)
}

/// Three-stage wide residual harmonic network.
pub fn deep_cifar(opt: &TrainingOptions) -> ModelBlueprint {
    let nf = opt.n_filters;
    wide_resnet("deep_cifar", opt, &[nf, 2 * nf, 4 * nf])
}

/// Four-stage wide residual harmonic network with a strided stem pool.
pub fn deep_imagenet(opt: &TrainingOptions) -> ModelBlueprint {
    let nf = opt.n_filters;
    let mut model = wide_resnet("deep_imagenet", opt, &[nf, 2 * nf, 4 * nf, 8 * nf]);
    model
        .layers
        .insert(1, LayerSpec::MeanPool { kernel_size: 4 });
    model
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::DatasetKind;

    fn options(dataset: DatasetKind, model: &str) -> TrainingOptions {
        let user = json!({
            "device_idxs": [0],
            "dataset": dataset.as_str(),
            "model": model,
            "data_dir": "data",
        });
        TrainingOptions::resolve(user.as_object().unwrap(), dataset, 1).unwrap()
    }

    #[test]
    fn builtin_registry_resolves_bundled_models() {
        let registry = ModelRegistry::builtin();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            ["deep_cifar", "deep_imagenet", "deep_mnist"]
        );
        assert!(registry.resolve("deep_mnist").is_ok());
    }

    #[test]
    fn unknown_model_is_an_error() {
        match ModelRegistry::builtin().resolve("lenet") {
            Err(SettingsError::UnknownModel { name }) => assert_eq!(name, "lenet"),
            other => panic!("Expected UnknownModel, got {other:?}"),
        }
    }

    #[test]
    fn deep_mnist_layout() {
        let opt = options(DatasetKind::RotatedMnist, "deep_mnist");
        let model = deep_mnist(&opt);
        assert_eq!(model.input_shape, [28, 28, 1]);
        assert_eq!(model.conv_count(), 7);
        assert_eq!(model.feature_channels(), 10);
        match &model.layers[0] {
            LayerSpec::HarmonicConv {
                in_channels,
                out_channels,
                kernel_size,
                std_mult,
                ..
            } => {
                assert_eq!((*in_channels, *out_channels, *kernel_size), (1, 8, 3));
                assert_eq!(*std_mult, 0.7);
            }
            other => panic!("Expected HarmonicConv, got {other:?}"),
        }
    }

    #[test]
    fn deep_cifar_uses_block_multiplicity() {
        let opt = options(DatasetKind::Cifar10, "deep_cifar");
        let model = deep_cifar(&opt);
        let blocks = model
            .layers
            .iter()
            .filter(|l| matches!(l, LayerSpec::ResidualBlock { .. }))
            .count();
        assert_eq!(blocks, 9);
        assert_eq!(model.feature_channels(), 160);
        assert_eq!(model.n_classes, 10);
    }

    #[test]
    fn deep_imagenet_has_four_stages() {
        let opt = options(DatasetKind::Imagenet, "deep_imagenet");
        let model = deep_imagenet(&opt);
        assert_eq!(model.feature_channels(), 320);
        assert_eq!(model.layers[1], LayerSpec::MeanPool { kernel_size: 4 });
        assert_eq!(model.n_classes, 1000);
    }

    #[test]
    fn custom_builders_can_be_registered() {
        fn tiny(opt: &TrainingOptions) -> ModelBlueprint {
            blueprint("tiny", opt, Vec::new())
        }
        let mut registry = ModelRegistry::new();
        registry.register("tiny", tiny);
        let opt = options(DatasetKind::RotatedMnist, "tiny");
        let model = (registry.resolve("tiny").unwrap())(&opt);
        assert_eq!(model.conv_count(), 0);
        assert_eq!(model.feature_channels(), 0);
    }
}
