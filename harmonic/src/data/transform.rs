//! Record decoding and per-example processing.
//!
//! A record holds an encoded image (`x_raw`) and its raw label bytes
//! (`y_raw`). Decoding turns those into an image with values in `[0, 1]` and
//! integer labels; processing standardises the image and, for ImageNet,
//! augments it first.

use burn::prelude::*;
use image::{imageops::FilterType, DynamicImage, ImageFormat, Rgb32FImage};
use rand::Rng;

use crate::{
    config::RecordDtype,
    error::{SettingsError, SettingsResult},
};

/// The two raw fields of one record.
#[derive(Clone, Debug, Default)]
pub struct RecordFeatures {
    pub x_raw: Vec<u8>,
    pub y_raw: Vec<u8>,
}

/// A processed example, pixels in HWC order.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub pixels: Vec<f32>,
    /// `[height, width, channels]`.
    pub shape: [usize; 3],
    pub label: Vec<i64>,
}

/// How a record is decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataDecode {
    /// JPEG image; label bytes hold little-endian `y_type` values.
    JpegWithRawLabel { y_type: RecordDtype },
}

impl DataDecode {
    /// Decode one record.
    ///
    /// # Errors
    ///
    /// Returns `Err(SettingsError::Decode)` if the image is not a valid JPEG
    /// or the label bytes are not a whole number of `y_type` elements.
    pub fn decode(&self, features: &RecordFeatures) -> SettingsResult<(DynamicImage, Vec<i64>)> {
        match *self {
            Self::JpegWithRawLabel { y_type } => {
                let image = image::load_from_memory_with_format(&features.x_raw, ImageFormat::Jpeg)
                    .map_err(|e| SettingsError::Decode {
                        reason: format!("image: {e}"),
                    })?;
                let label = decode_raw(&features.y_raw, y_type)?;
                Ok((image, label))
            }
        }
    }
}

/// Reinterpret `bytes` as little-endian `dtype` values.
pub fn decode_raw(bytes: &[u8], dtype: RecordDtype) -> SettingsResult<Vec<i64>> {
    let size = dtype.size();
    if bytes.len() % size != 0 {
        return Err(SettingsError::Decode {
            reason: format!(
                "{} label bytes is not a multiple of {size} ({dtype:?})",
                bytes.len()
            ),
        });
    }
    Ok(bytes
        .chunks_exact(size)
        .map(|chunk| match dtype {
            RecordDtype::U8 => i64::from(chunk[0]),
            RecordDtype::I64 => i64::from_le_bytes(chunk.try_into().unwrap_or([0; 8])),
            RecordDtype::F32 => f32::from_le_bytes(chunk.try_into().unwrap_or([0; 4])) as i64,
        })
        .collect())
}

/// How a decoded example is processed.
#[derive(Clone, Debug)]
pub enum DataProcess {
    /// Per-image standardisation only.
    Standardize,
    /// Scale/crop/flip/colour augmentation, then standardisation.
    ImagenetAugment(ImagenetAugmentConfig),
}

impl DataProcess {
    /// Process a decoded image into a [`Sample`] with `channels` channels.
    pub fn process<R: Rng>(
        &self,
        image: &DynamicImage,
        channels: usize,
        label: Vec<i64>,
        rng: &mut R,
    ) -> Sample {
        let (width, height, channels, mut pixels) = match self {
            Self::Standardize if channels == 1 => {
                let gray = image.to_luma32f();
                (gray.width(), gray.height(), 1, gray.into_raw())
            }
            Self::Standardize => {
                let rgb = image.to_rgb32f();
                (rgb.width(), rgb.height(), 3, rgb.into_raw())
            }
            Self::ImagenetAugment(config) => {
                let rgb = config.augment(image, rng);
                (rgb.width(), rgb.height(), 3, rgb.into_raw())
            }
        };
        per_image_standardization(&mut pixels);
        Sample {
            pixels,
            shape: [height as usize, width as usize, channels],
            label,
        }
    }
}

/// Scale to zero mean and unit variance, with the standard deviation floored
/// at `1 / sqrt(N)` so uniform images do not divide by zero.
pub fn per_image_standardization(pixels: &mut [f32]) {
    if pixels.is_empty() {
        return;
    }
    let n = pixels.len() as f32;
    let mean = pixels.iter().sum::<f32>() / n;
    let variance = pixels.iter().map(|p| (p - mean).powi(2)).sum::<f32>() / n;
    let adjusted_std = variance.sqrt().max(1.0 / n.sqrt());
    for p in pixels.iter_mut() {
        *p = (*p - mean) / adjusted_std;
    }
}

/// ImageNet training augmentation (Inception-style colour distortion).
#[derive(Config, Debug)]
pub struct ImagenetAugmentConfig {
    /// Shorter side is rescaled to a size drawn from `[scale_min, scale_max)`.
    #[config(default = 256)]
    pub scale_min: u32,
    #[config(default = 480)]
    pub scale_max: u32,
    /// Side of the square random crop.
    #[config(default = 224)]
    pub crop_size: u32,
    #[config(default = 0.5)]
    pub flip_probability: f64,
    #[config(default = "32.0 / 255.0")]
    pub max_brightness_delta: f32,
    #[config(default = 0.5)]
    pub saturation_lower: f32,
    #[config(default = 1.5)]
    pub saturation_upper: f32,
    /// Fraction of a full hue turn.
    #[config(default = 0.2)]
    pub max_hue_delta: f32,
    #[config(default = 0.5)]
    pub contrast_lower: f32,
    #[config(default = 1.5)]
    pub contrast_upper: f32,
}

impl ImagenetAugmentConfig {
    /// Apply the augmentation, returning a `crop_size`² image in `[0, 1]`.
    ///
    /// Colour steps run on 8-bit RGB, so every channel saturates at the ends
    /// of the range after each step.
    pub fn augment<R: Rng>(&self, image: &DynamicImage, rng: &mut R) -> Rgb32FImage {
        let mut image = DynamicImage::ImageRgb8(image.to_rgb8());
        image = self.random_scale(&image, rng);
        image = self.random_crop(&image, rng);
        if rng.random_bool(self.flip_probability.clamp(0.0, 1.0)) {
            image = image.fliph();
        }

        let brightness = symmetric(rng, self.max_brightness_delta);
        image = image.brighten((brightness * 255.0).round() as i32);

        let saturation = ranged(rng, self.saturation_lower, self.saturation_upper);
        image = saturate(&image, saturation);

        let hue = symmetric(rng, self.max_hue_delta);
        image = image.huerotate((hue * 360.0).round() as i32);

        let contrast = ranged(rng, self.contrast_lower, self.contrast_upper);
        image = image.adjust_contrast(contrast_percent(contrast));

        image.to_rgb32f()
    }

    fn random_scale<R: Rng>(&self, image: &DynamicImage, rng: &mut R) -> DynamicImage {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return image.clone();
        }
        let target = if self.scale_max > self.scale_min {
            rng.random_range(self.scale_min..self.scale_max)
        } else {
            self.scale_min
        };
        let (new_width, new_height) = if width <= height {
            let h = (f64::from(height) * f64::from(target) / f64::from(width)).round() as u32;
            (target, h.max(1))
        } else {
            let w = (f64::from(width) * f64::from(target) / f64::from(height)).round() as u32;
            (w.max(1), target)
        };
        image.resize_exact(new_width, new_height, FilterType::Triangle)
    }

    fn random_crop<R: Rng>(&self, image: &DynamicImage, rng: &mut R) -> DynamicImage {
        let (width, height) = (image.width(), image.height());
        let size = self.crop_size;
        if width < size || height < size {
            return image.resize_exact(size, size, FilterType::Triangle);
        }
        let x = rng.random_range(0..=width - size);
        let y = rng.random_range(0..=height - size);
        image.crop_imm(x, y, size, size)
    }
}

fn symmetric<R: Rng>(rng: &mut R, max_delta: f32) -> f32 {
    let max_delta = max_delta.abs();
    if max_delta == 0.0 {
        0.0
    } else {
        rng.random_range(-max_delta..=max_delta)
    }
}

fn ranged<R: Rng>(rng: &mut R, lower: f32, upper: f32) -> f32 {
    if upper > lower {
        rng.random_range(lower..=upper)
    } else {
        lower
    }
}

/// `image` scales contrast by `((100 + percent) / 100)²`; invert that for a
/// plain contrast factor.
fn contrast_percent(factor: f32) -> f32 {
    (factor.max(0.0).sqrt() - 1.0) * 100.0
}

/// Move every pixel away from (or toward) its own luma by `factor`.
///
/// `image` has no saturation operation, so this blends with the grayscale
/// image: `0` gives gray, `1` the input.
fn saturate(image: &DynamicImage, factor: f32) -> DynamicImage {
    let gray = image.to_luma8();
    let mut rgb = image.to_rgb8();
    for (pixel, luma) in rgb.pixels_mut().zip(gray.pixels()) {
        let l = f32::from(luma.0[0]);
        for v in pixel.0.iter_mut() {
            *v = (l + (f32::from(*v) - l) * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
    DynamicImage::ImageRgb8(rgb)
}
