// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the nose embedding model
//!
//! Steps, in order:
//! 1. Decode the uploaded bytes
//! 2. Optionally extract a centered square crop (the nose is assumed centered)
//! 3. Convert to the configured channel count (grayscale or RGB)
//! 4. Resize to `target_size x target_size` with bicubic interpolation
//! 5. Normalize pixels to [0, 1]
//! 6. Arrange into a batch-of-one tensor, NHWC or NCHW

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, Luma};
use ndarray::Array4;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::image_utils::{decode_image_bytes, ImageError};

/// Channel count the model consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputChannels {
    /// Single luma channel
    Grayscale,
    /// Three channels, RGB order
    Rgb,
}

impl InputChannels {
    pub fn count(self) -> usize {
        match self {
            InputChannels::Grayscale => 1,
            InputChannels::Rgb => 3,
        }
    }
}

impl FromStr for InputChannels {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "l" | "gray" | "grayscale" => Ok(InputChannels::Grayscale),
            "3" | "rgb" => Ok(InputChannels::Rgb),
            other => Err(format!("expected 1 or 3 channels, got {}", other)),
        }
    }
}

/// Memory layout of the input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// [batch, height, width, channels]
    Nhwc,
    /// [batch, channels, height, width]
    Nchw,
}

impl FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nhwc" => Ok(TensorLayout::Nhwc),
            "nchw" => Ok(TensorLayout::Nchw),
            other => Err(format!("expected nhwc or nchw, got {}", other)),
        }
    }
}

impl fmt::Display for TensorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorLayout::Nhwc => write!(f, "nhwc"),
            TensorLayout::Nchw => write!(f, "nchw"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Width and height of the model input
    pub target_size: u32,
    pub channels: InputChannels,
    pub layout: TensorLayout,
    /// Side of the center crop as a fraction of the shorter image side
    pub center_crop_ratio: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_size: 96,
            channels: InputChannels::Grayscale,
            layout: TensorLayout::Nhwc,
            center_crop_ratio: 0.6,
        }
    }
}

/// Turns uploaded images into fixed-shape model input tensors
///
/// Stateless apart from its configuration, so one instance is shared by
/// every worker.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Shape of every tensor this preprocessor produces
    pub fn input_shape(&self) -> [usize; 4] {
        let size = self.config.target_size as usize;
        let channels = self.config.channels.count();
        match self.config.layout {
            TensorLayout::Nhwc => [1, size, size, channels],
            TensorLayout::Nchw => [1, channels, size, size],
        }
    }

    /// Decode and preprocess raw image bytes
    ///
    /// # Errors
    /// Returns `ImageError` for empty, oversized, unrecognised or corrupt data.
    pub fn preprocess(&self, bytes: &[u8], crop_enabled: bool) -> Result<Array4<f32>, ImageError> {
        let (image, info) = decode_image_bytes(bytes)?;
        debug!(
            "Decoded {:?} image {}x{} ({} bytes)",
            info.format, info.width, info.height, info.size_bytes
        );
        self.preprocess_image(&image, crop_enabled)
    }

    /// Preprocess an already decoded image
    pub fn preprocess_image(
        &self,
        image: &DynamicImage,
        crop_enabled: bool,
    ) -> Result<Array4<f32>, ImageError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ImageError::EmptyDimensions);
        }

        let cropped;
        let source = if crop_enabled {
            cropped = center_square_crop(image, self.config.center_crop_ratio);
            debug!(
                "Center crop applied: {}x{} -> {}x{} (ratio {:.2})",
                width,
                height,
                cropped.width(),
                cropped.height(),
                self.config.center_crop_ratio
            );
            &cropped
        } else {
            image
        };

        let size = self.config.target_size;
        let converted = match self.config.channels {
            InputChannels::Grayscale => DynamicImage::ImageLuma8(to_luma_601(source)),
            InputChannels::Rgb => DynamicImage::ImageRgb8(source.to_rgb8()),
        };
        let resized = if converted.dimensions() == (size, size) {
            converted
        } else {
            converted.resize_exact(size, size, FilterType::CatmullRom)
        };

        // Raw buffers are row-major with interleaved channels, i.e. HWC
        let raw = match self.config.channels {
            InputChannels::Grayscale => resized.into_luma8().into_raw(),
            InputChannels::Rgb => resized.into_rgb8().into_raw(),
        };
        let normalized: Vec<f32> = raw.into_iter().map(|p| p as f32 / 255.0).collect();

        let side = size as usize;
        let channels = self.config.channels.count();
        let nhwc = Array4::from_shape_vec((1, side, side, channels), normalized)
            .map_err(|e| ImageError::DecodeFailed(format!("tensor shape error: {}", e)))?;

        let tensor = match self.config.layout {
            TensorLayout::Nhwc => nhwc,
            TensorLayout::Nchw => nhwc
                .permuted_axes([0, 3, 1, 2])
                .as_standard_layout()
                .to_owned(),
        };

        debug!("Preprocessed tensor shape: {:?}", tensor.shape());
        Ok(tensor)
    }
}

/// Grayscale with ITU-R 601-2 luma weights: L = (299 R + 587 G + 114 B) / 1000
///
/// These are the weights the model was trained with; `DynamicImage::to_luma8`
/// uses Rec. 709. Alpha is dropped.
pub fn to_luma_601(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
        Luma([luma as u8])
    })
}

/// Extract a centered square whose side is `ratio` of the shorter image side
pub fn center_square_crop(image: &DynamicImage, ratio: f32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let shorter = width.min(height);
    let side = ((shorter as f32 * ratio).round() as u32).clamp(1, shorter.max(1));

    let left = (width - side) / 2;
    let top = (height - side) / 2;

    image.crop_imm(left, top, side, side)
}
