// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image decoding and preprocessing for nose embeddings

pub mod image_utils;
pub mod preprocessing;

pub use image_utils::{decode_image_bytes, detect_format, format_from_hint, ImageError, ImageInfo};
pub use preprocessing::{
    center_square_crop, to_luma_601, ImagePreprocessor, InputChannels, PreprocessConfig, TensorLayout,
};
