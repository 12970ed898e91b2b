// SPDX-License-Identifier: GPL-3.0-only

//! Linear 8-bit rescaling
//!
//! - Depth: near = bright, far = dark, clamped to the scaling range
//! - Infrared: fixed linear factor, clamped to 0..=255
//! - Grayscale to RGB expansion for preview rasters

use super::constants::{DEPTH_SCALE_FAR_MM, DEPTH_SCALE_NEAR_MM, INFRARED_SCALE};

/// Rescale one depth sample (millimeters) to 8 bits
///
/// `near` maps to 255 and `far` (or anything beyond it) maps to 0.
/// Halves round to even.
#[inline]
pub fn depth_sample_to_8bit(depth_mm: u16) -> u8 {
    let alpha = -255.0 / (DEPTH_SCALE_FAR_MM - DEPTH_SCALE_NEAR_MM);
    let value = (depth_mm as f32 - DEPTH_SCALE_NEAR_MM) * alpha + 255.0;
    value.round_ties_even().clamp(0.0, 255.0) as u8
}

/// Rescale one raw infrared sample to 8 bits
#[inline]
pub fn infrared_sample_to_8bit(raw: u16) -> u8 {
    (raw as f32 * INFRARED_SCALE)
        .round_ties_even()
        .clamp(0.0, 255.0) as u8
}

/// Rescale a depth raster to 8 bits
pub fn scale_depth_to_8bit(depth_mm: &[u16]) -> Vec<u8> {
    depth_mm.iter().map(|&d| depth_sample_to_8bit(d)).collect()
}

/// Rescale an infrared raster to 8 bits
pub fn scale_infrared_to_8bit(raw: &[u16]) -> Vec<u8> {
    raw.iter().map(|&v| infrared_sample_to_8bit(v)).collect()
}

/// Expand 8-bit grayscale to packed RGB
pub fn gray_to_rgb(gray: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(gray.len() * 3);
    for &value in gray {
        rgb.extend_from_slice(&[value, value, value]);
    }
    rgb
}
