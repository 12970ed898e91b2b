// SPDX-License-Identifier: GPL-3.0-only

//! Depth and infrared scaling constants
//!
//! Values used by export rescaling and the preview rasters.

/// Depth (millimeters) mapped to black when scaling to 8 bits
pub const DEPTH_SCALE_FAR_MM: f32 = 5000.0;

/// Depth mapped to white when scaling to 8 bits
pub const DEPTH_SCALE_NEAR_MM: f32 = 0.0;

/// Linear factor applied to raw infrared samples before 8-bit export
pub const INFRARED_SCALE: f32 = 0.5;

/// Invalid depth marker
pub const DEPTH_INVALID_MM: u16 = 0;

/// Footprints wider or taller than this (color pixels) are dropped while remapping
pub const MAX_SPLAT_EXTENT: f32 = 32.0;
