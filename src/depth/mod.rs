// SPDX-License-Identifier: GPL-3.0-only

//! Depth processing on the CPU
//!
//! - [`registration`]: reprojection of depth frames into the color camera
//! - [`visualization`]: 8-bit rescaling for export and preview

mod constants;
pub mod registration;
pub mod visualization;

pub use constants::*;
pub use registration::DepthRemapper;
pub use visualization::{gray_to_rgb, scale_depth_to_8bit, scale_infrared_to_8bit};
