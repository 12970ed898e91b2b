// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for frame sources
//!
//! # Modules
//!
//! - [`recording`]: Matroska recordings from multi-sensor depth cameras

pub mod recording;
