// SPDX-License-Identifier: GPL-3.0-only

//! Processing pipelines
//!
//! - [`export`]: recording to per-stream image files

pub mod export;
