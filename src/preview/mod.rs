// SPDX-License-Identifier: GPL-3.0-only

//! Live preview of exported frames
//!
//! The ingestion loop hands each frame it queues to a [`PreviewSink`] as an
//! RGB raster, one named window per stream. Preview never touches the
//! export queues and has no effect on the files written.

pub mod terminal;

pub use terminal::TerminalPreview;

use crate::backends::recording::types::{ImageData, StreamKind};
use crate::depth::{gray_to_rgb, scale_depth_to_8bit, scale_infrared_to_8bit};
use crate::pipelines::export::StreamFrame;
use std::io;
use tracing::debug;

/// Packed RGB image ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRaster {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes
    pub rgb: Vec<u8>,
}

impl PreviewRaster {
    /// Build a displayable raster from a queued frame
    ///
    /// Color is decoded from JPEG, depth and infrared use the same 8-bit
    /// rescaling as export. Returns `None` if the frame cannot be shown.
    pub fn from_frame(frame: &StreamFrame) -> Option<Self> {
        let (width, height) = (frame.resolution.width, frame.resolution.height);
        match (&frame.data, frame.kind) {
            (ImageData::Encoded(bytes), _) => match image::load_from_memory(bytes) {
                Ok(decoded) => {
                    let rgb = decoded.into_rgb8();
                    Some(Self {
                        width: rgb.width(),
                        height: rgb.height(),
                        rgb: rgb.into_raw(),
                    })
                }
                Err(e) => {
                    debug!(stream = %frame.kind, error = %e, "Skipping undecodable preview frame");
                    None
                }
            },
            (ImageData::Gray16(samples), kind) => {
                if samples.len() != frame.resolution.pixel_count() || samples.is_empty() {
                    return None;
                }
                let gray = match kind {
                    StreamKind::Infrared => scale_infrared_to_8bit(samples),
                    _ => scale_depth_to_8bit(samples),
                };
                Some(Self {
                    width,
                    height,
                    rgb: gray_to_rgb(&gray),
                })
            }
        }
    }

    /// RGB value at `(x, y)`, clamped to the raster edges
    pub fn pixel(&self, x: u32, y: u32) -> (u8, u8, u8) {
        if self.width == 0 || self.height == 0 {
            return (0, 0, 0);
        }
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        let idx = (y * self.width as usize + x) * 3;
        match self.rgb.get(idx..idx + 3) {
            Some(px) => (px[0], px[1], px[2]),
            None => (0, 0, 0),
        }
    }
}

/// Keys the preview reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewKey {
    /// Stop ingesting (queued frames are still written)
    Quit,
    Other,
}

/// Display collaborator for the preview
pub trait PreviewSink {
    /// Show (or replace) the raster in the named window
    fn show_image(&mut self, window: &str, raster: PreviewRaster) -> io::Result<()>;

    /// Refresh the display and return a pending key press, if any
    fn poll_key(&mut self) -> io::Result<Option<PreviewKey>>;
}

/// Window title for a stream
pub fn window_name(kind: StreamKind, transformed: bool) -> &'static str {
    match kind {
        StreamKind::Depth if transformed => "transformed depth",
        kind => kind.dir_name(),
    }
}
