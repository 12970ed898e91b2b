// SPDX-License-Identifier: GPL-3.0-only

//! Recording playback backend
//!
//! Reads multi-sensor Matroska recordings and yields synchronized captures.
//!
//! # Architecture
//!
//! ```text
//! ebml        element headers and payloads
//! matroska    segment header: tracks, tags, attachments, blocks
//! calibration camera intrinsics/extrinsics from the attachment
//! playback    sequential capture assembly (FrameSource)
//! ```

pub mod calibration;
pub mod ebml;
pub mod matroska;
pub mod playback;
pub mod types;

pub use calibration::Calibration;
pub use playback::Playback;
pub use types::*;

use crate::errors::RecordingError;

/// Sequential source of captures
///
/// Implemented by [`Playback`] for recordings on disk, and by test doubles.
pub trait FrameSource {
    /// Move forward exactly one capture
    ///
    /// Returns `Ok(None)` at end of stream. There is no rewinding.
    fn advance(&mut self) -> Result<Option<Capture>, RecordingError>;

    /// Track configuration from the recording header
    fn record_configuration(&self) -> &RecordConfiguration;

    /// Frame geometry of each stream and of the color camera
    fn geometry(&self) -> &SensorGeometry;

    /// Calibration, if the recording carries one
    fn calibration(&self) -> Option<&Calibration>;
}
