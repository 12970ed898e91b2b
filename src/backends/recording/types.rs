// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for recording playback

use std::fmt;
use std::sync::Arc;

/// Stream kinds carried by a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKind {
    Color,
    Depth,
    Infrared,
}

impl StreamKind {
    /// All stream kinds in export order
    pub const ALL: [StreamKind; 3] = [StreamKind::Color, StreamKind::Depth, StreamKind::Infrared];

    /// Output subdirectory name (also the preview window name)
    pub fn dir_name(&self) -> &'static str {
        match self {
            StreamKind::Color => "color",
            StreamKind::Depth => "depth",
            StreamKind::Infrared => "infrared",
        }
    }

    /// Index into per-stream arrays
    pub fn index(&self) -> usize {
        match self {
            StreamKind::Color => 0,
            StreamKind::Depth => 1,
            StreamKind::Infrared => 2,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Pixel dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Image payload, reference counted so it can outlive the capture it came from
#[derive(Clone)]
pub enum ImageData {
    /// Compressed bytes (MJPEG color)
    Encoded(Arc<[u8]>),
    /// Single channel 16-bit raster (depth, infrared)
    Gray16(Arc<[u16]>),
}

impl ImageData {
    /// Number of elements (bytes or samples)
    pub fn len(&self) -> usize {
        match self {
            ImageData::Encoded(bytes) => bytes.len(),
            ImageData::Gray16(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageData::Encoded(bytes) => write!(f, "ImageData::Encoded({} bytes)", bytes.len()),
            ImageData::Gray16(samples) => {
                write!(f, "ImageData::Gray16({} samples)", samples.len())
            }
        }
    }
}

/// One stream's image inside a capture
#[derive(Debug, Clone)]
pub struct Image {
    pub kind: StreamKind,
    /// Sensor-clock timestamp in microseconds
    pub device_timestamp_usec: i64,
    pub resolution: Resolution,
    pub data: ImageData,
}

/// One synchronized snapshot: at most one image per stream kind
#[derive(Debug, Default)]
pub struct Capture {
    images: [Option<Image>; 3],
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Image of the given kind, if the capture holds one
    pub fn image(&self, kind: StreamKind) -> Option<&Image> {
        self.images[kind.index()].as_ref()
    }

    pub fn has(&self, kind: StreamKind) -> bool {
        self.images[kind.index()].is_some()
    }

    /// Store an image, returning the one it replaced
    pub fn insert(&mut self, image: Image) -> Option<Image> {
        let slot = image.kind.index();
        self.images[slot].replace(image)
    }

    pub fn is_empty(&self) -> bool {
        self.images.iter().all(Option::is_none)
    }

    /// Images in export order
    pub fn images(&self) -> impl Iterator<Item = &Image> {
        self.images.iter().flatten()
    }
}

/// Color codecs a recording may declare
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorFormat {
    Mjpeg,
    /// Anything else, by codec id or FOURCC
    Other(String),
}

/// Sample layouts of the 16-bit depth and infrared tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleFormat {
    /// FOURCC `b16g`
    Gray16BigEndian,
    /// FOURCC `Y16 `
    Gray16LittleEndian,
    Other(String),
}

impl SampleFormat {
    pub fn from_fourcc(fourcc: [u8; 4]) -> Self {
        match &fourcc {
            b"b16g" => SampleFormat::Gray16BigEndian,
            b"Y16 " => SampleFormat::Gray16LittleEndian,
            other => SampleFormat::Other(String::from_utf8_lossy(other).into_owned()),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, SampleFormat::Other(_))
    }
}

/// Track configuration read once from the recording header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordConfiguration {
    pub color_track_enabled: bool,
    pub depth_track_enabled: bool,
    pub ir_track_enabled: bool,
    pub color_format: Option<ColorFormat>,
    pub depth_format: Option<SampleFormat>,
    pub ir_format: Option<SampleFormat>,
    /// Depth mode tag, e.g. `NFOV_UNBINNED`
    pub depth_mode: Option<String>,
    /// Color mode tag, e.g. `MJPG_1080P`
    pub color_mode: Option<String>,
    pub frames_per_second: u32,
    /// Device-clock origin in nanoseconds
    pub start_offset_ns: i64,
}

impl RecordConfiguration {
    pub fn is_enabled(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Color => self.color_track_enabled,
            StreamKind::Depth => self.depth_track_enabled,
            StreamKind::Infrared => self.ir_track_enabled,
        }
    }
}

/// Per-stream frame geometry
///
/// `color` is the color camera's pixel grid, which is also the target of
/// the depth transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorGeometry {
    pub color: Option<Resolution>,
    pub depth: Option<Resolution>,
    pub infrared: Option<Resolution>,
}

impl SensorGeometry {
    pub fn resolution(&self, kind: StreamKind) -> Option<Resolution> {
        match kind {
            StreamKind::Color => self.color,
            StreamKind::Depth => self.depth,
            StreamKind::Infrared => self.infrared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_image(kind: StreamKind, ts: i64) -> Image {
        Image {
            kind,
            device_timestamp_usec: ts,
            resolution: Resolution::new(2, 1),
            data: ImageData::Gray16(Arc::from(vec![1u16, 2])),
        }
    }

    #[test]
    fn test_capture_holds_one_image_per_kind() {
        let mut capture = Capture::new();
        assert!(capture.is_empty());

        assert!(capture.insert(gray_image(StreamKind::Depth, 10)).is_none());
        let replaced = capture.insert(gray_image(StreamKind::Depth, 20));
        assert_eq!(replaced.map(|i| i.device_timestamp_usec), Some(10));

        assert!(capture.has(StreamKind::Depth));
        assert!(!capture.has(StreamKind::Color));
        assert_eq!(capture.images().count(), 1);
    }

    #[test]
    fn test_sample_format_from_fourcc() {
        assert_eq!(SampleFormat::from_fourcc(*b"b16g"), SampleFormat::Gray16BigEndian);
        assert_eq!(SampleFormat::from_fourcc(*b"Y16 "), SampleFormat::Gray16LittleEndian);
        assert!(!SampleFormat::from_fourcc(*b"YUY2").is_supported());
    }

    #[test]
    fn test_dir_names() {
        let names: Vec<_> = StreamKind::ALL.iter().map(|k| k.dir_name()).collect();
        assert_eq!(names, vec!["color", "depth", "infrared"]);
    }
}
