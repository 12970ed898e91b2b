// SPDX-License-Identifier: GPL-3.0-only

//! Per-stream encode policies
//!
//! - Color: recorded MJPEG bytes, written verbatim as `.jpg`
//! - Depth: 16-bit lossless PNG, or 8-bit PNG when scaling is requested
//! - Infrared: rescaled to 8 bits, then JPEG at the configured quality

use super::queue::StreamFrame;
use crate::backends::recording::types::{ImageData, StreamKind};
use crate::depth::{scale_depth_to_8bit, scale_infrared_to_8bit};
use crate::errors::ExportError;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::sync::Arc;

/// Turns a popped frame into file contents
pub trait FrameEncoder: Send + 'static {
    /// Stream this encoder handles
    fn kind(&self) -> StreamKind;

    /// File extension without the dot
    fn extension(&self) -> &'static str;

    fn encode(&self, frame: &StreamFrame) -> Result<Vec<u8>, ExportError>;
}

/// Samples of a raw frame, checked against its resolution
fn gray16_samples(frame: &StreamFrame) -> Result<&Arc<[u16]>, ExportError> {
    let ImageData::Gray16(samples) = &frame.data else {
        return Err(ExportError::UnexpectedPayload("16-bit samples"));
    };
    let expected = frame.resolution.pixel_count();
    if samples.len() != expected {
        return Err(ExportError::GeometryMismatch {
            expected,
            actual: samples.len(),
        });
    }
    Ok(samples)
}

/// Color frames are already JPEG
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorPassthrough;

impl FrameEncoder for ColorPassthrough {
    fn kind(&self) -> StreamKind {
        StreamKind::Color
    }

    fn extension(&self) -> &'static str {
        "jpg"
    }

    fn encode(&self, frame: &StreamFrame) -> Result<Vec<u8>, ExportError> {
        match &frame.data {
            ImageData::Encoded(bytes) => Ok(bytes.to_vec()),
            ImageData::Gray16(_) => Err(ExportError::UnexpectedPayload("compressed color")),
        }
    }
}

/// Depth frames as lossless PNG
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthPngEncoder {
    /// Rescale to 8 bits (near = bright) instead of keeping millimeters
    pub scale_to_8bit: bool,
}

impl FrameEncoder for DepthPngEncoder {
    fn kind(&self) -> StreamKind {
        StreamKind::Depth
    }

    fn extension(&self) -> &'static str {
        "png"
    }

    fn encode(&self, frame: &StreamFrame) -> Result<Vec<u8>, ExportError> {
        let samples = gray16_samples(frame)?;
        let (width, height) = (frame.resolution.width, frame.resolution.height);

        let mut buffer = Vec::new();
        let encoder = PngEncoder::new(&mut buffer);
        let result = if self.scale_to_8bit {
            let gray = scale_depth_to_8bit(samples);
            encoder.write_image(&gray, width, height, ExtendedColorType::L8)
        } else {
            // PngEncoder takes 16-bit samples in native byte order
            encoder.write_image(
                bytemuck::cast_slice::<u16, u8>(&samples[..]),
                width,
                height,
                ExtendedColorType::L16,
            )
        };
        result.map_err(|e| ExportError::EncodingFailed(format!("PNG: {}", e)))?;
        Ok(buffer)
    }
}

/// Infrared frames as 8-bit JPEG
#[derive(Debug, Clone, Copy)]
pub struct InfraredJpegEncoder {
    /// JPEG quality, 0-100
    pub quality: u8,
}

impl FrameEncoder for InfraredJpegEncoder {
    fn kind(&self) -> StreamKind {
        StreamKind::Infrared
    }

    fn extension(&self) -> &'static str {
        "jpg"
    }

    fn encode(&self, frame: &StreamFrame) -> Result<Vec<u8>, ExportError> {
        let samples = gray16_samples(frame)?;
        let gray = scale_infrared_to_8bit(samples);

        let mut buffer = Vec::new();
        // The JPEG encoder rejects quality 0
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, self.quality.clamp(1, 100));
        encoder
            .encode(
                &gray,
                frame.resolution.width,
                frame.resolution.height,
                ExtendedColorType::L8,
            )
            .map_err(|e| ExportError::EncodingFailed(format!("JPEG: {}", e)))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::recording::types::Resolution;

    fn gray_frame(kind: StreamKind, width: u32, height: u32, samples: Vec<u16>) -> StreamFrame {
        StreamFrame {
            kind,
            device_timestamp_usec: 0,
            resolution: Resolution::new(width, height),
            data: ImageData::Gray16(Arc::from(samples)),
        }
    }

    #[test]
    fn test_color_is_written_verbatim() {
        let frame = StreamFrame {
            kind: StreamKind::Color,
            device_timestamp_usec: 0,
            resolution: Resolution::new(1, 1),
            data: ImageData::Encoded(Arc::from(vec![0xFF, 0xD8, 0xFF, 0xD9])),
        };
        assert_eq!(
            ColorPassthrough.encode(&frame).unwrap(),
            vec![0xFF, 0xD8, 0xFF, 0xD9]
        );
    }

    #[test]
    fn test_depth_png_keeps_16_bits() {
        let frame = gray_frame(StreamKind::Depth, 3, 1, vec![0, 1234, 65535]);
        let png = DepthPngEncoder::default().encode(&frame).unwrap();

        let decoded = image::load_from_memory(&png).unwrap().into_luma16();
        assert_eq!(decoded.dimensions(), (3, 1));
        assert_eq!(decoded.into_raw(), vec![0, 1234, 65535]);
    }

    #[test]
    fn test_depth_png_scaled() {
        let frame = gray_frame(StreamKind::Depth, 2, 1, vec![0, 6000]);
        let encoder = DepthPngEncoder {
            scale_to_8bit: true,
        };
        let decoded = image::load_from_memory(&encoder.encode(&frame).unwrap())
            .unwrap()
            .into_luma8();
        assert_eq!(decoded.into_raw(), vec![255, 0]);
    }

    #[test]
    fn test_infrared_jpeg_dimensions() {
        let frame = gray_frame(StreamKind::Infrared, 8, 4, vec![300; 32]);
        let jpeg = InfraredJpegEncoder { quality: 0 }.encode(&frame).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
    }

    #[test]
    fn test_geometry_mismatch() {
        let frame = gray_frame(StreamKind::Depth, 4, 4, vec![0; 3]);
        assert!(matches!(
            DepthPngEncoder::default().encode(&frame),
            Err(ExportError::GeometryMismatch {
                expected: 16,
                actual: 3
            })
        ));
    }
}
