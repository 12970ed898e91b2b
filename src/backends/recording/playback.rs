// SPDX-License-Identifier: GPL-3.0-only

//! Sequential recording playback
//!
//! [`Playback`] reads a recording front to back and groups the blocks of the
//! color, depth and infrared tracks into captures. A capture starts at the
//! next block in file order and collects, for every other stream, the first
//! pending block that lies within half a frame period of it.

use super::calibration::{Calibration, ModeGeometry};
use super::ebml::{EbmlReader, ElementHeader};
use super::matroska::{
    self, BlockPayload, CODEC_MJPEG, CODEC_VFW, ContainerHeader, TRACK_TYPE_VIDEO, TrackInfo, ids,
};
use super::types::{
    Capture, ColorFormat, Image, ImageData, RecordConfiguration, Resolution, SampleFormat,
    SensorGeometry, StreamKind,
};
use super::FrameSource;
use crate::constants::{self, tags, track_names};
use crate::errors::RecordingError;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Upper bound on blocks buffered while completing a capture
const MAX_LOOKAHEAD: usize = 16;

/// How a track's block payload becomes an image
#[derive(Debug, Clone, Copy)]
enum PayloadLayout {
    Encoded,
    Gray16BigEndian,
    Gray16LittleEndian,
    /// Declared in the header but not decodable
    Unsupported,
}

#[derive(Debug, Clone, Copy)]
struct TrackBinding {
    kind: StreamKind,
    layout: PayloadLayout,
    resolution: Resolution,
}

/// An open recording being replayed
pub struct Playback {
    path: PathBuf,
    reader: Option<EbmlReader<BufReader<File>>>,
    segment_end: Option<u64>,
    timecode_scale_ns: u64,
    cluster_timecode: i64,
    bindings: HashMap<u64, TrackBinding>,
    configuration: RecordConfiguration,
    geometry: SensorGeometry,
    calibration: Option<Calibration>,
    half_frame_period_usec: i64,
    pending: VecDeque<Image>,
    blocks_read: u64,
}

impl Playback {
    /// Open a recording and read its header
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordingError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut reader = EbmlReader::new(BufReader::new(file))?;

        let segment = matroska::read_segment_header(&mut reader)?;
        let header = matroska::read_container_header(&mut reader, &segment)?;

        let bindings = bind_tracks(&header);
        let configuration = record_configuration(&header, &bindings);
        let calibration = load_calibration(&header, &configuration, &bindings);

        let track_resolution = |kind: StreamKind| {
            bindings
                .values()
                .find(|b| b.kind == kind)
                .map(|b| b.resolution)
        };
        let geometry = SensorGeometry {
            color: calibration
                .map(|c| c.color_camera.resolution)
                .or_else(|| track_resolution(StreamKind::Color)),
            depth: track_resolution(StreamKind::Depth),
            infrared: track_resolution(StreamKind::Infrared),
        };

        let fps = configuration.frames_per_second.max(1) as i64;
        info!(
            path = %path.display(),
            color = configuration.color_track_enabled,
            depth = configuration.depth_track_enabled,
            infrared = configuration.ir_track_enabled,
            fps,
            calibration = calibration.is_some(),
            "Opened recording"
        );

        Ok(Self {
            path,
            reader: Some(reader),
            segment_end: segment.end(),
            timecode_scale_ns: header.timecode_scale_ns,
            cluster_timecode: 0,
            bindings,
            configuration,
            geometry,
            calibration,
            half_frame_period_usec: 1_000_000 / fps / 2,
            pending: VecDeque::new(),
            blocks_read: 0,
        })
    }

    /// Release the file; further `advance` calls report end of stream
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!(path = %self.path.display(), blocks = self.blocks_read, "Closed recording");
        }
        self.pending.clear();
    }

    /// Read the next capture, `None` once the recording is exhausted
    pub fn advance(&mut self) -> Result<Option<Capture>, RecordingError> {
        let first = match self.pending.pop_front() {
            Some(image) => image,
            None => match self.next_image()? {
                Some(image) => image,
                None => return Ok(None),
            },
        };

        let anchor = first.device_timestamp_usec;
        let window_end = anchor + self.half_frame_period_usec;
        let mut capture = Capture::new();
        capture.insert(first);

        while self.pending.len() < MAX_LOOKAHEAD
            && self
                .pending
                .back()
                .is_none_or(|last| last.device_timestamp_usec < window_end)
        {
            match self.next_image()? {
                Some(image) => self.pending.push_back(image),
                None => break,
            }
        }

        for kind in StreamKind::ALL {
            if capture.has(kind) {
                continue;
            }
            let Some(position) = self.pending.iter().position(|i| i.kind == kind) else {
                continue;
            };
            let distance = (self.pending[position].device_timestamp_usec - anchor).abs();
            if distance < self.half_frame_period_usec
                && let Some(image) = self.pending.remove(position)
            {
                capture.insert(image);
            }
        }

        trace!(
            timestamp = anchor,
            images = capture.images().count(),
            pending = self.pending.len(),
            "Capture assembled"
        );
        Ok(Some(capture))
    }

    /// Next image of a bound track, in file order
    fn next_image(&mut self) -> Result<Option<Image>, RecordingError> {
        loop {
            let Some(block) = self.next_block()? else {
                return Ok(None);
            };
            let Some(binding) = self.bindings.get(&block.track_number).copied() else {
                continue;
            };

            // Block times start at zero, the start offset is the device clock origin
            let timestamp_ns = (self.cluster_timecode + block.relative_timecode as i64)
                * self.timecode_scale_ns as i64;
            let device_timestamp_usec =
                (timestamp_ns + self.configuration.start_offset_ns) / 1000;

            let data = decode_payload(binding.layout, block.data).ok_or_else(|| {
                RecordingError::InvalidBlock(format!(
                    "{} block at {} us cannot be decoded",
                    binding.kind, device_timestamp_usec
                ))
            })?;

            return Ok(Some(Image {
                kind: binding.kind,
                device_timestamp_usec,
                resolution: binding.resolution,
                data,
            }));
        }
    }

    /// Next block in file order, descending into clusters
    fn next_block(&mut self) -> Result<Option<BlockPayload>, RecordingError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        loop {
            if self.segment_end.is_some_and(|end| reader.position() >= end) {
                return Ok(None);
            }
            let Some(element) = reader.read_header()? else {
                return Ok(None);
            };
            match element.id {
                ids::CLUSTER => continue,
                ids::TIMECODE => {
                    self.cluster_timecode = reader.read_unsigned(element.known_size()?)? as i64;
                }
                ids::SIMPLE_BLOCK => {
                    let payload = reader.read_binary(element.known_size()?)?;
                    self.blocks_read += 1;
                    return matroska::parse_block(payload).map(Some);
                }
                ids::BLOCK_GROUP => {
                    let group = reader.read_binary(element.known_size()?)?;
                    if let Some(payload) = block_from_group(group)? {
                        self.blocks_read += 1;
                        return matroska::parse_block(payload).map(Some);
                    }
                }
                _ => skip_element(reader, &element)?,
            }
        }
    }
}

impl FrameSource for Playback {
    fn advance(&mut self) -> Result<Option<Capture>, RecordingError> {
        Playback::advance(self)
    }

    fn record_configuration(&self) -> &RecordConfiguration {
        &self.configuration
    }

    fn geometry(&self) -> &SensorGeometry {
        &self.geometry
    }

    fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.close();
    }
}

fn skip_element<R: std::io::Read + std::io::Seek>(
    reader: &mut EbmlReader<R>,
    element: &ElementHeader,
) -> Result<(), RecordingError> {
    trace!("Skipping element 0x{:X} at {}", element.id, element.offset);
    reader.skip(element.known_size()?)
}

/// Extract the Block payload from a BlockGroup payload
fn block_from_group(group: Vec<u8>) -> Result<Option<Vec<u8>>, RecordingError> {
    let end = group.len() as u64;
    let mut inner = EbmlReader::new(Cursor::new(group))?;
    let mut block = None;
    inner.for_each_child(end, |r, child| {
        let size = child.known_size()?;
        if child.id == ids::BLOCK && block.is_none() {
            block = Some(r.read_binary(size)?);
            Ok(())
        } else {
            r.skip(size)
        }
    })?;
    Ok(block)
}

fn decode_payload(layout: PayloadLayout, data: Vec<u8>) -> Option<ImageData> {
    match layout {
        PayloadLayout::Encoded => Some(ImageData::Encoded(Arc::from(data))),
        PayloadLayout::Gray16BigEndian => gray16_samples(&data, u16::from_be_bytes),
        PayloadLayout::Gray16LittleEndian => gray16_samples(&data, u16::from_le_bytes),
        PayloadLayout::Unsupported => None,
    }
}

fn gray16_samples(data: &[u8], from: fn([u8; 2]) -> u16) -> Option<ImageData> {
    if data.len() % 2 != 0 {
        return None;
    }
    let samples: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| from([pair[0], pair[1]]))
        .collect();
    Some(ImageData::Gray16(Arc::from(samples)))
}

fn stream_kind_for(track: &TrackInfo) -> Option<StreamKind> {
    match track.name.as_str() {
        track_names::COLOR => Some(StreamKind::Color),
        track_names::DEPTH => Some(StreamKind::Depth),
        track_names::INFRARED => Some(StreamKind::Infrared),
        _ => None,
    }
}

fn color_format(track: &TrackInfo) -> ColorFormat {
    if track.codec_id == CODEC_MJPEG {
        ColorFormat::Mjpeg
    } else if track.codec_id == CODEC_VFW
        && let Some(fourcc) = track.fourcc()
    {
        ColorFormat::Other(String::from_utf8_lossy(&fourcc).into_owned())
    } else {
        ColorFormat::Other(track.codec_id.clone())
    }
}

fn sample_format(track: &TrackInfo) -> SampleFormat {
    match track.fourcc() {
        Some(fourcc) if track.codec_id == CODEC_VFW => SampleFormat::from_fourcc(fourcc),
        _ => SampleFormat::Other(track.codec_id.clone()),
    }
}

fn bind_tracks(header: &ContainerHeader) -> HashMap<u64, TrackBinding> {
    let mut bindings = HashMap::new();
    for track in &header.tracks {
        let Some(kind) = stream_kind_for(track) else {
            debug!(number = track.number, name = %track.name, "Ignoring track");
            continue;
        };
        if track.track_type != 0 && track.track_type != TRACK_TYPE_VIDEO {
            warn!(name = %track.name, track_type = track.track_type, "Track is not video, ignoring");
            continue;
        }
        if bindings.values().any(|b: &TrackBinding| b.kind == kind) {
            warn!(name = %track.name, "Duplicate track, ignoring");
            continue;
        }

        let layout = match kind {
            StreamKind::Color => match color_format(track) {
                ColorFormat::Mjpeg => PayloadLayout::Encoded,
                ColorFormat::Other(_) => PayloadLayout::Unsupported,
            },
            StreamKind::Depth | StreamKind::Infrared => match sample_format(track) {
                SampleFormat::Gray16BigEndian => PayloadLayout::Gray16BigEndian,
                SampleFormat::Gray16LittleEndian => PayloadLayout::Gray16LittleEndian,
                SampleFormat::Other(_) => PayloadLayout::Unsupported,
            },
        };
        let (width, height) = track.dimensions().unwrap_or((0, 0));

        bindings.insert(
            track.number,
            TrackBinding {
                kind,
                layout,
                resolution: Resolution::new(width, height),
            },
        );
    }
    bindings
}

fn record_configuration(
    header: &ContainerHeader,
    bindings: &HashMap<u64, TrackBinding>,
) -> RecordConfiguration {
    let track = |name: &str| {
        header
            .track_named(name)
            .filter(|t| bindings.contains_key(&t.number))
    };

    let frames_per_second = header
        .tag(tags::FPS)
        .and_then(|fps| fps.strip_prefix("FPS_").unwrap_or(fps).parse::<u32>().ok())
        .filter(|&fps| fps > 0)
        .unwrap_or(constants::DEFAULT_FRAMES_PER_SECOND);

    let start_offset_ns = header
        .tag(tags::START_OFFSET_NS)
        .and_then(|offset| offset.trim().parse::<i64>().ok())
        .unwrap_or(0);

    RecordConfiguration {
        color_track_enabled: track(track_names::COLOR).is_some(),
        depth_track_enabled: track(track_names::DEPTH).is_some(),
        ir_track_enabled: track(track_names::INFRARED).is_some(),
        color_format: track(track_names::COLOR).map(color_format),
        depth_format: track(track_names::DEPTH).map(sample_format),
        ir_format: track(track_names::INFRARED).map(sample_format),
        depth_mode: header.tag(tags::DEPTH_MODE).map(str::to_string),
        color_mode: header.tag(tags::COLOR_MODE).map(str::to_string),
        frames_per_second,
        start_offset_ns,
    }
}

fn load_calibration(
    header: &ContainerHeader,
    configuration: &RecordConfiguration,
    bindings: &HashMap<u64, TrackBinding>,
) -> Option<Calibration> {
    let attachment = header.attachment(constants::CALIBRATION_ATTACHMENT)?;

    let recorded = |kinds: &[StreamKind]| {
        bindings
            .values()
            .find(|b| kinds.contains(&b.kind))
            .map(|b| b.resolution)
    };
    let geometry = |tagged: Option<ModeGeometry>, recorded: Option<Resolution>| match recorded {
        Some(resolution) => Some(ModeGeometry::resolve(tagged, resolution)),
        None => tagged,
    };

    let depth = geometry(
        configuration
            .depth_mode
            .as_deref()
            .and_then(ModeGeometry::for_depth_mode),
        recorded(&[StreamKind::Depth, StreamKind::Infrared]),
    );
    let color = geometry(
        configuration
            .color_mode
            .as_deref()
            .and_then(ModeGeometry::for_color_mode),
        recorded(&[StreamKind::Color]),
    );
    let (Some(depth), Some(color)) = (depth, color) else {
        warn!("Calibration present but camera modes are unknown, ignoring it");
        return None;
    };

    match Calibration::from_json(&attachment.data, depth, color) {
        Ok(calibration) => Some(calibration),
        Err(e) => {
            warn!(error = %e, "Failed to read calibration attachment");
            None
        }
    }
}
