// SPDX-License-Identifier: GPL-3.0-only

//! Matroska structure: element ids, header parsing and block parsing
//!
//! Only the parts a recording needs are interpreted: segment info, tracks,
//! tags and attachments before the first cluster, then blocks.

use super::ebml::{read_vint, EbmlReader, ElementHeader};
use crate::errors::RecordingError;
use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::{debug, trace};

/// Element ids (marker bits included)
pub mod ids {
    pub const EBML: u32 = 0x1A45DFA3;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const SEGMENT: u32 = 0x18538067;
    pub const INFO: u32 = 0x1549A966;
    pub const TIMECODE_SCALE: u32 = 0x2AD7B1;
    pub const TRACKS: u32 = 0x1654AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const NAME: u32 = 0x536E;
    pub const CODEC_ID: u32 = 0x86;
    pub const CODEC_PRIVATE: u32 = 0x63A2;
    pub const VIDEO: u32 = 0xE0;
    pub const PIXEL_WIDTH: u32 = 0xB0;
    pub const PIXEL_HEIGHT: u32 = 0xBA;
    pub const CLUSTER: u32 = 0x1F43B675;
    pub const TIMECODE: u32 = 0xE7;
    pub const SIMPLE_BLOCK: u32 = 0xA3;
    pub const BLOCK_GROUP: u32 = 0xA0;
    pub const BLOCK: u32 = 0xA1;
    pub const ATTACHMENTS: u32 = 0x1941A469;
    pub const ATTACHED_FILE: u32 = 0x61A7;
    pub const FILE_NAME: u32 = 0x466E;
    pub const FILE_DATA: u32 = 0x465C;
    pub const TAGS: u32 = 0x1254C367;
    pub const TAG: u32 = 0x7373;
    pub const SIMPLE_TAG: u32 = 0x67C8;
    pub const TAG_NAME: u32 = 0x45A3;
    pub const TAG_STRING: u32 = 0x4487;
}

/// Matroska TrackType for video tracks
pub const TRACK_TYPE_VIDEO: u64 = 1;

/// Default TimecodeScale: timecodes in milliseconds
pub const DEFAULT_TIMECODE_SCALE_NS: u64 = 1_000_000;

/// Codec id of Video-for-Windows compatible tracks
pub const CODEC_VFW: &str = "V_MS/VFW/FOURCC";

/// Codec id of motion JPEG tracks
pub const CODEC_MJPEG: &str = "V_MJPEG";

/// One track entry
#[derive(Debug, Clone, Default)]
pub struct TrackInfo {
    pub number: u64,
    pub track_type: u64,
    pub name: String,
    pub codec_id: String,
    pub codec_private: Vec<u8>,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl TrackInfo {
    /// Compression FOURCC from a BITMAPINFOHEADER codec private block
    pub fn fourcc(&self) -> Option<[u8; 4]> {
        let bytes = self.codec_private.get(16..20)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Track dimensions, falling back to the BITMAPINFOHEADER
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        if self.pixel_width > 0 && self.pixel_height > 0 {
            return Some((self.pixel_width, self.pixel_height));
        }
        let header = self.codec_private.get(4..12)?;
        let width = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let height = i32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        (width > 0 && height != 0).then(|| (width as u32, height.unsigned_abs()))
    }
}

/// File attached to the segment
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub data: Vec<u8>,
}

/// Everything read before the first cluster
#[derive(Debug, Clone)]
pub struct ContainerHeader {
    pub timecode_scale_ns: u64,
    pub tracks: Vec<TrackInfo>,
    pub tags: HashMap<String, String>,
    pub attachments: Vec<Attachment>,
    /// Offset of the first cluster header, `None` for a recording without frames
    pub first_cluster_offset: Option<u64>,
}

impl ContainerHeader {
    pub fn track_named(&self, name: &str) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.name == name)
    }

    pub fn attachment(&self, name: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.name == name)
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }
}

/// Block header fields plus the frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPayload {
    pub track_number: u64,
    /// Timecode relative to the enclosing cluster
    pub relative_timecode: i16,
    pub data: Vec<u8>,
}

/// Split a (Simple)Block payload into header fields and frame data
pub fn parse_block(mut payload: Vec<u8>) -> Result<BlockPayload, RecordingError> {
    let (track_number, length) = read_vint(&payload)
        .ok_or_else(|| RecordingError::InvalidBlock("bad track number".to_string()))?;
    if payload.len() < length + 3 {
        return Err(RecordingError::InvalidBlock(format!(
            "block of {} bytes is too short",
            payload.len()
        )));
    }
    let relative_timecode = i16::from_be_bytes([payload[length], payload[length + 1]]);
    let flags = payload[length + 2];
    if flags & 0x06 != 0 {
        return Err(RecordingError::InvalidBlock(format!(
            "laced block on track {} is not supported",
            track_number
        )));
    }
    let data = payload.split_off(length + 3);
    Ok(BlockPayload {
        track_number,
        relative_timecode,
        data,
    })
}

/// Check the EBML header and return the Segment header
pub fn read_segment_header<R: Read + Seek>(
    reader: &mut EbmlReader<R>,
) -> Result<ElementHeader, RecordingError> {
    let header = reader
        .read_header()?
        .filter(|h| h.id == ids::EBML)
        .ok_or_else(|| RecordingError::NotMatroska("missing EBML header".to_string()))?;

    let mut doc_type = String::new();
    let end = header.data_offset + header.known_size()?;
    reader.for_each_child(end, |r, child| {
        if child.id == ids::DOC_TYPE {
            doc_type = r.read_string(child.known_size()?)?;
            Ok(())
        } else {
            r.skip(child.known_size()?)
        }
    })?;

    if doc_type != "matroska" && doc_type != "webm" {
        return Err(RecordingError::NotMatroska(format!(
            "document type '{}'",
            doc_type
        )));
    }

    loop {
        let child = reader
            .read_header()?
            .ok_or_else(|| RecordingError::Malformed("missing Segment".to_string()))?;
        if child.id == ids::SEGMENT {
            return Ok(child);
        }
        reader.skip(child.known_size()?)?;
    }
}

/// Read segment-level metadata up to the first cluster
///
/// Leaves the reader positioned at the first cluster (or the segment end).
pub fn read_container_header<R: Read + Seek>(
    reader: &mut EbmlReader<R>,
    segment: &ElementHeader,
) -> Result<ContainerHeader, RecordingError> {
    let mut header = ContainerHeader {
        timecode_scale_ns: DEFAULT_TIMECODE_SCALE_NS,
        tracks: Vec::new(),
        tags: HashMap::new(),
        attachments: Vec::new(),
        first_cluster_offset: None,
    };
    let segment_end = segment.end();

    while segment_end.is_none_or(|end| reader.position() < end) {
        let Some(child) = reader.read_header()? else {
            break;
        };
        match child.id {
            ids::CLUSTER => {
                header.first_cluster_offset = Some(child.offset);
                reader.seek_to(child.offset)?;
                break;
            }
            ids::INFO => read_info(reader, &child, &mut header)?,
            ids::TRACKS => read_tracks(reader, &child, &mut header)?,
            ids::TAGS => read_tags(reader, &child, &mut header)?,
            ids::ATTACHMENTS => read_attachments(reader, &child, &mut header)?,
            id => {
                trace!("Skipping segment element 0x{:X}", id);
                reader.skip(child.known_size()?)?;
            }
        }
    }

    debug!(
        tracks = header.tracks.len(),
        tags = header.tags.len(),
        attachments = header.attachments.len(),
        timecode_scale_ns = header.timecode_scale_ns,
        "Read container header"
    );
    Ok(header)
}

fn read_info<R: Read + Seek>(
    reader: &mut EbmlReader<R>,
    info: &ElementHeader,
    header: &mut ContainerHeader,
) -> Result<(), RecordingError> {
    let end = info.data_offset + info.known_size()?;
    reader.for_each_child(end, |r, child| {
        if child.id == ids::TIMECODE_SCALE {
            let scale = r.read_unsigned(child.known_size()?)?;
            if scale > 0 {
                header.timecode_scale_ns = scale;
            }
            Ok(())
        } else {
            r.skip(child.known_size()?)
        }
    })
}

fn read_tracks<R: Read + Seek>(
    reader: &mut EbmlReader<R>,
    tracks: &ElementHeader,
    header: &mut ContainerHeader,
) -> Result<(), RecordingError> {
    let end = tracks.data_offset + tracks.known_size()?;
    reader.for_each_child(end, |r, entry| {
        if entry.id != ids::TRACK_ENTRY {
            return r.skip(entry.known_size()?);
        }
        let mut track = TrackInfo::default();
        let entry_end = entry.data_offset + entry.known_size()?;
        r.for_each_child(entry_end, |r, field| {
            let size = field.known_size()?;
            match field.id {
                ids::TRACK_NUMBER => track.number = r.read_unsigned(size)?,
                ids::TRACK_TYPE => track.track_type = r.read_unsigned(size)?,
                ids::NAME => track.name = r.read_string(size)?,
                ids::CODEC_ID => track.codec_id = r.read_string(size)?,
                ids::CODEC_PRIVATE => track.codec_private = r.read_binary(size)?,
                ids::VIDEO => {
                    let video_end = field.data_offset + size;
                    r.for_each_child(video_end, |r, dim| {
                        let size = dim.known_size()?;
                        match dim.id {
                            ids::PIXEL_WIDTH => track.pixel_width = r.read_unsigned(size)? as u32,
                            ids::PIXEL_HEIGHT => {
                                track.pixel_height = r.read_unsigned(size)? as u32
                            }
                            _ => r.skip(size)?,
                        }
                        Ok(())
                    })?;
                }
                _ => r.skip(size)?,
            }
            Ok(())
        })?;
        debug!(
            number = track.number,
            name = %track.name,
            codec = %track.codec_id,
            width = track.pixel_width,
            height = track.pixel_height,
            "Found track"
        );
        header.tracks.push(track);
        Ok(())
    })
}

fn read_tags<R: Read + Seek>(
    reader: &mut EbmlReader<R>,
    tags: &ElementHeader,
    header: &mut ContainerHeader,
) -> Result<(), RecordingError> {
    let end = tags.data_offset + tags.known_size()?;
    reader.for_each_child(end, |r, tag| {
        if tag.id != ids::TAG {
            return r.skip(tag.known_size()?);
        }
        let tag_end = tag.data_offset + tag.known_size()?;
        r.for_each_child(tag_end, |r, simple| {
            if simple.id != ids::SIMPLE_TAG {
                return r.skip(simple.known_size()?);
            }
            let mut name = None;
            let mut value = None;
            let simple_end = simple.data_offset + simple.known_size()?;
            r.for_each_child(simple_end, |r, field| {
                let size = field.known_size()?;
                match field.id {
                    ids::TAG_NAME => name = Some(r.read_string(size)?),
                    ids::TAG_STRING => value = Some(r.read_string(size)?),
                    _ => r.skip(size)?,
                }
                Ok(())
            })?;
            if let (Some(name), Some(value)) = (name, value) {
                header.tags.insert(name, value);
            }
            Ok(())
        })
    })
}

fn read_attachments<R: Read + Seek>(
    reader: &mut EbmlReader<R>,
    attachments: &ElementHeader,
    header: &mut ContainerHeader,
) -> Result<(), RecordingError> {
    let end = attachments.data_offset + attachments.known_size()?;
    reader.for_each_child(end, |r, file| {
        if file.id != ids::ATTACHED_FILE {
            return r.skip(file.known_size()?);
        }
        let mut name = String::new();
        let mut data = Vec::new();
        let file_end = file.data_offset + file.known_size()?;
        r.for_each_child(file_end, |r, field| {
            let size = field.known_size()?;
            match field.id {
                ids::FILE_NAME => name = r.read_string(size)?,
                ids::FILE_DATA => data = r.read_binary(size)?,
                _ => r.skip(size)?,
            }
            Ok(())
        })?;
        header.attachments.push(Attachment { name, data });
        Ok(())
    })
}
