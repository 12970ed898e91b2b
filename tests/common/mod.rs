// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic recordings for integration tests
//!
//! [`RecordingBuilder`] writes a small Matroska file in the same layout a
//! depth camera recorder produces: named COLOR/DEPTH/IR tracks, K4A tags,
//! an optional calibration attachment and one cluster per capture.

#![allow(dead_code)]

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use std::path::{Path, PathBuf};

/// TimecodeScale used by the builder: timecodes are microseconds
pub const TIMECODE_SCALE_NS: u64 = 1_000;

/// Frame period at 30 fps in microseconds
pub const FRAME_PERIOD_USEC: i64 = 33_333;

const EBML: u32 = 0x1A45DFA3;
const DOC_TYPE: u32 = 0x4282;
const SEGMENT: u32 = 0x18538067;
const INFO: u32 = 0x1549A966;
const TIMECODE_SCALE: u32 = 0x2AD7B1;
const TRACKS: u32 = 0x1654AE6B;
const TRACK_ENTRY: u32 = 0xAE;
const TRACK_NUMBER: u32 = 0xD7;
const TRACK_TYPE: u32 = 0x83;
const NAME: u32 = 0x536E;
const CODEC_ID: u32 = 0x86;
const CODEC_PRIVATE: u32 = 0x63A2;
const VIDEO: u32 = 0xE0;
const PIXEL_WIDTH: u32 = 0xB0;
const PIXEL_HEIGHT: u32 = 0xBA;
const TAGS: u32 = 0x1254C367;
const TAG: u32 = 0x7373;
const SIMPLE_TAG: u32 = 0x67C8;
const TAG_NAME: u32 = 0x45A3;
const TAG_STRING: u32 = 0x4487;
const ATTACHMENTS: u32 = 0x1941A469;
const ATTACHED_FILE: u32 = 0x61A7;
const FILE_NAME: u32 = 0x466E;
const FILE_DATA: u32 = 0x465C;
const CLUSTER: u32 = 0x1F43B675;
const TIMECODE: u32 = 0xE7;
const SIMPLE_BLOCK: u32 = 0xA3;
const BLOCK_GROUP: u32 = 0xA0;
const BLOCK: u32 = 0xA1;

/// How a track stores its frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackCodec {
    Mjpeg,
    /// `V_MS/VFW/FOURCC` with the given compression FOURCC
    Fourcc([u8; 4]),
}

impl TrackCodec {
    pub const BIG_ENDIAN_16: TrackCodec = TrackCodec::Fourcc(*b"b16g");
    pub const LITTLE_ENDIAN_16: TrackCodec = TrackCodec::Fourcc(*b"Y16 ");
}

#[derive(Debug, Clone)]
struct Track {
    number: u64,
    name: &'static str,
    codec: TrackCodec,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone)]
struct Block {
    track: u64,
    timestamp_usec: i64,
    data: Vec<u8>,
    grouped: bool,
}

/// Builder for a synthetic recording
#[derive(Debug, Clone, Default)]
pub struct RecordingBuilder {
    tracks: Vec<Track>,
    tags: Vec<(String, String)>,
    calibration: Option<String>,
    blocks: Vec<Block>,
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self::default().tag("K4A_FPS", "FPS_30")
    }

    /// Add a video track; returns its track number
    pub fn track(
        mut self,
        name: &'static str,
        codec: TrackCodec,
        width: u32,
        height: u32,
    ) -> Self {
        let number = self.tracks.len() as u64 + 1;
        self.tracks.push(Track {
            number,
            name,
            codec,
            width,
            height,
        });
        self
    }

    pub fn color(self, width: u32, height: u32) -> Self {
        self.track("COLOR", TrackCodec::Mjpeg, width, height)
    }

    pub fn depth(self, width: u32, height: u32) -> Self {
        self.track("DEPTH", TrackCodec::BIG_ENDIAN_16, width, height)
    }

    pub fn infrared(self, width: u32, height: u32) -> Self {
        self.track("IR", TrackCodec::BIG_ENDIAN_16, width, height)
    }

    pub fn tag(mut self, name: &str, value: &str) -> Self {
        self.tags.retain(|(n, _)| n != name);
        self.tags.push((name.to_string(), value.to_string()));
        self
    }

    pub fn calibration(mut self, json: String) -> Self {
        self.calibration = Some(json);
        self
    }

    /// Queue a raw block for the named track
    pub fn block(mut self, name: &str, timestamp_usec: i64, data: Vec<u8>) -> Self {
        let track = self.track_number(name);
        self.blocks.push(Block {
            track,
            timestamp_usec,
            data,
            grouped: false,
        });
        self
    }

    /// Queue a block wrapped in a BlockGroup
    pub fn grouped_block(mut self, name: &str, timestamp_usec: i64, data: Vec<u8>) -> Self {
        let track = self.track_number(name);
        self.blocks.push(Block {
            track,
            timestamp_usec,
            data,
            grouped: true,
        });
        self
    }

    /// Queue a 16-bit frame, encoded the way the track declares
    pub fn samples(self, name: &str, timestamp_usec: i64, samples: &[u16]) -> Self {
        let codec = self
            .tracks
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.codec)
            .unwrap_or(TrackCodec::BIG_ENDIAN_16);
        let data = samples
            .iter()
            .flat_map(|&s| match codec {
                TrackCodec::Fourcc(f) if &f == b"Y16 " => s.to_le_bytes(),
                _ => s.to_be_bytes(),
            })
            .collect();
        self.block(name, timestamp_usec, data)
    }

    /// Queue one JPEG color frame of the track's size
    pub fn jpeg(self, timestamp_usec: i64, gray: u8) -> Self {
        let (width, height) = self
            .tracks
            .iter()
            .find(|t| t.name == "COLOR")
            .map(|t| (t.width, t.height))
            .unwrap_or((8, 8));
        let data = jpeg_bytes(width, height, gray);
        self.block("COLOR", timestamp_usec, data)
    }

    fn track_number(&self, name: &str) -> u64 {
        self.tracks
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.number)
            .unwrap_or(99)
    }

    /// Serialize the recording
    pub fn build(&self) -> Vec<u8> {
        let mut file = element(EBML, &string_element(DOC_TYPE, "matroska"));

        let mut segment = Vec::new();
        segment.extend(element(INFO, &unsigned_element(TIMECODE_SCALE, TIMECODE_SCALE_NS)));

        let mut tracks = Vec::new();
        for track in &self.tracks {
            tracks.extend(track_entry(track));
        }
        segment.extend(element(TRACKS, &tracks));

        if !self.tags.is_empty() {
            let mut simple_tags = Vec::new();
            for (name, value) in &self.tags {
                let mut fields = string_element(TAG_NAME, name);
                fields.extend(string_element(TAG_STRING, value));
                simple_tags.extend(element(SIMPLE_TAG, &fields));
            }
            segment.extend(element(TAGS, &element(TAG, &simple_tags)));
        }

        if let Some(json) = &self.calibration {
            let mut fields = string_element(FILE_NAME, "calibration.json");
            fields.extend(element(FILE_DATA, json.as_bytes()));
            segment.extend(element(ATTACHMENTS, &element(ATTACHED_FILE, &fields)));
        }

        // One cluster per distinct cluster timecode, blocks kept in order
        let mut index = 0;
        while index < self.blocks.len() {
            let cluster_timecode = self.blocks[index].timestamp_usec;
            let mut cluster = unsigned_element(TIMECODE, cluster_timecode as u64);
            while index < self.blocks.len() {
                let block = &self.blocks[index];
                let relative = block.timestamp_usec - cluster_timecode;
                if !(0..=i16::MAX as i64).contains(&relative) {
                    break;
                }
                let payload = block_payload(block.track, relative as i16, &block.data);
                if block.grouped {
                    cluster.extend(element(BLOCK_GROUP, &element(BLOCK, &payload)));
                } else {
                    cluster.extend(element(SIMPLE_BLOCK, &payload));
                }
                index += 1;
            }
            segment.extend(element(CLUSTER, &cluster));
        }

        file.extend(element(SEGMENT, &segment));
        file
    }

    /// Write the recording to `dir/name`
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

fn track_entry(track: &Track) -> Vec<u8> {
    let mut fields = unsigned_element(TRACK_NUMBER, track.number);
    fields.extend(unsigned_element(TRACK_TYPE, 1));
    fields.extend(string_element(NAME, track.name));
    match track.codec {
        TrackCodec::Mjpeg => fields.extend(string_element(CODEC_ID, "V_MJPEG")),
        TrackCodec::Fourcc(fourcc) => {
            fields.extend(string_element(CODEC_ID, "V_MS/VFW/FOURCC"));
            fields.extend(element(
                CODEC_PRIVATE,
                &bitmap_info_header(track.width, track.height, fourcc),
            ));
        }
    }
    let mut video = unsigned_element(PIXEL_WIDTH, track.width as u64);
    video.extend(unsigned_element(PIXEL_HEIGHT, track.height as u64));
    fields.extend(element(VIDEO, &video));
    element(TRACK_ENTRY, &fields)
}

fn bitmap_info_header(width: u32, height: u32, fourcc: [u8; 4]) -> Vec<u8> {
    let mut header = Vec::with_capacity(40);
    header.extend(40u32.to_le_bytes());
    header.extend((width as i32).to_le_bytes());
    header.extend((height as i32).to_le_bytes());
    header.extend(1u16.to_le_bytes());
    header.extend(16u16.to_le_bytes());
    header.extend(fourcc);
    header.extend((width * height * 2).to_le_bytes());
    header.extend([0u8; 16]);
    header
}

fn block_payload(track: u64, relative: i16, data: &[u8]) -> Vec<u8> {
    let mut payload = vec![0x80 | track as u8];
    payload.extend(relative.to_be_bytes());
    payload.push(0x80);
    payload.extend_from_slice(data);
    payload
}

/// Element with an 8-byte size field
pub fn element(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = id
        .to_be_bytes()
        .into_iter()
        .skip_while(|&b| b == 0)
        .collect();
    out.push(0x01);
    out.extend(&(payload.len() as u64).to_be_bytes()[1..]);
    out.extend_from_slice(payload);
    out
}

fn unsigned_element(id: u32, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(7);
    element(id, &bytes[first..])
}

fn string_element(id: u32, value: &str) -> Vec<u8> {
    element(id, value.as_bytes())
}

/// Uniform gray JPEG
pub fn jpeg_bytes(width: u32, height: u32, gray: u8) -> Vec<u8> {
    let rgb = vec![gray; (width * height * 3) as usize];
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .encode(&rgb, width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// Calibration attachment with ideal pinhole cameras and identity extrinsics
pub fn calibration_json() -> String {
    let camera = |location: &str, translation: [f32; 3]| {
        serde_json::json!({
            "Intrinsics": {
                "ModelParameterCount": 14,
                "ModelParameters": [0.5, 0.5, 0.5, 0.5, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
                "ModelType": "CALIBRATION_LensDistortionModelBrownConrady"
            },
            "Location": location,
            "Rt": {
                "Rotation": [1, 0, 0, 0, 1, 0, 0, 0, 1],
                "Translation": translation
            },
            "SensorHeight": 1024,
            "SensorWidth": 1024
        })
    };
    serde_json::json!({
        "CalibrationInformation": {
            "Cameras": [
                camera("CALIBRATION_CameraLocationD0", [0.0, 0.0, 0.0]),
                camera("CALIBRATION_CameraLocationPV0", [0.0, 0.0, 0.0])
            ]
        }
    })
    .to_string()
}

/// Recording with `count` captures of every stream, 4x4 pixels each
///
/// Capture `k` has device timestamp `k * FRAME_PERIOD_USEC`, depth value
/// `1000 + k` and infrared value `200 + k`.
pub fn three_stream_recording(count: i64) -> RecordingBuilder {
    let mut builder = RecordingBuilder::new().color(4, 4).depth(4, 4).infrared(4, 4);
    for k in 0..count {
        let ts = k * FRAME_PERIOD_USEC;
        builder = builder
            .jpeg(ts, 128)
            .samples("DEPTH", ts + 100, &[1000 + k as u16; 16])
            .samples("IR", ts + 100, &[200 + k as u16; 16]);
    }
    builder
}

/// Sorted file names in a directory
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
