// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Expected extension of recording files
pub const RECORDING_EXTENSION: &str = "mkv";

/// Width of the zero-padded per-stream sequence index in file names
pub const SEQUENCE_WIDTH: usize = 6;

/// Width of the zero-padded device timestamp (microseconds) in file names
pub const TIMESTAMP_WIDTH: usize = 11;

/// Default JPEG quality for infrared frames
pub const DEFAULT_INFRARED_QUALITY: i64 = 95;

/// Lowest and highest accepted encode quality
pub const MIN_QUALITY: i64 = 0;
pub const MAX_QUALITY: i64 = 100;

/// Name of the calibration attachment inside a recording
pub const CALIBRATION_ATTACHMENT: &str = "calibration.json";

/// Frame rate assumed when the recording does not carry one
pub const DEFAULT_FRAMES_PER_SECOND: u32 = 30;

/// Matroska tag names written by the recorder
pub mod tags {
    pub const START_OFFSET_NS: &str = "K4A_START_OFFSET_NS";
    pub const DEPTH_MODE: &str = "K4A_DEPTH_MODE";
    pub const COLOR_MODE: &str = "K4A_COLOR_MODE";
    pub const FPS: &str = "K4A_FPS";
}

/// Track names written by the recorder
pub mod track_names {
    pub const COLOR: &str = "COLOR";
    pub const DEPTH: &str = "DEPTH";
    pub const INFRARED: &str = "IR";
}

/// Build the file name for one exported frame
///
/// `<sequence>_<timestamp>.<extension>`, e.g. `000000_00000123456.png`.
pub fn frame_file_name(sequence: u64, device_timestamp_usec: i64, extension: &str) -> String {
    format!(
        "{:0sw$}_{:0tw$}.{}",
        sequence,
        device_timestamp_usec,
        extension,
        sw = SEQUENCE_WIDTH,
        tw = TIMESTAMP_WIDTH
    )
}

/// Clamp a requested encode quality into the accepted range
pub fn clamp_quality(quality: i64) -> u8 {
    quality.clamp(MIN_QUALITY, MAX_QUALITY) as u8
}
