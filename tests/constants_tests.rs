// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use capture_export::constants::{self, SEQUENCE_WIDTH, TIMESTAMP_WIDTH};

#[test]
fn test_frame_file_name_widths() {
    let name = constants::frame_file_name(7, 123, "png");
    let (stem, extension) = name.split_once('.').unwrap();
    let (sequence, timestamp) = stem.split_once('_').unwrap();
    assert_eq!(sequence.len(), SEQUENCE_WIDTH);
    assert_eq!(timestamp.len(), TIMESTAMP_WIDTH);
    assert_eq!(extension, "png");
}

#[test]
fn test_frame_file_names_sort_by_sequence() {
    // Lexical order of names equals export order
    let mut names: Vec<String> = [10, 2, 100, 0]
        .into_iter()
        .map(|seq| constants::frame_file_name(seq, 5, "jpg"))
        .collect();
    names.sort();
    assert_eq!(names[0], "000000_00000000005.jpg");
    assert_eq!(names[3], "000100_00000000005.jpg");
}

#[test]
fn test_long_timestamps_are_not_truncated() {
    // Timestamps past 11 digits widen the field instead of losing digits
    let name = constants::frame_file_name(0, 123_456_789_012, "jpg");
    assert!(name.contains("123456789012"));
}

#[test]
fn test_quality_bounds() {
    assert_eq!(constants::clamp_quality(constants::MIN_QUALITY - 1), 0);
    assert_eq!(constants::clamp_quality(constants::MAX_QUALITY + 1), 100);
    assert_eq!(
        constants::clamp_quality(constants::DEFAULT_INFRARED_QUALITY),
        95
    );
}
