// SPDX-License-Identifier: GPL-3.0-only

//! EBML element reader
//!
//! Matroska is a tree of EBML elements. Every element starts with a
//! variable-length ID (marker bits kept) and a variable-length size (marker
//! bits stripped, all ones = unknown size), followed by its payload.

use crate::errors::RecordingError;
use std::io::{Read, Seek, SeekFrom};

/// Payloads larger than this are refused instead of allocated
const MAX_PAYLOAD_BYTES: u64 = 1 << 30;

/// Header of one element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    pub id: u32,
    /// Payload size, `None` for unknown-size elements
    pub size: Option<u64>,
    /// Offset of the first header byte
    pub offset: u64,
    /// Offset of the first payload byte
    pub data_offset: u64,
}

impl ElementHeader {
    /// Offset just past the payload, if the size is known
    pub fn end(&self) -> Option<u64> {
        self.size.map(|size| self.data_offset + size)
    }

    /// Payload size, failing on unknown-size elements
    pub fn known_size(&self) -> Result<u64, RecordingError> {
        self.size.ok_or_else(|| {
            RecordingError::Malformed(format!(
                "element 0x{:X} at {} has unknown size",
                self.id, self.offset
            ))
        })
    }
}

/// Length in bytes of a variable-length integer, from its first byte
fn vint_length(first: u8) -> Option<usize> {
    match first.leading_zeros() {
        n @ 0..=7 => Some(n as usize + 1),
        _ => None,
    }
}

/// Decode a variable-length integer from the start of `data`
///
/// Returns `(value, length)` with the length marker stripped, or `None` if
/// `data` is too short or starts with an invalid byte.
pub fn read_vint(data: &[u8]) -> Option<(u64, usize)> {
    let first = *data.first()?;
    let length = vint_length(first)?;
    if data.len() < length {
        return None;
    }
    let mut value = (first as u64) & (0xFF >> length);
    for &byte in &data[1..length] {
        value = (value << 8) | byte as u64;
    }
    Some((value, length))
}

/// Streaming reader over an EBML byte source
pub struct EbmlReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read + Seek> EbmlReader<R> {
    pub fn new(mut inner: R) -> Result<Self, RecordingError> {
        let position = inner.stream_position()?;
        Ok(Self { inner, position })
    }

    /// Current byte offset
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next element header, `None` at a clean end of input
    pub fn read_header(&mut self) -> Result<Option<ElementHeader>, RecordingError> {
        let offset = self.position;

        let mut first = [0u8; 1];
        if self.inner.read(&mut first)? == 0 {
            return Ok(None);
        }
        self.position += 1;

        let id_length = vint_length(first[0]).filter(|&len| len <= 4).ok_or_else(|| {
            RecordingError::Malformed(format!("invalid element id byte 0x{:02X} at {}", first[0], offset))
        })?;
        let mut id = first[0] as u32;
        for _ in 1..id_length {
            id = (id << 8) | self.read_byte()? as u32;
        }

        let size_first = self.read_byte()?;
        let size_length = vint_length(size_first).ok_or_else(|| {
            RecordingError::Malformed(format!("invalid element size at {}", offset))
        })?;
        let mut size = (size_first as u64) & (0xFF >> size_length);
        let mut all_ones = size == (0xFF >> size_length);
        for _ in 1..size_length {
            let byte = self.read_byte()?;
            all_ones &= byte == 0xFF;
            size = (size << 8) | byte as u64;
        }

        Ok(Some(ElementHeader {
            id,
            size: if all_ones { None } else { Some(size) },
            offset,
            data_offset: self.position,
        }))
    }

    fn read_byte(&mut self) -> Result<u8, RecordingError> {
        let mut byte = [0u8; 1];
        self.inner.read_exact(&mut byte)?;
        self.position += 1;
        Ok(byte[0])
    }

    /// Read an unsigned integer payload (0-8 bytes, big-endian)
    pub fn read_unsigned(&mut self, size: u64) -> Result<u64, RecordingError> {
        if size > 8 {
            return Err(RecordingError::Malformed(format!(
                "unsigned integer of {} bytes",
                size
            )));
        }
        let bytes = self.read_binary(size)?;
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    /// Read a float payload (0, 4 or 8 bytes)
    pub fn read_float(&mut self, size: u64) -> Result<f64, RecordingError> {
        let bytes = self.read_binary(size)?;
        match bytes.len() {
            0 => Ok(0.0),
            4 => Ok(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64),
            8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes);
                Ok(f64::from_be_bytes(raw))
            }
            n => Err(RecordingError::Malformed(format!("float of {} bytes", n))),
        }
    }

    /// Read a string payload, dropping trailing NUL padding
    pub fn read_string(&mut self, size: u64) -> Result<String, RecordingError> {
        let bytes = self.read_binary(size)?;
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Read a raw payload
    pub fn read_binary(&mut self, size: u64) -> Result<Vec<u8>, RecordingError> {
        if size > MAX_PAYLOAD_BYTES {
            return Err(RecordingError::Malformed(format!(
                "element payload of {} bytes",
                size
            )));
        }
        let mut buffer = vec![0u8; size as usize];
        self.inner.read_exact(&mut buffer)?;
        self.position += size;
        Ok(buffer)
    }

    /// Skip over a payload
    pub fn skip(&mut self, size: u64) -> Result<(), RecordingError> {
        self.seek_to(self.position + size)
    }

    /// Move to an absolute offset
    pub fn seek_to(&mut self, offset: u64) -> Result<(), RecordingError> {
        self.position = self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Iterate child headers until `end`, handing each to `visit`
    ///
    /// `visit` must consume the payload (read or skip it).
    pub fn for_each_child<F>(&mut self, end: u64, mut visit: F) -> Result<(), RecordingError>
    where
        F: FnMut(&mut Self, ElementHeader) -> Result<(), RecordingError>,
    {
        while self.position < end {
            let Some(child) = self.read_header()? else {
                return Err(RecordingError::Malformed(format!(
                    "element truncated, expected data up to {}",
                    end
                )));
            };
            visit(self, child)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_vint_lengths() {
        assert_eq!(read_vint(&[0x81]), Some((1, 1)));
        assert_eq!(read_vint(&[0x40, 0x02]), Some((2, 2)));
        assert_eq!(read_vint(&[0x01, 0, 0, 0, 0, 0, 0, 0x05]), Some((5, 8)));
        assert_eq!(read_vint(&[0x40]), None);
        assert_eq!(read_vint(&[0x00]), None);
    }

    #[test]
    fn test_read_header_keeps_id_marker() {
        // EBML header id, 1-byte size of 4
        let data = vec![0x1A, 0x45, 0xDF, 0xA3, 0x84, 1, 2, 3, 4];
        let mut reader = EbmlReader::new(Cursor::new(data)).unwrap();
        let header = reader.read_header().unwrap().unwrap();
        assert_eq!(header.id, 0x1A45DFA3);
        assert_eq!(header.size, Some(4));
        assert_eq!(header.data_offset, 5);
        assert_eq!(header.end(), Some(9));
    }

    #[test]
    fn test_unknown_size() {
        // Cluster id with an 8-byte all-ones size
        let data = vec![0x1F, 0x43, 0xB6, 0x75, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut reader = EbmlReader::new(Cursor::new(data)).unwrap();
        let header = reader.read_header().unwrap().unwrap();
        assert_eq!(header.size, None);
        assert!(header.known_size().is_err());
    }

    #[test]
    fn test_payload_readers() {
        let mut data = vec![0x01, 0x00];
        data.extend_from_slice(b"abc\0\0");
        data.extend_from_slice(&1.5f32.to_be_bytes());
        let mut reader = EbmlReader::new(Cursor::new(data)).unwrap();
        assert_eq!(reader.read_unsigned(2).unwrap(), 256);
        assert_eq!(reader.read_string(5).unwrap(), "abc");
        assert_eq!(reader.read_float(4).unwrap(), 1.5);
        assert!(reader.read_header().unwrap().is_none());
    }

    #[test]
    fn test_truncated_payload() {
        let mut reader = EbmlReader::new(Cursor::new(vec![1u8, 2])).unwrap();
        assert!(matches!(
            reader.read_binary(4),
            Err(RecordingError::Malformed(_))
        ));
    }
}
