// SPDX-License-Identifier: GPL-3.0-only

//! Per-stream frame queue
//!
//! One producer (the ingestion loop) pushes in capture order and one export
//! worker pops, so FIFO order here is the order frames reach disk.

use crate::backends::recording::types::{ImageData, Resolution, StreamKind};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// One frame handed from ingestion to an export worker
///
/// Owns its pixel data, independent of the capture it was copied from.
#[derive(Debug, Clone)]
pub struct StreamFrame {
    pub kind: StreamKind,
    pub device_timestamp_usec: i64,
    pub resolution: Resolution,
    pub data: ImageData,
}

/// Unbounded FIFO of frames for one stream
#[derive(Debug)]
pub struct StreamQueue {
    kind: StreamKind,
    frames: Mutex<VecDeque<StreamFrame>>,
}

impl StreamQueue {
    pub fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            frames: Mutex::new(VecDeque::new()),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<StreamFrame>> {
        self.frames.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a frame; never blocks on the consumer
    pub fn push(&self, frame: StreamFrame) {
        self.lock().push_back(frame);
    }

    /// Take the oldest frame, if any
    pub fn try_pop(&self) -> Option<StreamFrame> {
        self.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
