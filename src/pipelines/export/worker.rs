// SPDX-License-Identifier: GPL-3.0-only

//! Export worker threads
//!
//! Each enabled stream gets one worker thread that pops frames from its
//! queue, encodes them and writes them under the stream's output directory.
//! A worker only exits once quit has been requested AND its queue is empty,
//! so every frame pushed before [`QuitFlag::request`] reaches disk.

use super::encoding::FrameEncoder;
use super::queue::StreamQueue;
use crate::backends::recording::types::StreamKind;
use crate::constants::frame_file_name;
use crate::errors::{ExportError, StartupError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// Shared "no more frames will be produced" signal
///
/// Written once by the drain, read by every worker on every iteration.
#[derive(Debug, Clone, Default)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal all workers to finish once their queues are empty
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one worker's run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub kind: StreamKind,
    /// Frames written to disk
    pub written: u64,
    /// Frames that failed to encode or write
    pub failed: u64,
}

impl WorkerReport {
    fn empty(kind: StreamKind) -> Self {
        Self {
            kind,
            written: 0,
            failed: 0,
        }
    }

    /// Sequence indices handed out
    pub fn frames(&self) -> u64 {
        self.written + self.failed
    }
}

/// Handle to a running export worker
pub struct ExportWorker {
    kind: StreamKind,
    thread_handle: Option<JoinHandle<WorkerReport>>,
}

impl ExportWorker {
    /// Spawn a worker draining `queue` into `output_dir`
    pub fn start(
        encoder: Box<dyn FrameEncoder>,
        queue: Arc<StreamQueue>,
        output_dir: PathBuf,
        quit: QuitFlag,
    ) -> Result<Self, StartupError> {
        let kind = encoder.kind();
        info!(stream = %kind, dir = %output_dir.display(), "Starting export worker");

        let thread_handle = thread::Builder::new()
            .name(format!("export-{}", kind))
            .spawn(move || run(encoder.as_ref(), &queue, &output_dir, &quit))
            .map_err(|e| StartupError::WorkerSpawn(format!("{} worker: {}", kind, e)))?;

        Ok(Self {
            kind,
            thread_handle: Some(thread_handle),
        })
    }

    /// Wait for the worker to finish
    ///
    /// Only returns once the quit flag is set and the queue has drained.
    pub fn join(mut self) -> WorkerReport {
        self.wait()
    }

    fn wait(&mut self) -> WorkerReport {
        let Some(handle) = self.thread_handle.take() else {
            return WorkerReport::empty(self.kind);
        };
        debug!(stream = %self.kind, "Waiting for export worker to finish");
        match handle.join() {
            Ok(report) => report,
            Err(e) => {
                warn!(stream = %self.kind, "Export worker panicked: {:?}", e);
                WorkerReport::empty(self.kind)
            }
        }
    }
}

impl Drop for ExportWorker {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(stream = %self.kind, "ExportWorker dropped, waiting for drain");
            self.wait();
        }
    }
}

/// Worker body: pop, encode, write until quit and drained
fn run(
    encoder: &dyn FrameEncoder,
    queue: &StreamQueue,
    output_dir: &Path,
    quit: &QuitFlag,
) -> WorkerReport {
    let kind = encoder.kind();
    let mut report = WorkerReport::empty(kind);
    let mut sequence: u64 = 0;
    debug!(stream = %kind, "Export worker thread started");

    while !(quit.is_requested() && queue.is_empty()) {
        let Some(frame) = queue.try_pop() else {
            thread::yield_now();
            continue;
        };

        let path = output_dir.join(frame_file_name(
            sequence,
            frame.device_timestamp_usec,
            encoder.extension(),
        ));
        sequence += 1;

        match encoder.encode(&frame).and_then(|bytes| write_frame(&path, &bytes)) {
            Ok(()) => {
                report.written += 1;
                trace!(stream = %kind, path = %path.display(), "Frame written");
            }
            Err(e) => {
                report.failed += 1;
                warn!(stream = %kind, path = %path.display(), error = %e, "Failed to export frame");
            }
        }
    }

    info!(
        stream = %kind,
        written = report.written,
        failed = report.failed,
        "Export worker exiting"
    );
    report
}

fn write_frame(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    std::fs::write(path, bytes).map_err(|e| ExportError::WriteFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::recording::types::{ImageData, Resolution};
    use crate::pipelines::export::queue::StreamFrame;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Writes the timestamp as text, failing on negative timestamps
    struct TextEncoder {
        delay: Duration,
        calls: Arc<AtomicU32>,
    }

    impl FrameEncoder for TextEncoder {
        fn kind(&self) -> StreamKind {
            StreamKind::Color
        }

        fn extension(&self) -> &'static str {
            "txt"
        }

        fn encode(&self, frame: &StreamFrame) -> Result<Vec<u8>, ExportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if frame.device_timestamp_usec < 0 {
                return Err(ExportError::EncodingFailed("negative".to_string()));
            }
            Ok(frame.device_timestamp_usec.to_string().into_bytes())
        }
    }

    fn frame(ts: i64) -> StreamFrame {
        StreamFrame {
            kind: StreamKind::Color,
            device_timestamp_usec: ts,
            resolution: Resolution::new(1, 1),
            data: ImageData::Encoded(Arc::from(vec![0u8])),
        }
    }

    fn start(delay: Duration, dir: &Path) -> (ExportWorker, Arc<StreamQueue>, QuitFlag, Arc<AtomicU32>) {
        let queue = Arc::new(StreamQueue::new(StreamKind::Color));
        let quit = QuitFlag::new();
        let calls = Arc::new(AtomicU32::new(0));
        let encoder = TextEncoder {
            delay,
            calls: Arc::clone(&calls),
        };
        let worker = ExportWorker::start(
            Box::new(encoder),
            Arc::clone(&queue),
            dir.to_path_buf(),
            quit.clone(),
        )
        .unwrap();
        (worker, queue, quit, calls)
    }

    #[test]
    fn test_drains_queue_after_quit() {
        let dir = tempfile::tempdir().unwrap();
        let (worker, queue, quit, _) = start(Duration::from_millis(5), dir.path());

        for ts in 0..20 {
            queue.push(frame(ts * 100));
        }
        quit.request();
        let report = worker.join();

        assert_eq!(report.written, 20);
        assert!(queue.is_empty());
        let last = dir.path().join(frame_file_name(19, 1900, "txt"));
        assert_eq!(std::fs::read_to_string(last).unwrap(), "1900");
    }

    #[test]
    fn test_failed_frame_keeps_worker_alive() {
        let dir = tempfile::tempdir().unwrap();
        let (worker, queue, quit, calls) = start(Duration::ZERO, dir.path());

        queue.push(frame(10));
        queue.push(frame(-1));
        queue.push(frame(30));
        quit.request();
        let report = worker.join();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.written, 2);
        assert_eq!(report.failed, 1);
        // The failed frame still consumed sequence 1
        assert!(dir.path().join(frame_file_name(2, 30, "txt")).exists());
        assert!(!dir.path().join(frame_file_name(1, -1, "txt")).exists());
    }

    #[test]
    fn test_waits_without_quit() {
        let dir = tempfile::tempdir().unwrap();
        let (worker, queue, quit, _) = start(Duration::ZERO, dir.path());

        // An idle worker keeps polling until quit is requested
        thread::sleep(Duration::from_millis(30));
        queue.push(frame(5));
        quit.request();
        assert_eq!(worker.join().written, 1);
    }

    #[test]
    fn test_drop_waits_for_drain() {
        let dir = tempfile::tempdir().unwrap();
        let (worker, queue, quit, calls) = start(Duration::from_millis(2), dir.path());

        for ts in 0..5 {
            queue.push(frame(ts));
        }
        quit.request();
        drop(worker);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
