//! Progress reporting.
//!
//! This module provides [`ProgressCallback`] for monitoring long-running
//! stages (frame extraction, frame dumps, exports, batches) and [`ProgressInfo`] for
//! the snapshot delivered to it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtc_correlate::{CapturePair, CorrelateOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("[{:?}] {} done", info.operation, info.current);
//!     }
//! }
//!
//! let options = CorrelateOptions::new().with_progress(Arc::new(PrintProgress));
//! let pair = CapturePair::new("call.rtc.log", "call.ivf", "call.csv");
//! let report = rtc_correlate::process_pair(&pair, &options)?;
//! # Ok::<(), rtc_correlate::CorrelateError>(())
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// The kind of stage currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Decoding the capture container.
    FrameExtraction,
    /// Writing decoded frames out as JPEG images.
    FrameDump,
    /// Writing correlated rows.
    Export,
    /// Processing a batch of capture pairs.
    Batch,
}

/// A snapshot of progress.
///
/// Delivered to [`ProgressCallback::on_progress`] at a cadence controlled by
/// [`CorrelateOptions::with_batch_size`](crate::CorrelateOptions::with_batch_size).
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// How many items (frames, rows, files) have been processed so far.
    pub current: u64,
    /// Total items expected, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the stage started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
}

/// Trait for receiving progress updates.
///
/// Implementations must be [`Send`] and [`Sync`] because batch processing
/// may invoke callbacks from rayon worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during a stage.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. Used when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Tracks timing for one stage and emits callbacks every `batch_size` items.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    items_since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
        }
    }

    /// Record one completed item and fire the callback if the batch
    /// threshold is reached.
    pub(crate) fn advance(&mut self) {
        self.current += 1;
        self.items_since_last_report += 1;

        if self.items_since_last_report >= self.batch_size {
            self.report();
            self.items_since_last_report = 0;
        }
    }

    /// Unconditionally emit a final progress report.
    pub(crate) fn finish(&mut self) {
        self.report();
    }

    fn report(&self) {
        self.callback
            .on_progress(&snapshot(self.operation, self.current, self.total, self.start_time));
    }
}

/// Build a progress snapshot for `current` of `total` items started at `start`.
pub(crate) fn snapshot(
    operation: OperationType,
    current: u64,
    total: Option<u64>,
    start: Instant,
) -> ProgressInfo {
    let elapsed = start.elapsed();

    let percentage = total
        .filter(|&t| t > 0)
        .map(|t| (current as f32 / t as f32) * 100.0);

    let estimated_remaining = if current > 0 {
        total.map(|t| {
            let remaining = t.saturating_sub(current);
            elapsed.mul_f64(remaining as f64 / current as f64)
        })
    } else {
        None
    };

    ProgressInfo {
        operation,
        current,
        total,
        percentage,
        elapsed,
        estimated_remaining,
    }
}
