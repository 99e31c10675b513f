//! Parallel batch processing.
//!
//! Each rayon task runs one pair's full chain with its own log parser,
//! demuxer and decoder, so there is no shared mutable state between files.
//! Results are returned in input order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use ::rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::configuration::CorrelateOptions;
use crate::pipeline::{BatchReport, CapturePair, log_failure, process_pair};
use crate::progress::{OperationType, snapshot};

/// Process pairs concurrently, one pair per rayon task.
///
/// [`OperationType::Batch`] progress fires once per finished file, from
/// whichever worker finished it.
pub fn process_batch_parallel(pairs: &[CapturePair], options: &CorrelateOptions) -> BatchReport {
    let started = Instant::now();
    let total = Some(pairs.len() as u64);
    let finished = AtomicU64::new(0);

    let results = pairs
        .par_iter()
        .map(|pair| {
            let result = process_pair(pair, options);
            if let Err(error) = &result {
                log_failure(pair, error);
            }
            let current = finished.fetch_add(1, Ordering::Relaxed) + 1;
            options
                .progress
                .on_progress(&snapshot(OperationType::Batch, current, total, started));
            (pair.clone(), result)
        })
        .collect();

    let report = BatchReport { results };
    log::info!(
        "Parallel batch finished in {:.2}s: {} succeeded, {} failed",
        started.elapsed().as_secs_f64(),
        report.succeeded().count(),
        report.failed().count(),
    );
    report
}
