//! Per-file processing chain and batch driver.
//!
//! Each [`CapturePair`] runs through parse → extract → correlate → export
//! on its own, with no state shared between files, so a failure in one file
//! never affects its siblings. [`process_batch`] runs pairs one after the
//! other; with the `rayon` feature, `process_batch_parallel` runs one chain
//! per rayon task.
//!
//! # Example
//!
//! ```no_run
//! use rtc_correlate::{CapturePair, CorrelateOptions, PathLayout};
//!
//! let layout = PathLayout::default();
//! let pair = CapturePair::from_video_path("data/rtc_input/clip/clip.yuv", &layout)?;
//! let report = rtc_correlate::process_pair(&pair, &CorrelateOptions::new())?;
//! println!("{}", report.summary);
//! # Ok::<(), rtc_correlate::CorrelateError>(())
//! ```

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    time::Instant,
};

use crate::{
    capture::CaptureFile,
    configuration::{CorrelateOptions, PathLayout},
    correlator::{CorrelationSummary, correlate},
    error::CorrelateError,
    export::RecordExporter,
    log_parser::LogParser,
    progress::{OperationType, ProgressTracker},
};

/// The inputs and output of one correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePair {
    /// Decoder log.
    pub log_path: PathBuf,
    /// Container the decoder saved.
    pub container_path: PathBuf,
    /// Correlated CSV destination.
    pub output_path: PathBuf,
}

impl CapturePair {
    pub fn new(
        log_path: impl Into<PathBuf>,
        container_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            log_path: log_path.into(),
            container_path: container_path.into(),
            output_path: output_path.into(),
        }
    }

    /// Derive the capture artifacts of a source video from the layout.
    ///
    /// With the default layout, `data/rtc_input/a/clip.yuv` maps to
    /// `data/rtc_output/a/clip.rtc.log`, `data/rtc_output/a/clip.ivf` and
    /// `data/processed_rtc/a/clip.csv`.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelateError::InvalidManifest`] if the path has no
    /// `input_dir` component or does not end in `video_extension`.
    pub fn from_video_path<P: AsRef<Path>>(
        video_path: P,
        layout: &PathLayout,
    ) -> Result<Self, CorrelateError> {
        let video_path = video_path.as_ref();
        let invalid = |reason: String| CorrelateError::InvalidManifest {
            path: video_path.to_path_buf(),
            reason,
        };

        let stem = video_path
            .file_name()
            .and_then(OsStr::to_str)
            .and_then(|name| name.strip_suffix(layout.video_extension.as_str()))
            .ok_or_else(|| invalid(format!("expected a '{}' file", layout.video_extension)))?;

        let capture_dir = swap_component(video_path, &layout.input_dir, &layout.capture_dir)
            .ok_or_else(|| invalid(format!("'{}' not found in path", layout.input_dir)))?;
        let output_dir = swap_component(video_path, &layout.input_dir, &layout.output_dir)
            .ok_or_else(|| invalid(format!("'{}' not found in path", layout.input_dir)))?;

        Ok(Self {
            log_path: capture_dir.with_file_name(format!("{stem}{}", layout.log_extension)),
            container_path: capture_dir
                .with_file_name(format!("{stem}{}", layout.container_extension)),
            output_path: output_dir.with_file_name(format!("{stem}{}", layout.output_extension)),
        })
    }

    /// Read a JSON video configuration (`{"VideoPath": "…"}`) and derive the
    /// pair from its video path.
    pub fn from_video_config<P: AsRef<Path>>(
        config_path: P,
        layout: &PathLayout,
    ) -> Result<Self, CorrelateError> {
        let video_path = crate::manifest::video_path_from_config(config_path.as_ref())?;
        Self::from_video_path(video_path, layout)
    }
}

/// Replace the first path component equal to `from` with `to`.
pub(crate) fn swap_component(path: &Path, from: &str, to: &str) -> Option<PathBuf> {
    let mut found = false;
    let swapped: PathBuf = path
        .components()
        .map(|component| {
            if !found && component.as_os_str() == from {
                found = true;
                OsStr::new(to)
            } else {
                component.as_os_str()
            }
        })
        .collect();
    found.then_some(swapped)
}

/// The outcome of one successful correlation.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub pair: CapturePair,
    pub summary: CorrelationSummary,
    /// Distinct reassembly records found in the log.
    pub assembled_count: usize,
    /// Log lines that matched neither pattern.
    pub ignored_lines: u64,
    /// Container packets left out because they did not decode to exactly one frame.
    pub excluded_packets: u64,
    /// Rows written to the output file.
    pub rows_written: usize,
}

/// Run the full chain for one pair and write its CSV.
///
/// # Errors
///
/// Any file-level error ([`CorrelateError::InputError`],
/// [`CorrelateError::DecodeError`], [`CorrelateError::OutputError`], …)
/// aborts this pair only.
pub fn process_pair(
    pair: &CapturePair,
    options: &CorrelateOptions,
) -> Result<FileReport, CorrelateError> {
    log::debug!(
        "Processing {} and {}",
        pair.log_path.display(),
        pair.container_path.display()
    );

    let parsed = LogParser::new(options.patterns.clone()).parse_file(&pair.log_path)?;
    let extracted = CaptureFile::open(&pair.container_path)?.frames_with_options(options)?;

    let correlation = correlate(&extracted.frames, &parsed.decoded);
    let rows_written = RecordExporter::export_to_path_with_options(
        &pair.output_path,
        &correlation.records,
        options,
    )?;

    let summary = correlation.summary;
    log::info!(
        "Correlated {}: {} container, {} log, {} matched, {} rows -> {}",
        pair.container_path.display(),
        summary.container_frames,
        summary.log_frames,
        summary.matched,
        rows_written,
        pair.output_path.display(),
    );

    Ok(FileReport {
        pair: pair.clone(),
        summary,
        assembled_count: parsed.assembled.len(),
        ignored_lines: parsed.lines_ignored,
        excluded_packets: extracted.excluded_packets(),
        rows_written,
    })
}

/// Results for every pair of a batch, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<(CapturePair, Result<FileReport, CorrelateError>)>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &FileReport> {
        self.results.iter().filter_map(|(_, result)| result.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&CapturePair, &CorrelateError)> {
        self.results
            .iter()
            .filter_map(|(pair, result)| result.as_ref().err().map(|error| (pair, error)))
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

pub(crate) fn log_failure(pair: &CapturePair, error: &CorrelateError) {
    log::warn!("Skipping {}: {error}", pair.container_path.display());
}

/// Process pairs sequentially, reporting [`OperationType::Batch`] progress
/// per file.
pub fn process_batch(pairs: &[CapturePair], options: &CorrelateOptions) -> BatchReport {
    let started = Instant::now();
    let mut tracker = ProgressTracker::new(
        options.progress.clone(),
        OperationType::Batch,
        Some(pairs.len() as u64),
        1,
    );

    let mut report = BatchReport::default();
    for pair in pairs {
        let result = process_pair(pair, options);
        if let Err(error) = &result {
            log_failure(pair, error);
        }
        report.results.push((pair.clone(), result));
        tracker.advance();
    }

    log::info!(
        "Batch finished in {:.2}s: {} succeeded, {} failed",
        started.elapsed().as_secs_f64(),
        report.succeeded().count(),
        report.failed().count(),
    );
    report
}
