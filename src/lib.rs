//! # rtc-correlate
//!
//! Align a real-time video decoder's log with the frames it saved, so that
//! per-frame network and codec telemetry (QP, packet loss, retransmissions)
//! can be attributed to the right decoded frame.
//!
//! A call under test leaves two artifacts: a container file the decoder
//! wrote (typically IVF) and a text log with one line per reassembled frame
//! and one per decoded frame. They share no identifier; this crate
//! correlates them purely by frame dimensions and encoded size, resyncing
//! across frames dropped or duplicated on either side, and writes one CSV
//! row per alignment decision.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rtc_correlate::{CaptureFile, LogParser, LogPatterns, RecordExporter, correlate};
//!
//! let log = LogParser::new(LogPatterns::default()).parse_file("call.rtc.log")?;
//! let frames = CaptureFile::open("call.ivf")?.frames()?;
//!
//! let correlation = correlate(&frames.frames, &log.decoded);
//! println!("{}", correlation.summary);
//!
//! RecordExporter::export_to_path("call.csv", &correlation.records)?;
//! # Ok::<(), rtc_correlate::CorrelateError>(())
//! ```
//!
//! ## Components
//!
//! - **Log parsing** ([`LogParser`]): two configurable line patterns, a
//!   last-write-wins join table keyed by packet bounds, timestamps rebased
//!   to the first decoded frame.
//! - **Frame extraction** ([`CaptureFile`]): full decode of the first video
//!   stream through FFmpeg, keeping only packets that decode to exactly one
//!   frame. Optional JPEG dumps of every kept frame.
//! - **Correlation** ([`correlate`]): a two-pointer scan driven by the
//!   [`AlignState`] machine, with two-frame lookahead resync.
//! - **Export** ([`RecordExporter`]): fixed-schema CSV, absent sides left
//!   empty.
//! - **Batches** ([`process_batch`], [`read_manifest`]): one independent
//!   chain per capture pair.
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | `process_batch_parallel` runs one capture pair per rayon task |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on the system for
//! `ffmpeg-next` to build.

pub mod capture;
pub mod configuration;
mod conversion;
pub mod correlator;
mod dump;
pub mod error;
pub mod export;
pub mod ffmpeg;
pub mod log_parser;
pub mod manifest;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "rayon")]
mod rayon;

pub use capture::{CaptureFile, ContainerFrameRecord, ExtractedFrames, PictureType};
pub use configuration::{
    CorrelateOptions, DEFAULT_ASSEMBLED_PATTERN, DEFAULT_DECODED_PATTERN, LogPatterns, PathLayout,
};
pub use correlator::{
    AlignState, CorrelatedRecord, Correlation, CorrelationSummary, SyncError, UnmatchedReason,
    correlate, is_match, next_state,
};
pub use error::CorrelateError;
pub use export::{COLUMNS, RecordExporter};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use log_parser::{
    AssembledFrameInfo, DecodedFrameLogRecord, FrameKey, FrameType, LogParser, ParsedLog,
};
pub use manifest::read_manifest;
pub use pipeline::{BatchReport, CapturePair, FileReport, process_batch, process_pair};
pub use progress::{OperationType, ProgressCallback, ProgressInfo};
#[cfg(feature = "rayon")]
pub use rayon::process_batch_parallel;
