//! Correlation configuration.
//!
//! [`CorrelateOptions`] is a builder that threads the log patterns, the
//! capture path layout, progress callbacks, and frame-dump settings through
//! the pipeline without process-wide state.
//!
//! # Example
//!
//! ```no_run
//! use rtc_correlate::{CorrelateOptions, LogPatterns};
//!
//! let patterns = LogPatterns::new(
//!     r"Assembled: F=(\d+) L=(\d+) sz=(\d+) exp=(\d+) recv=(\d+) nack=(\d+) maxnack=(\d+)",
//!     r"Decoded: ts=(\d+) F=(\d+) L=(\d+) qp=(\d+) w=(\d+) h=(\d+) type=(\w+)",
//! )?;
//! let options = CorrelateOptions::new()
//!     .with_patterns(patterns)
//!     .with_batch_size(100);
//! # Ok::<(), rtc_correlate::CorrelateError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;

use crate::error::CorrelateError;
use crate::progress::{NoOpProgress, ProgressCallback};

/// Default pattern for packet-reassembly lines.
pub const DEFAULT_ASSEMBLED_PATTERN: &str = r"AssembledFrame: First=(\d+) Last=(\d+) EncodedBufsz=(\d+) NumPktExp=(\d+) NumPktRecv=(\d+) NumNack=(\d+) MaxNack=(\d+)";

/// Default pattern for decoded-frame lines.
pub const DEFAULT_DECODED_PATTERN: &str =
    r"Decoded frame: ts=(\d+) us First=(\d+) Last=(\d+) qp=(\d+) w=(\d+) h=(\d+) type=(\w+)";

/// Number of capture groups each log pattern must expose.
const PATTERN_GROUPS: usize = 7;

/// The two line patterns recognised by the [`LogParser`](crate::LogParser).
///
/// Both patterns are searched anywhere within a line and must have exactly
/// seven capture groups, in the field order of the default patterns:
///
/// - assembled: `First, Last, EncodedBufsz, NumPktExp, NumPktRecv, NumNack, MaxNack`
/// - decoded: `ts, First, Last, qp, w, h, type`
#[derive(Debug, Clone)]
pub struct LogPatterns {
    pub(crate) assembled: Regex,
    pub(crate) decoded: Regex,
}

impl LogPatterns {
    /// Compile a custom pair of patterns.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelateError::InvalidPattern`] if either pattern fails to
    /// compile or does not have exactly seven capture groups.
    pub fn new(assembled: &str, decoded: &str) -> Result<Self, CorrelateError> {
        Ok(Self {
            assembled: compile("assembled", assembled)?,
            decoded: compile("decoded", decoded)?,
        })
    }

    /// The assembled-frame pattern source.
    pub fn assembled(&self) -> &str {
        self.assembled.as_str()
    }

    /// The decoded-frame pattern source.
    pub fn decoded(&self) -> &str {
        self.decoded.as_str()
    }
}

impl Default for LogPatterns {
    fn default() -> Self {
        Self::new(DEFAULT_ASSEMBLED_PATTERN, DEFAULT_DECODED_PATTERN)
            .expect("built-in log patterns are valid")
    }
}

fn compile(name: &'static str, source: &str) -> Result<Regex, CorrelateError> {
    let regex = Regex::new(source).map_err(|error| CorrelateError::InvalidPattern {
        name,
        reason: error.to_string(),
    })?;

    // captures_len() counts the implicit whole-match group.
    let groups = regex.captures_len() - 1;
    if groups != PATTERN_GROUPS {
        return Err(CorrelateError::InvalidPattern {
            name,
            reason: format!("expected {PATTERN_GROUPS} capture groups, found {groups}"),
        });
    }

    Ok(regex)
}

/// Naming rules that relate a source video to its capture artifacts.
///
/// A source video at `…/<input_dir>/…/name<video_extension>` has its decoder
/// log and container under `…/<capture_dir>/…` and its correlated CSV under
/// `…/<output_dir>/…`. See
/// [`CapturePair::from_video_path`](crate::CapturePair::from_video_path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    /// Directory component holding the source videos.
    pub input_dir: String,
    /// Directory component holding decoder logs and container captures.
    pub capture_dir: String,
    /// Directory component receiving correlated CSV files.
    pub output_dir: String,
    /// Extension of the source video.
    pub video_extension: String,
    /// Extension of the decoder log.
    pub log_extension: String,
    /// Extension of the container capture.
    pub container_extension: String,
    /// Extension of the correlated output.
    pub output_extension: String,
}

impl Default for PathLayout {
    fn default() -> Self {
        Self {
            input_dir: "rtc_input".to_string(),
            capture_dir: "rtc_output".to_string(),
            output_dir: "processed_rtc".to_string(),
            video_extension: ".yuv".to_string(),
            log_extension: ".rtc.log".to_string(),
            container_extension: ".ivf".to_string(),
            output_extension: ".csv".to_string(),
        }
    }
}

/// Configuration for a correlation run.
///
/// A default-constructed value uses the built-in log patterns and path
/// layout, reports no progress, and dumps no frames.
#[derive(Clone)]
pub struct CorrelateOptions {
    pub(crate) patterns: LogPatterns,
    pub(crate) layout: PathLayout,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// How often to fire the progress callback (every N items).
    pub(crate) batch_size: u64,
    /// Directory receiving JPEG dumps of every retained container frame.
    pub(crate) frame_dump: Option<PathBuf>,
    pub(crate) overwrite: bool,
}

impl Debug for CorrelateOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CorrelateOptions")
            .field("patterns", &self.patterns)
            .field("layout", &self.layout)
            .field("batch_size", &self.batch_size)
            .field("frame_dump", &self.frame_dump)
            .field("overwrite", &self.overwrite)
            .finish_non_exhaustive()
    }
}

impl Default for CorrelateOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelateOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            patterns: LogPatterns::default(),
            layout: PathLayout::default(),
            progress: Arc::new(NoOpProgress),
            batch_size: 1,
            frame_dump: None,
            overwrite: true,
        }
    }

    /// Use custom log line patterns.
    #[must_use]
    pub fn with_patterns(mut self, patterns: LogPatterns) -> Self {
        self.patterns = patterns;
        self
    }

    /// Use a custom capture path layout.
    #[must_use]
    pub fn with_layout(mut self, layout: PathLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Set how often the progress callback fires. Clamped to at least 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Save every retained container frame as a JPEG under `directory`.
    #[must_use]
    pub fn with_frame_dump(mut self, directory: impl Into<PathBuf>) -> Self {
        self.frame_dump = Some(directory.into());
        self
    }

    /// Control whether existing output files may be replaced. Defaults to `true`.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// The configured log patterns.
    pub fn patterns(&self) -> &LogPatterns {
        &self.patterns
    }

    /// The configured path layout.
    pub fn layout(&self) -> &PathLayout {
        &self.layout
    }
}
