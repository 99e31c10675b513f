//! Frame-by-frame alignment of container frames with decoder log records.
//!
//! The two captures share no identifier, so the only correlation signal is
//! content equality: a container frame and a log record [`is_match`] when the
//! record was reassembled, and its dimensions and reassembled size equal the
//! container frame's dimensions and payload size.
//!
//! [`correlate`] walks both sequences with one cursor each. Every step is a
//! single [`AlignState`] decision chosen by [`next_state`] in a fixed
//! priority order:
//!
//! 1. [`AlignState::MissingAssembled`]: the log record was never reassembled
//!    and cannot match anything; it is set aside.
//! 2. [`AlignState::Aligned`]: both cursors point at matching frames.
//! 3. [`AlignState::ResyncContainer`]: dropping one container frame restores
//!    two consecutive matches.
//! 4. [`AlignState::ResyncLog`]: dropping one log record restores two
//!    consecutive matches.
//! 5. [`AlignState::HardMismatch`]: neither side can be realigned; both
//!    frames are paired anyway and flagged.
//!
//! Resync requires two consecutive matches so that a single pair of
//! coincidentally equal-size frames (common at constant bitrate) cannot
//! trigger it. Lookahead never exceeds two frames. The scan never aborts,
//! terminates in O(n + m) steps and places every input frame in exactly one
//! [`CorrelatedRecord`].
//!
//! The result is a heuristic: a long run of identical-size frames with the
//! same dimensions can still be resynchronised at the wrong offset.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::{capture::ContainerFrameRecord, log_parser::DecodedFrameLogRecord};

/// Why a row could not be cleanly matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncError {
    /// Both sides present and matching.
    None,
    /// A container frame with no log partner.
    ExtraFrame,
    /// A log record with no container partner.
    ExtraLog,
    /// A paired row whose sides do not match.
    Mismatch,
    /// Left over on one side after the other side was exhausted.
    Tail,
}

impl SyncError {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncError::None => "none",
            SyncError::ExtraFrame => "extra_frame",
            SyncError::ExtraLog => "extra_log",
            SyncError::Mismatch => "mismatch",
            SyncError::Tail => "tail",
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Finer classification of an unmatched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnmatchedReason {
    /// Container frame dropped to resynchronise.
    ExtraFrame,
    /// Container frame left after the log was exhausted.
    ExtraFrameTail,
    /// Log record dropped to resynchronise.
    ExtraLog,
    /// Log record without reassembly counters.
    ExtraLogNoAssembled,
    /// Log record left after the container was exhausted.
    ExtraLogTail,
    /// Frame paired in a hard mismatch.
    Mismatch,
}

impl UnmatchedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            UnmatchedReason::ExtraFrame => "extra_frame",
            UnmatchedReason::ExtraFrameTail => "extra_frame_tail",
            UnmatchedReason::ExtraLog => "extra_log",
            UnmatchedReason::ExtraLogNoAssembled => "extra_log_no_assembled",
            UnmatchedReason::ExtraLogTail => "extra_log_tail",
            UnmatchedReason::Mismatch => "mismatch",
        }
    }
}

impl Display for UnmatchedReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// One alignment decision.
///
/// Rows with [`SyncError::Mismatch`] pair frames that are known not to match;
/// they exist to keep both sides visible in the output and their log-side
/// values must not be attributed to the container frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedRecord {
    /// Index of the container frame in the extracted sequence.
    pub container_index: Option<usize>,
    pub container: Option<ContainerFrameRecord>,
    /// Index of the log record in the time-sorted log sequence.
    pub log_index: Option<usize>,
    pub log: Option<DecodedFrameLogRecord>,
    pub sync_error: SyncError,
    /// Set on every row that is not a clean match.
    pub reason: Option<UnmatchedReason>,
}

impl CorrelatedRecord {
    pub fn is_matched(&self) -> bool {
        self.sync_error == SyncError::None
    }
}

/// The decision taken at one scan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignState {
    MissingAssembled,
    Aligned,
    ResyncContainer,
    ResyncLog,
    HardMismatch,
}

/// Content equality between a container frame and a log record.
pub fn is_match(container: &ContainerFrameRecord, log: &DecodedFrameLogRecord) -> bool {
    log.assembled.is_some_and(|assembled| {
        container.width == log.width
            && container.height == log.height
            && container.size == assembled.encoded_bufsz
    })
}

/// [`is_match`] on indices, false when either index is out of range.
fn matches_at(
    container: &[ContainerFrameRecord],
    log: &[DecodedFrameLogRecord],
    i: usize,
    j: usize,
) -> bool {
    match (container.get(i), log.get(j)) {
        (Some(frame), Some(record)) => is_match(frame, record),
        _ => false,
    }
}

/// Choose the decision for cursors `(i, j)`.
///
/// Callers must ensure `i < container.len()` and `j < log.len()`.
pub fn next_state(
    container: &[ContainerFrameRecord],
    log: &[DecodedFrameLogRecord],
    i: usize,
    j: usize,
) -> AlignState {
    if log[j].assembled.is_none() {
        AlignState::MissingAssembled
    } else if matches_at(container, log, i, j) {
        AlignState::Aligned
    } else if matches_at(container, log, i + 1, j) && matches_at(container, log, i + 2, j + 1) {
        AlignState::ResyncContainer
    } else if matches_at(container, log, i, j + 1) && matches_at(container, log, i + 1, j + 2) {
        AlignState::ResyncLog
    } else {
        AlignState::HardMismatch
    }
}

/// Per-file counts of alignment outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationSummary {
    pub container_frames: usize,
    pub log_frames: usize,
    pub output_rows: usize,
    pub matched: usize,
    pub container_extra: usize,
    pub container_mismatch: usize,
    pub container_tail: usize,
    pub log_extra: usize,
    pub log_no_assembled: usize,
    pub log_mismatch: usize,
    pub log_tail: usize,
}

impl CorrelationSummary {
    /// Container frames without a matching log record.
    pub fn container_unmatched(&self) -> usize {
        self.container_extra + self.container_mismatch + self.container_tail
    }

    /// Log records without a matching container frame.
    pub fn log_unmatched(&self) -> usize {
        self.log_extra + self.log_no_assembled + self.log_mismatch + self.log_tail
    }

    /// Share of container frames that could not be matched, in `[0, 1]`.
    pub fn mismatch_ratio(&self) -> f64 {
        if self.container_frames == 0 {
            0.0
        } else {
            self.container_unmatched() as f64 / self.container_frames as f64
        }
    }

    fn count(&mut self, record: &CorrelatedRecord) {
        self.output_rows += 1;
        match record.reason {
            None => self.matched += 1,
            Some(UnmatchedReason::ExtraFrame) => self.container_extra += 1,
            Some(UnmatchedReason::ExtraFrameTail) => self.container_tail += 1,
            Some(UnmatchedReason::ExtraLog) => self.log_extra += 1,
            Some(UnmatchedReason::ExtraLogNoAssembled) => self.log_no_assembled += 1,
            Some(UnmatchedReason::ExtraLogTail) => self.log_tail += 1,
            Some(UnmatchedReason::Mismatch) => {
                self.container_mismatch += 1;
                self.log_mismatch += 1;
            }
        }
    }
}

impl Display for CorrelationSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "Container frames: {}", self.container_frames)?;
        writeln!(f, "Log decoded frames: {}", self.log_frames)?;
        writeln!(f, "Output rows: {}", self.output_rows)?;
        writeln!(f, "Matched: {}", self.matched)?;
        writeln!(
            f,
            "Unmatched container frames: {} (extra={}, mismatch={}, tail={})",
            self.container_unmatched(),
            self.container_extra,
            self.container_mismatch,
            self.container_tail,
        )?;
        write!(
            f,
            "Unmatched log frames: {} (extra={}, no_assembled={}, mismatch={}, tail={})",
            self.log_unmatched(),
            self.log_extra,
            self.log_no_assembled,
            self.log_mismatch,
            self.log_tail,
        )
    }
}

/// Correlated rows in scan order plus their summary.
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    pub records: Vec<CorrelatedRecord>,
    pub summary: CorrelationSummary,
}

impl Correlation {
    /// Rows holding a container frame that was not cleanly matched.
    pub fn unmatched_container(&self) -> impl Iterator<Item = &CorrelatedRecord> {
        self.records
            .iter()
            .filter(|record| record.container.is_some() && !record.is_matched())
    }

    /// Rows holding a log record that was not cleanly matched.
    pub fn unmatched_log(&self) -> impl Iterator<Item = &CorrelatedRecord> {
        self.records
            .iter()
            .filter(|record| record.log.is_some() && !record.is_matched())
    }
}

/// Scan state: both inputs, both cursors and the rows emitted so far.
struct Scan<'a> {
    container: &'a [ContainerFrameRecord],
    log: &'a [DecodedFrameLogRecord],
    i: usize,
    j: usize,
    correlation: Correlation,
}

impl<'a> Scan<'a> {
    fn emit(
        &mut self,
        i: Option<usize>,
        j: Option<usize>,
        sync_error: SyncError,
        reason: Option<UnmatchedReason>,
    ) {
        let record = CorrelatedRecord {
            container_index: i,
            container: i.map(|i| self.container[i].clone()),
            log_index: j,
            log: j.map(|j| self.log[j].clone()),
            sync_error,
            reason,
        };
        self.correlation.summary.count(&record);
        self.correlation.records.push(record);
    }

    /// Apply one decision and advance the cursors it consumes.
    fn apply(&mut self, state: AlignState) {
        let (i, j) = (self.i, self.j);
        match state {
            AlignState::MissingAssembled => {
                self.emit(
                    None,
                    Some(j),
                    SyncError::ExtraLog,
                    Some(UnmatchedReason::ExtraLogNoAssembled),
                );
                self.j += 1;
            }
            AlignState::Aligned => {
                self.emit(Some(i), Some(j), SyncError::None, None);
                self.i += 1;
                self.j += 1;
            }
            AlignState::ResyncContainer => {
                // The realigned pair is emitted by the next step as Aligned.
                self.emit(
                    Some(i),
                    None,
                    SyncError::ExtraFrame,
                    Some(UnmatchedReason::ExtraFrame),
                );
                self.i += 1;
            }
            AlignState::ResyncLog => {
                self.emit(None, Some(j), SyncError::ExtraLog, Some(UnmatchedReason::ExtraLog));
                self.j += 1;
            }
            AlignState::HardMismatch => {
                self.emit(
                    Some(i),
                    Some(j),
                    SyncError::Mismatch,
                    Some(UnmatchedReason::Mismatch),
                );
                self.i += 1;
                self.j += 1;
            }
        }
    }
}

/// Align `container` frames with time-sorted `log` records.
///
/// Deterministic: identical inputs always produce identical output. Rows are
/// emitted in scan order, so neither cursor ever moves backwards.
pub fn correlate(container: &[ContainerFrameRecord], log: &[DecodedFrameLogRecord]) -> Correlation {
    let mut scan = Scan {
        container,
        log,
        i: 0,
        j: 0,
        correlation: Correlation {
            records: Vec::with_capacity(container.len().max(log.len())),
            summary: CorrelationSummary {
                container_frames: container.len(),
                log_frames: log.len(),
                ..CorrelationSummary::default()
            },
        },
    };

    while scan.i < container.len() && scan.j < log.len() {
        let state = next_state(container, log, scan.i, scan.j);
        scan.apply(state);
    }

    for i in scan.i..container.len() {
        scan.emit(Some(i), None, SyncError::Tail, Some(UnmatchedReason::ExtraFrameTail));
    }
    for j in scan.j..log.len() {
        scan.emit(None, Some(j), SyncError::Tail, Some(UnmatchedReason::ExtraLogTail));
    }

    scan.correlation
}
