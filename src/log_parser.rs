//! Decoder log parsing.
//!
//! The decoder process under test emits two kinds of lines of interest:
//! one when packet reassembly finishes an encoded frame, and one when the
//! decoder hands out a decompressed frame. [`LogParser`] extracts both,
//! keeps the last reassembly record per [`FrameKey`], and joins it onto the
//! decoded records once the whole log has been read.
//!
//! # Example
//!
//! ```no_run
//! use rtc_correlate::{LogParser, LogPatterns};
//!
//! let parser = LogParser::new(LogPatterns::default());
//! let log = parser.parse_file("call.rtc.log")?;
//! println!("{} decoded, {} assembled", log.decoded.len(), log.assembled.len());
//! # Ok::<(), rtc_correlate::CorrelateError>(())
//! ```

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    str::FromStr,
};

use regex::Captures;

use crate::{configuration::LogPatterns, error::CorrelateError};

/// Packet-sequence bounds identifying one encoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameKey {
    /// First packet sequence number of the frame.
    pub first: u64,
    /// Last packet sequence number of the frame.
    pub last: u64,
}

impl FrameKey {
    pub fn new(first: u64, last: u64) -> Self {
        Self { first, last }
    }
}

/// Reassembly counters for one encoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssembledFrameInfo {
    /// First packet sequence number.
    pub first: u64,
    /// Last packet sequence number.
    pub last: u64,
    /// Size of the reassembled encoded frame in bytes.
    pub encoded_bufsz: u64,
    /// Packets expected for the frame.
    pub num_pkt_exp: u64,
    /// Packets actually received.
    pub num_pkt_recv: u64,
    /// Retransmission requests issued for the frame.
    pub num_nack: u64,
    /// Largest retransmission count of any single packet.
    pub max_nack: u64,
}

impl AssembledFrameInfo {
    pub fn key(&self) -> FrameKey {
        FrameKey::new(self.first, self.last)
    }
}

/// Frame type reported by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameType {
    Key,
    Delta,
    /// Any other word the decoder printed, kept verbatim.
    Other(String),
}

impl FrameType {
    pub fn from_word(word: &str) -> Self {
        match word {
            "key" => FrameType::Key,
            "delta" => FrameType::Delta,
            other => FrameType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FrameType::Key => "key",
            FrameType::Delta => "delta",
            FrameType::Other(word) => word,
        }
    }
}

impl Display for FrameType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// One decoded frame as reported by the decoder log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrameLogRecord {
    /// Capture-relative timestamp in microseconds, as logged.
    pub ts: u64,
    /// Microseconds since the earliest decoded frame in the log.
    pub relative_time: u64,
    /// First packet sequence number.
    pub first: u64,
    /// Last packet sequence number.
    pub last: u64,
    /// Quantization parameter.
    pub qp: u32,
    pub width: u32,
    pub height: u32,
    pub frame_type: FrameType,
    /// Reassembly counters joined by [`FrameKey`], if they were logged.
    pub assembled: Option<AssembledFrameInfo>,
}

impl DecodedFrameLogRecord {
    pub fn key(&self) -> FrameKey {
        FrameKey::new(self.first, self.last)
    }

    /// [`relative_time`](Self::relative_time) in seconds.
    pub fn relative_seconds(&self) -> f64 {
        self.relative_time as f64 / 1_000_000.0
    }
}

/// The result of scanning one decoder log.
#[derive(Debug, Clone, Default)]
pub struct ParsedLog {
    /// Decoded frames sorted by `ts`, each joined with its reassembly record.
    pub decoded: Vec<DecodedFrameLogRecord>,
    /// Reassembly records, one per key; the last occurrence in the log wins.
    pub assembled: BTreeMap<FrameKey, AssembledFrameInfo>,
    /// Number of lines read.
    pub lines_read: u64,
    /// Number of lines that matched neither pattern (or failed to convert).
    pub lines_ignored: u64,
}

impl ParsedLog {
    /// Number of decoded records without a reassembly record.
    pub fn missing_assembled(&self) -> usize {
        self.decoded
            .iter()
            .filter(|record| record.assembled.is_none())
            .count()
    }
}

/// Line-oriented scanner for decoder logs.
#[derive(Debug, Clone, Default)]
pub struct LogParser {
    patterns: LogPatterns,
}

impl LogParser {
    pub fn new(patterns: LogPatterns) -> Self {
        Self { patterns }
    }

    /// Parse the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelateError::InputError`] if the file is missing or a
    /// read fails part-way. An empty file is not an error.
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<ParsedLog, CorrelateError> {
        let path = path.as_ref();
        log::debug!("Parsing decoder log: {}", path.display());

        let input_error = |error: std::io::Error| CorrelateError::InputError {
            path: path.to_path_buf(),
            reason: error.to_string(),
        };

        let file = File::open(path).map_err(input_error)?;
        let parsed = self.parse_reader(BufReader::new(file)).map_err(|error| match error {
            CorrelateError::IoError(io) => input_error(io),
            other => other,
        })?;

        log::debug!(
            "Parsed {}: {} lines, {} decoded, {} assembled, {} without assembled",
            path.display(),
            parsed.lines_read,
            parsed.decoded.len(),
            parsed.assembled.len(),
            parsed.missing_assembled(),
        );

        Ok(parsed)
    }

    /// Parse a log from any buffered reader.
    ///
    /// Lines are decoded lossily, so stray non-UTF-8 bytes in the log do
    /// not abort the scan.
    pub fn parse_reader<R: BufRead>(&self, mut reader: R) -> Result<ParsedLog, CorrelateError> {
        let mut parsed = ParsedLog::default();
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            if reader.read_until(b'\n', &mut buffer)? == 0 {
                break;
            }
            parsed.lines_read += 1;

            let line = String::from_utf8_lossy(&buffer);
            if !self.scan_line(&line, &mut parsed) {
                parsed.lines_ignored += 1;
            }
        }

        // Stable sort: records sharing a timestamp keep their log order.
        parsed.decoded.sort_by_key(|record| record.ts);

        let time_zero = parsed.decoded.first().map(|record| record.ts).unwrap_or(0);
        for record in &mut parsed.decoded {
            record.relative_time = record.ts - time_zero;
            record.assembled = parsed.assembled.get(&record.key()).copied();
        }

        Ok(parsed)
    }

    /// Returns `true` if the line was consumed by either pattern.
    fn scan_line(&self, line: &str, parsed: &mut ParsedLog) -> bool {
        if let Some(captures) = self.patterns.assembled.captures(line) {
            return match assembled_from(&captures) {
                Some(info) => {
                    parsed.assembled.insert(info.key(), info);
                    true
                }
                None => {
                    log::warn!(
                        "Ignoring assembled-frame line with out-of-range values: {}",
                        line.trim_end()
                    );
                    false
                }
            };
        }

        if let Some(captures) = self.patterns.decoded.captures(line) {
            return match decoded_from(&captures) {
                Some(record) => {
                    parsed.decoded.push(record);
                    true
                }
                None => {
                    log::warn!(
                        "Ignoring decoded-frame line with out-of-range values: {}",
                        line.trim_end()
                    );
                    false
                }
            };
        }

        false
    }
}

fn field<T: FromStr>(captures: &Captures<'_>, index: usize) -> Option<T> {
    captures.get(index)?.as_str().parse().ok()
}

fn assembled_from(captures: &Captures<'_>) -> Option<AssembledFrameInfo> {
    Some(AssembledFrameInfo {
        first: field(captures, 1)?,
        last: field(captures, 2)?,
        encoded_bufsz: field(captures, 3)?,
        num_pkt_exp: field(captures, 4)?,
        num_pkt_recv: field(captures, 5)?,
        num_nack: field(captures, 6)?,
        max_nack: field(captures, 7)?,
    })
}

fn decoded_from(captures: &Captures<'_>) -> Option<DecodedFrameLogRecord> {
    Some(DecodedFrameLogRecord {
        ts: field(captures, 1)?,
        relative_time: 0,
        first: field(captures, 2)?,
        last: field(captures, 3)?,
        qp: field(captures, 4)?,
        width: field(captures, 5)?,
        height: field(captures, 6)?,
        frame_type: FrameType::from_word(captures.get(7)?.as_str()),
        assembled: None,
    })
}
