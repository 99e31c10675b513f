//! CSV export of correlated rows.
//!
//! The column schema is fixed (see [`COLUMNS`]). Container-side columns are
//! prefixed `video_`, log-side columns `log_`, and reassembly counters
//! `log_Assembled_`. A side that is absent from a row is written as empty
//! cells, never as zero, because zero is a legitimate value. Cells holding a
//! comma, a double quote or a line break are quoted with `"` and inner
//! quotes doubled.
//!
//! # Example
//!
//! ```no_run
//! use rtc_correlate::{RecordExporter, correlate};
//!
//! # let (container, log) = (Vec::new(), Vec::new());
//! let correlation = correlate(&container, &log);
//! let rows = RecordExporter::export_to_path("call.csv", &correlation.records)?;
//! println!("wrote {rows} rows");
//! # Ok::<(), rtc_correlate::CorrelateError>(())
//! ```

use std::{
    fmt::Display,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::{
    capture::ContainerFrameRecord,
    configuration::CorrelateOptions,
    correlator::CorrelatedRecord,
    error::CorrelateError,
    log_parser::{AssembledFrameInfo, DecodedFrameLogRecord},
    progress::{OperationType, ProgressTracker},
};

/// Output column names, in order.
pub const COLUMNS: [&str; 26] = [
    "frame_index",
    "video_RelativeTime",
    "video_time",
    "video_pts",
    "video_size",
    "video_width",
    "video_height",
    "video_key_frame",
    "video_pict_type",
    "video_is_corrupt",
    "sync_error",
    "log_RelativeTime",
    "log_ts",
    "log_First",
    "log_Last",
    "log_qp",
    "log_w",
    "log_h",
    "log_frameType",
    "log_Assembled_First",
    "log_Assembled_Last",
    "log_Assembled_EncodedBufsz",
    "log_Assembled_NumPktExp",
    "log_Assembled_NumPktRecv",
    "log_Assembled_NumNack",
    "log_Assembled_MaxNack",
];

const CONTAINER_COLUMNS: usize = 9;
const LOG_COLUMNS: usize = 8;
const ASSEMBLED_COLUMNS: usize = 7;

/// Writes correlated rows as CSV to any [`Write`] sink.
pub struct RecordExporter<W: Write> {
    writer: W,
    rows: usize,
}

impl<W: Write> RecordExporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, rows: 0 }
    }

    pub fn write_header(&mut self) -> Result<(), CorrelateError> {
        writeln!(self.writer, "{}", COLUMNS.join(","))?;
        Ok(())
    }

    /// Append one row; its `frame_index` is the number of rows written before it.
    pub fn write_record(&mut self, record: &CorrelatedRecord) -> Result<(), CorrelateError> {
        let mut cells: Vec<String> = Vec::with_capacity(COLUMNS.len());
        cells.push(self.rows.to_string());

        match &record.container {
            Some(frame) => push_container(&mut cells, frame),
            None => push_empty(&mut cells, CONTAINER_COLUMNS),
        }

        cells.push(record.sync_error.to_string());

        match &record.log {
            Some(log) => push_log(&mut cells, log),
            None => push_empty(&mut cells, LOG_COLUMNS),
        }

        match record.log.as_ref().and_then(|log| log.assembled.as_ref()) {
            Some(assembled) => push_assembled(&mut cells, assembled),
            None => push_empty(&mut cells, ASSEMBLED_COLUMNS),
        }

        let cells: Vec<String> = cells.into_iter().map(escape).collect();
        writeln!(self.writer, "{}", cells.join(","))?;
        self.rows += 1;
        Ok(())
    }

    /// Write the header followed by every record. Returns the row count.
    pub fn write_all(&mut self, records: &[CorrelatedRecord]) -> Result<usize, CorrelateError> {
        self.write_header()?;
        for record in records {
            self.write_record(record)?;
        }
        self.writer.flush()?;
        Ok(self.rows)
    }

    /// Rows written so far, excluding the header.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl RecordExporter<BufWriter<File>> {
    /// Write `records` to a new CSV file at `path`, creating parent
    /// directories as needed. Returns the row count.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelateError::OutputError`] if the file cannot be created
    /// or written.
    pub fn export_to_path<P: AsRef<Path>>(
        path: P,
        records: &[CorrelatedRecord],
    ) -> Result<usize, CorrelateError> {
        Self::export_to_path_with_options(path, records, &CorrelateOptions::default())
    }

    /// Like [`export_to_path`](Self::export_to_path), reporting
    /// [`OperationType::Export`] progress per row.
    pub fn export_to_path_with_options<P: AsRef<Path>>(
        path: P,
        records: &[CorrelatedRecord],
        options: &CorrelateOptions,
    ) -> Result<usize, CorrelateError> {
        let path = path.as_ref();
        let output_error = |reason: String| CorrelateError::OutputError {
            path: path.to_path_buf(),
            reason,
        };

        if path.exists() && !options.overwrite {
            return Err(output_error("file already exists".to_string()));
        }
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|error| output_error(error.to_string()))?;
        }
        let file = File::create(path).map_err(|error| output_error(error.to_string()))?;

        let mut tracker = ProgressTracker::new(
            options.progress.clone(),
            OperationType::Export,
            Some(records.len() as u64),
            options.batch_size,
        );
        let mut exporter = RecordExporter::new(BufWriter::new(file));
        let written = write_tracked(&mut exporter, records, &mut tracker);
        tracker.finish();

        let rows = written.map_err(|error| match error {
            CorrelateError::IoError(io) => output_error(io.to_string()),
            other => other,
        })?;

        log::debug!("Wrote {} rows to {}", rows, path.display());
        Ok(rows)
    }
}

fn write_tracked<W: Write>(
    exporter: &mut RecordExporter<W>,
    records: &[CorrelatedRecord],
    tracker: &mut ProgressTracker,
) -> Result<usize, CorrelateError> {
    exporter.write_header()?;
    for record in records {
        exporter.write_record(record)?;
        tracker.advance();
    }
    exporter.writer.flush()?;
    Ok(exporter.rows)
}

/// Quote a cell holding a separator, a quote or a line break.
fn escape(cell: String) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell
    }
}

fn optional<T: Display>(value: Option<T>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

fn push_empty(cells: &mut Vec<String>, count: usize) {
    cells.extend(std::iter::repeat_n(String::new(), count));
}

fn push_container(cells: &mut Vec<String>, frame: &ContainerFrameRecord) {
    cells.push(optional(frame.relative_time));
    cells.push(optional(frame.time));
    cells.push(optional(frame.pts));
    cells.push(frame.size.to_string());
    cells.push(frame.width.to_string());
    cells.push(frame.height.to_string());
    cells.push(frame.key_frame.to_string());
    cells.push(frame.picture_type.to_string());
    cells.push(frame.is_corrupt.to_string());
}

fn push_log(cells: &mut Vec<String>, log: &DecodedFrameLogRecord) {
    cells.push(log.relative_seconds().to_string());
    cells.push(log.ts.to_string());
    cells.push(log.first.to_string());
    cells.push(log.last.to_string());
    cells.push(log.qp.to_string());
    cells.push(log.width.to_string());
    cells.push(log.height.to_string());
    cells.push(log.frame_type.to_string());
}

fn push_assembled(cells: &mut Vec<String>, assembled: &AssembledFrameInfo) {
    cells.push(assembled.first.to_string());
    cells.push(assembled.last.to_string());
    cells.push(assembled.encoded_bufsz.to_string());
    cells.push(assembled.num_pkt_exp.to_string());
    cells.push(assembled.num_pkt_recv.to_string());
    cells.push(assembled.num_nack.to_string());
    cells.push(assembled.max_nack.to_string());
}
