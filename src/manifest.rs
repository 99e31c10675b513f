//! Batch inputs: run manifests and per-video JSON configurations.
//!
//! A run manifest is a CSV with a header row naming at least the
//! `frame_dump` (container) and `rtc_log` (decoder log) columns; other
//! columns, such as test durations or source resolutions, are ignored. Fields
//! are plain comma-separated values without quoting.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::{
    configuration::PathLayout,
    error::CorrelateError,
    pipeline::{CapturePair, swap_component},
};

const CONTAINER_COLUMN: &str = "frame_dump";
const LOG_COLUMN: &str = "rtc_log";

/// Read a run manifest into capture pairs.
///
/// Each output CSV is named after the log (`x.rtc.log` → `x.csv`) and placed
/// beside the container, with the layout's `capture_dir` component swapped
/// for `output_dir` when present.
///
/// # Errors
///
/// - [`CorrelateError::InputError`] if the manifest cannot be read.
/// - [`CorrelateError::InvalidManifest`] if a required column is missing or
///   a row is shorter than the header.
pub fn read_manifest<P: AsRef<Path>>(
    path: P,
    layout: &PathLayout,
) -> Result<Vec<CapturePair>, CorrelateError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|error| CorrelateError::InputError {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;
    parse_manifest(&content, path, layout)
}

pub(crate) fn parse_manifest(
    content: &str,
    path: &Path,
    layout: &PathLayout,
) -> Result<Vec<CapturePair>, CorrelateError> {
    let invalid = |reason: String| CorrelateError::InvalidManifest {
        path: path.to_path_buf(),
        reason,
    };

    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header) = lines.next().ok_or_else(|| invalid("manifest is empty".to_string()))?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let column = |name: &str| {
        columns
            .iter()
            .position(|column| *column == name)
            .ok_or_else(|| invalid(format!("missing '{name}' column")))
    };
    let container_column = column(CONTAINER_COLUMN)?;
    let log_column = column(LOG_COLUMN)?;

    let mut pairs = Vec::new();
    for (line_number, line) in lines {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let (Some(container), Some(log)) = (fields.get(container_column), fields.get(log_column))
        else {
            return Err(invalid(format!(
                "line {} has {} fields, expected {}",
                line_number + 1,
                fields.len(),
                columns.len()
            )));
        };

        let container_path = PathBuf::from(container);
        let log_path = PathBuf::from(log);
        pairs.push(CapturePair {
            output_path: output_path_for(&container_path, &log_path, layout),
            log_path,
            container_path,
        });
    }

    log::debug!("Read {} capture pair(s) from {}", pairs.len(), path.display());
    Ok(pairs)
}

fn output_path_for(container_path: &Path, log_path: &Path, layout: &PathLayout) -> PathBuf {
    let directory = container_path.parent().unwrap_or(Path::new(""));
    let directory = swap_component(directory, &layout.capture_dir, &layout.output_dir)
        .unwrap_or_else(|| directory.to_path_buf());

    let log_name = log_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = log_name
        .strip_suffix(layout.log_extension.as_str())
        .unwrap_or_else(|| log_name.split('.').next().unwrap_or(&log_name));

    directory.join(format!("{stem}{}", layout.output_extension))
}

/// Extract `VideoPath` from a JSON video configuration.
pub(crate) fn video_path_from_config(config_path: &Path) -> Result<PathBuf, CorrelateError> {
    let content =
        std::fs::read_to_string(config_path).map_err(|error| CorrelateError::InputError {
            path: config_path.to_path_buf(),
            reason: error.to_string(),
        })?;
    let invalid = |reason: String| CorrelateError::InvalidManifest {
        path: config_path.to_path_buf(),
        reason,
    };

    let value: Value = serde_json::from_str(&content).map_err(|error| invalid(error.to_string()))?;
    value
        .get("VideoPath")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| invalid("missing string field 'VideoPath'".to_string()))
}
