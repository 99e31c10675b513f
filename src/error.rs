//! Error types for the `rtc-correlate` crate.
//!
//! This module defines [`CorrelateError`], the unified error type returned by
//! every fallible operation in the crate. File-level errors carry the path of
//! the offending file so batch reports can name the capture that failed.
//!
//! Misalignment between the two captures is never an error: it surfaces only
//! as [`SyncError`](crate::SyncError) annotations on the correlated rows.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `rtc-correlate` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CorrelateError {
    /// An input file is missing or unreadable.
    #[error("Failed to read input file at {path}: {reason}")]
    InputError {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying reason the read failed.
        reason: String,
    },

    /// The capture container is corrupt or its video stream cannot be decoded.
    #[error("Failed to decode capture {path}: {reason}")]
    DecodeError {
        /// Path of the container being decoded.
        path: PathBuf,
        /// Decoder or demuxer message.
        reason: String,
    },

    /// A configured log pattern failed to compile or has the wrong shape.
    #[error("Invalid {name} pattern: {reason}")]
    InvalidPattern {
        /// Which pattern was rejected (`assembled` or `decoded`).
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A batch manifest or video configuration could not be interpreted.
    #[error("Invalid manifest {path}: {reason}")]
    InvalidManifest {
        /// Path of the manifest.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The correlated output could not be written.
    #[error("Failed to write output {path}: {reason}")]
    OutputError {
        /// Destination path.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while dumping frames.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl From<FfmpegError> for CorrelateError {
    fn from(error: FfmpegError) -> Self {
        CorrelateError::FfmpegError(error.to_string())
    }
}
