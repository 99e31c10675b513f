//! JPEG dumps of retained container frames.
//!
//! Dumped frames are named `<stem>_frames_<index>_<w>x<h>.jpg`, where
//! `<index>` is the frame's position in the extracted sequence, so the files
//! line up with the `video_*` columns of the correlated CSV.

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    format::Pixel,
    frame::Video as VideoFrame,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::RgbImage;

use crate::{conversion::frame_to_rgb_buffer, error::CorrelateError};

/// A scaler bound to one source format and resolution.
///
/// Real-time streams change resolution mid-capture, so the scaler is
/// rebuilt whenever the source geometry changes.
struct CachedScaler {
    format: Pixel,
    width: u32,
    height: u32,
    context: ScalingContext,
}

pub(crate) struct FrameDumper {
    directory: PathBuf,
    stem: String,
    scaler: Option<CachedScaler>,
}

impl FrameDumper {
    pub(crate) fn new(directory: &Path, container_path: &Path) -> Result<Self, CorrelateError> {
        std::fs::create_dir_all(directory).map_err(|error| CorrelateError::OutputError {
            path: directory.to_path_buf(),
            reason: error.to_string(),
        })?;

        let stem = container_path
            .file_name()
            .map(|name| name.to_string_lossy())
            .and_then(|name| name.split('.').next().map(str::to_string))
            .unwrap_or_else(|| "capture".to_string());

        log::debug!("Dumping frames of {} to {}", stem, directory.display());

        Ok(Self {
            directory: directory.to_path_buf(),
            stem,
            scaler: None,
        })
    }

    pub(crate) fn file_name(&self, index: usize, width: u32, height: u32) -> String {
        format!("{}_frames_{index:05}_{width}x{height}.jpg", self.stem)
    }

    /// Convert `frame` to RGB and save it as a JPEG.
    pub(crate) fn save(
        &mut self,
        index: usize,
        frame: &VideoFrame,
    ) -> Result<PathBuf, CorrelateError> {
        let (format, width, height) = (frame.format(), frame.width(), frame.height());
        let path = self.directory.join(self.file_name(index, width, height));

        let stale = !matches!(
            &self.scaler,
            Some(cached)
                if cached.format == format && cached.width == width && cached.height == height
        );
        if stale {
            let context = ScalingContext::get(
                format,
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                ScalingFlags::BILINEAR,
            )?;
            self.scaler = Some(CachedScaler {
                format,
                width,
                height,
                context,
            });
        }

        let mut rgb_frame = VideoFrame::empty();
        if let Some(cached) = self.scaler.as_mut() {
            cached.context.run(frame, &mut rgb_frame)?;
        }

        let image = RgbImage::from_raw(width, height, frame_to_rgb_buffer(&rgb_frame))
            .ok_or_else(|| CorrelateError::OutputError {
                path: path.clone(),
                reason: "decoded frame buffer does not match its dimensions".to_string(),
            })?;
        image.save(&path)?;

        Ok(path)
    }
}
