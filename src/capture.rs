//! Container frame extraction.
//!
//! [`CaptureFile`] opens the container the decoder saved during a call,
//! decodes its first video stream from start to end, and describes every
//! frame as a [`ContainerFrameRecord`]. Correlation assumes each transport
//! unit (packet) yields exactly one frame, so packets that decode to zero
//! or several frames are counted and left out of the sequence.
//!
//! # Example
//!
//! ```no_run
//! use rtc_correlate::CaptureFile;
//!
//! let mut capture = CaptureFile::open("call.ivf")?;
//! let extracted = capture.frames()?;
//! for frame in &extracted.frames {
//!     println!("#{} {}x{} {} bytes", frame.index, frame.width, frame.height, frame.size);
//! }
//! # Ok::<(), rtc_correlate::CorrelateError>(())
//! ```

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::context::Context as CodecContext,
    format::context::Input,
    frame::Video as VideoFrame,
    media::Type,
    util::{error::EAGAIN, picture::Type as FfmpegPictureType},
};

use crate::{
    configuration::CorrelateOptions,
    conversion::pts_to_seconds,
    dump::FrameDumper,
    error::CorrelateError,
    progress::{OperationType, ProgressTracker},
};

/// Picture coding type of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PictureType {
    /// Intra.
    I,
    /// Predicted.
    P,
    /// Bi-directionally predicted.
    B,
    /// S(GMC)-VOP (MPEG-4).
    S,
    /// Switching intra.
    SI,
    /// Switching predicted.
    SP,
    /// BI type.
    BI,
    /// The decoder did not report a type.
    Unknown,
}

impl PictureType {
    pub fn as_str(self) -> &'static str {
        match self {
            PictureType::I => "I",
            PictureType::P => "P",
            PictureType::B => "B",
            PictureType::S => "S",
            PictureType::SI => "SI",
            PictureType::SP => "SP",
            PictureType::BI => "BI",
            PictureType::Unknown => "NONE",
        }
    }
}

impl From<FfmpegPictureType> for PictureType {
    fn from(kind: FfmpegPictureType) -> Self {
        match kind {
            FfmpegPictureType::I => PictureType::I,
            FfmpegPictureType::P => PictureType::P,
            FfmpegPictureType::B => PictureType::B,
            FfmpegPictureType::S => PictureType::S,
            FfmpegPictureType::SI => PictureType::SI,
            FfmpegPictureType::SP => PictureType::SP,
            FfmpegPictureType::BI => PictureType::BI,
            _ => PictureType::Unknown,
        }
    }
}

impl Display for PictureType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// One frame of the capture container, in decode order.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerFrameRecord {
    /// Position in the extracted sequence (excluded packets leave no gap).
    pub index: usize,
    /// Presentation timestamp in stream time-base units (DTS when absent).
    pub pts: Option<i64>,
    /// `pts` in seconds.
    pub time: Option<f64>,
    /// Seconds since the first extracted frame.
    pub relative_time: Option<f64>,
    /// Encoded payload size in bytes.
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub key_frame: bool,
    pub picture_type: PictureType,
    /// The decoder flagged the frame as corrupt.
    pub is_corrupt: bool,
}

/// The outcome of decoding a capture.
#[derive(Debug, Clone, Default)]
pub struct ExtractedFrames {
    /// Frames from packets that decoded to exactly one frame.
    pub frames: Vec<ContainerFrameRecord>,
    /// Packets that decoded to more than one frame.
    pub multi_frame_packets: u64,
    /// Non-empty packets that decoded to no frame.
    pub frameless_packets: u64,
    /// Frames only released when the decoder was flushed.
    pub flushed_frames: u64,
}

impl ExtractedFrames {
    /// Total packets left out of [`frames`](Self::frames).
    pub fn excluded_packets(&self) -> u64 {
        self.multi_frame_packets + self.frameless_packets
    }

    /// Account for one packet that decoded to `yielded` frames.
    ///
    /// Returns the sequence index its frame takes when the packet is kept.
    /// Excluded packets are counted and leave no gap in the indices.
    pub(crate) fn admit(&mut self, yielded: u32) -> Option<usize> {
        match yielded {
            1 => Some(self.frames.len()),
            0 => {
                self.frameless_packets += 1;
                None
            }
            _ => {
                self.multi_frame_packets += 1;
                None
            }
        }
    }
}

/// The stream frames are decoded from.
#[derive(Debug, Clone)]
struct VideoStream {
    index: usize,
    time_base: Rational,
    codec: String,
}

/// An opened capture container.
///
/// A container without a video stream opens successfully and yields no
/// frames, so its log still correlates into tail rows.
pub struct CaptureFile {
    input_context: Input,
    video: Option<VideoStream>,
    file_path: PathBuf,
}

impl Debug for CaptureFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CaptureFile")
            .field("video", &self.video)
            .field("file_path", &self.file_path)
            .finish_non_exhaustive()
    }
}

impl CaptureFile {
    /// Open a capture container and locate its first video stream.
    ///
    /// # Errors
    ///
    /// - [`CorrelateError::InputError`] if the file does not exist or cannot
    ///   be read.
    /// - [`CorrelateError::DecodeError`] if FFmpeg cannot parse the container.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CorrelateError> {
        let file_path = path.as_ref().to_path_buf();
        log::debug!("Opening capture: {}", file_path.display());

        std::fs::metadata(&file_path).map_err(|error| CorrelateError::InputError {
            path: file_path.clone(),
            reason: error.to_string(),
        })?;

        // Initialise ffmpeg (safe to call multiple times).
        ffmpeg_next::init().map_err(|error| CorrelateError::DecodeError {
            path: file_path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input_context =
            ffmpeg_next::format::input(&file_path).map_err(|error| CorrelateError::DecodeError {
                path: file_path.clone(),
                reason: error.to_string(),
            })?;

        let video = input_context
            .streams()
            .find(|stream| stream.parameters().medium() == Type::Video)
            .map(|stream| VideoStream {
                index: stream.index(),
                time_base: stream.time_base(),
                codec: stream.parameters().id().name().to_string(),
            });

        match &video {
            Some(video) => log::info!(
                "Opened capture: {} (format={}, video stream={}, codec={})",
                file_path.display(),
                input_context.format().name(),
                video.index,
                video.codec,
            ),
            None => log::warn!(
                "{} has no video stream; it yields no frames",
                file_path.display()
            ),
        }

        Ok(Self {
            input_context,
            video,
            file_path,
        })
    }

    /// Path the capture was opened from.
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Name of the video codec, or `None` when the container has no video.
    pub fn codec(&self) -> Option<&str> {
        self.video.as_ref().map(|video| video.codec.as_str())
    }

    /// Decode the whole video stream with default options.
    pub fn frames(&mut self) -> Result<ExtractedFrames, CorrelateError> {
        self.frames_with_options(&CorrelateOptions::default())
    }

    /// Decode the whole video stream.
    ///
    /// Reports [`OperationType::FrameExtraction`] progress per packet and,
    /// when a frame dump directory is configured, saves every retained frame
    /// with [`OperationType::FrameDump`] progress per image.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelateError::DecodeError`] if demuxing or decoding fails.
    pub fn frames_with_options(
        &mut self,
        options: &CorrelateOptions,
    ) -> Result<ExtractedFrames, CorrelateError> {
        let Some(video) = self.video.clone() else {
            return Ok(ExtractedFrames::default());
        };
        let decode_error = |error: FfmpegError| CorrelateError::DecodeError {
            path: self.file_path.clone(),
            reason: error.to_string(),
        };

        let (mut decoder, expected_frames) = {
            let stream = self
                .input_context
                .stream(video.index)
                .ok_or_else(|| CorrelateError::DecodeError {
                    path: self.file_path.clone(),
                    reason: format!("stream {} disappeared", video.index),
                })?;
            let context = CodecContext::from_parameters(stream.parameters()).map_err(decode_error)?;
            let decoder = context.decoder().video().map_err(decode_error)?;
            let expected = u64::try_from(stream.frames()).ok().filter(|&count| count > 0);
            (decoder, expected)
        };

        let mut dumper = match &options.frame_dump {
            Some(directory) => Some((
                FrameDumper::new(directory, &self.file_path)?,
                ProgressTracker::new(
                    options.progress.clone(),
                    OperationType::FrameDump,
                    expected_frames,
                    options.batch_size,
                ),
            )),
            None => None,
        };
        let mut tracker = ProgressTracker::new(
            options.progress.clone(),
            OperationType::FrameExtraction,
            expected_frames,
            options.batch_size,
        );

        let mut extracted = ExtractedFrames::default();
        let mut first_time: Option<f64> = None;
        let mut packet = Packet::empty();

        loop {
            match packet.read(&mut self.input_context) {
                Ok(()) => {}
                Err(FfmpegError::Eof) => break,
                Err(error) => return Err(decode_error(error)),
            }
            if packet.stream() != video.index || packet.size() == 0 {
                continue;
            }

            decoder.send_packet(&packet).map_err(decode_error)?;

            let mut first_frame: Option<VideoFrame> = None;
            let mut yielded = 0_u32;
            loop {
                let mut frame = VideoFrame::empty();
                if !received(decoder.receive_frame(&mut frame)).map_err(decode_error)? {
                    break;
                }
                yielded += 1;
                if first_frame.is_none() {
                    first_frame = Some(frame);
                }
            }
            tracker.advance();

            let (Some(index), Some(frame)) = (extracted.admit(yielded), first_frame) else {
                if yielded > 1 {
                    log::debug!(
                        "Packet at pts {:?} decoded to {} frames; excluded",
                        packet.pts(),
                        yielded
                    );
                }
                continue;
            };

            let pts = packet.pts().or(packet.dts());
            let time = pts.map(|pts| pts_to_seconds(pts, video.time_base));
            if first_time.is_none() {
                first_time = time;
            }

            if let Some((dumper, dump_tracker)) = dumper.as_mut() {
                dumper.save(index, &frame)?;
                dump_tracker.advance();
            }

            extracted.frames.push(ContainerFrameRecord {
                index,
                pts,
                time,
                relative_time: time.zip(first_time).map(|(time, first)| time - first),
                size: packet.size() as u64,
                width: frame.width(),
                height: frame.height(),
                key_frame: frame.is_key(),
                picture_type: PictureType::from(frame.kind()),
                is_corrupt: frame.is_corrupt(),
            });
        }

        // Frames still buffered in the decoder have no packet of their own.
        decoder.send_eof().map_err(decode_error)?;
        let mut frame = VideoFrame::empty();
        while received(decoder.receive_frame(&mut frame)).map_err(decode_error)? {
            extracted.flushed_frames += 1;
        }
        tracker.finish();
        if let Some((_, dump_tracker)) = dumper.as_mut() {
            dump_tracker.finish();
        }

        if extracted.multi_frame_packets > 0 {
            log::warn!(
                "{}: {} packet(s) decoded to multiple frames and were excluded",
                self.file_path.display(),
                extracted.multi_frame_packets,
            );
        }
        if extracted.frameless_packets > 0 || extracted.flushed_frames > 0 {
            log::debug!(
                "{}: {} packet(s) produced no frame, {} frame(s) released on flush",
                self.file_path.display(),
                extracted.frameless_packets,
                extracted.flushed_frames,
            );
        }

        Ok(extracted)
    }
}

/// Interpret a `receive_frame` result: `Ok(true)` when a frame arrived,
/// `Ok(false)` once the decoder needs more input or is fully drained.
fn received(result: Result<(), FfmpegError>) -> Result<bool, FfmpegError> {
    match result {
        Ok(()) => Ok(true),
        Err(FfmpegError::Eof) => Ok(false),
        Err(FfmpegError::Other { errno }) if errno == EAGAIN => Ok(false),
        Err(error) => Err(error),
    }
}
