//! Internal conversion helpers shared by frame extraction and frame dumps.

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy pixel data from an RGB24 frame into a tightly-packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × 3);
/// the result can be passed directly to [`image::RgbImage::from_raw`].
pub(crate) fn frame_to_rgb_buffer(rgb_frame: &VideoFrame) -> Vec<u8> {
    let width = rgb_frame.width() as usize;
    let height = rgb_frame.height() as usize;
    let stride = rgb_frame.stride(0);
    let row_bytes = width * 3;
    let data = rgb_frame.data(0);

    if stride == row_bytes {
        data[..row_bytes * height].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * height);
        for row in 0..height {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
        }
        buffer
    }
}

/// Rescale a PTS value from stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * time_base.numerator() as f64 / time_base.denominator().max(1) as f64
}
