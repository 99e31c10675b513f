//! Batch input and pipeline integration tests.
//!
//! Tests that decode a real capture require fixture files from
//! `tests/fixtures/generate_fixtures.sh` and are skipped when they are
//! missing.

use std::path::{Path, PathBuf};

use rtc_correlate::{
    CapturePair, CorrelateError, CorrelateOptions, PathLayout, process_batch, process_pair,
    read_manifest,
};

fn fixture_container() -> &'static str {
    "tests/fixtures/sample_capture.ivf"
}

fn fixture_log() -> &'static str {
    "tests/fixtures/sample_capture.rtc.log"
}

// ── CapturePair derivation ─────────────────────────────────────────

#[test]
fn pair_from_video_path_follows_layout() {
    let pair = CapturePair::from_video_path(
        "data/rtc_input/session_a/clip.yuv",
        &PathLayout::default(),
    )
    .expect("pair");

    assert_eq!(pair.log_path, PathBuf::from("data/rtc_output/session_a/clip.rtc.log"));
    assert_eq!(pair.container_path, PathBuf::from("data/rtc_output/session_a/clip.ivf"));
    assert_eq!(pair.output_path, PathBuf::from("data/processed_rtc/session_a/clip.csv"));
}

#[test]
fn pair_from_video_path_requires_input_dir() {
    let result = CapturePair::from_video_path("data/elsewhere/clip.yuv", &PathLayout::default());
    assert!(matches!(result, Err(CorrelateError::InvalidManifest { .. })));
}

#[test]
fn pair_from_video_path_requires_video_extension() {
    let result = CapturePair::from_video_path("data/rtc_input/clip.mp4", &PathLayout::default());
    assert!(matches!(result, Err(CorrelateError::InvalidManifest { .. })));
}

#[test]
fn pair_from_video_config() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let config = directory.path().join("clip.json");
    std::fs::write(
        &config,
        r#"{"VideoPath": "data/rtc_input/clip.yuv", "Width": 1280, "Height": 720}"#,
    )
    .expect("Failed to write config");

    let pair = CapturePair::from_video_config(&config, &PathLayout::default()).expect("pair");
    assert_eq!(pair.container_path, PathBuf::from("data/rtc_output/clip.ivf"));
}

#[test]
fn video_config_without_video_path_is_rejected() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let config = directory.path().join("clip.json");
    std::fs::write(&config, r#"{"Width": 1280}"#).expect("Failed to write config");

    let result = CapturePair::from_video_config(&config, &PathLayout::default());
    assert!(matches!(result, Err(CorrelateError::InvalidManifest { .. })));
}

// ── Manifests ──────────────────────────────────────────────────────

#[test]
fn manifest_rows_become_pairs() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let manifest = directory.path().join("runs.csv");
    std::fs::write(
        &manifest,
        "duration,frame_dump,rtc_log\n\
         10,data/rtc_output/a/clip.ivf,data/rtc_output/a/clip.rtc.log\n\
         \n\
         20,data/rtc_output/b/other.ivf,data/rtc_output/b/other.rtc.log\n",
    )
    .expect("Failed to write manifest");

    let pairs = read_manifest(&manifest, &PathLayout::default()).expect("manifest");

    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].container_path, PathBuf::from("data/rtc_output/a/clip.ivf"));
    assert_eq!(pairs[0].log_path, PathBuf::from("data/rtc_output/a/clip.rtc.log"));
    assert_eq!(pairs[0].output_path, PathBuf::from("data/processed_rtc/a/clip.csv"));
    assert_eq!(pairs[1].output_path, PathBuf::from("data/processed_rtc/b/other.csv"));
}

#[test]
fn manifest_without_required_column_is_rejected() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let manifest = directory.path().join("runs.csv");
    std::fs::write(&manifest, "frame_dump,duration\nx.ivf,10\n").expect("Failed to write");

    match read_manifest(&manifest, &PathLayout::default()) {
        Err(CorrelateError::InvalidManifest { reason, .. }) => {
            assert!(reason.contains("rtc_log"), "{reason}");
        }
        other => panic!("Expected InvalidManifest, got: {other:?}"),
    }
}

#[test]
fn manifest_short_row_is_rejected() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let manifest = directory.path().join("runs.csv");
    std::fs::write(&manifest, "frame_dump,rtc_log\nonly_one.ivf\n").expect("Failed to write");

    match read_manifest(&manifest, &PathLayout::default()) {
        Err(CorrelateError::InvalidManifest { reason, .. }) => {
            assert!(reason.contains("line 2"), "{reason}");
        }
        other => panic!("Expected InvalidManifest, got: {other:?}"),
    }
}

#[test]
fn missing_manifest_is_input_error() {
    let result = read_manifest("no_such_manifest.csv", &PathLayout::default());
    assert!(matches!(result, Err(CorrelateError::InputError { .. })));
}

// ── Processing ─────────────────────────────────────────────────────

/// A short silent mono PCM WAV: a valid container with no video stream.
fn write_audio_only_container(path: &Path) {
    let samples = 800_u32;
    let data_size = samples * 2;
    let mut bytes = Vec::with_capacity(44 + data_size as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_size).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16_u32.to_le_bytes());
    bytes.extend_from_slice(&1_u16.to_le_bytes());
    bytes.extend_from_slice(&1_u16.to_le_bytes());
    bytes.extend_from_slice(&8000_u32.to_le_bytes());
    bytes.extend_from_slice(&16000_u32.to_le_bytes());
    bytes.extend_from_slice(&2_u16.to_le_bytes());
    bytes.extend_from_slice(&16_u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_size.to_le_bytes());
    bytes.resize(44 + data_size as usize, 0);
    std::fs::write(path, bytes).expect("Failed to write audio-only container");
}

fn write_log(path: &Path, frames: u64) {
    let mut text = String::new();
    for position in 0..frames {
        let first = position * 2;
        let last = first + 1;
        text.push_str(&format!(
            "[rtc] AssembledFrame: First={first} Last={last} EncodedBufsz={} NumPktExp=2 NumPktRecv=2 NumNack=0 MaxNack=0\n",
            500 + position
        ));
        text.push_str(&format!(
            "[rtc] Decoded frame: ts={} us First={first} Last={last} qp=30 w=320 h=240 type=delta\n",
            1_000_000 + position * 33_333
        ));
    }
    std::fs::write(path, text).expect("Failed to write log");
}

#[test]
fn container_without_video_exports_log_tail() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let log = directory.path().join("clip.rtc.log");
    let container = directory.path().join("clip.wav");
    let output = directory.path().join("clip.csv");
    write_log(&log, 3);
    write_audio_only_container(&container);

    let pair = CapturePair::new(&log, &container, &output);
    let report = process_pair(&pair, &CorrelateOptions::default()).expect("process");

    assert_eq!(report.summary.container_frames, 0);
    assert_eq!(report.summary.log_tail, 3);
    assert_eq!(report.rows_written, 3);
    let text = std::fs::read_to_string(&output).expect("read output");
    assert_eq!(text.lines().count(), 4);
    assert!(text.lines().skip(1).all(|line| line.contains(",tail,")), "{text}");
}

#[test]
fn failing_pair_does_not_stop_sibling() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    write_log(&directory.path().join("b.rtc.log"), 2);
    write_audio_only_container(&directory.path().join("b.wav"));
    let pairs = vec![
        CapturePair::new(
            directory.path().join("a.rtc.log"),
            directory.path().join("a.ivf"),
            directory.path().join("a.csv"),
        ),
        CapturePair::new(
            directory.path().join("b.rtc.log"),
            directory.path().join("b.wav"),
            directory.path().join("b.csv"),
        ),
    ];

    let report = process_batch(&pairs, &CorrelateOptions::default());

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.failed().count(), 1);
    assert_eq!(report.succeeded().count(), 1);
    assert!(!report.is_success());
    for ((pair, _), expected) in report.results.iter().zip(&pairs) {
        assert_eq!(pair, expected);
    }

    match &report.results[0].1 {
        Err(CorrelateError::InputError { path, .. }) => {
            assert_eq!(path, &directory.path().join("a.rtc.log"));
        }
        other => panic!("Expected InputError, got: {other:?}"),
    }
    assert!(!directory.path().join("a.csv").exists());

    let sibling = report.results[1].1.as_ref().expect("sibling succeeds");
    assert_eq!(sibling.summary.log_tail, 2);
    assert!(directory.path().join("b.csv").exists());
}

#[test]
fn process_fixture_pair() {
    if !Path::new(fixture_container()).exists() || !Path::new(fixture_log()).exists() {
        return;
    }

    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let output = directory.path().join("out").join("sample_capture.csv");
    let pair = CapturePair::new(fixture_log(), fixture_container(), &output);

    let report = process_pair(&pair, &CorrelateOptions::default()).expect("process");

    assert_eq!(report.rows_written, report.summary.output_rows);
    assert_eq!(
        report.summary.matched + report.summary.container_unmatched(),
        report.summary.container_frames
    );
    let text = std::fs::read_to_string(&output).expect("read output");
    assert_eq!(text.lines().count(), report.rows_written + 1);
}

#[cfg(feature = "rayon")]
#[test]
fn parallel_batch_keeps_input_order() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let pairs: Vec<CapturePair> = (0..8)
        .map(|index| {
            CapturePair::new(
                directory.path().join(format!("{index}.rtc.log")),
                directory.path().join(format!("{index}.ivf")),
                directory.path().join(format!("{index}.csv")),
            )
        })
        .collect();

    let report = rtc_correlate::process_batch_parallel(&pairs, &CorrelateOptions::default());

    let order: Vec<&CapturePair> = report.results.iter().map(|(pair, _)| pair).collect();
    assert_eq!(order, pairs.iter().collect::<Vec<_>>());
    assert_eq!(report.failed().count(), 8);
}
