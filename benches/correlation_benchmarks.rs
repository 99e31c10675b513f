//! Benchmarks for log parsing, correlation, and capture decoding.
//!
//! Run with: cargo bench
//!
//! The decoding benchmark requires fixture files from
//! `tests/fixtures/generate_fixtures.sh`; the others use synthetic input.

use std::{hint::black_box, io::Cursor, path::Path};

use criterion::Criterion;
use rtc_correlate::{
    AssembledFrameInfo, CaptureFile, ContainerFrameRecord, DecodedFrameLogRecord, FfmpegLogLevel,
    FrameType, LogParser, PictureType, RecordExporter, correlate,
};

const SAMPLE_CAPTURE: &str = "tests/fixtures/sample_capture.ivf";
const FRAMES: usize = 10_000;

fn frame_size(index: usize) -> u64 {
    // Deterministic and varied enough that neighbours rarely collide.
    500 + ((index * 7919) % 4000) as u64
}

fn synthetic_log_text() -> String {
    let mut text = String::new();
    for index in 0..FRAMES {
        let first = index * 4;
        let last = first + 3;
        text.push_str(&format!(
            "[rtc] AssembledFrame: First={first} Last={last} EncodedBufsz={} NumPktExp=4 NumPktRecv=4 NumNack=0 MaxNack=0\n",
            frame_size(index)
        ));
        text.push_str(&format!(
            "[rtc] Decoded frame: ts={} us First={first} Last={last} qp=30 w=1280 h=720 type=delta\n",
            index * 33_333
        ));
        if index % 50 == 0 {
            text.push_str("[net] bandwidth estimate updated\n");
        }
    }
    text
}

fn synthetic_sequences() -> (Vec<ContainerFrameRecord>, Vec<DecodedFrameLogRecord>) {
    let mut container = Vec::with_capacity(FRAMES);
    let mut log = Vec::with_capacity(FRAMES);

    for index in 0..FRAMES {
        let size = frame_size(index);
        // Every 97th frame only reached the container, every 89th only the log.
        if index % 97 != 0 {
            container.push(ContainerFrameRecord {
                index: container.len(),
                pts: Some(index as i64 * 3000),
                time: Some(index as f64 / 30.0),
                relative_time: Some(index as f64 / 30.0),
                size,
                width: 1280,
                height: 720,
                key_frame: false,
                picture_type: PictureType::P,
                is_corrupt: false,
            });
        }
        if index % 89 != 0 {
            let first = index as u64 * 4;
            log.push(DecodedFrameLogRecord {
                ts: index as u64 * 33_333,
                relative_time: index as u64 * 33_333,
                first,
                last: first + 3,
                qp: 30,
                width: 1280,
                height: 720,
                frame_type: FrameType::Delta,
                assembled: Some(AssembledFrameInfo {
                    first,
                    last: first + 3,
                    encoded_bufsz: size,
                    num_pkt_exp: 4,
                    num_pkt_recv: 4,
                    num_nack: 0,
                    max_nack: 0,
                }),
            });
        }
    }

    (container, log)
}

fn benchmark_log_parsing(criterion: &mut Criterion) {
    let text = synthetic_log_text();
    let parser = LogParser::default();

    criterion.bench_function("parse 10k-frame decoder log", |bencher| {
        bencher.iter(|| {
            let parsed = parser.parse_reader(Cursor::new(text.as_bytes())).unwrap();
            black_box(parsed.decoded.len());
        });
    });
}

fn benchmark_correlation(criterion: &mut Criterion) {
    let (container, log) = synthetic_sequences();

    criterion.bench_function("correlate 10k frames with drops", |bencher| {
        bencher.iter(|| black_box(correlate(&container, &log).summary));
    });
}

fn benchmark_export(criterion: &mut Criterion) {
    let (container, log) = synthetic_sequences();
    let correlation = correlate(&container, &log);

    criterion.bench_function("export 10k correlated rows to memory", |bencher| {
        bencher.iter(|| {
            let mut exporter = RecordExporter::new(Vec::with_capacity(2 << 20));
            black_box(exporter.write_all(&correlation.records).unwrap());
        });
    });
}

fn benchmark_capture_decoding(criterion: &mut Criterion) {
    rtc_correlate::set_ffmpeg_log_level(FfmpegLogLevel::Error);

    if !Path::new(SAMPLE_CAPTURE).exists() {
        eprintln!("Skipping benchmark: fixture not found");
        return;
    }

    criterion.bench_function("decode sample capture", |bencher| {
        bencher.iter(|| {
            let mut capture = CaptureFile::open(SAMPLE_CAPTURE).unwrap();
            black_box(capture.frames().unwrap().frames.len());
        });
    });
}

criterion::criterion_group!(
    benches,
    benchmark_log_parsing,
    benchmark_correlation,
    benchmark_export,
    benchmark_capture_decoding,
);
criterion::criterion_main!(benches);
