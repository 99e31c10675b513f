use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rtc_correlate::{
    BatchReport, CaptureFile, CapturePair, CorrelateOptions, CorrelationSummary,
    DEFAULT_ASSEMBLED_PATTERN, DEFAULT_DECODED_PATTERN, FfmpegLogLevel, FileReport, FrameType,
    LogParser, LogPatterns, OperationType, ProgressCallback, ProgressInfo,
};
use serde_json::{Value, json};

const CLI_AFTER_HELP: &str = "Examples:\n  rtc-correlate correlate call.rtc.log call.ivf --out call.csv\n  rtc-correlate batch --manifest runs.csv --progress\n  rtc-correlate batch --config data/configs/*.json --json\n  rtc-correlate parse-log call.rtc.log --json\n  rtc-correlate completions zsh > _rtc-correlate";

#[derive(Debug, Parser)]
#[command(
    name = "rtc-correlate",
    version,
    about = "Align decoder logs with captured video frames",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long, global = true)]
    progress: bool,

    /// Refuse to replace existing output files unless set.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true, default_value = "error")]
    ffmpeg_log_level: String,

    /// Override the assembled-frame log pattern (seven capture groups).
    #[arg(long, global = true)]
    assembled_pattern: Option<String>,

    /// Override the decoded-frame log pattern (seven capture groups).
    #[arg(long, global = true)]
    decoded_pattern: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Correlate one decoder log with one capture container.
    #[command(
        about = "Correlate a log with a capture",
        after_help = "Examples:\n  rtc-correlate correlate call.rtc.log call.ivf --out call.csv\n  rtc-correlate correlate call.rtc.log call.ivf --out call.csv --dump-frames frames/"
    )]
    Correlate {
        /// Decoder log path.
        log: PathBuf,
        /// Capture container path.
        container: PathBuf,
        /// Output CSV path.
        #[arg(long)]
        out: PathBuf,
        /// Also save every kept container frame as JPEG in this directory.
        #[arg(long)]
        dump_frames: Option<PathBuf>,
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Correlate many captures; a failing file does not stop the others.
    #[command(
        about = "Correlate a batch of captures",
        after_help = "Examples:\n  rtc-correlate batch --manifest runs.csv\n  rtc-correlate batch --video data/rtc_input/a/clip.yuv --parallel"
    )]
    Batch {
        /// CSV manifest with `frame_dump` and `rtc_log` columns.
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// JSON video configurations holding a `VideoPath`.
        #[arg(long, num_args = 1..)]
        config: Vec<PathBuf>,
        /// Source video paths under the input directory.
        #[arg(long, num_args = 1..)]
        video: Vec<PathBuf>,
        /// Process files concurrently (requires the `rayon` feature).
        #[arg(long)]
        parallel: bool,
        /// Print per-file summaries as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Parse a decoder log and print its statistics.
    #[command(about = "Inspect a decoder log")]
    ParseLog {
        log: PathBuf,
        #[arg(long)]
        json: bool,
    },

    /// Decode a capture and print its frame statistics.
    #[command(about = "Inspect a capture container")]
    Frames {
        container: PathBuf,
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Renders stage progress on one terminal bar.
struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        let stage = match info.operation {
            OperationType::FrameExtraction => "decoding",
            OperationType::FrameDump => "dumping frames",
            OperationType::Export => "exporting",
            OperationType::Batch => "files",
            _ => "working",
        };
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        self.bar.set_message(stage);
    }
}

fn init_logging(global: &GlobalOptions) {
    let default_filter = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn build_options(
    global: &GlobalOptions,
    progress: Option<Arc<TerminalProgress>>,
) -> Result<CorrelateOptions, Box<dyn std::error::Error>> {
    let mut options = CorrelateOptions::new().with_overwrite(global.overwrite);

    if global.assembled_pattern.is_some() || global.decoded_pattern.is_some() {
        let patterns = LogPatterns::new(
            global
                .assembled_pattern
                .as_deref()
                .unwrap_or(DEFAULT_ASSEMBLED_PATTERN),
            global
                .decoded_pattern
                .as_deref()
                .unwrap_or(DEFAULT_DECODED_PATTERN),
        )?;
        options = options.with_patterns(patterns);
    }

    if let Some(progress) = progress {
        options = options.with_progress(progress).with_batch_size(25);
    }

    Ok(options)
}

fn summary_json(summary: &CorrelationSummary) -> Value {
    json!({
        "container_frames": summary.container_frames,
        "log_frames": summary.log_frames,
        "output_rows": summary.output_rows,
        "matched": summary.matched,
        "container_unmatched": {
            "extra": summary.container_extra,
            "mismatch": summary.container_mismatch,
            "tail": summary.container_tail,
        },
        "log_unmatched": {
            "extra": summary.log_extra,
            "no_assembled": summary.log_no_assembled,
            "mismatch": summary.log_mismatch,
            "tail": summary.log_tail,
        },
        "mismatch_ratio": summary.mismatch_ratio(),
    })
}

fn report_json(report: &FileReport) -> Value {
    json!({
        "log": report.pair.log_path.display().to_string(),
        "container": report.pair.container_path.display().to_string(),
        "output": report.pair.output_path.display().to_string(),
        "assembled": report.assembled_count,
        "ignored_lines": report.ignored_lines,
        "excluded_packets": report.excluded_packets,
        "summary": summary_json(&report.summary),
    })
}

fn print_report(report: &FileReport) {
    println!(
        "{} {}",
        "correlated".green().bold(),
        report.pair.container_path.display()
    );
    for line in report.summary.to_string().lines() {
        println!("  {line}");
    }
    if report.excluded_packets > 0 {
        println!(
            "  {} {} packet(s) excluded from the container sequence",
            "warning:".yellow().bold(),
            report.excluded_packets
        );
    }
    println!("  {} {}", "saved".green().bold(), report.pair.output_path.display());
}

fn collect_pairs(
    manifest: Option<&Path>,
    configs: &[PathBuf],
    videos: &[PathBuf],
    options: &CorrelateOptions,
) -> Result<Vec<CapturePair>, Box<dyn std::error::Error>> {
    let mut pairs = Vec::new();
    if let Some(manifest) = manifest {
        pairs.extend(rtc_correlate::read_manifest(manifest, options.layout())?);
    }
    for config in configs {
        pairs.push(CapturePair::from_video_config(config, options.layout())?);
    }
    for video in videos {
        pairs.push(CapturePair::from_video_path(video, options.layout())?);
    }
    if pairs.is_empty() {
        return Err("no inputs: pass --manifest, --config or --video".into());
    }
    Ok(pairs)
}

#[cfg(feature = "rayon")]
fn run_batch(pairs: &[CapturePair], options: &CorrelateOptions, parallel: bool) -> BatchReport {
    if parallel {
        rtc_correlate::process_batch_parallel(pairs, options)
    } else {
        rtc_correlate::process_batch(pairs, options)
    }
}

#[cfg(not(feature = "rayon"))]
fn run_batch(pairs: &[CapturePair], options: &CorrelateOptions, parallel: bool) -> BatchReport {
    if parallel {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            "--parallel requires building with the `rayon` feature".yellow()
        );
    }
    rtc_correlate::process_batch(pairs, options)
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global);

    let ffmpeg_level: FfmpegLogLevel = cli.global.ffmpeg_log_level.parse()?;
    rtc_correlate::set_ffmpeg_log_level(ffmpeg_level);

    let progress = cli.global.progress.then(|| Arc::new(TerminalProgress::new()));
    let options = build_options(&cli.global, progress.clone())?;

    match cli.command {
        Commands::Correlate {
            log,
            container,
            out,
            dump_frames,
            json,
        } => {
            let options = match dump_frames {
                Some(directory) => options.with_frame_dump(directory),
                None => options,
            };
            let pair = CapturePair::new(log, container, out);
            let report = rtc_correlate::process_pair(&pair, &options)?;
            if let Some(progress) = &progress {
                progress.bar.finish_and_clear();
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
            } else {
                print_report(&report);
            }
        }
        Commands::Batch {
            manifest,
            config,
            video,
            parallel,
            json,
        } => {
            let pairs = collect_pairs(manifest.as_deref(), &config, &video, &options)?;
            let report = run_batch(&pairs, &options, parallel);
            if let Some(progress) = &progress {
                progress.bar.finish_and_clear();
            }

            if json {
                let files: Vec<Value> = report
                    .results
                    .iter()
                    .map(|(pair, result)| match result {
                        Ok(file) => report_json(file),
                        Err(error) => json!({
                            "log": pair.log_path.display().to_string(),
                            "container": pair.container_path.display().to_string(),
                            "error": error.to_string(),
                        }),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&json!({ "files": files }))?);
            } else {
                for file in report.succeeded() {
                    print_report(file);
                }
                for (pair, error) in report.failed() {
                    eprintln!(
                        "{} {}: {error}",
                        "failed".red().bold(),
                        pair.container_path.display()
                    );
                }
            }

            if !report.is_success() {
                return Err(format!(
                    "{} of {} file(s) failed",
                    report.failed().count(),
                    report.results.len()
                )
                .into());
            }
        }
        Commands::ParseLog { log, json } => {
            let parsed = LogParser::new(options.patterns().clone()).parse_file(&log)?;
            let duration = parsed
                .decoded
                .last()
                .map(|record| record.relative_seconds())
                .unwrap_or(0.0);
            let key_frames = parsed
                .decoded
                .iter()
                .filter(|record| record.frame_type == FrameType::Key)
                .count();

            if json {
                let payload = json!({
                    "lines": parsed.lines_read,
                    "ignored_lines": parsed.lines_ignored,
                    "decoded": parsed.decoded.len(),
                    "assembled": parsed.assembled.len(),
                    "missing_assembled": parsed.missing_assembled(),
                    "key_frames": key_frames,
                    "duration_seconds": duration,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Lines: {} ({} ignored)", parsed.lines_read, parsed.lines_ignored);
                println!(
                    "Decoded: {} ({} key, {} without assembled)",
                    parsed.decoded.len(),
                    key_frames,
                    parsed.missing_assembled()
                );
                println!("Assembled: {}", parsed.assembled.len());
                println!("Duration: {duration:.3}s");
            }
        }
        Commands::Frames { container, json } => {
            let mut capture = CaptureFile::open(&container)?;
            let extracted = capture.frames_with_options(&options)?;
            if let Some(progress) = &progress {
                progress.bar.finish_and_clear();
            }
            let key_frames = extracted.frames.iter().filter(|frame| frame.key_frame).count();
            let corrupt = extracted.frames.iter().filter(|frame| frame.is_corrupt).count();
            let bytes: u64 = extracted.frames.iter().map(|frame| frame.size).sum();

            if json {
                let payload = json!({
                    "codec": capture.codec(),
                    "frames": extracted.frames.len(),
                    "key_frames": key_frames,
                    "corrupt_frames": corrupt,
                    "bytes": bytes,
                    "multi_frame_packets": extracted.multi_frame_packets,
                    "frameless_packets": extracted.frameless_packets,
                    "flushed_frames": extracted.flushed_frames,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "Codec: {}",
                    capture.codec().unwrap_or("none (no video stream)")
                );
                println!(
                    "Frames: {} ({} key, {} corrupt, {} bytes)",
                    extracted.frames.len(),
                    key_frames,
                    corrupt,
                    bytes
                );
                println!(
                    "Excluded packets: {} multi-frame, {} frameless",
                    extracted.multi_frame_packets, extracted.frameless_packets
                );
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "rtc-correlate", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands};

    #[test]
    fn parses_correlate_with_global_flags() {
        let cli = Cli::try_parse_from([
            "rtc-correlate",
            "--verbose",
            "correlate",
            "a.rtc.log",
            "a.ivf",
            "--out",
            "a.csv",
        ])
        .unwrap();
        assert!(cli.global.verbose);
        assert_eq!(cli.global.ffmpeg_log_level, "error");
        assert!(matches!(cli.command, Commands::Correlate { json: false, .. }));
    }

    #[test]
    fn parses_batch_inputs() {
        let cli = Cli::try_parse_from([
            "rtc-correlate",
            "batch",
            "--video",
            "a/rtc_input/x.yuv",
            "b/rtc_input/y.yuv",
            "--parallel",
        ])
        .unwrap();
        match cli.command {
            Commands::Batch { video, parallel, manifest, .. } => {
                assert_eq!(video.len(), 2);
                assert!(parallel);
                assert!(manifest.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn correlate_requires_output() {
        assert!(Cli::try_parse_from(["rtc-correlate", "correlate", "a.rtc.log", "a.ivf"]).is_err());
    }
}
