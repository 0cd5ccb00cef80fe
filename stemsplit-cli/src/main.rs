//! StemSplit CLI — headless multitrack session splitting.
//!
//! Usage:
//!     stemsplit run ./session -o ./stems --config channels.json
//!     stemsplit run ./session --bit-depth 16 --session-json report.json
//!     stemsplit inspect ./session --json
//!     stemsplit sections click.wav --gap-threshold 3 --json

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;

use stemsplit_core::click::{ClickAnalyzer, OnsetDetector};
use stemsplit_core::config::{SectionSplittingConfig, SessionConfig};
use stemsplit_core::convert::TargetDepth;
use stemsplit_core::discovery::{discover, validate};
use stemsplit_core::models::{NullReporter, Reporter, SectionInfo, DEFAULT_BLOCK_FRAMES};
use stemsplit_core::pipeline::{Pipeline, PipelineConfig, PipelineResult};
use stemsplit_core::sections::merge_short;

#[derive(Parser)]
#[command(
    name = "stemsplit",
    version,
    about = "StemSplit — multitrack recorder session splitter",
    long_about = "De-interleave numbered multichannel WAV recordings into per-channel \
                  tracks and stereo bus mixes. With a click channel configured, detect \
                  musical sections, split every track at section boundaries, and embed \
                  the detected tempo as a TBPM tag."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full splitting pipeline on an input directory
    Run {
        /// Directory with the numbered multichannel WAV files
        input_dir: PathBuf,

        /// Output directory for the final tracks
        #[arg(short, long, default_value = "./stemsplit_output")]
        output_dir: PathBuf,

        /// Channel/bus/section configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output bit depth: source, 16, 24, 32
        #[arg(long, default_value = "source")]
        bit_depth: String,

        /// Keep the temp segment directory after the run
        #[arg(long)]
        keep_temp: bool,

        /// Disable section splitting even if the config enables it
        #[arg(long)]
        no_split: bool,

        /// Write a JSON session report to this path
        #[arg(long)]
        session_json: Option<PathBuf>,

        /// Output results as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the discovered input files and their shared parameters
    Inspect {
        /// Directory with the numbered multichannel WAV files
        input_dir: PathBuf,

        /// Output as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Detect sections on an existing mono click track
    Sections {
        /// Mono WAV file carrying the click
        file: PathBuf,

        /// Silence gap, in seconds, that ends a song section
        #[arg(long, default_value_t = 3.0)]
        gap_threshold: f64,

        /// Minimum section length in seconds; shorter sections merge
        #[arg(long, default_value_t = 5.0)]
        min_section_length: f64,

        /// BPM difference that starts a new section
        #[arg(long, default_value_t = 2)]
        bpm_threshold: u32,

        /// Output as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set log level
    let verbose = match &cli.command {
        Commands::Run { verbose, .. }
        | Commands::Inspect { verbose, .. }
        | Commands::Sections { verbose, .. } => *verbose,
    };
    let level = if verbose { "debug" } else { "info" };
    // SAFETY: Called before any threads are spawned, at program start.
    unsafe {
        std::env::set_var("RUST_LOG", format!("stemsplit={}", level));
    }
    env_logger::init();

    match cli.command {
        Commands::Run {
            input_dir,
            output_dir,
            config,
            bit_depth,
            keep_temp,
            no_split,
            session_json,
            json,
            ..
        } => cmd_run(
            input_dir,
            output_dir,
            config,
            bit_depth,
            keep_temp,
            no_split,
            session_json,
            json,
        ),

        Commands::Inspect {
            input_dir, json, ..
        } => cmd_inspect(input_dir, json),

        Commands::Sections {
            file,
            gap_threshold,
            min_section_length,
            bpm_threshold,
            json,
            ..
        } => cmd_sections(file, gap_threshold, min_section_length, bpm_threshold, json),
    }
}

// ---------------------------------------------------------------------------
//  Console reporter
// ---------------------------------------------------------------------------

struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn info(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("WARNING: {}", message);
    }

    fn error(&self, message: &str) {
        eprintln!("ERROR: {}", message);
    }

    fn progress(&self, current: usize, total: usize, message: &str) {
        eprintln!("[{}/{}] {}", current, total, message);
    }
}

fn make_reporter(json: bool) -> Box<dyn Reporter> {
    if json {
        Box::new(NullReporter)
    } else {
        Box::new(ConsoleReporter)
    }
}

// ---------------------------------------------------------------------------
//  Commands
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    input_dir: PathBuf,
    output_dir: PathBuf,
    config_path: Option<PathBuf>,
    bit_depth: String,
    keep_temp: bool,
    no_split: bool,
    session_json: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let t0 = Instant::now();

    let session = match &config_path {
        Some(path) => load_session_config(path)?,
        None => SessionConfig::default(),
    };

    let mut config = PipelineConfig::new(input_dir, output_dir);
    config.session = session;
    config.target_depth = parse_bit_depth(&bit_depth)?;
    config.keep_temp = keep_temp;
    config.session_json = session_json;
    if no_split {
        config.session.section_splitting.enabled = false;
    }

    let result = Pipeline::new(config)
        .with_reporter(make_reporter(json))
        .run()?;
    let elapsed = t0.elapsed().as_secs_f64();

    if json {
        let output = serde_json::json!({
            "result": result,
            "elapsed_s": elapsed,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_run_report(&result, elapsed);
    }

    Ok(())
}

fn cmd_inspect(input_dir: PathBuf, json: bool) -> anyhow::Result<()> {
    let inputs = discover(&input_dir)?;
    let session = validate(&inputs)?;

    if json {
        let output = serde_json::json!({
            "input_dir": input_dir,
            "parameters": session.parameters,
            "total_frames": session.total_frames,
            "files": inputs.iter().zip(&session.frame_counts).map(|(f, &frames)| {
                serde_json::json!({
                    "name": f.name(),
                    "numeric_key": f.numeric_key,
                    "frames": frames,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let p = &session.parameters;
        eprintln!("StemSplit — Session Info");
        eprintln!(
            "{} file(s), {} Hz, {} channel(s), {}\n",
            inputs.len(),
            p.sample_rate,
            p.channel_count,
            p.bit_depth.subtype()
        );
        for (f, frames) in inputs.iter().zip(&session.frame_counts) {
            let duration = *frames as f64 / p.sample_rate as f64;
            eprintln!("  {:<32} {:>12} frames  {:>8.1}s", f.name(), frames, duration);
        }
        eprintln!(
            "\nTotal: {} frames ({:.1}s)",
            session.total_frames,
            session.total_frames as f64 / p.sample_rate as f64
        );
    }

    Ok(())
}

fn cmd_sections(
    file: PathBuf,
    gap_threshold: f64,
    min_section_length: f64,
    bpm_threshold: u32,
    json: bool,
) -> anyhow::Result<()> {
    let cfg = SectionSplittingConfig {
        enabled: true,
        gap_threshold_seconds: gap_threshold,
        min_section_length_seconds: min_section_length,
        bpm_change_threshold: bpm_threshold,
    };
    cfg.validate()?;

    let info = stemsplit_core::audio_io::probe(&file)?;
    let detector = OnsetDetector::new(DEFAULT_BLOCK_FRAMES);
    let raw = detector.analyze(&file, &cfg)?;
    let sections = merge_short(raw, cfg.min_section_length_seconds, info.sample_rate);

    if json {
        let output = serde_json::json!({
            "file": file,
            "sample_rate": info.sample_rate,
            "total_frames": info.frame_count,
            "sections": sections,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_section_table(&sections, info.sample_rate);
    }

    Ok(())
}

// ---------------------------------------------------------------------------
//  Helpers
// ---------------------------------------------------------------------------

fn load_session_config(path: &Path) -> anyhow::Result<SessionConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config file: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn parse_bit_depth(value: &str) -> anyhow::Result<TargetDepth> {
    match value.to_lowercase().as_str() {
        "source" => Ok(TargetDepth::Source),
        "16" => Ok(TargetDepth::Int16),
        "24" => Ok(TargetDepth::Int24),
        "32" | "float" => Ok(TargetDepth::Float32),
        other => anyhow::bail!("Unsupported bit depth '{}' (use source, 16, 24, 32)", other),
    }
}

fn print_run_report(result: &PipelineResult, elapsed_s: f64) {
    eprintln!("\n============================");
    eprintln!("  StemSplit — Results");
    eprintln!("============================\n");

    let p = &result.parameters;
    eprintln!("Input files:      {}", result.input_files.len());
    eprintln!(
        "Format:           {} Hz, {} channel(s), {}",
        p.sample_rate,
        p.channel_count,
        p.bit_depth.subtype()
    );
    eprintln!(
        "Session length:   {:.1} s ({} frames)",
        result.total_frames as f64 / p.sample_rate as f64,
        result.total_frames
    );
    eprintln!("Output dir:       {}", result.output_dir.display());
    eprintln!("Elapsed:          {:.2} s", elapsed_s);

    eprintln!("\nTracks:");
    for track in &result.tracks {
        eprintln!("  {}", track);
    }

    if let Some(sections) = &result.sections {
        eprintln!("\nSections:");
        print_section_table(sections, p.sample_rate);
    }

    if !result.warnings.is_empty() {
        eprintln!("\nWarnings:");
        for w in &result.warnings {
            eprintln!("  ⚠ {}", w);
        }
    }
}

fn print_section_table(sections: &[SectionInfo], sample_rate: u32) {
    for s in sections {
        let start = s.start_sample as f64 / sample_rate as f64;
        let end = s.end_sample as f64 / sample_rate as f64;
        let tempo = match s.bpm {
            Some(bpm) => format!("{:>3} BPM", bpm),
            None => "   --  ".to_string(),
        };
        eprintln!(
            "  section_{:02}  {:>8.2}s – {:>8.2}s  {:>8.1}s  {}  {:?}",
            s.section_number,
            start,
            end,
            end - start,
            tempo,
            s.section_type
        );
    }
}
