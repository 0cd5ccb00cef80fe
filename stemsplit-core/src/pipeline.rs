//! Pipeline orchestrator — discovery through section splitting.
//!
//! Phase sequence:
//! 1. Discover and validate the input file set.
//! 2. Resolve the channel plan and the session bit-depth converter.
//! 3. De-interleave every input into per-channel segments (temp area).
//! 4. Concatenate segments into mono tracks; interleave bus pairs.
//! 5. If requested: analyze the click output, post-process sections,
//!    split every track, tag song sections with their BPM.
//!
//! The orchestrator owns the output and temp directories: it creates
//! them, resolves name conflicts, and removes the temp area on every
//! exit path (success, error, cancellation) unless `keep_temp` is set.

use log::{debug, info};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::click::{ClickAnalyzer, OnsetDetector};
use crate::config::{resolve_channel_plan, ChannelPlan, SessionConfig};
use crate::convert::{BitDepthConverter, TargetDepth};
use crate::discovery::{self, InputFile, ValidatedSession};
use crate::error::{PipelineError, Result};
use crate::extract::extract_segments;
use crate::models::{
    check_cancelled, AudioParameters, CancelToken, LogReporter, Reporter, SectionInfo,
    DEFAULT_BLOCK_FRAMES,
};
use crate::sections::merge_short;
use crate::session_io::{write_session_report, SessionReport};
use crate::splitter::{split_output_tracks, tag_sections};
use crate::tracks::{build_mono_track, build_stereo_bus};

/// How many `_vN` suffixes to try before giving up on an output
/// directory conflict.
const MAX_OUTPUT_DIR_VERSIONS: u32 = 99;

/// Everything a session needs, assembled by the caller.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub session: SessionConfig,
    pub target_depth: TargetDepth,
    pub block_frames: usize,
    pub keep_temp: bool,
    /// Defaults to `<output_dir>/temp`.
    pub temp_dir: Option<PathBuf>,
    /// When set, a JSON session report is written here.
    pub session_json: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            session: SessionConfig::default(),
            target_depth: TargetDepth::Source,
            block_frames: DEFAULT_BLOCK_FRAMES,
            keep_temp: false,
            temp_dir: None,
            session_json: None,
        }
    }
}

/// Outcome of a completed session.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub output_dir: PathBuf,
    pub parameters: AudioParameters,
    pub input_files: Vec<String>,
    pub total_frames: u64,
    /// Final track file names, before any section split.
    pub tracks: Vec<String>,
    /// Present when section splitting ran (possibly via fallback).
    pub sections: Option<Vec<SectionInfo>>,
    pub warnings: Vec<String>,
}

pub struct Pipeline {
    config: PipelineConfig,
    analyzer: Box<dyn ClickAnalyzer>,
    reporter: Box<dyn Reporter>,
    cancel: Option<CancelToken>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let analyzer = Box::new(OnsetDetector::new(config.block_frames));
        Self {
            config,
            analyzer,
            reporter: Box::new(LogReporter),
            cancel: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Swap the click analyzer (the orchestrator only sees the trait).
    pub fn with_analyzer(mut self, analyzer: Box<dyn ClickAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run the full session.
    pub fn run(&self) -> Result<PipelineResult> {
        check_cancelled(&self.cancel)?;
        self.config.session.section_splitting.validate()?;

        let inputs = discovery::discover(&self.config.input_dir)?;
        let session = discovery::validate(&inputs)?;
        let plan =
            resolve_channel_plan(&self.config.session, session.parameters.channel_count)?;
        let converter =
            BitDepthConverter::resolve(self.config.target_depth, session.parameters.bit_depth);
        debug!(
            "session converter resolved to {}",
            converter.target().subtype()
        );

        let output_dir = self.prepare_output_dir()?;
        let temp_dir = self
            .config
            .temp_dir
            .clone()
            .unwrap_or_else(|| output_dir.join("temp"));
        std::fs::create_dir_all(&temp_dir)
            .map_err(|e| PipelineError::extraction(&temp_dir, e))?;

        let outcome =
            self.run_stages(&inputs, &session, &plan, converter, &output_dir, &temp_dir);

        if self.config.keep_temp {
            info!("keeping temp directory {}", temp_dir.display());
        } else if let Err(e) = std::fs::remove_dir_all(&temp_dir) {
            debug!("temp cleanup: {}", e);
        }

        if let Err(e) = &outcome {
            self.reporter.error(&e.to_string());
        }
        outcome
    }

    fn run_stages(
        &self,
        inputs: &[InputFile],
        session: &ValidatedSession,
        plan: &ChannelPlan,
        converter: BitDepthConverter,
        output_dir: &Path,
        temp_dir: &Path,
    ) -> Result<PipelineResult> {
        let mut warnings: Vec<String> = Vec::new();
        let params = session.parameters;
        self.reporter.info(&format!(
            "{} input file(s): {} Hz, {} channel(s), {}, {} total frames",
            inputs.len(),
            params.sample_rate,
            params.channel_count,
            params.bit_depth.subtype(),
            session.total_frames
        ));

        // Phase 1: de-interleave.
        let segments = extract_segments(
            inputs,
            &params,
            plan,
            converter,
            temp_dir,
            self.config.block_frames,
            self.reporter.as_ref(),
            &self.cancel,
        )?;
        check_cancelled(&self.cancel)?;

        // Phase 2: build final tracks.
        let pad = plan.output_pad_width();
        let mono_outputs = plan.mono_outputs();
        let output_total = mono_outputs.len() + plan.buses.len();
        let mut tracks: Vec<String> = Vec::with_capacity(output_total);
        let mut step = 0usize;

        for channel in mono_outputs.iter().copied() {
            check_cancelled(&self.cancel)?;
            step += 1;
            let name = channel.file_name(pad);
            self.reporter
                .progress(step, output_total, &format!("Writing '{}'", name));
            let channel_segments = segments.get(&channel.channel_number).ok_or_else(|| {
                PipelineError::InternalInvariant(format!(
                    "no segments extracted for channel {}",
                    channel.channel_number
                ))
            })?;
            let out_path = output_dir.join(&name);
            let frames = build_mono_track(
                channel,
                channel_segments,
                &out_path,
                params.sample_rate,
                converter,
                self.config.block_frames,
            )?;
            if frames != session.total_frames {
                return Err(PipelineError::InternalInvariant(format!(
                    "track '{}' holds {} frames, session has {}",
                    name, frames, session.total_frames
                )));
            }
            tracks.push(name);
        }

        for bus in &plan.buses {
            check_cancelled(&self.cancel)?;
            step += 1;
            let name = format!("{}.wav", bus.file_name);
            self.reporter
                .progress(step, output_total, &format!("Writing '{}'", name));
            let left = segments.get(&bus.left).ok_or_else(|| {
                PipelineError::InternalInvariant(format!(
                    "no segments extracted for bus channel {}",
                    bus.left
                ))
            })?;
            let right = segments.get(&bus.right).ok_or_else(|| {
                PipelineError::InternalInvariant(format!(
                    "no segments extracted for bus channel {}",
                    bus.right
                ))
            })?;
            let out_path = output_dir.join(&name);
            let frames = build_stereo_bus(
                bus,
                left,
                right,
                &out_path,
                params.sample_rate,
                converter,
                self.config.block_frames,
            )?;
            if frames != session.total_frames {
                return Err(PipelineError::InternalInvariant(format!(
                    "bus '{}' holds {} frames, session has {}",
                    name, frames, session.total_frames
                )));
            }
            tracks.push(name);
        }
        info!("built {} track(s) in {}", tracks.len(), output_dir.display());
        check_cancelled(&self.cancel)?;

        // Phase 3: sections.
        let split_cfg = &self.config.session.section_splitting;
        let mut sections_out: Option<Vec<SectionInfo>> = None;
        if split_cfg.enabled {
            match plan.click_track_file_name() {
                None => {
                    let msg =
                        "section splitting enabled but no click channel is configured; skipping"
                            .to_string();
                    self.reporter.warning(&msg);
                    warnings.push(msg);
                }
                Some(click_name) => {
                    let click_path = output_dir.join(&click_name);
                    let raw = match self.analyzer.analyze(&click_path, split_cfg) {
                        Ok(sections) => sections,
                        Err(e @ PipelineError::Cancelled) => return Err(e),
                        Err(e) => {
                            let msg = format!(
                                "{}; falling back to a single full-length section",
                                e
                            );
                            self.reporter.warning(&msg);
                            warnings.push(msg);
                            vec![SectionInfo::whole(session.total_frames)]
                        }
                    };
                    let sections = merge_short(
                        raw,
                        split_cfg.min_section_length_seconds,
                        params.sample_rate,
                    );
                    self.report_sections(&sections, params.sample_rate);

                    if sections.is_empty() {
                        let msg = "click analysis produced no sections; skipping split"
                            .to_string();
                        self.reporter.warning(&msg);
                        warnings.push(msg);
                    } else {
                        split_output_tracks(
                            output_dir,
                            &sections,
                            self.config.block_frames,
                            self.reporter.as_ref(),
                            &self.cancel,
                        )?;
                        tag_sections(output_dir, &sections, self.reporter.as_ref());
                        sections_out = Some(sections);
                    }
                }
            }
        }

        // Phase 4: optional session report.
        let input_files: Vec<String> = inputs.iter().map(|f| f.name()).collect();
        if let Some(report_path) = &self.config.session_json {
            let report = SessionReport::new(
                self.config.input_dir.clone(),
                output_dir.to_path_buf(),
                params,
                input_files.clone(),
                session.total_frames,
                tracks.clone(),
                sections_out.clone().unwrap_or_default(),
            );
            if let Err(e) = write_session_report(report_path, &report) {
                let msg = format!(
                    "could not write session report '{}': {}",
                    report_path.display(),
                    e
                );
                self.reporter.warning(&msg);
                warnings.push(msg);
            }
        }

        Ok(PipelineResult {
            output_dir: output_dir.to_path_buf(),
            parameters: params,
            input_files,
            total_frames: session.total_frames,
            tracks,
            sections: sections_out,
            warnings,
        })
    }

    fn report_sections(&self, sections: &[SectionInfo], sample_rate: u32) {
        for section in sections {
            let tempo = match section.bpm {
                Some(bpm) => format!("{} BPM", bpm),
                None => "speaking".to_string(),
            };
            self.reporter.info(&format!(
                "section {:02}: {:9.2}s – {:9.2}s  {}",
                section.section_number,
                section.start_sample as f64 / sample_rate as f64,
                section.end_sample as f64 / sample_rate as f64,
                tempo
            ));
        }
    }

    /// Create the output directory, resolving an existing path by
    /// suffixing `_v2`, `_v3`, … up to a fixed limit.
    fn prepare_output_dir(&self) -> Result<PathBuf> {
        let base = &self.config.output_dir;
        if !base.exists() {
            std::fs::create_dir_all(base).map_err(|e| PipelineError::build(base, e))?;
            return Ok(base.clone());
        }

        let name = base
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        for version in 2..=MAX_OUTPUT_DIR_VERSIONS {
            let candidate = base.with_file_name(format!("{}_v{}", name, version));
            if !candidate.exists() {
                std::fs::create_dir_all(&candidate)
                    .map_err(|e| PipelineError::build(&candidate, e))?;
                self.reporter.warning(&format!(
                    "output directory '{}' exists; using '{}'",
                    base.display(),
                    candidate.display()
                ));
                return Ok(candidate);
            }
        }
        Err(PipelineError::ConfigInvalid(format!(
            "no free output directory near '{}' after {} attempts",
            base.display(),
            MAX_OUTPUT_DIR_VERSIONS
        )))
    }
}
