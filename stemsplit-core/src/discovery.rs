//! Discovery & validation — find the session's input files and verify
//! their parameters are homogeneous.
//!
//! Console recorders number their takes (`TASCAM_0001.wav`,
//! `TASCAM_0002.wav`, …); ordering follows the first decimal integer in
//! the stem so `file10` lands after `file2`. Files without a number
//! sort after all numbered ones, by stem.

use log::{debug, info};
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::audio_io::probe;
use crate::error::{PipelineError, Result};
use crate::models::AudioParameters;

/// One discovered input file with its numeric sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    pub numeric_key: Option<u64>,
}

impl InputFile {
    pub fn new(path: PathBuf) -> Self {
        let numeric_key = numeric_stem_key(&path);
        Self { path, numeric_key }
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// First decimal integer in the file stem, if any.
fn numeric_stem_key(path: &Path) -> Option<u64> {
    let re = Regex::new(r"\d+").unwrap();
    let stem = path.file_stem()?.to_string_lossy().to_string();
    re.find(&stem)?.as_str().parse().ok()
}

/// Validated session geometry: the shared parameters plus per-file
/// frame counts (parallel to the discovered order).
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub parameters: AudioParameters,
    pub frame_counts: Vec<u64>,
    pub total_frames: u64,
}

/// List the `.wav` files of `input_dir` (case-insensitive extension),
/// sorted by `(numeric_key, name)` with keyless files last.
pub fn discover(input_dir: &Path) -> Result<Vec<InputFile>> {
    let entries = std::fs::read_dir(input_dir)
        .map_err(|e| PipelineError::input(input_dir, e))?;

    let mut files: Vec<InputFile> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::input(input_dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_wav = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if is_wav {
            files.push(InputFile::new(path));
        }
    }

    if files.is_empty() {
        return Err(PipelineError::input(input_dir, "no .wav files found"));
    }

    files.sort_by(|a, b| {
        let ka = a.numeric_key.unwrap_or(u64::MAX);
        let kb = b.numeric_key.unwrap_or(u64::MAX);
        ka.cmp(&kb).then_with(|| a.stem().cmp(&b.stem()))
    });

    for f in &files {
        debug!("discovered {} (key {:?})", f.name(), f.numeric_key);
    }
    info!("discovered {} input file(s) in {}", files.len(), input_dir.display());
    Ok(files)
}

/// Probe every file and verify sample rate, channel count, and subtype
/// all match the first one. The error names the differing attribute and
/// the offending file.
pub fn validate(inputs: &[InputFile]) -> Result<ValidatedSession> {
    let first = match inputs.first() {
        Some(f) => f,
        None => {
            return Err(PipelineError::input(
                Path::new(""),
                "no input files to validate",
            ));
        }
    };

    let reference = probe(&first.path)?;
    let mut frame_counts = vec![reference.frame_count];

    for input in &inputs[1..] {
        let info = probe(&input.path)?;
        if info.sample_rate != reference.sample_rate {
            return Err(PipelineError::input(
                &input.path,
                format!(
                    "sample rate {} Hz differs from {} Hz (established by '{}')",
                    info.sample_rate,
                    reference.sample_rate,
                    first.name()
                ),
            ));
        }
        if info.channel_count != reference.channel_count {
            return Err(PipelineError::input(
                &input.path,
                format!(
                    "channel count {} differs from {} (established by '{}')",
                    info.channel_count,
                    reference.channel_count,
                    first.name()
                ),
            ));
        }
        if info.bit_depth != reference.bit_depth {
            return Err(PipelineError::input(
                &input.path,
                format!(
                    "subtype {} differs from {} (established by '{}')",
                    info.bit_depth.subtype(),
                    reference.bit_depth.subtype(),
                    first.name()
                ),
            ));
        }
        frame_counts.push(info.frame_count);
    }

    let total_frames = frame_counts.iter().sum();
    info!(
        "validated session: {} Hz, {} channel(s), {}, {} total frames",
        reference.sample_rate,
        reference.channel_count,
        reference.bit_depth.subtype(),
        total_frames
    );

    Ok(ValidatedSession {
        parameters: reference.parameters(),
        frame_counts,
        total_frames,
    })
}
