//! Track builder — concatenate per-channel segments into final mono
//! tracks and interleave channel pairs into stereo bus tracks.
//!
//! Builders only ever stream: each segment is read block by block and
//! appended to a single atomic writer, so junctions are plain
//! concatenation with no crossfade, padding, or dropout.

use log::debug;
use ndarray::{s, Axis};
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::audio_io::{BlockReader, FrameWriter};
use crate::config::{BusConfig, ResolvedChannel};
use crate::convert::BitDepthConverter;
use crate::error::{PipelineError, Result};

/// Make a display name safe for file systems: characters outside
/// `[A-Za-z0-9 _.\-]` become `_`, whitespace runs collapse to a single
/// `_`, and leading/trailing whitespace or dots are trimmed. Idempotent.
pub fn sanitize(name: &str) -> String {
    let trimmed = name.trim_matches(|c: char| c.is_whitespace() || c == '.');
    let ws = Regex::new(r"\s+").unwrap();
    let collapsed = ws.replace_all(trimmed, "_");
    collapsed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Concatenate a channel's segments into one mono track at `out_path`.
/// Returns the frame count of the finished file.
pub fn build_mono_track(
    channel: &ResolvedChannel,
    segments: &[PathBuf],
    out_path: &Path,
    sample_rate: u32,
    converter: BitDepthConverter,
    block_frames: usize,
) -> Result<u64> {
    debug!(
        "building mono track '{}' from {} segment(s)",
        channel.name,
        segments.len()
    );
    let mut writer = FrameWriter::create(out_path, sample_rate, 1, converter)
        .map_err(|e| PipelineError::build(out_path, e))?;

    for segment in segments {
        let mut reader = BlockReader::open(segment, block_frames)
            .map_err(|e| PipelineError::build(segment, e))?;
        while let Some(block) = reader
            .next_block()
            .map_err(|e| PipelineError::build(segment, e))?
        {
            writer
                .append(block.view())
                .map_err(|e| PipelineError::build(out_path, e))?;
        }
    }

    writer
        .finalize()
        .map_err(|e| PipelineError::build(out_path, e))
}

/// Interleave a bus's left/right segment lists in lock-step into one
/// stereo track at `out_path`. The two lists must pair up segment for
/// segment with identical frame counts; a mismatch is a programmer
/// error, not bad user input.
pub fn build_stereo_bus(
    bus: &BusConfig,
    left_segments: &[PathBuf],
    right_segments: &[PathBuf],
    out_path: &Path,
    sample_rate: u32,
    converter: BitDepthConverter,
    block_frames: usize,
) -> Result<u64> {
    if left_segments.len() != right_segments.len() {
        return Err(PipelineError::InternalInvariant(format!(
            "bus '{}': segment count mismatch ({} left vs {} right)",
            bus.file_name,
            left_segments.len(),
            right_segments.len()
        )));
    }

    debug!(
        "building stereo bus '{}' from {} segment pair(s)",
        bus.file_name,
        left_segments.len()
    );
    let mut writer = FrameWriter::create(out_path, sample_rate, 2, converter)
        .map_err(|e| PipelineError::build(out_path, e))?;

    for (left_path, right_path) in left_segments.iter().zip(right_segments) {
        let mut left = BlockReader::open(left_path, block_frames)
            .map_err(|e| PipelineError::build(left_path, e))?;
        let mut right = BlockReader::open(right_path, block_frames)
            .map_err(|e| PipelineError::build(right_path, e))?;

        if left.frame_count() != right.frame_count() {
            return Err(PipelineError::InternalInvariant(format!(
                "bus '{}': segment frame counts diverge ({} vs {} for '{}')",
                bus.file_name,
                left.frame_count(),
                right.frame_count(),
                left_path.display()
            )));
        }

        loop {
            let lb = left
                .next_block()
                .map_err(|e| PipelineError::build(left_path, e))?;
            let rb = right
                .next_block()
                .map_err(|e| PipelineError::build(right_path, e))?;
            match (lb, rb) {
                (None, None) => break,
                (Some(lb), Some(rb)) => {
                    let frames = lb.nrows().min(rb.nrows());
                    let stacked = ndarray::stack(
                        Axis(1),
                        &[
                            lb.slice(s![..frames, 0]),
                            rb.slice(s![..frames, 0]),
                        ],
                    )
                    .map_err(|e| {
                        PipelineError::InternalInvariant(format!(
                            "bus '{}': column stack failed: {}",
                            bus.file_name, e
                        ))
                    })?;
                    writer
                        .append(stacked.view())
                        .map_err(|e| PipelineError::build(out_path, e))?;
                }
                _ => {
                    return Err(PipelineError::InternalInvariant(format!(
                        "bus '{}': segments diverged mid-stream",
                        bus.file_name
                    )));
                }
            }
        }
    }

    writer
        .finalize()
        .map_err(|e| PipelineError::build(out_path, e))
}
