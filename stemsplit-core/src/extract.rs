//! Extractor — stream each input file once and fan its frames out into
//! per-channel mono segments on disk.
//!
//! Segments land in the session temp directory as
//! `ch{channel:02}_{file:04}.wav`; each extracted channel gets exactly
//! one segment per input file, holding exactly that file's frame count.

use log::{debug, info};
use ndarray::Axis;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::audio_io::{BlockReader, FrameWriter};
use crate::config::ChannelPlan;
use crate::convert::BitDepthConverter;
use crate::discovery::InputFile;
use crate::error::{PipelineError, Result};
use crate::models::{check_cancelled, AudioParameters, CancelToken, Reporter};

/// Channel number → ordered segment paths, in discovered file order.
/// Concatenating a channel's segments in order reconstructs its
/// continuous signal sample-exactly.
pub type SegmentMap = BTreeMap<u32, Vec<PathBuf>>;

pub fn extract_segments(
    inputs: &[InputFile],
    params: &AudioParameters,
    plan: &ChannelPlan,
    converter: BitDepthConverter,
    temp_dir: &Path,
    block_frames: usize,
    reporter: &dyn Reporter,
    cancel: &Option<CancelToken>,
) -> Result<SegmentMap> {
    let channels = plan.extracted_channels();
    if channels.is_empty() {
        return Err(PipelineError::ConfigInvalid(
            "every channel is set to skip; nothing to extract".to_string(),
        ));
    }

    let mut segments: SegmentMap = channels.iter().map(|&c| (c, Vec::new())).collect();

    for (file_index, input) in inputs.iter().enumerate() {
        check_cancelled(cancel)?;
        reporter.progress(
            file_index + 1,
            inputs.len(),
            &format!("De-interleaving '{}'", input.name()),
        );

        let mut reader = BlockReader::open(&input.path, block_frames)
            .map_err(|e| PipelineError::extraction(&input.path, e))?;
        if reader.channels() != params.channel_count as usize {
            return Err(PipelineError::InternalInvariant(format!(
                "'{}' has {} channels after validating {}",
                input.name(),
                reader.channels(),
                params.channel_count
            )));
        }
        let file_frames = reader.frame_count();

        let mut writers: Vec<(u32, PathBuf, FrameWriter)> = Vec::with_capacity(channels.len());
        for &ch in &channels {
            let seg_path = temp_dir.join(format!("ch{:02}_{:04}.wav", ch, file_index));
            let writer = FrameWriter::create(&seg_path, params.sample_rate, 1, converter)
                .map_err(|e| PipelineError::extraction(&seg_path, e))?;
            writers.push((ch, seg_path, writer));
        }

        while let Some(block) = reader
            .next_block()
            .map_err(|e| PipelineError::extraction(&input.path, e))?
        {
            for (ch, seg_path, writer) in writers.iter_mut() {
                let column = block.column((*ch - 1) as usize);
                writer
                    .append(column.insert_axis(Axis(1)))
                    .map_err(|e| PipelineError::extraction(seg_path.as_path(), e))?;
            }
        }

        for (ch, seg_path, writer) in writers {
            let frames = writer
                .finalize()
                .map_err(|e| PipelineError::extraction(&seg_path, e))?;
            if frames != file_frames {
                return Err(PipelineError::InternalInvariant(format!(
                    "segment '{}' holds {} frames, source file has {}",
                    seg_path.display(),
                    frames,
                    file_frames
                )));
            }
            debug!("wrote segment {} ({} frames)", seg_path.display(), frames);
            segments
                .get_mut(&ch)
                .ok_or_else(|| {
                    PipelineError::InternalInvariant(format!(
                        "segment map is missing channel {}",
                        ch
                    ))
                })?
                .push(seg_path);
        }
    }

    info!(
        "extracted {} channel(s) × {} file(s) into {}",
        channels.len(),
        inputs.len(),
        temp_dir.display()
    );
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve_channel_plan, ChannelAction, ChannelConfig, SessionConfig};
    use crate::discovery::{discover, validate};
    use crate::models::{new_cancel_token, BitDepth, NullReporter};
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    /// Write a 2-channel 16-bit file where channel 1 carries
    /// `base + frame` and channel 2 carries `-(base + frame)`.
    fn make_input(path: &Path, frames: i32, base: i32) {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            writer.write_sample((base + i) as i16).unwrap();
            writer.write_sample(-(base + i) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn session_fixture() -> (tempfile::TempDir, Vec<InputFile>, AudioParameters) {
        let dir = tempdir().unwrap();
        let input_dir = dir.path().join("in");
        std::fs::create_dir(&input_dir).unwrap();
        make_input(&input_dir.join("rec1.wav"), 100, 0);
        make_input(&input_dir.join("rec2.wav"), 60, 1000);

        let inputs = discover(&input_dir).unwrap();
        let params = validate(&inputs).unwrap().parameters;
        (dir, inputs, params)
    }

    #[test]
    fn test_extract_one_segment_per_channel_per_file() {
        let (dir, inputs, params) = session_fixture();
        let temp = dir.path().join("temp");
        std::fs::create_dir(&temp).unwrap();

        let plan = resolve_channel_plan(&SessionConfig::default(), 2).unwrap();
        let segments = extract_segments(
            &inputs,
            &params,
            &plan,
            BitDepthConverter::Int16,
            &temp,
            32, // small blocks to exercise chunking
            &NullReporter,
            &None,
        )
        .unwrap();

        assert_eq!(segments.len(), 2);
        for (_, segs) in &segments {
            assert_eq!(segs.len(), inputs.len());
        }
        // per-segment frame counts mirror the source files
        assert_eq!(crate::audio_io::probe(&segments[&1][0]).unwrap().frame_count, 100);
        assert_eq!(crate::audio_io::probe(&segments[&1][1]).unwrap().frame_count, 60);
        assert_eq!(
            crate::audio_io::probe(&segments[&2][0]).unwrap().bit_depth,
            BitDepth::Int16
        );
    }

    #[test]
    fn test_extract_skip_channel_untouched() {
        let (dir, inputs, params) = session_fixture();
        let temp = dir.path().join("temp");
        std::fs::create_dir(&temp).unwrap();

        let config = SessionConfig {
            channels: vec![ChannelConfig {
                channel_number: 2,
                name: None,
                action: ChannelAction::Skip,
                output_channel: None,
            }],
            ..Default::default()
        };
        let plan = resolve_channel_plan(&config, 2).unwrap();
        let segments = extract_segments(
            &inputs,
            &params,
            &plan,
            BitDepthConverter::Int16,
            &temp,
            32,
            &NullReporter,
            &None,
        )
        .unwrap();

        assert!(segments.contains_key(&1));
        assert!(!segments.contains_key(&2));
        // no ch02 files on disk either
        let leftover: Vec<_> = std::fs::read_dir(&temp)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("ch02"))
            .collect();
        assert!(leftover.is_empty());
    }

    #[test]
    fn test_extract_deinterleaves_columns() {
        let (dir, inputs, params) = session_fixture();
        let temp = dir.path().join("temp");
        std::fs::create_dir(&temp).unwrap();

        let plan = resolve_channel_plan(&SessionConfig::default(), 2).unwrap();
        let segments = extract_segments(
            &inputs,
            &params,
            &plan,
            BitDepthConverter::Int16,
            &temp,
            32,
            &NullReporter,
            &None,
        )
        .unwrap();

        // channel 1, file 0: samples are 0, 1, 2, ... as 16-bit ints
        let mut reader = BlockReader::open(&segments[&1][0], 1024).unwrap();
        let block = reader.next_block().unwrap().unwrap();
        for i in 0..5 {
            let expected = i as f32 / 32_768.0;
            assert!((block[[i, 0]] - expected).abs() < 1e-7);
        }
        // channel 2 is the negated column
        let mut reader = BlockReader::open(&segments[&2][0], 1024).unwrap();
        let block = reader.next_block().unwrap().unwrap();
        for i in 1..5 {
            let expected = -(i as f32) / 32_768.0;
            assert!((block[[i, 0]] - expected).abs() < 1e-7);
        }
    }

    #[test]
    fn test_extract_all_skip_is_config_error() {
        let (dir, inputs, params) = session_fixture();
        let temp = dir.path().join("temp");
        std::fs::create_dir(&temp).unwrap();

        let config = SessionConfig {
            channels: vec![
                ChannelConfig {
                    channel_number: 1,
                    name: None,
                    action: ChannelAction::Skip,
                    output_channel: None,
                },
                ChannelConfig {
                    channel_number: 2,
                    name: None,
                    action: ChannelAction::Skip,
                    output_channel: None,
                },
            ],
            ..Default::default()
        };
        let plan = resolve_channel_plan(&config, 2).unwrap();
        let err = extract_segments(
            &inputs,
            &params,
            &plan,
            BitDepthConverter::Int16,
            &temp,
            32,
            &NullReporter,
            &None,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ConfigInvalid(_)));
    }

    #[test]
    fn test_extract_cancellation() {
        let (dir, inputs, params) = session_fixture();
        let temp = dir.path().join("temp");
        std::fs::create_dir(&temp).unwrap();

        let plan = resolve_channel_plan(&SessionConfig::default(), 2).unwrap();
        let cancel = new_cancel_token();
        cancel.store(true, Ordering::Relaxed);

        let err = extract_segments(
            &inputs,
            &params,
            &plan,
            BitDepthConverter::Int16,
            &temp,
            32,
            &NullReporter,
            &Some(cancel),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
