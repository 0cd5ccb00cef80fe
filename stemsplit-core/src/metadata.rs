//! BPM metadata — ID3v2 `TBPM` frames embedded in WAV files.
//!
//! The tag lives in a RIFF `id3 ` chunk appended to the container, so
//! writing it never touches audio samples; the file only grows by the
//! size of the tag.

use id3::{Tag, TagLike, Version};
use log::debug;
use std::path::Path;

use crate::error::{PipelineError, Result};

const BPM_FRAME: &str = "TBPM";

/// Write (or remove, for `None`) the integer BPM frame on a WAV file.
/// Other frames already present are preserved.
pub fn write_bpm(path: &Path, bpm: Option<u32>) -> Result<()> {
    match bpm {
        Some(value) => {
            let mut tag = Tag::read_from_wav_path(path).unwrap_or_else(|_| Tag::new());
            tag.set_text(BPM_FRAME, value.to_string());
            tag.write_to_wav_path(path, Version::Id3v24)
                .map_err(|e| PipelineError::metadata(path, e))?;
            debug!("tagged {} with TBPM={}", path.display(), value);
        }
        None => {
            // Nothing to remove if the file carries no tag at all.
            if let Ok(mut tag) = Tag::read_from_wav_path(path) {
                tag.remove(BPM_FRAME);
                tag.write_to_wav_path(path, Version::Id3v24)
                    .map_err(|e| PipelineError::metadata(path, e))?;
                debug!("removed TBPM from {}", path.display());
            }
        }
    }
    Ok(())
}

/// Read the integer BPM frame back, if present and parseable.
pub fn read_bpm(path: &Path) -> Option<u32> {
    let tag = Tag::read_from_wav_path(path).ok()?;
    tag.get(BPM_FRAME)
        .and_then(|frame| frame.content().text())
        .and_then(|text| text.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_io::{probe, BlockReader, FrameWriter};
    use crate::convert::BitDepthConverter;
    use crate::models::DEFAULT_BLOCK_FRAMES;
    use ndarray::Array2;
    use tempfile::tempdir;

    fn make_wav(path: &Path, values: &[f32]) {
        let mut writer =
            FrameWriter::create(path, 44_100, 1, BitDepthConverter::Float32).unwrap();
        let block = Array2::from_shape_vec((values.len(), 1), values.to_vec()).unwrap();
        writer.append(block.view()).unwrap();
        writer.finalize().unwrap();
    }

    fn read_all(path: &Path) -> Vec<f32> {
        let mut reader = BlockReader::open(path, DEFAULT_BLOCK_FRAMES).unwrap();
        let mut out = Vec::new();
        while let Some(block) = reader.next_block().unwrap() {
            out.extend(block.column(0).iter().copied());
        }
        out
    }

    #[test]
    fn test_write_and_read_bpm() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("track.wav");
        make_wav(&path, &[0.0, 0.1, -0.1, 0.2]);

        assert_eq!(read_bpm(&path), None);
        write_bpm(&path, Some(128)).unwrap();
        assert_eq!(read_bpm(&path), Some(128));

        // overwrite with a new value
        write_bpm(&path, Some(96)).unwrap();
        assert_eq!(read_bpm(&path), Some(96));
    }

    #[test]
    fn test_write_bpm_preserves_audio() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("track.wav");
        let values = [0.0f32, 0.25, -0.25, 0.5, -0.5];
        make_wav(&path, &values);

        write_bpm(&path, Some(120)).unwrap();

        let read_back = read_all(&path);
        assert_eq!(read_back, values);
        let info = probe(&path).unwrap();
        assert_eq!(info.frame_count, values.len() as u64);
    }

    #[test]
    fn test_remove_bpm() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("track.wav");
        make_wav(&path, &[0.0, 0.1]);

        write_bpm(&path, Some(140)).unwrap();
        assert_eq!(read_bpm(&path), Some(140));
        write_bpm(&path, None).unwrap();
        assert_eq!(read_bpm(&path), None);
    }

    #[test]
    fn test_remove_bpm_on_untagged_file_is_noop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("track.wav");
        make_wav(&path, &[0.0]);
        write_bpm(&path, None).unwrap();
        assert_eq!(read_bpm(&path), None);
    }

    #[test]
    fn test_write_bpm_missing_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.wav");
        assert!(matches!(
            write_bpm(&path, Some(100)),
            Err(PipelineError::MetadataFailed { .. })
        ));
    }
}
