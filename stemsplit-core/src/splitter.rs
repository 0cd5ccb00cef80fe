//! Section splitter — rewrite the output directory into per-section
//! subdirectories.
//!
//! Every top-level track is streamed into `section_NN/<basename>`
//! files covering the detected sample ranges; the original is deleted
//! only once all of its section files are in place. All tracks share
//! one section table, so section files line up sample-exact across
//! tracks when loaded side by side in a DAW.

use log::{debug, info, warn};
use ndarray::s;
use std::path::{Path, PathBuf};

use crate::audio_io::{probe, BlockReader, FrameWriter};
use crate::convert::{BitDepthConverter, TargetDepth};
use crate::error::{PipelineError, Result};
use crate::metadata;
use crate::models::{check_cancelled, CancelToken, Reporter, SectionInfo};

/// Directory name for one section, zero-padded to two digits (three
/// once a session exceeds 99 sections).
pub fn section_dir_name(section_number: u32, section_count: usize) -> String {
    let width = if section_count > 99 { 3 } else { 2 };
    format!("section_{:0width$}", section_number, width = width)
}

/// Split every top-level `.wav` track in `output_dir` along `sections`.
/// Per-track failures are downgraded to warnings (the original stays in
/// place); the call fails only when no track could be split at all.
pub fn split_output_tracks(
    output_dir: &Path,
    sections: &[SectionInfo],
    block_frames: usize,
    reporter: &dyn Reporter,
    cancel: &Option<CancelToken>,
) -> Result<()> {
    if sections.is_empty() {
        return Err(PipelineError::InternalInvariant(
            "splitter invoked with an empty section table".to_string(),
        ));
    }

    let tracks = top_level_tracks(output_dir)?;
    if tracks.is_empty() {
        // Already split (or nothing was produced): nothing to do.
        info!("no top-level tracks in {}; skipping split", output_dir.display());
        return Ok(());
    }

    for section in sections {
        let dir = output_dir.join(section_dir_name(section.section_number, sections.len()));
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::split(&dir, e))?;
    }

    let mut split_count = 0usize;
    for (index, track) in tracks.iter().enumerate() {
        check_cancelled(cancel)?;
        let name = track
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        reporter.progress(index + 1, tracks.len(), &format!("Splitting '{}'", name));

        match split_one_track(track, sections, output_dir, block_frames) {
            Ok(()) => {
                split_count += 1;
                if let Err(e) = std::fs::remove_file(track) {
                    reporter.warning(&format!(
                        "could not remove split source '{}': {}",
                        name, e
                    ));
                }
            }
            Err(e) => {
                reporter.warning(&format!("keeping '{}' unsplit: {}", name, e));
                warn!("split failed for {}: {}", track.display(), e);
            }
        }
    }

    if split_count == 0 {
        return Err(PipelineError::split(
            output_dir,
            "no track could be split into sections",
        ));
    }
    info!(
        "split {} track(s) into {} section(s)",
        split_count,
        sections.len()
    );
    Ok(())
}

/// Tag every section file of every `song` section with its BPM.
/// Failures are warnings; the audio is already safely on disk.
pub fn tag_sections(
    output_dir: &Path,
    sections: &[SectionInfo],
    reporter: &dyn Reporter,
) {
    for section in sections {
        let Some(bpm) = section.bpm else { continue };
        let dir = output_dir.join(section_dir_name(section.section_number, sections.len()));
        let files = match top_level_tracks(&dir) {
            Ok(files) => files,
            Err(e) => {
                reporter.warning(&format!(
                    "cannot list section directory '{}': {}",
                    dir.display(),
                    e
                ));
                continue;
            }
        };
        for file in files {
            if let Err(e) = metadata::write_bpm(&file, Some(bpm)) {
                reporter.warning(&format!("{}", e));
            }
        }
    }
}

/// The `.wav` files directly inside `dir`, sorted by name.
fn top_level_tracks(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::split(dir, e))?;
    let mut tracks: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::split(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_wav = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if is_wav {
            tracks.push(path);
        }
    }
    tracks.sort();
    Ok(tracks)
}

/// Stream one track into all of its section files. On any failure the
/// already-written section files for this track are removed and the
/// source is left untouched.
fn split_one_track(
    track: &Path,
    sections: &[SectionInfo],
    output_dir: &Path,
    block_frames: usize,
) -> Result<()> {
    let info = probe(track).map_err(|e| PipelineError::split(track, e))?;
    // Section files keep the track's own subtype.
    let converter = BitDepthConverter::resolve(TargetDepth::Source, info.bit_depth);
    let base = track
        .file_name()
        .ok_or_else(|| PipelineError::split(track, "track has no file name"))?;

    let mut written: Vec<PathBuf> = Vec::new();
    let result = (|| -> Result<()> {
        for section in sections {
            if section.end_sample > info.frame_count {
                return Err(PipelineError::split(
                    track,
                    format!(
                        "section {} ends at {} but the track holds {} frames",
                        section.section_number, section.end_sample, info.frame_count
                    ),
                ));
            }

            let dest = output_dir
                .join(section_dir_name(section.section_number, sections.len()))
                .join(base);
            let mut reader = BlockReader::open(track, block_frames)
                .map_err(|e| PipelineError::split(track, e))?;
            reader
                .seek(section.start_sample)
                .map_err(|e| PipelineError::split(track, e))?;

            let mut writer =
                FrameWriter::create(&dest, info.sample_rate, info.channel_count, converter)
                    .map_err(|e| PipelineError::split(&dest, e))?;

            let mut remaining = section.frame_count();
            while remaining > 0 {
                let block = reader
                    .next_block()
                    .map_err(|e| PipelineError::split(track, e))?
                    .ok_or_else(|| {
                        PipelineError::split(track, "track ended before its section table")
                    })?;
                let take = (block.nrows() as u64).min(remaining) as usize;
                writer
                    .append(block.slice(s![..take, ..]))
                    .map_err(|e| PipelineError::split(&dest, e))?;
                remaining -= take as u64;
            }

            let frames = writer
                .finalize()
                .map_err(|e| PipelineError::split(&dest, e))?;
            debug!("wrote {} ({} frames)", dest.display(), frames);
            written.push(dest);
        }
        Ok(())
    })();

    if result.is_err() {
        for file in &written {
            let _ = std::fs::remove_file(file);
        }
    }
    result
}
