//! Audio I/O — chunked WAV reading, atomic WAV writing, metadata probe.
//!
//! All frame data moves through fixed-size `[frames × channels]` blocks;
//! nothing in the pipeline ever loads a whole file. Writers publish via
//! write-to-temp-then-rename, so readers never observe partial files.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;
use ndarray::{Array2, ArrayView2};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::convert::BitDepthConverter;
use crate::error::{PipelineError, Result};
use crate::models::{AudioParameters, BitDepth};

// ---------------------------------------------------------------------------
//  Probe
// ---------------------------------------------------------------------------

/// Probe result for a single WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeInfo {
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bit_depth: BitDepth,
    pub frame_count: u64,
}

impl ProbeInfo {
    pub fn parameters(&self) -> AudioParameters {
        AudioParameters {
            sample_rate: self.sample_rate,
            channel_count: self.channel_count,
            bit_depth: self.bit_depth,
        }
    }
}

/// Read a file's header without touching its sample data.
pub fn probe(path: &Path) -> Result<ProbeInfo> {
    let reader = WavReader::open(path).map_err(|e| PipelineError::input(path, e))?;
    let spec = reader.spec();
    let bit_depth = bit_depth_of(&spec).ok_or_else(|| {
        PipelineError::input(
            path,
            format!(
                "unsupported subtype: {:?} {} bit",
                spec.sample_format, spec.bits_per_sample
            ),
        )
    })?;
    Ok(ProbeInfo {
        sample_rate: spec.sample_rate,
        channel_count: spec.channels,
        bit_depth,
        frame_count: reader.duration() as u64,
    })
}

fn bit_depth_of(spec: &WavSpec) -> Option<BitDepth> {
    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => Some(BitDepth::Int16),
        (SampleFormat::Int, 24) => Some(BitDepth::Int24),
        (SampleFormat::Float, 32) => Some(BitDepth::Float32),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
//  Block reader
// ---------------------------------------------------------------------------

/// Chunked reader yielding interleaved frame blocks as `Array2<f32>`
/// with shape `[frames, channels]`. Integer samples are normalized by
/// `2^(bits − 1)`. The reader is cheap to reopen, so callers restart it
/// freely within a session.
pub struct BlockReader {
    reader: WavReader<BufReader<File>>,
    path: PathBuf,
    channels: usize,
    sample_rate: u32,
    block_frames: usize,
    float_source: bool,
    normalizer: f32,
    frames_read: u64,
    total_frames: u64,
}

impl BlockReader {
    pub fn open(path: &Path, block_frames: usize) -> hound::Result<Self> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        let depth = bit_depth_of(&spec).ok_or(hound::Error::Unsupported)?;
        let total_frames = reader.duration() as u64;
        Ok(Self {
            reader,
            path: path.to_path_buf(),
            channels: spec.channels as usize,
            sample_rate: spec.sample_rate,
            block_frames: block_frames.max(1),
            float_source: depth == BitDepth::Float32,
            normalizer: 1.0 / (1i64 << (depth.bits_per_sample() - 1)) as f32,
            frames_read: 0,
            total_frames,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_count(&self) -> u64 {
        self.total_frames
    }

    /// Jump to an absolute frame position.
    pub fn seek(&mut self, frame: u64) -> hound::Result<()> {
        self.reader.seek(frame as u32)?;
        self.frames_read = frame;
        Ok(())
    }

    /// The next block, or `None` at end of stream. The final block may
    /// be short; every other block holds exactly `block_frames` frames.
    pub fn next_block(&mut self) -> hound::Result<Option<Array2<f32>>> {
        let remaining = self.total_frames.saturating_sub(self.frames_read);
        if remaining == 0 {
            return Ok(None);
        }
        let frames = (remaining as usize).min(self.block_frames);
        let wanted = frames * self.channels;

        let mut buf: Vec<f32> = Vec::with_capacity(wanted);
        if self.float_source {
            for sample in self.reader.samples::<f32>().take(wanted) {
                buf.push(sample?);
            }
        } else {
            for sample in self.reader.samples::<i32>().take(wanted) {
                buf.push(sample? as f32 * self.normalizer);
            }
        }

        if buf.is_empty() {
            return Ok(None);
        }
        if buf.len() % self.channels != 0 {
            debug!("{}: stream ends mid-frame", self.path.display());
            return Err(hound::Error::FormatError("stream ends mid-frame"));
        }

        let got_frames = buf.len() / self.channels;
        self.frames_read += got_frames as u64;
        let block = Array2::from_shape_vec((got_frames, self.channels), buf)
            .expect("interleaved buffer matches block shape");
        Ok(Some(block))
    }
}

// ---------------------------------------------------------------------------
//  Frame writer
// ---------------------------------------------------------------------------

/// Buffered frame sink that publishes atomically: samples go to
/// `<path>.tmp`, and `finalize()` renames onto the real path after the
/// container is closed. Dropping an unfinalized writer removes the temp
/// file, so a failed write never leaves a partial output behind.
pub struct FrameWriter {
    writer: Option<WavWriter<BufWriter<File>>>,
    converter: BitDepthConverter,
    tmp_path: PathBuf,
    final_path: PathBuf,
    channels: u16,
    frames_written: u64,
}

impl FrameWriter {
    pub fn create(
        path: &Path,
        sample_rate: u32,
        channels: u16,
        converter: BitDepthConverter,
    ) -> hound::Result<Self> {
        let tmp_path = tmp_sibling(path);
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: converter.bits_per_sample(),
            sample_format: converter.sample_format(),
        };
        let writer = WavWriter::create(&tmp_path, spec)?;
        Ok(Self {
            writer: Some(writer),
            converter,
            tmp_path,
            final_path: path.to_path_buf(),
            channels,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append a `[frames × channels]` block through the session converter.
    pub fn append(&mut self, block: ArrayView2<'_, f32>) -> hound::Result<()> {
        if block.ncols() != self.channels as usize {
            return Err(hound::Error::FormatError(
                "block channel count differs from writer",
            ));
        }
        let writer = match self.writer.as_mut() {
            Some(w) => w,
            None => return Err(hound::Error::UnfinishedSample),
        };
        self.converter.write_block(writer, block)?;
        self.frames_written += block.nrows() as u64;
        Ok(())
    }

    /// Flush, finalize the container, and rename into place. Returns the
    /// number of frames written.
    pub fn finalize(mut self) -> hound::Result<u64> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        std::fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(self.frames_written)
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            drop(writer);
            if std::fs::remove_file(&self.tmp_path).is_ok() {
                debug!("removed abandoned temp file {}", self.tmp_path.display());
            }
        }
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}
