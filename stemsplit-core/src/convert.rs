//! Bit-depth conversion — float frame blocks to the on-disk subtype.
//!
//! The converter is resolved once per session, before any writer opens,
//! and is stateless across blocks: every writer in the pipeline shares
//! the same variant.

use hound::{SampleFormat, WavWriter};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::io::{Seek, Write};

use crate::models::BitDepth;

const I16_SCALE: f64 = 32_768.0; // 2^15
const I24_SCALE: f64 = 8_388_608.0; // 2^23

/// Requested output depth. `Source` resolves against the session's
/// probed input depth before extraction begins; the resolution never
/// changes mid-pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetDepth {
    #[default]
    Source,
    Int16,
    Int24,
    Float32,
}

/// Strategy-per-target sample conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepthConverter {
    Int16,
    Int24,
    Float32,
}

impl BitDepthConverter {
    /// Resolve the session converter from the requested target and the
    /// probed source depth.
    pub fn resolve(target: TargetDepth, source: BitDepth) -> Self {
        match target {
            TargetDepth::Source => match source {
                BitDepth::Int16 => Self::Int16,
                BitDepth::Int24 => Self::Int24,
                BitDepth::Float32 => Self::Float32,
            },
            TargetDepth::Int16 => Self::Int16,
            TargetDepth::Int24 => Self::Int24,
            TargetDepth::Float32 => Self::Float32,
        }
    }

    pub fn target(&self) -> BitDepth {
        match self {
            Self::Int16 => BitDepth::Int16,
            Self::Int24 => BitDepth::Int24,
            Self::Float32 => BitDepth::Float32,
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.target().bits_per_sample()
    }

    pub fn sample_format(&self) -> SampleFormat {
        match self {
            Self::Float32 => SampleFormat::Float,
            _ => SampleFormat::Int,
        }
    }

    /// Convert a frame-major float block and append it to `writer`.
    /// Iteration order is frame-major, so samples land interleaved.
    pub fn write_block<W: Write + Seek>(
        &self,
        writer: &mut WavWriter<W>,
        block: ArrayView2<'_, f32>,
    ) -> hound::Result<()> {
        match self {
            Self::Float32 => {
                for &x in block.iter() {
                    writer.write_sample(x)?;
                }
            }
            Self::Int24 => {
                for &x in block.iter() {
                    writer.write_sample(quantize_i24(x))?;
                }
            }
            Self::Int16 => {
                for &x in block.iter() {
                    writer.write_sample(quantize_i16(x))?;
                }
            }
        }
        Ok(())
    }
}

/// Scale by 2^15, round half-to-even, clip to the signed 16-bit range.
pub fn quantize_i16(x: f32) -> i16 {
    let scaled = (x as f64 * I16_SCALE).round_ties_even();
    scaled.clamp(-32_768.0, 32_767.0) as i16
}

/// Scale by 2^23, round half-to-even, clip to the signed 24-bit range.
/// Stored as the low 24 bits of an i32.
pub fn quantize_i24(x: f32) -> i32 {
    let scaled = (x as f64 * I24_SCALE).round_ties_even();
    scaled.clamp(-8_388_608.0, 8_388_607.0) as i32
}
