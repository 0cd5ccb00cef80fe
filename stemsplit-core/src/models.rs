//! Data models for the StemSplit core engine.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PipelineError, Result};

/// Frames per block for all chunked reads and writes. One block size is
/// used for the whole session so back-to-back blocks concatenate
/// without any boundary handling.
pub const DEFAULT_BLOCK_FRAMES: usize = 32 * 1024;

// ---------------------------------------------------------------------------
//  Cancellation
// ---------------------------------------------------------------------------

/// Cancellation token — shared atomic bool for cooperative cancellation.
pub type CancelToken = Arc<AtomicBool>;

/// Create a new cancellation token.
pub fn new_cancel_token() -> CancelToken {
    Arc::new(AtomicBool::new(false))
}

/// Check if cancelled; return Err if so.
pub fn check_cancelled(cancel: &Option<CancelToken>) -> Result<()> {
    if let Some(token) = cancel {
        if token.load(Ordering::Relaxed) {
            return Err(PipelineError::Cancelled);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
//  Audio parameters
// ---------------------------------------------------------------------------

/// PCM subtype of the session's WAV data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitDepth {
    Int16,
    Int24,
    Float32,
}

impl BitDepth {
    /// Container subtype token.
    pub fn subtype(&self) -> &'static str {
        match self {
            BitDepth::Int16 => "PCM_16",
            BitDepth::Int24 => "PCM_24",
            BitDepth::Float32 => "FLOAT",
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        match self {
            BitDepth::Int16 => 16,
            BitDepth::Int24 => 24,
            BitDepth::Float32 => 32,
        }
    }
}

/// Shared parameters of one recording session, established from the
/// first input file at validation time and read-only thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioParameters {
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bit_depth: BitDepth,
}

// ---------------------------------------------------------------------------
//  Sections
// ---------------------------------------------------------------------------

/// Musical classification of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Song,
    Speaking,
}

/// One contiguous time range of the session, bounded by detected
/// click-track events. Sections are 1-based, ordered, non-overlapping
/// and tile the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionInfo {
    pub section_number: u32,
    pub start_sample: u64,
    pub end_sample: u64,
    pub bpm: Option<u32>,
    pub section_type: SectionType,
}

impl SectionInfo {
    pub fn frame_count(&self) -> u64 {
        self.end_sample.saturating_sub(self.start_sample)
    }

    pub fn duration_s(&self, sample_rate: u32) -> f64 {
        self.frame_count() as f64 / sample_rate as f64
    }

    pub fn is_song(&self) -> bool {
        self.section_type == SectionType::Song
    }

    /// The whole-session fallback: one speaking section over `[0, total)`.
    pub fn whole(total_frames: u64) -> Self {
        Self {
            section_number: 1,
            start_sample: 0,
            end_sample: total_frames,
            bpm: None,
            section_type: SectionType::Speaking,
        }
    }
}

// ---------------------------------------------------------------------------
//  Reporting
// ---------------------------------------------------------------------------

/// Structured event sink. The pipeline emits progress ticks per input
/// file and per output track plus free-form info/warning/error lines;
/// implementations render to a terminal, logs, or JSON.
pub trait Reporter: Send + Sync {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);

    fn progress(&self, current: usize, total: usize, message: &str) {
        let _ = (current, total);
        self.info(message);
    }
}

/// Default sink — forwards everything to the `log` crate.
pub struct LogReporter;

impl Reporter for LogReporter {
    fn info(&self, message: &str) {
        log::info!("{}", message);
    }

    fn warning(&self, message: &str) {
        log::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        log::error!("{}", message);
    }

    fn progress(&self, current: usize, total: usize, message: &str) {
        log::debug!("[{}/{}] {}", current, total, message);
    }
}

/// Silent sink for tests.
pub struct NullReporter;

impl Reporter for NullReporter {
    fn info(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn progress(&self, _current: usize, _total: usize, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_depth_subtypes() {
        assert_eq!(BitDepth::Int16.subtype(), "PCM_16");
        assert_eq!(BitDepth::Int24.subtype(), "PCM_24");
        assert_eq!(BitDepth::Float32.subtype(), "FLOAT");
        assert_eq!(BitDepth::Int24.bits_per_sample(), 24);
    }

    #[test]
    fn test_section_info_accessors() {
        let s = SectionInfo {
            section_number: 2,
            start_sample: 48_000,
            end_sample: 144_000,
            bpm: Some(120),
            section_type: SectionType::Song,
        };
        assert_eq!(s.frame_count(), 96_000);
        assert!((s.duration_s(48_000) - 2.0).abs() < 1e-9);
        assert!(s.is_song());
    }

    #[test]
    fn test_section_whole() {
        let s = SectionInfo::whole(1000);
        assert_eq!(s.section_number, 1);
        assert_eq!(s.start_sample, 0);
        assert_eq!(s.end_sample, 1000);
        assert_eq!(s.bpm, None);
        assert_eq!(s.section_type, SectionType::Speaking);
    }

    #[test]
    fn test_cancel_token() {
        let token = new_cancel_token();
        assert!(check_cancelled(&Some(token.clone())).is_ok());
        token.store(true, Ordering::Relaxed);
        assert!(matches!(
            check_cancelled(&Some(token)),
            Err(PipelineError::Cancelled)
        ));
    }

    #[test]
    fn test_check_cancelled_none() {
        assert!(check_cancelled(&None).is_ok());
    }
}
