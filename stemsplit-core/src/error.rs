//! Error types for the splitting pipeline.

use std::path::{Path, PathBuf};

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Every failure mode of a splitting session.
///
/// `AnalysisFailed` and `MetadataFailed` are recoverable (the
/// orchestrator degrades and continues); everything else aborts the
/// session after temp cleanup.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Empty input set, unreadable file, or inter-file parameter mismatch.
    #[error("invalid input ({path}): {reason}")]
    InputInvalid { path: PathBuf, reason: String },

    /// Duplicate channels, bad bus slots, multiple click channels, etc.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// I/O or decode error while de-interleaving.
    #[error("extraction failed ({path}): {reason}")]
    ExtractionFailed { path: PathBuf, reason: String },

    /// I/O error while concatenating or interleaving final tracks.
    #[error("track build failed ({path}): {reason}")]
    BuildFailed { path: PathBuf, reason: String },

    /// Signal-chain failure on the click track.
    #[error("click analysis failed ({path}): {reason}")]
    AnalysisFailed { path: PathBuf, reason: String },

    /// I/O error while writing section files.
    #[error("section split failed ({path}): {reason}")]
    SplitFailed { path: PathBuf, reason: String },

    /// Tag write failure; section audio is unaffected.
    #[error("metadata write failed ({path}): {reason}")]
    MetadataFailed { path: PathBuf, reason: String },

    /// A violated internal assumption (programmer error, not user input).
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    /// User-requested abort.
    #[error("operation cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn input(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::InputInvalid {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn extraction(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::ExtractionFailed {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn build(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::BuildFailed {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn analysis(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::AnalysisFailed {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn split(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::SplitFailed {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn metadata(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::MetadataFailed {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// True for errors the orchestrator may downgrade to a warning.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AnalysisFailed { .. } | Self::MetadataFailed { .. }
        )
    }
}
