//! StemSplit Core — multitrack recorder session splitting engine.
//!
//! This crate provides:
//! - **models**: Data structures (AudioParameters, SectionInfo, Reporter, CancelToken).
//! - **config**: Channel/bus/section-splitting configuration and plan resolution.
//! - **audio_io**: Chunked WAV reading and atomic WAV writing via hound.
//! - **convert**: Bit-depth conversion strategies (PCM 16/24, float 32).
//! - **discovery**: Numeric-ordered input discovery and homogeneity validation.
//! - **extract**: Streaming de-interleave into per-channel segments.
//! - **tracks**: Segment concatenation and stereo bus interleaving.
//! - **click**: Click-track onset detection, tempo estimation, section boundaries.
//! - **sections**: Short-section merging and song/speaking classification.
//! - **splitter**: Section splitting of the output directory.
//! - **metadata**: ID3 TBPM tag read/write on WAV files.
//! - **session_io**: JSON session report.
//! - **pipeline**: The orchestrator tying it all together.

pub mod models;
pub mod error;
pub mod config;
pub mod audio_io;
pub mod convert;
pub mod discovery;
pub mod extract;
pub mod tracks;
pub mod click;
pub mod sections;
pub mod splitter;
pub mod metadata;
pub mod session_io;
pub mod pipeline;

// Re-export key types for convenience.
pub use error::{PipelineError, Result};
pub use models::*;
