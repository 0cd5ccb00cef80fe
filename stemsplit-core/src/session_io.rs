//! Session report — JSON summary of a completed run.
//!
//! Written only when the caller supplies a path. The section list in
//! the report is exactly the one the splitter used.

use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::{AudioParameters, SectionInfo};

const REPORT_VERSION: u32 = 1;

/// Top-level report structure for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Schema version for future-proofing.
    pub version: u32,

    /// Application version that created this file.
    pub app_version: String,

    /// ISO-8601 timestamp of the run.
    pub created_at: String,

    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub parameters: AudioParameters,
    pub input_files: Vec<String>,
    pub total_frames: u64,

    /// Final track file names, before any section split.
    pub tracks: Vec<String>,

    /// Detected sections; empty when splitting was off.
    pub sections: Vec<SectionInfo>,
}

impl SessionReport {
    pub fn new(
        input_dir: PathBuf,
        output_dir: PathBuf,
        parameters: AudioParameters,
        input_files: Vec<String>,
        total_frames: u64,
        tracks: Vec<String>,
        sections: Vec<SectionInfo>,
    ) -> Self {
        Self {
            version: REPORT_VERSION,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            input_dir,
            output_dir,
            parameters,
            input_files,
            total_frames,
            tracks,
            sections,
        }
    }
}

/// Save the report as pretty JSON.
pub fn write_session_report(path: &Path, report: &SessionReport) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, &json)?;
    info!("session report saved: {} ({} bytes)", path.display(), json.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BitDepth, SectionType};
    use tempfile::tempdir;

    fn sample_report() -> SessionReport {
        SessionReport::new(
            PathBuf::from("/in"),
            PathBuf::from("/out"),
            AudioParameters {
                sample_rate: 48_000,
                channel_count: 8,
                bit_depth: BitDepth::Int24,
            },
            vec!["rec1.wav".to_string(), "rec2.wav".to_string()],
            96_000,
            vec!["01_Kick.wav".to_string()],
            vec![SectionInfo {
                section_number: 1,
                start_sample: 0,
                end_sample: 96_000,
                bpm: Some(120),
                section_type: SectionType::Song,
            }],
        )
    }

    #[test]
    fn test_report_round_trip() {
        let report = sample_report();
        let json = serde_json::to_string(&report).unwrap();
        let loaded: SessionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.version, REPORT_VERSION);
        assert_eq!(loaded.parameters.sample_rate, 48_000);
        assert_eq!(loaded.sections.len(), 1);
        assert_eq!(loaded.sections[0].bpm, Some(120));
    }

    #[test]
    fn test_write_session_report() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports").join("session.json");
        write_session_report(&path, &sample_report()).unwrap();

        let loaded: SessionReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.tracks, vec!["01_Kick.wav".to_string()]);
        assert_eq!(loaded.total_frames, 96_000);
    }
}
