//! Section post-processing — short-section merging and classification.

use log::debug;

use crate::models::{SectionInfo, SectionType};

/// Fold sections shorter than the minimum into a neighbor, in one
/// forward pass. The first section merges into its successor (adopting
/// the successor's tempo); every other short section merges into its
/// predecessor (keeping the predecessor's tempo). A single remaining
/// short section is left alone. No samples are ever dropped.
pub fn merge_short(
    sections: Vec<SectionInfo>,
    min_section_length_seconds: f64,
    sample_rate: u32,
) -> Vec<SectionInfo> {
    let min_frames = (min_section_length_seconds * sample_rate as f64) as u64;
    if sections.len() <= 1 {
        return renumber(classify(sections));
    }

    let mut merged: Vec<SectionInfo> = Vec::new();
    for (i, section) in sections.into_iter().enumerate() {
        if i == 0 {
            merged.push(section);
            continue;
        }
        if i == 1 && merged[0].frame_count() < min_frames {
            // Index 0 is the only section that merges forward.
            debug!(
                "merging short opening section into its successor ({} frames)",
                merged[0].frame_count()
            );
            let mut successor = section;
            successor.start_sample = merged[0].start_sample;
            merged.clear();
            merged.push(successor);
            continue;
        }
        if section.frame_count() < min_frames {
            if let Some(prev) = merged.last_mut() {
                debug!(
                    "merging short section [{}, {}) into its predecessor",
                    section.start_sample, section.end_sample
                );
                prev.end_sample = section.end_sample;
            }
        } else {
            merged.push(section);
        }
    }

    renumber(classify(merged))
}

/// `song` iff a BPM was estimated.
pub fn classify(mut sections: Vec<SectionInfo>) -> Vec<SectionInfo> {
    for section in &mut sections {
        section.section_type = if section.bpm.is_some() {
            SectionType::Song
        } else {
            SectionType::Speaking
        };
    }
    sections
}

/// Reassign section numbers 1..=M in order.
pub fn renumber(mut sections: Vec<SectionInfo>) -> Vec<SectionInfo> {
    for (i, section) in sections.iter_mut().enumerate() {
        section.section_number = (i + 1) as u32;
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 48_000;

    fn section(start_s: f64, end_s: f64, bpm: Option<u32>) -> SectionInfo {
        SectionInfo {
            section_number: 0,
            start_sample: (start_s * SR as f64) as u64,
            end_sample: (end_s * SR as f64) as u64,
            bpm,
            section_type: if bpm.is_some() {
                SectionType::Song
            } else {
                SectionType::Speaking
            },
        }
    }

    fn total_frames(sections: &[SectionInfo]) -> u64 {
        sections.iter().map(|s| s.frame_count()).sum()
    }

    #[test]
    fn test_no_merge_when_all_long() {
        let input = vec![
            section(0.0, 30.0, Some(120)),
            section(30.0, 45.0, None),
            section(45.0, 90.0, Some(98)),
        ];
        let before = total_frames(&input);
        let out = merge_short(input, 10.0, SR);
        assert_eq!(out.len(), 3);
        assert_eq!(total_frames(&out), before);
        assert_eq!(
            out.iter().map(|s| s.section_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_short_first_merges_forward() {
        let input = vec![
            section(0.0, 2.0, None),
            section(2.0, 40.0, Some(120)),
            section(40.0, 80.0, Some(96)),
        ];
        let out = merge_short(input, 10.0, SR);
        assert_eq!(out.len(), 2);
        // successor absorbed the opening seconds and kept its own tempo
        assert_eq!(out[0].start_sample, 0);
        assert_eq!(out[0].end_sample, (40.0 * SR as f64) as u64);
        assert_eq!(out[0].bpm, Some(120));
        assert_eq!(out[0].section_type, SectionType::Song);
    }

    #[test]
    fn test_short_middle_merges_backward() {
        let input = vec![
            section(0.0, 30.0, Some(120)),
            section(30.0, 33.0, None),
            section(33.0, 70.0, Some(140)),
        ];
        let out = merge_short(input, 10.0, SR);
        assert_eq!(out.len(), 2);
        // predecessor extended, tempo preserved
        assert_eq!(out[0].end_sample, (33.0 * SR as f64) as u64);
        assert_eq!(out[0].bpm, Some(120));
        assert_eq!(out[1].start_sample, (33.0 * SR as f64) as u64);
    }

    #[test]
    fn test_short_last_merges_backward() {
        let input = vec![
            section(0.0, 30.0, Some(120)),
            section(30.0, 32.0, None),
        ];
        let out = merge_short(input, 10.0, SR);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start_sample, 0);
        assert_eq!(out[0].end_sample, (32.0 * SR as f64) as u64);
        assert_eq!(out[0].bpm, Some(120));
    }

    #[test]
    fn test_single_short_section_left_alone() {
        let input = vec![section(0.0, 1.0, None)];
        let out = merge_short(input, 10.0, SR);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].frame_count(), SR as u64);
    }

    #[test]
    fn test_all_short_collapse_to_one() {
        let input = vec![
            section(0.0, 1.0, Some(100)),
            section(1.0, 2.0, Some(110)),
            section(2.0, 3.0, Some(120)),
            section(3.0, 4.0, None),
        ];
        let before = total_frames(&input);
        let out = merge_short(input, 10.0, SR);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start_sample, 0);
        assert_eq!(out[0].end_sample, (4.0 * SR as f64) as u64);
        assert_eq!(total_frames(&out), before);
        // index 0 folded into index 1, so the survivor carries 110
        assert_eq!(out[0].bpm, Some(110));
    }

    #[test]
    fn test_merged_sections_meet_minimum() {
        let input = vec![
            section(0.0, 12.0, Some(100)),
            section(12.0, 14.0, None),
            section(14.0, 15.0, Some(130)),
            section(15.0, 40.0, Some(130)),
        ];
        let out = merge_short(input, 10.0, SR);
        assert!(out.len() > 1);
        let min_frames = (10.0 * SR as f64) as u64;
        for s in &out {
            assert!(s.frame_count() >= min_frames, "section {:?} too short", s);
        }
        // contiguity survives merging
        for pair in out.windows(2) {
            assert_eq!(pair[0].end_sample, pair[1].start_sample);
        }
    }

    #[test]
    fn test_classify_follows_bpm() {
        let sections = vec![
            SectionInfo {
                section_number: 1,
                start_sample: 0,
                end_sample: 10,
                bpm: Some(90),
                section_type: SectionType::Speaking, // wrong on purpose
            },
            SectionInfo {
                section_number: 2,
                start_sample: 10,
                end_sample: 20,
                bpm: None,
                section_type: SectionType::Song, // wrong on purpose
            },
        ];
        let out = classify(sections);
        assert_eq!(out[0].section_type, SectionType::Song);
        assert_eq!(out[1].section_type, SectionType::Speaking);
    }
}
