//! Click-track analysis — onset detection, tempo estimation, and
//! section boundary detection.
//!
//! Signal chain (single pass over the file, run twice):
//! 1. Bandpass 1 kHz–8 kHz: two cascaded biquad sections (Butterworth
//!    highpass + lowpass), direct-form-II transposed, state carried
//!    across blocks.
//! 2. Envelope: rectify, then a short moving average.
//! 3. Novelty: half-wave rectified first difference of the envelope.
//! 4. Peak pick: local maxima over adaptive height/prominence
//!    thresholds with a minimum inter-onset distance.
//!
//! The first pass collects novelty statistics (Welford); the second
//! picks peaks against the resulting thresholds. Onsets then turn into
//! sections via inter-onset-interval gaps and windowed median-tempo
//! changes.

use log::{debug, info};
use std::collections::VecDeque;
use std::path::Path;

use crate::audio_io::{probe, BlockReader};
use crate::config::SectionSplittingConfig;
use crate::error::{PipelineError, Result};
use crate::models::{SectionInfo, SectionType};

/// Bandpass edges for isolating the metronome from bleed.
pub const BAND_LOW_HZ: f64 = 1_000.0;
pub const BAND_HIGH_HZ: f64 = 8_000.0;

/// Envelope moving-average width in seconds.
pub const ENVELOPE_WINDOW_S: f64 = 0.005;

/// Minimum spacing between detected onsets. 150 ms caps the detectable
/// tempo at roughly 400 BPM.
pub const MIN_ONSET_DISTANCE_MS: f64 = 150.0;

/// Sliding window length, in inter-onset intervals, for tempo estimates.
pub const BPM_WINDOW_IOIS: usize = 12;

/// Fewer IOIs than this produce no tempo estimate.
pub const MIN_BPM_IOIS: usize = 4;

/// Floor for the peak height threshold so silence yields no onsets.
const NOVELTY_FLOOR: f64 = 1e-6;

// ---------------------------------------------------------------------------
//  Analyzer capability
// ---------------------------------------------------------------------------

/// Section detection over a finished click track. The orchestrator only
/// depends on this trait, so the signal chain can be swapped out.
pub trait ClickAnalyzer: Send + Sync {
    fn analyze(
        &self,
        click_path: &Path,
        cfg: &SectionSplittingConfig,
    ) -> Result<Vec<SectionInfo>>;
}

/// Production analyzer: filter → envelope → novelty → peak pick.
pub struct OnsetDetector {
    block_frames: usize,
}

impl OnsetDetector {
    pub fn new(block_frames: usize) -> Self {
        Self { block_frames }
    }

    /// Stream the click file through the signal chain, feeding each
    /// novelty sample to `sink`.
    fn stream_novelty(
        &self,
        path: &Path,
        sample_rate: u32,
        mut sink: impl FnMut(u64, f64),
    ) -> Result<()> {
        let mut reader = BlockReader::open(path, self.block_frames)
            .map_err(|e| PipelineError::analysis(path, e))?;
        let mut band = BandpassChain::new(sample_rate as f64);
        let mut envelope = EnvelopeFollower::new(envelope_width(sample_rate));
        let mut novelty = NoveltyStream::default();

        let mut index = 0u64;
        while let Some(block) = reader
            .next_block()
            .map_err(|e| PipelineError::analysis(path, e))?
        {
            for &x in block.column(0) {
                let filtered = band.process(x as f64);
                let env = envelope.process(filtered.abs());
                sink(index, novelty.process(env));
                index += 1;
            }
        }
        Ok(())
    }
}

impl ClickAnalyzer for OnsetDetector {
    fn analyze(
        &self,
        click_path: &Path,
        cfg: &SectionSplittingConfig,
    ) -> Result<Vec<SectionInfo>> {
        let probe_info =
            probe(click_path).map_err(|e| PipelineError::analysis(click_path, e))?;
        if probe_info.channel_count != 1 {
            return Err(PipelineError::analysis(
                click_path,
                format!(
                    "click track must be mono, has {} channels",
                    probe_info.channel_count
                ),
            ));
        }
        let total_frames = probe_info.frame_count;
        if total_frames == 0 {
            return Ok(Vec::new());
        }
        let sample_rate = probe_info.sample_rate;

        // Pass 1: novelty statistics.
        let mut stats = RunningStats::default();
        self.stream_novelty(click_path, sample_rate, |_, v| stats.push(v))?;

        let height = (stats.mean + 2.0 * stats.std()).max(NOVELTY_FLOOR);
        let prominence = 1.5 * stats.std();
        let min_distance =
            ((MIN_ONSET_DISTANCE_MS * sample_rate as f64 / 1000.0) as u64).max(1);

        // Pass 2: peak pick against the thresholds.
        let mut picker = PeakPicker::new(height, prominence, min_distance);
        self.stream_novelty(click_path, sample_rate, |_, v| picker.push(v))?;
        let onsets = picker.finish();

        info!(
            "click analysis: {} onset(s) over {} frames in {}",
            onsets.len(),
            total_frames,
            click_path.display()
        );
        Ok(sections_from_onsets(&onsets, total_frames, sample_rate, cfg))
    }
}

fn envelope_width(sample_rate: u32) -> usize {
    ((ENVELOPE_WINDOW_S * sample_rate as f64) as usize).max(1)
}

// ---------------------------------------------------------------------------
//  Signal chain
// ---------------------------------------------------------------------------

/// One biquad section, direct-form-II transposed. Holds two state
/// scalars, carried across blocks.
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    s1: f64,
    s2: f64,
}

impl Biquad {
    fn lowpass(sample_rate: f64, cutoff: f64, q: f64) -> Self {
        let w0 = std::f64::consts::TAU * cutoff / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = (1.0 - cos_w0) / 2.0;
        let b1 = 1.0 - cos_w0;
        let b2 = b0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;
        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    fn highpass(sample_rate: f64, cutoff: f64, q: f64) -> Self {
        let w0 = std::f64::consts::TAU * cutoff / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = (1.0 + cos_w0) / 2.0;
        let b1 = -(1.0 + cos_w0);
        let b2 = b0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;
        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            s1: 0.0,
            s2: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.s1;
        self.s1 = self.b1 * x - self.a1 * y + self.s2;
        self.s2 = self.b2 * x - self.a2 * y;
        y
    }
}

/// 4th-order Butterworth bandpass realized as a highpass/lowpass
/// cascade of two biquad sections (Q = 1/√2 each).
struct BandpassChain {
    highpass: Biquad,
    lowpass: Biquad,
}

impl BandpassChain {
    fn new(sample_rate: f64) -> Self {
        // Keep the upper edge below Nyquist for low-rate material.
        let high = BAND_HIGH_HZ.min(0.45 * sample_rate);
        let q = std::f64::consts::FRAC_1_SQRT_2;
        Self {
            highpass: Biquad::highpass(sample_rate, BAND_LOW_HZ, q),
            lowpass: Biquad::lowpass(sample_rate, high, q),
        }
    }

    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        self.lowpass.process(self.highpass.process(x))
    }
}

/// Moving-average smoother over the rectified signal.
struct EnvelopeFollower {
    window: VecDeque<f64>,
    width: usize,
    sum: f64,
}

impl EnvelopeFollower {
    fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            window: VecDeque::with_capacity(width + 1),
            width,
            sum: 0.0,
        }
    }

    fn process(&mut self, rectified: f64) -> f64 {
        self.window.push_back(rectified);
        self.sum += rectified;
        if self.window.len() > self.width {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        self.sum / self.window.len() as f64
    }
}

/// Half-wave rectified first difference; one trailing envelope sample
/// is held between blocks.
#[derive(Default)]
struct NoveltyStream {
    prev: Option<f64>,
}

impl NoveltyStream {
    fn process(&mut self, envelope: f64) -> f64 {
        let diff = match self.prev {
            Some(prev) => envelope - prev,
            None => 0.0,
        };
        self.prev = Some(envelope);
        diff.max(0.0)
    }
}

/// Streaming Welford estimator for mean and standard deviation.
#[derive(Debug, Default, Clone, Copy)]
struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn std(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }
}

// ---------------------------------------------------------------------------
//  Peak picking
// ---------------------------------------------------------------------------

/// Streaming local-maximum picker. Candidates must clear the height
/// threshold and rise at least `prominence` above the lowest valley
/// since the previous candidate; the minimum distance is then enforced
/// greedily by descending peak height.
struct PeakPicker {
    height: f64,
    prominence: f64,
    min_distance: u64,
    index: u64,
    prev: f64,
    prev_prev: f64,
    valley: f64,
    candidates: Vec<(u64, f64)>,
}

impl PeakPicker {
    fn new(height: f64, prominence: f64, min_distance: u64) -> Self {
        Self {
            height,
            prominence,
            min_distance: min_distance.max(1),
            index: 0,
            prev: f64::INFINITY,
            prev_prev: f64::INFINITY,
            valley: 0.0,
            candidates: Vec::new(),
        }
    }

    fn push(&mut self, value: f64) {
        if self.index >= 2 {
            let mid = self.prev;
            if mid >= self.prev_prev
                && mid > value
                && mid >= self.height
                && (mid - self.valley) >= self.prominence
            {
                self.candidates.push((self.index - 1, mid));
                self.valley = mid;
            }
        }
        self.valley = self.valley.min(value);
        self.prev_prev = self.prev;
        self.prev = value;
        self.index += 1;
    }

    /// Absolute sample indices of the surviving peaks, ascending.
    fn finish(mut self) -> Vec<u64> {
        self.candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        let mut kept: Vec<u64> = Vec::new();
        for &(idx, _) in &self.candidates {
            if kept.iter().all(|&k| k.abs_diff(idx) >= self.min_distance) {
                kept.push(idx);
            }
        }
        kept.sort_unstable();
        kept
    }
}

// ---------------------------------------------------------------------------
//  Tempo estimation
// ---------------------------------------------------------------------------

/// Integer BPM from a set of inter-onset intervals, `None` with fewer
/// than four intervals.
pub fn bpm_from_iois(iois: &[u64], sample_rate: u32) -> Option<u32> {
    if iois.len() < MIN_BPM_IOIS {
        return None;
    }
    let median = median_ioi(iois)?;
    if median <= 0.0 {
        return None;
    }
    Some((sample_rate as f64 * 60.0 / median).round() as u32)
}

fn median_ioi(iois: &[u64]) -> Option<f64> {
    if iois.is_empty() {
        return None;
    }
    let mut sorted = iois.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 1 {
        sorted[mid] as f64
    } else {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    })
}

/// Tempo estimate per sliding window of `BPM_WINDOW_IOIS` intervals,
/// keyed by the window's first interval index. Short runs collapse to a
/// single whole-run window.
fn window_estimates(iois: &[u64], sample_rate: u32) -> Vec<(usize, u32)> {
    if iois.len() < MIN_BPM_IOIS {
        return Vec::new();
    }
    if iois.len() <= BPM_WINDOW_IOIS {
        return match bpm_from_iois(iois, sample_rate) {
            Some(bpm) => vec![(0, bpm)],
            None => Vec::new(),
        };
    }
    (0..=iois.len() - BPM_WINDOW_IOIS)
        .filter_map(|i| {
            bpm_from_iois(&iois[i..i + BPM_WINDOW_IOIS], sample_rate).map(|bpm| (i, bpm))
        })
        .collect()
}

/// Boundary onsets inside one continuous run where the windowed tempo
/// shifts by at least `threshold` BPM.
///
/// A sliding median only settles on the new tempo once half its window
/// is past the change, so the raw window start lags the musical
/// transition by several beats. The boundary is therefore refined to
/// the first onset in the changed window whose trailing interval sits
/// closer to the new estimate than the old one; an equidistant interval
/// resolves to the later onset.
fn tempo_boundaries(run: &[u64], sample_rate: u32, threshold: u32) -> Vec<u64> {
    if run.len() < 2 {
        return Vec::new();
    }
    let iois: Vec<u64> = run.windows(2).map(|w| w[1] - w[0]).collect();
    let estimates = window_estimates(&iois, sample_rate);

    let mut bounds: Vec<u64> = Vec::new();
    for i in 1..estimates.len() {
        let (start_idx, bpm) = estimates[i];
        let (_, prev_bpm) = estimates[i - 1];
        if bpm.abs_diff(prev_bpm) < threshold {
            continue;
        }

        let window_end = (start_idx + BPM_WINDOW_IOIS).min(iois.len());
        let mut boundary = run[start_idx];
        for j in start_idx..window_end {
            let ioi_bpm = sample_rate as f64 * 60.0 / iois[j] as f64;
            let to_new = (ioi_bpm - bpm as f64).abs();
            let to_old = (ioi_bpm - prev_bpm as f64).abs();
            if to_new < to_old {
                boundary = run[j];
                break;
            }
            if to_new == to_old && j + 1 < run.len() {
                boundary = run[j + 1];
                break;
            }
        }
        bounds.push(boundary);
    }

    bounds.sort_unstable();
    bounds.dedup();
    bounds
}

// ---------------------------------------------------------------------------
//  Section assembly
// ---------------------------------------------------------------------------

/// Turn detected onsets into an ordered section list tiling
/// `[0, total_frames)`. Gap intervals split the onset sequence into
/// runs with a speaking section between them; tempo changes split runs
/// further. Each tempo-stable span carries the rounded median BPM of
/// its intervals.
pub fn sections_from_onsets(
    onsets: &[u64],
    total_frames: u64,
    sample_rate: u32,
    cfg: &SectionSplittingConfig,
) -> Vec<SectionInfo> {
    if total_frames == 0 {
        return Vec::new();
    }
    if onsets.len() < 2 {
        return vec![SectionInfo::whole(total_frames)];
    }

    let gap_samples = (cfg.gap_threshold_seconds * sample_rate as f64) as u64;

    // Split the onset sequence into gap-separated runs.
    let mut runs: Vec<Vec<u64>> = Vec::new();
    let mut current = vec![onsets[0]];
    for pair in onsets.windows(2) {
        if pair[1] - pair[0] >= gap_samples {
            runs.push(std::mem::take(&mut current));
        }
        current.push(pair[1]);
    }
    runs.push(current);

    let mut raw: Vec<(u64, u64, Option<u32>)> = Vec::new();
    let mut cursor = 0u64;
    let run_count = runs.len();
    for (k, run) in runs.iter().enumerate() {
        if k > 0 {
            // The stretch between two runs has no clicks: speaking.
            raw.push((cursor, run[0], None));
            cursor = run[0];
        }
        let run_end = match run.last() {
            Some(&last) if k + 1 < run_count => last,
            _ => total_frames,
        };

        let mut bounds = tempo_boundaries(run, sample_rate, cfg.bpm_change_threshold);
        bounds.retain(|&b| b > cursor && b < run_end);
        for b in bounds {
            raw.push((cursor, b, bpm_of_span(run, cursor, b, sample_rate)));
            cursor = b;
        }
        raw.push((cursor, run_end, bpm_of_span(run, cursor, run_end, sample_rate)));
        cursor = run_end;
    }

    raw.retain(|&(start, end, _)| end > start);
    debug!("assembled {} raw section(s) from {} onset(s)", raw.len(), onsets.len());

    raw.iter()
        .enumerate()
        .map(|(i, &(start, end, bpm))| SectionInfo {
            section_number: (i + 1) as u32,
            start_sample: start,
            end_sample: end,
            bpm,
            section_type: if bpm.is_some() {
                SectionType::Song
            } else {
                SectionType::Speaking
            },
        })
        .collect()
}

/// Median tempo of the intervals fully inside `[start, end]`.
fn bpm_of_span(run: &[u64], start: u64, end: u64, sample_rate: u32) -> Option<u32> {
    let iois: Vec<u64> = run
        .windows(2)
        .filter(|w| w[0] >= start && w[1] <= end)
        .map(|w| w[1] - w[0])
        .collect();
    bpm_from_iois(&iois, sample_rate)
}
