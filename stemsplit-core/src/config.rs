//! Session configuration — channel map, stereo buses, section splitting.
//!
//! The core receives these structures already parsed (the CLI loads
//! them from JSON); `resolve_channel_plan` turns the sparse user
//! configuration into a complete, validated per-channel plan.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PipelineError, Result};
use crate::tracks::sanitize;

// ---------------------------------------------------------------------------
//  User-facing configuration
// ---------------------------------------------------------------------------

/// What to do with one source channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelAction {
    /// Extract and write as a mono track.
    Process,
    /// Extract for bus use only; no mono output.
    Bus,
    /// Never extracted.
    Skip,
    /// Extracted, written as a mono track, and fed to the analyzer.
    Click,
}

/// One channel entry as configured by the user. Channels not listed are
/// auto-filled during plan resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(rename = "channel")]
    pub channel_number: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_action")]
    pub action: ChannelAction,
    #[serde(default)]
    pub output_channel: Option<u32>,
}

fn default_action() -> ChannelAction {
    ChannelAction::Process
}

/// Bus family. Stereo is the only member today; the closed set keeps
/// the config format forward-compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Stereo,
}

/// A stereo mixdown of two extracted channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub file_name: String,
    #[serde(rename = "type", default = "default_bus_kind")]
    pub kind: BusKind,
    pub left: u32,
    pub right: u32,
}

fn default_bus_kind() -> BusKind {
    BusKind::Stereo
}

/// Section splitting parameters. Only meaningful when exactly one
/// channel carries the click.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSplittingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_gap_threshold")]
    pub gap_threshold_seconds: f64,
    #[serde(default = "default_min_section_length")]
    pub min_section_length_seconds: f64,
    #[serde(default = "default_bpm_change_threshold")]
    pub bpm_change_threshold: u32,
}

fn default_gap_threshold() -> f64 {
    3.0
}

fn default_min_section_length() -> f64 {
    5.0
}

fn default_bpm_change_threshold() -> u32 {
    2
}

impl Default for SectionSplittingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gap_threshold_seconds: default_gap_threshold(),
            min_section_length_seconds: default_min_section_length(),
            bpm_change_threshold: default_bpm_change_threshold(),
        }
    }
}

impl SectionSplittingConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if !(self.gap_threshold_seconds > 0.0) {
            return Err(PipelineError::ConfigInvalid(format!(
                "gap_threshold_seconds must be positive, got {}",
                self.gap_threshold_seconds
            )));
        }
        if !(self.min_section_length_seconds > 0.0) {
            return Err(PipelineError::ConfigInvalid(format!(
                "min_section_length_seconds must be positive, got {}",
                self.min_section_length_seconds
            )));
        }
        if self.bpm_change_threshold < 1 {
            return Err(PipelineError::ConfigInvalid(
                "bpm_change_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Root of the parsed session configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub buses: Vec<BusConfig>,
    #[serde(default)]
    pub section_splitting: SectionSplittingConfig,
}

// ---------------------------------------------------------------------------
//  Resolved plan
// ---------------------------------------------------------------------------

/// A channel with every default filled in and its name sanitized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChannel {
    pub channel_number: u32,
    pub name: String,
    pub action: ChannelAction,
    pub output_channel: u32,
}

impl ResolvedChannel {
    /// Mono output file name, `NN_Name.wav`.
    pub fn file_name(&self, pad: usize) -> String {
        format!(
            "{:0width$}_{}.wav",
            self.output_channel,
            self.name,
            width = pad
        )
    }
}

/// The complete, validated plan for one session: one entry per source
/// channel, sanitized bus definitions, and the click channel if any.
#[derive(Debug, Clone)]
pub struct ChannelPlan {
    pub channels: Vec<ResolvedChannel>,
    pub buses: Vec<BusConfig>,
    pub click_channel: Option<u32>,
}

impl ChannelPlan {
    /// Channel numbers that must be de-interleaved (action ≠ Skip).
    pub fn extracted_channels(&self) -> Vec<u32> {
        self.channels
            .iter()
            .filter(|c| c.action != ChannelAction::Skip)
            .map(|c| c.channel_number)
            .collect()
    }

    /// Channels written as mono tracks (Process or Click).
    pub fn mono_outputs(&self) -> Vec<&ResolvedChannel> {
        self.channels
            .iter()
            .filter(|c| {
                matches!(c.action, ChannelAction::Process | ChannelAction::Click)
            })
            .collect()
    }

    pub fn channel(&self, number: u32) -> Option<&ResolvedChannel> {
        self.channels.iter().find(|c| c.channel_number == number)
    }

    /// Zero-pad width for mono output numbering: two digits, widened
    /// when a session carries more than 99 outputs.
    pub fn output_pad_width(&self) -> usize {
        let max = self
            .mono_outputs()
            .iter()
            .map(|c| c.output_channel)
            .max()
            .unwrap_or(0);
        max.to_string().len().max(2)
    }

    /// File name of the click channel's mono track, when one exists.
    pub fn click_track_file_name(&self) -> Option<String> {
        let number = self.click_channel?;
        let pad = self.output_pad_width();
        self.channel(number).map(|c| c.file_name(pad))
    }
}

fn generated_name(channel: u32) -> String {
    sanitize(&format!("Channel {:02}", channel))
}

/// Expand and validate the sparse user configuration against the probed
/// channel count.
pub fn resolve_channel_plan(config: &SessionConfig, channel_count: u16) -> Result<ChannelPlan> {
    let count = channel_count as u32;

    // Explicit entries, uniqueness and range first.
    let mut explicit: BTreeMap<u32, &ChannelConfig> = BTreeMap::new();
    for ch in &config.channels {
        if ch.channel_number < 1 || ch.channel_number > count {
            return Err(PipelineError::ConfigInvalid(format!(
                "channel {} is out of range 1..={}",
                ch.channel_number, count
            )));
        }
        if explicit.insert(ch.channel_number, ch).is_some() {
            return Err(PipelineError::ConfigInvalid(format!(
                "channel {} is configured more than once",
                ch.channel_number
            )));
        }
    }

    // Buses: sanitize names, check slots.
    let mut buses: Vec<BusConfig> = Vec::with_capacity(config.buses.len());
    let mut bus_names: BTreeSet<String> = BTreeSet::new();
    let mut bus_referenced: BTreeSet<u32> = BTreeSet::new();
    for bus in &config.buses {
        let file_name = sanitize(&bus.file_name);
        if file_name.is_empty() {
            return Err(PipelineError::ConfigInvalid(format!(
                "bus name '{}' is empty after sanitizing",
                bus.file_name
            )));
        }
        if !bus_names.insert(file_name.clone()) {
            return Err(PipelineError::ConfigInvalid(format!(
                "duplicate bus file name '{}'",
                file_name
            )));
        }
        for slot in [bus.left, bus.right] {
            if slot < 1 || slot > count {
                return Err(PipelineError::ConfigInvalid(format!(
                    "bus '{}' references channel {} outside 1..={}",
                    file_name, slot, count
                )));
            }
        }
        if bus.left == bus.right {
            return Err(PipelineError::ConfigInvalid(format!(
                "bus '{}' uses channel {} for both slots",
                file_name, bus.left
            )));
        }
        bus_referenced.insert(bus.left);
        bus_referenced.insert(bus.right);
        buses.push(BusConfig {
            file_name,
            kind: bus.kind,
            left: bus.left,
            right: bus.right,
        });
    }

    // Bus slots must point at channels whose samples are extracted but
    // not already claimed as plain mono outputs.
    for &slot in &bus_referenced {
        if let Some(ch) = explicit.get(&slot) {
            match ch.action {
                ChannelAction::Bus | ChannelAction::Click => {}
                other => {
                    return Err(PipelineError::ConfigInvalid(format!(
                        "channel {} is referenced by a bus but configured as {:?}",
                        slot, other
                    )));
                }
            }
        }
    }

    // Fill every source channel 1..=count.
    let mut channels: Vec<ResolvedChannel> = Vec::with_capacity(count as usize);
    for number in 1..=count {
        let resolved = match explicit.get(&number) {
            Some(ch) => {
                let name = ch
                    .name
                    .as_deref()
                    .map(sanitize)
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| generated_name(number));
                ResolvedChannel {
                    channel_number: number,
                    name,
                    action: ch.action,
                    output_channel: ch.output_channel.unwrap_or(number),
                }
            }
            None => {
                let action = if bus_referenced.contains(&number) {
                    ChannelAction::Bus
                } else {
                    ChannelAction::Process
                };
                ResolvedChannel {
                    channel_number: number,
                    name: generated_name(number),
                    action,
                    output_channel: number,
                }
            }
        };
        channels.push(resolved);
    }

    // Exactly zero or one click channel.
    let clicks: Vec<u32> = channels
        .iter()
        .filter(|c| c.action == ChannelAction::Click)
        .map(|c| c.channel_number)
        .collect();
    if clicks.len() > 1 {
        return Err(PipelineError::ConfigInvalid(format!(
            "at most one click channel is allowed, got channels {:?}",
            clicks
        )));
    }

    // Mono output numbering and names must be collision-free.
    let mut output_numbers: BTreeSet<u32> = BTreeSet::new();
    let plan = ChannelPlan {
        channels,
        buses,
        click_channel: clicks.first().copied(),
    };
    let pad = plan.output_pad_width();
    let mut output_names: BTreeSet<String> = plan
        .buses
        .iter()
        .map(|b| format!("{}.wav", b.file_name))
        .collect();
    for ch in plan.mono_outputs() {
        if !output_numbers.insert(ch.output_channel) {
            return Err(PipelineError::ConfigInvalid(format!(
                "output channel {} is assigned twice",
                ch.output_channel
            )));
        }
        if !output_names.insert(ch.file_name(pad)) {
            return Err(PipelineError::ConfigInvalid(format!(
                "output file name '{}' is assigned twice",
                ch.file_name(pad)
            )));
        }
    }

    Ok(plan)
}
