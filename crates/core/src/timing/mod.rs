//! Audience speed tiers and the cue/blank durations derived from them.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ChoreoError;

/// Audience speed classification. Slower audiences get longer cues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudienceTier {
    Relaxed,
    Standard,
    Brisk,
}

impl AudienceTier {
    pub const ALL: [AudienceTier; 3] = [
        AudienceTier::Relaxed,
        AudienceTier::Standard,
        AudienceTier::Brisk,
    ];

    /// Base duration in milliseconds. The base profile uses it for both the cue
    /// and the blank, so the two can never diverge.
    pub const fn base_ms(self) -> u32 {
        match self {
            AudienceTier::Relaxed => 900,
            AudienceTier::Standard => 700,
            AudienceTier::Brisk => 550,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AudienceTier::Relaxed => "relaxed",
            AudienceTier::Standard => "standard",
            AudienceTier::Brisk => "brisk",
        }
    }
}

impl fmt::Display for AudienceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudienceTier {
    type Err = ChoreoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AudienceTier::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                ChoreoError::msg(format!(
                    "unknown audience tier `{value}` (expected relaxed, standard or brisk)"
                ))
            })
    }
}

/// On-signal and off-signal durations of a timed prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueProfile {
    pub cue_ms: u32,
    pub blank_ms: u32,
}

/// Memory-recall timing: the cue at base speed, then a triple-length blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryProfile {
    pub cue_ms: u32,
    #[serde(rename = "blank3xMs")]
    pub blank_3x_ms: u32,
}

pub fn base_profile(tier: AudienceTier) -> CueProfile {
    let base = tier.base_ms();
    CueProfile {
        cue_ms: base,
        blank_ms: base,
    }
}

/// Cue ×1.5 (rounded to the nearest millisecond), blank ×2.
pub fn two_symbol_profile(tier: AudienceTier) -> CueProfile {
    let base = tier.base_ms();
    CueProfile {
        cue_ms: (f64::from(base) * 1.5).round() as u32,
        blank_ms: base * 2,
    }
}

/// Cue ×1, blank ×3.
pub fn memory_profile(tier: AudienceTier) -> MemoryProfile {
    let base = tier.base_ms();
    MemoryProfile {
        cue_ms: base,
        blank_3x_ms: base * 3,
    }
}

/// All three profiles of a tier, computed together for display or embedding
/// in a program record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingProfiles {
    pub tier: AudienceTier,
    pub base: CueProfile,
    pub two_symbol: CueProfile,
    pub memory: MemoryProfile,
}

impl TimingProfiles {
    pub fn for_tier(tier: AudienceTier) -> Self {
        Self {
            tier,
            base: base_profile(tier),
            two_symbol: two_symbol_profile(tier),
            memory: memory_profile(tier),
        }
    }
}
