//! Tick-based encoding used by beat-driven content.
//!
//! Segment lengths are tick counts; wall-clock time is always
//! `ticks * ms_per_tick()`, with the tick length fixed by the BPM.

use serde::{Deserialize, Serialize};

use crate::{ChoreoError, Result};

const MS_PER_MINUTE: f64 = 60_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickProgram {
    pub bpm: u32,
    pub explain_ticks: u32,
    pub set_ticks: u32,
    pub transition_ticks: u32,
    pub blocks: u32,
}

impl Default for TickProgram {
    fn default() -> Self {
        Self {
            bpm: 120,
            explain_ticks: 8,
            set_ticks: 32,
            transition_ticks: 4,
            blocks: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickSegmentKind {
    Explain,
    Set,
    Transition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSegment {
    pub kind: TickSegmentKind,
    /// Zero-based block the segment belongs to.
    pub block: u32,
    pub start_tick: u32,
    pub ticks: u32,
}

impl TickProgram {
    pub fn validate(&self) -> Result<()> {
        if self.bpm == 0 {
            return Err(ChoreoError::msg("tick program bpm must be positive"));
        }
        if self.blocks == 0 {
            return Err(ChoreoError::msg("tick program needs at least one block"));
        }
        if self.set_ticks == 0 {
            return Err(ChoreoError::msg("tick program sets must last at least one tick"));
        }
        if self.checked_total_ticks().is_none() {
            return Err(ChoreoError::msg(format!(
                "tick program exceeds {} ticks",
                u32::MAX
            )));
        }
        Ok(())
    }

    pub fn ms_per_tick(&self) -> f64 {
        MS_PER_MINUTE / f64::from(self.bpm)
    }

    /// Each block is explain then set; blocks are separated by a transition.
    /// Saturates at `u32::MAX` for programs that fail [`TickProgram::validate`].
    pub fn total_ticks(&self) -> u32 {
        self.checked_total_ticks().unwrap_or(u32::MAX)
    }

    fn checked_total_ticks(&self) -> Option<u32> {
        let per_block = self.explain_ticks.checked_add(self.set_ticks)?;
        let transitions = self.blocks.saturating_sub(1).checked_mul(self.transition_ticks)?;
        self.blocks.checked_mul(per_block)?.checked_add(transitions)
    }

    pub fn total_duration_ms(&self) -> f64 {
        f64::from(self.total_ticks()) * self.ms_per_tick()
    }

    pub fn tick_to_ms(&self, tick: u32) -> f64 {
        f64::from(tick) * self.ms_per_tick()
    }

    pub fn segments(&self) -> Vec<TickSegment> {
        let mut segments = Vec::new();
        let mut cursor: u32 = 0;
        let mut push = |kind: TickSegmentKind, block: u32, ticks: u32| {
            if ticks > 0 {
                segments.push(TickSegment {
                    kind,
                    block,
                    start_tick: cursor,
                    ticks,
                });
                cursor = cursor.saturating_add(ticks);
            }
        };

        for block in 0..self.blocks {
            if block > 0 {
                push(TickSegmentKind::Transition, block, self.transition_ticks);
            }
            push(TickSegmentKind::Explain, block, self.explain_ticks);
            push(TickSegmentKind::Set, block, self.set_ticks);
        }
        segments
    }
}
