//! Expansion of an author's action picks into a timed block sequence.
//!
//! The sequence shape lives in [`WARMUP_TEMPLATE`]: an ordered list of segment
//! specs interpreted by [`ChoreographyTemplate::generate`]. Changing the shape
//! of a warmup means editing the template data, not the generator.

pub mod tick;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ChoreoError, Result};

pub use tick::{TickProgram, TickSegment, TickSegmentKind};

/// Number of actions an author must pick for a warmup.
pub const SELECTION_SIZE: usize = 5;

pub const INTRO_SECONDS: u32 = 5;
pub const EXPLAIN_SECONDS: u32 = 3;
pub const SET_SECONDS: u32 = 10;
pub const OUTRO_SECONDS: u32 = 5;

/// Identifier of an action from the external action catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ActionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Intro,
    Explain,
    Set,
    Outro,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Intro => "intro",
            BlockKind::Explain => "explain",
            BlockKind::Set => "set",
            BlockKind::Outro => "outro",
        }
    }
}

/// One timed segment of a generated choreography.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub kind: BlockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_index: Option<u8>,
    pub duration_seconds: u32,
}

/// A single entry of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSpec {
    pub kind: BlockKind,
    pub set_index: Option<u8>,
    pub duration_seconds: u32,
}

impl SegmentSpec {
    pub const fn new(kind: BlockKind, duration_seconds: u32) -> Self {
        Self {
            kind,
            set_index: None,
            duration_seconds,
        }
    }

    pub const fn set(index: u8, duration_seconds: u32) -> Self {
        Self {
            kind: BlockKind::Set,
            set_index: Some(index),
            duration_seconds,
        }
    }

    fn build(&self, action: Option<&ActionId>) -> Block {
        Block {
            kind: self.kind,
            action: action.cloned(),
            set_index: self.set_index,
            duration_seconds: self.duration_seconds,
        }
    }
}

/// Declarative choreography: `opening` once, `per_action` for every selected
/// action in order, then `closing` once.
#[derive(Debug, Clone, Copy)]
pub struct ChoreographyTemplate {
    pub actions: usize,
    pub opening: &'static [SegmentSpec],
    pub per_action: &'static [SegmentSpec],
    pub closing: &'static [SegmentSpec],
}

pub const WARMUP_TEMPLATE: ChoreographyTemplate = ChoreographyTemplate {
    actions: SELECTION_SIZE,
    opening: &[SegmentSpec::new(BlockKind::Intro, INTRO_SECONDS)],
    per_action: &[
        SegmentSpec::new(BlockKind::Explain, EXPLAIN_SECONDS),
        SegmentSpec::set(1, SET_SECONDS),
        SegmentSpec::set(2, SET_SECONDS),
    ],
    closing: &[SegmentSpec::new(BlockKind::Outro, OUTRO_SECONDS)],
};

impl ChoreographyTemplate {
    pub fn block_count(&self) -> usize {
        self.opening.len() + self.actions * self.per_action.len() + self.closing.len()
    }

    /// Declared program length, derived from the segment constants.
    pub fn total_seconds(&self) -> u32 {
        let sum = |specs: &[SegmentSpec]| specs.iter().map(|s| s.duration_seconds).sum::<u32>();
        sum(self.opening) + self.actions as u32 * sum(self.per_action) + sum(self.closing)
    }

    /// Expands `selection` into blocks. Pure and deterministic: the same
    /// selection always yields identical output.
    pub fn generate(&self, selection: &[ActionId]) -> Result<Vec<Block>> {
        if selection.len() != self.actions {
            return Err(ChoreoError::InvalidSelectionSize {
                expected: self.actions,
                actual: selection.len(),
            });
        }

        let mut blocks = Vec::with_capacity(self.block_count());
        blocks.extend(self.opening.iter().map(|spec| spec.build(None)));
        for action in selection {
            blocks.extend(self.per_action.iter().map(|spec| spec.build(Some(action))));
        }
        blocks.extend(self.closing.iter().map(|spec| spec.build(None)));
        Ok(blocks)
    }

    /// Verifies that `blocks` has the shape this template generates: the
    /// opening and closing segments without an action, and one group per
    /// action whose blocks all carry that action.
    pub fn check(&self, blocks: &[Block]) -> Result<()> {
        if blocks.len() != self.block_count() {
            return Err(ChoreoError::StructuralMismatch(format!(
                "expected {} blocks, found {}",
                self.block_count(),
                blocks.len()
            )));
        }

        let (opening, rest) = blocks.split_at(self.opening.len());
        let (groups, closing) = rest.split_at(rest.len() - self.closing.len());
        check_segments(self.opening, opening, 0, None)?;

        let mut offset = opening.len();
        for group in groups.chunks(self.per_action.len().max(1)) {
            let Some(action) = group[0].action.as_ref() else {
                return Err(ChoreoError::StructuralMismatch(format!(
                    "block {offset} has no action"
                )));
            };
            check_segments(self.per_action, group, offset, Some(action))?;
            offset += group.len();
        }

        check_segments(self.closing, closing, offset, None)
    }
}

fn check_segments(
    specs: &[SegmentSpec],
    blocks: &[Block],
    offset: usize,
    action: Option<&ActionId>,
) -> Result<()> {
    for (index, (spec, block)) in specs.iter().zip(blocks).enumerate() {
        let position = offset + index;
        if block.kind != spec.kind || block.set_index != spec.set_index {
            return Err(ChoreoError::StructuralMismatch(format!(
                "block {position} is {}, expected {}",
                label(block.kind, block.set_index),
                label(spec.kind, spec.set_index)
            )));
        }
        if block.duration_seconds != spec.duration_seconds {
            return Err(ChoreoError::StructuralMismatch(format!(
                "block {position} lasts {}s, expected {}s",
                block.duration_seconds, spec.duration_seconds
            )));
        }
        if block.action.as_ref() != action {
            return Err(ChoreoError::StructuralMismatch(format!(
                "block {position} belongs to {}, expected {}",
                owner(block.action.as_ref()),
                owner(action)
            )));
        }
    }
    Ok(())
}

fn label(kind: BlockKind, set_index: Option<u8>) -> String {
    match set_index {
        Some(index) => format!("{} {index}", kind.as_str()),
        None => kind.as_str().to_string(),
    }
}

fn owner(action: Option<&ActionId>) -> String {
    action.map_or_else(|| "no action".to_string(), |id| format!("`{id}`"))
}

/// Generates a warmup from exactly [`SELECTION_SIZE`] actions.
pub fn generate(selection: &[ActionId]) -> Result<Vec<Block>> {
    WARMUP_TEMPLATE.generate(selection)
}

/// Checks a stored block sequence against [`WARMUP_TEMPLATE`].
pub fn check(blocks: &[Block]) -> Result<()> {
    WARMUP_TEMPLATE.check(blocks)
}

pub fn total_duration_seconds(blocks: &[Block]) -> u32 {
    blocks.iter().map(|block| block.duration_seconds).sum()
}

/// A block placed on the program clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledBlock {
    pub start_seconds: u32,
    pub block: Block,
}

impl ScheduledBlock {
    pub fn end_seconds(&self) -> u32 {
        self.start_seconds + self.block.duration_seconds
    }
}

/// Start offsets for every block, in order.
pub fn schedule(blocks: &[Block]) -> Vec<ScheduledBlock> {
    let mut cursor = 0;
    blocks
        .iter()
        .map(|block| {
            let start_seconds = cursor;
            cursor += block.duration_seconds;
            ScheduledBlock {
                start_seconds,
                block: block.clone(),
            }
        })
        .collect()
}

/// Block active at `elapsed_seconds`, if the program is still running.
pub fn block_at(schedule: &[ScheduledBlock], elapsed_seconds: u32) -> Option<&ScheduledBlock> {
    let index = schedule.partition_point(|entry| entry.end_seconds() <= elapsed_seconds);
    schedule.get(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(ids: &[&str]) -> Vec<ActionId> {
        ids.iter().copied().map(ActionId::from).collect()
    }

    fn five() -> Vec<ActionId> {
        selection(&["squat", "lunge", "reach", "twist", "march"])
    }

    #[test]
    fn expands_into_intro_groups_and_outro() {
        let picks = five();
        let blocks = generate(&picks).unwrap();

        assert_eq!(blocks.len(), 2 + 3 * SELECTION_SIZE);
        assert_eq!(blocks.first().map(|b| b.kind), Some(BlockKind::Intro));
        assert_eq!(blocks.last().map(|b| b.kind), Some(BlockKind::Outro));
        assert!(blocks[0].action.is_none());

        for (group, action) in blocks[1..blocks.len() - 1].chunks(3).zip(&picks) {
            assert_eq!(group[0].kind, BlockKind::Explain);
            assert_eq!(group[0].set_index, None);
            assert_eq!(group[1].kind, BlockKind::Set);
            assert_eq!(group[1].set_index, Some(1));
            assert_eq!(group[2].kind, BlockKind::Set);
            assert_eq!(group[2].set_index, Some(2));
            assert_eq!(group[1].duration_seconds, group[2].duration_seconds);
            assert!(group.iter().all(|b| b.action.as_ref() == Some(action)));
        }
    }

    #[test]
    fn durations_sum_to_declared_total() {
        let blocks = generate(&five()).unwrap();
        let expected = INTRO_SECONDS
            + SELECTION_SIZE as u32 * (EXPLAIN_SECONDS + 2 * SET_SECONDS)
            + OUTRO_SECONDS;

        assert_eq!(WARMUP_TEMPLATE.total_seconds(), expected);
        assert_eq!(total_duration_seconds(&blocks), expected);
        assert_eq!(expected, 125);
        assert_eq!(blocks.len(), WARMUP_TEMPLATE.block_count());
    }

    #[test]
    fn rejects_wrong_selection_sizes() {
        for size in [0, 1, 4, 6, 10] {
            let picks: Vec<ActionId> = (0..size).map(|i| ActionId::new(format!("a{i}"))).collect();
            match generate(&picks) {
                Err(ChoreoError::InvalidSelectionSize { expected, actual }) => {
                    assert_eq!(expected, SELECTION_SIZE);
                    assert_eq!(actual, size);
                }
                other => panic!("expected InvalidSelectionSize, got {other:?}"),
            }
        }
    }

    #[test]
    fn generation_is_byte_identical_across_runs() {
        let first = serde_json::to_vec(&generate(&five()).unwrap()).unwrap();
        let second = serde_json::to_vec(&generate(&five()).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn repeated_actions_are_allowed() {
        let picks = selection(&["squat", "squat", "squat", "squat", "squat"]);
        assert_eq!(generate(&picks).unwrap().len(), 17);
    }

    #[test]
    fn blocks_serialize_with_wire_shape() {
        let blocks = generate(&five()).unwrap();
        let intro = serde_json::to_value(&blocks[0]).unwrap();
        assert_eq!(intro, serde_json::json!({ "kind": "intro", "durationSeconds": 5 }));

        let set = serde_json::to_value(&blocks[2]).unwrap();
        assert_eq!(
            set,
            serde_json::json!({
                "kind": "set",
                "action": "squat",
                "setIndex": 1,
                "durationSeconds": 10
            })
        );
    }

    #[test]
    fn custom_templates_are_interpreted_the_same_way() {
        const SHORT: ChoreographyTemplate = ChoreographyTemplate {
            actions: 2,
            opening: &[],
            per_action: &[SegmentSpec::set(1, 4)],
            closing: &[SegmentSpec::new(BlockKind::Outro, 2)],
        };
        let blocks = SHORT.generate(&selection(&["a", "b"])).unwrap();
        assert_eq!(blocks.len(), SHORT.block_count());
        assert_eq!(total_duration_seconds(&blocks), SHORT.total_seconds());
        assert_eq!(SHORT.total_seconds(), 10);
    }

    #[test]
    fn generated_blocks_pass_the_template_check() {
        assert!(check(&generate(&five()).unwrap()).is_ok());
        let repeated = selection(&["squat", "squat", "squat", "squat", "squat"]);
        assert!(check(&generate(&repeated).unwrap()).is_ok());
    }

    #[test]
    fn template_check_rejects_broken_sequences() {
        let blocks = generate(&five()).unwrap();
        let mismatch = |blocks: &[Block]| match check(blocks) {
            Err(ChoreoError::StructuralMismatch(reason)) => reason,
            other => panic!("expected StructuralMismatch, got {other:?}"),
        };

        let mut truncated: Vec<Block> = blocks[..3].to_vec();
        truncated.reverse();
        assert_eq!(mismatch(&truncated), "expected 17 blocks, found 3");

        let mut reversed = blocks.clone();
        reversed.reverse();
        assert_eq!(mismatch(&reversed), "block 0 is outro, expected intro");

        let mut swapped_sets = blocks.clone();
        swapped_sets.swap(2, 3);
        assert_eq!(mismatch(&swapped_sets), "block 2 is set 2, expected set 1");

        let mut mixed = blocks.clone();
        mixed[3].action = Some(ActionId::from("lunge"));
        assert_eq!(mismatch(&mixed), "block 3 belongs to `lunge`, expected `squat`");

        let mut stretched = blocks.clone();
        stretched[16].duration_seconds = 30;
        assert_eq!(mismatch(&stretched), "block 16 lasts 30s, expected 5s");

        let mut orphaned = blocks;
        orphaned[4].action = None;
        assert_eq!(mismatch(&orphaned), "block 4 has no action");
    }

    #[test]
    fn schedule_places_blocks_back_to_back() {
        let blocks = generate(&five()).unwrap();
        let placed = schedule(&blocks);

        assert_eq!(placed[0].start_seconds, 0);
        for pair in placed.windows(2) {
            assert_eq!(pair[0].end_seconds(), pair[1].start_seconds);
        }
        assert_eq!(placed.last().unwrap().end_seconds(), 125);
    }

    #[test]
    fn block_at_finds_the_active_block() {
        let placed = schedule(&generate(&five()).unwrap());

        assert_eq!(block_at(&placed, 0).unwrap().block.kind, BlockKind::Intro);
        assert_eq!(block_at(&placed, 4).unwrap().block.kind, BlockKind::Intro);
        assert_eq!(block_at(&placed, 5).unwrap().block.kind, BlockKind::Explain);
        let second_set = block_at(&placed, 18).unwrap();
        assert_eq!(second_set.block.set_index, Some(2));
        assert_eq!(block_at(&placed, 124).unwrap().block.kind, BlockKind::Outro);
        assert!(block_at(&placed, 125).is_none());
    }
}
