//! Versioned program records and the assembler that persists them.

pub mod store;

use serde::{Deserialize, Serialize};

use crate::{
    grid::{self, GridRows},
    timeline::{self, ActionId, Block},
    timing::{self, AudienceTier, CueProfile, MemoryProfile},
    ChoreoError, Result,
};

pub use store::{InMemoryStore, JsonFileStore, RecordStore, StoredRecord, UpsertOptions, VersionCheck};

/// Collection holding program records.
pub const PROGRAMS: &str = "programs";

/// Challenge levels at or above this use the diagonal grid.
pub const DIAGONAL_LEVEL: u8 = 2;

/// One typed phase of a program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Phase {
    Think {
        tier: AudienceTier,
        profile: CueProfile,
    },
    Play {
        blocks: Vec<Block>,
    },
    Flow {
        tier: AudienceTier,
        profile: MemoryProfile,
    },
    Challenge {
        grid: GridRows,
        bpm: u32,
        level: u8,
    },
}

impl Phase {
    pub fn think(tier: AudienceTier) -> Self {
        Phase::Think {
            tier,
            profile: timing::two_symbol_profile(tier),
        }
    }

    pub fn flow(tier: AudienceTier) -> Self {
        Phase::Flow {
            tier,
            profile: timing::memory_profile(tier),
        }
    }

    pub fn play(selection: &[ActionId]) -> Result<Self> {
        Ok(Phase::Play {
            blocks: timeline::generate(selection)?,
        })
    }

    pub fn challenge(level: u8, bpm: u32) -> Self {
        let grid = if level >= DIAGONAL_LEVEL {
            grid::diagonal_grid()
        } else {
            grid::canonical_grid()
        };
        Phase::Challenge { grid, bpm, level }
    }

    /// Timed length contributed to the program. Only play phases carry a
    /// block timeline; the others are paced by their cue profiles.
    pub fn duration_seconds(&self) -> u32 {
        match self {
            Phase::Play { blocks } => timeline::total_duration_seconds(blocks),
            Phase::Think { .. } | Phase::Flow { .. } | Phase::Challenge { .. } => 0,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Phase::Think { tier, profile } if *profile != timing::two_symbol_profile(*tier) => Err(
                ChoreoError::msg(format!("think phase timing does not match tier {tier}")),
            ),
            Phase::Flow { tier, profile } if *profile != timing::memory_profile(*tier) => Err(
                ChoreoError::msg(format!("flow phase timing does not match tier {tier}")),
            ),
            Phase::Play { blocks } => timeline::check(blocks),
            Phase::Challenge { grid, bpm, level } => {
                if *bpm == 0 {
                    return Err(ChoreoError::msg("challenge bpm must be positive"));
                }
                if *level >= DIAGONAL_LEVEL {
                    grid::validate_diagonal_grid(grid)
                } else {
                    grid::validate_grid(grid)
                }
            }
            _ => Ok(()),
        }
    }
}

/// A persisted program: metadata plus an ordered list of phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramComposite {
    pub id: String,
    pub group_key: String,
    pub title: String,
    pub description: String,
    pub total_duration_seconds: u32,
    pub phases: Vec<Phase>,
}

impl ProgramComposite {
    pub fn new(
        id: impl Into<String>,
        group_key: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            group_key: group_key.into(),
            title: title.into(),
            description: description.into(),
            total_duration_seconds: 0,
            phases: Vec::new(),
        }
    }

    /// Single play-phase warmup built from the author's picks.
    pub fn warmup(
        id: impl Into<String>,
        group_key: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        selection: &[ActionId],
    ) -> Result<Self> {
        let phase = Phase::play(selection)?;
        Ok(Self::new(id, group_key, title, description).with_phase(phase))
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.push_phase(phase);
        self
    }

    pub fn push_phase(&mut self, phase: Phase) {
        self.phases.push(phase);
        self.total_duration_seconds = self.computed_duration_seconds();
    }

    /// Replaces every phase and recomputes the declared total.
    pub fn set_phases(&mut self, phases: Vec<Phase>) {
        self.phases = phases;
        self.total_duration_seconds = self.computed_duration_seconds();
    }

    pub fn computed_duration_seconds(&self) -> u32 {
        self.phases.iter().map(Phase::duration_seconds).sum()
    }

    pub fn play_blocks(&self) -> impl Iterator<Item = &Block> {
        self.phases
            .iter()
            .filter_map(|phase| match phase {
                Phase::Play { blocks } => Some(blocks),
                _ => None,
            })
            .flatten()
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ChoreoError::msg("program id must not be empty"));
        }
        let computed = self.computed_duration_seconds();
        if computed != self.total_duration_seconds {
            return Err(ChoreoError::msg(format!(
                "program `{}` declares {}s but its blocks add up to {computed}s",
                self.id, self.total_duration_seconds
            )));
        }
        self.phases.iter().try_for_each(Phase::validate)
    }
}

/// Packages program records and writes them through a [`RecordStore`].
#[derive(Debug)]
pub struct Assembler<S> {
    store: S,
}

impl<S: RecordStore> Assembler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Last-write-wins upsert keyed by the program id. Re-submitting an
    /// identical record leaves the stored version untouched.
    pub async fn upsert(&self, record: &ProgramComposite) -> Result<String> {
        self.commit(record, VersionCheck::Any).await?;
        Ok(record.id.clone())
    }

    /// Upsert guarded by a version token. Returns the stored version.
    pub async fn commit(&self, record: &ProgramComposite, check: VersionCheck) -> Result<u64> {
        record.validate()?;
        let value = serde_json::to_value(record)?;

        if let Some(current) = self.store.get(PROGRAMS, &record.id).await? {
            let unchanged = current.value == value;
            let admitted = match check {
                VersionCheck::Any => true,
                VersionCheck::Exactly(version) => version == current.version,
                VersionCheck::Absent => false,
            };
            if unchanged && admitted {
                tracing::debug!(id = %record.id, version = current.version, "program unchanged");
                return Ok(current.version);
            }
        }

        let options = UpsertOptions::keyed(record.id.clone()).with_check(check);
        match self.store.upsert(PROGRAMS, value, &options).await {
            Ok(version) => {
                tracing::info!(id = %record.id, version, "program stored");
                Ok(version)
            }
            Err(err) => {
                tracing::warn!(id = %record.id, error = %err, "program rejected");
                Err(err)
            }
        }
    }

    pub async fn load(&self, id: &str) -> Result<Option<ProgramComposite>> {
        Ok(self.load_versioned(id).await?.map(|(record, _)| record))
    }

    pub async fn load_versioned(&self, id: &str) -> Result<Option<(ProgramComposite, u64)>> {
        let Some(stored) = self.store.get(PROGRAMS, id).await? else {
            return Ok(None);
        };
        let record = serde_json::from_value(stored.value)?;
        Ok(Some((record, stored.version)))
    }

    /// Removes a program when its schedule assignment is revoked.
    pub async fn revoke(&self, id: &str) -> Result<bool> {
        let removed = self.store.delete(PROGRAMS, id).await?;
        tracing::info!(id, removed, "program revoked");
        Ok(removed)
    }

    /// Opens a draft of an existing program, capturing its current version.
    pub async fn open_draft(&self, id: &str) -> Result<Option<Draft>> {
        Ok(self
            .load_versioned(id)
            .await?
            .map(|(record, version)| Draft::capture(record, Some(version))))
    }
}

/// Optimistic-concurrency edit of a single program.
///
/// Protocol: [`Draft::capture`] a snapshot and its version token, mutate
/// through [`Draft::edit`], then [`Draft::commit`]. A rejected commit puts the
/// snapshot back so the draft never exposes a half-applied edit; on a conflict
/// the caller reloads and edits again.
#[derive(Debug, Clone)]
pub struct Draft {
    current: ProgramComposite,
    snapshot: ProgramComposite,
    version: Option<u64>,
}

impl Draft {
    /// `version` is `None` for a program that has never been stored.
    pub fn capture(record: ProgramComposite, version: Option<u64>) -> Self {
        Self {
            snapshot: record.clone(),
            current: record,
            version,
        }
    }

    pub fn record(&self) -> &ProgramComposite {
        &self.current
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn is_dirty(&self) -> bool {
        self.current != self.snapshot
    }

    pub fn edit<F>(&mut self, f: F)
    where
        F: FnOnce(&mut ProgramComposite),
    {
        f(&mut self.current);
    }

    /// Drops local edits.
    pub fn discard(&mut self) {
        self.current = self.snapshot.clone();
    }

    pub async fn commit<S: RecordStore>(&mut self, assembler: &Assembler<S>) -> Result<u64> {
        let check = VersionCheck::from_token(self.version);
        match assembler.commit(&self.current, check).await {
            Ok(version) => {
                self.snapshot = self.current.clone();
                self.version = Some(version);
                Ok(version)
            }
            Err(err) => {
                self.discard();
                Err(err)
            }
        }
    }

    /// Replaces the draft with the latest stored state.
    pub async fn reload<S: RecordStore>(&mut self, assembler: &Assembler<S>) -> Result<()> {
        match assembler.load_versioned(&self.snapshot.id).await? {
            Some((record, version)) => *self = Draft::capture(record, Some(version)),
            None => {
                self.discard();
                self.version = None;
            }
        }
        Ok(())
    }
}
