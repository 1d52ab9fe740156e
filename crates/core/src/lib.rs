//! Core library for the warmup choreography engine.
//!
//! Turns a handful of author picks (actions, audience tier, grid layout) into a
//! timed block sequence, checks that sequence against the fixed choreography
//! rules, persists it as a versioned program record and supervises playback
//! of that program until it reaches a terminal state. Each module owns one
//! subsystem:
//!
//! - [`grid`]: the canonical 2×2 color grid and its diagonal variant.
//! - [`timing`]: cue/blank durations per audience tier.
//! - [`timeline`]: block sequence generation (plus the tick-based encoding).
//! - [`composite`]: program records, record stores and optimistic drafts.
//! - [`playback`]: the completion gate around an embedded playback surface.

pub mod composite;
pub mod config;
pub mod error;
pub mod grid;
pub mod playback;
pub mod timeline;
pub mod timing;

pub use composite::{
    Assembler, Draft, InMemoryStore, JsonFileStore, Phase, ProgramComposite, RecordStore,
    StoredRecord, UpsertOptions, VersionCheck, PROGRAMS,
};
pub use config::{EngineConfig, PlaybackConfig, StoreConfig};
pub use error::{ChoreoError, Result};
pub use grid::{GridColor, GridPosition, GridRows};
pub use playback::{
    EndReason, PlaybackSession, PlaybackSynchronizer, SessionSnapshot, SessionState,
    SurfaceMessage,
};
pub use timeline::{
    ActionId, Block, BlockKind, ChoreographyTemplate, ScheduledBlock, SegmentSpec, TickProgram,
    SELECTION_SIZE, WARMUP_TEMPLATE,
};
pub use timing::{AudienceTier, CueProfile, MemoryProfile, TimingProfiles};
