//! `lens.*` display protocol.
//!
//! This module owns **every value that leaves the telemetry core** towards a
//! display client, plus the read-only records the pipeline passes between
//! its stages.
//!
//! ## Design rules
//!
//! 1. Every struct must be `Serialize + Deserialize` with snake_case JSON.
//! 2. No collaborator types leak out (world handles, sinks, locks).
//! 3. A `DisplayPayload` is built fresh for every push and never mutated.
//! 4. Every outbound frame is wrapped in a `DisplayEvent` carrying
//!    `session` and `entity_id`.

use crate::types::{BlockId, EntityId};
use serde::{Deserialize, Serialize};

/// Placeholder shown for a field whose source value is missing.
pub const NOT_AVAILABLE: &str = "N/A";

// ---------------------------------------------------------------------------
// Common envelope
// ---------------------------------------------------------------------------

/// Every outbound display message is wrapped in this envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayEvent<T> {
    pub session: String,
    pub entity_id: EntityId,
    pub payload: T,
}

impl<T> DisplayEvent<T> {
    pub fn new(session: impl Into<String>, entity_id: EntityId, payload: T) -> Self {
        Self {
            session: session.into(),
            entity_id,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

/// Which content source owns a block id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub owning_group: String,
    pub owning_name: String,
    pub is_base_content: bool,
}

impl ProvenanceRecord {
    pub fn new(group: impl Into<String>, name: impl Into<String>, is_base_content: bool) -> Self {
        Self {
            owning_group: group.into(),
            owning_name: name.into(),
            is_base_content,
        }
    }

    /// The `unknown:unknown` record returned for ids no source claims.
    pub fn unknown() -> Self {
        Self::new("unknown", "unknown", false)
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }

    /// `"<group>:<name>"`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.owning_group, self.owning_name)
    }
}

// ---------------------------------------------------------------------------
// Targeting
// ---------------------------------------------------------------------------

/// What an entity is looking at right now. All `None` means nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub block_id: Option<BlockId>,
    pub display_name: Option<String>,
    pub provenance_label: Option<String>,
    pub icon_id: Option<String>,
}

impl TargetSnapshot {
    pub fn nothing() -> Self {
        Self::default()
    }

    pub fn is_nothing(&self) -> bool {
        self.block_id.is_none()
    }
}

// ---------------------------------------------------------------------------
// Region metadata
// ---------------------------------------------------------------------------

/// Result of the world-generation lookup for a column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionLabel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biome: Option<String>,
}

impl RegionLabel {
    pub fn new(zone: impl Into<String>, biome: impl Into<String>) -> Self {
        Self {
            zone: Some(zone.into()),
            biome: Some(biome.into()),
        }
    }

    /// Label used when the world exposes no region metadata at all.
    pub fn unavailable() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for RegionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} / {}",
            self.zone.as_deref().unwrap_or(NOT_AVAILABLE),
            self.biome.as_deref().unwrap_or(NOT_AVAILABLE)
        )
    }
}

// ---------------------------------------------------------------------------
// Display  (subjects: lens.display.*)
// ---------------------------------------------------------------------------

/// Handle of the overlay surface attached to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySurface {
    pub surface_id: u64,
    pub title: String,
}

/// One frame of overlay content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayPayload {
    pub block_name: String,
    pub owner_label: String,
    pub coords: String,
    pub biome: String,
    pub zone: String,
    pub icon_id: String,
}

/// Surface attach/detach notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceChanged {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<DisplaySurface>,
}

// ---------------------------------------------------------------------------
// Subject helpers
// ---------------------------------------------------------------------------

pub mod subjects {
    pub const DISPLAY_SURFACE: &str = "lens.display.surface";
    pub const DISPLAY_PAYLOAD: &str = "lens.display.payload";
}
