//! Collaborator contracts the telemetry core calls into.
//!
//! The host server implements these over its own entity storage, chunk
//! loader, content registry and network layer. [`crate::sandbox`] provides
//! an in-process implementation of all of them.

use crate::error::Result;
use crate::protocol::{DisplayPayload, DisplaySurface, RegionLabel};
use crate::types::{BlockId, BlockOffset, BlockPos, EntityId, Vec3};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// What the world knows about the block occupying one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub id: BlockId,
    /// Non-zero when this cell is a filler of a larger block; points back
    /// from the base cell to this cell.
    pub filler: BlockOffset,
    pub display_name: Option<String>,
    pub item_id: Option<String>,
}

impl BlockInfo {
    pub fn new(id: impl Into<BlockId>) -> Self {
        Self {
            id: id.into(),
            filler: BlockOffset::ZERO,
            display_name: None,
            item_id: None,
        }
    }
}

/// Spatial queries against loaded terrain.
pub trait WorldQuery: Send + Sync {
    /// First solid cell hit by the ray within `max_distance`, or `None` when
    /// nothing is hit or the hit cell's region is not loaded.
    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32)
        -> Result<Option<BlockPos>>;

    fn is_region_loaded(&self, pos: BlockPos) -> bool;

    fn block_at(&self, pos: BlockPos) -> Result<Option<BlockInfo>>;

    /// Region metadata capability. Worlds without world-generation
    /// metadata keep the default.
    fn region_metadata(&self) -> Option<&dyn RegionMetadata> {
        None
    }
}

/// Expensive world-generation lookup; callers must throttle it.
pub trait RegionMetadata: Send + Sync {
    fn region_label_at(&self, seed: u64, x: i32, z: i32) -> Result<RegionLabel>;
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// A loaded content pack and the block ids it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSource {
    pub group: String,
    pub name: String,
    /// Set for the base game content.
    pub is_base: bool,
    pub owned_block_ids: BTreeSet<BlockId>,
}

impl ContentSource {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            is_base: false,
            owned_block_ids: BTreeSet::new(),
        }
    }

    pub fn base(mut self) -> Self {
        self.is_base = true;
        self
    }

    pub fn with_blocks<I, B>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<BlockId>,
    {
        self.owned_block_ids.extend(ids.into_iter().map(Into::into));
        self
    }
}

pub trait ContentSources: Send + Sync {
    fn list_loaded(&self) -> Result<Vec<ContentSource>>;
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Entity storage as seen by the telemetry core.
pub trait EntityDirectory: Send + Sync {
    /// Entities that are trackable subjects and have a world location.
    fn trackable_subjects(&self) -> Vec<EntityId>;

    fn is_valid(&self, entity: EntityId) -> bool;

    fn position(&self, entity: EntityId) -> Result<Vec3>;

    /// Eye position and look direction.
    fn aim(&self, entity: EntityId) -> Result<(Vec3, Vec3)>;

    fn is_wearing_tracked_equipment(&self, entity: EntityId) -> bool;
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

pub trait DisplaySink: Send + Sync {
    /// Attach (`Some`) or remove (`None`) the entity's overlay surface.
    fn set_display_surface(&self, entity: EntityId, surface: Option<DisplaySurface>)
        -> Result<()>;

    fn push_payload(&self, entity: EntityId, payload: DisplayPayload) -> Result<()>;
}
