//! Core types shared across all modules.

use crate::error::{LensError, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

/// World-space position or direction. `y` is up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a zero vector.
    pub fn normalized(&self) -> Option<Vec3> {
        let len = self.length();
        if len <= f32::EPSILON || !len.is_finite() {
            return None;
        }
        Some(Self::new(self.x / len, self.y / len, self.z / len))
    }

    pub fn add_scaled(&self, dir: Vec3, t: f32) -> Vec3 {
        Self::new(self.x + dir.x * t, self.y + dir.y * t, self.z + dir.z * t)
    }

    /// True when any axis moved by at least `epsilon` (and by more than zero).
    pub fn moved_beyond(&self, other: &Vec3, epsilon: f32) -> bool {
        let moved = |d: f32| d != 0.0 && d.abs() >= epsilon;
        moved(self.x - other.x) || moved(self.y - other.y) || moved(self.z - other.z)
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Block grid
// ---------------------------------------------------------------------------

/// Integer cell coordinate of a single block.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Cell containing a world-space point.
    pub fn containing(p: Vec3) -> Self {
        Self::new(p.x.floor() as i32, p.y.floor() as i32, p.z.floor() as i32)
    }

    /// Walk a filler offset back to the cell that owns it.
    pub fn minus(self, offset: BlockOffset) -> Self {
        Self::new(self.x - offset.dx, self.y - offset.dy, self.z - offset.dz)
    }

    pub fn plus(self, offset: BlockOffset) -> Self {
        Self::new(self.x + offset.dx, self.y + offset.dy, self.z + offset.dz)
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{},{}]", self.x, self.y, self.z)
    }
}

/// Offset a filler cell encodes back to its base cell.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockOffset {
    pub dx: i32,
    pub dy: i32,
    pub dz: i32,
}

impl BlockOffset {
    pub const ZERO: BlockOffset = BlockOffset {
        dx: 0,
        dy: 0,
        dz: 0,
    };

    pub fn new(dx: i32, dy: i32, dz: i32) -> Self {
        Self { dx, dy, dz }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// Coarse horizontal bucket (chunk column) used to throttle region lookups.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RegionKey {
    pub x: i32,
    pub z: i32,
}

impl RegionKey {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn of_block(pos: BlockPos, chunk_size: i32) -> Self {
        Self::new(pos.x.div_euclid(chunk_size), pos.z.div_euclid(chunk_size))
    }

    pub fn of_position(p: Vec3, chunk_size: i32) -> Self {
        Self::of_block(BlockPos::containing(p), chunk_size)
    }
}

impl std::fmt::Display for RegionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.x, self.z)
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable id of an entity for the lifetime of a session.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Content-type key of a block, e.g. `core:stone` or a bare `Rock_Stone`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    /// Sentinel the world reports for an unoccupied cell.
    pub const EMPTY: &'static str = "empty";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty sentinel and for blank ids.
    pub fn is_empty_sentinel(&self) -> bool {
        let trimmed = self.0.trim();
        trimmed.is_empty() || trimmed.eq_ignore_ascii_case(Self::EMPTY)
    }

    /// Part before the first `:`, if the id is namespaced.
    pub fn namespace(&self) -> Option<&str> {
        self.0.split_once(':').map(|(ns, _)| ns)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BlockId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Stats & config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TelemetryStats {
    pub total_ticks: u64,
    pub active_entities: usize,
    pub snapshots: usize,
    pub payloads_pushed: u64,
    pub polls_skipped: u64,
    pub region_samples: u64,
    pub cache_entries: usize,
    pub cache_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// How far (in blocks) the aim ray may travel.
    pub max_target_distance: f32,
    /// Ticks between two polls of one entity's telemetry chain.
    pub poll_interval_ticks: u64,
    /// Upper bound on ticks between two region label lookups.
    pub region_refresh_ticks: u64,
    /// Minimum per-axis movement that counts as a position change.
    pub movement_epsilon: f32,
    /// Width of a region key bucket in blocks.
    pub chunk_size: i32,
    /// Seed handed to the region metadata lookup.
    pub world_seed: u64,
    /// Owner label reported for base content.
    pub base_content_label: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_target_distance: 10.0,
            poll_interval_ticks: 4,
            region_refresh_ticks: 100,
            movement_epsilon: 0.5,
            chunk_size: 32,
            world_seed: 42,
            base_content_label: "core:base".into(),
        }
    }
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ticks == 0 {
            return Err(LensError::Config("poll_interval_ticks must be > 0".into()));
        }
        if self.region_refresh_ticks == 0 {
            return Err(LensError::Config("region_refresh_ticks must be > 0".into()));
        }
        if self.chunk_size <= 0 {
            return Err(LensError::Config("chunk_size must be > 0".into()));
        }
        if self.max_target_distance.is_nan() || self.max_target_distance <= 0.0 {
            return Err(LensError::Config("max_target_distance must be > 0".into()));
        }
        if self.movement_epsilon.is_nan() || self.movement_epsilon < 0.0 {
            return Err(LensError::Config("movement_epsilon must be >= 0".into()));
        }
        if self.base_content_label.trim().is_empty() {
            return Err(LensError::Config("base_content_label must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_key_floors_negative_coordinates() {
        assert_eq!(RegionKey::of_block(BlockPos::new(-1, 0, 31), 32), RegionKey::new(-1, 0));
        assert_eq!(RegionKey::of_block(BlockPos::new(32, 5, -32), 32), RegionKey::new(1, -1));
        assert_eq!(RegionKey::of_position(Vec3::new(-0.5, 70.0, 0.5), 32), RegionKey::new(-1, 0));
    }

    #[test]
    fn block_id_namespace_and_sentinel() {
        assert_eq!(BlockId::from("pack:ore").namespace(), Some("pack"));
        assert_eq!(BlockId::from("Rock_Stone").namespace(), None);
        assert!(BlockId::from("  ").is_empty_sentinel());
        assert!(BlockId::from("Empty").is_empty_sentinel());
        assert!(!BlockId::from("core:dirt").is_empty_sentinel());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(TelemetryConfig::default().validate().is_ok());
        let bad = TelemetryConfig {
            poll_interval_ticks: 0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(LensError::Config(_))));
    }
}
