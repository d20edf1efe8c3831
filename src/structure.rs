//! Structure subsystem: multi-cell blocks and their registry.
//!
//! A structure occupies a box of cells. Its origin cell is the base block;
//! every other cell is a filler that reports its offset from the origin.

use crate::types::{BlockId, BlockOffset, BlockPos};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Structure instance
// ---------------------------------------------------------------------------

/// A single multi-cell block placed in the world (door, bed, statue …).
#[derive(Debug, Clone)]
pub struct StructureInstance {
    /// Globally unique identifier for the placement.
    pub id: String,
    /// Block type every cell of the structure resolves to.
    pub block_id: BlockId,
    /// Base cell.
    pub origin: BlockPos,
    /// Extent in cells along each axis (at least 1).
    pub extent: BlockOffset,
}

impl StructureInstance {
    pub fn new(
        id: impl Into<String>,
        block_id: impl Into<BlockId>,
        origin: BlockPos,
        extent: BlockOffset,
    ) -> Self {
        Self {
            id: id.into(),
            block_id: block_id.into(),
            origin,
            extent: BlockOffset::new(extent.dx.max(1), extent.dy.max(1), extent.dz.max(1)),
        }
    }

    /// Offset of `pos` from the origin, if `pos` lies inside the structure.
    pub fn offset_of(&self, pos: BlockPos) -> Option<BlockOffset> {
        let off = BlockOffset::new(
            pos.x - self.origin.x,
            pos.y - self.origin.y,
            pos.z - self.origin.z,
        );
        let inside = (0..self.extent.dx).contains(&off.dx)
            && (0..self.extent.dy).contains(&off.dy)
            && (0..self.extent.dz).contains(&off.dz);
        inside.then_some(off)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds all structures placed in the world.
///
/// Lookups scan every instance; the sandbox only places a handful.
pub struct StructureRegistry {
    instances: HashMap<String, StructureInstance>,
}

impl StructureRegistry {
    pub fn new() -> Self {
        Self {
            instances: HashMap::new(),
        }
    }

    pub fn insert(&mut self, structure: StructureInstance) {
        self.instances.insert(structure.id.clone(), structure);
    }

    pub fn remove(&mut self, id: &str) -> Option<StructureInstance> {
        self.instances.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&StructureInstance> {
        self.instances.get(id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// The structure covering `pos` and the cell's offset from its origin.
    pub fn cell_at(&self, pos: BlockPos) -> Option<(&StructureInstance, BlockOffset)> {
        self.instances
            .values()
            .find_map(|s| s.offset_of(pos).map(|off| (s, off)))
    }
}

impl Default for StructureRegistry {
    fn default() -> Self {
        Self::new()
    }
}
