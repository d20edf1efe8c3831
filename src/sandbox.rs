//! SandboxWorld – an in-process world implementing every collaborator
//! contract, used by `janet-lens-server` and by the integration tests.
//!
//! ```text
//! SandboxWorld
//!   ├── HeightmapTerrain   (terrain.rs)    ← columns + loaded chunks
//!   ├── StructureRegistry  (structure.rs)  ← multi-cell blocks (fillers)
//!   ├── placed blocks, block catalog, content packs
//!   └── entities (position, look, equipment, validity)
//! ```

use crate::error::{LensError, Result};
use crate::protocol::RegionLabel;
use crate::structure::{StructureInstance, StructureRegistry};
use crate::terrain::HeightmapTerrain;
use crate::types::{BlockId, BlockOffset, BlockPos, EntityId, Vec3};
use crate::world::{
    BlockInfo, ContentSource, ContentSources, EntityDirectory, RegionMetadata, WorldQuery,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Distance between ray samples, in blocks.
const RAY_STEP: f32 = 0.05;
const EYE_HEIGHT: f32 = 1.6;

pub const GRASS: &str = "core:grass";
pub const DIRT: &str = "core:dirt";
pub const STONE: &str = "core:stone";
pub const SAND: &str = "core:sand";

// ---------------------------------------------------------------------------
// Catalog & entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct BlockDef {
    pub display_name: Option<String>,
    pub item_id: Option<String>,
}

impl BlockDef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            display_name: Some(name.into()),
            item_id: None,
        }
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item_id = Some(item.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct SandboxEntity {
    pub position: Vec3,
    pub look: Vec3,
    pub wearing: bool,
    pub valid: bool,
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

pub struct SandboxWorld {
    pub terrain: HeightmapTerrain,
    structures: RwLock<StructureRegistry>,
    placed: RwLock<HashMap<BlockPos, BlockId>>,
    catalog: RwLock<HashMap<BlockId, BlockDef>>,
    packs: RwLock<Vec<ContentSource>>,
    entities: RwLock<HashMap<EntityId, SandboxEntity>>,
    fail_enumeration: AtomicBool,
    region_metadata_enabled: bool,
    region_lookups: AtomicU64,
    enumerations: AtomicU64,
}

impl SandboxWorld {
    pub fn new(seed: u64, chunk_size: i32) -> Self {
        let world = Self {
            terrain: HeightmapTerrain::new(seed, chunk_size, 64),
            structures: RwLock::new(StructureRegistry::new()),
            placed: RwLock::new(HashMap::new()),
            catalog: RwLock::new(HashMap::new()),
            packs: RwLock::new(Vec::new()),
            entities: RwLock::new(HashMap::new()),
            fail_enumeration: AtomicBool::new(false),
            region_metadata_enabled: true,
            region_lookups: AtomicU64::new(0),
            enumerations: AtomicU64::new(0),
        };
        world.register_block(GRASS, BlockDef::named("Grass"));
        world.register_block(DIRT, BlockDef::named("Dirt"));
        world.register_block(STONE, BlockDef::named("Stone"));
        world.register_block(SAND, BlockDef::named("Sand"));
        world.add_pack(
            ContentSource::new("core", "base")
                .base()
                .with_blocks([GRASS, DIRT, STONE, SAND]),
        );
        world
    }

    /// Same world, but without the region metadata capability.
    pub fn without_region_metadata(mut self) -> Self {
        self.region_metadata_enabled = false;
        self
    }

    // -----------------------------------------------------------------------
    // Blocks & content
    // -----------------------------------------------------------------------

    pub fn register_block(&self, id: impl Into<BlockId>, def: BlockDef) {
        self.catalog.write().insert(id.into(), def);
    }

    pub fn add_pack(&self, pack: ContentSource) {
        self.packs.write().push(pack);
    }

    pub fn remove_pack(&self, group: &str, name: &str) -> bool {
        let mut packs = self.packs.write();
        let before = packs.len();
        packs.retain(|p| !(p.group == group && p.name == name));
        packs.len() != before
    }

    pub fn set_fail_enumeration(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::Relaxed);
    }

    /// How many times content sources were listed.
    pub fn enumerations(&self) -> u64 {
        self.enumerations.load(Ordering::Relaxed)
    }

    /// How many region metadata lookups were served.
    pub fn region_lookups(&self) -> u64 {
        self.region_lookups.load(Ordering::Relaxed)
    }

    pub fn place_block(&self, pos: BlockPos, id: impl Into<BlockId>) {
        self.placed.write().insert(pos, id.into());
    }

    /// Replace whatever occupies `pos` with the empty sentinel.
    pub fn clear_block(&self, pos: BlockPos) {
        self.place_block(pos, BlockId::EMPTY);
    }

    pub fn place_structure(&self, structure: StructureInstance) {
        self.structures.write().insert(structure);
    }

    /// Load the chunks around a column (Chebyshev radius in chunks).
    pub fn load_around(&self, x: i32, z: i32, radius: i32) {
        self.terrain.load_around(x, z, radius);
    }

    fn terrain_block(&self, pos: BlockPos) -> Option<BlockId> {
        let height = self.terrain.surface_height(pos.x, pos.z)?;
        let id = if pos.y > height {
            BlockId::EMPTY
        } else if pos.y == height && height < self.terrain.base_height - 3 {
            SAND
        } else if pos.y == height {
            GRASS
        } else if pos.y > height - 3 {
            DIRT
        } else {
            STONE
        };
        Some(BlockId::from(id))
    }

    fn describe(&self, id: BlockId, filler: BlockOffset) -> BlockInfo {
        let def = self.catalog.read().get(&id).cloned().unwrap_or_default();
        BlockInfo {
            id,
            filler,
            display_name: def.display_name,
            item_id: def.item_id,
        }
    }

    fn is_solid(&self, pos: BlockPos) -> Result<bool> {
        Ok(self
            .block_at(pos)?
            .is_some_and(|info| !info.id.is_empty_sentinel()))
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    pub fn spawn(&self, id: EntityId, position: Vec3, look: Vec3) {
        self.entities.write().insert(
            id,
            SandboxEntity {
                position,
                look,
                wearing: false,
                valid: true,
            },
        );
    }

    pub fn despawn(&self, id: EntityId) -> bool {
        self.entities.write().remove(&id).is_some()
    }

    pub fn set_position(&self, id: EntityId, position: Vec3) {
        if let Some(e) = self.entities.write().get_mut(&id) {
            e.position = position;
        }
    }

    pub fn set_look(&self, id: EntityId, look: Vec3) {
        if let Some(e) = self.entities.write().get_mut(&id) {
            e.look = look;
        }
    }

    pub fn set_wearing(&self, id: EntityId, wearing: bool) {
        if let Some(e) = self.entities.write().get_mut(&id) {
            e.wearing = wearing;
        }
    }

    /// Keep the entity stored but mark its reference invalid (disconnect).
    pub fn invalidate(&self, id: EntityId) {
        if let Some(e) = self.entities.write().get_mut(&id) {
            e.valid = false;
        }
    }

    pub fn entity(&self, id: EntityId) -> Option<SandboxEntity> {
        self.entities.read().get(&id).cloned()
    }

    fn live_entity(&self, id: EntityId) -> Result<SandboxEntity> {
        self.entity(id)
            .filter(|e| e.valid)
            .ok_or_else(|| LensError::EntityGone(id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Collaborator impls
// ---------------------------------------------------------------------------

impl WorldQuery for SandboxWorld {
    fn cast_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Result<Option<BlockPos>> {
        let Some(dir) = direction.normalized() else {
            return Ok(None);
        };

        let mut last = None;
        let mut t = 0.0;
        while t <= max_distance {
            let cell = BlockPos::containing(origin.add_scaled(dir, t));
            t += RAY_STEP;
            if last == Some(cell) {
                continue;
            }
            last = Some(cell);

            if !self.is_region_loaded(cell) {
                return Ok(None);
            }
            if self.is_solid(cell)? {
                return Ok(Some(cell));
            }
        }
        Ok(None)
    }

    fn is_region_loaded(&self, pos: BlockPos) -> bool {
        self.terrain.is_loaded(pos.x, pos.z)
    }

    fn block_at(&self, pos: BlockPos) -> Result<Option<BlockInfo>> {
        if !self.is_region_loaded(pos) {
            return Ok(None);
        }

        if let Some((structure, offset)) = self
            .structures
            .read()
            .cell_at(pos)
            .map(|(s, off)| (s.block_id.clone(), off))
        {
            return Ok(Some(self.describe(structure, offset)));
        }

        if let Some(id) = self.placed.read().get(&pos).cloned() {
            return Ok(Some(self.describe(id, BlockOffset::ZERO)));
        }

        Ok(self
            .terrain_block(pos)
            .map(|id| self.describe(id, BlockOffset::ZERO)))
    }

    fn region_metadata(&self) -> Option<&dyn RegionMetadata> {
        if self.region_metadata_enabled {
            Some(self)
        } else {
            None
        }
    }
}

impl RegionMetadata for SandboxWorld {
    /// Zone by distance rings from the origin, biome by terrain height band.
    /// The sandbox generator has a single seed; asking for another fails.
    fn region_label_at(&self, seed: u64, x: i32, z: i32) -> Result<RegionLabel> {
        if seed != self.terrain.seed {
            return Err(LensError::RegionMetadata(format!(
                "no generator for seed {} (world seed is {})",
                seed, self.terrain.seed
            )));
        }
        self.region_lookups.fetch_add(1, Ordering::Relaxed);

        let distance = ((x as f64).powi(2) + (z as f64).powi(2)).sqrt();
        let zone = if distance < 256.0 {
            "Zone 1"
        } else if distance < 768.0 {
            "Zone 2"
        } else {
            "Zone 3"
        };

        let relief = self.terrain.sample_height(x, z) - self.terrain.base_height;
        let biome = if relief < -3 {
            "Shore"
        } else if relief > 3 {
            "Highlands"
        } else {
            "Plains"
        };
        Ok(RegionLabel::new(zone, biome))
    }
}

impl ContentSources for SandboxWorld {
    fn list_loaded(&self) -> Result<Vec<ContentSource>> {
        self.enumerations.fetch_add(1, Ordering::Relaxed);
        if self.fail_enumeration.load(Ordering::Relaxed) {
            return Err(LensError::ContentEnumeration(
                "sandbox content registry unavailable".into(),
            ));
        }
        Ok(self.packs.read().clone())
    }
}

impl EntityDirectory for SandboxWorld {
    fn trackable_subjects(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self
            .entities
            .read()
            .iter()
            .filter(|(_, e)| e.valid)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    fn is_valid(&self, entity: EntityId) -> bool {
        self.entities.read().get(&entity).is_some_and(|e| e.valid)
    }

    fn position(&self, entity: EntityId) -> Result<Vec3> {
        Ok(self.live_entity(entity)?.position)
    }

    fn aim(&self, entity: EntityId) -> Result<(Vec3, Vec3)> {
        let e = self.live_entity(entity)?;
        let eye = Vec3::new(e.position.x, e.position.y + EYE_HEIGHT, e.position.z);
        Ok((eye, e.look))
    }

    fn is_wearing_tracked_equipment(&self, entity: EntityId) -> bool {
        self.entities.read().get(&entity).is_some_and(|e| e.wearing)
    }
}
