//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use janet_lens::error::{LensError, Result};
use janet_lens::protocol::{DisplayPayload, DisplaySurface, RegionLabel};
use janet_lens::sandbox::SandboxWorld;
use janet_lens::service::{Collaborators, TelemetryService};
use janet_lens::types::{BlockId, BlockPos, EntityId, TelemetryConfig, Vec3};
use janet_lens::world::{BlockInfo, DisplaySink, RegionMetadata, WorldQuery};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Display sink that records everything
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    surfaces: Mutex<HashMap<EntityId, DisplaySurface>>,
    payloads: Mutex<Vec<(EntityId, DisplayPayload)>>,
    fail_pushes: AtomicBool,
}

impl RecordingSink {
    pub fn has_surface(&self, entity: EntityId) -> bool {
        self.surfaces.lock().contains_key(&entity)
    }

    pub fn surface(&self, entity: EntityId) -> Option<DisplaySurface> {
        self.surfaces.lock().get(&entity).cloned()
    }

    pub fn pushes_for(&self, entity: EntityId) -> Vec<DisplayPayload> {
        self.payloads
            .lock()
            .iter()
            .filter(|(e, _)| *e == entity)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn push_count(&self, entity: EntityId) -> usize {
        self.pushes_for(entity).len()
    }

    pub fn set_fail_pushes(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::Relaxed);
    }
}

impl DisplaySink for RecordingSink {
    fn set_display_surface(&self, entity: EntityId, surface: Option<DisplaySurface>) -> Result<()> {
        let mut surfaces = self.surfaces.lock();
        match surface {
            Some(s) => surfaces.insert(entity, s),
            None => surfaces.remove(&entity),
        };
        Ok(())
    }

    fn push_payload(&self, entity: EntityId, payload: DisplayPayload) -> Result<()> {
        if self.fail_pushes.load(Ordering::Relaxed) {
            return Err(LensError::Display {
                entity: entity.to_string(),
                reason: "client went away".into(),
            });
        }
        self.payloads.lock().push((entity, payload));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// World whose region label is the chunk column ("R<cx>" / "C<cz>")
// ---------------------------------------------------------------------------

pub struct ChunkLabelledWorld {
    pub inner: Arc<SandboxWorld>,
    pub chunk_size: i32,
    pub lookups: AtomicU64,
}

impl ChunkLabelledWorld {
    pub fn new(inner: Arc<SandboxWorld>, chunk_size: i32) -> Self {
        Self {
            inner,
            chunk_size,
            lookups: AtomicU64::new(0),
        }
    }

    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl WorldQuery for ChunkLabelledWorld {
    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Result<Option<BlockPos>> {
        self.inner.cast_ray(origin, direction, max_distance)
    }

    fn is_region_loaded(&self, pos: BlockPos) -> bool {
        self.inner.is_region_loaded(pos)
    }

    fn block_at(&self, pos: BlockPos) -> Result<Option<BlockInfo>> {
        self.inner.block_at(pos)
    }

    fn region_metadata(&self) -> Option<&dyn RegionMetadata> {
        Some(self)
    }
}

impl RegionMetadata for ChunkLabelledWorld {
    fn region_label_at(&self, _seed: u64, x: i32, z: i32) -> Result<RegionLabel> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(RegionLabel::new(
            format!("R{}", x.div_euclid(self.chunk_size)),
            format!("C{}", z.div_euclid(self.chunk_size)),
        ))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub sandbox: Arc<SandboxWorld>,
    pub world: Arc<ChunkLabelledWorld>,
    pub sink: Arc<RecordingSink>,
    pub service: TelemetryService,
}

/// Sandbox with chunks loaded 3 chunks around the origin, chunk-labelled
/// regions and a recording sink.
pub fn harness(config: TelemetryConfig) -> Harness {
    let sandbox = Arc::new(SandboxWorld::new(config.world_seed, config.chunk_size));
    sandbox.load_around(0, 0, 3);
    let world = Arc::new(ChunkLabelledWorld::new(sandbox.clone(), config.chunk_size));
    let sink = Arc::new(RecordingSink::default());

    let host = Collaborators {
        world: world.clone(),
        content: sandbox.clone(),
        entities: sandbox.clone(),
        display: sink.clone(),
    };
    let service = TelemetryService::new(config, host).expect("valid config");
    Harness {
        sandbox,
        world,
        sink,
        service,
    }
}

/// Fast test cadence: poll every tick, refresh region every `k` ticks.
pub fn fast_config(k: u64) -> TelemetryConfig {
    TelemetryConfig {
        poll_interval_ticks: 1,
        region_refresh_ticks: k,
        ..Default::default()
    }
}

pub const STRAIGHT_DOWN: Vec3 = Vec3 {
    x: 0.0,
    y: -1.0,
    z: 0.0,
};

/// Place `block` on top of the column at `(x, z)` and return the position an
/// entity must stand at to look straight down onto it.
pub fn pedestal(world: &SandboxWorld, x: i32, z: i32, block: &str) -> (BlockPos, Vec3) {
    let ground = world.terrain.surface_height(x, z).expect("column loaded");
    let pos = BlockPos::new(x, ground + 1, z);
    world.place_block(pos, BlockId::from(block));
    let stand = Vec3::new(x as f32 + 0.5, (ground + 2) as f32, z as f32 + 0.5);
    (pos, stand)
}
