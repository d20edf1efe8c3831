//! Target resolver: what block is each entity looking at this tick.
//!
//! One pass per tick over every trackable entity. The result for each
//! entity overwrites its previous [`TargetSnapshot`]; readers only ever see
//! the latest value.

use crate::error::Result;
use crate::protocol::TargetSnapshot;
use crate::provenance::ProvenanceCache;
use crate::types::{BlockOffset, BlockPos, EntityId};
use crate::world::{BlockInfo, ContentSources, EntityDirectory, WorldQuery};
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Cell that actually owns a hit: the hit cell minus its filler offset.
pub fn resolve_base(hit: BlockPos, filler: BlockOffset) -> BlockPos {
    hit.minus(filler)
}

/// Counters from one [`TargetResolver::resolve_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvePass {
    pub targeted: usize,
    pub nothing: usize,
    pub faults: usize,
}

pub struct TargetResolver {
    provenance: Arc<ProvenanceCache>,
    max_distance: f32,
    snapshots: RwLock<HashMap<EntityId, TargetSnapshot>>,
}

impl TargetResolver {
    pub fn new(provenance: Arc<ProvenanceCache>, max_distance: f32) -> Self {
        Self {
            provenance,
            max_distance,
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    pub fn provenance(&self) -> &Arc<ProvenanceCache> {
        &self.provenance
    }

    // -----------------------------------------------------------------------
    // Per-tick pass
    // -----------------------------------------------------------------------

    /// Resolve and publish a snapshot for every trackable entity.
    ///
    /// A fault for one entity publishes `nothing` for it and moves on.
    /// Snapshots of entities no longer trackable are dropped.
    pub fn resolve_all(
        &self,
        entities: &dyn EntityDirectory,
        world: &dyn WorldQuery,
        content: &dyn ContentSources,
    ) -> ResolvePass {
        self.provenance.ensure_ready(content);

        let mut pass = ResolvePass::default();
        let mut seen = HashSet::new();
        for entity in entities.trackable_subjects() {
            seen.insert(entity);
            let snapshot = match self.resolve_entity(entity, entities, world) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Target resolution failed for {}: {}", entity, e);
                    pass.faults += 1;
                    TargetSnapshot::nothing()
                }
            };
            if snapshot.is_nothing() {
                pass.nothing += 1;
            } else {
                pass.targeted += 1;
            }
            self.publish(entity, snapshot);
        }

        let mut snapshots = self.snapshots.write();
        let before = snapshots.len();
        snapshots.retain(|id, _| seen.contains(id));
        if snapshots.len() < before {
            debug!("Dropped {} stale target snapshots", before - snapshots.len());
        }
        pass
    }

    /// Ray-cast from the entity's eyes and describe the block it hits.
    pub fn resolve_entity(
        &self,
        entity: EntityId,
        entities: &dyn EntityDirectory,
        world: &dyn WorldQuery,
    ) -> Result<TargetSnapshot> {
        let (origin, direction) = entities.aim(entity)?;
        match world.cast_ray(origin, direction, self.max_distance)? {
            Some(hit) => self.snapshot_at(hit, world),
            None => Ok(TargetSnapshot::nothing()),
        }
    }

    /// Describe the block at `hit`, following a filler offset to its base.
    pub fn snapshot_at(&self, hit: BlockPos, world: &dyn WorldQuery) -> Result<TargetSnapshot> {
        let Some(hit_info) = world.block_at(hit)? else {
            return Ok(TargetSnapshot::nothing());
        };

        let base = resolve_base(hit, hit_info.filler);
        if !world.is_region_loaded(base) {
            debug!("Base cell {} of hit {} is not loaded", base, hit);
            return Ok(TargetSnapshot::nothing());
        }

        let info = if hit_info.filler.is_zero() {
            hit_info
        } else {
            match world.block_at(base)? {
                Some(info) => info,
                None => return Ok(TargetSnapshot::nothing()),
            }
        };

        Ok(self.describe(info))
    }

    fn describe(&self, info: BlockInfo) -> TargetSnapshot {
        if info.id.is_empty_sentinel() {
            return TargetSnapshot::nothing();
        }

        let display_name = info
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| info.id.to_string());
        let provenance_label = self.provenance.owner_label(&info.id);
        let icon_id = info
            .item_id
            .filter(|item| !item.trim().is_empty())
            .unwrap_or_else(|| info.id.to_string());

        TargetSnapshot {
            block_id: Some(info.id),
            display_name: Some(display_name),
            provenance_label: Some(provenance_label),
            icon_id: Some(icon_id),
        }
    }

    // -----------------------------------------------------------------------
    // Snapshot table
    // -----------------------------------------------------------------------

    pub fn publish(&self, entity: EntityId, snapshot: TargetSnapshot) {
        self.snapshots.write().insert(entity, snapshot);
    }

    /// Latest snapshot, or `nothing` if none was published.
    pub fn latest(&self, entity: EntityId) -> TargetSnapshot {
        self.snapshots
            .read()
            .get(&entity)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_snapshot(&self, entity: EntityId) -> bool {
        self.snapshots.read().contains_key(&entity)
    }

    pub fn forget(&self, entity: EntityId) {
        self.snapshots.write().remove(&entity);
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
