//! Telemetry state machine: per-entity `Idle ⇄ Active` tracking.
//!
//! An entity is `Active` exactly while it has an entry in the state table.
//! Each Active session is driven by a chain of [`PollTask`]s that the
//! service re-submits to the tick queue after every poll; a chain ends by
//! simply not being rescheduled.
//!
//! A poll re-reads position, refreshes the region label when the region key
//! changed or `region_refresh_ticks` have passed, and pushes a payload only
//! when the entity moved beyond `movement_epsilon` or the [`Fingerprint`]
//! of its target and region changed.

use crate::assembler::{PayloadAssembler, PayloadContext};
use crate::error::{LensError, Result};
use crate::protocol::{DisplaySurface, RegionLabel, TargetSnapshot};
use crate::resolver::TargetResolver;
use crate::scheduler::PollTask;
use crate::types::{BlockPos, EntityId, RegionKey, TelemetryConfig, Vec3};
use crate::world::{DisplaySink, EntityDirectory, WorldQuery};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Title of the overlay surface attached on activation.
pub const SURFACE_TITLE: &str = "Lens";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active,
}

/// Digest of the target and region fields that decide whether to push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    pub fn of(target: &TargetSnapshot, region: &RegionLabel) -> Self {
        let parts = [
            target.block_id.as_ref().map(|id| id.as_str()),
            target.provenance_label.as_deref(),
            target.icon_id.as_deref(),
            region.zone.as_deref(),
            region.biome.as_deref(),
        ];

        // Length-prefixed so adjacent fields cannot run into each other.
        let mut buf = Vec::with_capacity(128);
        for part in parts {
            match part {
                Some(s) => {
                    buf.push(1);
                    buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
                    buf.extend_from_slice(s.as_bytes());
                }
                None => buf.push(0),
            }
        }
        Self(md5::compute(&buf).0)
    }
}

#[derive(Debug, Clone)]
pub struct TrackingState {
    /// Session id; also used as the display surface id.
    pub epoch: u64,
    pub ticks_since_region_sample: u64,
    pub last_region_key: Option<RegionKey>,
    pub last_region_label: RegionLabel,
    pub last_position: Option<Vec3>,
    pub last_fingerprint: Option<Fingerprint>,
}

impl TrackingState {
    fn new(epoch: u64) -> Self {
        Self {
            epoch,
            ticks_since_region_sample: 0,
            last_region_key: None,
            last_region_label: RegionLabel::unavailable(),
            last_position: None,
            last_fingerprint: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EquipmentRemoved,
    EntityInvalid,
    EntityLeft,
    Fault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A payload was pushed; reschedule.
    Pushed,
    /// Nothing changed; reschedule without pushing.
    Unchanged,
    /// Go back to Idle; do not reschedule.
    Stop(StopReason),
    /// The task belongs to a session that already ended; drop it.
    Stale,
}

impl PollOutcome {
    pub fn reschedules(&self) -> bool {
        matches!(self, PollOutcome::Pushed | PollOutcome::Unchanged)
    }
}

/// Collaborators a poll reads from.
pub struct PollEnv<'a> {
    pub entities: &'a dyn EntityDirectory,
    pub world: &'a dyn WorldQuery,
    pub display: &'a dyn DisplaySink,
    pub resolver: &'a TargetResolver,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

pub struct TelemetryTracker {
    config: TelemetryConfig,
    assembler: PayloadAssembler,
    states: Mutex<HashMap<EntityId, TrackingState>>,
    next_epoch: AtomicU64,
    payloads_pushed: AtomicU64,
    polls_skipped: AtomicU64,
    region_samples: AtomicU64,
}

impl TelemetryTracker {
    pub fn new(config: TelemetryConfig, assembler: PayloadAssembler) -> Self {
        Self {
            config,
            assembler,
            states: Mutex::new(HashMap::new()),
            next_epoch: AtomicU64::new(1),
            payloads_pushed: AtomicU64::new(0),
            polls_skipped: AtomicU64::new(0),
            region_samples: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn phase(&self, entity: EntityId) -> Phase {
        if self.states.lock().contains_key(&entity) {
            Phase::Active
        } else {
            Phase::Idle
        }
    }

    pub fn state(&self, entity: EntityId) -> Option<TrackingState> {
        self.states.lock().get(&entity).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.states.lock().len()
    }

    pub fn active_entities(&self) -> Vec<EntityId> {
        self.states.lock().keys().copied().collect()
    }

    pub fn payloads_pushed(&self) -> u64 {
        self.payloads_pushed.load(Ordering::Relaxed)
    }

    pub fn polls_skipped(&self) -> u64 {
        self.polls_skipped.load(Ordering::Relaxed)
    }

    pub fn region_samples(&self) -> u64 {
        self.region_samples.load(Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// `Idle → Active`. Returns the first task of the new poll chain, or
    /// `None` if the entity was already Active.
    pub fn activate(&self, entity: EntityId, display: &dyn DisplaySink) -> Result<Option<PollTask>> {
        let epoch = {
            let mut states = self.states.lock();
            if states.contains_key(&entity) {
                return Ok(None);
            }
            let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
            states.insert(entity, TrackingState::new(epoch));
            epoch
        };

        let surface = DisplaySurface {
            surface_id: epoch,
            title: SURFACE_TITLE.to_string(),
        };
        if let Err(e) = display.set_display_surface(entity, Some(surface)) {
            self.remove_if_epoch(entity, epoch);
            return Err(e);
        }

        // A deactivate may have run while the surface was being attached.
        if !self.is_current(entity, epoch) {
            if self.phase(entity) == Phase::Idle {
                if let Err(e) = display.set_display_surface(entity, None) {
                    warn!("Failed to clear display surface of {}: {}", entity, e);
                }
            }
            debug!("{} deactivated during activation (epoch {})", entity, epoch);
            return Ok(None);
        }

        debug!("{} Idle -> Active (epoch {})", entity, epoch);
        Ok(Some(PollTask { entity, epoch }))
    }

    /// `Active → Idle`: drop the state, clear the surface and the entity's
    /// last target snapshot. Returns `false` if the entity was already Idle.
    pub fn deactivate(
        &self,
        entity: EntityId,
        reason: StopReason,
        display: &dyn DisplaySink,
        resolver: &TargetResolver,
    ) -> bool {
        let removed = self.states.lock().remove(&entity);
        if removed.is_none() {
            return false;
        }

        if let Err(e) = display.set_display_surface(entity, None) {
            warn!("Failed to clear display surface of {}: {}", entity, e);
        }
        resolver.forget(entity);
        debug!("{} Active -> Idle ({:?})", entity, reason);
        true
    }

    fn is_current(&self, entity: EntityId, epoch: u64) -> bool {
        self.states
            .lock()
            .get(&entity)
            .is_some_and(|s| s.epoch == epoch)
    }

    fn remove_if_epoch(&self, entity: EntityId, epoch: u64) {
        let mut states = self.states.lock();
        if states.get(&entity).is_some_and(|s| s.epoch == epoch) {
            states.remove(&entity);
        }
    }

    // -----------------------------------------------------------------------
    // Poll
    // -----------------------------------------------------------------------

    /// Run one link of an entity's poll chain.
    ///
    /// A fault is reported as `Stop(Fault)`; the caller performs the
    /// `Active → Idle` cleanup for every `Stop`.
    pub fn poll(&self, task: PollTask, env: &PollEnv<'_>) -> PollOutcome {
        let mut state = match self.states.lock().get(&task.entity) {
            Some(state) if state.epoch == task.epoch => state.clone(),
            _ => return PollOutcome::Stale,
        };

        let outcome = match self.poll_state(task, &mut state, env) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Telemetry poll failed for {}, stopping: {}", task.entity, e);
                return PollOutcome::Stop(StopReason::Fault);
            }
        };

        if outcome.reschedules() {
            let mut states = self.states.lock();
            match states.get_mut(&task.entity) {
                Some(current) if current.epoch == task.epoch => *current = state,
                _ => return PollOutcome::Stale,
            }
        }
        outcome
    }

    fn poll_state(
        &self,
        task: PollTask,
        state: &mut TrackingState,
        env: &PollEnv<'_>,
    ) -> Result<PollOutcome> {
        let entity = task.entity;
        if !env.entities.is_valid(entity) {
            return Ok(PollOutcome::Stop(StopReason::EntityInvalid));
        }
        if !env.entities.is_wearing_tracked_equipment(entity) {
            return Ok(PollOutcome::Stop(StopReason::EquipmentRemoved));
        }

        let position = env.entities.position(entity)?;
        let region_key = RegionKey::of_position(position, self.config.chunk_size);

        state.ticks_since_region_sample += self.config.poll_interval_ticks;
        if state.last_region_key != Some(region_key)
            || state.ticks_since_region_sample >= self.config.region_refresh_ticks
        {
            state.last_region_label = self.sample_region(position, env.world)?;
            state.last_region_key = Some(region_key);
            state.ticks_since_region_sample = 0;
            self.region_samples.fetch_add(1, Ordering::Relaxed);
        }

        let target = env.resolver.latest(entity);
        let fingerprint = Fingerprint::of(&target, &state.last_region_label);
        let moved = state
            .last_position
            .is_none_or(|last| position.moved_beyond(&last, self.config.movement_epsilon));

        if !moved && state.last_fingerprint == Some(fingerprint) {
            self.polls_skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(PollOutcome::Unchanged);
        }

        // The session may have ended while this poll was reading the world.
        if !self.is_current(entity, task.epoch) {
            return Ok(PollOutcome::Stale);
        }

        let payload = self.assembler.assemble(&PayloadContext {
            position,
            region: &state.last_region_label,
            target: &target,
        });
        env.display.push_payload(entity, payload)?;

        state.last_position = Some(position);
        state.last_fingerprint = Some(fingerprint);
        self.payloads_pushed.fetch_add(1, Ordering::Relaxed);
        Ok(PollOutcome::Pushed)
    }

    fn sample_region(&self, position: Vec3, world: &dyn WorldQuery) -> Result<RegionLabel> {
        let Some(metadata) = world.region_metadata() else {
            return Ok(RegionLabel::unavailable());
        };
        let cell = BlockPos::containing(position);
        metadata
            .region_label_at(self.config.world_seed, cell.x, cell.z)
            .map_err(|e| LensError::RegionMetadata(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockId;

    #[test]
    fn fingerprint_tracks_every_field() {
        let region = RegionLabel::new("Zone 1", "Plains");
        let base = TargetSnapshot {
            block_id: Some(BlockId::from("core:stone")),
            display_name: Some("Stone".into()),
            provenance_label: Some("core:base".into()),
            icon_id: Some("core:stone".into()),
        };
        let fp = Fingerprint::of(&base, &region);
        assert_eq!(fp, Fingerprint::of(&base.clone(), &region.clone()));

        let mut other = base.clone();
        other.icon_id = Some("core:cobble".into());
        assert_ne!(fp, Fingerprint::of(&other, &region));

        let mut other = base.clone();
        other.provenance_label = Some("pack:ores".into());
        assert_ne!(fp, Fingerprint::of(&other, &region));

        assert_ne!(fp, Fingerprint::of(&base, &RegionLabel::new("Zone 1", "Forest")));
        assert_ne!(fp, Fingerprint::of(&TargetSnapshot::nothing(), &region));
    }

    #[test]
    fn display_name_alone_does_not_change_fingerprint() {
        let region = RegionLabel::unavailable();
        let mut a = TargetSnapshot::nothing();
        a.block_id = Some(BlockId::from("core:dirt"));
        let mut b = a.clone();
        b.display_name = Some("Dirt".into());
        assert_eq!(Fingerprint::of(&a, &region), Fingerprint::of(&b, &region));
    }
}
