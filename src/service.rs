//! TelemetryService – per-tick orchestration and entity lifecycle.

use crate::assembler::PayloadAssembler;
use crate::error::Result;
use crate::provenance::ProvenanceCache;
use crate::resolver::{ResolvePass, TargetResolver};
use crate::scheduler::{PollTask, TickQueue, TickScheduler};
use crate::tracker::{Phase, PollEnv, PollOutcome, StopReason, TelemetryTracker};
use crate::types::{EntityId, TelemetryConfig, TelemetryStats};
use crate::world::{ContentSources, DisplaySink, EntityDirectory, WorldQuery};
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Host-side events that drive `Idle ⇄ Active` transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    EntityJoined(EntityId),
    EquipmentChanged(EntityId),
    EntityLeft(EntityId),
    /// Content sources were loaded or unloaded.
    ContentReloaded,
}

/// What a single [`TelemetryService::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub resolve: ResolvePass,
    pub polls: usize,
    pub pushed: usize,
    pub stopped: usize,
}

/// The host collaborators, bundled.
#[derive(Clone)]
pub struct Collaborators {
    pub world: Arc<dyn WorldQuery>,
    pub content: Arc<dyn ContentSources>,
    pub entities: Arc<dyn EntityDirectory>,
    pub display: Arc<dyn DisplaySink>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct TelemetryService {
    host: Collaborators,
    provenance: Arc<ProvenanceCache>,
    resolver: TargetResolver,
    tracker: TelemetryTracker,
    queue: Mutex<TickQueue<PollTask>>,
    tick_count: AtomicU64,
}

impl TelemetryService {
    pub fn new(config: TelemetryConfig, host: Collaborators) -> Result<Self> {
        Self::with_assembler(config, host, PayloadAssembler::standard())
    }

    pub fn with_assembler(
        config: TelemetryConfig,
        host: Collaborators,
        assembler: PayloadAssembler,
    ) -> Result<Self> {
        config.validate()?;
        let provenance = Arc::new(ProvenanceCache::new(&config.base_content_label));
        let resolver = TargetResolver::new(provenance.clone(), config.max_target_distance);
        Ok(Self {
            host,
            provenance,
            resolver,
            tracker: TelemetryTracker::new(config, assembler),
            queue: Mutex::new(TickQueue::new()),
            tick_count: AtomicU64::new(0),
        })
    }

    pub fn provenance(&self) -> &Arc<ProvenanceCache> {
        &self.provenance
    }

    pub fn resolver(&self) -> &TargetResolver {
        &self.resolver
    }

    pub fn tracker(&self) -> &TelemetryTracker {
        &self.tracker
    }

    pub fn phase(&self, entity: EntityId) -> Phase {
        self.tracker.phase(entity)
    }

    pub fn pending_polls(&self) -> usize {
        self.queue.lock().len()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn handle_event(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::EntityJoined(entity) | LifecycleEvent::EquipmentChanged(entity) => {
                self.sync_equipment(entity)
            }
            LifecycleEvent::EntityLeft(entity) => {
                self.stop(entity, StopReason::EntityLeft);
                self.resolver.forget(entity);
            }
            LifecycleEvent::ContentReloaded => {
                debug!("Content reloaded, provenance cache invalidated");
                self.provenance.invalidate();
            }
        }
    }

    fn sync_equipment(&self, entity: EntityId) {
        let entities = self.host.entities.as_ref();
        let wearing = entities.is_valid(entity) && entities.is_wearing_tracked_equipment(entity);
        match (wearing, self.tracker.phase(entity)) {
            (true, Phase::Idle) => self.start(entity),
            (false, Phase::Active) => self.stop(entity, StopReason::EquipmentRemoved),
            _ => {}
        }
    }

    fn start(&self, entity: EntityId) {
        match self.tracker.activate(entity, self.host.display.as_ref()) {
            Ok(Some(task)) => self.queue.lock().schedule(0, task),
            Ok(None) => {}
            Err(e) => warn!("Could not start telemetry for {}: {}", entity, e),
        }
    }

    fn stop(&self, entity: EntityId, reason: StopReason) {
        self.tracker
            .deactivate(entity, reason, self.host.display.as_ref(), &self.resolver);
    }

    // -----------------------------------------------------------------------
    // Main tick
    // -----------------------------------------------------------------------

    /// Advance one simulation tick: resolve every entity's target, then run
    /// every poll that fell due and reschedule the chains that continue.
    pub fn tick(&self) -> TickReport {
        let tick = self.tick_count.fetch_add(1, Ordering::Relaxed) + 1;

        let resolve = self.resolver.resolve_all(
            self.host.entities.as_ref(),
            self.host.world.as_ref(),
            self.host.content.as_ref(),
        );

        let due = self.queue.lock().advance();
        let env = PollEnv {
            entities: self.host.entities.as_ref(),
            world: self.host.world.as_ref(),
            display: self.host.display.as_ref(),
            resolver: &self.resolver,
        };

        let mut report = TickReport {
            tick,
            resolve,
            ..Default::default()
        };
        let mut continuing = Vec::new();
        for task in due {
            report.polls += 1;
            match self.tracker.poll(task, &env) {
                PollOutcome::Pushed => {
                    report.pushed += 1;
                    continuing.push(task);
                }
                PollOutcome::Unchanged => continuing.push(task),
                PollOutcome::Stop(reason) => {
                    report.stopped += 1;
                    self.stop(task.entity, reason);
                }
                PollOutcome::Stale => {}
            }
        }

        if !continuing.is_empty() {
            let interval = self.tracker.config().poll_interval_ticks;
            let mut queue = self.queue.lock();
            for task in continuing {
                queue.schedule(interval, task);
            }
        }

        report
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            total_ticks: self.tick_count.load(Ordering::Relaxed),
            active_entities: self.tracker.active_count(),
            snapshots: self.resolver.len(),
            payloads_pushed: self.tracker.payloads_pushed(),
            polls_skipped: self.tracker.polls_skipped(),
            region_samples: self.tracker.region_samples(),
            cache_entries: self.provenance.len(),
            cache_ready: self.provenance.is_ready(),
        }
    }
}
