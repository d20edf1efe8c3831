//! TelemetryTracker tests: change suppression, region throttling, epochs

mod common;

#[cfg(test)]
mod tests {
    use super::common::{fast_config, harness, pedestal, RecordingSink, STRAIGHT_DOWN};
    use janet_lens::assembler::PayloadAssembler;
    use janet_lens::error::Result;
    use janet_lens::protocol::{DisplayPayload, DisplaySurface, RegionLabel};
    use janet_lens::protocol::NOT_AVAILABLE;
    use janet_lens::provenance::ProvenanceCache;
    use janet_lens::resolver::TargetResolver;
    use janet_lens::sandbox::{BlockDef, SandboxWorld};
    use janet_lens::service::LifecycleEvent;
    use janet_lens::tracker::{Phase, PollEnv, PollOutcome, StopReason, TelemetryTracker};
    use janet_lens::types::{BlockPos, EntityId, TelemetryConfig, Vec3};
    use janet_lens::world::{BlockInfo, ContentSource, DisplaySink, RegionMetadata, WorldQuery};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const E: EntityId = EntityId(1);

    fn join(h: &super::common::Harness, block: &str) -> Vec3 {
        h.sandbox.register_block("gems:ruby_ore", BlockDef::named("Ruby Ore"));
        h.sandbox.register_block("gems:opal", BlockDef::named("Opal"));
        h.sandbox.add_pack(
            ContentSource::new("gems", "gemstones").with_blocks(["gems:ruby_ore", "gems:opal"]),
        );
        let (_, stand) = pedestal(&h.sandbox, 5, 5, block);
        h.sandbox.spawn(E, stand, STRAIGHT_DOWN);
        h.sandbox.set_wearing(E, true);
        h.service.handle_event(LifecycleEvent::EntityJoined(E));
        stand
    }

    fn run(h: &super::common::Harness, ticks: usize) {
        for _ in 0..ticks {
            h.service.tick();
        }
    }

    // -----------------------------------------------------------------------
    // Change suppression
    // -----------------------------------------------------------------------

    #[test]
    fn unchanged_entity_is_pushed_once() {
        let h = harness(fast_config(100));
        let stand = join(&h, "gems:ruby_ore");

        run(&h, 10);

        let pushes = h.sink.pushes_for(E);
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].block_name, "Ruby Ore");
        assert_eq!(pushes[0].owner_label, "gems:gemstones");
        assert_eq!(pushes[0].icon_id, "gems:ruby_ore");
        assert_eq!(
            pushes[0].coords,
            format!("5, {}, 5", stand.y.floor())
        );
        assert_eq!(pushes[0].zone, "R0");
        assert_eq!(pushes[0].biome, "C0");
        assert_eq!(h.service.tracker().polls_skipped(), 9);
    }

    #[test]
    fn target_change_pushes_exactly_once() {
        let h = harness(fast_config(100));
        join(&h, "gems:ruby_ore");
        run(&h, 3);
        assert_eq!(h.sink.push_count(E), 1);

        let (pos, _) = pedestal(&h.sandbox, 5, 5, "gems:ruby_ore");
        h.sandbox.place_block(pos, "gems:opal");
        run(&h, 5);

        let pushes = h.sink.pushes_for(E);
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[1].block_name, "Opal");
    }

    #[test]
    fn display_name_change_alone_is_not_pushed() {
        let h = harness(fast_config(100));
        join(&h, "gems:ruby_ore");
        run(&h, 3);

        h.sandbox.register_block("gems:ruby_ore", BlockDef::named("Red Ore"));
        run(&h, 5);

        assert_eq!(h.sink.push_count(E), 1);
        assert_eq!(
            h.service.resolver().latest(E).display_name.as_deref(),
            Some("Red Ore")
        );
    }

    #[test]
    fn looking_away_to_nothing_pushes_not_available_fields() {
        let h = harness(fast_config(100));
        join(&h, "gems:ruby_ore");
        run(&h, 2);

        h.sandbox.set_look(E, Vec3::new(0.0, 1.0, 0.0));
        run(&h, 2);

        let pushes = h.sink.pushes_for(E);
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[1].block_name, NOT_AVAILABLE);
        assert_eq!(pushes[1].owner_label, NOT_AVAILABLE);
        assert_eq!(pushes[1].icon_id, "");
        assert_eq!(pushes[1].zone, "R0");
    }

    #[test]
    fn movement_below_epsilon_is_ignored() {
        let h = harness(TelemetryConfig {
            movement_epsilon: 0.5,
            ..fast_config(100)
        });
        let stand = join(&h, "gems:ruby_ore");
        run(&h, 2);

        h.sandbox
            .set_position(E, Vec3::new(stand.x, stand.y + 0.4, stand.z));
        run(&h, 2);
        assert_eq!(h.sink.push_count(E), 1);

        // Measured from the last pushed position, not the last poll.
        h.sandbox
            .set_position(E, Vec3::new(stand.x, stand.y + 0.8, stand.z));
        run(&h, 2);
        assert_eq!(h.sink.push_count(E), 2);
    }

    // -----------------------------------------------------------------------
    // Region throttling
    // -----------------------------------------------------------------------

    #[test]
    fn stationary_entity_samples_region_every_k_ticks() {
        let k = 5;
        let h = harness(fast_config(k));
        join(&h, "gems:ruby_ore");

        let ticks = 20;
        run(&h, ticks);

        // Polls 1, 6, 11, 16.
        assert_eq!(h.world.lookups(), 4);
        assert_eq!(h.service.tracker().region_samples(), 4);
        assert!(h.world.lookups() <= 1 + ticks as u64 / k);
    }

    #[test]
    fn slower_poll_interval_counts_ticks_not_polls() {
        let h = harness(TelemetryConfig {
            poll_interval_ticks: 4,
            region_refresh_ticks: 8,
            ..Default::default()
        });
        join(&h, "gems:ruby_ore");

        // Polls on ticks 1, 5, 9, 13, 17; samples on 1, 9, 17.
        run(&h, 17);
        assert_eq!(h.world.lookups(), 3);
    }

    #[test]
    fn missing_region_capability_yields_not_available() {
        let config = fast_config(3);
        let sandbox = SandboxWorld::new(config.world_seed, config.chunk_size).without_region_metadata();
        sandbox.load_around(0, 0, 1);
        let (_, stand) = pedestal(&sandbox, 5, 5, "core:stone");
        sandbox.spawn(E, stand, STRAIGHT_DOWN);

        let sink = RecordingSink::default();
        let resolver = TargetResolver::new(Arc::new(ProvenanceCache::new("core:base")), 10.0);
        let tracker = TelemetryTracker::new(config, PayloadAssembler::standard());
        let task = tracker.activate(E, &sink).unwrap().unwrap();

        let env = PollEnv {
            entities: &sandbox,
            world: &sandbox,
            display: &sink,
            resolver: &resolver,
        };
        sandbox.set_wearing(E, true);
        assert_eq!(tracker.poll(task, &env), PollOutcome::Pushed);

        let pushed = &sink.pushes_for(E)[0];
        assert_eq!(pushed.zone, NOT_AVAILABLE);
        assert_eq!(pushed.biome, NOT_AVAILABLE);
        assert_eq!(tracker.phase(E), Phase::Active);
    }

    #[test]
    fn region_lookup_failure_stops_tracking() {
        let sandbox = SandboxWorld::new(42, 32);
        sandbox.load_around(0, 0, 1);
        sandbox.spawn(E, Vec3::new(1.5, 80.0, 1.5), STRAIGHT_DOWN);
        sandbox.set_wearing(E, true);

        let sink = RecordingSink::default();
        let resolver = TargetResolver::new(Arc::new(ProvenanceCache::new("core:base")), 10.0);
        let config = TelemetryConfig {
            world_seed: 7,
            ..Default::default()
        };
        let tracker = TelemetryTracker::new(config, PayloadAssembler::standard());
        let task = tracker.activate(E, &sink).unwrap().unwrap();
        let env = PollEnv {
            entities: &sandbox,
            world: &sandbox,
            display: &sink,
            resolver: &resolver,
        };

        assert_eq!(tracker.poll(task, &env), PollOutcome::Stop(StopReason::Fault));
        assert_eq!(sink.push_count(E), 0);
    }

    // -----------------------------------------------------------------------
    // Transitions & epochs
    // -----------------------------------------------------------------------

    #[test]
    fn activate_is_idempotent_and_attaches_surface() {
        let sink = RecordingSink::default();
        let tracker = TelemetryTracker::new(TelemetryConfig::default(), PayloadAssembler::standard());

        let task = tracker.activate(E, &sink).unwrap().unwrap();
        assert!(tracker.activate(E, &sink).unwrap().is_none());
        assert_eq!(tracker.active_count(), 1);

        let surface = sink.surface(E).unwrap();
        assert_eq!(surface.surface_id, task.epoch);
        assert_eq!(tracker.state(E).unwrap().epoch, task.epoch);
    }

    #[test]
    fn poll_from_an_ended_session_is_stale() {
        let sandbox = SandboxWorld::new(42, 32);
        sandbox.load_around(0, 0, 1);
        sandbox.spawn(E, Vec3::new(1.5, 80.0, 1.5), STRAIGHT_DOWN);
        sandbox.set_wearing(E, true);

        let sink = RecordingSink::default();
        let resolver = TargetResolver::new(Arc::new(ProvenanceCache::new("core:base")), 10.0);
        let tracker = TelemetryTracker::new(TelemetryConfig::default(), PayloadAssembler::standard());
        let env = PollEnv {
            entities: &sandbox,
            world: &sandbox,
            display: &sink,
            resolver: &resolver,
        };

        let old = tracker.activate(E, &sink).unwrap().unwrap();
        assert!(tracker.deactivate(E, StopReason::EquipmentRemoved, &sink, &resolver));
        assert!(!tracker.deactivate(E, StopReason::EquipmentRemoved, &sink, &resolver));
        assert_eq!(tracker.poll(old, &env), PollOutcome::Stale);

        let fresh = tracker.activate(E, &sink).unwrap().unwrap();
        assert_ne!(fresh.epoch, old.epoch);
        assert_eq!(tracker.poll(old, &env), PollOutcome::Stale);
        assert_eq!(tracker.poll(fresh, &env), PollOutcome::Pushed);
        assert_eq!(sink.push_count(E), 1);
    }

    #[test]
    fn unequipped_or_invalid_entity_stops_on_poll() {
        let sandbox = SandboxWorld::new(42, 32);
        sandbox.load_around(0, 0, 1);
        sandbox.spawn(E, Vec3::new(1.5, 80.0, 1.5), STRAIGHT_DOWN);

        let sink = RecordingSink::default();
        let resolver = TargetResolver::new(Arc::new(ProvenanceCache::new("core:base")), 10.0);
        let tracker = TelemetryTracker::new(TelemetryConfig::default(), PayloadAssembler::standard());
        let env = PollEnv {
            entities: &sandbox,
            world: &sandbox,
            display: &sink,
            resolver: &resolver,
        };

        let task = tracker.activate(E, &sink).unwrap().unwrap();
        assert_eq!(
            tracker.poll(task, &env),
            PollOutcome::Stop(StopReason::EquipmentRemoved)
        );

        sandbox.set_wearing(E, true);
        sandbox.invalidate(E);
        assert_eq!(
            tracker.poll(task, &env),
            PollOutcome::Stop(StopReason::EntityInvalid)
        );
        assert_eq!(sink.push_count(E), 0);
    }

    #[test]
    fn failed_push_stops_the_session() {
        let h = harness(fast_config(100));
        h.sink.set_fail_pushes(true);
        join(&h, "gems:ruby_ore");

        let report = h.service.tick();

        assert_eq!(report.stopped, 1);
        assert_eq!(h.service.phase(E), Phase::Idle);
        assert!(!h.sink.has_surface(E));
        assert_eq!(h.service.pending_polls(), 0);
    }

    // -----------------------------------------------------------------------
    // Deactivation racing a transition
    // -----------------------------------------------------------------------

    /// Sink that lets the entity be deactivated just before its surface is
    /// attached, as a concurrent unequip would.
    struct DeactivateOnAttach<'a> {
        inner: RecordingSink,
        tracker: &'a TelemetryTracker,
        resolver: &'a TargetResolver,
        fired: AtomicBool,
    }

    impl DisplaySink for DeactivateOnAttach<'_> {
        fn set_display_surface(&self, entity: EntityId, surface: Option<DisplaySurface>) -> Result<()> {
            if surface.is_some() && !self.fired.swap(true, Ordering::SeqCst) {
                self.tracker
                    .deactivate(entity, StopReason::EquipmentRemoved, &self.inner, self.resolver);
            }
            self.inner.set_display_surface(entity, surface)
        }

        fn push_payload(&self, entity: EntityId, payload: DisplayPayload) -> Result<()> {
            self.inner.push_payload(entity, payload)
        }
    }

    #[test]
    fn deactivation_during_attach_leaves_no_surface() {
        let resolver = TargetResolver::new(Arc::new(ProvenanceCache::new("core:base")), 10.0);
        let tracker = TelemetryTracker::new(TelemetryConfig::default(), PayloadAssembler::standard());
        let sink = DeactivateOnAttach {
            inner: RecordingSink::default(),
            tracker: &tracker,
            resolver: &resolver,
            fired: AtomicBool::new(false),
        };

        assert_eq!(tracker.activate(E, &sink).unwrap(), None);
        assert_eq!(tracker.phase(E), Phase::Idle);
        assert!(!sink.inner.has_surface(E));

        // A later activation is unaffected.
        let task = tracker.activate(E, &sink).unwrap().unwrap();
        assert_eq!(tracker.phase(E), Phase::Active);
        assert_eq!(sink.inner.surface(E).unwrap().surface_id, task.epoch);
    }

    /// World whose region lookup ends the entity's session, as an unequip
    /// handled mid-poll would.
    struct DeactivateOnRegionLookup<'a> {
        inner: SandboxWorld,
        tracker: &'a TelemetryTracker,
        resolver: &'a TargetResolver,
        display: &'a RecordingSink,
    }

    impl WorldQuery for DeactivateOnRegionLookup<'_> {
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

    impl RegionMetadata for DeactivateOnRegionLookup<'_> {
        fn region_label_at(&self, _seed: u64, _x: i32, _z: i32) -> Result<RegionLabel> {
            self.tracker
                .deactivate(E, StopReason::EquipmentRemoved, self.display, self.resolver);
            Ok(RegionLabel::new("Zone 1", "Plains"))
        }
    }

    #[test]
    fn poll_overtaken_by_deactivation_pushes_nothing() {
        let sandbox = SandboxWorld::new(42, 32);
        sandbox.load_around(0, 0, 1);
        sandbox.spawn(E, Vec3::new(1.5, 80.0, 1.5), STRAIGHT_DOWN);
        sandbox.set_wearing(E, true);

        let sink = RecordingSink::default();
        let resolver = TargetResolver::new(Arc::new(ProvenanceCache::new("core:base")), 10.0);
        let tracker = TelemetryTracker::new(TelemetryConfig::default(), PayloadAssembler::standard());
        let world = DeactivateOnRegionLookup {
            inner: sandbox,
            tracker: &tracker,
            resolver: &resolver,
            display: &sink,
        };
        let env = PollEnv {
            entities: &world.inner,
            world: &world,
            display: &sink,
            resolver: &resolver,
        };

        let task = tracker.activate(E, &sink).unwrap().unwrap();
        assert_eq!(tracker.poll(task, &env), PollOutcome::Stale);
        assert_eq!(sink.push_count(E), 0);
        assert!(!sink.has_surface(E));
        assert!(tracker.state(E).is_none());
    }
}
