//! Agent – drives a [`TelemetryService`] from a fixed-rate tick loop.
//!
//! ## Inputs
//!
//! | Source                  | Effect                                   |
//! |-------------------------|------------------------------------------|
//! | tick timer              | `TelemetryService::tick`                 |
//! | `LifecycleEvent` inbox  | `TelemetryService::handle_event`         |
//! | shutdown future         | loop exits, final stats logged           |
//!
//! Lifecycle events may be sent from any thread through the
//! [`UnboundedSender`] returned by [`TelemetryAgent::new`]; they are applied
//! between ticks.

use crate::service::{LifecycleEvent, TelemetryService};
use anyhow::{bail, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

// ---------------------------------------------------------------------------
// Config for TelemetryAgent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Session name stamped on display frames.
    pub session: String,
    /// Tick rate in Hz.
    pub tick_rate_hz: f32,
    /// Log a stats line every this many ticks (0 disables).
    pub stats_every_ticks: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            session: "default".into(),
            tick_rate_hz: 30.0,
            stats_every_ticks: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// TelemetryAgent
// ---------------------------------------------------------------------------

pub struct TelemetryAgent {
    config: AgentConfig,
    service: Arc<TelemetryService>,
    events: UnboundedReceiver<LifecycleEvent>,
}

impl TelemetryAgent {
    pub fn new(
        config: AgentConfig,
        service: Arc<TelemetryService>,
    ) -> (Self, UnboundedSender<LifecycleEvent>) {
        let (tx, events) = unbounded_channel();
        (
            Self {
                config,
                service,
                events,
            },
            tx,
        )
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> Result<u64> {
        self.run_until(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("TelemetryAgent shutting down (SIGINT)");
            }
        })
        .await
    }

    /// Run the tick loop until `shutdown` resolves. Returns the number of
    /// ticks executed.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<u64>
    where
        F: Future<Output = ()>,
    {
        let hz = self.config.tick_rate_hz;
        if !hz.is_finite() || hz <= 0.0 {
            bail!("tick_rate_hz must be a positive number, got {}", hz);
        }
        // Both ends must map to a non-zero, representable period.
        let period = match Duration::try_from_secs_f32(1.0 / hz) {
            Ok(period) if !period.is_zero() => period,
            _ => bail!("tick_rate_hz {} gives no usable tick period", hz),
        };

        info!(
            "TelemetryAgent active in session '{}' – ticking at {:.0}Hz",
            self.config.session, hz
        );

        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(event) = self.events.recv() => {
                    debug!("Lifecycle event {:?}", event);
                    self.service.handle_event(event);
                }
                _ = timer.tick() => {
                    let span = tracing::debug_span!("tick", n = ticks + 1);
                    let _entered = span.enter();

                    let report = self.service.tick();
                    ticks += 1;
                    if report.stopped > 0 {
                        debug!("Tick {}: {} telemetry chains stopped", report.tick, report.stopped);
                    }
                    let every = self.config.stats_every_ticks;
                    if every > 0 && report.tick % every == 0 {
                        log_stats(&self.service);
                    }
                }
            }
        }

        // Apply anything that arrived before shutdown.
        while let Ok(event) = self.events.try_recv() {
            self.service.handle_event(event);
        }

        log_stats(&self.service);
        Ok(ticks)
    }
}

fn log_stats(service: &TelemetryService) {
    let stats = service.stats();
    info!(
        "ticks={} active={} snapshots={} pushed={} skipped={} region_samples={} cache={}{}",
        stats.total_ticks,
        stats.active_entities,
        stats.snapshots,
        stats.payloads_pushed,
        stats.polls_skipped,
        stats.region_samples,
        stats.cache_entries,
        if stats.cache_ready { "" } else { " (stale)" },
    );
}
