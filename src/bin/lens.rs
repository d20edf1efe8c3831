//! janet-lens-server binary
//!
//! Runs the telemetry pipeline against the in-process sandbox world with a
//! few wandering demo entities, logging every display frame.
//!
//! ## Configuration (file / env via `config` crate, CLI overrides)
//!
//! | Key / flag                         | Default     | Description                       |
//! |------------------------------------|-------------|-----------------------------------|
//! | `--config`                         | *(none)*    | TOML/JSON settings file           |
//! | `LENS_AGENT__SESSION`              | `default`   | Session stamped on display frames |
//! | `LENS_AGENT__TICK_RATE_HZ`         | `30`        | Simulation tick rate              |
//! | `LENS_TELEMETRY__POLL_INTERVAL_TICKS` | `4`      | Ticks between telemetry polls     |
//! | `LENS_TELEMETRY__REGION_REFRESH_TICKS` | `100`   | Max ticks between region lookups  |
//! | `LENS_TELEMETRY__WORLD_SEED`       | `42`        | Sandbox terrain seed              |
//! | `LENS_TELEMETRY__CHUNK_SIZE`       | `32`        | Region bucket width in blocks     |

use anyhow::{Context, Result};
use clap::Parser;
use janet_lens::{
    agent::TelemetryAgent,
    sandbox::{BlockDef, SandboxWorld},
    service::{Collaborators, LifecycleEvent, TelemetryService},
    settings::LensSettings,
    sink::ChannelDisplaySink,
    structure::StructureInstance,
    types::{BlockOffset, BlockPos, EntityId, Vec3},
    world::ContentSource,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "janet-lens-server", about = "Janet Lens telemetry server", version)]
struct Args {
    /// Settings file (TOML, JSON, YAML …)
    #[arg(long, env = "LENS_CONFIG")]
    config: Option<PathBuf>,

    /// Session name
    #[arg(long)]
    session: Option<String>,

    /// Tick rate (Hz)
    #[arg(long)]
    tick_rate_hz: Option<f32>,

    /// Terrain / region metadata seed
    #[arg(long)]
    seed: Option<u64>,

    /// Ticks between telemetry polls
    #[arg(long)]
    poll_interval_ticks: Option<u64>,

    /// Number of wandering demo entities
    #[arg(long, default_value_t = 3)]
    demo_entities: u64,

    /// Chunks loaded around spawn (Chebyshev radius)
    #[arg(long, default_value_t = 4)]
    load_radius: i32,
}

// ---------------------------------------------------------------------------
// Sandbox setup
// ---------------------------------------------------------------------------

fn build_sandbox(seed: u64, chunk_size: i32, load_radius: i32) -> SandboxWorld {
    let world = SandboxWorld::new(seed, chunk_size);
    world.load_around(0, 0, load_radius);

    world.register_block(
        "core:door",
        BlockDef::named("Wooden Door").with_item("core:door_item"),
    );
    world.register_block("gems:ruby_ore", BlockDef::named("Ruby Ore"));
    world.add_pack(ContentSource::new("core", "base").base().with_blocks(["core:door"]));
    world.add_pack(ContentSource::new("gems", "gemstones").with_blocks(["gems:ruby_ore"]));

    let ground = world.terrain.surface_height(6, 0).unwrap_or(64);
    world.place_structure(StructureInstance::new(
        "spawn-door",
        "core:door",
        BlockPos::new(6, ground + 1, 0),
        BlockOffset::new(1, 2, 1),
    ));
    let ground = world.terrain.surface_height(0, 6).unwrap_or(64);
    world.place_block(BlockPos::new(0, ground + 1, 6), "gems:ruby_ore");
    world
}

/// Walk each demo entity around a circle, looking slightly downward along
/// its heading.
async fn wander(world: Arc<SandboxWorld>, ids: Vec<EntityId>) {
    let mut timer = tokio::time::interval(Duration::from_millis(100));
    let mut step = 0u64;
    loop {
        timer.tick().await;
        step += 1;
        for (i, id) in ids.iter().enumerate() {
            let phase = step as f32 * 0.02 + i as f32 * 2.1;
            let radius = 8.0 + i as f32 * 6.0;
            let x = phase.cos() * radius;
            let z = phase.sin() * radius;
            let ground = world
                .terrain
                .surface_height(x.floor() as i32, z.floor() as i32)
                .unwrap_or(64);
            world.set_position(*id, Vec3::new(x, ground as f32 + 1.0, z));
            world.set_look(*id, Vec3::new(-phase.sin(), -0.6, phase.cos()));
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("janet_lens=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut settings = LensSettings::load(args.config.as_deref())?;
    if let Some(session) = args.session {
        settings.agent.session = session;
    }
    if let Some(hz) = args.tick_rate_hz {
        settings.agent.tick_rate_hz = hz;
    }
    if let Some(seed) = args.seed {
        settings.telemetry.world_seed = seed;
    }
    if let Some(interval) = args.poll_interval_ticks {
        settings.telemetry.poll_interval_ticks = interval;
    }

    log::info!(
        "Starting janet-lens-server (session='{}', seed={}, poll={} ticks, region refresh={} ticks)",
        settings.agent.session,
        settings.telemetry.world_seed,
        settings.telemetry.poll_interval_ticks,
        settings.telemetry.region_refresh_ticks,
    );

    let world = Arc::new(build_sandbox(
        settings.telemetry.world_seed,
        settings.telemetry.chunk_size,
        args.load_radius,
    ));

    let (sink, mut frames) = ChannelDisplaySink::new(settings.agent.session.clone());
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            log::info!(
                "{} {} {}",
                frame.subject,
                frame.entity,
                String::from_utf8_lossy(&frame.body)
            );
        }
    });

    let host = Collaborators {
        world: world.clone(),
        content: world.clone(),
        entities: world.clone(),
        display: Arc::new(sink),
    };
    let service = Arc::new(
        TelemetryService::new(settings.telemetry.clone(), host)
            .context("Failed to build telemetry service")?,
    );

    let (agent, events) = TelemetryAgent::new(settings.agent.clone(), service);

    let ids: Vec<EntityId> = (1..=args.demo_entities).map(EntityId).collect();
    for id in &ids {
        world.spawn(*id, Vec3::new(0.0, 66.0, 0.0), Vec3::new(1.0, -0.5, 0.0));
        world.set_wearing(*id, true);
        events
            .send(LifecycleEvent::EntityJoined(*id))
            .context("Agent inbox closed before start")?;
    }
    tokio::spawn(wander(world.clone(), ids));

    // Run until shutdown
    let ticks = agent.run().await?;
    log::info!("janet-lens-server stopped after {} ticks", ticks);
    Ok(())
}
