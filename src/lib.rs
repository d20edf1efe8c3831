//! Janet Lens
//!
//! Tick-driven block targeting and telemetry overlay for game servers.
//! While an entity wears the tracked equipment, the lens keeps its display
//! surface fed with what it is looking at, who owns that content, where it
//! is, and which region it is in, pushing only when something changed.
//!
//! ## Architecture
//!
//! ```text
//! TelemetryAgent  (agent.rs)
//!   └── TelemetryService  (service.rs)      ← tick orchestration, lifecycle
//!         ├── TargetResolver   (resolver.rs)   ← ray query, filler offsets
//!         │     └── ProvenanceCache (provenance.rs)
//!         ├── TelemetryTracker (tracker.rs)    ← Idle ⇄ Active, change detection
//!         │     └── PayloadAssembler (assembler.rs)
//!         └── TickQueue        (scheduler.rs)  ← delayed poll chains
//! ```
//!
//! The host implements the contracts in `world.rs`. `SandboxWorld`
//! (sandbox.rs, terrain.rs, structure.rs) is a complete in-process
//! implementation used by the server binary and the tests.

// Protocol types are always available (no server feature needed).
pub mod error;
pub mod protocol;
pub mod types;

// Runtime modules require the `server` feature.
#[cfg(feature = "server")]
pub mod agent;
#[cfg(feature = "server")]
pub mod assembler;
#[cfg(feature = "server")]
pub mod provenance;
#[cfg(feature = "server")]
pub mod resolver;
#[cfg(feature = "server")]
pub mod sandbox;
#[cfg(feature = "server")]
pub mod scheduler;
#[cfg(feature = "server")]
pub mod service;
#[cfg(feature = "server")]
pub mod settings;
#[cfg(feature = "server")]
pub mod sink;
#[cfg(feature = "server")]
pub mod structure;
#[cfg(feature = "server")]
pub mod terrain;
#[cfg(feature = "server")]
pub mod tracker;
#[cfg(feature = "server")]
pub mod world;

// Convenience re-exports (server only)
#[cfg(feature = "server")]
pub use agent::{AgentConfig, TelemetryAgent};
#[cfg(feature = "server")]
pub use assembler::{PayloadAssembler, PayloadContext, PayloadProvider};
#[cfg(feature = "server")]
pub use provenance::ProvenanceCache;
#[cfg(feature = "server")]
pub use resolver::TargetResolver;
#[cfg(feature = "server")]
pub use sandbox::SandboxWorld;
#[cfg(feature = "server")]
pub use service::{Collaborators, LifecycleEvent, TelemetryService};
#[cfg(feature = "server")]
pub use tracker::{Phase, TelemetryTracker};
pub use error::{LensError, Result};
pub use protocol::{DisplayPayload, ProvenanceRecord, RegionLabel, TargetSnapshot};
pub use types::{BlockId, BlockPos, EntityId, RegionKey, TelemetryConfig, TelemetryStats, Vec3};
