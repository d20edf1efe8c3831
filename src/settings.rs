//! Layered settings: optional file, then `LENS_*` environment variables.
//!
//! Nested keys use a double underscore, e.g.
//! `LENS_TELEMETRY__POLL_INTERVAL_TICKS=2` or `LENS_AGENT__SESSION=dev`.

use crate::agent::AgentConfig;
use crate::types::TelemetryConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LensSettings {
    pub telemetry: TelemetryConfig,
    pub agent: AgentConfig,
}

impl LensSettings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("LENS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Self = builder
            .build()
            .context("Failed to read lens settings")?
            .try_deserialize()
            .context("Failed to parse lens settings")?;
        settings.telemetry.validate()?;
        Ok(settings)
    }
}
