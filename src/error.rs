//! Error type shared by the telemetry pipeline and its collaborators.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LensError {
    #[error("content source enumeration failed: {0}")]
    ContentEnumeration(String),

    #[error("world query failed at {at}: {reason}")]
    World { at: String, reason: String },

    #[error("region metadata lookup failed: {0}")]
    RegionMetadata(String),

    #[error("display sink rejected {entity}: {reason}")]
    Display { entity: String, reason: String },

    #[error("{0} is no longer valid")]
    EntityGone(String),

    #[error("provider '{provider}' failed: {reason}")]
    Provider {
        provider: &'static str,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LensError {
    pub fn world(at: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::World {
            at: at.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LensError>;
