//! Display sink that encodes overlay updates as JSON frames on a channel.
//!
//! Whatever owns the receiving end (the binary, a network bridge, a test)
//! decides where the frames go.

use crate::error::{LensError, Result};
use crate::protocol::{subjects, DisplayEvent, DisplayPayload, DisplaySurface, SurfaceChanged};
use crate::types::EntityId;
use crate::world::DisplaySink;
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// One encoded message for a display client.
#[derive(Debug, Clone)]
pub struct DisplayFrame {
    pub subject: &'static str,
    pub entity: EntityId,
    pub body: Bytes,
}

pub struct ChannelDisplaySink {
    session: String,
    tx: UnboundedSender<DisplayFrame>,
}

impl ChannelDisplaySink {
    pub fn new(session: impl Into<String>) -> (Self, UnboundedReceiver<DisplayFrame>) {
        let (tx, rx) = unbounded_channel();
        (
            Self {
                session: session.into(),
                tx,
            },
            rx,
        )
    }

    fn send<T: Serialize>(&self, subject: &'static str, entity: EntityId, payload: T) -> Result<()> {
        let event = DisplayEvent::new(self.session.as_str(), entity, payload);
        let body = serde_json::to_vec(&event).map_err(|e| LensError::Display {
            entity: entity.to_string(),
            reason: format!("encode failed for {}: {}", subject, e),
        })?;
        self.tx
            .send(DisplayFrame {
                subject,
                entity,
                body: Bytes::from(body),
            })
            .map_err(|_| LensError::Display {
                entity: entity.to_string(),
                reason: "display channel closed".into(),
            })
    }
}

impl DisplaySink for ChannelDisplaySink {
    fn set_display_surface(&self, entity: EntityId, surface: Option<DisplaySurface>) -> Result<()> {
        self.send(subjects::DISPLAY_SURFACE, entity, SurfaceChanged { surface })
    }

    fn push_payload(&self, entity: EntityId, payload: DisplayPayload) -> Result<()> {
        self.send(subjects::DISPLAY_PAYLOAD, entity, payload)
    }
}
