//! Routes decoded inbound messages to the right handler.
//!
//! One frame in, at most one registry mutation out:
//!
//! ```text
//! raw frame ── ServerMessage::decode ──┬─ PING_RESPONSE ──► registry.insert_detected
//!                                      ├─ SUBMARINE_UPDATE ──► decrypt ► apply_position
//!                                      ├─ COMMUNICATION_INTERCEPTED ──► ingest_fragment
//!                                      └─ Unknown / malformed ──► dropped (logged)
//! ```
//!
//! Decode faults never propagate: a bad frame is dropped whole and the
//! session keeps running.

use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::cipher;
use crate::protocol::{
    CommunicationIntercepted, PingResponse, Position, ServerMessage, SubmarineUpdate, TrackUpdate,
};
use crate::registry::EntityRegistry;
use crate::session::TrackerEvent;

/// Stateless router over the shared registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<RwLock<EntityRegistry>>,
    events: mpsc::Sender<TrackerEvent>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<RwLock<EntityRegistry>>,
        events: mpsc::Sender<TrackerEvent>,
    ) -> Self {
        Self { registry, events }
    }

    /// Decode and route one raw inbound frame.
    pub async fn dispatch(&self, raw: &str) {
        let message = match ServerMessage::decode(raw) {
            Ok(message) => message,
            Err(e) => {
                log::debug!("dropping malformed frame: {e}");
                return;
            }
        };
        match message {
            ServerMessage::PingResponse(payload) => self.on_ping_response(payload).await,
            ServerMessage::SubmarineUpdate(payload) => self.on_submarine_update(payload).await,
            ServerMessage::CommunicationIntercepted(payload) => {
                self.on_communication(payload).await
            }
            ServerMessage::Unknown => log::debug!("ignoring unknown message type"),
        }
    }

    /// Create every newly reported submarine; known ids are left alone.
    async fn on_ping_response(&self, payload: PingResponse) {
        // Mutate first, notify after the guard is gone: a full event
        // channel must never hold the registry lock.
        let mut detected = Vec::new();
        {
            let mut registry = self.registry.write().await;
            for sub in &payload.detected_submarines {
                if registry.insert_detected(sub) {
                    detected.push((sub.submarine_id.clone(), sub.position));
                }
            }
        }
        for (id, position) in detected {
            let _ = self
                .events
                .send(TrackerEvent::SubmarineDetected { id, position })
                .await;
        }
    }

    /// Position updates only decode once the entity's key is recovered;
    /// until then the position stays stale by design.
    async fn on_submarine_update(&self, payload: SubmarineUpdate) {
        let applied = {
            let mut registry = self.registry.write().await;
            let Some(key) = registry.get(&payload.submarine_id).and_then(|s| s.key) else {
                log::debug!("update for {} without key, ignoring", payload.submarine_id);
                return;
            };

            let decrypted = cipher::xor_decrypt(&payload.encrypted_payload, key);
            let Ok(track) = serde_json::from_str::<TrackUpdate>(&decrypted) else {
                log::debug!("undecodable track update for {}", payload.submarine_id);
                return;
            };

            let position = Position {
                lat: track.position.latitude,
                long: track.position.longitude,
            };
            registry
                .apply_position(&payload.submarine_id, position)
                .then_some(position)
        };
        if let Some(position) = applied {
            let _ = self
                .events
                .send(TrackerEvent::PositionUpdated {
                    id: payload.submarine_id,
                    position,
                })
                .await;
        }
    }

    async fn on_communication(&self, payload: CommunicationIntercepted) {
        let completed = {
            let mut registry = self.registry.write().await;
            registry.ingest_fragment(
                &payload.submarine_id,
                &payload.timestamp,
                payload.package_number,
                payload.total_packages,
                &payload.encrypted_payload,
            )
        };
        if let Some(message) = completed {
            let _ = self
                .events
                .send(TrackerEvent::MessageIntercepted {
                    id: payload.submarine_id,
                    message,
                })
                .await;
        }
    }
}
