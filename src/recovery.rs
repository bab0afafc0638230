//! Incremental brute-force recovery of per-submarine XOR keys.
//!
//! The key space is a single byte bounded by the entity's difficulty, so
//! a linear scan is intentional: one candidate per tick, slow enough to
//! watch live. Each probe emits a [`TrackerEvent::KeyTrace`] for the
//! status display — that trace is part of the contract, not telemetry.
//!
//! State machine (per entity, driven by the tick task):
//!
//! ```text
//! Encrypted ──start()──► Decrypting ──┬─ profile parses ──► Decrypted (terminal)
//!                                     └─ key > difficulty ─► Failed    (terminal)
//! ```
//!
//! `cancel` aborts the tick task without touching entity state: an
//! abandoned search simply stays `Decrypting`, and since `start` refuses
//! anything but `Encrypted` there is no resume.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::cipher;
use crate::protocol::Profile;
use crate::registry::EntityRegistry;
use crate::session::TrackerEvent;

/// Default pause between key probes.
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

/// Drives at most one key search per entity.
pub struct KeyRecoveryEngine {
    registry: Arc<RwLock<EntityRegistry>>,
    events: mpsc::Sender<TrackerEvent>,
    tick: Duration,
    /// One live tick task per entity under search.
    searches: HashMap<String, JoinHandle<()>>,
}

impl KeyRecoveryEngine {
    pub fn new(registry: Arc<RwLock<EntityRegistry>>, events: mpsc::Sender<TrackerEvent>) -> Self {
        Self::with_tick(registry, events, DEFAULT_TICK)
    }

    /// Engine with a custom tick interval (tests run faster than 50ms).
    pub fn with_tick(
        registry: Arc<RwLock<EntityRegistry>>,
        events: mpsc::Sender<TrackerEvent>,
        tick: Duration,
    ) -> Self {
        Self {
            registry,
            events,
            tick,
            searches: HashMap::new(),
        }
    }

    /// Begin the search for `id`.
    ///
    /// No-op unless the entity is currently `Encrypted`; the transition
    /// to `Decrypting` and the spawn of the tick task happen together,
    /// and any stale task for the same id is aborted first, so two
    /// searches can never run concurrently for one entity.
    pub async fn start(&mut self, id: &str) -> bool {
        let (payload, difficulty) = {
            let mut registry = self.registry.write().await;
            if !registry.begin_recovery(id) {
                log::debug!("recovery start refused for {id} (not in Encrypted state)");
                return false;
            }
            match registry.recovery_params(id) {
                Some(params) => params,
                None => return false,
            }
        };

        if let Some(stale) = self.searches.remove(id) {
            stale.abort();
        }
        log::info!("starting key search for {id} (difficulty {difficulty})");
        let handle = tokio::spawn(search_task(
            self.registry.clone(),
            self.events.clone(),
            id.to_string(),
            payload,
            difficulty,
            self.tick,
        ));
        self.searches.insert(id.to_string(), handle);
        true
    }

    /// Abort the search for `id` immediately: no further tick fires.
    ///
    /// Entity state is left as-is (`Decrypting`); cancellation is a
    /// caller decision, not a `Failed` transition.
    pub fn cancel(&mut self, id: &str) -> bool {
        match self.searches.remove(id) {
            Some(handle) => {
                handle.abort();
                log::info!("key search for {id} cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether a tick task for `id` is still live.
    pub fn is_searching(&self, id: &str) -> bool {
        self.searches.get(id).is_some_and(|h| !h.is_finished())
    }

    /// Abort every live search (session teardown).
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.searches.drain() {
            handle.abort();
        }
    }
}

impl Drop for KeyRecoveryEngine {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// One probe per tick, keys strictly increasing from 0.
async fn search_task(
    registry: Arc<RwLock<EntityRegistry>>,
    events: mpsc::Sender<TrackerEvent>,
    id: String,
    payload: String,
    difficulty: u32,
    tick: Duration,
) {
    let mut interval = tokio::time::interval(tick);
    let mut key: u32 = 0;
    loop {
        interval.tick().await;

        if key > difficulty {
            registry.write().await.fail_recovery(&id);
            let _ = events.send(TrackerEvent::RecoveryFailed { id: id.clone() }).await;
            return;
        }

        let key_byte = (key & 0xFF) as u8;
        let text = cipher::xor_decrypt(&payload, key_byte);
        let _ = events
            .send(TrackerEvent::KeyTrace {
                id: id.clone(),
                key,
                text: text.clone(),
            })
            .await;

        if text.starts_with('{') {
            if let Ok(profile) = serde_json::from_str::<Profile>(&text) {
                registry
                    .write()
                    .await
                    .complete_recovery(&id, key_byte, profile.clone());
                let _ = events
                    .send(TrackerEvent::KeyRecovered {
                        id: id.clone(),
                        key: key_byte,
                        profile,
                    })
                    .await;
                return;
            }
        }
        key += 1;
    }
}
