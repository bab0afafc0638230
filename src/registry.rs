//! Authoritative registry of tracked submarines.
//!
//! The registry is the sole owner of all entity state: positions,
//! trajectories, pending fragment buffers, counters and decryption
//! results. Everything else (session, dispatcher, recovery engine) goes
//! through its mutation methods, which each complete under one lock
//! acquisition so no partial update is ever observable. Rendering
//! collaborators read through the accessors and never mutate.
//!
//! Reference: Kleppmann, Chapter 5 — Replication (single leader writes)

use std::collections::HashMap;

use crate::cipher;
use crate::fragments::{FragmentBuffer, FragmentOutcome};
use crate::morse;
use crate::protocol::{DetectedSubmarine, Position, Profile};

/// Placeholder shown for messages completed before the key is recovered.
pub const ENCRYPTED_PLACEHOLDER: &str = "[encrypted message]";

/// Decryption lifecycle of one submarine.
///
/// `Decrypted` and `Failed` are terminal; there is no automatic retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmarineState {
    Encrypted,
    Decrypting,
    Decrypted,
    Failed,
}

/// How a completed transmission is rendered.
///
/// All three representations are retained for every message, so the view
/// can be switched retroactively for historical traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    PlainText,
    Morse,
    Encrypted,
}

/// One fully reassembled transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptedMessage {
    /// Server-side timestamp identifying the message.
    pub timestamp: String,
    /// Decoded text, or [`ENCRYPTED_PLACEHOLDER`] if no key was held.
    pub plain: String,
    /// Morse form, or [`ENCRYPTED_PLACEHOLDER`] if no key was held.
    pub morse: String,
    /// The raw encrypted join, always retained.
    pub encrypted: String,
}

impl InterceptedMessage {
    /// The representation for the given view mode.
    pub fn view(&self, mode: ViewMode) -> &str {
        match mode {
            ViewMode::PlainText => &self.plain,
            ViewMode::Morse => &self.morse,
            ViewMode::Encrypted => &self.encrypted,
        }
    }
}

/// One tracked submarine.
#[derive(Debug, Clone)]
pub struct Submarine {
    /// Server-assigned identifier, immutable once created.
    pub id: String,
    pub state: SubmarineState,
    /// Latest known position; always the last element of `position_history`.
    pub position: Position,
    /// Append-only trajectory, never truncated.
    pub position_history: Vec<Position>,
    /// Static encrypted identity blob, used only by key recovery.
    pub encrypted_payload: String,
    /// Inclusive upper bound of the key search space.
    pub difficulty: u32,
    /// Recovered key; `Some` iff `state == Decrypted`.
    pub key: Option<u8>,
    /// Decrypted identity; `Some` iff `state == Decrypted`.
    pub profile: Option<Profile>,
    /// In-flight reassembly buffers, keyed by message timestamp.
    pub pending_fragments: HashMap<String, FragmentBuffer>,
    /// Completed transmissions, oldest first.
    pub messages: Vec<InterceptedMessage>,
    pub messages_received: u64,
    /// Total fragments ever received, duplicates included.
    pub packets_received: u64,
    /// Plain text of the most recent completed message.
    pub last_message: Option<String>,
}

impl Submarine {
    fn from_detection(sub: &DetectedSubmarine) -> Self {
        Self {
            id: sub.submarine_id.clone(),
            state: SubmarineState::Encrypted,
            position: sub.position,
            position_history: vec![sub.position],
            encrypted_payload: sub.encrypted_payload.clone(),
            difficulty: sub.encryption_difficulty,
            key: None,
            profile: None,
            pending_fragments: HashMap::new(),
            messages: Vec::new(),
            messages_received: 0,
            packets_received: 0,
            last_message: None,
        }
    }

    /// Display name: profile name once decrypted, otherwise the id.
    pub fn display_name(&self) -> &str {
        self.profile.as_ref().map_or(&self.id, |p| &p.name)
    }
}

/// The entity registry: submarine id → state.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    submarines: HashMap<String, Submarine>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ───────────────────────────────────────────────────────────────
    // Read access
    // ───────────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<&Submarine> {
        self.submarines.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.submarines.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.submarines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submarines.is_empty()
    }

    /// All tracked submarines, in no particular order.
    pub fn submarines(&self) -> impl Iterator<Item = &Submarine> {
        self.submarines.values()
    }

    // ───────────────────────────────────────────────────────────────
    // Mutation — every method is one atomic state change
    // ───────────────────────────────────────────────────────────────

    /// Register a newly detected submarine with an `Encrypted` initial
    /// state and its history seeded with the reported position.
    ///
    /// Idempotent: a re-detection of a known id is ignored and never
    /// resets accumulated history or counters. Returns `true` if the
    /// entity was actually created.
    pub fn insert_detected(&mut self, sub: &DetectedSubmarine) -> bool {
        if self.submarines.contains_key(&sub.submarine_id) {
            return false;
        }
        log::info!("new submarine detected: {}", sub.submarine_id);
        self.submarines
            .insert(sub.submarine_id.clone(), Submarine::from_detection(sub));
        true
    }

    /// Append a decrypted position to the entity's trajectory and make it
    /// the current position. No-op for unknown ids.
    pub fn apply_position(&mut self, id: &str, position: Position) -> bool {
        let Some(sub) = self.submarines.get_mut(id) else {
            return false;
        };
        sub.position = position;
        sub.position_history.push(position);
        true
    }

    /// Feed one fragment of a multi-part transmission.
    ///
    /// Unknown ids and out-of-range part numbers are no-ops (the latter
    /// not even counted). Every accepted fragment bumps the packet
    /// counter, duplicates included. On completion the buffer is
    /// destroyed, the message counter bumps, and the finished message is
    /// decoded (XOR + Morse) when a key is held — otherwise stored with
    /// the placeholder text, the encrypted join always retained.
    ///
    /// Returns the completed message, if this fragment was the last one.
    pub fn ingest_fragment(
        &mut self,
        id: &str,
        timestamp: &str,
        part_number: u32,
        total_parts: u32,
        fragment: &str,
    ) -> Option<InterceptedMessage> {
        let Some(sub) = self.submarines.get_mut(id) else {
            log::debug!("fragment for unknown submarine {id}, dropping");
            return None;
        };

        let buffer = sub
            .pending_fragments
            .entry(timestamp.to_string())
            .or_insert_with(|| FragmentBuffer::new(total_parts));

        match buffer.insert(part_number, fragment) {
            FragmentOutcome::Rejected => {
                log::debug!(
                    "fragment {part_number}/{} out of range for {id}, dropping",
                    buffer.total_parts()
                );
                if buffer.filled() == 0 {
                    // don't leak a buffer created by a bogus first fragment
                    sub.pending_fragments.remove(timestamp);
                }
                None
            }
            FragmentOutcome::Pending | FragmentOutcome::Duplicate => {
                sub.packets_received += 1;
                None
            }
            FragmentOutcome::Complete(encrypted) => {
                sub.packets_received += 1;
                sub.pending_fragments.remove(timestamp);
                sub.messages_received += 1;

                let message = match sub.key {
                    Some(key) => {
                        let morse_text = cipher::xor_decrypt(&encrypted, key);
                        let plain = morse::decode(&morse_text);
                        InterceptedMessage {
                            timestamp: timestamp.to_string(),
                            plain,
                            morse: morse_text,
                            encrypted,
                        }
                    }
                    None => InterceptedMessage {
                        timestamp: timestamp.to_string(),
                        plain: ENCRYPTED_PLACEHOLDER.to_string(),
                        morse: ENCRYPTED_PLACEHOLDER.to_string(),
                        encrypted,
                    },
                };
                sub.last_message = Some(message.plain.clone());
                sub.messages.push(message.clone());
                Some(message)
            }
        }
    }

    /// Arm the key search: `Encrypted` → `Decrypting`.
    ///
    /// Returns `false` (and changes nothing) from any other state; the
    /// terminal states and an already-running search are never restarted.
    pub fn begin_recovery(&mut self, id: &str) -> bool {
        match self.submarines.get_mut(id) {
            Some(sub) if sub.state == SubmarineState::Encrypted => {
                sub.state = SubmarineState::Decrypting;
                true
            }
            _ => false,
        }
    }

    /// Parameters the key search needs: (identity payload, difficulty).
    pub fn recovery_params(&self, id: &str) -> Option<(String, u32)> {
        self.submarines
            .get(id)
            .map(|s| (s.encrypted_payload.clone(), s.difficulty))
    }

    /// Record a successful search: key, profile and the `Decrypted` state
    /// land in the same mutation, keeping the both-or-neither invariant.
    pub fn complete_recovery(&mut self, id: &str, key: u8, profile: Profile) -> bool {
        let Some(sub) = self.submarines.get_mut(id) else {
            return false;
        };
        log::info!("key {key} recovered for {id} ({})", profile.name);
        sub.state = SubmarineState::Decrypted;
        sub.key = Some(key);
        sub.profile = Some(profile);
        true
    }

    /// Record an exhausted search: terminal `Failed`, no retry.
    pub fn fail_recovery(&mut self, id: &str) -> bool {
        let Some(sub) = self.submarines.get_mut(id) else {
            return false;
        };
        log::warn!("key recovery failed for {id} (search space exhausted)");
        sub.state = SubmarineState::Failed;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(id: &str) -> DetectedSubmarine {
        DetectedSubmarine {
            submarine_id: id.to_string(),
            position: Position { lat: 1.0, long: 2.0 },
            encrypted_payload: cipher::xor_encrypt("{}", 3),
            encryption_difficulty: 10,
        }
    }

    #[test]
    fn test_insert_detected_idempotent() {
        let mut reg = EntityRegistry::new();
        assert!(reg.insert_detected(&detection("SUB-1")));
        reg.apply_position("SUB-1", Position { lat: 5.0, long: 6.0 });

        // re-detection must not reset history
        assert!(!reg.insert_detected(&detection("SUB-1")));
        let sub = reg.get("SUB-1").unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(sub.position_history.len(), 2);
        assert_eq!(sub.position.lat, 5.0);
    }

    #[test]
    fn test_new_submarine_initial_state() {
        let mut reg = EntityRegistry::new();
        reg.insert_detected(&detection("SUB-1"));
        let sub = reg.get("SUB-1").unwrap();
        assert_eq!(sub.state, SubmarineState::Encrypted);
        assert_eq!(sub.position_history, vec![sub.position]);
        assert!(sub.key.is_none());
        assert!(sub.profile.is_none());
        assert_eq!(sub.display_name(), "SUB-1");
    }

    #[test]
    fn test_history_ends_with_position() {
        let mut reg = EntityRegistry::new();
        reg.insert_detected(&detection("SUB-1"));
        for i in 0..5 {
            let p = Position { lat: f64::from(i), long: 0.0 };
            reg.apply_position("SUB-1", p);
            let sub = reg.get("SUB-1").unwrap();
            assert_eq!(*sub.position_history.last().unwrap(), sub.position);
        }
    }

    #[test]
    fn test_apply_position_unknown_id() {
        let mut reg = EntityRegistry::new();
        assert!(!reg.apply_position("ghost", Position { lat: 0.0, long: 0.0 }));
    }

    #[test]
    fn test_fragment_flow_without_key() {
        let mut reg = EntityRegistry::new();
        reg.insert_detected(&detection("SUB-1"));

        assert!(reg.ingest_fragment("SUB-1", "t1", 2, 2, "BB").is_none());
        let done = reg.ingest_fragment("SUB-1", "t1", 1, 2, "AA").unwrap();
        assert_eq!(done.encrypted, "AABB");
        assert_eq!(done.plain, ENCRYPTED_PLACEHOLDER);
        assert_eq!(done.morse, ENCRYPTED_PLACEHOLDER);

        let sub = reg.get("SUB-1").unwrap();
        assert_eq!(sub.packets_received, 2);
        assert_eq!(sub.messages_received, 1);
        assert!(sub.pending_fragments.is_empty());
        assert_eq!(sub.last_message.as_deref(), Some(ENCRYPTED_PLACEHOLDER));
        assert_eq!(sub.messages.len(), 1);
    }

    #[test]
    fn test_fragment_flow_with_key() {
        let key = 7u8;
        let mut reg = EntityRegistry::new();
        reg.insert_detected(&detection("SUB-1"));
        reg.begin_recovery("SUB-1");
        reg.complete_recovery(
            "SUB-1",
            key,
            Profile {
                name: "Nautilus".into(),
                country: "FR".into(),
                captain: "Nemo".into(),
                kind: "attack".into(),
                color: "#0f0".into(),
            },
        );

        // ".... --- .-.. .-" split into two encrypted fragments
        let part1 = cipher::xor_encrypt(".... --- ", key);
        let part2 = cipher::xor_encrypt(".-.. .-", key);
        reg.ingest_fragment("SUB-1", "t1", 1, 2, &part1);
        let done = reg.ingest_fragment("SUB-1", "t1", 2, 2, &part2).unwrap();

        assert_eq!(done.plain, "HOLA");
        assert_eq!(done.view(ViewMode::PlainText), "HOLA");
        assert_eq!(done.view(ViewMode::Encrypted), done.encrypted);
        let sub = reg.get("SUB-1").unwrap();
        assert_eq!(sub.last_message.as_deref(), Some("HOLA"));
    }

    #[test]
    fn test_duplicate_fragment_counts_packet_once_per_delivery() {
        let mut reg = EntityRegistry::new();
        reg.insert_detected(&detection("SUB-1"));
        reg.ingest_fragment("SUB-1", "t1", 1, 3, "a");
        reg.ingest_fragment("SUB-1", "t1", 1, 3, "a"); // duplicate
        let sub = reg.get("SUB-1").unwrap();
        // duplicates count toward traffic volume but fill no slot
        assert_eq!(sub.packets_received, 2);
        assert_eq!(sub.pending_fragments["t1"].filled(), 1);
    }

    #[test]
    fn test_out_of_range_fragment_not_counted() {
        let mut reg = EntityRegistry::new();
        reg.insert_detected(&detection("SUB-1"));
        reg.ingest_fragment("SUB-1", "t1", 5, 3, "x");
        let sub = reg.get("SUB-1").unwrap();
        assert_eq!(sub.packets_received, 0);
        assert!(sub.pending_fragments.is_empty());
    }

    #[test]
    fn test_fragment_unknown_id_noop() {
        let mut reg = EntityRegistry::new();
        assert!(reg.ingest_fragment("ghost", "t1", 1, 1, "x").is_none());
    }

    #[test]
    fn test_concurrent_messages_keyed_by_timestamp() {
        let mut reg = EntityRegistry::new();
        reg.insert_detected(&detection("SUB-1"));
        reg.ingest_fragment("SUB-1", "t1", 1, 2, "1a");
        reg.ingest_fragment("SUB-1", "t2", 1, 2, "2a");
        let done = reg.ingest_fragment("SUB-1", "t2", 2, 2, "2b").unwrap();
        assert_eq!(done.encrypted, "2a2b");
        // t1 still pending
        assert_eq!(reg.get("SUB-1").unwrap().pending_fragments.len(), 1);
    }

    #[test]
    fn test_recovery_state_machine_gates() {
        let mut reg = EntityRegistry::new();
        reg.insert_detected(&detection("SUB-1"));

        assert!(reg.begin_recovery("SUB-1"));
        // Decrypting is not restartable
        assert!(!reg.begin_recovery("SUB-1"));

        reg.fail_recovery("SUB-1");
        assert_eq!(reg.get("SUB-1").unwrap().state, SubmarineState::Failed);
        // Failed is terminal
        assert!(!reg.begin_recovery("SUB-1"));
    }

    #[test]
    fn test_key_and_profile_both_or_neither() {
        let mut reg = EntityRegistry::new();
        reg.insert_detected(&detection("SUB-1"));
        let sub = reg.get("SUB-1").unwrap();
        assert_eq!(sub.key.is_some(), sub.profile.is_some());

        reg.begin_recovery("SUB-1");
        reg.complete_recovery(
            "SUB-1",
            3,
            Profile {
                name: "N".into(),
                country: "C".into(),
                captain: "X".into(),
                kind: "t".into(),
                color: "#fff".into(),
            },
        );
        let sub = reg.get("SUB-1").unwrap();
        assert_eq!(sub.state, SubmarineState::Decrypted);
        assert!(sub.key.is_some() && sub.profile.is_some());
        assert_eq!(sub.display_name(), "N");
    }
}
