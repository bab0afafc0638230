//! JSON wire protocol for the tracking channel.
//!
//! Every frame is a `{ "type": ..., "payload": ... }` envelope. The three
//! inbound kinds and the single outbound kind are typed enums so dispatch
//! is an exhaustive match instead of a string switch; unrecognized tags
//! fold into [`ServerMessage::Unknown`] and are dropped by the
//! dispatcher, regardless of what payload they carry.
//!
//! ```text
//! ┌──────────────────────────────┐        ┌─────────────────────────┐
//! │ PING_RESPONSE                │        │ PING_REQUEST            │
//! │ SUBMARINE_UPDATE             │ ◄────► │ { coordinates }         │
//! │ COMMUNICATION_INTERCEPTED    │  wire  └─────────────────────────┘
//! └──────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

/// Geographic position as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub long: f64,
}

/// Decrypted identity record of a submarine.
///
/// Only obtainable by recovering the entity's key; `type` on the wire is
/// renamed to avoid the keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub country: String,
    pub captain: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub color: String,
}

/// One submarine in a `PING_RESPONSE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedSubmarine {
    pub submarine_id: String,
    pub position: Position,
    pub encrypted_payload: String,
    pub encryption_difficulty: u32,
}

/// `PING_RESPONSE` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub detected_submarines: Vec<DetectedSubmarine>,
}

/// `SUBMARINE_UPDATE` payload; `encrypted_payload` decrypts to a
/// [`TrackUpdate`] once the entity's key is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmarineUpdate {
    pub submarine_id: String,
    pub encrypted_payload: String,
}

/// Decrypted body of a `SUBMARINE_UPDATE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackUpdate {
    pub position: Coordinates,
}

/// Latitude/longitude pair used by track updates and outbound pings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// `COMMUNICATION_INTERCEPTED` payload: one fragment of a multi-part
/// Morse transmission. `package_number` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationIntercepted {
    pub submarine_id: String,
    pub timestamp: String,
    pub package_number: u32,
    pub total_packages: u32,
    pub encrypted_payload: String,
}

/// Inbound message envelope.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    PingResponse(PingResponse),
    SubmarineUpdate(SubmarineUpdate),
    CommunicationIntercepted(CommunicationIntercepted),
    /// Any tag this client does not understand, whatever its payload.
    Unknown,
}

/// Envelope decoded in two stages: the tag first, then the payload for
/// tags this client knows. A one-step adjacently tagged enum cannot do
/// this, since an unrecognized tag still carries a payload map it would
/// have to swallow.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    tag: String,
    #[serde(default)]
    payload: serde_json::Value,
}

fn payload<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

impl ServerMessage {
    /// Parse one inbound frame. A malformed envelope or a malformed
    /// payload for a known tag both fail here; the caller drops the
    /// frame. Unrecognized tags succeed as [`ServerMessage::Unknown`].
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Ok(match envelope.tag.as_str() {
            "PING_RESPONSE" => Self::PingResponse(payload(envelope.payload)?),
            "SUBMARINE_UPDATE" => Self::SubmarineUpdate(payload(envelope.payload)?),
            "COMMUNICATION_INTERCEPTED" => {
                Self::CommunicationIntercepted(payload(envelope.payload)?)
            }
            _ => Self::Unknown,
        })
    }
}

/// Outbound message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "PING_REQUEST")]
    PingRequest { coordinates: Coordinates },
}

impl ClientMessage {
    /// Build a sonar ping request for the given location.
    pub fn ping(latitude: f64, longitude: f64) -> Self {
        Self::PingRequest {
            coordinates: Coordinates {
                latitude,
                longitude,
            },
        }
    }

    /// Serialize to the JSON wire format.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    /// JSON that does not fit the envelope or a known payload shape.
    Malformed(String),
    /// The channel is gone (or was never opened).
    ConnectionClosed,
    /// `open` was called without a session token.
    MissingToken,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed message: {e}"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::MissingToken => write!(f, "no session token held"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ping_response() {
        let raw = r#"{
            "type": "PING_RESPONSE",
            "payload": { "detected_submarines": [
                { "submarine_id": "SUB-1",
                  "position": { "lat": -33.0, "long": -71.6 },
                  "encrypted_payload": "AAEC",
                  "encryption_difficulty": 50 }
            ]}
        }"#;
        let msg = ServerMessage::decode(raw).unwrap();
        match msg {
            ServerMessage::PingResponse(p) => {
                assert_eq!(p.detected_submarines.len(), 1);
                let sub = &p.detected_submarines[0];
                assert_eq!(sub.submarine_id, "SUB-1");
                assert_eq!(sub.position.lat, -33.0);
                assert_eq!(sub.encryption_difficulty, 50);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_decode_submarine_update() {
        let raw = r#"{ "type": "SUBMARINE_UPDATE",
                       "payload": { "submarine_id": "SUB-2", "encrypted_payload": "Zm9v" } }"#;
        let msg = ServerMessage::decode(raw).unwrap();
        assert!(matches!(msg, ServerMessage::SubmarineUpdate(u) if u.submarine_id == "SUB-2"));
    }

    #[test]
    fn test_decode_communication() {
        let raw = r#"{ "type": "COMMUNICATION_INTERCEPTED",
                       "payload": { "submarine_id": "SUB-3",
                                    "timestamp": "2026-08-29T12:00:00Z",
                                    "package_number": 2,
                                    "total_packages": 3,
                                    "encrypted_payload": "YmFy" } }"#;
        match ServerMessage::decode(raw).unwrap() {
            ServerMessage::CommunicationIntercepted(c) => {
                assert_eq!(c.package_number, 2);
                assert_eq!(c.total_packages, 3);
                assert_eq!(c.timestamp, "2026-08-29T12:00:00Z");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tag_folds_to_unknown() {
        // Whatever the payload looks like, an unrecognized tag is not an error
        for raw in [
            r#"{ "type": "SONAR_SWEEP", "payload": {} }"#,
            r#"{ "type": "SONAR_SWEEP", "payload": { "depth": 120, "bearing": 270 } }"#,
            r#"{ "type": "SONAR_SWEEP" }"#,
        ] {
            assert!(matches!(
                ServerMessage::decode(raw).unwrap(),
                ServerMessage::Unknown
            ));
        }
    }

    #[test]
    fn test_malformed_payload_is_error() {
        // Known tag, wrong payload shape: the whole frame is rejected
        let raw = r#"{ "type": "SUBMARINE_UPDATE", "payload": { "bogus": 1 } }"#;
        assert!(ServerMessage::decode(raw).is_err());
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(ServerMessage::decode("not json").is_err());
    }

    #[test]
    fn test_ping_request_encoding() {
        let encoded = ClientMessage::ping(-33.456, -70.648).encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], "PING_REQUEST");
        assert_eq!(value["payload"]["coordinates"]["latitude"], -33.456);
        assert_eq!(value["payload"]["coordinates"]["longitude"], -70.648);
    }

    #[test]
    fn test_profile_type_field_rename() {
        let raw = r##"{ "name": "Nautilus", "country": "FR", "captain": "Nemo",
                        "type": "attack", "color": "#00ff00" }"##;
        let profile: Profile = serde_json::from_str(raw).unwrap();
        assert_eq!(profile.kind, "attack");
        let back = serde_json::to_value(&profile).unwrap();
        assert_eq!(back["type"], "attack");
    }

    #[test]
    fn test_decrypted_track_shape() {
        let raw = r#"{ "position": { "latitude": 10.5, "longitude": -20.25 } }"#;
        let track: TrackUpdate = serde_json::from_str(raw).unwrap();
        assert_eq!(track.position.latitude, 10.5);
        assert_eq!(track.position.longitude, -20.25);
    }
}
