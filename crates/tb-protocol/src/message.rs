//! Message types for the taskboard notification protocol
//!
//! Every record on the wire is one [`Message`] envelope. The envelope carries
//! a protocol version, a kind, and at most one payload:
//!
//! | kind        | payload                      | direction        |
//! |-------------|------------------------------|------------------|
//! | `event`     | [`Event`]                    | both             |
//! | `subscribe` | [`SubscribeRequest`]         | client → daemon  |
//! | `ping`      | none                         | daemon → client  |
//! | `pong`      | [`Event`] of type `pong`     | client → daemon  |
//!
//! # Compatibility
//!
//! Receivers never fail a decode because of the `version` field. A nonzero
//! version different from [`PROTOCOL_VERSION`] is reported through
//! [`Message::has_foreign_version`] so the caller can log it. Kinds and event
//! types this build does not know decode as `Unknown` rather than erroring.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::scope::ScopeId;

/// Protocol version emitted by this build
pub const PROTOCOL_VERSION: i64 = 1;

/// Envelope kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Change notification
    Event,
    /// Scope filter request
    Subscribe,
    /// Keepalive probe from the daemon
    Ping,
    /// Keepalive reply from the client
    Pong,
    /// Any kind this build does not understand
    #[serde(other)]
    Unknown,
}

impl MessageKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Event => "event",
            MessageKind::Subscribe => "subscribe",
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event type carried inside an [`Event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Something in the board database changed
    DatabaseChanged,
    /// Keepalive probe
    Ping,
    /// Keepalive reply
    Pong,
    /// Any type this build does not understand
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::DatabaseChanged => write!(f, "database_changed"),
            EventType::Ping => write!(f, "ping"),
            EventType::Pong => write!(f, "pong"),
            EventType::Unknown => write!(f, "unknown"),
        }
    }
}

/// A change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// What happened
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Affected scope (`ScopeId::ALL` for every scope)
    #[serde(default)]
    pub scope_id: ScopeId,
    /// Unix timestamp in milliseconds
    #[serde(default)]
    pub occurred_at: u64,
    /// Daemon-assigned sequence number, zero when unassigned
    #[serde(default)]
    pub sequence: i64,
}

impl Event {
    /// Create an unsequenced event
    pub fn new(event_type: EventType, scope_id: ScopeId, occurred_at: u64) -> Self {
        Self {
            event_type,
            scope_id,
            occurred_at,
            sequence: 0,
        }
    }

    /// Create a `database_changed` event for a scope
    pub fn database_changed(scope_id: ScopeId, occurred_at: u64) -> Self {
        Self::new(EventType::DatabaseChanged, scope_id, occurred_at)
    }

    /// Attach a sequence number
    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.sequence = sequence;
        self
    }
}

/// Request to narrow which scopes the daemon forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Scope to follow, `ScopeId::ALL` for everything
    #[serde(default)]
    pub scope_id: ScopeId,
}

/// Wire envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Protocol version of the sender (zero when omitted)
    #[serde(default, deserialize_with = "any_version")]
    pub version: i64,
    /// Envelope kind
    pub kind: MessageKind,
    /// Event payload, present for `event` and `pong`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    /// Subscription payload, present for `subscribe`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<SubscribeRequest>,
}

impl Message {
    fn envelope(kind: MessageKind) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            kind,
            event: None,
            subscribe: None,
        }
    }

    /// Wrap an event
    pub fn event(event: Event) -> Self {
        Self {
            event: Some(event),
            ..Self::envelope(MessageKind::Event)
        }
    }

    /// Build a subscription request
    pub fn subscribe(scope_id: ScopeId) -> Self {
        Self {
            subscribe: Some(SubscribeRequest { scope_id }),
            ..Self::envelope(MessageKind::Subscribe)
        }
    }

    /// Build a keepalive probe
    pub fn ping() -> Self {
        Self::envelope(MessageKind::Ping)
    }

    /// Build a keepalive reply
    pub fn pong(occurred_at: u64) -> Self {
        Self {
            event: Some(Event::new(EventType::Pong, ScopeId::ALL, occurred_at)),
            ..Self::envelope(MessageKind::Pong)
        }
    }

    /// Whether the sender speaks a different, explicitly stated version
    pub fn has_foreign_version(&self) -> bool {
        self.version != 0 && self.version != PROTOCOL_VERSION
    }

    /// Take the event payload, failing if the envelope has none
    pub fn into_event(self) -> Result<Event, ProtocolError> {
        self.event
            .ok_or(ProtocolError::MissingPayload { kind: "event" })
    }

    /// Get the subscription payload, failing if the envelope has none
    pub fn subscribe_request(&self) -> Result<SubscribeRequest, ProtocolError> {
        self.subscribe
            .ok_or(ProtocolError::MissingPayload { kind: "subscribe" })
    }
}

/// Accept any JSON number (or null) as a version, saturating out-of-range values
fn any_version<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct VersionVisitor;

    impl<'de> serde::de::Visitor<'de> for VersionVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("an integer protocol version")
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<i64, E> {
            Ok(i64::try_from(v).unwrap_or(i64::MAX))
        }

        fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<i64, E> {
            // `as` saturates and maps NaN to 0
            Ok(v as i64)
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<i64, E> {
            Ok(0)
        }
    }

    deserializer.deserialize_any(VersionVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_envelope_serialization() {
        let msg = Message::event(Event::database_changed(ScopeId::new(3), 1_700_000_000_000));
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"kind\":\"event\""));
        assert!(json.contains("\"type\":\"database_changed\""));
        assert!(json.contains("\"scope_id\":3"));
        assert!(!json.contains("subscribe"));
    }

    #[test]
    fn test_subscribe_envelope_has_only_subscribe_payload() {
        let msg = Message::subscribe(ScopeId::new(9));
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["kind"], "subscribe");
        assert_eq!(value["subscribe"]["scope_id"], 9);
        assert!(value.get("event").is_none());
    }

    #[test]
    fn test_unknown_kind_decodes() {
        let msg: Message = serde_json::from_str(r#"{"version":1,"kind":"resync"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Unknown);
    }

    #[test]
    fn test_unknown_event_type_decodes() {
        let msg: Message = serde_json::from_str(
            r#"{"version":1,"kind":"event","event":{"type":"column_moved","scope_id":2,"sequence":5}}"#,
        )
        .unwrap();

        let event = msg.into_event().unwrap();
        assert_eq!(event.event_type, EventType::Unknown);
        assert_eq!(event.sequence, 5);
        assert_eq!(event.occurred_at, 0);
    }

    #[test]
    fn test_foreign_version_is_tolerated() {
        let msg: Message = serde_json::from_str(r#"{"version":7,"kind":"ping"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Ping);
        assert!(msg.has_foreign_version());

        let legacy: Message = serde_json::from_str(r#"{"kind":"ping"}"#).unwrap();
        assert_eq!(legacy.version, 0);
        assert!(!legacy.has_foreign_version());
        assert!(!Message::ping().has_foreign_version());
    }

    #[test]
    fn test_out_of_range_versions_still_decode() {
        let negative: Message = serde_json::from_str(r#"{"version":-1,"kind":"ping"}"#).unwrap();
        assert_eq!(negative.version, -1);
        assert!(negative.has_foreign_version());

        let huge: Message =
            serde_json::from_str(r#"{"version":18446744073709551615,"kind":"ping"}"#).unwrap();
        assert_eq!(huge.version, i64::MAX);
        assert!(huge.has_foreign_version());

        let beyond: Message =
            serde_json::from_str(r#"{"version":1e30,"kind":"subscribe","subscribe":{"scope_id":4}}"#)
                .unwrap();
        assert_eq!(beyond.kind, MessageKind::Subscribe);
        assert!(beyond.has_foreign_version());

        let null: Message = serde_json::from_str(r#"{"version":null,"kind":"pong"}"#).unwrap();
        assert_eq!(null.version, 0);
    }

    #[test]
    fn test_event_kind_without_payload() {
        let msg: Message = serde_json::from_str(r#"{"version":1,"kind":"event"}"#).unwrap();
        assert!(matches!(
            msg.into_event(),
            Err(ProtocolError::MissingPayload { kind: "event" })
        ));
    }

    #[test]
    fn test_pong_carries_pong_event() {
        let msg = Message::pong(42);
        assert_eq!(msg.kind, MessageKind::Pong);
        let event = msg.into_event().unwrap();
        assert_eq!(event.event_type, EventType::Pong);
        assert_eq!(event.occurred_at, 42);
        assert_eq!(event.sequence, 0);
    }
}
