//! # Event Sink
//!
//! Fire-and-forget activity / webhook events. The core never waits for
//! delivery and never retries.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// Kinds of events emitted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A place was created
    PlaceAdded,
    /// A place was removed
    PlaceRemoved,
    /// An account joined a place
    MemberJoined,
    /// A keyholder became a creator
    MemberPromoted,
    /// A creator became a keyholder
    MemberDemoted,
    /// An account left or was removed from a place
    MemberRemoved,
}

impl EventKind {
    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PlaceAdded => "place_added",
            EventKind::PlaceRemoved => "place_removed",
            EventKind::MemberJoined => "member_joined",
            EventKind::MemberPromoted => "member_promoted",
            EventKind::MemberDemoted => "member_demoted",
            EventKind::MemberRemoved => "member_removed",
        }
    }
}

/// An emitted event.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// What happened
    pub kind: EventKind,
    /// Event-specific JSON payload
    pub payload: Value,
    /// Emission time (Unix millis)
    pub timestamp: i64,
}

/// Activity / webhook collaborator.
pub trait EventSink: Send + Sync {
    /// Hand an event off. Must not block.
    fn emit(&self, kind: EventKind, payload: Value);
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, kind: EventKind, payload: Value) {
        tracing::debug!(event = kind.as_str(), %payload, "Event emitted");
    }
}

/// Sink that forwards events over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    /// Create a sink and the receiving half of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, kind: EventKind, payload: Value) {
        let event = Event {
            kind,
            payload,
            timestamp: crate::time::now_timestamp_millis(),
        };
        // A dropped receiver just means nobody is listening
        if self.tx.send(event).is_err() {
            tracing::debug!(event = kind.as_str(), "Event dropped, no receiver");
        }
    }
}
