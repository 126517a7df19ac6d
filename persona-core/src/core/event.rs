// persona-core/src/core/event.rs
// ============================================================================
// Module: Persona Events
// Description: Behavioral and identity events posted by applications.
// Purpose: Define the append-only event record and its admission checks.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Events are the sole write input to the service and are never mutated after
//! insert. The validator normalizes the event type and name to lowercase and
//! rejects events that do not carry a profile identifier. Schema validation of
//! `properties` is intentionally not part of the admission path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde_json::Value;

use crate::core::error::ServiceError;
use crate::core::identifiers::AppId;
use crate::core::identifiers::EventId;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::ProfileId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Event Type
// ============================================================================

/// Closed set of admitted event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Behavioral interaction event.
    Track,
    /// Identity assertion event.
    Identify,
    /// Page view event.
    Page,
}

impl EventType {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Identify => "identify",
            Self::Page => "page",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "track" => Ok(Self::Track),
            "identify" => Ok(Self::Identify),
            "page" => Ok(Self::Page),
            other => Err(ServiceError::InvalidEvent(format!("unknown event_type: {other}"))),
        }
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Event Record
// ============================================================================

/// Append-only event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier; generated at ingestion when absent.
    #[serde(default)]
    pub event_id: EventId,
    /// Profile the event is posted against.
    pub profile_id: ProfileId,
    /// Application that emitted the event.
    #[serde(default)]
    pub app_id: AppId,
    /// Organization the application belongs to.
    #[serde(default)]
    pub org_id: OrgId,
    /// Event type (track, identify, page).
    pub event_type: EventType,
    /// Event name, lowercased on admission.
    pub event_name: String,
    /// Event time in epoch seconds.
    pub event_timestamp: Timestamp,
    /// Free-form event properties.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Free-form device and environment context.
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
}

impl Event {
    /// Normalizes the event in place: lowercases the event name and assigns
    /// an event identifier when the caller did not provide one.
    pub fn normalize(&mut self) {
        self.event_name.make_ascii_lowercase();
        if self.event_id.is_empty() {
            self.event_id = EventId::generate();
        }
    }

    /// Admission check for incoming events.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidEvent`] when the profile identifier is
    /// missing or the event name is empty.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.profile_id.is_empty() {
            return Err(ServiceError::InvalidEvent("profile_id is required".to_string()));
        }
        if self.event_name.is_empty() {
            return Err(ServiceError::InvalidEvent("event_name is required".to_string()));
        }
        Ok(())
    }

    /// Returns a property value by name, shallow lookup only.
    #[must_use]
    pub fn property(&self, field: &str) -> Option<&Value> {
        self.properties.get(field)
    }

    /// Renders the event as a JSON document for filter evaluation.
    #[must_use]
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
