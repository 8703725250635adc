//! Presence event protocol
//!
//! Presence travels as a custom event with a single well-known key:
//!
//! ```json
//! { "presence_detected": true }
//! ```
//!
//! Older peers send the value as a string, so `"true"` and `"1"` are accepted
//! as `true` (case-sensitive). Everything else, including `"false"`, `"0"`
//! and a missing key, is skipped rather than treated as an error: the event
//! channel is shared with unrelated traffic.
//!
//! ```rust
//! use serde_json::json;
//! use voicebox_presence_core::presence::{decode_presence, encode_presence, PresenceDecode};
//!
//! let payload = encode_presence(true);
//! assert_eq!(decode_presence(&payload), PresenceDecode::Present(true));
//!
//! let legacy = json!({ "presence_detected": "1" });
//! assert_eq!(decode_presence(legacy.as_object().unwrap()), PresenceDecode::Present(true));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transport::EventPayload;

/// Key carrying the presence flag in a custom event
pub const PRESENCE_KEY: &str = "presence_detected";

/// A payload value classified at the boundary
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue<'a> {
    /// JSON boolean
    Bool(bool),
    /// JSON string
    String(&'a str),
    /// Any other JSON value (number, null, array, object)
    Other(&'a Value),
}

impl<'a> From<&'a Value> for EventValue<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Bool(b) => EventValue::Bool(*b),
            Value::String(s) => EventValue::String(s.as_str()),
            other => EventValue::Other(other),
        }
    }
}

/// Why an event did not yield a presence value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The payload has no presence key
    MissingKey,
    /// The presence key holds a string other than "true" or "1"
    UnrecognizedString,
    /// The presence key holds neither a boolean nor a string
    UnsupportedType,
}

/// Outcome of decoding a custom event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceDecode {
    /// The event carried a presence value
    Present(bool),
    /// The event is not a presence event we understand
    Skip(SkipReason),
}

impl PresenceDecode {
    /// The decoded value, if any
    pub fn value(self) -> Option<bool> {
        match self {
            PresenceDecode::Present(v) => Some(v),
            PresenceDecode::Skip(_) => None,
        }
    }
}

/// Decode the presence flag from a custom event payload
pub fn decode_presence(payload: &EventPayload) -> PresenceDecode {
    let Some(raw) = payload.get(PRESENCE_KEY) else {
        return PresenceDecode::Skip(SkipReason::MissingKey);
    };

    match EventValue::from(raw) {
        EventValue::Bool(b) => PresenceDecode::Present(b),
        EventValue::String("true") | EventValue::String("1") => PresenceDecode::Present(true),
        EventValue::String(_) => PresenceDecode::Skip(SkipReason::UnrecognizedString),
        EventValue::Other(_) => PresenceDecode::Skip(SkipReason::UnsupportedType),
    }
}

/// Build the payload announcing local presence
pub fn encode_presence(is_present: bool) -> EventPayload {
    let mut payload = EventPayload::new();
    payload.insert(PRESENCE_KEY.to_string(), Value::Bool(is_present));
    payload
}

/// Local and remote presence as seen by one endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Someone is in front of this device
    pub local: bool,
    /// Someone is in front of the peer device
    pub remote: bool,
}

impl PresenceRecord {
    /// Both sides see someone
    pub fn both_present(&self) -> bool {
        self.local && self.remote
    }
}
