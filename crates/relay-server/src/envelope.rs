//! Wire envelope: `{"message": ..., "timestamp": ...}`.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One outbound relay message.
///
/// The timestamp is assigned once at construction, so every recipient of a
/// broadcast sees the same value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Relayed text, verbatim.
    pub message: String,
    /// ISO-8601 UTC time the server built this envelope.
    pub timestamp: String,
}

impl Envelope {
    /// Build an envelope stamped with the current time.
    pub fn now(message: impl Into<String>) -> Self {
        Self::at(message, Utc::now())
    }

    /// Build an envelope stamped with `at`.
    pub fn at(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            timestamp: iso_timestamp(at),
        }
    }

    /// Serialize once for fan-out; recipients share the same buffer.
    pub fn to_frame(&self) -> serde_json::Result<Arc<String>> {
        serde_json::to_string(self).map(Arc::new)
    }
}

/// Format like JavaScript's `Date.toISOString()`: millisecond precision, `Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
