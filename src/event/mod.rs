// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Server-push event stream of the bridge.
//!
//! The bridge exposes a server-sent-event endpoint at
//! `/eventstream/clip/v2` that delivers batched state-change
//! notifications. This module owns the persistent connection per bridge,
//! reconnects after drops with a constant backoff, and fans decoded
//! events out to every registered handler.
//!
//! # Usage
//!
//! Sessions are obtained through [`Bridge::event_stream`]:
//!
//! ```no_run
//! use std::time::Duration;
//!
//! # async fn example() -> huelink::Result<()> {
//! let bridges = huelink::discover(Duration::from_secs(2)).await?;
//! let bridge = &bridges[0];
//! bridge.set_application_key("stored-username");
//!
//! let stream = bridge.event_stream()?;
//! stream.register(|event| {
//!     println!("{}: {}", event.event_type, event);
//! });
//!
//! // Later: tear down the background connection.
//! stream.close();
//! # Ok(())
//! # }
//! ```
//!
//! [`Bridge::event_stream`]: crate::Bridge::event_stream

mod sse;
mod stream;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use stream::{EventStream, StreamConfig, SubscriptionId};

/// One state-change notification from the bridge.
///
/// The payload fragments in [`data`](Self::data) depend on the resource
/// type and are passed through as opaque JSON; modeling them is out of
/// scope for this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event id, e.g. `55fa0608-926b-440d-9e5a-081d8f27445b`.
    pub id: String,
    /// Event type tag, e.g. `update`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Creation timestamp, e.g. `2022-09-04T10:42:44Z`.
    #[serde(rename = "creationtime")]
    pub creation_time: DateTime<Utc>,
    /// Opaque payload fragments, one per affected resource.
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

impl std::fmt::Display for Event {
    /// Concatenates the raw payload fragments.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for fragment in &self.data {
            write!(f, "{fragment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_deserializes_wire_shape() {
        let event: Event = serde_json::from_str(
            r#"{
                "id": "55fa0608-926b-440d-9e5a-081d8f27445b",
                "type": "update",
                "creationtime": "2022-09-04T10:42:44Z",
                "data": [{"on": {"on": true}}]
            }"#,
        )
        .unwrap();

        assert_eq!(event.event_type, "update");
        assert_eq!(event.data.len(), 1);
        assert_eq!(event.creation_time.to_rfc3339(), "2022-09-04T10:42:44+00:00");
    }

    #[test]
    fn event_display_concatenates_fragments() {
        let event: Event = serde_json::from_str(
            r#"{
                "id": "e1",
                "type": "update",
                "creationtime": "2022-09-04T10:42:44Z",
                "data": [{"a":1},{"b":2}]
            }"#,
        )
        .unwrap();

        assert_eq!(event.to_string(), r#"{"a":1}{"b":2}"#);
    }

    #[test]
    fn event_without_data_defaults_empty() {
        let event: Event = serde_json::from_str(
            r#"{"id":"e1","type":"update","creationtime":"2022-09-04T10:42:44Z"}"#,
        )
        .unwrap();
        assert!(event.data.is_empty());
    }
}
