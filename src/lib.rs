// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `huelink` - A Rust library for Philips Hue bridges.
//!
//! This library covers three concerns: mDNS discovery of bridges on the
//! local network, an authenticated typed REST call path, and a
//! long-lived server-push event stream with automatic reconnection and
//! multi-handler fan-out.
//!
//! # Quick Start
//!
//! ## Discover and pair
//!
//! ```no_run
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> huelink::Result<()> {
//!     let bridges = huelink::discover(Duration::from_secs(2)).await?;
//!     let bridge = bridges.first().expect("no bridge found");
//!
//!     // Press the link button on the bridge first, then:
//!     let key = bridge.generate_client_key("myapp", "livingroom").await?;
//!     // Persist key.username yourself; the library never stores it.
//!     bridge.set_application_key(&key.username);
//!
//!     for device in bridge.devices().await? {
//!         println!("{}", device.id);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Restore a stored credential and stream events
//!
//! ```no_run
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> huelink::Result<()> {
//!     let bridges = huelink::discover(Duration::from_secs(2)).await?;
//!     let bridge = bridges.first().expect("no bridge found");
//!     bridge.set_application_key("stored-username");
//!
//!     let stream = bridge.event_stream()?;
//!     stream.register(|event| {
//!         println!("{} {}", event.event_type, event);
//!     });
//!
//!     tokio::time::sleep(Duration::from_secs(60)).await;
//!     stream.close();
//!     Ok(())
//! }
//! ```
//!
//! # Trust model
//!
//! Bridges terminate TLS with a certificate chained to a fixed Signify
//! root CA and a non-routable subject name. The library ships that root
//! and pins it instead of the system trust store, and skips
//! peer-identity verification the way the vendor's application guidance
//! describes. That is a documented constraint of the device, not a
//! pattern to reproduce elsewhere.

mod bridge;
pub mod discovery;
pub mod error;
pub mod event;
mod rest;
mod transport;

pub use bridge::{Bridge, BridgeConfig, ClientKey, Device};
pub use discovery::discover;
pub use error::{ApiError, ApiErrorList, Error, Result};
pub use event::{Event, EventStream, StreamConfig, SubscriptionId};
