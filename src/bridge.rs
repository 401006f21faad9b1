// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The bridge record and its typed REST endpoints.
//!
//! A [`Bridge`] is normally produced by [`discovery`](crate::discovery),
//! but can also be restored from persisted identity data via
//! [`Bridge::new`]. The record owns the HTTP client for connection reuse
//! and a mutable credential slot; identity, addresses and port are fixed
//! after creation.

use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ApiErrorList, Error, Result};
use crate::event::{EventStream, StreamConfig};
use crate::rest;
use crate::transport;

/// A Hue bridge on the local network.
///
/// Most operations require the credential returned by
/// [`generate_client_key`](Self::generate_client_key) (or restored from
/// the caller's own storage via
/// [`set_application_key`](Self::set_application_key)); with an empty
/// credential slot the auth header is omitted entirely and the bridge
/// decides what to allow.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> huelink::Result<()> {
///     let bridges = huelink::discover(Duration::from_secs(2)).await?;
///     for bridge in &bridges {
///         let config = bridge.config().await?;
///         println!("{} runs {}", config.name, config.software_version);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Bridge {
    id: String,
    model: String,
    name: String,
    addresses: Vec<IpAddr>,
    port: u16,
    scheme: &'static str,
    client: Client,
    application_key: RwLock<String>,
    events: Mutex<Option<Arc<EventStream>>>,
}

impl Bridge {
    /// Creates a bridge record from previously discovered identity data.
    ///
    /// The first address is used preferentially for all connections.
    ///
    /// # Errors
    ///
    /// Returns a connectivity error if the pinned-trust HTTP client
    /// cannot be built.
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        name: impl Into<String>,
        addresses: Vec<IpAddr>,
        port: u16,
    ) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            model: model.into(),
            name: name.into(),
            addresses,
            port,
            scheme: "https",
            client: transport::client()?,
            application_key: RwLock::new(String::new()),
            events: Mutex::new(None),
        })
    }

    /// Switches the record to plain HTTP.
    ///
    /// Real bridges only speak TLS; this exists for bridge emulators
    /// (e.g. diyHue) and local test servers.
    #[must_use]
    pub fn with_plain_http(mut self) -> Self {
        self.scheme = "http";
        self
    }

    /// The bridge id, as advertised in the `bridgeid` TXT record.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The model id, as advertised in the `modelid` TXT record.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The advertised service instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The known addresses, IPv4 before IPv6.
    #[must_use]
    pub fn addresses(&self) -> &[IpAddr] {
        &self.addresses
    }

    /// The advertised API port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stores the secret username (== token) of the one-time linkage
    /// with the bridge.
    ///
    /// The library never persists this value; persisting and restoring
    /// it is the caller's responsibility.
    pub fn set_application_key(&self, key: impl Into<String>) {
        *self.application_key.write() = key.into();
    }

    /// Fetches the unauthenticated bridge configuration.
    ///
    /// # Errors
    ///
    /// Returns connectivity or decode errors from the request path.
    pub async fn config(&self) -> Result<BridgeConfig> {
        rest::execute::<BridgeConfig, ()>(self, Method::GET, "/api/0/config", None).await
    }

    /// Requests a fresh application key from the bridge.
    ///
    /// The user has to press the physical link button first; this call
    /// then proves that the user is in control of the bridge. Polling
    /// until the button is pressed is up to the caller.
    ///
    /// The returned credential is issued exactly once and is not stored
    /// anywhere by the library; pass the username back in via
    /// [`set_application_key`](Self::set_application_key).
    ///
    /// # Errors
    ///
    /// Returns the bridge's API error verbatim (commonly "link button
    /// not pressed"), [`Error::EmptyResponse`] if the response array is
    /// unexpectedly empty, or connectivity/decode errors.
    pub async fn generate_client_key(
        &self,
        appname: &str,
        instancename: &str,
    ) -> Result<ClientKey> {
        let body = GenerateClientKey {
            devicetype: format!("{appname}#{instancename}"),
            generateclientkey: true,
        };

        let mut responses =
            rest::execute::<Vec<RpcResponse>, _>(self, Method::POST, "/api", Some(&body)).await?;

        if responses.is_empty() {
            return Err(Error::EmptyResponse);
        }

        let response = responses.swap_remove(0);
        if let Some(error) = response.error {
            return Err(Error::Api(error));
        }

        response.success.ok_or(Error::EmptyResponse)
    }

    /// Lists the devices known to the bridge.
    ///
    /// # Errors
    ///
    /// Returns the first API error of the envelope if present, or
    /// connectivity/decode errors.
    pub async fn devices(&self) -> Result<Vec<Device>> {
        let envelope =
            rest::execute::<ClipEnvelope<Device>, ()>(self, Method::GET, "/clip/v2/resource/device", None)
                .await?;

        if let Some(error) = envelope.errors.into_first() {
            return Err(Error::Api(error));
        }

        Ok(envelope.data)
    }

    /// Returns the event-stream session for this bridge.
    ///
    /// Lazily created and idempotent: the first call spawns the
    /// background connection, later calls return the running session.
    /// A session that was [`close`](EventStream::close)d is replaced by
    /// a fresh one on the next call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAddress`] for a bridge without addresses, or a
    /// configuration error if the subscription endpoint URL cannot be
    /// built. Both are fatal and never retried; steady-state connection
    /// failures are handled by the session itself.
    pub fn event_stream(&self) -> Result<Arc<EventStream>> {
        self.event_stream_with(StreamConfig::default())
    }

    /// Like [`event_stream`](Self::event_stream) with a custom stream
    /// configuration.
    ///
    /// The configuration only applies when a new session is created.
    ///
    /// # Errors
    ///
    /// Same as [`event_stream`](Self::event_stream).
    pub fn event_stream_with(&self, config: StreamConfig) -> Result<Arc<EventStream>> {
        let mut slot = self.events.lock();

        if let Some(stream) = slot.as_ref() {
            if !stream.is_closed() {
                return Ok(Arc::clone(stream));
            }
        }

        let stream = EventStream::spawn(self, config)?;
        *slot = Some(Arc::clone(&stream));
        Ok(stream)
    }

    /// Base origin for all connections, built from the first address.
    pub(crate) fn origin(&self) -> Result<Url> {
        let Some(address) = self.addresses.first() else {
            return Err(Error::NoAddress);
        };

        let host = match address {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };

        Ok(Url::parse(&format!("{}://{}:{}", self.scheme, host, self.port))?)
    }

    /// Joins `path` onto the bridge origin.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.origin()?.join(path)?)
    }

    pub(crate) fn http_client(&self) -> &Client {
        &self.client
    }

    /// Snapshot of the credential slot; empty means unauthenticated.
    pub(crate) fn application_key(&self) -> String {
        self.application_key.read().clone()
    }
}

/// The durable credential issued by a successful pairing exchange.
///
/// Returned exactly once; the `clientkey` (used for the entertainment
/// protocol) is only available at issuance time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientKey {
    /// The bearer secret sent as `hue-application-key` on every call.
    pub username: String,
    /// The device pairing secret.
    pub clientkey: String,
}

/// The unauthenticated configuration document at `/api/0/config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// User-assigned bridge name.
    pub name: String,
    /// Firmware version.
    #[serde(rename = "swversion")]
    pub software_version: String,
    /// REST API version.
    #[serde(rename = "apiversion")]
    pub api_version: String,
    /// MAC address of the bridge.
    pub mac: String,
    /// Bridge id, matching the mDNS TXT record.
    #[serde(rename = "bridgeid")]
    pub bridge_id: String,
    /// Whether the bridge is factory new.
    #[serde(rename = "factorynew")]
    pub factory_new: bool,
    /// Id of the bridge this one replaces, if any.
    #[serde(rename = "replacesbridgeid", default)]
    pub replaces_bridge_id: Option<serde_json::Value>,
    /// Hardware model id.
    #[serde(rename = "modelid")]
    pub model_id: String,
}

/// A device resource from the CLIP v2 API.
///
/// Only the id is modeled; the full resource shape is out of scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Resource id of the device.
    pub id: String,
}

/// Pairing request body.
#[derive(Debug, Serialize)]
struct GenerateClientKey {
    devicetype: String,
    generateclientkey: bool,
}

/// One entry of the pairing response array.
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    success: Option<ClientKey>,
    #[serde(default)]
    error: Option<crate::error::ApiError>,
}

/// The envelope every CLIP v2 response is wrapped in.
#[derive(Debug, Deserialize)]
struct ClipEnvelope<T> {
    #[serde(default)]
    errors: ApiErrorList,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    // 8443 instead of the real 443 so the port stays visible in the
    // serialized URL (the url crate elides scheme-default ports).
    fn bridge(addresses: Vec<IpAddr>) -> Bridge {
        Bridge::new("ecb5fafffe123456", "BSB002", "Hue Bridge", addresses, 8443).unwrap()
    }

    #[test]
    fn origin_uses_first_address() {
        let b = bridge(vec![
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 11)),
        ]);
        assert_eq!(b.origin().unwrap().as_str(), "https://192.168.1.10:8443/");
    }

    #[test]
    fn origin_brackets_ipv6() {
        let b = bridge(vec![IpAddr::V6(Ipv6Addr::LOCALHOST)]);
        assert_eq!(b.origin().unwrap().as_str(), "https://[::1]:8443/");
    }

    #[test]
    fn origin_without_addresses_fails() {
        let b = bridge(Vec::new());
        assert!(matches!(b.origin(), Err(Error::NoAddress)));
    }

    #[test]
    fn plain_http_switch() {
        let b = bridge(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]).with_plain_http();
        assert_eq!(b.origin().unwrap().scheme(), "http");
    }

    #[test]
    fn endpoint_joins_path() {
        let b = bridge(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
        assert_eq!(
            b.endpoint("/eventstream/clip/v2").unwrap().as_str(),
            "https://127.0.0.1:8443/eventstream/clip/v2"
        );
    }

    #[test]
    fn application_key_starts_empty() {
        let b = bridge(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
        assert!(b.application_key().is_empty());

        b.set_application_key("secret");
        assert_eq!(b.application_key(), "secret");
    }

    #[test]
    fn client_key_deserializes_wire_shape() {
        let key: ClientKey =
            serde_json::from_str(r#"{"username":"abc","clientkey":"DEADBEEF"}"#).unwrap();
        assert_eq!(key.username, "abc");
        assert_eq!(key.clientkey, "DEADBEEF");
    }

    #[test]
    fn bridge_config_renames() {
        let config: BridgeConfig = serde_json::from_str(
            r#"{
                "name": "Hue",
                "swversion": "1962097030",
                "apiversion": "1.48.0",
                "mac": "ec:b5:fa:12:34:56",
                "bridgeid": "ECB5FAFFFE123456",
                "factorynew": false,
                "replacesbridgeid": null,
                "modelid": "BSB002"
            }"#,
        )
        .unwrap();
        assert_eq!(config.api_version, "1.48.0");
        assert_eq!(config.model_id, "BSB002");
        assert!(!config.factory_new);
    }
}
