// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! mDNS bridge discovery.
//!
//! Bridges advertise themselves as `_hue._tcp` service instances; the
//! TXT records carry `bridgeid` and `modelid`. Discovery browses for a
//! bounded time and returns every distinct bridge resolved before the
//! timeout. Zero results are a success, not an error.
//!
//! # Examples
//!
//! ```no_run
//! use std::time::Duration;
//!
//! # async fn example() -> huelink::Result<()> {
//! let bridges = huelink::discover(Duration::from_secs(2)).await?;
//! for bridge in &bridges {
//!     println!("{} ({}) at {:?}", bridge.id(), bridge.model(), bridge.addresses());
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};

use crate::bridge::Bridge;
use crate::error::{Error, Result};

/// The DNS-SD service type bridges register under.
const HUE_SERVICE: &str = "_hue._tcp.local.";

/// Browses the local network for Hue bridges.
///
/// Collects every distinct advertisement resolved before `timeout`
/// elapses and never blocks past it. Each returned bridge carries its
/// own pinned-trust HTTP client; bridges whose client cannot be built
/// are skipped with a warning.
///
/// # Errors
///
/// Only resolver initialization failure is an error; partial results
/// (zero or more bridges) are a success.
pub async fn discover(timeout: Duration) -> Result<Vec<Bridge>> {
    let daemon = ServiceDaemon::new().map_err(|e| Error::Resolver(e.to_string()))?;
    let receiver = daemon
        .browse(HUE_SERVICE)
        .map_err(|e| Error::Resolver(e.to_string()))?;

    tracing::info!(timeout_ms = timeout.as_millis() as u64, "Starting bridge discovery");

    let mut bridges = Vec::new();
    let mut seen = HashSet::new();

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            event = receiver.recv_async() => {
                match event {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        if !seen.insert(info.get_fullname().to_string()) {
                            continue;
                        }
                        match bridge_from_service(&info) {
                            Ok(bridge) => {
                                tracing::debug!(
                                    id = %bridge.id(),
                                    model = %bridge.model(),
                                    "Resolved bridge advertisement"
                                );
                                bridges.push(bridge);
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Skipping advertised bridge");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }

    let _ = daemon.stop_browse(HUE_SERVICE);
    let _ = daemon.shutdown();

    tracing::info!(count = bridges.len(), "Bridge discovery completed");

    Ok(bridges)
}

/// Builds a bridge record from one resolved advertisement.
fn bridge_from_service(info: &ServiceInfo) -> Result<Bridge> {
    let id = info.get_property_val_str("bridgeid").unwrap_or_default();
    let model = info.get_property_val_str("modelid").unwrap_or_default();
    let name = instance_name(info.get_fullname());

    // IPv4 before IPv6, sorted within each family for determinism.
    let mut v4: Vec<IpAddr> = info
        .get_addresses()
        .iter()
        .copied()
        .filter(IpAddr::is_ipv4)
        .collect();
    let mut v6: Vec<IpAddr> = info
        .get_addresses()
        .iter()
        .copied()
        .filter(IpAddr::is_ipv6)
        .collect();
    v4.sort_unstable();
    v6.sort_unstable();
    v4.append(&mut v6);

    Bridge::new(id, model, name, v4, info.get_port())
}

/// Extracts the instance label from a service fullname like
/// `Hue Bridge - 123ABC._hue._tcp.local.`.
fn instance_name(fullname: &str) -> &str {
    fullname
        .strip_suffix(HUE_SERVICE)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(fullname)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_strips_service_suffix() {
        assert_eq!(
            instance_name("Hue Bridge - 123ABC._hue._tcp.local."),
            "Hue Bridge - 123ABC"
        );
    }

    #[test]
    fn instance_name_passes_through_unexpected_shape() {
        assert_eq!(instance_name("whatever"), "whatever");
    }

    #[tokio::test]
    async fn discover_returns_within_timeout() {
        let timeout = Duration::from_millis(200);
        let started = std::time::Instant::now();

        // Nothing answers in CI; an empty result inside the deadline
        // plus scheduling slack is the success case.
        let result = discover(timeout).await;
        assert!(started.elapsed() < timeout + Duration::from_secs(2));

        if let Ok(bridges) = result {
            let _ = bridges.len();
        }
    }
}
