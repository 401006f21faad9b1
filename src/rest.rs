// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The typed request executor shared by all REST endpoints.
//!
//! Sends JSON, decodes JSON, and maps failures onto the error taxonomy
//! of [`crate::error`]. The response body is buffered in full before
//! decoding; that trades streaming efficiency for the ability to inspect
//! the raw payload when diagnosing API errors hidden in an otherwise-200
//! response, and it keeps the error granularity stable.

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::bridge::Bridge;
use crate::error::{Error, Result};

/// Header carrying the bearer credential on REST and stream connections.
pub(crate) const APPLICATION_KEY_HEADER: &str = "hue-application-key";

/// Executes one typed request against the bridge.
///
/// Rejects with [`Error::NoAddress`] before any I/O when the bridge has
/// no addresses. The auth header is attached only when the credential
/// slot is non-empty; with an empty slot the bridge decides pass/fail.
pub(crate) async fn execute<T, B>(
    bridge: &Bridge,
    method: Method,
    path: &str,
    body: Option<&B>,
) -> Result<T>
where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
{
    let url = bridge.endpoint(path)?;

    tracing::debug!(method = %method, url = %url, "Sending bridge request");

    let mut request = bridge.http_client().request(method, url);

    if let Some(body) = body {
        request = request.json(body);
    }

    let key = bridge.application_key();
    if !key.is_empty() {
        request = request.header(APPLICATION_KEY_HEADER, key);
    }

    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::UnexpectedStatus(status.as_u16()));
    }

    // Buffer, then decode, so a transport failure and a malformed body
    // stay distinguishable.
    let buf = response.bytes().await?;

    tracing::debug!(bytes = buf.len(), "Received bridge response");

    Ok(serde_json::from_slice(&buf)?)
}
