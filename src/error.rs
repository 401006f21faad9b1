// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `huelink` library.
//!
//! Errors fall into four categories: connectivity (no address, transport
//! failure, unexpected status), decode (malformed JSON), API-level (a
//! well-formed response carrying a structured error envelope), and
//! configuration (malformed endpoint construction, never retried).

use serde::Deserialize;
use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The bridge record carries no network address.
    ///
    /// Returned before any I/O is attempted.
    #[error("no ip to connect")]
    NoAddress,

    /// The HTTP transport failed (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The bridge answered with a non-success HTTP status.
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(u16),

    /// The response body was not valid JSON for the expected shape.
    #[error("cannot decode json body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The bridge returned a structured API error.
    ///
    /// When the response envelope carries several errors, this is the
    /// first one; the rest are logged and suppressed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The bridge returned an empty response where one entry was expected.
    #[error("unexpected empty response")]
    EmptyResponse,

    /// An endpoint URL could not be constructed. Fatal, never retried.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// The mDNS resolver could not be initialized.
    #[error("cannot browse for bridges: {0}")]
    Resolver(String),
}

/// A single structured error returned by the bridge API.
///
/// The wire shape is `{"type":101,"address":"","description":"link button
/// not pressed"}`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Deserialize)]
#[error("hue-error {error_type} ({address}): {description}")]
pub struct ApiError {
    /// Numeric error category assigned by the bridge.
    #[serde(rename = "type")]
    pub error_type: i32,
    /// The resource address the error applies to.
    pub address: String,
    /// Human-readable description.
    pub description: String,
}

/// The ordered error envelope of a CLIP v2 response.
///
/// If the envelope is non-empty, the first entry is treated as the
/// representative failure; the remaining entries are logged at debug
/// level and suppressed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorList(pub Vec<ApiError>);

impl ApiErrorList {
    /// Returns `true` if the envelope carries no errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the envelope, returning the first error if any.
    ///
    /// Suppressed entries are logged.
    #[must_use]
    pub fn into_first(self) -> Option<ApiError> {
        let mut errors = self.0.into_iter();
        let first = errors.next()?;
        for suppressed in errors {
            tracing::debug!(error = %suppressed, "Suppressed additional API error");
        }
        Some(first)
    }
}

impl std::fmt::Display for ApiErrorList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for err in &self.0 {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
            first = false;
        }
        Ok(())
    }
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = ApiError {
            error_type: 101,
            address: String::new(),
            description: "link button not pressed".to_string(),
        };
        assert_eq!(err.to_string(), "hue-error 101 (): link button not pressed");
    }

    #[test]
    fn api_error_display_is_stable() {
        let make = || ApiError {
            error_type: 7,
            address: "/lights/1".to_string(),
            description: "invalid value".to_string(),
        };
        assert_eq!(make().to_string(), make().to_string());
    }

    #[test]
    fn api_error_deserializes_wire_shape() {
        let err: ApiError = serde_json::from_str(
            r#"{"type":101,"address":"","description":"link button not pressed"}"#,
        )
        .unwrap();
        assert_eq!(err.error_type, 101);
        assert_eq!(err.description, "link button not pressed");
    }

    #[test]
    fn error_list_first_wins() {
        let list = ApiErrorList(vec![
            ApiError {
                error_type: 1,
                address: "/a".to_string(),
                description: "first".to_string(),
            },
            ApiError {
                error_type: 2,
                address: "/b".to_string(),
                description: "second".to_string(),
            },
        ]);

        let first = list.into_first().unwrap();
        assert_eq!(first.error_type, 1);
        assert_eq!(first.description, "first");
    }

    #[test]
    fn empty_error_list() {
        assert!(ApiErrorList::default().is_empty());
        assert!(ApiErrorList::default().into_first().is_none());
    }

    #[test]
    fn error_list_display_joins_lines() {
        let list = ApiErrorList(vec![
            ApiError {
                error_type: 1,
                address: "/a".to_string(),
                description: "first".to_string(),
            },
            ApiError {
                error_type: 2,
                address: "/b".to_string(),
                description: "second".to_string(),
            },
        ]);
        assert_eq!(
            list.to_string(),
            "hue-error 1 (/a): first\nhue-error 2 (/b): second"
        );
    }

    #[test]
    fn error_from_api_error() {
        let api = ApiError {
            error_type: 101,
            address: String::new(),
            description: "link button not pressed".to_string(),
        };
        let err: Error = api.into();
        assert!(matches!(err, Error::Api(e) if e.error_type == 101));
    }
}
