//! Typed error hierarchy for the opsramp-lc crate.
//!
//! `OpsRampError` keeps the diagnostic context of each failure boundary so
//! callers can tell the category apart and batch drivers can turn any of
//! them into a per-row status string:
//!
//! - `Auth` covers the OAuth token endpoint and a token the API keeps
//!   rejecting after a refresh.
//! - `Throttled` is only surfaced once the retry policy is exhausted; a
//!   single throttled response is recovered inside the transport.
//! - `NotFound` / `Conflict` / `Remote` are the failure side of the uniform
//!   [`Reply`](crate::client::Reply) signal, mapped by `Reply::into_result`.
//! - `Network` and `Parse` wrap `reqwest` and `serde_json` failures.
//! - `Config`, `Input` and `Output` belong to the batch collaborators
//!   (settings file, spreadsheet reader, record writer).

use reqwest::StatusCode;

/// Unified error type for all opsramp-lc operations.
#[derive(Debug, thiserror::Error)]
pub enum OpsRampError {
    /// Token acquisition failed or the API rejected a freshly issued token.
    #[error("authentication failed: {message}")]
    Auth {
        /// Status and body of the token endpoint when available.
        message: String,
        /// The underlying transport or parse error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The API kept signalling throttling until the retry budget ran out.
    #[error("request '{label}' still throttled after {attempts} attempts")]
    Throttled {
        /// Descriptive label of the operation.
        label: String,
        /// Throttled replies received, including the first.
        attempts: u32,
    },

    /// The lookup returned an empty result set or a 404.
    #[error("not found: {what}")]
    NotFound {
        /// What was being looked up.
        what: String,
    },

    /// Duplicate or overlapping membership or tag assignment.
    #[error("conflict: {message}")]
    Conflict {
        /// Conflict description, usually the API error code and message.
        message: String,
    },

    /// Any other non-success reply from the API.
    ///
    /// The body is kept verbatim; OpsRamp error bodies carry the `code` and
    /// `message` needed to debug permission and payload problems.
    #[error("API error {status}: {body}")]
    Remote {
        /// HTTP status returned by the API.
        status: StatusCode,
        /// Raw response body, empty when none was returned.
        body: String,
    },

    /// A successful reply whose body lacks something the operation needs
    /// (a created id, an object document).
    #[error("unexpected response for '{label}': {detail}")]
    UnexpectedResponse {
        /// Descriptive label of the operation.
        label: String,
        /// What was missing or malformed.
        detail: String,
    },

    /// A list endpoint kept reporting `nextPage` past the page ceiling.
    #[error("pagination for '{label}' exceeded {pages} pages")]
    Pagination {
        /// Descriptive label of the paginated query.
        label: String,
        /// Number of pages fetched before giving up.
        pages: u32,
    },

    /// JSON (de)serialization failed.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Transport-level failure (DNS, TCP, TLS, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Missing or invalid settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// The input spreadsheet could not be read or lacks a required column.
    #[error("input error: {message}")]
    Input {
        /// What went wrong and where.
        message: String,
        /// Underlying reader error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The output file could not be written.
    #[error("output error: {message}")]
    Output {
        /// What went wrong and where.
        message: String,
        /// Underlying writer error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl OpsRampError {
    pub(crate) fn input(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        OpsRampError::Input {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn output(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        OpsRampError::Output {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, OpsRampError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn auth_error_displays_message() {
        let err = OpsRampError::Auth {
            message: "token request failed (401): invalid_client".to_string(),
            source: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("invalid_client"));
        assert!(msg.contains("authentication failed"));
    }

    #[test]
    fn auth_error_with_source_chains_correctly() {
        let json_err = serde_json::from_str::<String>("not-json").unwrap_err();
        let err = OpsRampError::Auth {
            message: "failed to parse token response".to_string(),
            source: Some(Box::new(json_err)),
        };
        assert!(err.source().is_some());
    }

    #[test]
    fn remote_error_preserves_status_and_body() {
        let err = OpsRampError::Remote {
            status: StatusCode::BAD_REQUEST,
            body: r#"{"code":"0041","message":"Invalid resource id"}"#.to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("400"));
        assert!(msg.contains("Invalid resource id"));
    }

    #[test]
    fn throttled_error_reports_attempts() {
        let err = OpsRampError::Throttled {
            label: "srv01 Resource".to_string(),
            attempts: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("srv01 Resource"));
        assert!(msg.contains('5'));
    }

    #[test]
    fn input_helper_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.xlsx");
        let err = OpsRampError::input("cannot open workbook", io);
        assert!(err.to_string().contains("cannot open workbook"));
        assert!(err.source().is_some());
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OpsRampError>();
    }
}
