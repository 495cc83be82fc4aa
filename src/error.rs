//! Error taxonomy shared by the collector, storage and web tiers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No probe endpoint matched a known vendor family. The host is
    /// skipped, never treated as a failure.
    #[error("unable to identify the vendor")]
    VendorUnknown,

    /// The BMC rejected the credentials. Triggers one credential-fallback
    /// retry; terminal on the second occurrence.
    #[error("failed to login")]
    LoginFailed,

    /// A sentinel serial ("", "[unknown]", "0000000000", "_") was reported.
    #[error("invalid serial: {0:?}")]
    InvalidSerial(String),

    /// 404 on an optional endpoint; the datum is unavailable, the snapshot
    /// proceeds without it.
    #[error("requested page couldn't be found in the server")]
    PageNotFound,

    /// The BMC died with a 500 on a Redfish call.
    #[error("received 500 calling this endpoint")]
    RedfishEndpoint500,

    /// The BMC does not expose Redfish at all.
    #[error("redfish not supported")]
    RedfishNotSupported,

    /// Payload could not be decoded; the raw bytes have been dumped when
    /// dumping is enabled.
    #[error("unable to decode {kind} payload: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("record not found")]
    RecordNotFound,

    /// The caller used page[number]/page[size] pagination, which this API
    /// does not implement.
    #[error("please use page[offset] and page[limit] for pagination")]
    PageSizeAndNumber,

    #[error("invalid include: {0}")]
    InvalidInclude(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] diesel::result::Error),

    #[error("database pool error: {0}")]
    Pool(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl From<bb8::RunError<anyhow::Error>> for Error {
    fn from(err: bb8::RunError<anyhow::Error>) -> Self {
        match err {
            bb8::RunError::User(source) => Error::Pool(source.to_string()),
            bb8::RunError::TimedOut => Error::Pool("timed out".to_string()),
        }
    }
}

impl Error {
    pub fn decode(kind: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Error::Decode {
            kind,
            source: source.into(),
        }
    }

    /// Storage misses on existence-check paths mean "no previous state".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::RecordNotFound | Error::Storage(diesel::result::Error::NotFound)
        )
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::RecordNotFound | Error::Storage(diesel::result::Error::NotFound) => {
                StatusCode::NOT_FOUND
            }
            Error::PageSizeAndNumber | Error::InvalidInclude(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
        }

        // JSON:API error objects; 500 details stay in the logs.
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            self.to_string()
        };
        let body = json!({
            "errors": [{
                "status": status.as_u16().to_string(),
                "detail": detail,
            }]
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_detection_covers_both_forms() {
        assert!(Error::RecordNotFound.is_not_found());
        assert!(Error::Storage(diesel::result::Error::NotFound).is_not_found());
        assert!(!Error::LoginFailed.is_not_found());
    }
}
