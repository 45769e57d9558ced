use thiserror::Error;

use jejupost_types::api::ErrorBody;

/// Errors surfaced by the API client. Every operation fails loudly — nothing
/// is retried here; retries are a caller decision.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server could not be reached at all (DNS, connect, TLS, mid-body).
    #[error("cannot reach server: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status. `message` is the
    /// server-supplied detail text when the body carries one, otherwise a
    /// generic status-code message.
    #[error("server error ({status}): {message}")]
    Api { status: u16, message: String },

    /// No bearer credential in the token store. Reported before any network
    /// attempt is made.
    #[error("not signed in: no credential in the token store")]
    MissingToken,

    /// The response body was not the JSON shape we expected.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Reading or writing the credential file failed.
    #[error("token store: {0}")]
    TokenStore(#[from] std::io::Error),
}

impl ClientError {
    /// Build an `Api` error from a non-success response, extracting the
    /// backend's `{"detail": ...}` text verbatim when present.
    pub async fn from_response(resp: reqwest::Response) -> Self {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(b) => b.detail,
            Err(_) => format!("request failed with status {status}"),
        };
        Self::Api { status, message }
    }
}
