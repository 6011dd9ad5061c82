//! TAN client error types.

/// Errors from a single request to the TAN API.
///
/// A `TanError` never escapes as a panic: callers receive it as the `Err`
/// side of every client method and decide whether it is fatal.
#[derive(Debug, thiserror::Error)]
pub enum TanError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status code
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body was not the expected JSON
    #[error("JSON parse error: {message}{}", body_suffix(.body))]
    Json {
        message: String,
        body: Option<String>,
    },

    /// Request succeeded but the API had nothing for the resource
    #[error("empty response for {0}")]
    EmptyResponse(String),

    /// Client could not be built from its configuration
    #[error("not configured: {0}")]
    NotConfigured(String),
}

fn body_suffix(body: &Option<String>) -> String {
    body.as_ref()
        .map(|b| format!(" (body: {b})"))
        .unwrap_or_default()
}

impl TanError {
    /// Whether the request gave up because it hit the timeout ceiling.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TanError::Http(e) if e.is_timeout())
    }
}
