//! Error taxonomy for backend calls.
//!
//! Four buckets, and nothing is retried automatically: auth problems
//! surface as a login redirect, missing templates are terminal, network
//! and server failures get logged and alerted, and malformed responses
//! are converted into descriptive parse errors. None of them are fatal
//! to the application; every failure is scoped to the action that
//! triggered it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Session expired or missing. The UI sends the user to login.
    #[error("login required")]
    AuthRequired,
    /// Template or field does not exist on the server.
    #[error("not found: {0}")]
    NotFound(String),
    /// Transport failure or a 5xx/4xx the server reported.
    #[error("server error: {0}")]
    NetworkOrServer(String),
    /// The server answered with something that is not the expected
    /// JSON, typically an HTML error page.
    #[error("unexpected server response: {0}")]
    Parse(String),
}

impl ApiError {
    /// Whether the UI should drop the user to the login flow.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::AuthRequired)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::NetworkOrServer(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Parse(err.to_string())
    }
}

/// Parse a response body as JSON, sniffing for HTML error pages first.
/// Django serves styled HTML for unhandled errors; telling the user
/// "expected JSON, got an error page" beats a serde syntax error.
pub fn sniff_json(body: &str) -> Result<serde_json::Value, ApiError> {
    let head = body.trim_start();
    let lower = head.get(..15).unwrap_or(head).to_ascii_lowercase();
    if lower.starts_with("<html") || lower.starts_with("<!doctype") {
        return Err(ApiError::Parse(
            "server returned an HTML error page instead of JSON".to_string(),
        ));
    }
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_html_error_pages() {
        for body in [
            "<html><body>Server Error (500)</body></html>",
            "<!DOCTYPE html>\n<html>...</html>",
            "  <HTML><head></head></HTML>",
        ] {
            let err = sniff_json(body).unwrap_err();
            assert!(matches!(err, ApiError::Parse(msg) if msg.contains("HTML")));
        }
    }

    #[test]
    fn passes_valid_json_through() {
        let value = sniff_json(r#"{"status": "success"}"#).unwrap();
        assert_eq!(value["status"], "success");
    }

    #[test]
    fn non_html_garbage_is_a_parse_error() {
        assert!(matches!(sniff_json("not json at all"), Err(ApiError::Parse(_))));
    }
}
