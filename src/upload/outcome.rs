use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Why an upload attempt failed. Display strings are the untranslated
/// fallback for the per-widget failure message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum UploadError {
    /// The endpoint answered HTTP 200 but the body carried an error code
    #[error("the server rejected the upload ({code})")]
    Server { code: String },
    /// HTTP 404, which the upload endpoint also produces for oversized posts
    #[error("the upload endpoint was not found; the recording may be too large")]
    NotFound,
    #[error("the upload failed with HTTP status {status}")]
    Http { status: u16 },
    /// The body was not the JSON the endpoint promises
    #[error("the server response could not be understood")]
    Malformed,
    #[error("the upload could not reach the server")]
    Transport,
    /// Torn down while the transfer was still running
    #[error("the upload was cancelled")]
    Aborted,
}

/// Terminal result of one upload attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UploadOutcome {
    Saved,
    Failed(UploadError),
}

impl UploadOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, UploadOutcome::Saved)
    }
}

/// Map an HTTP response to an outcome.
///
/// The endpoint reports most failures inside an HTTP 200 body, so a 2xx
/// status alone proves nothing: the body must parse as JSON and carry no
/// error code before the upload counts as saved.
pub fn classify_response(status: StatusCode, body: &[u8]) -> UploadOutcome {
    if status == StatusCode::NOT_FOUND {
        return UploadOutcome::Failed(UploadError::NotFound);
    }
    if !status.is_success() {
        return UploadOutcome::Failed(UploadError::Http {
            status: status.as_u16(),
        });
    }

    let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) else {
        return UploadOutcome::Failed(UploadError::Malformed);
    };

    match json.get("errorcode").or_else(|| json.get("error")) {
        Some(value) => {
            let code = value
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| value.to_string());
            UploadOutcome::Failed(UploadError::Server { code })
        }
        None => UploadOutcome::Saved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_with_clean_json_is_saved() {
        let outcome = classify_response(StatusCode::OK, br#"{"event":"fileuploaded"}"#);
        assert_eq!(outcome, UploadOutcome::Saved);
        assert!(outcome.accepted());
    }

    #[test]
    fn test_ok_with_errorcode_is_server_failure() {
        let outcome = classify_response(StatusCode::OK, br#"{"errorcode":"maxbytes"}"#);
        assert_eq!(
            outcome,
            UploadOutcome::Failed(UploadError::Server {
                code: "maxbytes".to_string()
            })
        );
    }

    #[test]
    fn test_ok_with_error_key_is_server_failure() {
        let outcome = classify_response(StatusCode::OK, br#"{"error":"File too large"}"#);
        assert_eq!(
            outcome,
            UploadOutcome::Failed(UploadError::Server {
                code: "File too large".to_string()
            })
        );
    }

    #[test]
    fn test_not_found_maps_to_dedicated_variant() {
        let outcome = classify_response(StatusCode::NOT_FOUND, b"");
        assert_eq!(outcome, UploadOutcome::Failed(UploadError::NotFound));
    }

    #[test]
    fn test_other_http_failures_keep_status() {
        let outcome = classify_response(StatusCode::INTERNAL_SERVER_ERROR, b"boom");
        assert_eq!(
            outcome,
            UploadOutcome::Failed(UploadError::Http { status: 500 })
        );
    }

    #[test]
    fn test_ok_with_non_json_body_is_malformed() {
        let outcome = classify_response(StatusCode::OK, b"<html>login page</html>");
        assert_eq!(outcome, UploadOutcome::Failed(UploadError::Malformed));
    }
}
