use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the FetchClimate client.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller's arguments cannot describe a valid request.
    /// Raised before any network call is made.
    #[error("invalid input: {message}")]
    InputShape { message: String },

    /// The HTTP round trip itself failed (DNS, connect, TLS, timeout).
    #[error("could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-2xx status.
    #[error("request failed: HTTP {status} for url ({url})\n{body}")]
    Http {
        status: StatusCode,
        url: String,
        body: String,
    },

    /// A status reply that does not start with a recognized job state.
    #[error("unexpected reply from the compute service: {message}")]
    Protocol { message: String },

    /// The remote computation reached its failed state.
    #[error("remote computation failed: {message}")]
    JobFailed { message: String },

    /// Polling exceeded the configured maximum wait.
    #[error("job did not complete within {waited:?}")]
    Timeout { waited: Duration },

    /// Polling was cancelled through a [`CancelFlag`](crate::CancelFlag).
    #[error("polling cancelled")]
    Cancelled,

    /// A single data source was requested by a name the catalog does not know.
    #[error("data source {name:?} is not in the service configuration")]
    UnknownDataSource { name: String },

    /// The payload decoded but does not have the expected shape.
    #[error("failed to decode {context}: {message}")]
    Decode { context: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn input(message: impl Into<String>) -> Self {
        Error::InputShape {
            message: message.into(),
        }
    }

    pub(crate) fn decode(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Decode {
            context: context.into(),
            message: message.into(),
        }
    }
}

/// Error body shape produced by the service's ASP.NET front-end.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ServiceErrorResponse {
    #[serde(default, alias = "message")]
    #[serde(rename = "Message")]
    pub(crate) message: Option<String>,
    #[serde(default, alias = "detail")]
    #[serde(rename = "ExceptionMessage")]
    pub(crate) exception_message: Option<String>,
    #[serde(default, rename = "ExceptionType")]
    pub(crate) exception_type: Option<String>,
}

pub(crate) fn format_service_error(status: StatusCode, url: &str, body: &str) -> Error {
    let body = match serde_json::from_str::<ServiceErrorResponse>(body) {
        Ok(e) => {
            let message = e.message.as_deref().unwrap_or("");
            let detail = e.exception_message.as_deref().unwrap_or("");
            let kind = e.exception_type.as_deref().unwrap_or("");

            let mut out = message.to_string();
            if !detail.is_empty() {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(detail);
            }
            if !kind.is_empty() {
                out.push_str(&format!("\nkind: {}", kind));
            }
            if out.is_empty() { body.to_string() } else { out }
        }
        Err(_) => body.to_string(),
    };

    if status == StatusCode::NOT_FOUND {
        return Error::Http {
            status,
            url: url.to_string(),
            body: format!(
                "endpoint not found; check the configured service url (default: {})\n{}",
                crate::config::DEFAULT_URL,
                body
            ),
        };
    }

    Error::Http {
        status,
        url: url.to_string(),
        body,
    }
}
