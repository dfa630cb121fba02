//! Error types for admission request handling.
//!
//! Every variant is scoped to a single request. None of them is fatal to the
//! process; each one maps to an explicit admission response.

use axum::http::StatusCode;
use thiserror::Error;

/// Error type for the mutation pipeline
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// The AdmissionReview envelope could not be decoded, or carried no
    /// request or no embedded object.
    #[error("malformed admission request: {message}")]
    MalformedRequest {
        /// UID of the request, when the envelope got far enough to carry one
        uid: Option<String>,
        message: String,
    },

    /// The embedded object is not a valid Pod
    #[error("could not unmarshal pod on admission request: {0}")]
    UnparseablePod(String),

    /// The outgoing patch or envelope could not be serialized
    #[error("could not encode admission response: {0}")]
    ResponseEncoding(String),

    /// An injected volume or mount collides with an existing one and the
    /// collision policy is `reject`
    #[error("{kind} {key:?} already exists{}", in_container(.container))]
    NameCollision {
        /// "volume" or "volumeMount"
        kind: &'static str,
        key: String,
        container: Option<String>,
    },
}

fn in_container(container: &Option<String>) -> String {
    container
        .as_ref()
        .map(|c| format!(" in container {c:?}"))
        .unwrap_or_default()
}

impl AdmissionError {
    pub fn malformed(message: impl Into<String>) -> Self {
        AdmissionError::MalformedRequest {
            uid: None,
            message: message.into(),
        }
    }

    /// Short reason code embedded in the denial message
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionError::MalformedRequest { .. } => "MalformedRequest",
            AdmissionError::UnparseablePod(_) => "UnparseablePod",
            AdmissionError::ResponseEncoding(_) => "ResponseEncodingError",
            AdmissionError::NameCollision { .. } => "NameCollision",
        }
    }

    /// HTTP status the webhook answers with for this error.
    ///
    /// Only an undecodable envelope is a client error; everything else is a
    /// well-formed admission denial.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdmissionError::MalformedRequest { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::OK,
        }
    }
}
