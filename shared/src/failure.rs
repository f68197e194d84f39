use http::StatusCode;
use thiserror::Error;

/// A boxed-error carrier that lets a handler surface a specific HTTP status
/// through the `Box<dyn Error>` seam between procedures and the edge.
///
/// The edge downcasts handler failures to this type when mapping them to a
/// response; anything else becomes a 500.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ServiceFailure {
    pub status: StatusCode,
    pub message: String,
}

impl ServiceFailure {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}
