use crate::aggregate::AggregatedFailure;
use hyper::StatusCode;
use shared::http::UpstreamError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GroupingError>;

/// Errors that can occur while loading or executing a task tree
#[derive(Error, Debug)]
pub enum GroupingError {
    #[error("task node is not a leaf call, serial group or parallel group: {0}")]
    MalformedNode(String),

    #[error("a task group cannot be empty")]
    EmptyGroup,

    #[error("group timeout of {0:?} elapsed before all branches completed")]
    GroupTimeout(Duration),

    #[error("downstream call to {target} returned {status}: {detail}")]
    Downstream {
        target: String,
        status: u16,
        detail: String,
    },

    #[error("call to {target} failed: {source}")]
    Transport {
        target: String,
        source: UpstreamError,
    },

    #[error("{0}")]
    Aggregated(AggregatedFailure),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GroupingError {
    /// A short classification tag, used for aggregation and logging.
    pub fn kind(&self) -> &'static str {
        match self {
            GroupingError::MalformedNode(_) => "malformed-node",
            GroupingError::EmptyGroup => "empty-group",
            GroupingError::GroupTimeout(_) => "group-timeout",
            GroupingError::Downstream { .. } => "downstream-failure",
            GroupingError::Transport { .. } => "transport-failure",
            GroupingError::Aggregated(_) => "aggregated-failure",
            GroupingError::Internal(_) => "internal",
        }
    }

    /// Returns the appropriate HTTP status code for this error.
    ///
    /// Downstream failures pass their upstream status through; per-call and
    /// group timeouts both map to 504.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GroupingError::MalformedNode(_) | GroupingError::EmptyGroup => {
                StatusCode::BAD_REQUEST
            }
            GroupingError::GroupTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GroupingError::Downstream { status, .. } => StatusCode::from_u16(*status)
                .unwrap_or(StatusCode::BAD_GATEWAY),
            GroupingError::Transport { source, .. } => match source {
                UpstreamError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            },
            GroupingError::Aggregated(_) | GroupingError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
