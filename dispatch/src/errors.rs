use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use shared::failure::ServiceFailure;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors that can occur while dispatching a request to a procedure
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("the procedure name cannot be found from the request URL path {0:?}")]
    MissingProcedure(String),

    #[error("the handler-set name cannot be found from the request URL path {0:?}")]
    MissingHandlerSet(String),

    #[error("the directory of the handler set cannot be found from the request URL path {0:?}")]
    MissingDirectory(String),

    #[error("the directory {0:?} specified in the request URL path cannot be found under the script root")]
    DirectoryNotFound(String),

    #[error("the script root {0:?} is not configured as a valid file system directory")]
    InvalidRoot(String),

    #[error("no handler set named {name:?} can be resolved from {directory:?}")]
    HandlerSetNotFound { directory: String, name: String },

    #[error("{0:?} is not a procedure")]
    NotAProcedure(String),

    #[error("{}", missing_message(.names))]
    MissingArguments { names: Vec<String> },

    #[error("each item in a bulk call must be an object - args[{index}]={value} is not acceptable")]
    BadBulkElement { index: usize, value: String },

    #[error("no media type formatter has been registered as the default")]
    FormatUnavailable,

    #[error("failed to format the result object: {0}")]
    FormatFailed(String),

    #[error("failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("the requested resource requires user authentication")]
    Unauthorized,

    #[error("handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn missing_message(names: &[String]) -> String {
    let plural = if names.len() == 1 { "" } else { "s" };
    let list = names
        .iter()
        .map(|n| format!("{n:?}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "missing {} required argument{plural}: {list}",
        names.len()
    )
}

impl DispatchError {
    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::MissingProcedure(_)
            | DispatchError::MissingHandlerSet(_)
            | DispatchError::MissingDirectory(_)
            | DispatchError::MissingArguments { .. }
            | DispatchError::BadBulkElement { .. }
            | DispatchError::RequestBodyError(_) => StatusCode::BAD_REQUEST,

            DispatchError::DirectoryNotFound(_) | DispatchError::HandlerSetNotFound { .. } => {
                StatusCode::NOT_FOUND
            }

            DispatchError::NotAProcedure(_) => StatusCode::NOT_IMPLEMENTED,

            DispatchError::Unauthorized => StatusCode::UNAUTHORIZED,

            // Handlers can surface a specific status through ServiceFailure
            DispatchError::Handler(source) => source
                .downcast_ref::<ServiceFailure>()
                .map(|f| f.status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),

            DispatchError::FormatUnavailable
            | DispatchError::FormatFailed(_)
            | DispatchError::InvalidRoot(_)
            | DispatchError::InternalError(_)
            | DispatchError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converts this error into an HTTP response
    pub fn into_response(self) -> Response<BoxBody<Bytes, DispatchError>> {
        let status = self.status_code();
        let body = format!("{}\n", self);

        Response::builder()
            .status(status)
            .body(Full::new(Bytes::from(body)).map_err(|e| match e {}).boxed())
            .unwrap_or_else(|_| {
                // Fallback if response building fails
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(
                        Full::new(Bytes::from("Internal server error\n"))
                            .map_err(|e| match e {})
                            .boxed(),
                    )
                    .unwrap()
            })
    }
}
