pub mod arguments;
pub mod binder;
pub mod config;
pub mod errors;
pub mod format;
pub mod handlers;
pub mod invoke;
pub mod metrics_defs;
pub mod path;
pub mod scope;
pub mod service;

pub use arguments::{ArgumentBundle, ArgumentForm, BulkItem, RequestArguments};
pub use binder::{BoundArguments, ParameterDescriptor, ParameterKind, bind_arguments};
pub use config::DispatchConfig;
pub use errors::DispatchError;
pub use format::{FormatterRegistry, MediaTypeFormatter};
pub use handlers::{HandlerEntry, HandlerRegistry, HandlerSet, Procedure};
pub use service::DispatchService;
