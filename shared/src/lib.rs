pub mod admin_service;
pub mod cors;
pub mod failure;
pub mod http;
pub mod metrics_defs;
