//! HTTP server for txlog.
//!
//! Exposes submit, read and latest over a JSON API, plus Prometheus metrics
//! and health endpoints.

mod config;
mod error;
pub mod handlers;
mod http;
pub mod metrics;
mod middleware;
mod request;
mod response;

pub use config::{CliArgs, TxLogServerConfig};
pub use http::TxLogServer;
