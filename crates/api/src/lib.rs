//! HTTP surface of the auth core: router, gates and configuration.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;

pub use app::{build_app, AppState, LoginSettings};
pub use config::AppConfig;
