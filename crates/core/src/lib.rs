//! # Bulwark Core
//!
//! Resilience orchestration on top of `bulwark-common`'s primitives.
//!
//! This crate contains:
//! - [`ErrorHandlingService`]: named circuit breaker and bulkhead
//!   registries, retry and fallback execution, kind-based error handlers
//! - [`decorators`]: wrapping combinators that take the service explicitly
//! - [`config`]: settings loading from environment, TOML or JSON
//! - [`health`]: global metrics and health report snapshots
//!
//! ## Architecture Principles
//! - Only depends on `bulwark-common` for policy primitives
//! - No global state; the service is constructed once and passed around
//! - Library code never installs a tracing subscriber

pub mod config;
pub mod decorators;
pub mod handlers;
pub mod health;
pub mod service;

pub use config::{ResilienceSettings, SettingsError, SettingsResult};
pub use handlers::{
    error_handler_fn, fallback_fn, sync_error_handler, sync_fallback, ErrorContext, ErrorHandler,
    FallbackHandler, HandlerRegistry,
};
pub use health::{BreakerHealth, GlobalMetricsSnapshot, HealthReport, HealthStatus};
pub use service::{BulkheadAcquireError, ErrorHandlingService};
