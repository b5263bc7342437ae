//! Core library for the `alerts` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The trigger client for the OpenWeatherMap Alert API
//! - The HTTP transport seam and its `reqwest` implementation
//! - Shared domain models (triggers, conditions, areas, alerts)
//!
//! It is used by `alert-cli`, but can also be reused by other binaries or services.

pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod transport;
pub mod uris;

pub use client::{ALERT_API_VERSION, TriggerClient};
pub use config::Config;
pub use error::AlertError;
pub use model::{
    Alert, AlertChannel, Condition, Geometry, Operator, Position, TimeValue, Trigger,
    weather_param,
};
pub use parser::TriggerParser;
pub use transport::{HttpTransport, ReqwestTransport};
pub use uris::Uris;
