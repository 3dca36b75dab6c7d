//! HeartGuard monitoring engine
//!
//! This crate provides the core functionality for:
//! - Loading biosignal samples and slicing them into fixed windows
//! - ECG window classification with an ONNX model
//! - Mapping classes to simulated clinical status
//! - Publishing and synchronizing status through a shared store
//! - The caregiver alert escalation state machine
//! - Health checks and observability

pub mod classifier;
pub mod clinical;
pub mod escalation;
pub mod health;
pub mod models;
pub mod observability;
pub mod session;
pub mod signal;
pub mod sync;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
