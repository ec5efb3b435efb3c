//! Bitbucket Lock - maintenance lock client for Bitbucket Server backups
//!
//! This crate provides:
//! - A lock session that takes the maintenance lock, starts an external
//!   backup and waits for the database and SCM subsystems to drain
//! - Progress reporting and lock release for the running backup
//! - An HTTP transport with basic auth and optional TLS verification
//! - A pluggable transport trait for alternative backends and tests

pub mod config;
pub mod constants;
pub mod error;
pub mod http;
pub mod model;
pub mod session;

pub use config::{DrainPolicy, LockClientConfig};
pub use error::{ErrorKind, LockError, Result};
pub use http::{ApiRequest, ApiResponse, HttpTransport, Transport};
pub use model::{MaintenanceStatus, SubsystemState};
pub use session::{AcquireStage, LockSession, SessionState};
