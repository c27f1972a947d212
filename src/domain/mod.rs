//! Domain layer - Core softphone rules
//!
//! This layer contains:
//! - Aggregates: the call record and its status machine
//! - Value Objects: identifiers, numbers, volume, session token
//! - Domain Services: dial validation
//! - Ports: transport device, token issuer, history, reporting, numbers

pub mod call;
pub mod history;
pub mod numbers;
pub mod report;
pub mod session;
pub mod shared;
pub mod transport;

// Re-export commonly used types
pub use shared::{DomainError, Result, ServiceError};
