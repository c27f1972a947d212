//! Softphone - browser-agent call control core built with Rust
//!
//! A Domain-Driven Design (DDD) implementation of an agent softphone: it
//! holds a registered voice-transport session, drives one call at a time
//! through its status machine, prompts for post-call reports and serves
//! call history to the agent UI over REST and WebSocket.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use application::{Softphone, SoftphoneError, SoftphoneResult};
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
