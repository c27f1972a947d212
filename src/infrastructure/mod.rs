//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - REST clients for the back-office services
//! - The signaling gateway transport

pub mod rest;
pub mod signaling;
