//! Interface layer - External interfaces
//!
//! This layer handles:
//! - REST API endpoints for the agent UI
//! - The WebSocket notification stream
//! - Request/response formatting

pub mod api;
