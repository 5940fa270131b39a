//! Request and Response models for the proxy API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! deserializing query strings and serializing JSON bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::ProxyQuery;
pub use responses::{HealthResponse, StatsResponse};
