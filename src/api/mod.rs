//! API Module
//!
//! HTTP handlers and routing for the image proxy.
//!
//! # Endpoints
//! - `GET /api/proxy/img?u=<url>[&fmt=webp]` - Proxy an external image
//! - `GET /stats` - Proxy statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
