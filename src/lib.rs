//! Image Proxy - An SSRF-guarded image proxy with a disk cache
//!
//! Proxies external images through `/api/proxy/img`, refusing internal targets
//! and caching fetched bytes under content-addressed names.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod guard;
pub mod models;
pub mod rewrite;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use rewrite::{build_image_url, ImageUrlOptions};
pub use tasks::spawn_sweep_task;
