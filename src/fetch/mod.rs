//! Fetch Module
//!
//! Outbound retrieval of source images and the fetch-and-persist pipeline
//! that fills the disk cache.

mod inflight;
mod pipeline;
mod sniff;
mod upstream;

pub use inflight::InFlight;
pub use pipeline::{CacheOrigin, CachedImage, FetchPipeline};
pub use sniff::{image_content_type, sniff_image, OCTET_STREAM};
pub use upstream::{HttpUpstream, Upstream, UpstreamResponse};
