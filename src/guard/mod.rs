//! Guard Module
//!
//! SSRF defense for the image proxy: URL classification, host policy and
//! policy-enforcing DNS resolution.

mod classifier;
mod policy;
mod resolver;
mod verdict;


pub use classifier::{unwrap_target, Classifier, MAX_NESTING, PROXY_PATH};
pub use policy::{blocked_range, HostPolicy};
pub use resolver::{GuardedDns, HostResolver, StaticResolver, SystemResolver};
pub use verdict::{Rejection, Verdict};
