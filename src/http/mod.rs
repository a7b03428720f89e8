//! HTTP client construction and the request-per-iteration workload.
mod client;
mod iteration;


pub use client::{USER_AGENT, build_client};
pub use iteration::HttpIteration;
