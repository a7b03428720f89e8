//! Core library for the `surge` CLI.
//!
//! The building blocks behind the binary: scenario configuration, the VU
//! pool and its closed-model and open-model executors, sample recording
//! and aggregation, thresholds, and the run controller. The primary
//! user-facing interface is the `surge` command-line application; library
//! APIs may evolve as the CLI grows.
pub mod app;
pub mod args;
pub mod config;
pub mod domain;
pub mod entry;
pub mod error;
pub mod executor;
pub mod http;
pub mod metrics;
pub mod shutdown;
pub mod system;
pub mod thresholds;
pub mod vu;
