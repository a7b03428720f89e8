//! Configuration loading, CLI overlay, and validation into a scenario.
mod apply;
mod build;
mod loader;
mod parse;
pub mod types;

#[cfg(test)]
mod tests;

pub use apply::{apply_args, resolve_sample_log};
pub use build::{build_scenario, to_config_file};
pub use loader::{load_config, load_config_file};

pub(crate) use parse::{parse_duration, parse_duration_allow_zero};
