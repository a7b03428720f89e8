//! Run controller and end-of-run report.
mod runner;
mod summary;


pub use runner::{RunOutcome, run_scenario};
pub use summary::{print_report, report_lines};
