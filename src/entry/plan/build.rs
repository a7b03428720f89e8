use tracing::debug;

use crate::args::TesterArgs;
use crate::config::{apply_args, build_scenario, load_config, resolve_sample_log};
use crate::error::AppResult;

use super::types::{LocalRun, RunPlan};

/// Merge the config file (explicit or default) with CLI flags and
/// validate the result.
pub(crate) fn build_plan(args: &TesterArgs) -> AppResult<RunPlan> {
    let mut config = load_config(args.config.as_deref())?.unwrap_or_default();
    apply_args(&mut config, args);
    let sample_log = resolve_sample_log(&config, args)?;
    let scenario = build_scenario(&config)?;
    debug!("Resolved scenario: {:?}", scenario);

    if args.print_config {
        return Ok(RunPlan::PrintConfig(scenario));
    }
    Ok(RunPlan::Local(LocalRun {
        scenario,
        sample_log,
    }))
}
