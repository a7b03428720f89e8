use std::sync::Arc;

use tracing::{error, info};

use crate::app::{print_report, run_scenario};
use crate::error::AppResult;
use crate::http::{HttpIteration, build_client};
use crate::system::shutdown_handlers::{setup_signal_shutdown_handler, shutdown_channel};

use super::types::{LocalRun, RunPlan};

pub(crate) async fn execute_plan(plan: RunPlan) -> AppResult<()> {
    match plan {
        RunPlan::PrintConfig(scenario) => {
            print!("{}", scenario.to_toml()?);
            Ok(())
        }
        RunPlan::Local(local) => run_local(local).await,
    }
}

async fn run_local(local: LocalRun) -> AppResult<()> {
    let LocalRun {
        scenario,
        sample_log,
    } = local;
    let client = build_client(&scenario.options)?;
    let iteration = HttpIteration::new(client, &scenario.target)?;

    let (shutdown_tx, _shutdown_rx) = shutdown_channel();
    let signal_handler = setup_signal_shutdown_handler(&shutdown_tx);
    let outcome = run_scenario(&scenario, Arc::new(iteration), sample_log, &shutdown_tx).await;
    signal_handler.abort();
    let outcome = outcome?;

    print_report(&outcome, &scenario);
    if let Err(err) = outcome.verdict() {
        error!("{}", err);
        return Err(err.into());
    }
    info!("Run passed.");
    Ok(())
}
