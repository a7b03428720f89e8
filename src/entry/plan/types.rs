use crate::domain::ScenarioConfig;
use crate::metrics::SampleLogTarget;

pub(in crate::entry) struct LocalRun {
    pub(super) scenario: ScenarioConfig,
    pub(super) sample_log: Option<SampleLogTarget>,
}

pub(in crate::entry) enum RunPlan {
    /// Emit the resolved scenario as canonical TOML.
    PrintConfig(ScenarioConfig),
    Local(LocalRun),
}
