use indexmap::IndexMap;
use serde::Serialize;

use signalflow_model::diag::Diagnostic;
use signalflow_model::value::SignalValue;

/// Everything a run produces: the time base, per-probe sample series,
/// root output-port values at the final step, and the non-fatal findings
/// accumulated along the way.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResults {
    pub time_points: Vec<f64>,
    /// Sample series per `signal_display` / `signal_logger` block, keyed by
    /// the block's wire-format id.
    pub signal_data: IndexMap<String, Vec<SignalValue>>,
    pub final_time: f64,
    /// Root output-port values at the final step, keyed by port name.
    pub outputs: IndexMap<String, SignalValue>,
    pub diagnostics: Vec<Diagnostic>,
}
