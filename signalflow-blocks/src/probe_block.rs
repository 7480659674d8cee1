use signalflow_model::params::BlockParams;
use signalflow_model::types::SignalType;

use crate::cgen::CgenCtx;
use crate::module::{AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts};

/// Sample-capture sink backing both `signal_display` and `signal_logger`.
/// The orchestrator snapshots the probe's input into the results time
/// series; the block itself computes nothing.
pub struct ProbeBlock;

impl BlockModule for ProbeBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(1, 0)
    }

    fn infer_output_types(
        &self,
        _input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        Ok(Vec::new())
    }

    fn algebraic(&self, _ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        Ok(())
    }

    fn emit_algebraic_c(&self, _ctx: &mut CgenCtx) -> Result<(), String> {
        // probes have no counterpart in generated code
        Ok(())
    }
}
