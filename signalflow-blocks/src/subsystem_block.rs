use signalflow_model::params::BlockParams;
use signalflow_model::types::SignalType;

use crate::cgen::CgenCtx;
use crate::module::{AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts};

/// Container block. Never executed: the planner splices its inner sheets
/// into the global order and the orchestrator routes values across the
/// boundary, mirroring the internal output-port blocks onto this block's
/// output slots (frozen while disabled).
pub struct SubsystemBlock;

impl BlockModule for SubsystemBlock {
    fn port_counts(&self, params: &BlockParams) -> PortCounts {
        match params {
            BlockParams::Subsystem(p) => {
                PortCounts::new(p.input_ports.len(), p.output_ports.len())
            }
            _ => PortCounts::new(0, 0),
        }
    }

    fn infer_output_types(
        &self,
        _input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        // resolved by the propagator from the internal output-port blocks
        Err("Cannot determine output type: subsystem outputs follow its internal output ports"
            .to_string())
    }

    fn algebraic(&self, _ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        Err(BlockRuntimeError::BadState(
            "subsystem blocks are containers and are never executed",
        ))
    }

    fn emit_algebraic_c(&self, _ctx: &mut CgenCtx) -> Result<(), String> {
        Err("subsystem blocks are containers and emit no statements".to_string())
    }
}
