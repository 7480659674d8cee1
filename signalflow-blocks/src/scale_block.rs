use signalflow_model::c_float_literal;
use signalflow_model::params::BlockParams;
use signalflow_model::types::SignalType;

use crate::cgen::CgenCtx;
use crate::module::{AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts};

/// Multiplies every element of its input by a constant gain.
pub struct ScaleBlock;

fn gain(params: &BlockParams) -> f64 {
    match params {
        BlockParams::Scale(p) => p.gain,
        _ => 1.0,
    }
}

impl BlockModule for ScaleBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(1, 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        match input_types.first().copied().flatten() {
            None => Err("Cannot determine output type: input is not connected".to_string()),
            Some(t) if t.is_bool() => Err(
                "Cannot determine output type: arithmetic over boolean signals".to_string(),
            ),
            Some(t) => Ok(vec![t]),
        }
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let gain = gain(ctx.params);
        let input = ctx
            .inputs
            .first()
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;
        ctx.outputs[0] = input
            .map_elements(|x| gain * x)
            .ok_or_else(|| BlockRuntimeError::ShapeMismatch("boolean input to scale".into()))?;
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let gain = c_float_literal(gain(ctx.params));
        let input = ctx.inputs[0].clone();
        ctx.assign_elementwise(0, |i| format!("{gain} * {}", input.element(i)));
        Ok(())
    }
}
