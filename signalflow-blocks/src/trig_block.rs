use signalflow_model::params::{BlockParams, TrigFunction};
use signalflow_model::types::{BaseType, SignalType};
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{
    require_scalar_input, AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts,
};

/// Scalar trigonometry. `sincos` produces two outputs, `atan2` consumes two
/// inputs, everything else is unary.
pub struct TrigBlock;

fn function(params: &BlockParams) -> TrigFunction {
    match params {
        BlockParams::Trig(p) => p.function,
        _ => TrigFunction::Sin,
    }
}

impl BlockModule for TrigBlock {
    fn port_counts(&self, params: &BlockParams) -> PortCounts {
        match function(params) {
            TrigFunction::Sincos => PortCounts::new(1, 2),
            TrigFunction::Atan2 => PortCounts::new(2, 1),
            _ => PortCounts::new(1, 1),
        }
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        let counts = self.port_counts(params);
        for port in 0..counts.inputs {
            require_scalar_input(input_types, port)?;
        }
        let scalar = SignalType::Scalar(BaseType::Double);
        Ok(vec![scalar; counts.outputs.unwrap_or(1)])
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let x = ctx
            .inputs
            .first()
            .and_then(SignalValue::as_scalar)
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;
        match function(ctx.params) {
            TrigFunction::Sin => ctx.outputs[0] = SignalValue::Scalar(x.sin()),
            TrigFunction::Cos => ctx.outputs[0] = SignalValue::Scalar(x.cos()),
            TrigFunction::Tan => ctx.outputs[0] = SignalValue::Scalar(x.tan()),
            TrigFunction::Asin => ctx.outputs[0] = SignalValue::Scalar(x.asin()),
            TrigFunction::Acos => ctx.outputs[0] = SignalValue::Scalar(x.acos()),
            TrigFunction::Atan => ctx.outputs[0] = SignalValue::Scalar(x.atan()),
            TrigFunction::Sincos => {
                ctx.outputs[0] = SignalValue::Scalar(x.sin());
                ctx.outputs[1] = SignalValue::Scalar(x.cos());
            }
            TrigFunction::Atan2 => {
                let y = ctx
                    .inputs
                    .get(1)
                    .and_then(SignalValue::as_scalar)
                    .ok_or(BlockRuntimeError::MissingInput { port: 1 })?;
                ctx.outputs[0] = SignalValue::Scalar(x.atan2(y));
            }
        }
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let x = ctx.inputs[0].element(0);
        match function(ctx.params) {
            TrigFunction::Sincos => {
                let sin_out = ctx.outputs[0].element(0);
                let cos_out = ctx.outputs[1].element(0);
                ctx.line(format!("{sin_out} = sin({x});"));
                ctx.line(format!("{cos_out} = cos({x});"));
            }
            TrigFunction::Atan2 => {
                let y = ctx.inputs[1].element(0);
                let out = ctx.outputs[0].element(0);
                ctx.line(format!("{out} = atan2({x}, {y});"));
            }
            f => {
                let name = match f {
                    TrigFunction::Sin => "sin",
                    TrigFunction::Cos => "cos",
                    TrigFunction::Tan => "tan",
                    TrigFunction::Asin => "asin",
                    TrigFunction::Acos => "acos",
                    TrigFunction::Atan => "atan",
                    TrigFunction::Sincos | TrigFunction::Atan2 => unreachable!(),
                };
                let out = ctx.outputs[0].element(0);
                ctx.line(format!("{out} = {name}({x});"));
            }
        }
        Ok(())
    }
}
