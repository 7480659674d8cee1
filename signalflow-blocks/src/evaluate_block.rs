use signalflow_model::params::BlockParams;
use signalflow_model::types::{BaseType, SignalType};
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{
    require_scalar_input, AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts,
};

/// Evaluates a C-style arithmetic expression over its scalar inputs
/// (`in0`, `in1`, …). The parsed expression doubles as the C emission.
pub struct EvaluateBlock;

impl BlockModule for EvaluateBlock {
    fn port_counts(&self, params: &BlockParams) -> PortCounts {
        let inputs = match params {
            BlockParams::Evaluate(p) => p.num_inputs,
            _ => 1,
        };
        PortCounts::new(inputs, 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        for port in 0..self.port_counts(params).inputs {
            require_scalar_input(input_types, port)?;
        }
        Ok(vec![SignalType::Scalar(BaseType::Double)])
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let p = match ctx.params {
            BlockParams::Evaluate(p) => p,
            _ => return Err(BlockRuntimeError::BadState("missing evaluate parameters")),
        };
        let inputs: Vec<f64> = ctx
            .inputs
            .iter()
            .map(|v| v.as_scalar().unwrap_or(0.0))
            .collect();
        ctx.outputs[0] = SignalValue::Scalar(p.expression.eval(&inputs));
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let p = match ctx.params {
            BlockParams::Evaluate(p) => p.clone(),
            _ => return Err("missing evaluate parameters".to_string()),
        };
        let names: Vec<String> = ctx.inputs.iter().map(|i| i.element(0)).collect();
        let out = ctx.outputs[0].element(0);
        ctx.line(format!("{out} = {};", p.expression.to_c(&names)));
        Ok(())
    }
}
