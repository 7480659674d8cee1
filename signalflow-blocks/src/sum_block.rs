use signalflow_model::params::BlockParams;
use signalflow_model::types::SignalType;
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{
    require_identical_inputs, AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts,
};

/// Signed element-wise sum of 2–10 same-shape inputs. Each character of the
/// `signs` parameter selects the sign of the corresponding input.
pub struct SumBlock;

fn signs(params: &BlockParams) -> &[f64] {
    match params {
        BlockParams::Sum(p) => &p.signs,
        _ => &[],
    }
}

impl BlockModule for SumBlock {
    fn port_counts(&self, params: &BlockParams) -> PortCounts {
        PortCounts::new(signs(params).len(), 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        let ty = require_identical_inputs(input_types, signs(params).len())?;
        if ty.is_bool() {
            return Err(
                "Cannot determine output type: arithmetic over boolean signals".to_string(),
            );
        }
        Ok(vec![ty])
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let signs = signs(ctx.params);
        let first = ctx
            .inputs
            .first()
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;
        let mut acc = first
            .map_elements(|x| signs[0] * x)
            .ok_or_else(|| BlockRuntimeError::ShapeMismatch("boolean input to sum".into()))?;
        for (i, input) in ctx.inputs.iter().enumerate().skip(1) {
            let sign = signs[i];
            acc = acc
                .zip_elements(input, |a, b| a + sign * b)
                .ok_or_else(|| {
                    BlockRuntimeError::ShapeMismatch(format!(
                        "input {i} does not match the shape of input 0"
                    ))
                })?;
        }
        ctx.outputs[0] = acc;
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let signs = signs(ctx.params).to_vec();
        let inputs = ctx.inputs.clone();
        ctx.assign_elementwise(0, |i| {
            let mut expr = String::new();
            for (k, input) in inputs.iter().enumerate() {
                let term = input.element(i);
                if signs[k] >= 0.0 {
                    if !expr.is_empty() {
                        expr.push_str(" + ");
                    }
                    expr.push_str(&term);
                } else if expr.is_empty() {
                    expr.push_str(&format!("-{term}"));
                } else {
                    expr.push_str(&format!(" - {term}"));
                }
            }
            expr
        });
        Ok(())
    }
}
