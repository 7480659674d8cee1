//! Single-input element-wise blocks: absolute value and unary minus.

use signalflow_model::params::BlockParams;
use signalflow_model::types::SignalType;

use crate::cgen::CgenCtx;
use crate::module::{AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts};

fn infer_passthrough(
    input_types: &[Option<SignalType>],
    what: &str,
) -> Result<Vec<SignalType>, String> {
    match input_types.first().copied().flatten() {
        None => Err("Cannot determine output type: input is not connected".to_string()),
        Some(t) if t.is_bool() => Err(format!(
            "Cannot determine output type: arithmetic over boolean signals ({what})"
        )),
        Some(t) => Ok(vec![t]),
    }
}

pub struct AbsBlock;

impl BlockModule for AbsBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(1, 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        infer_passthrough(input_types, "abs")
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let input = ctx
            .inputs
            .first()
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;
        ctx.outputs[0] = input
            .map_elements(f64::abs)
            .ok_or_else(|| BlockRuntimeError::ShapeMismatch("boolean input to abs".into()))?;
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let input = ctx.inputs[0].clone();
        ctx.assign_elementwise(0, |i| format!("fabs({})", input.element(i)));
        Ok(())
    }
}

pub struct UminusBlock;

impl BlockModule for UminusBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(1, 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        infer_passthrough(input_types, "uminus")
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let input = ctx
            .inputs
            .first()
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;
        ctx.outputs[0] = input
            .map_elements(|x| -x)
            .ok_or_else(|| BlockRuntimeError::ShapeMismatch("boolean input to uminus".into()))?;
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let input = ctx.inputs[0].clone();
        ctx.assign_elementwise(0, |i| format!("-{}", input.element(i)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::run_algebraic;
    use nalgebra::DMatrix;
    use signalflow_model::value::SignalValue;

    #[test]
    fn test_abs() {
        let out = run_algebraic(&AbsBlock, &BlockParams::None, &[SignalValue::Scalar(-4.0)]);
        assert_eq!(out[0], SignalValue::Scalar(4.0));

        let m = SignalValue::Matrix(DMatrix::from_row_slice(2, 2, &[-1.0, 2.0, -3.0, 4.0]));
        let out = run_algebraic(&AbsBlock, &BlockParams::None, &[m]);
        assert_eq!(
            out[0],
            SignalValue::Matrix(DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]))
        );
    }

    #[test]
    fn test_uminus() {
        let out = run_algebraic(&UminusBlock, &BlockParams::None, &[SignalValue::Scalar(4.0)]);
        assert_eq!(out[0], SignalValue::Scalar(-4.0));
    }

    #[test]
    fn test_bool_rejected() {
        let b: SignalType = "bool".parse().unwrap();
        assert!(AbsBlock
            .infer_output_types(&[Some(b)], &BlockParams::None)
            .is_err());
        assert!(UminusBlock
            .infer_output_types(&[Some(b)], &BlockParams::None)
            .is_err());
    }
}
