use signalflow_model::params::BlockParams;
use signalflow_model::types::SignalType;
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts};

/// Swaps matrix axes. A vector input becomes a 1×n row matrix; a scalar
/// passes through.
pub struct TransposeBlock;

impl BlockModule for TransposeBlock {
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
            Some(SignalType::Scalar(b)) => Ok(vec![SignalType::Scalar(b)]),
            Some(SignalType::Vector(b, n)) => Ok(vec![SignalType::Matrix(b, 1, n)]),
            Some(SignalType::Matrix(b, r, c)) => Ok(vec![SignalType::Matrix(b, c, r)]),
        }
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let input = ctx
            .inputs
            .first()
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;
        ctx.outputs[0] = match input {
            SignalValue::Scalar(_) | SignalValue::Bool(_) => input.clone(),
            SignalValue::Vector(v) => {
                let t = v.transpose();
                SignalValue::Matrix(nalgebra::DMatrix::from_iterator(
                    t.nrows(),
                    t.ncols(),
                    t.iter().cloned(),
                ))
            }
            SignalValue::BoolVector(v) => {
                let t = v.transpose();
                SignalValue::BoolMatrix(nalgebra::DMatrix::from_iterator(
                    t.nrows(),
                    t.ncols(),
                    t.iter().cloned(),
                ))
            }
            SignalValue::Matrix(m) => SignalValue::Matrix(m.transpose()),
            SignalValue::BoolMatrix(m) => SignalValue::BoolMatrix(m.transpose()),
        };
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let input = ctx.inputs[0].clone();
        let output = ctx.outputs[0].clone();
        match (input.ty, output.ty) {
            (SignalType::Scalar(_), _) => {
                ctx.assign_elementwise(0, |_| input.element(0));
            }
            (SignalType::Vector(_, _), _) => {
                // row matrix: same element order
                ctx.assign_elementwise(0, |i| input.element(i));
            }
            (SignalType::Matrix(_, _, _), SignalType::Matrix(_, out_rows, out_cols)) => {
                for r in 0..out_rows {
                    for c in 0..out_cols {
                        let line = format!("{} = {};", output.at(r, c), input.at(c, r));
                        ctx.line(line);
                    }
                }
            }
            _ => return Err("transpose: inconsistent output shape".to_string()),
        }
        Ok(())
    }
}
