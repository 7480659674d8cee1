use nalgebra::{DMatrix, DVector};

use signalflow_model::params::{BlockParams, MuxParams};
use signalflow_model::types::SignalType;
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts};

/// Gathers `rows × cols` scalar inputs, in row-major port order, into a
/// matrix of the declared base type. Degenerate shapes flatten: one row or
/// one column produces a vector, 1×1 passes the input through.
pub struct MuxBlock;

fn mux_params(params: &BlockParams) -> MuxParams {
    match params {
        BlockParams::Mux(p) => *p,
        _ => MuxParams {
            rows: 1,
            cols: 1,
            base_type: signalflow_model::types::BaseType::Double,
        },
    }
}

fn output_type(p: &MuxParams) -> SignalType {
    match (p.rows, p.cols) {
        (1, 1) => SignalType::Scalar(p.base_type),
        (1, n) | (n, 1) => SignalType::Vector(p.base_type, n),
        (r, c) => SignalType::Matrix(p.base_type, r, c),
    }
}

impl BlockModule for MuxBlock {
    fn port_counts(&self, params: &BlockParams) -> PortCounts {
        let p = mux_params(params);
        PortCounts::new(p.rows * p.cols, 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        let p = mux_params(params);
        for port in 0..p.rows * p.cols {
            match input_types.get(port).copied().flatten() {
                None => {
                    return Err(
                        "Cannot determine output type: not all inputs are connected".to_string()
                    )
                }
                Some(t) if !t.is_scalar() => {
                    return Err(format!("mux input {port} must be a scalar, got {t}"))
                }
                Some(t) if t.is_bool() != p.base_type.is_bool() => {
                    return Err(format!(
                        "mux input {port} has base {} but the block gathers {}",
                        t.base(),
                        p.base_type
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(vec![output_type(&p)])
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let p = mux_params(ctx.params);
        let expected = p.rows * p.cols;
        if ctx.inputs.len() < expected {
            return Err(BlockRuntimeError::MissingInput {
                port: ctx.inputs.len(),
            });
        }
        let samples: Vec<f64> = ctx.inputs[..expected]
            .iter()
            .map(|v| v.as_scalar().unwrap_or(0.0))
            .collect();
        ctx.outputs[0] = match output_type(&p) {
            SignalType::Scalar(b) if b.is_bool() => SignalValue::Bool(samples[0] != 0.0),
            SignalType::Scalar(_) => SignalValue::Scalar(samples[0]),
            SignalType::Vector(b, n) if b.is_bool() => SignalValue::BoolVector(
                DVector::from_iterator(n, samples.iter().map(|x| *x != 0.0)),
            ),
            SignalType::Vector(_, n) => SignalValue::Vector(DVector::from_vec(samples[..n].to_vec())),
            SignalType::Matrix(b, r, c) if b.is_bool() => SignalValue::BoolMatrix(
                DMatrix::from_row_iterator(r, c, samples.iter().map(|x| *x != 0.0)),
            ),
            SignalType::Matrix(_, r, c) => {
                SignalValue::Matrix(DMatrix::from_row_slice(r, c, &samples))
            }
        };
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let inputs = ctx.inputs.clone();
        ctx.assign_elementwise(0, |i| inputs[i].element(0));
        Ok(())
    }
}

/// Splits its input into one scalar output per element, row-major.
pub struct DemuxBlock;

impl BlockModule for DemuxBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        // output arity follows the inferred input shape
        PortCounts {
            inputs: 1,
            outputs: None,
        }
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        match input_types.first().copied().flatten() {
            None => Err("Cannot determine output type: input is not connected".to_string()),
            Some(t) => Ok(vec![SignalType::Scalar(t.base()); t.element_count()]),
        }
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let input = ctx
            .inputs
            .first()
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;
        let bool_out = input.is_bool();
        for (port, x) in input.elements_row_major().into_iter().enumerate() {
            if port >= ctx.outputs.len() {
                break;
            }
            ctx.outputs[port] = if bool_out {
                SignalValue::Bool(x != 0.0)
            } else {
                SignalValue::Scalar(x)
            };
        }
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let input = ctx.inputs[0].clone();
        for port in 0..ctx.outputs.len() {
            let line = format!("{} = {};", ctx.outputs[port].element(0), input.element(port));
            ctx.line(line);
        }
        Ok(())
    }
}
