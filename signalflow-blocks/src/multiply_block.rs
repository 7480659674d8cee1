use signalflow_model::params::BlockParams;
use signalflow_model::types::SignalType;
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts};

/// Element-wise product of 2–10 inputs. The output takes the shape of the
/// first input; scalar operands broadcast to that shape.
pub struct MultiplyBlock;

fn num_inputs(params: &BlockParams) -> usize {
    match params {
        BlockParams::Multiply(p) => p.num_inputs,
        _ => 2,
    }
}

impl BlockModule for MultiplyBlock {
    fn port_counts(&self, params: &BlockParams) -> PortCounts {
        PortCounts::new(num_inputs(params), 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        let n = num_inputs(params);
        if input_types.len() < n || input_types.iter().take(n).any(Option::is_none) {
            return Err("Cannot determine output type: not all inputs are connected".to_string());
        }
        let first = input_types[0].unwrap();
        if first.is_bool() {
            return Err(
                "Cannot determine output type: arithmetic over boolean signals".to_string(),
            );
        }
        for ty in input_types.iter().take(n).flatten().skip(1) {
            if ty.is_bool() {
                return Err(
                    "Cannot determine output type: arithmetic over boolean signals".to_string(),
                );
            }
            // scalars of the same base broadcast; anything else must match
            let matches = *ty == first || (ty.is_scalar() && ty.base() == first.base());
            if !matches {
                return Err(format!(
                    "Cannot determine output type: {}",
                    SignalType::compatibility_error(&first, ty).unwrap_or_default()
                ));
            }
        }
        Ok(vec![first])
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let first = ctx
            .inputs
            .first()
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;
        let mut acc = first
            .map_elements(|x| x)
            .ok_or_else(|| BlockRuntimeError::ShapeMismatch("boolean input to multiply".into()))?;
        for (i, input) in ctx.inputs.iter().enumerate().skip(1) {
            acc = match input.as_scalar() {
                Some(s) => acc.map_elements(|x| x * s).unwrap(),
                None => acc.zip_elements(input, |a, b| a * b).ok_or_else(|| {
                    BlockRuntimeError::ShapeMismatch(format!(
                        "input {i} does not match the shape of input 0"
                    ))
                })?,
            };
        }
        ctx.outputs[0] = acc;
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let inputs = ctx.inputs.clone();
        ctx.assign_elementwise(0, |i| {
            inputs
                .iter()
                .map(|input| {
                    // scalars broadcast: always read their only element
                    if input.ty.is_scalar() {
                        input.element(0)
                    } else {
                        input.element(i)
                    }
                })
                .collect::<Vec<_>>()
                .join(" * ")
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::run_algebraic;
    use nalgebra::DVector;
    use signalflow_model::BlockKind;

    fn params(n: usize) -> BlockParams {
        BlockParams::build(
            BlockKind::Multiply,
            serde_json::json!({"numInputs": n}).as_object().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_multiply_scalars() {
        let out = run_algebraic(
            &MultiplyBlock,
            &params(3),
            &[
                SignalValue::Scalar(2.0),
                SignalValue::Scalar(3.0),
                SignalValue::Scalar(4.0),
            ],
        );
        assert_eq!(out[0], SignalValue::Scalar(24.0));
    }

    #[test]
    fn test_multiply_vector_by_scalar() {
        let out = run_algebraic(
            &MultiplyBlock,
            &params(2),
            &[
                SignalValue::Vector(DVector::from_vec(vec![1.0, 2.0, 3.0])),
                SignalValue::Scalar(2.0),
            ],
        );
        assert_eq!(
            out[0],
            SignalValue::Vector(DVector::from_vec(vec![2.0, 4.0, 6.0]))
        );
    }

    #[test]
    fn test_multiply_elementwise_vectors() {
        let out = run_algebraic(
            &MultiplyBlock,
            &params(2),
            &[
                SignalValue::Vector(DVector::from_vec(vec![1.0, 2.0])),
                SignalValue::Vector(DVector::from_vec(vec![10.0, 20.0])),
            ],
        );
        assert_eq!(
            out[0],
            SignalValue::Vector(DVector::from_vec(vec![10.0, 40.0]))
        );
    }

    #[test]
    fn test_multiply_infer_scalar_broadcast() {
        let v: SignalType = "double[3]".parse().unwrap();
        let s: SignalType = "double".parse().unwrap();
        let out = MultiplyBlock
            .infer_output_types(&[Some(v), Some(s)], &params(2))
            .unwrap();
        assert_eq!(out, vec![v]);

        // vector shapes must match exactly
        let w: SignalType = "double[4]".parse().unwrap();
        assert!(MultiplyBlock
            .infer_output_types(&[Some(v), Some(w)], &params(2))
            .is_err());
    }
}
