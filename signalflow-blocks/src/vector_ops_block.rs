//! Vector reductions: magnitude, dot product and 3-D cross product.

use signalflow_model::params::BlockParams;
use signalflow_model::types::{BaseType, SignalType};
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts};

fn vector_input(
    input_types: &[Option<SignalType>],
    port: usize,
) -> Result<(BaseType, usize), String> {
    match input_types.get(port).copied().flatten() {
        None => Err("Cannot determine output type: input is not connected".to_string()),
        Some(SignalType::Vector(b, n)) if !b.is_bool() => Ok((b, n)),
        Some(other) => Err(format!("expected a numeric vector input, got {other}")),
    }
}

fn get_vector<'a>(
    inputs: &'a [SignalValue],
    port: usize,
) -> Result<&'a nalgebra::DVector<f64>, BlockRuntimeError> {
    match inputs.get(port) {
        Some(SignalValue::Vector(v)) => Ok(v),
        Some(_) => Err(BlockRuntimeError::ShapeMismatch(format!(
            "input {port} is not a numeric vector"
        ))),
        None => Err(BlockRuntimeError::MissingInput { port }),
    }
}

/// Euclidean norm of a vector.
pub struct MagBlock;

impl BlockModule for MagBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(1, 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        let (base, _) = vector_input(input_types, 0)?;
        Ok(vec![SignalType::Scalar(base)])
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let v = get_vector(ctx.inputs, 0)?;
        ctx.outputs[0] = SignalValue::Scalar(v.norm());
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let input = ctx.inputs[0].clone();
        let terms = (0..input.element_count())
            .map(|i| {
                let e = input.element(i);
                format!("{e} * {e}")
            })
            .collect::<Vec<_>>()
            .join(" + ");
        let out = ctx.outputs[0].element(0);
        ctx.line(format!("{out} = sqrt({terms});"));
        Ok(())
    }
}

/// Dot product of two equal-length vectors.
pub struct DotBlock;

impl BlockModule for DotBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(2, 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        let (base, n) = vector_input(input_types, 0)?;
        let (_, m) = vector_input(input_types, 1)?;
        if n != m {
            return Err(format!(
                "Cannot determine output type: dot product needs equal lengths, got {n} and {m}"
            ));
        }
        Ok(vec![SignalType::Scalar(base)])
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let u = get_vector(ctx.inputs, 0)?;
        let v = get_vector(ctx.inputs, 1)?;
        if u.len() != v.len() {
            return Err(BlockRuntimeError::ShapeMismatch(format!(
                "dot product lengths differ: {} vs {}",
                u.len(),
                v.len()
            )));
        }
        ctx.outputs[0] = SignalValue::Scalar(u.dot(v));
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let a = ctx.inputs[0].clone();
        let b = ctx.inputs[1].clone();
        let terms = (0..a.element_count())
            .map(|i| format!("{} * {}", a.element(i), b.element(i)))
            .collect::<Vec<_>>()
            .join(" + ");
        let out = ctx.outputs[0].element(0);
        ctx.line(format!("{out} = {terms};"));
        Ok(())
    }
}

/// Cross product of two 3-vectors.
pub struct CrossBlock;

impl BlockModule for CrossBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(2, 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        let (base, n) = vector_input(input_types, 0)?;
        let (_, m) = vector_input(input_types, 1)?;
        if n != 3 || m != 3 {
            return Err(format!(
                "Cannot determine output type: cross product needs two 3-vectors, got lengths {n} and {m}"
            ));
        }
        Ok(vec![SignalType::Vector(base, 3)])
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let u = get_vector(ctx.inputs, 0)?;
        let v = get_vector(ctx.inputs, 1)?;
        if u.len() != 3 || v.len() != 3 {
            return Err(BlockRuntimeError::ShapeMismatch(
                "cross product needs 3-vectors".to_string(),
            ));
        }
        ctx.outputs[0] = SignalValue::Vector(u.cross(v));
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let a = ctx.inputs[0].clone();
        let b = ctx.inputs[1].clone();
        // (a × b)_i with cyclic indices
        for (i, (j, k)) in [(1, 2), (2, 0), (0, 1)].iter().enumerate() {
            let line = format!(
                "{} = {} * {} - {} * {};",
                ctx.outputs[0].element(i),
                a.element(*j),
                b.element(*k),
                a.element(*k),
                b.element(*j)
            );
            ctx.line(line);
        }
        Ok(())
    }
}
