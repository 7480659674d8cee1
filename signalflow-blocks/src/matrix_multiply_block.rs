use log::error;

use signalflow_model::params::BlockParams;
use signalflow_model::types::SignalType;
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts};

/// Shape-dispatched product of two numeric inputs.
///
/// Nine cases: scalar×scalar, scalar×vec, vec×scalar, scalar×mat,
/// mat×scalar, vec×vec (same length, element-wise), mat×vec, vec×mat and
/// mat×mat. A runtime dimension mismatch (which the propagator should have
/// rejected already) zeroes the output and logs an error.
pub struct MatrixMultiplyBlock;

fn infer_product(a: &SignalType, b: &SignalType) -> Result<SignalType, String> {
    use SignalType::*;
    if a.is_bool() || b.is_bool() {
        return Err("Cannot determine output type: arithmetic over boolean signals".to_string());
    }
    let base = a.base();
    match (*a, *b) {
        (Scalar(_), Scalar(_)) => Ok(Scalar(base)),
        (Scalar(_), Vector(_, n)) | (Vector(_, n), Scalar(_)) => Ok(Vector(base, n)),
        (Scalar(_), Matrix(_, r, c)) | (Matrix(_, r, c), Scalar(_)) => Ok(Matrix(base, r, c)),
        (Vector(_, n), Vector(_, m)) if n == m => Ok(Vector(base, n)),
        (Vector(_, n), Vector(_, m)) => Err(format!(
            "Cannot determine output type: element-wise vector product needs equal lengths, got {n} and {m}"
        )),
        (Matrix(_, r, c), Vector(_, n)) if c == n => Ok(Vector(base, r)),
        (Matrix(_, _, c), Vector(_, n)) => Err(format!(
            "Cannot determine output type: matrix has {c} columns but vector has {n} elements"
        )),
        (Vector(_, n), Matrix(_, r, c)) if n == r => Ok(Vector(base, c)),
        (Vector(_, n), Matrix(_, r, _)) => Err(format!(
            "Cannot determine output type: vector has {n} elements but matrix has {r} rows"
        )),
        (Matrix(_, r1, c1), Matrix(_, r2, c2)) if c1 == r2 => Ok(Matrix(base, r1, c2)),
        (Matrix(_, _, c1), Matrix(_, r2, _)) => Err(format!(
            "Cannot determine output type: left matrix has {c1} columns but right matrix has {r2} rows"
        )),
    }
}

fn multiply(a: &SignalValue, b: &SignalValue) -> Option<SignalValue> {
    use SignalValue::*;
    match (a, b) {
        (Scalar(x), Scalar(y)) => Some(Scalar(x * y)),
        (Scalar(x), Vector(v)) | (Vector(v), Scalar(x)) => Some(Vector(v * *x)),
        (Scalar(x), Matrix(m)) | (Matrix(m), Scalar(x)) => Some(Matrix(m * *x)),
        (Vector(u), Vector(v)) if u.len() == v.len() => Some(Vector(u.component_mul(v))),
        (Matrix(m), Vector(v)) if m.ncols() == v.len() => Some(Vector(m * v)),
        (Vector(u), Matrix(m)) if u.len() == m.nrows() => {
            Some(Vector((u.transpose() * m).transpose()))
        }
        (Matrix(m1), Matrix(m2)) if m1.ncols() == m2.nrows() => Some(Matrix(m1 * m2)),
        _ => None,
    }
}

impl BlockModule for MatrixMultiplyBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(2, 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        let a = input_types.first().copied().flatten();
        let b = input_types.get(1).copied().flatten();
        match (a, b) {
            (Some(a), Some(b)) => Ok(vec![infer_product(&a, &b)?]),
            _ => Err("Cannot determine output type: not all inputs are connected".to_string()),
        }
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let a = ctx
            .inputs
            .first()
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;
        let b = ctx
            .inputs
            .get(1)
            .ok_or(BlockRuntimeError::MissingInput { port: 1 })?;
        match multiply(a, b) {
            Some(product) => ctx.outputs[0] = product,
            None => {
                error!(
                    "{}: dimension mismatch in matrix multiply, output zeroed",
                    ctx.block_name
                );
                if let Some(ty) = ctx.output_types.first().copied().flatten() {
                    ctx.outputs[0] = SignalValue::default_for(&ty);
                }
            }
        }
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        use SignalType::*;
        let a = ctx.inputs[0].clone();
        let b = ctx.inputs[1].clone();
        match (a.ty, b.ty) {
            // any case with a scalar operand, and element-wise vec×vec,
            // reduce to per-element products
            (Scalar(_), _) => ctx.assign_elementwise(0, |i| {
                format!("{} * {}", a.element(0), b.element(i))
            }),
            (_, Scalar(_)) => ctx.assign_elementwise(0, |i| {
                format!("{} * {}", a.element(i), b.element(0))
            }),
            (Vector(_, n), Vector(_, m)) if n == m => {
                ctx.assign_elementwise(0, |i| format!("{} * {}", a.element(i), b.element(i)))
            }
            (Matrix(_, _, k), Vector(_, _)) => ctx.assign_elementwise(0, |r| {
                (0..k)
                    .map(|j| format!("{} * {}", a.at(r, j), b.element(j)))
                    .collect::<Vec<_>>()
                    .join(" + ")
            }),
            (Vector(_, k), Matrix(_, _, _)) => ctx.assign_elementwise(0, |c| {
                (0..k)
                    .map(|j| format!("{} * {}", a.element(j), b.at(j, c)))
                    .collect::<Vec<_>>()
                    .join(" + ")
            }),
            (Matrix(_, _, k), Matrix(_, _, cols)) => ctx.assign_elementwise(0, |i| {
                let (r, c) = (i / cols, i % cols);
                (0..k)
                    .map(|j| format!("{} * {}", a.at(r, j), b.at(j, c)))
                    .collect::<Vec<_>>()
                    .join(" + ")
            }),
            _ => return Err("matrix multiply: unsupported shape pair".to_string()),
        }
        Ok(())
    }
}
