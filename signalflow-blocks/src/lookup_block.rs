//! 1-D and 2-D table lookup with linear / bilinear interpolation.
//!
//! Out-of-range inputs either clamp to the endpoint value or extend the end
//! slope, per the `extrapolation` parameter. The C helpers emitted by the
//! code generator implement the identical arithmetic so trajectories stay
//! comparable.

use signalflow_model::c_float_literal;
use signalflow_model::params::{BlockParams, Extrapolation, Lookup1dParams, Lookup2dParams};
use signalflow_model::types::{BaseType, SignalType};
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{
    require_scalar_input, AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts,
};

/// Segment search shared by both tables: the index of the interpolation
/// interval for `x`, always within `[0, n-2]`.
fn segment(xs: &[f64], x: f64) -> usize {
    let mut i = 0;
    while i < xs.len() - 2 && x > xs[i + 1] {
        i += 1;
    }
    i
}

pub(crate) fn interp_1d(xs: &[f64], ys: &[f64], mode: Extrapolation, x: f64) -> f64 {
    let x = match mode {
        Extrapolation::Extrapolate => x,
        Extrapolation::Clamp => x.clamp(xs[0], xs[xs.len() - 1]),
    };
    let i = segment(xs, x);
    let t = (x - xs[i]) / (xs[i + 1] - xs[i]);
    ys[i] + t * (ys[i + 1] - ys[i])
}

pub(crate) fn interp_2d(
    xs: &[f64],
    ys: &[f64],
    table: &[Vec<f64>],
    mode: Extrapolation,
    x: f64,
    y: f64,
) -> f64 {
    let (x, y) = match mode {
        Extrapolation::Extrapolate => (x, y),
        Extrapolation::Clamp => (
            x.clamp(xs[0], xs[xs.len() - 1]),
            y.clamp(ys[0], ys[ys.len() - 1]),
        ),
    };
    let j = segment(xs, x);
    let i = segment(ys, y);
    let tx = (x - xs[j]) / (xs[j + 1] - xs[j]);
    let ty = (y - ys[i]) / (ys[i + 1] - ys[i]);
    let top = table[i][j] + tx * (table[i][j + 1] - table[i][j]);
    let bottom = table[i + 1][j] + tx * (table[i + 1][j + 1] - table[i + 1][j]);
    top + ty * (bottom - top)
}

fn emit_f64_array(ctx: &mut CgenCtx, name: &str, values: &[f64]) {
    let body = values
        .iter()
        .map(|x| c_float_literal(*x))
        .collect::<Vec<_>>()
        .join(", ");
    ctx.line(format!(
        "static const double {name}[{}] = {{{body}}};",
        values.len()
    ));
}

pub struct Lookup1dBlock;

fn lookup_1d_params(params: &BlockParams) -> Result<&Lookup1dParams, BlockRuntimeError> {
    match params {
        BlockParams::Lookup1d(p) => Ok(p),
        _ => Err(BlockRuntimeError::BadState("missing lookup parameters")),
    }
}

impl BlockModule for Lookup1dBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(1, 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        require_scalar_input(input_types, 0)?;
        Ok(vec![SignalType::Scalar(BaseType::Double)])
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let p = lookup_1d_params(ctx.params)?;
        let x = ctx
            .inputs
            .first()
            .and_then(SignalValue::as_scalar)
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;
        ctx.outputs[0] = SignalValue::Scalar(interp_1d(
            &p.input_values,
            &p.output_values,
            p.extrapolation,
            x,
        ));
        Ok(())
    }

    fn emit_static_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let p = match ctx.params {
            BlockParams::Lookup1d(p) => p.clone(),
            _ => return Err("missing lookup parameters".to_string()),
        };
        let ident = ctx.block_ident.clone();
        emit_f64_array(ctx, &format!("{ident}_xs"), &p.input_values);
        emit_f64_array(ctx, &format!("{ident}_ys"), &p.output_values);
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let p = match ctx.params {
            BlockParams::Lookup1d(p) => p.clone(),
            _ => return Err("missing lookup parameters".to_string()),
        };
        let ident = ctx.block_ident.clone();
        let x = ctx.inputs[0].element(0);
        let out = ctx.outputs[0].element(0);
        let extrapolate = (p.extrapolation == Extrapolation::Extrapolate) as u8;
        ctx.line(format!(
            "{out} = sf_lookup_1d({ident}_xs, {ident}_ys, {}, {extrapolate}, {x});",
            p.input_values.len()
        ));
        Ok(())
    }
}

pub struct Lookup2dBlock;

fn lookup_2d_params(params: &BlockParams) -> Result<&Lookup2dParams, BlockRuntimeError> {
    match params {
        BlockParams::Lookup2d(p) => Ok(p),
        _ => Err(BlockRuntimeError::BadState("missing lookup parameters")),
    }
}

impl BlockModule for Lookup2dBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(2, 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        require_scalar_input(input_types, 0)?;
        require_scalar_input(input_types, 1)?;
        Ok(vec![SignalType::Scalar(BaseType::Double)])
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let p = lookup_2d_params(ctx.params)?;
        let x = ctx
            .inputs
            .first()
            .and_then(SignalValue::as_scalar)
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;
        let y = ctx
            .inputs
            .get(1)
            .and_then(SignalValue::as_scalar)
            .ok_or(BlockRuntimeError::MissingInput { port: 1 })?;
        ctx.outputs[0] = SignalValue::Scalar(interp_2d(
            &p.input1_values,
            &p.input2_values,
            &p.output_table,
            p.extrapolation,
            x,
            y,
        ));
        Ok(())
    }

    fn emit_static_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let p = match ctx.params {
            BlockParams::Lookup2d(p) => p.clone(),
            _ => return Err("missing lookup parameters".to_string()),
        };
        let ident = ctx.block_ident.clone();
        emit_f64_array(ctx, &format!("{ident}_xs"), &p.input1_values);
        emit_f64_array(ctx, &format!("{ident}_ys"), &p.input2_values);
        let rows = p.output_table.len();
        let cols = p.input1_values.len();
        let body = p
            .output_table
            .iter()
            .map(|row| {
                format!(
                    "{{{}}}",
                    row.iter()
                        .map(|x| c_float_literal(*x))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        ctx.line(format!(
            "static const double {ident}_table[{rows}][{cols}] = {{{body}}};"
        ));
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let p = match ctx.params {
            BlockParams::Lookup2d(p) => p.clone(),
            _ => return Err("missing lookup parameters".to_string()),
        };
        let ident = ctx.block_ident.clone();
        let x = ctx.inputs[0].element(0);
        let y = ctx.inputs[1].element(0);
        let out = ctx.outputs[0].element(0);
        let extrapolate = (p.extrapolation == Extrapolation::Extrapolate) as u8;
        ctx.line(format!(
            "{out} = sf_lookup_2d({ident}_xs, {cols}, {ident}_ys, {rows}, &{ident}_table[0][0], {extrapolate}, {x}, {y});",
            cols = p.input1_values.len(),
            rows = p.input2_values.len()
        ));
        Ok(())
    }
}
