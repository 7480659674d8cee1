//! Continuous linear SISO transfer function, applied element-wise.
//!
//! The numerator/denominator pair is realized in controllable companion
//! form at every order. For a denominator of order n the block owns n state
//! variables per element of its input shape; each element is an independent
//! instance. The algebraic pass is a pure read of the current state; the
//! derivative pass feeds the integrator.

use signalflow_model::c_float_literal;
use signalflow_model::params::{BlockParams, TransferFunctionParams};
use signalflow_model::types::SignalType;
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{
    AlgebraicCtx, BlockModule, BlockRuntimeError, InternalState, PortCounts,
    TransferFunctionState,
};

pub struct TransferFunctionBlock;

/// Companion-form realization of `num(s) / den(s)` with a monic
/// denominator:
///
///   ẋ₁ = x₂, …, ẋₙ₋₁ = xₙ
///   ẋₙ = u − (a₁xₙ + a₂xₙ₋₁ + … + aₙx₁)
///   y  = Σ cⱼxⱼ + d·u
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Realization {
    /// a₁ … aₙ of the monic denominator.
    pub a: Vec<f64>,
    /// Output weight of each state, c[j] multiplying x_{j+1}.
    pub c: Vec<f64>,
    /// Direct feedthrough.
    pub d: f64,
}

impl Realization {
    pub fn from_params(p: &TransferFunctionParams) -> Realization {
        let n = p.order();
        let lead = p.denominator[0];
        // numerator front-padded with zeros to denominator length, both
        // normalized by the leading denominator coefficient
        let mut b = vec![0.0; n + 1 - p.numerator.len()];
        b.extend(p.numerator.iter().map(|x| x / lead));
        let a: Vec<f64> = p.denominator[1..].iter().map(|x| x / lead).collect();
        let d = b[0];
        let c: Vec<f64> = (1..=n).map(|j| b[n + 1 - j] - a[n - j] * d).collect();
        Realization { a, c, d }
    }

    pub fn order(&self) -> usize {
        self.a.len()
    }

    pub fn output(&self, state: &nalgebra::DVector<f64>, u: f64) -> f64 {
        self.c
            .iter()
            .zip(state.iter())
            .map(|(c, x)| c * x)
            .sum::<f64>()
            + self.d * u
    }

    pub fn derivatives(&self, state: &nalgebra::DVector<f64>, u: f64, out: &mut Vec<f64>) {
        let n = self.order();
        for i in 0..n.saturating_sub(1) {
            out.push(state[i + 1]);
        }
        if n > 0 {
            let feedback: f64 = (1..=n).map(|k| self.a[k - 1] * state[n - k]).sum();
            out.push(u - feedback);
        }
    }
}

fn tf_params(params: &BlockParams) -> Result<&TransferFunctionParams, BlockRuntimeError> {
    match params {
        BlockParams::TransferFunction(p) => Ok(p),
        _ => Err(BlockRuntimeError::BadState(
            "missing transfer function parameters",
        )),
    }
}

impl BlockModule for TransferFunctionBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(1, 1)
    }

    fn requires_state(&self, params: &BlockParams) -> bool {
        matches!(params, BlockParams::TransferFunction(p) if p.order() > 0)
    }

    fn init_state(&self, params: &BlockParams, input_type: Option<&SignalType>) -> InternalState {
        let order = match params {
            BlockParams::TransferFunction(p) => p.order(),
            _ => 0,
        };
        if order == 0 {
            return InternalState::None;
        }
        let elements = input_type.map(SignalType::element_count).unwrap_or(1);
        InternalState::TransferFunction(TransferFunctionState::new(elements, order))
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        match input_types.first().copied().flatten() {
            None => Err("Cannot determine output type: input is not connected".to_string()),
            Some(t) if t.is_bool() => {
                Err("Cannot determine output type: transfer function over boolean signals"
                    .to_string())
            }
            Some(t) => Ok(vec![t]),
        }
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let p = tf_params(ctx.params)?;
        let realization = Realization::from_params(p);
        let input = ctx
            .inputs
            .first()
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;

        if realization.order() == 0 {
            // pure gain num[0]/den[0]
            let gain = p.numerator[0] / p.denominator[0];
            ctx.outputs[0] = input
                .map_elements(|u| gain * u)
                .ok_or_else(|| BlockRuntimeError::ShapeMismatch("boolean input".into()))?;
            return Ok(());
        }

        let state = match &ctx.state {
            InternalState::TransferFunction(s) => s,
            _ => return Err(BlockRuntimeError::BadState("transfer function without state")),
        };
        if state.states.len() != input.element_count() {
            return Err(BlockRuntimeError::ShapeMismatch(format!(
                "state holds {} elements but input has {}",
                state.states.len(),
                input.element_count()
            )));
        }
        // states are kept in row-major element order
        ctx.outputs[0] = match input {
            SignalValue::Scalar(u) => {
                SignalValue::Scalar(realization.output(&state.states[0], *u))
            }
            SignalValue::Vector(v) => SignalValue::Vector(nalgebra::DVector::from_fn(
                v.len(),
                |i, _| realization.output(&state.states[i], v[i]),
            )),
            SignalValue::Matrix(m) => {
                let cols = m.ncols();
                SignalValue::Matrix(nalgebra::DMatrix::from_fn(m.nrows(), cols, |r, c| {
                    realization.output(&state.states[r * cols + c], m[(r, c)])
                }))
            }
            _ => {
                return Err(BlockRuntimeError::ShapeMismatch(
                    "boolean input to transfer function".into(),
                ))
            }
        };
        Ok(())
    }

    fn derivatives(
        &self,
        state: &InternalState,
        inputs: &[SignalValue],
        params: &BlockParams,
        _t: f64,
    ) -> Vec<f64> {
        let p = match params {
            BlockParams::TransferFunction(p) => p,
            _ => return Vec::new(),
        };
        let realization = Realization::from_params(p);
        let state = match state {
            InternalState::TransferFunction(s) => s,
            _ => return Vec::new(),
        };
        let elements = inputs
            .first()
            .map(SignalValue::elements_row_major)
            .unwrap_or_default();
        let mut out = Vec::with_capacity(state.len());
        for (e, element_state) in state.states.iter().enumerate() {
            let u = elements.get(e).copied().unwrap_or(0.0);
            realization.derivatives(element_state, u, &mut out);
        }
        out
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let p = match ctx.params {
            BlockParams::TransferFunction(p) => p.clone(),
            _ => return Err("missing transfer function parameters".to_string()),
        };
        let realization = Realization::from_params(&p);
        let input = ctx.inputs[0].clone();

        if realization.order() == 0 {
            let gain = c_float_literal(p.numerator[0] / p.denominator[0]);
            ctx.assign_elementwise(0, |i| format!("{gain} * {}", input.element(i)));
            return Ok(());
        }

        let state = ctx.state.clone().ok_or("stateful block without a state array")?;
        ctx.assign_elementwise(0, |e| {
            let mut terms: Vec<String> = realization
                .c
                .iter()
                .enumerate()
                .filter(|(_, c)| **c != 0.0)
                .map(|(j, c)| format!("{} * {}", c_float_literal(*c), state.at(e, j)))
                .collect();
            if realization.d != 0.0 {
                terms.push(format!(
                    "{} * {}",
                    c_float_literal(realization.d),
                    input.element(e)
                ));
            }
            if terms.is_empty() {
                "0.0".to_string()
            } else {
                terms.join(" + ")
            }
        });
        Ok(())
    }

    fn emit_derivatives_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let p = match ctx.params {
            BlockParams::TransferFunction(p) => p.clone(),
            _ => return Err("missing transfer function parameters".to_string()),
        };
        let realization = Realization::from_params(&p);
        let n = realization.order();
        if n == 0 {
            return Ok(());
        }
        let state = ctx.state.clone().ok_or("stateful block without a state array")?;
        let derivs = ctx.derivs.clone().ok_or("no derivative array in scope")?;
        let input = ctx.inputs[0].clone();

        for e in 0..state.elements {
            for i in 0..n - 1 {
                let line = format!("{} = {};", derivs.at(e, i), state.at(e, i + 1));
                ctx.line(line);
            }
            let feedback = (1..=n)
                .map(|k| {
                    format!(
                        "{} * {}",
                        c_float_literal(realization.a[k - 1]),
                        state.at(e, n - k)
                    )
                })
                .collect::<Vec<_>>()
                .join(" + ");
            let line = format!(
                "{} = {} - ({feedback});",
                derivs.at(e, n - 1),
                input.element(e)
            );
            ctx.line(line);
        }
        Ok(())
    }
}
