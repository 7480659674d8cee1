use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use signalflow_model::c_float_literal;
use signalflow_model::params::{BlockParams, SignalShape, SourceParams};
use signalflow_model::types::SignalType;
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{
    AlgebraicCtx, BlockModule, BlockRuntimeError, InternalState, PortCounts,
};

use core::f64::consts::PI;

/// Signal generator. Produces one scalar waveform sample per step and
/// broadcasts it to the declared output shape.
pub struct SourceBlock;

fn source_params(params: &BlockParams) -> Option<&SourceParams> {
    match params {
        BlockParams::Source(p) => Some(p),
        _ => None,
    }
}

/// Waveform sample at time `t`. Noise draws from the block's rng instead.
fn sample(p: &SourceParams, t: f64) -> f64 {
    match p.shape {
        SignalShape::Constant => p.value,
        SignalShape::Step => {
            if t >= p.step_time {
                p.step_value
            } else {
                0.0
            }
        }
        SignalShape::Ramp => p.slope * (t - p.start_time).max(0.0),
        SignalShape::Sine => p.amplitude * (2.0 * PI * p.frequency * t + p.phase).sin() + p.offset,
        SignalShape::Square => {
            let s = (2.0 * PI * p.frequency * t + p.phase).sin();
            p.amplitude * if s >= 0.0 { 1.0 } else { -1.0 } + p.offset
        }
        SignalShape::Triangle => {
            p.amplitude * (2.0 / PI) * (2.0 * PI * p.frequency * t + p.phase).sin().asin()
                + p.offset
        }
        SignalShape::Chirp => p.amplitude * chirp_phase(p, t).sin(),
        SignalShape::Noise => 0.0,
    }
}

/// Instantaneous phase of a linear chirp: sweeps f0 → f1 over `duration`,
/// then holds f1.
fn chirp_phase(p: &SourceParams, t: f64) -> f64 {
    if t <= p.duration {
        2.0 * PI * (p.f0 * t + (p.f1 - p.f0) * t * t / (2.0 * p.duration))
    } else {
        let end = 2.0 * PI * (p.f0 * p.duration + (p.f1 - p.f0) * p.duration / 2.0);
        end + 2.0 * PI * p.f1 * (t - p.duration)
    }
}

impl BlockModule for SourceBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(0, 1)
    }

    fn init_state(&self, params: &BlockParams, _input_type: Option<&SignalType>) -> InternalState {
        match source_params(params) {
            Some(p) if p.shape == SignalShape::Noise => {
                InternalState::Noise(SmallRng::from_entropy())
            }
            _ => InternalState::None,
        }
    }

    fn infer_output_types(
        &self,
        _input_types: &[Option<SignalType>],
        params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        let p = source_params(params).ok_or("source block has no parameters")?;
        Ok(vec![p.data_type])
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let p = source_params(ctx.params)
            .ok_or(BlockRuntimeError::BadState("missing source parameters"))?;
        let value = match (p.shape, &mut *ctx.state) {
            (SignalShape::Noise, InternalState::Noise(rng)) => {
                p.mean + p.amplitude * rng.gen_range(-1.0..1.0)
            }
            (SignalShape::Noise, _) => {
                return Err(BlockRuntimeError::BadState("noise source without rng"))
            }
            _ => sample(p, ctx.time),
        };
        ctx.outputs[0] = SignalValue::broadcast(value, &p.data_type);
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let p = source_params(ctx.params).ok_or("source block has no parameters")?.clone();
        let t = ctx.time_expr.clone();
        let lit = c_float_literal;
        let omega = format!(
            "(2.0 * M_PI * {} * {t} + {})",
            lit(p.frequency),
            lit(p.phase)
        );
        let expr = match p.shape {
            SignalShape::Constant => lit(p.value),
            SignalShape::Step => format!(
                "(({t} >= {}) ? {} : 0.0)",
                lit(p.step_time),
                lit(p.step_value)
            ),
            SignalShape::Ramp => format!(
                "{} * fmax({t} - {}, 0.0)",
                lit(p.slope),
                lit(p.start_time)
            ),
            SignalShape::Sine => format!("{} * sin({omega}) + {}", lit(p.amplitude), lit(p.offset)),
            SignalShape::Square => format!(
                "{} * ((sin({omega}) >= 0.0) ? 1.0 : -1.0) + {}",
                lit(p.amplitude),
                lit(p.offset)
            ),
            SignalShape::Triangle => format!(
                "{} * (2.0 / M_PI) * asin(sin({omega})) + {}",
                lit(p.amplitude),
                lit(p.offset)
            ),
            SignalShape::Chirp => {
                let ramp_phase = format!(
                    "(2.0 * M_PI * ({f0} * {t} + ({f1} - {f0}) * {t} * {t} / (2.0 * {dur})))",
                    f0 = lit(p.f0),
                    f1 = lit(p.f1),
                    dur = lit(p.duration)
                );
                let end_phase = format!(
                    "(2.0 * M_PI * ({f0} * {dur} + ({f1} - {f0}) * {dur} / 2.0))",
                    f0 = lit(p.f0),
                    f1 = lit(p.f1),
                    dur = lit(p.duration)
                );
                format!(
                    "{amp} * sin(({t} <= {dur}) ? {ramp_phase} : ({end_phase} + 2.0 * M_PI * {f1} * ({t} - {dur})))",
                    amp = lit(p.amplitude),
                    dur = lit(p.duration),
                    f1 = lit(p.f1)
                )
            }
            SignalShape::Noise => format!(
                "{} + {} * (2.0 * ((double)rand() / (double)RAND_MAX) - 1.0)",
                lit(p.mean),
                lit(p.amplitude)
            ),
        };
        // broadcast the sample to every element of the declared shape
        let value_var = format!("{}_sample", ctx.block_ident);
        ctx.line(format!("double {value_var} = {expr};"));
        if ctx.outputs[0].ty.is_bool() {
            ctx.assign_elementwise(0, |_| CgenCtx::bool_expr(&format!("{value_var} != 0.0")));
        } else {
            ctx.assign_elementwise(0, |_| value_var.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::run_algebraic_at;
    use approx::assert_relative_eq;
    use signalflow_model::BlockKind;

    fn params(json: serde_json::Value) -> BlockParams {
        BlockParams::build(BlockKind::Source, json.as_object().unwrap()).unwrap()
    }

    #[test]
    fn test_constant_broadcast() {
        let p = params(serde_json::json!({
            "signalType": "constant", "dataType": "double[3]", "value": 2.0
        }));
        let out = run_algebraic_at(&SourceBlock, &p, &[], 0.0, &[]);
        assert_eq!(
            out[0],
            SignalValue::broadcast(2.0, &"double[3]".parse().unwrap())
        );
    }

    #[test]
    fn test_step() {
        let p = params(serde_json::json!({
            "signalType": "step", "stepTime": 1.0, "stepValue": 5.0
        }));
        let before = run_algebraic_at(&SourceBlock, &p, &[], 0.5, &[]);
        let after = run_algebraic_at(&SourceBlock, &p, &[], 1.5, &[]);
        assert_eq!(before[0], SignalValue::Scalar(0.0));
        assert_eq!(after[0], SignalValue::Scalar(5.0));
    }

    #[test]
    fn test_ramp() {
        let p = params(serde_json::json!({
            "signalType": "ramp", "slope": 3.0, "startTime": 1.0
        }));
        assert_eq!(
            run_algebraic_at(&SourceBlock, &p, &[], 0.5, &[])[0],
            SignalValue::Scalar(0.0)
        );
        assert_eq!(
            run_algebraic_at(&SourceBlock, &p, &[], 3.0, &[])[0],
            SignalValue::Scalar(6.0)
        );
    }

    #[test]
    fn test_sine() {
        let p = params(serde_json::json!({
            "signalType": "sine", "frequency": 0.25, "amplitude": 2.0, "phase": 0.0, "offset": 1.0
        }));
        // quarter period of a 0.25 Hz sine is t = 1
        let out = run_algebraic_at(&SourceBlock, &p, &[], 1.0, &[]);
        match out[0] {
            SignalValue::Scalar(x) => assert_relative_eq!(x, 3.0, epsilon = 1e-12),
            ref other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn test_square_levels() {
        let p = params(serde_json::json!({
            "signalType": "square", "frequency": 1.0, "amplitude": 1.0
        }));
        assert_eq!(
            run_algebraic_at(&SourceBlock, &p, &[], 0.1, &[])[0],
            SignalValue::Scalar(1.0)
        );
        assert_eq!(
            run_algebraic_at(&SourceBlock, &p, &[], 0.6, &[])[0],
            SignalValue::Scalar(-1.0)
        );
    }

    #[test]
    fn test_noise_stays_in_band() {
        let p = params(serde_json::json!({
            "signalType": "noise", "mean": 10.0, "amplitude": 0.5
        }));
        let mut state = SourceBlock.init_state(&p, None);
        for _ in 0..100 {
            let out =
                crate::testing::run_algebraic_stateful(&SourceBlock, &p, &[], 0.0, &[], &mut state);
            match out[0] {
                SignalValue::Scalar(x) => assert!((9.5..10.5).contains(&x)),
                ref other => panic!("unexpected output {other:?}"),
            }
        }
    }

    #[test]
    fn test_chirp_phase_continuity_at_duration() {
        let p = params(serde_json::json!({
            "signalType": "chirp", "f0": 1.0, "f1": 5.0, "duration": 2.0, "amplitude": 1.0
        }));
        let p = match p {
            BlockParams::Source(s) => s,
            _ => unreachable!(),
        };
        let eps = 1e-9;
        let before = chirp_phase(&p, 2.0 - eps);
        let after = chirp_phase(&p, 2.0 + eps);
        assert_relative_eq!(before, after, epsilon = 1e-5);
    }
}
