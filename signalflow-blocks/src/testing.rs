//! Shared helpers for the in-file block tests.

use signalflow_model::params::BlockParams;
use signalflow_model::types::SignalType;
use signalflow_model::value::SignalValue;

use crate::module::{AlgebraicCtx, BlockModule, InternalState, SideChannel};

/// Runs one algebraic evaluation at t=0 with default state and returns the
/// produced outputs.
pub fn run_algebraic(
    module: &dyn BlockModule,
    params: &BlockParams,
    inputs: &[SignalValue],
) -> Vec<SignalValue> {
    run_algebraic_at(module, params, inputs, 0.0, &[])
}

pub fn run_algebraic_at(
    module: &dyn BlockModule,
    params: &BlockParams,
    inputs: &[SignalValue],
    time: f64,
    output_types: &[Option<SignalType>],
) -> Vec<SignalValue> {
    let input_type = inputs.first().map(|v| {
        v.shape_type(signalflow_model::types::BaseType::Double)
    });
    let mut state = module.init_state(params, input_type.as_ref());
    run_algebraic_stateful(module, params, inputs, time, output_types, &mut state)
}

pub fn run_algebraic_stateful(
    module: &dyn BlockModule,
    params: &BlockParams,
    inputs: &[SignalValue],
    time: f64,
    output_types: &[Option<SignalType>],
    state: &mut InternalState,
) -> Vec<SignalValue> {
    let n_out = module
        .port_counts(params)
        .outputs
        .unwrap_or_else(|| inputs.first().map(|v| v.element_count()).unwrap_or(0));
    let mut outputs = vec![SignalValue::Scalar(0.0); n_out];
    let mut ctx = AlgebraicCtx {
        time,
        timestep: 0.01,
        block_name: "test_block",
        params,
        inputs,
        outputs: &mut outputs,
        state,
        side: SideChannel::None,
        output_types,
    };
    module
        .algebraic(&mut ctx)
        .expect("algebraic evaluation failed");
    outputs
}
