//! Boundary blocks: `input_port` brings values into a sheet (from the host
//! at the root, or routed from the parent wire inside a subsystem);
//! `output_port` publishes a value to the enclosing subsystem (or to
//! `SimulationResults::outputs` at the root).

use signalflow_model::params::BlockParams;
use signalflow_model::types::SignalType;
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{
    AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts, SideChannel,
};

pub struct InputPortBlock;

impl BlockModule for InputPortBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(0, 1)
    }

    fn infer_output_types(
        &self,
        _input_types: &[Option<SignalType>],
        params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        match params {
            BlockParams::InputPort(p) => Ok(vec![p.data_type]),
            _ => Err("input port has no parameters".to_string()),
        }
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let p = match ctx.params {
            BlockParams::InputPort(p) => p,
            _ => return Err(BlockRuntimeError::BadState("missing input port parameters")),
        };
        ctx.outputs[0] = match &ctx.side {
            SideChannel::ExternalInput(Some(value)) => match value.as_scalar() {
                // scalar host values broadcast to the declared shape
                Some(x) if !p.data_type.is_scalar() => SignalValue::broadcast(x, &p.data_type),
                _ => (*value).clone(),
            },
            _ => p.default_value.clone(),
        };
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        // Root input ports read the inputs struct; routed (subsystem) ports
        // are wired by the generator, which fills `inputs` with the parent
        // source signal. Either way this is a copy.
        let input = ctx.inputs.first().cloned().ok_or("unrouted input port")?;
        if input.ty.is_scalar() && !ctx.outputs[0].ty.is_scalar() {
            let src = input.element(0);
            ctx.assign_elementwise(0, |_| src.clone());
        } else {
            ctx.assign_elementwise(0, |i| input.element(i));
        }
        Ok(())
    }
}

pub struct OutputPortBlock;

impl BlockModule for OutputPortBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(1, 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        match input_types.first().copied().flatten() {
            Some(t) => Ok(vec![t]),
            None => Err("Cannot determine output type: input is not connected".to_string()),
        }
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let input = ctx
            .inputs
            .first()
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;
        ctx.outputs[0] = input.clone();
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let input = ctx.inputs[0].clone();
        ctx.assign_elementwise(0, |i| input.element(i));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::InternalState;
    use signalflow_model::BlockKind;

    fn input_params(json: serde_json::Value) -> BlockParams {
        BlockParams::build(BlockKind::InputPort, json.as_object().unwrap()).unwrap()
    }

    fn run_with_side(
        params: &BlockParams,
        side: SideChannel,
    ) -> SignalValue {
        let mut outputs = vec![SignalValue::Scalar(0.0)];
        let mut state = InternalState::None;
        let mut ctx = AlgebraicCtx {
            time: 0.0,
            timestep: 0.01,
            block_name: "in",
            params,
            inputs: &[],
            outputs: &mut outputs,
            state: &mut state,
            side,
            output_types: &[],
        };
        InputPortBlock.algebraic(&mut ctx).unwrap();
        outputs.remove(0)
    }

    #[test]
    fn test_input_port_uses_external_value() {
        let params = input_params(serde_json::json!({"portName": "u", "dataType": "double"}));
        let value = SignalValue::Scalar(5.0);
        let out = run_with_side(&params, SideChannel::ExternalInput(Some(&value)));
        assert_eq!(out, SignalValue::Scalar(5.0));
    }

    #[test]
    fn test_input_port_falls_back_to_default() {
        let params = input_params(serde_json::json!({
            "portName": "u", "dataType": "double", "defaultValue": 7.0
        }));
        let out = run_with_side(&params, SideChannel::ExternalInput(None));
        assert_eq!(out, SignalValue::Scalar(7.0));
    }

    #[test]
    fn test_input_port_broadcasts_scalar_host_value() {
        let params = input_params(serde_json::json!({"portName": "u", "dataType": "double[3]"}));
        let value = SignalValue::Scalar(2.0);
        let out = run_with_side(&params, SideChannel::ExternalInput(Some(&value)));
        assert_eq!(out, SignalValue::broadcast(2.0, &"double[3]".parse().unwrap()));
    }

    #[test]
    fn test_output_port_passes_through() {
        let out = crate::testing::run_algebraic(
            &OutputPortBlock,
            &BlockParams::None,
            &[SignalValue::Scalar(15.0)],
        );
        assert_eq!(out[0], SignalValue::Scalar(15.0));
    }
}
