//! Named in-scope channels: a sink stores its input under
//! `(scope, signalName)` once per step, sources in the same scope read it
//! back without a wire. The evaluator resolves the slot and passes it in
//! through the side channel.

use signalflow_model::params::BlockParams;
use signalflow_model::types::SignalType;
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{
    AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts, SideChannel,
};

pub struct SheetLabelSinkBlock;

impl BlockModule for SheetLabelSinkBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(1, 0)
    }

    fn infer_output_types(
        &self,
        _input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        Ok(Vec::new())
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let input = ctx
            .inputs
            .first()
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;
        match &mut ctx.side {
            SideChannel::LabelWrite(slot) => {
                **slot = Some(input.clone());
                Ok(())
            }
            _ => Err(BlockRuntimeError::BadState("sink without a label slot")),
        }
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        // the label slot is a signals-struct member sized like the input
        let input = ctx.inputs[0].clone();
        ctx.assign_elementwise(0, |i| input.element(i));
        Ok(())
    }
}

pub struct SheetLabelSourceBlock;

impl BlockModule for SheetLabelSourceBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(0, 1)
    }

    fn infer_output_types(
        &self,
        _input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        // resolved by the propagator from the same-scope sink
        Err("Cannot determine output type: no matching sheet label sink in scope".to_string())
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        ctx.outputs[0] = match &ctx.side {
            SideChannel::LabelRead(Some(value)) => (*value).clone(),
            // not yet written this step (or wrong scope): zero of the
            // resolved type
            _ => match ctx.output_types.first().copied().flatten() {
                Some(ty) => SignalValue::default_for(&ty),
                None => SignalValue::Scalar(0.0),
            },
        };
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        // reads the sink's slot; ordering in the plan makes this correct
        let input = ctx.inputs.first().cloned().ok_or("unresolved sheet label")?;
        ctx.assign_elementwise(0, |i| input.element(i));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::InternalState;

    fn sink_params() -> BlockParams {
        BlockParams::SheetLabel(signalflow_model::params::SheetLabelParams {
            signal_name: "speed".to_string(),
        })
    }

    #[test]
    fn test_sink_writes_slot() {
        let params = sink_params();
        let mut slot = None;
        let inputs = [SignalValue::Scalar(4.5)];
        let mut outputs = Vec::new();
        let mut state = InternalState::None;
        let mut ctx = AlgebraicCtx {
            time: 0.0,
            timestep: 0.01,
            block_name: "sink",
            params: &params,
            inputs: &inputs,
            outputs: &mut outputs,
            state: &mut state,
            side: SideChannel::LabelWrite(&mut slot),
            output_types: &[],
        };
        SheetLabelSinkBlock.algebraic(&mut ctx).unwrap();
        assert_eq!(slot, Some(SignalValue::Scalar(4.5)));
    }

    #[test]
    fn test_source_reads_slot_or_zero() {
        let params = sink_params();
        let value = SignalValue::Scalar(4.5);
        let mut outputs = vec![SignalValue::Scalar(0.0)];
        let mut state = InternalState::None;
        let scalar: SignalType = "double".parse().unwrap();

        let mut ctx = AlgebraicCtx {
            time: 0.0,
            timestep: 0.01,
            block_name: "src",
            params: &params,
            inputs: &[],
            outputs: &mut outputs,
            state: &mut state,
            side: SideChannel::LabelRead(Some(&value)),
            output_types: &[Some(scalar)],
        };
        SheetLabelSourceBlock.algebraic(&mut ctx).unwrap();
        assert_eq!(outputs[0], SignalValue::Scalar(4.5));

        let mut outputs = vec![SignalValue::Scalar(9.0)];
        let mut ctx = AlgebraicCtx {
            time: 0.0,
            timestep: 0.01,
            block_name: "src",
            params: &params,
            inputs: &[],
            outputs: &mut outputs,
            state: &mut state,
            side: SideChannel::LabelRead(None),
            output_types: &[Some(scalar)],
        };
        SheetLabelSourceBlock.algebraic(&mut ctx).unwrap();
        assert_eq!(outputs[0], SignalValue::Scalar(0.0));
    }
}
