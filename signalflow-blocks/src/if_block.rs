use signalflow_model::params::BlockParams;
use signalflow_model::types::{BaseType, SignalType};
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts};

/// Two-way select: output is input 0 while the selector (port 2) is true,
/// input 1 otherwise. The two data inputs must share one type.
pub struct IfBlock;

const TRUE_PORT: usize = 0;
const FALSE_PORT: usize = 1;
const SELECT_PORT: usize = 2;

impl BlockModule for IfBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(3, 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        let a = input_types.get(TRUE_PORT).copied().flatten();
        let b = input_types.get(FALSE_PORT).copied().flatten();
        let sel = input_types.get(SELECT_PORT).copied().flatten();
        let (a, b) = match (a, b) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err("Cannot determine output type: not all inputs are connected".into()),
        };
        if a != b {
            return Err(format!(
                "Cannot determine output type: {}",
                SignalType::compatibility_error(&a, &b).unwrap_or_default()
            ));
        }
        match sel {
            Some(SignalType::Scalar(BaseType::Bool)) | None => {}
            Some(other) => {
                return Err(format!("selector input must be a scalar bool, got {other}"))
            }
        }
        Ok(vec![a])
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let selector = ctx
            .inputs
            .get(SELECT_PORT)
            .ok_or(BlockRuntimeError::MissingInput { port: SELECT_PORT })?
            .is_truthy();
        let chosen = if selector { TRUE_PORT } else { FALSE_PORT };
        ctx.outputs[0] = ctx
            .inputs
            .get(chosen)
            .ok_or(BlockRuntimeError::MissingInput { port: chosen })?
            .clone();
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let selector = ctx.inputs[SELECT_PORT].element(0);
        let on_true = ctx.inputs[TRUE_PORT].clone();
        let on_false = ctx.inputs[FALSE_PORT].clone();
        ctx.assign_elementwise(0, |i| {
            format!("({selector}) ? {} : {}", on_true.element(i), on_false.element(i))
        });
        Ok(())
    }
}
