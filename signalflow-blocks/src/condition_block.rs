use signalflow_model::c_float_literal;
use signalflow_model::params::BlockParams;
use signalflow_model::types::{BaseType, SignalType};
use signalflow_model::value::SignalValue;

use crate::cgen::CgenCtx;
use crate::module::{
    require_scalar_input, AlgebraicCtx, BlockModule, BlockRuntimeError, PortCounts,
};

/// Compares its scalar input against a constant predicate (`op value`) and
/// outputs the boolean result.
pub struct ConditionBlock;

impl BlockModule for ConditionBlock {
    fn port_counts(&self, _params: &BlockParams) -> PortCounts {
        PortCounts::new(1, 1)
    }

    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        _params: &BlockParams,
    ) -> Result<Vec<SignalType>, String> {
        require_scalar_input(input_types, 0)?;
        Ok(vec![SignalType::Scalar(BaseType::Bool)])
    }

    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError> {
        let p = match ctx.params {
            BlockParams::Condition(p) => p,
            _ => return Err(BlockRuntimeError::BadState("missing condition parameters")),
        };
        let x = ctx
            .inputs
            .first()
            .and_then(SignalValue::as_scalar)
            .ok_or(BlockRuntimeError::MissingInput { port: 0 })?;
        ctx.outputs[0] = SignalValue::Bool(p.op.apply(x, p.rhs));
        Ok(())
    }

    fn emit_algebraic_c(&self, ctx: &mut CgenCtx) -> Result<(), String> {
        let p = match ctx.params {
            BlockParams::Condition(p) => p.clone(),
            _ => return Err("missing condition parameters".to_string()),
        };
        let x = ctx.inputs[0].element(0);
        let out = ctx.outputs[0].element(0);
        let predicate = format!("{x} {} {}", p.op.c_symbol(), c_float_literal(p.rhs));
        ctx.line(format!("{out} = {};", CgenCtx::bool_expr(&predicate)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::run_algebraic;
    use rstest::rstest;
    use signalflow_model::BlockKind;

    fn params(condition: &str) -> BlockParams {
        BlockParams::build(
            BlockKind::Condition,
            serde_json::json!({"condition": condition}).as_object().unwrap(),
        )
        .unwrap()
    }

    #[rstest]
    #[case("> 0.5", 1.0, true)]
    #[case("> 0.5", 0.5, false)]
    #[case(">= 0.5", 0.5, true)]
    #[case("< 0", -0.1, true)]
    #[case("== 2", 2.0, true)]
    #[case("!= 2", 2.0, false)]
    fn test_condition(#[case] predicate: &str, #[case] input: f64, #[case] expected: bool) {
        let out = run_algebraic(
            &ConditionBlock,
            &params(predicate),
            &[SignalValue::Scalar(input)],
        );
        assert_eq!(out[0], SignalValue::Bool(expected));
    }

    #[test]
    fn test_condition_emit_c() {
        let params = params("> 0.5");
        let mut out = String::new();
        let mut ctx = CgenCtx::new(&mut out, 1, "cond".into(), &params, "model->time".into());
        ctx.inputs = vec![crate::cgen::CSignal::new(
            "m->signals.x_out",
            "double".parse().unwrap(),
        )];
        ctx.outputs = vec![crate::cgen::CSignal::new(
            "m->signals.cond_out",
            "bool".parse().unwrap(),
        )];
        ConditionBlock.emit_algebraic_c(&mut ctx).unwrap();
        assert_eq!(
            out,
            "    m->signals.cond_out = ((m->signals.x_out > 0.5) ? 1 : 0);\n"
        );
    }
}
