//! C-emission context handed to the per-kind [`BlockModule`] hooks.
//!
//! The code generator resolves where every signal and state lives inside
//! the generated `model_t` and hands each block the ready-made lvalues; the
//! block hook only decides which statements to write.
//!
//! [`BlockModule`]: crate::module::BlockModule

use signalflow_model::params::BlockParams;
use signalflow_model::types::SignalType;

/// A signal location in the generated code: the struct-member lvalue plus
/// its signal type.
#[derive(Clone, Debug)]
pub struct CSignal {
    pub lvalue: String,
    pub ty: SignalType,
}

impl CSignal {
    pub fn new(lvalue: impl Into<String>, ty: SignalType) -> Self {
        Self {
            lvalue: lvalue.into(),
            ty,
        }
    }

    /// The lvalue of one element by row-major flat index.
    pub fn element(&self, index: usize) -> String {
        match self.ty {
            SignalType::Scalar(_) => self.lvalue.clone(),
            SignalType::Vector(_, _) => format!("{}[{index}]", self.lvalue),
            SignalType::Matrix(_, _, cols) => {
                format!("{}[{}][{}]", self.lvalue, index / cols, index % cols)
            }
        }
    }

    /// The lvalue of the `(row, col)` element of a matrix signal.
    pub fn at(&self, row: usize, col: usize) -> String {
        match self.ty {
            SignalType::Matrix(_, _, _) => format!("{}[{row}][{col}]", self.lvalue),
            _ => self.element(row.max(col)),
        }
    }

    pub fn element_count(&self) -> usize {
        self.ty.element_count()
    }
}

/// The state array of one stateful block: `lvalue[element][state]`.
#[derive(Clone, Debug)]
pub struct CStateArray {
    pub lvalue: String,
    pub elements: usize,
    pub order: usize,
}

impl CStateArray {
    pub fn at(&self, element: usize, state: usize) -> String {
        format!("{}[{element}][{state}]", self.lvalue)
    }
}

/// Per-block emission context. `state`/`derivs` are only populated for
/// stateful blocks; `derivs` only while emitting the derivatives function.
pub struct CgenCtx<'a> {
    out: &'a mut String,
    indent: usize,
    pub block_ident: String,
    pub params: &'a BlockParams,
    pub inputs: Vec<CSignal>,
    pub outputs: Vec<CSignal>,
    pub state: Option<CStateArray>,
    pub derivs: Option<CStateArray>,
    /// Expression for the current simulation time, e.g. `model->time`.
    pub time_expr: String,
}

impl<'a> CgenCtx<'a> {
    pub fn new(
        out: &'a mut String,
        indent: usize,
        block_ident: String,
        params: &'a BlockParams,
        time_expr: String,
    ) -> Self {
        Self {
            out,
            indent,
            block_ident,
            params,
            inputs: Vec::new(),
            outputs: Vec::new(),
            state: None,
            derivs: None,
            time_expr,
        }
    }

    /// Writes one indented statement line.
    pub fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    pub fn indented(&mut self, f: impl FnOnce(&mut Self)) {
        self.indent += 1;
        f(self);
        self.indent -= 1;
    }

    /// Emits `out = rhs;` for every element of `self.outputs[port]`, with
    /// `rhs` built from the row-major element index.
    pub fn assign_elementwise(&mut self, port: usize, rhs: impl Fn(usize) -> String) {
        let output = self.outputs[port].clone();
        for i in 0..output.element_count() {
            self.line(format!("{} = {};", output.element(i), rhs(i)));
        }
    }

    /// Wraps a predicate so it always yields 0/1.
    pub fn bool_expr(predicate: &str) -> String {
        format!("(({predicate}) ? 1 : 0)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signalflow_model::types::BaseType;

    #[test]
    fn test_element_lvalues() {
        let scalar = CSignal::new("m->signals.a", SignalType::Scalar(BaseType::Double));
        assert_eq!(scalar.element(0), "m->signals.a");

        let vector = CSignal::new("m->signals.v", SignalType::Vector(BaseType::Double, 3));
        assert_eq!(vector.element(2), "m->signals.v[2]");

        let matrix = CSignal::new("m->signals.m", SignalType::Matrix(BaseType::Double, 2, 3));
        assert_eq!(matrix.element(0), "m->signals.m[0][0]");
        assert_eq!(matrix.element(4), "m->signals.m[1][1]");
        assert_eq!(matrix.at(1, 2), "m->signals.m[1][2]");
    }

    #[test]
    fn test_bool_expr_helper() {
        assert_eq!(CgenCtx::bool_expr("x > 0.5"), "((x > 0.5) ? 1 : 0)");
    }
}
