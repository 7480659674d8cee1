//! Walks an execution plan and emits the C99 header/source pair (plus an
//! optional `main.c` harness) whose trajectories match the interpreter.
//!
//! The layout mirrors the runtime exactly: one signals-struct member per
//! output port, one state array per stateful block, per-block statements
//! in the global execution order, enable flags gating disabled subtrees so
//! their signals freeze in place.

use std::collections::HashMap;

use signalflow_blocks::cgen::{CSignal, CStateArray, CgenCtx};
use signalflow_blocks::module;
use signalflow_engine::plan::{BlockIdx, ExecutionPlan};
use signalflow_engine::propagator::{self, resolve_source, TypeMap};
use signalflow_model::params::BlockParams;
use signalflow_model::types::SignalType;
use signalflow_model::value::SignalValue;
use signalflow_model::{c_float_literal, BlockKind, IntegrationMethod, Model};

use crate::sanitize::{include_guard, sanitize_identifier};

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error(transparent)]
    Model(#[from] signalflow_model::ModelError),
    #[error("block `{block}`: output type could not be determined; fix the model's type errors first")]
    UndeterminedType { block: String },
    #[error("block `{block}`: input port {port} is not connected")]
    UnconnectedInput { block: String, port: usize },
    #[error("block `{block}`: {message}")]
    Emit { block: String, message: String },
}

/// The generated artifacts. `header_name`/`source_name` are the intended
/// file names (`<model>.h`, `<model>.c`).
#[derive(Clone, Debug)]
pub struct GeneratedCode {
    pub header_name: String,
    pub header: String,
    pub source_name: String,
    pub source: String,
    pub main: Option<String>,
}

pub fn generate(model: &Model, with_main: bool) -> Result<GeneratedCode, CodegenError> {
    let plan = ExecutionPlan::build(model)?;
    let types = propagator::propagate(&plan);
    let generator = Generator::new(model, &plan, &types)?;
    generator.generate(with_main)
}

struct Generator<'a> {
    model: &'a Model,
    plan: &'a ExecutionPlan,
    types: &'a TypeMap,
    base: String,
    /// Unique C identifier per block.
    idents: Vec<String>,
    /// Signals-struct member (name, type) per `(block, port)`.
    signal_members: HashMap<(BlockIdx, usize), (String, SignalType)>,
    /// Stateful blocks: (elements, order) per block.
    state_dims: HashMap<BlockIdx, (usize, usize)>,
    /// Root input ports: (block, member, type).
    inputs: Vec<(BlockIdx, String, SignalType)>,
    /// Root output ports: (block, member, type).
    outputs: Vec<(BlockIdx, String, SignalType)>,
    /// Subsystems in outer-to-inner order with their enable member name.
    subsystems: Vec<(BlockIdx, String)>,
}

impl<'a> Generator<'a> {
    fn new(
        model: &'a Model,
        plan: &'a ExecutionPlan,
        types: &'a TypeMap,
    ) -> Result<Generator<'a>, CodegenError> {
        let base = sanitize_identifier(&model.name);

        // unique identifier per block
        let mut idents = Vec::with_capacity(plan.blocks.len());
        let mut used: HashMap<String, usize> = HashMap::new();
        for block in &plan.blocks {
            let mut ident = sanitize_identifier(&block.name);
            let count = used.entry(ident.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                ident = format!("{ident}_{count}");
            }
            idents.push(ident);
        }

        let mut generator = Generator {
            model,
            plan,
            types,
            base,
            idents,
            signal_members: HashMap::new(),
            state_dims: HashMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            subsystems: Vec::new(),
        };
        generator.resolve_layout()?;
        Ok(generator)
    }

    fn resolve_layout(&mut self) -> Result<(), CodegenError> {
        for &idx in &self.plan.order {
            let block = &self.plan.blocks[idx];
            match block.kind {
                BlockKind::SignalDisplay | BlockKind::SignalLogger => continue,
                // a sink's slot is a signals member shaped like its input
                BlockKind::SheetLabelSink => {
                    let ty = self
                        .types
                        .input_type(self.plan, idx, 0)
                        .ok_or_else(|| CodegenError::UndeterminedType {
                            block: block.id.clone(),
                        })?;
                    self.signal_members
                        .insert((idx, 0), (format!("{}_out", self.idents[idx]), ty));
                    continue;
                }
                _ => {}
            }
            let count = self.types.output_counts[idx];
            for port in 0..count {
                let ty = self.types.output_type(idx, port).ok_or_else(|| {
                    CodegenError::UndeterminedType {
                        block: block.id.clone(),
                    }
                })?;
                let member = if count == 1 {
                    format!("{}_out", self.idents[idx])
                } else {
                    format!("{}_out{port}", self.idents[idx])
                };
                self.signal_members.insert((idx, port), (member, ty));
            }
            if module(block.kind).requires_state(&block.params) {
                let order = match &block.params {
                    BlockParams::TransferFunction(p) => p.order(),
                    _ => 0,
                };
                let elements = self
                    .types
                    .input_type(self.plan, idx, 0)
                    .map(|t| t.element_count())
                    .unwrap_or(1);
                self.state_dims.insert(idx, (elements, order));
            }
        }

        for (idx, block) in self.plan.blocks.iter().enumerate() {
            match (&block.kind, &block.params) {
                (BlockKind::InputPort, BlockParams::InputPort(p)) if block.scope.is_none() => {
                    self.inputs
                        .push((idx, sanitize_identifier(&p.port_name), p.data_type));
                }
                (BlockKind::OutputPort, BlockParams::OutputPort(p)) if block.scope.is_none() => {
                    let ty = self.types.output_type(idx, 0).ok_or_else(|| {
                        CodegenError::UndeterminedType {
                            block: block.id.clone(),
                        }
                    })?;
                    self.outputs
                        .push((idx, sanitize_identifier(&p.port_name), ty));
                }
                (BlockKind::Subsystem, _) => {
                    self.subsystems
                        .push((idx, format!("{}_enabled", self.idents[idx])));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn signal(&self, idx: BlockIdx, port: usize) -> Option<CSignal> {
        let (member, ty) = self.signal_members.get(&(idx, port))?;
        Some(CSignal::new(format!("model->signals.{member}"), *ty))
    }

    /// The C location feeding an input port, following the same routing
    /// rules as the interpreter.
    fn input_signal(&self, idx: BlockIdx, port: usize) -> Result<CSignal, CodegenError> {
        let block = &self.plan.blocks[idx];
        match block.kind {
            BlockKind::InputPort => {
                if self.plan.input_routing.contains_key(&idx) {
                    let (source, source_port) = resolve_source(self.plan, idx, 0)
                        .ok_or_else(|| CodegenError::UnconnectedInput {
                            block: block.id.clone(),
                            port: 0,
                        })?;
                    return self.signal(source, source_port).ok_or_else(|| {
                        CodegenError::UndeterminedType {
                            block: self.plan.blocks[source].id.clone(),
                        }
                    });
                }
                // root port: reads the inputs struct
                let (_, member, ty) = self
                    .inputs
                    .iter()
                    .find(|(i, _, _)| *i == idx)
                    .expect("root input port is always in the inputs table");
                Ok(CSignal::new(format!("model->inputs.{member}"), *ty))
            }
            BlockKind::SheetLabelSource => {
                let name = match &block.params {
                    BlockParams::SheetLabel(p) => p.signal_name.clone(),
                    _ => String::new(),
                };
                let sink = self
                    .plan
                    .label_sinks
                    .get(&(block.scope, name))
                    .copied()
                    .ok_or_else(|| CodegenError::UnconnectedInput {
                        block: block.id.clone(),
                        port,
                    })?;
                self.signal(sink, 0)
                    .ok_or_else(|| CodegenError::UndeterminedType {
                        block: self.plan.blocks[sink].id.clone(),
                    })
            }
            _ => {
                let (source, source_port) =
                    resolve_source(self.plan, idx, port).ok_or_else(|| {
                        CodegenError::UnconnectedInput {
                            block: block.id.clone(),
                            port,
                        }
                    })?;
                self.signal(source, source_port)
                    .ok_or_else(|| CodegenError::UndeterminedType {
                        block: self.plan.blocks[source].id.clone(),
                    })
            }
        }
    }

    fn state_array(&self, idx: BlockIdx, prefix: &str) -> Option<CStateArray> {
        let &(elements, order) = self.state_dims.get(&idx)?;
        Some(CStateArray {
            lvalue: format!("{prefix}{}_states", self.idents[idx]),
            elements,
            order,
        })
    }

    /// The enable flag guarding a block, if it sits inside a subsystem.
    fn enable_guard(&self, idx: BlockIdx) -> Option<String> {
        let scope = self.plan.blocks[idx].scope?;
        Some(format!("model->enable_states.{}_enabled", self.idents[scope]))
    }

    fn c_decl(ty: &SignalType, name: &str) -> String {
        let base = ty.base().c_name();
        match ty {
            SignalType::Scalar(_) => format!("{base} {name};"),
            SignalType::Vector(_, n) => format!("{base} {name}[{n}];"),
            SignalType::Matrix(_, r, c) => format!("{base} {name}[{r}][{c}];"),
        }
    }

    fn generate(&self, with_main: bool) -> Result<GeneratedCode, CodegenError> {
        Ok(GeneratedCode {
            header_name: format!("{}.h", self.base),
            header: self.header(),
            source_name: format!("{}.c", self.base),
            source: self.source()?,
            main: with_main.then(|| self.main_harness()),
        })
    }

    fn header(&self) -> String {
        let guard = include_guard(&self.model.name);
        let mut out = String::new();
        out.push_str(&format!("#ifndef {guard}\n#define {guard}\n\n"));
        out.push_str("#include <stdbool.h>\n\n");

        out.push_str("typedef struct {\n");
        for (_, member, ty) in &self.inputs {
            out.push_str(&format!("    {}\n", Self::c_decl(ty, member)));
        }
        if self.inputs.is_empty() {
            out.push_str("    char _unused;\n");
        }
        out.push_str("} model_inputs_t;\n\n");

        out.push_str("typedef struct {\n");
        let mut state_blocks: Vec<(usize, usize, usize)> = self
            .state_dims
            .iter()
            .map(|(&idx, &(elements, order))| (idx, elements, order))
            .collect();
        state_blocks.sort_unstable();
        for &(idx, elements, order) in &state_blocks {
            out.push_str(&format!(
                "    double {}_states[{elements}][{order}];\n",
                self.idents[idx]
            ));
        }
        if state_blocks.is_empty() {
            out.push_str("    char _unused;\n");
        }
        out.push_str("} model_states_t;\n\n");

        out.push_str("typedef struct {\n");
        let mut members: Vec<(usize, usize, String, SignalType)> = self
            .signal_members
            .iter()
            .map(|(&(idx, port), (member, ty))| (idx, port, member.clone(), *ty))
            .collect();
        members.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        for (_, _, member, ty) in &members {
            out.push_str(&format!("    {}\n", Self::c_decl(ty, member)));
        }
        if members.is_empty() {
            out.push_str("    char _unused;\n");
        }
        out.push_str("} model_signals_t;\n\n");

        out.push_str("typedef struct {\n");
        for (_, member, ty) in &self.outputs {
            out.push_str(&format!("    {}\n", Self::c_decl(ty, member)));
        }
        if self.outputs.is_empty() {
            out.push_str("    char _unused;\n");
        }
        out.push_str("} model_outputs_t;\n\n");

        out.push_str("typedef struct {\n");
        for (_, member) in &self.subsystems {
            out.push_str(&format!("    bool {member};\n"));
        }
        if self.subsystems.is_empty() {
            out.push_str("    char _unused;\n");
        }
        out.push_str("} enable_states_t;\n\n");

        out.push_str(
            "typedef struct {\n    model_inputs_t inputs;\n    model_states_t states;\n    \
             model_signals_t signals;\n    model_outputs_t outputs;\n    \
             enable_states_t enable_states;\n    double time;\n    double dt;\n} model_t;\n\n",
        );

        out.push_str("void model_init(model_t *model);\n");
        out.push_str("void model_evaluate_algebraic(model_t *model);\n");
        out.push_str("void model_derivatives(const model_t *model, model_states_t *derivs);\n");
        out.push_str("void model_step(model_t *model);\n\n");
        out.push_str(&format!("#endif /* {guard} */\n"));
        out
    }

    /// Builds the per-block emission context and runs one hook.
    fn run_hook(
        &self,
        out: &mut String,
        indent: usize,
        idx: BlockIdx,
        derivs: bool,
        hook: impl Fn(&dyn signalflow_blocks::BlockModule, &mut CgenCtx) -> Result<(), String>,
    ) -> Result<(), CodegenError> {
        let block = &self.plan.blocks[idx];
        let mut ctx = CgenCtx::new(
            out,
            indent,
            self.idents[idx].clone(),
            &block.params,
            "model->time".to_string(),
        );
        for port in 0..block.input_count {
            ctx.inputs.push(self.input_signal(idx, port)?);
        }
        if block.kind == BlockKind::SheetLabelSource {
            ctx.inputs.push(self.input_signal(idx, 0)?);
        }
        let output_count = self.types.output_counts[idx].max(
            matches!(block.kind, BlockKind::SheetLabelSink) as usize,
        );
        for port in 0..output_count {
            if let Some(signal) = self.signal(idx, port) {
                ctx.outputs.push(signal);
            }
        }
        ctx.state = self.state_array(idx, "model->states.");
        if derivs {
            ctx.derivs = self.state_array(idx, "derivs->");
        }
        hook(module(block.kind), &mut ctx).map_err(|message| CodegenError::Emit {
            block: block.id.clone(),
            message,
        })
    }

    fn source(&self) -> Result<String, CodegenError> {
        let mut out = String::new();
        out.push_str(&format!("#include \"{}.h\"\n", self.base));
        out.push_str("#include <math.h>\n#include <stdlib.h>\n#include <string.h>\n\n");
        out.push_str("#ifndef M_PI\n#define M_PI 3.14159265358979323846\n#endif\n\n");

        let has_lookups = self
            .plan
            .order
            .iter()
            .any(|&idx| matches!(self.plan.blocks[idx].kind, BlockKind::Lookup1d | BlockKind::Lookup2d));
        if has_lookups {
            out.push_str(LOOKUP_HELPERS);
        }

        // file-scope tables
        for &idx in &self.plan.order {
            if matches!(
                self.plan.blocks[idx].kind,
                BlockKind::Lookup1d | BlockKind::Lookup2d
            ) {
                self.run_hook(&mut out, 0, idx, false, |module, ctx| {
                    module.emit_static_c(ctx)
                })?;
            }
        }
        out.push('\n');

        self.emit_init(&mut out);
        self.emit_algebraic(&mut out)?;
        self.emit_update_enables(&mut out);
        self.emit_derivatives(&mut out)?;
        self.emit_step(&mut out);
        Ok(out)
    }

    fn emit_init(&self, out: &mut String) {
        out.push_str("void model_init(model_t *model) {\n");
        out.push_str("    memset(model, 0, sizeof(*model));\n");
        out.push_str(&format!(
            "    model->dt = {};\n",
            c_float_literal(self.model.global_settings.simulation_time_step)
        ));
        out.push_str("    model->time = 0.0;\n");
        for (_, member) in &self.subsystems {
            out.push_str(&format!("    model->enable_states.{member} = true;\n"));
        }
        for (idx, member, ty) in &self.inputs {
            let default = match &self.plan.blocks[*idx].params {
                BlockParams::InputPort(p) => p.default_value.clone(),
                _ => SignalValue::default_for(ty),
            };
            let signal = CSignal::new(format!("model->inputs.{member}"), *ty);
            for (i, value) in default.elements_row_major().iter().enumerate() {
                if ty.is_bool() {
                    out.push_str(&format!(
                        "    {} = {};\n",
                        signal.element(i),
                        if *value != 0.0 { "true" } else { "false" }
                    ));
                } else if *value != 0.0 {
                    out.push_str(&format!(
                        "    {} = {};\n",
                        signal.element(i),
                        c_float_literal(*value)
                    ));
                }
            }
        }
        out.push_str("}\n\n");
    }

    fn emit_algebraic(&self, out: &mut String) -> Result<(), CodegenError> {
        out.push_str("void model_evaluate_algebraic(model_t *model) {\n");
        for &idx in &self.plan.order {
            let block = &self.plan.blocks[idx];
            if matches!(block.kind, BlockKind::SignalDisplay | BlockKind::SignalLogger) {
                continue;
            }
            out.push_str(&format!(
                "    /* {} ({}) */\n",
                block.name, block.kind
            ));
            match self.enable_guard(idx) {
                Some(guard) => {
                    out.push_str(&format!("    if ({guard}) {{\n"));
                    self.run_hook(out, 2, idx, false, |module, ctx| {
                        module.emit_algebraic_c(ctx)
                    })?;
                    out.push_str("    }\n");
                }
                None => {
                    self.run_hook(out, 1, idx, false, |module, ctx| {
                        module.emit_algebraic_c(ctx)
                    })?;
                }
            }
        }
        // publish root output ports
        if !self.outputs.is_empty() {
            out.push_str("    /* outputs */\n");
            for (idx, member, ty) in &self.outputs {
                let source = CSignal::new(format!("model->signals.{}_out", self.idents[*idx]), *ty);
                let target = CSignal::new(format!("model->outputs.{member}"), *ty);
                for i in 0..ty.element_count() {
                    out.push_str(&format!(
                        "    {} = {};\n",
                        target.element(i),
                        source.element(i)
                    ));
                }
            }
        }
        out.push_str("}\n\n");
        Ok(())
    }

    fn emit_update_enables(&self, out: &mut String) {
        out.push_str("static void model_update_enables(model_t *model) {\n");
        for (idx, member) in &self.subsystems {
            let raw = match self.plan.enable_sources.get(idx) {
                Some(&(source, port)) => {
                    let source_signal = if self.plan.blocks[source].kind.is_subsystem() {
                        self.plan
                            .output_routing
                            .get(&(source, port))
                            .and_then(|&inner| self.signal(inner, 0))
                    } else {
                        self.signal(source, port)
                    };
                    match source_signal {
                        Some(signal) => match signal.ty {
                            SignalType::Scalar(b) if b.is_bool() => signal.element(0),
                            _ => format!("({} != 0.0)", signal.element(0)),
                        },
                        None => "true".to_string(),
                    }
                }
                None => "true".to_string(),
            };
            let parent = match self.plan.blocks[*idx].scope {
                Some(scope) => format!(" && model->enable_states.{}_enabled", self.idents[scope]),
                None => String::new(),
            };
            out.push_str(&format!(
                "    model->enable_states.{member} = {raw}{parent};\n"
            ));
        }
        out.push_str("}\n\n");
    }

    fn emit_derivatives(&self, out: &mut String) -> Result<(), CodegenError> {
        out.push_str("void model_derivatives(const model_t *model, model_states_t *derivs) {\n");
        out.push_str("    memset(derivs, 0, sizeof(*derivs));\n");
        let mut stateful: Vec<_> = self.state_dims.keys().copied().collect();
        stateful.sort_unstable();
        for idx in stateful {
            let block = &self.plan.blocks[idx];
            out.push_str(&format!("    /* {} ({}) */\n", block.name, block.kind));
            match self.enable_guard(idx) {
                Some(guard) => {
                    out.push_str(&format!("    if ({guard}) {{\n"));
                    self.run_hook(out, 2, idx, true, |module, ctx| {
                        module.emit_derivatives_c(ctx)
                    })?;
                    out.push_str("    }\n");
                }
                None => {
                    self.run_hook(out, 1, idx, true, |module, ctx| {
                        module.emit_derivatives_c(ctx)
                    })?;
                }
            }
        }
        out.push_str("}\n\n");
        Ok(())
    }

    /// Per-state-element update statement over every state array.
    fn state_update(&self, out: &mut String, indent: &str, stmt: impl Fn(&str, &str) -> String) {
        let mut stateful: Vec<(usize, usize, usize)> = self
            .state_dims
            .iter()
            .map(|(&idx, &(elements, order))| (idx, elements, order))
            .collect();
        stateful.sort_unstable();
        for (idx, elements, order) in stateful {
            let name = format!("{}_states", self.idents[idx]);
            out.push_str(&format!(
                "{indent}for (int e = 0; e < {elements}; ++e) {{\n\
                 {indent}    for (int j = 0; j < {order}; ++j) {{\n\
                 {indent}        {}\n{indent}    }}\n{indent}}}\n",
                stmt(&format!("model->states.{name}[e][j]"), &name)
            ));
        }
    }

    fn emit_step(&self, out: &mut String) {
        out.push_str("void model_step(model_t *model) {\n");
        out.push_str("    model_evaluate_algebraic(model);\n");
        out.push_str("    model_update_enables(model);\n");
        if self.state_dims.is_empty() {
            out.push_str("    model->time += model->dt;\n}\n");
            return;
        }
        match self.model.global_settings.integration_method {
            IntegrationMethod::Euler => {
                out.push_str("    model_states_t k1;\n");
                out.push_str("    model_derivatives(model, &k1);\n");
                self.state_update(out, "    ", |state, name| {
                    format!("{state} += model->dt * k1.{name}[e][j];")
                });
            }
            IntegrationMethod::Rk4 => {
                out.push_str("    model_states_t x0 = model->states;\n");
                out.push_str("    model_states_t k1, k2, k3, k4;\n");
                out.push_str("    double t0 = model->time;\n");
                out.push_str("    model_derivatives(model, &k1);\n\n");

                self.state_update(out, "    ", |state, name| {
                    format!("{state} = x0.{name}[e][j] + 0.5 * model->dt * k1.{name}[e][j];")
                });
                out.push_str("    model->time = t0 + 0.5 * model->dt;\n");
                out.push_str("    model_evaluate_algebraic(model);\n");
                out.push_str("    model_derivatives(model, &k2);\n\n");

                self.state_update(out, "    ", |state, name| {
                    format!("{state} = x0.{name}[e][j] + 0.5 * model->dt * k2.{name}[e][j];")
                });
                out.push_str("    model_evaluate_algebraic(model);\n");
                out.push_str("    model_derivatives(model, &k3);\n\n");

                self.state_update(out, "    ", |state, name| {
                    format!("{state} = x0.{name}[e][j] + model->dt * k3.{name}[e][j];")
                });
                out.push_str("    model->time = t0 + model->dt;\n");
                out.push_str("    model_evaluate_algebraic(model);\n");
                out.push_str("    model_derivatives(model, &k4);\n\n");

                out.push_str("    model->time = t0;\n");
                self.state_update(out, "    ", |state, name| {
                    format!(
                        "{state} = x0.{name}[e][j] + model->dt / 6.0 * (k1.{name}[e][j] + \
                         2.0 * k2.{name}[e][j] + 2.0 * k3.{name}[e][j] + k4.{name}[e][j]);"
                    )
                });
            }
        }
        out.push_str("    model->time += model->dt;\n}\n");
    }

    /// A `main.c` that runs the model and prints every root output port per
    /// step in a literal, parsable format.
    fn main_harness(&self) -> String {
        let settings = &self.model.global_settings;
        let mut out = String::new();
        out.push_str(&format!("#include \"{}.h\"\n", self.base));
        out.push_str("#include <stdio.h>\n\nint main(void) {\n");
        out.push_str("    static model_t model;\n    model_init(&model);\n");
        out.push_str(&format!(
            "    int steps = (int)({} / model.dt + 0.5);\n",
            c_float_literal(settings.simulation_duration)
        ));
        out.push_str("    for (int k = 0; k <= steps; ++k) {\n");
        out.push_str("        double t = model.time;\n");
        out.push_str("        model_step(&model);\n");
        out.push_str("        printf(\"t=%.17g\", t);\n");
        for (_, member, ty) in &self.outputs {
            let signal = CSignal::new(format!("model.outputs.{member}"), *ty);
            let fmt = if ty.is_bool() { "%d" } else { "%.17g" };
            match ty {
                SignalType::Scalar(_) => {
                    out.push_str(&format!(
                        "        printf(\" {member}={fmt}\", {});\n",
                        signal.element(0)
                    ));
                }
                SignalType::Vector(_, n) => {
                    out.push_str(&format!("        printf(\" {member}=[\");\n"));
                    for i in 0..*n {
                        let sep = if i + 1 < *n { "," } else { "" };
                        out.push_str(&format!(
                            "        printf(\"{fmt}{sep}\", {});\n",
                            signal.element(i)
                        ));
                    }
                    out.push_str("        printf(\"]\");\n");
                }
                SignalType::Matrix(_, r, c) => {
                    out.push_str(&format!("        printf(\" {member}=[\");\n"));
                    for row in 0..*r {
                        out.push_str("        printf(\"[\");\n");
                        for col in 0..*c {
                            let sep = if col + 1 < *c { "," } else { "" };
                            out.push_str(&format!(
                                "        printf(\"{fmt}{sep}\", {});\n",
                                signal.at(row, col)
                            ));
                        }
                        let sep = if row + 1 < *r { "," } else { "" };
                        out.push_str(&format!("        printf(\"]{sep}\");\n"));
                    }
                    out.push_str("        printf(\"]\");\n");
                }
            }
        }
        out.push_str("        printf(\"\\n\");\n    }\n    return 0;\n}\n");
        out
    }
}

/// Interpolation helpers matching the interpreter's arithmetic exactly.
const LOOKUP_HELPERS: &str = r#"static double sf_lookup_1d(const double *xs, const double *ys, int n,
                            int extrapolate, double x) {
    if (!extrapolate) {
        if (x < xs[0]) x = xs[0];
        if (x > xs[n - 1]) x = xs[n - 1];
    }
    int i = 0;
    while (i < n - 2 && x > xs[i + 1]) i++;
    double t = (x - xs[i]) / (xs[i + 1] - xs[i]);
    return ys[i] + t * (ys[i + 1] - ys[i]);
}

static double sf_lookup_2d(const double *xs, int nx, const double *ys, int ny,
                           const double *table, int extrapolate, double x, double y) {
    if (!extrapolate) {
        if (x < xs[0]) x = xs[0];
        if (x > xs[nx - 1]) x = xs[nx - 1];
        if (y < ys[0]) y = ys[0];
        if (y > ys[ny - 1]) y = ys[ny - 1];
    }
    int j = 0;
    while (j < nx - 2 && x > xs[j + 1]) j++;
    int i = 0;
    while (i < ny - 2 && y > ys[i + 1]) i++;
    double tx = (x - xs[j]) / (xs[j + 1] - xs[j]);
    double ty = (y - ys[i]) / (ys[i + 1] - ys[i]);
    double top = table[i * nx + j] + tx * (table[i * nx + j + 1] - table[i * nx + j]);
    double bottom = table[(i + 1) * nx + j] + tx * (table[(i + 1) * nx + j + 1] - table[(i + 1) * nx + j]);
    return top + ty * (bottom - top);
}

"#;
