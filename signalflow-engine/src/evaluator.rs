//! The algebraic layer: one pure sweep over the cached execution order.
//!
//! For each block the evaluator gathers input values by `(block, port)`
//! lookup, hands them to the kind's module together with any side channel
//! (routed input-port values, sheet-label slots) and writes the produced
//! outputs back into the signal table. Subsystems are containers and are
//! skipped; blocks inside a disabled subsystem are skipped except output
//! ports, which publish their frozen value.

use log::warn;

use signalflow_blocks::{module, AlgebraicCtx, SideChannel};
use signalflow_model::params::BlockParams;
use signalflow_model::value::SignalValue;
use signalflow_model::{AlgebraicLoopPolicy, BlockKind};

use crate::inputs::ExternalInputs;
use crate::plan::{BlockIdx, ExecutionPlan};
use crate::propagator::{resolve_source, TypeMap};
use crate::state::SimState;

pub struct Evaluator<'a> {
    pub plan: &'a ExecutionPlan,
    pub types: &'a TypeMap,
    pub loop_policy: AlgebraicLoopPolicy,
}

impl<'a> Evaluator<'a> {
    pub fn new(plan: &'a ExecutionPlan, types: &'a TypeMap, loop_policy: AlgebraicLoopPolicy) -> Self {
        Self {
            plan,
            types,
            loop_policy,
        }
    }

    /// The value currently arriving at one input port.
    ///
    /// Reads the per-step signal table first. A missing entry means the
    /// source has not run this step — either an algebraic loop (resolved
    /// per policy) or a disabled subtree (previous/frozen outputs are the
    /// specified behavior).
    pub fn input_value(&self, state: &SimState, block: BlockIdx, port: usize) -> SignalValue {
        let Some((source, source_port)) = resolve_source(self.plan, block, port) else {
            // unconnected: zero of the inferred type
            return self
                .types
                .input_type(self.plan, block, port)
                .map(|ty| SignalValue::default_for(&ty))
                .unwrap_or(SignalValue::Scalar(0.0));
        };
        if let Some(value) = state.signals.get(&(source, source_port)) {
            return value.clone();
        }
        let is_back_edge = self
            .plan
            .back_edges
            .iter()
            .any(|&(from, _)| from == source);
        if is_back_edge && self.loop_policy == AlgebraicLoopPolicy::DiagnoseOnly {
            return self
                .types
                .output_type(source, source_port)
                .map(|ty| SignalValue::default_for(&ty))
                .unwrap_or(SignalValue::Scalar(0.0));
        }
        if is_back_edge {
            warn!(
                "algebraic loop: `{}` uses the previous-step value of `{}`",
                self.plan.blocks[block].id, self.plan.blocks[source].id
            );
        }
        state.blocks[source]
            .outputs
            .get(source_port)
            .cloned()
            .unwrap_or(SignalValue::Scalar(0.0))
    }

    pub fn gather_inputs(&self, state: &SimState, block: BlockIdx) -> Vec<SignalValue> {
        (0..self.plan.blocks[block].input_count)
            .map(|port| self.input_value(state, block, port))
            .collect()
    }

    /// Executes a single block and publishes its outputs.
    pub fn exec_block(
        &self,
        state: &mut SimState,
        idx: BlockIdx,
        inputs: &dyn ExternalInputs,
    ) {
        let block = &self.plan.blocks[idx];
        debug_assert!(!block.kind.is_subsystem());

        // disabled subtree: only output ports publish, from the freeze
        if !state.is_enabled(self.plan, idx) {
            if block.kind == BlockKind::OutputPort {
                let frozen = state.blocks[idx]
                    .frozen_outputs
                    .as_ref()
                    .and_then(|f| f.first().cloned())
                    .unwrap_or_else(|| {
                        state.blocks[idx]
                            .outputs
                            .first()
                            .cloned()
                            .unwrap_or(SignalValue::Scalar(0.0))
                    });
                state.signals.insert((idx, 0), frozen);
            }
            return;
        }

        let gathered = self.gather_inputs(state, idx);
        let output_types: Vec<_> = (0..state.blocks[idx].outputs.len())
            .map(|port| self.types.output_type(idx, port))
            .collect();

        // routed value for subsystem-internal or host-facing input ports
        let routed: Option<SignalValue> = match block.kind {
            BlockKind::InputPort => {
                if let Some(&(source, source_port)) = self.plan.input_routing.get(&idx) {
                    Some(self.input_value_of(state, source, source_port))
                } else if block.scope.is_none() {
                    // root ports read the host; an unwired inner port
                    // falls back to its default instead
                    match &block.params {
                        BlockParams::InputPort(p) => inputs.get(&p.port_name),
                        _ => None,
                    }
                } else {
                    None
                }
            }
            _ => None,
        };
        let label_key = match (&block.kind, &block.params) {
            (
                BlockKind::SheetLabelSink | BlockKind::SheetLabelSource,
                BlockParams::SheetLabel(p),
            ) => Some((block.scope, p.signal_name.clone())),
            _ => None,
        };

        let crate::state::BlockState {
            outputs, internal, ..
        } = &mut state.blocks[idx];

        let side = match block.kind {
            BlockKind::InputPort => SideChannel::ExternalInput(routed.as_ref()),
            BlockKind::SheetLabelSink => {
                let slot = state
                    .labels
                    .entry(label_key.clone().expect("sink without label"))
                    .or_insert(None);
                SideChannel::LabelWrite(slot)
            }
            BlockKind::SheetLabelSource => {
                let value = label_key
                    .as_ref()
                    .and_then(|key| state.labels.get(key))
                    .and_then(Option::as_ref);
                SideChannel::LabelRead(value)
            }
            _ => SideChannel::None,
        };

        let mut ctx = AlgebraicCtx {
            time: state.time,
            timestep: state.dt,
            block_name: &block.name,
            params: &block.params,
            inputs: &gathered,
            outputs,
            state: internal,
            side,
            output_types: &output_types,
        };
        if let Err(err) = module(block.kind).algebraic(&mut ctx) {
            warn!("block `{}` failed to evaluate: {err}", block.id);
            return;
        }

        let produced = state.blocks[idx].outputs.clone();
        for (port, value) in produced.into_iter().enumerate() {
            state.signals.insert((idx, port), value);
        }
    }

    /// A source-side value by direct `(block, port)` address (used for
    /// routed subsystem inputs and enable signals).
    pub fn input_value_of(&self, state: &SimState, source: BlockIdx, port: usize) -> SignalValue {
        // a subsystem source stands in for its internal output-port block
        let (source, port) = if self.plan.blocks[source].kind.is_subsystem() {
            match self.plan.output_routing.get(&(source, port)) {
                Some(&inner) => (inner, 0),
                None => (source, port),
            }
        } else {
            (source, port)
        };
        if let Some(value) = state.signals.get(&(source, port)) {
            return value.clone();
        }
        state.blocks[source]
            .outputs
            .get(port)
            .cloned()
            .unwrap_or(SignalValue::Scalar(0.0))
    }

    /// One full algebraic pass: clears the per-step tables and executes
    /// every block in the cached order.
    pub fn sweep(&self, state: &mut SimState, inputs: &dyn ExternalInputs) {
        state.signals.clear();
        state.labels.clear();
        for &idx in &self.plan.order {
            self.exec_block(state, idx, inputs);
        }
    }
}
