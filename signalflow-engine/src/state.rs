//! Mutable simulation state: per-block output slots and integrator state,
//! the per-step signal table, the sheet-label scoreboard and subsystem
//! enable states. Owned exclusively by the orchestrator; the evaluator and
//! the integrator borrow it for the duration of one pass.

use std::collections::HashMap;

use signalflow_blocks::{module, InternalState};
use signalflow_model::value::SignalValue;

use crate::plan::{BlockIdx, ExecutionPlan, Scope};
use crate::propagator::TypeMap;

#[derive(Clone, Debug)]
pub struct BlockState {
    /// Last computed value of each output port. Persists across steps;
    /// doubles as the previous-step value when an algebraic loop is broken.
    pub outputs: Vec<SignalValue>,
    pub internal: InternalState,
    /// Snapshot taken when the enclosing subsystem was disabled.
    pub frozen_outputs: Option<Vec<SignalValue>>,
}

#[derive(Clone, Copy, Debug)]
pub struct EnableState {
    /// The raw enable signal (default true when unwired).
    pub raw: bool,
    /// `raw` AND the parent subsystem's effective state.
    pub effective: bool,
    /// Simulation time of the most recent false→true transition.
    pub enabled_at: Option<f64>,
}

impl Default for EnableState {
    fn default() -> Self {
        Self {
            raw: true,
            effective: true,
            enabled_at: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SimState {
    pub time: f64,
    pub dt: f64,
    pub blocks: Vec<BlockState>,
    /// `(block, port) → value`, cleared at the start of every step.
    pub signals: HashMap<(BlockIdx, usize), SignalValue>,
    /// `(scope, label) → value written by the sink this step`.
    pub labels: HashMap<(Scope, String), Option<SignalValue>>,
    /// Enable state per subsystem block.
    pub enables: HashMap<BlockIdx, EnableState>,
}

impl SimState {
    pub fn init(plan: &ExecutionPlan, types: &TypeMap, dt: f64) -> SimState {
        let blocks = plan
            .blocks
            .iter()
            .enumerate()
            .map(|(idx, block)| {
                let module = module(block.kind);
                let declared = module.port_counts(&block.params).outputs;
                let count = types.output_counts[idx].max(declared.unwrap_or(0));
                let outputs = (0..count)
                    .map(|port| match types.output_type(idx, port) {
                        Some(ty) => SignalValue::default_for(&ty),
                        None => SignalValue::Scalar(0.0),
                    })
                    .collect();
                let input_type = types.input_type(plan, idx, 0);
                BlockState {
                    outputs,
                    internal: module.init_state(&block.params, input_type.as_ref()),
                    frozen_outputs: None,
                }
            })
            .collect();
        let enables = plan
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.kind.is_subsystem())
            .map(|(idx, _)| (idx, EnableState::default()))
            .collect();
        SimState {
            time: 0.0,
            dt,
            blocks,
            signals: HashMap::new(),
            labels: HashMap::new(),
            enables,
        }
    }

    /// Whether the block's containing subsystem chain is fully enabled.
    pub fn is_enabled(&self, plan: &ExecutionPlan, idx: BlockIdx) -> bool {
        match plan.blocks[idx].scope {
            None => true,
            Some(scope) => self
                .enables
                .get(&scope)
                .map(|e| e.effective)
                .unwrap_or(true),
        }
    }

    /// Deep copy of everything the integrator may disturb between stages.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            blocks: self.blocks.clone(),
            signals: self.signals.clone(),
            labels: self.labels.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: &StateSnapshot) {
        self.blocks = snapshot.blocks.clone();
        self.signals = snapshot.signals.clone();
        self.labels = snapshot.labels.clone();
    }
}

#[derive(Clone, Debug)]
pub struct StateSnapshot {
    pub blocks: Vec<BlockState>,
    signals: HashMap<(BlockIdx, usize), SignalValue>,
    labels: HashMap<(Scope, String), Option<SignalValue>>,
}
