//! The multi-sheet orchestrator: owns the time loop, the per-step
//! algebraic sweep, subsystem enable bookkeeping and output routing, probe
//! sampling and the integrator.
//!
//! One tick:
//! 1. record `t` into the time series
//! 2. algebraic sweep over the global order (disabled subtrees skipped,
//!    their output ports publish frozen values)
//! 3. mirror internal output-port values onto their subsystem's outputs
//! 4. collect display/logger samples
//! 5. recompute subsystem enable states, freezing on true→false
//! 6. integrate (Euler or RK4)
//! 7. advance time by `h`

use log::{debug, info};

use signalflow_model::diag::{Diagnostic, ModelError};
use signalflow_model::params::BlockParams;
use signalflow_model::value::SignalValue;
use signalflow_model::{BlockKind, Model};

use crate::evaluator::Evaluator;
use crate::inputs::ExternalInputs;
use crate::integrator::Integrator;
use crate::plan::{BlockIdx, ExecutionPlan};
use crate::propagator::{self, TypeMap};
use crate::results::SimulationResults;
use crate::state::SimState;

/// Runs a model to completion against the given external inputs.
///
/// Malformed models fail before time starts; recoverable findings
/// (type diagnostics, topology warnings, numerical instability) travel in
/// `SimulationResults::diagnostics` next to the partial trajectory.
pub fn run(model: &Model, inputs: &dyn ExternalInputs) -> Result<SimulationResults, ModelError> {
    let settings = &model.global_settings;
    if !settings.simulation_time_step.is_finite() || settings.simulation_time_step <= 0.0 {
        return Err(ModelError::BadSettings(format!(
            "time step must be positive, got {}",
            settings.simulation_time_step
        )));
    }
    if !settings.simulation_duration.is_finite()
        || settings.simulation_duration < settings.simulation_time_step
    {
        return Err(ModelError::BadSettings(format!(
            "duration must be at least one time step, got {}",
            settings.simulation_duration
        )));
    }

    let plan = ExecutionPlan::build(model)?;
    let types = propagator::propagate(&plan);
    let mut session = Session::new(model, &plan, &types);
    session.run(inputs);
    Ok(session.results)
}

struct Session<'a> {
    plan: &'a ExecutionPlan,
    evaluator: Evaluator<'a>,
    integrator: Integrator<'a>,
    state: SimState,
    probes: Vec<BlockIdx>,
    root_outputs: Vec<(BlockIdx, String)>,
    steps: usize,
    results: SimulationResults,
}

impl<'a> Session<'a> {
    fn new(model: &Model, plan: &'a ExecutionPlan, types: &'a TypeMap) -> Session<'a> {
        let settings = &model.global_settings;
        let dt = settings.simulation_time_step;
        let steps = (settings.simulation_duration / dt).round() as usize;

        let probes: Vec<BlockIdx> = plan
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| {
                matches!(b.kind, BlockKind::SignalDisplay | BlockKind::SignalLogger)
            })
            .map(|(idx, _)| idx)
            .collect();
        let root_outputs: Vec<(BlockIdx, String)> = plan
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.kind == BlockKind::OutputPort && b.scope.is_none())
            .filter_map(|(idx, b)| match &b.params {
                BlockParams::OutputPort(p) => Some((idx, p.port_name.clone())),
                _ => None,
            })
            .collect();

        let mut results = SimulationResults::default();
        results.diagnostics.extend(plan.diagnostics.iter().cloned());
        results.diagnostics.extend(types.diagnostics.iter().cloned());
        for &idx in &probes {
            results
                .signal_data
                .insert(plan.blocks[idx].id.clone(), Vec::new());
        }

        Session {
            plan,
            evaluator: Evaluator::new(plan, types, settings.algebraic_loop_policy),
            integrator: Integrator::new(plan, settings.integration_method),
            state: SimState::init(plan, types, dt),
            probes,
            root_outputs,
            steps,
            results,
        }
    }

    fn run(&mut self, inputs: &dyn ExternalInputs) {
        debug!(
            "starting run: {} blocks, {} in order, {} steps of h={}",
            self.plan.blocks.len(),
            self.plan.order.len(),
            self.steps,
            self.state.dt
        );
        for _ in 0..=self.steps {
            self.results.time_points.push(self.state.time);
            self.evaluator.sweep(&mut self.state, inputs);
            self.mirror_subsystem_outputs();
            self.collect_probes();
            self.recompute_enables();
            if let Err(err) = self
                .integrator
                .step(&mut self.state, &self.evaluator, inputs)
            {
                info!("run aborted: {err}");
                self.results
                    .diagnostics
                    .push(Diagnostic::model_error(err.to_string()));
                break;
            }
            self.state.time += self.state.dt;
        }
        self.results.final_time = self.results.time_points.last().copied().unwrap_or(0.0);
        for (idx, name) in &self.root_outputs {
            let value = self.state.blocks[*idx]
                .outputs
                .first()
                .cloned()
                .unwrap_or(SignalValue::Scalar(0.0));
            self.results.outputs.insert(name.clone(), value);
        }
    }

    /// Step 3: internal `output_port` values become the enclosing
    /// subsystem block's outputs on the parent sheet (frozen while the
    /// subsystem is disabled — the output port already published its
    /// frozen value during the sweep).
    fn mirror_subsystem_outputs(&mut self) {
        for (&(subsystem, port), &inner) in &self.plan.output_routing {
            let value = self
                .state
                .signals
                .get(&(inner, 0))
                .cloned()
                .unwrap_or_else(|| {
                    self.state.blocks[inner]
                        .outputs
                        .first()
                        .cloned()
                        .unwrap_or(SignalValue::Scalar(0.0))
                });
            self.state.signals.insert((subsystem, port), value.clone());
            if let Some(slot) = self.state.blocks[subsystem].outputs.get_mut(port) {
                *slot = value;
            }
        }
    }

    /// Step 4: sample every enabled display/logger block's input.
    fn collect_probes(&mut self) {
        for &idx in &self.probes {
            if !self.state.is_enabled(self.plan, idx) {
                continue;
            }
            let value = self.evaluator.input_value(&self.state, idx, 0);
            let id = &self.plan.blocks[idx].id;
            if let Some(series) = self.results.signal_data.get_mut(id) {
                series.push(value);
            }
        }
    }

    /// Step 5: raw enable from the wire at the enable port (default true),
    /// effective = raw AND parent effective. A true→false transition
    /// freezes the outputs of the subsystem and its whole subtree; a
    /// false→true transition records the enable time — blocks recompute
    /// naturally on the next sweep.
    fn recompute_enables(&mut self) {
        // parents were interned before their members, so ascending index
        // order evaluates outer subsystems first
        let subsystems: Vec<BlockIdx> = self
            .plan
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.kind.is_subsystem())
            .map(|(idx, _)| idx)
            .collect();
        for idx in subsystems {
            let raw = match self.plan.enable_sources.get(&idx) {
                Some(&(source, port)) => self
                    .evaluator
                    .input_value_of(&self.state, source, port)
                    .is_truthy(),
                None => true,
            };
            let parent_effective = match self.plan.blocks[idx].scope {
                Some(parent) => self
                    .state
                    .enables
                    .get(&parent)
                    .map(|e| e.effective)
                    .unwrap_or(true),
                None => true,
            };
            let effective = raw && parent_effective;
            let entry = self.state.enables.entry(idx).or_default();
            let was_effective = entry.effective;
            entry.raw = raw;
            entry.effective = effective;
            if was_effective && !effective {
                debug!("subsystem `{}` disabled, freezing subtree", self.plan.blocks[idx].id);
                self.freeze_subtree(idx);
            } else if !was_effective && effective {
                let time = self.state.time;
                if let Some(entry) = self.state.enables.get_mut(&idx) {
                    entry.enabled_at = Some(time);
                }
                self.thaw_subtree(idx);
            }
        }
    }

    fn freeze_subtree(&mut self, subsystem: BlockIdx) {
        let mut members = self.plan.descendants(subsystem);
        members.push(subsystem);
        for idx in members {
            let block = &mut self.state.blocks[idx];
            block.frozen_outputs = Some(block.outputs.clone());
        }
    }

    fn thaw_subtree(&mut self, subsystem: BlockIdx) {
        let mut members = self.plan.descendants(subsystem);
        members.push(subsystem);
        for idx in members {
            self.state.blocks[idx].frozen_outputs = None;
        }
    }
}
