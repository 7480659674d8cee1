//! The integration layer: advances every stateful block's states by one
//! timestep with forward Euler or classic Runge-Kutta 4.
//!
//! RK4 re-runs the algebraic evaluator between stages so derivative inputs
//! are sampled at the stage times; block state is snapshotted before the
//! stages and restored before the single committed update. Any NaN, ±∞ or
//! absurdly large derivative or committed state rolls the step back and
//! surfaces a numerical-instability error.

use std::collections::HashMap;

use signalflow_blocks::{module, InternalState};
use signalflow_model::IntegrationMethod;

use crate::evaluator::Evaluator;
use crate::inputs::ExternalInputs;
use crate::plan::{BlockIdx, ExecutionPlan};
use crate::state::SimState;

/// Derivatives or states beyond this magnitude abort the step.
pub const INSTABILITY_LIMIT: f64 = 1e10;

#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("numerical instability in block `{block}` at t={time}: {what}")]
    Instability {
        block: String,
        time: f64,
        what: String,
    },
}

pub struct Integrator<'a> {
    plan: &'a ExecutionPlan,
    method: IntegrationMethod,
    /// Stateful, integratable blocks, cached once per run.
    stateful: Vec<BlockIdx>,
}

impl<'a> Integrator<'a> {
    pub fn new(plan: &'a ExecutionPlan, method: IntegrationMethod) -> Self {
        let stateful = plan
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| module(b.kind).requires_state(&b.params))
            .map(|(idx, _)| idx)
            .collect();
        Self {
            plan,
            method,
            stateful,
        }
    }

    pub fn has_states(&self) -> bool {
        !self.stateful.is_empty()
    }

    /// Advances all states from `t` to `t + h`. On error the state is
    /// rolled back to its pre-step snapshot.
    pub fn step(
        &self,
        state: &mut SimState,
        evaluator: &Evaluator,
        inputs: &dyn ExternalInputs,
    ) -> Result<(), IntegrationError> {
        if self.stateful.is_empty() {
            return Ok(());
        }
        match self.method {
            IntegrationMethod::Euler => self.euler(state, evaluator),
            IntegrationMethod::Rk4 => self.rk4(state, evaluator, inputs),
        }
    }

    fn euler(&self, state: &mut SimState, evaluator: &Evaluator) -> Result<(), IntegrationError> {
        let snapshot = state.snapshot();
        let h = state.dt;
        let k1 = match self.derivatives(state, evaluator) {
            Ok(k) => k,
            Err(e) => {
                state.restore(&snapshot);
                return Err(e);
            }
        };
        let base = self.flatten_states(state);
        self.apply(state, &base, h, [(&k1, 1.0)].into_iter());
        self.validate_states(state).map_err(|e| {
            state.restore(&snapshot);
            e
        })
    }

    fn rk4(
        &self,
        state: &mut SimState,
        evaluator: &Evaluator,
        inputs: &dyn ExternalInputs,
    ) -> Result<(), IntegrationError> {
        let snapshot = state.snapshot();
        let t = state.time;
        let h = state.dt;
        let base = self.flatten_states(state);

        let result = (|| {
            // k1 at (t, x)
            let k1 = self.derivatives(state, evaluator)?;

            // k2 at (t + h/2, x + h/2·k1)
            self.apply(state, &base, h / 2.0, [(&k1, 1.0)].into_iter());
            state.time = t + h / 2.0;
            evaluator.sweep(state, inputs);
            let k2 = self.derivatives(state, evaluator)?;

            // k3 at (t + h/2, x + h/2·k2)
            self.apply(state, &base, h / 2.0, [(&k2, 1.0)].into_iter());
            evaluator.sweep(state, inputs);
            let k3 = self.derivatives(state, evaluator)?;

            // k4 at (t + h, x + h·k3)
            self.apply(state, &base, h, [(&k3, 1.0)].into_iter());
            state.time = t + h;
            evaluator.sweep(state, inputs);
            let k4 = self.derivatives(state, evaluator)?;

            Ok((k1, k2, k3, k4))
        })();

        let (k1, k2, k3, k4) = match result {
            Ok(ks) => ks,
            Err(e) => {
                state.restore(&snapshot);
                state.time = t;
                return Err(e);
            }
        };

        // restore pre-stage state, then commit the weighted update
        state.restore(&snapshot);
        state.time = t;
        self.apply(
            state,
            &base,
            h / 6.0,
            [(&k1, 1.0), (&k2, 2.0), (&k3, 2.0), (&k4, 1.0)].into_iter(),
        );
        self.validate_states(state).map_err(|e| {
            state.restore(&snapshot);
            e
        })
    }

    /// All derivative vectors at the current state and time, validated.
    fn derivatives(
        &self,
        state: &SimState,
        evaluator: &Evaluator,
    ) -> Result<HashMap<BlockIdx, Vec<f64>>, IntegrationError> {
        let mut out = HashMap::with_capacity(self.stateful.len());
        for &idx in &self.stateful {
            // a disabled subtree holds its states
            if !state.is_enabled(self.plan, idx) {
                continue;
            }
            let block = &self.plan.blocks[idx];
            let gathered = evaluator.gather_inputs(state, idx);
            let dx = module(block.kind).derivatives(
                &state.blocks[idx].internal,
                &gathered,
                &block.params,
                state.time,
            );
            if let Some(bad) = dx.iter().find(|x| !x.is_finite() || x.abs() > INSTABILITY_LIMIT)
            {
                return Err(IntegrationError::Instability {
                    block: block.id.clone(),
                    time: state.time,
                    what: format!("derivative value {bad}"),
                });
            }
            out.insert(idx, dx);
        }
        Ok(out)
    }

    fn flatten_states(&self, state: &SimState) -> HashMap<BlockIdx, Vec<f64>> {
        self.stateful
            .iter()
            .filter_map(|&idx| match &state.blocks[idx].internal {
                InternalState::TransferFunction(s) => Some((idx, s.flatten())),
                _ => None,
            })
            .collect()
    }

    /// Sets every state to `base + scale · Σ wᵢ·kᵢ`.
    fn apply<'k>(
        &self,
        state: &mut SimState,
        base: &HashMap<BlockIdx, Vec<f64>>,
        scale: f64,
        terms: impl Iterator<Item = (&'k HashMap<BlockIdx, Vec<f64>>, f64)> + Clone,
    ) {
        for (&idx, x0) in base {
            let mut next = x0.clone();
            for (k, weight) in terms.clone() {
                if let Some(dx) = k.get(&idx) {
                    for (value, d) in next.iter_mut().zip(dx) {
                        *value += scale * weight * d;
                    }
                }
            }
            if let InternalState::TransferFunction(s) = &mut state.blocks[idx].internal {
                s.assign_flat(&next);
            }
        }
    }

    fn validate_states(&self, state: &SimState) -> Result<(), IntegrationError> {
        for &idx in &self.stateful {
            if let InternalState::TransferFunction(s) = &state.blocks[idx].internal {
                for element in &s.states {
                    if let Some(bad) = element
                        .iter()
                        .find(|x| !x.is_finite() || x.abs() > INSTABILITY_LIMIT)
                    {
                        return Err(IntegrationError::Instability {
                            block: self.plan.blocks[idx].id.clone(),
                            time: state.time,
                            what: format!("state value {bad}"),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
