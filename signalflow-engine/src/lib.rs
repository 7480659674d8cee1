//! The Signalflow simulation engine.
//!
//! Pipeline: a [`Model`](signalflow_model::Model) is flattened into an
//! [`ExecutionPlan`](plan::ExecutionPlan) (structural validation happens
//! here), the [`propagator`] annotates every port with its signal type,
//! and [`orchestrator::run`] walks the plan once per timestep — algebraic
//! sweep first, then state integration — producing
//! [`SimulationResults`](results::SimulationResults).
//!
//! The engine is single-threaded by design: the orchestrator exclusively
//! owns the [`SimState`](state::SimState), evaluator and integrator borrow
//! it one pass at a time. Hosts wanting parallelism run disjoint engines.

pub mod evaluator;
pub mod inputs;
pub mod integrator;
pub mod orchestrator;
pub mod plan;
pub mod propagator;
pub mod results;
pub mod state;

pub use inputs::ExternalInputs;
pub use orchestrator::run;
pub use plan::{BlockIdx, ExecutionPlan, PlanBlock, PlanWire};
pub use propagator::{propagate, TypeMap};
pub use results::SimulationResults;
