//! The capability interface every block kind implements, plus the
//! compile-time kind → module table.

use nalgebra::DVector;
use rand::rngs::SmallRng;

use signalflow_model::params::BlockParams;
use signalflow_model::types::SignalType;
use signalflow_model::value::SignalValue;
use signalflow_model::BlockKind;

/// Fixed port arity of a block. `outputs == None` means the arity follows
/// the inferred input shape (demux).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortCounts {
    pub inputs: usize,
    pub outputs: Option<usize>,
}

impl PortCounts {
    pub const fn new(inputs: usize, outputs: usize) -> Self {
        Self {
            inputs,
            outputs: Some(outputs),
        }
    }
}

/// Integration state owned by a stateful block, or the rng of a noise
/// source. Created at init, mutated only by the integrator (or the source
/// itself), discarded at reset.
#[derive(Clone, Debug)]
pub enum InternalState {
    None,
    /// One state vector (length = denominator order) per element of the
    /// input shape, in row-major element order.
    TransferFunction(TransferFunctionState),
    Noise(SmallRng),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransferFunctionState {
    pub states: Vec<DVector<f64>>,
}

impl TransferFunctionState {
    pub fn new(elements: usize, order: usize) -> Self {
        Self {
            states: vec![DVector::zeros(order); elements],
        }
    }

    /// Total number of scalar states (elements × order).
    pub fn len(&self) -> usize {
        self.states.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flatten(&self) -> Vec<f64> {
        self.states.iter().flat_map(|s| s.iter().copied()).collect()
    }

    pub fn assign_flat(&mut self, flat: &[f64]) {
        let mut offset = 0;
        for state in &mut self.states {
            for x in state.iter_mut() {
                *x = flat[offset];
                offset += 1;
            }
        }
    }
}

/// Values the evaluator resolves outside the dataflow wires before running
/// a block: external/routed input-port values and sheet-label slots.
pub enum SideChannel<'a> {
    None,
    /// `input_port`: the value routed from the parent sheet or supplied by
    /// the host, if any.
    ExternalInput(Option<&'a SignalValue>),
    /// `sheet_label_source`: the same-scope sink's value, if written.
    LabelRead(Option<&'a SignalValue>),
    /// `sheet_label_sink`: the slot this block writes.
    LabelWrite(&'a mut Option<SignalValue>),
}

/// Everything a block sees during one algebraic evaluation. The evaluator
/// owns the surrounding signal map; blocks only read `inputs` and write
/// `outputs`.
pub struct AlgebraicCtx<'a> {
    pub time: f64,
    pub timestep: f64,
    pub block_name: &'a str,
    pub params: &'a BlockParams,
    pub inputs: &'a [SignalValue],
    pub outputs: &'a mut Vec<SignalValue>,
    pub state: &'a mut InternalState,
    pub side: SideChannel<'a>,
    /// Inferred output types, when propagation determined them. Blocks that
    /// shape their output from the declared type read these.
    pub output_types: &'a [Option<SignalType>],
}

#[derive(Debug, thiserror::Error)]
pub enum BlockRuntimeError {
    #[error("missing input on port {port}")]
    MissingInput { port: usize },
    #[error("{0}")]
    ShapeMismatch(String),
    #[error("block is in an unexpected state: {0}")]
    BadState(&'static str),
}

/// Uniform capability set of one block kind. Implementations are stateless
/// unit structs; per-block state lives in [`InternalState`] and the
/// evaluator's output slots.
pub trait BlockModule: Sync {
    fn port_counts(&self, params: &BlockParams) -> PortCounts;

    fn requires_state(&self, _params: &BlockParams) -> bool {
        false
    }

    /// Fresh internal state for a block whose inferred *input* type is
    /// `input_type` (shape determines the per-element state count).
    fn init_state(&self, _params: &BlockParams, _input_type: Option<&SignalType>) -> InternalState {
        InternalState::None
    }

    /// Output types given the inferred input types. `Err` carries the
    /// propagator diagnostic text.
    fn infer_output_types(
        &self,
        input_types: &[Option<SignalType>],
        params: &BlockParams,
    ) -> Result<Vec<SignalType>, String>;

    /// One pure algebraic evaluation: (inputs, state) → outputs.
    fn algebraic(&self, ctx: &mut AlgebraicCtx) -> Result<(), BlockRuntimeError>;

    /// State derivatives at time `t`, flattened in the same order as
    /// [`TransferFunctionState::flatten`]. Empty for stateless blocks.
    fn derivatives(
        &self,
        _state: &InternalState,
        _inputs: &[SignalValue],
        _params: &BlockParams,
        _t: f64,
    ) -> Vec<f64> {
        Vec::new()
    }

    /// Emits file-scope C declarations this block needs (lookup tables).
    fn emit_static_c(&self, _ctx: &mut crate::cgen::CgenCtx) -> Result<(), String> {
        Ok(())
    }

    /// Emits the C statements computing this block's outputs.
    fn emit_algebraic_c(&self, ctx: &mut crate::cgen::CgenCtx) -> Result<(), String>;

    /// Emits the C statements filling this block's derivative slots.
    fn emit_derivatives_c(&self, _ctx: &mut crate::cgen::CgenCtx) -> Result<(), String> {
        Ok(())
    }
}

/// Compile-time dispatch table.
pub fn module(kind: BlockKind) -> &'static dyn BlockModule {
    match kind {
        BlockKind::Source => &crate::source_block::SourceBlock,
        BlockKind::InputPort => &crate::port_blocks::InputPortBlock,
        BlockKind::OutputPort => &crate::port_blocks::OutputPortBlock,
        BlockKind::Sum => &crate::sum_block::SumBlock,
        BlockKind::Multiply => &crate::multiply_block::MultiplyBlock,
        BlockKind::Scale => &crate::scale_block::ScaleBlock,
        BlockKind::Abs => &crate::unary_block::AbsBlock,
        BlockKind::Uminus => &crate::unary_block::UminusBlock,
        BlockKind::Trig => &crate::trig_block::TrigBlock,
        BlockKind::Evaluate => &crate::evaluate_block::EvaluateBlock,
        BlockKind::TransferFunction => &crate::transfer_function_block::TransferFunctionBlock,
        BlockKind::Lookup1d => &crate::lookup_block::Lookup1dBlock,
        BlockKind::Lookup2d => &crate::lookup_block::Lookup2dBlock,
        BlockKind::MatrixMultiply => &crate::matrix_multiply_block::MatrixMultiplyBlock,
        BlockKind::Transpose => &crate::transpose_block::TransposeBlock,
        BlockKind::Mux => &crate::mux_block::MuxBlock,
        BlockKind::Demux => &crate::mux_block::DemuxBlock,
        BlockKind::Mag => &crate::vector_ops_block::MagBlock,
        BlockKind::Dot => &crate::vector_ops_block::DotBlock,
        BlockKind::Cross => &crate::vector_ops_block::CrossBlock,
        BlockKind::If => &crate::if_block::IfBlock,
        BlockKind::Condition => &crate::condition_block::ConditionBlock,
        BlockKind::SignalDisplay | BlockKind::SignalLogger => &crate::probe_block::ProbeBlock,
        BlockKind::SheetLabelSink => &crate::sheet_label_block::SheetLabelSinkBlock,
        BlockKind::SheetLabelSource => &crate::sheet_label_block::SheetLabelSourceBlock,
        BlockKind::Subsystem => &crate::subsystem_block::SubsystemBlock,
    }
}

/// Shared helper: all inputs must be present and of identical type.
pub(crate) fn require_identical_inputs(
    input_types: &[Option<SignalType>],
    expected: usize,
) -> Result<SignalType, String> {
    let mut found: Option<SignalType> = None;
    if input_types.len() < expected {
        return Err("Cannot determine output type: not all inputs are connected".to_string());
    }
    for ty in input_types.iter().take(expected) {
        match (ty, found) {
            (None, _) => {
                return Err(
                    "Cannot determine output type: not all inputs are connected".to_string()
                )
            }
            (Some(t), None) => found = Some(*t),
            (Some(t), Some(prev)) if *t != prev => {
                return Err(format!(
                    "Cannot determine output type: {}",
                    SignalType::compatibility_error(&prev, t).unwrap_or_default()
                ))
            }
            _ => {}
        }
    }
    found.ok_or_else(|| "Cannot determine output type: block has no inputs".to_string())
}

/// Shared helper: one connected scalar, numeric input at `port`.
pub(crate) fn require_scalar_input(
    input_types: &[Option<SignalType>],
    port: usize,
) -> Result<SignalType, String> {
    match input_types.get(port).copied().flatten() {
        None => Err("Cannot determine output type: input is not connected".to_string()),
        Some(t) if t.is_scalar() && !t.is_bool() => Ok(t),
        Some(t) => Err(format!("expected a scalar numeric input, got {t}")),
    }
}
