//! The Signalflow block catalog.
//!
//! One module per block kind. Every kind implements the
//! [`BlockModule`](module::BlockModule) capability set — algebraic
//! evaluation, state derivatives, output-type inference and C emission —
//! and is reached through the compile-time table in [`module::module`].

pub mod cgen;
pub mod module;

mod condition_block;
mod evaluate_block;
mod if_block;
mod lookup_block;
mod matrix_multiply_block;
mod multiply_block;
mod mux_block;
mod port_blocks;
mod probe_block;
mod scale_block;
mod sheet_label_block;
mod source_block;
mod subsystem_block;
mod sum_block;
mod transfer_function_block;
mod transpose_block;
mod trig_block;
mod unary_block;
mod vector_ops_block;

pub use module::{
    module, AlgebraicCtx, BlockModule, BlockRuntimeError, InternalState, PortCounts, SideChannel,
    TransferFunctionState,
};

#[cfg(test)]
pub(crate) mod testing;
