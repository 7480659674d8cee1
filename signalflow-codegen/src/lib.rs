//! C99 code generation for Signalflow models.
//!
//! [`generate`] walks the same execution plan the interpreter uses and
//! emits a `<model>.h` / `<model>.c` pair implementing `model_init`,
//! `model_evaluate_algebraic`, `model_derivatives` and `model_step`, plus
//! an optional `main.c` harness that prints every root output port per
//! step so an external comparator can diff against the interpreter.

mod generator;
pub mod sanitize;

pub use generator::{generate, CodegenError, GeneratedCode};
