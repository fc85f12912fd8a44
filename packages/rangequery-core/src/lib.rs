//! `rangequery-core` — expression language, bytecode compiler, stack
//! evaluator, and inventory store backends for the range query engine.
//!
//! See `spec.md` and `SPEC_FULL.md` at the workspace root for the full
//! specification this crate implements. Module-to-component mapping:
//!
//! - [`setops`] — SetOps (`spec.md` §4.1)
//! - [`store`] — Store interface, FileStore, KVStore, TestStore (§4.2–4.4)
//! - [`parser`] — grammar + parser (§4.5)
//! - [`compiler`] — bytecode compiler (§4.5)
//! - [`bytecode`] — the instruction set itself (§3)
//! - [`evaluator`] — the stack machine (§4.6)

pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod parser;
pub mod setops;
pub mod store;

pub use bytecode::{Instruction, Program};
pub use error::{RangeError, Result};
pub use evaluator::{evaluate, EvalResult};
pub use store::Store;

/// Parse and compile `expr`, then evaluate it against `store`.
///
/// This is the engine's single front-door entry point: everything
/// downstream of the HTTP/CLI boundary (`spec.md` §1 "out of scope")
/// goes through this function.
pub fn run(expr: &str, store: &dyn Store) -> Result<EvalResult> {
    let program = compiler::compile(expr)?;
    evaluator::evaluate(&program, store)
}
