//! Lowers an optimised `ir::IRProgram` to SPIM-flavoured MIPS32 assembly
//! text: a `.data` section (dispatch tables, prototype objects, interned
//! constants), the hand-written runtime support routines, and one label
//! per user-declared method/`$init`.

mod data;
mod emit;
mod error;
pub(crate) mod layout;
mod runtime;

pub use error::CodegenError;

use crate::ir::IRProgram;
use crate::sem::ClassTable;

/// Assembles the whole `.s` file. Section order is fixed (data, then
/// runtime, then generated method bodies) so output is byte-identical
/// across runs for the same input.
pub fn generate(ir: &IRProgram, classes: &ClassTable) -> Result<String, CodegenError> {
    let pool = data::ConstPool::collect(ir);
    let mut out = String::new();
    data::emit(&mut out, ir, classes, &pool)?;
    runtime::emit(&mut out)?;
    emit::emit_procs(&mut out, ir, classes, &pool)?;
    Ok(out)
}
