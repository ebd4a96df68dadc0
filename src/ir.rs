//! Three-address code and control-flow graphs, lowered from the typed AST.
//!
//! One `Proc` per COOL method (plus one per attribute initialiser, folded
//! into `_init_<C>` by codegen). A `Proc` is a list of basic blocks in
//! reverse-postorder; each block is a straight-line instruction sequence
//! ending in a `Terminator`. Locals (formals, let-bindings, case bindings)
//! are referenced symbolically via `Value::Local` and resolved to stack
//! slots by the code generator, the IR layer itself is storage-agnostic,
//! which is what lets the optimiser reason about it purely in terms of
//! virtual temporaries.

use crate::ast::TypeName;

pub type TempId = u32;
pub type BlockId = u32;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Temp(TempId),
    /// A method formal; codegen maps the name to its positional offset via
    /// `Proc::params`.
    Formal(String),
    /// A `let`/`case`-bound local; `u32` indexes `Proc::locals`, each slot
    /// getting its own stack word (no slot reuse across sibling bindings,    /// simple over clever, matching the "bump `$sp`" discipline of the
    /// calling convention).
    LocalSlot(u32),
    /// The current `self` (lives in `$a0` for the whole method body).
    SelfRef,
    /// An attribute of `self`; codegen resolves the slot offset via the
    /// owning class's `all_attributes`.
    Attr(String),
    ConstInt(i32),
    ConstBool(bool),
    /// Index into the program-wide string-constant table (see
    /// `StringTable` below), not the raw text, so identical literals share
    /// one `.data` entry.
    ConstStr(u32),
    Void,
}

/// Which compare strategy `Instr::EqualityTest` should lower to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqKind {
    /// Both sides are `Int` or both `Bool`: unbox and compare the raw word.
    Value,
    /// `String` or a reference type: defer to `_equality_test`, which
    /// already implements the full pointer/null/tag/byte-compare protocol.
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// `dst := lhs op rhs`, both `Int`-valued.
    Arith {
        dst: TempId,
        op: ArithOp,
        lhs: Value,
        rhs: Value,
    },
    /// `dst := ~src` (integer complement).
    Neg { dst: TempId, src: Value },
    /// `dst := not src` (boolean complement).
    Not { dst: TempId, src: Value },
    /// `dst := src` (plain copy; also how `let`/assignment lower).
    Move { dst: TempId, src: Value },
    /// `dst := new T` (or `new SELF_TYPE`, carried as the literal string
    /// `"SELF_TYPE"` and resolved against the call site's class at
    /// codegen time).
    New { dst: TempId, class: String },
    /// Dynamic or static dispatch. `static_class` set means `e0@T.f(...)`.
    ///
    /// `slot` and `target_label` are resolved once, at IR-build time, from
    /// the receiver's static type (lowering has the class table in hand;
    /// codegen deliberately doesn't re-derive types from scratch). `slot` is
    /// always the method's dispatch-table index, used by dynamic dispatch to
    /// index through the receiver's runtime dispatch pointer. `target_label`
    /// is set only for static dispatch (`e0@T.f(...)`), naming the `_method_`
    /// label to jump to directly, bypassing the table.
    Dispatch {
        dst: TempId,
        receiver: Value,
        method: String,
        args: Vec<Value>,
        slot: u32,
        target_label: Option<String>,
    },
    /// `dst := isvoid src`.
    IsVoid { dst: TempId, src: Value },
    /// `dst := equality_test(lhs, rhs)`. `kind` records which compare
    /// strategy codegen should pick: a raw word compare for `Int`/`Bool`
    /// payloads, or a call into the runtime `_equality_test` helper for
    /// `String` and reference types (see `codegen::emit::emit_equals`).
    EqualityTest { dst: TempId, lhs: Value, rhs: Value, kind: EqKind },
    /// Evaluate for side effects only and discard the result (used for
    /// every non-final statement in a `Block`).
    Eval(Value),
    /// `Proc::locals[slot] := src`, the target of a `let`/`case` binding or
    /// of assignment to one.
    StoreLocal { slot: u32, src: Value },
    /// `self.<name> := src`, the target of an attribute initialiser or of
    /// assignment to an attribute.
    StoreAttr { name: String, src: Value },
    /// `<name> := src` where `name` names a formal, COOL permits
    /// reassigning formals, so this can appear anywhere, not just at entry.
    StoreFormal { name: String, src: Value },
}

impl Instr {
    /// The temp this instruction defines, if any. Used by liveness/DCE.
    pub fn dst(&self) -> Option<TempId> {
        match self {
            Instr::Arith { dst, .. }
            | Instr::Neg { dst, .. }
            | Instr::Not { dst, .. }
            | Instr::Move { dst, .. }
            | Instr::New { dst, .. }
            | Instr::Dispatch { dst, .. }
            | Instr::IsVoid { dst, .. }
            | Instr::EqualityTest { dst, .. } => Some(*dst),
            Instr::Eval(_)
            | Instr::StoreLocal { .. }
            | Instr::StoreAttr { .. }
            | Instr::StoreFormal { .. } => None,
        }
    }

    /// The operands this instruction reads, for liveness analysis.
    pub fn uses(&self) -> Vec<&Value> {
        match self {
            Instr::Arith { lhs, rhs, .. } => vec![lhs, rhs],
            Instr::Neg { src, .. } | Instr::Not { src, .. } | Instr::IsVoid { src, .. } => {
                vec![src]
            }
            Instr::Move { src, .. } => vec![src],
            Instr::New { .. } => vec![],
            Instr::Dispatch { receiver, args, .. } => {
                let mut v = vec![receiver];
                v.extend(args.iter());
                v
            }
            Instr::EqualityTest { lhs, rhs, kind: _ } => vec![lhs, rhs],
            Instr::Eval(v) => vec![v],
            Instr::StoreLocal { src, .. } => vec![src],
            Instr::StoreAttr { src, .. } => vec![src],
            Instr::StoreFormal { src, .. } => vec![src],
        }
    }

    /// Whether the instruction is free of externally-visible side effects
    /// and therefore eligible for dead-code elimination when its result is
    /// unused. Dispatch and `new` are never pure: dispatch may run
    /// arbitrary user code (including `out_string`/`abort`), and `new`
    /// runs an attribute initialiser that may itself dispatch. Stores have
    /// no `dst`, so DCE never considers them via the dst-unused rule, they
    /// are dropped only by the separate unreachable-block sweep.
    pub fn is_pure(&self) -> bool {
        !matches!(self, Instr::Dispatch { .. } | Instr::New { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Jump(BlockId),
    Branch {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    /// `case` dispatch: codegen picks the arm whose class is the nearest
    /// ancestor of the scrutinee's runtime tag (ties broken by declaration
    /// order, per the determinism guarantee), aborts via `_case_abort` if
    /// `scrutinee` is void or no arm matches.
    CaseDispatch {
        scrutinee: Value,
        arms: Vec<(String, BlockId)>,
    },
    Return(Value),
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instrs: Vec<Instr>,
    pub term: Terminator,
}

#[derive(Debug, Clone)]
pub struct Proc {
    pub name: String,
    pub owner_class: String,
    /// Parameter names in calling order (used by codegen to map formals to
    /// stack offsets); does not include the implicit receiver.
    pub params: Vec<String>,
    /// `let`/`case`-bound locals in first-bind order; `Value::LocalSlot(i)`
    /// indexes this vector.
    pub locals: Vec<String>,
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    pub next_temp: TempId,
}

impl Proc {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks.iter().find(|b| b.id == id).expect("unknown block id")
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks.iter_mut().find(|b| b.id == id).expect("unknown block id")
    }
}

/// Interns string literals so identical literals emit one `.data` entry and
/// so the IR can refer to them by a stable index instead of raw text.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    strings: Vec<String>,
}

impl StringTable {
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(i) = self.strings.iter().position(|e| e == s) {
            return i as u32;
        }
        self.strings.push(s.to_string());
        (self.strings.len() - 1) as u32
    }

    pub fn get(&self, id: u32) -> &str {
        &self.strings[id as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.strings.iter().enumerate().map(|(i, s)| (i as u32, s.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct IRProgram {
    pub procs: Vec<Proc>,
    pub strings: StringTable,
}

impl std::fmt::Display for IRProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for proc in &self.procs {
            writeln!(f, "proc {}.{}({}):", proc.owner_class, proc.name, proc.params.join(", "))?;
            for block in &proc.blocks {
                writeln!(f, "  bb{}:", block.id)?;
                for instr in &block.instrs {
                    writeln!(f, "    {instr:?}")?;
                }
                writeln!(f, "    {:?}", block.term)?;
            }
        }
        Ok(())
    }
}

/// Used only by `New`/dispatch lowering to spell `SELF_TYPE` the same way
/// whichever direction it's read back from.
pub fn type_name_text(t: &TypeName) -> String {
    t.as_str().to_string()
}

mod build;
pub use build::lower_program;
