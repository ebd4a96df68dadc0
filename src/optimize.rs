//! Intraprocedural optimisation over the IR: constant folding and
//! propagation, backward liveness, dead-code elimination, and jump
//! threading. Runs to a fixed point, bounded at a small number of rounds
//! since each pass only ever shrinks or simplifies a proc, there is no way
//! for rounds to oscillate, just diminishing returns.
//!
//! Every `Value::Temp` is defined exactly once by construction (`ir::build`
//! never reuses a temp id), so constant propagation is a single forward
//! pass: a temp's single definition is all there is to know about it.
//! Liveness still needs the usual backward dataflow over the CFG, a temp
//! defined in one block can be live or dead depending on which successor
//! path is taken.

use crate::ir::{ArithOp, BasicBlock, BlockId, IRProgram, Instr, Proc, TempId, Terminator, Value};
use std::collections::{HashMap, HashSet};

const MAX_ROUNDS: u32 = 3;

pub fn optimize(mut program: IRProgram) -> IRProgram {
    for proc in &mut program.procs {
        for _ in 0..MAX_ROUNDS {
            let mut changed = false;
            changed |= constant_fold_and_propagate(proc);
            let liveness = compute_liveness(proc);
            changed |= dead_code_eliminate(proc, &liveness);
            changed |= prune_unreachable_blocks(proc);
            changed |= thread_jumps(proc);
            if !changed {
                break;
            }
        }
    }
    program
}

/// Per-block live-in/live-out temp sets, computed by the standard backward
/// dataflow over the CFG: `live_out(b) = union of live_in(successors)`,
/// `live_in(b) = uses(b) ∪ (live_out(b) - defs(b))`. Runs to a fixed point;
/// a proc's block count is small enough that this always terminates in a
/// handful of iterations (no widening needed, the lattice is finite subsets
/// of `Proc::next_temp` and every step only grows sets monotonically).
struct Liveness {
    live_in: HashMap<BlockId, HashSet<TempId>>,
    live_out: HashMap<BlockId, HashSet<TempId>>,
}

fn block_defs_uses(block: &BasicBlock) -> (HashSet<TempId>, HashSet<TempId>) {
    let mut defs = HashSet::new();
    let mut uses = HashSet::new();
    for instr in &block.instrs {
        for v in instr.uses() {
            if let Value::Temp(t) = v {
                if !defs.contains(t) {
                    uses.insert(*t);
                }
            }
        }
        if let Some(d) = instr.dst() {
            defs.insert(d);
        }
    }
    for v in terminator_uses(&block.term) {
        if let Value::Temp(t) = v {
            if !defs.contains(t) {
                uses.insert(*t);
            }
        }
    }
    (defs, uses)
}

fn terminator_uses(term: &Terminator) -> Vec<&Value> {
    match term {
        Terminator::Branch { cond, .. } => vec![cond],
        Terminator::CaseDispatch { scrutinee, .. } => vec![scrutinee],
        Terminator::Return(v) => vec![v],
        Terminator::Jump(_) => vec![],
    }
}

fn compute_liveness(proc: &Proc) -> Liveness {
    let mut live_in: HashMap<BlockId, HashSet<TempId>> = proc.blocks.iter().map(|b| (b.id, HashSet::new())).collect();
    let mut live_out: HashMap<BlockId, HashSet<TempId>> = proc.blocks.iter().map(|b| (b.id, HashSet::new())).collect();
    let defs_uses: HashMap<BlockId, (HashSet<TempId>, HashSet<TempId>)> =
        proc.blocks.iter().map(|b| (b.id, block_defs_uses(b))).collect();

    loop {
        let mut changed = false;
        for block in proc.blocks.iter().rev() {
            let succs = successors(block);
            let mut out: HashSet<TempId> = HashSet::new();
            for s in &succs {
                if let Some(s_in) = live_in.get(s) {
                    out.extend(s_in.iter().copied());
                }
            }
            let (defs, uses) = &defs_uses[&block.id];
            let mut inset = uses.clone();
            inset.extend(out.difference(defs).copied());

            if live_out[&block.id] != out {
                live_out.insert(block.id, out);
                changed = true;
            }
            if live_in[&block.id] != inset {
                live_in.insert(block.id, inset);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    Liveness { live_in, live_out }
}

#[derive(Clone, Copy, PartialEq)]
enum Const {
    Int(i32),
    Bool(bool),
}

fn as_const(v: &Value, consts: &HashMap<TempId, Const>) -> Option<Const> {
    match v {
        Value::ConstInt(n) => Some(Const::Int(*n)),
        Value::ConstBool(b) => Some(Const::Bool(*b)),
        Value::Temp(t) => consts.get(t).copied(),
        _ => None,
    }
}

fn const_to_value(c: Const) -> Value {
    match c {
        Const::Int(n) => Value::ConstInt(n),
        Const::Bool(b) => Value::ConstBool(b),
    }
}

/// Folds arithmetic/logical instructions whose operands are all constant
/// (literal or previously-propagated), and substitutes known-constant
/// temps into operand positions throughout the proc. Single linear pass:
/// since a temp's defining instruction is emitted before any use, scanning
/// blocks and instructions in creation order sees every definition before
/// its uses.
fn constant_fold_and_propagate(proc: &mut Proc) -> bool {
    let mut consts: HashMap<TempId, Const> = HashMap::new();
    let mut changed = false;

    for block in &mut proc.blocks {
        for instr in &mut block.instrs {
            substitute(instr, &consts);
            if let Some((dst, c)) = fold(instr) {
                consts.insert(dst, c);
                *instr = Instr::Move { dst, src: const_to_value(c) };
                changed = true;
            }
        }
        substitute_terminator(&mut block.term, &consts);
    }
    changed
}

fn substitute(instr: &mut Instr, consts: &HashMap<TempId, Const>) {
    let replace = |v: &mut Value| {
        if let Value::Temp(t) = v {
            if let Some(c) = consts.get(t) {
                *v = const_to_value(*c);
            }
        }
    };
    match instr {
        Instr::Arith { lhs, rhs, .. } | Instr::EqualityTest { lhs, rhs, .. } => {
            replace(lhs);
            replace(rhs);
        }
        Instr::Neg { src, .. } | Instr::Not { src, .. } | Instr::IsVoid { src, .. } => replace(src),
        Instr::Move { src, .. } => replace(src),
        Instr::Dispatch { receiver, args, .. } => {
            replace(receiver);
            for a in args {
                replace(a);
            }
        }
        Instr::Eval(v) => replace(v),
        Instr::StoreLocal { src, .. } | Instr::StoreAttr { src, .. } | Instr::StoreFormal { src, .. } => {
            replace(src)
        }
        Instr::New { .. } => {}
    }
}

fn substitute_terminator(term: &mut Terminator, consts: &HashMap<TempId, Const>) {
    let replace = |v: &mut Value| {
        if let Value::Temp(t) = v {
            if let Some(c) = consts.get(t) {
                *v = const_to_value(*c);
            }
        }
    };
    match term {
        Terminator::Branch { cond, .. } => replace(cond),
        Terminator::CaseDispatch { scrutinee, .. } => replace(scrutinee),
        Terminator::Return(v) => replace(v),
        Terminator::Jump(_) => {}
    }
}

/// Evaluates `instr` if every operand is a compile-time constant, returning
/// the `(dst, value)` pair to fold in. `Div` by a known-zero divisor is
/// left unfolded, that's a runtime `_div_by_zero` abort, not a value this
/// pass can produce.
fn fold(instr: &Instr) -> Option<(TempId, Const)> {
    let consts = HashMap::new(); // operands are already substituted in-place
    match instr {
        Instr::Arith { dst, op, lhs, rhs } => {
            let (Const::Int(l), Const::Int(r)) = (as_const(lhs, &consts)?, as_const(rhs, &consts)?) else {
                return None;
            };
            let result = match op {
                ArithOp::Add => Const::Int(l.wrapping_add(r)),
                ArithOp::Sub => Const::Int(l.wrapping_sub(r)),
                ArithOp::Mul => Const::Int(l.wrapping_mul(r)),
                ArithOp::Div => {
                    if r == 0 {
                        return None;
                    }
                    Const::Int(l.wrapping_div(r))
                }
                ArithOp::Lt => Const::Bool(l < r),
                ArithOp::Le => Const::Bool(l <= r),
            };
            Some((*dst, result))
        }
        Instr::Neg { dst, src } => match as_const(src, &consts)? {
            Const::Int(n) => Some((*dst, Const::Int(n.wrapping_neg()))),
            Const::Bool(_) => None,
        },
        Instr::Not { dst, src } => match as_const(src, &consts)? {
            Const::Bool(b) => Some((*dst, Const::Bool(!b))),
            Const::Int(_) => None,
        },
        _ => None,
    }
}

/// Removes pure instructions whose result is dead at the point they run,
/// walking each block backward from `liveness.live_out` so a temp defined
/// and never consumed before the block's own terminator (or by a
/// successor) is recognised as dead even when some *other* temp with the
/// same id would be live in a different block, the whole-proc "used
/// anywhere" approximation this replaces couldn't tell those apart.
/// `StoreLocal`s whose local is never read back anywhere are dropped too,
/// a slot written once and never loaded contributes nothing observable.
fn dead_code_eliminate(proc: &mut Proc, liveness: &Liveness) -> bool {
    let used_locals = locals_read_anywhere(proc);
    let mut changed = false;

    for block in &mut proc.blocks {
        let mut live = liveness.live_out[&block.id].clone();
        let before = block.instrs.len();
        let mut kept = Vec::with_capacity(block.instrs.len());
        for instr in block.instrs.drain(..).rev() {
            let dead_temp = instr.is_pure() && matches!(instr.dst(), Some(t) if !live.contains(&t));
            let dead_store = matches!(&instr, Instr::StoreLocal { slot, .. } if !used_locals.contains(slot));
            if dead_temp || dead_store {
                continue;
            }
            if let Some(d) = instr.dst() {
                live.remove(&d);
            }
            for v in instr.uses() {
                if let Value::Temp(t) = v {
                    live.insert(*t);
                }
            }
            kept.push(instr);
        }
        kept.reverse();
        block.instrs = kept;
        if block.instrs.len() != before {
            changed = true;
        }
    }
    changed
}

fn locals_read_anywhere(proc: &Proc) -> HashSet<u32> {
    let mut used = HashSet::new();
    for block in &proc.blocks {
        for instr in &block.instrs {
            for v in instr.uses() {
                if let Value::LocalSlot(i) = v {
                    used.insert(*i);
                }
            }
        }
        for v in terminator_uses(&block.term) {
            if let Value::LocalSlot(i) = v {
                used.insert(*i);
            }
        }
    }
    used
}

/// Drops blocks unreachable from `entry`, following `Jump`/`Branch`/
/// `CaseDispatch` edges.
fn prune_unreachable_blocks(proc: &mut Proc) -> bool {
    let mut reachable = HashSet::new();
    let mut stack = vec![proc.entry];
    while let Some(id) = stack.pop() {
        if !reachable.insert(id) {
            continue;
        }
        for succ in successors(proc.block(id)) {
            stack.push(succ);
        }
    }
    let before = proc.blocks.len();
    proc.blocks.retain(|b| reachable.contains(&b.id));
    proc.blocks.len() != before
}

fn successors(block: &BasicBlock) -> Vec<BlockId> {
    match &block.term {
        Terminator::Jump(b) => vec![*b],
        Terminator::Branch { then_block, else_block, .. } => vec![*then_block, *else_block],
        Terminator::CaseDispatch { arms, .. } => arms.iter().map(|(_, b)| *b).collect(),
        Terminator::Return(_) => vec![],
    }
}

/// Collapses "forwarding" blocks, empty blocks whose only job is an
/// unconditional `Jump`, by redirecting every edge that targets them
/// straight to their destination.
fn thread_jumps(proc: &mut Proc) -> bool {
    let mut forward: HashMap<BlockId, BlockId> = HashMap::new();
    for block in &proc.blocks {
        if block.instrs.is_empty() {
            if let Terminator::Jump(target) = block.term {
                if target != block.id {
                    forward.insert(block.id, target);
                }
            }
        }
    }
    if forward.is_empty() {
        return false;
    }

    let resolve = |mut id: BlockId| {
        let mut seen = HashSet::new();
        while let Some(&next) = forward.get(&id) {
            if !seen.insert(id) {
                break; // defensive: a cycle of empty forwarders, leave as-is
            }
            id = next;
        }
        id
    };

    let mut changed = false;
    for block in &mut proc.blocks {
        let new_term = match &block.term {
            Terminator::Jump(b) => Terminator::Jump(resolve(*b)),
            Terminator::Branch { cond, then_block, else_block } => Terminator::Branch {
                cond: cond.clone(),
                then_block: resolve(*then_block),
                else_block: resolve(*else_block),
            },
            Terminator::CaseDispatch { scrutinee, arms } => Terminator::CaseDispatch {
                scrutinee: scrutinee.clone(),
                arms: arms.iter().map(|(t, b)| (t.clone(), resolve(*b))).collect(),
            },
            Terminator::Return(v) => Terminator::Return(v.clone()),
        };
        if new_term != block.term {
            block.term = new_term;
            changed = true;
        }
    }
    if proc.entry != resolve(proc.entry) {
        proc.entry = resolve(proc.entry);
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::StringTable;

    fn single_block_proc(instrs: Vec<Instr>, term: Terminator) -> Proc {
        Proc {
            name: "m".into(),
            owner_class: "C".into(),
            params: vec![],
            locals: vec![],
            blocks: vec![BasicBlock { id: 0, instrs, term }],
            entry: 0,
            next_temp: 10,
        }
    }

    #[test]
    fn folds_constant_arithmetic() {
        let mut proc = single_block_proc(
            vec![Instr::Arith { dst: 0, op: ArithOp::Add, lhs: Value::ConstInt(2), rhs: Value::ConstInt(3) }],
            Terminator::Return(Value::Temp(0)),
        );
        constant_fold_and_propagate(&mut proc);
        assert_eq!(proc.blocks[0].instrs[0], Instr::Move { dst: 0, src: Value::ConstInt(5) });
    }

    #[test]
    fn propagates_folded_constant_into_terminator() {
        let mut proc = single_block_proc(
            vec![Instr::Arith { dst: 0, op: ArithOp::Lt, lhs: Value::ConstInt(1), rhs: Value::ConstInt(2) }],
            Terminator::Branch { cond: Value::Temp(0), then_block: 1, else_block: 2 },
        );
        constant_fold_and_propagate(&mut proc);
        assert_eq!(
            proc.blocks[0].term,
            Terminator::Branch { cond: Value::ConstBool(true), then_block: 1, else_block: 2 }
        );
    }

    #[test]
    fn removes_dead_pure_instruction() {
        let mut proc = single_block_proc(
            vec![
                Instr::Arith { dst: 0, op: ArithOp::Add, lhs: Value::ConstInt(1), rhs: Value::ConstInt(1) },
                Instr::Arith { dst: 1, op: ArithOp::Add, lhs: Value::ConstInt(2), rhs: Value::ConstInt(2) },
            ],
            Terminator::Return(Value::Temp(1)),
        );
        let liveness = compute_liveness(&proc);
        dead_code_eliminate(&mut proc, &liveness);
        assert_eq!(proc.blocks[0].instrs.len(), 1);
        assert_eq!(proc.blocks[0].instrs[0].dst(), Some(1));
    }

    #[test]
    fn keeps_dispatch_even_when_result_unused() {
        let mut proc = single_block_proc(
            vec![Instr::Dispatch {
                dst: 0,
                receiver: Value::SelfRef,
                method: "out_string".into(),
                args: vec![Value::ConstStr(0)],
                slot: 0,
                target_label: None,
            }],
            Terminator::Return(Value::Void),
        );
        let liveness = compute_liveness(&proc);
        dead_code_eliminate(&mut proc, &liveness);
        assert_eq!(proc.blocks[0].instrs.len(), 1);
    }

    #[test]
    fn liveness_marks_temp_dead_across_a_branch_that_never_uses_it() {
        let proc = Proc {
            name: "m".into(),
            owner_class: "C".into(),
            params: vec![],
            locals: vec![],
            blocks: vec![
                BasicBlock {
                    id: 0,
                    instrs: vec![Instr::Arith {
                        dst: 0,
                        op: ArithOp::Add,
                        lhs: Value::ConstInt(1),
                        rhs: Value::ConstInt(1),
                    }],
                    term: Terminator::Jump(1),
                },
                BasicBlock { id: 1, instrs: vec![], term: Terminator::Return(Value::ConstInt(0)) },
            ],
            entry: 0,
            next_temp: 1,
        };
        let liveness = compute_liveness(&proc);
        assert!(!liveness.live_out[&0].contains(&0));
        assert!(liveness.live_in[&1].is_empty());
    }

    #[test]
    fn threads_through_empty_forwarding_block() {
        let mut proc = Proc {
            name: "m".into(),
            owner_class: "C".into(),
            params: vec![],
            locals: vec![],
            blocks: vec![
                BasicBlock { id: 0, instrs: vec![], term: Terminator::Jump(1) },
                BasicBlock { id: 1, instrs: vec![], term: Terminator::Jump(2) },
                BasicBlock { id: 2, instrs: vec![], term: Terminator::Return(Value::Void) },
            ],
            entry: 0,
            next_temp: 0,
        };
        thread_jumps(&mut proc);
        assert_eq!(proc.entry, 2);
    }

    #[test]
    fn prunes_unreachable_block() {
        let mut proc = Proc {
            name: "m".into(),
            owner_class: "C".into(),
            params: vec![],
            locals: vec![],
            blocks: vec![
                BasicBlock { id: 0, instrs: vec![], term: Terminator::Return(Value::Void) },
                BasicBlock { id: 1, instrs: vec![], term: Terminator::Return(Value::Void) },
            ],
            entry: 0,
            next_temp: 0,
        };
        prune_unreachable_blocks(&mut proc);
        assert_eq!(proc.blocks.len(), 1);
    }

    #[test]
    fn optimize_runs_end_to_end_on_trivial_program() {
        let proc = single_block_proc(
            vec![Instr::Arith { dst: 0, op: ArithOp::Add, lhs: Value::ConstInt(1), rhs: Value::ConstInt(1) }],
            Terminator::Return(Value::Temp(0)),
        );
        let program = IRProgram { procs: vec![proc], strings: StringTable::default() };
        let optimized = optimize(program);
        assert_eq!(optimized.procs[0].blocks[0].instrs.len(), 1);
    }
}
