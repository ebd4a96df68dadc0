//! Method-body code generation: turns each `ir::Proc` into MIPS text
//! implementing the stack-frame calling convention described in
//! `codegen::layout`.
//!
//! Every `Value` the IR hands us is already a resolved storage location
//! (a temp, a formal, a `let`/`case` local, an attribute of `self`, `self`
//! itself, or a literal), the decomposition into three-address form
//! happened in `ir::build`, so this module never evaluates an expression
//! tree, it only ever "load this value into `$a0`" / "store `$a0` into
//! this location".

use super::data::{ConstPool, BOOL_FALSE_LABEL, BOOL_TRUE_LABEL};
use super::error::CodegenError;
use super::layout;
use crate::ir::{ArithOp, BasicBlock, EqKind, IRProgram, Instr, Proc, TempId, Terminator, Value};
use crate::sem::{ClassTable, TAG_OBJECT};
use std::fmt::Write as _;

pub fn emit_procs(out: &mut String, ir: &IRProgram, classes: &ClassTable, pool: &ConstPool) -> Result<(), CodegenError> {
    for proc in &ir.procs {
        emit_proc(out, proc, classes, pool)?;
    }
    Ok(())
}

fn proc_label(proc: &Proc) -> String {
    if proc.name == "$init" {
        layout::init_label(&proc.owner_class)
    } else {
        layout::method_label(&proc.owner_class, &proc.name)
    }
}

struct Ctx<'a> {
    proc: &'a Proc,
    classes: &'a ClassTable,
    pool: &'a ConstPool,
    label: String,
    next_label: u32,
}

impl<'a> Ctx<'a> {
    fn fresh_label(&mut self) -> String {
        let n = self.next_label;
        self.next_label += 1;
        format!("{}_L{n}", self.label)
    }

    fn block_label(&self, id: u32) -> String {
        format!("{}_bb{id}", self.label)
    }

    fn temp_offset(&self, t: TempId) -> i32 {
        -(4 + 4 * t as i32)
    }

    fn local_offset(&self, slot: u32) -> i32 {
        -(4 + 4 * self.proc.next_temp as i32 + 4 * slot as i32)
    }

    fn formal_offset(&self, name: &str) -> i32 {
        let idx = self
            .proc
            .params
            .iter()
            .position(|p| p == name)
            .unwrap_or_else(|| panic!("formal `{name}` not found in `{}`'s parameter list", self.label));
        layout::ARG_BASE_OFFSET + 4 * idx as i32
    }

    fn self_class_id(&self) -> crate::sem::ClassId {
        self.classes.id_of(&self.proc.owner_class).expect("proc owner class exists")
    }
}

fn emit_proc(out: &mut String, proc: &Proc, classes: &ClassTable, pool: &ConstPool) -> Result<(), CodegenError> {
    let label = proc_label(proc);
    let region_bytes = 4 * (proc.next_temp as i32 + proc.locals.len() as i32);
    let mut ctx = Ctx { proc, classes, pool, label: label.clone(), next_label: 0 };

    writeln!(out, "{label}:")?;
    writeln!(out, "\taddiu\t$sp, $sp, -{}", layout::FRAME_BYTES)?;
    writeln!(out, "\tsw\t$fp, 8($sp)")?;
    writeln!(out, "\tsw\t$ra, 4($sp)")?;
    writeln!(out, "\tsw\t$a0, 0($sp)")?;
    writeln!(out, "\tmove\t$fp, $sp")?;
    if region_bytes > 0 {
        writeln!(out, "\taddiu\t$sp, $sp, -{region_bytes}")?;
    }
    writeln!(out, "\tb\t{}", ctx.block_label(proc.entry))?;
    writeln!(out)?;

    for block in &proc.blocks {
        emit_block(out, &mut ctx, block)?;
    }
    writeln!(out)?;
    Ok(())
}

fn emit_block(out: &mut String, ctx: &mut Ctx, block: &BasicBlock) -> Result<(), CodegenError> {
    writeln!(out, "{}:", ctx.block_label(block.id))?;
    for instr in &block.instrs {
        emit_instr(out, ctx, instr)?;
    }
    emit_terminator(out, ctx, &block.term)?;
    Ok(())
}

/// Loads `v`'s value into `$a0`. Never touches `$t0`-`$t4` so callers that
/// need a value alive across a second load can stash it there first.
fn load_value(out: &mut String, ctx: &Ctx, v: &Value) -> Result<(), CodegenError> {
    match v {
        Value::Temp(t) => writeln!(out, "\tlw\t$a0, {}($fp)", ctx.temp_offset(*t))?,
        Value::LocalSlot(slot) => writeln!(out, "\tlw\t$a0, {}($fp)", ctx.local_offset(*slot))?,
        Value::Formal(name) => writeln!(out, "\tlw\t$a0, {}($fp)", ctx.formal_offset(name))?,
        Value::SelfRef => writeln!(out, "\tlw\t$a0, {}($fp)", layout::SELF_OFFSET)?,
        Value::Attr(name) => {
            let id = ctx.self_class_id();
            let offset = layout::attr_offset(ctx.classes, id, name);
            writeln!(out, "\tlw\t$a0, {}($fp)", layout::SELF_OFFSET)?;
            writeln!(out, "\tlw\t$a0, {offset}($a0)")?;
        }
        Value::ConstInt(n) => writeln!(out, "\tla\t$a0, {}", ctx.pool.label_for(*n))?,
        Value::ConstBool(true) => writeln!(out, "\tla\t$a0, {BOOL_TRUE_LABEL}")?,
        Value::ConstBool(false) => writeln!(out, "\tla\t$a0, {BOOL_FALSE_LABEL}")?,
        Value::ConstStr(idx) => writeln!(out, "\tla\t$a0, _str_const_{idx}")?,
        Value::Void => writeln!(out, "\tli\t$a0, 0")?,
    }
    Ok(())
}

/// Stores `$a0` into `v`'s location. Only the location-carrying variants
/// (not literals, not `self`) are ever assignment targets.
fn store_value(out: &mut String, ctx: &Ctx, v: &Value) -> Result<(), CodegenError> {
    match v {
        Value::Temp(t) => writeln!(out, "\tsw\t$a0, {}($fp)", ctx.temp_offset(*t))?,
        Value::LocalSlot(slot) => writeln!(out, "\tsw\t$a0, {}($fp)", ctx.local_offset(*slot))?,
        Value::Formal(name) => writeln!(out, "\tsw\t$a0, {}($fp)", ctx.formal_offset(name))?,
        other => {
            return Err(CodegenError::Invariant(format!("`{other:?}` is not a storable location")));
        }
    }
    Ok(())
}

fn store_local(out: &mut String, ctx: &Ctx, slot: u32) -> Result<(), CodegenError> {
    writeln!(out, "\tsw\t$a0, {}($fp)", ctx.local_offset(slot))?;
    Ok(())
}

fn store_formal(out: &mut String, ctx: &Ctx, name: &str) -> Result<(), CodegenError> {
    writeln!(out, "\tsw\t$a0, {}($fp)", ctx.formal_offset(name))?;
    Ok(())
}

fn store_attr(out: &mut String, ctx: &Ctx, name: &str) -> Result<(), CodegenError> {
    let id = ctx.self_class_id();
    let offset = layout::attr_offset(ctx.classes, id, name);
    writeln!(out, "\tmove\t$t9, $a0")?;
    writeln!(out, "\tlw\t$t8, {}($fp)", layout::SELF_OFFSET)?;
    writeln!(out, "\tsw\t$t9, {offset}($t8)")?;
    Ok(())
}

fn push_a0(out: &mut String) -> Result<(), CodegenError> {
    writeln!(out, "\taddiu\t$sp, $sp, -4")?;
    writeln!(out, "\tsw\t$a0, 0($sp)")?;
    Ok(())
}

fn pop_into(out: &mut String, reg: &str) -> Result<(), CodegenError> {
    writeln!(out, "\tlw\t{reg}, 0($sp)")?;
    writeln!(out, "\taddiu\t$sp, $sp, 4")?;
    Ok(())
}

/// Clones `_protObj_Int` and patches its payload slot from `reg`, leaving
/// the fresh boxed `Int` in `$a0`. Every arithmetic op ends here.
fn box_int(out: &mut String, reg: &str) -> Result<(), CodegenError> {
    writeln!(out, "\tmove\t$t9, {reg}")?;
    writeln!(out, "\tla\t$a0, {}", layout::proto_obj_label("Int"))?;
    writeln!(out, "\tjal\t_Object_copy")?;
    writeln!(out, "\tsw\t$t9, 12($a0)")?;
    Ok(())
}

/// Emits `beq $t2, $zero, <false>` / select-true/false-label boilerplate
/// shared by comparisons, `isvoid`, and `not`.
fn select_bool(out: &mut String, ctx: &mut Ctx, true_cond_reg: &str) -> Result<(), CodegenError> {
    let false_label = ctx.fresh_label();
    let done_label = ctx.fresh_label();
    writeln!(out, "\tbeq\t{true_cond_reg}, $zero, {false_label}")?;
    writeln!(out, "\tla\t$a0, {BOOL_TRUE_LABEL}")?;
    writeln!(out, "\tb\t{done_label}")?;
    writeln!(out, "{false_label}:")?;
    writeln!(out, "\tla\t$a0, {BOOL_FALSE_LABEL}")?;
    writeln!(out, "{done_label}:")?;
    Ok(())
}

fn emit_instr(out: &mut String, ctx: &mut Ctx, instr: &Instr) -> Result<(), CodegenError> {
    match instr {
        Instr::Arith { dst, op, lhs, rhs } => {
            load_value(out, ctx, rhs)?;
            push_a0(out)?;
            load_value(out, ctx, lhs)?;
            writeln!(out, "\tmove\t$t1, $a0")?; // lhs box
            pop_into(out, "$t0")?; // rhs box
            writeln!(out, "\tlw\t$t1, 12($t1)")?; // lhs raw
            writeln!(out, "\tlw\t$t0, 12($t0)")?; // rhs raw
            match op {
                ArithOp::Add => {
                    writeln!(out, "\tadd\t$t2, $t1, $t0")?;
                    box_int(out, "$t2")?;
                }
                ArithOp::Sub => {
                    writeln!(out, "\tsub\t$t2, $t1, $t0")?;
                    box_int(out, "$t2")?;
                }
                ArithOp::Mul => {
                    writeln!(out, "\tmul\t$t2, $t1, $t0")?;
                    box_int(out, "$t2")?;
                }
                ArithOp::Div => {
                    writeln!(out, "\tdiv\t$t2, $t1, $t0")?;
                    box_int(out, "$t2")?;
                }
                ArithOp::Lt => {
                    writeln!(out, "\tslt\t$t2, $t1, $t0")?;
                    select_bool(out, ctx, "$t2")?;
                }
                ArithOp::Le => {
                    writeln!(out, "\tslt\t$t2, $t0, $t1")?; // rhs < lhs
                    writeln!(out, "\txori\t$t2, $t2, 1")?; // le = !(rhs < lhs)
                    select_bool(out, ctx, "$t2")?;
                }
            }
            store_value(out, ctx, &Value::Temp(*dst))
        }
        Instr::Neg { dst, src } => {
            load_value(out, ctx, src)?;
            writeln!(out, "\tlw\t$t0, 12($a0)")?;
            writeln!(out, "\tsubu\t$t0, $zero, $t0")?;
            box_int(out, "$t0")?;
            store_value(out, ctx, &Value::Temp(*dst))
        }
        Instr::Not { dst, src } => {
            load_value(out, ctx, src)?;
            writeln!(out, "\tlw\t$t0, 12($a0)")?;
            // `not` flips the boolean, so the false branch of `select_bool`
            // (reached when the raw payload *is* zero) must be the `true`
            // result and vice versa, invert the condition register first.
            writeln!(out, "\txori\t$t0, $t0, 1")?;
            select_bool(out, ctx, "$t0")?;
            store_value(out, ctx, &Value::Temp(*dst))
        }
        Instr::Move { dst, src } => {
            load_value(out, ctx, src)?;
            store_value(out, ctx, &Value::Temp(*dst))
        }
        Instr::New { dst, class } => {
            emit_new(out, ctx, class)?;
            store_value(out, ctx, &Value::Temp(*dst))
        }
        Instr::Dispatch { dst, receiver, method: _, args, slot, target_label } => {
            emit_dispatch(out, ctx, receiver, args, *slot, target_label.as_deref())?;
            store_value(out, ctx, &Value::Temp(*dst))
        }
        Instr::IsVoid { dst, src } => {
            load_value(out, ctx, src)?;
            writeln!(out, "\tmove\t$t0, $a0")?;
            writeln!(out, "\tsltiu\t$t0, $t0, 1")?; // 1 iff $a0 == 0
            select_bool(out, ctx, "$t0")?;
            store_value(out, ctx, &Value::Temp(*dst))
        }
        Instr::EqualityTest { dst, lhs, rhs, kind } => {
            emit_equals(out, ctx, lhs, rhs, *kind)?;
            store_value(out, ctx, &Value::Temp(*dst))
        }
        Instr::Eval(_) => Ok(()), // the side effect already happened; result unused
        Instr::StoreLocal { slot, src } => {
            load_value(out, ctx, src)?;
            store_local(out, ctx, *slot)
        }
        Instr::StoreAttr { name, src } => {
            load_value(out, ctx, src)?;
            store_attr(out, ctx, name)
        }
        Instr::StoreFormal { name, src } => {
            load_value(out, ctx, src)?;
            store_formal(out, ctx, name)
        }
    }
}

fn emit_new(out: &mut String, ctx: &mut Ctx, class: &str) -> Result<(), CodegenError> {
    if class == "SELF_TYPE" {
        writeln!(out, "\tlw\t$t0, {}($fp)", layout::SELF_OFFSET)?;
        writeln!(out, "\tlw\t$t0, 0($t0)")?; // self's runtime tag
        writeln!(out, "\tsll\t$t0, $t0, 3")?; // * 8 (two words per entry)
        writeln!(out, "\tla\t$t1, {}", layout::CLASS_OBJ_TABLE_LABEL)?;
        writeln!(out, "\tadd\t$t1, $t1, $t0")?;
        writeln!(out, "\tlw\t$t2, 0($t1)")?; // protObj
        writeln!(out, "\tlw\t$t3, 4($t1)")?; // init fn
        writeln!(out, "\taddiu\t$sp, $sp, -4")?;
        writeln!(out, "\tsw\t$t3, 0($sp)")?; // stash init fn across _Object_copy
        writeln!(out, "\tmove\t$a0, $t2")?;
        writeln!(out, "\tjal\t_Object_copy")?;
        writeln!(out, "\tlw\t$t3, 0($sp)")?;
        writeln!(out, "\taddiu\t$sp, $sp, 4")?;
        writeln!(out, "\tjalr\t$t3")?;
    } else {
        writeln!(out, "\tla\t$a0, {}", layout::proto_obj_label(class))?;
        writeln!(out, "\tjal\t_Object_copy")?;
        writeln!(out, "\tjal\t{}", layout::init_label(class))?;
    }
    Ok(())
}

/// Pushes `args` in reverse order (formal 0 ends up closest to the call),
/// reloads the receiver into `$a0` right before the jump (nothing in
/// between touches its storage location, so re-reading it is simplest),
/// calls either the static target or the receiver's dispatch-table slot,
/// then pops the arguments back off.
fn emit_dispatch(
    out: &mut String,
    ctx: &mut Ctx,
    receiver: &Value,
    args: &[Value],
    slot: u32,
    target_label: Option<&str>,
) -> Result<(), CodegenError> {
    load_value(out, ctx, receiver)?;
    if !matches!(receiver, Value::SelfRef) {
        let ok_label = ctx.fresh_label();
        writeln!(out, "\tbne\t$a0, $zero, {ok_label}")?;
        writeln!(out, "\tjal\t_dispatch_void")?;
        writeln!(out, "{ok_label}:")?;
    }
    for arg in args.iter().rev() {
        load_value(out, ctx, arg)?;
        push_a0(out)?;
    }
    load_value(out, ctx, receiver)?;
    match target_label {
        Some(label) => {
            writeln!(out, "\tjal\t{label}")?;
        }
        None => {
            writeln!(out, "\tlw\t$t0, 8($a0)")?; // dispatch table pointer
            writeln!(out, "\tlw\t$t0, {}($t0)", 4 * slot)?;
            writeln!(out, "\tjalr\t$t0")?;
        }
    }
    if !args.is_empty() {
        writeln!(out, "\taddiu\t$sp, $sp, {}", 4 * args.len())?;
    }
    Ok(())
}

/// `Int`/`Bool` compare their raw payload word directly; everything else
/// (including `String`, which needs a byte compare, not a pointer compare)
/// defers to the runtime `_equality_test` helper.
fn emit_equals(out: &mut String, ctx: &mut Ctx, lhs: &Value, rhs: &Value, kind: EqKind) -> Result<(), CodegenError> {
    match kind {
        EqKind::Value => {
            load_value(out, ctx, rhs)?;
            push_a0(out)?;
            load_value(out, ctx, lhs)?;
            writeln!(out, "\tmove\t$t1, $a0")?;
            pop_into(out, "$t0")?;
            writeln!(out, "\tlw\t$t1, 12($t1)")?;
            writeln!(out, "\tlw\t$t0, 12($t0)")?;
            writeln!(out, "\tseq\t$t2, $t1, $t0")?;
            select_bool(out, ctx, "$t2")
        }
        EqKind::Reference => {
            load_value(out, ctx, rhs)?;
            push_a0(out)?;
            load_value(out, ctx, lhs)?;
            push_a0(out)?;
            writeln!(out, "\tjal\t_equality_test")?;
            writeln!(out, "\taddiu\t$sp, $sp, 8")?;
            Ok(())
        }
    }
}

fn emit_terminator(out: &mut String, ctx: &mut Ctx, term: &Terminator) -> Result<(), CodegenError> {
    match term {
        Terminator::Jump(id) => {
            writeln!(out, "\tb\t{}", ctx.block_label(*id))?;
            Ok(())
        }
        Terminator::Branch { cond, then_block, else_block } => {
            load_value(out, ctx, cond)?;
            writeln!(out, "\tlw\t$t0, 12($a0)")?;
            writeln!(out, "\tbne\t$t0, $zero, {}", ctx.block_label(*then_block))?;
            writeln!(out, "\tb\t{}", ctx.block_label(*else_block))?;
            Ok(())
        }
        Terminator::Return(value) => {
            // `_init_<C>` always returns `self` regardless of the IR's
            // `Return` operand (`ir::build::lower_init` always hands back
            // `Value::Void`, since attribute initialisation isn't itself a
            // value), callers (`new`, `main`) chain straight from
            // `_Object_copy`/`_init_<C>` to the next call expecting `$a0`
            // to still hold the object.
            if ctx.proc.name == "$init" {
                load_value(out, ctx, &Value::SelfRef)?;
            } else {
                load_value(out, ctx, value)?;
            }
            writeln!(out, "\tmove\t$sp, $fp")?;
            writeln!(out, "\tlw\t$fp, 8($sp)")?;
            writeln!(out, "\tlw\t$ra, 4($sp)")?;
            writeln!(out, "\taddiu\t$sp, $sp, {}", layout::FRAME_BYTES)?;
            writeln!(out, "\tjr\t$ra")?;
            Ok(())
        }
        Terminator::CaseDispatch { scrutinee, arms } => emit_case_dispatch(out, ctx, scrutinee, arms),
    }
}

/// Walks each arm's class up to `Object` looking for the scrutinee's
/// runtime tag; arms are already ordered deepest-class-first by
/// `ir::build`, so the first arm whose ancestry contains the runtime tag
/// is the most specific match.
fn emit_case_dispatch(out: &mut String, ctx: &mut Ctx, scrutinee: &Value, arms: &[(String, u32)]) -> Result<(), CodegenError> {
    load_value(out, ctx, scrutinee)?;
    let nonvoid_label = ctx.fresh_label();
    writeln!(out, "\tbne\t$a0, $zero, {nonvoid_label}")?;
    writeln!(out, "\tjal\t_case_abort")?;
    writeln!(out, "{nonvoid_label}:")?;
    writeln!(out, "\tlw\t$t5, 0($a0)")?; // runtime tag, held for every arm check

    for (class_name, block_id) in arms {
        let id = ctx
            .classes
            .id_of(class_name)
            .ok_or_else(|| CodegenError::Invariant(format!("case arm names unknown class `{class_name}`")))?;
        let tag = ctx.classes.class(id).tag;
        let check_label = ctx.fresh_label();
        let next_label = ctx.fresh_label();
        writeln!(out, "\tmove\t$t1, $t5")?;
        writeln!(out, "{check_label}:")?;
        writeln!(out, "\tbeq\t$t1, {tag}, {}", ctx.block_label(*block_id))?;
        writeln!(out, "\tbeq\t$t1, {TAG_OBJECT}, {next_label}")?;
        writeln!(out, "\tsll\t$t2, $t1, 2")?;
        writeln!(out, "\tla\t$t3, {}", layout::CLASS_PARENT_TABLE_LABEL)?;
        writeln!(out, "\tadd\t$t3, $t3, $t2")?;
        writeln!(out, "\tlw\t$t1, 0($t3)")?;
        writeln!(out, "\tb\t{check_label}")?;
        writeln!(out, "{next_label}:")?;
    }
    writeln!(out, "\tjal\t_case_abort")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sem;

    fn compile(src: &str) -> String {
        let lexed = crate::lexer::lex(src);
        let program = crate::parser::parse(lexed.tokens).expect("parses");
        let typed = sem::check(program).expect("type checks");
        let (ir, overflow) = crate::ir::lower_program(&typed);
        assert!(overflow.is_empty());
        let ir = crate::optimize::optimize(ir);
        super::generate(&ir, &typed.classes).expect("codegen succeeds")
    }

    #[test]
    fn hello_world_emits_out_string_dispatch() {
        let asm = compile(
            r#"
            class Main inherits IO {
                main(): Object { out_string("Hello, World.\n") };
            };
            "#,
        );
        assert!(asm.contains("_method_Main_main:"));
        assert!(asm.contains("jal\t_method_IO_out_string"));
    }

    #[test]
    fn arithmetic_expression_boxes_through_protObj_Int() {
        let asm = compile(
            r#"
            class Main {
                main(): Int { 3 + 4 * 5 };
            };
            "#,
        );
        assert!(asm.contains("_method_Main_main:"));
        assert!(asm.contains("_protObj_Int"));
    }

    #[test]
    fn new_self_type_uses_class_obj_table() {
        let asm = compile(
            r#"
            class Counter {
                next(): SELF_TYPE { new SELF_TYPE };
            };
            class Main {
                main(): Object { new Counter };
            };
            "#,
        );
        assert!(asm.contains(layout::CLASS_OBJ_TABLE_LABEL));
    }

    #[test]
    fn case_dispatch_walks_class_parent_table() {
        let asm = compile(
            r#"
            class A { };
            class B inherits A { };
            class Main {
                main(): Object {
                    case (new B) of
                        x : A => 1;
                        y : B => 2;
                    esac
                };
            };
            "#,
        );
        assert!(asm.contains(layout::CLASS_PARENT_TABLE_LABEL));
        assert!(asm.contains("_case_abort"));
    }
}
