//! Program entry point, runtime helpers, and built-in methods.
//!
//! These are the handful of labels every emitted program needs regardless
//! of what the source program declares: `main`, the object-copy/equality-
//! test/case-abort runtime helpers, and the built-in methods of
//! `Object`/`IO`/`String` (COOL has no source syntax that could define
//! these, so they exist only as hand-written MIPS here).

use super::data::{BOOL_FALSE_LABEL, BOOL_TRUE_LABEL, STRING_DISPATCH_LABEL};
use super::error::CodegenError;
use super::layout;
use std::fmt::Write as _;

pub fn emit(out: &mut String) -> Result<(), CodegenError> {
    writeln!(out, ".text")?;
    emit_main(out)?;
    emit_object_copy(out)?;
    emit_equality_test(out)?;
    emit_dispatch_void(out)?;
    emit_case_abort(out)?;
    emit_object_builtins(out)?;
    emit_io_builtins(out)?;
    emit_string_builtins(out)?;
    emit_builtin_inits(out)?;
    Ok(())
}

/// `_init_<C>` for the five built-in classes. None declare attributes in
/// source (`Int`/`Bool`/`String`'s raw payload slot is part of the
/// prototype, not an AST attribute), so each is just a `jr $ra`, but the
/// label has to exist, since every user `_init_<C>` calls `_init_<parent>`
/// unconditionally and a built-in can be that parent.
fn emit_builtin_inits(out: &mut String) -> Result<(), CodegenError> {
    for class in ["Object", "IO", "Int", "Bool", "String"] {
        writeln!(out, "{}:", layout::init_label(class))?;
        writeln!(out, "\tjr\t$ra")?;
        writeln!(out)?;
    }
    Ok(())
}

fn emit_main(out: &mut String) -> Result<(), CodegenError> {
    writeln!(out, "main:")?;
    writeln!(out, "\tla\t$gp, _heap_start")?;
    writeln!(out, "\tla\t$a0, {}", layout::proto_obj_label("Main"))?;
    writeln!(out, "\tjal\t_Object_copy")?;
    writeln!(out, "\tjal\t{}", layout::init_label("Main"))?;
    writeln!(out, "\tjal\t{}", layout::method_label("Main", "main"))?;
    writeln!(out, "\tli\t$v0, 10")?;
    writeln!(out, "\tsyscall")?;
    writeln!(out)?;
    Ok(())
}

/// Bulk word copy of the prototype addressed by `$a0`, sized from its own
/// size header, returning the fresh copy in `$a0`. Every `new` lowers to a
/// call here.
fn emit_object_copy(out: &mut String) -> Result<(), CodegenError> {
    writeln!(out, "_Object_copy:")?;
    writeln!(out, "\taddiu\t$sp, $sp, -12")?;
    writeln!(out, "\tsw\t$fp, 8($sp)")?;
    writeln!(out, "\tsw\t$ra, 4($sp)")?;
    writeln!(out, "\tsw\t$a0, 0($sp)")?;
    writeln!(out, "\tmove\t$fp, $sp")?;
    writeln!(out, "\tlw\t$t0, 4($a0)")?; // size header
    writeln!(out, "\tsll\t$t0, $t0, 2")?; // bytes
    writeln!(out, "\tmove\t$t1, $gp")?; // bump allocator over the heap
    writeln!(out, "\tadd\t$gp, $gp, $t0")?;
    writeln!(out, "\tmove\t$t2, $a0")?; // source cursor
    writeln!(out, "\tmove\t$t3, $t1")?; // dest cursor
    writeln!(out, "_Object_copy_loop:")?;
    writeln!(out, "\tble\t$t0, $zero, _Object_copy_done")?;
    writeln!(out, "\tlw\t$t4, 0($t2)")?;
    writeln!(out, "\tsw\t$t4, 0($t3)")?;
    writeln!(out, "\taddiu\t$t2, $t2, 4")?;
    writeln!(out, "\taddiu\t$t3, $t3, 4")?;
    writeln!(out, "\taddiu\t$t0, $t0, -4")?;
    writeln!(out, "\tb\t_Object_copy_loop")?;
    writeln!(out, "_Object_copy_done:")?;
    writeln!(out, "\tmove\t$a0, $t1")?;
    writeln!(out, "\tlw\t$ra, 4($sp)")?;
    writeln!(out, "\tlw\t$fp, 8($sp)")?;
    writeln!(out, "\taddiu\t$sp, $sp, 12")?;
    writeln!(out, "\tjr\t$ra")?;
    writeln!(out)?;
    Ok(())
}

/// `_equality_test(lhs, rhs)`: pointer equality first, then null checks,
/// then tag-equal value/byte compare for `Int`/`Bool`/`String`, pointer
/// inequality otherwise.
fn emit_equality_test(out: &mut String) -> Result<(), CodegenError> {
    writeln!(out, "_equality_test:")?;
    writeln!(out, "\taddiu\t$sp, $sp, -12")?;
    writeln!(out, "\tsw\t$fp, 8($sp)")?;
    writeln!(out, "\tsw\t$ra, 4($sp)")?;
    writeln!(out, "\tsw\t$a0, 0($sp)")?;
    writeln!(out, "\tmove\t$fp, $sp")?;
    writeln!(out, "\tlw\t$t0, {}($fp)", layout::ARG_BASE_OFFSET)?; // lhs, pushed last by the caller
    writeln!(out, "\tlw\t$t1, {}($fp)", layout::ARG_BASE_OFFSET + 4)?; // rhs
    writeln!(out, "\tbeq\t$t0, $t1, _equality_true")?;
    writeln!(out, "\tbeq\t$t0, $zero, _equality_false")?;
    writeln!(out, "\tbeq\t$t1, $zero, _equality_false")?;
    writeln!(out, "\tlw\t$t2, 0($t0)")?; // lhs tag
    writeln!(out, "\tlw\t$t3, 0($t1)")?; // rhs tag
    writeln!(out, "\tbne\t$t2, $t3, _equality_false")?;
    writeln!(out, "\tli\t$t4, {}", crate::sem::TAG_INT)?;
    writeln!(out, "\tbeq\t$t2, $t4, _equality_value_compare")?;
    writeln!(out, "\tli\t$t4, {}", crate::sem::TAG_BOOL)?;
    writeln!(out, "\tbeq\t$t2, $t4, _equality_value_compare")?;
    writeln!(out, "\tli\t$t4, {}", crate::sem::TAG_STRING)?;
    writeln!(out, "\tbeq\t$t2, $t4, _equality_string_compare")?;
    writeln!(out, "\tb\t_equality_false")?;
    writeln!(out, "_equality_value_compare:")?;
    writeln!(out, "\tlw\t$t5, 12($t0)")?;
    writeln!(out, "\tlw\t$t6, 12($t1)")?;
    writeln!(out, "\tbeq\t$t5, $t6, _equality_true")?;
    writeln!(out, "\tb\t_equality_false")?;
    writeln!(out, "_equality_string_compare:")?;
    writeln!(out, "\tlw\t$t5, 12($t0)")?; // length
    writeln!(out, "\tlw\t$t6, 12($t1)")?;
    writeln!(out, "\tbne\t$t5, $t6, _equality_false")?;
    writeln!(out, "\taddiu\t$t7, $t0, 16")?; // lhs bytes
    writeln!(out, "\taddiu\t$t8, $t1, 16")?; // rhs bytes
    writeln!(out, "_equality_string_loop:")?;
    writeln!(out, "\tble\t$t5, $zero, _equality_true")?;
    writeln!(out, "\tlb\t$t9, 0($t7)")?;
    writeln!(out, "\tlb\t$s0, 0($t8)")?;
    writeln!(out, "\tbne\t$t9, $s0, _equality_false")?;
    writeln!(out, "\taddiu\t$t7, $t7, 1")?;
    writeln!(out, "\taddiu\t$t8, $t8, 1")?;
    writeln!(out, "\taddiu\t$t5, $t5, -1")?;
    writeln!(out, "\tb\t_equality_string_loop")?;
    writeln!(out, "_equality_true:")?;
    writeln!(out, "\tla\t$a0, {BOOL_TRUE_LABEL}")?;
    writeln!(out, "\tb\t_equality_done")?;
    writeln!(out, "_equality_false:")?;
    writeln!(out, "\tla\t$a0, {BOOL_FALSE_LABEL}")?;
    writeln!(out, "_equality_done:")?;
    writeln!(out, "\tlw\t$ra, 4($sp)")?;
    writeln!(out, "\tlw\t$fp, 8($sp)")?;
    writeln!(out, "\taddiu\t$sp, $sp, 12")?;
    writeln!(out, "\tjr\t$ra")?;
    writeln!(out)?;
    Ok(())
}

fn emit_dispatch_void(out: &mut String) -> Result<(), CodegenError> {
    writeln!(out, "_dispatch_void:")?;
    writeln!(out, "\tla\t$a0, _dispatch_void_msg")?;
    writeln!(out, "\tli\t$v0, 4")?;
    writeln!(out, "\tsyscall")?;
    writeln!(out, "\tli\t$v0, 10")?;
    writeln!(out, "\tsyscall")?;
    writeln!(out)?;
    writeln!(out, ".data")?;
    writeln!(out, "_dispatch_void_msg:")?;
    writeln!(out, "\t.asciiz\t\"Error: Dispatch on void\\n\"")?;
    writeln!(out, ".text")?;
    writeln!(out)?;
    Ok(())
}

/// Reached when a `case` scrutinee is void, or its runtime class matches no
/// branch — both are unrecoverable at runtime.
fn emit_case_abort(out: &mut String) -> Result<(), CodegenError> {
    writeln!(out, "_case_abort:")?;
    writeln!(out, "\tla\t$a0, _case_abort_msg")?;
    writeln!(out, "\tli\t$v0, 4")?;
    writeln!(out, "\tsyscall")?;
    writeln!(out, "\tli\t$v0, 10")?;
    writeln!(out, "\tsyscall")?;
    writeln!(out)?;
    writeln!(out, ".data")?;
    writeln!(out, "_case_abort_msg:")?;
    writeln!(out, "\t.asciiz\t\"Runtime error: case on void\\n\"")?;
    writeln!(out, ".text")?;
    writeln!(out)?;
    Ok(())
}

/// `abort`, `type_name`, `copy`, every class inherits these from `Object`.
fn emit_object_builtins(out: &mut String) -> Result<(), CodegenError> {
    writeln!(out, "{}:", layout::method_label("Object", "abort"))?;
    writeln!(out, "\tla\t$a0, _abort_msg")?;
    writeln!(out, "\tli\t$v0, 4")?;
    writeln!(out, "\tsyscall")?;
    writeln!(out, "\tli\t$v0, 10")?;
    writeln!(out, "\tsyscall")?;
    writeln!(out)?;

    writeln!(out, "{}:", layout::method_label("Object", "type_name"))?;
    writeln!(out, "\tlw\t$t0, 0($a0)")?; // receiver's class tag
    writeln!(out, "\tsll\t$t0, $t0, 2")?;
    writeln!(out, "\tla\t$t1, _class_name_table")?;
    writeln!(out, "\tadd\t$t1, $t1, $t0")?;
    writeln!(out, "\tlw\t$a0, 0($t1)")?;
    writeln!(out, "\tjr\t$ra")?;
    writeln!(out)?;

    writeln!(out, "{}:", layout::method_label("Object", "copy"))?;
    writeln!(out, "\tj\t_Object_copy")?;
    writeln!(out)?;

    writeln!(out, ".data")?;
    writeln!(out, "_abort_msg:")?;
    writeln!(out, "\t.asciiz\t\"Abort called from class \\n\"")?;
    writeln!(out, ".text")?;
    writeln!(out)?;
    Ok(())
}

/// `out_string`, `out_int`, `in_string`, `in_int`, `IO`'s contribution.
fn emit_io_builtins(out: &mut String) -> Result<(), CodegenError> {
    writeln!(out, "{}:", layout::method_label("IO", "out_string"))?;
    writeln!(out, "\taddiu\t$sp, $sp, -{}", layout::FRAME_BYTES)?;
    writeln!(out, "\tsw\t$fp, 8($sp)")?;
    writeln!(out, "\tsw\t$ra, 4($sp)")?;
    writeln!(out, "\tsw\t$a0, 0($sp)")?; // self, returned at the end
    writeln!(out, "\tmove\t$fp, $sp")?;
    writeln!(out, "\tlw\t$a1, {}($fp)", layout::ARG_BASE_OFFSET)?; // the String argument
    writeln!(out, "\taddiu\t$a0, $a1, 16")?;
    writeln!(out, "\tli\t$v0, 4")?;
    writeln!(out, "\tsyscall")?;
    writeln!(out, "\tlw\t$a0, {}($fp)", layout::SELF_OFFSET)?;
    writeln!(out, "\tlw\t$ra, 4($sp)")?;
    writeln!(out, "\tlw\t$fp, 8($sp)")?;
    writeln!(out, "\taddiu\t$sp, $sp, {}", layout::FRAME_BYTES)?;
    writeln!(out, "\tjr\t$ra")?;
    writeln!(out)?;

    writeln!(out, "{}:", layout::method_label("IO", "out_int"))?;
    writeln!(out, "\taddiu\t$sp, $sp, -{}", layout::FRAME_BYTES)?;
    writeln!(out, "\tsw\t$fp, 8($sp)")?;
    writeln!(out, "\tsw\t$ra, 4($sp)")?;
    writeln!(out, "\tsw\t$a0, 0($sp)")?;
    writeln!(out, "\tmove\t$fp, $sp")?;
    writeln!(out, "\tlw\t$a1, {}($fp)", layout::ARG_BASE_OFFSET)?;
    writeln!(out, "\tlw\t$a0, 12($a1)")?;
    writeln!(out, "\tli\t$v0, 1")?;
    writeln!(out, "\tsyscall")?;
    writeln!(out, "\tlw\t$a0, {}($fp)", layout::SELF_OFFSET)?;
    writeln!(out, "\tlw\t$ra, 4($sp)")?;
    writeln!(out, "\tlw\t$fp, 8($sp)")?;
    writeln!(out, "\taddiu\t$sp, $sp, {}", layout::FRAME_BYTES)?;
    writeln!(out, "\tjr\t$ra")?;
    writeln!(out)?;

    writeln!(out, "{}:", layout::method_label("IO", "in_string"))?;
    writeln!(out, "\taddiu\t$sp, $sp, -4")?;
    writeln!(out, "\tsw\t$ra, 0($sp)")?; // the jal below clobbers it
    writeln!(out, "\taddiu\t$sp, $sp, -64")?;
    writeln!(out, "\tmove\t$a0, $sp")?;
    writeln!(out, "\tli\t$a1, 64")?;
    writeln!(out, "\tli\t$v0, 8")?;
    writeln!(out, "\tsyscall")?;
    writeln!(out, "\tmove\t$a0, $sp")?;
    writeln!(out, "\tjal\t_make_string_from_buffer")?;
    writeln!(out, "\taddiu\t$sp, $sp, 64")?;
    writeln!(out, "\tlw\t$ra, 0($sp)")?;
    writeln!(out, "\taddiu\t$sp, $sp, 4")?;
    writeln!(out, "\tjr\t$ra")?;
    writeln!(out)?;

    writeln!(out, "{}:", layout::method_label("IO", "in_int"))?;
    writeln!(out, "\taddiu\t$sp, $sp, -{}", layout::FRAME_BYTES)?;
    writeln!(out, "\tsw\t$fp, 8($sp)")?;
    writeln!(out, "\tsw\t$ra, 4($sp)")?;
    writeln!(out, "\tsw\t$a0, 0($sp)")?;
    writeln!(out, "\tmove\t$fp, $sp")?;
    writeln!(out, "\tli\t$v0, 5")?;
    writeln!(out, "\tsyscall")?;
    writeln!(out, "\tla\t$a0, {}", layout::proto_obj_label("Int"))?;
    writeln!(out, "\tmove\t$t9, $v0")?;
    writeln!(out, "\tjal\t_Object_copy")?;
    writeln!(out, "\tsw\t$t9, 12($a0)")?;
    writeln!(out, "\tlw\t$ra, 4($sp)")?;
    writeln!(out, "\tlw\t$fp, 8($sp)")?;
    writeln!(out, "\taddiu\t$sp, $sp, {}", layout::FRAME_BYTES)?;
    writeln!(out, "\tjr\t$ra")?;
    writeln!(out)?;
    Ok(())
}

/// `length`, `concat`, `substr`, `String`'s contribution. `in_string`
/// shares the buffer-to-`String` helper these define.
fn emit_string_builtins(out: &mut String) -> Result<(), CodegenError> {
    writeln!(out, "{}:", layout::method_label("String", "length"))?;
    writeln!(out, "\taddiu\t$sp, $sp, -{}", layout::FRAME_BYTES)?;
    writeln!(out, "\tsw\t$fp, 8($sp)")?;
    writeln!(out, "\tsw\t$ra, 4($sp)")?;
    writeln!(out, "\tsw\t$a0, 0($sp)")?;
    writeln!(out, "\tmove\t$fp, $sp")?;
    writeln!(out, "\tlw\t$t0, 12($a0)")?;
    writeln!(out, "\tla\t$a0, {}", layout::proto_obj_label("Int"))?;
    writeln!(out, "\tjal\t_Object_copy")?;
    writeln!(out, "\tsw\t$t0, 12($a0)")?;
    writeln!(out, "\tlw\t$ra, 4($sp)")?;
    writeln!(out, "\tlw\t$fp, 8($sp)")?;
    writeln!(out, "\taddiu\t$sp, $sp, {}", layout::FRAME_BYTES)?;
    writeln!(out, "\tjr\t$ra")?;
    writeln!(out)?;

    writeln!(out, "{}:", layout::method_label("String", "concat"))?;
    writeln!(out, "\taddiu\t$sp, $sp, -12")?;
    writeln!(out, "\tsw\t$fp, 8($sp)")?;
    writeln!(out, "\tsw\t$ra, 4($sp)")?;
    writeln!(out, "\tsw\t$a0, 0($sp)")?;
    writeln!(out, "\tmove\t$fp, $sp")?;
    writeln!(out, "\tlw\t$t1, {}($fp)", layout::ARG_BASE_OFFSET)?; // the String argument
    writeln!(out, "\tlw\t$t2, {}($fp)", layout::SELF_OFFSET)?; // self (the receiver saved at entry)
    writeln!(out, "\tlw\t$t3, 12($t2)")?; // self's length
    writeln!(out, "\tlw\t$t4, 12($t1)")?; // arg's length
    writeln!(out, "\tadd\t$t5, $t3, $t4")?; // combined length
    writeln!(out, "\tmove\t$a1, $t5")?;
    writeln!(out, "\tjal\t_alloc_string")?; // returns fresh String of length $a1 in $a0, bytes uninitialised
    writeln!(out, "\taddiu\t$t6, $a0, 16")?; // dest cursor
    writeln!(out, "\taddiu\t$t7, $t2, 16")?; // self's bytes
    writeln!(out, "\tjal\t_copy_bytes")?; // copies $t3 bytes $t7 -> $t6, advancing both
    writeln!(out, "\taddiu\t$t7, $t1, 16")?; // arg's bytes
    writeln!(out, "\tmove\t$t3, $t4")?;
    writeln!(out, "\tjal\t_copy_bytes")?;
    writeln!(out, "\tlw\t$ra, 4($sp)")?;
    writeln!(out, "\tlw\t$fp, 8($sp)")?;
    writeln!(out, "\taddiu\t$sp, $sp, 12")?;
    writeln!(out, "\tjr\t$ra")?;
    writeln!(out)?;

    writeln!(out, "{}:", layout::method_label("String", "substr"))?;
    writeln!(out, "\taddiu\t$sp, $sp, -{}", layout::FRAME_BYTES)?;
    writeln!(out, "\tsw\t$fp, 8($sp)")?;
    writeln!(out, "\tsw\t$ra, 4($sp)")?;
    writeln!(out, "\tsw\t$a0, 0($sp)")?; // self
    writeln!(out, "\tmove\t$fp, $sp")?;
    writeln!(out, "\tlw\t$t1, {}($fp)", layout::ARG_BASE_OFFSET)?; // boxed i
    writeln!(out, "\tlw\t$t2, {}($fp)", layout::ARG_BASE_OFFSET + 4)?; // boxed l
    writeln!(out, "\tlw\t$t1, 12($t1)")?; // unbox i
    writeln!(out, "\tlw\t$t2, 12($t2)")?; // unbox l
    writeln!(out, "\tlw\t$t5, {}($fp)", layout::SELF_OFFSET)?;
    writeln!(out, "\tlw\t$t3, 12($t5)")?; // self length
    writeln!(out, "\tblt\t$t1, $zero, _substr_out_of_range")?;
    writeln!(out, "\tblt\t$t2, $zero, _substr_out_of_range")?;
    writeln!(out, "\tadd\t$t4, $t1, $t2")?;
    writeln!(out, "\tbgt\t$t4, $t3, _substr_out_of_range")?;
    writeln!(out, "\tmove\t$a1, $t2")?;
    writeln!(out, "\tjal\t_alloc_string")?; // fresh String of length l, bytes uninitialised
    writeln!(out, "\taddiu\t$t6, $a0, 16")?; // dest cursor
    writeln!(out, "\tlw\t$t5, {}($fp)", layout::SELF_OFFSET)?; // reload self ($a0 now the new string)
    writeln!(out, "\taddiu\t$t7, $t5, 16")?;
    writeln!(out, "\tadd\t$t7, $t7, $t1")?; // self's bytes + i
    writeln!(out, "\tmove\t$t3, $t2")?; // copy l bytes
    writeln!(out, "\tjal\t_copy_bytes")?;
    writeln!(out, "\tlw\t$ra, 4($sp)")?;
    writeln!(out, "\tlw\t$fp, 8($sp)")?;
    writeln!(out, "\taddiu\t$sp, $sp, {}", layout::FRAME_BYTES)?;
    writeln!(out, "\tjr\t$ra")?;
    writeln!(out, "_substr_out_of_range:")?;
    writeln!(out, "\tla\t$a0, _substr_range_msg")?;
    writeln!(out, "\tli\t$v0, 4")?;
    writeln!(out, "\tsyscall")?;
    writeln!(out, "\tli\t$v0, 10")?;
    writeln!(out, "\tsyscall")?;
    writeln!(out)?;

    writeln!(out, ".data")?;
    writeln!(out, "_substr_range_msg:")?;
    writeln!(out, "\t.asciiz\t\"Runtime error: substr out of range\\n\"")?;
    writeln!(out, ".text")?;
    writeln!(out)?;

    // Shared helpers used by `concat`/`substr`/`in_string`: raw allocation
    // sized from a byte count and a fixed-buffer-to-`String` conversion.
    writeln!(out, "_alloc_string:")?;
    writeln!(out, "\taddiu\t$t8, $a1, 1")?; // + NUL
    writeln!(out, "\taddiu\t$t8, $t8, 3")?;
    writeln!(out, "\tsrl\t$t8, $t8, 2")?;
    writeln!(out, "\tsll\t$t8, $t8, 2")?; // round up to a word
    writeln!(out, "\taddiu\t$t9, $t8, 16")?; // header + payload
    writeln!(out, "\tmove\t$a0, $gp")?;
    writeln!(out, "\tadd\t$gp, $gp, $t9")?;
    writeln!(out, "\tli\t$t0, {}", crate::sem::TAG_STRING)?;
    writeln!(out, "\tsw\t$t0, 0($a0)")?;
    writeln!(out, "\tsrl\t$t9, $t9, 2")?;
    writeln!(out, "\tsw\t$t9, 4($a0)")?;
    writeln!(out, "\tla\t$t0, {STRING_DISPATCH_LABEL}")?;
    writeln!(out, "\tsw\t$t0, 8($a0)")?;
    writeln!(out, "\tsw\t$a1, 12($a0)")?;
    writeln!(out, "\tjr\t$ra")?;
    writeln!(out)?;

    writeln!(out, "_copy_bytes:")?;
    writeln!(out, "_copy_bytes_loop:")?;
    writeln!(out, "\tble\t$t3, $zero, _copy_bytes_done")?;
    writeln!(out, "\tlb\t$t0, 0($t7)")?;
    writeln!(out, "\tsb\t$t0, 0($t6)")?;
    writeln!(out, "\taddiu\t$t6, $t6, 1")?;
    writeln!(out, "\taddiu\t$t7, $t7, 1")?;
    writeln!(out, "\taddiu\t$t3, $t3, -1")?;
    writeln!(out, "\tb\t_copy_bytes_loop")?;
    writeln!(out, "_copy_bytes_done:")?;
    writeln!(out, "\tjr\t$ra")?;
    writeln!(out)?;

    writeln!(out, "_make_string_from_buffer:")?;
    writeln!(out, "\taddiu\t$sp, $sp, -4")?;
    writeln!(out, "\tsw\t$ra, 0($sp)")?; // both jal's below clobber it
    writeln!(out, "\tmove\t$t5, $a0")?; // buffer start
    writeln!(out, "\tmove\t$t3, $zero")?; // length counter
    writeln!(out, "_strlen_loop:")?;
    writeln!(out, "\tadd\t$t6, $t5, $t3")?;
    writeln!(out, "\tlb\t$t0, 0($t6)")?;
    writeln!(out, "\tbeq\t$t0, $zero, _strlen_done")?;
    writeln!(out, "\tli\t$t1, 10")?; // newline terminates in_string
    writeln!(out, "\tbeq\t$t0, $t1, _strlen_done")?;
    writeln!(out, "\taddiu\t$t3, $t3, 1")?;
    writeln!(out, "\tb\t_strlen_loop")?;
    writeln!(out, "_strlen_done:")?;
    writeln!(out, "\tmove\t$a1, $t3")?;
    writeln!(out, "\taddiu\t$sp, $sp, -4")?;
    writeln!(out, "\tsw\t$t5, 0($sp)")?;
    writeln!(out, "\tjal\t_alloc_string")?;
    writeln!(out, "\tlw\t$t5, 0($sp)")?;
    writeln!(out, "\taddiu\t$sp, $sp, 4")?;
    writeln!(out, "\taddiu\t$t6, $a0, 16")?;
    writeln!(out, "\tmove\t$t7, $t5")?;
    writeln!(out, "\tjal\t_copy_bytes")?;
    writeln!(out, "\tlw\t$ra, 0($sp)")?;
    writeln!(out, "\taddiu\t$sp, $sp, 4")?;
    writeln!(out, "\tjr\t$ra")?;
    writeln!(out)?;
    Ok(())
}
