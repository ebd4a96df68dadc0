//! Object layout and dispatch-table slot assignment.
//!
//! All of the hard work here was already done by the semantic analyser:
//! `ClassInfo::all_attributes` and `ClassInfo::method_table` are already in
//! inherited-then-own order with overrides replacing their parent's slot in
//! place (see `sem::build_feature_tables`), so layout monotonicity and
//! dispatch-table monotonicity fall out of using those vectors' positions
//! directly as offsets/slot indices.

use crate::sem::{ClassId, ClassTable};

/// Tag, size, dispatch-table pointer.
pub const HEADER_WORDS: u32 = 3;
pub const ATTR_BASE_OFFSET: u32 = HEADER_WORDS * 4;

/// Bytes the standard prologue/epilogue reserve for `$fp`/`$ra`/`self`:
/// decrement `$sp` by 12, save `$fp` at 8, `$ra` at 4, `$a0` at 0, then set
/// `$fp := $sp`.
pub const FRAME_BYTES: i32 = 12;
/// `self` lives at this offset from `$fp` for the whole method body, the
/// frame slot the prologue saved the incoming `$a0` into.
pub const SELF_OFFSET: i32 = 0;
/// Formal `i` (0-based) sits at `ARG_BASE_OFFSET + 4*i` from `$fp`: the
/// caller pushes arguments in reverse order immediately before the `jal`,
/// so formal 0 ends up closest to the old `$sp`, which the callee's own
/// 12-byte prologue then sits below.
pub const ARG_BASE_OFFSET: i32 = FRAME_BYTES;

pub const CLASS_OBJ_TABLE_LABEL: &str = "_class_obj_table";
pub const CLASS_PARENT_TABLE_LABEL: &str = "_class_parent_table";

pub fn object_size_words(classes: &ClassTable, id: ClassId) -> u32 {
    HEADER_WORDS + classes.class(id).all_attributes.len() as u32
}

pub fn attr_offset(classes: &ClassTable, id: ClassId, name: &str) -> u32 {
    let idx = classes
        .class(id)
        .all_attributes
        .iter()
        .position(|a| a.name == name)
        .unwrap_or_else(|| panic!("attribute `{name}` missing from `{}`'s layout", classes.class(id).name));
    ATTR_BASE_OFFSET + 4 * idx as u32
}

pub fn method_slot(classes: &ClassTable, id: ClassId, name: &str) -> u32 {
    let idx = classes
        .class(id)
        .method_table
        .iter()
        .position(|m| m.name == name)
        .unwrap_or_else(|| panic!("method `{name}` missing from `{}`'s dispatch table", classes.class(id).name));
    idx as u32
}

pub fn dispatch_table_label(class_name: &str) -> String {
    format!("_dispTab_{class_name}")
}

pub fn proto_obj_label(class_name: &str) -> String {
    format!("_protObj_{class_name}")
}

pub fn init_label(class_name: &str) -> String {
    format!("_init_{class_name}")
}

pub fn method_label(owner_class: &str, method_name: &str) -> String {
    format!("_method_{owner_class}_{method_name}")
}

pub fn class_name_const_label(class_name: &str) -> String {
    format!("_class_name_{class_name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sem::{self, SemError};

    fn parse_and_check(src: &str) -> Result<sem::TypedProgram, Vec<SemError>> {
        let lexed = crate::lexer::lex(src);
        let program = crate::parser::parse(lexed.tokens).expect("parses");
        sem::check(program)
    }

    #[test]
    fn subclass_attributes_start_after_parent_attributes() {
        let typed = parse_and_check(
            r#"
            class A { x : Int <- 1; };
            class B inherits A { y : Int <- 2; };
            class Main { main() : Object { 0 }; };
            "#,
        )
        .unwrap();
        let a = typed.classes.id_of("A").unwrap();
        let b = typed.classes.id_of("B").unwrap();
        assert_eq!(attr_offset(&typed.classes, a, "x"), ATTR_BASE_OFFSET);
        assert_eq!(attr_offset(&typed.classes, b, "x"), ATTR_BASE_OFFSET);
        assert_eq!(attr_offset(&typed.classes, b, "y"), ATTR_BASE_OFFSET + 4);
    }

    #[test]
    fn overridden_method_keeps_its_inherited_slot() {
        let typed = parse_and_check(
            r#"
            class A { f() : Int { 1 }; g() : Int { 2 }; };
            class B inherits A { f() : Int { 3 }; };
            class Main { main() : Object { 0 }; };
            "#,
        )
        .unwrap();
        let a = typed.classes.id_of("A").unwrap();
        let b = typed.classes.id_of("B").unwrap();
        assert_eq!(method_slot(&typed.classes, a, "f"), method_slot(&typed.classes, b, "f"));
    }
}
