//! Lowers the typed AST into `IRProgram` (one `Proc` per method, plus one
//! synthetic `$init` proc per user class for its attribute initialisers).

use crate::ast::*;
use crate::codegen::layout;
use crate::ir::*;
use crate::sem::{ClassId, ClassTable, TypedProgram};
use std::collections::HashMap;

/// Lowers the typed AST into IR. Returns the raw text of every integer
/// literal that doesn't fit in a 32-bit two's-complement `Int`, lexing and
/// parsing both accept an unbounded digit run, so this is the first stage
/// able to say so (`CodegenError::IntegerOutOfRange` downstream names the
/// same literal text).
pub fn lower_program(typed: &TypedProgram) -> (IRProgram, Vec<String>) {
    let mut strings = StringTable::default();
    let mut procs = Vec::new();
    let mut overflows = Vec::new();

    for class in &typed.program.classes {
        for feature in &class.features {
            if let Feature::Method(method) = feature {
                let mut b = Builder::new(class.name.clone(), &typed.classes, strings);
                let proc = b.lower_method(method);
                strings = b.strings;
                overflows.extend(b.overflow);
                procs.push(proc);
            }
        }

        // Every class gets an `$init` proc, even an empty one, so codegen's
        // `_init_<C>` generation doesn't special-case classes with no
        // attribute initialisers.
        let mut b = Builder::new(class.name.clone(), &typed.classes, strings);
        let proc = b.lower_init(class);
        strings = b.strings;
        overflows.extend(b.overflow);
        procs.push(proc);
    }

    (IRProgram { procs, strings }, overflows)
}

/// Ancestor-chain depth, root (`Object`) at 0. Used to order `case` arms
/// from most to least specific, matching the "nearest ancestor wins" rule
/// codegen applies when walking the scrutinee's runtime tag.
fn depth_of(classes: &ClassTable, id: ClassId) -> u32 {
    let mut depth = 0;
    let mut cur = classes.class(id).parent;
    while let Some(p) = cur {
        depth += 1;
        cur = classes.class(p).parent;
    }
    depth
}

struct Builder<'a> {
    class_name: String,
    classes: &'a ClassTable,
    strings: StringTable,
    /// Raw text of every integer literal seen so far that overflows `i32`.
    overflow: Vec<String>,
    scopes: Vec<HashMap<String, u32>>,
    locals: Vec<String>,
    next_temp: TempId,
    next_block: BlockId,
    blocks: Vec<BasicBlock>,
}

/// Where an identifier lives, resolved lexically: nearest `let`/`case`
/// binding, then method formal, then attribute of `self`.
enum Slot {
    Local(u32),
    Formal(String),
    Attr(String),
}

impl<'a> Builder<'a> {
    fn new(class_name: String, classes: &'a ClassTable, strings: StringTable) -> Self {
        Builder {
            class_name,
            classes,
            strings,
            overflow: Vec::new(),
            scopes: vec![HashMap::new()],
            locals: Vec::new(),
            next_temp: 0,
            next_block: 0,
            blocks: Vec::new(),
        }
    }

    fn fresh_temp(&mut self) -> TempId {
        let t = self.next_temp;
        self.next_temp += 1;
        t
    }

    fn fresh_block(&mut self) -> BlockId {
        let b = self.next_block;
        self.next_block += 1;
        b
    }

    fn start_block(&mut self) -> BlockId {
        let id = self.fresh_block();
        // Placeholder terminator; every path that starts a block also
        // terminates it before `lower_method`/`lower_init` return.
        self.blocks.push(BasicBlock { id, instrs: Vec::new(), term: Terminator::Return(Value::Void) });
        id
    }

    fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks.iter_mut().find(|b| b.id == id).expect("unknown block id")
    }

    fn emit(&mut self, block: BlockId, instr: Instr) {
        self.block_mut(block).instrs.push(instr);
    }

    fn terminate(&mut self, block: BlockId, term: Terminator) {
        self.block_mut(block).term = term;
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind_local(&mut self, name: &str) -> u32 {
        let idx = self.locals.len() as u32;
        self.locals.push(name.to_string());
        self.scopes.last_mut().unwrap().insert(name.to_string(), idx);
        idx
    }

    fn resolve(&self, name: &str, formals: &[String]) -> Slot {
        for scope in self.scopes.iter().rev() {
            if let Some(&idx) = scope.get(name) {
                return Slot::Local(idx);
            }
        }
        if formals.iter().any(|f| f == name) {
            return Slot::Formal(name.to_string());
        }
        Slot::Attr(name.to_string())
    }

    fn store(&mut self, block: BlockId, slot: Slot, src: Value) {
        let instr = match slot {
            Slot::Local(idx) => Instr::StoreLocal { slot: idx, src },
            Slot::Formal(name) => Instr::StoreFormal { name, src },
            Slot::Attr(name) => Instr::StoreAttr { name, src },
        };
        self.emit(block, instr);
    }

    fn intern_str(&mut self, s: &str) -> u32 {
        self.strings.intern(s)
    }

    fn lower_method(&mut self, method: &Method) -> Proc {
        let formals: Vec<String> = method.formals.iter().map(|f| f.name.clone()).collect();
        let entry = self.start_block();
        let (end_block, result) = self.lower_expr(&method.body, entry, &formals);
        self.terminate(end_block, Terminator::Return(result));
        self.finish_proc(method.name.clone(), formals, entry)
    }

    fn lower_init(&mut self, class: &Class) -> Proc {
        let entry = self.start_block();
        let mut cur = entry;
        for feature in &class.features {
            if let Feature::Attribute(attr) = feature {
                let v = match &attr.init {
                    Some(init) => {
                        let (next, v) = self.lower_expr(init, cur, &[]);
                        cur = next;
                        v
                    }
                    // No initialiser: still store the type's default so the
                    // attribute slot holds a properly-boxed `Int`/`Bool`/
                    // `String`, not the raw zero word the prototype object
                    // starts with.
                    None => self.default_value(&attr.type_name),
                };
                self.emit(cur, Instr::StoreAttr { name: attr.name.clone(), src: v });
            }
        }
        self.terminate(cur, Terminator::Return(Value::Void));
        self.finish_proc("$init".to_string(), Vec::new(), entry)
    }

    fn finish_proc(&mut self, name: String, params: Vec<String>, entry: BlockId) -> Proc {
        Proc {
            name,
            owner_class: self.class_name.clone(),
            params,
            locals: std::mem::take(&mut self.locals),
            blocks: std::mem::take(&mut self.blocks),
            entry,
            next_temp: self.next_temp,
        }
    }

    /// Lowers `expr` starting at `block`, returning the block the
    /// surrounding expression should keep emitting into (control flow may
    /// have split it into several) together with the value produced.
    fn lower_expr(&mut self, expr: &Expr, block: BlockId, formals: &[String]) -> (BlockId, Value) {
        match &expr.kind {
            ExprKind::IntLiteral(text) => match text.parse::<i32>() {
                Ok(n) => (block, Value::ConstInt(n)),
                Err(_) => {
                    self.overflow.push(text.clone());
                    (block, Value::ConstInt(0))
                }
            },
            ExprKind::BoolLiteral(b) => (block, Value::ConstBool(*b)),
            ExprKind::StringLiteral(s) => {
                let idx = self.intern_str(s);
                (block, Value::ConstStr(idx))
            }
            ExprKind::Id(name) if name == "self" => (block, Value::SelfRef),
            ExprKind::Id(name) => (block, self.read(name, formals)),
            ExprKind::Group(inner) => self.lower_expr(inner, block, formals),
            ExprKind::Assign { name, value } => {
                let (b1, v) = self.lower_expr(value, block, formals);
                let slot = self.resolve(name, formals);
                self.store(b1, slot, v.clone());
                (b1, v)
            }
            ExprKind::Complement(inner) => {
                let (b1, v) = self.lower_expr(inner, block, formals);
                let dst = self.fresh_temp();
                self.emit(b1, Instr::Neg { dst, src: v });
                (b1, Value::Temp(dst))
            }
            ExprKind::Not(inner) => {
                let (b1, v) = self.lower_expr(inner, block, formals);
                let dst = self.fresh_temp();
                self.emit(b1, Instr::Not { dst, src: v });
                (b1, Value::Temp(dst))
            }
            ExprKind::IsVoid(inner) => {
                let (b1, v) = self.lower_expr(inner, block, formals);
                let dst = self.fresh_temp();
                self.emit(b1, Instr::IsVoid { dst, src: v });
                (b1, Value::Temp(dst))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let (b1, lv) = self.lower_expr(lhs, block, formals);
                let (b2, rv) = self.lower_expr(rhs, b1, formals);
                let dst = self.fresh_temp();
                if let BinOp::Eq = op {
                    // `lhs`'s static type decides the compare strategy;
                    // the checker already requires `rhs` match whenever
                    // `lhs` is `Int`/`Bool` (String still goes through the
                    // runtime helper's byte compare, not a raw word
                    // compare, see `codegen::emit::emit_equals`).
                    let kind = match lhs.static_type.as_ref().map(|t| t.as_str()) {
                        Some("Int") | Some("Bool") => EqKind::Value,
                        _ => EqKind::Reference,
                    };
                    self.emit(b2, Instr::EqualityTest { dst, lhs: lv, rhs: rv, kind });
                } else {
                    let aop = match op {
                        BinOp::Add => ArithOp::Add,
                        BinOp::Sub => ArithOp::Sub,
                        BinOp::Mul => ArithOp::Mul,
                        BinOp::Div => ArithOp::Div,
                        BinOp::Lt => ArithOp::Lt,
                        BinOp::Le => ArithOp::Le,
                        BinOp::Eq => unreachable!(),
                    };
                    self.emit(b2, Instr::Arith { dst, op: aop, lhs: lv, rhs: rv });
                }
                (b2, Value::Temp(dst))
            }
            ExprKind::New(t) => {
                let dst = self.fresh_temp();
                self.emit(block, Instr::New { dst, class: type_name_text(t) });
                (block, Value::Temp(dst))
            }
            ExprKind::Dispatch { receiver, static_class, method, args } => {
                let (b1, recv) = self.lower_expr(receiver, block, formals);
                let mut cur = b1;
                let mut arg_vals = Vec::new();
                for a in args {
                    let (b2, v) = self.lower_expr(a, cur, formals);
                    cur = b2;
                    arg_vals.push(v);
                }

                // Resolve slot/target now, while the class table is in
                // hand, codegen just stamps these out, it never has to
                // ask "what's the static type of this receiver" itself.
                let receiver_static = receiver.static_type.as_ref().expect("typed receiver");
                let (slot, target_label) = if let Some(sc) = static_class {
                    let sc_id = self.classes.id_of(sc).expect("static dispatch target class exists");
                    let m = self.classes.lookup_method(sc_id, method).expect("static dispatch method exists");
                    let owner_name = self.classes.class(m.owner).name.clone();
                    (layout::method_slot(self.classes, sc_id, method), Some(layout::method_label(&owner_name, method)))
                } else {
                    let self_id = self.classes.id_of(&self.class_name).unwrap();
                    let resolved = self.classes.resolve_self(self_id, receiver_static);
                    let recv_id = self.classes.id_of(resolved.as_str()).expect("receiver static type exists");
                    (layout::method_slot(self.classes, recv_id, method), None)
                };

                let dst = self.fresh_temp();
                self.emit(
                    cur,
                    Instr::Dispatch { dst, receiver: recv, method: method.clone(), args: arg_vals, slot, target_label },
                );
                (cur, Value::Temp(dst))
            }
            ExprKind::Block(exprs) => {
                let mut cur = block;
                let mut last = Value::Void;
                for (i, e) in exprs.iter().enumerate() {
                    let (b, v) = self.lower_expr(e, cur, formals);
                    cur = b;
                    if i + 1 < exprs.len() {
                        self.emit(cur, Instr::Eval(v));
                    } else {
                        last = v;
                    }
                }
                (cur, last)
            }
            ExprKind::Let { binding, body } => {
                let (b1, v) = match &binding.init {
                    Some(e) => self.lower_expr(e, block, formals),
                    None => (block, self.default_value(&binding.type_name)),
                };
                self.push_scope();
                let slot = self.bind_local(&binding.name);
                self.emit(b1, Instr::StoreLocal { slot, src: v });
                let (b2, result) = self.lower_expr(body, b1, formals);
                self.pop_scope();
                (b2, result)
            }
            ExprKind::Conditional { predicate, then_branch, else_branch } => {
                let (b1, cond) = self.lower_expr(predicate, block, formals);
                let then_id = self.start_block();
                let else_id = self.start_block();
                let join_id = self.start_block();
                self.terminate(b1, Terminator::Branch { cond, then_block: then_id, else_block: else_id });

                let result = self.fresh_temp();
                let (then_end, then_val) = self.lower_expr(then_branch, then_id, formals);
                self.emit(then_end, Instr::Move { dst: result, src: then_val });
                self.terminate(then_end, Terminator::Jump(join_id));

                let (else_end, else_val) = self.lower_expr(else_branch, else_id, formals);
                self.emit(else_end, Instr::Move { dst: result, src: else_val });
                self.terminate(else_end, Terminator::Jump(join_id));

                (join_id, Value::Temp(result))
            }
            ExprKind::While { predicate, body } => {
                let head_id = self.start_block();
                let body_id = self.start_block();
                let exit_id = self.start_block();
                self.terminate(block, Terminator::Jump(head_id));

                let (pred_end, cond) = self.lower_expr(predicate, head_id, formals);
                self.terminate(pred_end, Terminator::Branch { cond, then_block: body_id, else_block: exit_id });

                let (body_end, body_val) = self.lower_expr(body, body_id, formals);
                self.emit(body_end, Instr::Eval(body_val));
                self.terminate(body_end, Terminator::Jump(head_id));

                (exit_id, Value::Void)
            }
            ExprKind::Case { scrutinee, branches } => {
                let (b1, scrut) = self.lower_expr(scrutinee, block, formals);
                let result = self.fresh_temp();
                let join_id = self.start_block();
                let mut arms = Vec::new();
                for b in branches {
                    let bid = self.start_block();
                    self.push_scope();
                    let slot = self.bind_local(&b.name);
                    self.emit(bid, Instr::StoreLocal { slot, src: scrut.clone() });
                    let (bend, bval) = self.lower_expr(&b.body, bid, formals);
                    self.emit(bend, Instr::Move { dst: result, src: bval });
                    self.terminate(bend, Terminator::Jump(join_id));
                    self.pop_scope();
                    let depth = self.classes.id_of(b.type_name.as_str()).map(|id| depth_of(self.classes, id)).unwrap_or(0);
                    arms.push((depth, b.type_name.as_str().to_string(), bid));
                }
                // Most specific (deepest) branch first: codegen walks this
                // list in order and takes the first ancestor match, so ties
                // between a branch and its own ancestor are decided here,
                // not at codegen time.
                arms.sort_by(|a, b| b.0.cmp(&a.0));
                let arms = arms.into_iter().map(|(_, name, bid)| (name, bid)).collect();
                self.terminate(b1, Terminator::CaseDispatch { scrutinee: scrut, arms });
                (join_id, Value::Temp(result))
            }
            ExprKind::ErrorExpr => (block, Value::Void),
        }
    }

    fn read(&mut self, name: &str, formals: &[String]) -> Value {
        match self.resolve(name, formals) {
            Slot::Local(idx) => Value::LocalSlot(idx),
            Slot::Formal(n) => Value::Formal(n),
            Slot::Attr(n) => Value::Attr(n),
        }
    }

    /// Default payload for a `let` binding with no initialiser: `0` for
    /// `Int`, `false` for `Bool`, the empty string for `String`, void for
    /// every other type (matching the attribute prototype defaults).
    fn default_value(&mut self, t: &TypeName) -> Value {
        match t.as_str() {
            "Int" => Value::ConstInt(0),
            "Bool" => Value::ConstBool(false),
            "String" => Value::ConstStr(self.intern_str("")),
            _ => Value::Void,
        }
    }
}
