//! Semantic analysis: class hierarchy, feature tables, and expression
//! typing.
//!
//! Runs the five passes from the design: class collection, hierarchy
//! validation, feature tables, expression typing, and annotation. The
//! first four build up a `ClassTable`; the fifth walks every method body
//! and attribute initialiser, writing the inferred type onto each `Expr`
//! node in place.

use crate::ast::*;
use crate::diagnostics::Span;
use std::collections::{HashMap, HashSet};
use std::fmt;

pub const OBJECT: &str = "Object";
pub const IO: &str = "IO";
pub const INT: &str = "Int";
pub const BOOL: &str = "Bool";
pub const STRING: &str = "String";

/// Class tags are small dense integers; the reserved built-in assignments
/// match the external MIPS object-layout contract exactly.
pub const TAG_OBJECT: u32 = 0;
pub const TAG_IO: u32 = 1;
pub const TAG_INT: u32 = 2;
pub const TAG_BOOL: u32 = 3;
pub const TAG_STRING: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum SemError {
    DuplicateClass { name: String, span: Span },
    MissingParent { class: String, parent: String, span: Span },
    InheritFromBuiltin { class: String, parent: String, span: Span },
    InheritanceCycle { class: String, span: Span },
    MissingMainMain,
    DuplicateAttribute { class: String, attr: String, span: Span },
    BadMethodOverride { class: String, method: String, span: Span, reason: String },
    UnboundIdentifier { name: String, span: Span },
    UnknownType { name: String, span: Span },
    UnknownMethod { class: String, method: String, span: Span },
    ArgCountMismatch { method: String, expected: usize, found: usize, span: Span },
    TypeMismatch { span: Span, message: String },
    DuplicateCaseBranchType { ty: String, span: Span },
    SelfAssignment { span: Span },
    DuplicateFormal { method: String, name: String, span: Span },
    SelfFormalOrAttr { span: Span, what: &'static str },
}

impl SemError {
    pub fn span(&self) -> Span {
        match self {
            SemError::DuplicateClass { span, .. }
            | SemError::MissingParent { span, .. }
            | SemError::InheritFromBuiltin { span, .. }
            | SemError::InheritanceCycle { span, .. }
            | SemError::DuplicateAttribute { span, .. }
            | SemError::BadMethodOverride { span, .. }
            | SemError::UnboundIdentifier { span, .. }
            | SemError::UnknownType { span, .. }
            | SemError::UnknownMethod { span, .. }
            | SemError::ArgCountMismatch { span, .. }
            | SemError::TypeMismatch { span, .. }
            | SemError::DuplicateCaseBranchType { span, .. }
            | SemError::SelfAssignment { span }
            | SemError::DuplicateFormal { span, .. }
            | SemError::SelfFormalOrAttr { span, .. } => *span,
            SemError::MissingMainMain => Span::new(1, 1),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SemError::DuplicateClass { .. } => "E0300",
            SemError::MissingParent { .. } => "E0301",
            SemError::InheritFromBuiltin { .. } => "E0302",
            SemError::InheritanceCycle { .. } => "E0303",
            SemError::MissingMainMain => "E0304",
            SemError::DuplicateAttribute { .. } => "E0305",
            SemError::BadMethodOverride { .. } => "E0306",
            SemError::UnboundIdentifier { .. } => "E0307",
            SemError::UnknownType { .. } => "E0308",
            SemError::UnknownMethod { .. } => "E0309",
            SemError::ArgCountMismatch { .. } => "E0310",
            SemError::TypeMismatch { .. } => "E0311",
            SemError::DuplicateCaseBranchType { .. } => "E0312",
            SemError::SelfAssignment { .. } => "E0313",
            SemError::DuplicateFormal { .. } => "E0314",
            SemError::SelfFormalOrAttr { .. } => "E0315",
        }
    }
}

impl fmt::Display for SemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemError::DuplicateClass { name, .. } => write!(f, "class {name} redefined"),
            SemError::MissingParent { class, parent, .. } => {
                write!(f, "class {class} inherits from undefined class {parent}")
            }
            SemError::InheritFromBuiltin { class, parent, .. } => {
                write!(f, "class {class} cannot inherit from {parent}")
            }
            SemError::InheritanceCycle { class, .. } => {
                write!(f, "inheritance cycle detected at class {class}")
            }
            SemError::MissingMainMain => {
                write!(f, "class Main must exist and define main(): Object")
            }
            SemError::DuplicateAttribute { class, attr, .. } => {
                write!(f, "attribute {attr} redefined in class {class}")
            }
            SemError::BadMethodOverride { class, method, reason, .. } => {
                write!(f, "method {method} in class {class} overrides incompatibly: {reason}")
            }
            SemError::UnboundIdentifier { name, .. } => write!(f, "undeclared identifier {name}"),
            SemError::UnknownType { name, .. } => write!(f, "undefined type {name}"),
            SemError::UnknownMethod { class, method, .. } => {
                write!(f, "no method {method} found in class {class}")
            }
            SemError::ArgCountMismatch { method, expected, found, .. } => write!(
                f,
                "method {method} called with {found} arguments, expected {expected}"
            ),
            SemError::TypeMismatch { message, .. } => write!(f, "{message}"),
            SemError::DuplicateCaseBranchType { ty, .. } => {
                write!(f, "duplicate branch type {ty} in case expression")
            }
            SemError::SelfAssignment { .. } => write!(f, "cannot assign to 'self'"),
            SemError::DuplicateFormal { method, name, .. } => {
                write!(f, "formal parameter {name} repeated in method {method}")
            }
            SemError::SelfFormalOrAttr { what, .. } => {
                write!(f, "'self' cannot be used as a {what} name")
            }
        }
    }
}

impl std::error::Error for SemError {}

pub type ClassId = usize;

#[derive(Debug, Clone)]
pub struct AttrInfo {
    pub name: String,
    pub type_name: TypeName,
    pub owner: ClassId,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub formals: Vec<TypeName>,
    pub return_type: TypeName,
    pub owner: ClassId,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub parent: Option<ClassId>,
    pub span: Span,
    pub tag: u32,
    /// Own attributes only, declaration order.
    pub own_attributes: Vec<Attribute>,
    /// Own methods only, declaration order.
    pub own_methods: Vec<Method>,
    /// Attributes in declaration order, root ancestor first, own last.
    pub all_attributes: Vec<AttrInfo>,
    /// Flattened method table: inherited methods first (root to parent),
    /// own methods last, with overrides *replacing* the inherited slot in
    /// place so dispatch-table monotonicity holds.
    pub method_table: Vec<MethodInfo>,
}

#[derive(Debug, Clone)]
pub struct ClassTable {
    pub classes: Vec<ClassInfo>,
    pub by_name: HashMap<String, ClassId>,
}

impl ClassTable {
    pub fn id_of(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn class(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id]
    }

    /// `a` is a (non-strict) subtype of `b` in the nominal class tree.
    pub fn is_subclass(&self, a: ClassId, b: ClassId) -> bool {
        let mut cur = Some(a);
        while let Some(c) = cur {
            if c == b {
                return true;
            }
            cur = self.classes[c].parent;
        }
        false
    }

    fn ancestors(&self, id: ClassId) -> Vec<ClassId> {
        let mut v = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            v.push(c);
            cur = self.classes[c].parent;
        }
        v
    }

    /// Least upper bound of two classes (nominal tree, nearest common
    /// ancestor). Always terminates at `Object`.
    pub fn lub_class(&self, a: ClassId, b: ClassId) -> ClassId {
        let ancestors_b: HashSet<ClassId> = self.ancestors(b).into_iter().collect();
        for anc in self.ancestors(a) {
            if ancestors_b.contains(&anc) {
                return anc;
            }
        }
        self.id_of(OBJECT).unwrap()
    }

    /// Least-upper-bound in the context of class `ctx`: resolves `SELF_TYPE`
    /// to `ctx` on both sides before walking up the hierarchy.
    pub fn lub(&self, ctx: ClassId, a: &TypeName, b: &TypeName) -> TypeName {
        let ra = self.resolve_self(ctx, a);
        let rb = self.resolve_self(ctx, b);
        if ra == rb && matches!(a, TypeName::SelfType) && matches!(b, TypeName::SelfType) {
            return TypeName::SelfType;
        }
        let ida = self.id_of(ra.as_str()).unwrap_or_else(|| self.id_of(OBJECT).unwrap());
        let idb = self.id_of(rb.as_str()).unwrap_or_else(|| self.id_of(OBJECT).unwrap());
        TypeName::Class(self.classes[self.lub_class(ida, idb)].name.clone())
    }

    /// Resolves `SELF_TYPE` to the enclosing class name `ctx`; leaves
    /// concrete class names untouched.
    pub fn resolve_self(&self, ctx: ClassId, t: &TypeName) -> TypeName {
        match t {
            TypeName::SelfType => TypeName::Class(self.classes[ctx].name.clone()),
            TypeName::Class(n) => TypeName::Class(n.clone()),
        }
    }

    /// Subtyping `lhs <= rhs` evaluated in class context `ctx` (used to
    /// resolve `SELF_TYPE_ctx`).
    pub fn conforms(&self, ctx: ClassId, lhs: &TypeName, rhs: &TypeName) -> bool {
        match (lhs, rhs) {
            (TypeName::SelfType, TypeName::SelfType) => true,
            (_, TypeName::SelfType) => false,
            (TypeName::SelfType, TypeName::Class(_)) => {
                let self_class = TypeName::Class(self.classes[ctx].name.clone());
                self.conforms(ctx, &self_class, rhs)
            }
            (TypeName::Class(a), TypeName::Class(b)) => {
                let (Some(ida), Some(idb)) = (self.id_of(a), self.id_of(b)) else {
                    return false;
                };
                self.is_subclass(ida, idb)
            }
        }
    }

    /// Looks up a method by name starting at `start`, walking up to
    /// `Object`. Returns the owning class and method signature.
    pub fn lookup_method(&self, start: ClassId, name: &str) -> Option<&MethodInfo> {
        self.classes[start].method_table.iter().find(|m| m.name == name)
    }

    pub fn lookup_attr(&self, start: ClassId, name: &str) -> Option<&AttrInfo> {
        self.classes[start].all_attributes.iter().find(|a| a.name == name)
    }
}

/// Result of semantic analysis: the (mutated, annotated) program plus the
/// resolved class table, used directly by IR lowering and codegen.
pub struct TypedProgram {
    pub program: Program,
    pub classes: ClassTable,
}

pub fn check(mut program: Program) -> Result<TypedProgram, Vec<SemError>> {
    let mut errors = Vec::new();

    let (mut classes, parent_names) = collect_classes(&program, &mut errors);
    validate_hierarchy(&mut classes, &parent_names, &mut errors);
    build_feature_tables(&mut classes, &program, &mut errors);

    if classes.id_of("Main").is_none() {
        errors.push(SemError::MissingMainMain);
    } else {
        let main_id = classes.id_of("Main").unwrap();
        match classes.lookup_method(main_id, "main") {
            Some(m) if m.formals.is_empty() => {}
            _ => errors.push(SemError::MissingMainMain),
        }
    }

    for class in program.classes.iter_mut() {
        let Some(cid) = classes.id_of(&class.name) else {
            continue;
        };
        for feature in class.features.iter_mut() {
            match feature {
                Feature::Attribute(attr) => {
                    if let Some(init) = attr.init.as_mut() {
                        let mut env = Env::new();
                        env.push_scope();
                        bind_self_and_attrs(&mut env, &classes, cid);
                        let t = type_expr(init, &classes, &mut env, cid, &mut errors);
                        if !classes.conforms(cid, &t, &attr.type_name) {
                            errors.push(SemError::TypeMismatch {
                                span: init.span,
                                message: format!(
                                    "attribute {} declared {} but initialiser has type {}",
                                    attr.name, attr.type_name, t
                                ),
                            });
                        }
                    }
                }
                Feature::Method(method) => {
                    let mut env = Env::new();
                    env.push_scope();
                    bind_self_and_attrs(&mut env, &classes, cid);
                    env.push_scope();
                    for formal in &method.formals {
                        env.bind(formal.name.clone(), formal.type_name.clone());
                    }
                    let t = type_expr(&mut method.body, &classes, &mut env, cid, &mut errors);
                    if !classes.conforms(cid, &t, &method.return_type) {
                        errors.push(SemError::TypeMismatch {
                            span: method.body.span,
                            message: format!(
                                "method {} declared to return {} but body has type {}",
                                method.name, method.return_type, t
                            ),
                        });
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(TypedProgram { program, classes })
    } else {
        Err(errors)
    }
}

fn bind_self_and_attrs(env: &mut Env, classes: &ClassTable, cid: ClassId) {
    env.bind("self".to_string(), TypeName::SelfType);
    for attr in &classes.classes[cid].all_attributes {
        env.bind(attr.name.clone(), attr.type_name.clone());
    }
}

// ---- pass 1: class collection ---------------------------------------------

/// Returns the class table (built-ins wired, user classes present but with
/// `parent` left unresolved) plus, for each user class id, its declared
/// parent name (`None` means "defaults to Object").
fn collect_classes(
    program: &Program,
    errors: &mut Vec<SemError>,
) -> (ClassTable, HashMap<ClassId, Option<String>>) {
    let mut classes = Vec::new();
    let mut by_name = HashMap::new();
    let mut parent_names = HashMap::new();

    let mut add_builtin = |classes: &mut Vec<ClassInfo>,
                            by_name: &mut HashMap<String, ClassId>,
                            name: &str,
                            parent: Option<ClassId>,
                            tag: u32| {
        let id = classes.len();
        classes.push(ClassInfo {
            name: name.to_string(),
            parent,
            span: Span::new(0, 0),
            tag,
            own_attributes: Vec::new(),
            own_methods: Vec::new(),
            all_attributes: Vec::new(),
            method_table: Vec::new(),
        });
        by_name.insert(name.to_string(), id);
        id
    };

    let object_id = add_builtin(&mut classes, &mut by_name, OBJECT, None, TAG_OBJECT);
    add_builtin(&mut classes, &mut by_name, IO, Some(object_id), TAG_IO);
    add_builtin(&mut classes, &mut by_name, INT, Some(object_id), TAG_INT);
    add_builtin(&mut classes, &mut by_name, BOOL, Some(object_id), TAG_BOOL);
    add_builtin(&mut classes, &mut by_name, STRING, Some(object_id), TAG_STRING);

    let mut next_tag = 5u32;
    for class in &program.classes {
        if by_name.contains_key(&class.name) {
            errors.push(SemError::DuplicateClass {
                name: class.name.clone(),
                span: class.span,
            });
            continue;
        }
        let id = classes.len();
        classes.push(ClassInfo {
            name: class.name.clone(),
            parent: None, // resolved in validate_hierarchy
            span: class.span,
            tag: next_tag,
            own_attributes: Vec::new(),
            own_methods: Vec::new(),
            all_attributes: Vec::new(),
            method_table: Vec::new(),
        });
        by_name.insert(class.name.clone(), id);
        parent_names.insert(id, class.parent.clone());
        next_tag += 1;
    }

    (ClassTable { classes, by_name }, parent_names)
}

/// Resolves parent-name strings into `ClassId`s (defaulting to `Object`),
/// forbids inheriting from the three primitive built-ins, and detects
/// cycles with a DFS colouring (white/grey/black).
fn validate_hierarchy(
    classes: &mut ClassTable,
    parent_names: &HashMap<ClassId, Option<String>>,
    errors: &mut Vec<SemError>,
) {
    let object_id = classes.id_of(OBJECT).unwrap();
    let banned = [INT, STRING, BOOL];

    // Iterate by ascending class id (== declaration order) rather than
    // HashMap order, so diagnostics come out in source order.
    let mut user_ids: Vec<ClassId> = parent_names.keys().copied().collect();
    user_ids.sort_unstable();
    for id in user_ids {
        let parent_name = &parent_names[&id];
        let class_name = classes.classes[id].name.clone();
        let span = classes.classes[id].span;
        match parent_name {
            None => classes.classes[id].parent = Some(object_id),
            Some(pname) => {
                if banned.contains(&pname.as_str()) {
                    errors.push(SemError::InheritFromBuiltin {
                        class: class_name,
                        parent: pname.clone(),
                        span,
                    });
                    classes.classes[id].parent = Some(object_id);
                    continue;
                }
                match classes.id_of(pname) {
                    Some(pid) => classes.classes[id].parent = Some(pid),
                    None => {
                        errors.push(SemError::MissingParent {
                            class: class_name,
                            parent: pname.clone(),
                            span,
                        });
                        classes.classes[id].parent = Some(object_id);
                    }
                }
            }
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Colour {
        White,
        Grey,
        Black,
    }
    let n = classes.classes.len();
    let mut colour = vec![Colour::White; n];

    fn visit(
        id: ClassId,
        classes: &ClassTable,
        colour: &mut Vec<Colour>,
        errors: &mut Vec<SemError>,
    ) {
        if colour[id] == Colour::Black {
            return;
        }
        if colour[id] == Colour::Grey {
            errors.push(SemError::InheritanceCycle {
                class: classes.classes[id].name.clone(),
                span: classes.classes[id].span,
            });
            return;
        }
        colour[id] = Colour::Grey;
        if let Some(parent) = classes.classes[id].parent {
            if parent != id {
                visit(parent, classes, colour, errors);
            }
        }
        colour[id] = Colour::Black;
    }

    for id in 0..n {
        visit(id, classes, &mut colour, errors);
    }
}

// ---- pass 3: feature tables -----------------------------------------------

fn builtin_method(name: &str, formals: &[(&str, &str)], ret: &str, owner: ClassId) -> MethodInfo {
    MethodInfo {
        name: name.to_string(),
        formals: formals.iter().map(|(_, t)| type_name_of(t)).collect(),
        return_type: type_name_of(ret),
        owner,
    }
}

fn type_name_of(s: &str) -> TypeName {
    if s == "SELF_TYPE" {
        TypeName::SelfType
    } else {
        TypeName::Class(s.to_string())
    }
}

/// Processing order in which every class appears after its parent, even in
/// the presence of a reported cycle (cyclic nodes are simply cut off once
/// revisited so the pass still terminates).
fn topo_order(classes: &ClassTable) -> Vec<ClassId> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Visiting,
        Done,
    }
    let n = classes.classes.len();
    let mut mark = vec![Mark::Unvisited; n];
    let mut order = Vec::with_capacity(n);

    fn visit(id: ClassId, classes: &ClassTable, mark: &mut Vec<Mark>, order: &mut Vec<ClassId>) {
        match mark[id] {
            Mark::Done | Mark::Visiting => return,
            Mark::Unvisited => {}
        }
        mark[id] = Mark::Visiting;
        if let Some(parent) = classes.classes[id].parent {
            if parent != id {
                visit(parent, classes, mark, order);
            }
        }
        mark[id] = Mark::Done;
        order.push(id);
    }

    for id in 0..n {
        visit(id, classes, &mut mark, &mut order);
    }
    order
}

fn build_feature_tables(classes: &mut ClassTable, program: &Program, errors: &mut Vec<SemError>) {
    let object_id = classes.id_of(OBJECT).unwrap();
    let io_id = classes.id_of(IO).unwrap();
    let string_id = classes.id_of(STRING).unwrap();

    // Seed built-in signatures. These never go through the AST so they are
    // wired directly as MethodInfo.
    classes.classes[object_id].method_table = vec![
        builtin_method("abort", &[], OBJECT, object_id),
        builtin_method("type_name", &[], STRING, object_id),
        builtin_method("copy", &[], "SELF_TYPE", object_id),
    ];
    classes.classes[io_id].method_table = {
        let mut m = classes.classes[object_id].method_table.clone();
        m.push(builtin_method("out_string", &[("x", "String")], "SELF_TYPE", io_id));
        m.push(builtin_method("out_int", &[("x", "Int")], "SELF_TYPE", io_id));
        m.push(builtin_method("in_string", &[], STRING, io_id));
        m.push(builtin_method("in_int", &[], INT, io_id));
        m
    };
    classes.classes[string_id].method_table = {
        let mut m = classes.classes[object_id].method_table.clone();
        m.push(builtin_method("length", &[], INT, string_id));
        m.push(builtin_method("concat", &[("s", "String")], STRING, string_id));
        m.push(builtin_method(
            "substr",
            &[("i", "Int"), ("l", "Int")],
            STRING,
            string_id,
        ));
        m
    };
    let int_id = classes.id_of(INT).unwrap();
    let bool_id = classes.id_of(BOOL).unwrap();
    classes.classes[int_id].method_table = classes.classes[object_id].method_table.clone();
    classes.classes[bool_id].method_table = classes.classes[object_id].method_table.clone();

    // Index user classes' AST nodes by name for quick feature lookup.
    let ast_by_name: HashMap<&str, &Class> =
        program.classes.iter().map(|c| (c.name.as_str(), c)).collect();

    for id in topo_order(classes) {
        if id <= string_id {
            // Built-ins: method tables seeded above, no attributes.
            continue;
        }
        let name = classes.classes[id].name.clone();
        let Some(ast_class) = ast_by_name.get(name.as_str()) else {
            continue;
        };
        let parent = classes.classes[id].parent.unwrap();

        let mut all_attributes = classes.classes[parent].all_attributes.clone();
        let mut method_table = classes.classes[parent].method_table.clone();
        let mut own_attributes = Vec::new();
        let mut own_methods = Vec::new();

        for feature in &ast_class.features {
            match feature {
                Feature::Attribute(attr) => {
                    if attr.name == "self" {
                        errors.push(SemError::SelfFormalOrAttr {
                            span: attr.span,
                            what: "attribute",
                        });
                        continue;
                    }
                    if all_attributes.iter().any(|a| a.name == attr.name) {
                        errors.push(SemError::DuplicateAttribute {
                            class: name.clone(),
                            attr: attr.name.clone(),
                            span: attr.span,
                        });
                        continue;
                    }
                    all_attributes.push(AttrInfo {
                        name: attr.name.clone(),
                        type_name: attr.type_name.clone(),
                        owner: id,
                    });
                    own_attributes.push(attr.clone());
                }
                Feature::Method(method) => {
                    let mut seen_formals = HashSet::new();
                    for formal in &method.formals {
                        if formal.name == "self" {
                            errors.push(SemError::SelfFormalOrAttr {
                                span: formal.span,
                                what: "formal parameter",
                            });
                        }
                        if !seen_formals.insert(formal.name.clone()) {
                            errors.push(SemError::DuplicateFormal {
                                method: method.name.clone(),
                                name: formal.name.clone(),
                                span: formal.span,
                            });
                        }
                    }
                    let new_info = MethodInfo {
                        name: method.name.clone(),
                        formals: method.formals.iter().map(|f| f.type_name.clone()).collect(),
                        return_type: method.return_type.clone(),
                        owner: id,
                    };
                    if let Some(slot) = method_table.iter_mut().find(|m| m.name == method.name) {
                        if slot.formals.len() != new_info.formals.len()
                            || slot.formals != new_info.formals
                            || slot.return_type != new_info.return_type
                        {
                            errors.push(SemError::BadMethodOverride {
                                class: name.clone(),
                                method: method.name.clone(),
                                span: method.span,
                                reason: "formal types or return type differ from inherited signature"
                                    .to_string(),
                            });
                        }
                        *slot = new_info;
                    } else {
                        method_table.push(new_info);
                    }
                    own_methods.push(method.clone());
                }
            }
        }

        classes.classes[id].all_attributes = all_attributes;
        classes.classes[id].method_table = method_table;
        classes.classes[id].own_attributes = own_attributes;
        classes.classes[id].own_methods = own_methods;
    }
}

// ---- pass 4/5: expression typing and annotation ---------------------------

/// A stack of scopes mapping object identifiers to types. `let` and `case`
/// each push exactly one scope; blocks do not push a scope at all.
struct Env {
    scopes: Vec<HashMap<String, TypeName>>,
}

impl Env {
    fn new() -> Self {
        Env { scopes: Vec::new() }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: String, ty: TypeName) {
        self.scopes.last_mut().expect("scope must be pushed before binding").insert(name, ty);
    }

    fn lookup(&self, name: &str) -> Option<&TypeName> {
        for scope in self.scopes.iter().rev() {
            if let Some(t) = scope.get(name) {
                return Some(t);
            }
        }
        None
    }
}

fn object_ty() -> TypeName {
    TypeName::Class(OBJECT.to_string())
}

fn int_ty() -> TypeName {
    TypeName::Class(INT.to_string())
}

fn bool_ty() -> TypeName {
    TypeName::Class(BOOL.to_string())
}

fn string_ty() -> TypeName {
    TypeName::Class(STRING.to_string())
}

/// Types `expr` in class context `ctx` with environment `env`, writes the
/// result onto `expr.static_type`, and returns it. On error, records a
/// diagnostic and proceeds with `Object` so the rest of the tree still
/// gets a best-effort type (cascading reports stay useful).
fn type_expr(
    expr: &mut Expr,
    classes: &ClassTable,
    env: &mut Env,
    ctx: ClassId,
    errors: &mut Vec<SemError>,
) -> TypeName {
    let span = expr.span;
    let ty = match &mut expr.kind {
        // Range-checking an out-of-range literal is deferred to codegen
        // (spec: "still accepted lexically and flagged at codegen").
        ExprKind::IntLiteral(_) => int_ty(),
        ExprKind::StringLiteral(_) => string_ty(),
        ExprKind::BoolLiteral(_) => bool_ty(),
        ExprKind::ErrorExpr => object_ty(),
        ExprKind::Id(name) => {
            if name == "self" {
                TypeName::SelfType
            } else if let Some(t) = env.lookup(name) {
                t.clone()
            } else {
                errors.push(SemError::UnboundIdentifier {
                    name: name.clone(),
                    span,
                });
                object_ty()
            }
        }
        ExprKind::Assign { name, value } => {
            let vt = type_expr(value, classes, env, ctx, errors);
            if name == "self" {
                errors.push(SemError::SelfAssignment { span });
                object_ty()
            } else if let Some(declared) = env.lookup(name).cloned() {
                if !classes.conforms(ctx, &vt, &declared) {
                    errors.push(SemError::TypeMismatch {
                        span,
                        message: format!(
                            "cannot assign value of type {vt} to {name} declared {declared}"
                        ),
                    });
                }
                vt
            } else {
                errors.push(SemError::UnboundIdentifier {
                    name: name.clone(),
                    span,
                });
                object_ty()
            }
        }
        ExprKind::Dispatch {
            receiver,
            static_class,
            method,
            args,
        } => {
            let recv_ty = type_expr(receiver, classes, env, ctx, errors);
            let arg_tys: Vec<TypeName> = args
                .iter_mut()
                .map(|a| type_expr(a, classes, env, ctx, errors))
                .collect();

            let lookup_start: Option<ClassId> = if let Some(sc) = static_class {
                let resolved_recv = classes.resolve_self(ctx, &recv_ty);
                let sc_id = classes.id_of(sc);
                match (classes.id_of(resolved_recv.as_str()), sc_id) {
                    (Some(rid), Some(sid)) if classes.is_subclass(rid, sid) => Some(sid),
                    _ => {
                        errors.push(SemError::TypeMismatch {
                            span,
                            message: format!(
                                "static dispatch target {sc} is not an ancestor of {recv_ty}"
                            ),
                        });
                        None
                    }
                }
            } else {
                let resolved_recv = classes.resolve_self(ctx, &recv_ty);
                classes.id_of(resolved_recv.as_str())
            };

            let Some(start) = lookup_start else {
                return finish(expr, object_ty());
            };
            let Some(m) = classes.lookup_method(start, method) else {
                errors.push(SemError::UnknownMethod {
                    class: classes.classes[start].name.clone(),
                    method: method.clone(),
                    span,
                });
                return finish(expr, object_ty());
            };
            if m.formals.len() != arg_tys.len() {
                errors.push(SemError::ArgCountMismatch {
                    method: method.clone(),
                    expected: m.formals.len(),
                    found: arg_tys.len(),
                    span,
                });
            } else {
                for (i, (formal_ty, arg_ty)) in m.formals.iter().zip(arg_tys.iter()).enumerate() {
                    if !classes.conforms(ctx, arg_ty, formal_ty) {
                        errors.push(SemError::TypeMismatch {
                            span,
                            message: format!(
                                "argument {} to {} has type {} but {} expected",
                                i + 1,
                                method,
                                arg_ty,
                                formal_ty
                            ),
                        });
                    }
                }
            }
            if matches!(m.return_type, TypeName::SelfType) {
                recv_ty.clone()
            } else {
                m.return_type.clone()
            }
        }
        ExprKind::Conditional {
            predicate,
            then_branch,
            else_branch,
        } => {
            let pt = type_expr(predicate, classes, env, ctx, errors);
            require_bool(&pt, span, errors);
            let tt = type_expr(then_branch, classes, env, ctx, errors);
            let et = type_expr(else_branch, classes, env, ctx, errors);
            classes.lub(ctx, &tt, &et)
        }
        ExprKind::While { predicate, body } => {
            let pt = type_expr(predicate, classes, env, ctx, errors);
            require_bool(&pt, span, errors);
            type_expr(body, classes, env, ctx, errors);
            object_ty()
        }
        ExprKind::Block(exprs) => {
            let mut last = object_ty();
            for e in exprs.iter_mut() {
                last = type_expr(e, classes, env, ctx, errors);
            }
            last
        }
        ExprKind::Let { binding, body } => {
            let declared_ty = binding.type_name.clone();
            if let Some(init) = binding.init.as_mut() {
                let it = type_expr(init, classes, env, ctx, errors);
                if !classes.conforms(ctx, &it, &declared_ty) {
                    errors.push(SemError::TypeMismatch {
                        span: init.span,
                        message: format!(
                            "let binding {} declared {} but initialiser has type {}",
                            binding.name, declared_ty, it
                        ),
                    });
                }
            }
            env.push_scope();
            env.bind(binding.name.clone(), declared_ty);
            let bt = type_expr(body, classes, env, ctx, errors);
            env.pop_scope();
            bt
        }
        ExprKind::Case { scrutinee, branches } => {
            type_expr(scrutinee, classes, env, ctx, errors);
            let mut seen_types = HashSet::new();
            let mut result: Option<TypeName> = None;
            for branch in branches.iter_mut() {
                if branch.name == "self" {
                    errors.push(SemError::SelfFormalOrAttr {
                        span: branch.span,
                        what: "case branch",
                    });
                }
                if !seen_types.insert(branch.type_name.as_str().to_string()) {
                    errors.push(SemError::DuplicateCaseBranchType {
                        ty: branch.type_name.as_str().to_string(),
                        span: branch.span,
                    });
                }
                env.push_scope();
                env.bind(branch.name.clone(), branch.type_name.clone());
                let bt = type_expr(&mut branch.body, classes, env, ctx, errors);
                env.pop_scope();
                result = Some(match result {
                    None => bt,
                    Some(acc) => classes.lub(ctx, &acc, &bt),
                });
            }
            result.unwrap_or_else(object_ty)
        }
        ExprKind::New(t) => {
            if !matches!(t, TypeName::SelfType) && classes.id_of(t.as_str()).is_none() {
                errors.push(SemError::UnknownType {
                    name: t.as_str().to_string(),
                    span,
                });
                object_ty()
            } else if matches!(t, TypeName::SelfType) {
                TypeName::SelfType
            } else {
                t.clone()
            }
        }
        ExprKind::IsVoid(inner) => {
            type_expr(inner, classes, env, ctx, errors);
            bool_ty()
        }
        ExprKind::Not(inner) => {
            let it = type_expr(inner, classes, env, ctx, errors);
            require_bool(&it, span, errors);
            bool_ty()
        }
        ExprKind::Complement(inner) => {
            let it = type_expr(inner, classes, env, ctx, errors);
            require_int(&it, span, errors);
            int_ty()
        }
        ExprKind::Group(inner) => type_expr(inner, classes, env, ctx, errors),
        ExprKind::Binary { op, lhs, rhs } => {
            let lt = type_expr(lhs, classes, env, ctx, errors);
            let rt = type_expr(rhs, classes, env, ctx, errors);
            use BinOp::*;
            match op {
                Add | Sub | Mul | Div => {
                    require_int(&lt, span, errors);
                    require_int(&rt, span, errors);
                    int_ty()
                }
                Lt | Le => {
                    require_int(&lt, span, errors);
                    require_int(&rt, span, errors);
                    bool_ty()
                }
                Eq => {
                    let primitive = |t: &TypeName| {
                        matches!(t.as_str(), INT | STRING | BOOL)
                    };
                    if primitive(&lt) || primitive(&rt) {
                        if lt.as_str() != rt.as_str() {
                            errors.push(SemError::TypeMismatch {
                                span,
                                message: format!(
                                    "incomparable types in '=': {lt} and {rt}"
                                ),
                            });
                        }
                    }
                    bool_ty()
                }
            }
        }
    };
    expr.static_type = Some(ty.clone());
    ty
}

fn finish(expr: &mut Expr, ty: TypeName) -> TypeName {
    expr.static_type = Some(ty.clone());
    ty
}

fn require_bool(t: &TypeName, span: Span, errors: &mut Vec<SemError>) {
    if t.as_str() != BOOL {
        errors.push(SemError::TypeMismatch {
            span,
            message: format!("expected Bool, found {t}"),
        });
    }
}

fn require_int(t: &TypeName, span: Span, errors: &mut Vec<SemError>) {
    if t.as_str() != INT {
        errors.push(SemError::TypeMismatch {
            span,
            message: format!("expected Int, found {t}"),
        });
    }
}

#[cfg(test)]
mod table_tests {
    use super::*;

    #[test]
    fn builtin_tags_match_external_contract() {
        let (classes, _) = collect_classes(&Program { classes: vec![] }, &mut Vec::new());
        assert_eq!(classes.classes[classes.id_of(OBJECT).unwrap()].tag, TAG_OBJECT);
        assert_eq!(classes.classes[classes.id_of(IO).unwrap()].tag, TAG_IO);
        assert_eq!(classes.classes[classes.id_of(INT).unwrap()].tag, TAG_INT);
        assert_eq!(classes.classes[classes.id_of(BOOL).unwrap()].tag, TAG_BOOL);
        assert_eq!(classes.classes[classes.id_of(STRING).unwrap()].tag, TAG_STRING);
    }
}

#[cfg(test)]
mod check_tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn check_src(src: &str) -> Result<TypedProgram, Vec<SemError>> {
        let tokens = lex(src).tokens;
        let program = parse(tokens).expect("expected parse to succeed");
        check(program)
    }

    #[test]
    fn hello_world_type_checks() {
        let typed = check_src(
            r#"class Main inherits IO { main(): Object { out_string("Hello, World.\n") }; };"#,
        )
        .expect("expected type check to succeed");
        let main_id = typed.classes.id_of("Main").unwrap();
        assert!(typed.classes.lookup_method(main_id, "main").is_some());
    }

    #[test]
    fn missing_main_is_an_error() {
        let err = check_src("class Foo { x: Int; };").unwrap_err();
        assert!(err.iter().any(|e| matches!(e, SemError::MissingMainMain)));
    }

    #[test]
    fn main_with_a_formal_is_an_error() {
        let err = check_src("class Main { main(x: Int): Object { x }; };").unwrap_err();
        assert!(err.iter().any(|e| matches!(e, SemError::MissingMainMain)));
    }

    #[test]
    fn inheritance_cycle_is_exactly_one_error() {
        let err = check_src(
            "class Main { main(): Object { 0 }; }; class A inherits B { }; class B inherits A { };",
        )
        .unwrap_err();
        let cycle_errors: Vec<_> = err
            .iter()
            .filter(|e| matches!(e, SemError::InheritanceCycle { .. }))
            .collect();
        assert_eq!(cycle_errors.len(), 1);
    }

    #[test]
    fn incomparable_equality_is_a_type_error() {
        let err = check_src(r#"class Main { main(): Object { "a" = 1 }; };"#).unwrap_err();
        assert!(err.iter().any(|e| matches!(e, SemError::TypeMismatch { .. })));
    }

    #[test]
    fn arithmetic_expression_types_as_int() {
        let typed = check_src("class Main { main(): Int { 3 + 4 * 5 }; };").unwrap();
        let Feature::Method(m) = &typed.program.classes[0].features[0] else {
            panic!("expected method");
        };
        assert_eq!(m.body.static_type.as_ref().unwrap().as_str(), "Int");
    }

    #[test]
    fn cannot_inherit_from_primitive() {
        let err = check_src(
            "class Main { main(): Object { 0 }; }; class Foo inherits Int { };",
        )
        .unwrap_err();
        assert!(err
            .iter()
            .any(|e| matches!(e, SemError::InheritFromBuiltin { .. })));
    }

    #[test]
    fn method_override_must_match_signature() {
        let err = check_src(
            "class Main { main(): Object { 0 }; }; \
             class A { f(x: Int): Int { x }; }; \
             class B inherits A { f(x: Int): Bool { true }; };",
        )
        .unwrap_err();
        assert!(err
            .iter()
            .any(|e| matches!(e, SemError::BadMethodOverride { .. })));
    }

    #[test]
    fn case_picks_most_specific_branch_type_via_lub() {
        let typed = check_src(
            "class Main { \
               main(): Object { \
                 case new Object of \
                   x: Int => 1; \
                   y: String => 2; \
                 esac \
               }; \
             };",
        )
        .unwrap();
        let Feature::Method(m) = &typed.program.classes[0].features[0] else {
            panic!("expected method");
        };
        // both branches are Int literals -> lub is Int
        assert_eq!(m.body.static_type.as_ref().unwrap().as_str(), "Int");
    }

    #[test]
    fn self_type_dispatch_resolves_to_receiver_static_type() {
        let typed = check_src(
            "class Main { f(): SELF_TYPE { self }; main(): Object { f() }; };",
        )
        .unwrap();
        let Feature::Method(m) = &typed.program.classes[0].features[1] else {
            panic!("expected method");
        };
        assert_eq!(m.body.static_type.as_ref().unwrap().as_str(), "Main");
    }
}
