//! Recursive-descent parser for COOL.
//!
//! Hand-written rather than generated: one function per nonterminal,
//! precedence climbing for the expression grammar. Panic-mode error
//! recovery resynchronises at the next `;` (bounded by the enclosing
//! feature) or `}` (bounded by the enclosing class) so a single pass can
//! surface more than one diagnostic.

use crate::ast::*;
use crate::diagnostics::Span;
use crate::lexer::{Token, TokenKind};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub span: Span,
    pub message: String,
}

impl ParseError {
    fn new(span: Span, message: impl Into<String>) -> Self {
        ParseError {
            span,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        "E0200"
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}

type PResult<T> = Result<T, ParseError>;

pub fn parse(tokens: Vec<Token>) -> Result<Program, Vec<ParseError>> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        errors: Vec::new(),
    };
    let program = parser.parse_program();
    if parser.errors.is_empty() {
        Ok(program)
    } else {
        Err(parser.errors)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.at(&kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::new(
                self.peek_span(),
                format!("expected {kind:?}, found {}", self.peek()),
            ))
        }
    }

    fn expect_object_id(&mut self) -> PResult<(String, Span)> {
        let span = self.peek_span();
        match self.peek().clone() {
            TokenKind::ObjectId(name) => {
                self.advance();
                Ok((name, span))
            }
            other => Err(ParseError::new(
                span,
                format!("expected identifier, found {other}"),
            )),
        }
    }

    fn expect_type_id(&mut self) -> PResult<(TypeName, Span)> {
        let span = self.peek_span();
        match self.peek().clone() {
            TokenKind::TypeId(name) => {
                self.advance();
                Ok((type_name_from_str(&name), span))
            }
            other => Err(ParseError::new(
                span,
                format!("expected type identifier, found {other}"),
            )),
        }
    }

    // ---- recovery -------------------------------------------------------

    /// Skip tokens until (and including) the next `;` at the current
    /// nesting depth, or until `}`/Eof, whichever comes first. Used to
    /// resynchronise after a malformed feature or statement.
    fn recover_to_semi(&mut self) {
        let mut depth = 0i32;
        loop {
            match self.peek() {
                TokenKind::Eof => return,
                TokenKind::LBrace | TokenKind::LParen => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RBrace | TokenKind::RParen if depth > 0 => {
                    depth -= 1;
                    self.advance();
                }
                TokenKind::RBrace if depth == 0 => return,
                TokenKind::Semi if depth == 0 => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Skip to the closing `}` of the current class body (used when a
    /// feature is too malformed even for `recover_to_semi` to resync).
    fn recover_to_class_end(&mut self) {
        let mut depth = 0i32;
        loop {
            match self.peek() {
                TokenKind::Eof => return,
                TokenKind::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RBrace => {
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                    depth -= 1;
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ---- program / class / feature ---------------------------------------

    fn parse_program(&mut self) -> Program {
        let mut classes = Vec::new();
        while !self.is_eof() {
            match self.parse_class() {
                Ok(class) => classes.push(class),
                Err(e) => {
                    self.errors.push(e);
                    self.recover_to_class_end();
                    // consume trailing semicolon if present
                    self.eat(&TokenKind::Semi);
                }
            }
        }
        Program { classes }
    }

    fn parse_class(&mut self) -> PResult<Class> {
        let start = self.peek_span();
        self.expect(TokenKind::Class)?;
        let (name, _) = self.expect_type_id()?;
        let name = match name {
            TypeName::Class(n) => n,
            TypeName::SelfType => {
                return Err(ParseError::new(start, "class name cannot be SELF_TYPE"));
            }
        };
        let parent = if self.eat(&TokenKind::Inherits) {
            let (p, _) = self.expect_type_id()?;
            match p {
                TypeName::Class(n) => Some(n),
                TypeName::SelfType => {
                    return Err(ParseError::new(start, "cannot inherit from SELF_TYPE"));
                }
            }
        } else {
            None
        };
        self.expect(TokenKind::LBrace)?;
        let mut features = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.is_eof() {
            match self.parse_feature() {
                Ok(f) => features.push(f),
                Err(e) => {
                    self.errors.push(e);
                    self.recover_to_semi();
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        self.expect(TokenKind::Semi)?;
        Ok(Class {
            name,
            parent,
            features,
            span: start,
        })
    }

    fn parse_feature(&mut self) -> PResult<Feature> {
        let (name, span) = self.expect_object_id()?;
        if self.eat(&TokenKind::LParen) {
            // method
            let mut formals = Vec::new();
            if !self.at(&TokenKind::RParen) {
                loop {
                    let (fname, fspan) = self.expect_object_id()?;
                    self.expect(TokenKind::Colon)?;
                    let (ty, _) = self.expect_type_id()?;
                    formals.push(Formal {
                        name: fname,
                        type_name: ty,
                        span: fspan,
                    });
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen)?;
            self.expect(TokenKind::Colon)?;
            let (ret, _) = self.expect_type_id()?;
            self.expect(TokenKind::LBrace)?;
            let body = self.parse_expr()?;
            self.expect(TokenKind::RBrace)?;
            self.expect(TokenKind::Semi)?;
            Ok(Feature::Method(Method {
                name,
                formals,
                return_type: ret,
                body,
                span,
            }))
        } else {
            // attribute
            self.expect(TokenKind::Colon)?;
            let (ty, _) = self.expect_type_id()?;
            let init = if self.eat(&TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(TokenKind::Semi)?;
            Ok(Feature::Attribute(Attribute {
                name,
                type_name: ty,
                init,
                span,
            }))
        }
    }

    // ---- expressions, by precedence (lowest to highest) ------------------
    //   <-  (right)
    //   not (right prefix)
    //   < <= = (non-assoc)
    //   + - (left)
    //   * / (left)
    //   isvoid (prefix)
    //   ~ (prefix)
    //   @ . (left, postfix chain)
    //   atoms

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> PResult<Expr> {
        if let TokenKind::ObjectId(name) = self.peek().clone() {
            if self.tokens[self.pos + 1].kind == TokenKind::Assign {
                let span = self.peek_span();
                self.advance(); // id
                self.advance(); // <-
                let value = self.parse_assign()?; // right-associative
                return Ok(Expr::new(
                    ExprKind::Assign {
                        name,
                        value: Box::new(value),
                    },
                    span,
                ));
            }
        }
        self.parse_not()
    }

    fn parse_not(&mut self) -> PResult<Expr> {
        if self.at(&TokenKind::Not) {
            let span = self.peek_span();
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::new(ExprKind::Not(Box::new(inner)), span));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            TokenKind::Lt => Some(BinOp::Lt),
            TokenKind::Le => Some(BinOp::Le),
            TokenKind::Eq => Some(BinOp::Eq),
            _ => None,
        };
        let Some(op) = op else { return Ok(lhs) };
        let span = self.peek_span();
        self.advance();
        let rhs = self.parse_additive()?;
        // non-associative: reject a chained comparison like `a < b < c`
        if matches!(self.peek(), TokenKind::Lt | TokenKind::Le | TokenKind::Eq) {
            return Err(ParseError::new(
                self.peek_span(),
                "comparison operators do not associate; parenthesise",
            ));
        }
        Ok(Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        ))
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let span = self.peek_span();
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_isvoid()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            let span = self.peek_span();
            self.advance();
            let rhs = self.parse_isvoid()?;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_isvoid(&mut self) -> PResult<Expr> {
        if self.at(&TokenKind::IsVoid) {
            let span = self.peek_span();
            self.advance();
            let inner = self.parse_isvoid()?;
            return Ok(Expr::new(ExprKind::IsVoid(Box::new(inner)), span));
        }
        self.parse_complement()
    }

    fn parse_complement(&mut self) -> PResult<Expr> {
        if self.at(&TokenKind::Tilde) {
            let span = self.peek_span();
            self.advance();
            let inner = self.parse_complement()?;
            return Ok(Expr::new(ExprKind::Complement(Box::new(inner)), span));
        }
        self.parse_postfix()
    }

    /// `@`/`.` chaining, left-associative, applied to an atom.
    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                TokenKind::At => {
                    let span = self.peek_span();
                    self.advance();
                    let (ty, _) = self.expect_type_id()?;
                    let static_class = match ty {
                        TypeName::Class(n) => n,
                        TypeName::SelfType => {
                            return Err(ParseError::new(
                                span,
                                "static dispatch target cannot be SELF_TYPE",
                            ));
                        }
                    };
                    self.expect(TokenKind::Dot)?;
                    let (method, _) = self.expect_object_id()?;
                    let args = self.parse_arg_list()?;
                    expr = Expr::new(
                        ExprKind::Dispatch {
                            receiver: Box::new(expr),
                            static_class: Some(static_class),
                            method,
                            args,
                        },
                        span,
                    );
                }
                TokenKind::Dot => {
                    let span = self.peek_span();
                    self.advance();
                    let (method, _) = self.expect_object_id()?;
                    let args = self.parse_arg_list()?;
                    expr = Expr::new(
                        ExprKind::Dispatch {
                            receiver: Box::new(expr),
                            static_class: None,
                            method,
                            args,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_arg_list(&mut self) -> PResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_atom(&mut self) -> PResult<Expr> {
        let span = self.peek_span();
        match self.peek().clone() {
            TokenKind::IntLiteral(text) => {
                self.advance();
                Ok(Expr::new(ExprKind::IntLiteral(text), span))
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::StringLiteral(s), span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLiteral(true), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLiteral(false), span))
            }
            TokenKind::New => {
                self.advance();
                let (ty, _) = self.expect_type_id()?;
                Ok(Expr::new(ExprKind::New(ty), span))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::new(ExprKind::Group(Box::new(inner)), span))
            }
            TokenKind::LBrace => self.parse_block(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Let => self.parse_let(),
            TokenKind::Case => self.parse_case(),
            TokenKind::ObjectId(name) => {
                self.advance();
                if self.at(&TokenKind::LParen) {
                    // implicit dispatch: id(args) === self.id(args)
                    let args = self.parse_arg_list()?;
                    Ok(Expr::new(
                        ExprKind::Dispatch {
                            receiver: Box::new(Expr::new(ExprKind::Id("self".to_string()), span)),
                            static_class: None,
                            method: name,
                            args,
                        },
                        span,
                    ))
                } else {
                    Ok(Expr::new(ExprKind::Id(name), span))
                }
            }
            other => Err(ParseError::new(
                span,
                format!("unexpected token {other}"),
            )),
        }
    }

    fn parse_block(&mut self) -> PResult<Expr> {
        let span = self.peek_span();
        self.expect(TokenKind::LBrace)?;
        let mut exprs = Vec::new();
        loop {
            exprs.push(self.parse_expr()?);
            self.expect(TokenKind::Semi)?;
            if self.at(&TokenKind::RBrace) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        if exprs.is_empty() {
            return Err(ParseError::new(span, "block must contain at least one expression"));
        }
        Ok(Expr::new(ExprKind::Block(exprs), span))
    }

    fn parse_if(&mut self) -> PResult<Expr> {
        let span = self.peek_span();
        self.expect(TokenKind::If)?;
        let predicate = self.parse_expr()?;
        self.expect(TokenKind::Then)?;
        let then_branch = self.parse_expr()?;
        self.expect(TokenKind::Else)?;
        let else_branch = self.parse_expr()?;
        self.expect(TokenKind::Fi)?;
        Ok(Expr::new(
            ExprKind::Conditional {
                predicate: Box::new(predicate),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            span,
        ))
    }

    fn parse_while(&mut self) -> PResult<Expr> {
        let span = self.peek_span();
        self.expect(TokenKind::While)?;
        let predicate = self.parse_expr()?;
        self.expect(TokenKind::Loop)?;
        let body = self.parse_expr()?;
        self.expect(TokenKind::Pool)?;
        Ok(Expr::new(
            ExprKind::While {
                predicate: Box::new(predicate),
                body: Box::new(body),
            },
            span,
        ))
    }

    /// Parses `let b1, b2, ..., bn in body` and desugars the binding list
    /// into nested single-binding `Let` nodes (bn closest to `body`).
    fn parse_let(&mut self) -> PResult<Expr> {
        let span = self.peek_span();
        self.expect(TokenKind::Let)?;
        let mut bindings = Vec::new();
        loop {
            let bspan = self.peek_span();
            let (name, _) = self.expect_object_id()?;
            if name == "self" {
                return Err(ParseError::new(bspan, "'self' cannot be bound by let"));
            }
            self.expect(TokenKind::Colon)?;
            let (ty, _) = self.expect_type_id()?;
            let init = if self.eat(&TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            bindings.push(LetBinding {
                name,
                type_name: ty,
                init,
                span: bspan,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::In)?;
        let body = self.parse_expr()?;
        let mut result = body;
        for binding in bindings.into_iter().rev() {
            result = Expr::new(
                ExprKind::Let {
                    binding: Box::new(binding),
                    body: Box::new(result),
                },
                span,
            );
        }
        Ok(result)
    }

    fn parse_case(&mut self) -> PResult<Expr> {
        let span = self.peek_span();
        self.expect(TokenKind::Case)?;
        let scrutinee = self.parse_expr()?;
        self.expect(TokenKind::Of)?;
        let mut branches = Vec::new();
        loop {
            let bspan = self.peek_span();
            let (name, _) = self.expect_object_id()?;
            self.expect(TokenKind::Colon)?;
            let (ty, _) = self.expect_type_id()?;
            self.expect(TokenKind::DArrow)?;
            let body = self.parse_expr()?;
            self.expect(TokenKind::Semi)?;
            branches.push(CaseBranch {
                name,
                type_name: ty,
                body,
                span: bspan,
            });
            if self.at(&TokenKind::Esac) {
                break;
            }
        }
        self.expect(TokenKind::Esac)?;
        if branches.is_empty() {
            return Err(ParseError::new(span, "case must have at least one branch"));
        }
        Ok(Expr::new(
            ExprKind::Case {
                scrutinee: Box::new(scrutinee),
                branches,
            },
            span,
        ))
    }
}

fn type_name_from_str(name: &str) -> TypeName {
    if name == "SELF_TYPE" {
        TypeName::SelfType
    } else {
        TypeName::Class(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_ok(src: &str) -> Program {
        let tokens = lex(src).tokens;
        parse(tokens).expect("expected successful parse")
    }

    #[test]
    fn hello_world() {
        let prog = parse_ok(
            r#"class Main inherits IO { main(): Object { out_string("Hello, World.\n") }; };"#,
        );
        assert_eq!(prog.classes.len(), 1);
        assert_eq!(prog.classes[0].name, "Main");
        assert_eq!(prog.classes[0].parent.as_deref(), Some("IO"));
    }

    #[test]
    fn arithmetic_precedence() {
        let prog = parse_ok("class Main { main(): Int { 3 + 4 * 5 }; };");
        let Feature::Method(m) = &prog.classes[0].features[0] else {
            panic!("expected method");
        };
        // 3 + (4 * 5): top node must be Add
        match &m.body.kind {
            ExprKind::Binary { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(rhs.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("expected Add at top, got {other:?}"),
        }
    }

    #[test]
    fn chained_comparison_is_a_syntax_error() {
        let tokens = lex("class Main { main(): Bool { 1 < 2 < 3 }; };").tokens;
        assert!(parse(tokens).is_err());
    }

    #[test]
    fn multi_binding_let_desugars_to_nested_lets() {
        let prog = parse_ok("class Main { main(): Int { let x: Int <- 5, y: Int <- x + 1 in y }; };");
        let Feature::Method(m) = &prog.classes[0].features[0] else {
            panic!("expected method");
        };
        match &m.body.kind {
            ExprKind::Let { binding, body } => {
                assert_eq!(binding.name, "x");
                assert!(matches!(body.kind, ExprKind::Let { .. }));
            }
            other => panic!("expected outer let, got {other:?}"),
        }
    }

    #[test]
    fn static_dispatch_parses() {
        let prog = parse_ok("class Main { main(): Object { self@Object.abort() }; };");
        let Feature::Method(m) = &prog.classes[0].features[0] else {
            panic!("expected method");
        };
        match &m.body.kind {
            ExprKind::Dispatch { static_class, method, .. } => {
                assert_eq!(static_class.as_deref(), Some("Object"));
                assert_eq!(method, "abort");
            }
            other => panic!("expected dispatch, got {other:?}"),
        }
    }

    #[test]
    fn implicit_self_dispatch() {
        let prog = parse_ok("class Main { helper(): Int { 1 }; main(): Int { helper() }; };");
        let Feature::Method(m) = &prog.classes[0].features[1] else {
            panic!("expected method");
        };
        match &m.body.kind {
            ExprKind::Dispatch { receiver, method, .. } => {
                assert_eq!(method, "helper");
                assert!(matches!(receiver.kind, ExprKind::Id(ref s) if s == "self"));
            }
            other => panic!("expected dispatch, got {other:?}"),
        }
    }

    #[test]
    fn recovers_after_malformed_feature_and_reports_one_error_per_problem() {
        let tokens = lex(
            "class Main { bad ; main(): Object { 1 }; };",
        )
        .tokens;
        let result = parse(tokens);
        assert!(result.is_err());
        let errs = result.unwrap_err();
        assert!(!errs.is_empty());
    }
}
