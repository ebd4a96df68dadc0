//! Lexical analyzer for COOL source text.
//!
//! Hand-written character-at-a-time scanner. Lookahead never exceeds one
//! character beyond the current one (needed for `<=`, `<-`, `(*`, `*)`,
//! `--`). Comments and whitespace are discarded; string/comment errors are
//! recovered so a single pass can report more than one problem.

use crate::diagnostics::Span;
use std::fmt;

/// Maximum accepted string literal length, in characters, per the language
/// reference.
const MAX_STRING_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords (case-insensitive except true/false)
    Class,
    Inherits,
    If,
    Then,
    Else,
    Fi,
    While,
    Loop,
    Pool,
    Let,
    In,
    Case,
    Of,
    Esac,
    New,
    IsVoid,
    Not,
    True,
    False,

    // Punctuation
    LBrace,
    RBrace,
    LParen,
    RParen,
    Semi,
    Colon,
    Comma,
    Dot,
    At,
    Assign,   // <-
    DArrow,   // =>

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Tilde,
    Lt,
    Le,
    Eq,

    // Identifiers and literals
    TypeId(String),
    ObjectId(String),
    IntLiteral(String),
    StringLiteral(String),

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;
        match self {
            TypeId(s) => write!(f, "type identifier '{s}'"),
            ObjectId(s) => write!(f, "identifier '{s}'"),
            IntLiteral(s) => write!(f, "integer '{s}'"),
            StringLiteral(_) => write!(f, "string literal"),
            Eof => write!(f, "end of file"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    UnterminatedString(Span),
    UnterminatedComment(Span),
    StringTooLong(Span),
    NewlineInString(Span),
    NullInString(Span),
    InvalidCharacter(Span, char),
    UnmatchedCloseComment(Span),
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnterminatedString(s)
            | LexError::UnterminatedComment(s)
            | LexError::StringTooLong(s)
            | LexError::NewlineInString(s)
            | LexError::NullInString(s)
            | LexError::InvalidCharacter(s, _)
            | LexError::UnmatchedCloseComment(s) => *s,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LexError::UnterminatedString(_) => "E0101",
            LexError::UnterminatedComment(_) => "E0102",
            LexError::StringTooLong(_) => "E0103",
            LexError::NewlineInString(_) => "E0104",
            LexError::NullInString(_) => "E0105",
            LexError::InvalidCharacter(_, _) => "E0106",
            LexError::UnmatchedCloseComment(_) => "E0107",
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnterminatedString(_) => write!(f, "EOF in string constant"),
            LexError::UnterminatedComment(_) => write!(f, "EOF in comment"),
            LexError::StringTooLong(_) => write!(f, "string constant too long"),
            LexError::NewlineInString(_) => write!(f, "unterminated string constant"),
            LexError::NullInString(_) => write!(f, "string contains null character"),
            LexError::InvalidCharacter(_, c) => write!(f, "invalid character '{c}'"),
            LexError::UnmatchedCloseComment(_) => write!(f, "unmatched *)"),
        }
    }
}

impl std::error::Error for LexError {}

/// Output of a lexing run: the token stream (always ending in `Eof`) plus
/// any recoverable errors encountered along the way.
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub errors: Vec<LexError>,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

pub fn lex(source: &str) -> LexResult {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        col: 1,
        tokens: Vec::new(),
        errors: Vec::new(),
    };
    lexer.run();
    LexResult {
        tokens: lexer.tokens,
        errors: lexer.errors,
    }
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn here(&self) -> Span {
        Span::new(self.line, self.col)
    }

    fn run(&mut self) {
        loop {
            self.skip_trivia();
            let start = self.here();
            let Some(c) = self.peek() else {
                self.tokens.push(Token::new(TokenKind::Eof, start));
                return;
            };

            if c.is_ascii_digit() {
                self.lex_int(start);
                continue;
            }
            if c.is_ascii_alphabetic() || c == '_' {
                self.lex_ident(start);
                continue;
            }
            if c == '"' {
                self.lex_string(start);
                continue;
            }
            self.lex_operator(start);
        }
    }

    /// Skips whitespace, `--` line comments, and nested `(* ... *)` block
    /// comments. Never leaves the cursor sitting inside trivia.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('-') if self.peek_at(1) == Some('-') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.bump();
                    }
                }
                Some('(') if self.peek_at(1) == Some('*') => {
                    let start = self.here();
                    self.bump();
                    self.bump();
                    let mut depth = 1usize;
                    loop {
                        match self.peek() {
                            None => {
                                self.errors.push(LexError::UnterminatedComment(start));
                                return;
                            }
                            Some('*') if self.peek_at(1) == Some(')') => {
                                self.bump();
                                self.bump();
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            Some('(') if self.peek_at(1) == Some('*') => {
                                self.bump();
                                self.bump();
                                depth += 1;
                            }
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
                Some('*') if self.peek_at(1) == Some(')') => {
                    let start = self.here();
                    self.bump();
                    self.bump();
                    self.errors.push(LexError::UnmatchedCloseComment(start));
                }
                _ => return,
            }
        }
    }

    fn lex_int(&mut self, start: Span) {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        self.tokens
            .push(Token::new(TokenKind::IntLiteral(text), start));
    }

    fn lex_ident(&mut self, start: Span) {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        let lower = text.to_ascii_lowercase();
        let kind = match lower.as_str() {
            "class" => TokenKind::Class,
            "inherits" => TokenKind::Inherits,
            "if" => TokenKind::If,
            "then" => TokenKind::Then,
            "else" => TokenKind::Else,
            "fi" => TokenKind::Fi,
            "while" => TokenKind::While,
            "loop" => TokenKind::Loop,
            "pool" => TokenKind::Pool,
            "let" => TokenKind::Let,
            "in" => TokenKind::In,
            "case" => TokenKind::Case,
            "of" => TokenKind::Of,
            "esac" => TokenKind::Esac,
            "new" => TokenKind::New,
            "isvoid" => TokenKind::IsVoid,
            "not" => TokenKind::Not,
            // true/false must start with a lowercase letter; the rest may
            // be any case, but the keyword itself is not case-insensitive
            // the way the other keywords are.
            "true" if text.starts_with('t') => TokenKind::True,
            "false" if text.starts_with('f') => TokenKind::False,
            _ => {
                if text.chars().next().unwrap().is_ascii_uppercase() {
                    TokenKind::TypeId(text)
                } else {
                    TokenKind::ObjectId(text)
                }
            }
        };
        self.tokens.push(Token::new(kind, start));
    }

    fn lex_string(&mut self, start: Span) {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    self.errors.push(LexError::UnterminatedString(start));
                    break;
                }
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\n') => {
                    self.errors.push(LexError::NewlineInString(start));
                    // resync at the newline itself, leave it for skip_trivia
                    break;
                }
                Some('\0') => {
                    self.errors.push(LexError::NullInString(start));
                    self.bump();
                }
                Some('\\') => {
                    self.bump();
                    match self.peek() {
                        Some('n') => {
                            value.push('\n');
                            self.bump();
                        }
                        Some('t') => {
                            value.push('\t');
                            self.bump();
                        }
                        Some('b') => {
                            value.push('\u{8}');
                            self.bump();
                        }
                        Some('f') => {
                            value.push('\u{c}');
                            self.bump();
                        }
                        Some('\n') => {
                            // escaped newline: literal newline in the value
                            value.push('\n');
                            self.bump();
                        }
                        Some(c) => {
                            value.push(c);
                            self.bump();
                        }
                        None => {
                            self.errors.push(LexError::UnterminatedString(start));
                            break;
                        }
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
            if value.chars().count() > MAX_STRING_LEN {
                self.errors.push(LexError::StringTooLong(start));
                // resync: consume to closing quote or newline
                loop {
                    match self.peek() {
                        None | Some('\n') => break,
                        Some('"') => {
                            self.bump();
                            break;
                        }
                        _ => {
                            self.bump();
                        }
                    }
                }
                return;
            }
        }
        self.tokens
            .push(Token::new(TokenKind::StringLiteral(value), start));
    }

    fn lex_operator(&mut self, start: Span) {
        let c = self.bump().expect("checked by caller");
        let kind = match c {
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ';' => TokenKind::Semi,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '@' => TokenKind::At,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '~' => TokenKind::Tilde,
            '=' => {
                if self.peek() == Some('>') {
                    self.bump();
                    TokenKind::DArrow
                } else {
                    TokenKind::Eq
                }
            }
            '<' => match self.peek() {
                Some('-') => {
                    self.bump();
                    TokenKind::Assign
                }
                Some('=') => {
                    self.bump();
                    TokenKind::Le
                }
                _ => TokenKind::Lt,
            },
            other => {
                self.errors.push(LexError::InvalidCharacter(start, other));
                return;
            }
        };
        self.tokens.push(Token::new(kind, start));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_are_case_insensitive_except_bool_literals() {
        assert_eq!(kinds("CLASS")[0], TokenKind::Class);
        assert_eq!(kinds("Class")[0], TokenKind::Class);
        assert_eq!(kinds("tRue")[0], TokenKind::True);
        // Capital-T "True" is not a bool literal -- it's a type identifier.
        assert_eq!(kinds("True")[0], TokenKind::TypeId("True".into()));
    }

    #[test]
    fn identifiers_split_by_case() {
        assert_eq!(kinds("Foo")[0], TokenKind::TypeId("Foo".into()));
        assert_eq!(kinds("foo")[0], TokenKind::ObjectId("foo".into()));
    }

    #[test]
    fn nested_block_comments() {
        let r = lex("(* outer (* inner *) still outer *) class");
        assert!(r.errors.is_empty());
        assert_eq!(r.tokens[0].kind, TokenKind::Class);
    }

    #[test]
    fn unterminated_block_comment_errors() {
        let r = lex("(* never closes");
        assert_eq!(r.errors.len(), 1);
        assert!(matches!(r.errors[0], LexError::UnterminatedComment(_)));
    }

    #[test]
    fn string_escapes() {
        let r = lex(r#""a\nb\tc""#);
        assert_eq!(
            r.tokens[0].kind,
            TokenKind::StringLiteral("a\nb\tc".to_string())
        );
    }

    #[test]
    fn string_too_long_is_recoverable() {
        let long = "a".repeat(1200);
        let src = format!("\"{long}\" class");
        let r = lex(&src);
        assert_eq!(r.errors.len(), 1);
        assert!(matches!(r.errors[0], LexError::StringTooLong(_)));
        // lexing continues after the bad string
        assert!(r.tokens.iter().any(|t| t.kind == TokenKind::Class));
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(kinds("<-")[0], TokenKind::Assign);
        assert_eq!(kinds("<=")[0], TokenKind::Le);
        assert_eq!(kinds("<")[0], TokenKind::Lt);
        assert_eq!(kinds("=>")[0], TokenKind::DArrow);
    }

    #[test]
    fn always_ends_in_eof() {
        let r = lex("class Main {};");
        assert_eq!(r.tokens.last().unwrap().kind, TokenKind::Eof);
    }
}
