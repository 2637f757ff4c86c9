//! Tokenizer.

use crate::diagnostic::{codes, ScriptDiagnostic, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Str(String),

    Var,
    If,
    Else,
    While,
    For,
    Foreach,
    In,
    Return,
    Break,
    Continue,
    Throw,
    New,
    Struct,
    Using,
    Namespace,
    Static,
    Public,
    Private,
    True,
    False,
    Void,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Dot,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    PlusPlus,
    MinusMinus,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,

    Eof,
}

impl TokenKind {
    /// How the token reads in a diagnostic.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier `{}`", name),
            TokenKind::Int32(v) => format!("number `{}`", v),
            TokenKind::Int64(v) => format!("number `{}L`", v),
            TokenKind::Double(v) => format!("number `{}`", v),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("`{}`", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Var => "var",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::For => "for",
            TokenKind::Foreach => "foreach",
            TokenKind::In => "in",
            TokenKind::Return => "return",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Throw => "throw",
            TokenKind::New => "new",
            TokenKind::Struct => "struct",
            TokenKind::Using => "using",
            TokenKind::Namespace => "namespace",
            TokenKind::Static => "static",
            TokenKind::Public => "public",
            TokenKind::Private => "private",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Void => "void",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Assign => "=",
            TokenKind::PlusAssign => "+=",
            TokenKind::MinusAssign => "-=",
            TokenKind::StarAssign => "*=",
            TokenKind::SlashAssign => "/=",
            TokenKind::PercentAssign => "%=",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Bang => "!",
            TokenKind::Ident(_)
            | TokenKind::Int32(_)
            | TokenKind::Int64(_)
            | TokenKind::Double(_)
            | TokenKind::Str(_)
            | TokenKind::Eof => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Reserved words, including the built-in type aliases.
pub const KEYWORDS: &[&str] = &[
    "var", "if", "else", "while", "for", "foreach", "in", "return", "break", "continue", "throw",
    "new", "struct", "using", "namespace", "static", "public", "private", "true", "false", "void",
    "int", "long", "double", "bool", "string",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "var" => TokenKind::Var,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "foreach" => TokenKind::Foreach,
        "in" => TokenKind::In,
        "return" => TokenKind::Return,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "throw" => TokenKind::Throw,
        "new" => TokenKind::New,
        "struct" => TokenKind::Struct,
        "using" => TokenKind::Using,
        "namespace" => TokenKind::Namespace,
        "static" => TokenKind::Static,
        "public" => TokenKind::Public,
        "private" => TokenKind::Private,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "void" => TokenKind::Void,
        _ => return None,
    })
}

/// Tokenize `source`. The token list always ends with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<ScriptDiagnostic>) {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
        tokens: Vec::new(),
        diagnostics: Vec::new(),
    };
    lexer.run();
    (lexer.tokens, lexer.diagnostics)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    diagnostics: Vec<ScriptDiagnostic>,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn here(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn push(&mut self, kind: TokenKind, span: Span) {
        self.tokens.push(Token { kind, span });
    }

    fn error(&mut self, code: &'static str, span: Span, message: impl Into<String>) {
        self.diagnostics.push(ScriptDiagnostic::error(code, span, message));
    }

    fn run(&mut self) {
        loop {
            self.skip_trivia();
            let span = self.here();
            let Some(c) = self.peek() else {
                self.push(TokenKind::Eof, span);
                return;
            };

            if c == '_' || unicode_ident::is_xid_start(c) {
                self.identifier(span);
            } else if c.is_ascii_digit() {
                self.number(span);
            } else if c == '"' {
                self.bump();
                self.string(span);
            } else if c == '@' && self.peek_at(1) == Some('"') {
                self.bump();
                self.bump();
                self.verbatim_string(span);
            } else {
                self.bump();
                match self.punctuation(c) {
                    Some(kind) => self.push(kind, span),
                    None => self.error(
                        codes::UNEXPECTED_CHARACTER,
                        span,
                        format!("unexpected character `{}`", c),
                    ),
                }
            }
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let span = self.here();
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => {
                                self.error(
                                    codes::UNTERMINATED_COMMENT,
                                    span,
                                    "unterminated block comment",
                                );
                                return;
                            }
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn identifier(&mut self, span: Span) {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || unicode_ident::is_xid_continue(c) {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let kind = keyword(&word).unwrap_or(TokenKind::Ident(word));
        self.push(kind, span);
    }

    fn number(&mut self, span: Span) {
        let mut text = String::new();
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                if c != '_' {
                    text.push(c);
                }
                self.bump();
            } else {
                break;
            }
        }

        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            self.bump();
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                text.push(c);
                self.bump();
            }
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                text.push('e');
                self.bump();
                if sign {
                    if let Some(s) = self.bump() {
                        text.push(s);
                    }
                }
                while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                    text.push(c);
                    self.bump();
                }
            }
        }

        let long_suffix = !is_float && matches!(self.peek(), Some('L' | 'l'));
        if long_suffix {
            self.bump();
        }
        let double_suffix = matches!(self.peek(), Some('D' | 'd'));
        if double_suffix {
            self.bump();
            is_float = true;
        }

        if let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
            self.error(
                codes::INVALID_NUMBER,
                span,
                format!("invalid character `{}` in numeric literal", c),
            );
            while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                self.bump();
            }
            self.push(TokenKind::Int32(0), span);
            return;
        }

        let kind = if is_float {
            match text.parse::<f64>() {
                Ok(v) => TokenKind::Double(v),
                Err(_) => {
                    self.error(codes::INVALID_NUMBER, span, format!("invalid number `{}`", text));
                    TokenKind::Double(0.0)
                }
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) if !long_suffix => match i32::try_from(v) {
                    Ok(small) => TokenKind::Int32(small),
                    Err(_) => TokenKind::Int64(v),
                },
                Ok(v) => TokenKind::Int64(v),
                Err(_) => {
                    self.error(
                        codes::INVALID_NUMBER,
                        span,
                        format!("integral constant `{}` is too large", text),
                    );
                    TokenKind::Int64(0)
                }
            }
        };
        self.push(kind, span);
    }

    fn string(&mut self, span: Span) {
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.error(codes::UNTERMINATED_STRING, span, "newline in string literal");
                    break;
                }
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    let escape_span = self.here();
                    self.bump();
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some(other) => {
                            self.error(
                                codes::INVALID_ESCAPE,
                                escape_span,
                                format!("unrecognized escape sequence `\\{}`", other),
                            );
                            other
                        }
                        None => continue,
                    };
                    value.push(escaped);
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
        self.push(TokenKind::Str(value), span);
    }

    fn verbatim_string(&mut self, span: Span) {
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    self.error(codes::UNTERMINATED_STRING, span, "unterminated string literal");
                    break;
                }
                Some('"') => {
                    if self.eat('"') {
                        value.push('"');
                    } else {
                        break;
                    }
                }
                Some(c) => value.push(c),
            }
        }
        self.push(TokenKind::Str(value), span);
    }

    fn punctuation(&mut self, c: char) -> Option<TokenKind> {
        Some(match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            '+' if self.eat('+') => TokenKind::PlusPlus,
            '+' if self.eat('=') => TokenKind::PlusAssign,
            '+' => TokenKind::Plus,
            '-' if self.eat('-') => TokenKind::MinusMinus,
            '-' if self.eat('=') => TokenKind::MinusAssign,
            '-' => TokenKind::Minus,
            '*' if self.eat('=') => TokenKind::StarAssign,
            '*' => TokenKind::Star,
            '/' if self.eat('=') => TokenKind::SlashAssign,
            '/' => TokenKind::Slash,
            '%' if self.eat('=') => TokenKind::PercentAssign,
            '%' => TokenKind::Percent,
            '=' if self.eat('=') => TokenKind::EqEq,
            '=' => TokenKind::Assign,
            '!' if self.eat('=') => TokenKind::NotEq,
            '!' => TokenKind::Bang,
            '<' if self.eat('=') => TokenKind::Le,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::Ge,
            '>' => TokenKind::Gt,
            '&' if self.eat('&') => TokenKind::AndAnd,
            '|' if self.eat('|') => TokenKind::OrOr,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, diagnostics) = tokenize(source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_a_statement() {
        assert_eq!(
            kinds("var x = a + 2;"),
            vec![
                TokenKind::Var,
                TokenKind::Ident("x".into()),
                TokenKind::Assign,
                TokenKind::Ident("a".into()),
                TokenKind::Plus,
                TokenKind::Int32(2),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(
            kinds("1 2L 3000000000 1.5 2e3 4d"),
            vec![
                TokenKind::Int32(1),
                TokenKind::Int64(2),
                TokenKind::Int64(3_000_000_000),
                TokenKind::Double(1.5),
                TokenKind::Double(2000.0),
                TokenKind::Double(4.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn member_access_on_integer_is_not_a_float() {
        assert_eq!(
            kinds("1.ToString"),
            vec![
                TokenKind::Int32(1),
                TokenKind::Dot,
                TokenKind::Ident("ToString".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(
            kinds(r#""a\n\"b\"" @"C:\dir ""q""""#),
            vec![
                TokenKind::Str("a\n\"b\"".into()),
                TokenKind::Str("C:\\dir \"q\"".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_and_positions() {
        let (tokens, _) = tokenize("// line\n/* block\n */  x");
        assert_eq!(tokens[0].kind, TokenKind::Ident("x".into()));
        assert_eq!(tokens[0].span, Span::new(3, 6));
    }

    #[test]
    fn compound_operators() {
        assert_eq!(
            kinds("a += 1; b++; c <= d && !e"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::PlusAssign,
                TokenKind::Int32(1),
                TokenKind::Semicolon,
                TokenKind::Ident("b".into()),
                TokenKind::PlusPlus,
                TokenKind::Semicolon,
                TokenKind::Ident("c".into()),
                TokenKind::Le,
                TokenKind::Ident("d".into()),
                TokenKind::AndAnd,
                TokenKind::Bang,
                TokenKind::Ident("e".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_reported() {
        let (_, diagnostics) = tokenize("\"abc\nx");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, codes::UNTERMINATED_STRING);
        assert_eq!(diagnostics[0].span, Span::new(1, 1));
    }

    #[test]
    fn unexpected_character_is_reported() {
        let (tokens, diagnostics) = tokenize("a # b");
        assert_eq!(diagnostics[0].code, codes::UNEXPECTED_CHARACTER);
        assert_eq!(diagnostics[0].span, Span::new(1, 3));
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn oversized_integer_is_reported() {
        let (_, diagnostics) = tokenize("99999999999999999999");
        assert_eq!(diagnostics[0].code, codes::INVALID_NUMBER);
    }
}
