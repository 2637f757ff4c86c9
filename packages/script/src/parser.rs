//! Recursive-descent parser.
//!
//! The parser accepts the union of what scripts, programs and libraries may
//! contain; the checker decides what a given kind of unit allows.

use crate::ast::*;
use crate::diagnostic::{codes, ScriptDiagnostic, Span};
use crate::lexer::{tokenize, Token, TokenKind};

/// How deeply statements and expressions may nest.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Parse `source`. Lexical and syntax diagnostics are returned together.
pub fn parse(source: &str) -> (CompilationUnit, Vec<ScriptDiagnostic>) {
    let (tokens, mut diagnostics) = tokenize(source);
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        diagnostics: Vec::new(),
    };
    let unit = parser.unit();
    diagnostics.append(&mut parser.diagnostics);
    (unit, diagnostics)
}

/// Marker for a syntax error that has already been reported.
struct Reported;

type PResult<T> = Result<T, Reported>;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    diagnostics: Vec<ScriptDiagnostic>,
}

impl Parser {
    fn kind_at(&self, pos: usize) -> &TokenKind {
        let last = self.tokens.len() - 1;
        &self.tokens[pos.min(last)].kind
    }

    fn peek(&self) -> &TokenKind {
        self.kind_at(self.pos)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.kind_at(self.pos + offset)
    }

    fn span(&self) -> Span {
        let last = self.tokens.len() - 1;
        self.tokens[self.pos.min(last)].span
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) {
        if !self.at_eof() {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn report(&mut self, code: &'static str, span: Span, message: impl Into<String>) -> Reported {
        self.diagnostics.push(ScriptDiagnostic::error(code, span, message));
        Reported
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<()> {
        if self.eat(&kind) {
            return Ok(());
        }
        let message = format!("expected {}, found {}", kind.describe(), self.peek().describe());
        let span = self.span();
        Err(self.report(codes::EXPECTED_TOKEN, span, message))
    }

    fn ident(&mut self, what: &str) -> PResult<(String, Span)> {
        let span = self.span();
        if let TokenKind::Ident(name) = self.peek() {
            let name = name.clone();
            self.advance();
            return Ok((name, span));
        }
        let message = format!("expected {}, found {}", what, self.peek().describe());
        Err(self.report(codes::EXPECTED_TOKEN, span, message))
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            let span = self.span();
            let message = format!("code is nested more than {} levels deep", MAX_NESTING_DEPTH);
            return Err(self.report(codes::NESTING_TOO_DEEP, span, message));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Skip to just past the next `;`, or up to the next `}`.
    fn synchronize(&mut self) {
        loop {
            match self.peek() {
                TokenKind::Eof | TokenKind::RBrace => return,
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                _ => self.advance(),
            }
        }
    }

    // Items

    fn unit(&mut self) -> CompilationUnit {
        let mut unit = CompilationUnit::default();
        while !self.at_eof() {
            let start = self.pos;
            if self.item(&mut unit).is_err() {
                self.synchronize();
            }
            if self.pos == start {
                let span = self.span();
                let message = format!("unexpected {}", self.peek().describe());
                self.report(codes::UNEXPECTED_TOKEN, span, message);
                self.advance();
            }
        }
        unit
    }

    fn item(&mut self, unit: &mut CompilationUnit) -> PResult<()> {
        let span = self.span();
        match self.peek() {
            TokenKind::Using => {
                self.advance();
                let namespace = self.qualified_name()?;
                self.expect(TokenKind::Semicolon)?;
                unit.usings.push(UsingDirective { namespace, span });
            }
            TokenKind::Namespace => {
                self.advance();
                let name = self.qualified_name()?;
                self.expect(TokenKind::Semicolon)?;
                if unit.namespace.is_some() {
                    return Err(self.report(
                        codes::MISPLACED_ITEM,
                        span,
                        "a unit can declare only one namespace",
                    ));
                }
                unit.namespace = Some(NamespaceDecl { name, span });
            }
            TokenKind::Public | TokenKind::Private | TokenKind::Static => {
                while matches!(
                    self.peek(),
                    TokenKind::Public | TokenKind::Private | TokenKind::Static
                ) {
                    self.advance();
                }
                if self.check(&TokenKind::Struct) {
                    unit.structs.push(self.struct_decl()?);
                } else if self.function_ahead() {
                    unit.functions.push(self.function_decl()?);
                } else {
                    let span = self.span();
                    return Err(self.report(
                        codes::EXPECTED_TOKEN,
                        span,
                        "expected a function or struct declaration after modifiers",
                    ));
                }
            }
            TokenKind::Struct => unit.structs.push(self.struct_decl()?),
            _ if self.function_ahead() => unit.functions.push(self.function_decl()?),
            _ => unit.statements.push(self.statement(true)?),
        }
        Ok(())
    }

    fn qualified_name(&mut self) -> PResult<String> {
        let (mut name, _) = self.ident("a name")?;
        while self.check(&TokenKind::Dot) && matches!(self.peek_at(1), TokenKind::Ident(_)) {
            self.advance();
            let (part, _) = self.ident("a name")?;
            name.push('.');
            name.push_str(&part);
        }
        Ok(name)
    }

    /// Position just past a type starting at `pos`, if one is there.
    fn type_end(&self, pos: usize) -> Option<usize> {
        let mut p = pos;
        match self.kind_at(p) {
            TokenKind::Void => return Some(p + 1),
            TokenKind::Ident(_) => p += 1,
            _ => return None,
        }
        while matches!(self.kind_at(p), TokenKind::Dot)
            && matches!(self.kind_at(p + 1), TokenKind::Ident(_))
        {
            p += 2;
        }
        while matches!(self.kind_at(p), TokenKind::LBracket)
            && matches!(self.kind_at(p + 1), TokenKind::RBracket)
        {
            p += 2;
        }
        Some(p)
    }

    /// `Type Name (` ahead.
    fn function_ahead(&self) -> bool {
        match self.type_end(self.pos) {
            Some(p) => {
                matches!(self.kind_at(p), TokenKind::Ident(_))
                    && matches!(self.kind_at(p + 1), TokenKind::LParen)
            }
            None => false,
        }
    }

    /// `Type Name =` or `Type Name ;` ahead.
    fn declaration_ahead(&self) -> bool {
        match self.type_end(self.pos) {
            Some(p) => {
                matches!(self.kind_at(p), TokenKind::Ident(_))
                    && matches!(
                        self.kind_at(p + 1),
                        TokenKind::Assign | TokenKind::Semicolon
                    )
            }
            None => false,
        }
    }

    fn type_expr(&mut self) -> PResult<TypeExpr> {
        let span = self.span();
        let mut ty = if self.eat(&TokenKind::Void) {
            TypeExpr {
                kind: TypeExprKind::Void,
                span,
            }
        } else {
            let name = self.qualified_name()?;
            TypeExpr {
                kind: TypeExprKind::Named(name),
                span,
            }
        };
        while self.check(&TokenKind::LBracket) && matches!(self.peek_at(1), TokenKind::RBracket) {
            self.advance();
            self.advance();
            ty = TypeExpr {
                kind: TypeExprKind::Array(Box::new(ty)),
                span,
            };
        }
        Ok(ty)
    }

    fn struct_decl(&mut self) -> PResult<StructDecl> {
        let span = self.span();
        self.expect(TokenKind::Struct)?;
        let (name, _) = self.ident("a struct name")?;
        self.expect(TokenKind::LBrace)?;

        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            while matches!(self.peek(), TokenKind::Public | TokenKind::Private) {
                self.advance();
            }
            let field_span = self.span();
            let ty = self.type_expr()?;
            let (field, _) = self.ident("a field name")?;
            self.expect(TokenKind::Semicolon)?;
            fields.push(FieldDecl {
                ty,
                name: field,
                span: field_span,
            });
        }
        self.expect(TokenKind::RBrace)?;

        Ok(StructDecl { name, fields, span })
    }

    fn function_decl(&mut self) -> PResult<FunctionDecl> {
        let span = self.span();
        let return_type = self.type_expr()?;
        let (name, _) = self.ident("a function name")?;
        self.expect(TokenKind::LParen)?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let param_span = self.span();
                let ty = self.type_expr()?;
                let (param, _) = self.ident("a parameter name")?;
                params.push(ParamDecl {
                    ty,
                    name: param,
                    span: param_span,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.block()?;

        Ok(FunctionDecl {
            name,
            params,
            return_type,
            body,
            span,
        })
    }

    // Statements

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let start = self.pos;
            match self.statement(false) {
                Ok(stmt) => stmts.push(stmt),
                Err(Reported) => {
                    self.synchronize();
                    if self.pos == start {
                        self.advance();
                    }
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    /// The body of an `if`, loop or `else`.
    fn embedded(&mut self) -> PResult<Vec<Stmt>> {
        let stmt = self.statement(false)?;
        Ok(match stmt.kind {
            StmtKind::Block(stmts) => stmts,
            _ => vec![stmt],
        })
    }

    fn statement(&mut self, top_level: bool) -> PResult<Stmt> {
        self.nested(|parser| parser.statement_at_depth(top_level))
    }

    fn statement_at_depth(&mut self, top_level: bool) -> PResult<Stmt> {
        let span = self.span();
        let kind = match self.peek() {
            TokenKind::LBrace => StmtKind::Block(self.block()?),
            TokenKind::Semicolon => {
                self.advance();
                StmtKind::Block(Vec::new())
            }
            TokenKind::If => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.expr()?;
                self.expect(TokenKind::RParen)?;
                let then_branch = self.embedded()?;
                let else_branch = if self.eat(&TokenKind::Else) {
                    Some(self.embedded()?)
                } else {
                    None
                };
                StmtKind::If {
                    cond,
                    then_branch,
                    else_branch,
                }
            }
            TokenKind::While => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.expr()?;
                self.expect(TokenKind::RParen)?;
                let body = self.embedded()?;
                StmtKind::While { cond, body }
            }
            TokenKind::For => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let init = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(Box::new(self.simple_statement()?))
                };
                self.expect(TokenKind::Semicolon)?;
                let cond = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(TokenKind::Semicolon)?;
                let step = if self.check(&TokenKind::RParen) {
                    None
                } else {
                    Some(Box::new(self.simple_statement()?))
                };
                self.expect(TokenKind::RParen)?;
                let body = self.embedded()?;
                StmtKind::For {
                    init,
                    cond,
                    step,
                    body,
                }
            }
            TokenKind::Foreach => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let ty = if self.eat(&TokenKind::Var) {
                    None
                } else {
                    Some(self.type_expr()?)
                };
                let (name, _) = self.ident("a loop variable")?;
                self.expect(TokenKind::In)?;
                let iterable = self.expr()?;
                self.expect(TokenKind::RParen)?;
                let body = self.embedded()?;
                StmtKind::Foreach {
                    ty,
                    name,
                    iterable,
                    body,
                }
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(TokenKind::Semicolon)?;
                StmtKind::Return(value)
            }
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                StmtKind::Continue
            }
            TokenKind::Throw => {
                self.advance();
                let value = self.expr()?;
                self.expect(TokenKind::Semicolon)?;
                StmtKind::Throw(value)
            }
            TokenKind::Struct | TokenKind::Using | TokenKind::Namespace => {
                let message = format!("{} is only allowed at the top level", self.peek().describe());
                return Err(self.report(codes::MISPLACED_ITEM, span, message));
            }
            _ if self.function_ahead() => {
                return Err(self.report(
                    codes::MISPLACED_ITEM,
                    span,
                    "functions must be declared at the top level",
                ));
            }
            _ => {
                let stmt = self.simple_statement()?;
                match stmt.kind {
                    StmtKind::Expr(expr) if top_level && self.at_eof() => StmtKind::Trailing(expr),
                    kind => {
                        self.expect(TokenKind::Semicolon)?;
                        kind
                    }
                }
            }
        };
        Ok(Stmt { kind, span })
    }

    /// A declaration, assignment or expression without its terminator.
    fn simple_statement(&mut self) -> PResult<Stmt> {
        let span = self.span();

        if self.eat(&TokenKind::Var) {
            let (name, _) = self.ident("a variable name")?;
            self.expect(TokenKind::Assign)?;
            let init = self.expr()?;
            return Ok(Stmt {
                kind: StmtKind::VarDecl {
                    ty: None,
                    name,
                    init: Some(init),
                },
                span,
            });
        }

        if self.declaration_ahead() {
            let ty = self.type_expr()?;
            let (name, _) = self.ident("a variable name")?;
            let init = if self.eat(&TokenKind::Assign) {
                Some(self.expr()?)
            } else {
                None
            };
            return Ok(Stmt {
                kind: StmtKind::VarDecl {
                    ty: Some(ty),
                    name,
                    init,
                },
                span,
            });
        }

        if matches!(self.peek(), TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let op = if self.check(&TokenKind::PlusPlus) {
                AssignOp::Add
            } else {
                AssignOp::Sub
            };
            self.advance();
            let target = self.postfix()?;
            return self.assignment(target, op, one(span), span);
        }

        let target = self.expr()?;
        let op = match self.peek() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::StarAssign => AssignOp::Mul,
            TokenKind::SlashAssign => AssignOp::Div,
            TokenKind::PercentAssign => AssignOp::Rem,
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = if self.check(&TokenKind::PlusPlus) {
                    AssignOp::Add
                } else {
                    AssignOp::Sub
                };
                self.advance();
                return self.assignment(target, op, one(span), span);
            }
            _ => {
                return Ok(Stmt {
                    kind: StmtKind::Expr(target),
                    span,
                })
            }
        };
        self.advance();
        let value = self.expr()?;
        self.assignment(target, op, value, span)
    }

    fn assignment(&mut self, target: Expr, op: AssignOp, value: Expr, span: Span) -> PResult<Stmt> {
        if !matches!(
            target.kind,
            ExprKind::Name(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
        ) {
            return Err(self.report(
                codes::INVALID_ASSIGNMENT_TARGET,
                target.span,
                "the left-hand side of an assignment must be a variable, field or element",
            ));
        }
        Ok(Stmt {
            kind: StmtKind::Assign { target, op, value },
            span,
        })
    }

    // Expressions

    fn expr(&mut self) -> PResult<Expr> {
        self.nested(|parser| parser.binary(0))
    }

    fn binary(&mut self, level: usize) -> PResult<Expr> {
        if level == BINARY_LEVELS {
            return self.unary();
        }
        let mut left = self.binary(level + 1)?;
        while let Some(op) = binary_op(self.peek(), level) {
            self.advance();
            let right = self.binary(level + 1)?;
            let span = left.span;
            left = Expr {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let span = self.span();
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.postfix(),
        };
        self.advance();
        let operand = self.nested(Self::unary)?;

        if op == UnaryOp::Neg {
            if let ExprKind::Literal(literal) = &operand.kind {
                let folded = match literal {
                    Literal::Int32(v) => Some(Literal::Int32(-v)),
                    Literal::Int64(v) if *v == i64::from(i32::MAX) + 1 => {
                        Some(Literal::Int32(i32::MIN))
                    }
                    Literal::Int64(v) => Some(Literal::Int64(-v)),
                    Literal::Double(v) => Some(Literal::Double(-v)),
                    _ => None,
                };
                if let Some(literal) = folded {
                    return Ok(Expr {
                        kind: ExprKind::Literal(literal),
                        span,
                    });
                }
            }
        }

        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        })
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            let span = expr.span;
            if self.eat(&TokenKind::Dot) {
                let (name, _) = self.ident("a member name")?;
                expr = Expr {
                    kind: ExprKind::Member {
                        object: Box::new(expr),
                        name,
                    },
                    span,
                };
            } else if self.eat(&TokenKind::LParen) {
                let args = self.arguments()?;
                expr = Expr {
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    span,
                };
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expr()?;
                self.expect(TokenKind::RBracket)?;
                expr = Expr {
                    kind: ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn arguments(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let span = self.span();
        let kind = match self.peek() {
            TokenKind::Int32(v) => ExprKind::Literal(Literal::Int32(*v)),
            TokenKind::Int64(v) => ExprKind::Literal(Literal::Int64(*v)),
            TokenKind::Double(v) => ExprKind::Literal(Literal::Double(*v)),
            TokenKind::Str(s) => ExprKind::Literal(Literal::String(s.clone())),
            TokenKind::True => ExprKind::Literal(Literal::Boolean(true)),
            TokenKind::False => ExprKind::Literal(Literal::Boolean(false)),
            TokenKind::Ident(name) => ExprKind::Name(name.clone()),
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::New => return self.new_expr(),
            other => {
                let message = format!("expected an expression, found {}", other.describe());
                return Err(self.report(codes::EXPECTED_TOKEN, span, message));
            }
        };
        self.advance();
        Ok(Expr { kind, span })
    }

    fn new_expr(&mut self) -> PResult<Expr> {
        let span = self.span();
        self.expect(TokenKind::New)?;

        if self.eat(&TokenKind::LBracket) {
            self.expect(TokenKind::RBracket)?;
            let items = self.array_items()?;
            return Ok(Expr {
                kind: ExprKind::NewArray {
                    element: None,
                    items,
                },
                span,
            });
        }

        let type_span = self.span();
        let name = self.qualified_name()?;
        let base = TypeExpr {
            kind: TypeExprKind::Named(name),
            span: type_span,
        };

        if self.check(&TokenKind::LBracket) {
            if matches!(self.peek_at(1), TokenKind::RBracket) {
                let mut element = base;
                self.advance();
                self.advance();
                while self.check(&TokenKind::LBracket)
                    && matches!(self.peek_at(1), TokenKind::RBracket)
                {
                    self.advance();
                    self.advance();
                    element = TypeExpr {
                        kind: TypeExprKind::Array(Box::new(element)),
                        span: type_span,
                    };
                }
                let items = self.array_items()?;
                return Ok(Expr {
                    kind: ExprKind::NewArray {
                        element: Some(element),
                        items,
                    },
                    span,
                });
            }

            self.advance();
            let length = self.expr()?;
            self.expect(TokenKind::RBracket)?;
            return Ok(Expr {
                kind: ExprKind::NewArrayOfLength {
                    element: base,
                    length: Box::new(length),
                },
                span,
            });
        }

        let had_parens = self.eat(&TokenKind::LParen);
        if had_parens {
            self.expect(TokenKind::RParen)?;
        }
        let fields = if self.check(&TokenKind::LBrace) {
            self.field_inits()?
        } else if had_parens {
            Vec::new()
        } else {
            let message = format!("expected `(` or `{{`, found {}", self.peek().describe());
            let at = self.span();
            return Err(self.report(codes::EXPECTED_TOKEN, at, message));
        };

        Ok(Expr {
            kind: ExprKind::NewStruct { ty: base, fields },
            span,
        })
    }

    fn array_items(&mut self) -> PResult<Vec<Expr>> {
        self.expect(TokenKind::LBrace)?;
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            items.push(self.expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(items)
    }

    fn field_inits(&mut self) -> PResult<Vec<FieldInit>> {
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let (name, span) = self.ident("a field name")?;
            self.expect(TokenKind::Assign)?;
            let value = self.expr()?;
            fields.push(FieldInit { name, value, span });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(fields)
    }
}

const BINARY_LEVELS: usize = 6;

fn binary_op(kind: &TokenKind, level: usize) -> Option<BinaryOp> {
    let op = match (level, kind) {
        (0, TokenKind::OrOr) => BinaryOp::Or,
        (1, TokenKind::AndAnd) => BinaryOp::And,
        (2, TokenKind::EqEq) => BinaryOp::Eq,
        (2, TokenKind::NotEq) => BinaryOp::NotEq,
        (3, TokenKind::Lt) => BinaryOp::Lt,
        (3, TokenKind::Le) => BinaryOp::Le,
        (3, TokenKind::Gt) => BinaryOp::Gt,
        (3, TokenKind::Ge) => BinaryOp::Ge,
        (4, TokenKind::Plus) => BinaryOp::Add,
        (4, TokenKind::Minus) => BinaryOp::Sub,
        (5, TokenKind::Star) => BinaryOp::Mul,
        (5, TokenKind::Slash) => BinaryOp::Div,
        (5, TokenKind::Percent) => BinaryOp::Rem,
        _ => return None,
    };
    Some(op)
}

fn one(span: Span) -> Expr {
    Expr {
        kind: ExprKind::Literal(Literal::Int32(1)),
        span,
    }
}
