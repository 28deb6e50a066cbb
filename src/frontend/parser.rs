//! Parser for Verse
//!
//! Recursive descent parser with Pratt parsing for expressions. A source file
//! parses into a single `Block` node holding its top-level statements.

use crate::frontend::ast::*;
use crate::frontend::lexer::Lexer;
use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Error, FileId, Result, Span};

/// The parser
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    ids: &'a mut AstIdGen,
    /// Set while parsing `if`/`while`/`for` heads, where `Name {` opens the body
    no_struct: bool,
}

/// Lex and parse one source file
pub fn parse_source(source: &str, file_id: FileId, ids: &mut AstIdGen) -> Result<Ast> {
    let tokens = Lexer::new(source, file_id).tokenize()?;
    Parser::new(tokens, ids).parse_program()
}

impl<'a> Parser<'a> {
    /// Create a parser from pre-tokenized input
    pub fn new(mut tokens: Vec<Token>, ids: &'a mut AstIdGen) -> Self {
        if tokens.last().map_or(true, |t| t.kind != TokenKind::Eof) {
            let span = tokens.last().map(|t| t.span).unwrap_or_default();
            tokens.push(Token::eof(span));
        }
        Self { tokens, pos: 0, ids, no_struct: false }
    }

    // ==================== Helper Methods ====================

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_kind(&self, n: usize) -> &TokenKind {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current_kind()) == std::mem::discriminant(kind)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(Error::UnexpectedToken {
                expected: expected.to_string(),
                got: self.current_kind().to_string(),
                span: self.current().span,
            })
        }
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    fn node(&mut self, span: Span, kind: AstKind) -> Ast {
        Ast::new(self.ids.fresh(), span, kind)
    }

    fn parse_ident(&mut self) -> Result<(String, Span)> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok((name, token.span))
            }
            _ => Err(Error::ExpectedIdent { span: token.span }),
        }
    }

    fn parse_string(&mut self) -> Result<String> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::StringLit(s) => {
                self.advance();
                Ok(s)
            }
            other => Err(Error::UnexpectedToken {
                expected: "string".to_string(),
                got: other.to_string(),
                span: token.span,
            }),
        }
    }

    // ==================== Parsing Methods ====================

    /// Parse a complete file into its top-level block
    pub fn parse_program(&mut self) -> Result<Ast> {
        let start = self.current().span;
        let mut stmts = Vec::new();
        while !self.is_at_end() {
            stmts.push(self.parse_stmt()?);
        }
        let span = start.merge(&self.prev_span());
        Ok(self.node(span, AstKind::Block { stmts, scope: None }))
    }

    fn parse_block(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let saved = std::mem::replace(&mut self.no_struct, false);
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        self.no_struct = saved;
        let span = start.merge(&self.prev_span());
        Ok(self.node(span, AstKind::Block { stmts, scope: None }))
    }

    fn parse_stmt(&mut self) -> Result<Ast> {
        let start = self.current().span;
        match self.current_kind().clone() {
            TokenKind::Fn if matches!(self.peek_kind(1), TokenKind::Ident(_)) => {
                let decl = self.parse_function(false)?;
                Ok(self.node(decl.span, AstKind::FuncDecl(FuncRef::Parsed(Box::new(decl)))))
            }
            TokenKind::Type => self.parse_type_decl(),
            TokenKind::Enum => self.parse_enum(),
            TokenKind::Impl => self.parse_impl(),
            TokenKind::Directive(name) => self.parse_directive(&name),
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                let cond = self.parse_head_expr()?;
                let body = self.parse_block()?;
                let span = start.merge(&body.span);
                Ok(self.node(span, AstKind::While { cond: Box::new(cond), body: Box::new(body) }))
            }
            TokenKind::For => self.parse_for(),
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(Box::new(self.parse_expr()?))
                };
                self.expect(TokenKind::Semicolon)?;
                Ok(self.node(start.merge(&self.prev_span()), AstKind::Return { value }))
            }
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(self.node(start, AstKind::Break))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(self.node(start, AstKind::Continue))
            }
            TokenKind::Defer => {
                self.advance();
                let call = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(self.node(start.merge(&self.prev_span()), AstKind::Defer { call: Box::new(call) }))
            }
            TokenKind::Use => {
                self.advance();
                let target = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(self.node(start.merge(&self.prev_span()), AstKind::Use { target: Box::new(target) }))
            }
            TokenKind::LBrace => {
                let body = self.parse_block()?;
                let span = body.span;
                Ok(self.node(span, AstKind::AnonScope { body: Box::new(body) }))
            }
            TokenKind::Ident(_)
                if matches!(
                    self.peek_kind(1),
                    TokenKind::Colon | TokenKind::ColonEq | TokenKind::ColonColon
                ) =>
            {
                self.parse_decl()
            }
            _ => self.parse_expr_stmt(),
        }
    }

    /// `x: T = e;`, `x: T;`, `x := e;`, `X :: e;`
    fn parse_decl(&mut self) -> Result<Ast> {
        let (name, start) = self.parse_ident()?;
        let (ty, init, constant) = match self.advance().kind {
            TokenKind::ColonEq => (None, Some(self.parse_expr()?), false),
            TokenKind::ColonColon => (None, Some(self.parse_expr()?), true),
            _ => {
                let ty = TypeSlot::new(self.parse_type()?);
                let init = if self.consume(&TokenKind::Eq) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                (Some(ty), init, false)
            }
        };
        self.expect(TokenKind::Semicolon)?;
        let decl = Decl { name, ty, init, constant, ext: false, var: None };
        Ok(self.node(start.merge(&self.prev_span()), AstKind::Decl(Box::new(decl))))
    }

    fn parse_expr_stmt(&mut self) -> Result<Ast> {
        let lhs = self.parse_expr()?;
        let kind = self.current_kind().clone();
        if kind.is_assignment() {
            self.advance();
            let op = match kind {
                TokenKind::PlusEq => Some(BinOp::Add),
                TokenKind::MinusEq => Some(BinOp::Sub),
                TokenKind::StarEq => Some(BinOp::Mul),
                TokenKind::SlashEq => Some(BinOp::Div),
                TokenKind::PercentEq => Some(BinOp::Mod),
                _ => None,
            };
            let rhs = self.parse_expr()?;
            self.expect(TokenKind::Semicolon)?;
            let span = lhs.span.merge(&rhs.span);
            return Ok(self.node(
                span,
                AstKind::Assign { op, lhs: Box::new(lhs), rhs: Box::new(rhs), init: false },
            ));
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(lhs)
    }

    /// Parse `fn name(params) -> T { ... }`; `external` declarations have no body
    fn parse_function(&mut self, external: bool) -> Result<FnDecl> {
        let start = self.expect(TokenKind::Fn)?.span;
        let (name, _) = self.parse_ident()?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.is_at_end() {
            let (pname, pspan) = self.parse_ident()?;
            self.expect(TokenKind::Colon)?;
            let variadic = self.consume(&TokenKind::DotDotDot);
            let ty = TypeSlot::new(self.parse_type()?);
            params.push(Param { name: pname, ty, variadic, span: pspan });
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        if let Some(pos) = params.iter().position(|p| p.variadic) {
            if pos + 1 != params.len() {
                return Err(Error::semantic(
                    "only the last parameter may be variadic",
                    params[pos].span,
                ));
            }
        }

        let ret = if self.consume(&TokenKind::Arrow) {
            Some(TypeSlot::new(self.parse_type()?))
        } else {
            None
        };

        let body = if external {
            self.expect(TokenKind::Semicolon)?;
            None
        } else {
            Some(self.parse_block()?)
        };

        Ok(FnDecl {
            name,
            params,
            ret,
            body,
            ext: external,
            span: start.merge(&self.prev_span()),
            var: None,
            scope: None,
            ty: None,
            polymorphic: false,
            polymorphs: Vec::new(),
            param_vars: Vec::new(),
            method_of: None,
        })
    }

    /// `type Name T;` or `type Name(A, B) struct { ... }`
    fn parse_type_decl(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Type)?.span;
        let (name, _) = self.parse_ident()?;
        let mut params = Vec::new();
        if self.consume(&TokenKind::LParen) {
            while !self.check(&TokenKind::RParen) && !self.is_at_end() {
                params.push(self.parse_ident()?.0);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
        }
        let target = TypeSlot::new(self.parse_type()?);
        self.consume(&TokenKind::Semicolon);
        let span = start.merge(&self.prev_span());
        Ok(self.node(span, AstKind::TypeDecl { name, params, target }))
    }

    fn parse_enum(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Enum)?.span;
        let (name, _) = self.parse_ident()?;
        let inner = if self.consume(&TokenKind::Colon) {
            Some(TypeSlot::new(self.parse_type()?))
        } else {
            None
        };
        self.expect(TokenKind::LBrace)?;
        let mut members = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let (member, _) = self.parse_ident()?;
            let value = if self.consume(&TokenKind::Eq) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            members.push((member, value));
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        self.consume(&TokenKind::Semicolon);
        let span = start.merge(&self.prev_span());
        Ok(self.node(span, AstKind::EnumDecl(Box::new(EnumDecl { name, inner, members, ty: None }))))
    }

    fn parse_impl(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Impl)?.span;
        let target = TypeSlot::new(self.parse_type()?);
        self.expect(TokenKind::LBrace)?;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let decl = self.parse_function(false)?;
            methods.push(self.node(decl.span, AstKind::FuncDecl(FuncRef::Parsed(Box::new(decl)))));
        }
        self.expect(TokenKind::RBrace)?;
        let span = start.merge(&self.prev_span());
        Ok(self.node(span, AstKind::Impl { target, methods }))
    }

    fn parse_directive(&mut self, name: &str) -> Result<Ast> {
        let start = self.advance().span;
        match name {
            "import" => {
                let path = self.parse_string()?;
                self.consume(&TokenKind::Semicolon);
                Ok(self.node(start.merge(&self.prev_span()), AstKind::Import { path, package: None }))
            }
            "include" => {
                let header = self.parse_string()?;
                self.consume(&TokenKind::Semicolon);
                Ok(self.node(
                    start.merge(&self.prev_span()),
                    AstKind::Directive(Directive::Include(header)),
                ))
            }
            "extern" => {
                if self.check(&TokenKind::Fn) {
                    let decl = self.parse_function(true)?;
                    let span = start.merge(&decl.span);
                    return Ok(self.node(span, AstKind::FuncDecl(FuncRef::Parsed(Box::new(decl)))));
                }
                let (var_name, _) = self.parse_ident()?;
                self.expect(TokenKind::Colon)?;
                let ty = TypeSlot::new(self.parse_type()?);
                self.expect(TokenKind::Semicolon)?;
                let decl = Decl {
                    name: var_name,
                    ty: Some(ty),
                    init: None,
                    constant: false,
                    ext: true,
                    var: None,
                };
                Ok(self.node(start.merge(&self.prev_span()), AstKind::Decl(Box::new(decl))))
            }
            other => Err(Error::Expected(
                format!("directive (#import, #include, #extern), got #{}", other),
                start,
            )),
        }
    }

    fn parse_if(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::If)?.span;
        let cond = self.parse_head_expr()?;
        let then = self.parse_block()?;
        let otherwise = if self.consume(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                // else-if chains get their own block so every branch owns a scope
                let nested = self.parse_if()?;
                let span = nested.span;
                Some(Box::new(self.node(span, AstKind::Block { stmts: vec![nested], scope: None })))
            } else {
                Some(Box::new(self.parse_block()?))
            }
        } else {
            None
        };
        let end = otherwise.as_ref().map(|o| o.span).unwrap_or(then.span);
        Ok(self.node(
            start.merge(&end),
            AstKind::Conditional { cond: Box::new(cond), then: Box::new(then), otherwise },
        ))
    }

    fn parse_for(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::For)?.span;
        let by_ref = self.consume(&TokenKind::And);
        let (item, _) = self.parse_ident()?;
        let index = if self.consume(&TokenKind::Comma) {
            Some(self.parse_ident()?.0)
        } else {
            None
        };
        self.expect(TokenKind::In)?;
        let iterable = self.parse_head_expr()?;
        let body = self.parse_block()?;
        let span = start.merge(&body.span);
        let for_loop = ForLoop {
            item,
            index,
            by_ref,
            iterable,
            body,
            item_var: None,
            index_var: None,
            elem: None,
        };
        Ok(self.node(span, AstKind::For(Box::new(for_loop))))
    }

    /// Expression in a statement head, where `Name {` opens the body
    fn parse_head_expr(&mut self) -> Result<Ast> {
        let saved = std::mem::replace(&mut self.no_struct, true);
        let expr = self.parse_expr();
        self.no_struct = saved;
        expr
    }

    // ==================== Type Parsing ====================

    pub fn parse_type(&mut self) -> Result<TypeExpr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::Dot) && matches!(self.peek_kind(1), TokenKind::Ident(_)) {
                    self.advance();
                    let (member, end) = self.parse_ident()?;
                    return Ok(TypeExpr::Qualified { package: name, name: member, span: token.span.merge(&end) });
                }
                if self.check(&TokenKind::LParen) {
                    let args = self.parse_type_args()?;
                    return Ok(TypeExpr::Params {
                        base: Box::new(TypeExpr::Named(name, token.span)),
                        args,
                        span: token.span.merge(&self.prev_span()),
                    });
                }
                Ok(TypeExpr::Named(name, token.span))
            }
            TokenKind::Dollar => {
                self.advance();
                let (name, end) = self.parse_ident()?;
                Ok(TypeExpr::Poly(name, token.span.merge(&end)))
            }
            TokenKind::And => {
                self.advance();
                let owned = self.consume(&TokenKind::Quote);
                let inner = self.parse_type()?;
                let span = token.span.merge(&inner.span());
                Ok(TypeExpr::Ref { inner: Box::new(inner), owned, span })
            }
            TokenKind::AndAnd => {
                // `&&T` lexes as one token
                self.advance();
                let owned = self.consume(&TokenKind::Quote);
                let inner = self.parse_type()?;
                let span = token.span.merge(&inner.span());
                let ref_ty = TypeExpr::Ref { inner: Box::new(inner), owned, span };
                Ok(TypeExpr::Ref { inner: Box::new(ref_ty), owned: false, span })
            }
            TokenKind::LBracket => {
                self.advance();
                if self.consume(&TokenKind::RBracket) {
                    let owned = self.consume(&TokenKind::Quote);
                    let inner = self.parse_type()?;
                    let span = token.span.merge(&inner.span());
                    return Ok(TypeExpr::Array { inner: Box::new(inner), owned, span });
                }
                let len_token = self.advance();
                let TokenKind::IntLit(length) = len_token.kind else {
                    return Err(Error::Expected("array length".to_string(), len_token.span));
                };
                self.expect(TokenKind::RBracket)?;
                let inner = self.parse_type()?;
                let span = token.span.merge(&inner.span());
                Ok(TypeExpr::StaticArray { inner: Box::new(inner), length, span })
            }
            TokenKind::Fn => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let mut args = Vec::new();
                let mut variadic = false;
                while !self.check(&TokenKind::RParen) && !self.is_at_end() {
                    if self.consume(&TokenKind::DotDotDot) {
                        variadic = true;
                    }
                    args.push(self.parse_type()?);
                    if variadic || !self.consume(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen)?;
                let ret = if self.consume(&TokenKind::Arrow) {
                    Some(Box::new(self.parse_type()?))
                } else {
                    None
                };
                Ok(TypeExpr::Func { args, ret, variadic, span: token.span.merge(&self.prev_span()) })
            }
            TokenKind::Struct => {
                self.advance();
                self.expect(TokenKind::LBrace)?;
                let mut members = Vec::new();
                while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
                    let (name, _) = self.parse_ident()?;
                    self.expect(TokenKind::Colon)?;
                    let ty = self.parse_type()?;
                    members.push((name, ty));
                    if !self.consume(&TokenKind::Semicolon) && !self.consume(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace)?;
                Ok(TypeExpr::Struct { members, span: token.span.merge(&self.prev_span()) })
            }
            _ => Err(Error::ExpectedType { span: token.span }),
        }
    }

    fn parse_type_args(&mut self) -> Result<Vec<TypeExpr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.is_at_end() {
            args.push(self.parse_type()?);
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    // ==================== Expression Parsing (Pratt) ====================

    pub fn parse_expr(&mut self) -> Result<Ast> {
        self.parse_expr_bp(0)
    }

    /// Parse expression with binding power (Pratt parsing)
    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Ast> {
        let mut left = self.parse_unary()?;

        loop {
            let op_token = self.current().clone();
            let Some(bp) = op_token.kind.binary_precedence() else {
                break;
            };

            if bp < min_bp {
                break;
            }

            self.advance();
            let op = Self::token_to_binop(&op_token)?;
            let right = self.parse_expr_bp(bp + 1)?;
            let span = left.span.merge(&right.span);
            left = self.node(span, AstKind::Binop { op, lhs: Box::new(left), rhs: Box::new(right) });
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Ast> {
        let token = self.current().clone();
        let op = match token.kind {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Not => Some(UnOp::Not),
            TokenKind::Tilde => Some(UnOp::BitNot),
            TokenKind::And => Some(UnOp::AddrOf),
            TokenKind::Star => Some(UnOp::Deref),
            _ => None,
        };
        let Some(op) = op else {
            return self.parse_cast();
        };
        self.advance();
        let operand = self.parse_unary()?;
        let span = token.span.merge(&operand.span);
        Ok(self.node(span, AstKind::Unop { op, operand: Box::new(operand) }))
    }

    /// `as` binds tighter than every binary operator
    fn parse_cast(&mut self) -> Result<Ast> {
        let mut expr = self.parse_primary()?;
        while self.consume(&TokenKind::As) {
            let ty = self.parse_type()?;
            let span = expr.span.merge(&ty.span());
            expr = self.node(
                span,
                AstKind::Cast { expr: Box::new(expr), target: TypeSlot::new(ty), implicit: false },
            );
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Ast> {
        let token = self.current().clone();

        let expr = match token.kind {
            TokenKind::IntLit(n) => {
                self.advance();
                self.node(token.span, AstKind::Literal(Literal::Int(n as i128)))
            }
            TokenKind::FloatLit(x) => {
                self.advance();
                self.node(token.span, AstKind::Literal(Literal::Float(x)))
            }
            TokenKind::CharLit(c) => {
                self.advance();
                let lit = self.node(token.span, AstKind::Literal(Literal::Int(c as i128)));
                self.node(
                    token.span,
                    AstKind::Cast {
                        expr: Box::new(lit),
                        target: TypeSlot::new(TypeExpr::Named("u8".to_string(), token.span)),
                        implicit: false,
                    },
                )
            }
            TokenKind::StringLit(s) => {
                self.advance();
                self.node(token.span, AstKind::Literal(Literal::Str(s)))
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                let value = token.kind == TokenKind::True;
                self.node(token.span, AstKind::Literal(Literal::Bool(value)))
            }
            TokenKind::Null => {
                self.advance();
                self.node(token.span, AstKind::Literal(Literal::Null))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if !self.no_struct && self.check(&TokenKind::LBrace) {
                    let target = TypeSlot::new(TypeExpr::Named(name, token.span));
                    self.parse_struct_literal(target, token.span)?
                } else if !self.no_struct && self.check(&TokenKind::LParen) {
                    match self.try_generic_struct_literal(&name, token.span)? {
                        Some(lit) => lit,
                        None => self.node(token.span, AstKind::Ident { name, var: None }),
                    }
                } else {
                    self.node(token.span, AstKind::Ident { name, var: None })
                }
            }
            TokenKind::LParen => {
                self.advance();
                let saved = std::mem::replace(&mut self.no_struct, false);
                let inner = self.parse_expr()?;
                self.no_struct = saved;
                self.expect(TokenKind::RParen)?;
                inner
            }
            TokenKind::LBracket => {
                let array_ty = self.parse_type()?;
                let (elem, length) = match array_ty {
                    TypeExpr::Array { inner, .. } => (*inner, None),
                    TypeExpr::StaticArray { inner, length, .. } => (*inner, Some(length)),
                    _ => return Err(Error::ExpectedExpr { span: token.span }),
                };
                let items = self.parse_brace_items()?;
                let span = token.span.merge(&self.prev_span());
                self.node(
                    span,
                    AstKind::Literal(Literal::Array { elem: TypeSlot::new(elem), length, items }),
                )
            }
            TokenKind::LBrace => {
                let items = self.parse_brace_items()?;
                let span = token.span.merge(&self.prev_span());
                self.node(span, AstKind::Literal(Literal::Compound(items)))
            }
            TokenKind::New => {
                self.advance();
                if self.consume(&TokenKind::LBracket) {
                    let saved = std::mem::replace(&mut self.no_struct, false);
                    let count = self.parse_expr()?;
                    self.no_struct = saved;
                    self.expect(TokenKind::RBracket)?;
                    let elem = self.parse_type()?;
                    let span = token.span.merge(&elem.span());
                    self.node(
                        span,
                        AstKind::New { target: TypeSlot::new(elem), count: Some(Box::new(count)) },
                    )
                } else {
                    let target = self.parse_type()?;
                    let span = token.span.merge(&target.span());
                    self.node(span, AstKind::New { target: TypeSlot::new(target), count: None })
                }
            }
            TokenKind::Typeinfo => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let target = self.parse_type()?;
                self.expect(TokenKind::RParen)?;
                let span = token.span.merge(&self.prev_span());
                self.node(span, AstKind::Typeinfo { target: TypeSlot::new(target) })
            }
            _ => return Err(Error::ExpectedExpr { span: token.span }),
        };

        self.parse_postfix(expr)
    }

    /// `Name(T, U){...}`; falls back to `None` (position restored) when the
    /// parenthesized part is a call rather than type arguments
    fn try_generic_struct_literal(&mut self, name: &str, span: Span) -> Result<Option<Ast>> {
        let saved = self.pos;
        let args = match self.parse_type_args() {
            Ok(args) if self.check(&TokenKind::LBrace) => args,
            _ => {
                self.pos = saved;
                return Ok(None);
            }
        };
        let target = TypeSlot::new(TypeExpr::Params {
            base: Box::new(TypeExpr::Named(name.to_string(), span)),
            args,
            span: span.merge(&self.prev_span()),
        });
        Ok(Some(self.parse_struct_literal(target, span)?))
    }

    /// `{a = 1, b = 2}` or `{1, 2}` after the struct type
    fn parse_struct_literal(&mut self, target: TypeSlot, start: Span) -> Result<Ast> {
        self.expect(TokenKind::LBrace)?;
        let saved = std::mem::replace(&mut self.no_struct, false);
        let mut members = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let name = match (self.current_kind().clone(), self.peek_kind(1)) {
                (TokenKind::Ident(n), TokenKind::Eq) => {
                    self.advance();
                    self.advance();
                    Some(n)
                }
                _ => None,
            };
            members.push((name, self.parse_expr()?));
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        self.no_struct = saved;
        let span = start.merge(&self.prev_span());
        Ok(self.node(span, AstKind::Literal(Literal::Struct { target, members })))
    }

    fn parse_brace_items(&mut self) -> Result<Vec<Ast>> {
        self.expect(TokenKind::LBrace)?;
        let saved = std::mem::replace(&mut self.no_struct, false);
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            items.push(self.parse_expr()?);
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        self.no_struct = saved;
        Ok(items)
    }

    /// Argument list after `(`, with an optional trailing `...spread`
    fn parse_args(&mut self) -> Result<(Vec<Ast>, Option<Ast>)> {
        let saved = std::mem::replace(&mut self.no_struct, false);
        let mut args = Vec::new();
        let mut spread = None;
        while !self.check(&TokenKind::RParen) && !self.is_at_end() {
            if self.consume(&TokenKind::DotDotDot) {
                spread = Some(self.parse_expr()?);
                break;
            }
            args.push(self.parse_expr()?);
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        self.no_struct = saved;
        Ok((args, spread))
    }

    fn parse_postfix(&mut self, mut expr: Ast) -> Result<Ast> {
        loop {
            if self.consume(&TokenKind::LParen) {
                // Function call
                let (args, spread) = self.parse_args()?;
                let span = expr.span.merge(&self.prev_span());
                let call = Call {
                    callee: expr,
                    args,
                    spread,
                    poly: None,
                    varargs: None,
                    variadic: false,
                };
                expr = self.node(span, AstKind::Call(Box::new(call)));
            } else if self.consume(&TokenKind::Dot) {
                let (member, member_span) = self.parse_ident()?;
                if self.consume(&TokenKind::LParen) {
                    // Method call
                    let (args, spread) = self.parse_args()?;
                    let span = expr.span.merge(&self.prev_span());
                    expr = self.node(
                        span,
                        AstKind::Method {
                            receiver: Box::new(expr),
                            name: member,
                            args,
                            spread: spread.map(Box::new),
                        },
                    );
                } else if !self.no_struct && self.check(&TokenKind::LBrace) {
                    // pkg.Type{...}
                    let AstKind::Ident { name: package, .. } = &expr.kind else {
                        return Err(Error::ExpectedExpr { span: member_span });
                    };
                    let target = TypeSlot::new(TypeExpr::Qualified {
                        package: package.clone(),
                        name: member,
                        span: expr.span.merge(&member_span),
                    });
                    let start = expr.span;
                    expr = self.parse_struct_literal(target, start)?;
                } else {
                    // Field access
                    let span = expr.span.merge(&member_span);
                    expr = self.node(span, AstKind::Dot { object: Box::new(expr), member });
                }
            } else if self.consume(&TokenKind::LBracket) {
                let saved = std::mem::replace(&mut self.no_struct, false);
                let start = if self.check(&TokenKind::Colon) {
                    None
                } else {
                    Some(Box::new(self.parse_expr()?))
                };
                if self.consume(&TokenKind::Colon) {
                    let end = if self.check(&TokenKind::RBracket) {
                        None
                    } else {
                        Some(Box::new(self.parse_expr()?))
                    };
                    self.expect(TokenKind::RBracket)?;
                    self.no_struct = saved;
                    let span = expr.span.merge(&self.prev_span());
                    expr = self.node(span, AstKind::Slice { object: Box::new(expr), start, end });
                } else {
                    self.expect(TokenKind::RBracket)?;
                    self.no_struct = saved;
                    let span = expr.span.merge(&self.prev_span());
                    let Some(index) = start else {
                        return Err(Error::ExpectedExpr { span });
                    };
                    expr = self.node(span, AstKind::Index { object: Box::new(expr), index });
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn token_to_binop(token: &Token) -> Result<BinOp> {
        Ok(match token.kind {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Mod,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::Ne => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::AndAnd => BinOp::And,
            TokenKind::OrOr => BinOp::Or,
            TokenKind::And => BinOp::BitAnd,
            TokenKind::Or => BinOp::BitOr,
            TokenKind::Caret => BinOp::BitXor,
            TokenKind::Shl => BinOp::Shl,
            TokenKind::Shr => BinOp::Shr,
            _ => {
                return Err(Error::UnexpectedToken {
                    expected: "binary operator".to_string(),
                    got: token.kind.to_string(),
                    span: token.span,
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Vec<Ast>> {
        let mut ids = AstIdGen::new();
        let program = parse_source(source, 0, &mut ids)?;
        match program.kind {
            AstKind::Block { stmts, .. } => Ok(stmts),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_empty_function() {
        let stmts = parse("fn main() {}").unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(matches!(stmts[0].kind, AstKind::FuncDecl(FuncRef::Parsed(_))));
    }

    #[test]
    fn test_function_with_return() {
        let stmts = parse("fn add(a: int, b: int) -> int { return a + b; }").unwrap();
        let AstKind::FuncDecl(FuncRef::Parsed(f)) = &stmts[0].kind else { panic!() };
        assert_eq!(f.params.len(), 2);
        assert!(f.ret.is_some());
        assert!(!f.is_variadic());
    }

    #[test]
    fn test_declarations() {
        let stmts = parse("x: int = 1 + 2; y := x; Z :: 3; w: string;").unwrap();
        assert_eq!(stmts.len(), 4);
        let AstKind::Decl(d) = &stmts[2].kind else { panic!() };
        assert!(d.constant);
        let AstKind::Decl(d) = &stmts[3].kind else { panic!() };
        assert!(d.init.is_none() && d.ty.is_some());
    }

    #[test]
    fn test_precedence() {
        let stmts = parse("x := 1 + 2 * 3;").unwrap();
        let AstKind::Decl(d) = &stmts[0].kind else { panic!() };
        let Some(init) = &d.init else { panic!() };
        match &init.kind {
            AstKind::Binop { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(rhs.kind, AstKind::Binop { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_generic_struct_literal_vs_call() {
        let stmts = parse("a := Box(int){v = 5}; b := f(x);").unwrap();
        let AstKind::Decl(d) = &stmts[0].kind else { panic!() };
        assert!(matches!(
            d.init.as_ref().map(|i| &i.kind),
            Some(AstKind::Literal(Literal::Struct { .. }))
        ));
        let AstKind::Decl(d) = &stmts[1].kind else { panic!() };
        assert!(matches!(d.init.as_ref().map(|i| &i.kind), Some(AstKind::Call(_))));
    }

    #[test]
    fn test_if_head_is_not_struct_literal() {
        let stmts = parse("fn main() { if x { y = 1; } else if z { y = 2; } }").unwrap();
        let AstKind::FuncDecl(FuncRef::Parsed(f)) = &stmts[0].kind else { panic!() };
        let Some(body) = &f.body else { panic!() };
        let AstKind::Block { stmts, .. } = &body.kind else { panic!() };
        assert!(matches!(stmts[0].kind, AstKind::Conditional { otherwise: Some(_), .. }));
    }

    #[test]
    fn test_types() {
        let stmts = parse("a: &'int; b: []'string; c: [4]u8; d: fn(int, ...any) -> bool; e: &&int;").unwrap();
        let types: Vec<TypeExpr> = stmts
            .iter()
            .map(|s| match &s.kind {
                AstKind::Decl(d) => d.ty.as_ref().map(|t| t.expr.clone()).unwrap(),
                _ => panic!(),
            })
            .collect();
        assert!(matches!(types[0], TypeExpr::Ref { owned: true, .. }));
        assert!(matches!(types[1], TypeExpr::Array { owned: true, .. }));
        assert!(matches!(types[2], TypeExpr::StaticArray { length: 4, .. }));
        assert!(matches!(types[3], TypeExpr::Func { variadic: true, .. }));
        assert!(matches!(&types[4], TypeExpr::Ref { inner, .. } if matches!(**inner, TypeExpr::Ref { .. })));
    }

    #[test]
    fn test_for_and_slices() {
        let stmts = parse("fn f() { for &x, i in arr { s := arr[1:i]; } }").unwrap();
        let AstKind::FuncDecl(FuncRef::Parsed(f)) = &stmts[0].kind else { panic!() };
        let Some(body) = &f.body else { panic!() };
        let AstKind::Block { stmts, .. } = &body.kind else { panic!() };
        let AstKind::For(l) = &stmts[0].kind else { panic!() };
        assert!(l.by_ref);
        assert_eq!(l.index.as_deref(), Some("i"));
    }

    #[test]
    fn test_directives() {
        let stmts = parse("#import \"math\";\n#include \"stdio.h\"\n#extern fn puts(s: string) -> s32;").unwrap();
        assert!(matches!(&stmts[0].kind, AstKind::Import { path, .. } if path == "math"));
        assert!(matches!(&stmts[1].kind, AstKind::Directive(Directive::Include(h)) if h == "stdio.h"));
        assert!(matches!(&stmts[2].kind, AstKind::FuncDecl(FuncRef::Parsed(f)) if f.ext && f.body.is_none()));
    }

    #[test]
    fn test_compound_assignment_and_method() {
        let stmts = parse("x += 2; p.len(1, ...rest);").unwrap();
        assert!(matches!(stmts[0].kind, AstKind::Assign { op: Some(BinOp::Add), .. }));
        assert!(matches!(&stmts[1].kind, AstKind::Method { name, spread: Some(_), .. } if name == "len"));
    }

    #[test]
    fn test_missing_semicolon() {
        let err = parse("x := 1").unwrap_err();
        assert!(matches!(err, Error::UnexpectedToken { .. }));
    }
}
