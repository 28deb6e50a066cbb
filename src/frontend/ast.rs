//! Abstract Syntax Tree definitions for Verse
//!
//! Every node carries a unique [`AstId`], its source span and, once the
//! semantic pass has visited it, the resolved type in `ty`. Semantic analysis
//! consumes nodes by value and returns the (possibly rewritten) replacement.

use crate::middle::{FnId, PackageId, PolymorphId, ScopeId, VarId};
use crate::types::TypeId;
use crate::utils::Span;

/// Unique identity of an AST node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AstId(pub u32);

/// Monotonic AST id allocator
#[derive(Debug, Default)]
pub struct AstIdGen {
    next: u32,
}

impl AstIdGen {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn fresh(&mut self) -> AstId {
        let id = AstId(self.next);
        self.next += 1;
        id
    }
}

/// An AST node
#[derive(Debug, Clone)]
pub struct Ast {
    pub id: AstId,
    pub span: Span,
    /// Resolved type, filled in by the semantic pass
    pub ty: Option<TypeId>,
    pub kind: AstKind,
}

/// Node kinds
#[derive(Debug, Clone)]
pub enum AstKind {
    Literal(Literal),
    Ident {
        name: String,
        var: Option<VarId>,
    },
    /// `object.member`
    Dot {
        object: Box<Ast>,
        member: String,
    },
    Binop {
        op: BinOp,
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },
    Unop {
        op: UnOp,
        operand: Box<Ast>,
    },
    /// `lhs = rhs` or `lhs op= rhs`; `init` marks a global initializer split off its declaration
    Assign {
        op: Option<BinOp>,
        lhs: Box<Ast>,
        rhs: Box<Ast>,
        init: bool,
    },
    Call(Box<Call>),
    /// `receiver.name(args)`, rewritten into a `Call` during semantics
    Method {
        receiver: Box<Ast>,
        name: String,
        args: Vec<Ast>,
        spread: Option<Box<Ast>>,
    },
    Index {
        object: Box<Ast>,
        index: Box<Ast>,
    },
    Slice {
        object: Box<Ast>,
        start: Option<Box<Ast>>,
        end: Option<Box<Ast>>,
    },
    Decl(Box<Decl>),
    FuncDecl(FuncRef),
    Conditional {
        cond: Box<Ast>,
        then: Box<Ast>,
        otherwise: Option<Box<Ast>>,
    },
    While {
        cond: Box<Ast>,
        body: Box<Ast>,
    },
    For(Box<ForLoop>),
    Return {
        value: Option<Box<Ast>>,
    },
    Break,
    Continue,
    /// `expr as T`; `implicit` casts are inserted by coercion
    Cast {
        expr: Box<Ast>,
        target: TypeSlot,
        implicit: bool,
    },
    /// `new T` or `new [count]T`
    New {
        target: TypeSlot,
        count: Option<Box<Ast>>,
    },
    Defer {
        call: Box<Ast>,
    },
    Block {
        stmts: Vec<Ast>,
        scope: Option<ScopeId>,
    },
    /// A bare `{ ... }` statement
    AnonScope {
        body: Box<Ast>,
    },
    Use {
        target: Box<Ast>,
    },
    TypeDecl {
        name: String,
        params: Vec<String>,
        target: TypeSlot,
    },
    EnumDecl(Box<EnumDecl>),
    Directive(Directive),
    Typeinfo {
        target: TypeSlot,
    },
    Import {
        path: String,
        package: Option<PackageId>,
    },
    Impl {
        target: TypeSlot,
        methods: Vec<Ast>,
    },
}

/// Literal payloads
#[derive(Debug, Clone)]
pub enum Literal {
    Int(i128),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
    /// A member of an enum type
    Enum { ty: TypeId, index: usize },
    /// `Name{...}` / `Name(T){...}`; members are all named or all positional
    Struct {
        target: TypeSlot,
        members: Vec<(Option<String>, Ast)>,
    },
    /// `[]T{...}` (length `None`) or `[N]T{...}`
    Array {
        elem: TypeSlot,
        length: Option<u64>,
        items: Vec<Ast>,
    },
    /// Untyped `{...}`, given a struct or array type by coercion
    Compound(Vec<Ast>),
}

/// Function call payload
#[derive(Debug, Clone)]
pub struct Call {
    pub callee: Ast,
    pub args: Vec<Ast>,
    /// Trailing `...expr`
    pub spread: Option<Ast>,
    /// Instantiation selected for a polymorphic callee
    pub poly: Option<PolymorphId>,
    /// Temp collecting the trailing variadic arguments
    pub varargs: Option<VarId>,
    /// Set when the callee's type is a variadic function
    pub variadic: bool,
}

/// Variable declaration payload
#[derive(Debug, Clone)]
pub struct Decl {
    pub name: String,
    pub ty: Option<TypeSlot>,
    pub init: Option<Ast>,
    /// `NAME :: expr`
    pub constant: bool,
    /// `#extern name: T`
    pub ext: bool,
    pub var: Option<VarId>,
}

/// `for [&]item[, index] in iterable body`
#[derive(Debug, Clone)]
pub struct ForLoop {
    pub item: String,
    pub index: Option<String>,
    pub by_ref: bool,
    pub iterable: Ast,
    pub body: Ast,
    pub item_var: Option<VarId>,
    pub index_var: Option<VarId>,
    /// Element type of the iterated sequence
    pub elem: Option<TypeId>,
}

/// Enum declaration payload
#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: String,
    pub inner: Option<TypeSlot>,
    pub members: Vec<(String, Option<Ast>)>,
    pub ty: Option<TypeId>,
}

/// Compiler directives that survive into the AST
#[derive(Debug, Clone)]
pub enum Directive {
    /// `#include "header.h"`
    Include(String),
}

/// A function declaration, either still owned by the tree or moved into the context
#[derive(Debug, Clone)]
pub enum FuncRef {
    Parsed(Box<FnDecl>),
    Registered(FnId),
}

/// Function declaration
#[derive(Debug, Clone)]
pub struct FnDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<TypeSlot>,
    /// `None` for `#extern` functions
    pub body: Option<Ast>,
    pub ext: bool,
    pub span: Span,
    /// Binding of the function name
    pub var: Option<VarId>,
    pub scope: Option<ScopeId>,
    pub ty: Option<TypeId>,
    /// Signature mentions a `$T` parameter
    pub polymorphic: bool,
    pub polymorphs: Vec<PolymorphId>,
    pub param_vars: Vec<VarId>,
    /// Set for functions declared inside an `impl` block
    pub method_of: Option<TypeId>,
}

impl FnDecl {
    pub fn is_variadic(&self) -> bool {
        self.params.last().map_or(false, |p| p.variadic)
    }
}

/// Function parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeSlot,
    pub variadic: bool,
    pub span: Span,
}

/// A type expression together with the type it was converted to
#[derive(Debug, Clone)]
pub struct TypeSlot {
    pub expr: TypeExpr,
    pub ty: Option<TypeId>,
}

impl TypeSlot {
    pub fn new(expr: TypeExpr) -> Self {
        Self { expr, ty: None }
    }

    /// A slot whose type is already known (synthesized nodes)
    pub fn resolved(ty: TypeId, span: Span) -> Self {
        Self {
            expr: TypeExpr::Resolved(ty, span),
            ty: Some(ty),
        }
    }
}

/// Syntactic type expression
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// `int`, `Point`
    Named(String, Span),
    /// `pkg.Type`
    Qualified {
        package: String,
        name: String,
        span: Span,
    },
    /// `$T`
    Poly(String, Span),
    /// `&T` / `&'T`
    Ref {
        inner: Box<TypeExpr>,
        owned: bool,
        span: Span,
    },
    /// `[]T` / `[]'T`
    Array {
        inner: Box<TypeExpr>,
        owned: bool,
        span: Span,
    },
    /// `[N]T`
    StaticArray {
        inner: Box<TypeExpr>,
        length: u64,
        span: Span,
    },
    /// `fn(A, B) -> R`
    Func {
        args: Vec<TypeExpr>,
        ret: Option<Box<TypeExpr>>,
        variadic: bool,
        span: Span,
    },
    /// `struct { a: A; b: B; }`
    Struct {
        members: Vec<(String, TypeExpr)>,
        span: Span,
    },
    /// `Box(int)`
    Params {
        base: Box<TypeExpr>,
        args: Vec<TypeExpr>,
        span: Span,
    },
    /// Already-converted type, used by nodes the compiler synthesizes
    Resolved(TypeId, Span),
}

impl TypeExpr {
    pub fn span(&self) -> Span {
        match self {
            TypeExpr::Named(_, s) | TypeExpr::Poly(_, s) | TypeExpr::Resolved(_, s) => *s,
            TypeExpr::Qualified { span, .. }
            | TypeExpr::Ref { span, .. }
            | TypeExpr::Array { span, .. }
            | TypeExpr::StaticArray { span, .. }
            | TypeExpr::Func { span, .. }
            | TypeExpr::Struct { span, .. }
            | TypeExpr::Params { span, .. } => *span,
        }
    }

    /// Whether a `$T` appears anywhere inside
    pub fn has_poly(&self) -> bool {
        match self {
            TypeExpr::Poly(..) => true,
            TypeExpr::Named(..) | TypeExpr::Qualified { .. } | TypeExpr::Resolved(..) => false,
            TypeExpr::Ref { inner, .. }
            | TypeExpr::Array { inner, .. }
            | TypeExpr::StaticArray { inner, .. } => inner.has_poly(),
            TypeExpr::Func { args, ret, .. } => {
                args.iter().any(TypeExpr::has_poly) || ret.as_ref().map_or(false, |r| r.has_poly())
            }
            TypeExpr::Struct { members, .. } => members.iter().any(|(_, t)| t.has_poly()),
            TypeExpr::Params { base, args, .. } => {
                base.has_poly() || args.iter().any(TypeExpr::has_poly)
            }
        }
    }
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr | BinOp::Mod
        )
    }

    /// C spelling (also used in diagnostics)
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Negation (-)
    Neg,
    /// Logical not (!)
    Not,
    /// Bitwise not (~)
    BitNot,
    /// Address-of (&)
    AddrOf,
    /// Dereference (*)
    Deref,
}

impl UnOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "!",
            UnOp::BitNot => "~",
            UnOp::AddrOf => "&",
            UnOp::Deref => "*",
        }
    }
}

impl Ast {
    pub fn new(id: AstId, span: Span, kind: AstKind) -> Self {
        Self { id, span, ty: None, kind }
    }

    /// Shorthand for a typed node the compiler synthesizes
    pub fn typed(id: AstId, span: Span, ty: TypeId, kind: AstKind) -> Self {
        Self { id, span, ty: Some(ty), kind }
    }

    /// Identifiers, member accesses, index expressions and dereferences
    pub fn is_lvalue(&self) -> bool {
        match &self.kind {
            AstKind::Ident { .. } | AstKind::Dot { .. } | AstKind::Index { .. } => true,
            AstKind::Unop { op: UnOp::Deref, .. } => true,
            _ => false,
        }
    }

    /// Scalar literals that participate in constant folding
    pub fn is_const_literal(&self) -> bool {
        matches!(
            &self.kind,
            AstKind::Literal(
                Literal::Int(_)
                    | Literal::Float(_)
                    | Literal::Bool(_)
                    | Literal::Str(_)
                    | Literal::Enum { .. }
                    | Literal::Null
            )
        )
    }

    pub fn is_new(&self) -> bool {
        matches!(self.kind, AstKind::New { .. })
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, AstKind::Call(_) | AstKind::Method { .. })
    }

    /// Deep copy with fresh ids and every semantic annotation cleared.
    ///
    /// Polymorph instantiation clones a generic function's pristine body with
    /// this, then re-runs both passes on the copy in the instantiation's scope.
    pub fn fresh_clone(&self, ids: &mut AstIdGen) -> Ast {
        let kind = match &self.kind {
            AstKind::Literal(lit) => AstKind::Literal(match lit {
                Literal::Struct { target, members } => Literal::Struct {
                    target: target.fresh(),
                    members: members
                        .iter()
                        .map(|(n, a)| (n.clone(), a.fresh_clone(ids)))
                        .collect(),
                },
                Literal::Array { elem, length, items } => Literal::Array {
                    elem: elem.fresh(),
                    length: *length,
                    items: fresh_all(items, ids),
                },
                Literal::Compound(items) => Literal::Compound(fresh_all(items, ids)),
                other => other.clone(),
            }),
            AstKind::Ident { name, .. } => AstKind::Ident { name: name.clone(), var: None },
            AstKind::Dot { object, member } => AstKind::Dot {
                object: fresh_box(object, ids),
                member: member.clone(),
            },
            AstKind::Binop { op, lhs, rhs } => AstKind::Binop {
                op: *op,
                lhs: fresh_box(lhs, ids),
                rhs: fresh_box(rhs, ids),
            },
            AstKind::Unop { op, operand } => AstKind::Unop {
                op: *op,
                operand: fresh_box(operand, ids),
            },
            AstKind::Assign { op, lhs, rhs, init } => AstKind::Assign {
                op: *op,
                lhs: fresh_box(lhs, ids),
                rhs: fresh_box(rhs, ids),
                init: *init,
            },
            AstKind::Call(call) => AstKind::Call(Box::new(Call {
                callee: call.callee.fresh_clone(ids),
                args: fresh_all(&call.args, ids),
                spread: call.spread.as_ref().map(|s| s.fresh_clone(ids)),
                poly: None,
                varargs: None,
                variadic: false,
            })),
            AstKind::Method { receiver, name, args, spread } => AstKind::Method {
                receiver: fresh_box(receiver, ids),
                name: name.clone(),
                args: fresh_all(args, ids),
                spread: spread.as_ref().map(|s| fresh_box(s, ids)),
            },
            AstKind::Index { object, index } => AstKind::Index {
                object: fresh_box(object, ids),
                index: fresh_box(index, ids),
            },
            AstKind::Slice { object, start, end } => AstKind::Slice {
                object: fresh_box(object, ids),
                start: start.as_ref().map(|s| fresh_box(s, ids)),
                end: end.as_ref().map(|e| fresh_box(e, ids)),
            },
            AstKind::Decl(decl) => AstKind::Decl(Box::new(Decl {
                name: decl.name.clone(),
                ty: decl.ty.as_ref().map(TypeSlot::fresh),
                init: decl.init.as_ref().map(|i| i.fresh_clone(ids)),
                constant: decl.constant,
                ext: decl.ext,
                var: None,
            })),
            AstKind::FuncDecl(FuncRef::Parsed(f)) => AstKind::FuncDecl(FuncRef::Parsed(Box::new(FnDecl {
                name: f.name.clone(),
                params: f
                    .params
                    .iter()
                    .map(|p| Param {
                        name: p.name.clone(),
                        ty: p.ty.fresh(),
                        variadic: p.variadic,
                        span: p.span,
                    })
                    .collect(),
                ret: f.ret.as_ref().map(TypeSlot::fresh),
                body: f.body.as_ref().map(|b| b.fresh_clone(ids)),
                ext: f.ext,
                span: f.span,
                var: None,
                scope: None,
                ty: None,
                polymorphic: false,
                polymorphs: Vec::new(),
                param_vars: Vec::new(),
                method_of: None,
            }))),
            // Registered declarations only exist in trees that already went through the first pass
            AstKind::FuncDecl(FuncRef::Registered(id)) => AstKind::FuncDecl(FuncRef::Registered(*id)),
            AstKind::Conditional { cond, then, otherwise } => AstKind::Conditional {
                cond: fresh_box(cond, ids),
                then: fresh_box(then, ids),
                otherwise: otherwise.as_ref().map(|o| fresh_box(o, ids)),
            },
            AstKind::While { cond, body } => AstKind::While {
                cond: fresh_box(cond, ids),
                body: fresh_box(body, ids),
            },
            AstKind::For(f) => AstKind::For(Box::new(ForLoop {
                item: f.item.clone(),
                index: f.index.clone(),
                by_ref: f.by_ref,
                iterable: f.iterable.fresh_clone(ids),
                body: f.body.fresh_clone(ids),
                item_var: None,
                index_var: None,
                elem: None,
            })),
            AstKind::Return { value } => AstKind::Return {
                value: value.as_ref().map(|v| fresh_box(v, ids)),
            },
            AstKind::Break => AstKind::Break,
            AstKind::Continue => AstKind::Continue,
            AstKind::Cast { expr, target, implicit } => AstKind::Cast {
                expr: fresh_box(expr, ids),
                target: target.fresh(),
                implicit: *implicit,
            },
            AstKind::New { target, count } => AstKind::New {
                target: target.fresh(),
                count: count.as_ref().map(|c| fresh_box(c, ids)),
            },
            AstKind::Defer { call } => AstKind::Defer { call: fresh_box(call, ids) },
            AstKind::Block { stmts, .. } => AstKind::Block {
                stmts: fresh_all(stmts, ids),
                scope: None,
            },
            AstKind::AnonScope { body } => AstKind::AnonScope { body: fresh_box(body, ids) },
            AstKind::Use { target } => AstKind::Use { target: fresh_box(target, ids) },
            AstKind::TypeDecl { name, params, target } => AstKind::TypeDecl {
                name: name.clone(),
                params: params.clone(),
                target: target.fresh(),
            },
            AstKind::EnumDecl(e) => AstKind::EnumDecl(Box::new(EnumDecl {
                name: e.name.clone(),
                inner: e.inner.as_ref().map(TypeSlot::fresh),
                members: e
                    .members
                    .iter()
                    .map(|(n, v)| (n.clone(), v.as_ref().map(|v| v.fresh_clone(ids))))
                    .collect(),
                ty: None,
            })),
            AstKind::Directive(d) => AstKind::Directive(d.clone()),
            AstKind::Typeinfo { target } => AstKind::Typeinfo { target: target.fresh() },
            AstKind::Import { path, .. } => AstKind::Import { path: path.clone(), package: None },
            AstKind::Impl { target, methods } => AstKind::Impl {
                target: target.fresh(),
                methods: fresh_all(methods, ids),
            },
        };
        Ast::new(ids.fresh(), self.span, kind)
    }
}

impl Ast {
    /// Apply `f` to every direct child expression or statement
    pub fn for_each_child_mut(&mut self, f: &mut dyn FnMut(&mut Ast)) {
        match &mut self.kind {
            AstKind::Literal(Literal::Struct { members, .. }) => members.iter_mut().for_each(|(_, a)| f(a)),
            AstKind::Literal(Literal::Array { items, .. }) | AstKind::Literal(Literal::Compound(items)) => {
                items.iter_mut().for_each(|a| f(a))
            }
            AstKind::Literal(_)
            | AstKind::Ident { .. }
            | AstKind::Break
            | AstKind::Continue
            | AstKind::TypeDecl { .. }
            | AstKind::Directive(_)
            | AstKind::Typeinfo { .. }
            | AstKind::Import { .. }
            | AstKind::FuncDecl(_) => {}
            AstKind::Dot { object, .. } => f(object),
            AstKind::Binop { lhs, rhs, .. } | AstKind::Assign { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            AstKind::Unop { operand, .. } => f(operand),
            AstKind::Call(call) => {
                f(&mut call.callee);
                call.args.iter_mut().for_each(|a| f(a));
                if let Some(s) = &mut call.spread {
                    f(s);
                }
            }
            AstKind::Method { receiver, args, spread, .. } => {
                f(receiver);
                args.iter_mut().for_each(|a| f(a));
                if let Some(s) = spread {
                    f(s);
                }
            }
            AstKind::Index { object, index } => {
                f(object);
                f(index);
            }
            AstKind::Slice { object, start, end } => {
                f(object);
                if let Some(s) = start {
                    f(s);
                }
                if let Some(e) = end {
                    f(e);
                }
            }
            AstKind::Decl(decl) => {
                if let Some(init) = &mut decl.init {
                    f(init);
                }
            }
            AstKind::Conditional { cond, then, otherwise } => {
                f(cond);
                f(then);
                if let Some(o) = otherwise {
                    f(o);
                }
            }
            AstKind::While { cond, body } => {
                f(cond);
                f(body);
            }
            AstKind::For(for_loop) => {
                f(&mut for_loop.iterable);
                f(&mut for_loop.body);
            }
            AstKind::Return { value } => {
                if let Some(v) = value {
                    f(v);
                }
            }
            AstKind::Cast { expr, .. } => f(expr),
            AstKind::New { count, .. } => {
                if let Some(c) = count {
                    f(c);
                }
            }
            AstKind::Defer { call } => f(call),
            AstKind::Block { stmts, .. } => stmts.iter_mut().for_each(|a| f(a)),
            AstKind::AnonScope { body } => f(body),
            AstKind::Use { target } => f(target),
            AstKind::EnumDecl(e) => e.members.iter_mut().filter_map(|(_, v)| v.as_mut()).for_each(|a| f(a)),
            AstKind::Impl { methods, .. } => methods.iter_mut().for_each(|a| f(a)),
        }
    }

    /// Give this node and all of its descendants fresh ids, keeping annotations.
    ///
    /// Used when an already-analyzed expression is substituted at another
    /// site, so temps keyed by node id never collide.
    pub fn renumber(&mut self, ids: &mut AstIdGen) {
        self.id = ids.fresh();
        self.for_each_child_mut(&mut |child| child.renumber(ids));
    }
}

impl TypeSlot {
    /// Same expression, conversion cleared
    pub fn fresh(&self) -> TypeSlot {
        match &self.expr {
            TypeExpr::Resolved(ty, _) => TypeSlot { expr: self.expr.clone(), ty: Some(*ty) },
            _ => TypeSlot::new(self.expr.clone()),
        }
    }
}

fn fresh_box(ast: &Ast, ids: &mut AstIdGen) -> Box<Ast> {
    Box::new(ast.fresh_clone(ids))
}

fn fresh_all(asts: &[Ast], ids: &mut AstIdGen) -> Vec<Ast> {
    asts.iter().map(|a| a.fresh_clone(ids)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(ids: &mut AstIdGen, kind: AstKind) -> Ast {
        Ast::new(ids.fresh(), Span::dummy(), kind)
    }

    fn ident(ids: &mut AstIdGen, name: &str) -> Ast {
        node(ids, AstKind::Ident { name: name.to_string(), var: None })
    }

    #[test]
    fn test_fresh_clone_renumbers_and_resets() {
        let mut ids = AstIdGen::new();
        let lhs = ident(&mut ids, "x");
        let rhs = node(&mut ids, AstKind::Literal(Literal::Int(2)));
        let mut sum = node(
            &mut ids,
            AstKind::Binop { op: BinOp::Add, lhs: Box::new(lhs), rhs: Box::new(rhs) },
        );
        sum.ty = Some(TypeId(4));
        if let AstKind::Binop { lhs, .. } = &mut sum.kind {
            if let AstKind::Ident { var, .. } = &mut lhs.kind {
                *var = Some(VarId(7));
            }
        }

        let copy = sum.fresh_clone(&mut ids);
        assert!(copy.ty.is_none());
        assert_ne!(copy.id, sum.id);
        match &copy.kind {
            AstKind::Binop { op, lhs, rhs } => {
                assert_eq!(*op, BinOp::Add);
                assert!(matches!(&lhs.kind, AstKind::Ident { name, var: None } if name == "x"));
                assert!(matches!(rhs.kind, AstKind::Literal(Literal::Int(2))));
                assert!(lhs.id.0 >= 3 && rhs.id.0 >= 3);
            }
            other => panic!("unexpected clone shape: {:?}", other),
        }
    }

    #[test]
    fn test_fresh_clone_preserves_structure_of_blocks() {
        let mut ids = AstIdGen::new();
        let ret_val = ident(&mut ids, "x");
        let ret = node(&mut ids, AstKind::Return { value: Some(Box::new(ret_val)) });
        let block = node(&mut ids, AstKind::Block { stmts: vec![ret], scope: Some(ScopeId(3)) });

        let copy = block.fresh_clone(&mut ids);
        match &copy.kind {
            AstKind::Block { stmts, scope } => {
                assert!(scope.is_none());
                assert_eq!(stmts.len(), 1);
                assert!(matches!(stmts[0].kind, AstKind::Return { value: Some(_) }));
            }
            other => panic!("unexpected clone shape: {:?}", other),
        }
    }

    #[test]
    fn test_renumber_keeps_annotations() {
        let mut ids = AstIdGen::new();
        let mut obj = ident(&mut ids, "p");
        obj.ty = Some(TypeId(20));
        if let AstKind::Ident { var, .. } = &mut obj.kind {
            *var = Some(VarId(3));
        }
        let mut dot = node(&mut ids, AstKind::Dot { object: Box::new(obj), member: "x".to_string() });
        let before = dot.id;
        dot.renumber(&mut ids);
        assert_ne!(dot.id, before);
        let AstKind::Dot { object, .. } = &dot.kind else { panic!() };
        assert_eq!(object.ty, Some(TypeId(20)));
        assert!(matches!(object.kind, AstKind::Ident { var: Some(VarId(3)), .. }));
        assert!(object.id.0 >= 2);
    }

    #[test]
    fn test_lvalues() {
        let mut ids = AstIdGen::new();
        let x = ident(&mut ids, "x");
        assert!(x.is_lvalue());
        let deref = node(&mut ids, AstKind::Unop { op: UnOp::Deref, operand: Box::new(x.clone()) });
        assert!(deref.is_lvalue());
        let neg = node(&mut ids, AstKind::Unop { op: UnOp::Neg, operand: Box::new(x) });
        assert!(!neg.is_lvalue());
    }

    #[test]
    fn test_type_expr_poly_detection() {
        let t = TypeExpr::Array {
            inner: Box::new(TypeExpr::Poly("T".to_string(), Span::dummy())),
            owned: false,
            span: Span::dummy(),
        };
        assert!(t.has_poly());
        assert!(!TypeExpr::Named("int".to_string(), Span::dummy()).has_poly());
    }
}
