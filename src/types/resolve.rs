//! Type resolution and type algebra
//!
//! Alias/polymorph resolution, structural equality (`check_type`), explicit
//! castability (`can_cast`), generic struct reification and the used-types
//! registry. All of these are context operations because resolution needs the
//! scope tree.

use log::debug;

use crate::middle::{CompilationContext, Reification, ScopeId};
use crate::types::type_system::*;
use crate::utils::{Error, Result, Span};

/// Recursion cap for dynamic-ness and `$T` queries on malformed (by-value recursive) structs
const MAX_DEPTH: usize = 64;

impl CompilationContext {
    pub fn new_type(&mut self, kind: TypeKind) -> TypeId {
        self.types.push(kind);
        TypeId(self.types.len() - 1)
    }

    pub fn kind(&self, ty: TypeId) -> &TypeKind {
        &self.types[ty.0]
    }

    pub fn ref_of(&mut self, inner: TypeId, owned: bool) -> TypeId {
        self.new_type(TypeKind::Ref { inner, owned })
    }

    pub fn array_of(&mut self, inner: TypeId, owned: bool) -> TypeId {
        self.new_type(TypeKind::Array { inner, owned })
    }

    pub fn static_array_of(&mut self, inner: TypeId, length: u64) -> TypeId {
        self.new_type(TypeKind::StaticArray { inner, length })
    }

    // ==================== Resolution ====================

    /// Binding of `name` in the polymorph context active at `scope`
    fn polymorph_binding(&self, scope: ScopeId, name: &str) -> Option<TypeId> {
        let pid = self.active_polymorph(scope)?;
        self.polymorph(pid).def(name)
    }

    /// Substitute bound `$T` parameters (and aliases they shadow) until the
    /// first unresolvable link
    pub fn resolve_polymorph(&self, ty: TypeId) -> TypeId {
        let mut current = ty;
        for _ in 0..=self.types.len() {
            let next = match self.kind(current) {
                TypeKind::Polydef { name, scope } | TypeKind::Alias { name, scope } => {
                    self.polymorph_binding(*scope, name)
                }
                _ => None,
            };
            match next {
                Some(t) if t != current => current = t,
                _ => return current,
            }
        }
        current
    }

    /// Follow `Alias` and `External` chains to a non-alias type.
    ///
    /// Unknown names are reported at `span`; a chain that revisits an alias
    /// is reported as cyclic.
    pub fn resolve_alias(&self, ty: TypeId, span: Span) -> Result<TypeId> {
        let mut current = self.resolve_polymorph(ty);
        let mut seen: Vec<TypeId> = Vec::new();
        loop {
            let next = match self.kind(current) {
                TypeKind::Alias { name, scope } => {
                    if seen.contains(&current) {
                        return Err(Error::CyclicAlias { name: name.clone(), span });
                    }
                    match self.lookup_type(*scope, name) {
                        Some(t) => t,
                        None => return Err(Error::UndefinedType { name: name.clone(), span }),
                    }
                }
                TypeKind::External { package, name, scope } => {
                    if seen.contains(&current) {
                        return Err(Error::CyclicAlias { name: format!("{}.{}", package, name), span });
                    }
                    self.lookup_external(*scope, package, name, span)?
                }
                _ => return Ok(current),
            };
            seen.push(current);
            current = self.resolve_polymorph(next);
        }
    }

    fn lookup_external(&self, scope: ScopeId, package: &str, name: &str, span: Span) -> Result<TypeId> {
        let qualified = || format!("{}.{}", package, name);
        let pkg = self
            .lookup_var(scope, package, span)?
            .and_then(|v| self.var(v).package())
            .ok_or_else(|| Error::UndefinedType { name: qualified(), span })?;
        if name.starts_with('_') {
            return Err(Error::UndefinedType { name: qualified(), span });
        }
        self.lookup_local_type(self.package(pkg).scope, name)
            .ok_or_else(|| Error::UndefinedType { name: qualified(), span })
    }

    /// Resolve aliases and reify generic struct applications
    pub fn resolve(&mut self, ty: TypeId, span: Span) -> Result<TypeId> {
        let resolved = self.resolve_alias(ty, span)?;
        if matches!(self.kind(resolved), TypeKind::Params { .. }) {
            return self.reify_struct(resolved, span);
        }
        Ok(resolved)
    }

    /// Resolution for passes that can no longer create types; every
    /// `Params` must already have been reified
    pub fn resolve_existing(&self, ty: TypeId) -> Result<TypeId> {
        let resolved = self.resolve_alias(ty, Span::dummy())?;
        if matches!(self.kind(resolved), TypeKind::Params { .. }) {
            return self
                .params_cache
                .get(&resolved)
                .copied()
                .ok_or_else(|| Error::internal(format!("unreified type {}", self.type_name(resolved))));
        }
        Ok(resolved)
    }

    /// Shape of the resolved type; unresolvable types report their own shape
    pub fn resolved_kind(&self, ty: TypeId) -> &TypeKind {
        self.kind(self.resolve_existing(ty).unwrap_or(ty))
    }

    // ==================== Generic Structs ====================

    /// Concretize `Params(base, args)` into a struct, reusing an earlier
    /// reification with equal arguments
    pub fn reify_struct(&mut self, params_ty: TypeId, span: Span) -> Result<TypeId> {
        if let Some(done) = self.params_cache.get(&params_ty) {
            return Ok(*done);
        }
        let TypeKind::Params { base, args } = self.kind(params_ty).clone() else {
            return Err(Error::internal("reify_struct on a non-Params type"));
        };
        let base = self.resolve(base, span)?;
        let template = match self.kind(base) {
            TypeKind::Struct(s) if s.generic => s.clone(),
            _ => {
                return Err(Error::semantic(
                    format!("{} is not a generic struct", self.type_name(base)),
                    span,
                ))
            }
        };
        let name = template.name.clone().unwrap_or_else(|| "struct".to_string());
        if template.params.len() != args.len() {
            return Err(Error::GenericArity {
                name,
                expected: template.params.len(),
                got: args.len(),
                span,
            });
        }
        let mut concrete = Vec::with_capacity(args.len());
        for arg in &args {
            concrete.push(self.resolve(*arg, span)?);
        }

        let earlier: Vec<Reification> = self
            .reified
            .iter()
            .filter(|r| r.base == base)
            .cloned()
            .collect();
        for r in earlier {
            let same = r.args.len() == concrete.len()
                && r.args.iter().zip(&concrete).all(|(a, b)| self.check_type(*a, *b));
            if same {
                self.params_cache.insert(params_ty, r.result);
                return Ok(r.result);
            }
        }

        let members = template
            .members
            .iter()
            .map(|(n, t)| (n.clone(), self.replace_type(*t, &template.params, &concrete)))
            .collect();
        let result = self.new_type(TypeKind::Struct(StructType {
            name: template.name.clone(),
            members,
            generic: false,
            params: Vec::new(),
            generic_base: Some((base, concrete.clone())),
        }));
        self.reified.push(Reification { base, args: concrete, result });
        self.params_cache.insert(params_ty, result);
        debug!("reified {} as type {}", self.type_name(result), result.0);
        Ok(result)
    }

    /// Copy of `ty` with every alias naming one of `params` replaced by the
    /// matching argument
    pub fn replace_type(&mut self, ty: TypeId, params: &[String], args: &[TypeId]) -> TypeId {
        match self.kind(ty).clone() {
            TypeKind::Alias { name, .. } => match params.iter().position(|p| *p == name) {
                Some(i) => args[i],
                None => ty,
            },
            TypeKind::Ref { inner, owned } => {
                let new_inner = self.replace_type(inner, params, args);
                if new_inner == inner {
                    ty
                } else {
                    self.new_type(TypeKind::Ref { inner: new_inner, owned })
                }
            }
            TypeKind::Array { inner, owned } => {
                let new_inner = self.replace_type(inner, params, args);
                if new_inner == inner {
                    ty
                } else {
                    self.new_type(TypeKind::Array { inner: new_inner, owned })
                }
            }
            TypeKind::StaticArray { inner, length } => {
                let new_inner = self.replace_type(inner, params, args);
                if new_inner == inner {
                    ty
                } else {
                    self.new_type(TypeKind::StaticArray { inner: new_inner, length })
                }
            }
            TypeKind::Func { args: fargs, ret, variadic } => {
                let new_args: Vec<TypeId> = fargs.iter().map(|a| self.replace_type(*a, params, args)).collect();
                let new_ret = self.replace_type(ret, params, args);
                if new_args == fargs && new_ret == ret {
                    ty
                } else {
                    self.new_type(TypeKind::Func { args: new_args, ret: new_ret, variadic })
                }
            }
            TypeKind::Params { base, args: pargs } => {
                let new_args: Vec<TypeId> = pargs.iter().map(|a| self.replace_type(*a, params, args)).collect();
                if new_args == pargs {
                    ty
                } else {
                    self.new_type(TypeKind::Params { base, args: new_args })
                }
            }
            TypeKind::Struct(s) if s.name.is_none() => {
                let members: Vec<(String, TypeId)> = s
                    .members
                    .iter()
                    .map(|(n, t)| (n.clone(), self.replace_type(*t, params, args)))
                    .collect();
                if members == s.members {
                    ty
                } else {
                    self.new_type(TypeKind::Struct(StructType { members, ..s }))
                }
            }
            _ => ty,
        }
    }

    // ==================== Equality ====================

    /// Structural equality after resolution. Recursive structs compare
    /// co-inductively: a pair already under comparison counts as equal.
    pub fn check_type(&mut self, a: TypeId, b: TypeId) -> bool {
        let mut assumed = Vec::new();
        self.check_type_inner(a, b, &mut assumed)
    }

    fn check_type_inner(&mut self, a: TypeId, b: TypeId, assumed: &mut Vec<(TypeId, TypeId)>) -> bool {
        if a == b {
            return true;
        }
        let ra = self.resolve(a, Span::dummy()).unwrap_or(a);
        let rb = self.resolve(b, Span::dummy()).unwrap_or(b);
        if ra == rb || assumed.contains(&(ra, rb)) {
            return true;
        }
        match (self.kind(ra).clone(), self.kind(rb).clone()) {
            (TypeKind::Polydef { name: na, scope: sa }, TypeKind::Polydef { name: nb, scope: sb })
            | (TypeKind::Alias { name: na, scope: sa }, TypeKind::Alias { name: nb, scope: sb }) => {
                na == nb && sa == sb
            }
            (TypeKind::Ref { inner: ia, owned: oa }, TypeKind::Ref { inner: ib, owned: ob })
            | (TypeKind::Array { inner: ia, owned: oa }, TypeKind::Array { inner: ib, owned: ob }) => {
                oa == ob && self.check_type_inner(ia, ib, assumed)
            }
            (
                TypeKind::StaticArray { inner: ia, length: la },
                TypeKind::StaticArray { inner: ib, length: lb },
            ) => la == lb && self.check_type_inner(ia, ib, assumed),
            (TypeKind::Struct(sa), TypeKind::Struct(sb)) => {
                if sa.generic || sb.generic || sa.members.len() != sb.members.len() {
                    return false;
                }
                if sa.members.iter().zip(&sb.members).any(|((na, _), (nb, _))| na != nb) {
                    return false;
                }
                assumed.push((ra, rb));
                let equal = sa
                    .members
                    .iter()
                    .zip(&sb.members)
                    .all(|((_, ta), (_, tb))| self.check_type_inner(*ta, *tb, assumed));
                assumed.pop();
                equal
            }
            (
                TypeKind::Func { args: aa, ret: ra_, variadic: va },
                TypeKind::Func { args: ab, ret: rb_, variadic: vb },
            ) => {
                va == vb
                    && aa.len() == ab.len()
                    && aa.iter().zip(&ab).all(|(x, y)| self.check_type_inner(*x, *y, assumed))
                    && self.check_type_inner(ra_, rb_, assumed)
            }
            // Basic and enum types are compared by id, which already failed
            _ => false,
        }
    }

    // ==================== Casts ====================

    /// Whether an explicit `from as to` is permitted
    pub fn can_cast(&mut self, from: TypeId, to: TypeId) -> bool {
        let (Ok(f), Ok(t)) = (self.resolve(from, Span::dummy()), self.resolve(to, Span::dummy())) else {
            return false;
        };
        if self.check_type(f, t) || t == ANY {
            return true;
        }
        let fk = self.kind(f).clone();
        let tk = self.kind(t).clone();
        match (&fk, &tk) {
            (TypeKind::Enum(e), _) => self.can_cast(e.inner, t),
            (_, TypeKind::Enum(e)) => self.can_cast(f, e.inner),
            (TypeKind::Ref { .. }, TypeKind::Ref { .. }) => true,
            (TypeKind::Ref { .. }, TypeKind::Basic { base: BaseKind::BasePtr, .. }) => true,
            (TypeKind::Ref { .. }, _) if tk.is_integer() => tk.basic_size() == Some(8),
            (TypeKind::Basic { base: BaseKind::BasePtr, .. }, TypeKind::Ref { .. }) => true,
            (TypeKind::Basic { base: BaseKind::BasePtr, .. }, _) if tk.is_integer() => tk.basic_size() == Some(8),
            (TypeKind::Basic { base: BaseKind::String, .. }, TypeKind::Basic { base: BaseKind::BasePtr, .. }) => true,
            (TypeKind::Func { .. }, TypeKind::Basic { base: BaseKind::BasePtr, .. }) => true,
            (TypeKind::Array { inner: a, .. }, TypeKind::Array { inner: b, owned: false }) => {
                self.check_type(*a, *b)
            }
            (TypeKind::StaticArray { inner: a, .. }, TypeKind::Array { inner: b, owned: false }) => {
                self.check_type(*a, *b)
            }
            // unsigned into a strictly larger integer of either signedness
            (
                TypeKind::Basic { base: BaseKind::Uint, size: fs },
                TypeKind::Basic { base: BaseKind::Uint | BaseKind::Int, size: ts },
            ) => ts > fs,
            // signed into a float at least as wide
            (TypeKind::Basic { base: BaseKind::Int, size: fs }, TypeKind::Basic { base: BaseKind::Float, size: ts }) => {
                ts >= fs
            }
            // Struct casts only unify structurally equal types (checked above)
            _ => false,
        }
    }

    // ==================== Polymorph Matching ====================

    /// Whether a `$T` appears anywhere in the (unresolved) shape of `ty`
    pub fn contains_polydef(&self, ty: TypeId) -> bool {
        self.contains_polydef_depth(ty, 0)
    }

    fn contains_polydef_depth(&self, ty: TypeId, depth: usize) -> bool {
        if depth > MAX_DEPTH {
            return false;
        }
        match self.kind(ty) {
            TypeKind::Polydef { .. } => true,
            TypeKind::Ref { inner, .. }
            | TypeKind::Array { inner, .. }
            | TypeKind::StaticArray { inner, .. } => self.contains_polydef_depth(*inner, depth + 1),
            TypeKind::Func { args, ret, .. } => {
                args.iter().any(|a| self.contains_polydef_depth(*a, depth + 1))
                    || self.contains_polydef_depth(*ret, depth + 1)
            }
            TypeKind::Params { args, .. } => args.iter().any(|a| self.contains_polydef_depth(*a, depth + 1)),
            TypeKind::Struct(s) if s.name.is_none() => {
                s.members.iter().any(|(_, t)| self.contains_polydef_depth(*t, depth + 1))
            }
            _ => false,
        }
    }

    /// Check that `actual` fits the shape of `expected`; with `bind`, record
    /// every unbound `$T` of `expected` in the polymorph context of that scope
    pub fn match_polymorph(
        &mut self,
        expected: TypeId,
        actual: TypeId,
        bind: Option<ScopeId>,
        span: Span,
    ) -> Result<bool> {
        let expected = self.resolve_polymorph(expected);
        let actual_r = self.resolve(actual, span)?;
        match self.kind(expected).clone() {
            TypeKind::Polydef { name, .. } => {
                if let Some(scope) = bind {
                    self.define_polymorph(scope, &name, actual_r, span)?;
                }
                Ok(true)
            }
            TypeKind::Ref { inner, .. } => match self.kind(actual_r).clone() {
                TypeKind::Ref { inner: a, .. } => self.match_polymorph(inner, a, bind, span),
                _ => Ok(false),
            },
            TypeKind::Array { inner, .. } => match self.kind(actual_r).clone() {
                TypeKind::Array { inner: a, .. } | TypeKind::StaticArray { inner: a, .. } => {
                    self.match_polymorph(inner, a, bind, span)
                }
                _ => Ok(false),
            },
            TypeKind::StaticArray { inner, length } => match self.kind(actual_r).clone() {
                TypeKind::StaticArray { inner: a, length: l } if l == length => {
                    self.match_polymorph(inner, a, bind, span)
                }
                _ => Ok(false),
            },
            TypeKind::Func { args, ret, variadic } => match self.kind(actual_r).clone() {
                TypeKind::Func { args: a, ret: r, variadic: v } if v == variadic && a.len() == args.len() => {
                    for (e, x) in args.iter().zip(&a) {
                        if !self.match_polymorph(*e, *x, bind, span)? {
                            return Ok(false);
                        }
                    }
                    self.match_polymorph(ret, r, bind, span)
                }
                _ => Ok(false),
            },
            TypeKind::Params { base, args } => {
                let generic = self.resolve(base, span)?;
                let Some(StructType { generic_base: Some((gb, gargs)), .. }) =
                    self.kind(actual_r).as_struct().cloned()
                else {
                    return Ok(false);
                };
                if gb != generic || gargs.len() != args.len() {
                    return Ok(false);
                }
                for (e, x) in args.iter().zip(&gargs) {
                    if !self.match_polymorph(*e, *x, bind, span)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => {
                let resolved = self.resolve(expected, span)?;
                Ok(self.check_type(resolved, actual_r))
            }
        }
    }

    // ==================== Used Types ====================

    /// Add `ty` and its structural components to the used-types registry,
    /// deduplicated structurally; returns the canonical entry
    pub fn register_type(&mut self, ty: TypeId, span: Span) -> Result<TypeId> {
        if let Some(canonical) = self.used_index.get(&ty) {
            return Ok(*canonical);
        }
        let resolved = self.resolve(ty, span)?;
        if let Some(canonical) = self.used_index.get(&resolved).copied() {
            self.used_index.insert(ty, canonical);
            return Ok(canonical);
        }
        match self.kind(resolved) {
            TypeKind::Polydef { .. } | TypeKind::Alias { .. } => return Ok(resolved),
            TypeKind::Struct(s) if s.generic => return Ok(resolved),
            _ => {}
        }
        let existing = self.used_types.clone();
        for u in existing {
            if self.check_type(u, resolved) {
                self.used_index.insert(resolved, u);
                self.used_index.insert(ty, u);
                return Ok(u);
            }
        }
        self.used_types.push(resolved);
        self.used_index.insert(resolved, resolved);
        self.used_index.insert(ty, resolved);

        match self.kind(resolved).clone() {
            TypeKind::Ref { inner, .. }
            | TypeKind::Array { inner, .. }
            | TypeKind::StaticArray { inner, .. } => {
                self.register_type(inner, span)?;
            }
            TypeKind::Func { args, ret, .. } => {
                for a in args {
                    self.register_type(a, span)?;
                }
                self.register_type(ret, span)?;
            }
            TypeKind::Struct(s) => {
                for (_, m) in s.members {
                    self.register_type(m, span)?;
                }
            }
            TypeKind::Enum(e) => {
                self.register_type(e.inner, span)?;
            }
            _ => {}
        }
        Ok(resolved)
    }

    /// Canonical used-types entry for a registered type
    pub fn canonical(&self, ty: TypeId) -> Option<TypeId> {
        if let Some(c) = self.used_index.get(&ty) {
            return Some(*c);
        }
        let resolved = self.resolve_existing(ty).ok()?;
        self.used_index.get(&resolved).copied()
    }

    // ==================== Queries ====================

    /// Display name, as written in source where possible
    pub fn type_name(&self, ty: TypeId) -> String {
        self.type_name_depth(ty, 0)
    }

    fn type_name_depth(&self, ty: TypeId, depth: usize) -> String {
        if depth > MAX_DEPTH {
            return "...".to_string();
        }
        let name = |t: TypeId| self.type_name_depth(t, depth + 1);
        match self.kind(ty) {
            TypeKind::Basic { .. } => builtin_display(ty).to_string(),
            TypeKind::Alias { name, .. } => name.clone(),
            TypeKind::Polydef { name, .. } => format!("${}", name),
            TypeKind::Params { base, args } => {
                let args: Vec<String> = args.iter().map(|a| name(*a)).collect();
                format!("{}({})", name(*base), args.join(", "))
            }
            TypeKind::StaticArray { inner, length } => format!("[{}]{}", length, name(*inner)),
            TypeKind::Array { inner, owned } => {
                format!("[]{}{}", if *owned { "'" } else { "" }, name(*inner))
            }
            TypeKind::Ref { inner, owned } => {
                format!("&{}{}", if *owned { "'" } else { "" }, name(*inner))
            }
            TypeKind::Func { args, ret, variadic } => {
                let mut parts: Vec<String> = args.iter().map(|a| name(*a)).collect();
                if *variadic {
                    if let Some(last) = parts.last_mut() {
                        *last = format!("...{}", last);
                    }
                }
                if *ret == VOID {
                    format!("fn({})", parts.join(", "))
                } else {
                    format!("fn({}) -> {}", parts.join(", "), name(*ret))
                }
            }
            TypeKind::Struct(s) => match (&s.name, &s.generic_base) {
                (Some(n), Some((_, args))) => {
                    let args: Vec<String> = args.iter().map(|a| name(*a)).collect();
                    format!("{}({})", n, args.join(", "))
                }
                (Some(n), None) => n.clone(),
                (None, _) => {
                    let members: Vec<String> = s
                        .members
                        .iter()
                        .map(|(m, t)| format!("{}: {}", m, name(*t)))
                        .collect();
                    format!("struct {{{}}}", members.join("; "))
                }
            },
            TypeKind::Enum(e) => e.name.clone(),
            TypeKind::External { package, name, .. } => format!("{}.{}", package, name),
        }
    }

    /// Whether values of `ty` own heap memory: strings, owned refs and
    /// arrays, and aggregates containing any of those by value
    pub fn is_dynamic(&self, ty: TypeId) -> bool {
        self.is_dynamic_depth(ty, 0)
    }

    fn is_dynamic_depth(&self, ty: TypeId, depth: usize) -> bool {
        if depth > MAX_DEPTH {
            return false;
        }
        match self.resolved_kind(ty) {
            TypeKind::Basic { base: BaseKind::String, .. } => true,
            TypeKind::Ref { owned, .. } | TypeKind::Array { owned, .. } => *owned,
            TypeKind::StaticArray { inner, .. } => self.is_dynamic_depth(*inner, depth + 1),
            TypeKind::Struct(s) => s.members.iter().any(|(_, t)| self.is_dynamic_depth(*t, depth + 1)),
            _ => false,
        }
    }

    /// Owned `Ref` or owned `Array`
    pub fn is_owned(&self, ty: TypeId) -> bool {
        matches!(
            self.resolved_kind(ty),
            TypeKind::Ref { owned: true, .. } | TypeKind::Array { owned: true, .. }
        )
    }

    /// Borrowed counterpart of an owned `Ref`/`Array`; other types unchanged
    pub fn strip_ownership(&mut self, ty: TypeId) -> TypeId {
        match self.resolved_kind(ty).clone() {
            TypeKind::Ref { inner, owned: true } => self.ref_of(inner, false),
            TypeKind::Array { inner, owned: true } => self.array_of(inner, false),
            _ => ty,
        }
    }

    pub fn is_numeric(&self, ty: TypeId) -> bool {
        self.resolved_kind(ty).is_numeric()
    }

    pub fn is_integer(&self, ty: TypeId) -> bool {
        self.resolved_kind(ty).is_integer()
    }

    pub fn is_float(&self, ty: TypeId) -> bool {
        self.resolved_kind(ty).is_float()
    }

    pub fn is_base(&self, ty: TypeId, base: BaseKind) -> bool {
        self.resolved_kind(ty).is_basic(base)
    }

    /// Struct shape of `ty`, if it resolves to one
    pub fn struct_of(&self, ty: TypeId) -> Option<&StructType> {
        self.resolved_kind(ty).as_struct()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ScopeKind;

    fn setup() -> (CompilationContext, ScopeId) {
        let mut ctx = CompilationContext::new();
        let root = ctx.new_scope(None, ScopeKind::Root);
        (ctx, root)
    }

    fn alias(ctx: &mut CompilationContext, scope: ScopeId, name: &str) -> TypeId {
        ctx.new_type(TypeKind::Alias { name: name.to_string(), scope })
    }

    fn generic_box(ctx: &mut CompilationContext, scope: ScopeId) -> TypeId {
        let t = alias(ctx, scope, "T");
        let boxed = ctx.new_type(TypeKind::Struct(StructType {
            name: Some("Box".to_string()),
            members: vec![("v".to_string(), t)],
            generic: true,
            params: vec!["T".to_string()],
            generic_base: None,
        }));
        ctx.define_type(scope, "Box", boxed, Span::dummy()).unwrap();
        boxed
    }

    #[test]
    fn test_alias_chain_terminates() {
        let (mut ctx, root) = setup();
        let to_int = alias(&mut ctx, root, "int");
        ctx.define_type(root, "Meters", to_int, Span::dummy()).unwrap();
        let to_meters = alias(&mut ctx, root, "Meters");
        ctx.define_type(root, "Distance", to_meters, Span::dummy()).unwrap();
        let use_site = alias(&mut ctx, root, "Distance");
        assert_eq!(ctx.resolve_alias(use_site, Span::dummy()).unwrap(), S64);
    }

    #[test]
    fn test_alias_cycle_is_reported() {
        let (mut ctx, root) = setup();
        let a_to_b = alias(&mut ctx, root, "B");
        ctx.define_type(root, "A", a_to_b, Span::dummy()).unwrap();
        let b_to_a = alias(&mut ctx, root, "A");
        ctx.define_type(root, "B", b_to_a, Span::dummy()).unwrap();
        let use_site = alias(&mut ctx, root, "A");
        assert!(matches!(ctx.resolve_alias(use_site, Span::dummy()), Err(Error::CyclicAlias { .. })));
    }

    #[test]
    fn test_unknown_type_is_reported() {
        let (mut ctx, root) = setup();
        let missing = alias(&mut ctx, root, "Nope");
        assert!(matches!(ctx.resolve(missing, Span::dummy()), Err(Error::UndefinedType { .. })));
    }

    #[test]
    fn test_check_type_reflexive_and_structural() {
        let (mut ctx, _) = setup();
        let a = ctx.ref_of(S64, false);
        let b = ctx.ref_of(S64, false);
        let owned = ctx.ref_of(S64, true);
        assert!(ctx.check_type(a, a));
        assert!(ctx.check_type(a, b));
        assert!(ctx.check_type(b, a));
        assert!(!ctx.check_type(a, owned));
        let s3 = ctx.static_array_of(S64, 3);
        let s4 = ctx.static_array_of(S64, 4);
        assert!(!ctx.check_type(s3, s4));
        assert!(!ctx.check_type(S64, S32));
    }

    #[test]
    fn test_generic_reifications_unify() {
        let (mut ctx, root) = setup();
        generic_box(&mut ctx, root);
        let mk = |ctx: &mut CompilationContext, arg: TypeId| {
            let base = ctx.new_type(TypeKind::Alias { name: "Box".to_string(), scope: root });
            ctx.new_type(TypeKind::Params { base, args: vec![arg] })
        };
        let int_arg = ctx.new_type(TypeKind::Alias { name: "int".to_string(), scope: root });
        let box_int_a = mk(&mut ctx, S64);
        let box_int_b = mk(&mut ctx, int_arg);
        let box_str = mk(&mut ctx, STRING);
        assert!(ctx.check_type(box_int_a, box_int_b));
        assert!(!ctx.check_type(box_int_a, box_str));
        let ra = ctx.resolve(box_int_a, Span::dummy()).unwrap();
        let rb = ctx.resolve(box_int_b, Span::dummy()).unwrap();
        assert_eq!(ra, rb);
        assert_eq!(ctx.type_name(ra), "Box(int)");
        assert!(ctx.is_dynamic(box_str));
        assert!(!ctx.is_dynamic(box_int_a));
    }

    #[test]
    fn test_generic_arity_mismatch() {
        let (mut ctx, root) = setup();
        generic_box(&mut ctx, root);
        let base = alias(&mut ctx, root, "Box");
        let bad = ctx.new_type(TypeKind::Params { base, args: vec![S64, S64] });
        assert!(matches!(
            ctx.resolve(bad, Span::dummy()),
            Err(Error::GenericArity { expected: 1, got: 2, .. })
        ));
    }

    #[test]
    fn test_recursive_struct_equality_terminates() {
        let (mut ctx, root) = setup();
        let self_ref = alias(&mut ctx, root, "Node");
        let next = ctx.ref_of(self_ref, false);
        let node = ctx.new_type(TypeKind::Struct(StructType {
            name: Some("Node".to_string()),
            members: vec![("v".to_string(), S64), ("next".to_string(), next)],
            generic: false,
            params: Vec::new(),
            generic_base: None,
        }));
        ctx.define_type(root, "Node", node, Span::dummy()).unwrap();
        let other_ref = alias(&mut ctx, root, "Node");
        let other_next = ctx.ref_of(other_ref, false);
        let twin = ctx.new_type(TypeKind::Struct(StructType {
            name: Some("Twin".to_string()),
            members: vec![("v".to_string(), S64), ("next".to_string(), other_next)],
            generic: false,
            params: Vec::new(),
            generic_base: None,
        }));
        assert!(ctx.check_type(node, twin));
        assert_eq!(ctx.register_type(node, Span::dummy()).unwrap(), node);
        assert_eq!(ctx.register_type(twin, Span::dummy()).unwrap(), node);
    }

    #[test]
    fn test_can_cast_rules() {
        let (mut ctx, _) = setup();
        let r = ctx.ref_of(S64, false);
        let r2 = ctx.ref_of(U8, false);
        assert!(ctx.can_cast(r, r2));
        assert!(ctx.can_cast(r, BASEPTR));
        assert!(ctx.can_cast(r, U64));
        assert!(!ctx.can_cast(r, S32));
        assert!(ctx.can_cast(BASEPTR, r));
        assert!(ctx.can_cast(S32, F64));
        assert!(ctx.can_cast(STRING, ANY));
        assert!(!ctx.can_cast(STRING, S64));
    }

    #[test]
    fn test_numeric_casts_never_lose_information() {
        let (mut ctx, _) = setup();
        assert!(ctx.can_cast(U8, U64));
        assert!(ctx.can_cast(U32, S64));
        assert!(!ctx.can_cast(U32, S32));
        assert!(ctx.can_cast(S32, F32));
        assert!(ctx.can_cast(S64, F64));
        let lossy = [(U64, U8), (S64, S8), (F64, S32), (S64, F32), (S32, U32), (F64, F32), (BOOL, S64), (S64, BOOL)];
        for (from, to) in lossy {
            assert!(!ctx.can_cast(from, to), "{} -> {}", ctx.type_name(from), ctx.type_name(to));
        }
    }

    #[test]
    fn test_match_polymorph_binds_parameters() {
        let (mut ctx, root) = setup();
        let fn_scope = ctx.new_fn_scope(root, None, None);
        let poly_t = ctx.new_type(TypeKind::Polydef { name: "T".to_string(), scope: fn_scope });
        let expected = ctx.array_of(poly_t, false);
        let actual = ctx.array_of(STRING, false);
        // Structural check only
        assert!(ctx.match_polymorph(expected, actual, None, Span::dummy()).unwrap());
        assert!(!ctx.match_polymorph(expected, S64, None, Span::dummy()).unwrap());
        assert!(ctx.contains_polydef(expected));
        assert!(!ctx.contains_polydef(actual));
    }
}
