//! Statement translation
//!
//! Blocks declare every variable of their scope up front, zeroed, so early
//! exits can release whatever a scope owns without tracking which
//! declarations were reached. Each open block keeps a [`Frame`] with its
//! pending `defer`s; `return`, `break` and `continue` run the exit code of
//! every frame they leave.

use super::c_codegen::{CCodeGen, Frame};
use crate::frontend::ast::{Ast, AstKind, Decl, ForLoop};
use crate::middle::{Binding, ScopeId, ScopeKind};
use crate::types::{BaseKind, TypeKind};
use crate::utils::{Error, Result};

impl<'a> CCodeGen<'a> {
    /// Declarations for the storage of `scope`. Parameters arrive as C
    /// parameters and non-temp globals are file-level statics.
    pub(super) fn emit_hoisted(&mut self, scope: ScopeId) -> Result<()> {
        let ctx = self.ctx;
        for var in &ctx.scope(scope).vars {
            let v = ctx.var(*var);
            if !matches!(v.binding, Binding::Storage) || v.flags.param || v.flags.ext || v.flags.function {
                continue;
            }
            if v.flags.global && !v.flags.temp {
                continue;
            }
            let line = format!("{} {} = {};", self.c_type(v.ty)?, self.var_name(*var), self.zero_value(v.ty)?);
            self.writeln(&line);
        }
        Ok(())
    }

    /// Body of a block; the caller writes the surrounding braces
    pub(super) fn emit_block(&mut self, block: &'a Ast, prologue: Vec<String>) -> Result<()> {
        let AstKind::Block { stmts, scope } = &block.kind else {
            return Err(Error::internal("expected a block"));
        };
        let scope = scope.ok_or_else(|| Error::internal("block without a scope"))?;
        self.emit_hoisted(scope)?;
        for line in &prologue {
            self.writeln(line);
        }

        self.frames.push(Frame { scope, defers: Vec::new() });
        for stmt in stmts {
            self.emit_stmt(stmt)?;
        }
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::internal("unbalanced scope frames"))?;

        let terminated = matches!(
            stmts.last().map(|s| &s.kind),
            Some(AstKind::Return { .. } | AstKind::Break | AstKind::Continue)
        );
        if !terminated {
            for line in self.exit_lines(&frame)? {
                self.writeln(&line);
            }
        }
        Ok(())
    }

    /// Deferred calls, newest first, then the releases of the scope
    pub(super) fn exit_lines(&self, frame: &Frame<'a>) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        for call in frame.defers.iter().rev() {
            lines.push(format!("{};", self.expr(call)?));
        }
        for var in &self.ctx.scope(frame.scope).release.vars {
            lines.push(self.free_stmt(self.ctx.var(*var).ty, &self.var_name(*var))?);
        }
        Ok(lines)
    }

    /// Exit code of every open frame up to and including the innermost one
    /// of kind `until`
    fn unwind_lines(&self, until: ScopeKind) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        for frame in self.frames.iter().rev() {
            lines.extend(self.exit_lines(frame)?);
            if self.ctx.scope(frame.scope).kind == until {
                return Ok(lines);
            }
        }
        Err(Error::internal(format!("no enclosing {:?} scope", until)))
    }

    fn braced(&mut self, body: &'a Ast) -> Result<()> {
        self.indent();
        match &body.kind {
            AstKind::Block { .. } => self.emit_block(body, Vec::new())?,
            _ => self.emit_stmt(body)?,
        }
        self.dedent();
        Ok(())
    }

    // ==================== Statements ====================

    pub(super) fn emit_stmt(&mut self, stmt: &'a Ast) -> Result<()> {
        match &stmt.kind {
            AstKind::Decl(decl) => self.emit_decl(decl),
            AstKind::Assign { lhs, rhs, .. } => self.emit_assign(stmt, lhs, rhs),
            AstKind::Conditional { cond, then, otherwise } => {
                let line = format!("if ({}) {{", self.expr(cond)?);
                self.writeln(&line);
                self.braced(then)?;
                if let Some(otherwise) = otherwise {
                    self.writeln("} else {");
                    self.braced(otherwise)?;
                }
                self.writeln("}");
                Ok(())
            }
            AstKind::While { cond, body } => {
                let line = format!("while ({}) {{", self.expr(cond)?);
                self.writeln(&line);
                self.braced(body)?;
                self.writeln("}");
                Ok(())
            }
            AstKind::For(for_loop) => self.emit_for(stmt, for_loop),
            AstKind::Return { value } => self.emit_return(value.as_deref()),
            AstKind::Break | AstKind::Continue => {
                for line in self.unwind_lines(ScopeKind::Loop)? {
                    self.writeln(&line);
                }
                self.writeln(if matches!(stmt.kind, AstKind::Break) { "break;" } else { "continue;" });
                Ok(())
            }
            AstKind::Defer { call } => {
                let frame = self
                    .frames
                    .last_mut()
                    .ok_or_else(|| Error::internal("defer outside of any block"))?;
                frame.defers.push(call);
                Ok(())
            }
            AstKind::Block { .. } => {
                self.writeln("{");
                self.braced(stmt)?;
                self.writeln("}");
                Ok(())
            }
            AstKind::AnonScope { body } => {
                self.writeln("{");
                self.braced(body)?;
                self.writeln("}");
                Ok(())
            }
            AstKind::FuncDecl(_)
            | AstKind::Use { .. }
            | AstKind::TypeDecl { .. }
            | AstKind::EnumDecl(_)
            | AstKind::Directive(_)
            | AstKind::Import { .. }
            | AstKind::Impl { .. } => Ok(()),
            _ => {
                let line = format!("{};", self.expr(stmt)?);
                self.writeln(&line);
                Ok(())
            }
        }
    }

    fn emit_decl(&mut self, decl: &'a Decl) -> Result<()> {
        if decl.ext || decl.constant {
            return Ok(());
        }
        let (Some(init), Some(var)) = (&decl.init, decl.var) else {
            return Ok(());
        };
        if !matches!(self.ctx.var(var).binding, Binding::Storage) {
            return Ok(());
        }
        let ty = self.ctx.var(var).ty;
        let name = self.var_name(var);
        if !self.ctx.is_dynamic(ty) {
            let line = format!("{} = {};", name, self.expr(init)?);
            self.writeln(&line);
            return Ok(());
        }
        match self.ctx.value_temp(init) {
            Some(temp) => {
                let setup = format!("{};", self.temp_setup(init, temp)?);
                self.writeln(&setup);
                let swap = format!("SWAP({}, {}, {});", self.c_type(ty)?, name, self.var_name(temp));
                self.writeln(&swap);
            }
            None => {
                let line = format!("{} = {};", name, self.copy_expr(ty, &self.expr(init)?)?);
                self.writeln(&line);
            }
        }
        Ok(())
    }

    /// Dynamic values move in by swapping with a temp that already owns the
    /// new value; the old value stays in the temp until it is released
    fn emit_assign(&mut self, stmt: &'a Ast, lhs: &'a Ast, rhs: &'a Ast) -> Result<()> {
        let ty = self.node_type(lhs)?;
        let target = self.expr(lhs)?;
        if !self.ctx.is_dynamic(ty) {
            let line = format!("{} = {};", target, self.expr(rhs)?);
            self.writeln(&line);
            return Ok(());
        }
        let ct = self.c_type(ty)?;
        if let Some(temp) = self.ctx.value_temp(rhs) {
            let setup = format!("{};", self.temp_setup(rhs, temp)?);
            self.writeln(&setup);
            self.writeln(&format!("SWAP({}, {}, {});", ct, target, self.var_name(temp)));
            return Ok(());
        }
        let copied = self.copy_expr(ty, &self.expr(rhs)?)?;
        match self.ctx.find_temp_var(stmt.id) {
            Some(temp) => {
                let name = self.var_name(temp);
                self.writeln(&self.free_stmt(ty, &name)?);
                self.writeln(&format!("{} = {};", name, copied));
                self.writeln(&format!("SWAP({}, {}, {});", ct, target, name));
            }
            None => {
                self.writeln("{");
                self.indent();
                self.writeln(&format!("{} _moved = {};", ct, copied));
                self.writeln(&format!("SWAP({}, {}, _moved);", ct, target));
                self.writeln(&self.free_stmt(ty, "_moved")?);
                self.dedent();
                self.writeln("}");
            }
        }
        Ok(())
    }

    // ==================== Loops ====================

    /// `for` over a sequence: the sequence is evaluated once, then the body
    /// runs with the index and item variables set for each element
    fn emit_for(&mut self, stmt: &'a Ast, for_loop: &'a ForLoop) -> Result<()> {
        let id = stmt.id.0;
        let (data, length, count) = (format!("_d{}", id), format!("_l{}", id), format!("_n{}", id));
        let iterable_ty = self.node_type(&for_loop.iterable)?;

        self.writeln("{");
        self.indent();
        let is_string = match self.ctx.resolved_kind(iterable_ty).clone() {
            TypeKind::Array { inner, .. } => {
                let et = self.c_type(inner)?;
                let seq = format!("_s{}", id);
                let line = format!("_verse_array {} = {};", seq, self.expr(&for_loop.iterable)?);
                self.writeln(&line);
                self.writeln(&format!("{0}* {1} = ({0}*){2}.data;", et, data, seq));
                self.writeln(&format!("int64_t {} = {}.length;", length, seq));
                false
            }
            TypeKind::StaticArray { inner, length: n } => {
                let line = format!("{}* {} = {};", self.c_type(inner)?, data, self.static_data(&for_loop.iterable)?);
                self.writeln(&line);
                self.writeln(&format!("int64_t {} = {};", length, n));
                false
            }
            TypeKind::Basic { base: BaseKind::String, .. } => {
                let line = format!("char* {} = {};", data, self.expr(&for_loop.iterable)?);
                self.writeln(&line);
                self.writeln(&format!("int64_t {} = _verse_strlen({});", length, data));
                true
            }
            _ => return Err(Error::internal("for loop over a non-sequence")),
        };

        let mut prologue = Vec::new();
        if let Some(index) = for_loop.index_var {
            prologue.push(format!("{} = {};", self.var_name(index), count));
        }
        if let Some(item) = for_loop.item_var {
            let element = format!("{}[{}]", data, count);
            let value = if for_loop.by_ref {
                format!("&{}", element)
            } else if is_string {
                format!("(uint8_t){}", element)
            } else {
                self.copy_expr(self.ctx.var(item).ty, &element)?
            };
            prologue.push(format!("{} = {};", self.var_name(item), value));
        }

        self.writeln(&format!("for (int64_t {0} = 0; {0} < {1}; {0}++) {{", count, length));
        self.indent();
        self.emit_block(&for_loop.body, prologue)?;
        self.dedent();
        self.writeln("}");
        self.dedent();
        self.writeln("}");
        Ok(())
    }

    // ==================== Return ====================

    fn emit_return(&mut self, value: Option<&'a Ast>) -> Result<()> {
        let unwind = self.unwind_lines(ScopeKind::Function)?;
        let Some(value) = value else {
            for line in &unwind {
                self.writeln(line);
            }
            self.writeln("return;");
            return Ok(());
        };

        let ret = self
            .frames
            .iter()
            .rev()
            .find_map(|f| {
                let scope = self.ctx.scope(f.scope);
                (scope.kind == ScopeKind::Function).then_some(scope.return_type).flatten()
            })
            .map_or_else(|| self.node_type(value), Ok)?;
        if self.is_void(ret) {
            let line = format!("{};", self.expr(value)?);
            self.writeln(&line);
            for line in &unwind {
                self.writeln(line);
            }
            self.writeln("return;");
            return Ok(());
        }

        let dynamic = self.ctx.is_dynamic(ret);
        if !dynamic && unwind.is_empty() {
            let line = format!("return {};", self.expr(value)?);
            self.writeln(&line);
            return Ok(());
        }

        let ct = self.c_type(ret)?;
        self.writeln("{");
        self.indent();
        self.writeln(&format!("{} _ret = {};", ct, self.zero_value(ret)?));
        match self.ctx.value_temp(value) {
            Some(temp) if dynamic => {
                let setup = format!("{};", self.temp_setup(value, temp)?);
                self.writeln(&setup);
                self.writeln(&format!("SWAP({}, _ret, {});", ct, self.var_name(temp)));
            }
            _ => {
                let line = format!("_ret = {};", self.copy_expr(ret, &self.expr(value)?)?);
                self.writeln(&line);
            }
        }
        for line in &unwind {
            self.writeln(line);
        }
        self.writeln("return _ret;");
        self.dedent();
        self.writeln("}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::c::c_codegen::tests::{function_text, generate_c};

    #[test]
    fn test_locals_are_hoisted_and_released() {
        let c = generate_c("fn greet(n: int) { s := \"hi\"; t := s + \"!\"; println(t); }\nfn main() { greet(1); }");
        let body = function_text(&c, "(int64_t _v");
        let first_line = body.lines().nth(1).unwrap().trim();
        assert!(first_line.starts_with("char* _v"));
        assert!(first_line.ends_with(" = 0;"));
        let frees = body.lines().filter(|l| l.trim_start().starts_with("_free_")).count();
        assert!(frees >= 2);
    }

    #[test]
    fn test_dynamic_parameters_copied_on_entry() {
        let c = generate_c("fn shout(msg: string) { println(msg); }\nfn main() { shout(\"a\"); }");
        let body = function_text(&c, "(char* _v");
        assert!(body.lines().any(|l| l.trim().starts_with("_v") && l.contains(" = _copy_")));
    }

    #[test]
    fn test_for_by_reference_takes_element_addresses() {
        let c = generate_c("fn main() { xs: [3]int; for &x in xs { *x = 1; } }");
        assert!(c.contains("for (int64_t _n"));
        assert!(c.lines().any(|l| l.contains(" = &_d") && l.trim().ends_with("];")));
    }

    #[test]
    fn test_for_over_string_reads_bytes() {
        let c = generate_c("fn main() { s := \"abc\"; for ch, i in s { n := i; } }");
        assert!(c.contains("(uint8_t)_d"));
        assert!(c.contains(" = _verse_strlen(_d"));
    }

    #[test]
    fn test_return_runs_defers_and_releases() {
        let c = generate_c(
            "fn work() -> int { s := \"tmp\"; defer println(\"done\"); return 4; }
             fn main() { n := work(); }",
        );
        let body = function_text(&c, "static int64_t _f");
        let ret = body.find("return _ret;").unwrap();
        let deferred = body.find("_verse_println(").unwrap();
        let freed = body.rfind("_free_").unwrap();
        assert!(deferred < ret && freed < ret);
        assert!(deferred < freed);
    }

    #[test]
    fn test_break_releases_loop_body() {
        let c = generate_c("fn main() { while true { s := \"x\"; if true { break; } } }");
        let body = function_text(&c, "static void _f");
        let at = body.find("break;").unwrap();
        let before = &body[..at];
        let last_line = before.lines().rev().nth(1).unwrap();
        assert!(last_line.trim_start().starts_with("_free_"));
    }

    #[test]
    fn test_assignment_of_borrowed_string_swaps_through_temp() {
        let c = generate_c("fn main() { a := \"x\"; b := \"y\"; b = a; }");
        assert!(c.lines().any(|l| l.trim_start().starts_with("SWAP(char*, _v")));
        assert!(c.contains(" = _copy_"));
    }

    #[test]
    fn test_else_if_chains() {
        let c = generate_c("fn main() { n := 2; if n == 1 { } else if n == 2 { } else { } }");
        assert_eq!(c.matches("} else {").count(), 2);
    }
}
