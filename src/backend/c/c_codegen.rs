//! C Code Generator
//!
//! Translates the analyzed Verse program to C code for compilation with
//! clang/gcc. Sections are emitted in a fixed order so the output of a
//! given input is byte-identical across runs.

use log::debug;

use crate::backend::codegen::CodeGen;
use crate::frontend::ast::{Ast, AstKind, FnDecl};
use crate::middle::{Binding, CompilationContext, PolymorphId, ScopeId, VarId};
use crate::stdlib::generate_c_runtime;
use crate::types::{TypeId, TypeKind, VOID};
use crate::utils::{Error, Result};

/// A scope the statement emitter is currently inside of
#[derive(Debug)]
pub(super) struct Frame<'a> {
    pub scope: ScopeId,
    /// Deferred calls registered so far, run in reverse on exit
    pub defers: Vec<&'a Ast>,
}

/// One C function to emit: a plain function or a polymorph instantiation
pub(super) struct FnItem<'a> {
    pub name: String,
    pub params: Vec<VarId>,
    pub ret: TypeId,
    pub body: &'a Ast,
}

/// C code generator
pub struct CCodeGen<'a> {
    pub(super) ctx: &'a CompilationContext,
    output: String,
    indent: usize,
    pub(super) frames: Vec<Frame<'a>>,
}

impl<'a> CCodeGen<'a> {
    pub fn new(ctx: &'a CompilationContext) -> Self {
        Self {
            ctx,
            output: String::new(),
            indent: 0,
            frames: Vec::new(),
        }
    }

    /// Write indented line
    pub(super) fn writeln(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(line);
        self.output.push('\n');
    }

    /// Write raw text (no indent)
    pub(super) fn write_raw(&mut self, text: &str) {
        self.output.push_str(text);
    }

    pub(super) fn indent(&mut self) {
        self.indent += 1;
    }

    pub(super) fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    // ==================== Names ====================

    /// C name of a variable: external bindings keep their own symbol
    pub(super) fn var_name(&self, var: VarId) -> String {
        let v = self.ctx.var(var);
        if let Some(c_name) = &v.c_name {
            return c_name.clone();
        }
        if v.flags.function {
            format!("_f{}", var.0)
        } else {
            format!("_v{}", var.0)
        }
    }

    pub(super) fn polymorph_name(&self, var: VarId, pid: PolymorphId) -> String {
        format!("_f{}_{}", var.0, pid.0)
    }

    // ==================== Functions ====================

    /// Every function with a body, in declaration order; polymorphic
    /// functions stand for their instantiations
    pub(super) fn functions(&self) -> Result<Vec<FnItem<'a>>> {
        let ctx = self.ctx;
        let mut items = Vec::new();
        for decl in &ctx.fns {
            if decl.ext {
                continue;
            }
            let var = decl
                .var
                .ok_or_else(|| Error::internal(format!("function '{}' has no binding", decl.name)))?;
            if decl.polymorphic {
                for pid in &decl.polymorphs {
                    let poly = ctx.polymorph(*pid);
                    let body = poly
                        .body
                        .as_ref()
                        .ok_or_else(|| Error::internal(format!("polymorph of '{}' has no body", decl.name)))?;
                    items.push(FnItem {
                        name: self.polymorph_name(var, *pid),
                        params: poly.params.clone(),
                        ret: poly.ret,
                        body,
                    });
                }
                continue;
            }
            let Some(body) = decl.body.as_ref() else {
                continue;
            };
            items.push(FnItem {
                name: self.var_name(var),
                params: decl.param_vars.clone(),
                ret: self.return_type(decl)?,
                body,
            });
        }
        Ok(items)
    }

    fn return_type(&self, decl: &FnDecl) -> Result<TypeId> {
        let ty = decl
            .ty
            .ok_or_else(|| Error::internal(format!("function '{}' has no type", decl.name)))?;
        match self.ctx.resolved_kind(ty) {
            TypeKind::Func { ret, .. } => Ok(*ret),
            _ => Err(Error::internal(format!("function '{}' has a non-function type", decl.name))),
        }
    }

    fn signature(&self, item: &FnItem<'a>) -> Result<String> {
        let mut params = Vec::with_capacity(item.params.len());
        for p in &item.params {
            let ty = self.c_type(self.ctx.var(*p).ty)?;
            params.push(format!("{} {}", ty, self.var_name(*p)));
        }
        let params = if params.is_empty() { "void".to_string() } else { params.join(", ") };
        Ok(format!("static {} {}({})", self.c_type(item.ret)?, item.name, params))
    }

    /// Generate C code for a function. Dynamic parameters are copied on
    /// entry, so callers pass borrowed values and the body owns its copies.
    fn generate_function(&mut self, item: &FnItem<'a>) -> Result<()> {
        let signature = self.signature(item)?;
        self.writeln(&format!("{} {{", signature));
        self.indent();
        let mut prologue = Vec::new();
        for p in &item.params {
            let ty = self.ctx.var(*p).ty;
            if self.ctx.is_dynamic(ty) {
                let name = self.var_name(*p);
                prologue.push(format!("{} = {};", name, self.copy_expr(ty, &name)?));
            }
        }
        self.frames.clear();
        self.emit_block(item.body, prologue)?;
        self.dedent();
        self.writeln("}");
        self.writeln("");
        Ok(())
    }

    // ==================== Sections ====================

    fn generate_includes(&mut self) {
        if self.ctx.includes.is_empty() {
            return;
        }
        for header in &self.ctx.includes {
            let line = if header.starts_with('<') {
                format!("#include {}", header)
            } else {
                format!("#include \"{}\"", header)
            };
            self.writeln(&line);
        }
        self.writeln("");
    }

    /// Distinct root scopes in unit load order, with the units sharing each
    fn root_scopes(&self) -> Vec<(ScopeId, Vec<usize>)> {
        let mut roots: Vec<(ScopeId, Vec<usize>)> = Vec::new();
        for (index, unit) in self.ctx.units.iter().enumerate() {
            match roots.iter_mut().find(|(s, _)| *s == unit.scope) {
                Some((_, units)) => units.push(index),
                None => roots.push((unit.scope, vec![index])),
            }
        }
        roots
    }

    fn generate_globals(&mut self) -> Result<()> {
        let mut count = 0;
        for (scope, _) in self.root_scopes() {
            for var in &self.ctx.scope(scope).vars {
                let v = self.ctx.var(*var);
                let storage = matches!(v.binding, Binding::Storage);
                if !storage || v.flags.ext || v.flags.function || v.flags.temp || !v.flags.global {
                    continue;
                }
                let line = format!("static {} {};", self.c_type(v.ty)?, self.var_name(*var));
                self.writeln(&line);
                count += 1;
            }
        }
        if count > 0 {
            self.writeln("");
        }
        debug!("emitted {} globals", count);
        Ok(())
    }

    fn generate_prototypes(&mut self, items: &[FnItem<'a>]) -> Result<()> {
        for item in items {
            let signature = self.signature(item)?;
            self.writeln(&format!("{};", signature));
        }
        if !items.is_empty() {
            self.writeln("");
        }
        Ok(())
    }

    /// Top-level statements of every unit, one block per root scope in load order
    fn generate_init(&mut self) -> Result<()> {
        let ctx = self.ctx;
        self.writeln("static void _verse_init(void) {");
        self.indent();
        for (scope, units) in self.root_scopes() {
            self.writeln("{");
            self.indent();
            self.emit_hoisted(scope)?;
            self.frames.clear();
            self.frames.push(Frame { scope, defers: Vec::new() });
            for index in units {
                let Some(ast) = ctx.units[index].ast.as_ref() else {
                    continue;
                };
                let AstKind::Block { stmts, .. } = &ast.kind else {
                    return Err(Error::internal("unit is not a block"));
                };
                for stmt in stmts {
                    self.emit_stmt(stmt)?;
                }
            }
            let frame = self
                .frames
                .pop()
                .ok_or_else(|| Error::internal("unbalanced scope frames"))?;
            for line in self.exit_lines(&frame)? {
                self.writeln(&line);
            }
            self.dedent();
            self.writeln("}");
        }
        self.dedent();
        self.writeln("}");
        self.writeln("");
        Ok(())
    }

    fn generate_main(&mut self) -> Result<()> {
        self.writeln("int main(void) {");
        self.indent();
        self.writeln("_verse_init_typeinfo();");
        self.writeln("_verse_init();");
        match self.ctx.main_fn {
            Some(main) => {
                let name = self.var_name(main);
                let ret = match self.ctx.resolved_kind(self.ctx.var(main).ty) {
                    TypeKind::Func { ret, .. } => *ret,
                    _ => VOID,
                };
                if self.ctx.is_integer(ret) {
                    self.writeln(&format!("return (int){}();", name));
                } else {
                    self.writeln(&format!("{}();", name));
                    self.writeln("return 0;");
                }
            }
            None => self.writeln("return 0;"),
        }
        self.dedent();
        self.writeln("}");
        Ok(())
    }

    /// Generate the complete C source file
    pub fn generate_source(&mut self) -> Result<String> {
        self.output.clear();
        self.indent = 0;

        self.write_raw(&generate_c_runtime());
        self.writeln("");
        self.generate_includes();

        debug!("emitting {} used types", self.ctx.used_types.len());
        self.generate_type_decls()?;
        self.generate_helpers()?;
        self.generate_typeinfo_decls()?;
        self.generate_globals()?;
        self.generate_typeinfo_init()?;

        let items = self.functions()?;
        debug!("emitting {} functions", items.len());
        self.generate_prototypes(&items)?;
        for item in &items {
            self.generate_function(item)?;
        }

        self.generate_init()?;
        self.generate_main()?;
        Ok(std::mem::take(&mut self.output))
    }
}

impl<'a> CodeGen for CCodeGen<'a> {
    fn generate(&mut self) -> Result<String> {
        self.generate_source()
    }

    fn name(&self) -> &str {
        "C"
    }

    fn extension(&self) -> &str {
        "c"
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use crate::frontend::package::MemoryPackageLoader;
    use crate::frontend::semantic::analyze_program;
    use pretty_assertions::assert_eq;

    pub(crate) fn generate_with(src: &str, loader: &mut MemoryPackageLoader) -> String {
        let mut ctx = CompilationContext::new();
        analyze_program(&mut ctx, loader, src, "main.vs").unwrap();
        let mut codegen = CCodeGen::new(&ctx);
        codegen.generate_source().unwrap()
    }

    pub(crate) fn generate_c(src: &str) -> String {
        generate_with(src, &mut MemoryPackageLoader::new())
    }

    /// Name parts of a Verse function defined on `line`: `_f<var>(` gives
    /// `[var]`, a polymorph `_f<var>_<id>(` gives `[var, id]`. Runtime and
    /// value helpers (`_free_N`, `_verse_*`) give `None`.
    fn defined_function(line: &str) -> Option<Vec<&str>> {
        if !(line.starts_with("static") && line.ends_with(" {")) {
            return None;
        }
        line.split(' ').find_map(|word| {
            let rest = word.strip_prefix("_f")?;
            let paren = rest.find('(')?;
            let parts: Vec<&str> = rest[..paren].split('_').collect();
            let numeric = parts.iter().all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
            (numeric && parts.len() <= 2).then_some(parts)
        })
    }

    /// Body of the emitted Verse function whose signature line contains `needle`
    pub(crate) fn function_text<'s>(c: &'s str, needle: &str) -> &'s str {
        let start = c
            .lines()
            .filter(|l| l.contains(needle) && defined_function(l).is_some())
            .map(|l| l.as_ptr() as usize - c.as_ptr() as usize)
            .next()
            .unwrap();
        let end = start + c[start..].find("\n}\n").unwrap();
        &c[start..end]
    }

    fn defines_polymorph(line: &str) -> bool {
        defined_function(line).is_some_and(|parts| parts.len() == 2)
    }

    #[test]
    fn test_sections_in_order() {
        let c = generate_c("#include \"math.h\";\ncount: int = 2;\nfn main() -> int { return count; }");
        let order = [
            "/* Verse Runtime Support */",
            "#include \"math.h\"",
            "static _verse_typeinfo _ti_",
            "static int64_t _v",
            "static void _verse_init_typeinfo(void) {",
            "static int64_t _f",
            "static void _verse_init(void) {",
            "int main(void) {",
        ];
        let mut at = 0;
        for needle in order {
            let found = c[at..].find(needle);
            assert!(found.is_some(), "'{}' missing or out of order", needle);
            at += found.unwrap_or(0) + needle.len();
        }
    }

    #[test]
    fn test_main_calls_init_and_user_main() {
        let c = generate_c("fn main() -> int { return 3; }");
        let main = &c[c.find("int main(void) {").unwrap()..];
        assert!(main.contains("_verse_init_typeinfo();"));
        assert!(main.contains("_verse_init();"));
        assert!(main.contains("return (int)_f"));

        let c = generate_c("fn main() { }");
        let main = &c[c.find("int main(void) {").unwrap()..];
        assert!(main.contains("return 0;"));
    }

    #[test]
    fn test_program_without_main() {
        let c = generate_c("x: int = 1;");
        let main = &c[c.find("int main(void) {").unwrap()..];
        assert_eq!(main.lines().filter(|l| l.contains("return")).count(), 1);
        assert!(main.contains("return 0;"));
    }

    #[test]
    fn test_global_initializers_run_from_init() {
        let c = generate_c("x: int = 1 + 2;");
        let init = &c[c.find("static void _verse_init(void) {").unwrap()..];
        // folded before code generation
        assert!(init.contains(" = 3LL;"));
        assert!(!c.contains("1LL + 2LL"));
    }

    #[test]
    fn test_package_globals_initialize_first() {
        let mut loader = MemoryPackageLoader::new();
        loader.add_file("lib/conf", "conf.vs", "level: int = 7;");
        let c = generate_with("#import \"lib/conf\";\nmine: int = 9;", &mut loader);
        let init = &c[c.find("static void _verse_init(void) {").unwrap()..];
        assert!(init.find("7LL").unwrap() < init.find("9LL").unwrap());
    }

    #[test]
    fn test_polymorphs_emit_one_body_each() {
        let c = generate_c(
            "fn id(x: $T) -> T { return x; }
             fn main() { a := id(1); b := id(\"s\"); c := id(2); }",
        );
        let bodies = c.lines().filter(|l| defines_polymorph(l)).count();
        assert_eq!(bodies, 2);
    }

    #[test]
    fn test_extern_functions_use_their_c_names() {
        let c = generate_c("#extern fn puts(s: ptr) -> s32;\nfn main() { puts(null); }");
        assert!(c.contains("puts(NULL)"));
        assert!(!c.contains("static int32_t puts("));
    }

    #[test]
    fn test_angle_includes() {
        let c = generate_c("#include \"<math.h>\";");
        assert!(c.contains("#include <math.h>\n"));
    }

    #[test]
    fn test_output_is_deterministic() {
        let src = "type P struct { name: string; n: int; }
                   fn main() { p := P{name = \"a\", n = 1}; println(p); }";
        assert_eq!(generate_c(src), generate_c(src));
    }

    #[test]
    fn test_function_text_skips_value_helpers() {
        let c = generate_c("fn main() { s := \"x\"; }");
        assert!(c.contains("static void _free_"));
        let body = function_text(&c, "static void _f");
        assert!(!body.starts_with("static void _free_"));
        assert!(body.contains("(void) {"));
        assert!(defined_function("static void _f12(void) {").is_some());
        assert!(defined_function("static void _free_12(char** v) {").is_none());
        assert!(defines_polymorph("static int64_t _f3_1(int64_t _v4) {"));
    }

    #[test]
    fn test_backend_identity() {
        let ctx = CompilationContext::new();
        let codegen = CCodeGen::new(&ctx);
        assert_eq!(codegen.name(), "C");
        assert_eq!(codegen.extension(), "c");
    }
}
