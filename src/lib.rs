//! Verse Compiler
//!
//! Front-end (lexer, parser, two-pass semantic analysis) for the Verse
//! language plus a C code generator. The driver functions here tie the
//! layers together; the `versec` binary is a thin CLI over them.

pub mod backend;
pub mod frontend;
pub mod middle;
pub mod stdlib;
pub mod types;
pub mod utils;

use std::path::PathBuf;

use log::info;

use backend::{CCodeGen, CodeGen};
use frontend::package::{FsPackageLoader, PackageLoader};
use frontend::semantic::analyze_program;
use middle::CompilationContext;
use utils::Result;

/// Driver configuration
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Directories searched for `#import`, in order
    pub import_paths: Vec<PathBuf>,
    /// Name of the main file in diagnostics
    pub main_file_name: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            import_paths: vec![PathBuf::from(".")],
            main_file_name: "<stdin>".to_string(),
        }
    }
}

/// Run the front-end only, importing packages from the filesystem
pub fn analyze_source(ctx: &mut CompilationContext, source: &str, options: &CompilerOptions) -> Result<()> {
    let mut loader = FsPackageLoader::new(options.import_paths.clone());
    analyze_program(ctx, &mut loader, source, &options.main_file_name)
}

/// Compile `source` to a C translation unit, importing packages from the
/// filesystem
pub fn compile_source(ctx: &mut CompilationContext, source: &str, options: &CompilerOptions) -> Result<String> {
    let mut loader = FsPackageLoader::new(options.import_paths.clone());
    compile_with_loader(ctx, &mut loader, source, &options.main_file_name)
}

/// Compile `source` to C with a caller-supplied package loader
pub fn compile_with_loader(
    ctx: &mut CompilationContext,
    loader: &mut dyn PackageLoader,
    source: &str,
    file_name: &str,
) -> Result<String> {
    analyze_program(ctx, loader, source, file_name)?;
    info!("analyzed {} ({} compilation units)", file_name, ctx.units.len());

    let mut codegen = CCodeGen::new(&*ctx);
    let output = codegen.generate()?;
    info!("{} backend wrote {} bytes", codegen.name(), output.len());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::package::MemoryPackageLoader;
    use crate::utils::{Diagnostic, Error};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compile_simple_program() {
        let mut ctx = CompilationContext::new();
        let c = compile_source(&mut ctx, "fn main() { println(\"hi\"); }", &CompilerOptions::default()).unwrap();
        assert!(c.contains("int main(void) {"));
        assert!(c.contains("\"hi\""));
    }

    #[test]
    fn test_compile_with_memory_packages() {
        let mut loader = MemoryPackageLoader::new();
        loader.add_file("util", "util.vs", "fn inc(x: int) -> int { return x + 1; }");
        let mut ctx = CompilationContext::new();
        let c = compile_with_loader(
            &mut ctx,
            &mut loader,
            "#import \"util\";\nfn main() { n := util.inc(1); }",
            "main.vs",
        )
        .unwrap();
        assert!(c.contains(" + 1LL)"));
    }

    #[test]
    fn test_errors_carry_file_and_line() {
        let mut ctx = CompilationContext::new();
        let options = CompilerOptions {
            main_file_name: "bad.vs".to_string(),
            ..CompilerOptions::default()
        };
        let err = analyze_source(&mut ctx, "fn main() {\n    x := y;\n}", &options).unwrap_err();
        assert!(matches!(err, Error::UndefinedVariable { .. }));
        let diag = Diagnostic::from_error(&err, &ctx.files);
        assert_eq!(diag.file, "bad.vs");
        assert_eq!(diag.line, 2);
        assert!(diag.render().starts_with("bad.vs:2: error: "));
    }

    #[test]
    fn test_missing_package_is_reported() {
        let mut ctx = CompilationContext::new();
        let err = compile_source(&mut ctx, "#import \"no/such/pkg\";", &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, Error::PackageNotFound { .. }));
    }
}
