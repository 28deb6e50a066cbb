//! Verse Compiler CLI
//!
//! Reads one Verse source file (or stdin), compiles it and writes the C
//! translation unit to a file or stdout.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use verse::middle::CompilationContext;
use verse::utils::Diagnostic;
use verse::{analyze_source, compile_source, CompilerOptions};

/// Diagnostic rendering on stderr
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ErrorFormat {
    /// `file:line: error: message`
    Human,
    /// One JSON object per diagnostic
    Json,
}

/// Verse Compiler
#[derive(Parser, Debug)]
#[command(name = "versec")]
#[command(version = "0.1.0")]
#[command(about = "Verse compiler - compiles Verse source to C")]
struct Cli {
    /// Input source file (.vs); stdin when omitted
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output file; stdout when omitted
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Additional import search directory
    #[arg(short = 'I', value_name = "DIR")]
    import_paths: Vec<PathBuf>,

    /// Check the program for errors without generating C
    #[arg(long)]
    check: bool,

    /// Diagnostic format
    #[arg(long, value_enum, default_value = "human")]
    error_format: ErrorFormat,
}

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // help and version go to stdout and succeed, usage errors fail
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Compile as configured. `Ok(false)` means diagnostics were reported.
fn run(cli: &Cli) -> Result<bool> {
    let (source, options) = load_input(cli)?;
    let mut ctx = CompilationContext::new();

    if cli.check {
        return Ok(match analyze_source(&mut ctx, &source, &options) {
            Ok(()) => {
                info!("{}: no errors", options.main_file_name);
                true
            }
            Err(err) => {
                report(cli, &Diagnostic::from_error(&err, &ctx.files));
                false
            }
        });
    }

    let c = match compile_source(&mut ctx, &source, &options) {
        Ok(c) => c,
        Err(err) => {
            report(cli, &Diagnostic::from_error(&err, &ctx.files));
            return Ok(false);
        }
    };

    match &cli.output {
        Some(path) => {
            fs::write(path, &c).with_context(|| format!("writing {}", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => io::stdout().write_all(c.as_bytes()).context("writing to stdout")?,
    }
    Ok(true)
}

/// Source text and driver options; imports resolve against the main file's
/// directory first, then each `-I` in order
fn load_input(cli: &Cli) -> Result<(String, CompilerOptions)> {
    let mut import_paths = Vec::with_capacity(cli.import_paths.len() + 1);
    let (source, main_file_name) = match &cli.input {
        Some(path) => {
            let source = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            import_paths.push(source_dir(path));
            (source, path.display().to_string())
        }
        None => {
            let mut source = String::new();
            io::stdin().read_to_string(&mut source).context("reading stdin")?;
            import_paths.push(PathBuf::from("."));
            (source, "<stdin>".to_string())
        }
    };
    import_paths.extend(cli.import_paths.iter().cloned());
    Ok((source, CompilerOptions { import_paths, main_file_name }))
}

fn source_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn report(cli: &Cli, diagnostic: &Diagnostic) {
    match cli.error_format {
        ErrorFormat::Human => eprintln!("{}", diagnostic.render()),
        ErrorFormat::Json => eprintln!("{}", diagnostic.to_json()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from(["versec", "src/app.vs", "-o", "app.c", "-I", "lib", "-I", "vendor", "--check"]).unwrap();
        assert_eq!(cli.input, Some(PathBuf::from("src/app.vs")));
        assert_eq!(cli.output, Some(PathBuf::from("app.c")));
        assert_eq!(cli.import_paths, vec![PathBuf::from("lib"), PathBuf::from("vendor")]);
        assert!(cli.check);
        assert_eq!(cli.error_format, ErrorFormat::Human);
    }

    #[test]
    fn test_second_positional_is_usage_error() {
        let err = Cli::try_parse_from(["versec", "a.vs", "b.vs"]).unwrap_err();
        assert!(err.use_stderr());
    }

    #[test]
    fn test_json_error_format() {
        let cli = Cli::try_parse_from(["versec", "--error-format", "json"]).unwrap();
        assert_eq!(cli.error_format, ErrorFormat::Json);
        assert!(cli.input.is_none());
    }

    #[test]
    fn test_source_dir() {
        assert_eq!(source_dir(Path::new("main.vs")), PathBuf::from("."));
        assert_eq!(source_dir(Path::new("app/main.vs")), PathBuf::from("app"));
    }
}
