//! Lemur CLI

use clap::{Parser, Subcommand};
use lemur::compiler::bytecode::Bytecode;
use lemur::compiler::Compiler;
use lemur::error::report_error;
use lemur::optimizer::optimize;
use lemur::vm::Vm;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "lemur", version, about = "The Lemur programming language")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile and run a Lemur source file
    Run {
        /// Source file to run
        file: PathBuf,
    },
    /// Compile a source file to a bytecode binary
    Build {
        /// Source file to compile
        file: PathBuf,
        /// Output path (defaults to the input with a .out extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Execute a compiled bytecode binary
    Exec {
        /// Compiled file to execute
        file: PathBuf,
    },
    /// Start the interactive REPL
    Repl,
    /// Parse and dump AST (debug)
    Parse {
        /// Source file to parse
        file: PathBuf,
    },
    /// Tokenize and dump tokens (debug)
    Tokens {
        /// Source file to tokenize
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { file } => run_file(&file),
        Command::Build { file, output } => build_file(&file, output),
        Command::Exec { file } => exec_file(&file),
        Command::Repl => run_repl(),
        Command::Parse { file } => parse_file(&file),
        Command::Tokens { file } => tokenize_file(&file),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytecode = compile_file(path)?;

    let mut vm = Vm::new(bytecode);
    vm.run()?;

    Ok(())
}

fn build_file(path: &Path, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let bytecode = compile_file(path)?;
    let bytes = bytecode.write();

    let output = output.unwrap_or_else(|| path.with_extension("out"));
    std::fs::write(&output, &bytes)?;

    println!("wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

fn exec_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let bytecode = Bytecode::read(&bytes)?;

    let mut vm = Vm::new(bytecode);
    vm.run()?;

    Ok(())
}

fn run_repl() -> Result<(), Box<dyn std::error::Error>> {
    let mut repl = lemur::repl::Repl::new()?;
    repl.run()?;
    Ok(())
}

fn parse_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();

    let tokens = lemur::lexer::tokenize(&source)
        .map_err(|e| reported(&filename, &source, e))?;
    let ast = lemur::parser::parse(&filename, &source, tokens)
        .map_err(|e| reported(&filename, &source, e))?;

    println!("{}", serde_json::to_string_pretty(&ast)?);
    Ok(())
}

fn tokenize_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;

    let tokens = lemur::lexer::tokenize(&source)
        .map_err(|e| reported(&path.display().to_string(), &source, e))?;
    for (token, span) in &tokens {
        println!("{token:?} @ {}..{}", span.start, span.end);
    }

    Ok(())
}

fn compile_file(path: &Path) -> Result<Bytecode, Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();

    let tokens = lemur::lexer::tokenize(&source)
        .map_err(|e| reported(&filename, &source, e))?;
    let program = lemur::parser::parse(&filename, &source, tokens)
        .map_err(|e| reported(&filename, &source, e))?;
    let program = optimize(program);

    let mut compiler = Compiler::new();
    compiler
        .compile(&program)
        .map_err(|e| reported(&filename, &source, e))?;

    Ok(compiler.bytecode())
}

/// Print a pretty report for a compile error and pass it along
fn reported(
    filename: &str,
    source: &str,
    error: lemur::CompileError,
) -> Box<dyn std::error::Error> {
    report_error(filename, source, &error);
    Box::new(error)
}
