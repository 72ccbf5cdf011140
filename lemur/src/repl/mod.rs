//! REPL (Read-Eval-Print Loop)
//!
//! Each line runs through the full pipeline, but the symbol table, constant
//! pool and globals array are threaded from line to line so earlier
//! bindings stay visible.

use crate::compiler::symbols::SymbolTable;
use crate::compiler::Compiler;
use crate::lexer::tokenize;
use crate::optimizer::optimize;
use crate::parser::parse;
use crate::value::Value;
use crate::vm::{Vm, GLOBALS_SIZE};
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::path::PathBuf;

const PROMPT: &str = ">> ";
const HISTORY_FILE: &str = ".lemur_history";

/// REPL state
pub struct Repl {
    editor: DefaultEditor,
    symbols: SymbolTable,
    constants: Vec<Value>,
    globals: Vec<Value>,
    history_path: Option<PathBuf>,
}

impl Repl {
    /// Create a new REPL
    pub fn new() -> RlResult<Self> {
        let editor = DefaultEditor::new()?;

        let mut symbols = SymbolTable::new();
        for (index, builtin) in crate::builtins::BUILTINS.iter().enumerate() {
            symbols.define_builtin(index, builtin.name);
        }

        let history_path = dirs_home().map(|home| home.join(HISTORY_FILE));

        let mut repl = Repl {
            editor,
            symbols,
            constants: Vec::new(),
            globals: vec![Value::Null; GLOBALS_SIZE],
            history_path,
        };

        if let Some(path) = &repl.history_path {
            let _ = repl.editor.load_history(path);
        }

        Ok(repl)
    }

    /// Run the REPL
    pub fn run(&mut self) -> RlResult<()> {
        println!("Lemur programming language");
        println!("Type :help for help, :quit to exit.\n");

        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    let _ = self.editor.add_history_entry(line);

                    if line.starts_with(':') {
                        if self.handle_command(line) {
                            break;
                        }
                        continue;
                    }

                    self.eval_line(line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("Goodbye!");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }

        if let Some(path) = &self.history_path {
            let _ = self.editor.save_history(path);
        }

        Ok(())
    }

    /// Handle REPL commands (starting with :)
    fn handle_command(&mut self, command: &str) -> bool {
        match command {
            ":quit" | ":q" | ":exit" => {
                println!("Goodbye!");
                true
            }
            ":help" | ":h" | ":?" => {
                self.print_help();
                false
            }
            ":clear" => {
                print!("\x1B[2J\x1B[1;1H");
                false
            }
            _ => {
                println!("Unknown command: {command}");
                println!("Type :help for help.");
                false
            }
        }
    }

    fn print_help(&self) {
        println!("Lemur REPL Commands:");
        println!("  :help, :h, :?   Show this help");
        println!("  :quit, :q       Exit the REPL");
        println!("  :clear          Clear the screen");
        println!();
        println!("You can enter:");
        println!("  - Expressions: 1 + 2, \"le\" + \"mur\", [1, 2, 3][0]");
        println!("  - Bindings: let x = 5; const y = 10;");
        println!("  - Functions: function add(a, b) {{ a + b }}");
        println!();
        println!("Built-in functions:");
        println!("  len(x)          Length of a string or array");
        println!("  first(xs)       First element of an array");
        println!("  last(xs)        Last element of an array");
        println!("  rest(xs)        Array without its first element");
        println!("  push(xs, x)     New array with x appended");
        println!("  print(...)      Print values");
        println!("  println(...)    Print values with newline");
    }

    /// Compile and run one line, keeping compiler and VM state
    fn eval_line(&mut self, line: &str) {
        let tokens = match tokenize(line) {
            Ok(tokens) => tokens,
            Err(err) => {
                eprintln!("Lexer error: {}", err.message());
                return;
            }
        };

        let program = match parse("<repl>", line, tokens) {
            Ok(program) => program,
            Err(err) => {
                eprintln!("Parser error: {}", err.message());
                return;
            }
        };

        let program = optimize(program);

        let mut compiler = Compiler::with_state(self.symbols.clone(), self.constants.clone());
        if let Err(err) = compiler.compile(&program) {
            eprintln!("Compiler error: {}", err.message());
            return;
        }

        let bytecode = compiler.bytecode();
        let (symbols, constants) = compiler.into_state();
        self.symbols = symbols;
        self.constants = constants;

        let globals = std::mem::take(&mut self.globals);
        let mut vm = Vm::with_globals(bytecode, globals);
        let result = vm.run();
        let last_popped = vm.last_popped().clone();
        self.globals = vm.into_globals();

        match result {
            Ok(()) => println!("{last_popped}"),
            Err(err) => eprintln!("Runtime error: {err}"),
        }
    }
}

/// Get home directory
fn dirs_home() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}
