//! Single-pass bytecode compiler
//!
//! Walks the AST once, emitting instructions into a stack of compilation
//! scopes (one per function literal being compiled) while the symbol table
//! performs lexical resolution and closure conversion. Jump targets are
//! back-patched; the constant pool deduplicates integers and strings.

pub mod bytecode;
pub mod symbols;

use crate::ast::{AssignOp, Block, Expr, FunctionLit, InfixOp, PostfixOp, PrefixOp, Program, Stmt};
use crate::builtins::BUILTINS;
use crate::code::{self, Instructions, Opcode, OPTIONAL_PARAMETER_INSTRUCTIONS};
use crate::error::{CompileError, Result};
use crate::util;
use crate::value::{CompiledFunction, Value};
use bytecode::Bytecode;
use std::rc::Rc;
use symbols::{Symbol, SymbolKind, SymbolScope, SymbolTable};

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

/// Instruction buffer for one function body being compiled, remembering the
/// last two emitted instructions for peephole decisions
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// The bytecode compiler
pub struct Compiler {
    constants: Vec<Value>,
    symbols: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbols.define_builtin(index, builtin.name);
        }

        Compiler {
            constants: Vec::new(),
            symbols,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Resume compilation with an existing symbol table and constant pool;
    /// the REPL uses this to keep bindings across lines
    pub fn with_state(symbols: SymbolTable, constants: Vec<Value>) -> Self {
        Compiler {
            constants,
            symbols,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Hand the symbol table and constant pool back to the embedder
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbols, self.constants)
    }

    pub fn compile(&mut self, program: &Program) -> Result<()> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current_instructions().clone(),
            constants: self.constants.clone(),
        }
    }

    /*
     * Statements
     */

    fn compile_statement(&mut self, statement: &Stmt) -> Result<()> {
        match statement {
            Stmt::Expr(expression) => {
                self.compile_expression(expression)?;

                // Bindings already consume their value, an additional OpPop
                // is not required.
                if !self.last_instruction_is(Opcode::SetGlobal)
                    && !self.last_instruction_is(Opcode::SetLocal)
                {
                    self.emit(Opcode::Pop, &[]);
                }
            }

            Stmt::Block(block) => self.compile_block(block)?,

            Stmt::Let { name, value } => {
                // Defined before the value compiles so the value can refer
                // to its own binding.
                let symbol = self.symbols.define(name, SymbolKind::Variable)?;
                self.compile_expression(value)?;
                self.emit_binding(&symbol);
            }

            Stmt::Const { name, value } => {
                let symbol = self.symbols.define(name, SymbolKind::Constant)?;
                self.compile_expression(value)?;
                self.emit_binding(&symbol);
            }

            Stmt::Assign { name, op, value } => {
                let symbol = self.resolve(name)?;
                if symbol.kind == SymbolKind::Constant {
                    return Err(CompileError::compiler(format!(
                        "assignment to constant variable: {name}"
                    )));
                }

                if *op != AssignOp::Assign {
                    self.load_symbol(&symbol);
                }

                self.compile_expression(value)?;

                match op {
                    AssignOp::AddAssign | AssignOp::Incr => {
                        self.emit(Opcode::Add, &[]);
                    }
                    AssignOp::SubAssign | AssignOp::Decr => {
                        self.emit(Opcode::Sub, &[]);
                    }
                    AssignOp::MulAssign => {
                        self.emit(Opcode::Mul, &[]);
                    }
                    AssignOp::DivAssign => {
                        self.emit(Opcode::Div, &[]);
                    }
                    AssignOp::Assign => {}
                }

                self.emit_assignment(&symbol);
            }

            Stmt::Postfix { name, op } => {
                let symbol = self.resolve(name)?;
                if symbol.kind == SymbolKind::Constant {
                    return Err(CompileError::compiler(format!(
                        "assignment to constant variable: {name}"
                    )));
                }

                // The first load is the statement's value (the pre value);
                // the second is the operand of the increment.
                self.load_symbol(&symbol);
                self.load_symbol(&symbol);

                let one = self.add_constant(Value::Integer(1));
                self.emit(Opcode::Constant, &[one]);
                match op {
                    PostfixOp::Incr => self.emit(Opcode::Add, &[]),
                    PostfixOp::Decr => self.emit(Opcode::Sub, &[]),
                };

                self.emit_assignment(&symbol);
                self.emit(Opcode::Pop, &[]);
            }

            Stmt::Return(value) => {
                match value {
                    Some(expression) => self.compile_expression(expression)?,
                    None => {
                        self.emit(Opcode::Null, &[]);
                    }
                }
                self.emit(Opcode::Return, &[]);
            }
        }

        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<()> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    /*
     * Expressions
     */

    fn compile_expression(&mut self, expression: &Expr) -> Result<()> {
        match expression {
            Expr::IntLit(value) => {
                let index = self.add_constant(Value::Integer(*value));
                self.emit(Opcode::Constant, &[index]);
            }

            Expr::BoolLit(true) => {
                self.emit(Opcode::True, &[]);
            }
            Expr::BoolLit(false) => {
                self.emit(Opcode::False, &[]);
            }

            Expr::StringLit(value) => {
                let index = self.add_constant(Value::string(value.clone()));
                self.emit(Opcode::Constant, &[index]);
            }

            Expr::Ident(name) => {
                let symbol = self.resolve(name)?;
                self.load_symbol(&symbol);
            }

            Expr::Prefix { op, right } => {
                self.compile_expression(right)?;
                match op {
                    PrefixOp::Bang => self.emit(Opcode::Bang, &[]),
                    PrefixOp::Minus => self.emit(Opcode::Minus, &[]),
                };
            }

            Expr::Infix { op, left, right } => self.compile_infix(*op, left, right)?,

            Expr::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref())?,

            Expr::While { condition, body } => {
                let before_condition = self.current_instructions().len();

                self.compile_expression(condition)?;
                let exit_jump = self.emit(Opcode::JumpNotTruthy, &[9999]);

                self.compile_block(body)?;

                // Keep the last body value on the stack; the loop is an
                // expression.
                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                }

                self.emit(Opcode::Jump, &[before_condition]);

                let after_body = self.current_instructions().len();
                self.change_operand(exit_jump, after_body);
            }

            Expr::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()]);
            }

            Expr::Hash(pairs) => {
                // Sort by source rendering so the constant pool layout is a
                // deterministic function of the program text.
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by_key(|(key, _)| key.to_string());

                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2]);
            }

            Expr::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[]);
            }

            Expr::Function(lit) => self.compile_function_literal(lit)?,

            Expr::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::Call, &[arguments.len()]);
            }
        }

        Ok(())
    }

    fn compile_infix(&mut self, op: InfixOp, left: &Expr, right: &Expr) -> Result<()> {
        // && and || only evaluate the right operand if the left did not
        // short-circuit; they lower through the conditional scheme.
        if op == InfixOp::And || op == InfixOp::Or {
            return self.compile_logical_infix(op, left, right);
        }

        // The VM only knows > and >=; < and <= swap their operands.
        if op == InfixOp::Lt || op == InfixOp::LtEq {
            self.compile_expression(right)?;
            self.compile_expression(left)?;

            match op {
                InfixOp::Lt => self.emit(Opcode::GreaterThan, &[]),
                _ => self.emit(Opcode::GreaterOrEqual, &[]),
            };
            return Ok(());
        }

        self.compile_expression(left)?;
        self.compile_expression(right)?;

        match op {
            InfixOp::Add => self.emit(Opcode::Add, &[]),
            InfixOp::Sub => self.emit(Opcode::Sub, &[]),
            InfixOp::Mul => self.emit(Opcode::Mul, &[]),
            InfixOp::Div => self.emit(Opcode::Div, &[]),
            InfixOp::Gt => self.emit(Opcode::GreaterThan, &[]),
            InfixOp::GtEq => self.emit(Opcode::GreaterOrEqual, &[]),
            InfixOp::Eq => self.emit(Opcode::Equal, &[]),
            InfixOp::NotEq => self.emit(Opcode::NotEqual, &[]),
            _ => {
                return Err(CompileError::compiler(format!("unknown operator {op}")));
            }
        };

        Ok(())
    }

    fn compile_logical_infix(&mut self, op: InfixOp, left: &Expr, right: &Expr) -> Result<()> {
        let expr_block = |expression: Expr| Block {
            statements: vec![Stmt::Expr(expression)],
        };

        let (consequence, alternative) = match op {
            // a && b  →  if (a) { b } else { false }
            InfixOp::And => (
                expr_block(right.clone()),
                expr_block(Expr::BoolLit(false)),
            ),
            // a || b  →  if (a) { true } else { b }
            _ => (expr_block(Expr::BoolLit(true)), expr_block(right.clone())),
        };

        let lowered = Expr::If {
            condition: Box::new(left.clone()),
            consequence,
            alternative: Some(alternative),
        };

        self.compile_expression(&lowered)?;
        self.emit(Opcode::CastToBool, &[]);

        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        consequence: &Block,
        alternative: Option<&Block>,
    ) -> Result<()> {
        self.compile_expression(condition)?;

        // Placeholder operand, patched once the consequence length is known.
        let jump_not_truthy = self.emit(Opcode::JumpNotTruthy, &[9999]);

        self.compile_block(consequence)?;

        // Keep the last consequence value on the stack; the conditional is
        // an expression.
        if self.last_instruction_is(Opcode::Pop) {
            self.remove_last_pop();
        }

        let jump = self.emit(Opcode::Jump, &[9999]);

        let after_consequence = self.current_instructions().len();
        self.change_operand(jump_not_truthy, after_consequence);

        match alternative {
            None => {
                self.emit(Opcode::Null, &[]);
            }
            Some(block) => {
                self.compile_block(block)?;

                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                }
            }
        }

        let after_alternative = self.current_instructions().len();
        self.change_operand(jump, after_alternative);

        Ok(())
    }

    fn compile_function_literal(&mut self, lit: &FunctionLit) -> Result<()> {
        self.enter_scope();

        if let Some(name) = &lit.name {
            self.symbols.define_function_name(name);
        }

        for parameter in &lit.parameters {
            let symbol = self.symbols.define(parameter, SymbolKind::Variable)?;

            if let Some(default) = lit.defaults.get(parameter) {
                let before = self.current_instructions().len();
                self.compile_expression(default)?;
                let inserted = self.current_instructions().len() - before;

                // The VM skips a fixed number of bytes per omitted argument;
                // the padding keeps every default slot the same width.
                if inserted > OPTIONAL_PARAMETER_INSTRUCTIONS {
                    return Err(CompileError::compiler(format!(
                        "default value for parameter '{parameter}' is too complex"
                    )));
                }
                for _ in inserted..OPTIONAL_PARAMETER_INSTRUCTIONS {
                    self.emit(Opcode::Nop, &[]);
                }

                self.emit(Opcode::AssignLocal, &[symbol.index]);
            }
        }

        self.compile_block(&lit.body)?;

        if self.last_instruction_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }

        // Guarantee every function returns, including empty bodies.
        if !self.last_instruction_is(Opcode::Return) {
            if !self.last_instruction_is(Opcode::Null) {
                self.emit(Opcode::Null, &[]);
            }
            self.emit(Opcode::Return, &[]);
        }

        let free_symbols = self.symbols.free_symbols.clone();
        let num_locals = self.symbols.num_definitions;
        let instructions = self.leave_scope();

        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let func = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: lit.parameters.len(),
            num_defaults: lit.defaults.len(),
        };

        let fn_index = self.add_constant(Value::CompiledFunction(Rc::new(func)));
        self.emit(Opcode::Closure, &[fn_index, free_symbols.len()]);

        if lit.define {
            let name = lit.name.as_deref().unwrap_or_default();
            let symbol = self.symbols.define(name, SymbolKind::Variable)?;
            self.emit_binding(&symbol);
        }

        Ok(())
    }

    /*
     * Symbols
     */

    fn resolve(&mut self, name: &str) -> Result<Symbol> {
        if let Some(symbol) = self.symbols.resolve(name) {
            return Ok(symbol);
        }

        let names = self.symbols.visible_names();
        let candidates: Vec<&str> = names.iter().map(String::as_str).collect();
        let hint = util::suggestion_hint(name, &candidates);

        Err(CompileError::compiler(format!(
            "identifier not found: {name}{hint}"
        )))
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(Opcode::CurrentClosure, &[]),
        };
    }

    fn emit_binding(&mut self, symbol: &Symbol) {
        if symbol.scope == SymbolScope::Global {
            self.emit(Opcode::SetGlobal, &[symbol.index]);
        } else {
            self.emit(Opcode::SetLocal, &[symbol.index]);
        }
    }

    fn emit_assignment(&mut self, symbol: &Symbol) {
        if symbol.scope == SymbolScope::Global {
            self.emit(Opcode::AssignGlobal, &[symbol.index]);
        } else {
            self.emit(Opcode::AssignLocal, &[symbol.index]);
        }
    }

    /*
     * Scopes
     */

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());

        let outer = std::mem::take(&mut self.symbols);
        self.symbols = SymbolTable::enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().unwrap_or_default();

        if let Some(outer) = self.symbols.take_outer() {
            self.symbols = outer;
        }

        scope.instructions
    }

    fn current_scope(&mut self) -> &mut CompilationScope {
        // Invariant: the scope stack always holds at least the main scope.
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn current_instructions(&self) -> &Instructions {
        &self.scopes[self.scopes.len() - 1].instructions
    }

    /*
     * Instruction buffer
     */

    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let instruction = code::make(op, operands);
        let position = self.add_instruction(&instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn add_instruction(&mut self, instruction: &[u8]) -> usize {
        let scope = self.current_scope();
        let position = scope.instructions.len();
        scope.instructions.extend_from_slice(instruction);
        position
    }

    fn set_last_instruction(&mut self, opcode: Opcode, position: usize) {
        let scope = self.current_scope();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, opcode: Opcode) -> bool {
        let Some(scope) = self.scopes.last() else {
            return false;
        };
        if scope.instructions.is_empty() {
            return false;
        }
        scope
            .last_instruction
            .is_some_and(|last| last.opcode == opcode)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope();
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        let Some(last) = self.current_scope().last_instruction else {
            return;
        };

        let instruction = code::make(Opcode::Return, &[]);
        self.replace_instruction(last.position, &instruction);

        if let Some(last) = &mut self.current_scope().last_instruction {
            last.opcode = Opcode::Return;
        }
    }

    fn change_operand(&mut self, position: usize, operand: usize) {
        let Some(op) = Opcode::from_byte(self.current_instructions()[position]) else {
            return;
        };
        let instruction = code::make(op, &[operand]);
        self.replace_instruction(position, &instruction);
    }

    fn replace_instruction(&mut self, position: usize, instruction: &[u8]) {
        let scope = self.current_scope();
        scope.instructions[position..position + instruction.len()].copy_from_slice(instruction);
    }

    /*
     * Constant pool
     */

    fn add_constant(&mut self, value: Value) -> usize {
        match &value {
            Value::Integer(_) | Value::String(_) => {
                for (index, existing) in self.constants.iter().enumerate() {
                    if *existing == value {
                        return index;
                    }
                }
            }
            _ => {}
        }

        self.constants.push(value);
        self.constants.len() - 1
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
