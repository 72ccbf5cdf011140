//! Stack-based virtual machine
//!
//! Classical fetch-decode-execute over the bytecode ISA: an operand stack,
//! a call-frame stack and a flat globals array. Closures carry their
//! captured free values; self-recursive tail calls reuse the current frame
//! so deep recursion runs in constant frame depth.

mod error;
mod frame;

pub use error::{ErrorKind, RuntimeError, VmResult};
pub use frame::Frame;

use crate::builtins::BUILTINS;
use crate::code::{self, Opcode, OPTIONAL_PARAMETER_INSTRUCTIONS};
use crate::compiler::bytecode::Bytecode;
use crate::value::{Closure, CompiledFunction, HashPair, Value};
use std::collections::HashMap;
use std::rc::Rc;

/// Operand stack capacity
pub const STACK_SIZE: usize = 2048;
/// Globals array capacity
pub const GLOBALS_SIZE: usize = 65536;
/// Call-frame stack capacity
pub const MAX_FRAMES: usize = 1024;

/// Byte width of one compiled default-parameter block: the padded default
/// expression plus the trailing `OpAssignLocal`
const DEFAULT_BLOCK_WIDTH: usize = OPTIONAL_PARAMETER_INSTRUCTIONS + 2;

/// The virtual machine
pub struct Vm {
    constants: Vec<Value>,
    stack: Vec<Value>,
    /// Points to the next free stack slot
    sp: usize,
    globals: Vec<Value>,
    frames: Vec<Frame>,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals(bytecode, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Run with an existing globals array; the REPL threads one through so
    /// bindings survive across lines
    pub fn with_globals(bytecode: Bytecode, mut globals: Vec<Value>) -> Self {
        if globals.len() < GLOBALS_SIZE {
            globals.resize(GLOBALS_SIZE, Value::Null);
        }

        // The top-level instructions run as a synthetic zero-argument
        // closure in the first frame.
        let main_fn = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
            num_defaults: 0,
        });
        let main_closure = Rc::new(Closure {
            func: main_fn,
            free: Vec::new(),
        });

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        Vm {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// The value most recently popped from the stack; the REPL prints this
    /// as the result of a line
    pub fn last_popped(&self) -> &Value {
        const NULL: Value = Value::Null;
        self.stack.get(self.sp).unwrap_or(&NULL)
    }

    /// Hand the globals array back to the embedder
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    pub fn run(&mut self) -> VmResult<()> {
        loop {
            let (closure, ip, base_pointer) = {
                let Some(frame) = self.frames.last_mut() else {
                    break;
                };
                if frame.ip + 1 >= frame.instructions().len() as i64 {
                    break;
                }
                frame.ip += 1;
                (
                    Rc::clone(&frame.closure),
                    frame.ip as usize,
                    frame.base_pointer,
                )
            };
            let ins = &closure.func.instructions;

            let byte = ins[ip];
            let Some(op) = Opcode::from_byte(byte) else {
                return Err(RuntimeError::unknown_opcode(byte));
            };

            match op {
                Opcode::Constant => {
                    let index = code::read_u16(&ins[ip + 1..]) as usize;
                    self.advance_ip(2);

                    let Some(constant) = self.constants.get(index).cloned() else {
                        return Err(RuntimeError::corrupt_constant(format!(
                            "constant {index} undefined"
                        )));
                    };
                    self.push(constant)?;
                }

                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                    self.execute_binary_operation(op)?;
                }

                Opcode::Minus => {
                    let operand = self.pop()?;
                    let result = match operand {
                        Value::Integer(value) => Value::Integer(value.wrapping_neg()),
                        other => Value::Error(format!(
                            "unsupported type for negation: {}",
                            other.type_name()
                        )),
                    };
                    self.push(result)?;
                }

                Opcode::Bang => {
                    let operand = self.pop()?;
                    self.push(Value::Boolean(!operand.is_truthy()))?;
                }

                Opcode::CastToBool => {
                    let operand = self.pop()?;
                    self.push(Value::Boolean(operand.is_truthy()))?;
                }

                Opcode::Pop => {
                    self.pop()?;
                }

                Opcode::True => self.push(Value::Boolean(true))?,
                Opcode::False => self.push(Value::Boolean(false))?,
                Opcode::Null => self.push(Value::Null)?,

                Opcode::Equal | Opcode::NotEqual => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let equal = values_equal(&left, &right);
                    self.push(Value::Boolean(if op == Opcode::Equal {
                        equal
                    } else {
                        !equal
                    }))?;
                }

                Opcode::GreaterThan | Opcode::GreaterOrEqual => {
                    self.execute_comparison(op)?;
                }

                Opcode::Jump => {
                    let target = code::read_u16(&ins[ip + 1..]);
                    self.set_ip(i64::from(target));
                }

                Opcode::JumpNotTruthy => {
                    let target = code::read_u16(&ins[ip + 1..]);
                    self.advance_ip(2);

                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.set_ip(i64::from(target));
                    }
                }

                Opcode::GetGlobal => {
                    let index = code::read_u16(&ins[ip + 1..]) as usize;
                    self.advance_ip(2);
                    self.push(self.globals[index].clone())?;
                }

                Opcode::SetGlobal | Opcode::AssignGlobal => {
                    let index = code::read_u16(&ins[ip + 1..]) as usize;
                    self.advance_ip(2);
                    self.globals[index] = self.pop()?;
                }

                Opcode::GetLocal => {
                    let index = code::read_u8(&ins[ip + 1..]) as usize;
                    self.advance_ip(1);
                    self.push(self.stack[base_pointer + index].clone())?;
                }

                Opcode::SetLocal | Opcode::AssignLocal => {
                    let index = code::read_u8(&ins[ip + 1..]) as usize;
                    self.advance_ip(1);
                    self.stack[base_pointer + index] = self.pop()?;
                }

                Opcode::GetBuiltin => {
                    let index = code::read_u8(&ins[ip + 1..]) as usize;
                    self.advance_ip(1);
                    self.push(Value::Builtin(index))?;
                }

                Opcode::Array => {
                    let count = code::read_u16(&ins[ip + 1..]) as usize;
                    self.advance_ip(2);

                    if self.sp < count {
                        return Err(RuntimeError::stack_underflow());
                    }
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Value::Array(Rc::new(elements)))?;
                }

                Opcode::Hash => {
                    let count = code::read_u16(&ins[ip + 1..]) as usize;
                    self.advance_ip(2);

                    if self.sp < count {
                        return Err(RuntimeError::stack_underflow());
                    }
                    let result = self.build_hash(count);
                    self.sp -= count;
                    self.push(result)?;
                }

                Opcode::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    let result = execute_index(&left, &index);
                    self.push(result)?;
                }

                Opcode::Call => {
                    let num_args = code::read_u8(&ins[ip + 1..]) as usize;
                    self.advance_ip(1);

                    if self.sp < num_args + 1 {
                        return Err(RuntimeError::stack_underflow());
                    }
                    let callee = self.stack[self.sp - 1 - num_args].clone();
                    match callee {
                        Value::Closure(closure) => self.call_closure(closure, num_args)?,
                        Value::Builtin(index) => self.call_builtin(index, num_args)?,
                        _ => return Err(RuntimeError::not_callable()),
                    }
                }

                Opcode::Return => {
                    let return_value = self.pop()?;

                    let Some(frame) = self.frames.pop() else {
                        return Err(RuntimeError::stack_underflow());
                    };
                    // Discards the frame's locals and the callee itself.
                    self.sp = frame.base_pointer.saturating_sub(1);

                    self.push(return_value)?;
                }

                Opcode::Closure => {
                    let const_index = code::read_u16(&ins[ip + 1..]) as usize;
                    let free_count = code::read_u8(&ins[ip + 3..]) as usize;
                    self.advance_ip(3);

                    self.build_closure(const_index, free_count)?;
                }

                Opcode::GetFree => {
                    let index = code::read_u8(&ins[ip + 1..]) as usize;
                    self.advance_ip(1);

                    let Some(free) = closure.free.get(index).cloned() else {
                        return Err(RuntimeError::corrupt_constant(format!(
                            "free variable {index} undefined"
                        )));
                    };
                    self.push(free)?;
                }

                Opcode::CurrentClosure => {
                    self.push(Value::Closure(Rc::clone(&closure)))?;
                }

                Opcode::Nop => {}
            }
        }

        Ok(())
    }

    /*
     * Calls
     */

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> VmResult<()> {
        let func = Rc::clone(&closure.func);

        if func.num_defaults == 0 {
            if num_args != func.num_parameters {
                return Err(RuntimeError::wrong_arguments(func.num_parameters, num_args));
            }
        } else {
            let min = func.num_parameters.saturating_sub(func.num_defaults);
            if num_args < min || num_args > func.num_parameters {
                return Err(RuntimeError::wrong_arguments_range(
                    min,
                    func.num_parameters,
                    num_args,
                ));
            }
        }

        // Skip one default block per optional parameter that was supplied;
        // the rest of the prelude initializes the omitted trailing ones.
        let supplied_defaults =
            num_args.saturating_sub(func.num_parameters.saturating_sub(func.num_defaults));
        let skip = (supplied_defaults * DEFAULT_BLOCK_WIDTH) as i64;

        // Self-recursive tail call: the frame is about to die anyway, so
        // rebind its arguments in place instead of pushing a new one.
        if self.next_op_is_return() && self.is_current_function(&func) {
            let base_pointer = match self.frames.last() {
                Some(frame) => frame.base_pointer,
                None => return Err(RuntimeError::stack_underflow()),
            };

            for i in 0..num_args {
                let argument = self.stack[self.sp - num_args + i].clone();
                self.stack[base_pointer + i] = argument;
            }
            self.sp = base_pointer + func.num_locals;

            if let Some(frame) = self.frames.last_mut() {
                frame.ip = skip - 1;
            }
            return Ok(());
        }

        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::frame_overflow());
        }

        let base_pointer = self.sp - num_args;
        let new_sp = base_pointer + func.num_locals;
        if new_sp > STACK_SIZE {
            return Err(RuntimeError::stack_overflow());
        }

        let mut frame = Frame::new(closure, base_pointer);
        frame.ip = skip - 1;
        self.frames.push(frame);
        self.sp = new_sp;

        Ok(())
    }

    fn call_builtin(&mut self, index: usize, num_args: usize) -> VmResult<()> {
        let arguments = self.stack[self.sp - num_args..self.sp].to_vec();
        self.sp = self.sp - num_args - 1;

        let Some(builtin) = BUILTINS.get(index) else {
            return Err(RuntimeError::corrupt_constant(format!(
                "builtin {index} undefined"
            )));
        };

        let result = (builtin.func)(arguments);
        self.push(result)
    }

    /// True when the instruction after the call currently being dispatched
    /// is `OpReturn`, making the call a tail call
    fn next_op_is_return(&self) -> bool {
        let Some(frame) = self.frames.last() else {
            return false;
        };
        let next = (frame.ip + 1) as usize;
        frame.instructions().get(next) == Some(&(Opcode::Return as u8))
    }

    /// True when the callee runs the same code object as the current frame
    fn is_current_function(&self, func: &Rc<CompiledFunction>) -> bool {
        self.frames
            .last()
            .is_some_and(|frame| Rc::ptr_eq(&frame.closure.func, func))
    }

    /*
     * Operators
     */

    fn execute_binary_operation(&mut self, op: Opcode) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => match op {
                Opcode::Add => Value::Integer(l.wrapping_add(*r)),
                Opcode::Sub => Value::Integer(l.wrapping_sub(*r)),
                Opcode::Mul => Value::Integer(l.wrapping_mul(*r)),
                _ => {
                    if *r == 0 {
                        return Err(RuntimeError::division_by_zero());
                    }
                    Value::Integer(l.wrapping_div(*r))
                }
            },

            (Value::String(l), Value::String(r)) => {
                if op == Opcode::Add {
                    Value::string(format!("{l}{r}"))
                } else {
                    Value::Error("unknown string operator".to_string())
                }
            }

            _ => Value::Error(format!(
                "unsupported types for binary operation: {} {}",
                left.type_name(),
                right.type_name()
            )),
        };

        self.push(result)
    }

    fn execute_comparison(&mut self, op: Opcode) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;

        let strictly = op == Opcode::GreaterThan;
        let result = match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                Value::Boolean(if strictly { l > r } else { l >= r })
            }

            (Value::String(l), Value::String(r)) => {
                Value::Boolean(if strictly { l > r } else { l >= r })
            }

            _ => Value::Error(format!(
                "unsupported types for binary operation: {} {}",
                left.type_name(),
                right.type_name()
            )),
        };

        self.push(result)
    }

    fn build_hash(&mut self, count: usize) -> Value {
        let mut pairs = HashMap::with_capacity(count / 2);

        let start = self.sp - count;
        let mut i = start;
        while i < self.sp {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();

            let Some(hash_key) = key.hash_key() else {
                return Value::Error(format!("unusable as hash key: {}", key.type_name()));
            };
            pairs.insert(hash_key, HashPair { key, value });

            i += 2;
        }

        Value::Hash(Rc::new(pairs))
    }

    fn build_closure(&mut self, const_index: usize, free_count: usize) -> VmResult<()> {
        let Some(constant) = self.constants.get(const_index).cloned() else {
            return Err(RuntimeError::corrupt_constant(format!(
                "constant {const_index} undefined"
            )));
        };
        let func = match &constant {
            Value::CompiledFunction(func) => Rc::clone(func),
            other => {
                return Err(RuntimeError::corrupt_constant(format!(
                    "not a function: {}",
                    other.type_name()
                )));
            }
        };

        if self.sp < free_count {
            return Err(RuntimeError::stack_underflow());
        }
        let free = self.stack[self.sp - free_count..self.sp].to_vec();
        self.sp -= free_count;

        self.push(Value::Closure(Rc::new(Closure { func, free })))
    }

    /*
     * Stack and frames
     */

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::stack_overflow());
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        if self.sp == 0 {
            return Err(RuntimeError::stack_underflow());
        }
        self.sp -= 1;
        Ok(self.stack[self.sp].clone())
    }

    fn advance_ip(&mut self, bytes: i64) {
        if let Some(frame) = self.frames.last_mut() {
            frame.ip += bytes;
        }
    }

    /// Jump targets are absolute; the dispatch loop pre-increments, so land
    /// one byte short
    fn set_ip(&mut self, target: i64) {
        if let Some(frame) = self.frames.last_mut() {
            frame.ip = target - 1;
        }
    }
}

/// `OpEqual` semantics: structural for integers, booleans, strings and
/// null; identity for heap values; `false` across type tags
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => l == r,
        (Value::Boolean(l), Value::Boolean(r)) => l == r,
        (Value::String(l), Value::String(r)) => l == r,
        (Value::Null, Value::Null) => true,
        (Value::Array(l), Value::Array(r)) => Rc::ptr_eq(l, r),
        (Value::Hash(l), Value::Hash(r)) => Rc::ptr_eq(l, r),
        (Value::Closure(l), Value::Closure(r)) => Rc::ptr_eq(l, r),
        (Value::CompiledFunction(l), Value::CompiledFunction(r)) => Rc::ptr_eq(l, r),
        (Value::Builtin(l), Value::Builtin(r)) => l == r,
        (Value::Error(l), Value::Error(r)) => l == r,
        _ => false,
    }
}

fn execute_index(left: &Value, index: &Value) -> Value {
    match (left, index) {
        (Value::Array(elements), Value::Integer(i)) => {
            if *i < 0 || *i as usize >= elements.len() {
                Value::Null
            } else {
                elements[*i as usize].clone()
            }
        }

        (Value::String(s), Value::Integer(i)) => {
            if *i < 0 {
                return Value::Null;
            }
            match s.chars().nth(*i as usize) {
                Some(c) => Value::string(c.to_string()),
                None => Value::Null,
            }
        }

        (Value::Hash(pairs), key) => match key.hash_key() {
            Some(hash_key) => match pairs.get(&hash_key) {
                Some(pair) => pair.value.clone(),
                None => Value::Null,
            },
            None => Value::Error(format!("unusable as hash key: {}", key.type_name())),
        },

        _ => Value::Error(format!(
            "index operator not supported: {}",
            left.type_name()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::lexer::tokenize;
    use crate::optimizer::optimize;
    use crate::parser::parse;
    use crate::value::HashKey;

    fn run(input: &str) -> Value {
        match try_run(input) {
            Ok(value) => value,
            Err(err) => panic!("vm error for {input:?}: {err}"),
        }
    }

    fn run_err(input: &str) -> RuntimeError {
        match try_run(input) {
            Ok(value) => panic!("expected VM error for {input:?}, got {value:?}"),
            Err(err) => err,
        }
    }

    fn try_run(input: &str) -> Result<Value, RuntimeError> {
        let tokens = tokenize(input).expect("lexer error");
        let program = parse("test.lr", input, tokens).expect("parse error");
        let program = optimize(program);

        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compiler error");

        let mut vm = Vm::new(compiler.bytecode());
        vm.run()?;
        Ok(vm.last_popped().clone())
    }

    fn assert_runs(cases: &[(&str, Value)]) {
        for (input, expected) in cases {
            assert_eq!(&run(input), expected, "input: {input}");
        }
    }

    fn int(n: i64) -> Value {
        Value::Integer(n)
    }

    fn boolean(b: bool) -> Value {
        Value::Boolean(b)
    }

    fn string(s: &str) -> Value {
        Value::string(s)
    }

    fn int_array(values: &[i64]) -> Value {
        Value::Array(Rc::new(values.iter().copied().map(Value::Integer).collect()))
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_runs(&[
            ("1", int(1)),
            ("2", int(2)),
            ("1 + 2", int(3)),
            ("1 - 2", int(-1)),
            ("1 * 2", int(2)),
            ("4 / 2", int(2)),
            ("50 / 2 * 2 + 10 - 5", int(55)),
            ("5 + 5 + 5 + 5 - 10", int(10)),
            ("2 * 2 * 2 * 2 * 2", int(32)),
            ("5 * 2 + 10", int(20)),
            ("5 + 2 * 10", int(25)),
            ("5 * (2 + 10)", int(60)),
            ("-5", int(-5)),
            ("-50 + 100 + -50", int(0)),
            ("(5 + 10 * 2 + 15 / 3) * 2 + -10", int(50)),
        ]);
    }

    #[test]
    fn test_division_by_zero_is_fatal() {
        let err = run_err("let a = 1; let b = 0; a / b");
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn test_boolean_expressions() {
        assert_runs(&[
            ("true", boolean(true)),
            ("false", boolean(false)),
            ("1 < 2", boolean(true)),
            ("1 > 2", boolean(false)),
            ("1 < 1", boolean(false)),
            ("1 <= 2", boolean(true)),
            ("1 >= 2", boolean(false)),
            ("1 <= 1", boolean(true)),
            ("1 >= 1", boolean(true)),
            ("1 == 1", boolean(true)),
            ("1 != 1", boolean(false)),
            ("1 == 2", boolean(false)),
            ("1 != 2", boolean(true)),
            ("true == true", boolean(true)),
            ("false == false", boolean(true)),
            ("true == false", boolean(false)),
            ("true != false", boolean(true)),
            ("(1 < 2) == true", boolean(true)),
            ("(1 > 2) == false", boolean(true)),
            ("!true", boolean(false)),
            ("!5", boolean(false)),
            ("!!true", boolean(true)),
            ("!!5", boolean(true)),
            ("!!0", boolean(false)),
            ("!(if (false) { 5; })", boolean(true)),
        ]);
    }

    #[test]
    fn test_string_comparisons() {
        assert_runs(&[
            ("\"string\" == \"string\"", boolean(true)),
            ("\"string\" == \"String\"", boolean(false)),
            ("\"string\" != \"string\"", boolean(false)),
            ("\"string\" != \"word\"", boolean(true)),
            ("\"abc123\" == \"abc\" + \"123\"", boolean(true)),
            ("\"a\" > \"A\"", boolean(true)),
            ("\"a\" < \"A\"", boolean(false)),
            ("\"a\" >= \"a\"", boolean(true)),
            ("\"a\" <= \"z\"", boolean(true)),
            ("\"z\" <= \"z\"", boolean(true)),
        ]);
    }

    #[test]
    fn test_cross_type_equality() {
        assert_runs(&[
            ("1 == \"1\"", boolean(false)),
            ("1 != \"1\"", boolean(true)),
            ("true != 1", boolean(true)),
            ("[] == []", boolean(false)),
            ("let a = [1]; a == a", boolean(true)),
        ]);
    }

    #[test]
    fn test_logical_short_circuit() {
        assert_runs(&[
            ("true && true", boolean(true)),
            ("true && false", boolean(false)),
            ("false && true", boolean(false)),
            ("true || false", boolean(true)),
            ("false || true", boolean(true)),
            ("1 || 0", boolean(true)),
            ("0 || 5", boolean(true)),
            ("6 && 5", boolean(true)),
            ("12 && 0", boolean(false)),
            ("if (true && true) { \"a\" }", string("a")),
            ("if (false && true) { \"a\" } else { \"b\" }", string("b")),
        ]);
    }

    #[test]
    fn test_string_expressions() {
        assert_runs(&[
            ("\"lemur\"", string("lemur")),
            ("\"le\" + \"mur\"", string("lemur")),
            ("\"le\" + \"mur\" + \"banana\"", string("lemurbanana")),
        ]);
    }

    #[test]
    fn test_string_operator_misuse_is_an_error_value() {
        assert_eq!(
            run("\"a\" - \"b\""),
            Value::Error("unknown string operator".to_string())
        );
        assert_eq!(
            run("1 + \"b\""),
            Value::Error("unsupported types for binary operation: INTEGER STRING".to_string())
        );
    }

    #[test]
    fn test_conditionals() {
        assert_runs(&[
            ("if (true) { 10 }", int(10)),
            ("if (true) { 10 } else { 20 }", int(10)),
            ("if (false) { 10 } else { 20 }", int(20)),
            ("if (1) { 10 }", int(10)),
            ("if (1 < 2) { 10 }", int(10)),
            ("if (1 > 2) { 10 } else { 20 }", int(20)),
            ("if (1 > 2) { 10 }", Value::Null),
            ("if (false) { 10 }", Value::Null),
            ("if ((if (false) { 10 })) { 10 } else { 20 }", int(20)),
            ("if (true && 1) { 10 }", int(10)),
            ("if (false || true) { 10 }", int(10)),
        ]);
    }

    #[test]
    fn test_global_let_statements() {
        assert_runs(&[
            ("let one = 1; one", int(1)),
            ("let one = 1; let two = 2; one + two", int(3)),
            ("let one = 1; let two = one + one; one + two", int(3)),
            ("let a = 5; a = 6;", int(6)),
        ]);
    }

    #[test]
    fn test_assignment_statements() {
        assert_runs(&[
            ("let a = 5; a += 1;", int(6)),
            ("let a = 5; a -= 1;", int(4)),
            ("let a = 6; a /= 2;", int(3)),
            ("let a = 6; a *= 2;", int(12)),
        ]);
    }

    #[test]
    fn test_prefix_and_postfix_statements() {
        assert_runs(&[
            ("let a = 5; a++;", int(5)),
            ("let a = 5; a++; a", int(6)),
            ("let a = 5; a--;", int(5)),
            ("let a = 5; a--; a", int(4)),
            ("let a = 5; ++a;", int(6)),
            ("let a = 5; --a;", int(4)),
        ]);
    }

    #[test]
    fn test_while_loops() {
        assert_runs(&[(
            "let x = 1; let sum = 0; let up = 10; while (x < up) { sum += x; x++ } sum",
            int(45),
        )]);
    }

    #[test]
    fn test_array_literals() {
        assert_runs(&[
            ("[]", int_array(&[])),
            ("[1, 2, 3]", int_array(&[1, 2, 3])),
            ("[1 + 2, 3 * 4, 5 + 6]", int_array(&[3, 12, 11])),
        ]);
    }

    #[test]
    fn test_hash_literals() {
        let result = run("{1: 2, 2: 3}");
        let Value::Hash(pairs) = result else {
            panic!("not a hash: {result:?}");
        };
        assert_eq!(pairs.len(), 2);

        let key = |n: i64| Value::Integer(n).hash_key().unwrap();
        assert_eq!(pairs[&key(1)].value, int(2));
        assert_eq!(pairs[&key(2)].value, int(3));

        let result = run("{1 + 1: 2 * 2, 3 + 3: 4 * 4}");
        let Value::Hash(pairs) = result else {
            panic!("not a hash: {result:?}");
        };
        assert_eq!(pairs[&key(2)].value, int(4));
        assert_eq!(pairs[&key(6)].value, int(16));

        let result = run("{}");
        let Value::Hash(pairs) = result else {
            panic!("not a hash: {result:?}");
        };
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_hash_string_and_boolean_keys() {
        let result = run("{\"a\": 1, true: 2}");
        let Value::Hash(pairs) = result else {
            panic!("not a hash: {result:?}");
        };
        let string_key: HashKey = Value::string("a").hash_key().unwrap();
        let bool_key: HashKey = Value::Boolean(true).hash_key().unwrap();
        assert_eq!(pairs[&string_key].value, int(1));
        assert_eq!(pairs[&bool_key].value, int(2));
    }

    #[test]
    fn test_unusable_hash_key_is_an_error_value() {
        assert_eq!(
            run("{[1]: 2}"),
            Value::Error("unusable as hash key: ARRAY".to_string())
        );
        assert_eq!(
            run("{1: 2}[[1]]"),
            Value::Error("unusable as hash key: ARRAY".to_string())
        );
    }

    #[test]
    fn test_index_expressions() {
        assert_runs(&[
            ("[1, 2, 3][1]", int(2)),
            ("[1, 2, 3][0 + 2]", int(3)),
            ("[[1, 1, 1]][0][0]", int(1)),
            ("[][0]", Value::Null),
            ("[1, 2, 3][99]", Value::Null),
            ("[1][-1]", Value::Null),
            ("{1: 1, 2: 2}[1]", int(1)),
            ("{1: 1, 2: 2}[2]", int(2)),
            ("{1: 1}[0]", Value::Null),
            ("{}[0]", Value::Null),
            ("\"Hello\"[0]", string("H")),
            ("\"Hello\"[1]", string("e")),
            ("\"Hello\"[1 + 1]", string("l")),
            ("\"Hello\"[100]", Value::Null),
            ("\"Hello\"[-1]", Value::Null),
        ]);
    }

    #[test]
    fn test_index_operator_misuse_is_an_error_value() {
        assert_eq!(
            run("5[0]"),
            Value::Error("index operator not supported: INTEGER".to_string())
        );
    }

    #[test]
    fn test_function_application() {
        assert_runs(&[
            ("let identity = function(x) { x; }; identity(5);", int(5)),
            (
                "let identity = function(x) { return x; }; identity(5);",
                int(5),
            ),
            ("let double = function(x) { x * 2; }; double(5);", int(10)),
            ("let add = function(x, y) { x + y; }; add(5, 5);", int(10)),
            (
                "let add = function(x, y) { x + y; }; add(5 + 5, add(5, 5));",
                int(20),
            ),
            ("function identity (x) { x; }; identity(5);", int(5)),
            ("function double (x) { x * 2; }; double(5);", int(10)),
            ("function add (x, y) { x + y; }; add(5, 5);", int(10)),
            ("function(x) { x; }(5)", int(5)),
        ]);
    }

    #[test]
    fn test_default_arguments() {
        assert_runs(&[
            ("function(x = 5) { x; }()", int(5)),
            ("function(x, y = 5) { x + y; }(5)", int(10)),
            ("function(x, y = 5) { x + y; }(5, 10)", int(15)),
            ("function(x, b = false) { b; }(5)", boolean(false)),
            ("function(x, b = false) { b; }(5, true)", boolean(true)),
            ("function(x, b = false, y = 5) { x + y; }(5)", int(10)),
            ("function(x, b = false, y = 5) { x + y; }(5, true)", int(10)),
            (
                "let c = function(h, i = 3, j = 2) { h + i + j }; c(1, 1, 1);",
                int(3),
            ),
            (
                "let a = function(x = 1) { x };
                 let b = function(x = 2) { a() + x };
                 let c = function(i = 3, j = 2) { b() + i - j };
                 c();",
                int(4),
            ),
        ]);
    }

    #[test]
    fn test_calling_without_arguments() {
        assert_runs(&[
            (
                "let fivePlusTen = function() { 5 + 10; }; fivePlusTen();",
                int(15),
            ),
            (
                "let one = function() { 1; }; let two = function() { 2; }; one() + two()",
                int(3),
            ),
            (
                "let a = function() { 1 };
                 let b = function() { a() + 1 };
                 let c = function() { b() + 1 };
                 c();",
                int(3),
            ),
        ]);
    }

    #[test]
    fn test_return_statements() {
        assert_runs(&[
            (
                "let earlyExit = function() { return 99; 100; }; earlyExit();",
                int(99),
            ),
            (
                "let earlyExit = function() { return 99; return 100; }; earlyExit();",
                int(99),
            ),
        ]);
    }

    #[test]
    fn test_functions_without_return_value() {
        assert_runs(&[
            ("let noReturn = function() { }; noReturn();", Value::Null),
            (
                "let noReturn = function() { };
                 let noReturnTwo = function() { noReturn(); };
                 noReturn(); noReturnTwo();",
                Value::Null,
            ),
        ]);
    }

    #[test]
    fn test_first_class_functions() {
        assert_runs(&[
            (
                "let returnsOne = function() { 1; };
                 let returnsOneReturner = function() { returnsOne; };
                 returnsOneReturner()();",
                int(1),
            ),
            (
                "let returnsOneReturner = function() {
                     let returnsOne = function() { 1; };
                     returnsOne;
                 };
                 returnsOneReturner()();",
                int(1),
            ),
        ]);
    }

    #[test]
    fn test_local_bindings() {
        assert_runs(&[
            ("let one = function() { let one = 1; one }; one();", int(1)),
            (
                "let oneAndTwo = function() { let one = 1; let two = 2; one + two; }; oneAndTwo();",
                int(3),
            ),
            (
                "let firstFoobar = function() { let foobar = 50; foobar; };
                 let secondFoobar = function() { let foobar = 100; foobar; };
                 firstFoobar() + secondFoobar();",
                int(150),
            ),
            (
                "let globalSeed = 50;
                 let minusOne = function() { let num = 1; globalSeed - num; };
                 let minusTwo = function() { let num = 2; globalSeed - num; };
                 minusOne() + minusTwo();",
                int(97),
            ),
        ]);
    }

    #[test]
    fn test_arguments_and_bindings() {
        assert_runs(&[
            (
                "let sum = function(a, b) { let c = a + b; c; }; sum(1, 2);",
                int(3),
            ),
            (
                "let sum = function(a, b) { let c = a + b; c; }; sum(1, 2) + sum(3, 4);",
                int(10),
            ),
            (
                "let globalNum = 10;
                 let sum = function(a, b) { let c = a + b; c + globalNum; };
                 let outer = function() { sum(1, 2) + sum(3, 4) + globalNum; };
                 outer() + globalNum;",
                int(50),
            ),
        ]);
    }

    #[test]
    fn test_wrong_argument_counts() {
        let cases = [
            (
                "function() { 1; }(1);",
                "wrong number of arguments: want=0, got=1",
            ),
            (
                "function(a) { a; }();",
                "wrong number of arguments: want=1, got=0",
            ),
            (
                "function(a, b) { a + b; }(1);",
                "wrong number of arguments: want=2, got=1",
            ),
            (
                "function(a = 3) { 1; }(1, 2);",
                "wrong number of arguments: want=0-1, got=2",
            ),
            (
                "function(a, b = 3) { 1; }();",
                "wrong number of arguments: want=1-2, got=0",
            ),
            (
                "function(a, b, c = 3) { a + b; }(1);",
                "wrong number of arguments: want=2-3, got=1",
            ),
        ];

        for (input, expected) in cases {
            let err = run_err(input);
            assert_eq!(err.kind, ErrorKind::WrongArguments, "input: {input}");
            assert_eq!(err.message, expected, "input: {input}");
        }
    }

    #[test]
    fn test_calling_non_function() {
        let err = run_err("let x = 5; x();");
        assert_eq!(err.kind, ErrorKind::NotCallable);
        assert_eq!(err.message, "calling non-function");
    }

    #[test]
    fn test_builtin_functions() {
        assert_runs(&[
            ("len(\"\")", int(0)),
            ("len(\"four\")", int(4)),
            ("len(\"hello world\")", int(11)),
            ("len([1, 2, 3])", int(3)),
            ("len([])", int(0)),
            ("first([1, 2, 3])", int(1)),
            ("first([])", Value::Null),
            ("last([1, 2, 3])", int(3)),
            ("last([])", Value::Null),
            ("rest([1, 2, 3])", int_array(&[2, 3])),
            ("rest([])", Value::Null),
            ("push([], 1)", int_array(&[1])),
            ("println(\"hello\", \"world!\")", Value::Null),
            (
                "len(1)",
                Value::Error("argument to `len` not supported, got INTEGER".to_string()),
            ),
            (
                "len(\"one\", \"two\")",
                Value::Error("wrong number of arguments. got=2, want=1".to_string()),
            ),
            (
                "first(1)",
                Value::Error("argument to `first` must be ARRAY, got INTEGER".to_string()),
            ),
            (
                "last(1)",
                Value::Error("argument to `last` must be ARRAY, got INTEGER".to_string()),
            ),
            (
                "push(1, 1)",
                Value::Error("argument to `push` must be ARRAY, got INTEGER".to_string()),
            ),
        ]);
    }

    #[test]
    fn test_closures() {
        assert_runs(&[
            (
                "let newClosure = function(a) { function() { a; }; };
                 let closure = newClosure(99);
                 closure();",
                int(99),
            ),
            (
                "let newAdder = function(a, b) { function(c) { a + b + c }; };
                 let adder = newAdder(1, 2);
                 adder(8);",
                int(11),
            ),
            (
                "let newAdder = function(a, b) { let c = a + b; function(d) { c + d }; };
                 let adder = newAdder(1, 2);
                 adder(8);",
                int(11),
            ),
            (
                "let newAdderOuter = function(a, b) {
                     let c = a + b;
                     function(d) { let e = d + c; function(f) { e + f; }; };
                 };
                 let newAdderInner = newAdderOuter(1, 2);
                 let adder = newAdderInner(3);
                 adder(8);",
                int(14),
            ),
            (
                "let a = 1;
                 let newAdderOuter = function(b) {
                     function(c) { function(d) { a + b + c + d }; };
                 };
                 let newAdderInner = newAdderOuter(2);
                 let adder = newAdderInner(3);
                 adder(8);",
                int(14),
            ),
            (
                "let newClosure = function(a, b) {
                     let one = function() { a; };
                     let two = function() { b; };
                     function() { one() + two(); };
                 };
                 let closure = newClosure(9, 90);
                 closure();",
                int(99),
            ),
        ]);
    }

    #[test]
    fn test_closures_capture_by_value() {
        // Captures snapshot the value at closure creation; later mutation in
        // the outer frame is not visible.
        assert_runs(&[(
            "let make = function() {
                 let a = 1;
                 let inner = function() { a; };
                 a = 2;
                 inner;
             };
             make()();",
            int(1),
        )]);
    }

    #[test]
    fn test_recursive_closures() {
        assert_runs(&[
            (
                "let countDown = function(x) {
                     if (x == 0) { return 0; } else { countDown(x - 1); }
                 };
                 countDown(1);",
                int(0),
            ),
            (
                "let countDown = function(x) {
                     if (x == 0) { return 0; } else { countDown(x - 1); }
                 };
                 let wrapper = function() { countDown(1); };
                 wrapper();",
                int(0),
            ),
            (
                "let wrapper = function() {
                     let countDown = function(x) {
                         if (x == 0) { return 0; } else { countDown(x - 1); }
                     };
                     countDown(1);
                 };
                 wrapper();",
                int(0),
            ),
        ]);
    }

    #[test]
    fn test_recursive_fibonacci() {
        assert_runs(&[(
            "let fibonacci = function(x) {
                 if (x == 0) {
                     return 0;
                 } else {
                     if (x == 1) { return 1; } else { fibonacci(x - 1) + fibonacci(x - 2); }
                 }
             };
             fibonacci(15);",
            int(610),
        )]);
    }

    #[test]
    fn test_tail_calls() {
        assert_runs(&[
            (
                "const factorial = function(n) {
                     if (n == 1) { return 1; }
                     n * factorial(n - 1);
                 };
                 factorial(5);",
                int(120),
            ),
            (
                "const factorial = function(n, a) {
                     if (n == 0) { return a; }
                     factorial(n - 1, a * n);
                 };
                 factorial(5, 1);",
                int(120),
            ),
            // without the frame reuse this would overflow MAX_FRAMES
            (
                "const iter = function(n, max) {
                     if (n == max) { return n }
                     return iter(n + 1, max)
                 };
                 iter(0, 9999)",
                int(9999),
            ),
        ]);
    }

    #[test]
    fn test_non_tail_recursion_overflows() {
        let err = run_err(
            "const f = function(n) {
                 if (n == 0) { return 0; }
                 return 1 + f(n - 1);
             };
             f(5000);",
        );
        assert!(
            err.kind == ErrorKind::FrameOverflow || err.kind == ErrorKind::StackOverflow,
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_stack_overflow_is_fatal() {
        // each iteration leaks the loop body's value onto the stack
        let err = run_err("let i = 0; while (i < 5000) { i++; i }");
        assert_eq!(err.kind, ErrorKind::StackOverflow);
    }

    #[test]
    fn test_last_popped_after_bindings() {
        assert_runs(&[("let a = 5;", int(5)), ("let a = 5; let b = a + 1;", int(6))]);
    }
}
