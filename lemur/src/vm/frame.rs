//! Call frames

use crate::code::Instructions;
use crate::value::Closure;
use std::rc::Rc;

/// One in-flight function activation
#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,
    /// Instruction pointer, pre-increment: starts one byte before the first
    /// instruction to execute
    pub ip: i64,
    /// Stack index where this frame's arguments and locals begin
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Frame {
            closure,
            ip: -1,
            base_pointer,
        }
    }

    pub fn instructions(&self) -> &Instructions {
        &self.closure.func.instructions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{make, Opcode};
    use crate::value::CompiledFunction;

    #[test]
    fn test_new_frame_starts_before_first_instruction() {
        let func = Rc::new(CompiledFunction {
            instructions: make(Opcode::Null, &[]),
            num_locals: 0,
            num_parameters: 0,
            num_defaults: 0,
        });
        let closure = Rc::new(Closure {
            func,
            free: Vec::new(),
        });

        let frame = Frame::new(closure, 7);
        assert_eq!(frame.ip, -1);
        assert_eq!(frame.base_pointer, 7);
        assert_eq!(frame.instructions().len(), 1);
    }
}
