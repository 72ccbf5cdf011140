//! Bytecode container and binary file format
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! offset  size  contents
//! 0       12    signature, ASCII "rhwilr/lemur"
//! 12      1     binary format version
//! 13      2     number of constants (u16)
//! 15      8     instruction byte count (u64)
//! 23      ...   constant pool entries, then the main instruction stream
//! ```
//!
//! Constant entries are a tag byte plus payload: `0x00` integer (8 bytes),
//! `0x01` string (u32 length + UTF-8 bytes), `0x02` compiled function
//! (u32 instruction length, u32 locals, u32 parameters, u32 defaults,
//! instruction bytes).

use crate::code::Instructions;
use crate::error::{CompileError, Result};
use crate::value::{CompiledFunction, Value};
use std::rc::Rc;

/// Magic signature at the start of every compiled file
pub const SIGNATURE: &[u8] = b"rhwilr/lemur";

/// Bumped whenever the wire format changes incompatibly
pub const BINARY_VERSION: u8 = 1;

const TAG_INTEGER: u8 = 0x00;
const TAG_STRING: u8 = 0x01;
const TAG_FUNCTION: u8 = 0x02;

/// Compiled instructions plus the constant pool they reference
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

impl Bytecode {
    /// Serialize to the binary file format
    pub fn write(&self) -> Vec<u8> {
        let constants = write_constants(&self.constants);

        let mut out = Vec::with_capacity(23 + constants.len() + self.instructions.len());
        out.extend_from_slice(SIGNATURE);
        out.push(BINARY_VERSION);
        out.extend_from_slice(&(self.constants.len() as u16).to_be_bytes());
        out.extend_from_slice(&(self.instructions.len() as u64).to_be_bytes());
        out.extend_from_slice(&constants);
        out.extend_from_slice(&self.instructions);

        out
    }

    /// Deserialize from the binary file format
    pub fn read(bytes: &[u8]) -> Result<Bytecode> {
        let mut reader = Reader { bytes, offset: 0 };

        let signature = reader.take(SIGNATURE.len())?;
        if signature != SIGNATURE {
            return Err(CompileError::bytecode(
                "signature not found, expected 'rhwilr/lemur'",
            ));
        }

        let version = reader.take(1)?[0];
        if version != BINARY_VERSION {
            return Err(CompileError::bytecode(format!(
                "incompatible binary file version: vm={BINARY_VERSION:02X} bin={version:02X}"
            )));
        }

        let num_constants = reader.read_u16()?;
        let num_instruction_bytes = reader.read_u64()? as usize;

        let mut constants = Vec::with_capacity(num_constants as usize);
        for _ in 0..num_constants {
            constants.push(reader.read_constant()?);
        }

        let instructions = reader.take(num_instruction_bytes)?.to_vec();

        Ok(Bytecode {
            instructions,
            constants,
        })
    }
}

fn write_constants(constants: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();

    for constant in constants {
        match constant {
            Value::Integer(value) => {
                out.push(TAG_INTEGER);
                out.extend_from_slice(&value.to_be_bytes());
            }

            Value::String(value) => {
                out.push(TAG_STRING);
                out.extend_from_slice(&(value.len() as u32).to_be_bytes());
                out.extend_from_slice(value.as_bytes());
            }

            Value::CompiledFunction(func) => {
                out.push(TAG_FUNCTION);
                out.extend_from_slice(&(func.instructions.len() as u32).to_be_bytes());
                out.extend_from_slice(&(func.num_locals as u32).to_be_bytes());
                out.extend_from_slice(&(func.num_parameters as u32).to_be_bytes());
                out.extend_from_slice(&(func.num_defaults as u32).to_be_bytes());
                out.extend_from_slice(&func.instructions);
            }

            // The compiler only pools the three serializable types.
            _ => {}
        }
    }

    out
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(len).filter(|end| *end <= self.bytes.len());
        let Some(end) = end else {
            return Err(CompileError::bytecode("unexpected end of bytecode"));
        };

        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(buf))
    }

    fn read_constant(&mut self) -> Result<Value> {
        let tag = self.take(1)?[0];

        match tag {
            TAG_INTEGER => {
                let bytes = self.take(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                Ok(Value::Integer(i64::from_be_bytes(buf)))
            }

            TAG_STRING => {
                let len = self.read_u32()? as usize;
                let bytes = self.take(len)?;
                let value = String::from_utf8(bytes.to_vec())
                    .map_err(|_| CompileError::bytecode("string constant is not valid UTF-8"))?;
                Ok(Value::string(value))
            }

            TAG_FUNCTION => {
                let instruction_len = self.read_u32()? as usize;
                let num_locals = self.read_u32()? as usize;
                let num_parameters = self.read_u32()? as usize;
                let num_defaults = self.read_u32()? as usize;
                let instructions = self.take(instruction_len)?.to_vec();

                Ok(Value::CompiledFunction(Rc::new(CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters,
                    num_defaults,
                })))
            }

            other => Err(CompileError::bytecode(format!(
                "unknown constant tag 0x{other:02X}"
            ))),
        }
    }
}
