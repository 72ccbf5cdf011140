//! Runtime values
//!
//! One tagged union covers everything a Lemur program can produce. Heap
//! variants are reference counted: stack slots and captured free variables
//! clone in O(1), and the identity comparisons the VM performs on arrays,
//! hashes and closures are pointer comparisons on the shared allocation.

use crate::code::Instructions;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit signed integer
    Integer(i64),
    /// Boolean
    Boolean(bool),
    /// Immutable UTF-8 string
    String(Rc<String>),
    /// The null singleton
    Null,
    /// Ordered sequence
    Array(Rc<Vec<Value>>),
    /// Keyed pairs; only integers, booleans and strings hash
    Hash(Rc<HashMap<HashKey, HashPair>>),
    /// Immutable code object produced by the compiler
    CompiledFunction(Rc<CompiledFunction>),
    /// The only callable user code produces
    Closure(Rc<Closure>),
    /// Index into the fixed builtin catalog
    Builtin(usize),
    /// A runtime failure surfaced as a value, not as control flow
    Error(String),
}

/// An executable code object: instruction stream plus frame layout
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
    pub num_defaults: usize,
}

/// A code object paired with its captured free values
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

/// Key type tag inside a [`HashKey`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKeyKind {
    Integer,
    Boolean,
    String,
}

/// Type tag plus 64-bit digest; strings digest with FNV-1a
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub kind: HashKeyKind,
    pub value: u64,
}

/// One hash entry, keeping the original key value for inspection
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

impl Value {
    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::String(_) => "STRING",
            Value::Null => "NULL",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::CompiledFunction(_) => "COMPILED_FUNCTION",
            Value::Closure(_) => "CLOSURE",
            Value::Builtin(_) => "BUILTIN",
            Value::Error(_) => "ERROR",
        }
    }

    /// `false`, `null` and `0` are falsy; everything else is truthy
    pub fn is_truthy(&self) -> bool {
        !matches!(
            self,
            Value::Boolean(false) | Value::Null | Value::Integer(0)
        )
    }

    /// The hash key for this value, or `None` for unhashable types
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(n) => Some(HashKey {
                kind: HashKeyKind::Integer,
                value: *n as u64,
            }),
            Value::Boolean(b) => Some(HashKey {
                kind: HashKeyKind::Boolean,
                value: u64::from(*b),
            }),
            Value::String(s) => Some(HashKey {
                kind: HashKeyKind::String,
                value: fnv1a(s.as_bytes()),
            }),
            _ => None,
        }
    }

    /// Convenience constructor wrapping a `&str`
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(Rc::new(s.into()))
    }
}

/// FNV-1a 64-bit digest; the constants are part of the wire contract for
/// string hash keys
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Null => write!(f, "null"),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, "]")
            }
            Value::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, pair) in pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Value::CompiledFunction(func) => {
                write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(func))
            }
            Value::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Value::Builtin(_) => write!(f, "builtin function"),
            Value::Error(message) => write!(f, "ERROR: {message}"),
        }
    }
}
