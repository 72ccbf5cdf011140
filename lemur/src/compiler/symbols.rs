//! Lexical symbol table with closure-conversion bookkeeping
//!
//! Tables nest per compilation scope. Resolving a name that lives in an
//! enclosing function scope promotes it to a `Free` symbol here and records
//! the *original* symbol so the compiler can emit the capturing loads before
//! `OpClosure`.

use crate::error::{CompileError, Result};
use std::collections::HashMap;

/// Resolution class of a symbol; decides which load opcode the compiler emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
    /// Placeholder for a named function's own name inside its body; loaded
    /// with `OpCurrentClosure` and overwritable by a parameter of the same
    /// name
    Function,
}

/// Whether a binding may be reassigned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Constant,
}

/// A resolved name
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
    pub kind: SymbolKind,
}

/// One lexical scope's bindings
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    pub num_definitions: usize,
    /// Captured originals, in capture order
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enclosed(outer: SymbolTable) -> Self {
        SymbolTable {
            outer: Some(Box::new(outer)),
            ..Self::default()
        }
    }

    /// Detach and return the enclosing table, if any
    pub fn take_outer(&mut self) -> Option<SymbolTable> {
        self.outer.take().map(|outer| *outer)
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Introduce a binding in this scope. Redeclaration fails unless the
    /// existing entry is the function self-reference placeholder.
    pub fn define(&mut self, name: &str, kind: SymbolKind) -> Result<Symbol> {
        if let Some(existing) = self.store.get(name) {
            if existing.scope != SymbolScope::Function {
                return Err(CompileError::compiler(format!(
                    "identifier '{name}' has already been declared"
                )));
            }
        }

        let symbol = Symbol {
            name: name.to_string(),
            scope: if self.is_global() {
                SymbolScope::Global
            } else {
                SymbolScope::Local
            },
            index: self.num_definitions,
            kind,
        };

        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;

        Ok(symbol)
    }

    /// Seed a builtin at its catalog index
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
            kind: SymbolKind::Variable,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Bind a function's own name inside its body
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
            kind: SymbolKind::Variable,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Search outward for a name. Globals and builtins resolve as-is; any
    /// other outer hit is captured as a free variable of this scope.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let outer = self.outer.as_mut()?;
        let symbol = outer.resolve(name)?;

        if symbol.scope == SymbolScope::Global || symbol.scope == SymbolScope::Builtin {
            return Some(symbol);
        }

        Some(self.define_free(symbol))
    }

    /// All names visible from this scope, for diagnostics
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.store.keys().cloned().collect();
        if let Some(outer) = &self.outer {
            names.extend(outer.visible_names());
        }
        names
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original.clone());

        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
            kind: original.kind,
        };

        self.store.insert(original.name, symbol.clone());
        symbol
    }
}
