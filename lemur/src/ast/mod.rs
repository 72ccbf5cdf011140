//! Abstract Syntax Tree definitions
//!
//! The parser produces this tree; the optimizer rewrites it and the compiler
//! lowers it to bytecode. `Display` renders a node back into source form,
//! which the compiler also uses to order hash-literal keys deterministically.

mod span;

pub use span::Span;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A program is a sequence of statements
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// A braced sequence of statements
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

/// Statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    /// `let name = value;`
    Let { name: String, value: Expr },
    /// `const name = value;`; the binding rejects later assignment
    Const { name: String, value: Expr },
    /// `name = value;`, `name += value;`, and the prefix forms `++name;` /
    /// `--name;` (parsed with an implicit value of `1`)
    Assign {
        name: String,
        op: AssignOp,
        value: Expr,
    },
    /// `name++;` / `name--;`; the statement's value is the *pre* value
    Postfix { name: String, op: PostfixOp },
    /// `return;` / `return value;`
    Return(Option<Expr>),
    /// Expression in statement position
    Expr(Expr),
    /// Nested block
    Block(Block),
}

/// Expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    /// Integer literal
    IntLit(i64),
    /// Boolean literal
    BoolLit(bool),
    /// String literal
    StringLit(String),
    /// Variable reference
    Ident(String),

    /// Prefix operation: `!x`, `-x`
    Prefix { op: PrefixOp, right: Box<Expr> },

    /// Infix operation
    Infix {
        op: InfixOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Conditional; a missing alternative evaluates to null
    If {
        condition: Box<Expr>,
        consequence: Block,
        alternative: Option<Block>,
    },

    /// `while (condition) { body }`
    While { condition: Box<Expr>, body: Block },

    /// `[a, b, c]`
    Array(Vec<Expr>),

    /// `{key: value, ...}`
    Hash(Vec<(Expr, Expr)>),

    /// `left[index]`
    Index { left: Box<Expr>, index: Box<Expr> },

    /// Function literal
    Function(FunctionLit),

    /// `function(args)`
    Call {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },
}

/// Function literal
///
/// `name` is filled in for both the self-defining statement form
/// (`function fib(n) { … }`, `define = true`) and for anonymous literals
/// bound by `let`/`const` (the parser back-fills the binding name so the
/// body can recurse through the current closure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionLit {
    pub name: Option<String>,
    pub define: bool,
    pub parameters: Vec<String>,
    pub defaults: HashMap<String, Expr>,
    pub body: Block,
}

/// Infix operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Eq => "==",
            InfixOp::NotEq => "!=",
            InfixOp::Lt => "<",
            InfixOp::Gt => ">",
            InfixOp::LtEq => "<=",
            InfixOp::GtEq => ">=",
            InfixOp::And => "&&",
            InfixOp::Or => "||",
        };
        write!(f, "{symbol}")
    }
}

/// Prefix operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefixOp {
    /// Logical not on truthiness
    Bang,
    /// Integer negation
    Minus,
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixOp::Bang => write!(f, "!"),
            PrefixOp::Minus => write!(f, "-"),
        }
    }
}

/// Assignment operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    /// Prefix `++name`
    Incr,
    /// Prefix `--name`
    Decr,
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
            AssignOp::Incr => "++",
            AssignOp::Decr => "--",
        };
        write!(f, "{symbol}")
    }
}

/// Postfix operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostfixOp {
    Incr,
    Decr,
}

impl fmt::Display for PostfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostfixOp::Incr => write!(f, "++"),
            PostfixOp::Decr => write!(f, "--"),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Let { name, value } => write!(f, "let {name} = {value};"),
            Stmt::Const { name, value } => write!(f, "const {name} = {value};"),
            Stmt::Assign { name, op, value } => match op {
                AssignOp::Incr | AssignOp::Decr => write!(f, "{op}{name};"),
                _ => write!(f, "{name} {op} {value};"),
            },
            Stmt::Postfix { name, op } => write!(f, "{name}{op};"),
            Stmt::Return(Some(value)) => write!(f, "return {value};"),
            Stmt::Return(None) => write!(f, "return;"),
            Stmt::Expr(expr) => write!(f, "{expr}"),
            Stmt::Block(block) => write!(f, "{block}"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntLit(value) => write!(f, "{value}"),
            Expr::BoolLit(value) => write!(f, "{value}"),
            Expr::StringLit(value) => write!(f, "{value}"),
            Expr::Ident(name) => write!(f, "{name}"),
            Expr::Prefix { op, right } => write!(f, "({op}{right})"),
            Expr::Infix { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if{condition} {consequence}")?;
                if let Some(alternative) = alternative {
                    write!(f, "else {alternative}")?;
                }
                Ok(())
            }
            Expr::While { condition, body } => write!(f, "while{condition} {body}"),
            Expr::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, "]")
            }
            Expr::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Expr::Index { left, index } => write!(f, "({left}[{index}])"),
            Expr::Function(lit) => write!(f, "{lit}"),
            Expr::Call {
                function,
                arguments,
            } => {
                write!(f, "{function}(")?;
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{argument}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for FunctionLit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function")?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        write!(f, "(")?;
        for (i, parameter) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{parameter}")?;
            if let Some(default) = self.defaults.get(parameter) {
                write!(f, " = {default}")?;
            }
        }
        write!(f, ") {{ {} }}", self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infix_display_is_parenthesized() {
        let expr = Expr::Infix {
            op: InfixOp::Add,
            left: Box::new(Expr::IntLit(1)),
            right: Box::new(Expr::Infix {
                op: InfixOp::Mul,
                left: Box::new(Expr::IntLit(2)),
                right: Box::new(Expr::IntLit(3)),
            }),
        };
        assert_eq!(expr.to_string(), "(1 + (2 * 3))");
    }

    #[test]
    fn test_prefix_display() {
        let expr = Expr::Prefix {
            op: PrefixOp::Minus,
            right: Box::new(Expr::IntLit(5)),
        };
        assert_eq!(expr.to_string(), "(-5)");
    }

    #[test]
    fn test_let_statement_display() {
        let stmt = Stmt::Let {
            name: "x".to_string(),
            value: Expr::IntLit(5),
        };
        assert_eq!(stmt.to_string(), "let x = 5;");
    }

    #[test]
    fn test_assign_prefix_incr_display() {
        let stmt = Stmt::Assign {
            name: "x".to_string(),
            op: AssignOp::Incr,
            value: Expr::IntLit(1),
        };
        assert_eq!(stmt.to_string(), "++x;");
    }

    #[test]
    fn test_postfix_display() {
        let stmt = Stmt::Postfix {
            name: "x".to_string(),
            op: PostfixOp::Decr,
        };
        assert_eq!(stmt.to_string(), "x--;");
    }

    #[test]
    fn test_hash_display_preserves_pair_order() {
        let expr = Expr::Hash(vec![
            (Expr::StringLit("b".to_string()), Expr::IntLit(2)),
            (Expr::StringLit("a".to_string()), Expr::IntLit(1)),
        ]);
        assert_eq!(expr.to_string(), "{b: 2, a: 1}");
    }

    #[test]
    fn test_index_display() {
        let expr = Expr::Index {
            left: Box::new(Expr::Ident("xs".to_string())),
            index: Box::new(Expr::IntLit(0)),
        };
        assert_eq!(expr.to_string(), "(xs[0])");
    }

    #[test]
    fn test_call_display() {
        let expr = Expr::Call {
            function: Box::new(Expr::Ident("add".to_string())),
            arguments: vec![Expr::IntLit(1), Expr::IntLit(2)],
        };
        assert_eq!(expr.to_string(), "add(1, 2)");
    }

    #[test]
    fn test_function_literal_display_with_default() {
        let mut defaults = HashMap::new();
        defaults.insert("b".to_string(), Expr::BoolLit(false));
        let lit = FunctionLit {
            name: None,
            define: false,
            parameters: vec!["a".to_string(), "b".to_string()],
            defaults,
            body: Block {
                statements: vec![Stmt::Expr(Expr::Ident("a".to_string()))],
            },
        };
        assert_eq!(lit.to_string(), "function(a, b = false) { a }");
    }
}
