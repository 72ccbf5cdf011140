//! AST-level constant folding
//!
//! Rewrites pure infix expressions over integer, string and boolean
//! literals into their results before compilation, propagating through
//! binding initializers, expression statements, `while` conditions, call
//! arguments and parameter defaults. Folding is conservative: anything it
//! cannot prove constant is returned unchanged, and a division by zero is
//! left for the VM to report. The compiler accepts unoptimized programs
//! unchanged in meaning.

use crate::ast::{Expr, FunctionLit, InfixOp, PrefixOp, Program, Stmt};

/// Fold constants in a program
pub fn optimize(program: Program) -> Program {
    Program {
        statements: program
            .statements
            .into_iter()
            .map(optimize_statement)
            .collect(),
    }
}

fn optimize_statement(statement: Stmt) -> Stmt {
    match statement {
        Stmt::Let { name, value } => Stmt::Let {
            name,
            value: fold_expression(value),
        },
        Stmt::Const { name, value } => Stmt::Const {
            name,
            value: fold_expression(value),
        },
        Stmt::Expr(expression) => Stmt::Expr(fold_expression(expression)),
        other => other,
    }
}

fn fold_expression(expression: Expr) -> Expr {
    match expression {
        Expr::Infix { op, left, right } => fold_infix(op, *left, *right),

        Expr::Prefix {
            op: PrefixOp::Minus,
            right,
        } => match fold_expression(*right) {
            Expr::IntLit(value) => Expr::IntLit(value.wrapping_neg()),
            folded => Expr::Prefix {
                op: PrefixOp::Minus,
                right: Box::new(folded),
            },
        },

        Expr::While { condition, body } => Expr::While {
            condition: Box::new(fold_expression(*condition)),
            body,
        },

        Expr::Call {
            function,
            arguments,
        } => Expr::Call {
            function,
            arguments: arguments.into_iter().map(fold_expression).collect(),
        },

        Expr::Function(FunctionLit {
            name,
            define,
            parameters,
            defaults,
            body,
        }) => Expr::Function(FunctionLit {
            name,
            define,
            parameters,
            defaults: defaults
                .into_iter()
                .map(|(name, default)| (name, fold_expression(default)))
                .collect(),
            body,
        }),

        other => other,
    }
}

fn fold_infix(op: InfixOp, left: Expr, right: Expr) -> Expr {
    let left = fold_expression(left);
    let right = fold_expression(right);

    let folded = match (&left, &right) {
        (Expr::IntLit(l), Expr::IntLit(r)) => fold_integer_infix(op, *l, *r),
        (Expr::StringLit(l), Expr::StringLit(r)) => fold_string_infix(op, l, r),
        (Expr::BoolLit(l), Expr::BoolLit(r)) => fold_boolean_infix(op, *l, *r),
        _ => None,
    };

    folded.unwrap_or(Expr::Infix {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

fn fold_integer_infix(op: InfixOp, left: i64, right: i64) -> Option<Expr> {
    let expr = match op {
        InfixOp::Eq => Expr::BoolLit(left == right),
        InfixOp::NotEq => Expr::BoolLit(left != right),
        InfixOp::Lt => Expr::BoolLit(left < right),
        InfixOp::Gt => Expr::BoolLit(left > right),
        InfixOp::LtEq => Expr::BoolLit(left <= right),
        InfixOp::GtEq => Expr::BoolLit(left >= right),
        InfixOp::Add => Expr::IntLit(left.wrapping_add(right)),
        InfixOp::Sub => Expr::IntLit(left.wrapping_sub(right)),
        InfixOp::Mul => Expr::IntLit(left.wrapping_mul(right)),
        InfixOp::Div => {
            if right == 0 {
                return None;
            }
            Expr::IntLit(left.wrapping_div(right))
        }
        InfixOp::And | InfixOp::Or => return None,
    };
    Some(expr)
}

fn fold_string_infix(op: InfixOp, left: &str, right: &str) -> Option<Expr> {
    let expr = match op {
        InfixOp::Eq => Expr::BoolLit(left == right),
        InfixOp::NotEq => Expr::BoolLit(left != right),
        InfixOp::Lt => Expr::BoolLit(left < right),
        InfixOp::Gt => Expr::BoolLit(left > right),
        InfixOp::LtEq => Expr::BoolLit(left <= right),
        InfixOp::GtEq => Expr::BoolLit(left >= right),
        InfixOp::Add => Expr::StringLit(format!("{left}{right}")),
        _ => return None,
    };
    Some(expr)
}

fn fold_boolean_infix(op: InfixOp, left: bool, right: bool) -> Option<Expr> {
    let expr = match op {
        InfixOp::Eq => Expr::BoolLit(left == right),
        InfixOp::NotEq => Expr::BoolLit(left != right),
        InfixOp::And => Expr::BoolLit(left && right),
        InfixOp::Or => Expr::BoolLit(left || right),
        _ => return None,
    };
    Some(expr)
}
