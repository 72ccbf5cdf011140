//! Lexer built on logos

mod token;

pub use token::Token;

use crate::ast::Span;
use crate::error::{CompileError, Result};
use logos::Logos;

/// Tokenize source code into `(token, byte span)` pairs
pub fn tokenize(source: &str) -> Result<Vec<(Token, Span)>> {
    let mut tokens = Vec::new();

    for (result, range) in Token::lexer(source).spanned() {
        let span = Span::from(range);
        let token = result.map_err(|_| {
            CompileError::lexer(
                format!("unexpected character: {:?}", &source[span.start..span.end]),
                span,
            )
        })?;
        tokens.push((token, span));
    }

    Ok(tokens)
}
