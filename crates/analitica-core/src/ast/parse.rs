mod lexer;
pub(crate) use lexer::Lexer;

mod parser;
pub(crate) use parser::Parser;

use super::Span;

/// Parse failure local to the lexer/parser layer. The grammar and model
/// loaders wrap it into the public [`crate::Error`] taxonomy.
#[derive(Debug)]
pub(crate) struct SyntaxError {
    pub span: Span,
    pub message: String,
}

impl SyntaxError {
    pub(crate) fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

pub(crate) type Result<T> = core::result::Result<T, SyntaxError>;

/// Types with a fixed syntax, parsed off the token stream. Used for the
/// grammar description language; instance files are instead interpreted
/// against the compiled metamodel.
pub(crate) trait Parse: Sized {
    fn parse(p: &mut Parser<'_>) -> Result<Self>;
}
