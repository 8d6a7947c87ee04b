mod token;
pub(crate) use token::{Punct, Token, TokenKind};

pub(crate) mod parse;

pub use token::Span;
