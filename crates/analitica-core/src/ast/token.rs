use std::fmt;

/// Position of a token in the source text, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Int(i64),
    /// Quoted string literal. Only valid in grammar descriptions.
    Str(String),
    Punct(Punct),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Punct {
    Colon,
    SemiColon,
    Comma,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Eq,
    StarEq,
}

impl Punct {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Punct::Colon => ":",
            Punct::SemiColon => ";",
            Punct::Comma => ",",
            Punct::LBrace => "{",
            Punct::RBrace => "}",
            Punct::LBracket => "[",
            Punct::RBracket => "]",
            Punct::Eq => "=",
            Punct::StarEq => "*=",
        }
    }
}

impl TokenKind {
    /// True when this token spells out `text` verbatim, whether `text` is a
    /// keyword-style identifier or punctuation.
    pub(crate) fn matches(&self, text: &str) -> bool {
        match self {
            TokenKind::Ident(ident) => ident == text,
            TokenKind::Punct(punct) => punct.as_str() == text,
            _ => false,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(ident) => write!(f, "`{ident}`"),
            TokenKind::Int(value) => write!(f, "`{value}`"),
            TokenKind::Str(value) => write!(f, "\"{value}\""),
            TokenKind::Punct(punct) => write!(f, "`{}`", punct.as_str()),
        }
    }
}

impl From<Punct> for TokenKind {
    fn from(punct: Punct) -> Self {
        TokenKind::Punct(punct)
    }
}
