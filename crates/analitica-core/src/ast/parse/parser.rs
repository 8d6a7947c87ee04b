use super::{Lexer, Parse, Result, SyntaxError};
use crate::ast::{Punct, Span, Token, TokenKind};

pub(crate) struct Parser<'a> {
    lexer: Lexer<'a>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(lexer: Lexer<'a>) -> Parser<'a> {
        Parser { lexer }
    }

    pub(crate) fn parse<T: Parse>(&mut self) -> Result<T> {
        T::parse(self)
    }

    pub(crate) fn next_token(&mut self) -> Result<Option<Token>> {
        self.lexer.next()
    }

    pub(crate) fn peek(&mut self) -> Result<Option<&Token>> {
        self.lexer.peek_nth(0)
    }

    pub(crate) fn is_eof(&mut self) -> Result<bool> {
        Ok(self.peek()?.is_none())
    }

    pub(crate) fn eof_span(&self) -> Span {
        self.lexer.position()
    }

    /// Span of the next token, or the end-of-file position.
    pub(crate) fn span(&mut self) -> Result<Span> {
        match self.peek()? {
            Some(token) => Ok(token.span),
            None => Ok(self.eof_span()),
        }
    }

    pub(crate) fn expect_ident(&mut self) -> Result<(String, Span)> {
        match self.next_token()? {
            Some(Token {
                kind: TokenKind::Ident(name),
                span,
            }) => Ok((name, span)),
            Some(token) => Err(SyntaxError::new(
                token.span,
                format!("expected identifier, found {}", token.kind),
            )),
            None => Err(SyntaxError::new(
                self.eof_span(),
                "expected identifier, found end of file",
            )),
        }
    }

    pub(crate) fn expect_int(&mut self) -> Result<(i64, Span)> {
        match self.next_token()? {
            Some(Token {
                kind: TokenKind::Int(value),
                span,
            }) => Ok((value, span)),
            Some(token) => Err(SyntaxError::new(
                token.span,
                format!("expected integer, found {}", token.kind),
            )),
            None => Err(SyntaxError::new(
                self.eof_span(),
                "expected integer, found end of file",
            )),
        }
    }

    pub(crate) fn expect_punct(&mut self, punct: Punct) -> Result<Span> {
        match self.next_token()? {
            Some(Token {
                kind: TokenKind::Punct(found),
                span,
            }) if found == punct => Ok(span),
            Some(token) => Err(SyntaxError::new(
                token.span,
                format!("expected `{}`, found {}", punct.as_str(), token.kind),
            )),
            None => Err(SyntaxError::new(
                self.eof_span(),
                format!("expected `{}`, found end of file", punct.as_str()),
            )),
        }
    }

    /// Consumes the next token when it is the given punctuation.
    pub(crate) fn eat_punct(&mut self, punct: Punct) -> Result<bool> {
        let hit = matches!(
            self.peek()?,
            Some(Token {
                kind: TokenKind::Punct(found),
                ..
            }) if *found == punct
        );

        if hit {
            self.next_token()?;
        }

        Ok(hit)
    }

    /// True when the next token spells `text` verbatim (keyword or
    /// punctuation). False at end of file.
    pub(crate) fn next_matches(&mut self, text: &str) -> Result<bool> {
        Ok(self
            .peek()?
            .map(|token| token.kind.matches(text))
            .unwrap_or(false))
    }
}
