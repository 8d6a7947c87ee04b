use super::{Result, SyntaxError};
use crate::ast::{Punct, Span, Token, TokenKind};

use std::collections::VecDeque;

pub(crate) struct Lexer<'a> {
    src: &'a str,
    line: u32,
    column: u32,
    next: VecDeque<Token>,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(src: &'a str) -> Lexer<'a> {
        Lexer {
            src,
            line: 1,
            column: 1,
            next: VecDeque::new(),
        }
    }

    pub(crate) fn next(&mut self) -> Result<Option<Token>> {
        self.lex_n(1)?;
        Ok(self.next.pop_front())
    }

    pub(crate) fn peek_nth(&mut self, n: usize) -> Result<Option<&Token>> {
        self.lex_n(n + 1)?;
        Ok(self.next.get(n))
    }

    /// Position of the next unlexed character. After the source is
    /// exhausted this is the end-of-file position.
    pub(crate) fn position(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
        }
    }

    fn lex_n(&mut self, n: usize) -> Result<()> {
        while self.next.len() < n {
            if !self.lex_one()? {
                return Ok(());
            }
        }

        Ok(())
    }

    fn lex_one(&mut self) -> Result<bool> {
        self.skip_whitespace();

        let span = self.position();

        let Some(ch) = self.peek_char() else {
            return Ok(false);
        };

        let kind = match ch {
            ':' => self.punct(Punct::Colon),
            ';' => self.punct(Punct::SemiColon),
            ',' => self.punct(Punct::Comma),
            '{' => self.punct(Punct::LBrace),
            '}' => self.punct(Punct::RBrace),
            '[' => self.punct(Punct::LBracket),
            ']' => self.punct(Punct::RBracket),
            '=' => self.punct(Punct::Eq),
            '*' => {
                self.consume(1);
                if self.peek_char() == Some('=') {
                    self.consume(1);
                    Punct::StarEq.into()
                } else {
                    return Err(SyntaxError::new(span, "unexpected character `*`"));
                }
            }
            '"' => {
                self.consume(1);
                let mut value = String::new();

                loop {
                    match self.peek_char() {
                        Some('"') => {
                            self.consume(1);
                            break;
                        }
                        Some('\n') | None => {
                            return Err(SyntaxError::new(span, "unterminated string literal"));
                        }
                        Some(ch) => {
                            value.push(ch);
                            self.consume(ch.len_utf8());
                        }
                    }
                }

                TokenKind::Str(value)
            }
            ch if ch.is_ascii_digit() => {
                let mut digits = String::new();

                while let Some(ch) = self.take_if(|ch| ch.is_ascii_digit()) {
                    digits.push(ch);
                }

                let value = digits
                    .parse()
                    .map_err(|_| SyntaxError::new(span, "integer literal out of range"))?;

                TokenKind::Int(value)
            }
            ch if ch.is_alphabetic() || ch == '_' => {
                let mut ident = String::new();

                while let Some(ch) = self.take_if(ident_ch) {
                    ident.push(ch);
                }

                TokenKind::Ident(ident)
            }
            ch => {
                return Err(SyntaxError::new(
                    span,
                    format!("unexpected character `{ch}`"),
                ));
            }
        };

        self.next.push_back(Token { kind, span });
        Ok(true)
    }

    fn punct(&mut self, punct: Punct) -> TokenKind {
        self.consume(1);
        punct.into()
    }

    fn peek_char(&self) -> Option<char> {
        self.peek_char_n(0)
    }

    fn peek_char_n(&self, n: usize) -> Option<char> {
        self.src.chars().nth(n)
    }

    fn take_if<P>(&mut self, predicate: P) -> Option<char>
    where
        P: FnOnce(char) -> bool,
    {
        match self.peek_char() {
            Some(ch) if predicate(ch) => {
                self.consume(ch.len_utf8());
                Some(ch)
            }
            _ => None,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            match ch {
                '/' => {
                    if self.peek_char_n(1) == Some('*') {
                        self.consume(2);
                        self.skip_block_comment();
                    } else if self.peek_char_n(1) == Some('/') {
                        self.skip_line_comment();
                    } else {
                        return;
                    }
                }
                ch if ch.is_whitespace() => {
                    self.consume(ch.len_utf8());
                }
                _ => return,
            }
        }
    }

    fn skip_block_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            match ch {
                '*' => {
                    self.consume(1);

                    if self.peek_char() == Some('/') {
                        self.consume(1);
                        return;
                    }
                }
                _ => {
                    self.consume(ch.len_utf8());
                }
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            match ch {
                '\n' => {
                    self.consume(1);
                    return;
                }
                _ => self.consume(ch.len_utf8()),
            }
        }
    }

    fn consume(&mut self, amount: usize) {
        let (consumed, rest) = self.src.split_at(amount);

        for ch in consumed.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }

        self.src = rest;
    }
}

fn ident_ch(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}
