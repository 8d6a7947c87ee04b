//! Grammar loader.
//!
//! Compiles a declarative grammar description into a [`Metamodel`]: a
//! reusable parser definition that can parse instance files written in that
//! grammar. Compilation is a pure function of the grammar text; parsing an
//! instance produces a generic [`Node`] tree that the model loader maps to
//! declarations.
//!
//! The grammar language is a sequence of rules:
//!
//! ```text
//! Entity: "entity" name = ID "{" fields *= Field "}" ;
//! ```
//!
//! A term is either a quoted literal (matched verbatim), a single capture
//! `attr = Target`, or a repetition `attr *= Target`. Targets are other
//! rules or the builtin terminals `ID`, `INT` and `VALUE`.

use crate::ast::parse::{Lexer, Parse, Parser, SyntaxError};
use crate::ast::{Punct, Span, Token, TokenKind};
use crate::{Error, Result};

use indexmap::IndexMap;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// A compiled grammar. The first rule of the description is the start rule.
#[derive(Debug)]
pub struct Metamodel {
    rules: IndexMap<String, Rule>,
}

#[derive(Debug)]
struct Rule {
    terms: Vec<Term>,
}

#[derive(Debug)]
enum Term {
    /// Keyword or punctuation matched verbatim.
    Literal(String),
    Attr {
        name: String,
        target: Target,
        repeat: Repeat,
    },
}

#[derive(Debug)]
enum Target {
    Id,
    Int,
    Value,
    Rule(String),
}

#[derive(Debug)]
enum Repeat {
    One,
    /// Repeat until the bounding literal that follows in the rule.
    Until(String),
    /// Repeat while the target rule's leading literal is next.
    While(String),
}

/// One node of a parsed instance file: the rule that produced it plus its
/// captured attributes, in capture order.
#[derive(Debug, Clone)]
pub struct Node {
    pub rule: String,
    pub span: Span,
    attrs: IndexMap<String, Vec<Value>>,
}

#[derive(Debug, Clone)]
pub enum Value {
    Ident(String),
    Int(i64),
    List(Vec<String>),
    Node(Box<Node>),
}

impl Node {
    pub fn one(&self, attr: &str) -> Option<&Value> {
        self.attrs.get(attr)?.first()
    }

    pub fn many(&self, attr: &str) -> &[Value] {
        self.attrs.get(attr).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Value {
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Value::Ident(ident) => Some(ident),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------
// Grammar description AST
// ----------------------------------------------------------------------

#[derive(Debug)]
struct GrammarFile {
    rules: Vec<RuleDef>,
}

#[derive(Debug)]
struct RuleDef {
    name: String,
    terms: Vec<TermDef>,
}

#[derive(Debug)]
enum TermDef {
    Literal(String),
    Attr {
        name: String,
        many: bool,
        target: String,
    },
}

impl Parse for GrammarFile {
    fn parse(p: &mut Parser<'_>) -> core::result::Result<Self, SyntaxError> {
        let mut rules = vec![];

        while !p.is_eof()? {
            rules.push(p.parse()?);
        }

        Ok(GrammarFile { rules })
    }
}

impl Parse for RuleDef {
    fn parse(p: &mut Parser<'_>) -> core::result::Result<Self, SyntaxError> {
        let (name, _) = p.expect_ident()?;
        p.expect_punct(Punct::Colon)?;

        let mut terms = vec![];
        while !p.eat_punct(Punct::SemiColon)? {
            terms.push(p.parse()?);
        }

        Ok(RuleDef { name, terms })
    }
}

impl Parse for TermDef {
    fn parse(p: &mut Parser<'_>) -> core::result::Result<Self, SyntaxError> {
        match p.next_token()? {
            Some(Token {
                kind: TokenKind::Str(lit),
                span,
            }) => {
                if lit.is_empty() {
                    return Err(SyntaxError::new(span, "literal terms must not be empty"));
                }
                Ok(TermDef::Literal(lit))
            }
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => {
                let many = if p.eat_punct(Punct::StarEq)? {
                    true
                } else {
                    p.expect_punct(Punct::Eq)?;
                    false
                };
                let (target, _) = p.expect_ident()?;

                Ok(TermDef::Attr { name, many, target })
            }
            Some(token) => Err(SyntaxError::new(
                token.span,
                format!("expected a literal or attribute term, found {}", token.kind),
            )),
            None => Err(SyntaxError::new(
                p.eof_span(),
                "expected a term, found end of file",
            )),
        }
    }
}

// ----------------------------------------------------------------------
// Compilation
// ----------------------------------------------------------------------

impl Metamodel {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Metamodel> {
        let path = path.as_ref();
        let src = fs::read_to_string(path).map_err(|source| Error::io(path, source))?;
        Self::from_source(&src)
    }

    pub fn from_source(src: &str) -> Result<Metamodel> {
        let mut parser = Parser::new(Lexer::new(src));
        let file = parser.parse::<GrammarFile>().map_err(|err| {
            Error::grammar(format!(
                "line {}, column {}: {}",
                err.span.line, err.span.column, err.message
            ))
        })?;

        Self::compile(file)
    }

    fn compile(file: GrammarFile) -> Result<Metamodel> {
        if file.rules.is_empty() {
            return Err(Error::grammar("grammar defines no rules"));
        }

        let mut defs: IndexMap<&str, &RuleDef> = IndexMap::new();
        for def in &file.rules {
            if defs.insert(&def.name, def).is_some() {
                return Err(Error::grammar(format!(
                    "duplicate rule `{}` makes the grammar ambiguous",
                    def.name
                )));
            }
        }

        let nullable = nullable_rules(&defs);
        check_left_recursion(&defs, &nullable)?;

        let mut rules = IndexMap::new();

        for def in &file.rules {
            let mut terms = vec![];

            for (index, term) in def.terms.iter().enumerate() {
                match term {
                    TermDef::Literal(lit) => terms.push(Term::Literal(lit.clone())),
                    TermDef::Attr { name, many, target } => {
                        let target = match target.as_str() {
                            "ID" => Target::Id,
                            "INT" => Target::Int,
                            "VALUE" => Target::Value,
                            other => {
                                if !defs.contains_key(other) {
                                    return Err(Error::grammar(format!(
                                        "rule `{}` references undefined rule `{other}`",
                                        def.name
                                    )));
                                }
                                Target::Rule(other.to_string())
                            }
                        };

                        if *many {
                            if let Target::Rule(rule) = &target {
                                if nullable.contains(rule.as_str()) {
                                    return Err(Error::grammar(format!(
                                        "repetition `{name}` in rule `{}` repeats rule \
                                         `{rule}`, which can match empty input",
                                        def.name
                                    )));
                                }
                            }
                        }

                        let repeat = if !*many {
                            Repeat::One
                        } else if let Some(TermDef::Literal(stop)) = def.terms.get(index + 1) {
                            Repeat::Until(stop.clone())
                        } else {
                            let predictor = match &target {
                                Target::Rule(rule) => leading_literal(defs[rule.as_str()]),
                                _ => None,
                            };

                            match predictor {
                                Some(lit) => Repeat::While(lit),
                                None => {
                                    return Err(Error::grammar(format!(
                                        "repetition `{name}` in rule `{}` is ambiguous: bound \
                                         it with a following literal or repeat a rule whose \
                                         first term is a literal",
                                        def.name
                                    )));
                                }
                            }
                        };

                        terms.push(Term::Attr {
                            name: name.clone(),
                            target,
                            repeat,
                        });
                    }
                }
            }

            rules.insert(def.name.clone(), Rule { terms });
        }

        Ok(Metamodel { rules })
    }

    fn start_rule(&self) -> &str {
        // Compilation rejects empty grammars.
        self.rules
            .get_index(0)
            .map(|(name, _)| name.as_str())
            .expect("metamodel has no rules")
    }
}

fn leading_literal(def: &RuleDef) -> Option<String> {
    match def.terms.first() {
        Some(TermDef::Literal(lit)) => Some(lit.clone()),
        _ => None,
    }
}

/// Rules that can match without consuming a token: every term is a
/// repetition or a reference to another such rule. Repeating one of these
/// would loop forever, so compilation rejects that.
fn nullable_rules<'a>(defs: &IndexMap<&'a str, &'a RuleDef>) -> HashSet<&'a str> {
    let mut nullable: HashSet<&str> = HashSet::new();

    loop {
        let mut changed = false;

        for (name, def) in defs {
            if nullable.contains(name) {
                continue;
            }

            let matches_empty = def.terms.iter().all(|term| match term {
                TermDef::Literal(_) => false,
                TermDef::Attr { many: true, .. } => true,
                TermDef::Attr { target, .. } => nullable.contains(target.as_str()),
            });

            if matches_empty {
                nullable.insert(*name);
                changed = true;
            }
        }

        if !changed {
            return nullable;
        }
    }
}

/// Rejects rule cycles reachable before a token is consumed; parsing such a
/// grammar would recurse without ever making progress.
fn check_left_recursion(
    defs: &IndexMap<&str, &RuleDef>,
    nullable: &HashSet<&str>,
) -> Result<()> {
    for (&start, _) in defs {
        let mut stack = vec![start];
        let mut seen: HashSet<&str> = HashSet::new();

        while let Some(name) = stack.pop() {
            let Some(def) = defs.get(name) else {
                // Undefined references are reported during term compilation.
                continue;
            };

            for next in leading_rules(def, nullable) {
                if next == start {
                    return Err(Error::grammar(format!(
                        "rule `{start}` recursively invokes itself without consuming \
                         any input"
                    )));
                }

                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
    }

    Ok(())
}

/// Rules a rule may invoke before consuming its first token.
fn leading_rules<'a>(def: &'a RuleDef, nullable: &HashSet<&str>) -> Vec<&'a str> {
    let mut rules = vec![];

    for term in &def.terms {
        let TermDef::Attr { many, target, .. } = term else {
            break;
        };

        match target.as_str() {
            "ID" | "INT" | "VALUE" => {
                if !*many {
                    break;
                }
            }
            rule => {
                rules.push(rule);
                if !*many && !nullable.contains(rule) {
                    break;
                }
            }
        }
    }

    rules
}

// ----------------------------------------------------------------------
// Instance parsing
// ----------------------------------------------------------------------

impl Metamodel {
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Node> {
        let path = path.as_ref();
        let src = fs::read_to_string(path).map_err(|source| Error::io(path, source))?;
        self.parse_source(&src)
    }

    pub fn parse_source(&self, src: &str) -> Result<Node> {
        let mut parser = Parser::new(Lexer::new(src));

        let result = (|| {
            let node = self.parse_rule(self.start_rule(), &mut parser)?;

            match parser.next_token()? {
                None => Ok(node),
                Some(token) => Err(SyntaxError::new(
                    token.span,
                    format!("expected end of file, found {}", token.kind),
                )),
            }
        })();

        result.map_err(|err| Error::model_syntax(err.span, err.message))
    }

    fn parse_rule(
        &self,
        name: &str,
        p: &mut Parser<'_>,
    ) -> core::result::Result<Node, SyntaxError> {
        let rule = &self.rules[name];
        let span = p.span()?;
        let mut attrs = IndexMap::new();

        for term in &rule.terms {
            match term {
                Term::Literal(lit) => {
                    expect_literal(p, lit)?;
                }
                Term::Attr {
                    name: attr,
                    target,
                    repeat,
                } => {
                    let values = match repeat {
                        Repeat::One => vec![self.parse_target(target, p)?],
                        Repeat::Until(stop) => {
                            let mut values = vec![];
                            while !p.next_matches(stop)? {
                                values.push(self.parse_target(target, p)?);
                            }
                            values
                        }
                        Repeat::While(predictor) => {
                            let mut values = vec![];
                            while p.next_matches(predictor)? {
                                values.push(self.parse_target(target, p)?);
                            }
                            values
                        }
                    };

                    attrs.insert(attr.clone(), values);
                }
            }
        }

        Ok(Node {
            rule: name.to_string(),
            span,
            attrs,
        })
    }

    fn parse_target(
        &self,
        target: &Target,
        p: &mut Parser<'_>,
    ) -> core::result::Result<Value, SyntaxError> {
        match target {
            Target::Id => {
                let (ident, _) = p.expect_ident()?;
                Ok(Value::Ident(ident))
            }
            Target::Int => {
                let (value, _) = p.expect_int()?;
                Ok(Value::Int(value))
            }
            Target::Value => parse_value(p),
            Target::Rule(rule) => Ok(Value::Node(Box::new(self.parse_rule(rule, p)?))),
        }
    }
}

fn expect_literal(p: &mut Parser<'_>, lit: &str) -> core::result::Result<(), SyntaxError> {
    match p.next_token()? {
        Some(token) if token.kind.matches(lit) => Ok(()),
        Some(token) => Err(SyntaxError::new(
            token.span,
            format!("expected `{lit}`, found {}", token.kind),
        )),
        None => Err(SyntaxError::new(
            p.eof_span(),
            format!("expected `{lit}`, found end of file"),
        )),
    }
}

/// The `VALUE` builtin: an identifier, an integer, or a bracketed list of
/// identifiers.
fn parse_value(p: &mut Parser<'_>) -> core::result::Result<Value, SyntaxError> {
    if p.eat_punct(Punct::LBracket)? {
        let mut items = vec![];

        loop {
            if p.eat_punct(Punct::RBracket)? {
                break;
            }

            let (ident, _) = p.expect_ident()?;
            items.push(ident);

            if !p.eat_punct(Punct::Comma)? {
                p.expect_punct(Punct::RBracket)?;
                break;
            }
        }

        return Ok(Value::List(items));
    }

    match p.next_token()? {
        Some(Token {
            kind: TokenKind::Ident(ident),
            ..
        }) => Ok(Value::Ident(ident)),
        Some(Token {
            kind: TokenKind::Int(value),
            ..
        }) => Ok(Value::Int(value)),
        Some(token) => Err(SyntaxError::new(
            token.span,
            format!("expected a value, found {}", token.kind),
        )),
        None => Err(SyntaxError::new(
            p.eof_span(),
            "expected a value, found end of file",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GRAMMAR: &str = r#"
        Model:  entities *= Entity  operations *= Operation ;

        Entity: "entity" name = ID "{" fields *= Field "}" ;
        Field:  name = ID ":" type = ID "," ;

        Operation: "report" name = ID "{" params *= Param "}" ;
        Param:     name = ID ":" value = VALUE "," ;
    "#;

    #[test]
    fn compiles_canonical_grammar() {
        Metamodel::from_source(GRAMMAR).unwrap();
    }

    #[test]
    fn rejects_duplicate_rule() {
        let err = Metamodel::from_source("A: x = ID ; A: y = ID ;").unwrap_err();
        assert!(err.is_grammar());
        assert!(err.to_string().contains("duplicate rule `A`"));
    }

    #[test]
    fn rejects_undefined_rule_reference() {
        let err = Metamodel::from_source("A: items *= Missing \"}\" ;").unwrap_err();
        assert!(err.is_grammar());
        assert!(err.to_string().contains("undefined rule `Missing`"));
    }

    #[test]
    fn rejects_unbounded_repetition() {
        // `B` has no leading literal and the repetition has no bounding
        // literal, so there is no way to decide when to stop.
        let err = Metamodel::from_source("A: items *= B ; B: name = ID ;").unwrap_err();
        assert!(err.is_grammar());
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn rejects_repetition_over_empty_rule() {
        // `A` matches empty input, so the repetition would never advance.
        let err = Metamodel::from_source("X: items *= A \"}\" ; A: ;").unwrap_err();
        assert!(err.is_grammar());
        assert!(err.to_string().contains("match empty input"));
    }

    #[test]
    fn rejects_repetition_over_possibly_empty_rule() {
        // `A` is a single repetition, so zero iterations match nothing.
        let err = Metamodel::from_source(
            "X: items *= A \"}\" ; A: xs *= B ; B: \"b\" name = ID ;",
        )
        .unwrap_err();
        assert!(err.is_grammar());
        assert!(err.to_string().contains("match empty input"));
    }

    #[test]
    fn rejects_self_recursive_rule() {
        let err = Metamodel::from_source("A: x = A ;").unwrap_err();
        assert!(err.is_grammar());
        assert!(err.to_string().contains("without consuming"));
    }

    #[test]
    fn rejects_mutually_recursive_rules() {
        let err = Metamodel::from_source("A: x = B ; B: y = A ;").unwrap_err();
        assert!(err.is_grammar());
        assert!(err.to_string().contains("without consuming"));
    }

    #[test]
    fn rejects_malformed_grammar_text() {
        let err = Metamodel::from_source("A: x = ").unwrap_err();
        assert!(err.is_grammar());
    }

    #[test]
    fn parses_instance_into_nodes() {
        let mm = Metamodel::from_source(GRAMMAR).unwrap();
        let root = mm
            .parse_source(
                "entity Producer { name: text, }\n\
                 report Global { kind: table, fields: [name], limit: 3, }",
            )
            .unwrap();

        assert_eq!(root.rule, "Model");
        assert_eq!(root.many("entities").len(), 1);
        assert_eq!(root.many("operations").len(), 1);

        let entity = root.many("entities")[0].as_node().unwrap();
        assert_eq!(entity.one("name").unwrap().as_ident(), Some("Producer"));

        let op = root.many("operations")[0].as_node().unwrap();
        let params = op.many("params");
        assert_eq!(params.len(), 3);

        let fields = params[1].as_node().unwrap();
        match fields.one("value").unwrap() {
            Value::List(items) => assert_eq!(items, &["name".to_string()]),
            other => panic!("expected list, got {other:?}"),
        }
        match params[2].as_node().unwrap().one("value").unwrap() {
            Value::Int(3) => {}
            other => panic!("expected 3, got {other:?}"),
        }
    }

    #[test]
    fn reports_line_and_column_on_syntax_error() {
        let mm = Metamodel::from_source(GRAMMAR).unwrap();
        let err = mm
            .parse_source("entity Producer {\n    name text,\n}")
            .unwrap_err();

        assert!(err.is_model_syntax());
        assert_eq!(err.position(), Some((2, 10)));
    }

    #[test]
    fn empty_instance_is_valid() {
        let mm = Metamodel::from_source(GRAMMAR).unwrap();
        let root = mm.parse_source("").unwrap();
        assert!(root.many("entities").is_empty());
        assert!(root.many("operations").is_empty());
    }
}
