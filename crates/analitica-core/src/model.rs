//! Model loader.
//!
//! Maps the generic node tree produced by [`Metamodel`] parsing into raw
//! entity and operation declarations, exactly as written: declaration order
//! preserved, no deduplication. The grammar is expected to expose the
//! well-known attributes (`entities`, `operations`, `name`, `fields`,
//! `type`, `params`, `value`); a grammar that does not is reported as a
//! grammar error, not a model error.

use crate::ast::Span;
use crate::grammar::{Metamodel, Node, Value};
use crate::{Error, Result};

use std::path::Path;

#[derive(Debug)]
pub struct RawModel {
    pub entities: Vec<EntityDecl>,
    pub operations: Vec<OperationDecl>,
}

#[derive(Debug)]
pub struct EntityDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub span: Span,
}

#[derive(Debug)]
pub struct FieldDecl {
    pub name: String,
    pub ty: String,
    pub span: Span,
}

#[derive(Debug)]
pub struct OperationDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub span: Span,
}

#[derive(Debug)]
pub struct ParamDecl {
    pub name: String,
    pub value: ParamValue,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ParamValue {
    Ident(String),
    Int(i64),
    List(Vec<String>),
}

impl RawModel {
    pub fn from_file(metamodel: &Metamodel, path: impl AsRef<Path>) -> Result<RawModel> {
        Self::from_node(&metamodel.parse_file(path)?)
    }

    pub fn from_source(metamodel: &Metamodel, src: &str) -> Result<RawModel> {
        Self::from_node(&metamodel.parse_source(src)?)
    }

    pub fn from_node(root: &Node) -> Result<RawModel> {
        let entities = nodes(root, "entities")?
            .iter()
            .map(|node| EntityDecl::from_node(node))
            .collect::<Result<_>>()?;

        let operations = nodes(root, "operations")?
            .iter()
            .map(|node| OperationDecl::from_node(node))
            .collect::<Result<_>>()?;

        Ok(RawModel {
            entities,
            operations,
        })
    }
}

impl EntityDecl {
    fn from_node(node: &Node) -> Result<EntityDecl> {
        Ok(EntityDecl {
            name: name_of(node)?,
            fields: nodes(node, "fields")?
                .iter()
                .map(|field| {
                    Ok(FieldDecl {
                        name: name_of(field)?,
                        ty: ident_attr(field, "type")?,
                        span: field.span,
                    })
                })
                .collect::<Result<_>>()?,
            span: node.span,
        })
    }
}

impl OperationDecl {
    fn from_node(node: &Node) -> Result<OperationDecl> {
        Ok(OperationDecl {
            name: name_of(node)?,
            params: nodes(node, "params")?
                .iter()
                .map(|param| {
                    let value = match param.one("value") {
                        Some(Value::Ident(ident)) => ParamValue::Ident(ident.clone()),
                        Some(Value::Int(value)) => ParamValue::Int(*value),
                        Some(Value::List(items)) => ParamValue::List(items.clone()),
                        _ => {
                            return Err(grammar_shape(param, "a terminal `value` attribute"));
                        }
                    };

                    Ok(ParamDecl {
                        name: name_of(param)?,
                        value,
                        span: param.span,
                    })
                })
                .collect::<Result<_>>()?,
            span: node.span,
        })
    }

    pub fn param(&self, name: &str) -> Option<&ParamDecl> {
        self.params.iter().find(|param| param.name == name)
    }
}

fn nodes<'a>(node: &'a Node, attr: &str) -> Result<Vec<&'a Node>> {
    node.many(attr)
        .iter()
        .map(|value| {
            value
                .as_node()
                .ok_or_else(|| grammar_shape(node, "a rule-valued repetition"))
        })
        .collect()
}

fn name_of(node: &Node) -> Result<String> {
    ident_attr(node, "name")
}

fn ident_attr(node: &Node, attr: &str) -> Result<String> {
    node.one(attr)
        .and_then(Value::as_ident)
        .map(str::to_string)
        .ok_or_else(|| grammar_shape(node, &format!("an identifier `{attr}` attribute")))
}

fn grammar_shape(node: &Node, expected: &str) -> Error {
    Error::grammar(format!(
        "rule `{}` must capture {expected} for the generator to use it",
        node.rule
    ))
}
