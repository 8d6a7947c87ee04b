use crate::ast::Span;

/// An error that can occur while generating a reporting service.
///
/// Every variant carries enough context (entity, field, or operation name,
/// and source location where available) for the user to fix the model
/// description. Generation is deterministic, so none of these are retried.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

#[derive(Debug)]
enum ErrorKind {
    /// The grammar description itself is malformed. Fatal before any
    /// instance parsing happens.
    Grammar { message: String },

    /// The instance file does not conform to the grammar.
    ModelSyntax {
        line: u32,
        column: u32,
        message: String,
    },

    /// Two entities were declared with the same name.
    DuplicateEntity { entity: String },

    /// A foreign-key-shaped field or an operation parameter references
    /// something that was never declared.
    DanglingReference { message: String },

    /// An entity's foreign keys do not form a valid junction shape.
    Classification { entity: String, message: String },

    /// An operation declared a kind outside the closed variant set.
    UnknownOperationKind { operation: String, kind: String },

    /// An operation is missing a parameter its kind requires.
    IncompleteOperation { operation: String, message: String },

    /// Reading an input file failed.
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn grammar(message: impl Into<String>) -> Self {
        ErrorKind::Grammar {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn model_syntax(span: Span, message: impl Into<String>) -> Self {
        ErrorKind::ModelSyntax {
            line: span.line,
            column: span.column,
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn duplicate_entity(entity: impl Into<String>) -> Self {
        ErrorKind::DuplicateEntity {
            entity: entity.into(),
        }
        .into()
    }

    pub(crate) fn dangling_reference(message: impl Into<String>) -> Self {
        ErrorKind::DanglingReference {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn classification(entity: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorKind::Classification {
            entity: entity.into(),
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn unknown_operation_kind(
        operation: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        ErrorKind::UnknownOperationKind {
            operation: operation.into(),
            kind: kind.into(),
        }
        .into()
    }

    pub(crate) fn incomplete_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ErrorKind::IncompleteOperation {
            operation: operation.into(),
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        ErrorKind::Io {
            path: path.display().to_string(),
            source,
        }
        .into()
    }

    pub fn is_grammar(&self) -> bool {
        matches!(self.kind, ErrorKind::Grammar { .. })
    }

    pub fn is_model_syntax(&self) -> bool {
        matches!(self.kind, ErrorKind::ModelSyntax { .. })
    }

    pub fn is_duplicate_entity(&self) -> bool {
        matches!(self.kind, ErrorKind::DuplicateEntity { .. })
    }

    pub fn is_dangling_reference(&self) -> bool {
        matches!(self.kind, ErrorKind::DanglingReference { .. })
    }

    pub fn is_classification(&self) -> bool {
        matches!(self.kind, ErrorKind::Classification { .. })
    }

    pub fn is_unknown_operation_kind(&self) -> bool {
        matches!(self.kind, ErrorKind::UnknownOperationKind { .. })
    }

    pub fn is_incomplete_operation(&self) -> bool {
        matches!(self.kind, ErrorKind::IncompleteOperation { .. })
    }

    /// Line and column of the offending token, when the error is a syntax
    /// error in the instance file.
    pub fn position(&self) -> Option<(u32, u32)> {
        match &self.kind {
            ErrorKind::ModelSyntax { line, column, .. } => Some((*line, *column)),
            _ => None,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.kind {
            ErrorKind::Grammar { message } => write!(f, "invalid grammar: {message}"),
            ErrorKind::ModelSyntax {
                line,
                column,
                message,
            } => write!(f, "syntax error at line {line}, column {column}: {message}"),
            ErrorKind::DuplicateEntity { entity } => {
                write!(f, "duplicate entity `{entity}`")
            }
            ErrorKind::DanglingReference { message } => f.write_str(message),
            ErrorKind::Classification { entity, message } => {
                write!(f, "entity `{entity}`: {message}")
            }
            ErrorKind::UnknownOperationKind { operation, kind } => {
                write!(f, "operation `{operation}` has unknown kind `{kind}`")
            }
            ErrorKind::IncompleteOperation { operation, message } => {
                write!(f, "operation `{operation}` is incomplete: {message}")
            }
            ErrorKind::Io { path, source } => {
                write!(f, "failed to read `{path}`: {source}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_syntax_position() {
        let err = Error::model_syntax(Span { line: 4, column: 9 }, "expected `:`");
        assert!(err.is_model_syntax());
        assert_eq!(err.position(), Some((4, 9)));
        assert_eq!(
            err.to_string(),
            "syntax error at line 4, column 9: expected `:`"
        );
    }

    #[test]
    fn duplicate_entity_display() {
        let err = Error::duplicate_entity("Producer");
        assert!(err.is_duplicate_entity());
        assert_eq!(err.to_string(), "duplicate entity `Producer`");
    }
}
