mod ast;
pub use ast::Span;

mod error;
pub use error::Error;

pub mod grammar;
pub use grammar::Metamodel;

pub mod model;
pub use model::RawModel;

pub mod ops;
pub use ops::Registry;

pub mod schema;
pub use schema::Schema;

/// A Result type alias that uses Analitica's [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;
