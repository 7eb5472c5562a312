//! Bastion Model -- template document model and parser.
//!
//! This crate turns raw infrastructure template text (JSON or YAML) into a
//! [`TemplateModel`] that audit rules inspect. The audit engine only depends
//! on the [`ModelParser`] trait: a parser either produces a model or a
//! [`ParseError`] describing why the document was rejected.

pub mod error;
pub mod model;
pub mod parameters;
pub mod parser;

pub use error::{ParseError, ParseResult};
pub use model::{Parameter, Resource, TemplateModel};
pub use parser::{ModelParser, TemplateParser};
