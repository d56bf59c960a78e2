//! Component model, nested-text codec and suggestion rule language.

pub mod ast;
pub mod error;
pub mod full_name;
pub mod line;
pub mod nested;
pub mod parser;
pub mod serializer;
pub mod tokenizer;

pub use ast::{Component, Options, Rule};
pub use error::{ParseError, ParseResult};
pub use full_name::{join_full_name, split_full_name};
pub use line::parse_line;
pub use nested::NestedText;
pub use parser::{parse, parse_rules, Parser};
pub use serializer::{serialize, serialize_line, Serializer};

#[cfg(feature = "pretty-errors")]
pub use error::format_error;
