//! Reader for the single-line component format.
//!
//! A line holds a type id followed by `-key value` pairs and bare `-flag`s.
//! The keys `name`, `skip`, `annotation` and `logging-level` map onto the
//! component's own fields; every other key is kept verbatim as an option.

use crate::ast::{Component, Options};
use crate::error::{ParseError, ParseResult};
use crate::tokenizer::{tokenize_options, unquote, OptionToken};

pub const KEY_NAME: &str = "name";
pub const KEY_SKIP: &str = "skip";
pub const KEY_ANNOTATION: &str = "annotation";
pub const KEY_LOGGING_LEVEL: &str = "logging-level";

/// Parse one option line into a stripped component.
pub fn parse_line(line: &str) -> ParseResult<Component> {
    let tokens = tokenize_options(line).map_err(ParseError::lexer_error)?;
    let mut iter = tokens.into_iter().peekable();

    let type_id = match iter.next() {
        Some((OptionToken::Bare(id), _)) => id.to_string(),
        Some((OptionToken::Key(key), span)) => {
            return Err(ParseError::unexpected_token(span.start, "type id", format!("option -{}", key)))
        }
        Some((OptionToken::Quoted(s), span)) => {
            return Err(ParseError::unexpected_token(span.start, "type id", s))
        }
        None => return Err(ParseError::unexpected_eof(0, "type id")),
    };

    let mut component = Component::new(type_id, "");
    let mut options = Options::new();

    while let Some((token, span)) = iter.next() {
        let key = match token {
            OptionToken::Key(key) => key,
            OptionToken::Bare(value) | OptionToken::Quoted(value) => {
                return Err(ParseError::invalid_syntax(
                    span.start,
                    format!("value {} without an option key", value),
                ))
            }
        };

        let value = match iter.peek() {
            Some((OptionToken::Bare(v), _)) => {
                let v = v.to_string();
                iter.next();
                Some(v)
            }
            Some((OptionToken::Quoted(v), _)) => {
                let v = unquote(v);
                iter.next();
                Some(v)
            }
            _ => None,
        };

        match key {
            KEY_NAME => component.name = value.unwrap_or_default(),
            KEY_ANNOTATION => component.annotation = value.unwrap_or_default(),
            KEY_LOGGING_LEVEL => component.logging_level = value,
            KEY_SKIP => {
                component.skip = match value.as_deref() {
                    None | Some("true") => true,
                    Some("false") => false,
                    Some(other) => {
                        return Err(ParseError::invalid_syntax(
                            span.start,
                            format!("-skip expects no value, got '{}'", other),
                        ))
                    }
                }
            }
            other => options.set(other, value),
        }
    }

    component.options = options;
    Ok(component)
}
