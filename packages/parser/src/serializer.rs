use crate::ast::*;
use crate::line::{KEY_ANNOTATION, KEY_LOGGING_LEVEL, KEY_NAME, KEY_SKIP};
use std::fmt::Write;

/// Serializer converts components back to nested text
///
/// One line per component, depth-first and pre-order, each line indented
/// by `indent_string` once per depth level.
pub struct Serializer {
    indent_level: usize,
    indent_string: String,
}

impl Serializer {
    pub fn new() -> Self {
        Self {
            indent_level: 0,
            indent_string: "  ".to_string(), // 2 spaces
        }
    }

    pub fn with_indent(indent: &str) -> Self {
        Self {
            indent_level: 0,
            indent_string: indent.to_string(),
        }
    }

    /// Serialize a list of sibling components, each with its subtree
    pub fn serialize(&mut self, components: &[Component]) -> Vec<String> {
        let mut lines = Vec::new();
        for component in components {
            self.serialize_component(component, &mut lines);
        }
        lines
    }

    fn serialize_component(&mut self, component: &Component, lines: &mut Vec<String>) {
        let mut line = self.indent_string.repeat(self.indent_level);
        line.push_str(&serialize_line(component));
        lines.push(line);

        self.indent_level += 1;
        for child in &component.children {
            self.serialize_component(child, lines);
        }
        self.indent_level -= 1;
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize components to nested-text lines with the default indent
pub fn serialize(components: &[Component]) -> Vec<String> {
    Serializer::new().serialize(components)
}

/// Serialize a single component, ignoring its children, to an option line
pub fn serialize_line(component: &Component) -> String {
    let mut output = component.type_id.clone();

    write_option(&mut output, KEY_NAME, Some(&component.name));
    if component.skip {
        write_option(&mut output, KEY_SKIP, None);
    }
    if !component.annotation.is_empty() {
        write_option(&mut output, KEY_ANNOTATION, Some(&component.annotation));
    }
    if let Some(level) = &component.logging_level {
        write_option(&mut output, KEY_LOGGING_LEVEL, Some(level));
    }
    for (key, value) in component.options.iter() {
        write_option(&mut output, key, value);
    }

    output
}

fn write_option(output: &mut String, key: &str, value: Option<&str>) {
    let _ = write!(output, " -{}", key);
    if let Some(value) = value {
        output.push(' ');
        output.push_str(&quote(value));
    }
}

/// Quote a value if it would not survive tokenizing as a single bare word
pub fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.starts_with('-')
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\');

    if !needs_quotes {
        return value.to_string();
    }

    let mut result = String::with_capacity(value.len() + 2);
    result.push('"');
    for c in value.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\t' => result.push_str("\\t"),
            other => result.push(other),
        }
    }
    result.push('"');
    result
}
