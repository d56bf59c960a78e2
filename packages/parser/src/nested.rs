//! Nested-text codec.
//!
//! Each non-blank line carries one component in option-line form; the
//! number of leading indent units is the component's depth. A line one
//! level deeper than its predecessor is that predecessor's first child, a
//! line at the same depth is a sibling, and a shallower line closes every
//! open container down to its own depth. Lines starting with `#` are
//! comments and are ignored, which is how document headers are stored.

use crate::ast::Component;
use crate::error::{ParseError, ParseResult};
use crate::line::parse_line;
use crate::serializer::Serializer;

pub const DEFAULT_INDENT_WIDTH: usize = 2;

/// Header lines written in front of persisted flow files
pub const DOCUMENT_HEADER: [&str; 2] = ["# Project: flowtree", "# Format: nested-text"];

/// Stateless encoder/decoder for the indentation-delimited line format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestedText {
    indent_width: usize,
}

impl Default for NestedText {
    fn default() -> Self {
        Self::new()
    }
}

struct Entry<'a> {
    line: usize,
    depth: usize,
    text: &'a str,
}

impl NestedText {
    pub fn new() -> Self {
        Self::with_indent_width(DEFAULT_INDENT_WIDTH)
    }

    /// Width 0 is treated as 1 so depth stays well defined.
    pub fn with_indent_width(indent_width: usize) -> Self {
        Self {
            indent_width: indent_width.max(1),
        }
    }

    pub fn indent_width(&self) -> usize {
        self.indent_width
    }

    /// One line per component, depth-first, pre-order
    pub fn encode(&self, components: &[Component]) -> Vec<String> {
        Serializer::with_indent(&" ".repeat(self.indent_width)).serialize(components)
    }

    pub fn encode_to_string(&self, components: &[Component]) -> String {
        let mut text = self.encode(components).join("\n");
        text.push('\n');
        text
    }

    /// Encodes a whole pipeline for storage, preceded by the comment header
    pub fn encode_document(&self, components: &[Component]) -> String {
        let mut text = DOCUMENT_HEADER.join("\n");
        text.push('\n');
        text.push_str(&self.encode_to_string(components));
        text
    }

    /// Decodes lines into top-level components.
    ///
    /// Fails on the first line that is malformed, badly indented or that
    /// skips a depth level. The error carries the 1-based line number.
    pub fn decode<S: AsRef<str>>(&self, lines: &[S]) -> ParseResult<Vec<Component>> {
        let entries = self.entries(lines.iter().map(S::as_ref).enumerate())?;
        build(entries)
    }

    pub fn decode_str(&self, text: &str) -> ParseResult<Vec<Component>> {
        let lines: Vec<&str> = text.lines().collect();
        self.decode(&lines)
    }

    /// Decodes independent fragments, one per top-level line.
    ///
    /// A broken fragment yields an error in its slot without affecting the
    /// fragments around it.
    pub fn decode_fragments<S: AsRef<str>>(&self, lines: &[S]) -> Vec<ParseResult<Component>> {
        let mut fragments: Vec<Vec<(usize, &str)>> = Vec::new();

        for (index, line) in lines.iter().map(S::as_ref).enumerate() {
            if is_ignorable(line) {
                continue;
            }
            let starts_fragment = !line.starts_with(' ') && !line.starts_with('\t');
            match fragments.last_mut() {
                Some(current) if !starts_fragment => current.push((index, line)),
                _ => fragments.push(vec![(index, line)]),
            }
        }

        fragments
            .into_iter()
            .map(|fragment| {
                let entries = self.entries(fragment.into_iter())?;
                let mut roots = build(entries)?;
                match roots.len() {
                    1 => Ok(roots.remove(0)),
                    n => Err(ParseError::malformed_line(
                        0,
                        format!("fragment decoded into {} components", n),
                    )),
                }
            })
            .collect()
    }

    fn entries<'a>(
        &self,
        lines: impl Iterator<Item = (usize, &'a str)>,
    ) -> ParseResult<Vec<Entry<'a>>> {
        let mut entries: Vec<Entry<'a>> = Vec::new();

        for (index, line) in lines {
            if is_ignorable(line) {
                continue;
            }
            let line_no = index + 1;
            let body = line.trim_start_matches(' ');
            if body.starts_with('\t') {
                return Err(ParseError::malformed_line(line_no, "tabs are not allowed in indentation"));
            }

            let indent = line.len() - body.len();
            if indent % self.indent_width != 0 {
                return Err(ParseError::malformed_line(
                    line_no,
                    format!("indentation of {} is not a multiple of {}", indent, self.indent_width),
                ));
            }

            let depth = indent / self.indent_width;
            let max_depth = entries.last().map(|e| e.depth + 1).unwrap_or(0);
            if depth > max_depth {
                return Err(ParseError::malformed_line(
                    line_no,
                    format!("depth {} skips a level (at most {} allowed here)", depth, max_depth),
                ));
            }

            entries.push(Entry {
                line: line_no,
                depth,
                text: body.trim_end(),
            });
        }

        Ok(entries)
    }
}

fn is_ignorable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Rebuilds the tree from depth-annotated entries with a stack of open
/// containers; the stack length always equals the depth of the next line.
fn build(entries: Vec<Entry<'_>>) -> ParseResult<Vec<Component>> {
    let mut roots = Vec::new();
    let mut open: Vec<Component> = Vec::new();

    for entry in entries {
        let component = parse_line(entry.text).map_err(|e| e.at_line(entry.line))?;

        while open.len() > entry.depth {
            close(&mut open, &mut roots);
        }
        open.push(component);
    }

    while !open.is_empty() {
        close(&mut open, &mut roots);
    }

    Ok(roots)
}

fn close(open: &mut Vec<Component>, roots: &mut Vec<Component>) {
    if let Some(done) = open.pop() {
        match open.last_mut() {
            Some(parent) => parent.children.push(done),
            None => roots.push(done),
        }
    }
}

/// Decode nested text with the default indent width
pub fn decode(lines: &[&str]) -> ParseResult<Vec<Component>> {
    NestedText::new().decode(lines)
}

/// Encode components as nested text with the default indent width
pub fn encode(components: &[Component]) -> Vec<String> {
    NestedText::new().encode(components)
}
