use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

/// Errors raised while reading option lines, nested text or suggestion rules.
///
/// `pos` is a byte offset into the text that was handed to the parser;
/// `line` is 1-based and only used by the nested-text decoder.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unexpected token at {pos}: expected {expected}, found {found}")]
    UnexpectedToken {
        pos: usize,
        expected: String,
        found: String,
    },

    #[error("Unexpected end of input at {pos}: expected {expected}")]
    UnexpectedEof { pos: usize, expected: String },

    #[error("Invalid syntax at {pos}: {message}")]
    InvalidSyntax { pos: usize, message: String },

    #[error("Lexer error at {pos}")]
    LexerError { pos: usize },

    #[error("Line {line}: {message}")]
    MalformedLine { line: usize, message: String },
}

impl ParseError {
    pub fn unexpected_token(pos: usize, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnexpectedToken {
            pos,
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unexpected_eof(pos: usize, expected: impl Into<String>) -> Self {
        Self::UnexpectedEof {
            pos,
            expected: expected.into(),
        }
    }

    pub fn invalid_syntax(pos: usize, message: impl Into<String>) -> Self {
        Self::InvalidSyntax {
            pos,
            message: message.into(),
        }
    }

    pub fn lexer_error(pos: usize) -> Self {
        Self::LexerError { pos }
    }

    pub fn malformed_line(line: usize, message: impl Into<String>) -> Self {
        Self::MalformedLine {
            line,
            message: message.into(),
        }
    }

    /// Byte offset of the error, if it has one.
    pub fn pos(&self) -> Option<usize> {
        match self {
            ParseError::UnexpectedToken { pos, .. }
            | ParseError::UnexpectedEof { pos, .. }
            | ParseError::InvalidSyntax { pos, .. }
            | ParseError::LexerError { pos } => Some(*pos),
            ParseError::MalformedLine { .. } => None,
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::MalformedLine { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// Re-anchors an option-line error to a line of a nested-text document.
    pub fn at_line(self, line: usize) -> Self {
        match self {
            ParseError::MalformedLine { .. } => self,
            other => ParseError::malformed_line(line, other.to_string()),
        }
    }
}

/// Pretty-print an error against its source text using ariadne
#[cfg(feature = "pretty-errors")]
pub fn format_error(source: &str, filename: &str, error: &ParseError) -> String {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let span = match error {
        ParseError::MalformedLine { line, .. } => line_span(source, *line),
        other => {
            let start = other.pos().unwrap_or(0).min(source.len());
            start..(start + 1).min(source.len()).max(start)
        }
    };

    let label = match error {
        ParseError::UnexpectedToken { expected, .. } | ParseError::UnexpectedEof { expected, .. } => {
            format!("expected {}", expected)
        }
        ParseError::InvalidSyntax { message, .. } | ParseError::MalformedLine { message, .. } => {
            message.clone()
        }
        ParseError::LexerError { .. } => "unrecognized input".to_string(),
    };

    let mut output = Vec::new();
    let report = Report::build(ReportKind::Error, filename, span.start)
        .with_message(error.to_string())
        .with_label(
            Label::new((filename, span))
                .with_color(Color::Red)
                .with_message(label),
        )
        .finish();

    if report
        .write((filename, Source::from(source)), &mut output)
        .is_err()
    {
        return error.to_string();
    }

    String::from_utf8(output).unwrap_or_else(|_| "Error formatting failed".to_string())
}

#[cfg(feature = "pretty-errors")]
fn line_span(source: &str, line: usize) -> std::ops::Range<usize> {
    let mut offset = 0;
    for (index, text) in source.split('\n').enumerate() {
        if index + 1 == line {
            return offset..offset + text.len();
        }
        offset += text.len() + 1;
    }
    source.len()..source.len()
}
