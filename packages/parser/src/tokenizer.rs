use logos::Logos;
use std::fmt;

/// Tokens of the suggestion rule language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token<'src> {
    #[token("IF")]
    If,

    #[token("THEN")]
    Then,

    #[token("AND")]
    And,

    #[token("OR")]
    Or,

    #[token("NOT")]
    Not,

    #[token("TRUE")]
    True,

    #[token("FALSE")]
    False,

    #[token("ISFIRST")]
    IsFirst,

    #[token("ISLAST")]
    IsLast,

    #[token("PARENT")]
    Parent,

    #[token("ANYPARENT")]
    AnyParent,

    #[token("PRECEDING")]
    Preceding,

    #[token("FOLLOWING")]
    Following,

    #[token("BEFORE")]
    Before,

    #[token("AFTER")]
    After,

    #[token("THIS")]
    This,

    #[token("FIRST")]
    First,

    #[token("LAST")]
    Last,

    #[token("IS")]
    Is,

    #[token("LIKE")]
    Like,

    #[token("ALLOWS")]
    Allows,

    #[token("GENERATES")]
    Generates,

    #[token("ACCEPTS")]
    Accepts,

    #[token("STANDALONE")]
    Standalone,

    #[token("SOURCE")]
    Source,

    #[token("TRANSFORMER")]
    Transformer,

    #[token("SINK")]
    Sink,

    // Type ids, optionally namespaced with dots
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_.$]*", |lex| lex.slice())]
    Ident(&'src str),

    // String literals
    #[regex(r#""([^"\\]|\\.)*""#, |lex| lex.slice())]
    String(&'src str),

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,
}

impl<'src> fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::If => write!(f, "IF"),
            Token::Then => write!(f, "THEN"),
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
            Token::Not => write!(f, "NOT"),
            Token::True => write!(f, "TRUE"),
            Token::False => write!(f, "FALSE"),
            Token::IsFirst => write!(f, "ISFIRST"),
            Token::IsLast => write!(f, "ISLAST"),
            Token::Parent => write!(f, "PARENT"),
            Token::AnyParent => write!(f, "ANYPARENT"),
            Token::Preceding => write!(f, "PRECEDING"),
            Token::Following => write!(f, "FOLLOWING"),
            Token::Before => write!(f, "BEFORE"),
            Token::After => write!(f, "AFTER"),
            Token::This => write!(f, "THIS"),
            Token::First => write!(f, "FIRST"),
            Token::Last => write!(f, "LAST"),
            Token::Is => write!(f, "IS"),
            Token::Like => write!(f, "LIKE"),
            Token::Allows => write!(f, "ALLOWS"),
            Token::Generates => write!(f, "GENERATES"),
            Token::Accepts => write!(f, "ACCEPTS"),
            Token::Standalone => write!(f, "STANDALONE"),
            Token::Source => write!(f, "SOURCE"),
            Token::Transformer => write!(f, "TRANSFORMER"),
            Token::Sink => write!(f, "SINK"),
            Token::Ident(s) => write!(f, "identifier '{}'", s),
            Token::String(s) => write!(f, "string {}", s),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

/// Tokens of a single option line (`Type -key value -flag ...`)
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
pub enum OptionToken<'src> {
    // `-` followed by a letter; `-5` stays a value
    #[regex(r"-[a-zA-Z][a-zA-Z0-9_.-]*", |lex| &lex.slice()[1..], priority = 5)]
    Key(&'src str),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| lex.slice())]
    Quoted(&'src str),

    #[regex(r#"[^ \t"]+"#, |lex| lex.slice())]
    Bare(&'src str),
}

/// Tokenize rule source.
///
/// Unrecognized input is reported instead of silently skipped, since a
/// rule with a dropped token could still parse into something different.
pub fn tokenize(source: &str) -> Result<Vec<(Token<'_>, std::ops::Range<usize>)>, usize> {
    let mut tokens = Vec::new();
    for (result, span) in Token::lexer(source).spanned() {
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => return Err(span.start),
        }
    }
    Ok(tokens)
}

/// Tokenize one option line.
pub fn tokenize_options(line: &str) -> Result<Vec<(OptionToken<'_>, std::ops::Range<usize>)>, usize> {
    let mut tokens = Vec::new();
    for (result, span) in OptionToken::lexer(line).spanned() {
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => return Err(span.start),
        }
    }
    Ok(tokens)
}

/// Strips the surrounding quotes of a string literal and resolves escapes.
pub fn unquote(literal: &str) -> String {
    let inner = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(literal);

    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords() {
        let tokens = tokenize("IF ISFIRST THEN Display").unwrap();

        assert_eq!(tokens[0].0, Token::If);
        assert_eq!(tokens[1].0, Token::IsFirst);
        assert_eq!(tokens[2].0, Token::Then);
        assert_eq!(tokens[3].0, Token::Ident("Display"));
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        let tokens = tokenize("IFFY ISLASTING").unwrap();
        assert_eq!(tokens[0].0, Token::Ident("IFFY"));
        assert_eq!(tokens[1].0, Token::Ident("ISLASTING"));
    }

    #[test]
    fn test_dotted_identifiers_and_strings() {
        let tokens = tokenize(r#"flow.sink.Display "Tee -name \"x\"""#).unwrap();
        assert_eq!(tokens[0].0, Token::Ident("flow.sink.Display"));
        assert!(matches!(tokens[1].0, Token::String(_)));
    }

    #[test]
    fn test_unknown_character_is_error() {
        assert_eq!(tokenize("IF % THEN X"), Err(3));
    }

    #[test]
    fn test_option_tokens() {
        let tokens = tokenize_options(r#"Display -name "my out" -skip -limit -5"#).unwrap();
        let kinds: Vec<_> = tokens.into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            kinds,
            vec![
                OptionToken::Bare("Display"),
                OptionToken::Key("name"),
                OptionToken::Quoted("\"my out\""),
                OptionToken::Key("skip"),
                OptionToken::Key("limit"),
                OptionToken::Bare("-5"),
            ]
        );
    }

    #[test]
    fn test_tokens_borrow_from_source() {
        let line = String::from("Display -name out");
        let tokens = tokenize_options(&line).unwrap();
        let (OptionToken::Bare(ty), span) = &tokens[0] else {
            panic!("expected a bare type");
        };
        assert_eq!(*ty, &line[span.clone()]);
        assert!(std::ptr::eq(ty.as_ptr(), line.as_ptr()));
    }

    #[test]
    fn test_unquote_escapes() {
        assert_eq!(unquote(r#""a \"b\" \\ c\nd""#), "a \"b\" \\ c\nd");
    }
}
