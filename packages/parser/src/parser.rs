use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::tokenizer::{tokenize, unquote, Token};

/// Parser for suggestion rules (`IF <condition> THEN <command>`)
///
/// Operator precedence from loosest to tightest: `OR`, `AND`, `NOT`.
pub struct Parser<'src> {
    tokens: Vec<(Token<'src>, std::ops::Range<usize>)>,
    pos: usize,
    source_len: usize,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> ParseResult<Self> {
        let tokens = tokenize(source).map_err(ParseError::lexer_error)?;
        Ok(Self {
            tokens,
            pos: 0,
            source_len: source.len(),
        })
    }

    /// Parse a complete rule; trailing tokens are an error
    pub fn parse_rule(&mut self) -> ParseResult<Rule> {
        let start = self.peek_span().start;
        self.expect(Token::If)?;
        let condition = self.parse_or()?;
        self.expect(Token::Then)?;
        let command = self.parse_command()?;
        let end = self.current_span().end;

        if let Some((token, span)) = self.peek() {
            return Err(ParseError::unexpected_token(span.start, "end of rule", token.to_string()));
        }

        Ok(Rule {
            condition,
            command,
            span: Span::new(start, end),
        })
    }

    fn parse_or(&mut self) -> ParseResult<Condition> {
        let mut left = self.parse_and()?;
        while self.match_token(Token::Or) {
            let right = self.parse_and()?;
            left = Condition::Or {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Condition> {
        let mut left = self.parse_unary()?;
        while self.match_token(Token::And) {
            let right = self.parse_unary()?;
            left = Condition::And {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Condition> {
        if self.match_token(Token::Not) {
            let inner = self.parse_unary()?;
            return Ok(Condition::Not {
                inner: Box::new(inner),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Condition> {
        let (token, span) = match self.advance() {
            Some((token, span)) => (token.clone(), span.clone()),
            None => return Err(ParseError::unexpected_eof(self.source_len, "condition")),
        };

        match token {
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::True => Ok(Condition::Literal { value: true }),
            Token::False => Ok(Condition::Literal { value: false }),
            Token::IsFirst => Ok(Condition::IsFirst),
            Token::IsLast => Ok(Condition::IsLast),
            Token::Parent => {
                if self.match_token(Token::Allows) {
                    let role = self.parse_allowed_role()?;
                    return Ok(Condition::ParentAllows { role });
                }
                let test = self.parse_class_test()?;
                let class = self.expect_ident()?;
                Ok(Condition::Parent { test, class })
            }
            Token::AnyParent => {
                let test = self.parse_class_test()?;
                let class = self.expect_ident()?;
                Ok(Condition::AnyParent { test, class })
            }
            Token::Preceding => {
                self.expect(Token::Generates)?;
                let data_type = self.expect_ident()?;
                Ok(Condition::PrecedingGenerates { data_type })
            }
            Token::Following => {
                self.expect(Token::Accepts)?;
                let data_type = self.expect_ident()?;
                Ok(Condition::FollowingAccepts { data_type })
            }
            Token::Before => Ok(Condition::Before {
                target: self.parse_target()?,
            }),
            Token::After => Ok(Condition::After {
                target: self.parse_target()?,
            }),
            Token::This => {
                self.expect(Token::Is)?;
                Ok(Condition::This {
                    target: self.parse_target()?,
                })
            }
            Token::First => {
                self.expect(Token::Is)?;
                Ok(Condition::First {
                    target: self.parse_target()?,
                })
            }
            Token::Last => {
                self.expect(Token::Is)?;
                Ok(Condition::Last {
                    target: self.parse_target()?,
                })
            }
            other => Err(ParseError::unexpected_token(span.start, "condition", other.to_string())),
        }
    }

    fn parse_class_test(&mut self) -> ParseResult<ClassTest> {
        if self.match_token(Token::Is) {
            Ok(ClassTest::Is)
        } else if self.match_token(Token::Like) {
            Ok(ClassTest::Like)
        } else {
            Err(self.unexpected("IS or LIKE"))
        }
    }

    fn parse_allowed_role(&mut self) -> ParseResult<AllowedRole> {
        if self.match_token(Token::Standalone) {
            Ok(AllowedRole::Standalone)
        } else if self.match_token(Token::Source) {
            Ok(AllowedRole::Source)
        } else {
            Err(self.unexpected("STANDALONE or SOURCE"))
        }
    }

    fn parse_target(&mut self) -> ParseResult<Target> {
        let target = match self.peek() {
            Some((Token::Standalone, _)) => Target::Standalone,
            Some((Token::Source, _)) => Target::Source,
            Some((Token::Transformer, _)) => Target::Transformer,
            Some((Token::Sink, _)) => Target::Sink,
            Some((Token::Ident(id), _)) => Target::Class(id.to_string()),
            _ => return Err(self.unexpected("role or type name")),
        };
        self.advance();
        Ok(target)
    }

    fn parse_command(&mut self) -> ParseResult<Command> {
        let command = match self.peek() {
            Some((Token::Ident(id), _)) => Command::Type(id.to_string()),
            Some((Token::String(s), span)) => {
                let text = unquote(s);
                if text.trim().is_empty() {
                    return Err(ParseError::invalid_syntax(span.start, "empty command"));
                }
                Command::Template(text)
            }
            _ => return Err(self.unexpected("type name or quoted command")),
        };
        self.advance();
        Ok(command)
    }

    // Helper methods

    fn peek(&self) -> Option<&(Token<'src>, std::ops::Range<usize>)> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&(Token<'src>, std::ops::Range<usize>)> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn check(&self, token: Token) -> bool {
        if let Some((t, _)) = self.peek() {
            std::mem::discriminant(t) == std::mem::discriminant(&token)
        } else {
            false
        }
    }

    fn match_token(&mut self, token: Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        if self.check(token.clone()) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(token.to_string()))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some((Token::Ident(id), _)) => {
                let id = id.to_string();
                self.advance();
                Ok(id)
            }
            _ => Err(self.unexpected("type name")),
        }
    }

    fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        match self.peek() {
            Some((token, span)) => ParseError::unexpected_token(span.start, expected, token.to_string()),
            None => ParseError::unexpected_eof(self.source_len, expected),
        }
    }

    fn current_span(&self) -> std::ops::Range<usize> {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|(_, span)| span.clone())
            .unwrap_or(0..0)
    }

    fn peek_span(&self) -> std::ops::Range<usize> {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.clone())
            .unwrap_or(self.source_len..self.source_len)
    }
}

/// Parse a single rule
pub fn parse(source: &str) -> ParseResult<Rule> {
    Parser::new(source)?.parse_rule()
}

/// Parse a rule file: one rule per non-blank line, `#` starts a comment line.
///
/// Each entry pairs the rule text with its own parse result so one bad
/// line never hides the others.
pub fn parse_rules(source: &str) -> Vec<(String, ParseResult<Rule>)> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| (line.to_string(), parse(line)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_rule() {
        let rule = parse("IF ISFIRST THEN CallableActors").unwrap();
        assert_eq!(rule.condition, Condition::IsFirst);
        assert_eq!(rule.command, Command::Type("CallableActors".to_string()));
    }

    #[test]
    fn test_precedence_not_and_or() {
        let rule = parse("IF NOT ISFIRST AND ISLAST OR TRUE THEN X").unwrap();
        match rule.condition {
            Condition::Or { left, right } => {
                assert_eq!(*right, Condition::Literal { value: true });
                match *left {
                    Condition::And { left, right } => {
                        assert!(matches!(*left, Condition::Not { .. }));
                        assert_eq!(*right, Condition::IsLast);
                    }
                    other => panic!("expected AND, got {:?}", other),
                }
            }
            other => panic!("expected OR, got {:?}", other),
        }
    }

    #[test]
    fn test_parenthesized_condition() {
        let rule = parse("IF (PARENT IS Flow OR PARENT LIKE Tee) AND BEFORE SINK THEN Display").unwrap();
        assert!(matches!(rule.condition, Condition::And { .. }));
    }

    #[test]
    fn test_parent_allows() {
        let rule = parse("IF PARENT ALLOWS STANDALONE THEN Stopwatch").unwrap();
        assert_eq!(
            rule.condition,
            Condition::ParentAllows {
                role: AllowedRole::Standalone
            }
        );
    }

    #[test]
    fn test_template_command() {
        let rule = parse(r#"IF AFTER SOURCE THEN "Display -name \"${PRECEDING.NAME}-out\"""#).unwrap();
        assert_eq!(
            rule.command,
            Command::Template("Display -name \"${PRECEDING.NAME}-out\"".to_string())
        );
        assert_eq!(
            rule.condition,
            Condition::After {
                target: Target::Source
            }
        );
    }

    #[test]
    fn test_missing_then_is_error() {
        let err = parse("IF ISFIRST Display").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn test_trailing_tokens_are_error() {
        assert!(parse("IF TRUE THEN A B").is_err());
    }

    #[test]
    fn test_truncated_rule_is_eof() {
        assert!(matches!(parse("IF PARENT IS"), Err(ParseError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_parse_rules_keeps_bad_lines_separate() {
        let rules = parse_rules("# comment\nIF TRUE THEN A\n\nIF BOGUS THEN B\nIF FALSE THEN C\n");
        assert_eq!(rules.len(), 3);
        assert!(rules[0].1.is_ok());
        assert!(rules[1].1.is_err());
        assert_eq!(rules[2].0, "IF FALSE THEN C");
    }
}
