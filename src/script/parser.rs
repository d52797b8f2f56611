use super::expr::{Expr, Literal, Operator, Predicate, Wildcard};
use super::lexer::{error_at, tokenize, Token, TokenKind};
use crate::attributes::AttributePath;
use crate::dictionary;
use crate::error::ScriptError;
use crate::item::Tag;
use regex::Regex;

/// Parses match-script text into an expression tree.
///
/// ```text
/// expr      := unary (AND unary)* | unary (OR unary)*
/// unary     := NOT unary | primary
/// primary   := '(' expr ')' | TRUE | FALSE | predicate
/// predicate := attr ('=' literal | '~' string | '=~' string | IN '[' number ',' number ']')
/// attr      := (Keyword | '[gggg,eeee]') ('::' (Keyword | '[gggg,eeee]'))*
/// ```
///
/// AND and OR never mix at one nesting level; parentheses are required.
/// Groups and `NOT`s nest at most [`MAX_NESTING`] deep.
pub fn parse(source: &str) -> Result<Expr, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };

    if parser.peek().kind == TokenKind::Eof {
        return Err(parser.error_here("script is empty"));
    }
    let expr = parser.expr()?;
    if parser.peek().kind != TokenKind::Eof {
        let unexpected = parser.peek().kind.describe();
        return Err(parser.error_here(format!("unexpected {unexpected} after expression")));
    }
    Ok(expr)
}

/// Bounds recursion in the parser and in everything that walks the tree.
pub const MAX_NESTING: usize = 64;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Connective {
    And,
    Or,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self, message: impl Into<String>) -> ScriptError {
        let token = self.peek();
        error_at(token.line, token.column, message)
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token, ScriptError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            let found = self.peek().kind.describe();
            Err(self.error_here(format!(
                "expected {} {context}, found {found}",
                kind.describe()
            )))
        }
    }

    /// Consumes an opening `(` or `NOT` and parses what it encloses one
    /// level deeper.
    fn nested<T>(
        &mut self,
        inner: impl FnOnce(&mut Self) -> Result<T, ScriptError>,
    ) -> Result<T, ScriptError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_here(format!(
                "expression nested too deeply (limit {MAX_NESTING})"
            )));
        }
        self.advance();
        self.depth += 1;
        let result = inner(self);
        self.depth -= 1;
        result
    }

    fn connective(&self) -> Option<Connective> {
        let kind = &self.peek().kind;
        if kind.is_keyword("AND") {
            Some(Connective::And)
        } else if kind.is_keyword("OR") {
            Some(Connective::Or)
        } else {
            None
        }
    }

    fn expr(&mut self) -> Result<Expr, ScriptError> {
        let first = self.unary()?;
        let Some(kind) = self.connective() else {
            return Ok(first);
        };

        let mut terms = vec![first];
        while let Some(next) = self.connective() {
            if next != kind {
                return Err(self.error_here(
                    "AND and OR cannot be mixed without parentheses",
                ));
            }
            self.advance();
            terms.push(self.unary()?);
        }

        Ok(match kind {
            Connective::And => Expr::And(terms),
            Connective::Or => Expr::Or(terms),
        })
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if self.peek().kind.is_keyword("NOT") {
            let inner = self.nested(Self::unary)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let kind = self.peek().kind.clone();
        match kind {
            TokenKind::LParen => self.nested(|parser| {
                let inner = parser.expr()?;
                parser.expect(TokenKind::RParen, "to close group")?;
                Ok(inner)
            }),
            TokenKind::Ident(ref name) if name.eq_ignore_ascii_case("TRUE") => {
                self.advance();
                Ok(Expr::Const(true))
            }
            TokenKind::Ident(ref name) if name.eq_ignore_ascii_case("FALSE") => {
                self.advance();
                Ok(Expr::Const(false))
            }
            TokenKind::Ident(_) | TokenKind::Tag(_) => self.predicate(),
            TokenKind::RParen => Err(self.error_here("unbalanced ')'")),
            other => Err(self.error_here(format!(
                "expected attribute, '(' or NOT, found {}",
                other.describe()
            ))),
        }
    }

    fn predicate(&mut self) -> Result<Expr, ScriptError> {
        let path = self.attribute_path()?;
        let op = self.advance();
        let operator = match op.kind {
            TokenKind::Equals => Operator::Equals(self.literal()?),
            TokenKind::Tilde => {
                let pattern = self.string_literal("after '~'")?;
                let wildcard = Wildcard::new(&pattern)
                    .map_err(|e| error_at(op.line, op.column, format!("bad wildcard: {e}")))?;
                Operator::Wildcard(wildcard)
            }
            TokenKind::RegexMatch => {
                let pattern = self.string_literal("after '=~'")?;
                let regex = Regex::new(&pattern).map_err(|e| {
                    error_at(
                        op.line,
                        op.column,
                        format!("invalid regex pattern '{pattern}': {e}"),
                    )
                })?;
                Operator::Regex(regex)
            }
            TokenKind::Ident(ref name) if name.eq_ignore_ascii_case("IN") => self.range()?,
            other => {
                return Err(error_at(
                    op.line,
                    op.column,
                    format!(
                        "unknown operator {} after {path}; expected =, ~, =~ or IN",
                        other.describe()
                    ),
                ))
            }
        };
        Ok(Expr::Predicate(Predicate { path, operator }))
    }

    fn attribute_path(&mut self) -> Result<AttributePath, ScriptError> {
        let mut tags = vec![self.attribute_element()?];
        while self.peek().kind == TokenKind::PathSep {
            self.advance();
            tags.push(self.attribute_element()?);
        }
        Ok(AttributePath::new(tags))
    }

    fn attribute_element(&mut self) -> Result<Tag, ScriptError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Tag(tag) => Ok(tag),
            TokenKind::Ident(name) => dictionary::tag_for(&name).ok_or_else(|| {
                error_at(
                    token.line,
                    token.column,
                    format!("unknown attribute '{name}'"),
                )
            }),
            other => Err(error_at(
                token.line,
                token.column,
                format!("expected attribute, found {}", other.describe()),
            )),
        }
    }

    fn literal(&mut self) -> Result<Literal, ScriptError> {
        match self.peek().kind.clone() {
            TokenKind::Str(s) => {
                self.advance();
                Ok(Literal::Text(s))
            }
            TokenKind::Number(n) => {
                self.advance();
                Ok(Literal::Number(n))
            }
            other => Err(self.error_here(format!(
                "expected string or number literal, found {}",
                other.describe()
            ))),
        }
    }

    fn string_literal(&mut self, context: &str) -> Result<String, ScriptError> {
        match self.peek().kind.clone() {
            TokenKind::Str(s) => {
                self.advance();
                Ok(s)
            }
            other => Err(self.error_here(format!(
                "expected string literal {context}, found {}",
                other.describe()
            ))),
        }
    }

    fn number(&mut self) -> Result<f64, ScriptError> {
        match self.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(n)
            }
            other => Err(self.error_here(format!(
                "expected number in range, found {}",
                other.describe()
            ))),
        }
    }

    fn range(&mut self) -> Result<Operator, ScriptError> {
        self.expect(TokenKind::LBracket, "to open range")?;
        let start = self.peek().clone();
        let low = self.number()?;
        self.expect(TokenKind::Comma, "between range bounds")?;
        let high = self.number()?;
        self.expect(TokenKind::RBracket, "to close range")?;
        if low > high {
            return Err(error_at(
                start.line,
                start.column,
                format!("empty range: {low} is greater than {high}"),
            ));
        }
        Ok(Operator::Range { low, high })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttrValue, AttributeMap};

    const MODALITY: Tag = Tag(0x0008, 0x0060);

    fn modality(value: &str) -> AttributeMap {
        [(
            AttributePath::from(MODALITY),
            AttrValue::Text(value.to_string()),
        )]
        .into_iter()
        .collect()
    }

    fn parse_err(source: &str) -> String {
        match parse(source) {
            Err(e @ ScriptError::Parse { .. }) => e.to_string(),
            Err(other) => panic!("expected parse error, got {other}"),
            Ok(expr) => panic!("expected parse error for {source:?}, parsed {expr}"),
        }
    }

    #[test]
    fn test_simple_equality() {
        let expr = parse(r#"Modality = "CT""#).unwrap();
        assert!(expr.evaluate(&modality("CT")));
        assert!(!expr.evaluate(&modality("MR")));
        assert!(!expr.evaluate(&AttributeMap::default()));
    }

    #[test]
    fn test_grouped_or() {
        let expr = parse(r#"(Modality = "CT") OR (Modality = "MR")"#).unwrap();
        assert!(expr.evaluate(&modality("CT")));
        assert!(expr.evaluate(&modality("MR")));
        assert!(!expr.evaluate(&modality("US")));
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let expr = parse(r#"not Modality = "CT" and true"#).unwrap();
        assert!(expr.evaluate(&modality("MR")));
        assert!(!expr.evaluate(&modality("CT")));
    }

    #[test]
    fn test_tag_and_sequence_paths() {
        let expr = parse(r#"[0040,A730]::CodeValue = "121071""#).unwrap();
        assert_eq!(
            expr.attributes()[0].to_string(),
            "[0040,A730]::[0008,0100]"
        );
        let expr = parse("[0020,0011] IN [1, 10]").unwrap();
        assert_eq!(expr.to_string(), "[0020,0011] IN [1, 10]");
    }

    #[test]
    fn test_all_operators_parse() {
        let expr = parse(
            r#"(PatientName ~ "DOE^*") AND (StudyDescription =~ "(?i)chest")
               AND (SeriesNumber IN [1, 99]) AND (Rows = 512)"#,
        )
        .unwrap();
        assert_eq!(expr.attributes().len(), 4);
    }

    #[test]
    fn test_missing_literal() {
        let msg = parse_err("Modality = ");
        assert!(msg.contains("expected string or number literal"), "{msg}");
        assert!(msg.contains("end of script"), "{msg}");
    }

    #[test]
    fn test_unbalanced_grouping() {
        assert!(parse_err(r#"(Modality = "CT""#).contains("to close group"));
        assert!(parse_err(r#"Modality = "CT")"#).contains("after expression"));
        assert!(parse_err(r#")Modality = "CT""#).contains("unbalanced"));
    }

    #[test]
    fn test_unknown_attribute_and_operator() {
        assert!(parse_err(r#"Modaliti = "CT""#).contains("unknown attribute 'Modaliti'"));
        assert!(parse_err(r#"Modality "CT""#).contains("unknown operator"));
        assert!(parse_err(r#"Modality equals "CT""#).contains("unknown operator"));
    }

    #[test]
    fn test_mixed_connectives_need_parentheses() {
        let msg = parse_err(r#"Modality = "CT" AND Rows = 1 OR Rows = 2"#);
        assert!(msg.contains("cannot be mixed"), "{msg}");
        assert!(parse(r#"Modality = "CT" AND (Rows = 1 OR Rows = 2)"#).is_ok());
    }

    #[test]
    fn test_invalid_regex_and_range() {
        assert!(parse_err(r#"Modality =~ "([""#).contains("invalid regex"));
        assert!(parse_err("Rows IN [10, 1]").contains("empty range"));
        assert!(parse_err(r#"Rows IN [1, "x"]"#).contains("expected number"));
        assert!(parse_err("Modality ~ 5").contains("expected string literal"));
    }

    #[test]
    fn test_empty_script() {
        assert!(parse_err("").contains("empty"));
        assert!(parse_err("  // nothing but a comment\n").contains("empty"));
    }

    #[test]
    fn test_error_position() {
        match parse("Modality = \"CT\" AND\n  Bogus = 1") {
            Err(ScriptError::Parse { line, column, .. }) => assert_eq!((line, column), (2, 3)),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_nesting_is_bounded() {
        let at_limit = format!(
            "{}TRUE{}",
            "(".repeat(MAX_NESTING),
            ")".repeat(MAX_NESTING)
        );
        assert!(parse(&at_limit).unwrap().evaluate(&AttributeMap::default()));

        let too_deep = format!(
            "{}TRUE{}",
            "(".repeat(MAX_NESTING + 1),
            ")".repeat(MAX_NESTING + 1)
        );
        match parse(&too_deep) {
            Err(ScriptError::Parse {
                line,
                column,
                message,
            }) => {
                assert_eq!((line, column), (1, MAX_NESTING + 1));
                assert!(message.contains("nested too deeply"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let nots = format!("{}Modality = \"CT\"", "NOT ".repeat(MAX_NESTING + 1));
        assert!(parse_err(&nots).contains("nested too deeply"));
    }

    #[test]
    fn test_pathological_nesting_fails_without_overflow() {
        let source = format!("{}TRUE{}", "(".repeat(200_000), ")".repeat(200_000));
        assert!(parse_err(&source).contains("nested too deeply"));
    }
}
