//! Expression tree and evaluation.

use crate::attributes::{AttrValue, AttributeMap, AttributePath};
use regex::Regex;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Text(String),
    Number(f64),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Text(s) => write!(f, "{s:?}"),
            Literal::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A `*`/`?` pattern matched against the whole value.
#[derive(Debug, Clone)]
pub struct Wildcard {
    pattern: String,
    regex: Regex,
}

impl Wildcard {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let mut translated = String::from("(?s)^");
        for c in pattern.chars() {
            match c {
                '*' => translated.push_str(".*"),
                '?' => translated.push('.'),
                c => translated.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        translated.push('$');
        Ok(Wildcard {
            pattern: pattern.to_string(),
            regex: Regex::new(&translated)?,
        })
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

#[derive(Debug, Clone)]
pub enum Operator {
    Equals(Literal),
    Wildcard(Wildcard),
    /// Inclusive on both ends.
    Range { low: f64, high: f64 },
    Regex(Regex),
}

impl Operator {
    fn matches(&self, value: &AttrValue) -> bool {
        match self {
            Operator::Equals(Literal::Text(expected)) => match value {
                AttrValue::Text(actual) => actual == expected,
                AttrValue::Number(n) => expected.trim().parse::<f64>().is_ok_and(|x| x == *n),
                AttrValue::Binary { .. } => false,
            },
            Operator::Equals(Literal::Number(expected)) => value.as_number() == Some(*expected),
            Operator::Wildcard(wildcard) => value.as_text().is_some_and(|t| wildcard.is_match(&t)),
            Operator::Range { low, high } => value
                .as_number()
                .is_some_and(|n| *low <= n && n <= *high),
            Operator::Regex(regex) => value.as_text().is_some_and(|t| regex.is_match(&t)),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Equals(literal) => write!(f, "= {literal}"),
            Operator::Wildcard(w) => write!(f, "~ {:?}", w.pattern()),
            Operator::Range { low, high } => write!(f, "IN [{low}, {high}]"),
            Operator::Regex(r) => write!(f, "=~ {:?}", r.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Predicate {
    pub path: AttributePath,
    pub operator: Operator,
}

impl Predicate {
    /// An absent attribute never matches.
    pub fn matches(&self, attributes: &AttributeMap) -> bool {
        attributes
            .get(&self.path)
            .is_some_and(|value| self.operator.matches(value))
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Const(bool),
    Predicate(Predicate),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    /// Left to right with short-circuiting. Pure: no state is touched.
    pub fn evaluate(&self, attributes: &AttributeMap) -> bool {
        match self {
            Expr::Const(value) => *value,
            Expr::Predicate(predicate) => predicate.matches(attributes),
            Expr::Not(inner) => !inner.evaluate(attributes),
            Expr::And(terms) => terms.iter().all(|t| t.evaluate(attributes)),
            Expr::Or(terms) => terms.iter().any(|t| t.evaluate(attributes)),
        }
    }

    /// Every attribute path the expression reads, in source order.
    pub fn attributes(&self) -> Vec<&AttributePath> {
        let mut out = Vec::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut Vec<&'a AttributePath>) {
        match self {
            Expr::Const(_) => {}
            Expr::Predicate(p) => {
                if !out.contains(&&p.path) {
                    out.push(&p.path);
                }
            }
            Expr::Not(inner) => inner.collect_attributes(out),
            Expr::And(terms) | Expr::Or(terms) => {
                for term in terms {
                    term.collect_attributes(out);
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(true) => f.write_str("TRUE"),
            Expr::Const(false) => f.write_str("FALSE"),
            Expr::Predicate(p) => write!(f, "{} {}", p.path, p.operator),
            Expr::Not(inner) => write!(f, "NOT ({inner})"),
            Expr::And(terms) | Expr::Or(terms) => {
                let joiner = if matches!(self, Expr::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(joiner)?;
                    }
                    write!(f, "({term})")?;
                }
                Ok(())
            }
        }
    }
}
