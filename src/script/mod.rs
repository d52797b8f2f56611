//! Match scripts: a small boolean language over item attributes.
//!
//! A script is one expression built from predicates such as
//! `Modality = "CT"`, `PatientName ~ "DOE^*"`, `StudyDescription =~ "(?i)chest"`
//! and `SeriesNumber IN [1, 10]`, combined with `AND`, `OR`, `NOT` and
//! parentheses. Predicates against absent attributes are false.

pub mod expr;
pub mod lexer;
pub mod parser;
pub mod source;

pub use expr::{Expr, Literal, Operator, Predicate, Wildcard};
pub use parser::parse;
pub use source::{CompiledScript, ReloadPolicy, ScriptSource};
