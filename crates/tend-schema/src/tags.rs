//! Tag expressions: select resource variants by the active environment tags.
//!
//! ```text
//! expr         ::= conjunctions { "," conjunctions }   // OR
//! conjunctions ::= conjunction { "." conjunction }      // AND
//! conjunction  ::= "-" tag | tag                        // NOT | match
//! ```
//!
//! Precedence is NOT, then AND, then OR. An expression scores the number of
//! terms in its best fully-satisfied branch; a branch with any failing term
//! contributes nothing. The empty expression always matches with score 0,
//! which makes it the least specific candidate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

const OR_SEPARATOR: char = ',';
const AND_SEPARATOR: char = '.';
const NOT_PREFIX: char = '-';

/// Errors produced while parsing a tag expression.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TagExprError {
    /// Two separators with nothing between them, or a trailing separator.
    #[error("Empty term in tag expression '{0}'")]
    EmptyTerm(String),

    /// A `-` that is not followed by a tag name.
    #[error("Negation without a tag in tag expression '{0}'")]
    BareNegation(String),
}

/// The set of tags currently active in the managed environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActiveTags(BTreeSet<String>);

impl ActiveTags {
    /// No active tags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated tag list (`"prod,eu"`), ignoring blanks.
    pub fn parse_list(list: &str) -> Self {
        list.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Whether `tag` is active.
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    /// Iterate over the active tags in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// `true` when no tag is active.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ActiveTags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for ActiveTags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Has(String),
    Lacks(String),
}

impl Term {
    fn holds(&self, active: &ActiveTags) -> bool {
        match self {
            Self::Has(tag) => active.contains(tag),
            Self::Lacks(tag) => !active.contains(tag),
        }
    }
}

/// A parsed activation condition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagExpr {
    /// OR-branches of AND-terms. Empty means "always".
    branches: Vec<Vec<Term>>,
}

impl TagExpr {
    /// The unconditional expression.
    pub fn always() -> Self {
        Self::default()
    }

    /// Parse an expression. Surrounding whitespace around terms is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TagExprError`] for empty terms (`a..b`, `a,`) and bare `-`.
    pub fn parse(expr: &str) -> Result<Self, TagExprError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Ok(Self::always());
        }

        let mut branches = Vec::new();
        for branch in trimmed.split(OR_SEPARATOR) {
            let mut terms = Vec::new();
            for term in branch.split(AND_SEPARATOR) {
                let term = term.trim();
                if term.is_empty() {
                    return Err(TagExprError::EmptyTerm(expr.to_string()));
                }
                if let Some(negated) = term.strip_prefix(NOT_PREFIX) {
                    let negated = negated.trim();
                    if negated.is_empty() {
                        return Err(TagExprError::BareNegation(expr.to_string()));
                    }
                    terms.push(Term::Lacks(negated.to_string()));
                } else {
                    terms.push(Term::Has(term.to_string()));
                }
            }
            branches.push(terms);
        }
        Ok(Self { branches })
    }

    /// `true` for the unconditional expression.
    pub fn is_always(&self) -> bool {
        self.branches.is_empty()
    }

    /// Number of terms in the best fully-satisfied branch, or 0.
    pub fn score(&self, active: &ActiveTags) -> u32 {
        self.weight(active).unwrap_or(0)
    }

    /// Whether a resource carrying this expression is eligible at all.
    pub fn matches(&self, active: &ActiveTags) -> bool {
        self.weight(active).is_some()
    }

    /// `Some(score)` when eligible, `None` when no branch is satisfied.
    ///
    /// This separates "matches with weight 0" (the empty expression) from
    /// "does not match".
    pub fn weight(&self, active: &ActiveTags) -> Option<u32> {
        if self.is_always() {
            return Some(0);
        }
        self.branches
            .iter()
            .filter(|terms| terms.iter().all(|t| t.holds(active)))
            .map(|terms| terms.len() as u32)
            .max()
    }
}

/// Score `expr` against `active`; unparseable expressions score 0.
pub fn score(expr: &str, active: &ActiveTags) -> u32 {
    TagExpr::parse(expr).map_or(0, |e| e.score(active))
}

impl FromStr for TagExpr {
    type Err = TagExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TagExpr {
    type Error = TagExprError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<TagExpr> for String {
    fn from(expr: TagExpr) -> Self {
        expr.to_string()
    }
}

impl std::fmt::Display for TagExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let branches: Vec<String> = self
            .branches
            .iter()
            .map(|terms| {
                terms
                    .iter()
                    .map(|t| match t {
                        Term::Has(tag) => tag.clone(),
                        Term::Lacks(tag) => format!("{NOT_PREFIX}{tag}"),
                    })
                    .collect::<Vec<_>>()
                    .join(".")
            })
            .collect();
        f.write_str(&branches.join(","))
    }
}
