//! Label selector matching.
//!
//! A [`Selector`] is a conjunction of [`LabelMatcher`] filters evaluated
//! against a label map; a request may carry several selectors which are
//! ANDed again. The same semantics back every label-filtering surface
//! (alert-rule listing, series and label discovery), so they live here once.
//!
//! Matching rules per filter, for a label map `L` and filter `(n, v, op)`:
//!
//! - `n ∉ L`: `!=` and `!~` are trivially satisfied, `=` and `=~` fail.
//! - otherwise `=` is exact string equality, `!=` its negation, `=~` a
//!   full-string (anchored) regular-expression match, `!~` its negation.
//!
//! An invalid regular expression is surfaced as
//! [`QueryError::InvalidPattern`], never swallowed.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::{QueryError, Result};

/// Match operator of a single label filter. Serializes as the operator
/// token itself; an absent or empty operator means equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchOp {
    /// Exact string equality
    #[default]
    #[serde(rename = "=", alias = "")]
    Equal,
    /// String inequality
    #[serde(rename = "!=")]
    NotEqual,
    /// Full-string regular-expression match
    #[serde(rename = "=~")]
    Regex,
    /// Negated full-string regular-expression match
    #[serde(rename = "!~")]
    NotRegex,
}

impl MatchOp {
    fn token(self) -> &'static str {
        match self {
            MatchOp::Equal => "=",
            MatchOp::NotEqual => "!=",
            MatchOp::Regex => "=~",
            MatchOp::NotRegex => "!~",
        }
    }
}

/// One label filter: `name <op> value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMatcher {
    /// The label name to match against
    pub name: String,
    /// The value (or pattern, for regex operators) to compare with
    pub value: String,
    /// The match operator; defaults to `=` when absent
    #[serde(rename = "type", default)]
    pub op: MatchOp,
}

impl LabelMatcher {
    /// Evaluate this filter against a label map.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> Result<bool> {
        let Some(actual) = labels.get(&self.name) else {
            // absence trivially satisfies the negative operators
            return Ok(matches!(self.op, MatchOp::NotEqual | MatchOp::NotRegex));
        };

        match self.op {
            MatchOp::Equal => Ok(actual == &self.value),
            MatchOp::NotEqual => Ok(actual != &self.value),
            MatchOp::Regex | MatchOp::NotRegex => {
                let re = Regex::new(&format!("^(?:{})$", self.value)).map_err(|e| {
                    QueryError::InvalidPattern {
                        pattern: self.value.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let matched = re.is_match(actual);
                Ok(if self.op == MatchOp::Regex { matched } else { !matched })
            }
        }
    }
}

/// A conjunction of label filters. An empty filter list matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    /// The filters, all of which must match
    #[serde(default)]
    pub filters: Vec<LabelMatcher>,
}

impl Selector {
    /// Whether every filter in this selector matches the label map.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> Result<bool> {
        for filter in &self.filters {
            if !filter.matches(labels)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}{}'{}'", filter.name, filter.op.token(), filter.value)?;
        }
        write!(f, "}}")
    }
}

/// Whether a label map satisfies every selector in the sequence.
pub fn matches_all(labels: &BTreeMap<String, String>, selectors: &[Selector]) -> Result<bool> {
    for selector in selectors {
        if !selector.matches(labels)? {
            return Ok(false);
        }
    }
    Ok(true)
}
