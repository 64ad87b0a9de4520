//! Trellis search: free-text query parsing and conjunctive matching over
//! per-record haystack fields.
//!
//! The query language is whitespace-separated terms with double-quoted
//! exact spans (`""` escapes a literal quote) and `-` prefixed exclusions.
//! Matching is case-sensitive; the host decides which field projections of
//! a record form the haystack.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use tracing::trace;

/// One atomic unit of a parsed query. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub value: String,
    /// Quoted terms require byte-for-byte field equality; unquoted terms
    /// require containment.
    pub exact: bool,
    /// Excluded terms fail the match when any field satisfies them.
    pub exclude: bool,
}

impl Term {
    fn satisfied_by(&self, field: &str) -> bool {
        if self.exact {
            field == self.value
        } else {
            field.contains(&self.value)
        }
    }
}

/// Parsed free-text query: an ordered term sequence plus the matcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    terms: Vec<Term>,
}

impl SearchQuery {
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// A query with no terms matches everything.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Conjunction over all terms: every inclusive term needs at least one
    /// satisfying field, every excluded term forbids any.
    pub fn matches<S: AsRef<str>>(&self, fields: &[S]) -> bool {
        self.terms.iter().all(|term| {
            let hit = fields.iter().any(|field| term.satisfied_by(field.as_ref()));
            hit != term.exclude
        })
    }
}

/// Tokenize a free-text query. Never fails: empty input yields a vacuous
/// query and an unterminated quoted span closes at end of input.
pub fn parse_search(text: &str) -> SearchQuery {
    let mut terms = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut exclude = false;
        if c == '-' {
            exclude = true;
            chars.next();
        }

        let mut exact = false;
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            exact = true;
            // Quoted span: "" is a literal quote, a lone quote closes the
            // span even mid-word (the remainder starts a new token).
            loop {
                match chars.next() {
                    Some('"') => {
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            value.push('"');
                        } else {
                            break;
                        }
                    }
                    Some(ch) => value.push(ch),
                    None => break,
                }
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                value.push(ch);
                chars.next();
            }
        }

        // Tokens empty after processing (a bare `-`, an empty quoted span)
        // produce no term.
        if !value.is_empty() {
            terms.push(Term { value, exact, exclude });
        }
    }

    trace!(terms = terms.len(), "parsed search query");
    metrics::histogram!("search_terms", terms.len() as f64);
    SearchQuery { terms }
}
