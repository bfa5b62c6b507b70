//! Grammar expressions and the combinator DSL.
//!
//! An `Expr` is an immutable match tree built up-front, before any input is
//! seen. The DSL keeps grammar definitions close to EBNF: `>>` sequences,
//! `|` is ordered choice, `.star()/.plus()/.opt()` are the greedy repeats,
//! and `and_`/`not_` are the non-consuming predicates.

use std::ops::{BitOr, Shr};
use std::sync::Arc;

use super::error::UserError;
use super::grammar::{Capture, RuleId};

/// Semantic predicate invoked after its inner expression matches.
///
/// Returning `Ok(false)` vetoes the match (ordinary backtracking);
/// `Err` aborts the whole parse with a user-kind error.
pub type Handler<S> = Arc<dyn Fn(&Capture<'_>, &mut S) -> Result<bool, UserError> + Send + Sync>;

/// A match expression over the decoded input.
///
/// Generic over the user state `S` threaded through semantic predicates.
pub enum Expr<S> {
    /// Match one specific char.
    Char(char),
    /// Match an exact sequence of chars.
    Str(Vec<char>),
    /// Match any char in the set.
    Set(CharSet),
    /// Match any single char.
    Any,
    /// Match only at end of input; consumes nothing.
    Eof,
    /// Always match without consuming.
    True,
    /// Never match.
    False,
    /// Invoke another rule by id.
    Rule(RuleId),
    /// Left then right.
    Seq(Box<Expr<S>>, Box<Expr<S>>),
    /// Left, or on failure right from the same position.
    Choice(Box<Expr<S>>, Box<Expr<S>>),
    /// Greedy repetition of the inner expression.
    Repeat {
        expr: Box<Expr<S>>,
        min: usize,
        max: Option<usize>,
    },
    /// Positive lookahead; never consumes.
    And(Box<Expr<S>>),
    /// Negative lookahead; never consumes.
    Not(Box<Expr<S>>),
    /// Match the inner expression, then count a line break. The inner
    /// expression is what actually consumes the newline chars.
    Newline(Box<Expr<S>>),
    /// Match the inner expression, then consult a semantic predicate.
    User { expr: Box<Expr<S>>, handler: Handler<S> },
}

impl<S> Clone for Expr<S> {
    fn clone(&self) -> Self {
        match self {
            Expr::Char(c) => Expr::Char(*c),
            Expr::Str(s) => Expr::Str(s.clone()),
            Expr::Set(set) => Expr::Set(set.clone()),
            Expr::Any => Expr::Any,
            Expr::Eof => Expr::Eof,
            Expr::True => Expr::True,
            Expr::False => Expr::False,
            Expr::Rule(id) => Expr::Rule(*id),
            Expr::Seq(l, r) => Expr::Seq(l.clone(), r.clone()),
            Expr::Choice(l, r) => Expr::Choice(l.clone(), r.clone()),
            Expr::Repeat { expr, min, max } => Expr::Repeat {
                expr: expr.clone(),
                min: *min,
                max: *max,
            },
            Expr::And(e) => Expr::And(e.clone()),
            Expr::Not(e) => Expr::Not(e.clone()),
            Expr::Newline(e) => Expr::Newline(e.clone()),
            Expr::User { expr, handler } => Expr::User {
                expr: expr.clone(),
                handler: handler.clone(),
            },
        }
    }
}

impl<S> std::fmt::Debug for Expr<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Char(c) => write!(f, "Char({c:?})"),
            Expr::Str(s) => write!(f, "Str({:?})", s.iter().collect::<String>()),
            Expr::Set(_) => write!(f, "Set(..)"),
            Expr::Any => write!(f, "Any"),
            Expr::Eof => write!(f, "Eof"),
            Expr::True => write!(f, "True"),
            Expr::False => write!(f, "False"),
            Expr::Rule(id) => write!(f, "Rule({})", id.index()),
            Expr::Seq(l, r) => write!(f, "Seq({l:?}, {r:?})"),
            Expr::Choice(l, r) => write!(f, "Choice({l:?}, {r:?})"),
            Expr::Repeat { expr, min, max } => write!(f, "Repeat({expr:?}, {min}, {max:?})"),
            Expr::And(e) => write!(f, "And({e:?})"),
            Expr::Not(e) => write!(f, "Not({e:?})"),
            Expr::Newline(e) => write!(f, "Newline({e:?})"),
            Expr::User { expr, .. } => write!(f, "User({expr:?})"),
        }
    }
}

/// A set of chars: explicit members plus inclusive ranges.
#[derive(Debug, Clone, Default)]
pub struct CharSet {
    chars: Vec<char>,
    ranges: Vec<(char, char)>,
}

impl CharSet {
    pub fn from_chars(s: &str) -> Self {
        CharSet { chars: s.chars().collect(), ranges: Vec::new() }
    }

    pub fn from_range(lo: char, hi: char) -> Self {
        debug_assert!(lo <= hi);
        CharSet { chars: Vec::new(), ranges: vec![(lo, hi)] }
    }

    pub fn union(mut self, other: CharSet) -> Self {
        self.chars.extend(other.chars);
        self.ranges.extend(other.ranges);
        self
    }

    pub fn contains(&self, c: char) -> bool {
        self.chars.contains(&c) || self.ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi)
    }
}

// ============================================================================
// CONSTRUCTORS
// ============================================================================

/// Match one char.
pub fn ch<S>(c: char) -> Expr<S> {
    Expr::Char(c)
}

/// Match a literal string.
pub fn lit<S>(s: &str) -> Expr<S> {
    Expr::Str(s.chars().collect())
}

/// Match any char drawn from `s`.
pub fn set<S>(s: &str) -> Expr<S> {
    Expr::Set(CharSet::from_chars(s))
}

/// Match any char in the inclusive range `lo..=hi`.
pub fn range<S>(lo: char, hi: char) -> Expr<S> {
    Expr::Set(CharSet::from_range(lo, hi))
}

/// Match any single char.
pub fn any<S>() -> Expr<S> {
    Expr::Any
}

/// Succeed only at end of input.
pub fn eof<S>() -> Expr<S> {
    Expr::Eof
}

/// Always succeed, consuming nothing.
pub fn true_<S>() -> Expr<S> {
    Expr::True
}

/// Always fail.
pub fn false_<S>() -> Expr<S> {
    Expr::False
}

/// Positive lookahead: succeed iff `e` matches here, consuming nothing.
pub fn and_<S>(e: impl Into<Expr<S>>) -> Expr<S> {
    Expr::And(Box::new(e.into()))
}

/// Negative lookahead: succeed iff `e` does not match here.
pub fn not_<S>(e: impl Into<Expr<S>>) -> Expr<S> {
    Expr::Not(Box::new(e.into()))
}

/// Wrap a line-break pattern: after `e` matches, the current line is
/// advanced and the column reset.
pub fn nl<S>(e: impl Into<Expr<S>>) -> Expr<S> {
    Expr::Newline(Box::new(e.into()))
}

/// Attach a semantic predicate to `e`.
pub fn user<S, F>(e: impl Into<Expr<S>>, handler: F) -> Expr<S>
where
    F: Fn(&Capture<'_>, &mut S) -> Result<bool, UserError> + Send + Sync + 'static,
{
    Expr::User { expr: Box::new(e.into()), handler: Arc::new(handler) }
}

impl<S> Expr<S> {
    /// Zero or more, greedy.
    pub fn star(self) -> Expr<S> {
        Expr::Repeat { expr: Box::new(self), min: 0, max: None }
    }

    /// One or more, greedy.
    pub fn plus(self) -> Expr<S> {
        Expr::Repeat { expr: Box::new(self), min: 1, max: None }
    }

    /// Zero or one.
    pub fn opt(self) -> Expr<S> {
        Expr::Repeat { expr: Box::new(self), min: 0, max: Some(1) }
    }
}

impl RuleId {
    pub fn star<S>(self) -> Expr<S> {
        Expr::Rule(self).star()
    }

    pub fn plus<S>(self) -> Expr<S> {
        Expr::Rule(self).plus()
    }

    pub fn opt<S>(self) -> Expr<S> {
        Expr::Rule(self).opt()
    }
}

// ============================================================================
// CONVERSIONS AND OPERATORS
// ============================================================================

impl<S> From<char> for Expr<S> {
    fn from(c: char) -> Self {
        Expr::Char(c)
    }
}

impl<S> From<&str> for Expr<S> {
    fn from(s: &str) -> Self {
        Expr::Str(s.chars().collect())
    }
}

impl<S> From<RuleId> for Expr<S> {
    fn from(id: RuleId) -> Self {
        Expr::Rule(id)
    }
}

impl<S, R: Into<Expr<S>>> Shr<R> for Expr<S> {
    type Output = Expr<S>;

    fn shr(self, rhs: R) -> Expr<S> {
        Expr::Seq(Box::new(self), Box::new(rhs.into()))
    }
}

impl<S, R: Into<Expr<S>>> BitOr<R> for Expr<S> {
    type Output = Expr<S>;

    fn bitor(self, rhs: R) -> Expr<S> {
        Expr::Choice(Box::new(self), Box::new(rhs.into()))
    }
}

impl<S> Shr<Expr<S>> for RuleId {
    type Output = Expr<S>;

    fn shr(self, rhs: Expr<S>) -> Expr<S> {
        Expr::Seq(Box::new(Expr::Rule(self)), Box::new(rhs))
    }
}

impl<S> BitOr<Expr<S>> for RuleId {
    type Output = Expr<S>;

    fn bitor(self, rhs: Expr<S>) -> Expr<S> {
        Expr::Choice(Box::new(Expr::Rule(self)), Box::new(rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsl_builds_expected_shapes() {
        let e: Expr<()> = lit("if") >> ch(' ').plus() >> (lit("true") | lit("false"));
        match e {
            Expr::Seq(l, r) => {
                assert!(matches!(*r, Expr::Choice(..)));
                assert!(matches!(*l, Expr::Seq(..)));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn char_set_membership() {
        let s = CharSet::from_chars("+-*/").union(CharSet::from_range('0', '9'));
        assert!(s.contains('*'));
        assert!(s.contains('7'));
        assert!(!s.contains('a'));
    }
}
