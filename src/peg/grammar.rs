//! Rule storage and the parse entry points.
//!
//! Rules form an arbitrary graph (mutual recursion is the norm), so the
//! grammar owns every rule in one arena and expressions refer to rules by
//! index. A grammar is built once, then shared immutably across parses;
//! all mutable matching state lives in the per-parse context.

use std::sync::Arc;

use super::context::Context;
use super::error::{RawError, UserError};
use super::expr::Expr;
use super::input::Pos;

/// Index of a rule inside its [`Grammar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(pub(crate) usize);

impl RuleId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The matched extent handed to actions and semantic predicates.
pub struct Capture<'i> {
    pub begin: Pos,
    pub end: Pos,
    pub input: &'i [char],
}

impl Capture<'_> {
    /// The matched text, re-encoded.
    pub fn text(&self) -> String {
        self.input[self.begin.offset..self.end.offset].iter().collect()
    }

    /// The matched chars, borrowed.
    pub fn chars(&self) -> &[char] {
        &self.input[self.begin.offset..self.end.offset]
    }

    pub fn is_empty(&self) -> bool {
        self.begin.offset == self.end.offset
    }
}

/// Failure of a deferred action.
///
/// `User` is a positioned, grammar-raised error; `Internal` means the
/// action's expectations about the output under construction were violated,
/// which is a bug in the grammar wiring rather than in the input.
#[derive(Debug)]
pub enum ActionError {
    User(UserError),
    Internal(String),
}

impl From<UserError> for ActionError {
    fn from(e: UserError) -> Self {
        ActionError::User(e)
    }
}

/// Why a parse call failed.
#[derive(Debug)]
pub enum ParseFailure {
    /// The input was rejected: syntax, premature end, or a user kind.
    Raw(RawError),
    /// The input matched but building the output hit a contract violation.
    Internal(String),
}

impl ParseFailure {
    pub fn raw(&self) -> Option<&RawError> {
        match self {
            ParseFailure::Raw(raw) => Some(raw),
            ParseFailure::Internal(_) => None,
        }
    }
}

impl From<RawError> for ParseFailure {
    fn from(raw: RawError) -> Self {
        ParseFailure::Raw(raw)
    }
}

/// Deferred per-rule action, replayed in match order after a successful
/// parse.
pub type Action<S> = Arc<dyn Fn(&Capture<'_>, &mut S) -> Result<(), ActionError> + Send + Sync>;

pub(crate) struct RuleSlot<S> {
    pub(crate) name: String,
    pub(crate) expr: Expr<S>,
    pub(crate) action: Option<Action<S>>,
}

/// An immutable set of rules plus their deferred actions.
pub struct Grammar<S> {
    pub(crate) rules: Vec<RuleSlot<S>>,
}

impl<S> Default for Grammar<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Grammar<S> {
    pub fn new() -> Self {
        Grammar { rules: Vec::new() }
    }

    /// Declare a rule slot before its body is known, so mutually recursive
    /// rules can reference each other by id.
    pub fn declare(&mut self, name: &str) -> RuleId {
        let id = RuleId(self.rules.len());
        self.rules.push(RuleSlot {
            name: name.to_string(),
            expr: Expr::False,
            action: None,
        });
        id
    }

    /// Attach the body of a previously declared rule.
    pub fn define(&mut self, id: RuleId, expr: impl Into<Expr<S>>) {
        self.rules[id.0].expr = expr.into();
    }

    /// Declare and define in one step.
    pub fn rule(&mut self, name: &str, expr: impl Into<Expr<S>>) -> RuleId {
        let id = self.declare(name);
        self.define(id, expr);
        id
    }

    /// Attach a deferred action to a rule. Only rules with actions appear
    /// in the match log.
    pub fn action<F>(&mut self, id: RuleId, action: F)
    where
        F: Fn(&Capture<'_>, &mut S) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.rules[id.0].action = Some(Arc::new(action));
    }

    pub fn rule_name(&self, id: RuleId) -> &str {
        &self.rules[id.0].name
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Run a full parse: match `root` against the whole input, then replay
    /// the recorded actions in match order against `state`.
    ///
    /// A failed parse never runs any action, so partially matched rules
    /// cannot leave residue in the state.
    pub fn parse(&self, input: &[char], root: RuleId, state: &mut S) -> Result<(), ParseFailure> {
        self.drive(input, root, state, true)
    }

    /// Match without replaying actions: a pure accept/reject check.
    pub fn matches(
        &self,
        input: &[char],
        root: RuleId,
        state: &mut S,
    ) -> Result<(), ParseFailure> {
        self.drive(input, root, state, false)
    }

    fn drive(
        &self,
        input: &[char],
        root: RuleId,
        state: &mut S,
        run_actions: bool,
    ) -> Result<(), ParseFailure> {
        let mut con = Context::new(self, input);

        let ok = con
            .parse_rule(root, state)
            .map_err(|e| ParseFailure::Raw(e.into_raw()))?;

        if !ok {
            return Err(RawError::syntax(con.error_pos()).into());
        }
        if !con.at_end() {
            // The root matched a prefix. If no failure was ever recorded
            // past the end of input, matching simply ran out of text.
            if con.error_pos().offset < input.len() {
                return Err(RawError::syntax(con.error_pos()).into());
            }
            return Err(RawError::invalid_eof(con.error_pos()).into());
        }

        if run_actions {
            for (rule, begin, end) in con.take_matches() {
                let capture = Capture { begin, end, input };
                if let Some(action) = &self.rules[rule.0].action {
                    action(&capture, state).map_err(|e| match e {
                        ActionError::User(u) => ParseFailure::Raw(u.into_raw()),
                        ActionError::Internal(msg) => ParseFailure::Internal(msg),
                    })?;
                }
            }
        }
        Ok(())
    }
}
