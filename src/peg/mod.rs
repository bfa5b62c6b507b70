//! A small backtracking PEG engine.
//!
//! Grammars are built programmatically from [`Expr`] combinators, stored in
//! a [`Grammar`] arena, and matched over a decoded char buffer. Matching is
//! plain recursive descent with ordered choice and full backtracking; AST
//! construction is deferred to per-rule actions that run only after the
//! whole input has matched.

mod context;
pub mod error;
pub mod expr;
pub mod grammar;
pub mod input;

pub use error::{ErrorKind, RawError, UserError};
pub use expr::{and_, any, ch, eof, false_, lit, nl, not_, range, set, true_, user, CharSet, Expr, Handler};
pub use grammar::{Action, ActionError, Capture, Grammar, ParseFailure, RuleId};
pub use input::{byte_offset, decode, encode, Pos};
