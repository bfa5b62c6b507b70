//! Raw engine-level parse errors.
//!
//! The engine reports failures as positioned triples with a numeric kind,
//! mirroring how the host consumes them. The facade layer wraps these into
//! `CompileError` diagnostics; this module stays presentation-free.

use serde::{Deserialize, Serialize};

use super::input::Pos;

/// Numeric error kind carried on a raw parse error.
///
/// `Syntax` and `InvalidEof` come from the engine itself; `User` kinds are
/// raised by grammar handlers and start at [`ErrorKind::USER_BASE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The input did not match the grammar.
    Syntax,
    /// The grammar matched but input remained, and matching had already
    /// consumed everything up to the end (input stopped too early).
    InvalidEof,
    /// A grammar handler rejected the parse with its own kind (>= 100).
    User(u32),
}

impl ErrorKind {
    pub const USER_BASE: u32 = 100;

    /// The numeric code the host sees.
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::Syntax => 1,
            ErrorKind::InvalidEof => 2,
            ErrorKind::User(code) => code,
        }
    }
}

/// A positioned error as the engine produces it: a span plus a kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawError {
    pub begin: Pos,
    pub end: Pos,
    pub kind: ErrorKind,
    /// Handler-supplied message; empty for engine-generated kinds.
    pub message: String,
}

impl RawError {
    pub fn syntax(at: Pos) -> Self {
        RawError { begin: at, end: at, kind: ErrorKind::Syntax, message: String::new() }
    }

    pub fn invalid_eof(at: Pos) -> Self {
        RawError { begin: at, end: at, kind: ErrorKind::InvalidEof, message: String::new() }
    }
}

/// An error raised by a user handler during matching. Aborts the whole
/// parse attempt instead of triggering backtracking.
#[derive(Debug, Clone)]
pub struct UserError {
    pub kind: u32,
    pub begin: Pos,
    pub end: Pos,
    pub message: String,
}

impl UserError {
    pub fn new(message: impl Into<String>, begin: Pos, end: Pos) -> Self {
        UserError { kind: ErrorKind::USER_BASE, begin, end, message: message.into() }
    }

    pub fn with_kind(mut self, kind: u32) -> Self {
        debug_assert!(kind >= ErrorKind::USER_BASE);
        self.kind = kind;
        self
    }

    pub fn into_raw(self) -> RawError {
        RawError {
            begin: self.begin,
            end: self.end,
            kind: ErrorKind::User(self.kind),
            message: self.message,
        }
    }
}
