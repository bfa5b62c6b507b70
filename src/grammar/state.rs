//! Mutable state threaded through a parse.
//!
//! The construction stack collects nodes while actions replay; the rest is
//! the small amount of context-sensitivity the language needs during
//! matching itself: the indentation stack, the `do`-disable stack used to
//! keep loop headers from swallowing their own bodies, and the open long
//! string level.

use crate::ast::AstStack;

/// Sentinel pushed to forbid any deeper indent from matching.
pub const PREVENT_INDENT: i32 = -1;

pub struct State {
    pub ast: AstStack,
    /// Stack of active indentation widths; a space counts 1, a tab 4.
    pub indents: Vec<i32>,
    /// While the top is `true`, a `do` block cannot start. Pushed around
    /// loop and switch header expressions.
    pub do_disable: Vec<bool>,
    /// While the top is `true`, a chain may start with an implicit
    /// `.name`/`\name` against the nearest `with` target. Pushed around
    /// `with` bodies.
    pub with_open: Vec<bool>,
    /// Level (number of `=` signs) of the long string currently open.
    pub string_open: i32,
}

impl State {
    pub fn new() -> Self {
        State {
            ast: AstStack::new(),
            indents: vec![0],
            do_disable: Vec::new(),
            with_open: Vec::new(),
            string_open: 0,
        }
    }

    pub fn current_indent(&self) -> i32 {
        *self.indents.last().unwrap_or(&0)
    }

    pub fn do_disabled(&self) -> bool {
        *self.do_disable.last().unwrap_or(&false)
    }

    pub fn in_with(&self) -> bool {
        *self.with_open.last().unwrap_or(&false)
    }
}

impl Default for State {
    fn default() -> Self {
        State::new()
    }
}
