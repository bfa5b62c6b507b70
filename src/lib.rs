//! Muscript: the parser front end of an embeddable, indentation-sensitive
//! scripting language in the MoonScript family.
//!
//! The crate is layered bottom-up:
//!
//! - [`peg`]: a backtracking parsing-expression engine with
//!   furthest-failure tracking and deferred actions.
//! - [`ast`]: the typed syntax tree and the construction stack the
//!   grammar's actions build it on.
//! - [`grammar`]: the language grammar itself, including the indentation
//!   machinery.
//! - [`lint`]: global-variable detection over a parsed tree.
//! - [`compiler`] and [`diagnostics`]: the embedding surface. Configure a
//!   [`Compiler`], call [`Compiler::parse`], and get back a tree or a
//!   positioned [`CompileError`].

pub mod ast;
pub mod compiler;
pub mod diagnostics;
pub mod grammar;
pub mod lint;
pub mod peg;

pub use crate::compiler::{CompileInfo, Compiler, Config, ParseOutput};
pub use crate::diagnostics::CompileError;
pub use crate::lint::GlobalVar;
