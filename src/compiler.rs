//! The compiler facade.
//!
//! [`Compiler`] ties the pieces together: it decodes a source buffer, runs
//! the language grammar over it, turns an engine failure into a
//! [`CompileError`], and optionally lints the result for global references.
//! Hosts that embed the compiler configure it once through [`Config`] and
//! reuse it across modules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::ast::{self, Node};
use crate::diagnostics::CompileError;
use crate::grammar::{State, GRAMMAR};
use crate::lint::{self, GlobalVar};
use crate::peg::decode;

/// Facade configuration. The default parses anonymously with no lint and no
/// timing.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Module name used in diagnostics. When absent a unique anonymous name
    /// is synthesized per parse.
    pub module: Option<String>,
    /// Treat the module's top-level result as its default export.
    pub export_default: bool,
    /// Have code generation return the module's last expression.
    pub implicit_return_root: bool,
    /// Emit line mapping information during code generation.
    pub reserve_line_number: bool,
    /// Collect undeclared-variable references alongside the tree.
    pub lint_global: bool,
    /// Added to every reported line number, for hosts that strip a prologue
    /// before handing the buffer over.
    pub line_offset: usize,
    /// Record how long the parse took.
    pub profiling: bool,
    /// Free-form host options, passed through untouched.
    pub options: HashMap<String, String>,
}

/// Metadata about one compile.
#[derive(Debug, Clone)]
pub struct CompileInfo {
    pub module: String,
    pub parse_time: Option<Duration>,
}

/// A successful parse: the tree, plus whatever extras the config asked for.
#[derive(Debug)]
pub struct ParseOutput {
    pub root: ast::File,
    pub globals: Option<Vec<GlobalVar>>,
    pub info: CompileInfo,
}

pub struct Compiler {
    config: Config,
}

static MODULE_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn next_module_name() -> String {
    let n = MODULE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("anonymous-{n}")
}

impl Compiler {
    pub fn new() -> Self {
        Compiler::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Compiler { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parse a module. On failure the error carries the furthest position
    /// the parse reached, adjusted by the configured line offset.
    pub fn parse(&self, source: &str) -> Result<ParseOutput, CompileError> {
        let module = self
            .config
            .module
            .clone()
            .unwrap_or_else(next_module_name);
        let started = self.config.profiling.then(Instant::now);

        let input = decode(source);
        let mut state = State::new();
        let result = GRAMMAR.grammar().parse(&input, GRAMMAR.file(), &mut state);
        let parse_time = started.map(|t| t.elapsed());

        if let Err(failure) = result {
            return Err(CompileError::from_failure(
                failure,
                &module,
                source,
                self.config.line_offset,
            ));
        }
        let root = match state.ast.take_root() {
            Ok(Node::File(file)) => file,
            Ok(other) => {
                return Err(CompileError::Internal {
                    message: format!("root node is {:?}, not a file", other.kind()),
                })
            }
            Err(err) => {
                return Err(CompileError::Internal {
                    message: err.to_string(),
                })
            }
        };

        let globals = self
            .config
            .lint_global
            .then(|| lint::collect_globals(&root));

        Ok(ParseOutput {
            root,
            globals,
            info: CompileInfo { module, parse_time },
        })
    }

    /// Accept/reject check without building a tree.
    pub fn matches(&self, source: &str) -> bool {
        let input = decode(source);
        let mut state = State::new();
        GRAMMAR
            .grammar()
            .matches(&input, GRAMMAR.file(), &mut state)
            .is_ok()
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_produces_a_tree_and_a_module_name() {
        let compiler = Compiler::new();
        let out = compiler.parse("x = 1").expect("parse");
        assert!(out.info.module.starts_with("anonymous-"));
        assert!(out.globals.is_none());
        assert!(out.info.parse_time.is_none());
        assert!(out.root.block.is_some());
    }

    #[test]
    fn configured_module_name_is_used() {
        let compiler = Compiler::with_config(Config {
            module: Some("init".into()),
            ..Config::default()
        });
        let out = compiler.parse("x = 1").expect("parse");
        assert_eq!(out.info.module, "init");
    }

    #[test]
    fn lint_global_collects_undeclared_names() {
        let compiler = Compiler::with_config(Config {
            lint_global: true,
            ..Config::default()
        });
        let out = compiler.parse("print 1\nx = 2").expect("parse");
        let globals = out.globals.expect("globals requested");
        assert_eq!(globals.len(), 1);
        assert_eq!(globals[0].name, "print");
    }

    #[test]
    fn profiling_records_parse_time() {
        let compiler = Compiler::with_config(Config {
            profiling: true,
            ..Config::default()
        });
        let out = compiler.parse("x = 1").expect("parse");
        assert!(out.info.parse_time.is_some());
    }

    #[test]
    fn line_offset_shifts_error_positions() {
        let compiler = Compiler::with_config(Config {
            line_offset: 100,
            ..Config::default()
        });
        let err = compiler.parse("x = )").unwrap_err();
        match err {
            CompileError::Syntax { line, .. } => assert_eq!(line, 101),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn truncated_input_is_invalid_eof() {
        let err = Compiler::new().parse("x = ").unwrap_err();
        assert!(matches!(err, CompileError::InvalidEof { .. }));
        assert_eq!(err.code(), 2);
    }

    #[test]
    fn matches_never_builds_state() {
        let compiler = Compiler::new();
        assert!(compiler.matches("a = 1\nb = a"));
        assert!(!compiler.matches("a = ="));
    }
}
