//! `miette`-based diagnostics for the compiler facade.
//!
//! The engine reports failures as raw positioned triples (see
//! [`crate::peg::error`]); this module dresses them up as rich diagnostics
//! with a named source, a labeled span, and the line/column pair the host
//! displays. Spans arrive in char offsets and are converted to byte offsets
//! here, since that is what `miette` highlights.

use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceCode};
use thiserror::Error;

use crate::peg::{byte_offset, ErrorKind, ParseFailure, RawError};

pub type SourceArc = Arc<NamedSource<String>>;

/// Wraps a source buffer for error reporting.
pub fn to_error_source(name: &str, text: &str) -> SourceArc {
    Arc::new(NamedSource::new(name, text.to_string()))
}

/// Source and span context attached to a diagnostic.
#[derive(Debug, Default)]
pub struct ErrorContext {
    pub source: Option<SourceArc>,
    /// Byte range into the source buffer.
    pub span: Option<(usize, usize)>,
    pub help: Option<String>,
}

/// A failed compile, pointing at the furthest position the parse reached.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("syntax error at line {line}, column {col}")]
    Syntax { line: usize, col: usize, ctx: ErrorContext },
    #[error("unexpected end of input at line {line}, column {col}")]
    InvalidEof { line: usize, col: usize, ctx: ErrorContext },
    #[error("{message} at line {line}, column {col}")]
    User {
        message: String,
        kind: u32,
        line: usize,
        col: usize,
        ctx: ErrorContext,
    },
    /// A grammar/AST contract violation: a defect, never a property of the
    /// input.
    #[error("internal compiler error: {message}")]
    Internal { message: String },
}

impl CompileError {
    /// Build a diagnostic from an engine failure against the source it came
    /// from. `line_offset` shifts reported line numbers when the host has
    /// pre-processed the buffer.
    pub fn from_failure(
        failure: ParseFailure,
        module: &str,
        source: &str,
        line_offset: usize,
    ) -> Self {
        match failure {
            ParseFailure::Internal(message) => CompileError::Internal { message },
            ParseFailure::Raw(raw) => Self::from_raw(raw, module, source, line_offset),
        }
    }

    fn from_raw(raw: RawError, module: &str, source: &str, line_offset: usize) -> Self {
        let begin = byte_offset(source, raw.begin.offset);
        let end = byte_offset(source, raw.end.offset).max(begin);
        let ctx = ErrorContext {
            source: Some(to_error_source(module, source)),
            span: Some((begin, end)),
            help: None,
        };
        let line = raw.begin.line + line_offset;
        let col = raw.begin.col;
        match raw.kind {
            ErrorKind::Syntax => CompileError::Syntax { line, col, ctx },
            ErrorKind::InvalidEof => CompileError::InvalidEof { line, col, ctx },
            ErrorKind::User(kind) => CompileError::User {
                message: raw.message,
                kind,
                line,
                col,
                ctx,
            },
        }
    }

    /// The numeric code the host convention assigns this failure.
    pub fn code(&self) -> u32 {
        match self {
            CompileError::Syntax { .. } => ErrorKind::Syntax.code(),
            CompileError::InvalidEof { .. } => ErrorKind::InvalidEof.code(),
            CompileError::User { kind, .. } => *kind,
            CompileError::Internal { .. } => 0,
        }
    }

    fn get_ctx(&self) -> Option<&ErrorContext> {
        match self {
            CompileError::Syntax { ctx, .. }
            | CompileError::InvalidEof { ctx, .. }
            | CompileError::User { ctx, .. } => Some(ctx),
            CompileError::Internal { .. } => None,
        }
    }
}

impl Diagnostic for CompileError {
    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.get_ctx()?
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn std::fmt::Display + 'a>)
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.get_ctx()?
            .source
            .as_ref()
            .map(|s| s.as_ref() as &dyn SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let ctx = self.get_ctx()?;
        let (start, end) = ctx.span?;
        let len = if end > start { end - start } else { 1 };
        let text = match self {
            CompileError::Syntax { .. } => "no rule matched from here".to_string(),
            CompileError::InvalidEof { .. } => "input ends mid-construct".to_string(),
            CompileError::User { message, .. } => message.clone(),
            CompileError::Internal { .. } => return None,
        };
        Some(Box::new(std::iter::once(LabeledSpan::new(
            Some(text),
            start,
            len,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peg::Pos;

    #[test]
    fn raw_error_maps_to_line_and_column() {
        let raw = RawError::syntax(Pos { offset: 4, line: 2, col: 1 });
        let err = CompileError::from_raw(raw, "main", "ab\ncd", 0);
        match &err {
            CompileError::Syntax { line, col, ctx } => {
                assert_eq!((*line, *col), (2, 1));
                assert_eq!(ctx.span, Some((4, 4)));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(err.code(), 1);
    }

    #[test]
    fn line_offset_shifts_reported_lines() {
        let raw = RawError::syntax(Pos { offset: 0, line: 1, col: 1 });
        let err = CompileError::from_raw(raw, "main", "x", 10);
        match err {
            CompileError::Syntax { line, .. } => assert_eq!(line, 11),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn multibyte_spans_convert_to_byte_offsets() {
        // "é" is two bytes; a char offset of 1 lands at byte 2.
        let raw = RawError::syntax(Pos { offset: 1, line: 1, col: 2 });
        let err = CompileError::from_raw(raw, "main", "éx", 0);
        match err {
            CompileError::Syntax { ctx, .. } => assert_eq!(ctx.span, Some((2, 2))),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
