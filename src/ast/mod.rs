//! The AST framework: spanned node types assembled from a construction
//! stack.
//!
//! Nodes are built bottom-up while the deferred grammar actions replay:
//! each action pops the children its production declared off the shared
//! [`AstStack`], assembles one new node, and pushes it back. Popping is
//! type-driven and happens in reverse declaration order, so optional and
//! list-shaped members must be type-distinguishable from whatever may lie
//! beneath them; the node definitions in [`nodes`] use dedicated wrapper
//! kinds wherever two adjacent members would otherwise collide.
//!
//! A mismatch on a required slot is a contract violation between the
//! grammar and the node declarations, never a property of the input; it
//! surfaces as [`AstError`] and aborts the parse as an internal error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::peg::{ActionError, Capture, Pos};

// ============================================================================
// SPANS
// ============================================================================

/// Source extent of a node, in char positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub fn from_capture(cap: &Capture<'_>) -> Self {
        Span { start: cap.begin, end: cap.end }
    }

    pub fn zero() -> Self {
        Span { start: Pos::start(), end: Pos::start() }
    }
}

/// Anything that knows its own source extent.
pub trait Spanned {
    fn span(&self) -> Span;
}

// ============================================================================
// ERRORS
// ============================================================================

/// Contract violation while assembling nodes from the construction stack.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AstError {
    #[error("construction stack underflow: expected {expected}")]
    Underflow { expected: &'static str },
    #[error("construction stack mismatch: expected {expected}, found {found:?}")]
    Mismatch { expected: &'static str, found: NodeKind },
    #[error("expected exactly one root on the construction stack, found {found}")]
    RootCount { found: usize },
}

impl From<AstError> for ActionError {
    fn from(e: AstError) -> Self {
        ActionError::Internal(e.to_string())
    }
}

// ============================================================================
// CONVERSION TRAITS
// ============================================================================

/// Fallible downcast from the master [`Node`] enum.
///
/// Returns the node back on mismatch so the stack can keep it.
pub trait TryFromNode: Sized {
    fn try_from_node(node: Node) -> Result<Self, Node>;
}

/// Node types the grammar can construct from the stack.
pub trait BuildNode: Into<Node> + Sized {
    /// Whether this kind stores its matched text (leaf kinds only).
    const HAS_TEXT: bool = false;

    fn construct(st: &mut AstStack, span: Span) -> Result<Self, AstError>;

    fn set_text(&mut self, _text: String) {}
}

// ============================================================================
// CONSTRUCTION STACK
// ============================================================================

/// The shared stack nodes pass through between their own construction and
/// adoption by a parent.
#[derive(Debug, Default)]
pub struct AstStack {
    items: Vec<Node>,
}

impl AstStack {
    pub fn new() -> Self {
        AstStack::default()
    }

    pub fn push(&mut self, node: Node) {
        self.items.push(node);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pop a required child. Underflow or a tag mismatch is a grammar bug.
    pub fn pop<T: TryFromNode>(&mut self, expected: &'static str) -> Result<T, AstError> {
        let node = self
            .items
            .pop()
            .ok_or(AstError::Underflow { expected })?;
        match T::try_from_node(node) {
            Ok(v) => Ok(v),
            Err(node) => {
                let found = node.kind();
                self.items.push(node);
                Err(AstError::Mismatch { expected, found })
            }
        }
    }

    /// Pop an optional child: takes the top node iff it has the right tag.
    pub fn pop_opt<T: TryFromNode>(&mut self) -> Option<T> {
        let node = self.items.pop()?;
        match T::try_from_node(node) {
            Ok(v) => Some(v),
            Err(node) => {
                self.items.push(node);
                None
            }
        }
    }

    /// Pop a run of same-tagged children. Pops happen in reverse source
    /// order, so the result is reversed back before returning.
    pub fn pop_list<T: TryFromNode>(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(v) = self.pop_opt::<T>() {
            out.push(v);
        }
        out.reverse();
        out
    }

    /// Like [`AstStack::pop_list`], but the run must be non-empty.
    pub fn pop_list1<T: TryFromNode>(
        &mut self,
        expected: &'static str,
    ) -> Result<Vec<T>, AstError> {
        let out = self.pop_list::<T>();
        if out.is_empty() {
            let found = match self.items.last() {
                Some(node) => node.kind(),
                None => return Err(AstError::Underflow { expected }),
            };
            return Err(AstError::Mismatch { expected, found });
        }
        Ok(out)
    }

    /// Take the single remaining node; anything else is a driver bug.
    pub fn take_root(&mut self) -> Result<Node, AstError> {
        if self.items.len() != 1 {
            return Err(AstError::RootCount { found: self.items.len() });
        }
        Ok(self.items.pop().unwrap())
    }
}

// ============================================================================
// NODE DEFINITION MACROS
// ============================================================================

/// Leaf node: a span, optionally the matched text.
macro_rules! ast_leaf {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            pub span: $crate::ast::Span,
            pub text: String,
        }

        impl $crate::ast::BuildNode for $name {
            const HAS_TEXT: bool = true;

            fn construct(
                _st: &mut $crate::ast::AstStack,
                span: $crate::ast::Span,
            ) -> Result<Self, $crate::ast::AstError> {
                Ok($name { span, text: String::new() })
            }

            fn set_text(&mut self, text: String) {
                self.text = text;
            }
        }

        ast_node_common!($name);
    };
    ($(#[$meta:meta])* $name:ident, notext) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            pub span: $crate::ast::Span,
        }

        impl $crate::ast::BuildNode for $name {
            fn construct(
                _st: &mut $crate::ast::AstStack,
                span: $crate::ast::Span,
            ) -> Result<Self, $crate::ast::AstError> {
                Ok($name { span })
            }
        }

        ast_node_common!($name);
    };
}

/// Composite node: declared members are popped off the construction stack
/// in reverse declaration order. Shapes: `req` (`Box<T>`), `opt`
/// (`Option<Box<T>>`), `lst` (`Vec<T>`, may be empty), `lst1` (`Vec<T>`,
/// non-empty).
macro_rules! ast_node {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $shape:ident $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            pub span: $crate::ast::Span,
            $( pub $field : ast_field_ty!($shape $ty), )*
        }

        impl $crate::ast::BuildNode for $name {
            fn construct(
                st: &mut $crate::ast::AstStack,
                span: $crate::ast::Span,
            ) -> Result<Self, $crate::ast::AstError> {
                ast_pop_reverse!(st, $( $shape $field : $ty, )*);
                Ok($name { span, $( $field ),* })
            }
        }

        ast_node_common!($name);
    };
}

macro_rules! ast_field_ty {
    (req $ty:ty) => { Box<$ty> };
    (opt $ty:ty) => { Option<Box<$ty>> };
    (lst $ty:ty) => { Vec<$ty> };
    (lst1 $ty:ty) => { Vec<$ty> };
}

macro_rules! ast_pop_reverse {
    ($st:ident,) => {};
    ($st:ident, $shape:ident $field:ident : $ty:ty, $($rest:tt)*) => {
        ast_pop_reverse!($st, $($rest)*);
        let $field = ast_pop_one!($st, $shape, $ty);
    };
}

macro_rules! ast_pop_one {
    ($st:ident, req, $ty:ty) => {
        Box::new($st.pop::<$ty>(stringify!($ty))?)
    };
    ($st:ident, opt, $ty:ty) => {
        $st.pop_opt::<$ty>().map(Box::new)
    };
    ($st:ident, lst, $ty:ty) => {
        $st.pop_list::<$ty>()
    };
    ($st:ident, lst1, $ty:ty) => {
        $st.pop_list1::<$ty>(stringify!($ty))?
    };
}

/// Conversions every node kind carries.
macro_rules! ast_node_common {
    ($name:ident) => {
        impl From<$name> for $crate::ast::Node {
            fn from(n: $name) -> Self {
                $crate::ast::Node::$name(n)
            }
        }

        impl $crate::ast::TryFromNode for $name {
            fn try_from_node(node: $crate::ast::Node) -> Result<Self, $crate::ast::Node> {
                match node {
                    $crate::ast::Node::$name(n) => Ok(n),
                    other => Err(other),
                }
            }
        }

        impl $crate::ast::Spanned for $name {
            fn span(&self) -> $crate::ast::Span {
                self.span
            }
        }
    };
}

/// Selection over N node kinds, usable in any member slot.
macro_rules! ast_family {
    (
        $(#[$meta:meta])*
        $name:ident { $( $kind:ident ),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( $kind($kind), )*
        }

        impl $crate::ast::TryFromNode for $name {
            fn try_from_node(node: $crate::ast::Node) -> Result<Self, $crate::ast::Node> {
                match node {
                    $( $crate::ast::Node::$kind(n) => Ok($name::$kind(n)), )*
                    other => Err(other),
                }
            }
        }

        impl $crate::ast::Spanned for $name {
            fn span(&self) -> $crate::ast::Span {
                match self {
                    $( $name::$kind(n) => n.span, )*
                }
            }
        }
    };
}

/// The master enum over every node kind, plus the fieldless tag enum.
macro_rules! ast_kinds {
    ($( $kind:ident ),* $(,)?) => {
        /// One variant per node kind.
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        pub enum Node {
            $( $kind($kind), )*
        }

        /// Fieldless tag for diagnostics and dispatch.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum NodeKind {
            $( $kind, )*
        }

        impl Node {
            pub fn kind(&self) -> NodeKind {
                match self {
                    $( Node::$kind(_) => NodeKind::$kind, )*
                }
            }
        }

        impl $crate::ast::Spanned for Node {
            fn span(&self) -> $crate::ast::Span {
                match self {
                    $( Node::$kind(n) => n.span, )*
                }
            }
        }
    };
}

pub mod nodes;

pub use nodes::*;

#[cfg(test)]
mod tests {
    use super::*;

    fn name(text: &str) -> Node {
        Node::Name(Name { span: Span::zero(), text: text.to_string() })
    }

    #[test]
    fn required_pop_mismatch_is_internal_error() {
        let mut st = AstStack::new();
        st.push(name("x"));
        let err = st.pop::<Num>("Num").unwrap_err();
        assert_eq!(err, AstError::Mismatch { expected: "Num", found: NodeKind::Name });
        // The node stays on the stack.
        assert_eq!(st.len(), 1);
    }

    #[test]
    fn optional_pop_leaves_non_matching_node() {
        let mut st = AstStack::new();
        st.push(name("x"));
        assert!(st.pop_opt::<Num>().is_none());
        assert_eq!(st.len(), 1);
        assert!(st.pop_opt::<Name>().is_some());
        assert!(st.is_empty());
    }

    #[test]
    fn list_pop_restores_source_order() {
        let mut st = AstStack::new();
        st.push(name("a"));
        st.push(name("b"));
        st.push(name("c"));
        let run: Vec<Name> = st.pop_list();
        let texts: Vec<_> = run.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, ["a", "b", "c"]);
    }

    #[test]
    fn members_pop_in_reverse_declaration_order() {
        // Variable { req name: Name } over a two-deep stack takes the top.
        let mut st = AstStack::new();
        st.push(name("outer"));
        st.push(name("inner"));
        let var = Variable::construct(&mut st, Span::zero()).unwrap();
        assert_eq!(var.name.text, "inner");
        assert_eq!(st.len(), 1);
    }

    #[test]
    fn take_root_requires_exactly_one() {
        let mut st = AstStack::new();
        assert!(st.take_root().is_err());
        st.push(name("a"));
        st.push(name("b"));
        assert_eq!(st.take_root().unwrap_err(), AstError::RootCount { found: 2 });
    }
}
