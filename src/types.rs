//! Type-safe wrappers for the identifiers shared across the checker.
//!
//! These newtypes keep structure ids, set variables and source positions from
//! being mixed up with each other or with plain integers.

use std::fmt;

/// Program variable name.
pub type Var = String;

/// Identifier of an explored execution path.
///
/// The first branch of a fork keeps the id of its parent; every other branch
/// receives a fresh id, in the order the branches are produced.
pub type PathId = usize;

/// Index of a structure declaration in [`Program::structs`][crate::ast::Program::structs].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StructId(usize);

impl StructId {
    pub const fn new(index: usize) -> Self {
        StructId(index)
    }

    /// Returns the raw index into the structure table.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StructId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "struct#{}", self.0)
    }
}

/// A symbolic set of locations.
///
/// Set variables are either declared by name (`decl_setvars`) or created fresh
/// by the unfold/fold engine when a node set is split.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SetVar(u32);

impl SetVar {
    pub const fn new(id: u32) -> Self {
        SetVar(id)
    }

    /// Returns the raw set variable id.
    pub const fn id(self) -> u32 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SetVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Position in the source text (1-based line and column).
///
/// Programs built through the API rather than parsed carry the default `0:0`.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub const fn new(line: u32, col: u32) -> Self {
        Span { line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_span_display() {
        assert_eq!(Span::new(12, 3).to_string(), "12:3");
        assert_eq!(Span::default().to_string(), "0:0");
    }

    #[test]
    fn test_set_var_ordering() {
        let a = SetVar::new(1);
        let b = SetVar::new(2);
        assert!(a < b);
        assert_eq!(a.index(), 1);
        assert_eq!(b.to_string(), "S2");
    }
}
