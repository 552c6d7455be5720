//! # shape-rs: Symbolic heap-shape checking in Rust
//!
//! **`shape-rs`** checks annotated pointer-manipulating programs against
//! inductive shape predicates: singly-linked lists, binary trees with parent
//! pointers, and graphs whose edges point into a set of nodes.
//!
//! ## How it works
//!
//! Heaps are represented **symbolically**: some locations are explicit cells
//! with known fields, others are folded into *summaries* standing for an
//! unbounded number of cells that satisfy a predicate. Summaries with a
//! *hole* are segments, describing a structure up to some other location.
//!
//! - Reading through a summary **unfolds** it into one explicit cell and
//!   smaller summaries, forking one path per case of the predicate.
//! - A `check_inductive` directive **folds** explicit cells back into a
//!   summary and passes if the result is the requested instance.
//! - At loop heads states are **widened**: cells are folded into summaries
//!   and segments between the locations held by variables, so that the
//!   number of distinct states reached there stays finite.
//!
//! Every path is explored separately. Memory errors (null dereference, use
//! after free, double free) end the path that raised them and are reported
//! as violations; sibling paths keep running.
//!
//! ## Basic Usage
//!
//! ```rust
//! use shape_rs::checker::{check_source, CheckerConfig};
//!
//! let source = r#"
//!     typedef struct elist { struct elist * next; int data; } elist;
//!     typedef elist * list;
//!     volatile int cond;
//!     void main() {
//!         list l = null;
//!         while (cond) {
//!             list c = malloc(sizeof(elist));
//!             c->next = l;
//!             l = c;
//!         }
//!         _memcad("check_inductive( l, list )");
//!     }
//! "#;
//!
//! let report = check_source(source, &CheckerConfig::default()).unwrap();
//! assert!(report.is_clean());
//! ```
//!
//! ## Core Components
//!
//! - **[`parser`]**: The supported C subset and the `_memcad` directives.
//! - **[`predicate`]**: The catalog of inductive predicates.
//! - **[`heap`]**: Symbolic heaps and their canonical rendering.
//! - **[`unfold`]** and **[`fold`]**: Materialization, re-summarization and widening.
//! - **[`executor`]**: Path exploration over the control flow graph.
//! - **[`checker`]**: Directive evaluation and the [`Report`][crate::checker::Report].
//! - **[`dot`]**: Utilities for visualizing symbolic heaps using Graphviz.

pub mod ast;
pub mod cfg;
pub mod checker;
pub mod constraints;
pub mod directive;
pub mod dot;
pub mod error;
pub mod executor;
pub mod fold;
pub mod heap;
pub mod lexer;
pub mod location;
pub mod parser;
pub mod predicate;
pub mod state;
pub mod storage;
pub mod types;
pub mod unfold;
