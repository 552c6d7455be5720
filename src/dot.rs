//! Symbolic heap to DOT (Graphviz) conversion.
//!
//! The generated DOT output follows these conventions:
//! - **Variables** are plain-text nodes at the top (source rank)
//! - **Cells** are records with one port per field
//! - **Summaries** are boxes labeled with the predicate and its parameters;
//!   the hole of a segment is a dashed edge
//! - **Shared references** are dotted ellipses naming their set variable
//! - **Unknown** and **freed** locations are small grey nodes
//! - **Null** is a single point node
//!
//! # Examples
//!
//! ```
//! use shape_rs::heap::SymbolicHeap;
//! use shape_rs::location::Value;
//!
//! let heap = SymbolicHeap::new();
//! let dot = heap.to_dot(&[], &[("l", Value::Null)]).unwrap();
//! assert!(dot.starts_with("digraph heap {"));
//! // Write to file and render with: dot -Tpng output.dot -o output.png
//! ```

use std::fmt::{self, Write as _};

use crate::ast::StructDecl;
use crate::heap::{Slot, SymbolicHeap};
use crate::location::Value;

/// Configuration options for DOT output generation.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for variable nodes (default: "plaintext")
    pub root_shape: &'static str,
    /// Shape for summary nodes (default: "box")
    pub summary_shape: &'static str,
    /// Style for field edges (default: "solid")
    pub field_edge_style: &'static str,
    /// Style for segment hole edges (default: "dashed")
    pub hole_edge_style: &'static str,
    /// Style for pointer parameter edges (default: "dotted")
    pub param_edge_style: &'static str,
    /// Whether to draw an edge for every null field (default: true)
    pub show_null: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            root_shape: "plaintext",
            summary_shape: "box",
            field_edge_style: "solid",
            hole_edge_style: "dashed",
            param_edge_style: "dotted",
            show_null: true,
        }
    }
}

impl SymbolicHeap {
    /// Converts the part of the heap reachable from `roots` to DOT format.
    ///
    /// `structs` provides field names for cells; cells of unknown
    /// structures are drawn with numbered fields.
    pub fn to_dot(&self, structs: &[StructDecl], roots: &[(&str, Value)]) -> Result<String, fmt::Error> {
        self.to_dot_with_config(structs, roots, &DotConfig::default())
    }

    pub fn to_dot_with_config(
        &self,
        structs: &[StructDecl],
        roots: &[(&str, Value)],
        config: &DotConfig,
    ) -> Result<String, fmt::Error> {
        let mut dot = String::new();
        writeln!(dot, "digraph heap {{")?;
        writeln!(dot, "node [fontname=\"monospace\"];")?;

        let mut uses_null = false;
        let mut edge = |dot: &mut String, from: &str, to: Value, style: &str, label: &str| -> fmt::Result {
            let target = match to {
                Value::Ptr(loc) => format!("n{}", loc.index()),
                Value::Null if config.show_null => {
                    uses_null = true;
                    "null".to_string()
                }
                _ => return Ok(()),
            };
            if label.is_empty() {
                writeln!(dot, "{} -> {} [style={}];", from, target, style)
            } else {
                writeln!(dot, "{} -> {} [style={}, label=\"{}\"];", from, target, style, label)
            }
        };

        writeln!(dot, "{{ rank=source")?;
        for (i, (name, _)) in roots.iter().enumerate() {
            writeln!(dot, "r{} [shape={}, label=\"{}\"];", i, config.root_shape, name)?;
        }
        writeln!(dot, "}}")?;
        for (i, (_, value)) in roots.iter().enumerate() {
            edge(&mut dot, &format!("r{}", i), *value, config.field_edge_style, "")?;
        }

        for loc in self.reachable(roots.iter().map(|(_, v)| *v)) {
            let id = format!("n{}", loc.index());
            match self.slot(loc) {
                Slot::Cell(cell) => {
                    let decl = structs.get(cell.ty.index());
                    let mut label = format!("{}", loc);
                    for i in 0..cell.fields.len() {
                        match decl.and_then(|d| d.fields.get(i)) {
                            Some(field) => write!(label, "|<f{}> {}", i, field.name)?,
                            None => write!(label, "|<f{}> #{}", i, i)?,
                        }
                    }
                    writeln!(dot, "{} [shape=record, label=\"{}\"];", id, label)?;
                    for (i, &value) in cell.fields.iter().enumerate() {
                        edge(&mut dot, &format!("{}:f{}", id, i), value, config.field_edge_style, "")?;
                    }
                }
                Slot::Summary(summary) => {
                    let sets: Vec<String> = summary.params.sets.iter().map(|s| s.to_string()).collect();
                    writeln!(
                        dot,
                        "{} [shape={}, label=\"{} {}{}\"];",
                        id,
                        config.summary_shape,
                        loc,
                        summary.pred,
                        if sets.is_empty() {
                            String::new()
                        } else {
                            format!("[{}]", sets.join(", "))
                        }
                    )?;
                    for &ptr in &summary.params.ptrs {
                        edge(&mut dot, &id, ptr, config.param_edge_style, "param")?;
                    }
                    if let Some(hole) = &summary.hole {
                        edge(&mut dot, &id, hole.at, config.hole_edge_style, "hole")?;
                    }
                }
                Slot::Member { set, .. } => {
                    writeln!(dot, "{} [shape=ellipse, style=dotted, label=\"{} in {}\"];", id, loc, set)?;
                }
                Slot::Opaque => writeln!(dot, "{} [shape=circle, color=grey, label=\"?\"];", id)?,
                Slot::Freed => writeln!(dot, "{} [shape=circle, color=grey, label=\"freed\"];", id)?,
            }
        }

        if uses_null {
            writeln!(dot, "null [shape=point];")?;
        }
        writeln!(dot, "}}")?;
        Ok(dot)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::ast::{FieldDecl, Type};
    use crate::heap::{Fact, Params, Summary};
    use crate::predicate::PredId;
    use crate::types::StructId;

    fn list_structs() -> Vec<StructDecl> {
        vec![StructDecl::new(
            "elist",
            vec![
                FieldDecl {
                    name: "next".into(),
                    ty: Type::Ptr(StructId::new(0)),
                },
                FieldDecl {
                    name: "data".into(),
                    ty: Type::Int,
                },
            ],
        )]
    }

    #[test]
    fn test_to_dot_cells_and_summary() {
        let structs = list_structs();
        let mut heap = SymbolicHeap::new();
        let tail = heap.add(Fact::Summary(Summary::full(PredId::List, StructId::new(0), Params::none())));
        let head = heap.alloc_cell(StructId::new(0), &structs[0]);
        heap.cell_mut(head).unwrap().fields[0] = Value::Ptr(tail);

        let dot = heap.to_dot(&structs, &[("l", Value::Ptr(head))]).unwrap();
        assert!(dot.starts_with("digraph heap {"));
        assert!(dot.ends_with("}\n"));
        assert!(dot.contains("<f0> next"));
        assert!(dot.contains(&format!("n{}:f0 -> n{}", head.index(), tail.index())));
        assert!(dot.contains("list"));
    }

    #[test]
    fn test_to_dot_null_root() {
        let heap = SymbolicHeap::new();
        let config = DotConfig {
            show_null: false,
            ..DotConfig::default()
        };
        let dot = heap.to_dot_with_config(&[], &[("l", Value::Null)], &config).unwrap();
        assert!(!dot.contains("null"));
        let dot = heap.to_dot(&[], &[("l", Value::Null)]).unwrap();
        assert!(dot.contains("r0 -> null"));
    }
}
