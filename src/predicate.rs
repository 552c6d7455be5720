//! Catalog of inductive predicates.
//!
//! Every predicate has two unfold cases. The base case holds when the root
//! is null. The inductive case holds when the root is a cell whose
//! successor fields are instances of the same predicate, with the
//! parameters updated as follows:
//!
//! | predicate      | params           | inductive case                                         |
//! |----------------|------------------|--------------------------------------------------------|
//! | `list`         | none             | `next: list`                                           |
//! | `bintreep_o`   | pointer `π`      | `p == π`, `l, r: bintreep_o(root)`                     |
//! | `graphc`       | sets `F, E`      | `F = {root} ⊎ F'`, `next: graphc(F', E)`, `edges: graphc_edges(E)` |
//! | `graphc_edges` | set `E`          | `next: graphc_edges(E)`, `dest` null or in `E`         |
//!
//! The base case of `graphc` additionally requires `F = ∅`.
//!
//! The catalog is immutable and shared by every run.

use std::fmt;

use crate::ast::{StructDecl, Type};
use crate::types::StructId;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PredId {
    List,
    TreeParent,
    Graph,
    GraphEdges,
}

impl PredId {
    pub fn def(self) -> &'static PredicateDef {
        &CATALOG[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.def().name
    }
}

impl fmt::Display for PredId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Definition of one inductive predicate.
#[derive(Debug)]
pub struct PredicateDef {
    pub id: PredId,
    pub name: &'static str,
    /// Number of pointer parameters.
    pub ptr_arity: usize,
    /// Number of set-variable parameters.
    pub set_arity: usize,
    /// Fields holding an instance of the same predicate.
    pub successors: &'static [&'static str],
    /// Field that must equal the first pointer parameter.
    pub back: Option<&'static str>,
    /// Fields holding an instance of another predicate.
    pub nested: &'static [(&'static str, PredId)],
    /// Non-owning fields: null or a member of the first set parameter.
    pub refs: &'static [&'static str],
}

pub static CATALOG: [PredicateDef; 4] = [
    PredicateDef {
        id: PredId::List,
        name: "list",
        ptr_arity: 0,
        set_arity: 0,
        successors: &["next"],
        back: None,
        nested: &[],
        refs: &[],
    },
    PredicateDef {
        id: PredId::TreeParent,
        name: "bintreep_o",
        ptr_arity: 1,
        set_arity: 0,
        successors: &["l", "r"],
        back: Some("p"),
        nested: &[],
        refs: &[],
    },
    PredicateDef {
        id: PredId::Graph,
        name: "graphc",
        ptr_arity: 0,
        set_arity: 2,
        successors: &["next"],
        back: None,
        nested: &[("edges", PredId::GraphEdges)],
        refs: &[],
    },
    PredicateDef {
        id: PredId::GraphEdges,
        name: "graphc_edges",
        ptr_arity: 0,
        set_arity: 1,
        successors: &["next"],
        back: None,
        nested: &[],
        refs: &["dest"],
    },
];

pub fn lookup(name: &str) -> Option<PredId> {
    CATALOG.iter().find(|def| def.name == name).map(|def| def.id)
}

/// Field indices of a structure laid out for a predicate.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Layout {
    pub successors: Vec<usize>,
    pub back: Option<usize>,
    pub nested: Vec<(usize, PredId)>,
    pub refs: Vec<usize>,
}

impl PredicateDef {
    /// Number of pointer fields the predicate constrains.
    pub fn field_count(&self) -> usize {
        self.successors.len() + self.back.iter().len() + self.nested.len() + self.refs.len()
    }

    /// Match the structure against the predicate's field signature.
    ///
    /// Every pointer field of the structure must be claimed by the
    /// predicate, successors must point back to the same structure, and
    /// nested fields must in turn match their own predicate.
    pub fn layout(&self, structs: &[StructDecl], ty: StructId) -> Option<Layout> {
        let decl = structs.get(ty.index())?;
        let ptr_field = |name: &str| -> Option<(usize, StructId)> {
            let index = decl.field_index(name)?;
            decl.fields[index].ty.pointee().map(|target| (index, target))
        };

        let mut successors = Vec::new();
        for name in self.successors {
            let (index, target) = ptr_field(name)?;
            if target != ty {
                return None;
            }
            successors.push(index);
        }
        let back = match self.back {
            Some(name) => {
                let (index, target) = ptr_field(name)?;
                if target != ty {
                    return None;
                }
                Some(index)
            }
            None => None,
        };
        let mut nested = Vec::new();
        for &(name, pred) in self.nested {
            let (index, target) = ptr_field(name)?;
            pred.def().layout(structs, target)?;
            nested.push((index, pred));
        }
        let mut refs = Vec::new();
        for name in self.refs {
            refs.push(ptr_field(name)?.0);
        }

        let pointer_fields = decl.fields.iter().filter(|f| matches!(f.ty, Type::Ptr(_))).count();
        if pointer_fields != self.field_count() {
            return None;
        }

        Some(Layout {
            successors,
            back,
            nested,
            refs,
        })
    }
}

/// Predicates applicable to a structure, most specific first.
pub fn candidates(structs: &[StructDecl], ty: StructId) -> Vec<PredId> {
    let mut preds: Vec<&PredicateDef> = CATALOG
        .iter()
        .filter(|def| def.layout(structs, ty).is_some())
        .collect();
    preds.sort_by_key(|def| std::cmp::Reverse(def.field_count()));
    preds.into_iter().map(|def| def.id).collect()
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::ast::FieldDecl;

    fn field(name: &str, ty: Type) -> FieldDecl {
        FieldDecl {
            name: name.to_string(),
            ty,
        }
    }

    fn graph_structs() -> Vec<StructDecl> {
        let edge = StructId::new(0);
        let node = StructId::new(1);
        vec![
            StructDecl::new("edge", vec![field("next", Type::Ptr(edge)), field("dest", Type::Ptr(node))]),
            StructDecl::new(
                "node",
                vec![
                    field("next", Type::Ptr(node)),
                    field("edges", Type::Ptr(edge)),
                    field("data", Type::Int),
                ],
            ),
        ]
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("list"), Some(PredId::List));
        assert_eq!(lookup("bintreep_o"), Some(PredId::TreeParent));
        assert_eq!(lookup("graphc"), Some(PredId::Graph));
        assert_eq!(lookup("dll"), None);
        for def in &CATALOG {
            assert_eq!(def.id.def().name, def.name);
        }
    }

    #[test]
    fn test_list_layout() {
        let elist = StructId::new(0);
        let structs = vec![StructDecl::new(
            "elist",
            vec![field("next", Type::Ptr(elist)), field("data", Type::Int)],
        )];
        let layout = PredId::List.def().layout(&structs, elist).unwrap();
        assert_eq!(layout.successors, vec![0]);
        assert!(PredId::TreeParent.def().layout(&structs, elist).is_none());
        assert_eq!(candidates(&structs, elist), vec![PredId::List]);
    }

    #[test]
    fn test_tree_layout() {
        let etree = StructId::new(0);
        let structs = vec![StructDecl::new(
            "etree",
            vec![
                field("l", Type::Ptr(etree)),
                field("r", Type::Ptr(etree)),
                field("p", Type::Ptr(etree)),
                field("data", Type::Int),
            ],
        )];
        let layout = PredId::TreeParent.def().layout(&structs, etree).unwrap();
        assert_eq!(layout.successors, vec![0, 1]);
        assert_eq!(layout.back, Some(2));
        assert_eq!(candidates(&structs, etree), vec![PredId::TreeParent]);
    }

    #[test]
    fn test_graph_layout() {
        let structs = graph_structs();
        let layout = PredId::Graph.def().layout(&structs, StructId::new(1)).unwrap();
        assert_eq!(layout.successors, vec![0]);
        assert_eq!(layout.nested, vec![(1, PredId::GraphEdges)]);
        assert_eq!(candidates(&structs, StructId::new(1)), vec![PredId::Graph]);
        assert_eq!(candidates(&structs, StructId::new(0)), vec![PredId::GraphEdges]);
        // The node structure has an extra pointer field, so it is not a plain list.
        assert!(PredId::List.def().layout(&structs, StructId::new(1)).is_none());
    }
}
