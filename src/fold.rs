//! Folding explicit cells back into summaries, and loop-head widening.
//!
//! A fold starting at a root absorbs every fact reachable through the
//! predicate's fields:
//!
//! - null satisfies the base case;
//! - a summary of the same predicate with matching parameters is taken
//!   over, and the fold continues at its hole, if any;
//! - a cell must match the inductive case (back pointer, node set), and
//!   the fold recurses into its successor and nested fields;
//! - a *stop* location other than the root ends the traversal: it becomes
//!   the hole of the resulting segment, at most once, and only for the
//!   predicate being folded.
//!
//! Anything else (unknown, freed or shared locations, cycles) is a shape
//! mismatch. Folding is transactional: on failure the heap is unchanged.

use std::collections::BTreeSet;

use log::debug;

use crate::ast::{StructDecl, Type};
use crate::error::ExecError;
use crate::heap::{Cell, Fact, Hole, Params, Slot, Summary, SymbolicHeap};
use crate::location::{Loc, Value};
use crate::predicate::{candidates, PredId};
use crate::types::{SetVar, StructId, Var};
use crate::unfold::{base_case, step_params};

/// Fold the structure at `root` into an instance of `pred`.
///
/// When `params` is `None` they are inferred from the root. On success the
/// summary is installed at the root, and its hole (if a stop location was
/// reached) is returned. Folding null only checks the base case.
pub fn fold(
    heap: &mut SymbolicHeap,
    structs: &[StructDecl],
    root: Value,
    pred: PredId,
    params: Option<Params>,
    stops: &BTreeSet<Loc>,
) -> Result<Option<Hole>, ExecError> {
    let def = pred.def();
    if let Some(p) = &params {
        if p.ptrs.len() != def.ptr_arity || p.sets.len() != def.set_arity {
            return Err(ExecError::mismatch(
                root.loc(),
                format!(
                    "{} expects {} pointer and {} set parameter(s)",
                    pred, def.ptr_arity, def.set_arity
                ),
            ));
        }
    }

    let loc = match root {
        Value::Null => {
            let mut work = heap.clone();
            if let Some(p) = &params {
                if !base_case(&mut work, pred, p) {
                    return Err(ExecError::mismatch(None, format!("null is not an empty {}", pred)));
                }
            }
            *heap = work;
            return Ok(None);
        }
        Value::Int => return Err(ExecError::mismatch(None, "scalar where a pointer was expected")),
        Value::Ptr(loc) => loc,
    };

    let ty = match heap.slot(loc) {
        Slot::Cell(cell) => cell.ty,
        Slot::Summary(s) => s.ty,
        Slot::Opaque => return Err(ExecError::mismatch(loc, "fold of an unknown location")),
        Slot::Freed => return Err(ExecError::mismatch(loc, "fold of a freed location")),
        Slot::Member { .. } => return Err(ExecError::mismatch(loc, "fold of a shared reference")),
    };
    if def.layout(structs, ty).is_none() {
        return Err(ExecError::mismatch(loc, format!("{} does not apply to {}", pred, ty)));
    }

    let mut work = heap.clone();
    let params = match params {
        Some(p) => p,
        None => infer_params(&mut work, structs, loc, pred, ty)?,
    };

    let mut folder = Folder {
        heap: work,
        structs,
        stops,
        root: loc,
        pred,
        hole: None,
        visited: BTreeSet::new(),
    };
    folder.absorb(root, pred, ty, &params)?;

    let Folder { heap: mut work, hole, .. } = folder;
    let params = work.resolve_params(&params);
    let hole = hole.map(|h| Hole {
        at: h.at,
        params: work.resolve_params(&h.params),
    });
    work.put(
        loc,
        Fact::Summary(Summary {
            pred,
            ty,
            params,
            hole: hole.clone(),
        }),
    );
    *heap = work;
    debug!("fold {} at {}{}", pred, loc, if hole.is_some() { " (segment)" } else { "" });
    Ok(hole)
}

/// Parameters of the instance rooted at `loc`, read off its fields.
fn infer_params(
    heap: &mut SymbolicHeap,
    structs: &[StructDecl],
    loc: Loc,
    pred: PredId,
    ty: StructId,
) -> Result<Params, ExecError> {
    if let Some(s) = heap.summary(loc) {
        return if s.pred == pred {
            Ok(s.params.clone())
        } else {
            Err(ExecError::mismatch(loc, format!("expected {}, found {}", pred, s.pred)))
        };
    }
    let params = match pred {
        PredId::List => Params::none(),
        PredId::TreeParent => {
            let back = pred
                .def()
                .layout(structs, ty)
                .and_then(|layout| layout.back)
                .and_then(|i| heap.cell(loc).and_then(|c| c.fields.get(i).copied()))
                .ok_or_else(|| ExecError::mismatch(loc, "missing back pointer"))?;
            Params::new(vec![back], vec![])
        }
        PredId::Graph => {
            let nodes = match heap.sets.whole_of(loc) {
                Some(nodes) => nodes,
                None => heap.sets.fresh(),
            };
            let targets = heap.sets.fresh();
            Params::new(vec![], vec![nodes, targets])
        }
        PredId::GraphEdges => Params::new(vec![], vec![heap.sets.fresh()]),
    };
    Ok(params)
}

struct Folder<'a> {
    heap: SymbolicHeap,
    structs: &'a [StructDecl],
    stops: &'a BTreeSet<Loc>,
    root: Loc,
    pred: PredId,
    hole: Option<Hole>,
    visited: BTreeSet<Loc>,
}

impl Folder<'_> {
    fn absorb(&mut self, value: Value, pred: PredId, ty: StructId, params: &Params) -> Result<(), ExecError> {
        let loc = match value {
            Value::Null => {
                return if base_case(&mut self.heap, pred, params) {
                    Ok(())
                } else {
                    Err(ExecError::mismatch(None, format!("{} ends while its node set is not empty", pred)))
                };
            }
            Value::Int => return Err(ExecError::mismatch(None, "scalar where a pointer was expected")),
            Value::Ptr(loc) => loc,
        };

        if loc != self.root && self.stops.contains(&loc) {
            if pred == self.pred && self.hole.is_none() {
                self.hole = Some(Hole {
                    at: value,
                    params: params.clone(),
                });
                return Ok(());
            }
            return Err(ExecError::mismatch(loc, "location is shared with another variable"));
        }
        if !self.visited.insert(loc) {
            return Err(ExecError::mismatch(loc, "cycle"));
        }

        match self.heap.slot(loc) {
            Slot::Opaque => Err(ExecError::mismatch(loc, "unknown location inside the structure")),
            Slot::Freed => Err(ExecError::mismatch(loc, "freed location inside the structure")),
            Slot::Member { .. } => Err(ExecError::mismatch(loc, "shared reference inside the structure")),
            Slot::Summary(_) => {
                let Some(Fact::Summary(summary)) = self.heap.take(loc) else {
                    return Err(ExecError::mismatch(loc, "location is not folded"));
                };
                if summary.pred != pred || summary.ty != ty {
                    return Err(ExecError::mismatch(
                        loc,
                        format!("expected {}, found {}", pred, summary.pred),
                    ));
                }
                self.match_params(loc, &summary.params, params)?;
                match summary.hole {
                    Some(hole) => self.absorb(hole.at, pred, ty, &hole.params),
                    None => Ok(()),
                }
            }
            Slot::Cell(_) => {
                let Some(Fact::Cell(cell)) = self.heap.take(loc) else {
                    return Err(ExecError::mismatch(loc, "location is not a cell"));
                };
                self.absorb_cell(loc, cell, pred, ty, params)
            }
        }
    }

    fn absorb_cell(&mut self, loc: Loc, cell: Cell, pred: PredId, ty: StructId, params: &Params) -> Result<(), ExecError> {
        if cell.ty != ty {
            return Err(ExecError::mismatch(loc, format!("expected {}, found {}", ty, cell.ty)));
        }
        let layout = pred
            .def()
            .layout(self.structs, ty)
            .ok_or_else(|| ExecError::mismatch(loc, format!("{} does not apply to {}", pred, ty)))?;

        if let Some(back) = layout.back {
            let expected = params.ptrs.first().copied().unwrap_or(Value::Null);
            if cell.fields[back] != expected {
                return Err(ExecError::mismatch(
                    loc,
                    format!("back pointer is {}, expected {}", cell.fields[back], expected),
                ));
            }
        }
        let step = step_params(&mut self.heap, pred, loc, params)
            .ok_or_else(|| ExecError::mismatch(loc, format!("{} node set is empty", pred)))?;

        for &i in &layout.successors {
            self.absorb(cell.fields[i], pred, ty, &step.succ)?;
        }
        for &(i, nested) in &layout.nested {
            let Type::Ptr(target) = self.structs[ty.index()].fields[i].ty else {
                return Err(ExecError::mismatch(loc, "nested field is not a pointer"));
            };
            self.absorb(cell.fields[i], nested, target, &step.nested)?;
        }
        for &i in &layout.refs {
            self.check_ref(cell.fields[i], step.member_set)?;
        }
        Ok(())
    }

    /// A non-owning field must be null or point into `set`.
    fn check_ref(&mut self, value: Value, set: Option<SetVar>) -> Result<(), ExecError> {
        let (loc, set) = match (value, set) {
            (Value::Null, _) => return Ok(()),
            (Value::Ptr(loc), Some(set)) => (loc, set),
            _ => return Err(ExecError::mismatch(value.loc(), "unexpected reference")),
        };
        let inside = match self.heap.slot(loc) {
            Slot::Member { set: member, .. } => {
                self.heap.sets.is_subset(member, set) || self.heap.sets.unify(member, set)
            }
            Slot::Cell(_) | Slot::Summary(_) => self.heap.sets.contains(set, loc),
            _ => false,
        };
        if inside {
            Ok(())
        } else {
            Err(ExecError::mismatch(loc, format!("reference outside of {}", self.heap.sets.describe(set))))
        }
    }

    fn match_params(&mut self, loc: Loc, actual: &Params, expected: &Params) -> Result<(), ExecError> {
        if actual.ptrs != expected.ptrs {
            return Err(ExecError::mismatch(loc, "pointer parameters differ"));
        }
        if actual.sets.len() != expected.sets.len() {
            return Err(ExecError::mismatch(loc, "set parameters differ"));
        }
        for (&a, &b) in actual.sets.iter().zip(&expected.sets) {
            if !self.heap.sets.unify(a, b) {
                let (a, b) = (self.heap.sets.describe(a), self.heap.sets.describe(b));
                return Err(ExecError::mismatch(loc, format!("set parameter {} differs from {}", a, b)));
            }
        }
        Ok(())
    }
}

/// Fold the structure at `root` completely and require a full instance.
pub fn check(
    heap: &mut SymbolicHeap,
    structs: &[StructDecl],
    root: Value,
    pred: PredId,
    params: Option<Params>,
) -> Result<(), ExecError> {
    match fold(heap, structs, root, pred, params, &BTreeSet::new())? {
        None => Ok(()),
        Some(hole) => Err(ExecError::mismatch(hole.at.loc(), "structure ends at a shared location")),
    }
}

/// Widen a state at a loop head.
///
/// Locations held by variables are cut points. Cells at cut points stay
/// explicit; below them, in variable order, cells are folded into
/// summaries, with segments ending at cut points. Cells that cannot be
/// folded stay explicit and folding continues below them. Segments whose
/// hole is no longer a cut point are extended through it. Finally,
/// unreachable facts and constraints are collected.
pub fn widen(heap: &mut SymbolicHeap, structs: &[StructDecl], roots: &[(Var, Value)]) {
    let cuts: BTreeSet<Loc> = roots.iter().filter_map(|(_, v)| v.loc()).collect();
    let mut visited = BTreeSet::new();
    for (_, value) in roots {
        if let Value::Ptr(loc) = *value {
            widen_at(heap, structs, loc, &cuts, &mut visited);
        }
    }
    heap.collect_garbage(roots.iter().map(|(_, v)| *v));
}

fn widen_at(heap: &mut SymbolicHeap, structs: &[StructDecl], loc: Loc, cuts: &BTreeSet<Loc>, visited: &mut BTreeSet<Loc>) {
    if !visited.insert(loc) {
        return;
    }
    match heap.slot(loc) {
        Slot::Cell(cell) => {
            let ty = cell.ty;
            if !cuts.contains(&loc) {
                for pred in candidates(structs, ty) {
                    match fold(heap, structs, Value::Ptr(loc), pred, None, cuts) {
                        Ok(_) => {
                            extend_segment(heap, structs, loc, cuts);
                            return;
                        }
                        Err(e) => debug!("widen: cannot fold {} at {}: {}", pred, loc, e),
                    }
                }
            }
            let successors: Vec<Loc> = heap
                .cell(loc)
                .map(|c| c.fields.iter().filter_map(|v| v.loc()).collect())
                .unwrap_or_default();
            for next in successors {
                if !cuts.contains(&next) {
                    widen_at(heap, structs, next, cuts, visited);
                }
            }
        }
        Slot::Summary(_) => extend_segment(heap, structs, loc, cuts),
        _ => {}
    }
}

/// Move the hole of the segment at `loc` forward while it rests on a
/// location no variable holds.
fn extend_segment(heap: &mut SymbolicHeap, structs: &[StructDecl], loc: Loc, cuts: &BTreeSet<Loc>) {
    loop {
        let Some(Summary {
            pred,
            ty,
            hole: Some(hole),
            ..
        }) = heap.summary(loc).cloned()
        else {
            return;
        };
        let Value::Ptr(at) = hole.at else {
            return;
        };
        if at == loc || cuts.contains(&at) {
            return;
        }
        let next_hole = match heap.slot(at) {
            Slot::Cell(_) => match fold(heap, structs, hole.at, pred, Some(hole.params.clone()), cuts) {
                Ok(_) => match heap.take(at) {
                    Some(Fact::Summary(inner)) => inner.hole,
                    _ => return,
                },
                Err(e) => {
                    debug!("widen: cannot extend segment at {} through {}: {}", loc, at, e);
                    return;
                }
            },
            Slot::Summary(inner) if inner.pred == pred && inner.ty == ty && inner.params == hole.params => {
                match heap.take(at) {
                    Some(Fact::Summary(inner)) => inner.hole,
                    _ => return,
                }
            }
            _ => return,
        };
        if let Some(summary) = heap.summary_mut(loc) {
            summary.hole = next_hole;
        }
        debug!("widen: extended segment at {} past {}", loc, at);
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::ast::FieldDecl;

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

    fn tree_structs() -> Vec<StructDecl> {
        let t = Type::Ptr(StructId::new(0));
        let field = |name: &str, ty| FieldDecl {
            name: name.to_string(),
            ty,
        };
        vec![StructDecl::new(
            "etree",
            vec![field("l", t), field("r", t), field("p", t), field("data", Type::Int)],
        )]
    }

    fn cell(heap: &mut SymbolicHeap, fields: Vec<Value>) -> Loc {
        heap.add(Fact::Cell(Cell {
            ty: StructId::new(0),
            fields,
        }))
    }

    fn list_summary(heap: &mut SymbolicHeap) -> Loc {
        heap.add(Fact::Summary(Summary::full(PredId::List, StructId::new(0), Params::none())))
    }

    #[test]
    fn test_fold_list() {
        let structs = list_structs();
        let mut heap = SymbolicHeap::new();
        let tail = list_summary(&mut heap);
        let b = cell(&mut heap, vec![Value::Ptr(tail), Value::Int]);
        let a = cell(&mut heap, vec![Value::Ptr(b), Value::Int]);
        check(&mut heap, &structs, Value::Ptr(a), PredId::List, None).unwrap();
        assert!(heap.summary(a).is_some());
        assert_eq!(heap.fact_count(), 1);
    }

    #[test]
    fn test_fold_failure_leaves_heap() {
        let structs = list_structs();
        let mut heap = SymbolicHeap::new();
        let dangling = heap.fresh();
        let b = cell(&mut heap, vec![Value::Ptr(dangling), Value::Int]);
        let a = cell(&mut heap, vec![Value::Ptr(b), Value::Int]);
        let err = check(&mut heap, &structs, Value::Ptr(a), PredId::List, None).unwrap_err();
        assert_eq!(err.location(), Some(dangling));
        assert!(heap.cell(a).is_some());
        assert!(heap.cell(b).is_some());
    }

    #[test]
    fn test_fold_cycle() {
        let structs = list_structs();
        let mut heap = SymbolicHeap::new();
        let a = heap.fresh();
        let b = cell(&mut heap, vec![Value::Ptr(a), Value::Int]);
        heap.put(
            a,
            Fact::Cell(Cell {
                ty: StructId::new(0),
                fields: vec![Value::Ptr(b), Value::Int],
            }),
        );
        assert!(check(&mut heap, &structs, Value::Ptr(a), PredId::List, None).is_err());
    }

    #[test]
    fn test_fold_segment() {
        let structs = list_structs();
        let mut heap = SymbolicHeap::new();
        let k = list_summary(&mut heap);
        let a = cell(&mut heap, vec![Value::Ptr(k), Value::Int]);
        let stops = BTreeSet::from([k]);
        let hole = fold(&mut heap, &structs, Value::Ptr(a), PredId::List, None, &stops)
            .unwrap()
            .unwrap();
        assert_eq!(hole.at, Value::Ptr(k));
        assert!(heap.summary(a).unwrap().is_segment());
        assert!(heap.summary(k).is_some());
    }

    #[test]
    fn test_fold_tree_back_pointer() {
        let structs = tree_structs();
        let mut heap = SymbolicHeap::new();
        let parent = heap.fresh();
        let root = heap.fresh();
        let child = heap.add(Fact::Summary(Summary::full(
            PredId::TreeParent,
            StructId::new(0),
            Params::new(vec![Value::Ptr(root)], vec![]),
        )));
        heap.put(
            root,
            Fact::Cell(Cell {
                ty: StructId::new(0),
                fields: vec![Value::Ptr(child), Value::Null, Value::Ptr(parent), Value::Int],
            }),
        );

        // Wrong expected parent.
        let other = heap.fresh();
        let wrong = Params::new(vec![Value::Ptr(other)], vec![]);
        assert!(check(&mut heap, &structs, Value::Ptr(root), PredId::TreeParent, Some(wrong)).is_err());

        let right = Params::new(vec![Value::Ptr(parent)], vec![]);
        check(&mut heap, &structs, Value::Ptr(root), PredId::TreeParent, Some(right.clone())).unwrap();
        assert_eq!(heap.summary(root).unwrap().params, right);
    }

    #[test]
    fn test_fold_null() {
        let structs = list_structs();
        let mut heap = SymbolicHeap::new();
        check(&mut heap, &structs, Value::Null, PredId::List, None).unwrap();
        let err = check(&mut heap, &structs, Value::Null, PredId::TreeParent, Some(Params::none())).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ShapeMismatchError);
    }

    #[test]
    fn test_widen_push_loop() {
        let structs = list_structs();
        let mut heap = SymbolicHeap::new();
        let tail = list_summary(&mut heap);
        let a = cell(&mut heap, vec![Value::Ptr(tail), Value::Int]);
        let b = cell(&mut heap, vec![Value::Ptr(a), Value::Int]);
        let roots = vec![("l".to_string(), Value::Ptr(b))];
        widen(&mut heap, &structs, &roots);
        // The head stays explicit, the rest is summarized.
        assert!(heap.cell(b).is_some());
        assert_eq!(heap.summary(a).map(|s| s.is_segment()), Some(false));
        assert_eq!(heap.fact_count(), 2);
    }

    #[test]
    fn test_widen_keeps_cut_points() {
        let structs = list_structs();
        let mut heap = SymbolicHeap::new();
        let tail = list_summary(&mut heap);
        let k = cell(&mut heap, vec![Value::Ptr(tail), Value::Int]);
        let mid = cell(&mut heap, vec![Value::Ptr(k), Value::Int]);
        let l = cell(&mut heap, vec![Value::Ptr(mid), Value::Int]);
        let roots = vec![("l".to_string(), Value::Ptr(l)), ("k".to_string(), Value::Ptr(k))];
        widen(&mut heap, &structs, &roots);
        assert!(heap.cell(l).is_some());
        assert!(heap.cell(k).is_some());
        let segment = heap.summary(mid).unwrap();
        assert_eq!(segment.hole.as_ref().map(|h| h.at), Some(Value::Ptr(k)));
        assert!(heap.summary(tail).is_some());
    }

    #[test]
    fn test_widen_extends_segment() {
        let structs = list_structs();
        let mut heap = SymbolicHeap::new();
        let rest = list_summary(&mut heap);
        let mid = cell(&mut heap, vec![Value::Ptr(rest), Value::Int]);
        let head = heap.add(Fact::Summary(Summary {
            pred: PredId::List,
            ty: StructId::new(0),
            params: Params::none(),
            hole: Some(Hole {
                at: Value::Ptr(mid),
                params: Params::none(),
            }),
        }));
        // `k` moved from `mid` to `rest`.
        let roots = vec![("k".to_string(), Value::Ptr(rest)), ("l".to_string(), Value::Ptr(head))];
        widen(&mut heap, &structs, &roots);
        let summary = heap.summary(head).unwrap();
        assert_eq!(summary.hole.as_ref().map(|h| h.at), Some(Value::Ptr(rest)));
        assert!(heap.is_opaque(mid));
    }
}
