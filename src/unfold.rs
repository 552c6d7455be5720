//! Materialization of folded locations.
//!
//! A full summary unfolds into its inductive case: one explicit cell whose
//! successor fields are fresh summaries. A segment has two cases: it is
//! empty (the root is the hole) or it starts with a cell and continues as a
//! segment through one of the successors. The base case of a summary
//! (root is null) is taken by null tests; a dereference reaching it is a
//! null dereference.

use log::debug;

use crate::ast::{StructDecl, Type};
use crate::error::ExecError;
use crate::heap::{Cell, Fact, Hole, Params, Slot, Summary, SymbolicHeap};
use crate::location::{Loc, Value};
use crate::predicate::PredId;
use crate::state::{bind, Outcomes, ProgramState};
use crate::types::SetVar;

/// Parameters of the instances below a cell, for the inductive case of
/// `pred` at `root`.
#[derive(Debug, Clone)]
pub struct Step {
    /// Parameters of successor instances.
    pub succ: Params,
    /// Parameters of nested instances.
    pub nested: Params,
    /// Set that non-owning reference fields point into.
    pub member_set: Option<SetVar>,
}

/// Compute the parameters one level down. Splits the node set of `graphc`,
/// reusing an existing split of `root`. Returns `None` if the node set is
/// known to be empty.
pub fn step_params(heap: &mut SymbolicHeap, pred: PredId, root: Loc, params: &Params) -> Option<Step> {
    let step = match pred {
        PredId::List => Step {
            succ: Params::none(),
            nested: Params::none(),
            member_set: None,
        },
        PredId::TreeParent => Step {
            succ: Params::new(vec![Value::Ptr(root)], vec![]),
            nested: Params::none(),
            member_set: None,
        },
        PredId::Graph => {
            let (nodes, targets) = (*params.sets.first()?, *params.sets.get(1)?);
            let rest = match heap.sets.split_of(nodes, root) {
                Some(rest) => rest,
                None => {
                    let rest = heap.sets.fresh();
                    if !heap.sets.add_split(nodes, root, rest) {
                        return None;
                    }
                    rest
                }
            };
            Step {
                succ: Params::new(vec![], vec![rest, targets]),
                nested: Params::new(vec![], vec![targets]),
                member_set: None,
            }
        }
        PredId::GraphEdges => {
            let targets = *params.sets.first()?;
            Step {
                succ: Params::new(vec![], vec![targets]),
                nested: Params::none(),
                member_set: Some(targets),
            }
        }
    };
    Some(step)
}

/// Base-case requirements of `pred` with `params`. Returns `false` if the
/// instance cannot be empty.
pub fn base_case(heap: &mut SymbolicHeap, pred: PredId, params: &Params) -> bool {
    match pred {
        PredId::Graph => match params.sets.first() {
            Some(&nodes) => heap.sets.set_empty(nodes),
            None => false,
        },
        _ => true,
    }
}

/// Replace the summary at `loc` by its inductive case.
///
/// A full summary yields one heap. A segment yields one heap per successor
/// the hole may continue through. Cases with an exhausted node set are
/// dropped, so an empty result means the root must be null.
pub fn unfold_inductive(heap: &SymbolicHeap, structs: &[StructDecl], loc: Loc) -> Result<Vec<SymbolicHeap>, ExecError> {
    let summary = heap
        .summary(loc)
        .cloned()
        .ok_or_else(|| ExecError::mismatch(loc, "location is not folded"))?;
    let def = summary.pred.def();
    let layout = def.layout(structs, summary.ty).ok_or_else(|| {
        ExecError::mismatch(loc, format!("predicate {} does not apply to {}", def.name, summary.ty))
    })?;
    let decl = &structs[summary.ty.index()];

    let mut results = Vec::new();
    let continuations: Vec<Option<usize>> = match summary.hole {
        None => vec![None],
        Some(_) => layout.successors.iter().map(|&i| Some(i)).collect(),
    };
    for through in continuations {
        let mut work = heap.clone();
        work.take(loc);
        let Some(step) = step_params(&mut work, summary.pred, loc, &summary.params) else {
            continue;
        };
        let mut fields = Vec::with_capacity(decl.fields.len());
        for (i, field) in decl.fields.iter().enumerate() {
            let value = if layout.successors.contains(&i) {
                let hole = if through == Some(i) { summary.hole.clone() } else { None };
                let child = Summary {
                    pred: summary.pred,
                    ty: summary.ty,
                    params: step.succ.clone(),
                    hole,
                };
                Value::Ptr(work.add(Fact::Summary(child)))
            } else if layout.back == Some(i) {
                summary.params.ptrs.first().copied().unwrap_or(Value::Null)
            } else if let Some(&(_, nested)) = layout.nested.iter().find(|(j, _)| *j == i) {
                let Type::Ptr(target) = field.ty else {
                    return Err(ExecError::mismatch(loc, format!("field `{}` is not a pointer", field.name)));
                };
                Value::Ptr(work.add(Fact::Summary(Summary::full(nested, target, step.nested.clone()))))
            } else if layout.refs.contains(&i) {
                match (field.ty, step.member_set) {
                    (Type::Ptr(target), Some(set)) => Value::Ptr(work.add(Fact::Member { set, ty: target })),
                    _ => Value::Ptr(work.fresh()),
                }
            } else {
                match field.ty {
                    Type::Ptr(_) => Value::Ptr(work.fresh()),
                    Type::Int => Value::Int,
                }
            };
            fields.push(value);
        }
        work.put(loc, Fact::Cell(Cell { ty: summary.ty, fields }));
        results.push(work);
    }
    debug!("unfold {} at {}: {} case(s)", summary.pred, loc, results.len());
    Ok(results)
}

impl ProgramState {
    fn with_heap(&self, heap: SymbolicHeap) -> ProgramState {
        ProgramState {
            path: self.path,
            heap,
            env: self.env.clone(),
        }
    }

    /// Base case of the full summary at `loc`: the root is null.
    fn discharge(mut self, loc: Loc) -> Option<ProgramState> {
        let Some(Fact::Summary(summary)) = self.heap.take(loc) else {
            return None;
        };
        if !base_case(&mut self.heap, summary.pred, &summary.params) {
            return None;
        }
        self.substitute(loc, Value::Null);
        debug!("discharge {} at {}", summary.pred, loc);
        Some(self)
    }

    /// Empty case of the segment at `loc`: the root is the hole, and the
    /// parameters are those expected at the hole.
    fn close_segment(mut self, loc: Loc) -> Option<(ProgramState, Value)> {
        let Some(Fact::Summary(Summary {
            params,
            hole: Some(Hole { at, params: expected }),
            ..
        })) = self.heap.take(loc)
        else {
            return None;
        };
        self.substitute(loc, at);
        for (&a, &b) in params.ptrs.iter().zip(&expected.ptrs) {
            if !self.equate(a.substituted(loc, at), b.substituted(loc, at)) {
                return None;
            }
        }
        for (&a, &b) in params.sets.iter().zip(&expected.sets) {
            self.heap.sets.equate(a, b);
        }
        Some((self, at))
    }

    /// Unfold the summary at `loc`, which must be an instance of `pred`.
    ///
    /// Returns the inductive cases, and the empty case of a segment. If no
    /// inductive case is feasible the root must be null, and the base case
    /// is returned instead.
    pub fn unfold(self, loc: Loc, pred: PredId, structs: &[StructDecl]) -> Result<Vec<ProgramState>, ExecError> {
        let segment = match self.heap.slot(loc) {
            Slot::Summary(s) if s.pred == pred => s.is_segment(),
            Slot::Summary(s) => {
                return Err(ExecError::mismatch(loc, format!("expected {}, found {}", pred, s.pred)));
            }
            _ => return Err(ExecError::mismatch(loc, format!("location is not folded into {}", pred))),
        };
        let mut states: Vec<ProgramState> = unfold_inductive(&self.heap, structs, loc)?
            .into_iter()
            .map(|heap| self.with_heap(heap))
            .collect();
        if segment {
            states.extend(self.clone().close_segment(loc).map(|(s, _)| s));
        } else if states.is_empty() {
            states.extend(self.discharge(loc));
        }
        Ok(states)
    }

    /// Make the location `value` points to an explicit cell, unfolding as needed.
    pub fn materialize(self, value: Value, structs: &[StructDecl]) -> Outcomes<Loc> {
        let loc = match value {
            Value::Null => return self.single(Err(ExecError::NullDeref)),
            Value::Int => return self.single(Err(ExecError::mismatch(None, "dereference of a scalar"))),
            Value::Ptr(loc) => loc,
        };
        match self.heap.slot(loc) {
            Slot::Cell(_) => self.single(Ok(loc)),
            Slot::Freed => self.single(Err(ExecError::UseAfterFree(loc))),
            Slot::Opaque => self.single(Err(ExecError::mismatch(loc, "dereference of an unknown location"))),
            Slot::Member { .. } => self.single(Err(ExecError::mismatch(loc, "update through a shared reference"))),
            Slot::Summary(s) => {
                let segment = s.is_segment();
                let heaps = match unfold_inductive(&self.heap, structs, loc) {
                    Ok(heaps) => heaps,
                    Err(e) => return self.single(Err(e)),
                };
                let mut outcomes: Outcomes<Loc> = heaps.into_iter().map(|h| (self.with_heap(h), Ok(loc))).collect();
                if segment {
                    if let Some((closed, at)) = self.close_segment(loc) {
                        outcomes.extend(closed.materialize(at, structs));
                    }
                } else if let Some(base) = self.discharge(loc) {
                    // The summary may be empty: dereferencing it is then a null dereference.
                    outcomes.push((base, Err(ExecError::NullDeref)));
                }
                outcomes
            }
        }
    }

    /// Read field `index` of the location `value` points to.
    pub fn load_field(mut self, value: Value, index: usize, structs: &[StructDecl]) -> Outcomes<Value> {
        if let Value::Ptr(loc) = value {
            if let Slot::Member { set, ty } = self.heap.slot(loc) {
                let field = structs.get(ty.index()).and_then(|d| d.fields.get(index));
                let res = match field.map(|f| f.ty) {
                    Some(Type::Ptr(target)) => Ok(Value::Ptr(self.heap.add(Fact::Member { set, ty: target }))),
                    Some(Type::Int) => Ok(Value::Int),
                    None => Err(ExecError::mismatch(loc, format!("no field #{} in {}", index, ty))),
                };
                return self.single(res);
            }
        }
        bind(self.materialize(value, structs), |s, loc| {
            let res = match s.heap.cell(loc).and_then(|c| c.fields.get(index)) {
                Some(&v) => Ok(v),
                None => Err(ExecError::mismatch(loc, format!("no field #{}", index))),
            };
            s.single(res)
        })
    }

    /// Write field `index` of the location `value` points to.
    pub fn store_field(self, value: Value, index: usize, new: Value, structs: &[StructDecl]) -> Outcomes<()> {
        bind(self.materialize(value, structs), |mut s, loc| {
            let res = match s.heap.cell_mut(loc).and_then(|c| c.fields.get_mut(index)) {
                Some(slot) => {
                    *slot = new;
                    Ok(())
                }
                None => Err(ExecError::mismatch(loc, format!("no field #{}", index))),
            };
            s.single(res)
        })
    }

    /// Decide whether `value` is null, forking when it is not determined.
    pub fn test_null(self, value: Value, structs: &[StructDecl]) -> Outcomes<bool> {
        let loc = match value {
            Value::Null => return self.single(Ok(true)),
            Value::Int => return self.single(Err(ExecError::mismatch(None, "null test on a scalar"))),
            Value::Ptr(loc) => loc,
        };
        match self.heap.slot(loc) {
            Slot::Cell(_) | Slot::Freed => self.single(Ok(false)),
            Slot::Opaque | Slot::Member { .. } => {
                let mut null = self.clone();
                null.heap.take(loc);
                null.substitute(loc, Value::Null);
                vec![(null, Ok(true)), (self, Ok(false))]
            }
            Slot::Summary(s) => {
                let segment = s.is_segment();
                let heaps = match unfold_inductive(&self.heap, structs, loc) {
                    Ok(heaps) => heaps,
                    Err(e) => return self.single(Err(e)),
                };
                let non_null: Outcomes<bool> = heaps.into_iter().map(|h| (self.with_heap(h), Ok(false))).collect();
                let mut outcomes = Vec::new();
                if segment {
                    if let Some((closed, at)) = self.close_segment(loc) {
                        outcomes.extend(closed.test_null(at, structs));
                    }
                } else if let Some(base) = self.discharge(loc) {
                    outcomes.push((base, Ok(true)));
                }
                outcomes.extend(non_null);
                outcomes
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::ast::FieldDecl;
    use crate::state::Binding;
    use crate::types::StructId;

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

    fn list_structs() -> Vec<StructDecl> {
        vec![StructDecl::new(
            "elist",
            vec![FieldDecl {
                name: "next".into(),
                ty: Type::Ptr(StructId::new(0)),
            }],
        )]
    }

    fn bind_var(state: &mut ProgramState, var: &str, value: Value) {
        state.env.insert(
            var.to_string(),
            Binding {
                ty: Type::Ptr(StructId::new(0)),
                value,
            },
        );
    }

    #[test]
    fn test_unfold_tree() {
        let structs = tree_structs();
        let mut heap = SymbolicHeap::new();
        let parent = heap.fresh();
        let root = heap.add(Fact::Summary(Summary::full(
            PredId::TreeParent,
            StructId::new(0),
            Params::new(vec![Value::Ptr(parent)], vec![]),
        )));
        let heaps = unfold_inductive(&heap, &structs, root).unwrap();
        assert_eq!(heaps.len(), 1);
        let cell = heaps[0].cell(root).unwrap();
        assert_eq!(cell.fields[2], Value::Ptr(parent));
        let left = heaps[0].summary(cell.fields[0].loc().unwrap()).unwrap();
        assert_eq!(left.params.ptrs, vec![Value::Ptr(root)]);
    }

    #[test]
    fn test_unfold_graph_splits_nodes() {
        let edge = StructId::new(0);
        let node = StructId::new(1);
        let field = |name: &str, ty| FieldDecl {
            name: name.to_string(),
            ty,
        };
        let structs = vec![
            StructDecl::new("edge", vec![field("next", Type::Ptr(edge)), field("dest", Type::Ptr(node))]),
            StructDecl::new("node", vec![field("next", Type::Ptr(node)), field("edges", Type::Ptr(edge))]),
        ];
        let mut heap = SymbolicHeap::new();
        let e = heap.sets.declare("E").unwrap();
        let f = heap.sets.declare("F").unwrap();
        let root = heap.add(Fact::Summary(Summary::full(PredId::Graph, node, Params::new(vec![], vec![f, e]))));
        let heaps = unfold_inductive(&heap, &structs, root).unwrap();
        let heap = &heaps[0];
        let rest = heap.sets.split_of(f, root).unwrap();
        let cell = heap.cell(root).unwrap();
        let next = heap.summary(cell.fields[0].loc().unwrap()).unwrap();
        assert_eq!(next.params.sets, vec![rest, e]);
        let edges = heap.summary(cell.fields[1].loc().unwrap()).unwrap();
        assert_eq!(edges.pred, PredId::GraphEdges);
        assert_eq!(edges.params.sets, vec![e]);

        // An exhausted node set has no inductive case.
        let mut empty = SymbolicHeap::new();
        let g = empty.sets.declare("G").unwrap();
        let x = empty.sets.declare("X").unwrap();
        empty.sets.set_empty(g);
        let root = empty.add(Fact::Summary(Summary::full(PredId::Graph, node, Params::new(vec![], vec![g, x]))));
        assert!(unfold_inductive(&empty, &structs, root).unwrap().is_empty());
    }

    #[test]
    fn test_null_test_on_summary() {
        let structs = list_structs();
        let mut state = ProgramState::new(0);
        let root = state.heap.add(Fact::Summary(Summary::full(PredId::List, StructId::new(0), Params::none())));
        bind_var(&mut state, "l", Value::Ptr(root));
        let outcomes = state.test_null(Value::Ptr(root), &structs);
        assert_eq!(outcomes.len(), 2);
        let (base, res) = &outcomes[0];
        assert_eq!(res, &Ok(true));
        assert_eq!(base.lookup("l").unwrap(), Value::Null);
        let (unfolded, res) = &outcomes[1];
        assert_eq!(res, &Ok(false));
        assert!(unfolded.heap.cell(root).is_some());
    }

    #[test]
    fn test_materialize_segment() {
        let structs = list_structs();
        let mut state = ProgramState::new(0);
        let end = state.heap.add(Fact::Summary(Summary::full(PredId::List, StructId::new(0), Params::none())));
        let root = state.heap.add(Fact::Summary(Summary {
            pred: PredId::List,
            ty: StructId::new(0),
            params: Params::none(),
            hole: Some(Hole {
                at: Value::Ptr(end),
                params: Params::none(),
            }),
        }));
        bind_var(&mut state, "l", Value::Ptr(root));
        bind_var(&mut state, "k", Value::Ptr(end));
        let outcomes = state.materialize(Value::Ptr(root), &structs);
        // Non-empty segment, then the empty case continuing into `end`,
        // which is itself empty or not.
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].1, Ok(root));
        assert_eq!(outcomes[1].1, Ok(end));
        let closed = &outcomes[1].0;
        assert_eq!(closed.lookup("l").unwrap(), Value::Ptr(end));
        assert!(closed.heap.cell(end).is_some());
        assert_eq!(outcomes[2].1, Err(ExecError::NullDeref));
    }

    #[test]
    fn test_unfold_wrong_predicate() {
        let structs = list_structs();
        let mut state = ProgramState::new(0);
        let root = state.heap.add(Fact::Summary(Summary::full(PredId::List, StructId::new(0), Params::none())));
        let err = state.clone().unfold(root, PredId::TreeParent, &structs).unwrap_err();
        assert_eq!(err.location(), Some(root));
        let opaque = state.heap.fresh();
        assert!(state.clone().unfold(opaque, PredId::List, &structs).is_err());
        let states = state.unfold(root, PredId::List, &structs).unwrap();
        assert_eq!(states.len(), 1);
    }

    #[test]
    fn test_member_reads() {
        let structs = list_structs();
        let mut state = ProgramState::new(0);
        let set = state.heap.sets.declare("E").unwrap();
        let member = state.heap.add(Fact::Member {
            set,
            ty: StructId::new(0),
        });
        let (state, res) = state.load_field(Value::Ptr(member), 0, &structs).remove(0);
        let next = res.unwrap().loc().unwrap();
        assert!(matches!(state.heap.slot(next), Slot::Member { .. }));
        let (_, res) = state.store_field(Value::Ptr(member), 0, Value::Null, &structs).remove(0);
        assert!(res.is_err());
    }
}
