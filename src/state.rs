//! Per-path program state and the effect of each statement on it.
//!
//! Every operation consumes the state and returns the list of resulting
//! [`Outcomes`]: one entry per feasible case, each with its own copy of the
//! state. Forks come from materialization (segments, null tests) and from
//! pointer comparisons.

use std::collections::BTreeMap;

use crate::ast::{Cond, Expr, Path, StructDecl, Type};
use crate::error::ExecError;
use crate::heap::{Slot, SymbolicHeap};
use crate::location::{Loc, Value};
use crate::types::{PathId, StructId, Var};

/// Resulting states of an operation, each with its result.
pub type Outcomes<T> = Vec<(ProgramState, Result<T, ExecError>)>;

/// Continue every successful outcome with `f`, keeping failures as they are.
pub fn bind<T, U>(
    outcomes: Outcomes<T>,
    mut f: impl FnMut(ProgramState, T) -> Outcomes<U>,
) -> Outcomes<U> {
    let mut result = Vec::new();
    for (state, res) in outcomes {
        match res {
            Ok(value) => result.extend(f(state, value)),
            Err(e) => result.push((state, Err(e))),
        }
    }
    result
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Binding {
    pub ty: Type,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct ProgramState {
    pub path: PathId,
    pub heap: SymbolicHeap,
    pub env: BTreeMap<Var, Binding>,
}

impl ProgramState {
    pub fn new(path: PathId) -> Self {
        ProgramState {
            path,
            heap: SymbolicHeap::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn single<T>(self, result: Result<T, ExecError>) -> Outcomes<T> {
        vec![(self, result)]
    }

    pub fn lookup(&self, var: &str) -> Result<Value, ExecError> {
        self.env
            .get(var)
            .map(|b| b.value)
            .ok_or_else(|| ExecError::UndefinedVariable(var.to_string()))
    }

    /// Bring `var` into scope: pointers start at a fresh unknown location.
    pub fn declare(&mut self, var: &str, ty: Type) {
        let value = match ty {
            Type::Ptr(_) => Value::Ptr(self.heap.fresh()),
            Type::Int => Value::Int,
        };
        self.env.insert(var.to_string(), Binding { ty, value });
    }

    pub fn set(&mut self, var: &str, value: Value) -> Result<(), ExecError> {
        let binding = self
            .env
            .get_mut(var)
            .ok_or_else(|| ExecError::UndefinedVariable(var.to_string()))?;
        binding.value = value;
        Ok(())
    }

    pub fn kill(&mut self, vars: &[Var]) {
        for var in vars {
            self.env.remove(var);
        }
    }

    /// Replace location `from` by `to` in the heap and the environment.
    pub fn substitute(&mut self, from: Loc, to: Value) {
        self.heap.substitute(from, to);
        for binding in self.env.values_mut() {
            binding.value = binding.value.substituted(from, to);
        }
    }

    /// Values held by variables, in variable order.
    pub fn roots(&self) -> impl Iterator<Item = (&str, Value)> {
        self.env.iter().map(|(var, b)| (var.as_str(), b.value))
    }

    /// Canonical rendering of the state reachable from the variables.
    pub fn shape(&self) -> String {
        self.heap.canonical(self.roots())
    }

    /// Assume `a` and `b` are the same value. Returns `false` if they
    /// certainly differ.
    pub fn equate(&mut self, a: Value, b: Value) -> bool {
        if a == b {
            return true;
        }
        match (a, b) {
            (Value::Null, Value::Ptr(loc)) | (Value::Ptr(loc), Value::Null) => match self.heap.slot(loc) {
                Slot::Opaque | Slot::Member { .. } => {
                    self.heap.take(loc);
                    self.substitute(loc, Value::Null);
                    true
                }
                _ => false,
            },
            (Value::Ptr(x), Value::Ptr(y)) => {
                if self.heap.is_opaque(x) {
                    self.substitute(x, b);
                    true
                } else if self.heap.is_opaque(y) {
                    self.substitute(y, a);
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    pub fn eval(self, expr: &Expr, structs: &[StructDecl]) -> Outcomes<Value> {
        match expr {
            Expr::Null => self.single(Ok(Value::Null)),
            Expr::Path(path) => self.read(path, structs),
            Expr::Scalar(paths) => {
                let mut outcomes = self.single(Ok(()));
                for path in paths {
                    outcomes = bind(outcomes, |s, ()| {
                        bind(s.read(path, structs), |s, _| s.single(Ok(())))
                    });
                }
                bind(outcomes, |s, ()| s.single(Ok(Value::Int)))
            }
        }
    }

    pub fn read(self, path: &Path, structs: &[StructDecl]) -> Outcomes<Value> {
        let start = self.lookup(&path.var);
        let mut outcomes = self.single(start);
        for field in &path.fields {
            outcomes = bind(outcomes, |s, v| s.load_field(v, field.index, structs));
        }
        outcomes
    }

    pub fn write(self, path: &Path, value: Value, structs: &[StructDecl]) -> Outcomes<()> {
        match path.split_last() {
            None => {
                let mut state = self;
                let res = state.set(&path.var, value);
                state.single(res)
            }
            Some((prefix, last)) => bind(self.read(&prefix, structs), |s, target| {
                s.store_field(target, last.index, value, structs)
            }),
        }
    }

    pub fn assign(self, lhs: &Path, rhs: &Expr, structs: &[StructDecl]) -> Outcomes<()> {
        bind(self.eval(rhs, structs), |s, value| s.write(lhs, value, structs))
    }

    pub fn alloc(mut self, lhs: &Path, ty: StructId, structs: &[StructDecl]) -> Outcomes<()> {
        let Some(decl) = structs.get(ty.index()) else {
            return self.single(Err(ExecError::mismatch(None, format!("unknown {}", ty))));
        };
        let loc = self.heap.alloc_cell(ty, decl);
        self.write(lhs, Value::Ptr(loc), structs)
    }

    pub fn free(self, path: &Path, structs: &[StructDecl]) -> Outcomes<()> {
        bind(self.read(path, structs), |mut s, value| {
            let res = s.free_value(value);
            s.single(res)
        })
    }

    fn free_value(&mut self, value: Value) -> Result<(), ExecError> {
        let loc = match value {
            Value::Null => return Err(ExecError::NullDeref),
            Value::Int => return Err(ExecError::mismatch(None, "free of a scalar")),
            Value::Ptr(loc) => loc,
        };
        match self.heap.slot(loc) {
            Slot::Cell(_) => {
                self.heap.release(loc);
                Ok(())
            }
            Slot::Freed => Err(ExecError::DoubleFree(loc)),
            Slot::Summary(s) => Err(ExecError::mismatch(loc, format!("free of a location folded into {}", s.pred))),
            Slot::Member { .. } => Err(ExecError::mismatch(loc, "free through a shared reference")),
            Slot::Opaque => Err(ExecError::mismatch(loc, "free of an unknown location")),
        }
    }

    /// Restrict the state to the cases where `cond` evaluates to `truth`.
    pub fn assume(self, cond: &Cond, truth: bool, structs: &[StructDecl]) -> Outcomes<()> {
        match cond {
            Cond::Unknown(paths) => {
                let mut outcomes = self.single(Ok(()));
                for path in paths {
                    outcomes = bind(outcomes, |s, ()| {
                        bind(s.read(path, structs), |s, _| s.single(Ok(())))
                    });
                }
                outcomes
            }
            Cond::Not(inner) => self.assume(inner, !truth, structs),
            Cond::And(a, b) if truth => bind(self.assume(a, true, structs), |s, ()| s.assume(b, true, structs)),
            Cond::And(a, b) => {
                let mut outcomes = self.clone().assume(a, false, structs);
                outcomes.extend(bind(self.assume(a, true, structs), |s, ()| {
                    s.assume(b, false, structs)
                }));
                outcomes
            }
            Cond::Or(a, b) if !truth => bind(self.assume(a, false, structs), |s, ()| s.assume(b, false, structs)),
            Cond::Or(a, b) => {
                let mut outcomes = self.clone().assume(a, true, structs);
                outcomes.extend(bind(self.assume(a, false, structs), |s, ()| {
                    s.assume(b, true, structs)
                }));
                outcomes
            }
            Cond::Cmp { eq, lhs, rhs } => {
                let want_equal = *eq == truth;
                let compared = bind(self.eval(lhs, structs), |s, l| {
                    bind(s.eval(rhs, structs), |s, r| s.compare(l, r, structs))
                });
                compared
                    .into_iter()
                    .filter_map(|(s, res)| match res {
                        Ok(equal) if equal == want_equal => Some((s, Ok(()))),
                        Ok(_) => None,
                        Err(e) => Some((s, Err(e))),
                    })
                    .collect()
            }
        }
    }

    /// Compare two values for equality, forking when it is not determined.
    ///
    /// Distinct locations are equal only when both are null.
    fn compare(self, a: Value, b: Value, structs: &[StructDecl]) -> Outcomes<bool> {
        match (a, b) {
            (Value::Int, _) | (_, Value::Int) => vec![(self.clone(), Ok(true)), (self, Ok(false))],
            (Value::Null, Value::Null) => self.single(Ok(true)),
            (Value::Null, ptr) | (ptr, Value::Null) => self.test_null(ptr, structs),
            (Value::Ptr(x), Value::Ptr(y)) if x == y => self.single(Ok(true)),
            (Value::Ptr(x), Value::Ptr(y)) => bind(self.test_null(Value::Ptr(x), structs), |s, x_null| {
                if x_null {
                    s.test_null(Value::Ptr(y), structs)
                } else {
                    s.single(Ok(false))
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::ast::FieldDecl;
    use crate::heap::{Fact, Params, Summary};
    use crate::predicate::PredId;

    fn structs() -> Vec<StructDecl> {
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

    fn list_ty() -> Type {
        Type::Ptr(StructId::new(0))
    }

    #[test]
    fn test_undefined_variable() {
        let state = ProgramState::new(0);
        let outcomes = state.read(&Path::var("x"), &structs());
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].1, Err(ExecError::UndefinedVariable("x".into())));
    }

    #[test]
    fn test_alloc_write_read() {
        let structs = structs();
        let mut state = ProgramState::new(0);
        state.declare("x", list_ty());
        let mut outcomes = state.alloc(&Path::var("x"), StructId::new(0), &structs);
        let (state, res) = outcomes.pop().unwrap();
        res.unwrap();
        let next = Path::var("x").field("next", 0);
        let outcomes = state.write(&next, Value::Null, &structs);
        let (state, res) = outcomes.into_iter().next().unwrap();
        res.unwrap();
        let outcomes = state.read(&next, &structs);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].1, Ok(Value::Null));
    }

    #[test]
    fn test_null_deref() {
        let structs = structs();
        let mut state = ProgramState::new(0);
        state.declare("x", list_ty());
        state.set("x", Value::Null).unwrap();
        let outcomes = state.read(&Path::var("x").field("next", 0), &structs);
        assert_eq!(outcomes[0].1, Err(ExecError::NullDeref));
    }

    #[test]
    fn test_free_twice() {
        let structs = structs();
        let mut state = ProgramState::new(0);
        state.declare("x", list_ty());
        let (state, _) = state.alloc(&Path::var("x"), StructId::new(0), &structs).remove(0);
        let (state, res) = state.free(&Path::var("x"), &structs).remove(0);
        res.unwrap();
        let loc = state.lookup("x").unwrap().loc().unwrap();
        let (state, res) = state.free(&Path::var("x"), &structs).remove(0);
        assert_eq!(res, Err(ExecError::DoubleFree(loc)));
        let (_, res) = state.read(&Path::var("x").field("next", 0), &structs).remove(0);
        assert_eq!(res, Err(ExecError::UseAfterFree(loc)));
    }

    #[test]
    fn test_free_folded() {
        let structs = structs();
        let mut state = ProgramState::new(0);
        let loc = state.heap.add(Fact::Summary(Summary::full(PredId::List, StructId::new(0), Params::none())));
        state.env.insert(
            "l".into(),
            Binding {
                ty: list_ty(),
                value: Value::Ptr(loc),
            },
        );
        let (_, res) = state.free(&Path::var("l"), &structs).remove(0);
        assert_eq!(res.unwrap_err().kind(), crate::error::ErrorKind::ShapeMismatchError);
    }

    #[test]
    fn test_free_without_cell() {
        let structs = structs();
        let mut state = ProgramState::new(0);
        state.declare("x", list_ty());
        let opaque = state.lookup("x").unwrap().loc().unwrap();
        let (mut state, res) = state.free(&Path::var("x"), &structs).remove(0);
        let err = res.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ShapeMismatchError);
        assert_eq!(err.location(), Some(opaque));

        let set = state.heap.sets.declare("E").unwrap();
        let member = state.heap.add(Fact::Member {
            set,
            ty: StructId::new(0),
        });
        state.set("x", Value::Ptr(member)).unwrap();
        let (state, res) = state.free(&Path::var("x"), &structs).remove(0);
        assert_eq!(res.unwrap_err().kind(), crate::error::ErrorKind::ShapeMismatchError);
        assert!(matches!(state.heap.slot(member), Slot::Member { .. }));

        let mut state = state;
        state.set("x", Value::Null).unwrap();
        let (_, res) = state.free(&Path::var("x"), &structs).remove(0);
        assert_eq!(res, Err(ExecError::NullDeref));
    }

    #[test]
    fn test_compare_unknown_pointers() {
        let structs = structs();
        let mut state = ProgramState::new(0);
        state.declare("x", list_ty());
        state.declare("y", list_ty());
        let cond = Cond::Cmp {
            eq: true,
            lhs: Expr::Path(Path::var("x")),
            rhs: Expr::Path(Path::var("y")),
        };
        // Equal only when both are null.
        let equal = state.clone().assume(&cond, true, &structs);
        assert_eq!(equal.len(), 1);
        let (s, res) = &equal[0];
        res.clone().unwrap();
        assert_eq!(s.lookup("x").unwrap(), Value::Null);
        assert_eq!(s.lookup("y").unwrap(), Value::Null);
        let different = state.assume(&cond, false, &structs);
        assert_eq!(different.len(), 2);
    }

    #[test]
    fn test_and_false_forks() {
        let structs = structs();
        let mut state = ProgramState::new(0);
        state.declare("x", list_ty());
        let cond = Cond::nondet().and(Cond::not_null(Path::var("x")));
        let outcomes = state.assume(&cond, false, &structs);
        // Either the guard is false, or it is true and x is null.
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].0.lookup("x").unwrap(), Value::Null);
    }

    #[test]
    fn test_scalar_reads_are_checked() {
        let structs = structs();
        let mut state = ProgramState::new(0);
        state.declare("x", list_ty());
        state.declare("i", Type::Int);
        state.set("x", Value::Null).unwrap();
        let expr = Expr::Scalar(vec![Path::var("x").field("data", 1)]);
        let (_, res) = state.eval(&expr, &structs).remove(0);
        assert_eq!(res, Err(ExecError::NullDeref));
    }
}
