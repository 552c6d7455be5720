//! Set-variable constraint store.
//!
//! Set variables describe the node and edge-target sets of the graph
//! predicates. The store records:
//!
//! - `Subset(a, b)`: every element of `a` is in `b`;
//! - `Split(whole, elem, rest)`: `whole = {elem} ⊎ rest`, so `rest ⊆ whole`;
//! - `Empty(s)`: `s` has no elements;
//! - aliases between set variables, as a union-find forest.
//!
//! Fresh variables without any constraint may be unified with any other
//! variable, which is how parameters inferred during folding get bound.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::location::{Loc, Value};
use crate::types::SetVar;

/// `whole = {elem} ⊎ rest`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Split {
    pub whole: SetVar,
    pub elem: Loc,
    pub rest: SetVar,
}

#[derive(Debug, Clone, Default)]
pub struct SetStore {
    /// Declared (user-visible) set variables.
    names: BTreeMap<String, SetVar>,
    /// Union-find parent of each set variable; roots are their own parent.
    parent: Vec<SetVar>,
    subsets: BTreeSet<(SetVar, SetVar)>,
    splits: Vec<Split>,
    empty: BTreeSet<SetVar>,
}

impl SetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> SetVar {
        let var = SetVar::new(self.parent.len() as u32);
        self.parent.push(var);
        var
    }

    /// Declare a named set variable. Returns `None` if the name is taken.
    pub fn declare(&mut self, name: &str) -> Option<SetVar> {
        if self.names.contains_key(name) {
            return None;
        }
        let var = self.fresh();
        self.names.insert(name.to_string(), var);
        Some(var)
    }

    pub fn lookup(&self, name: &str) -> Option<SetVar> {
        self.names.get(name).map(|&v| self.resolve(v))
    }

    pub fn name_of(&self, var: SetVar) -> Option<&str> {
        let var = self.resolve(var);
        self.names
            .iter()
            .find(|(_, &v)| self.resolve(v) == var)
            .map(|(name, _)| name.as_str())
    }

    /// User-facing name of `var`: its declared name, or its id for
    /// variables created by unfolding.
    pub fn describe(&self, var: SetVar) -> String {
        match self.name_of(var) {
            Some(name) => name.to_string(),
            None => self.resolve(var).to_string(),
        }
    }

    pub fn is_declared(&self, var: SetVar) -> bool {
        let var = self.resolve(var);
        self.names.values().any(|&v| self.resolve(v) == var)
    }

    /// Representative of the alias class of `var`.
    pub fn resolve(&self, var: SetVar) -> SetVar {
        let mut current = var;
        while let Some(&next) = self.parent.get(current.index()) {
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    pub fn assume_subset(&mut self, sub: SetVar, sup: SetVar) {
        let (sub, sup) = (self.resolve(sub), self.resolve(sup));
        if sub != sup {
            self.subsets.insert((sub, sup));
        }
    }

    /// Whether `sub ⊆ sup` follows from the recorded constraints.
    pub fn is_subset(&self, sub: SetVar, sup: SetVar) -> bool {
        let (sub, sup) = (self.resolve(sub), self.resolve(sup));
        if sub == sup || self.is_known_empty(sub) {
            return true;
        }
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([sub]);
        while let Some(current) = queue.pop_front() {
            if current == sup {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            for &(a, b) in &self.subsets {
                if self.resolve(a) == current {
                    queue.push_back(self.resolve(b));
                }
            }
            for split in &self.splits {
                if self.resolve(split.rest) == current {
                    queue.push_back(self.resolve(split.whole));
                }
            }
        }
        false
    }

    /// The rest of `whole` once `elem` is taken out, if already split.
    pub fn split_of(&self, whole: SetVar, elem: Loc) -> Option<SetVar> {
        let whole = self.resolve(whole);
        self.splits
            .iter()
            .find(|s| s.elem == elem && self.resolve(s.whole) == whole)
            .map(|s| self.resolve(s.rest))
    }

    /// The set that was split on `elem`, if any.
    pub fn whole_of(&self, elem: Loc) -> Option<SetVar> {
        self.splits
            .iter()
            .find(|s| s.elem == elem)
            .map(|s| self.resolve(s.whole))
    }

    /// Record `whole = {elem} ⊎ rest`. Returns `false` if `whole` is known empty.
    pub fn add_split(&mut self, whole: SetVar, elem: Loc, rest: SetVar) -> bool {
        if self.is_known_empty(whole) {
            return false;
        }
        let split = Split {
            whole: self.resolve(whole),
            elem,
            rest: self.resolve(rest),
        };
        if !self.splits.contains(&split) {
            self.splits.push(split);
        }
        true
    }

    /// Whether `loc` is known to be an element of `set`.
    pub fn contains(&self, set: SetVar, loc: Loc) -> bool {
        self.splits
            .iter()
            .any(|s| s.elem == loc && self.is_subset(s.whole, set))
    }

    pub fn is_known_empty(&self, var: SetVar) -> bool {
        let var = self.resolve(var);
        self.empty.iter().any(|&e| {
            let e = self.resolve(e);
            e == var || self.subsets.iter().any(|&(a, b)| self.resolve(a) == var && self.resolve(b) == e)
        })
    }

    /// Record `var = ∅`. Returns `false` if `var` is known to hold an element.
    pub fn set_empty(&mut self, var: SetVar) -> bool {
        let var = self.resolve(var);
        let inhabited = self.splits.iter().any(|s| self.is_subset(s.whole, var));
        if inhabited {
            return false;
        }
        self.empty.insert(var);
        true
    }

    /// Whether `var` is a fresh variable that no constraint mentions yet.
    pub fn is_unconstrained(&self, var: SetVar) -> bool {
        let var = self.resolve(var);
        !self.is_declared(var)
            && !self.empty.iter().any(|&e| self.resolve(e) == var)
            && !self
                .subsets
                .iter()
                .any(|&(a, b)| self.resolve(a) == var || self.resolve(b) == var)
            && !self
                .splits
                .iter()
                .any(|s| self.resolve(s.whole) == var || self.resolve(s.rest) == var)
    }

    /// Make `a` and `b` the same variable if one of them is unconstrained.
    pub fn unify(&mut self, a: SetVar, b: SetVar) -> bool {
        let (a, b) = (self.resolve(a), self.resolve(b));
        if a == b {
            true
        } else if self.is_unconstrained(a) {
            self.parent[a.index()] = b;
            true
        } else if self.is_unconstrained(b) {
            self.parent[b.index()] = a;
            true
        } else {
            false
        }
    }

    /// Assume `a = b`: unify when possible, otherwise record mutual inclusion.
    pub fn equate(&mut self, a: SetVar, b: SetVar) {
        if !self.unify(a, b) {
            self.assume_subset(a, b);
            self.assume_subset(b, a);
        }
    }

    /// Replace location `from` in split elements; splits on a location that
    /// became null are dropped.
    pub fn substitute_loc(&mut self, from: Loc, to: Value) {
        self.splits.retain_mut(|s| {
            if s.elem != from {
                return true;
            }
            match to {
                Value::Ptr(loc) => {
                    s.elem = loc;
                    true
                }
                _ => false,
            }
        });
    }

    /// Forget everything about dead set variables and locations.
    ///
    /// Declared variables are always live. Inclusions between live variables
    /// that only followed through dead ones are kept as direct subset facts.
    pub fn retain(&mut self, live_sets: &BTreeSet<SetVar>, live_locs: &BTreeSet<Loc>) {
        let mut live: BTreeSet<SetVar> = live_sets.iter().map(|&v| self.resolve(v)).collect();
        live.extend(self.names.values().map(|&v| self.resolve(v)));

        let mut subsets = BTreeSet::new();
        for &a in &live {
            for &b in &live {
                if a != b && self.is_subset(a, b) {
                    subsets.insert((a, b));
                }
            }
        }

        let splits: Vec<Split> = self
            .splits
            .iter()
            .map(|s| Split {
                whole: self.resolve(s.whole),
                elem: s.elem,
                rest: self.resolve(s.rest),
            })
            .filter(|s| live_locs.contains(&s.elem) && live.contains(&s.whole) && live.contains(&s.rest))
            .collect();

        let empty = self
            .empty
            .iter()
            .map(|&e| self.resolve(e))
            .filter(|e| live.contains(e))
            .collect();

        self.subsets = subsets;
        self.splits = splits;
        self.empty = empty;
    }

    /// Render all constraints whose variables and locations have a name,
    /// in sorted order.
    pub fn render(
        &self,
        set_name: impl Fn(SetVar) -> Option<String>,
        loc_name: impl Fn(Loc) -> Option<String>,
    ) -> Vec<String> {
        let name = |v: SetVar| set_name(self.resolve(v));
        let mut lines = Vec::new();
        for &(a, b) in &self.subsets {
            if let (Some(a), Some(b)) = (name(a), name(b)) {
                lines.push(format!("{} <= {}", a, b));
            }
        }
        for s in &self.splits {
            if let (Some(w), Some(e), Some(r)) = (name(s.whole), loc_name(s.elem), name(s.rest)) {
                lines.push(format!("{} = {{{}}} + {}", w, e, r));
            }
        }
        for &e in &self.empty {
            if let Some(e) = name(e) {
                lines.push(format!("{} = {{}}", e));
            }
        }
        lines.sort();
        lines.dedup();
        lines
    }
}

impl fmt::Display for SetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self.render(
            |v| Some(self.name_of(v).map_or_else(|| v.to_string(), str::to_string)),
            |loc| Some(loc.to_string()),
        );
        write!(f, "{{{}}}", lines.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_declare_twice() {
        let mut store = SetStore::new();
        let e = store.declare("E").unwrap();
        assert!(store.declare("E").is_none());
        assert_eq!(store.lookup("E"), Some(e));
        assert_eq!(store.name_of(e), Some("E"));
        assert!(store.lookup("F").is_none());
    }

    #[test]
    fn test_subset_through_split() {
        let mut store = SetStore::new();
        let e = store.declare("E").unwrap();
        let f = store.declare("F").unwrap();
        store.assume_subset(f, e);
        let rest = store.fresh();
        assert!(store.add_split(f, Loc::new(0), rest));
        assert!(store.is_subset(rest, f));
        assert!(store.is_subset(rest, e));
        assert!(!store.is_subset(e, f));
        assert_eq!(store.split_of(f, Loc::new(0)), Some(rest));
        assert!(store.contains(e, Loc::new(0)));
        assert!(!store.contains(rest, Loc::new(0)));
    }

    #[test]
    fn test_empty_conflicts_with_split() {
        let mut store = SetStore::new();
        let f = store.declare("F").unwrap();
        let rest = store.fresh();
        store.add_split(f, Loc::new(3), rest);
        assert!(!store.set_empty(f));
        assert!(store.set_empty(rest));
        assert!(store.is_known_empty(rest));
        let g = store.declare("G").unwrap();
        assert!(store.set_empty(g));
        let other = store.fresh();
        assert!(!store.add_split(g, Loc::new(4), other));
    }

    #[test]
    fn test_describe_uses_declared_names() {
        let mut store = SetStore::new();
        let e = store.declare("E").unwrap();
        let x = store.fresh();
        assert_eq!(store.describe(e), "E");
        assert_eq!(store.describe(x), x.to_string());
        assert!(store.unify(x, e));
        assert_eq!(store.describe(x), "E");
    }

    #[test]
    fn test_unify_only_unconstrained() {
        let mut store = SetStore::new();
        let e = store.declare("E").unwrap();
        let f = store.declare("F").unwrap();
        let x = store.fresh();
        assert!(store.is_unconstrained(x));
        assert!(store.unify(x, e));
        assert_eq!(store.resolve(x), e);
        assert!(!store.unify(e, f));
        store.equate(e, f);
        assert!(store.is_subset(e, f) && store.is_subset(f, e));
    }

    #[test]
    fn test_retain_keeps_derived_inclusions() {
        let mut store = SetStore::new();
        let e = store.declare("E").unwrap();
        let mid = store.fresh();
        let low = store.fresh();
        store.assume_subset(low, mid);
        store.assume_subset(mid, e);
        store.add_split(mid, Loc::new(1), low);
        store.retain(&BTreeSet::from([low]), &BTreeSet::new());
        assert!(store.is_subset(low, e));
        let rendered = store.render(|v| Some(v.to_string()), |l| Some(l.to_string()));
        assert_eq!(rendered, vec![format!("{} <= {}", low, e)]);
    }

    #[test]
    fn test_substitute_loc() {
        let mut store = SetStore::new();
        let f = store.declare("F").unwrap();
        let rest = store.fresh();
        store.add_split(f, Loc::new(1), rest);
        store.substitute_loc(Loc::new(1), Value::Ptr(Loc::new(2)));
        assert_eq!(store.split_of(f, Loc::new(2)), Some(rest));
        store.substitute_loc(Loc::new(2), Value::Null);
        assert_eq!(store.split_of(f, Loc::new(2)), None);
    }
}
