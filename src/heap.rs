//! Symbolic heap: spatial facts over an arena of locations, plus the set
//! constraint store.
//!
//! Each location is in exactly one state:
//!
//! - **opaque**: allocated handle without a fact (unknown contents);
//! - **cell**: explicit record, one value per field;
//! - **summary**: root of a folded predicate instance (or segment);
//! - **member**: non-owning reference to some element of a set variable;
//! - **freed**: tombstone left by `free`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};

use log::debug;

use crate::ast::{StructDecl, Type};
use crate::constraints::SetStore;
use crate::location::{Loc, Value};
use crate::predicate::PredId;
use crate::storage::{Entry, Storage};
use crate::types::{SetVar, StructId};

/// Predicate parameters: pointer values followed by set variables.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct Params {
    pub ptrs: Vec<Value>,
    pub sets: Vec<SetVar>,
}

impl Params {
    pub fn new(ptrs: Vec<Value>, sets: Vec<SetVar>) -> Self {
        Params { ptrs, sets }
    }

    pub fn none() -> Self {
        Params::default()
    }
}

/// End point of a segment: the value where the traversal stops, and the
/// parameters the remainder must be an instance with.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Hole {
    pub at: Value,
    pub params: Params,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Summary {
    pub pred: PredId,
    pub ty: StructId,
    pub params: Params,
    pub hole: Option<Hole>,
}

impl Summary {
    pub fn full(pred: PredId, ty: StructId, params: Params) -> Self {
        Summary {
            pred,
            ty,
            params,
            hole: None,
        }
    }

    pub fn is_segment(&self) -> bool {
        self.hole.is_some()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Cell {
    pub ty: StructId,
    pub fields: Vec<Value>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Fact {
    Cell(Cell),
    Summary(Summary),
    Member { set: SetVar, ty: StructId },
}

impl Fact {
    /// Every value mentioned by the fact.
    pub fn values(&self) -> Vec<Value> {
        match self {
            Fact::Cell(cell) => cell.fields.clone(),
            Fact::Summary(s) => {
                let mut values = s.params.ptrs.clone();
                if let Some(hole) = &s.hole {
                    values.push(hole.at);
                    values.extend(hole.params.ptrs.iter().copied());
                }
                values
            }
            Fact::Member { .. } => Vec::new(),
        }
    }

    pub fn sets(&self) -> Vec<SetVar> {
        match self {
            Fact::Cell(_) => Vec::new(),
            Fact::Summary(s) => {
                let mut sets = s.params.sets.clone();
                if let Some(hole) = &s.hole {
                    sets.extend(hole.params.sets.iter().copied());
                }
                sets
            }
            Fact::Member { set, .. } => vec![*set],
        }
    }

    fn map_values(&mut self, f: impl Fn(Value) -> Value) {
        match self {
            Fact::Cell(cell) => cell.fields.iter_mut().for_each(|v| *v = f(*v)),
            Fact::Summary(s) => {
                s.params.ptrs.iter_mut().for_each(|v| *v = f(*v));
                if let Some(hole) = &mut s.hole {
                    hole.at = f(hole.at);
                    hole.params.ptrs.iter_mut().for_each(|v| *v = f(*v));
                }
            }
            Fact::Member { .. } => {}
        }
    }
}

/// Borrowed view of the state of one location.
#[derive(Debug, Copy, Clone)]
pub enum Slot<'a> {
    Opaque,
    Cell(&'a Cell),
    Summary(&'a Summary),
    Member { set: SetVar, ty: StructId },
    Freed,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolicHeap {
    storage: Storage<Fact>,
    pub sets: SetStore,
}

impl SymbolicHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of locations ever allocated.
    pub fn size(&self) -> usize {
        self.storage.size()
    }

    /// Number of locations currently holding a fact.
    pub fn fact_count(&self) -> usize {
        self.storage.real_size()
    }

    /// Allocate a fresh opaque location.
    pub fn fresh(&mut self) -> Loc {
        Loc::new(self.storage.alloc() as u32)
    }

    pub fn add(&mut self, fact: Fact) -> Loc {
        Loc::new(self.storage.add(fact) as u32)
    }

    /// Allocate an explicit cell whose pointer fields are fresh opaque
    /// locations and whose scalar fields are unknown.
    pub fn alloc_cell(&mut self, ty: StructId, decl: &StructDecl) -> Loc {
        let loc = self.fresh();
        let fields = decl
            .fields
            .iter()
            .map(|f| match f.ty {
                Type::Ptr(_) => Value::Ptr(self.fresh()),
                Type::Int => Value::Int,
            })
            .collect();
        self.put(loc, Fact::Cell(Cell { ty, fields }));
        loc
    }

    pub fn slot(&self, loc: Loc) -> Slot<'_> {
        if loc.index() >= self.storage.size() {
            return Slot::Opaque;
        }
        match self.storage.entry(loc.index()) {
            Entry::Vacant => Slot::Opaque,
            Entry::Tombstone => Slot::Freed,
            Entry::Occupied(Fact::Cell(cell)) => Slot::Cell(cell),
            Entry::Occupied(Fact::Summary(s)) => Slot::Summary(s),
            Entry::Occupied(Fact::Member { set, ty }) => Slot::Member { set: *set, ty: *ty },
        }
    }

    pub fn fact(&self, loc: Loc) -> Option<&Fact> {
        self.storage.value(loc.index())
    }

    pub fn cell(&self, loc: Loc) -> Option<&Cell> {
        match self.fact(loc) {
            Some(Fact::Cell(cell)) => Some(cell),
            _ => None,
        }
    }

    pub fn cell_mut(&mut self, loc: Loc) -> Option<&mut Cell> {
        match self.storage.value_mut(loc.index()) {
            Some(Fact::Cell(cell)) => Some(cell),
            _ => None,
        }
    }

    pub fn summary(&self, loc: Loc) -> Option<&Summary> {
        match self.fact(loc) {
            Some(Fact::Summary(s)) => Some(s),
            _ => None,
        }
    }

    pub fn summary_mut(&mut self, loc: Loc) -> Option<&mut Summary> {
        match self.storage.value_mut(loc.index()) {
            Some(Fact::Summary(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_opaque(&self, loc: Loc) -> bool {
        matches!(self.slot(loc), Slot::Opaque)
    }

    /// Attach a fact to an opaque location.
    pub fn put(&mut self, loc: Loc, fact: Fact) {
        self.storage.put(loc.index(), fact);
    }

    /// Detach the fact at `loc`, leaving the location opaque.
    pub fn take(&mut self, loc: Loc) -> Option<Fact> {
        self.storage.take(loc.index())
    }

    /// Tombstone `loc`, returning its former fact.
    pub fn release(&mut self, loc: Loc) -> Option<Fact> {
        self.storage.drop(loc.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Loc, &Fact)> {
        self.storage.iter().map(|(i, fact)| (Loc::new(i as u32), fact))
    }

    /// Whether any fact mentions `loc`.
    pub fn is_referenced(&self, loc: Loc) -> bool {
        self.iter().any(|(_, fact)| fact.values().contains(&Value::Ptr(loc)))
    }

    /// Replace every occurrence of location `from` by `to`.
    pub fn substitute(&mut self, from: Loc, to: Value) {
        for (_, fact) in self.storage.iter_mut() {
            fact.map_values(|v| v.substituted(from, to));
        }
        self.sets.substitute_loc(from, to);
    }

    pub fn resolve_params(&self, params: &Params) -> Params {
        Params {
            ptrs: params.ptrs.clone(),
            sets: params.sets.iter().map(|&s| self.sets.resolve(s)).collect(),
        }
    }

    /// Locations reachable from the given values through facts.
    pub fn reachable(&self, roots: impl IntoIterator<Item = Value>) -> BTreeSet<Loc> {
        let mut visited = BTreeSet::new();
        let mut stack: Vec<Loc> = roots.into_iter().filter_map(Value::loc).collect();
        while let Some(loc) = stack.pop() {
            if !visited.insert(loc) {
                continue;
            }
            if let Some(fact) = self.fact(loc) {
                stack.extend(fact.values().into_iter().filter_map(Value::loc));
            }
        }
        visited
    }

    /// Drop facts, tombstones and constraints unreachable from `roots`.
    pub fn collect_garbage(&mut self, roots: impl IntoIterator<Item = Value>) {
        let live = self.reachable(roots);
        let mut removed = 0;
        for index in 0..self.storage.size() {
            let loc = Loc::new(index as u32);
            if !live.contains(&loc) && !matches!(self.storage.entry(index), Entry::Vacant) {
                self.storage.clear(index);
                removed += 1;
            }
        }
        let live_sets: BTreeSet<SetVar> = self.iter().flat_map(|(_, fact)| fact.sets()).collect();
        self.sets.retain(&live_sets, &live);
        if removed > 0 {
            debug!("gc: removed {} unreachable locations", removed);
        }
    }

    /// Render the part of the heap reachable from the given variables with
    /// locations and fresh set variables renamed in traversal order.
    ///
    /// Two heaps that are equal up to such a renaming get the same string.
    pub fn canonical<'a>(&self, roots: impl IntoIterator<Item = (&'a str, Value)>) -> String {
        let mut namer = Namer::new(self);
        let mut out = String::new();
        for (var, value) in roots {
            let name = namer.value(value);
            let _ = write!(out, "{}={} ", var, name);
        }
        let mut i = 0;
        while i < namer.order.len() {
            let loc = namer.order[i];
            let desc = namer.slot(loc);
            let _ = write!(out, "| #{}: {} ", i, desc);
            i += 1;
        }
        let constraints = self.sets.render(
            |v| {
                self.sets
                    .name_of(v)
                    .map(str::to_string)
                    .or_else(|| namer.sets.get(&v).cloned())
            },
            |l| namer.locs.get(&l).map(|i| format!("#{}", i)),
        );
        let _ = write!(out, "| {}", constraints.join(", "));
        out
    }
}

/// Traversal-order renaming of locations and set variables.
struct Namer<'a> {
    heap: &'a SymbolicHeap,
    locs: BTreeMap<Loc, usize>,
    order: Vec<Loc>,
    sets: BTreeMap<SetVar, String>,
}

impl<'a> Namer<'a> {
    fn new(heap: &'a SymbolicHeap) -> Self {
        Namer {
            heap,
            locs: BTreeMap::new(),
            order: Vec::new(),
            sets: BTreeMap::new(),
        }
    }

    fn value(&mut self, value: Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Int => "int".to_string(),
            Value::Ptr(loc) => {
                let next = self.order.len();
                let index = *self.locs.entry(loc).or_insert_with(|| next);
                if index == next {
                    self.order.push(loc);
                }
                format!("#{}", index)
            }
        }
    }

    fn set(&mut self, var: SetVar) -> String {
        let var = self.heap.sets.resolve(var);
        if let Some(name) = self.heap.sets.name_of(var) {
            return name.to_string();
        }
        let next = self.sets.len();
        self.sets.entry(var).or_insert_with(|| format!("?{}", next)).clone()
    }

    fn params(&mut self, params: &Params) -> String {
        let ptrs: Vec<String> = params.ptrs.iter().map(|&v| self.value(v)).collect();
        let sets: Vec<String> = params.sets.iter().map(|&s| self.set(s)).collect();
        format!("[{}|{}]", ptrs.join(","), sets.join(","))
    }

    fn slot(&mut self, loc: Loc) -> String {
        let heap = self.heap;
        match heap.slot(loc) {
            Slot::Opaque => "opaque".to_string(),
            Slot::Freed => "freed".to_string(),
            Slot::Member { set, ty } => format!("member {} of {}", ty, self.set(set)),
            Slot::Cell(cell) => {
                let fields: Vec<String> = cell.fields.iter().map(|&v| self.value(v)).collect();
                format!("{}{{{}}}", cell.ty, fields.join(","))
            }
            Slot::Summary(s) => {
                let mut desc = format!("{}:{}{}", s.pred, s.ty, self.params(&s.params));
                if let Some(hole) = &s.hole {
                    let at = self.value(hole.at);
                    let params = self.params(&hole.params);
                    let _ = write!(desc, " ~> {}{}", at, params);
                }
                desc
            }
        }
    }
}

impl fmt::Display for SymbolicHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (loc, fact) in self.iter() {
            match fact {
                Fact::Cell(cell) => {
                    write!(f, "{} |-> {}(", loc, cell.ty)?;
                    for (i, v) in cell.fields.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", v)?;
                    }
                    writeln!(f, ")")?;
                }
                Fact::Summary(s) => {
                    write!(f, "{}({}", s.pred, loc)?;
                    for p in &s.params.ptrs {
                        write!(f, ", {}", p)?;
                    }
                    for p in &s.params.sets {
                        write!(f, ", {}", p)?;
                    }
                    write!(f, ")")?;
                    if let Some(hole) = &s.hole {
                        write!(f, " * hole({})", hole.at)?;
                    }
                    writeln!(f)?;
                }
                Fact::Member { set, ty } => writeln!(f, "{} in {} : {}", loc, set, ty)?,
            }
        }
        writeln!(f, "sets: {}", self.sets)
    }
}
