//! Directive evaluation, diagnostics, and the top-level entry points.
//!
//! [`check_source`] parses a program, lowers it to a control flow graph and
//! explores it with the [`Executor`]. The [`Report`] lists one [`Verdict`]
//! per directive evaluated on a path, and one [`Violation`] per failed path.

use std::fmt;

use log::info;

use crate::ast::{Program, StructDecl, Type};
use crate::cfg::ControlFlowGraph;
use crate::directive::{Directive, ParamBlock};
use crate::error::{ErrorKind, ExecError, LoadError};
use crate::executor::Executor;
use crate::fold;
use crate::heap::{Fact, Params, Summary};
use crate::location::{Loc, Value};
use crate::parser::parse_program;
use crate::state::ProgramState;
use crate::types::{PathId, SetVar, Span, StructId};

/// Configuration for a checker run.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Maximum number of paths to explore.
    pub max_paths: usize,
    /// Maximum number of new shapes one path may record at a loop head.
    pub max_loop_shapes: usize,
    /// Fail the path when a `check_inductive` directive fails.
    pub prune_on_failed_check: bool,
    /// Render the final heap of every completed path in DOT format.
    pub record_heaps: bool,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        CheckerConfig {
            max_paths: 10_000,
            max_loop_shapes: 256,
            prune_on_failed_check: false,
            record_heaps: false,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Outcome {
    Pass,
    Fail(String),
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "PASS"),
            Outcome::Fail(reason) => write!(f, "FAIL ({})", reason),
        }
    }
}

/// Result of one directive on one path.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Verdict {
    pub path: PathId,
    pub span: Span,
    pub directive: Directive,
    pub outcome: Outcome,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path {} at {}: {}: {}", self.path, self.span, self.directive, self.outcome)
    }
}

/// Error that terminated a path.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Violation {
    pub path: PathId,
    pub span: Span,
    pub kind: ErrorKind,
    pub location: Option<Loc>,
    pub message: String,
}

impl Violation {
    pub fn new(path: PathId, span: Span, error: &ExecError) -> Self {
        Violation {
            path,
            span,
            kind: error.kind(),
            location: error.location(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path {} at {}: {}: {}", self.path, self.span, self.kind, self.message)
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Stats {
    /// Paths started, including forks.
    pub explored: usize,
    /// Paths that reached the end of `main`.
    pub completed: usize,
    /// Paths subsumed at a loop head.
    pub merged: usize,
    /// Paths terminated by an error.
    pub failed: usize,
    /// Whether exploration stopped at the path limit.
    pub truncated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub verdicts: Vec<Verdict>,
    pub violations: Vec<Violation>,
    pub stats: Stats,
    /// DOT rendering of the final heap of each completed path, when
    /// [`CheckerConfig::record_heaps`] is set.
    pub heaps: Vec<(PathId, String)>,
}

impl Report {
    /// Whether every directive passed and no path failed.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.verdicts.iter().all(|v| v.outcome.is_pass())
    }

    pub fn failed_verdicts(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter().filter(|v| !v.outcome.is_pass())
    }

    /// Verdicts of the directive at `span`.
    pub fn verdicts_at(&self, span: Span) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter().filter(move |v| v.span == span)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for verdict in &self.verdicts {
            writeln!(f, "{}", verdict)?;
        }
        for violation in &self.violations {
            writeln!(f, "{}", violation)?;
        }
        write!(
            f,
            "{} paths explored, {} completed, {} merged, {} failed",
            self.stats.explored, self.stats.completed, self.stats.merged, self.stats.failed
        )?;
        if self.stats.truncated {
            write!(f, " (truncated)")?;
        }
        Ok(())
    }
}

/// Parse and check a program given as source text.
pub fn check_source(source: &str, config: &CheckerConfig) -> Result<Report, LoadError> {
    let program = parse_program(source)?;
    Ok(check_program(&program, config))
}

/// Explore every path of `program` and evaluate its directives.
pub fn check_program(program: &Program, config: &CheckerConfig) -> Report {
    let cfg = ControlFlowGraph::from_program(program);
    let report = Executor::new(&program.structs, &cfg, config).run();
    info!(
        "checked {} directives on {} paths: {} failed verdicts, {} violations",
        report.verdicts.len(),
        report.stats.explored,
        report.failed_verdicts().count(),
        report.violations.len()
    );
    report
}

/// Evaluate `directive` on `state`.
///
/// Returns the verdict, or an error when the directive names an undefined
/// variable; the path fails in that case.
pub fn eval_directive(
    state: &mut ProgramState,
    directive: &Directive,
    structs: &[StructDecl],
) -> Result<Outcome, ExecError> {
    match directive {
        Directive::DeclSetvars(names) => {
            let mut duplicates = Vec::new();
            for name in names {
                if state.heap.sets.declare(name).is_none() {
                    duplicates.push(name.as_str());
                }
            }
            if duplicates.is_empty() {
                Ok(Outcome::Pass)
            } else {
                Ok(Outcome::Fail(format!("set variable(s) already declared: {}", duplicates.join(", "))))
            }
        }
        Directive::SetAssume { sub, sup } => {
            let sub = set_var(state, sub)?;
            let sup = set_var(state, sup)?;
            state.heap.sets.assume_subset(sub, sup);
            Ok(Outcome::Pass)
        }
        Directive::AddInductive { var, pred, params } => {
            let ty = pointee(state, var)?;
            if pred.def().layout(structs, ty).is_none() {
                return Ok(Outcome::Fail(format!("{} does not describe {}", pred, ty)));
            }
            let params = resolve_params(state, params)?;
            let loc = match state.lookup(var)? {
                Value::Ptr(loc) if state.heap.is_opaque(loc) => loc,
                _ => {
                    let loc = state.heap.fresh();
                    state.set(var, Value::Ptr(loc))?;
                    loc
                }
            };
            state.heap.put(loc, Fact::Summary(Summary::full(*pred, ty, params)));
            Ok(Outcome::Pass)
        }
        Directive::CheckInductive { var, pred, params } => {
            let root = state.lookup(var)?;
            let params = params.as_ref().map(|p| resolve_params(state, p)).transpose()?;
            match fold::check(&mut state.heap, structs, root, *pred, params) {
                Ok(()) => Ok(Outcome::Pass),
                Err(ExecError::ShapeMismatch { reason, .. }) => Ok(Outcome::Fail(reason)),
                Err(e) => Ok(Outcome::Fail(e.to_string())),
            }
        }
        Directive::ForceLive(names) => {
            for name in names {
                if state.lookup(name).is_err() && state.heap.sets.lookup(name).is_none() {
                    return Err(ExecError::UndefinedVariable(name.clone()));
                }
            }
            Ok(Outcome::Pass)
        }
    }
}

fn set_var(state: &ProgramState, name: &str) -> Result<SetVar, ExecError> {
    state
        .heap
        .sets
        .lookup(name)
        .ok_or_else(|| ExecError::UndefinedVariable(name.to_string()))
}

fn pointee(state: &ProgramState, var: &str) -> Result<StructId, ExecError> {
    let binding = state
        .env
        .get(var)
        .ok_or_else(|| ExecError::UndefinedVariable(var.to_string()))?;
    match binding.ty {
        Type::Ptr(id) => Ok(id),
        Type::Int => Err(ExecError::mismatch(None, format!("`{}` is not a pointer", var))),
    }
}

fn resolve_params(state: &ProgramState, block: &ParamBlock) -> Result<Params, ExecError> {
    let ptrs = block
        .ptrs
        .iter()
        .map(|name| match name.as_str() {
            "null" | "NULL" => Ok(Value::Null),
            _ => state.lookup(name),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let sets = block
        .set_args()
        .map(|name| set_var(state, name))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Params::new(ptrs, sets))
}
