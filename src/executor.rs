//! Abstract execution engine.
//!
//! Paths are explored breadth-first, one instruction at a time. Every
//! operation returns the feasible outcomes of a fork; the first keeps the
//! parent's path id, the others receive fresh ids. States arriving at a
//! loop head are widened and compared against the shapes already reached
//! there by any path: a repeated shape ends the path as subsumed. The
//! loop bound counts only the new shapes a path (with its ancestors)
//! recorded at that head.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::{debug, warn};

use crate::ast::{Cond, StructDecl};
use crate::cfg::{BlockId, ControlFlowGraph, Instruction, Terminator};
use crate::checker::{eval_directive, CheckerConfig, Outcome, Report, Verdict, Violation};
use crate::directive::Directive;
use crate::error::ExecError;
use crate::fold::widen;
use crate::location::Value;
use crate::state::{bind, Outcomes, ProgramState};
use crate::types::{PathId, Span, Var};

/// A path waiting in the worklist: its position and its state.
#[derive(Debug)]
struct Frame {
    block: BlockId,
    index: usize,
    state: ProgramState,
    /// New shapes this path recorded at each loop head.
    widened: BTreeMap<BlockId, usize>,
}

pub struct Executor<'a> {
    structs: &'a [StructDecl],
    cfg: &'a ControlFlowGraph,
    config: &'a CheckerConfig,
    /// Canonical shapes reached at each loop head, across all paths.
    shapes: BTreeMap<BlockId, BTreeSet<String>>,
    next_path: PathId,
    report: Report,
}

impl<'a> Executor<'a> {
    pub fn new(structs: &'a [StructDecl], cfg: &'a ControlFlowGraph, config: &'a CheckerConfig) -> Self {
        Executor {
            structs,
            cfg,
            config,
            shapes: BTreeMap::new(),
            next_path: 0,
            report: Report::default(),
        }
    }

    /// Explore all paths from the entry block.
    pub fn run(mut self) -> Report {
        let cfg = self.cfg;
        let mut worklist = VecDeque::new();
        let initial = ProgramState::new(self.fresh_path());
        worklist.push_back(Frame {
            block: cfg.entry,
            index: 0,
            state: initial,
            widened: BTreeMap::new(),
        });

        while let Some(frame) = worklist.pop_front() {
            if self.next_path > self.config.max_paths {
                warn!("Reached maximum path limit ({})", self.config.max_paths);
                self.report.stats.truncated = true;
                break;
            }
            let block = cfg.block(frame.block);
            if let Some((span, instr)) = block.instructions.get(frame.index) {
                let outcomes = self.execute(frame.state, *span, instr);
                for state in self.settle(outcomes, *span) {
                    worklist.push_back(Frame {
                        block: frame.block,
                        index: frame.index + 1,
                        state,
                        widened: frame.widened.clone(),
                    });
                }
                continue;
            }
            match &block.terminator {
                Terminator::Goto(target) => {
                    worklist.extend(self.enter(*target, frame.state, frame.widened));
                }
                Terminator::Branch {
                    cond,
                    span,
                    then_target,
                    else_target,
                } => {
                    let mut outcomes: Outcomes<BlockId> = Vec::new();
                    for (truth, target) in [(true, *then_target), (false, *else_target)] {
                        let taken = frame.state.clone().assume(cond, truth, self.structs);
                        outcomes.extend(bind(taken, |s, ()| s.single(Ok(target))));
                    }
                    self.relabel(&mut outcomes);
                    for (state, res) in outcomes {
                        match res {
                            Ok(target) => worklist.extend(self.enter(target, state, frame.widened.clone())),
                            Err(e) => self.fail(&state, *span, e),
                        }
                    }
                }
                Terminator::Return => {
                    debug!("path {} completed", frame.state.path);
                    self.report.stats.completed += 1;
                    if self.config.record_heaps {
                        self.record_heap(&frame.state);
                    }
                }
            }
        }

        self.report.stats.explored = self.next_path;
        self.report
    }

    fn fresh_path(&mut self) -> PathId {
        let id = self.next_path;
        self.next_path += 1;
        id
    }

    /// The first outcome continues the parent path; the others are new paths.
    fn relabel<T>(&mut self, outcomes: &mut Outcomes<T>) {
        for (state, _) in outcomes.iter_mut().skip(1) {
            let parent = state.path;
            state.path = self.fresh_path();
            debug!("path {} forked from {}", state.path, parent);
        }
    }

    /// Record failed outcomes and return the states that go on.
    fn settle(&mut self, mut outcomes: Outcomes<()>, span: Span) -> Vec<ProgramState> {
        self.relabel(&mut outcomes);
        let mut live = Vec::new();
        for (state, res) in outcomes {
            match res {
                Ok(()) => live.push(state),
                Err(e) => self.fail(&state, span, e),
            }
        }
        live
    }

    fn record_heap(&mut self, state: &ProgramState) {
        let roots: Vec<(&str, Value)> = state.roots().collect();
        match state.heap.to_dot(self.structs, &roots) {
            Ok(dot) => self.report.heaps.push((state.path, dot)),
            Err(e) => warn!("cannot render heap of path {}: {}", state.path, e),
        }
    }

    fn fail(&mut self, state: &ProgramState, span: Span, error: ExecError) {
        debug!("path {} failed at {}: {}", state.path, span, error);
        self.report.violations.push(Violation::new(state.path, span, &error));
        self.report.stats.failed += 1;
    }

    /// Move `state` to the start of `target`, widening at loop heads.
    fn enter(
        &mut self,
        target: BlockId,
        mut state: ProgramState,
        mut widened: BTreeMap<BlockId, usize>,
    ) -> Option<Frame> {
        if self.cfg.is_loop_head(target) {
            let roots: Vec<(Var, Value)> = state.env.iter().map(|(var, b)| (var.clone(), b.value)).collect();
            widen(&mut state.heap, self.structs, &roots);
            let shape = state.shape();
            let seen = self.shapes.entry(target).or_default();
            if seen.contains(&shape) {
                debug!("path {} merged at bb{}", state.path, target);
                self.report.stats.merged += 1;
                return None;
            }
            let count = widened.entry(target).or_default();
            if *count >= self.config.max_loop_shapes {
                let span = match &self.cfg.block(target).terminator {
                    Terminator::Branch { span, .. } => *span,
                    _ => Span::default(),
                };
                self.fail(&state, span, ExecError::LoopBound(self.config.max_loop_shapes));
                return None;
            }
            debug!("path {} reached new shape at bb{}: {}", state.path, target, shape);
            seen.insert(shape);
            *count += 1;
        }
        Some(Frame {
            block: target,
            index: 0,
            state,
            widened,
        })
    }

    fn execute(&mut self, state: ProgramState, span: Span, instr: &Instruction) -> Outcomes<()> {
        let structs = self.structs;
        match instr {
            Instruction::Decl { var, ty } => {
                let mut state = state;
                state.declare(var, *ty);
                state.single(Ok(()))
            }
            Instruction::Assign { lhs, rhs } => state.assign(lhs, rhs, structs),
            Instruction::Alloc { lhs, ty } => state.alloc(lhs, *ty, structs),
            Instruction::Free(path) => state.free(path, structs),
            Instruction::Kill(vars) => {
                let mut state = state;
                state.kill(vars);
                state.single(Ok(()))
            }
            Instruction::Assert(cond) => self.assert(state, cond),
            Instruction::Directive(directive) => self.directive(state, span, directive),
        }
    }

    /// Continue with the states satisfying `cond`; each feasible violation
    /// fails its own path.
    fn assert(&self, state: ProgramState, cond: &Cond) -> Outcomes<()> {
        let structs = self.structs;
        if cond.has_unknown() {
            let mut outcomes = state.single(Ok(()));
            for path in cond.paths() {
                outcomes = bind(outcomes, |s, ()| bind(s.read(path, structs), |s, _| s.single(Ok(()))));
            }
            return outcomes;
        }
        let mut outcomes = state.clone().assume(cond, true, structs);
        // Evaluation errors are the same on both sides; keep them once.
        outcomes.extend(
            state
                .assume(cond, false, structs)
                .into_iter()
                .filter(|(_, res)| res.is_ok())
                .map(|(s, _)| (s, Err(ExecError::Assertion(cond.to_string())))),
        );
        outcomes
    }

    fn directive(&mut self, mut state: ProgramState, span: Span, directive: &Directive) -> Outcomes<()> {
        let result = eval_directive(&mut state, directive, self.structs);
        let outcome = match &result {
            Ok(outcome) => outcome.clone(),
            Err(e) => Outcome::Fail(e.to_string()),
        };
        debug!("path {}: {} -> {}", state.path, directive, outcome);
        self.report.verdicts.push(Verdict {
            path: state.path,
            span,
            directive: directive.clone(),
            outcome,
        });
        let res = match result {
            Ok(Outcome::Fail(reason))
                if self.config.prune_on_failed_check && matches!(directive, Directive::CheckInductive { .. }) =>
            {
                Err(ExecError::mismatch(None, reason))
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        state.single(res)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::error::ErrorKind;
    use crate::parser::parse_program;

    const LIST: &str = "typedef struct elist { struct elist * next; int data; } elist;\ntypedef elist * list;\n";

    fn run(body: &str, config: &CheckerConfig) -> Report {
        let program = parse_program(&format!("{}volatile int cond;\nvoid main() {{\n{}\n}}", LIST, body)).unwrap();
        let cfg = ControlFlowGraph::from_program(&program);
        Executor::new(&program.structs, &cfg, config).run()
    }

    #[test]
    fn test_fork_ids() {
        let report = run("list x = null; if (cond) { x = alloc(elist); } else { }", &CheckerConfig::default());
        assert_eq!(report.stats.explored, 2);
        assert_eq!(report.stats.completed, 2);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn test_list_push_loop_converges() {
        let report = run(
            "list l = null; while (cond) { list c = alloc(elist); c->next = l; l = c; }
             _memcad(\"check_inductive( l, list )\");",
            &CheckerConfig::default(),
        );
        assert!(report.is_clean(), "{}", report);
        assert!(report.stats.merged > 0);
        assert!(!report.verdicts.is_empty());
    }

    #[test]
    fn test_assert_splits_paths() {
        let report = run(
            "list x = null; if (cond) { x = alloc(elist); } assert(x != null); x->data = 1;",
            &CheckerConfig::default(),
        );
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].kind, ErrorKind::AssertionError);
        assert_eq!(report.stats.completed, 1);
    }

    #[test]
    fn test_loop_bound() {
        let config = CheckerConfig {
            max_loop_shapes: 1,
            ..CheckerConfig::default()
        };
        let report = run("list l = null; while (cond) { list c = alloc(elist); c->next = l; l = c; }", &config);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].kind, ErrorKind::LoopBoundError);
        assert_eq!(report.stats.completed, 1);
    }

    #[test]
    fn test_loop_bound_is_per_path() {
        let config = CheckerConfig {
            max_loop_shapes: 3,
            ..CheckerConfig::default()
        };
        let push = "while (cond) { list c = alloc(elist); c->next = l; l = c; }";
        let report = run(&format!("list l = null; {}", push), &config);
        assert!(report.violations.is_empty(), "{}", report);
        // Sibling paths reach other shapes at the same head.
        let report = run(
            &format!("list l = null; list k = null; if (cond) {{ k = alloc(elist); k->next = null; }} {}", push),
            &config,
        );
        assert!(report.violations.is_empty(), "{}", report);
        // Each branch leaves the loop once per shape it recorded.
        assert_eq!(report.stats.completed, 6);
    }

    #[test]
    fn test_record_heaps() {
        let body = "list l = null; if (cond) { l = alloc(elist); l->next = null; }";
        let report = run(body, &CheckerConfig::default());
        assert!(report.heaps.is_empty());
        let config = CheckerConfig {
            record_heaps: true,
            ..CheckerConfig::default()
        };
        let report = run(body, &config);
        assert_eq!(report.heaps.len(), 2);
        assert!(report.heaps.iter().all(|(_, dot)| dot.starts_with("digraph heap {")));
        assert!(report.heaps.iter().any(|(_, dot)| dot.contains("<f0> next")));
    }

    #[test]
    fn test_path_limit() {
        let config = CheckerConfig {
            max_paths: 3,
            ..CheckerConfig::default()
        };
        let report = run(
            "if (cond) { } if (cond) { } if (cond) { } if (cond) { }",
            &config,
        );
        assert!(report.stats.truncated);
    }

    #[test]
    fn test_prune_on_failed_check() {
        let body = "list l; _memcad(\"check_inductive( l, list )\"); l = null;";
        let report = run(body, &CheckerConfig::default());
        assert_eq!(report.failed_verdicts().count(), 1);
        assert!(report.violations.is_empty());
        let config = CheckerConfig {
            prune_on_failed_check: true,
            ..CheckerConfig::default()
        };
        let report = run(body, &config);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].kind, ErrorKind::ShapeMismatchError);
    }
}
