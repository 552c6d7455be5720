use test_log::test;

use shape_rs::checker::{check_source, CheckerConfig, Outcome, Report};
use shape_rs::error::ErrorKind;

const LIST_PUSH: &str = include_str!("../bench/list-push.c");
const GRAPH: &str = include_str!("../bench/graph-10.c");
const TREE: &str = include_str!("../bench/tree-p-19.c");

const LIST_DECLS: &str = "
typedef struct elist { struct elist * next; int data; } elist;
typedef elist * list;
volatile int cond;
";

fn check(source: &str) -> Report {
    match check_source(source, &CheckerConfig::default()) {
        Ok(report) => report,
        Err(e) => panic!("failed to load program: {}", e),
    }
}

fn check_list(body: &str) -> Report {
    check(&format!("{}void main() {{\n{}\n}}\n", LIST_DECLS, body))
}

fn kinds(report: &Report) -> Vec<ErrorKind> {
    report.violations.iter().map(|v| v.kind).collect()
}

#[test]
fn test_list_push_scenario() {
    let report = check(LIST_PUSH);
    assert!(report.is_clean(), "{}", report);
    assert!(!report.verdicts.is_empty());
    assert!(!report.stats.truncated);
    assert!(report.stats.completed > 0);
}

#[test]
fn test_graph_traversal_scenario() {
    let report = check(GRAPH);
    assert!(report.is_clean(), "{}", report);
    let checks: Vec<_> = report.verdicts.iter().filter(|v| v.span.line == 39).collect();
    assert!(!checks.is_empty());
    assert!(checks.iter().all(|v| v.outcome.is_pass()));
}

#[test]
fn test_failure_reason_names_sets() {
    let source = "
typedef struct edge { struct edge * next; struct node * dest; } edge;
typedef struct node { struct node * next; struct edge * edges; int data; } node;
typedef node * lnode;
void main() {
  lnode l;
  _memcad( \"decl_setvars( E, F )\" );
  _memcad( \"set_assume( F $sub E )\" );
  _memcad( \"add_inductive( l, graphc, [ | | F, E ] )\" );
  _memcad( \"check_inductive( l, graphc, [ | | E, F ] )\" );
}
";
    let report = check(source);
    let failed: Vec<_> = report.failed_verdicts().collect();
    assert_eq!(failed.len(), 1);
    let reason = match &failed[0].outcome {
        Outcome::Fail(reason) => reason,
        Outcome::Pass => unreachable!(),
    };
    assert!(reason.contains("differs from"), "{}", reason);
    assert!(reason.contains('E') && reason.contains('F'), "{}", reason);
    assert!(!reason.contains("S0") && !reason.contains("S1"), "{}", reason);
}

#[test]
fn test_tree_leaf_removal_scenario() {
    let report = check(TREE);
    assert!(report.is_clean(), "{}", report);
    assert!(report.verdicts.iter().any(|v| v.span.line == 42));
    assert!(report.stats.merged > 0);
}

#[test]
fn test_branches_are_independent() {
    let report = check_list(
        "list x = malloc(sizeof(elist));
         x->next = null;
         if (cond) { free(x); }
         x->data = 1;
         _memcad(\"check_inductive( x, list )\");",
    );
    assert_eq!(kinds(&report), vec![ErrorKind::UseAfterFreeError]);
    // The path that kept `x` finishes and passes its check.
    assert_eq!(report.stats.completed, 1);
    assert_eq!(report.verdicts.len(), 1);
    assert!(report.verdicts[0].outcome.is_pass());
}

#[test]
fn test_double_free() {
    let report = check_list("list x = malloc(sizeof(elist)); free(x); free(x);");
    assert_eq!(kinds(&report), vec![ErrorKind::DoubleFreeError]);
    assert_eq!(report.violations[0].span.line, 6);
}

#[test]
fn test_null_dereference() {
    let report = check_list("list x = null; x->next = null;");
    assert_eq!(kinds(&report), vec![ErrorKind::NullDerefError]);
    assert_eq!(report.stats.completed, 0);
}

#[test]
fn test_free_null() {
    let report = check_list("list x = null; free(x);");
    assert_eq!(kinds(&report), vec![ErrorKind::NullDerefError]);
    assert_eq!(report.stats.completed, 0);
}

#[test]
fn test_unguarded_summary_dereference() {
    let report = check_list(
        "list l;
         _memcad(\"add_inductive( l, list )\");
         l->data = 1;",
    );
    // The list may be empty.
    assert_eq!(kinds(&report), vec![ErrorKind::NullDerefError]);
    assert_eq!(report.stats.completed, 1);

    let report = check_list(
        "list l;
         _memcad(\"add_inductive( l, list )\");
         if (l != null) { l->data = 1; }
         _memcad(\"check_inductive( l, list )\");",
    );
    assert!(report.is_clean(), "{}", report);
}

#[test]
fn test_unfold_then_fold_is_idempotent() {
    let source = "
typedef struct etree { struct etree * l; struct etree * r; struct etree * p; int data; } etree;
typedef etree * tree;
void main() {
  tree t;
  tree c;
  _memcad( \"add_inductive( t, bintreep_o, [ null | | ] )\" );
  if (t != null) {
    c = t->l;
    if (c != null) {
      c = c->r;
    }
  }
  _memcad( \"check_inductive( t, bintreep_o, [ null | | ] )\" );
}
";
    let report = check(source);
    assert!(report.is_clean(), "{}", report);
    assert!(report.verdicts.len() >= 3);
}

#[test]
fn test_unfolded_cells_are_disjoint() {
    let report = check_list(
        "list l;
         list k;
         _memcad(\"add_inductive( l, list )\");
         if (l != null) {
           k = l->next;
           if (k != null) {
             assert(k != l);
             k->data = 1;
             assert(l->next == k);
           }
         }
         _memcad(\"check_inductive( l, list )\");",
    );
    assert!(report.is_clean(), "{}", report);
    assert_eq!(report.stats.completed, 3);
}

#[test]
fn test_unsupported_array() {
    let source = "
typedef struct elist { struct elist * next; int data; } elist;
typedef elist * list;
void main() {
  int i;
  elist t[10];
  list l;
  l = null;
  i = 0;
  while (i < 10) {
    t[i].next = l;
    l = &t[i];
    i = i + 1;
  }
  _memcad( \"check_inductive( l, list )\" );
}
";
    let err = check_source(source, &CheckerConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedConstruct);
    assert_eq!(err.span().line, 6);
}

#[test]
fn test_syntax_error() {
    let err = check_source("void main() { int x; x = ; }", &CheckerConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
}
