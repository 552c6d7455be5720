//! Program model for the supported C subset.
//!
//! The language supports:
//! - Structure declarations with pointer and scalar fields
//! - Pointer and scalar variables, with block scoping
//! - Assignments through `->` field chains, allocation and `free`
//! - Conditionals and loops over pointer tests or nondeterministic guards
//! - Shape directives and assertions

use std::fmt;

use crate::directive::Directive;
use crate::types::{Span, StructId, Var};

/// Type of a variable or a field.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Type {
    /// Scalar, abstracted away.
    Int,
    /// Pointer to a structure.
    Ptr(StructId),
}

impl Type {
    pub fn pointee(self) -> Option<StructId> {
        match self {
            Type::Ptr(id) => Some(id),
            Type::Int => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: Type,
}

/// Structure declaration: a named, ordered field set.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

impl StructDecl {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDecl>) -> Self {
        StructDecl {
            name: name.into(),
            fields,
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_type(&self, name: &str) -> Option<Type> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.ty)
    }
}

/// One `->f` step of an access path, resolved against the structure it reads.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Field {
    pub name: String,
    pub index: usize,
}

/// Access path `x->f->g`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Path {
    pub var: Var,
    pub fields: Vec<Field>,
}

impl Path {
    pub fn var(name: impl Into<String>) -> Self {
        Path {
            var: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, index: usize) -> Self {
        self.fields.push(Field {
            name: name.into(),
            index,
        });
        self
    }

    /// Path without its last field, and that last field.
    pub fn split_last(&self) -> Option<(Path, &Field)> {
        let (last, init) = self.fields.split_last()?;
        Some((
            Path {
                var: self.var.clone(),
                fields: init.to_vec(),
            },
            last,
        ))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.var)?;
        for field in &self.fields {
            write!(f, "->{}", field.name)?;
        }
        Ok(())
    }
}

/// Right-hand side of an assignment.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Expr {
    Null,
    Path(Path),
    /// Scalar computation; the listed paths are read (and dereferenced) but
    /// the resulting number is not tracked.
    Scalar(Vec<Path>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Null => write!(f, "null"),
            Expr::Path(p) => write!(f, "{}", p),
            Expr::Scalar(paths) if paths.is_empty() => write!(f, "<int>"),
            Expr::Scalar(paths) => {
                write!(f, "<int:")?;
                for p in paths {
                    write!(f, " {}", p)?;
                }
                write!(f, ">")
            }
        }
    }
}

/// Branch condition.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Cond {
    /// Unknown outcome: nondeterministic guard or numeric test.
    /// The listed paths are still read for memory safety.
    Unknown(Vec<Path>),
    /// Pointer comparison: `lhs == rhs` when `eq`, else `lhs != rhs`.
    Cmp { eq: bool, lhs: Expr, rhs: Expr },
    Not(Box<Cond>),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
}

impl Cond {
    pub fn nondet() -> Self {
        Cond::Unknown(Vec::new())
    }

    pub fn is_null(path: Path) -> Self {
        Cond::Cmp {
            eq: true,
            lhs: Expr::Path(path),
            rhs: Expr::Null,
        }
    }

    pub fn not_null(path: Path) -> Self {
        Cond::Cmp {
            eq: false,
            lhs: Expr::Path(path),
            rhs: Expr::Null,
        }
    }

    pub fn and(self, other: Cond) -> Self {
        Cond::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Cond) -> Self {
        Cond::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Cond::Not(Box::new(self))
    }

    /// Whether the outcome depends on a scalar or nondeterministic test.
    pub fn has_unknown(&self) -> bool {
        match self {
            Cond::Unknown(_) => true,
            Cond::Cmp { .. } => false,
            Cond::Not(c) => c.has_unknown(),
            Cond::And(l, r) | Cond::Or(l, r) => l.has_unknown() || r.has_unknown(),
        }
    }

    /// Access paths read when evaluating the condition, left to right.
    pub fn paths(&self) -> Vec<&Path> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a Path>) {
        match self {
            Cond::Unknown(paths) => out.extend(paths),
            Cond::Cmp { lhs, rhs, .. } => {
                for e in [lhs, rhs] {
                    match e {
                        Expr::Null => {}
                        Expr::Path(p) => out.push(p),
                        Expr::Scalar(paths) => out.extend(paths),
                    }
                }
            }
            Cond::Not(c) => c.collect_paths(out),
            Cond::And(l, r) | Cond::Or(l, r) => {
                l.collect_paths(out);
                r.collect_paths(out);
            }
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cond::Unknown(_) => write!(f, "*"),
            Cond::Cmp { eq, lhs, rhs } => {
                write!(f, "{} {} {}", lhs, if *eq { "==" } else { "!=" }, rhs)
            }
            Cond::Not(c) => write!(f, "!({})", c),
            Cond::And(l, r) => write!(f, "({} && {})", l, r),
            Cond::Or(l, r) => write!(f, "({} || {})", l, r),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StmtKind {
    /// Variable declaration; pointers start out pointing to an unknown location.
    Decl { var: Var, ty: Type, init: Option<Expr> },
    /// `lhs = rhs`, where `lhs` is a variable or a field.
    Assign { lhs: Path, rhs: Expr },
    /// `lhs = alloc(ty)`.
    Alloc { lhs: Path, ty: StructId },
    Free(Path),
    If {
        cond: Cond,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While { cond: Cond, body: Vec<Stmt> },
    /// Nested `{ ... }` scope.
    Block(Vec<Stmt>),
    Assert(Cond),
    Directive(Directive),
    /// Leave `main`.
    Return,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

// Constructors
impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Stmt {
            kind,
            span: Span::default(),
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn decl(var: impl Into<String>, ty: Type) -> Self {
        Stmt::new(StmtKind::Decl {
            var: var.into(),
            ty,
            init: None,
        })
    }

    pub fn assign(lhs: Path, rhs: Expr) -> Self {
        Stmt::new(StmtKind::Assign { lhs, rhs })
    }

    pub fn alloc(lhs: Path, ty: StructId) -> Self {
        Stmt::new(StmtKind::Alloc { lhs, ty })
    }

    pub fn free(path: Path) -> Self {
        Stmt::new(StmtKind::Free(path))
    }

    pub fn if_then_else(cond: Cond, then_body: Vec<Stmt>, else_body: Vec<Stmt>) -> Self {
        Stmt::new(StmtKind::If {
            cond,
            then_body,
            else_body,
        })
    }

    pub fn if_then(cond: Cond, then_body: Vec<Stmt>) -> Self {
        Stmt::if_then_else(cond, then_body, vec![])
    }

    pub fn while_do(cond: Cond, body: Vec<Stmt>) -> Self {
        Stmt::new(StmtKind::While { cond, body })
    }

    pub fn block(body: Vec<Stmt>) -> Self {
        Stmt::new(StmtKind::Block(body))
    }

    pub fn assert(cond: Cond) -> Self {
        Stmt::new(StmtKind::Assert(cond))
    }

    pub fn directive(directive: Directive) -> Self {
        Stmt::new(StmtKind::Directive(directive))
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indent(f, 0)
    }
}

impl Stmt {
    fn fmt_indent(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let ind = "  ".repeat(indent);
        match &self.kind {
            StmtKind::Decl { var, init: Some(e), .. } => writeln!(f, "{}decl {} = {};", ind, var, e),
            StmtKind::Decl { var, .. } => writeln!(f, "{}decl {};", ind, var),
            StmtKind::Assign { lhs, rhs } => writeln!(f, "{}{} = {};", ind, lhs, rhs),
            StmtKind::Alloc { lhs, ty } => writeln!(f, "{}{} = alloc({});", ind, lhs, ty),
            StmtKind::Free(p) => writeln!(f, "{}free({});", ind, p),
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                writeln!(f, "{}if ({}) {{", ind, cond)?;
                for stmt in then_body {
                    stmt.fmt_indent(f, indent + 1)?;
                }
                if !else_body.is_empty() {
                    writeln!(f, "{}}} else {{", ind)?;
                    for stmt in else_body {
                        stmt.fmt_indent(f, indent + 1)?;
                    }
                }
                writeln!(f, "{}}}", ind)
            }
            StmtKind::While { cond, body } => {
                writeln!(f, "{}while ({}) {{", ind, cond)?;
                for stmt in body {
                    stmt.fmt_indent(f, indent + 1)?;
                }
                writeln!(f, "{}}}", ind)
            }
            StmtKind::Block(body) => {
                writeln!(f, "{}{{", ind)?;
                for stmt in body {
                    stmt.fmt_indent(f, indent + 1)?;
                }
                writeln!(f, "{}}}", ind)
            }
            StmtKind::Assert(c) => writeln!(f, "{}assert({});", ind, c),
            StmtKind::Return => writeln!(f, "{}return;", ind),
            StmtKind::Directive(d) => writeln!(f, "{}{};", ind, d),
        }
    }
}

/// A loaded program: structure table plus the body of `main`
/// (global declarations come first).
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub structs: Vec<StructDecl>,
    pub body: Vec<Stmt>,
}

impl Program {
    pub fn new(structs: Vec<StructDecl>, body: Vec<Stmt>) -> Self {
        Program { structs, body }
    }

    pub fn struct_decl(&self, id: StructId) -> &StructDecl {
        &self.structs[id.index()]
    }

    pub fn struct_id(&self, name: &str) -> Option<StructId> {
        self.structs.iter().position(|s| s.name == name).map(StructId::new)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, s) in self.structs.iter().enumerate() {
            write!(f, "struct {} /* #{} */ {{", s.name, i)?;
            for field in &s.fields {
                match field.ty {
                    Type::Int => write!(f, " int {};", field.name)?,
                    Type::Ptr(id) => write!(f, " {} *{};", self.structs[id.index()].name, field.name)?,
                }
            }
            writeln!(f, " }}")?;
        }
        writeln!(f, "main {{")?;
        for stmt in &self.body {
            stmt.fmt_indent(f, 1)?;
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_path_split_last() {
        let p = Path::var("c").field("l", 0).field("r", 1);
        assert_eq!(p.to_string(), "c->l->r");
        let (init, last) = p.split_last().unwrap();
        assert_eq!(init.to_string(), "c->l");
        assert_eq!(last.name, "r");
        assert!(Path::var("x").split_last().is_none());
    }

    #[test]
    fn test_display_program() {
        let list = StructDecl::new(
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
        );
        let body = vec![
            Stmt::decl("l", Type::Ptr(StructId::new(0))),
            Stmt::assign(Path::var("l"), Expr::Null),
            Stmt::if_then(Cond::not_null(Path::var("l")), vec![Stmt::free(Path::var("l"))]),
        ];
        let program = Program::new(vec![list], body);
        let text = program.to_string();
        assert!(text.contains("struct elist /* #0 */ { elist *next; int data; }"));
        assert!(text.contains("if (l != null) {"));
        assert!(text.contains("free(l);"));
    }
}
