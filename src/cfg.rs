//! Control flow graph with basic blocks.
//!
//! Structured statements are lowered into blocks of straight-line
//! instructions connected by terminators. Loop heads get a block of their
//! own holding only the loop test, so the executor can widen states there.
//! Variables declared in a nested scope are killed when the scope ends.

use std::fmt;

use crate::ast::{Cond, Expr, Path, Program, Stmt, StmtKind, Type};
use crate::directive::Directive;
use crate::types::{Span, StructId, Var};

/// Unique identifier for a basic block.
pub type BlockId = usize;

/// A basic block: straight-line instructions and how control leaves them.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<(Span, Instruction)>,
    pub terminator: Terminator,
}

/// Instruction within a basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Decl { var: Var, ty: Type },
    Assign { lhs: Path, rhs: Expr },
    Alloc { lhs: Path, ty: StructId },
    Free(Path),
    Assert(Cond),
    Directive(Directive),
    /// End of scope for the listed variables.
    Kill(Vec<Var>),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Decl { var, ty } => match ty {
                Type::Int => write!(f, "decl {}: int", var),
                Type::Ptr(id) => write!(f, "decl {}: {}*", var, id),
            },
            Instruction::Assign { lhs, rhs } => write!(f, "{} = {}", lhs, rhs),
            Instruction::Alloc { lhs, ty } => write!(f, "{} = alloc({})", lhs, ty),
            Instruction::Free(path) => write!(f, "free({})", path),
            Instruction::Assert(cond) => write!(f, "assert {}", cond),
            Instruction::Directive(d) => write!(f, "{}", d),
            Instruction::Kill(vars) => write!(f, "kill {}", vars.join(", ")),
        }
    }
}

/// How a basic block ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Goto(BlockId),
    Branch {
        cond: Cond,
        span: Span,
        then_target: BlockId,
        else_target: BlockId,
    },
    Return,
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Goto(target) => write!(f, "goto bb{}", target),
            Terminator::Branch {
                cond,
                then_target,
                else_target,
                ..
            } => write!(f, "if {} then bb{} else bb{}", cond, then_target, else_target),
            Terminator::Return => write!(f, "return"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    /// All basic blocks, indexed by [`BlockId`].
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    /// Blocks evaluating a loop condition, in program order.
    pub loop_heads: Vec<BlockId>,
}

impl ControlFlowGraph {
    /// Lower the body of a program.
    pub fn from_program(program: &Program) -> Self {
        let mut builder = CfgBuilder::new();
        for stmt in &program.body {
            builder.build_stmt(stmt);
        }
        builder.terminate(Terminator::Return);
        builder.finalize()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    pub fn is_loop_head(&self, id: BlockId) -> bool {
        self.loop_heads.contains(&id)
    }

    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        match &self.blocks[id].terminator {
            Terminator::Goto(target) => vec![*target],
            Terminator::Branch {
                then_target,
                else_target,
                ..
            } => vec![*then_target, *else_target],
            Terminator::Return => vec![],
        }
    }
}

impl fmt::Display for ControlFlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CFG (entry: bb{}):", self.entry)?;
        for block in &self.blocks {
            write!(f, "\nbb{}:", block.id)?;
            if self.is_loop_head(block.id) {
                write!(f, " (loop head)")?;
            }
            writeln!(f)?;
            for (_, instr) in &block.instructions {
                writeln!(f, "  {}", instr)?;
            }
            writeln!(f, "  {}", block.terminator)?;
        }
        Ok(())
    }
}

/// Builder lowering statements into the block under construction.
struct CfgBuilder {
    blocks: Vec<BasicBlock>,
    current: BlockId,
    loop_heads: Vec<BlockId>,
}

impl CfgBuilder {
    fn new() -> Self {
        let mut builder = CfgBuilder {
            blocks: Vec::new(),
            current: 0,
            loop_heads: Vec::new(),
        };
        builder.current = builder.fresh_block();
        builder
    }

    fn fresh_block(&mut self) -> BlockId {
        let id = self.blocks.len();
        self.blocks.push(BasicBlock {
            id,
            instructions: Vec::new(),
            terminator: Terminator::Return,
        });
        id
    }

    fn emit(&mut self, span: Span, instr: Instruction) {
        self.blocks[self.current].instructions.push((span, instr));
    }

    fn terminate(&mut self, terminator: Terminator) {
        self.blocks[self.current].terminator = terminator;
    }

    /// Lower a nested scope, killing its local variables at the end.
    fn build_scope(&mut self, body: &[Stmt], end: Span) {
        for stmt in body {
            self.build_stmt(stmt);
        }
        let locals: Vec<Var> = body
            .iter()
            .filter_map(|stmt| match &stmt.kind {
                StmtKind::Decl { var, .. } => Some(var.clone()),
                _ => None,
            })
            .collect();
        if !locals.is_empty() {
            self.emit(end, Instruction::Kill(locals));
        }
    }

    fn build_stmt(&mut self, stmt: &Stmt) {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Decl { var, ty, init } => {
                self.emit(span, Instruction::Decl { var: var.clone(), ty: *ty });
                if let Some(rhs) = init {
                    self.emit(
                        span,
                        Instruction::Assign {
                            lhs: Path::var(var.clone()),
                            rhs: rhs.clone(),
                        },
                    );
                }
            }
            StmtKind::Assign { lhs, rhs } => self.emit(
                span,
                Instruction::Assign {
                    lhs: lhs.clone(),
                    rhs: rhs.clone(),
                },
            ),
            StmtKind::Alloc { lhs, ty } => self.emit(span, Instruction::Alloc { lhs: lhs.clone(), ty: *ty }),
            StmtKind::Free(path) => self.emit(span, Instruction::Free(path.clone())),
            StmtKind::Assert(cond) => self.emit(span, Instruction::Assert(cond.clone())),
            StmtKind::Directive(d) => self.emit(span, Instruction::Directive(d.clone())),
            StmtKind::Block(body) => self.build_scope(body, span),
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let then_block = self.fresh_block();
                let else_block = self.fresh_block();
                let join = self.fresh_block();
                self.terminate(Terminator::Branch {
                    cond: cond.clone(),
                    span,
                    then_target: then_block,
                    else_target: else_block,
                });
                self.current = then_block;
                self.build_scope(then_body, span);
                self.terminate(Terminator::Goto(join));
                self.current = else_block;
                self.build_scope(else_body, span);
                self.terminate(Terminator::Goto(join));
                self.current = join;
            }
            StmtKind::While { cond, body } => {
                let head = self.fresh_block();
                let body_block = self.fresh_block();
                let after = self.fresh_block();
                self.terminate(Terminator::Goto(head));
                self.loop_heads.push(head);
                self.current = head;
                self.terminate(Terminator::Branch {
                    cond: cond.clone(),
                    span,
                    then_target: body_block,
                    else_target: after,
                });
                self.current = body_block;
                self.build_scope(body, span);
                self.terminate(Terminator::Goto(head));
                self.current = after;
            }
            StmtKind::Return => {
                self.terminate(Terminator::Return);
                // Anything after `return` lands in an unreachable block.
                self.current = self.fresh_block();
            }
        }
    }

    fn finalize(self) -> ControlFlowGraph {
        ControlFlowGraph {
            blocks: self.blocks,
            entry: 0,
            loop_heads: self.loop_heads,
        }
    }
}
