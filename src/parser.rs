//! Recursive-descent parser for the supported C subset.
//!
//! Accepted input is a sequence of structure declarations, typedefs and
//! global variables, followed by one `main` function. Names are resolved
//! and field accesses are type-checked while parsing, so the resulting
//! [`Program`] only refers to declared structures, fields and variables.

use std::collections::HashMap;

use crate::ast::{Cond, Expr, FieldDecl, Path, Program, Stmt, StmtKind, StructDecl, Type};
use crate::directive::parse_directive;
use crate::error::LoadError;
use crate::lexer::{tokenize, TokenKind, Tokens};
use crate::types::{Span, StructId};

/// Parse a whole program.
pub fn parse_program(source: &str) -> Result<Program, LoadError> {
    let tokens = tokenize(source, Span::new(1, 1))?;
    Parser::new(Tokens::new(tokens)).program()
}

/// A type before declarator stars are applied.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum BaseType {
    Void,
    Int,
    Struct(StructId),
    Ptr(StructId),
}

/// Right-hand side of an assignment to a pointer.
enum Rhs {
    Expr(Expr),
    Alloc(StructId),
}

/// Untyped expression, before it is classified as a pointer expression,
/// a pointer test or a scalar computation.
#[derive(Debug, Clone)]
enum Raw {
    Num(i64),
    Null,
    Path(Path, Type),
    Unary(&'static str, Box<Raw>),
    Binary(&'static str, Box<Raw>, Box<Raw>),
}

impl Raw {
    fn paths(&self, out: &mut Vec<Path>) {
        match self {
            Raw::Num(_) | Raw::Null => {}
            Raw::Path(p, _) => out.push(p.clone()),
            Raw::Unary(_, a) => a.paths(out),
            Raw::Binary(_, a, b) => {
                a.paths(out);
                b.paths(out);
            }
        }
    }

    fn is_pointer(&self) -> bool {
        matches!(self, Raw::Null | Raw::Path(_, Type::Ptr(_)))
    }
}

const BINARY_LEVELS: &[&[&str]] = &[
    &["||"],
    &["&&"],
    &["==", "!="],
    &["<", ">", "<=", ">="],
    &["+", "-"],
    &["*", "/", "%"],
];

const UNSUPPORTED_KEYWORDS: &[&str] = &["for", "do", "switch", "case", "default", "goto", "break", "continue"];

struct Parser {
    tokens: Tokens,
    struct_ids: HashMap<String, StructId>,
    structs: Vec<(String, Option<StructDecl>, Span)>,
    aliases: HashMap<String, BaseType>,
    scopes: Vec<HashMap<String, Type>>,
}

impl Parser {
    fn new(tokens: Tokens) -> Self {
        Parser {
            tokens,
            struct_ids: HashMap::new(),
            structs: Vec::new(),
            aliases: HashMap::new(),
            scopes: vec![HashMap::new()],
        }
    }

    fn program(mut self) -> Result<Program, LoadError> {
        let mut globals = Vec::new();
        let mut main = None;
        while !self.tokens.at_end() {
            let span = self.tokens.span();
            if self.tokens.eat_ident("typedef") {
                self.typedef()?;
                continue;
            }
            if self.tokens.is_ident("struct") && *self.tokens.peek_at(2) == TokenKind::Punct("{") {
                self.tokens.next();
                let (tag, tag_span) = self.tokens.expect_ident()?;
                let fields = self.fields()?;
                self.define_struct(&tag, fields, tag_span)?;
                self.tokens.expect_punct(";")?;
                continue;
            }
            let base = self
                .base_type()?
                .ok_or_else(|| LoadError::syntax(span, format!("expected declaration, found {}", self.tokens.peek().kind)))?;
            let stars = self.stars();
            let (name, name_span) = self.tokens.expect_ident()?;
            if self.tokens.is_punct("(") {
                if name != "main" {
                    return Err(LoadError::unsupported(name_span, format!("function definition `{}`", name)));
                }
                if main.is_some() {
                    return Err(LoadError::syntax(name_span, "duplicate definition of `main`"));
                }
                self.tokens.expect_punct("(")?;
                self.tokens.eat_ident("void");
                self.tokens.expect_punct(")")?;
                main = Some(self.block()?);
            } else {
                self.declarators(base, stars, name, name_span, &mut globals)?;
            }
        }

        let mut structs = Vec::with_capacity(self.structs.len());
        for (name, decl, span) in self.structs {
            match decl {
                Some(decl) => structs.push(decl),
                None => return Err(LoadError::syntax(span, format!("struct `{}` is never defined", name))),
            }
        }
        let main = main.ok_or_else(|| LoadError::syntax(self.tokens.span(), "missing `main` function"))?;
        globals.extend(main);
        Ok(Program::new(structs, globals))
    }

    // ----- Types -----

    fn struct_id(&mut self, tag: &str, span: Span) -> StructId {
        if let Some(&id) = self.struct_ids.get(tag) {
            return id;
        }
        let id = StructId::new(self.structs.len());
        self.structs.push((tag.to_string(), None, span));
        self.struct_ids.insert(tag.to_string(), id);
        id
    }

    fn define_struct(&mut self, tag: &str, fields: Vec<FieldDecl>, span: Span) -> Result<StructId, LoadError> {
        let id = self.struct_id(tag, span);
        let entry = &mut self.structs[id.index()];
        if entry.1.is_some() {
            return Err(LoadError::syntax(span, format!("redefinition of struct `{}`", tag)));
        }
        entry.1 = Some(StructDecl::new(tag, fields));
        Ok(id)
    }

    fn is_type_start(&self) -> bool {
        match &self.tokens.peek().kind {
            TokenKind::Ident(name) => {
                matches!(
                    name.as_str(),
                    "int" | "long" | "short" | "char" | "unsigned" | "signed" | "void" | "struct" | "volatile" | "const"
                ) || self.aliases.contains_key(name)
            }
            _ => false,
        }
    }

    /// Parse a base type with its qualifiers, if one comes next.
    fn base_type(&mut self) -> Result<Option<BaseType>, LoadError> {
        while self.tokens.eat_ident("volatile") || self.tokens.eat_ident("const") {}
        let TokenKind::Ident(name) = self.tokens.peek().kind.clone() else {
            return Ok(None);
        };
        let base = match name.as_str() {
            "void" => {
                self.tokens.next();
                BaseType::Void
            }
            "int" | "long" | "short" | "char" | "unsigned" | "signed" => {
                while ["int", "long", "short", "char", "unsigned", "signed"]
                    .iter()
                    .any(|kw| self.tokens.eat_ident(kw))
                {}
                BaseType::Int
            }
            "struct" => {
                self.tokens.next();
                let (tag, tag_span) = self.tokens.expect_ident()?;
                BaseType::Struct(self.struct_id(&tag, tag_span))
            }
            _ => match self.aliases.get(&name) {
                Some(&base) => {
                    self.tokens.next();
                    base
                }
                None => return Ok(None),
            },
        };
        Ok(Some(base))
    }

    fn stars(&mut self) -> usize {
        let mut stars = 0;
        while self.tokens.eat_punct("*") {
            stars += 1;
        }
        stars
    }

    fn apply_stars(base: BaseType, stars: usize, span: Span) -> Result<Type, LoadError> {
        match (base, stars) {
            (BaseType::Int, 0) => Ok(Type::Int),
            (BaseType::Struct(id), 1) | (BaseType::Ptr(id), 0) => Ok(Type::Ptr(id)),
            (BaseType::Struct(_), 0) => Err(LoadError::unsupported(span, "structure value")),
            (BaseType::Void, _) => Err(LoadError::unsupported(span, "void object")),
            (BaseType::Int, _) => Err(LoadError::unsupported(span, "pointer to scalar")),
            _ => Err(LoadError::unsupported(span, "pointer to pointer")),
        }
    }

    fn typedef(&mut self) -> Result<(), LoadError> {
        let span = self.tokens.span();
        let base = if self.tokens.is_ident("struct")
            && (*self.tokens.peek_at(1) == TokenKind::Punct("{") || *self.tokens.peek_at(2) == TokenKind::Punct("{"))
        {
            self.tokens.next();
            let tag = if matches!(self.tokens.peek().kind, TokenKind::Ident(_)) {
                Some(self.tokens.expect_ident()?)
            } else {
                None
            };
            let fields = self.fields()?;
            match tag {
                Some((tag, tag_span)) => BaseType::Struct(self.define_struct(&tag, fields, tag_span)?),
                None => {
                    // Anonymous structure: named after the alias.
                    let stars = self.stars();
                    let (alias, alias_span) = self.tokens.expect_ident()?;
                    let id = self.define_struct(&alias, fields, alias_span)?;
                    return self.finish_typedef(BaseType::Struct(id), stars, alias, alias_span);
                }
            }
        } else {
            self.base_type()?
                .ok_or_else(|| LoadError::syntax(span, "expected type after `typedef`"))?
        };
        let stars = self.stars();
        let (alias, alias_span) = self.tokens.expect_ident()?;
        self.finish_typedef(base, stars, alias, alias_span)
    }

    fn finish_typedef(&mut self, base: BaseType, stars: usize, alias: String, span: Span) -> Result<(), LoadError> {
        let aliased = match (base, stars) {
            (base, 0) => base,
            (BaseType::Struct(id), 1) => BaseType::Ptr(id),
            _ => return Err(LoadError::unsupported(span, "pointer to pointer type")),
        };
        self.tokens.expect_punct(";")?;
        self.aliases.insert(alias, aliased);
        Ok(())
    }

    fn fields(&mut self) -> Result<Vec<FieldDecl>, LoadError> {
        self.tokens.expect_punct("{")?;
        let mut fields: Vec<FieldDecl> = Vec::new();
        while !self.tokens.eat_punct("}") {
            let span = self.tokens.span();
            let base = self
                .base_type()?
                .ok_or_else(|| LoadError::syntax(span, format!("expected field type, found {}", self.tokens.peek().kind)))?;
            loop {
                let stars = self.stars();
                let (name, name_span) = self.tokens.expect_ident()?;
                if self.tokens.is_punct("[") {
                    return Err(LoadError::unsupported(name_span, "array field"));
                }
                let ty = Self::apply_stars(base, stars, name_span)?;
                if fields.iter().any(|f| f.name == name) {
                    return Err(LoadError::syntax(name_span, format!("duplicate field `{}`", name)));
                }
                fields.push(FieldDecl { name, ty });
                if !self.tokens.eat_punct(",") {
                    break;
                }
            }
            self.tokens.expect_punct(";")?;
        }
        Ok(fields)
    }

    // ----- Scopes -----

    fn lookup(&self, name: &str) -> Option<Type> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    fn declare(&mut self, name: &str, ty: Type, span: Span) -> Result<(), LoadError> {
        let Some(scope) = self.scopes.last_mut() else {
            return Err(LoadError::syntax(span, "declaration outside of any scope"));
        };
        if scope.insert(name.to_string(), ty).is_some() {
            return Err(LoadError::syntax(span, format!("redeclaration of `{}`", name)));
        }
        Ok(())
    }

    // ----- Statements -----

    /// `{ stmt* }` in a fresh scope.
    fn block(&mut self) -> Result<Vec<Stmt>, LoadError> {
        self.tokens.expect_punct("{")?;
        self.scopes.push(HashMap::new());
        let mut body = Vec::new();
        while !self.tokens.eat_punct("}") {
            if self.tokens.at_end() {
                return Err(LoadError::syntax(self.tokens.span(), "unexpected end of input, expected `}`"));
            }
            self.statement(&mut body)?;
        }
        self.scopes.pop();
        Ok(body)
    }

    /// Body of `if`/`while`: a block, or a single statement in its own scope.
    fn body(&mut self) -> Result<Vec<Stmt>, LoadError> {
        if self.tokens.is_punct("{") {
            return self.block();
        }
        self.scopes.push(HashMap::new());
        let mut body = Vec::new();
        self.statement(&mut body)?;
        self.scopes.pop();
        Ok(body)
    }

    fn statement(&mut self, out: &mut Vec<Stmt>) -> Result<(), LoadError> {
        let span = self.tokens.span();
        if self.tokens.is_punct("{") {
            let body = self.block()?;
            out.push(Stmt::block(body).at(span));
            return Ok(());
        }
        if self.tokens.eat_punct(";") {
            return Ok(());
        }
        let TokenKind::Ident(word) = self.tokens.peek().kind.clone() else {
            return Err(LoadError::syntax(span, format!("expected statement, found {}", self.tokens.peek().kind)));
        };
        if UNSUPPORTED_KEYWORDS.contains(&word.as_str()) {
            return Err(LoadError::unsupported(span, format!("`{}` statement", word)));
        }
        match word.as_str() {
            "if" => {
                self.tokens.next();
                let cond = self.paren_cond()?;
                let then_body = self.body()?;
                let else_body = if self.tokens.eat_ident("else") { self.body()? } else { Vec::new() };
                out.push(Stmt::if_then_else(cond, then_body, else_body).at(span));
            }
            "while" => {
                self.tokens.next();
                let cond = self.paren_cond()?;
                let body = self.body()?;
                out.push(Stmt::while_do(cond, body).at(span));
            }
            "return" => {
                self.tokens.next();
                if !self.tokens.eat_punct(";") {
                    return Err(LoadError::unsupported(span, "return with a value"));
                }
                out.push(Stmt::new(StmtKind::Return).at(span));
            }
            "free" => {
                self.tokens.next();
                self.tokens.expect_punct("(")?;
                let path_span = self.tokens.span();
                let (path, ty) = self.path()?;
                if !matches!(ty, Type::Ptr(_)) {
                    return Err(LoadError::syntax(path_span, format!("`{}` is not a pointer", path)));
                }
                self.tokens.expect_punct(")")?;
                self.tokens.expect_punct(";")?;
                out.push(Stmt::free(path).at(span));
            }
            "assert" => {
                self.tokens.next();
                let cond = self.paren_cond()?;
                self.tokens.expect_punct(";")?;
                out.push(Stmt::assert(cond).at(span));
            }
            "_memcad" => {
                self.tokens.next();
                self.tokens.expect_punct("(")?;
                let token = self.tokens.next();
                let TokenKind::Str(text) = token.kind else {
                    return Err(LoadError::syntax(token.span, "expected directive string"));
                };
                let origin = Span::new(token.span.line, token.span.col + 1);
                let directive = parse_directive(&text, origin)?;
                self.tokens.expect_punct(")")?;
                self.tokens.expect_punct(";")?;
                out.push(Stmt::directive(directive).at(span));
            }
            _ if self.is_type_start() => {
                let base = self
                    .base_type()?
                    .ok_or_else(|| LoadError::syntax(span, "expected type"))?;
                let stars = self.stars();
                let (name, name_span) = self.tokens.expect_ident()?;
                self.declarators(base, stars, name, name_span, out)?;
            }
            _ => {
                self.assignment(out)?;
                self.tokens.expect_punct(";")?;
            }
        }
        Ok(())
    }

    /// Declarators after the base type, with the first name already read.
    fn declarators(
        &mut self,
        base: BaseType,
        mut stars: usize,
        mut name: String,
        mut span: Span,
        out: &mut Vec<Stmt>,
    ) -> Result<(), LoadError> {
        loop {
            if self.tokens.is_punct("[") {
                return Err(LoadError::unsupported(span, "array"));
            }
            let ty = Self::apply_stars(base, stars, span)?;
            self.declare(&name, ty, span)?;
            let mut init = None;
            let mut alloc = None;
            if self.tokens.eat_punct("=") {
                match self.rhs(ty)? {
                    Rhs::Expr(e) => init = Some(e),
                    Rhs::Alloc(target) => alloc = Some(target),
                }
            }
            out.push(
                Stmt::new(StmtKind::Decl {
                    var: name.clone(),
                    ty,
                    init,
                })
                .at(span),
            );
            if let Some(target) = alloc {
                out.push(Stmt::alloc(Path::var(name.clone()), target).at(span));
            }
            if !self.tokens.eat_punct(",") {
                break;
            }
            stars = self.stars();
            (name, span) = self.tokens.expect_ident()?;
        }
        self.tokens.expect_punct(";")?;
        Ok(())
    }

    fn assignment(&mut self, out: &mut Vec<Stmt>) -> Result<(), LoadError> {
        let span = self.tokens.span();
        if let TokenKind::Ident(name) = self.tokens.peek().kind.clone() {
            if *self.tokens.peek_at(1) == TokenKind::Punct("(") {
                return Err(LoadError::unsupported(span, format!("call to `{}`", name)));
            }
        }
        if self.tokens.is_punct("*") {
            return Err(LoadError::unsupported(span, "dereference with `*`"));
        }
        let (lhs, ty) = self.path()?;
        for op in ["++", "--", "+=", "-="] {
            if self.tokens.eat_punct(op) {
                if ty != Type::Int {
                    return Err(LoadError::unsupported(span, "pointer arithmetic"));
                }
                let mut paths = vec![lhs.clone()];
                if op.ends_with('=') {
                    self.expr()?.paths(&mut paths);
                }
                out.push(Stmt::assign(lhs, Expr::Scalar(paths)).at(span));
                return Ok(());
            }
        }
        self.tokens.expect_punct("=")?;
        match self.rhs(ty)? {
            Rhs::Expr(rhs) => out.push(Stmt::assign(lhs, rhs).at(span)),
            Rhs::Alloc(target) => out.push(Stmt::alloc(lhs, target).at(span)),
        }
        Ok(())
    }

    fn rhs(&mut self, ty: Type) -> Result<Rhs, LoadError> {
        let span = self.tokens.span();
        let Type::Ptr(expected) = ty else {
            let mut paths = Vec::new();
            self.expr()?.paths(&mut paths);
            return Ok(Rhs::Expr(Expr::Scalar(paths)));
        };
        // Optional cast, as in `(elist *) malloc(...)`.
        if self.tokens.is_punct("(") && self.is_type_start_at(1) {
            self.tokens.next();
            let base = self.base_type()?.ok_or_else(|| LoadError::syntax(span, "expected type"))?;
            let stars = self.stars();
            self.tokens.expect_punct(")")?;
            if Self::apply_stars(base, stars, span)? != ty {
                return Err(LoadError::syntax(span, "cast to a different pointer type"));
            }
        }
        if self.tokens.is_ident("alloc") || self.tokens.is_ident("malloc") {
            let target = self.allocation()?;
            if target != expected {
                return Err(LoadError::syntax(span, "allocation of a different structure type"));
            }
            return Ok(Rhs::Alloc(target));
        }
        let raw = self.expr()?;
        Ok(Rhs::Expr(Self::pointer_expr(raw, Some(expected), span)?))
    }

    fn is_type_start_at(&self, offset: usize) -> bool {
        match self.tokens.peek_at(offset) {
            TokenKind::Ident(name) => name == "struct" || self.aliases.contains_key(name),
            _ => false,
        }
    }

    /// `alloc(T)` or `malloc(sizeof(T))`.
    fn allocation(&mut self) -> Result<StructId, LoadError> {
        let (func, _) = self.tokens.expect_ident()?;
        self.tokens.expect_punct("(")?;
        let sized = func == "malloc";
        if sized {
            if !self.tokens.eat_ident("sizeof") {
                return Err(LoadError::unsupported(self.tokens.span(), "malloc without sizeof"));
            }
            self.tokens.expect_punct("(")?;
        }
        let span = self.tokens.span();
        let target = match self.base_type()? {
            Some(BaseType::Struct(id)) if self.tokens.is_punct(")") => id,
            Some(_) => return Err(LoadError::unsupported(span, "allocation of a non-structure type")),
            None => return Err(LoadError::syntax(span, "expected structure type")),
        };
        self.tokens.expect_punct(")")?;
        if sized {
            self.tokens.expect_punct(")")?;
        }
        Ok(target)
    }

    // ----- Expressions -----

    /// `var->f->g`, resolved against the declared types.
    fn path(&mut self) -> Result<(Path, Type), LoadError> {
        let (var, span) = self.tokens.expect_ident()?;
        let mut ty = self
            .lookup(&var)
            .ok_or_else(|| LoadError::syntax(span, format!("undeclared variable `{}`", var)))?;
        let mut path = Path::var(var);
        loop {
            let span = self.tokens.span();
            if self.tokens.is_punct("[") {
                return Err(LoadError::unsupported(span, "array indexing"));
            }
            if self.tokens.is_punct(".") {
                return Err(LoadError::unsupported(span, "structure member access with `.`"));
            }
            if !self.tokens.eat_punct("->") {
                break;
            }
            let (field, field_span) = self.tokens.expect_ident()?;
            let Type::Ptr(id) = ty else {
                return Err(LoadError::syntax(field_span, format!("`{}` is not a pointer", path)));
            };
            let decl = self.structs[id.index()]
                .1
                .as_ref()
                .ok_or_else(|| LoadError::syntax(field_span, "access to an incomplete structure"))?;
            let index = decl
                .field_index(&field)
                .ok_or_else(|| LoadError::syntax(field_span, format!("struct `{}` has no field `{}`", decl.name, field)))?;
            ty = decl.fields[index].ty;
            path = path.field(field, index);
        }
        Ok((path, ty))
    }

    fn paren_cond(&mut self) -> Result<Cond, LoadError> {
        self.tokens.expect_punct("(")?;
        let span = self.tokens.span();
        let raw = self.expr()?;
        self.tokens.expect_punct(")")?;
        Self::cond(raw, span)
    }

    fn expr(&mut self) -> Result<Raw, LoadError> {
        self.binary(0)
    }

    fn binary(&mut self, level: usize) -> Result<Raw, LoadError> {
        if level == BINARY_LEVELS.len() {
            return self.unary();
        }
        let mut lhs = self.binary(level + 1)?;
        'outer: loop {
            for &op in BINARY_LEVELS[level] {
                if self.tokens.eat_punct(op) {
                    let rhs = self.binary(level + 1)?;
                    lhs = Raw::Binary(op, Box::new(lhs), Box::new(rhs));
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn unary(&mut self) -> Result<Raw, LoadError> {
        let span = self.tokens.span();
        for op in ["!", "-", "~"] {
            if self.tokens.eat_punct(op) {
                return Ok(Raw::Unary(op, Box::new(self.unary()?)));
            }
        }
        if self.tokens.is_punct("&") {
            return Err(LoadError::unsupported(span, "address-of operator"));
        }
        if self.tokens.is_punct("*") {
            return Err(LoadError::unsupported(span, "dereference with `*`"));
        }
        if self.tokens.eat_punct("(") {
            let inner = self.expr()?;
            self.tokens.expect_punct(")")?;
            return Ok(inner);
        }
        match self.tokens.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.tokens.next();
                Ok(Raw::Num(n))
            }
            TokenKind::Ident(name) if name == "null" || name == "NULL" => {
                self.tokens.next();
                Ok(Raw::Null)
            }
            TokenKind::Ident(name) if *self.tokens.peek_at(1) == TokenKind::Punct("(") => {
                Err(LoadError::unsupported(span, format!("call to `{}`", name)))
            }
            TokenKind::Ident(_) => {
                let (path, ty) = self.path()?;
                Ok(Raw::Path(path, ty))
            }
            other => Err(LoadError::syntax(span, format!("expected expression, found {}", other))),
        }
    }

    fn pointer_expr(raw: Raw, expected: Option<StructId>, span: Span) -> Result<Expr, LoadError> {
        match raw {
            Raw::Null | Raw::Num(0) => Ok(Expr::Null),
            Raw::Num(n) => Err(LoadError::syntax(span, format!("integer {} used as a pointer", n))),
            Raw::Path(path, Type::Ptr(id)) => match expected {
                Some(expected) if expected != id => {
                    Err(LoadError::syntax(span, format!("`{}` has a different pointer type", path)))
                }
                _ => Ok(Expr::Path(path)),
            },
            Raw::Path(path, Type::Int) => Err(LoadError::syntax(span, format!("scalar `{}` used as a pointer", path))),
            Raw::Unary(..) | Raw::Binary(..) => Err(LoadError::unsupported(span, "pointer arithmetic")),
        }
    }

    /// Classify an expression used as a condition.
    fn cond(raw: Raw, span: Span) -> Result<Cond, LoadError> {
        match raw {
            Raw::Binary("&&", a, b) => Ok(Self::cond(*a, span)?.and(Self::cond(*b, span)?)),
            Raw::Binary("||", a, b) => Ok(Self::cond(*a, span)?.or(Self::cond(*b, span)?)),
            Raw::Unary("!", a) => Ok(Self::cond(*a, span)?.not()),
            Raw::Binary(op @ ("==" | "!="), a, b) if a.is_pointer() || b.is_pointer() => {
                let pointee = |r: &Raw| match r {
                    Raw::Path(_, Type::Ptr(id)) => Some(*id),
                    _ => None,
                };
                let expected = pointee(&a).or_else(|| pointee(&b));
                Ok(Cond::Cmp {
                    eq: op == "==",
                    lhs: Self::pointer_expr(*a, expected, span)?,
                    rhs: Self::pointer_expr(*b, expected, span)?,
                })
            }
            Raw::Path(path, Type::Ptr(_)) => Ok(Cond::not_null(path)),
            other => {
                let mut paths = Vec::new();
                other.paths(&mut paths);
                Ok(Cond::Unknown(paths))
            }
        }
    }
}
