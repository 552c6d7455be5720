//! Shape directives embedded in programs as `_memcad("...")` strings.
//!
//! ```text
//! decl_setvars( Name, Name, ... )
//! set_assume( Name $sub Name )
//! add_inductive( Var, PredName, [ ParamList | SetVarList | SetVarList ] )
//! check_inductive( Var, PredName [ , [ ParamList | SetVarList | SetVarList ] ] )
//! force_live( Name, Name, ... )
//! ```

use std::fmt;

use crate::error::LoadError;
use crate::lexer::{tokenize, TokenKind, Tokens};
use crate::predicate::{lookup, PredId};
use crate::types::Span;

/// Bracketed parameter block `[ ptrs | sets | sets ]`.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ParamBlock {
    /// Pointer parameters: variable names or `null`.
    pub ptrs: Vec<String>,
    /// The two set-variable slots.
    pub sets: [Vec<String>; 2],
}

impl ParamBlock {
    /// Set parameters of both slots, in order.
    pub fn set_args(&self) -> impl Iterator<Item = &String> {
        self.sets[0].iter().chain(self.sets[1].iter())
    }
}

impl fmt::Display for ParamBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} | {} | {}]",
            self.ptrs.join(", "),
            self.sets[0].join(", "),
            self.sets[1].join(", ")
        )
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Directive {
    DeclSetvars(Vec<String>),
    SetAssume { sub: String, sup: String },
    AddInductive { var: String, pred: PredId, params: ParamBlock },
    CheckInductive { var: String, pred: PredId, params: Option<ParamBlock> },
    ForceLive(Vec<String>),
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::DeclSetvars(names) => write!(f, "decl_setvars({})", names.join(", ")),
            Directive::SetAssume { sub, sup } => write!(f, "set_assume({} $sub {})", sub, sup),
            Directive::AddInductive { var, pred, params } => {
                write!(f, "add_inductive({}, {}, {})", var, pred, params)
            }
            Directive::CheckInductive { var, pred, params } => match params {
                Some(params) => write!(f, "check_inductive({}, {}, {})", var, pred, params),
                None => write!(f, "check_inductive({}, {})", var, pred),
            },
            Directive::ForceLive(names) => write!(f, "force_live({})", names.join(", ")),
        }
    }
}

/// Parse the text of one directive. `span` locates the directive string.
pub fn parse_directive(text: &str, span: Span) -> Result<Directive, LoadError> {
    let mut tokens = Tokens::new(tokenize(text, span)?);
    let (keyword, _) = tokens.expect_ident()?;
    tokens.expect_punct("(")?;
    let directive = match keyword.as_str() {
        "decl_setvars" => Directive::DeclSetvars(name_list(&mut tokens)?),
        "force_live" => Directive::ForceLive(name_list(&mut tokens)?),
        "set_assume" => {
            let (sub, _) = tokens.expect_ident()?;
            let token = tokens.next();
            if token.kind != TokenKind::Dollar || !tokens.eat_ident("sub") {
                return Err(LoadError::syntax(token.span, "expected `$sub`"));
            }
            let (sup, _) = tokens.expect_ident()?;
            Directive::SetAssume { sub, sup }
        }
        "add_inductive" | "check_inductive" => {
            let (var, _) = tokens.expect_ident()?;
            tokens.expect_punct(",")?;
            let (name, pred_span) = tokens.expect_ident()?;
            let pred = lookup(&name)
                .ok_or_else(|| LoadError::syntax(pred_span, format!("unknown predicate `{}`", name)))?;
            let params = if tokens.eat_punct(",") {
                Some(param_block(&mut tokens)?)
            } else {
                None
            };
            if keyword == "add_inductive" {
                let params = params.unwrap_or_default();
                check_arity(pred, &params, pred_span)?;
                Directive::AddInductive { var, pred, params }
            } else {
                if let Some(params) = &params {
                    check_arity(pred, params, pred_span)?;
                }
                Directive::CheckInductive { var, pred, params }
            }
        }
        other => return Err(LoadError::syntax(span, format!("unknown directive `{}`", other))),
    };
    tokens.expect_punct(")")?;
    if !tokens.at_end() {
        return Err(LoadError::syntax(tokens.span(), "trailing input after directive"));
    }
    Ok(directive)
}

/// Comma-separated names up to (not including) the closing parenthesis.
fn name_list(tokens: &mut Tokens) -> Result<Vec<String>, LoadError> {
    let mut names = Vec::new();
    if tokens.is_punct(")") {
        return Ok(names);
    }
    loop {
        names.push(tokens.expect_ident()?.0);
        if !tokens.eat_punct(",") {
            return Ok(names);
        }
    }
}

fn param_block(tokens: &mut Tokens) -> Result<ParamBlock, LoadError> {
    tokens.expect_punct("[")?;
    let mut slots: Vec<Vec<String>> = vec![Vec::new()];
    loop {
        if tokens.eat_punct("]") {
            break;
        }
        if tokens.is_punct("|") || tokens.is_punct("||") {
            // `||` is two empty-slot separators lexed together.
            let count = if tokens.is_punct("||") { 2 } else { 1 };
            tokens.next();
            for _ in 0..count {
                slots.push(Vec::new());
            }
            continue;
        }
        let (name, span) = tokens.expect_ident()?;
        let slot = slots.last_mut().ok_or_else(|| LoadError::syntax(span, "malformed parameter block"))?;
        slot.push(name);
        if !tokens.eat_punct(",") && !tokens.is_punct("]") && !tokens.is_punct("|") && !tokens.is_punct("||") {
            return Err(LoadError::syntax(tokens.span(), "expected `,`, `|` or `]` in parameter block"));
        }
    }
    if slots.len() > 3 {
        return Err(LoadError::syntax(tokens.span(), "parameter block has more than three slots"));
    }
    let mut slots = slots.into_iter();
    Ok(ParamBlock {
        ptrs: slots.next().unwrap_or_default(),
        sets: [slots.next().unwrap_or_default(), slots.next().unwrap_or_default()],
    })
}

fn check_arity(pred: PredId, params: &ParamBlock, span: Span) -> Result<(), LoadError> {
    let def = pred.def();
    let sets = params.set_args().count();
    if params.ptrs.len() != def.ptr_arity || sets != def.set_arity {
        return Err(LoadError::syntax(
            span,
            format!(
                "{} takes {} pointer and {} set parameter(s), got {} and {}",
                def.name,
                def.ptr_arity,
                def.set_arity,
                params.ptrs.len(),
                sets
            ),
        ));
    }
    Ok(())
}
