//! Tokenizer for the C subset and the directive language.

use std::fmt;

use crate::error::LoadError;
use crate::types::Span;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(i64),
    Str(String),
    /// `$`, introducing directive operators such as `$sub`.
    Dollar,
    Punct(&'static str),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "`{}`", name),
            TokenKind::Number(n) => write!(f, "`{}`", n),
            TokenKind::Str(s) => write!(f, "{:?}", s),
            TokenKind::Dollar => write!(f, "`$`"),
            TokenKind::Punct(p) => write!(f, "`{}`", p),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

const PUNCTS: &[&str] = &[
    "->", "==", "!=", "<=", ">=", "&&", "||", "++", "--", "+=", "-=", "(", ")", "{", "}", "[", "]", ";", ",", "*", "=",
    "<", ">", "+", "-", "!", "&", "|", ".", "/", "%", "?", ":", "~", "^",
];

/// Split `source` into tokens, skipping whitespace and comments.
///
/// Spans are relative to `origin`, the position of the first character.
pub fn tokenize(source: &str, origin: Span) -> Result<Vec<Token>, LoadError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = origin.line;
    let mut col = origin.col;

    // Advance over `n` characters, tracking the position.
    let advance = |i: &mut usize, line: &mut u32, col: &mut u32, n: usize| {
        for _ in 0..n {
            if chars[*i] == '\n' {
                *line += 1;
                *col = 1;
            } else {
                *col += 1;
            }
            *i += 1;
        }
    };

    while i < chars.len() {
        let c = chars[i];
        let span = Span::new(line, col);

        if c.is_whitespace() {
            advance(&mut i, &mut line, &mut col, 1);
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                advance(&mut i, &mut line, &mut col, 1);
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            advance(&mut i, &mut line, &mut col, 2);
            loop {
                if i >= chars.len() {
                    return Err(LoadError::syntax(span, "unterminated comment"));
                }
                if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                    advance(&mut i, &mut line, &mut col, 2);
                    break;
                }
                advance(&mut i, &mut line, &mut col, 1);
            }
            continue;
        }
        if c == '#' {
            return Err(LoadError::unsupported(span, "preprocessor directive"));
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                advance(&mut i, &mut line, &mut col, 1);
            }
            let name: String = chars[start..i].iter().collect();
            tokens.push(Token {
                kind: TokenKind::Ident(name),
                span,
            });
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                advance(&mut i, &mut line, &mut col, 1);
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<i64>()
                .map_err(|_| LoadError::syntax(span, format!("invalid number `{}`", text)))?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                span,
            });
            continue;
        }
        if c == '"' {
            advance(&mut i, &mut line, &mut col, 1);
            let mut text = String::new();
            loop {
                match chars.get(i) {
                    None | Some('\n') => return Err(LoadError::syntax(span, "unterminated string")),
                    Some('"') => {
                        advance(&mut i, &mut line, &mut col, 1);
                        break;
                    }
                    Some('\\') => {
                        let escaped = chars.get(i + 1).copied().unwrap_or('\\');
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                        let n = 2.min(chars.len() - i);
                        advance(&mut i, &mut line, &mut col, n);
                    }
                    Some(&other) => {
                        text.push(other);
                        advance(&mut i, &mut line, &mut col, 1);
                    }
                }
            }
            tokens.push(Token {
                kind: TokenKind::Str(text),
                span,
            });
            continue;
        }
        if c == '$' {
            advance(&mut i, &mut line, &mut col, 1);
            tokens.push(Token {
                kind: TokenKind::Dollar,
                span,
            });
            continue;
        }
        if c == '\'' {
            return Err(LoadError::unsupported(span, "character literal"));
        }
        let punct = PUNCTS.iter().find(|p| {
            p.chars()
                .enumerate()
                .all(|(k, pc)| chars.get(i + k) == Some(&pc))
        });
        match punct {
            Some(&p) => {
                advance(&mut i, &mut line, &mut col, p.len());
                tokens.push(Token {
                    kind: TokenKind::Punct(p),
                    span,
                });
            }
            None => return Err(LoadError::syntax(span, format!("unexpected character `{}`", c))),
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(line, col),
    });
    Ok(tokens)
}

/// Cursor over a token list.
#[derive(Debug, Clone)]
pub struct Tokens {
    tokens: Vec<Token>,
    pos: usize,
}

impl Tokens {
    pub fn new(tokens: Vec<Token>) -> Self {
        Tokens { tokens, pos: 0 }
    }

    pub fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    pub fn peek_at(&self, offset: usize) -> &TokenKind {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + offset).min(last)].kind
    }

    pub fn span(&self) -> Span {
        self.peek().span
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub fn at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub fn is_punct(&self, p: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Punct(q) if *q == p)
    }

    pub fn is_ident(&self, name: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(n) if n == name)
    }

    /// Consume the punctuation `p` if it comes next.
    pub fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn eat_ident(&mut self, name: &str) -> bool {
        if self.is_ident(name) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn expect_punct(&mut self, p: &str) -> Result<Span, LoadError> {
        let token = self.next();
        match &token.kind {
            TokenKind::Punct(q) if *q == p => Ok(token.span),
            other => Err(LoadError::syntax(token.span, format!("expected `{}`, found {}", p, other))),
        }
    }

    pub fn expect_ident(&mut self) -> Result<(String, Span), LoadError> {
        let token = self.next();
        match token.kind {
            TokenKind::Ident(name) => Ok((name, token.span)),
            other => Err(LoadError::syntax(token.span, format!("expected identifier, found {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, Span::new(1, 1))
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokens() {
        assert_eq!(
            kinds("k = k->next; // step"),
            vec![
                TokenKind::Ident("k".into()),
                TokenKind::Punct("="),
                TokenKind::Ident("k".into()),
                TokenKind::Punct("->"),
                TokenKind::Ident("next".into()),
                TokenKind::Punct(";"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_and_dollar() {
        assert_eq!(
            kinds(r#"_memcad("set_assume(F $sub E)")"#)[2],
            TokenKind::Str("set_assume(F $sub E)".into())
        );
        assert_eq!(
            kinds("F $sub E"),
            vec![
                TokenKind::Ident("F".into()),
                TokenKind::Dollar,
                TokenKind::Ident("sub".into()),
                TokenKind::Ident("E".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_spans() {
        let tokens = tokenize("a\n  /* x\n */ b", Span::new(1, 1)).unwrap();
        assert_eq!(tokens[0].span, Span::new(1, 1));
        assert_eq!(tokens[1].span, Span::new(3, 5));
    }

    #[test]
    fn test_cursor() {
        let mut tokens = Tokens::new(tokenize("f(a, b)", Span::new(1, 1)).unwrap());
        assert_eq!(tokens.expect_ident().unwrap().0, "f");
        assert!(tokens.eat_punct("("));
        assert!(!tokens.eat_punct(")"));
        assert_eq!(tokens.peek_at(1), &TokenKind::Punct(","));
        assert!(tokens.expect_punct(";").is_err());
        tokens.next();
        tokens.next();
        assert!(tokens.eat_punct(")"));
        assert!(tokens.at_end());
        // The end marker is sticky.
        tokens.next();
        assert!(tokens.at_end());
    }

    #[test]
    fn test_errors() {
        let err = tokenize("#include <stdio.h>", Span::new(1, 1)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedConstruct);
        let err = tokenize("a @ b", Span::new(1, 1)).unwrap_err();
        assert_eq!(err.span(), Span::new(1, 3));
        assert!(tokenize("/* open", Span::new(1, 1)).is_err());
    }
}
