//! # Request Expressions
//!
//! Purpose: Compile directive strings such as `user:$id` once at configuration
//! time and evaluate them against per-request variables.
//!
//! ## Syntax
//! - `$name` or `${name}` inserts a request variable; names are ASCII
//!   alphanumerics and `_`.
//! - `$$` inserts a literal `$`.
//! - Anything else is copied as-is, including CR/LF.

use std::collections::HashMap;

use respgate_common::{GatewayError, GatewayResult};

/// Per-request variable source.
///
/// Supplied by the request-processing layer; expressions only read from it.
pub trait RequestContext {
    /// Returns the value of `name`, or `None` when unset.
    fn variable(&self, name: &str) -> Option<&[u8]>;
}

/// Simple owned variable map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    values: HashMap<String, Vec<u8>>,
}

impl Variables {
    pub fn new() -> Self {
        Variables::default()
    }

    /// Sets a variable, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Builder-style variant of [`Variables::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.set(name, value);
        self
    }
}

impl RequestContext for Variables {
    fn variable(&self, name: &str) -> Option<&[u8]> {
        self.values.get(name).map(Vec::as_slice)
    }
}

impl RequestContext for HashMap<String, Vec<u8>> {
    fn variable(&self, name: &str) -> Option<&[u8]> {
        self.get(name).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(Vec<u8>),
    Variable(String),
}

/// A compiled expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    source: String,
    segments: Vec<Segment>,
}

impl Expr {
    /// Compiles `source`; syntax errors are configuration errors.
    pub fn compile(source: &str) -> GatewayResult<Expr> {
        let invalid = |reason: &'static str| GatewayError::InvalidExpression {
            expr: source.to_string(),
            reason,
        };

        let bytes = source.as_bytes();
        let mut segments = Vec::new();
        let mut literal = Vec::new();
        let mut idx = 0;

        while idx < bytes.len() {
            let b = bytes[idx];
            if b != b'$' {
                literal.push(b);
                idx += 1;
                continue;
            }

            idx += 1;
            let name = match bytes.get(idx) {
                None => return Err(invalid("trailing '$'")),
                Some(b'$') => {
                    literal.push(b'$');
                    idx += 1;
                    continue;
                }
                Some(b'{') => {
                    let start = idx + 1;
                    let end = bytes[start..]
                        .iter()
                        .position(|&c| c == b'}')
                        .map(|offset| start + offset)
                        .ok_or_else(|| invalid("unterminated '${'"))?;
                    idx = end + 1;
                    &source[start..end]
                }
                Some(_) => {
                    let start = idx;
                    while idx < bytes.len() && is_name_byte(bytes[idx]) {
                        idx += 1;
                    }
                    &source[start..idx]
                }
            };

            if name.is_empty() || !name.bytes().all(is_name_byte) {
                return Err(invalid("invalid variable name"));
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Variable(name.to_string()));
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Expr {
            source: source.to_string(),
            segments,
        })
    }

    /// An expression that always resolves to zero bytes.
    pub fn empty() -> Expr {
        Expr {
            source: String::new(),
            segments: Vec::new(),
        }
    }

    /// Original directive text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Bytes of an expression without variables, or `None` if it has any.
    ///
    /// Adjacent literals are merged at compile time, so a constant has at
    /// most one segment.
    pub fn as_literal(&self) -> Option<&[u8]> {
        match self.segments.as_slice() {
            [] => Some(&[][..]),
            [Segment::Literal(bytes)] => Some(bytes.as_slice()),
            _ => None,
        }
    }

    /// Evaluates the expression for one request.
    pub fn resolve<C: RequestContext + ?Sized>(&self, ctx: &C) -> GatewayResult<Vec<u8>> {
        if let Some(bytes) = self.as_literal() {
            return Ok(bytes.to_vec());
        }

        let mut out = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(bytes) => out.extend_from_slice(bytes),
                Segment::Variable(name) => {
                    let value = ctx.variable(name).ok_or_else(|| {
                        GatewayError::ExpressionResolution {
                            variable: name.clone(),
                        }
                    })?;
                    out.extend_from_slice(value);
                }
            }
        }
        Ok(out)
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Variables {
        Variables::new()
            .with("key", "user:1")
            .with("n", "3")
            .with("empty", "")
    }

    #[test]
    fn resolves_literal() {
        let expr = Expr::compile("get").unwrap();
        assert_eq!(expr.as_literal(), Some(&b"get"[..]));
        assert_eq!(expr.resolve(&vars()).unwrap(), b"get");
    }

    #[test]
    fn resolves_variables() {
        let expr = Expr::compile("prefix:$key").unwrap();
        assert_eq!(expr.resolve(&vars()).unwrap(), b"prefix:user:1");

        let expr = Expr::compile("${key}suffix").unwrap();
        assert_eq!(expr.resolve(&vars()).unwrap(), b"user:1suffix");

        let expr = Expr::compile("$key-$n").unwrap();
        assert_eq!(expr.as_literal(), None);
        assert_eq!(expr.resolve(&vars()).unwrap(), b"user:1-3");
    }

    #[test]
    fn escapes_dollar() {
        let expr = Expr::compile("*1\r\n$$4\r\nping\r\n").unwrap();
        assert_eq!(expr.as_literal(), Some(&b"*1\r\n$4\r\nping\r\n"[..]));
        assert_eq!(expr.resolve(&vars()).unwrap(), b"*1\r\n$4\r\nping\r\n");
    }

    #[test]
    fn empty_source_resolves_empty() {
        let expr = Expr::compile("").unwrap();
        assert_eq!(expr, Expr::empty());
        assert_eq!(expr.as_literal(), Some(&b""[..]));
        assert!(expr.resolve(&vars()).unwrap().is_empty());
    }

    #[test]
    fn empty_variable_is_not_missing() {
        let expr = Expr::compile("$empty").unwrap();
        assert!(expr.resolve(&vars()).unwrap().is_empty());
    }

    #[test]
    fn missing_variable_fails() {
        let expr = Expr::compile("$nope").unwrap();
        match expr.resolve(&vars()) {
            Err(GatewayError::ExpressionResolution { variable }) => assert_eq!(variable, "nope"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_syntax() {
        for source in ["abc$", "${key", "${}", "$-x", "${a b}"] {
            assert!(
                matches!(
                    Expr::compile(source),
                    Err(GatewayError::InvalidExpression { .. })
                ),
                "{:?} should not compile",
                source
            );
        }
    }

    #[test]
    fn hash_map_is_a_context() {
        let mut map = HashMap::new();
        map.insert("id".to_string(), b"7".to_vec());
        let expr = Expr::compile("k$id").unwrap();
        assert_eq!(expr.resolve(&map).unwrap(), b"k7");
    }
}
