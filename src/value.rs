use std::fmt;
use std::rc::Rc;

use crate::ast::FunctionDef;

/// A dynamically-typed runtime value.
///
/// Values are cheap to clone: strings are immutable and shared, functions
/// point at the parsed literal they came from.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    /// An open function: free names resolve against the caller's scopes.
    Function(Rc<FunctionDef>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
        }
    }

    /// True when both values are the same variant.
    pub fn same_type(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl PartialEq for Value {
    /// Cross-type comparison is `false`, never an error.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(l), Value::Bool(r)) => l == r,
            (Value::Number(l), Value::Number(r)) => l == r,
            (Value::String(l), Value::String(r)) => l.as_bytes() == r.as_bytes(),
            (Value::Function(l), Value::Function(r)) => Rc::ptr_eq(l, r),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "(nil)"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write_number(f, *n),
            Value::String(s) => write!(f, "{}", s),
            Value::Function(def) => write!(f, "<fun/{}>", def.params.len()),
        }
    }
}

/// Shortest round-trippable text; very large or very small magnitudes switch
/// to exponent form instead of spelling out every digit.
fn write_number(f: &mut fmt::Formatter, n: f64) -> fmt::Result {
    let magnitude = n.abs();
    if n.is_finite() && n != 0.0 && !(1e-7..1e16).contains(&magnitude) {
        write!(f, "{:e}", n)
    } else {
        write!(f, "{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_render_in_shortest_form() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(-0.5).to_string(), "-0.5");
        assert_eq!(Value::Number(1e15).to_string(), "1000000000000000");
        assert_eq!(Value::Number(1e300).to_string(), "1e300");
        assert_eq!(Value::Number(-2.5e20).to_string(), "-2.5e20");
        assert_eq!(Value::Number(1e-10).to_string(), "1e-10");
    }
}
