use std::fmt::{Display, Formatter};

/// Handle of a symbolic heap location.
///
/// Locations are indices into the heap arena. The null pointer is not a
/// location: it is represented by [`Value::Null`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Loc(u32);

impl Loc {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Return the index of the location in the heap arena.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for Loc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Contents of a program variable or a cell field.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Value {
    /// The null pointer.
    Null,
    /// Pointer to a symbolic location.
    Ptr(Loc),
    /// Some scalar. Numeric values are not tracked.
    Int,
}

impl Value {
    pub const fn loc(self) -> Option<Loc> {
        match self {
            Value::Ptr(loc) => Some(loc),
            _ => None,
        }
    }

    pub const fn is_null(self) -> bool {
        matches!(self, Value::Null)
    }

    /// Replace pointer `from` by `to`, leaving every other value as is.
    pub fn substituted(self, from: Loc, to: Value) -> Value {
        match self {
            Value::Ptr(loc) if loc == from => to,
            other => other,
        }
    }
}

impl From<Loc> for Value {
    fn from(loc: Loc) -> Self {
        Value::Ptr(loc)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Ptr(loc) => write!(f, "{}", loc),
            Value::Int => write!(f, "int"),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_substituted() {
        let a = Loc::new(1);
        let b = Loc::new(2);
        assert_eq!(Value::Ptr(a).substituted(a, Value::Null), Value::Null);
        assert_eq!(Value::Ptr(b).substituted(a, Value::Null), Value::Ptr(b));
        assert_eq!(Value::Int.substituted(a, Value::Ptr(b)), Value::Int);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Ptr(Loc::new(7)).to_string(), "@7");
        assert_eq!(Value::Null.to_string(), "null");
    }
}
