//! This module defines [DataValue], the representation of a single
//! column value stored in a [Table][crate::tabular::table::Table].

use std::fmt::Display;

/// Type of a [DataValue]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueDomain {
    /// 64-bit signed integers
    Integer,
    /// Unicode strings
    String,
    /// Boolean values
    Boolean,
    /// The unlabeled null
    Null,
    /// Terms produced by skolem functions
    Skolem,
}

/// A value stored in a table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataValue {
    /// Integer value
    Integer(i64),
    /// String value
    String(String),
    /// Boolean value
    Boolean(bool),
    /// Missing value, e.g. in an outer union
    Null,
    /// Value invented by a skolem function for an existentially quantified position
    Skolem {
        /// Name of the skolem function
        function: String,
        /// Arguments the function was applied to
        arguments: Vec<DataValue>,
    },
}

impl DataValue {
    /// Create a new [DataValue::String].
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Create a new [DataValue::Skolem].
    pub fn skolem(function: impl Into<String>, arguments: Vec<DataValue>) -> Self {
        Self::Skolem {
            function: function.into(),
            arguments,
        }
    }

    /// Return the [ValueDomain] of this value.
    pub fn domain(&self) -> ValueDomain {
        match self {
            DataValue::Integer(_) => ValueDomain::Integer,
            DataValue::String(_) => ValueDomain::String,
            DataValue::Boolean(_) => ValueDomain::Boolean,
            DataValue::Null => ValueDomain::Null,
            DataValue::Skolem { .. } => ValueDomain::Skolem,
        }
    }

    /// Return whether this value is [DataValue::Null].
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }
}

impl Display for DataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataValue::Integer(value) => write!(f, "{value}"),
            DataValue::String(value) => write!(f, "{value:?}"),
            DataValue::Boolean(value) => write!(f, "{value}"),
            DataValue::Null => f.write_str("null"),
            DataValue::Skolem {
                function,
                arguments,
            } => {
                write!(f, "{function}(")?;
                for (index, argument) in arguments.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{argument}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

#[cfg(test)]
mod test {
    use super::{DataValue, ValueDomain};

    #[test]
    fn display_skolem() {
        let value = DataValue::skolem("f_m1_z", vec![DataValue::Integer(1), "a".into()]);
        assert_eq!(value.to_string(), "f_m1_z(1, \"a\")");
        assert_eq!(value.domain(), ValueDomain::Skolem);
    }

    #[test]
    fn null_is_detected() {
        assert!(DataValue::Null.is_null());
        assert!(!DataValue::Boolean(false).is_null());
    }
}
