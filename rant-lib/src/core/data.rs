//! Deals with run-time data representation
//!
//! Values are dynamically typed. Operations between types that don't fit together never fail,
//! they produce [Undefined](RuntimeObject::Undefined) (or "not comparable" for comparisons).
//! The single exception is division by zero, which is an error the vm has to raise.
//! Binary operations always read as `self op rhs`.

use std::fmt;

use thiserror::Error;

use crate::output::format::{format_number, NumberFormat};

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeObject {
    Number(f64),
    String(String),
    Boolean(bool),
    List(Vec<RuntimeObject>),
    /// address of an instruction in the running program
    Pointer(usize),
    Null,
    Undefined,
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ArithmeticError {
    #[error("Attempted to divide {0} by zero")]
    DivideByZero(f64),
}

/// Result of a three-way comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparison {
    Less,
    Equal,
    Greater,
    /// comparable, but only for equality, and the values differ
    Unequal,
    #[default]
    Incomparable,
}

impl Comparison {
    pub fn is_equal(self) -> bool {
        self == Comparison::Equal
    }

    pub fn is_unequal(self) -> bool {
        matches!(
            self,
            Comparison::Less | Comparison::Greater | Comparison::Unequal
        )
    }
}

impl From<f64> for RuntimeObject {
    fn from(value: f64) -> Self {
        RuntimeObject::Number(value)
    }
}

impl From<String> for RuntimeObject {
    fn from(value: String) -> Self {
        RuntimeObject::String(value)
    }
}

impl From<&str> for RuntimeObject {
    fn from(value: &str) -> Self {
        RuntimeObject::String(value.to_owned())
    }
}

impl From<bool> for RuntimeObject {
    fn from(value: bool) -> Self {
        RuntimeObject::Boolean(value)
    }
}

impl RuntimeObject {
    pub fn type_name(&self) -> &'static str {
        match self {
            RuntimeObject::Number(_) => "number",
            RuntimeObject::String(_) => "string",
            RuntimeObject::Boolean(_) => "boolean",
            RuntimeObject::List(_) => "list",
            RuntimeObject::Pointer(_) => "pointer",
            RuntimeObject::Null => "null",
            RuntimeObject::Undefined => "undefined",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            RuntimeObject::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Converts to a Number where that makes sense, otherwise Undefined.
    pub fn to_number(&self) -> RuntimeObject {
        match self {
            RuntimeObject::Number(n) => RuntimeObject::Number(*n),
            RuntimeObject::String(s) => s
                .trim()
                .parse::<f64>()
                .map_or(RuntimeObject::Undefined, RuntimeObject::Number),
            RuntimeObject::Boolean(b) => RuntimeObject::Number(if *b { 1.0 } else { 0.0 }),
            _ => RuntimeObject::Undefined,
        }
    }

    /// formats the value, using `format` for numbers
    pub fn display_with(&self, format: NumberFormat) -> String {
        match self {
            RuntimeObject::Number(n) => format_number(*n, format),
            RuntimeObject::List(items) => {
                let inner: Vec<_> = items.iter().map(|i| i.display_with(format)).collect();
                format!("({})", inner.join(", "))
            }
            other => other.to_string(),
        }
    }

    pub fn add(&self, rhs: &RuntimeObject) -> RuntimeObject {
        use RuntimeObject::*;
        match (self, rhs) {
            (Number(a), Number(b)) => Number(a + b),
            (String(_), Number(_)) | (String(_), String(_)) | (Number(_), String(_)) => {
                self.concat(rhs)
            }
            _ => Undefined,
        }
    }

    pub fn sub(&self, rhs: &RuntimeObject) -> RuntimeObject {
        match (self, rhs) {
            (RuntimeObject::Number(a), RuntimeObject::Number(b)) => RuntimeObject::Number(a - b),
            _ => RuntimeObject::Undefined,
        }
    }

    pub fn mul(&self, rhs: &RuntimeObject) -> RuntimeObject {
        use RuntimeObject::*;
        match (self, rhs) {
            (Number(a), Number(b)) => Number(a * b),
            (String(s), Number(n)) => {
                let count = if n.is_finite() && *n > 0.0 { *n as usize } else { 0 };
                String(s.repeat(count))
            }
            _ => Undefined,
        }
    }

    pub fn div(&self, rhs: &RuntimeObject) -> Result<RuntimeObject, ArithmeticError> {
        match (self, rhs) {
            (RuntimeObject::Number(a), RuntimeObject::Number(b)) => {
                if *b == 0.0 {
                    Err(ArithmeticError::DivideByZero(*a))
                } else {
                    Ok(RuntimeObject::Number(a / b))
                }
            }
            _ => Ok(RuntimeObject::Undefined),
        }
    }

    pub fn rem(&self, rhs: &RuntimeObject) -> Result<RuntimeObject, ArithmeticError> {
        match (self, rhs) {
            (RuntimeObject::Number(a), RuntimeObject::Number(b)) => {
                if *b == 0.0 {
                    Err(ArithmeticError::DivideByZero(*a))
                } else {
                    Ok(RuntimeObject::Number(a % b))
                }
            }
            _ => Ok(RuntimeObject::Undefined),
        }
    }

    /// concatenates the display forms of both values, works for every pair of types
    pub fn concat(&self, rhs: &RuntimeObject) -> RuntimeObject {
        RuntimeObject::String(format!("{self}{rhs}"))
    }

    pub fn compare(&self, rhs: &RuntimeObject) -> Comparison {
        use RuntimeObject::*;
        let equality = |equal: bool| {
            if equal {
                Comparison::Equal
            } else {
                Comparison::Unequal
            }
        };
        match (self, rhs) {
            (Number(a), Number(b)) => match a.partial_cmp(b) {
                Some(std::cmp::Ordering::Less) => Comparison::Less,
                Some(std::cmp::Ordering::Equal) => Comparison::Equal,
                Some(std::cmp::Ordering::Greater) => Comparison::Greater,
                None => Comparison::Incomparable,
            },
            (String(a), String(b)) => equality(a == b),
            (Boolean(a), Boolean(b)) => equality(a == b),
            (Pointer(a), Pointer(b)) => equality(a == b),
            (Null, Null) => Comparison::Equal,
            _ => Comparison::Incomparable,
        }
    }
}

impl fmt::Display for RuntimeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeObject::Number(n) => write!(f, "{}", format_number(*n, NumberFormat::Normal)),
            RuntimeObject::String(s) => write!(f, "{s}"),
            RuntimeObject::Boolean(b) => write!(f, "{b}"),
            RuntimeObject::List(_) => write!(f, "{}", self.display_with(NumberFormat::Normal)),
            RuntimeObject::Pointer(address) => write!(f, "@0x{address:x}"),
            RuntimeObject::Null => write!(f, "null"),
            RuntimeObject::Undefined => write!(f, "???"),
        }
    }
}
