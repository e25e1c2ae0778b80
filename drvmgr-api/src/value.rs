use crate::Error;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

/// A dynamically-typed cell that can hold any value a variable might
/// report or accept. The manager never performs arithmetic on these --
/// it only compares them for equality and forwards them verbatim, so a
/// closed sum type is enough; there's no need for a generic numeric
/// tower.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Flt(f64),
    Str(String),
    BoolArray(Vec<bool>),
    IntArray(Vec<i64>),
    FltArray(Vec<f64>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Flt(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::BoolArray(v) => write!(f, "{v:?}"),
            Value::IntArray(v) => write!(f, "{v:?}"),
            Value::FltArray(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Flt(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Bool(v) => Ok(v),
            _ => Err(Error::TypeError),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Int(v) => Ok(v),
            _ => Err(Error::TypeError),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Flt(v) => Ok(v),
            _ => Err(Error::TypeError),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Str(v) => Ok(v),
            _ => Err(Error::TypeError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_structural_not_numeric() {
        // The manager only ever does `!=` comparisons; it must not
        // treat an Int and a Flt with the same magnitude as equal.
        assert_ne!(Value::Int(1), Value::Flt(1.0));
        assert_eq!(Value::Int(1), Value::Int(1));
    }

    #[test]
    fn round_trips_through_json() {
        let values = vec![
            Value::Bool(true),
            Value::Int(-7),
            Value::Flt(2.5),
            Value::Str("hi".into()),
            Value::IntArray(vec![1, 2, 3]),
        ];

        for v in values {
            let encoded = serde_json::to_string(&v).unwrap();
            let decoded: Value = serde_json::from_str(&encoded).unwrap();

            assert_eq!(v, decoded);
        }
    }
}
