use std::cmp::Ordering;
use std::fmt::Display;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

/// A decoded value, either raw (as it appears in the packet) or derived (calibrated,
/// labeled, or otherwise converted).
///
/// Integers are kept as `i128` so any signed or unsigned field of up to 64 bits fits
/// without loss.
///
/// Serialized untagged. Deserialization keeps whole numbers as [Value::Integer] and
/// accepts bytes either as a byte string or a sequence of integers.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Integer(i128),
    Float(f64),
    Bool(bool),
    String(String),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("an integer, float, bool, string, or bytes")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Value, E> {
        Ok(Value::Integer(v.into()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Value, E> {
        Ok(Value::Integer(v.into()))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> std::result::Result<Value, E> {
        Ok(Value::Integer(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> std::result::Result<Value, E> {
        i128::try_from(v)
            .map(Value::Integer)
            .map_err(|_| E::custom(format!("integer {v} out of range")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Value, E> {
        Ok(Value::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<Value, E> {
        Ok(Value::Bytes(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(b) = seq.next_element::<u8>()? {
            bytes.push(b);
        }
        Ok(Value::Bytes(bytes))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl Value {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
        }
    }

    /// Numeric view of the value, if it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Interpret `literal` as a value of the same kind as `self`.
    ///
    /// Used to coerce the textual literal of a comparison to the runtime type of the
    /// parameter it is compared against, e.g., `"3.0"` becomes `Float(3.0)` when compared
    /// to a float but fails when compared to an integer.
    ///
    /// # Errors
    /// [Error::Comparison] if the literal cannot be read as the target kind.
    pub fn coerce_literal(&self, literal: &str) -> Result<Value> {
        let lit = literal.trim();
        let fail = || {
            Error::Comparison(format!(
                "unable to coerce {literal:?} to {} for comparison",
                self.type_name()
            ))
        };
        match self {
            Value::Integer(_) => lit.parse::<i128>().map(Value::Integer).map_err(|_| fail()),
            Value::Float(_) => lit.parse::<f64>().map(Value::Float).map_err(|_| fail()),
            Value::Bool(_) => match lit.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            Value::String(_) => Ok(Value::String(literal.to_string())),
            Value::Bytes(_) => Err(fail()),
        }
    }

    /// Order two values. Integers and floats compare numerically with each other, all
    /// other kinds only compare to their own kind.
    ///
    /// # Errors
    /// [Error::Comparison] if the values are not comparable.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        let ordering = match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        };
        ordering.ok_or_else(|| {
            Error::Comparison(format!(
                "cannot compare {} value {self} with {} value {other}",
                self.type_name(),
                other.type_name()
            ))
        })
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Bytes(v) => {
                write!(f, "0x")?;
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Value::Integer(0), "3", Some(Value::Integer(3)); "int")]
    #[test_case(Value::Integer(0), "3.0", None; "int rejects float literal")]
    #[test_case(Value::Float(0.0), "3", Some(Value::Float(3.0)); "float from int literal")]
    #[test_case(Value::Bool(false), "True", Some(Value::Bool(true)); "bool")]
    #[test_case(Value::String(String::new()), "abc", Some(Value::String("abc".into())); "string")]
    #[test_case(Value::Bytes(vec![]), "00", None; "bytes")]
    fn coerce(target: Value, literal: &str, expected: Option<Value>) {
        assert_eq!(target.coerce_literal(literal).ok(), expected);
    }

    #[test]
    fn compare_mixed_numeric() {
        assert_eq!(
            Value::Integer(3).compare(&Value::Float(3.5)).unwrap(),
            Ordering::Less
        );
        assert!(Value::Integer(3)
            .compare(&Value::String("3".into()))
            .is_err());
    }

    #[test]
    fn display_bytes() {
        assert_eq!(Value::Bytes(vec![0xde, 0xad]).to_string(), "0xdead");
    }

    #[test_case("5", Value::Integer(5); "integer")]
    #[test_case("-5", Value::Integer(-5); "negative integer")]
    #[test_case("18446744073709551615", Value::Integer(u64::MAX.into()); "u64 max")]
    #[test_case("2.5", Value::Float(2.5); "float")]
    #[test_case("true", Value::Bool(true); "bool")]
    #[test_case("\"abc\"", Value::String("abc".into()); "string")]
    #[test_case("[1, 255]", Value::Bytes(vec![1, 255]); "bytes")]
    fn json_deserialize(json: &str, expected: Value) {
        assert_eq!(serde_json::from_str::<Value>(json).unwrap(), expected);
    }

    #[test]
    fn bytes_json() {
        assert_eq!(
            serde_json::to_string(&Value::Bytes(vec![1, 2])).unwrap(),
            "[1,2]"
        );
        assert!(serde_json::from_str::<Value>("[256]").is_err());
    }
}
