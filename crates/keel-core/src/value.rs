use crate::key::Key;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

///
/// Value
///
/// Dynamic field-value vocabulary shared by records, converters, filters and
/// sorters. `Date` is milliseconds since the Unix epoch, so date equality and
/// ordering are timestamp comparisons by construction.
///

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(i64),
    List(Vec<Value>),
}

impl Value {
    /// Returns `true` for `Value::Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value, if it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) | Self::Date(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    /// Integer view of the value, if it converts losslessly.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) | Self::Date(n) => Some(*n),
            Self::Float(n) if n.fract() == 0.0 => Some(*n as i64),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Key view of the value for identity fields.
    /// `Null` has no key; numbers key by their decimal text form.
    #[must_use]
    pub fn as_key(&self) -> Option<Key> {
        match self {
            Self::Text(s) => Some(Key::from(s.as_str())),
            Self::Int(n) | Self::Date(n) => Some(Key::from(*n)),
            Self::Float(n) => Some(Key::from(n.to_string())),
            Self::Bool(b) => Some(Key::from(b.to_string())),
            Self::Null | Self::List(_) => None,
        }
    }

    /// Total ordering used by sorters and groupers.
    ///
    /// Same-kind values compare naturally; numeric kinds (`Int`, `Float`,
    /// `Date`, `Bool`) cross-compare numerically with `total_cmp` so `NaN`
    /// has a stable position. Otherwise kinds order by tag with `Null` first.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::List(a), Self::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.compare(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.tag().cmp(&other.tag()),
            },
        }
    }

    const fn tag(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::Date(_) => 4,
            Self::Text(_) => 5,
            Self::List(_) => 6,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) | Self::Date(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::List(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_not_equal_to_itself() {
        assert_ne!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn dates_compare_by_timestamp() {
        assert_eq!(Value::Date(100), Value::Date(100));
        assert_eq!(Value::Date(100).compare(&Value::Date(200)), Ordering::Less);
    }

    #[test]
    fn numeric_kinds_cross_compare() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Float(3.0).compare(&Value::Int(3)), Ordering::Equal);
    }

    #[test]
    fn null_sorts_first() {
        assert_eq!(Value::Null.compare(&Value::Text("a".into())), Ordering::Less);
    }

    #[test]
    fn key_projection_normalizes_numbers() {
        assert_eq!(Value::Int(7).as_key(), Some(Key::from("7")));
        assert_eq!(Value::Null.as_key(), None);
    }

    #[test]
    fn json_maps_onto_the_untagged_vocabulary() {
        let value: Value = serde_json::from_str(r#"[1, 2.5, "a", true, null]"#).expect("json");
        assert_eq!(
            value,
            Value::List(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::Text("a".into()),
                Value::Bool(true),
                Value::Null,
            ])
        );
    }
}
