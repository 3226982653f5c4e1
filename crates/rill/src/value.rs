//! Runtime value model.
//!
//! This is the data type stored in the value store and passed through
//! derivations. It must implement Clone, Debug, Ord, Hash so values can be
//! compared for change detection and used as map keys (keyed list
//! mutations). No engine or protocol dependencies.

use ordered_float::OrderedFloat;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A runtime value.
///
/// `Pending` is the placeholder written for an async derivation that has
/// been dispatched but not yet completed. It is distinct from every real
/// value, including `Unit`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    /// No value / null
    Unit,
    /// Boolean
    Bool(bool),
    /// Number (f64 with total ordering)
    Number(OrderedFloat<f64>),
    /// Text string
    Text(Arc<str>),
    /// Ordered list
    List(Arc<Vec<Value>>),
    /// Record with named fields
    Record(Arc<BTreeMap<Arc<str>, Value>>),
    /// Async derivation dispatched, result not yet arrived
    Pending,
}

impl Value {
    pub fn number(n: f64) -> Self {
        Value::Number(OrderedFloat(n))
    }

    pub fn text(s: impl Into<Arc<str>>) -> Self {
        Value::Text(s.into())
    }

    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(items.into_iter().collect()))
    }

    pub fn record(fields: impl IntoIterator<Item = (impl Into<Arc<str>>, Value)>) -> Self {
        Value::Record(Arc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n.0),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn get_field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.get(name),
            _ => None,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Unit)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Value::Pending)
    }

    /// Truthiness under the client's boolean coercion rules:
    /// Unit, false, 0, NaN and empty text are falsy; everything else
    /// (including empty lists and records) is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Unit | Value::Pending => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.0 != 0.0 && !n.0.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::List(_) | Value::Record(_) => true,
        }
    }

    /// Blank check: Unit, or text that is empty / whitespace only.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Unit => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Replace a record field, building a new record.
    pub fn with_field(&self, name: impl Into<Arc<str>>, value: Value) -> Value {
        let mut fields = match self {
            Value::Record(fields) => (**fields).clone(),
            _ => BTreeMap::new(),
        };
        fields.insert(name.into(), value);
        Value::Record(Arc::new(fields))
    }
}

/// Display form used by text concatenation: numbers drop a trailing `.0`
/// so they match the client's number-to-string conversion.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.0.fract() == 0.0 && n.0.is_finite() && n.0.abs() < 1e15 {
                    write!(f, "{}", n.0 as i64)
                } else {
                    write!(f, "{}", n.0)
                }
            }
            Value::Text(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (index, (name, value)) in fields.iter().enumerate() {
                    if index > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{name}:{value}")?;
                }
                write!(f, "}}")
            }
            Value::Pending => write!(f, "pending"),
        }
    }
}

/// Serializes to plain JSON shapes (`Unit` and `Pending` both become
/// `null`), so projections sent to the client read naturally.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Unit | Value::Pending => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(n.0),
            Value::Text(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Record(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields.iter() {
                    map.serialize_entry(name.as_ref(), value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("null, a bool, a number, a string, an array or an object")
            }

            fn visit_unit<E>(self) -> Result<Value, E> {
                Ok(Value::Unit)
            }

            fn visit_none<E>(self) -> Result<Value, E> {
                Ok(Value::Unit)
            }

            fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
                Value::deserialize(deserializer)
            }

            fn visit_bool<E>(self, b: bool) -> Result<Value, E> {
                Ok(Value::Bool(b))
            }

            fn visit_i64<E>(self, n: i64) -> Result<Value, E> {
                Ok(Value::number(n as f64))
            }

            fn visit_u64<E>(self, n: u64) -> Result<Value, E> {
                Ok(Value::number(n as f64))
            }

            fn visit_f64<E>(self, n: f64) -> Result<Value, E> {
                Ok(Value::number(n))
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
                Ok(Value::text(s))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Value::List(Arc::new(items)))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
                let mut fields = BTreeMap::new();
                while let Some((name, value)) = map.next_entry::<String, Value>()? {
                    fields.insert(Arc::from(name.as_str()), value);
                }
                Ok(Value::Record(Arc::new(fields)))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}
