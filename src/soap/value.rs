//! SOAP values and their plain normalized form.
//!
//! The admin service speaks rpc/encoded SOAP, where associative arrays travel
//! as arrays of `{key, value}` structs and single elements are often wrapped
//! in an `item` struct. [`normalize`] flattens those shapes into plain
//! mappings and sequences; [`denormalize`] builds the wire shape back for
//! outgoing arguments.
//!
//! `normalize(denormalize(v)) == v` does not hold in general: a mapping whose
//! entries collapse from ambiguous single-item wrappers cannot be told apart
//! from a plain value once on the wire.

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A list mixed key/value entries with plain values.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("inconsistent array in SOAP response: key/value entries mixed with plain values")]
pub struct NormalizationConflict;

/// Primitive SOAP value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Truthiness with the coercions the admin service applies to flags
    pub fn truthy(&self) -> bool {
        match self {
            Scalar::Null => false,
            Scalar::Bool(b) => *b,
            Scalar::Int(n) => *n != 0,
            Scalar::Float(f) => *f != 0.0,
            Scalar::String(s) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(n) => Some(*n as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::String(s) => s.trim().parse().ok(),
            Scalar::Bool(_) | Scalar::Null => None,
        }
    }

    /// Text used when the scalar becomes a mapping key
    pub fn to_key(&self) -> String {
        match self {
            Scalar::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, ""),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}

/// Value as it travels on the SOAP wire
#[derive(Debug, Clone, PartialEq)]
pub enum SoapValue {
    /// Primitive value
    Scalar(Scalar),
    /// `SOAP-ENC:Array`
    List(Vec<SoapValue>),
    /// Apache `Map`, keyed entries in wire order
    AssocArray(IndexMap<String, SoapValue>),
    /// Compound value; `item` or `key`/`value` fields carry wrapper semantics
    Struct(IndexMap<String, SoapValue>),
}

impl SoapValue {
    /// String scalar
    pub fn string(s: impl Into<String>) -> Self {
        SoapValue::Scalar(Scalar::String(s.into()))
    }

    /// Integer scalar
    pub fn int(n: i64) -> Self {
        SoapValue::Scalar(Scalar::Int(n))
    }

    /// Boolean scalar
    pub fn bool(b: bool) -> Self {
        SoapValue::Scalar(Scalar::Bool(b))
    }

    /// Struct built from `(field, value)` pairs in order
    pub fn structure<K: Into<String>>(fields: impl IntoIterator<Item = (K, SoapValue)>) -> Self {
        SoapValue::Struct(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// `{key, value}` struct used for associative entries
    pub fn key_value(key: impl Into<String>, value: SoapValue) -> Self {
        Self::structure([("key", SoapValue::string(key)), ("value", value)])
    }
}

/// Plain value produced from a SOAP response
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedValue {
    Scalar(Scalar),
    Sequence(Vec<NormalizedValue>),
    Mapping(IndexMap<String, NormalizedValue>),
}

impl NormalizedValue {
    /// Empty mapping
    pub fn mapping() -> Self {
        NormalizedValue::Mapping(IndexMap::new())
    }

    /// Field of a mapping
    pub fn get(&self, key: &str) -> Option<&NormalizedValue> {
        match self {
            NormalizedValue::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    /// Follow a dotted path (`general.system_in_maintenance`) through mappings
    pub fn get_path(&self, path: &str) -> Option<&NormalizedValue> {
        path.split('.')
            .try_fold(self, |node, segment| node.get(segment))
    }

    /// Store `value` at a dotted path, creating intermediate mappings.
    ///
    /// Non-mapping nodes along the path are replaced.
    pub fn set_path(&mut self, path: &str, value: NormalizedValue) {
        if !matches!(self, NormalizedValue::Mapping(_)) {
            *self = NormalizedValue::mapping();
        }

        if let NormalizedValue::Mapping(map) = self {
            match path.split_once('.') {
                None => {
                    map.insert(path.to_string(), value);
                }
                Some((head, rest)) => map
                    .entry(head.to_string())
                    .or_insert_with(NormalizedValue::mapping)
                    .set_path(rest, value),
            }
        }
    }

    /// Mapping entries, if this is a mapping
    pub fn as_mapping(&self) -> Option<&IndexMap<String, NormalizedValue>> {
        match self {
            NormalizedValue::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// String form of a scalar
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NormalizedValue::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Number of entries of a sequence or mapping, zero for scalars
    pub fn len(&self) -> usize {
        match self {
            NormalizedValue::Scalar(_) => 0,
            NormalizedValue::Sequence(items) => items.len(),
            NormalizedValue::Mapping(map) => map.len(),
        }
    }

    /// True for empty collections and for scalars
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Truthiness: collections are true when non-empty
    pub fn truthy(&self) -> bool {
        match self {
            NormalizedValue::Scalar(s) => s.truthy(),
            other => !other.is_empty(),
        }
    }

    /// Loose equality used to decide whether a setting must change.
    ///
    /// Booleans compare by truthiness, numbers numerically (numeric strings
    /// included); collections compare entry by entry.
    pub fn loose_eq(&self, other: &NormalizedValue) -> bool {
        use NormalizedValue::{Mapping, Scalar as S, Sequence};

        match (self, other) {
            (S(Scalar::Bool(b)), x) | (x, S(Scalar::Bool(b))) => *b == x.truthy(),
            (S(Scalar::Null), x) | (x, S(Scalar::Null)) => !x.truthy(),
            (S(a), S(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => a.to_key() == b.to_key(),
            },
            (Sequence(a), Sequence(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Mapping(a), Mapping(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.loose_eq(w)))
            }
            _ => false,
        }
    }

    /// Key text for a value promoted to a mapping key
    fn into_key(self) -> String {
        match self {
            NormalizedValue::Scalar(s) => s.to_key(),
            other => Value::from(other).to_string(),
        }
    }
}

impl From<&Value> for NormalizedValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => NormalizedValue::Scalar(Scalar::Null),
            Value::Bool(b) => NormalizedValue::Scalar(Scalar::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => NormalizedValue::Scalar(Scalar::Int(i)),
                None => NormalizedValue::Scalar(Scalar::Float(n.as_f64().unwrap_or_default())),
            },
            Value::String(s) => NormalizedValue::Scalar(Scalar::String(s.clone())),
            Value::Array(items) => NormalizedValue::Sequence(items.iter().map(Into::into).collect()),
            Value::Object(map) => NormalizedValue::Mapping(
                map.iter().map(|(k, v)| (k.clone(), v.into())).collect(),
            ),
        }
    }
}

impl From<NormalizedValue> for Value {
    fn from(value: NormalizedValue) -> Self {
        match value {
            NormalizedValue::Scalar(Scalar::Null) => Value::Null,
            NormalizedValue::Scalar(Scalar::Bool(b)) => Value::Bool(b),
            NormalizedValue::Scalar(Scalar::Int(n)) => Value::from(n),
            NormalizedValue::Scalar(Scalar::Float(f)) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            NormalizedValue::Scalar(Scalar::String(s)) => Value::String(s),
            NormalizedValue::Sequence(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            NormalizedValue::Mapping(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Flatten a SOAP value into plain mappings and sequences.
pub fn normalize(value: &SoapValue) -> Result<NormalizedValue, NormalizationConflict> {
    normalize_tagged(value).map(|(normalized, _)| normalized)
}

/// Normalize `value` and report whether it is a set of key/value entries.
///
/// Only entries are merged when they share a list. Plain structs and
/// associative arrays normalize to mappings too, but stay list elements.
fn normalize_tagged(value: &SoapValue) -> Result<(NormalizedValue, bool), NormalizationConflict> {
    match value {
        SoapValue::Scalar(s) => Ok((NormalizedValue::Scalar(s.clone()), false)),
        SoapValue::Struct(fields) => {
            if fields.len() == 1 {
                if let Some(inner) = fields.get("item") {
                    return normalize_tagged(inner);
                }
            }

            if fields.len() == 2 {
                if let (Some(key), Some(val)) = (fields.get("key"), fields.get("value")) {
                    let mut entry = IndexMap::with_capacity(1);
                    entry.insert(normalize(key)?.into_key(), normalize(val)?);
                    return Ok((NormalizedValue::Mapping(entry), true));
                }
            }

            Ok((normalize_fields(fields)?, false))
        }
        SoapValue::AssocArray(entries) => Ok((normalize_fields(entries)?, false)),
        SoapValue::List(items) => normalize_list(items),
    }
}

fn normalize_fields(
    fields: &IndexMap<String, SoapValue>,
) -> Result<NormalizedValue, NormalizationConflict> {
    fields
        .iter()
        .map(|(k, v)| Ok((k.clone(), normalize(v)?)))
        .collect::<Result<IndexMap<_, _>, _>>()
        .map(NormalizedValue::Mapping)
}

fn normalize_list(items: &[SoapValue]) -> Result<(NormalizedValue, bool), NormalizationConflict> {
    enum Acc {
        Empty,
        Merged(IndexMap<String, NormalizedValue>),
        Items(Vec<NormalizedValue>),
    }

    let mut acc = Acc::Empty;

    for item in items {
        acc = match (acc, normalize_tagged(item)?) {
            (Acc::Empty, (NormalizedValue::Mapping(map), true)) => Acc::Merged(map),
            (Acc::Merged(mut merged), (NormalizedValue::Mapping(map), true)) => {
                // later keys overwrite earlier ones
                merged.extend(map);
                Acc::Merged(merged)
            }
            (Acc::Empty, (other, false)) => Acc::Items(vec![other]),
            (Acc::Items(mut list), (other, false)) => {
                list.push(other);
                Acc::Items(list)
            }
            _ => return Err(NormalizationConflict),
        };
    }

    Ok(match acc {
        Acc::Empty => (NormalizedValue::Sequence(Vec::new()), false),
        Acc::Merged(map) => (NormalizedValue::Mapping(map), true),
        Acc::Items(list) => (NormalizedValue::Sequence(list), false),
    })
}

/// Build the wire shape of an outgoing argument.
///
/// Mappings become a list of `{key, value}` structs in insertion order.
pub fn denormalize(value: &NormalizedValue) -> SoapValue {
    match value {
        NormalizedValue::Scalar(s) => SoapValue::Scalar(s.clone()),
        NormalizedValue::Sequence(items) => SoapValue::List(items.iter().map(denormalize).collect()),
        NormalizedValue::Mapping(map) => SoapValue::List(
            map.iter()
                .map(|(k, v)| SoapValue::key_value(k.clone(), denormalize(v)))
                .collect(),
        ),
    }
}
