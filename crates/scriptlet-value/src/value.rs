//! The dynamic value tree.

use std::fmt;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq};

use crate::ser::ORDERED_DICT_TOKEN;

/// String-keyed dictionary. Keeps insertion order.
pub type Dict = IndexMap<String, DynamicValue>;

/// A generic, self-describing value handed to scriptlets.
///
/// Values are built by [`crate::to_dynamic`] and are immutable once built.
/// Dictionary key order is deterministic: records keep field declaration
/// order, maps are sorted by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DynamicValue {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    List(Vec<DynamicValue>),
    Dict(Dict),
}

impl DynamicValue {
    /// Short name of the value kind, as reported in errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            DynamicValue::None => "none",
            DynamicValue::Bool(_) => "bool",
            DynamicValue::Int(_) => "int",
            DynamicValue::Uint(_) => "uint",
            DynamicValue::Float(_) => "float",
            DynamicValue::String(_) => "string",
            DynamicValue::List(_) => "list",
            DynamicValue::Dict(_) => "dict",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DynamicValue::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynamicValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[DynamicValue]> {
        match self {
            DynamicValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            DynamicValue::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    /// Look up a key if this value is a dictionary.
    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.as_dict().and_then(|dict| dict.get(key))
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynamicValue::None => write!(f, "None"),
            DynamicValue::Bool(b) => write!(f, "{b}"),
            DynamicValue::Int(i) => write!(f, "{i}"),
            DynamicValue::Uint(u) => write!(f, "{u}"),
            DynamicValue::Float(x) => write!(f, "{x:?}"),
            DynamicValue::String(s) => write!(f, "{s:?}"),
            DynamicValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            DynamicValue::Dict(dict) => {
                write!(f, "{{")?;
                for (i, (key, value)) in dict.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key:?}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Serialize for DynamicValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DynamicValue::None => serializer.serialize_none(),
            DynamicValue::Bool(b) => serializer.serialize_bool(*b),
            DynamicValue::Int(i) => serializer.serialize_i64(*i),
            DynamicValue::Uint(u) => serializer.serialize_u64(*u),
            DynamicValue::Float(x) => serializer.serialize_f64(*x),
            DynamicValue::String(s) => serializer.serialize_str(s),
            DynamicValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            // Other serializers see a plain map; ours keeps the order as is.
            DynamicValue::Dict(dict) => {
                serializer.serialize_newtype_struct(ORDERED_DICT_TOKEN, &Entries(dict))
            }
        }
    }
}

struct Entries<'a>(&'a Dict);

impl Serialize for Entries<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl From<bool> for DynamicValue {
    fn from(b: bool) -> Self {
        DynamicValue::Bool(b)
    }
}

impl From<i64> for DynamicValue {
    fn from(i: i64) -> Self {
        DynamicValue::Int(i)
    }
}

impl From<u64> for DynamicValue {
    fn from(u: u64) -> Self {
        DynamicValue::Uint(u)
    }
}

impl From<f64> for DynamicValue {
    fn from(x: f64) -> Self {
        DynamicValue::Float(x)
    }
}

impl From<&str> for DynamicValue {
    fn from(s: &str) -> Self {
        DynamicValue::String(s.to_string())
    }
}

impl From<String> for DynamicValue {
    fn from(s: String) -> Self {
        DynamicValue::String(s)
    }
}

impl From<Vec<DynamicValue>> for DynamicValue {
    fn from(items: Vec<DynamicValue>) -> Self {
        DynamicValue::List(items)
    }
}

impl From<Dict> for DynamicValue {
    fn from(dict: Dict) -> Self {
        DynamicValue::Dict(dict)
    }
}

impl FromIterator<(String, DynamicValue)> for DynamicValue {
    fn from_iter<I: IntoIterator<Item = (String, DynamicValue)>>(iter: I) -> Self {
        DynamicValue::Dict(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DynamicValue {
        DynamicValue::from_iter([
            ("name".to_string(), DynamicValue::from("node1")),
            ("cores".to_string(), DynamicValue::Uint(8)),
            (
                "roles".to_string(),
                DynamicValue::List(vec!["database".into(), "event-hub".into()]),
            ),
        ])
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(
            sample().to_string(),
            r#"{"name": "node1", "cores": 8, "roles": ["database", "event-hub"]}"#
        );
        assert_eq!(DynamicValue::None.to_string(), "None");
        assert_eq!(DynamicValue::Float(1.0).to_string(), "1.0");
    }

    #[test]
    fn get_reads_dict_entries() {
        let value = sample();
        assert_eq!(value.get("name").and_then(DynamicValue::as_str), Some("node1"));
        assert!(value.get("missing").is_none());
        assert!(DynamicValue::Int(1).get("name").is_none());
    }

    #[test]
    fn json_output_keeps_dict_order() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, r#"{"name":"node1","cores":8,"roles":["database","event-hub"]}"#);
    }

    #[test]
    fn type_names() {
        assert_eq!(DynamicValue::None.type_name(), "none");
        assert_eq!(DynamicValue::Uint(1).type_name(), "uint");
        assert_eq!(sample().type_name(), "dict");
    }
}
