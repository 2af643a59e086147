//! Bind table and bind resolution
//!
//! The grammar keeps literals out of the parse tree: every literal becomes a
//! `(kind, rawValue)` entry in a [`BindTable`] and the tree carries a
//! `{"bind": <index>}` or `{"bind": "@alias"}` reference in its place.
//!
//! Multi-value binds (used by `in`) arrive in two shapes: an array of
//! separate bind references, or one bind whose raw value is itself an array
//! of `[kind, value]` tuples. [`extract_bind_tuple_values`] accepts both.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::error::FilterError;
use super::types::FilterValue;
use crate::utils::time::{millis_to_datetime, parse_date_value};

// ============================================================================
// BIND KINDS
// ============================================================================

/// Kind tag of a bind entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BindKind {
    Text,
    Real,
    Boolean,
    Date,
    DateTime,
    Null,
    Duration,
    /// Unrecognized kind; its raw value passes through unchanged
    Other(String),
}

impl BindKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Text" => Self::Text,
            "Real" => Self::Real,
            "Boolean" => Self::Boolean,
            "Date" => Self::Date,
            "DateTime" => Self::DateTime,
            "Null" => Self::Null,
            "Duration" => Self::Duration,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "Text",
            Self::Real => "Real",
            Self::Boolean => "Boolean",
            Self::Date => "Date",
            Self::DateTime => "DateTime",
            Self::Null => "Null",
            Self::Duration => "Duration",
            Self::Other(tag) => tag,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for BindKind {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<BindKind> for String {
    fn from(kind: BindKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for BindKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// BIND ENTRIES AND REFERENCES
// ============================================================================

/// One `(kind, rawValue)` pair
#[derive(Debug, Clone, PartialEq)]
pub struct BindEntry {
    pub kind: BindKind,
    pub value: JsonValue,
}

impl BindEntry {
    pub fn new(kind: BindKind, value: JsonValue) -> Self {
        Self { kind, value }
    }

    /// Read a `[kind, value]` tuple
    pub fn from_tuple(tuple: &JsonValue) -> Option<Self> {
        match tuple.as_array()?.as_slice() {
            [JsonValue::String(tag), value] => Some(Self::new(BindKind::from_tag(tag), value.clone())),
            _ => None,
        }
    }

    pub fn to_tuple(&self) -> JsonValue {
        JsonValue::Array(vec![
            JsonValue::String(self.kind.as_str().to_string()),
            self.value.clone(),
        ])
    }
}

/// Placeholder pointing into a [`BindTable`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindRef {
    Index(usize),
    Alias(String),
}

impl BindRef {
    /// Read a bind reference out of a raw node.
    ///
    /// Matches an object whose `bind` is a non-negative integer or a string
    /// starting with `@`.
    pub fn from_node(node: &JsonValue) -> Option<Self> {
        match node.as_object()?.get("bind")? {
            JsonValue::Number(n) => n
                .as_u64()
                .and_then(|i| usize::try_from(i).ok())
                .map(Self::Index),
            JsonValue::String(s) if s.starts_with('@') => Some(Self::Alias(s.clone())),
            _ => None,
        }
    }

    pub fn to_node(&self) -> JsonValue {
        match self {
            Self::Index(i) => serde_json::json!({ "bind": i }),
            Self::Alias(a) => serde_json::json!({ "bind": a }),
        }
    }
}

impl fmt::Display for BindRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{}", i),
            Self::Alias(a) => write!(f, "{}", a),
        }
    }
}

/// True if `value` is a bind reference
pub fn is_bind_reference(value: &JsonValue) -> bool {
    BindRef::from_node(value).is_some()
}

// ============================================================================
// BIND TABLE
// ============================================================================

/// Bind entries addressable by index or by `@alias`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindTable {
    entries: Vec<BindEntry>,
    aliases: FxHashMap<String, BindEntry>,
}

impl BindTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an index-addressed entry and return its reference
    pub fn push(&mut self, entry: BindEntry) -> BindRef {
        self.entries.push(entry);
        BindRef::Index(self.entries.len() - 1)
    }

    /// Define or replace an alias entry; a missing `@` prefix is added
    pub fn insert_alias(&mut self, alias: &str, entry: BindEntry) -> BindRef {
        let name = if alias.starts_with('@') {
            alias.to_string()
        } else {
            format!("@{}", alias)
        };
        self.aliases.insert(name.clone(), entry);
        BindRef::Alias(name)
    }

    pub fn get(&self, reference: &BindRef) -> Option<&BindEntry> {
        match reference {
            BindRef::Index(i) => self.entries.get(*i),
            BindRef::Alias(a) => self.aliases.get(a),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.aliases.is_empty()
    }

    /// Build a table from its JSON form.
    ///
    /// Accepts an array of `[kind, value]` tuples (index-addressed) or an
    /// object keyed by decimal index or `@alias`. Object indexes must be
    /// contiguous from zero.
    pub fn from_json(value: &JsonValue) -> Result<Self, FilterError> {
        let mut table = Self::new();
        match value {
            JsonValue::Array(tuples) => {
                for tuple in tuples {
                    let entry = BindEntry::from_tuple(tuple).ok_or_else(|| FilterError::unresolvable(tuple))?;
                    table.push(entry);
                }
            }
            JsonValue::Object(map) => {
                let mut indexed: Vec<(usize, BindEntry)> = Vec::new();
                for (key, tuple) in map {
                    let entry = BindEntry::from_tuple(tuple).ok_or_else(|| FilterError::unresolvable(tuple))?;
                    if key.starts_with('@') {
                        table.insert_alias(key, entry);
                    } else {
                        let index = key
                            .parse::<usize>()
                            .map_err(|_| FilterError::InvalidBindReference(key.clone()))?;
                        indexed.push((index, entry));
                    }
                }
                indexed.sort_by_key(|(index, _)| *index);
                for (expected, (index, entry)) in indexed.into_iter().enumerate() {
                    if index != expected {
                        return Err(FilterError::InvalidBindReference(index.to_string()));
                    }
                    table.push(entry);
                }
            }
            JsonValue::Null => {}
            other => return Err(FilterError::unresolvable(other)),
        }
        Ok(table)
    }

    /// JSON form: an object keyed by index and alias
    pub fn to_json(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        for (i, entry) in self.entries.iter().enumerate() {
            map.insert(i.to_string(), entry.to_tuple());
        }
        let mut aliases: Vec<_> = self.aliases.iter().collect();
        aliases.sort_by(|a, b| a.0.cmp(b.0));
        for (alias, entry) in aliases {
            map.insert(alias.clone(), entry.to_tuple());
        }
        JsonValue::Object(map)
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// Result of resolving one bind
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedBind {
    Value(FilterValue),
    /// Raw array payload, left for [`extract_bind_tuple_values`]
    Array(Vec<JsonValue>),
}

/// Look up `reference` in `table` and resolve it by kind
pub fn resolve_bind(table: &BindTable, reference: &BindRef) -> Result<ResolvedBind, FilterError> {
    let entry = table
        .get(reference)
        .ok_or_else(|| FilterError::InvalidBindReference(reference.to_string()))?;
    resolve_entry(&entry.kind, &entry.value)
}

/// Resolve each reference to a single value
pub fn resolve_binds(table: &BindTable, references: &[BindRef]) -> Result<Vec<FilterValue>, FilterError> {
    references
        .iter()
        .map(|reference| match resolve_bind(table, reference)? {
            ResolvedBind::Value(value) => Ok(value),
            ResolvedBind::Array(_) => Err(FilterError::UnexpectedArrayInComparison {
                reference: reference.to_string(),
            }),
        })
        .collect()
}

/// Resolve an already unwrapped `[kind, value]` tuple
pub fn extract_bind_tuple_value(tuple: &JsonValue) -> Result<FilterValue, FilterError> {
    let entry = BindEntry::from_tuple(tuple).ok_or_else(|| FilterError::unresolvable(tuple))?;
    match resolve_entry(&entry.kind, &entry.value)? {
        ResolvedBind::Value(value) => Ok(value),
        ResolvedBind::Array(_) => Err(FilterError::unresolvable(tuple)),
    }
}

/// Values of a multi-value bind payload.
///
/// An array of `[kind, value]` tuples (detected from its first element) is
/// resolved tuple by tuple; any other array is taken as already resolved
/// values; anything else yields no values.
pub fn extract_bind_tuple_values(candidate: &JsonValue) -> Result<Vec<FilterValue>, FilterError> {
    let Some(items) = candidate.as_array() else {
        return Ok(Vec::new());
    };

    let is_tuple_array = items
        .first()
        .and_then(BindEntry::from_tuple)
        .is_some_and(|entry| entry.kind.is_recognized());

    if is_tuple_array {
        items.iter().map(extract_bind_tuple_value).collect()
    } else {
        items
            .iter()
            .map(|item| FilterValue::from_json(item).ok_or_else(|| FilterError::unresolvable(item)))
            .collect()
    }
}

fn resolve_entry(kind: &BindKind, value: &JsonValue) -> Result<ResolvedBind, FilterError> {
    if let JsonValue::Array(items) = value {
        return Ok(ResolvedBind::Array(items.clone()));
    }

    let resolved = match kind {
        BindKind::Text | BindKind::Real | BindKind::Boolean | BindKind::Duration => {
            pass_through(value)?
        }
        BindKind::Date | BindKind::DateTime => resolve_date(kind, value)?,
        BindKind::Null => FilterValue::Null,
        BindKind::Other(tag) => {
            tracing::trace!(kind = %tag, "Passing through bind of unrecognized kind");
            pass_through(value)?
        }
    };
    Ok(ResolvedBind::Value(resolved))
}

fn pass_through(value: &JsonValue) -> Result<FilterValue, FilterError> {
    FilterValue::from_json(value).ok_or_else(|| FilterError::unresolvable(value))
}

fn resolve_date(kind: &BindKind, value: &JsonValue) -> Result<FilterValue, FilterError> {
    let parsed = match value {
        // Numbers are already date-like: epoch milliseconds
        JsonValue::Number(n) => n.as_i64().and_then(millis_to_datetime),
        JsonValue::String(s) => parse_date_value(s),
        _ => None,
    };
    parsed.map(FilterValue::Date).ok_or_else(|| FilterError::InvalidDateValue {
        kind: kind.to_string(),
        value: match value {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    fn table(tuples: JsonValue) -> BindTable {
        BindTable::from_json(&tuples).unwrap()
    }

    fn value_of(table: &BindTable, index: usize) -> FilterValue {
        match resolve_bind(table, &BindRef::Index(index)).unwrap() {
            ResolvedBind::Value(v) => v,
            ResolvedBind::Array(a) => panic!("expected scalar, got {:?}", a),
        }
    }

    #[test]
    fn test_resolve_scalar_kinds() {
        let binds = table(json!([
            ["Text", "active"],
            ["Real", 100.5],
            ["Boolean", true],
            ["Null", null],
            ["Duration", "P1D"]
        ]));
        assert_eq!(value_of(&binds, 0), FilterValue::from("active"));
        assert_eq!(value_of(&binds, 1), FilterValue::Number(100.5));
        assert_eq!(value_of(&binds, 2), FilterValue::Boolean(true));
        assert_eq!(value_of(&binds, 3), FilterValue::Null);
        assert_eq!(value_of(&binds, 4), FilterValue::from("P1D"));
    }

    #[test]
    fn test_resolve_dates() {
        let binds = table(json!([
            ["Date", "2024-03-01"],
            ["DateTime", "2024-03-01T12:00:00Z"],
            ["DateTime", 1_704_067_200_000_i64]
        ]));
        let date = value_of(&binds, 0);
        assert_eq!(date.as_date().unwrap().day(), 1);
        let datetime = value_of(&binds, 1);
        assert_eq!(datetime.as_date().unwrap().month(), 3);
        let from_millis = value_of(&binds, 2);
        assert_eq!(from_millis.as_date().unwrap().year(), 2024);
    }

    #[test]
    fn test_resolve_invalid_date() {
        let binds = table(json!([["Date", "yesterday"]]));
        let err = resolve_bind(&binds, &BindRef::Index(0)).unwrap_err();
        assert!(matches!(err, FilterError::InvalidDateValue { ref kind, .. } if kind == "Date"));
    }

    #[test]
    fn test_resolve_unknown_kind_passes_through() {
        let binds = table(json!([
            ["Guid", "0f8fad5b-d9cb-469f-a165-70867728950e"],
            ["Collection", [["Text", "a"], ["Text", "b"]]]
        ]));
        assert_eq!(
            value_of(&binds, 0),
            FilterValue::from("0f8fad5b-d9cb-469f-a165-70867728950e")
        );
        let resolved = resolve_bind(&binds, &BindRef::Index(1)).unwrap();
        assert_eq!(
            resolved,
            ResolvedBind::Array(vec![json!(["Text", "a"]), json!(["Text", "b"])])
        );
    }

    #[test]
    fn test_resolve_missing_reference() {
        let binds = table(json!([["Text", "a"]]));
        let err = resolve_bind(&binds, &BindRef::Index(3)).unwrap_err();
        assert!(matches!(err, FilterError::InvalidBindReference(ref r) if r == "3"));

        let err = resolve_bind(&binds, &BindRef::Alias("@p".to_string())).unwrap_err();
        assert!(matches!(err, FilterError::InvalidBindReference(ref r) if r == "@p"));
    }

    #[test]
    fn test_resolve_alias() {
        let mut binds = BindTable::new();
        let reference = binds.insert_alias("p", BindEntry::new(BindKind::Real, json!(7)));
        assert_eq!(reference, BindRef::Alias("@p".to_string()));
        assert_eq!(
            resolve_bind(&binds, &reference).unwrap(),
            ResolvedBind::Value(FilterValue::Number(7.0))
        );
    }

    #[test]
    fn test_resolve_binds_rejects_arrays() {
        let binds = table(json!([["Text", "a"], ["Collection", [["Text", "b"]]]]));
        let values = resolve_binds(&binds, &[BindRef::Index(0)]).unwrap();
        assert_eq!(values, vec![FilterValue::from("a")]);

        let err = resolve_binds(&binds, &[BindRef::Index(0), BindRef::Index(1)]).unwrap_err();
        assert!(matches!(err, FilterError::UnexpectedArrayInComparison { ref reference } if reference == "1"));
    }

    #[test]
    fn test_is_bind_reference() {
        assert!(is_bind_reference(&json!({"bind": 0})));
        assert!(is_bind_reference(&json!({"bind": 12})));
        assert!(is_bind_reference(&json!({"bind": "@alias"})));
        assert!(!is_bind_reference(&json!({"bind": -1})));
        assert!(!is_bind_reference(&json!({"bind": 1.5})));
        assert!(!is_bind_reference(&json!({"bind": "alias"})));
        assert!(!is_bind_reference(&json!({"name": "status"})));
        assert!(!is_bind_reference(&json!([{"bind": 0}])));
    }

    #[test]
    fn test_extract_bind_tuple_value() {
        assert_eq!(
            extract_bind_tuple_value(&json!(["Real", 3])).unwrap(),
            FilterValue::Number(3.0)
        );
        assert!(extract_bind_tuple_value(&json!(["Real"])).is_err());
        assert!(extract_bind_tuple_value(&json!("Real")).is_err());
    }

    #[test]
    fn test_extract_bind_tuple_values_shapes() {
        let tuples = json!([["Text", "a"], ["Real", 2], ["Boolean", false]]);
        assert_eq!(
            extract_bind_tuple_values(&tuples).unwrap(),
            vec![
                FilterValue::from("a"),
                FilterValue::Number(2.0),
                FilterValue::Boolean(false)
            ]
        );

        let resolved = json!(["a", 2, null]);
        assert_eq!(
            extract_bind_tuple_values(&resolved).unwrap(),
            vec![FilterValue::from("a"), FilterValue::Number(2.0), FilterValue::Null]
        );

        assert!(extract_bind_tuple_values(&json!("a")).unwrap().is_empty());
        assert!(extract_bind_tuple_values(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_extract_bind_tuple_values_unrecognized_first_tuple() {
        // First element is not a recognized tuple, so elements are taken as values
        let err = extract_bind_tuple_values(&json!([["Vector", 1], ["Text", "a"]])).unwrap_err();
        assert!(matches!(err, FilterError::UnresolvableValue { .. }));
    }

    #[test]
    fn test_bind_table_from_object_form() {
        let binds = table(json!({
            "1": ["Real", 5],
            "0": ["Text", "x"],
            "@limit": ["Real", 10]
        }));
        assert_eq!(binds.len(), 3);
        assert_eq!(value_of(&binds, 0), FilterValue::from("x"));
        assert_eq!(value_of(&binds, 1), FilterValue::Number(5.0));
        assert_eq!(BindTable::from_json(&binds.to_json()).unwrap(), binds);
    }

    #[test]
    fn test_bind_table_from_json_rejects_gaps_and_bad_tuples() {
        assert!(BindTable::from_json(&json!({"0": ["Text", "a"], "2": ["Text", "b"]})).is_err());
        assert!(BindTable::from_json(&json!([["Text"]])).is_err());
        assert!(BindTable::from_json(&json!("nope")).is_err());
        assert!(BindTable::from_json(&json!(null)).unwrap().is_empty());
    }

    #[test]
    fn test_bind_kind_tags() {
        assert_eq!(BindKind::from_tag("DateTime"), BindKind::DateTime);
        assert_eq!(BindKind::from_tag("Guid"), BindKind::Other("Guid".to_string()));
        assert!(BindKind::Text.is_recognized());
        assert!(!BindKind::Other("Guid".to_string()).is_recognized());
        let kind: BindKind = serde_json::from_value(json!("Real")).unwrap();
        assert_eq!(kind, BindKind::Real);
        assert_eq!(serde_json::to_value(BindKind::Duration).unwrap(), json!("Duration"));
    }
}
