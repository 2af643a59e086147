//! Filter type definitions
//!
//! Defines the normalized filter tree produced by the transformer, the
//! operators it carries, and the literal values that survive bind resolution.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::core::constants::MAX_PATH_SEGMENTS;
use crate::utils::string::format_number;
use crate::utils::time::format_datetime;

/// Untyped parse tree node as produced by the grammar
pub type RawNode = JsonValue;

// ============================================================================
// LITERAL VALUES
// ============================================================================

/// A resolved literal value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Null,
}

impl FilterValue {
    /// Convert a JSON scalar; arrays and objects have no literal form
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => Some(Self::Null),
            JsonValue::Bool(b) => Some(Self::Boolean(*b)),
            JsonValue::Number(n) => n.as_f64().map(Self::Number),
            JsonValue::String(s) => Some(Self::String(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Date(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Coerce to the plain string used by string-function filters
    pub fn to_filter_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Boolean(b) => b.to_string(),
            Self::Date(dt) => format_datetime(dt),
            Self::Null => "null".to_string(),
        }
    }
}

/// Renders the value as a filter literal (`'text'`, `42`, `true`, `null`)
impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Date(dt) => write!(f, "{}", format_datetime(dt)),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

// ============================================================================
// OPERATORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl ComparisonOp {
    pub const ALL: [ComparisonOp; 6] = [
        Self::Eq,
        Self::Ne,
        Self::Gt,
        Self::Ge,
        Self::Lt,
        Self::Le,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
        }
    }

    pub fn try_from_str(s: &str) -> Option<Self> {
        Some(match s {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "gt" => Self::Gt,
            "ge" => Self::Ge,
            "lt" => Self::Lt,
            "le" => Self::Le,
            _ => return None,
        })
    }

    /// Operators that bound a range (`gt`, `ge`, `lt`, `le`)
    pub fn is_range(&self) -> bool {
        matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }

    pub fn try_from_str(s: &str) -> Option<Self> {
        match s {
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            _ => None,
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringFunction {
    Contains,
    StartsWith,
    EndsWith,
    SubstringOf,
    ToLower,
    ToUpper,
}

impl StringFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::SubstringOf => "substringof",
            Self::ToLower => "tolower",
            Self::ToUpper => "toupper",
        }
    }

    pub fn try_from_str(s: &str) -> Option<Self> {
        Some(match s {
            "contains" => Self::Contains,
            "startswith" => Self::StartsWith,
            "endswith" => Self::EndsWith,
            "substringof" => Self::SubstringOf,
            "tolower" => Self::ToLower,
            "toupper" => Self::ToUpper,
            _ => return None,
        })
    }

    /// `substringof` takes the literal first and the field second
    pub fn literal_first(&self) -> bool {
        matches!(self, Self::SubstringOf)
    }
}

impl fmt::Display for StringFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// FIELD REFERENCES
// ============================================================================

/// A possibly nested field path (`address/city`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldReference {
    pub name: String,
    pub property: Option<Box<FieldReference>>,
}

impl FieldReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property: None,
        }
    }

    /// Build a nested reference from path segments; `None` when empty
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Option<Self> {
        let (last, parents) = segments.split_last()?;
        let leaf = Self::new(last.as_ref());
        Some(parents.iter().rev().fold(leaf, |child, parent| Self {
            name: parent.as_ref().to_string(),
            property: Some(Box::new(child)),
        }))
    }

    /// Read a field reference out of a raw node.
    ///
    /// A field reference is an object with a non-empty string `name`, no
    /// `bind` key, and an optional nested `property` of the same shape.
    /// Paths longer than [`MAX_PATH_SEGMENTS`] are not field references.
    pub fn from_node(node: &JsonValue) -> Option<Self> {
        let mut segments = Vec::new();
        let mut current = node;
        loop {
            let obj = current.as_object()?;
            if obj.contains_key("bind") {
                return None;
            }
            let name = obj.get("name")?.as_str()?;
            if name.is_empty() || segments.len() == MAX_PATH_SEGMENTS {
                return None;
            }
            segments.push(name);
            match obj.get("property") {
                None | Some(JsonValue::Null) => break,
                Some(nested) => current = nested,
            }
        }
        Self::from_segments(&segments)
    }

    /// Segment names from the outermost to the leaf
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        std::iter::successors(Some(self), |field| field.property.as_deref()).map(|field| field.name.as_str())
    }

    /// Materialize the path, joining nested segments with `separator`
    pub fn get_field_path(&self, separator: &str) -> String {
        self.segments().collect::<Vec<_>>().join(separator)
    }

    /// Raw-tree form of this reference
    pub fn to_node(&self) -> JsonValue {
        let segments: Vec<&str> = self.segments().collect();
        segments.iter().rev().fold(JsonValue::Null, |child, name| {
            let mut obj = serde_json::Map::new();
            obj.insert("name".to_string(), JsonValue::String(name.to_string()));
            if !child.is_null() {
                obj.insert("property".to_string(), child);
            }
            JsonValue::Object(obj)
        })
    }
}

/// True if `node` has the shape of a field reference
pub fn is_field_reference(node: &JsonValue) -> bool {
    FieldReference::from_node(node).is_some()
}

// ============================================================================
// NORMALIZED FILTER TREE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonFilter {
    pub field: String,
    pub operator: ComparisonOp,
    pub value: FilterValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InFilter {
    pub field: String,
    pub values: Vec<FilterValue>,
}

/// Negated set membership; no transform rule produces it yet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotInFilter {
    pub field: String,
    pub values: Vec<FilterValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StringFunctionFilter {
    pub function: StringFunction,
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicalFilter {
    pub operator: LogicalOp,
    pub filters: Vec<TransformedFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotFilter {
    pub filter: Box<TransformedFilter>,
}

/// Normalized filter tree.
///
/// `Logical` and `Not` are the only recursive variants; every other variant
/// is a leaf naming exactly one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformedFilter {
    Comparison(ComparisonFilter),
    In(InFilter),
    NotIn(NotInFilter),
    StringFunction(StringFunctionFilter),
    Logical(LogicalFilter),
    Not(NotFilter),
}

impl TransformedFilter {
    /// Field targeted by a leaf; `None` for logical and negation nodes
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Comparison(f) => Some(&f.field),
            Self::In(f) => Some(&f.field),
            Self::NotIn(f) => Some(&f.field),
            Self::StringFunction(f) => Some(&f.field),
            Self::Logical(_) | Self::Not(_) => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self, Self::Logical(_) | Self::Not(_))
    }

    pub fn as_comparison(&self) -> Option<&ComparisonFilter> {
        match self {
            Self::Comparison(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_in(&self) -> Option<&InFilter> {
        match self {
            Self::In(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_string_function(&self) -> Option<&StringFunctionFilter> {
        match self {
            Self::StringFunction(f) => Some(f),
            _ => None,
        }
    }

    /// Serialize to the tagged JSON form
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

fn write_value_list(f: &mut fmt::Formatter<'_>, values: &[FilterValue]) -> fmt::Result {
    let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    write!(f, "({})", rendered.join(", "))
}

/// Renders the tree back to filter-expression syntax.
///
/// Comparison values are always rendered as literals, so a field-to-field
/// comparison (`a eq b`) prints its right side as the string `'b'`.
impl fmt::Display for TransformedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comparison(c) => write!(f, "{} {} {}", c.field, c.operator, c.value),
            Self::In(i) => {
                write!(f, "{} in ", i.field)?;
                write_value_list(f, &i.values)
            }
            Self::NotIn(n) => {
                write!(f, "not ({} in ", n.field)?;
                write_value_list(f, &n.values)?;
                write!(f, ")")
            }
            Self::StringFunction(s) => {
                let literal = FilterValue::String(s.value.clone());
                if s.function.literal_first() {
                    write!(f, "{}({}, {})", s.function, literal, s.field)
                } else {
                    write!(f, "{}({}, {})", s.function, s.field, literal)
                }
            }
            Self::Logical(l) => {
                let parts: Vec<String> = l
                    .filters
                    .iter()
                    .map(|child| match child {
                        Self::Logical(_) => format!("({})", child),
                        _ => child.to_string(),
                    })
                    .collect();
                let separator = format!(" {} ", l.operator);
                write!(f, "{}", parts.join(separator.as_str()))
            }
            Self::Not(n) => write!(f, "not ({})", n.filter),
        }
    }
}
