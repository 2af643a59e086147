//! Filter transformation
//!
//! Classifies raw parse-tree nodes by shape and folds them into a
//! [`TransformedFilter`] with every bind resolved and every field path
//! materialized as a string.
//!
//! ## Shape dispatch
//!
//! Shapes are checked in a fixed order, first match wins:
//!
//! | # | Shape | Form |
//! |---|-------|------|
//! | 1 | comparison | `[eq\|ne\|gt\|ge\|lt\|le, a, b]` |
//! | 2 | set membership | `[in\|eqany, field, binds]` |
//! | 3 | string function | `[contains\|startswith\|..., a, b]` |
//! | 4 | call form | `["call", {"method": fn, "args": [a, b]}]` |
//! | 5 | logical | `[and\|or, a, b, ...]` |
//! | 6 | negation | `["not", a]` |
//!
//! Anything else is [`FilterError::UnsupportedFilterNode`]. There is no
//! partial result: the first failure aborts the whole transform.

use serde_json::Value as JsonValue;

use super::binds::{BindRef, BindTable, ResolvedBind, extract_bind_tuple_values, resolve_bind, resolve_binds};
use super::error::FilterError;
use super::types::{
    ComparisonFilter, ComparisonOp, FieldReference, FilterValue, InFilter, LogicalFilter,
    LogicalOp, NotFilter, RawNode, StringFunction, StringFunctionFilter, TransformedFilter,
};
use crate::core::constants::{DEFAULT_FIELD_SEPARATOR, DEFAULT_MAX_DEPTH};

/// Operators of the set-membership shape
const SET_MEMBERSHIP_OPERATORS: &[&str] = &["in", "eqany"];

/// Tag of the call-form string function
const CALL_TAG: &str = "call";

/// Tag of the negation shape
const NOT_TAG: &str = "not";

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    /// Reserved; accepted but does not change behavior
    pub strict: bool,
    pub max_depth: usize,
    pub field_separator: String,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_depth: DEFAULT_MAX_DEPTH,
            field_separator: DEFAULT_FIELD_SEPARATOR.to_string(),
        }
    }
}

// ============================================================================
// SHAPE CLASSIFICATION
// ============================================================================

/// A raw node matched to one of the recognized shapes
#[derive(Debug, Clone, PartialEq)]
pub enum NodeShape<'n> {
    Comparison {
        operator: ComparisonOp,
        left: &'n JsonValue,
        right: &'n JsonValue,
    },
    In {
        field: FieldReference,
        values: &'n JsonValue,
    },
    StringFunction {
        function: StringFunction,
        first: &'n JsonValue,
        second: &'n JsonValue,
    },
    Logical {
        operator: LogicalOp,
        operands: &'n [JsonValue],
    },
    Not {
        operand: &'n JsonValue,
    },
}

/// Split `[tag, operands...]`; `None` unless the first element is a string
fn node_parts(node: &JsonValue) -> Option<(&str, &[JsonValue])> {
    let (tag, operands) = node.as_array()?.split_first()?;
    Some((tag.as_str()?, operands))
}

fn match_comparison(node: &JsonValue) -> Option<NodeShape<'_>> {
    match node_parts(node)? {
        (op, [left, right]) => Some(NodeShape::Comparison {
            operator: ComparisonOp::try_from_str(op)?,
            left,
            right,
        }),
        _ => None,
    }
}

fn match_in(node: &JsonValue) -> Option<NodeShape<'_>> {
    match node_parts(node)? {
        (op, [field, values]) if SET_MEMBERSHIP_OPERATORS.contains(&op) => Some(NodeShape::In {
            field: FieldReference::from_node(field)?,
            values,
        }),
        _ => None,
    }
}

fn match_string_function(node: &JsonValue) -> Option<NodeShape<'_>> {
    match node_parts(node)? {
        (op, [first, second]) => Some(NodeShape::StringFunction {
            function: StringFunction::try_from_str(op)?,
            first,
            second,
        }),
        _ => None,
    }
}

fn match_call(node: &JsonValue) -> Option<NodeShape<'_>> {
    let (CALL_TAG, [call]) = node_parts(node)? else {
        return None;
    };
    let call = call.as_object()?;
    let function = StringFunction::try_from_str(call.get("method")?.as_str()?)?;
    match call.get("args")?.as_array()?.as_slice() {
        [first, second] => Some(NodeShape::StringFunction {
            function,
            first,
            second,
        }),
        _ => None,
    }
}

fn match_logical(node: &JsonValue) -> Option<NodeShape<'_>> {
    let (op, operands) = node_parts(node)?;
    if operands.len() < 2 {
        return None;
    }
    Some(NodeShape::Logical {
        operator: LogicalOp::try_from_str(op)?,
        operands,
    })
}

fn match_not(node: &JsonValue) -> Option<NodeShape<'_>> {
    match node_parts(node)? {
        (NOT_TAG, [operand]) => Some(NodeShape::Not { operand }),
        _ => None,
    }
}

pub fn is_comparison_node(node: &JsonValue) -> bool {
    match_comparison(node).is_some()
}

pub fn is_in_node(node: &JsonValue) -> bool {
    match_in(node).is_some()
}

pub fn is_string_function_node(node: &JsonValue) -> bool {
    match_string_function(node).is_some()
}

pub fn is_call_node(node: &JsonValue) -> bool {
    match_call(node).is_some()
}

pub fn is_logical_node(node: &JsonValue) -> bool {
    match_logical(node).is_some()
}

pub fn is_not_node(node: &JsonValue) -> bool {
    match_not(node).is_some()
}

/// Classify a raw node, checking shapes in dispatch order
pub fn classify_node(node: &JsonValue) -> Option<NodeShape<'_>> {
    match_comparison(node)
        .or_else(|| match_in(node))
        .or_else(|| match_string_function(node))
        .or_else(|| match_call(node))
        .or_else(|| match_logical(node))
        .or_else(|| match_not(node))
}

// ============================================================================
// TRANSFORMER
// ============================================================================

/// Transform a raw tree into a normalized filter
pub fn transform_filter(
    tree: &RawNode,
    binds: &BindTable,
    options: &TransformOptions,
) -> Result<TransformedFilter, FilterError> {
    FilterTransformer::new(binds, options).transform(tree)
}

/// Recursive shape-driven transformer over one bind table
pub struct FilterTransformer<'a> {
    binds: &'a BindTable,
    options: &'a TransformOptions,
}

impl<'a> FilterTransformer<'a> {
    pub fn new(binds: &'a BindTable, options: &'a TransformOptions) -> Self {
        Self { binds, options }
    }

    pub fn transform(&self, tree: &RawNode) -> Result<TransformedFilter, FilterError> {
        let filter = self.transform_node(tree, 0)?;
        tracing::debug!(
            root = root_kind(&filter),
            binds = self.binds.len(),
            strict = self.options.strict,
            "Filter transformed"
        );
        Ok(filter)
    }

    fn transform_node(&self, node: &JsonValue, depth: usize) -> Result<TransformedFilter, FilterError> {
        if depth > self.options.max_depth {
            return Err(FilterError::NestingTooDeep {
                max_depth: self.options.max_depth,
            });
        }

        let Some(shape) = classify_node(node) else {
            tracing::debug!(depth, "Filter node matches no supported shape");
            return Err(FilterError::unsupported_node(node));
        };
        tracing::trace!(depth, shape = ?shape, "Classified filter node");

        match shape {
            NodeShape::Comparison {
                operator,
                left,
                right,
            } => self.transform_comparison(node, operator, left, right),
            NodeShape::In { field, values } => self.transform_in(&field, values),
            NodeShape::StringFunction {
                function,
                first,
                second,
            } => self.transform_string_function(node, function, first, second),
            NodeShape::Logical { operator, operands } => {
                let filters = operands
                    .iter()
                    .map(|operand| self.transform_node(operand, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(TransformedFilter::Logical(LogicalFilter { operator, filters }))
            }
            NodeShape::Not { operand } => Ok(TransformedFilter::Not(NotFilter {
                filter: Box::new(self.transform_node(operand, depth + 1)?),
            })),
        }
    }

    /// One operand must be a field reference; the other becomes the value.
    ///
    /// When both are field references the left one is the field and the
    /// right one's path is the value (field-to-field comparison).
    fn transform_comparison(
        &self,
        node: &JsonValue,
        operator: ComparisonOp,
        left: &JsonValue,
        right: &JsonValue,
    ) -> Result<TransformedFilter, FilterError> {
        let (field, value) = if let Some(field) = FieldReference::from_node(left) {
            (field, self.resolve_value(right)?)
        } else if let Some(field) = FieldReference::from_node(right) {
            (field, self.resolve_value(left)?)
        } else {
            return Err(FilterError::UnsupportedComparisonOperands { node: node.clone() });
        };

        Ok(TransformedFilter::Comparison(ComparisonFilter {
            field: self.field_path(&field),
            operator,
            value,
        }))
    }

    fn transform_in(&self, field: &FieldReference, values: &JsonValue) -> Result<TransformedFilter, FilterError> {
        let field = self.field_path(field);

        let values = if let JsonValue::Array(items) = values {
            let references = items
                .iter()
                .map(|item| BindRef::from_node(item).ok_or_else(|| FilterError::unresolvable(item)))
                .collect::<Result<Vec<_>, _>>()?;
            resolve_binds(self.binds, &references)?
        } else if let Some(reference) = BindRef::from_node(values) {
            match resolve_bind(self.binds, &reference)? {
                ResolvedBind::Array(items) => extract_bind_tuple_values(&JsonValue::Array(items))?,
                ResolvedBind::Value(value) => vec![value],
            }
        } else {
            return Err(FilterError::unresolvable(values));
        };

        if values.is_empty() {
            return Err(FilterError::EmptyValueList { field });
        }

        Ok(TransformedFilter::In(InFilter { field, values }))
    }

    /// The field side is found by shape, not position, so `substringof`
    /// (literal first) and reversed operands of the other functions both work.
    fn transform_string_function(
        &self,
        node: &JsonValue,
        function: StringFunction,
        first: &JsonValue,
        second: &JsonValue,
    ) -> Result<TransformedFilter, FilterError> {
        let (field, operand) = match (FieldReference::from_node(first), FieldReference::from_node(second)) {
            (Some(field), None) => (field, second),
            (None, Some(field)) => (field, first),
            _ => {
                return Err(FilterError::UnsupportedFunctionOperands {
                    function: function.as_str().to_string(),
                    node: node.clone(),
                });
            }
        };

        let value = self.resolve_value(operand)?.to_filter_string();

        Ok(TransformedFilter::StringFunction(StringFunctionFilter {
            function,
            field: self.field_path(&field),
            value,
        }))
    }

    /// Resolve the value side of a comparison or function
    fn resolve_value(&self, operand: &JsonValue) -> Result<FilterValue, FilterError> {
        if let Some(reference) = BindRef::from_node(operand) {
            return match resolve_bind(self.binds, &reference)? {
                ResolvedBind::Value(value) => Ok(value),
                ResolvedBind::Array(_) => Err(FilterError::UnexpectedArrayInComparison {
                    reference: reference.to_string(),
                }),
            };
        }

        if let Some(field) = FieldReference::from_node(operand) {
            return Ok(FilterValue::String(self.field_path(&field)));
        }

        FilterValue::from_json(operand).ok_or_else(|| FilterError::unresolvable(operand))
    }

    fn field_path(&self, field: &FieldReference) -> String {
        field.get_field_path(&self.options.field_separator)
    }
}

fn root_kind(filter: &TransformedFilter) -> &'static str {
    match filter {
        TransformedFilter::Comparison(_) => "comparison",
        TransformedFilter::In(_) => "in",
        TransformedFilter::NotIn(_) => "not_in",
        TransformedFilter::StringFunction(_) => "string_function",
        TransformedFilter::Logical(_) => "logical",
        TransformedFilter::Not(_) => "not",
    }
}
