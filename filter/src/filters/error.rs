//! Filter error types

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::utils::string::node_preview;

/// Errors raised by the grammar collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Errors raised while parsing, resolving or transforming a filter.
///
/// Every variant is fatal for the filter being processed; there is no
/// partial result.
#[derive(Error, Debug)]
pub enum FilterError {
    /// Malformed or empty filter string
    #[error("Failed to parse filter '{filter}': {message}")]
    Parse {
        message: String,
        filter: String,
        #[source]
        cause: Option<GrammarError>,
    },

    /// Bind index or alias with no table entry
    #[error("Invalid bind reference: {0}")]
    InvalidBindReference(String),

    /// Raw node matching none of the recognized shapes
    #[error("Unsupported filter node: {}", node_preview(.node))]
    UnsupportedFilterNode { node: JsonValue },

    /// Comparison without a field reference operand
    #[error("Comparison requires a field reference operand: {}", node_preview(.node))]
    UnsupportedComparisonOperands { node: JsonValue },

    /// String function without exactly one field reference operand
    #[error("Function '{function}' requires exactly one field reference operand: {}", node_preview(.node))]
    UnsupportedFunctionOperands { function: String, node: JsonValue },

    /// Bind resolved to an array where a single value was required
    #[error("Bind {reference} resolved to an array where a single value was expected")]
    UnexpectedArrayInComparison { reference: String },

    /// Operand that is neither bind, field reference nor literal
    #[error("Cannot resolve value: {}", node_preview(.value))]
    UnresolvableValue { value: JsonValue },

    /// Date or date-time bind that does not parse
    #[error("Invalid {kind} value: {value}")]
    InvalidDateValue { kind: String, value: String },

    /// Set membership that resolved to no values
    #[error("Set membership on '{field}' has no values")]
    EmptyValueList { field: String },

    /// Logical/negation nesting beyond the configured limit
    #[error("Filter nesting exceeds maximum depth of {max_depth}")]
    NestingTooDeep { max_depth: usize },
}

impl FilterError {
    /// Parse error without an underlying grammar failure
    pub fn parse(filter: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            filter: filter.to_string(),
            cause: None,
        }
    }

    /// Parse error wrapping a grammar failure
    pub fn parse_with_cause(filter: &str, cause: GrammarError) -> Self {
        Self::Parse {
            message: cause.to_string(),
            filter: filter.to_string(),
            cause: Some(cause),
        }
    }

    pub fn unsupported_node(node: &JsonValue) -> Self {
        Self::UnsupportedFilterNode { node: node.clone() }
    }

    pub fn unresolvable(value: &JsonValue) -> Self {
        Self::UnresolvableValue {
            value: value.clone(),
        }
    }

    /// Original filter string carried by a parse error
    pub fn filter(&self) -> Option<&str> {
        match self {
            Self::Parse { filter, .. } => Some(filter),
            _ => None,
        }
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}
