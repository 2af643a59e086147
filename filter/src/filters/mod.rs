//! Query filter pipeline
//!
//! Turns an OData-style filter expression into a normalized
//! [`TransformedFilter`] tree and answers typed questions about it.
//!
//! ```text
//! "status eq 'active' and price gt 100"
//!     -> grammar     (raw tree + bind table)
//!     -> transform   (binds resolved, field paths materialized)
//!     -> extract     (equality values, ranges, set members, field names)
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use odata_filter::filters::{extract_equality_value, extract_range, parse_and_transform_filter};
//!
//! let filter = parse_and_transform_filter("status eq 'active' and price ge 100").unwrap();
//! let status = extract_equality_value(&filter, "status");
//! let price = extract_range(&filter, "price");
//! ```

mod binds;
mod error;
mod extract;
mod grammar;
mod parser;
mod transform;
mod types;


pub use binds::{
    BindEntry, BindKind, BindRef, BindTable, ResolvedBind, extract_bind_tuple_value,
    extract_bind_tuple_values, is_bind_reference, resolve_bind, resolve_binds,
};
pub use error::{FilterError, GrammarError};
pub use extract::{
    FieldRange, collect_and_filters, collect_or_filters, create_filter_map,
    extract_all_field_values, extract_comparison, extract_equality_value, extract_field_values,
    extract_in_values, extract_range, extract_string_function, flatten_filters,
    get_filtered_field_names, get_filters_for_field, has_field_filter,
};
pub use grammar::{ODataGrammar, ParsedQuery, QueryParser, QueryTree};
pub use parser::{FilterPipeline, ParsedFilter, parse_and_transform_filter, parse_filter};
pub use transform::{
    FilterTransformer, NodeShape, TransformOptions, classify_node, is_call_node,
    is_comparison_node, is_in_node, is_logical_node, is_not_node, is_string_function_node,
    transform_filter,
};
pub use types::{
    ComparisonFilter, ComparisonOp, FieldReference, FilterValue, InFilter, LogicalFilter,
    LogicalOp, NotFilter, NotInFilter, RawNode, StringFunction, StringFunctionFilter,
    TransformedFilter, is_field_reference,
};
