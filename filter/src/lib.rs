//! OData-style query filters
//!
//! Parses filter expressions such as `status eq 'active' and price gt 100`
//! into a typed [`TransformedFilter`] tree and extracts values from it.

pub mod core;
pub mod filters;
pub mod utils;

pub use crate::core::FilterConfig;
pub use filters::{
    FilterError, FilterPipeline, TransformedFilter, parse_and_transform_filter, parse_filter,
    transform_filter,
};
