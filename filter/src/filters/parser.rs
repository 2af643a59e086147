//! Filter parsing
//!
//! Wraps the query grammar: blank input means "no filter", grammar failures
//! become [`FilterError::Parse`] carrying the original text, and only the
//! `$filter` sub-tree of the parsed query is kept.

use std::fmt;

use super::binds::BindTable;
use super::error::FilterError;
use super::grammar::{ODataGrammar, ParsedQuery, QueryParser, unquoted_option_separator};
use super::transform::transform_filter;
use super::types::{RawNode, TransformedFilter};
use crate::core::FilterConfig;
use crate::core::constants::{FILTER_OPTION, SYNTHETIC_RESOURCE};

/// Raw tree and binds of one filter expression
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFilter {
    /// `None` when the input was empty or blank
    pub tree: Option<RawNode>,
    pub binds: BindTable,
    pub original_filter: Option<String>,
}

impl ParsedFilter {
    pub fn is_empty(&self) -> bool {
        self.tree.is_none()
    }
}

/// Parse a filter with the default pipeline
pub fn parse_filter(filter: Option<&str>) -> Result<ParsedFilter, FilterError> {
    FilterPipeline::default().parse(filter)
}

/// Parse and transform a filter with the default pipeline.
///
/// Empty or blank input is a parse error here, never "no filter".
pub fn parse_and_transform_filter(filter: &str) -> Result<TransformedFilter, FilterError> {
    FilterPipeline::default().parse_and_transform(filter)
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Configured parse + transform pipeline
pub struct FilterPipeline {
    config: FilterConfig,
    parser: Box<dyn QueryParser>,
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}

impl fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FilterPipeline {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            parser: Box::new(ODataGrammar),
        }
    }

    /// Replace the grammar collaborator
    pub fn with_parser(mut self, parser: impl QueryParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn parse(&self, filter: Option<&str>) -> Result<ParsedFilter, FilterError> {
        let Some(text) = filter.filter(|f| !f.trim().is_empty()) else {
            tracing::trace!("Empty filter, nothing to parse");
            return Ok(ParsedFilter {
                tree: None,
                binds: BindTable::new(),
                original_filter: filter.map(str::to_string),
            });
        };

        if text.len() > self.config.max_filter_length {
            return Err(FilterError::parse(
                text,
                format!(
                    "Filter exceeds maximum size of {} bytes",
                    self.config.max_filter_length
                ),
            ));
        }

        if let Some(offset) = unquoted_option_separator(text) {
            return Err(FilterError::parse(
                text,
                format!("Unquoted '&' at offset {} outside a string literal", offset),
            ));
        }

        let query_path = format!("/{}?{}={}", SYNTHETIC_RESOURCE, FILTER_OPTION, text);
        let ParsedQuery { mut tree, binds } = self.parser.parse(&query_path).map_err(|cause| {
            tracing::debug!(error = %cause, "Filter grammar rejected input");
            FilterError::parse_with_cause(text, cause)
        })?;

        let Some(filter_tree) = tree.options.remove(FILTER_OPTION) else {
            return Err(FilterError::parse(text, "Parsed query has no filter option"));
        };

        tracing::debug!(length = text.len(), binds = binds.len(), "Filter parsed");
        Ok(ParsedFilter {
            tree: Some(filter_tree),
            binds,
            original_filter: Some(text.to_string()),
        })
    }

    pub fn parse_and_transform(&self, filter: &str) -> Result<TransformedFilter, FilterError> {
        let parsed = self.parse(Some(filter))?;
        let Some(tree) = parsed.tree else {
            return Err(FilterError::parse(filter, "Filter expression is empty"));
        };
        self.transform(&tree, &parsed.binds)
    }

    pub fn transform(&self, tree: &RawNode, binds: &BindTable) -> Result<TransformedFilter, FilterError> {
        transform_filter(tree, binds, &self.config.transform_options())
    }
}
