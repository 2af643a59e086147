// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "odata-filter.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "ODATA_FILTER_CONFIG";

// =============================================================================
// Environment Variables - Filter
// =============================================================================

/// Environment variable for the field path separator
pub const ENV_SEPARATOR: &str = "ODATA_FILTER_SEPARATOR";

/// Environment variable for the maximum filter expression length
pub const ENV_MAX_LENGTH: &str = "ODATA_FILTER_MAX_LENGTH";

/// Environment variable for the maximum filter nesting depth
pub const ENV_MAX_DEPTH: &str = "ODATA_FILTER_MAX_DEPTH";

/// Environment variable for strict transform mode
pub const ENV_STRICT: &str = "ODATA_FILTER_STRICT";

// =============================================================================
// Filter Defaults
// =============================================================================

/// Default separator joining nested field path segments
pub const DEFAULT_FIELD_SEPARATOR: &str = "/";

/// Maximum size of a filter expression in bytes (64KB)
pub const DEFAULT_MAX_FILTER_LENGTH: usize = 64 * 1024;

/// Maximum nesting of logical/negation nodes
pub const DEFAULT_MAX_DEPTH: usize = 64;

// =============================================================================
// Grammar
// =============================================================================

/// Resource segment of the synthetic query wrapped around a bare filter
pub const SYNTHETIC_RESOURCE: &str = "_";

/// Query option carrying the filter expression
pub const FILTER_OPTION: &str = "$filter";

/// Bind kind tag used for bracketed value collections
pub const COLLECTION_BIND_KIND: &str = "Collection";

/// Deepest parenthesis/bracket nesting the grammar will descend into
pub const MAX_GROUPING_DEPTH: usize = 256;

/// Most segments a member path (`a/b/c`) may have
pub const MAX_PATH_SEGMENTS: usize = 64;
