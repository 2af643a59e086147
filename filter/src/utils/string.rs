//! String utility functions

/// Default maximum length for previews embedded in error messages (in characters)
pub const PREVIEW_MAX_LENGTH: usize = 200;

/// Truncate text to max length with ellipsis
pub fn truncate_preview(text: &str, max_len: usize) -> String {
    let text = text.trim();
    if text.chars().count() > max_len {
        format!("{}...", text.chars().take(max_len).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Compact preview of a raw JSON node for diagnostics
pub fn node_preview(node: &serde_json::Value) -> String {
    truncate_preview(&node.to_string(), PREVIEW_MAX_LENGTH)
}

/// Format a number the way it reads in a filter expression.
///
/// Integral values drop the fractional part (`5`, not `5.0`).
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
