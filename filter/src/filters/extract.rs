//! Filter extraction
//!
//! Read-only queries over a [`TransformedFilter`]. Everything works on the
//! flattened leaf list, where logical nesting is dissolved and negation is
//! transparent: `not (price gt 10)` still reports `price gt 10`.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::Serialize;

use super::binds::BindTable;
use super::error::FilterError;
use super::transform::{TransformOptions, transform_filter};
use super::types::{
    ComparisonFilter, ComparisonOp, FilterValue, LogicalOp, RawNode, StringFunction,
    StringFunctionFilter, TransformedFilter,
};

/// Bounds collected from the range comparisons on one field
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<FilterValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_inclusive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<FilterValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_inclusive: Option<bool>,
}

// ============================================================================
// FLATTENING AND GROUPING
// ============================================================================

/// Leaves of the tree in source order
pub fn flatten_filters(filter: &TransformedFilter) -> Vec<&TransformedFilter> {
    let mut leaves = Vec::new();
    flatten_into(filter, &mut leaves);
    leaves
}

fn flatten_into<'a>(filter: &'a TransformedFilter, leaves: &mut Vec<&'a TransformedFilter>) {
    match filter {
        TransformedFilter::Logical(logical) => {
            for child in &logical.filters {
                flatten_into(child, leaves);
            }
        }
        TransformedFilter::Not(not) => flatten_into(&not.filter, leaves),
        leaf => leaves.push(leaf),
    }
}

pub fn get_filters_for_field<'a>(filter: &'a TransformedFilter, name: &str) -> Vec<&'a TransformedFilter> {
    flatten_filters(filter)
        .into_iter()
        .filter(|leaf| leaf.field() == Some(name))
        .collect()
}

pub fn has_field_filter(filter: &TransformedFilter, name: &str) -> bool {
    !get_filters_for_field(filter, name).is_empty()
}

/// Distinct field names in first-seen order
pub fn get_filtered_field_names(filter: &TransformedFilter) -> Vec<&str> {
    let mut seen = FxHashSet::default();
    flatten_filters(filter)
        .into_iter()
        .filter_map(|leaf| leaf.field())
        .filter(|field| seen.insert(*field))
        .collect()
}

/// Group leaves by field, fields in first-seen order
pub fn create_filter_map(filter: &TransformedFilter) -> IndexMap<String, Vec<&TransformedFilter>> {
    let mut map: IndexMap<String, Vec<&TransformedFilter>> = IndexMap::new();
    for leaf in flatten_filters(filter) {
        if let Some(field) = leaf.field() {
            map.entry(field.to_string()).or_default().push(leaf);
        }
    }
    map
}

/// Operands of an `and` chain; nested `or` groups and leaves stay whole
pub fn collect_and_filters(filter: &TransformedFilter) -> Vec<&TransformedFilter> {
    collect_chain(filter, LogicalOp::And)
}

/// Operands of an `or` chain; nested `and` groups and leaves stay whole
pub fn collect_or_filters(filter: &TransformedFilter) -> Vec<&TransformedFilter> {
    collect_chain(filter, LogicalOp::Or)
}

fn collect_chain(filter: &TransformedFilter, operator: LogicalOp) -> Vec<&TransformedFilter> {
    let mut operands = Vec::new();
    collect_chain_into(filter, operator, &mut operands);
    operands
}

fn collect_chain_into<'a>(
    filter: &'a TransformedFilter,
    operator: LogicalOp,
    operands: &mut Vec<&'a TransformedFilter>,
) {
    match filter {
        TransformedFilter::Logical(logical) if logical.operator == operator => {
            for child in &logical.filters {
                collect_chain_into(child, operator, operands);
            }
        }
        other => operands.push(other),
    }
}

// ============================================================================
// TYPED ACCESSORS
// ============================================================================

pub fn extract_comparison<'a>(
    filter: &'a TransformedFilter,
    name: &str,
    operator: ComparisonOp,
) -> Option<&'a ComparisonFilter> {
    comparisons_for(filter, name).find(|comparison| comparison.operator == operator)
}

/// Value of the first `eq` comparison on `name`
pub fn extract_equality_value<'a>(filter: &'a TransformedFilter, name: &str) -> Option<&'a FilterValue> {
    extract_comparison(filter, name, ComparisonOp::Eq).map(|comparison| &comparison.value)
}

/// Values of the first `in` filter on `name`
pub fn extract_in_values<'a>(filter: &'a TransformedFilter, name: &str) -> Option<&'a [FilterValue]> {
    get_filters_for_field(filter, name)
        .into_iter()
        .find_map(TransformedFilter::as_in)
        .map(|in_filter| in_filter.values.as_slice())
}

/// Set-membership values, else the equality value as a one-element list
pub fn extract_field_values(filter: &TransformedFilter, name: &str) -> Option<Vec<FilterValue>> {
    if let Some(values) = extract_in_values(filter, name) {
        return Some(values.to_vec());
    }
    extract_equality_value(filter, name).map(|value| vec![value.clone()])
}

/// Collect `gt`/`ge`/`lt`/`le` bounds on `name`.
///
/// Later comparisons on the same side replace earlier ones. `None` when the
/// field has no range comparison, even if it has an `eq`.
pub fn extract_range(filter: &TransformedFilter, name: &str) -> Option<FieldRange> {
    let mut range = FieldRange::default();
    let mut found = false;

    for comparison in comparisons_for(filter, name).filter(|c| c.operator.is_range()) {
        found = true;
        let value = comparison.value.clone();
        match comparison.operator {
            ComparisonOp::Gt | ComparisonOp::Ge => {
                if let Some(previous) = &range.min {
                    tracing::debug!(field = name, previous = %previous, value = %value, "Lower bound overwritten");
                }
                range.min = Some(value);
                range.min_inclusive = Some(comparison.operator == ComparisonOp::Ge);
            }
            ComparisonOp::Lt | ComparisonOp::Le => {
                if let Some(previous) = &range.max {
                    tracing::debug!(field = name, previous = %previous, value = %value, "Upper bound overwritten");
                }
                range.max = Some(value);
                range.max_inclusive = Some(comparison.operator == ComparisonOp::Le);
            }
            ComparisonOp::Eq | ComparisonOp::Ne => {}
        }
    }

    found.then_some(range)
}

/// First string function on `name`, optionally restricted to `function`
pub fn extract_string_function<'a>(
    filter: &'a TransformedFilter,
    name: &str,
    function: Option<StringFunction>,
) -> Option<&'a StringFunctionFilter> {
    get_filters_for_field(filter, name)
        .into_iter()
        .filter_map(TransformedFilter::as_string_function)
        .find(|sf| function.is_none_or(|f| sf.function == f))
}

fn comparisons_for<'a>(filter: &'a TransformedFilter, name: &str) -> impl Iterator<Item = &'a ComparisonFilter> {
    get_filters_for_field(filter, name)
        .into_iter()
        .filter_map(TransformedFilter::as_comparison)
}

// ============================================================================
// RAW TREE CONVENIENCE
// ============================================================================

/// Transform `raw_tree` and collect every literal per field.
///
/// Per field, comparison values, set-membership values and string-function
/// values are concatenated in leaf order.
pub fn extract_all_field_values(
    raw_tree: &RawNode,
    binds: &BindTable,
) -> Result<IndexMap<String, Vec<FilterValue>>, FilterError> {
    let filter = transform_filter(raw_tree, binds, &TransformOptions::default())?;

    let values = create_filter_map(&filter)
        .into_iter()
        .map(|(field, leaves)| {
            let values: Vec<FilterValue> = leaves.into_iter().flat_map(leaf_values).collect();
            (field, values)
        })
        .collect();
    Ok(values)
}

fn leaf_values(leaf: &TransformedFilter) -> Vec<FilterValue> {
    match leaf {
        TransformedFilter::Comparison(c) => vec![c.value.clone()],
        TransformedFilter::In(i) => i.values.clone(),
        TransformedFilter::NotIn(n) => n.values.clone(),
        TransformedFilter::StringFunction(s) => vec![FilterValue::String(s.value.clone())],
        TransformedFilter::Logical(_) | TransformedFilter::Not(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::types::{InFilter, LogicalFilter, NotFilter, NotInFilter};
    use serde_json::json;

    fn cmp(field: &str, operator: ComparisonOp, value: impl Into<FilterValue>) -> TransformedFilter {
        TransformedFilter::Comparison(ComparisonFilter {
            field: field.to_string(),
            operator,
            value: value.into(),
        })
    }

    fn logical(operator: LogicalOp, filters: Vec<TransformedFilter>) -> TransformedFilter {
        TransformedFilter::Logical(LogicalFilter { operator, filters })
    }

    fn not(filter: TransformedFilter) -> TransformedFilter {
        TransformedFilter::Not(NotFilter {
            filter: Box::new(filter),
        })
    }

    fn in_filter(field: &str, values: Vec<FilterValue>) -> TransformedFilter {
        TransformedFilter::In(InFilter {
            field: field.to_string(),
            values,
        })
    }

    fn string_fn(function: StringFunction, field: &str, value: &str) -> TransformedFilter {
        TransformedFilter::StringFunction(StringFunctionFilter {
            function,
            field: field.to_string(),
            value: value.to_string(),
        })
    }

    // ========================================================================
    // FLATTENING
    // ========================================================================

    #[test]
    fn test_flatten_leaf_returns_itself() {
        let leaf = cmp("status", ComparisonOp::Eq, "active");
        assert_eq!(flatten_filters(&leaf), vec![&leaf]);
    }

    #[test]
    fn test_flatten_negation_is_transparent() {
        let inner = cmp("x", ComparisonOp::Eq, 1_i64);
        let filter = not(inner.clone());
        let leaves = flatten_filters(&filter);
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0], &inner);
    }

    #[test]
    fn test_flatten_nested_preserves_order() {
        let filter = logical(
            LogicalOp::And,
            vec![
                cmp("a", ComparisonOp::Eq, 1_i64),
                logical(
                    LogicalOp::Or,
                    vec![cmp("b", ComparisonOp::Eq, 2_i64), not(cmp("c", ComparisonOp::Eq, 3_i64))],
                ),
                cmp("d", ComparisonOp::Eq, 4_i64),
            ],
        );
        let fields: Vec<_> = flatten_filters(&filter).iter().filter_map(|f| f.field()).collect();
        assert_eq!(fields, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_filters_for_field_includes_every_leaf_kind() {
        let filter = logical(
            LogicalOp::And,
            vec![
                cmp("f", ComparisonOp::Ne, "x"),
                in_filter("f", vec!["a".into()]),
                TransformedFilter::NotIn(NotInFilter {
                    field: "f".to_string(),
                    values: vec!["b".into()],
                }),
                string_fn(StringFunction::Contains, "f", "z"),
                cmp("other", ComparisonOp::Eq, 1_i64),
            ],
        );
        assert_eq!(get_filters_for_field(&filter, "f").len(), 4);
        assert!(has_field_filter(&filter, "other"));
        assert!(!has_field_filter(&filter, "missing"));
    }

    #[test]
    fn test_filtered_field_names_deduplicated_first_seen() {
        let filter = logical(
            LogicalOp::Or,
            vec![
                cmp("b", ComparisonOp::Eq, 1_i64),
                cmp("a", ComparisonOp::Eq, 1_i64),
                cmp("b", ComparisonOp::Gt, 0_i64),
                not(in_filter("c", vec![true.into()])),
            ],
        );
        assert_eq!(get_filtered_field_names(&filter), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_create_filter_map_groups_by_field() {
        let filter = logical(
            LogicalOp::And,
            vec![
                cmp("price", ComparisonOp::Ge, 100_i64),
                cmp("status", ComparisonOp::Eq, "active"),
                cmp("price", ComparisonOp::Le, 500_i64),
            ],
        );
        let map = create_filter_map(&filter);
        let keys: Vec<_> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["price", "status"]);
        assert_eq!(map["price"].len(), 2);
        assert_eq!(map["status"].len(), 1);
    }

    // ========================================================================
    // CHAINS
    // ========================================================================

    #[test]
    fn test_collect_n_ary_chain() {
        let filter = logical(
            LogicalOp::And,
            vec![
                cmp("a", ComparisonOp::Eq, 1_i64),
                cmp("b", ComparisonOp::Eq, 2_i64),
                cmp("c", ComparisonOp::Eq, 3_i64),
                cmp("d", ComparisonOp::Eq, 4_i64),
            ],
        );
        let operands = collect_and_filters(&filter);
        assert_eq!(operands.len(), 4);
        assert!(operands.iter().all(|f| f.is_leaf()));
        assert_eq!(flatten_filters(&filter).len(), 4);
    }

    #[test]
    fn test_collect_descends_same_operator_only() {
        let or_group = logical(
            LogicalOp::Or,
            vec![cmp("b", ComparisonOp::Eq, 2_i64), cmp("c", ComparisonOp::Eq, 3_i64)],
        );
        let filter = logical(
            LogicalOp::And,
            vec![
                cmp("a", ComparisonOp::Eq, 1_i64),
                logical(
                    LogicalOp::And,
                    vec![cmp("d", ComparisonOp::Eq, 4_i64), or_group.clone()],
                ),
            ],
        );

        let and_operands = collect_and_filters(&filter);
        assert_eq!(and_operands.len(), 3);
        assert_eq!(and_operands[2], &or_group);

        // Root is an `and`, so as an `or` chain it is one opaque unit
        let or_operands = collect_or_filters(&filter);
        assert_eq!(or_operands, vec![&filter]);
        assert_eq!(collect_or_filters(&or_group).len(), 2);
    }

    #[test]
    fn test_collect_leaf_is_single_unit() {
        let leaf = cmp("a", ComparisonOp::Eq, 1_i64);
        assert_eq!(collect_and_filters(&leaf), vec![&leaf]);
        let negated = not(leaf);
        assert_eq!(collect_or_filters(&negated), vec![&negated]);
    }

    // ========================================================================
    // TYPED ACCESSORS
    // ========================================================================

    #[test]
    fn test_extract_equality_value() {
        let filter = logical(
            LogicalOp::And,
            vec![
                cmp("status", ComparisonOp::Ne, "deleted"),
                cmp("status", ComparisonOp::Eq, "active"),
                cmp("status", ComparisonOp::Eq, "pending"),
            ],
        );
        assert_eq!(extract_equality_value(&filter, "status"), Some(&FilterValue::from("active")));
        assert_eq!(extract_equality_value(&filter, "other"), None);
    }

    #[test]
    fn test_extract_comparison_matches_operator() {
        let filter = logical(
            LogicalOp::And,
            vec![cmp("n", ComparisonOp::Gt, 1_i64), cmp("n", ComparisonOp::Lt, 9_i64)],
        );
        let lt = extract_comparison(&filter, "n", ComparisonOp::Lt).unwrap();
        assert_eq!(lt.value, FilterValue::Number(9.0));
        assert!(extract_comparison(&filter, "n", ComparisonOp::Eq).is_none());
    }

    #[test]
    fn test_extract_in_and_field_values() {
        let filter = logical(
            LogicalOp::And,
            vec![
                in_filter("tier", vec!["gold".into(), "silver".into()]),
                cmp("tier", ComparisonOp::Eq, "bronze"),
                cmp("region", ComparisonOp::Eq, "eu"),
            ],
        );
        assert_eq!(
            extract_in_values(&filter, "tier"),
            Some(&[FilterValue::from("gold"), FilterValue::from("silver")][..])
        );
        assert_eq!(
            extract_field_values(&filter, "tier"),
            Some(vec![FilterValue::from("gold"), FilterValue::from("silver")])
        );
        assert_eq!(extract_field_values(&filter, "region"), Some(vec![FilterValue::from("eu")]));
        assert_eq!(extract_in_values(&filter, "region"), None);
        assert_eq!(extract_field_values(&filter, "missing"), None);
    }

    #[test]
    fn test_extract_range_inclusive_bounds() {
        let filter = logical(
            LogicalOp::And,
            vec![cmp("price", ComparisonOp::Ge, 100_i64), cmp("price", ComparisonOp::Le, 500_i64)],
        );
        assert_eq!(
            extract_range(&filter, "price"),
            Some(FieldRange {
                min: Some(FilterValue::Number(100.0)),
                min_inclusive: Some(true),
                max: Some(FilterValue::Number(500.0)),
                max_inclusive: Some(true),
            })
        );
    }

    #[test]
    fn test_extract_range_single_exclusive_bound() {
        let filter = cmp("price", ComparisonOp::Gt, 100_i64);
        let range = extract_range(&filter, "price").unwrap();
        assert_eq!(range.min, Some(FilterValue::Number(100.0)));
        assert_eq!(range.min_inclusive, Some(false));
        assert_eq!(range.max, None);
        assert_eq!(range.max_inclusive, None);
    }

    #[test]
    fn test_extract_range_last_wins() {
        let filter = logical(
            LogicalOp::And,
            vec![cmp("price", ComparisonOp::Gt, 100_i64), cmp("price", ComparisonOp::Ge, 200_i64)],
        );
        let range = extract_range(&filter, "price").unwrap();
        assert_eq!(range.min, Some(FilterValue::Number(200.0)));
        assert_eq!(range.min_inclusive, Some(true));
    }

    #[test]
    fn test_extract_range_ignores_equality() {
        let filter = cmp("price", ComparisonOp::Eq, 100_i64);
        assert_eq!(extract_range(&filter, "price"), None);
    }

    #[test]
    fn test_field_range_serializes_present_bounds_only() {
        let range = FieldRange {
            min: Some(FilterValue::Number(1.0)),
            min_inclusive: Some(false),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&range).unwrap(),
            json!({"min": 1.0, "min_inclusive": false})
        );
    }

    #[test]
    fn test_extract_string_function() {
        let filter = logical(
            LogicalOp::Or,
            vec![
                string_fn(StringFunction::StartsWith, "name", "Jo"),
                string_fn(StringFunction::Contains, "name", "hn"),
            ],
        );
        assert_eq!(extract_string_function(&filter, "name", None).unwrap().value, "Jo");
        assert_eq!(
            extract_string_function(&filter, "name", Some(StringFunction::Contains))
                .unwrap()
                .value,
            "hn"
        );
        assert!(extract_string_function(&filter, "name", Some(StringFunction::EndsWith)).is_none());
    }

    // ========================================================================
    // RAW TREE CONVENIENCE
    // ========================================================================

    #[test]
    fn test_extract_all_field_values() {
        let binds = BindTable::from_json(&json!([
            ["Real", 100],
            ["Text", "a"],
            ["Text", "b"],
            ["Text", "Jo"],
            ["Real", 500]
        ]))
        .unwrap();
        let tree = json!([
            "and",
            ["ge", {"name": "price"}, {"bind": 0}],
            ["in", {"name": "tag"}, [{"bind": 1}, {"bind": 2}]],
            ["startswith", {"name": "name"}, {"bind": 3}],
            ["le", {"name": "price"}, {"bind": 4}]
        ]);
        let values = extract_all_field_values(&tree, &binds).unwrap();
        let fields: Vec<_> = values.keys().map(String::as_str).collect();
        assert_eq!(fields, vec!["price", "tag", "name"]);
        assert_eq!(values["price"], vec![FilterValue::Number(100.0), FilterValue::Number(500.0)]);
        assert_eq!(values["tag"], vec![FilterValue::from("a"), FilterValue::from("b")]);
        assert_eq!(values["name"], vec![FilterValue::from("Jo")]);
    }

    #[test]
    fn test_extract_all_field_values_propagates_errors() {
        let err = extract_all_field_values(&json!(["eq", {"name": "f"}, {"bind": 0}]), &BindTable::new())
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidBindReference(_)));
    }
}
