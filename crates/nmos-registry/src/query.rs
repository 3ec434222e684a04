//! The flat-equality + RQL-basic-predicate filter subset of spec.md
//! §4.5, and the cursor-based pagination window.
//!
//! SPEC_FULL.md's Open Question #1: "implement flat key=value equality
//! plus `eq()`, `matches()` (substring/regex-lite), `contains()` as the
//! spec names; nothing wider" — this module is exactly that subset, not
//! the full RQL grammar IS-04 technically allows.

use serde_json::Value as Json;

use nmos_core::Resource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    /// Case-insensitive substring test — the "regex-lite" the spec
    /// names, without pulling in a full regex engine for a handful of
    /// label/description queries.
    Matches,
    Contains,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

/// Parse a query string's filter terms. Each comma-separated term is
/// either flat `field=value` (equality) or `op(field,value)` for
/// `eq`/`matches`/`contains`. Unrecognised terms are ignored rather than
/// rejected — an unknown filter key matching nothing is indistinguishable
/// from a typo, and §4.5 doesn't specify 400 behaviour for this.
pub fn parse_filters(query: &str) -> Vec<Filter> {
    query
        .split('&')
        .filter_map(|term| parse_term(term))
        .collect()
}

fn parse_term(term: &str) -> Option<Filter> {
    if let Some(rest) = term
        .strip_prefix("eq(")
        .or_else(|| term.strip_prefix("matches("))
        .or_else(|| term.strip_prefix("contains("))
    {
        let op = if term.starts_with("eq(") {
            FilterOp::Eq
        } else if term.starts_with("matches(") {
            FilterOp::Matches
        } else {
            FilterOp::Contains
        };
        let inner = rest.strip_suffix(')')?;
        let (field, value) = inner.split_once(',')?;
        return Some(Filter {
            field: field.trim().to_string(),
            op,
            value: value.trim().to_string(),
        });
    }
    let (field, value) = term.split_once('=')?;
    if field.is_empty() {
        return None;
    }
    Some(Filter {
        field: field.to_string(),
        op: FilterOp::Eq,
        value: value.to_string(),
    })
}

pub fn resource_matches(resource: &Resource, filters: &[Filter]) -> bool {
    filters.iter().all(|f| filter_matches(resource, f))
}

fn filter_matches(resource: &Resource, filter: &Filter) -> bool {
    let values = resource_field_values(resource, &filter.field);
    match filter.op {
        FilterOp::Eq => values.iter().any(|v| v == &filter.value),
        FilterOp::Matches => values
            .iter()
            .any(|v| v.to_lowercase().contains(&filter.value.to_lowercase())),
        FilterOp::Contains => values.iter().any(|v| v.contains(&filter.value)),
    }
}

fn resource_field_values(resource: &Resource, field: &str) -> Vec<String> {
    match field {
        "id" => vec![resource.id.to_string()],
        "label" => vec![resource.label.clone()],
        "description" => vec![resource.description.clone()],
        "version" => vec![resource.version.to_wire()],
        _ if field.starts_with("tags.") => resource
            .tags
            .get(&field["tags.".len()..])
            .cloned()
            .unwrap_or_default(),
        _ => {
            let json = serde_json::to_value(&resource.data).unwrap_or(Json::Null);
            json_path_strings(&json, field)
        }
    }
}

/// Walks a dot-separated path through a JSON value, stringifying
/// whatever leaf (or leaves, for arrays of scalars/objects-with-the-same-
/// leaf) it lands on. Good enough for the type-specific fields (e.g.
/// `device_id`, `format`, `transport`) without a general JSONPath engine.
fn json_path_strings(value: &Json, path: &str) -> Vec<String> {
    let mut current = value.clone();
    for segment in path.split('.') {
        current = match current {
            Json::Object(mut map) => map.remove(segment).unwrap_or(Json::Null),
            Json::Array(items) => {
                let collected: Vec<Json> = items
                    .into_iter()
                    .filter_map(|item| item.get(segment).cloned())
                    .collect();
                Json::Array(collected)
            }
            _ => Json::Null,
        };
    }
    flatten_to_strings(&current)
}

fn flatten_to_strings(value: &Json) -> Vec<String> {
    match value {
        Json::Null => vec![],
        Json::String(s) => vec![s.clone()],
        Json::Array(items) => items.iter().flat_map(flatten_to_strings).collect(),
        other => vec![other.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nmos_core::{Format, Health, ResourceData, ResourceId, SourceData, TaiTimestamp, Version};

    fn source() -> Resource {
        let mut r = Resource::new(
            ResourceId::random(),
            Version(TaiTimestamp::ZERO),
            ResourceData::Source(SourceData {
                device_id: ResourceId::random(),
                format: Format::Video,
                extra: Json::Null,
            }),
            Health::LastHeartbeat(0),
        );
        r.label = "Camera 1".to_string();
        r
    }

    #[test]
    fn flat_equality_matches_a_type_specific_field() {
        let r = source();
        let filters = parse_filters("format=video");
        assert!(resource_matches(&r, &filters));
        let filters = parse_filters("format=audio");
        assert!(!resource_matches(&r, &filters));
    }

    #[test]
    fn matches_is_case_insensitive_substring() {
        let r = source();
        let filters = parse_filters("matches(label,camera)");
        assert!(resource_matches(&r, &filters));
    }

    #[test]
    fn contains_is_case_sensitive_substring() {
        let r = source();
        let filters = parse_filters("contains(label,Camera)");
        assert!(resource_matches(&r, &filters));
        let filters = parse_filters("contains(label,camera)");
        assert!(!resource_matches(&r, &filters));
    }

    #[test]
    fn unknown_field_matches_nothing() {
        let r = source();
        let filters = parse_filters("eq(nonexistent,x)");
        assert!(!resource_matches(&r, &filters));
    }
}
