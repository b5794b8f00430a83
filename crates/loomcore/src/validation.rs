use crate::flow::Edge;
use crate::types::MAIN_HANDLE;
use crate::types::ValueMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Error,
}

/// One structural diagnostic for a node. Error-severity issues block a run;
/// warnings do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Data field or handle the issue refers to, when attributable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    pub message: String,
    pub severity: IssueSeverity,
}

impl ValidationIssue {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            field_id: None,
            message: message.into(),
            severity: IssueSeverity::Error,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            field_id: None,
            message: message.into(),
            severity: IssueSeverity::Warning,
        }
    }

    pub fn for_field(mut self, field_id: impl Into<String>) -> Self {
        self.field_id = Some(field_id.into());
        self
    }
}

/// Diagnostics for one node, as produced by flow validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeIssues {
    pub node_id: String,
    pub issues: Vec<ValidationIssue>,
}

impl NodeIssues {
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }
}

/// Collect the issues from a set of independent per-node checks.
pub fn combine(checks: impl IntoIterator<Item = Option<ValidationIssue>>) -> Vec<ValidationIssue> {
    checks.into_iter().flatten().collect()
}

/// Error unless the node's data carries a non-empty `field`, or an edge feeds
/// the input handle of the same name.
pub fn require_field_or_connection(
    node_id: &str,
    data: &ValueMap,
    edges: &[Edge],
    field: &str,
    label: &str,
) -> Option<ValidationIssue> {
    if has_connection(node_id, edges, Some(field)) {
        return None;
    }
    match data.get(field) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => None,
        Some(serde_json::Value::Null) | None => Some(
            ValidationIssue::error(format!("{label} is required")).for_field(field),
        ),
        Some(_) => None,
    }
}

/// Error unless an edge feeds the given input handle (`None` = main).
pub fn require_connection(
    node_id: &str,
    edges: &[Edge],
    handle: Option<&str>,
    label: &str,
) -> Option<ValidationIssue> {
    if has_connection(node_id, edges, handle) {
        None
    } else {
        let issue = ValidationIssue::error(format!("{label} must be connected"));
        Some(match handle {
            Some(h) => issue.for_field(h),
            None => issue,
        })
    }
}

fn has_connection(node_id: &str, edges: &[Edge], handle: Option<&str>) -> bool {
    let key = handle.unwrap_or(MAIN_HANDLE);
    edges.iter().any(|e| e.target == node_id && e.target_key() == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn edge(target: &str, handle: Option<&str>) -> Edge {
        Edge {
            source: "src".into(),
            source_handle: None,
            target: target.into(),
            target_handle: handle.map(str::to_string),
        }
    }

    #[test]
    fn field_satisfied_by_data_or_connection() {
        let mut data = ValueMap::new();
        data.insert("flow".into(), json!("my-flow"));
        assert!(require_field_or_connection("n1", &data, &[], "flow", "Flow").is_none());

        let empty = ValueMap::new();
        let issue = require_field_or_connection("n1", &empty, &[], "flow", "Flow").unwrap();
        assert_eq!(issue.severity, IssueSeverity::Error);
        assert_eq!(issue.field_id.as_deref(), Some("flow"));

        let edges = [edge("n1", Some("flow"))];
        assert!(require_field_or_connection("n1", &empty, &edges, "flow", "Flow").is_none());
    }

    #[test]
    fn connection_requirement() {
        let edges = [edge("n1", None)];
        assert!(require_connection("n1", &edges, None, "Input").is_none());
        assert!(require_connection("n1", &edges, Some("items"), "Items").is_some());
        assert!(require_connection("n2", &edges, None, "Input").is_some());
    }

    #[test]
    fn main_spellings_satisfy_the_same_requirement() {
        let named = [edge("n1", Some(MAIN_HANDLE))];
        assert!(require_connection("n1", &named, None, "Input").is_none());

        let unnamed = [edge("n1", None)];
        assert!(require_connection("n1", &unnamed, Some(MAIN_HANDLE), "Input").is_none());
    }

    #[test]
    fn combine_drops_passing_checks() {
        let issues = combine([
            None,
            Some(ValidationIssue::warning("loose end")),
            None,
            Some(ValidationIssue::error("missing")),
        ]);
        assert_eq!(issues.len(), 2);
    }
}
