//! Value plumbing: property lookup, object merging, string templating.

use crate::stringify;
use async_trait::async_trait;
use loomcore::{
    combine, require_connection, Edge, Flow, FlowDataType, FlowNode, HandleContract,
    HandleDirection, HandleResolver, HandleSpec, NodeCategory, NodeContext, NodeDefinition,
    NodeError, NodeResult, ValidationIssue, ValueMap,
};
use serde_json::Value;

/// Looks up a dot-separated path inside its `object` input. The output type
/// mirrors the schema of whatever feeds `object`, when one is declared.
pub struct GetPropertyNode;

impl GetPropertyNode {
    fn path_of(node: &FlowNode) -> Option<&str> {
        node.data_str("path").filter(|p| !p.is_empty())
    }
}

#[async_trait]
impl NodeDefinition for GetPropertyNode {
    fn node_type(&self) -> &str {
        "data.get_property"
    }

    fn label(&self) -> &str {
        "Get Property"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Data
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::new("object", FlowDataType::Object))
            .output(HandleSpec::main(FlowDataType::Any))
    }

    fn validate(&self, node: &FlowNode, edges: &[Edge]) -> Vec<ValidationIssue> {
        let mut issues = combine([require_connection(&node.id, edges, Some("object"), "Object")]);
        if Self::path_of(node).is_none() {
            issues.push(ValidationIssue::error("Path is required").for_field("path"));
        }
        issues
    }

    /// Output type is derived from the upstream object's declared schema, so
    /// the editor can type-check connections out of this node.
    fn handle_type(
        &self,
        node: &FlowNode,
        handle: Option<&str>,
        direction: HandleDirection,
        flow: &Flow,
        resolver: &dyn HandleResolver,
    ) -> Option<FlowDataType> {
        if direction != HandleDirection::Output || handle.is_some() {
            return None;
        }
        let path = Self::path_of(node)?;
        let feeding = flow.edge_into(&node.id, Some("object"))?;
        let upstream = resolver.handle_spec(
            flow,
            &feeding.source,
            feeding.source_handle.as_deref(),
            HandleDirection::Output,
        )?;
        Some(schema_type_at(upstream.schema.as_ref()?, path).unwrap_or(FlowDataType::Any))
    }

    async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let path = Self::path_of(node)
            .ok_or_else(|| NodeError::Configuration("path is required".to_string()))?;
        let object = ctx.require_input("object")?;
        let value = walk_path(object, path).cloned().unwrap_or(Value::Null);
        Ok(NodeResult::main(value))
    }
}

fn walk_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Walk a JSON-schema-subset descriptor down a dot path and map the terminal
/// `type` keyword onto a flow data type.
fn schema_type_at(schema: &Value, path: &str) -> Option<FlowDataType> {
    let mut current = schema;
    for segment in path.split('.') {
        current = if segment.parse::<usize>().is_ok() {
            current.get("items")?
        } else {
            current.get("properties")?.get(segment)?
        };
    }
    match current.get("type")?.as_str()? {
        "string" => Some(FlowDataType::String),
        "number" | "integer" => Some(FlowDataType::Number),
        "boolean" => Some(FlowDataType::Boolean),
        "object" => Some(FlowDataType::Object),
        "array" => Some(FlowDataType::Array),
        _ => Some(FlowDataType::Any),
    }
}

/// Shallow-merges a configurable number of objects, later inputs winning.
/// Its input handles are a variadic `object_N` family sized by `count`.
pub struct MergeObjectsNode;

/// Upper bound on the `object_N` input family. Node data is untrusted, so
/// `count` never sizes an unbounded iteration.
const MAX_MERGE_INPUTS: u64 = 16;

impl MergeObjectsNode {
    fn count(node: &FlowNode) -> usize {
        node.data_u64("count")
            .map(|c| c.clamp(1, MAX_MERGE_INPUTS) as usize)
            .unwrap_or(2)
    }
}

#[async_trait]
impl NodeDefinition for MergeObjectsNode {
    fn node_type(&self) -> &str {
        "data.merge_objects"
    }

    fn label(&self) -> &str {
        "Merge Objects"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Data
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new().output(HandleSpec::main(FlowDataType::Object))
    }

    fn dynamic_handles(
        &self,
        node: &FlowNode,
        direction: HandleDirection,
        _flow: &Flow,
        _resolver: &dyn HandleResolver,
    ) -> Option<Vec<HandleSpec>> {
        if direction != HandleDirection::Input {
            return None;
        }
        Some(
            (0..Self::count(node))
                .filter_map(|i| self.dynamic_handle_id(i))
                .map(|id| HandleSpec::new(id, FlowDataType::Object))
                .collect(),
        )
    }

    fn dynamic_handle_id(&self, index: usize) -> Option<String> {
        Some(format!("object_{}", index + 1))
    }

    fn is_dynamic_handle(&self, handle: &str) -> bool {
        handle
            .strip_prefix("object_")
            .and_then(|n| n.parse::<usize>().ok())
            // Reject zero and zero-padded spellings the id scheme never emits.
            .is_some_and(|n| n >= 1 && handle == format!("object_{n}"))
    }

    async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let mut merged = ValueMap::new();
        for i in 0..Self::count(node) {
            let Some(id) = self.dynamic_handle_id(i) else {
                continue;
            };
            match ctx.input(&id) {
                Some(Value::Object(map)) => merged.extend(map.clone()),
                Some(other) => {
                    return Err(NodeError::InvalidInputType {
                        field: id,
                        expected: "object",
                        actual: loomcore::type_name(other).to_string(),
                    })
                }
                None => {}
            }
        }
        Ok(NodeResult::main(Value::Object(merged)))
    }
}

/// Renders a `{{placeholder}}` template; each distinct placeholder becomes an
/// input handle.
pub struct TemplateNode;

impl TemplateNode {
    fn template_of(node: &FlowNode) -> &str {
        node.data_str("template").unwrap_or_default()
    }
}

#[async_trait]
impl NodeDefinition for TemplateNode {
    fn node_type(&self) -> &str {
        "data.template"
    }

    fn label(&self) -> &str {
        "Template"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Data
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new().output(HandleSpec::main(FlowDataType::String))
    }

    fn validate(&self, node: &FlowNode, _edges: &[Edge]) -> Vec<ValidationIssue> {
        if Self::template_of(node).is_empty() {
            vec![ValidationIssue::error("Template is required").for_field("template")]
        } else {
            Vec::new()
        }
    }

    fn dynamic_handles(
        &self,
        node: &FlowNode,
        direction: HandleDirection,
        _flow: &Flow,
        _resolver: &dyn HandleResolver,
    ) -> Option<Vec<HandleSpec>> {
        if direction != HandleDirection::Input {
            return None;
        }
        Some(
            placeholders(Self::template_of(node))
                .into_iter()
                .map(|name| HandleSpec::new(name, FlowDataType::Any))
                .collect(),
        )
    }

    async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let mut rendered = Self::template_of(node).to_string();
        for name in placeholders(Self::template_of(node)) {
            let replacement = ctx.input(&name).map(stringify).unwrap_or_default();
            rendered = rendered.replace(&format!("{{{{{name}}}}}"), &replacement);
        }
        Ok(NodeResult::main(rendered))
    }
}

/// Distinct `{{name}}` placeholders, in first-appearance order.
fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let name = rest[start + 2..start + 2 + len].trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        rest = &rest[start + 2 + len + 2..];
    }
    names
}
