//! Handle resolution: what type sits on a given connection point, accounting
//! for node types whose handles depend on their data or the upstream graph.

use crate::registry::NodeRegistry;
use loomcore::{Flow, FlowDataType, FlowNode, HandleDirection, HandleResolver, HandleSpec};

/// [`HandleResolver`] backed by a registry. Passed into `NodeDefinition`
/// hooks so dynamic-handle computations can resolve other nodes' handles.
pub struct RegistryResolver<'a> {
    registry: &'a NodeRegistry,
}

impl<'a> RegistryResolver<'a> {
    pub fn new(registry: &'a NodeRegistry) -> Self {
        Self { registry }
    }
}

impl HandleResolver for RegistryResolver<'_> {
    fn handle_spec(
        &self,
        flow: &Flow,
        node_id: &str,
        handle: Option<&str>,
        direction: HandleDirection,
    ) -> Option<HandleSpec> {
        let node = flow.find_node(node_id)?;
        resolve_handle_spec(self.registry, flow, node, handle, direction)
    }

    fn handle_type(
        &self,
        flow: &Flow,
        node_id: &str,
        handle: Option<&str>,
        direction: HandleDirection,
    ) -> Option<FlowDataType> {
        let node = flow.find_node(node_id)?;
        resolve_handle_type(self.registry, flow, node, handle, direction)
    }
}

/// Resolve the full spec of one handle. Dynamic handles take precedence over
/// the static contract; an unknown node type or handle id resolves to `None`.
pub fn resolve_handle_spec(
    registry: &NodeRegistry,
    flow: &Flow,
    node: &FlowNode,
    handle: Option<&str>,
    direction: HandleDirection,
) -> Option<HandleSpec> {
    let definition = registry.get(&node.node_type)?;
    let resolver = RegistryResolver::new(registry);

    if let Some(dynamic) = definition.dynamic_handles(node, direction, flow, &resolver) {
        if let Some(spec) = dynamic.iter().find(|s| s.matches(handle)) {
            return Some(spec.clone());
        }
    }

    definition
        .handles()
        .for_direction(direction)
        .iter()
        .find(|s| s.matches(handle))
        .cloned()
}

/// Type-only resolution. Cheaper than [`resolve_handle_spec`] for node types
/// that provide a `handle_type` hook (e.g. mirroring an upstream schema);
/// falls back to the full spec lookup otherwise.
pub fn resolve_handle_type(
    registry: &NodeRegistry,
    flow: &Flow,
    node: &FlowNode,
    handle: Option<&str>,
    direction: HandleDirection,
) -> Option<FlowDataType> {
    let definition = registry.get(&node.node_type)?;
    let resolver = RegistryResolver::new(registry);

    if let Some(data_type) = definition.handle_type(node, handle, direction, flow, &resolver) {
        return Some(data_type);
    }

    resolve_handle_spec(registry, flow, node, handle, direction).map(|s| s.data_type)
}
