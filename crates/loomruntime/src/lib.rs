//! Flow execution runtime.
//!
//! This crate provides the node-type registry, typed-handle resolution,
//! connection/flow validation, and the interpreter that walks a node graph:
//! ready-queue scheduling, sentinel interpretation, branch selection,
//! sub-flow recursion with a depth guard, and cooperative cancellation.

mod executor;
mod handles;
mod registry;
mod runtime;
mod validate;

pub use handles::{resolve_handle_spec, resolve_handle_type, RegistryResolver};
pub use registry::NodeRegistry;
pub use runtime::{FlowRuntime, RuntimeConfig};
pub use validate::{check_connection_validity, is_runnable, validate_flow};
