pub mod resolve_order;

pub use resolve_order::{Order, ResolveOrderTool, ResolveResponse};

use runrelay_core::FunctionRegistry;

/// Build the registry holding every function the assistant may call.
pub fn default_registry() -> FunctionRegistry {
    let registry = FunctionRegistry::new();
    registry.register(resolve_order::NAME, ResolveOrderTool);
    registry
}
