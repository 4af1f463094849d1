use anyhow::Result;
use async_trait::async_trait;
use runrelay_core::Function;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

pub const NAME: &str = "resolve_order";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolveResponse {
    pub status: String,
}

/// Marks a customer order as resolved.
pub struct ResolveOrderTool;

#[async_trait]
impl Function for ResolveOrderTool {
    type Input = Order;
    type Output = ResolveResponse;

    fn description(&self) -> &str {
        "Resolve a customer order by its name and report the resulting status."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Name of the order to resolve, e.g. order-42"
                }
            },
        })
    }

    fn output_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "status": { "type": "string" }
            },
            "required": ["status"]
        })
    }

    async fn invoke(&self, order: Order) -> Result<ResolveResponse> {
        info!(order = %order.name, "Resolving order");

        Ok(ResolveResponse {
            status: "good".to_string(),
        })
    }
}
