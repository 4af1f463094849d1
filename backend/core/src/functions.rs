use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::RelayError;
use crate::traits::Function;

/// Registry-facing view of a function: JSON text in, JSON text out.
#[async_trait]
trait ErasedFunction: Send + Sync {
    async fn call(&self, name: &str, input: &str) -> Result<String, RelayError>;
    fn definition(&self, name: &str) -> FunctionDefinition;
}

struct Typed<F>(F);

#[async_trait]
impl<F: Function> ErasedFunction for Typed<F> {
    async fn call(&self, name: &str, input: &str) -> Result<String, RelayError> {
        let input: F::Input =
            serde_json::from_str(input).map_err(|source| RelayError::MalformedInput {
                function: name.to_string(),
                source,
            })?;

        let output = self
            .0
            .invoke(input)
            .await
            .map_err(|e| RelayError::Execution {
                function: name.to_string(),
                message: format!("{e:#}"),
            })?;

        serde_json::to_string(&output).map_err(|source| RelayError::Serialization {
            function: name.to_string(),
            source,
        })
    }

    fn definition(&self, name: &str) -> FunctionDefinition {
        FunctionDefinition {
            name: name.to_string(),
            description: self.0.description().to_string(),
            parameters: self.0.parameters(),
            output: self.0.output_schema(),
        }
    }
}

/// Declared shape of a registered function.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub output: serde_json::Value,
}

/// Name → function bindings shared by every in-flight run.
///
/// Written during startup, read concurrently afterwards. The lock is released
/// before a function is invoked.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, Arc<dyn ErasedFunction>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `function` to `name`, replacing any previous binding.
    pub fn register<F: Function>(&self, name: impl Into<String>, function: F) {
        let name = name.into();
        debug!(function = %name, "Registering function");
        self.functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(Typed(function)));
    }

    /// Execute `name` with a JSON argument payload and return the JSON output.
    pub async fn execute(&self, name: &str, input: &str) -> Result<String, RelayError> {
        let function = self
            .functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| RelayError::FunctionNotFound(name.to_string()))?;

        function.call(name, input).await
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Definitions of all registered functions, sorted by name.
    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        let functions = self
            .functions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut defs: Vec<_> = functions
            .iter()
            .map(|(name, f)| f.definition(name))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}
