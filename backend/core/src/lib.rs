pub mod error;
pub mod functions;
pub mod traits;
pub mod types;

pub use error::RelayError;
pub use functions::{FunctionDefinition, FunctionRegistry};
pub use traits::{AssistantGateway, Function};
pub use types::{MessageRole, Run, RunOutcome, RunStatus, ThreadMessage, ToolCall, ToolOutput};
