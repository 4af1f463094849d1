//! Assistant-run API gateways.
//!
//! `OpenAiAssistants` talks to the hosted Assistants API; `ScriptedGateway`
//! replays a fixed run lifecycle in memory and records every call it sees.

pub mod openai;
pub mod scripted;

pub use openai::OpenAiAssistants;
pub use scripted::{GatewayCall, Operation, ScriptedGateway};
