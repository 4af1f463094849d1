//! runrelay Gateway HTTP API Server
//!
//! Decodes conversational requests, keeps session → thread affinity, and hands
//! each request to the run resolver.

pub mod detect_intent;
pub mod health;
pub mod server;
pub mod session_store;

pub use server::{build_router, start_server, GatewayState};
pub use session_store::SessionStore;
