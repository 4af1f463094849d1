//! Structured logging for runrelay.
//!
//! Console + rolling JSON file output, payload redaction, and the run event log.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{RunEvent, RunEventEntry, RunEventLogger};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;
