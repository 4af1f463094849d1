pub mod resolver;

pub use resolver::{RunResolver, DEFAULT_POLL_INTERVAL};
