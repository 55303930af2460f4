//! Concrete [`ServiceProvider`](crate::monitor::ServiceProvider) backends
//! wired up by the bootstrap layer

pub mod agent;

pub use agent::HttpAgentProvider;
