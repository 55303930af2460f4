//! Event-driven service-state monitoring
//!
//! Observations from agents flow through the [`monitor`], which turns real
//! state transitions into [`events::Event`]s on an [`events::EventBus`]. The
//! [`hub`] streams those events to WebSocket clients and the
//! [`notifier::NotifierManager`] forwards them to external backends.

#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod hub;
pub mod monitor;
pub mod notifier;
pub mod providers;
pub mod util;
