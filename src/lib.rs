//! Client-side realtime messaging core for the EV service portal.
//!
//! A single STOMP-over-WebSocket connection per user feeds the chat widget, the staff inbox
//! and the notification bell. Each surface keeps its own reconciled view of the messages.

pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::services::*;
pub use config::*;
pub use domain::entities::*;
pub use domain::errors::{RealtimeError, RealtimeResult};
pub use shared::events::*;
