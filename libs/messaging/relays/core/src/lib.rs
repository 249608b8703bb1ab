//! # Chat Relay Core Infrastructure
//!
//! Everything between the socket and the integrity codec: the shared client
//! registry, per-connection sessions with bounded outbound queues, the
//! validation policies, configuration, runtime stats and the client library
//! used by the console front-end.

pub mod client;
pub mod common;
pub mod config;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use client::{ChatClient, ChatHandler};
pub use common::error::{RelayEngineError, Result};
pub use common::outbound::{Delivery, PeerHandle};
pub use common::registry::{Admission, BroadcastReport, ClientEntry, ClientRegistry, Removal};
pub use common::session::{handle_connection, SessionContext};
pub use common::Relay;
pub use self::config::*;
pub use self::types::*;
pub use self::validation::*;
