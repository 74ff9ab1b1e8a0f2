//! Essentia Core - connection and command management for a multi-zone
//! audio matrix.
//!
//! This crate drives a 12-zone, 6-source amplifier over a TCP-to-RS232
//! serial bridge speaking a CR-terminated plaintext protocol. It is
//! designed to be embedded in a host automation platform, which supplies
//! the UI and receives state through events.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`protocol`]: Wire encoding of commands and decoding of responses
//! - [`zones`]: Cached per-zone state with field-level change tracking
//! - [`queue`]: Rate-limited outbound command queue
//! - [`connection`]: Connect/validate/heartbeat/reconnect supervision
//! - [`activity`]: Derived per-source "currently playing" flags
//! - [`transport`]: Line transport seam and the TCP implementation
//! - [`session`]: The [`DeviceSession`] facade tying it all together
//! - [`events`]: Event delivery to subscribers
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! Platform-specific concerns sit behind traits with default
//! implementations suitable for headless use:
//!
//! - [`LineTransport`](transport::LineTransport): Connection establishment
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`AlertNotifier`](events::AlertNotifier): Failure-threshold alerts

#![warn(clippy::all)]

pub mod activity;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod events;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod transport;
pub mod utils;
pub mod zones;

// Re-export commonly used types at the crate root
pub use activity::SourceActivityChange;
pub use config::SessionConfig;
pub use connection::{ConnectionEvent, ConnectionHealth, ConnectionState};
pub use error::{EssentiaError, EssentiaResult};
pub use events::{
    AlertNotifier, BroadcastEventBridge, DeviceEvent, DeviceFault, EventEmitter,
    LoggingAlertNotifier, LoggingEventEmitter, NoopAlertNotifier, NoopEventEmitter,
};
pub use protocol::{decode, Command, Power, Response, ZoneAttribute};
pub use session::DeviceSession;
pub use transport::{LineSink, LineSource, LineTransport, TcpLineTransport};
pub use zones::{ZoneChange, ZoneState, ZoneStateStore};
