//! Core library for linestream
//!
//! - Long-lived streaming HTTP connections carrying newline-delimited JSON
//! - Stall detection, bounded reconnection and pause/resume/stop control
//! - Lifecycle notifications for any number of listeners

pub mod config;
pub mod engine;
pub mod error;
pub mod error_info;
pub mod events;
pub mod recovery;
pub mod request;
pub mod transport;
pub mod validate;

pub use config::StreamConfig;
pub use engine::{BeforeConnect, StreamEngine, StreamEngineBuilder, StreamState};
pub use error::StreamError;
pub use events::{EventHub, LifecycleEvent, ListenerId};
pub use recovery::{RecoveryAction, RecoveryPolicy};
pub use request::{Credentials, GrantType, HttpMethod, RequestDescriptor, RequestFactory};
pub use transport::{ConnectionHandle, ConnectionOpener, HttpConnectionOpener, LineReader, ReadOutcome};
