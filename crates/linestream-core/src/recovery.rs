//! Reconnection policy for broken streams
//!
//! Escalates from retrying a read, to re-requesting the body on the same
//! transport, to a brand-new connection, and finally gives up.

use serde::Serialize;

/// What the engine should do after a failed read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecoveryAction {
    /// Try reading again; covers one-off blips
    RetryRead,
    /// Discard the line source and re-request it over the same transport
    ReopenReader,
    /// Discard transport and reader, reconnect with a freshly built request
    ReopenConnection,
    /// Stop recovering and report the failure
    GiveUp,
}

/// Bounded, escalating recovery decisions
///
/// The failure counter is reset by the engine on every well-formed message,
/// so a healthy stream never reaches `GiveUp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryPolicy;

impl RecoveryPolicy {
    /// Number of consecutive failures tolerated before giving up
    pub const MAX_FAILURES: u32 = 3;

    pub fn decide(failures: u32) -> RecoveryAction {
        match failures {
            0 => RecoveryAction::RetryRead,
            1 => RecoveryAction::ReopenReader,
            2 => RecoveryAction::ReopenConnection,
            _ => RecoveryAction::GiveUp,
        }
    }
}
