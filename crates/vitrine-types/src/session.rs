//! Session lifecycle types.
//!
//! The transport reports everything that happens to a live session as a
//! [`SessionEvent`]. The supervisor folds those events into a
//! [`SupervisorPhase`] and publishes a [`StatusSnapshot`] for the HTTP
//! status surface.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::CredentialSet;
use crate::message::{GroupMembershipChange, InboundMessage, Reaction};

/// Connectivity of one session instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Connecting,
    Open,
    Closed,
}

/// Why a session closed.
///
/// Classified from the protocol's numeric disconnect code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The device was unlinked by the user (401).
    LoggedOut,
    /// The account or device identity was rejected (403).
    Forbidden,
    /// Keep-alive or handshake timeout (408).
    TimedOut,
    /// The remote end dropped the connection (428).
    ConnectionClosed,
    /// Another client took over this device identity (440).
    ConnectionReplaced,
    /// Corrupt or undecryptable session state (500).
    BadSession,
    /// The protocol asks for a fresh connection, usually after pairing (515).
    RestartRequired,
    /// The transport itself failed (process exit, stream ended, connect error).
    TransportLost(String),
    /// Any other code.
    Other { code: u16 },
}

impl CloseReason {
    /// Classify a protocol disconnect code.
    pub fn from_status_code(code: u16) -> Self {
        match code {
            401 => CloseReason::LoggedOut,
            403 => CloseReason::Forbidden,
            408 => CloseReason::TimedOut,
            428 => CloseReason::ConnectionClosed,
            440 => CloseReason::ConnectionReplaced,
            500 => CloseReason::BadSession,
            515 => CloseReason::RestartRequired,
            code => CloseReason::Other { code },
        }
    }

    /// Whether the closure invalidates the current credential set.
    ///
    /// Such closures need a human to scan a new credential code; retrying
    /// with the same credentials cannot succeed.
    pub fn is_logout(&self) -> bool {
        matches!(self, CloseReason::LoggedOut | CloseReason::Forbidden)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::LoggedOut => write!(f, "logged out"),
            CloseReason::Forbidden => write!(f, "forbidden"),
            CloseReason::TimedOut => write!(f, "timed out"),
            CloseReason::ConnectionClosed => write!(f, "connection closed"),
            CloseReason::ConnectionReplaced => write!(f, "connection replaced"),
            CloseReason::BadSession => write!(f, "bad session"),
            CloseReason::RestartRequired => write!(f, "restart required"),
            CloseReason::TransportLost(detail) => write!(f, "transport lost: {detail}"),
            CloseReason::Other { code } => write!(f, "closed with code {code}"),
        }
    }
}

/// A connectivity transition reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityChange {
    Connecting,
    /// A credential code must be presented out-of-band for scanning.
    ScanRequired { code: String },
    Open,
    Closed { reason: CloseReason },
}

/// Everything a live session can report.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Changed credential blobs (only the files that changed).
    CredentialsUpdated(CredentialSet),
    ConnectivityChanged(ConnectivityChange),
    MessageBatch(Vec<InboundMessage>),
    ReactionBatch(Vec<Reaction>),
    GroupMembershipChanged(GroupMembershipChange),
}

/// Named states of the supervisor's lifecycle machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorPhase {
    /// No session yet, or between instances.
    Idle,
    /// Waiting for the credential code to be scanned.
    Scanning,
    Open,
    Closed,
}

impl fmt::Display for SupervisorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorPhase::Idle => "idle",
            SupervisorPhase::Scanning => "scanning",
            SupervisorPhase::Open => "open",
            SupervisorPhase::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of the supervisor, served by the status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub phase: SupervisorPhase,
    /// Readiness: the session accepts outbound sends.
    pub connected: bool,
    pub reconnect_attempts: u32,
    /// Credential code awaiting a scan, if any.
    pub scan_code: Option<String>,
    pub last_change: DateTime<Utc>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            phase: SupervisorPhase::Idle,
            connected: false,
            reconnect_attempts: 0,
            scan_code: None,
            last_change: Utc::now(),
        }
    }
}
