//! Wire protocol between Vitrine and the protocol sidecar.
//!
//! JSON Lines over stdio:
//!
//! - **Commands** (Vitrine -> sidecar, on the sidecar's stdin)
//! - **Events** (sidecar -> Vitrine, on the sidecar's stdout)
//!
//! Each line is one JSON object tagged with `"type"`. Credential blobs
//! travel base64-encoded. Connect options are passed to the sidecar as
//! environment variables ([`DEVICE_LABEL_ENV`], [`AUTH_DIR_ENV`]).
//!
//! ```text
//! -> {"type":"send","request_id":"0192...","to":"5511...@s.whatsapp.net","payload":{"kind":"text","text":"oi"}}
//! <- {"type":"send_result","request_id":"0192...","ok":true}
//! <- {"type":"connection","state":"closed","status_code":428}
//! ```

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vitrine_types::conversation::ConversationId;
use vitrine_types::credential::CredentialSet;
use vitrine_types::message::{
    GroupMembershipChange, InboundMessage, MembershipAction, MessagePayload, Reaction,
};
use vitrine_types::session::{CloseReason, ConnectivityChange, ConnectivityState, SessionEvent};

/// Label the sidecar should announce for the linked device.
pub const DEVICE_LABEL_ENV: &str = "VITRINE_DEVICE_LABEL";
/// Directory the sidecar keeps its credential files in.
pub const AUTH_DIR_ENV: &str = "VITRINE_AUTH_DIR";

// ============================================================================
// Commands (Vitrine -> sidecar)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeCommand {
    /// Deliver a payload. Answered by [`BridgeEvent::SendResult`].
    Send {
        request_id: String,
        to: ConversationId,
        payload: MessagePayload,
    },

    /// Close the connection and exit.
    Shutdown,
}

// ============================================================================
// Events (sidecar -> Vitrine)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// Changed credential files, base64 by file name.
    CredsUpdate { files: BTreeMap<String, String> },

    /// Connectivity transition. `qr` carries a scan code; `status_code`
    /// explains a closure.
    Connection {
        state: ConnectivityState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qr: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    Messages { messages: Vec<InboundMessage> },

    Reactions { reactions: Vec<Reaction> },

    GroupParticipants {
        conversation: ConversationId,
        action: MembershipAction,
        participants: Vec<String>,
    },

    SendResult {
        request_id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid event line: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("credential file {name} is not valid base64: {message}")]
    InvalidCredential { name: String, message: String },
}

/// Parse one stdout line.
pub fn parse_event(line: &str) -> Result<BridgeEvent, ProtocolError> {
    Ok(serde_json::from_str(line)?)
}

/// Serialize a command as one line, newline included.
pub fn encode_command(command: &BridgeCommand) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(command)?;
    line.push('\n');
    Ok(line)
}

impl BridgeEvent {
    /// Convert to a session event. Send acknowledgements are not session
    /// events and yield `None`.
    pub fn into_session_event(self) -> Result<Option<SessionEvent>, ProtocolError> {
        let event = match self {
            BridgeEvent::CredsUpdate { files } => {
                SessionEvent::CredentialsUpdated(decode_credentials(files)?)
            }
            BridgeEvent::Connection {
                state,
                qr,
                status_code,
            } => SessionEvent::ConnectivityChanged(connectivity_change(state, qr, status_code)),
            BridgeEvent::Messages { messages } => SessionEvent::MessageBatch(messages),
            BridgeEvent::Reactions { reactions } => SessionEvent::ReactionBatch(reactions),
            BridgeEvent::GroupParticipants {
                conversation,
                action,
                participants,
            } => SessionEvent::GroupMembershipChanged(GroupMembershipChange {
                conversation,
                action,
                participants,
            }),
            BridgeEvent::SendResult { .. } => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// A scan code wins over the state it arrived with: the sidecar reports
/// codes while still connecting.
fn connectivity_change(
    state: ConnectivityState,
    qr: Option<String>,
    status_code: Option<u16>,
) -> ConnectivityChange {
    if let Some(code) = qr.filter(|c| !c.is_empty()) {
        return ConnectivityChange::ScanRequired { code };
    }
    match state {
        ConnectivityState::Connecting => ConnectivityChange::Connecting,
        ConnectivityState::Open => ConnectivityChange::Open,
        ConnectivityState::Closed => ConnectivityChange::Closed {
            reason: match status_code {
                Some(code) => CloseReason::from_status_code(code),
                None => CloseReason::TransportLost("closed without status code".to_string()),
            },
        },
    }
}

fn decode_credentials(files: BTreeMap<String, String>) -> Result<CredentialSet, ProtocolError> {
    files
        .into_iter()
        .map(|(name, encoded)| match STANDARD.decode(encoded.as_bytes()) {
            Ok(data) => Ok((name, data)),
            Err(e) => Err(ProtocolError::InvalidCredential {
                name,
                message: e.to_string(),
            }),
        })
        .collect()
}
