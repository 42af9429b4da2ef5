//! Status handlers.
//!
//! - `GET /` -- human-readable status, including the pending scan code
//! - `GET /health` -- `{status, reconnectionAttempts, timestamp}`

use axum::Json;
use axum::extract::State;
use axum::response::Html;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use vitrine_types::session::{StatusSnapshot, SupervisorPhase};

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `connected` or `disconnected`.
    pub status: &'static str,
    pub reconnection_attempts: u32,
    pub timestamp: String,
}

impl From<&StatusSnapshot> for HealthResponse {
    fn from(snapshot: &StatusSnapshot) -> Self {
        Self {
            status: if snapshot.connected {
                "connected"
            } else {
                "disconnected"
            },
            reconnection_attempts: snapshot.reconnect_attempts,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::from(&state.snapshot()))
}

/// GET /
pub async fn status_page(State(state): State<AppState>) -> Html<String> {
    Html(render_status(&state.device_label, &state.snapshot()))
}

fn render_status(device_label: &str, snapshot: &StatusSnapshot) -> String {
    let headline = match snapshot.phase {
        SupervisorPhase::Open => "Connected",
        SupervisorPhase::Scanning => "Waiting for the device to be linked",
        SupervisorPhase::Idle => "Connecting",
        SupervisorPhase::Closed => "Disconnected, reconnecting",
    };

    let scan = match &snapshot.scan_code {
        Some(code) => format!(
            "<h2>Scan code</h2>\n<p>Open the app on the phone, go to linked devices and scan this code.</p>\n<pre>{}</pre>\n",
            escape_html(code)
        ),
        None => String::new(),
    };

    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="10">
<title>Vitrine - {label}</title>
</head>
<body>
<h1>{label}</h1>
<p><strong>{headline}</strong></p>
<ul>
<li>Phase: {phase}</li>
<li>Accepting sends: {connected}</li>
<li>Reconnection attempts: {attempts}</li>
<li>Last change: {changed}</li>
</ul>
{scan}</body>
</html>
"#,
        label = escape_html(device_label),
        phase = snapshot.phase,
        connected = if snapshot.connected { "yes" } else { "no" },
        attempts = snapshot.reconnect_attempts,
        changed = snapshot.last_change.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
