//! Sidecar chat transport.
//!
//! The chat protocol client (pairing, encryption, wire format) runs as a
//! child process. Each `connect` spawns a fresh sidecar and bridges its
//! stdio: stdout lines become [`SessionEvent`]s, sends become `send`
//! commands on stdin and wait for the matching `send_result`.
//!
//! One sidecar process is one session instance. When the process exits or
//! closes stdout, the event stream ends and the supervisor treats that as a
//! transient closure.

pub mod protocol;

use std::collections::VecDeque;
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vitrine_core::session::{ChatSession, ChatTransport, ConnectOptions, Connection};
use vitrine_types::config::BridgeConfig;
use vitrine_types::conversation::ConversationId;
use vitrine_types::error::TransportError;
use vitrine_types::message::MessagePayload;
use vitrine_types::session::SessionEvent;

use self::protocol::{AUTH_DIR_ENV, BridgeCommand, BridgeEvent, DEVICE_LABEL_ENV};

/// How long a sidecar gets to exit after `shutdown` before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const EVENT_BUFFER: usize = 256;
const COMMAND_BUFFER: usize = 64;

type PendingAcks = Arc<DashMap<String, oneshot::Sender<Result<(), TransportError>>>>;

/// Why the stdio pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The sidecar closed stdout.
    Eof,
    /// A `shutdown` command was written.
    ShutdownSent,
    /// Every session handle was dropped.
    CommandsClosed,
    /// Nobody listens to events anymore.
    EventsDropped,
    /// Reading or writing the pipes failed.
    Io,
    /// The process exited before the pump noticed.
    ChildExited,
}

/// [`ChatTransport`] that runs the protocol client as a sidecar process.
#[derive(Debug, Clone)]
pub struct SidecarTransport {
    config: BridgeConfig,
}

impl SidecarTransport {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    fn spawn_child(&self, options: &ConnectOptions) -> std::io::Result<Child> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .env(DEVICE_LABEL_ENV, &options.device_label)
            .env(AUTH_DIR_ENV, &options.auth_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd.spawn()
    }
}

impl ChatTransport for SidecarTransport {
    type Session = SidecarSession;

    async fn connect(
        &self,
        options: &ConnectOptions,
    ) -> Result<Connection<SidecarSession>, TransportError> {
        let mut child = self.spawn_child(options).map_err(|e| {
            TransportError::Connect(format!("failed to spawn {}: {e}", self.config.command))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Connect("sidecar stdin is not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Connect("sidecar stdout is not piped".to_string()))?;

        info!(
            command = %self.config.command,
            pid = child.id().unwrap_or_default(),
            device = %options.device_label,
            "spawned protocol sidecar"
        );

        let send_timeout = Duration::from_secs(self.config.send_timeout_secs);
        let (session, events, pump) = wire(BufReader::new(stdout), stdin, send_timeout);
        tokio::spawn(supervise_child(child, pump));

        Ok(Connection { session, events })
    }
}

/// Run the pump next to the child and make sure the process is gone
/// afterwards.
async fn supervise_child(mut child: Child, pump: impl Future<Output = PumpExit>) {
    let exit = tokio::select! {
        exit = pump => exit,
        status = child.wait() => {
            match status {
                Ok(status) => info!(status = %status, "protocol sidecar exited"),
                Err(e) => error!(error = %e, "failed to wait for protocol sidecar"),
            }
            PumpExit::ChildExited
        }
    };
    debug!(?exit, "sidecar pump stopped");

    if exit == PumpExit::ShutdownSent
        && let Ok(status) = tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await
    {
        debug!(?status, "protocol sidecar shut down");
        return;
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "protocol sidecar already gone");
    }
}

/// Wire a session to the sidecar's byte streams.
///
/// Returns the session handle, the event stream and the pump future that
/// moves bytes until one side goes away.
pub fn wire<R, W>(
    reader: R,
    writer: W,
    send_timeout: Duration,
) -> (
    SidecarSession,
    mpsc::Receiver<SessionEvent>,
    impl Future<Output = PumpExit> + Send + 'static,
)
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let pending: PendingAcks = Arc::new(DashMap::new());

    let session = SidecarSession {
        commands: command_tx,
        pending: pending.clone(),
        send_timeout,
    };
    let pump = async move {
        let mut backlog = VecDeque::new();
        let exit = run_pump(reader, writer, command_rx, &event_tx, &pending, &mut backlog).await;
        // Dropping the senders fails every send still waiting for an ack.
        pending.clear();
        if matches!(exit, PumpExit::Eof | PumpExit::Io) {
            for event in backlog {
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
        }
        exit
    };
    (session, event_rx, pump)
}

/// Events that do not fit in the channel wait in `backlog` so that stdout
/// keeps being read and `send_result` acks are never stuck behind a slow
/// event consumer.
async fn run_pump<R, W>(
    reader: R,
    mut writer: W,
    mut commands: mpsc::Receiver<BridgeCommand>,
    events: &mpsc::Sender<SessionEvent>,
    pending: &PendingAcks,
    backlog: &mut VecDeque<SessionEvent>,
) -> PumpExit
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!("sidecar stdout closed");
                        return PumpExit::Eof;
                    }
                    Err(e) => {
                        error!(error = %e, "error reading sidecar stdout");
                        return PumpExit::Io;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let event = match protocol::parse_event(&line) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "ignoring unparseable sidecar line");
                        continue;
                    }
                };

                if let BridgeEvent::SendResult { request_id, ok, error } = event {
                    acknowledge(pending, &request_id, ok, error);
                    continue;
                }

                match event.into_session_event() {
                    Ok(Some(event)) if backlog.is_empty() => match events.try_send(event) {
                        Ok(()) => {}
                        Err(TrySendError::Full(event)) => {
                            debug!("session event channel full, buffering");
                            backlog.push_back(event);
                        }
                        Err(TrySendError::Closed(_)) => {
                            debug!("session event receiver dropped");
                            return PumpExit::EventsDropped;
                        }
                    },
                    Ok(Some(event)) => backlog.push_back(event),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "dropping malformed sidecar event"),
                }
            }

            permit = events.reserve(), if !backlog.is_empty() => {
                let Ok(permit) = permit else {
                    debug!("session event receiver dropped");
                    return PumpExit::EventsDropped;
                };
                if let Some(event) = backlog.pop_front() {
                    permit.send(event);
                }
            }

            command = commands.recv() => {
                let Some(command) = command else {
                    return PumpExit::CommandsClosed;
                };
                let is_shutdown = matches!(command, BridgeCommand::Shutdown);

                let line = match protocol::encode_command(&command) {
                    Ok(line) => line,
                    Err(e) => {
                        error!(error = %e, "failed to serialize sidecar command");
                        if let BridgeCommand::Send { request_id, .. } = &command {
                            acknowledge(pending, request_id, false, Some(e.to_string()));
                        }
                        continue;
                    }
                };
                if let Err(e) = write_line(&mut writer, &line).await {
                    error!(error = %e, "failed to write to sidecar stdin");
                    return PumpExit::Io;
                }
                if is_shutdown {
                    return PumpExit::ShutdownSent;
                }
            }
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

fn acknowledge(pending: &PendingAcks, request_id: &str, ok: bool, error: Option<String>) {
    let Some((_, waiter)) = pending.remove(request_id) else {
        debug!(request_id, "send result for unknown or expired request");
        return;
    };
    let result = if ok {
        Ok(())
    } else {
        Err(TransportError::Send(
            error.unwrap_or_else(|| "rejected by sidecar".to_string()),
        ))
    };
    let _ = waiter.send(result);
}

/// Handle to one sidecar session.
#[derive(Clone)]
pub struct SidecarSession {
    commands: mpsc::Sender<BridgeCommand>,
    pending: PendingAcks,
    send_timeout: Duration,
}

impl ChatSession for SidecarSession {
    async fn send(
        &self,
        destination: &ConversationId,
        payload: &MessagePayload,
    ) -> Result<(), TransportError> {
        let request_id = Uuid::now_v7().to_string();
        let (ack_tx, ack_rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), ack_tx);

        let command = BridgeCommand::Send {
            request_id: request_id.clone(),
            to: destination.clone(),
            payload: payload.clone(),
        };
        if self.commands.send(command).await.is_err() {
            self.pending.remove(&request_id);
            return Err(TransportError::NotConnected);
        }

        match tokio::time::timeout(self.send_timeout, ack_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pending.remove(&request_id);
                Err(TransportError::Timeout(self.send_timeout))
            }
        }
    }

    async fn close(&self) {
        // The pump may already be gone; closing twice is harmless.
        let _ = self.commands.send(BridgeCommand::Shutdown).await;
    }
}

impl std::fmt::Debug for SidecarSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarSession")
            .field("in_flight", &self.pending.len())
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
    use vitrine_types::session::ConnectivityChange;

    use super::*;

    /// The sidecar's end of the pipes.
    struct FakeSidecar {
        lines: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeSidecar {
        async fn emit(&mut self, line: &str) {
            write_line(&mut self.writer, &format!("{line}\n"))
                .await
                .unwrap();
        }

        async fn next_command(&mut self) -> Option<BridgeCommand> {
            let line = self.lines.next_line().await.unwrap()?;
            Some(serde_json::from_str(&line).unwrap())
        }
    }

    fn wired(
        send_timeout: Duration,
    ) -> (
        SidecarSession,
        mpsc::Receiver<SessionEvent>,
        tokio::task::JoinHandle<PumpExit>,
        FakeSidecar,
    ) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (our_read, our_write) = tokio::io::split(ours);
        let (their_read, their_write) = tokio::io::split(theirs);

        let (session, events, pump) = wire(BufReader::new(our_read), our_write, send_timeout);
        let pump = tokio::spawn(pump);
        let sidecar = FakeSidecar {
            lines: BufReader::new(their_read).lines(),
            writer: their_write,
        };
        (session, events, pump, sidecar)
    }

    fn chat() -> ConversationId {
        ConversationId::new("5511999990000@s.whatsapp.net")
    }

    #[tokio::test]
    async fn stdout_lines_become_session_events() {
        let (_session, mut events, _pump, mut sidecar) = wired(Duration::from_secs(5));

        sidecar
            .emit(r#"{"type":"connection","state":"connecting","qr":"2@xyz"}"#)
            .await;
        sidecar.emit("garbage that is not json").await;
        sidecar.emit(r#"{"type":"connection","state":"open"}"#).await;

        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::ConnectivityChanged(
                ConnectivityChange::ScanRequired { .. }
            ))
        ));
        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::ConnectivityChanged(ConnectivityChange::Open))
        ));
    }

    #[tokio::test]
    async fn send_waits_for_matching_ack() {
        let (session, _events, _pump, mut sidecar) = wired(Duration::from_secs(5));

        let responder = tokio::spawn(async move {
            for ok in [true, false] {
                let Some(BridgeCommand::Send { request_id, to, .. }) = sidecar.next_command().await
                else {
                    panic!("expected a send command");
                };
                assert_eq!(to, chat());
                let reply = if ok {
                    format!(r#"{{"type":"send_result","request_id":"{request_id}","ok":true}}"#)
                } else {
                    format!(
                        r#"{{"type":"send_result","request_id":"{request_id}","ok":false,"error":"not on whatsapp"}}"#
                    )
                };
                sidecar.emit(&reply).await;
            }
            sidecar
        });

        session.send(&chat(), &MessagePayload::text("oi")).await.unwrap();
        let rejected = session.send(&chat(), &MessagePayload::text("oi")).await;
        assert!(matches!(rejected, Err(TransportError::Send(ref m)) if m == "not on whatsapp"));

        responder.await.unwrap();
    }

    #[tokio::test]
    async fn acks_are_read_while_the_event_channel_is_full() {
        let (session, mut events, _pump, mut sidecar) = wired(Duration::from_secs(5));

        let flood = EVENT_BUFFER + 44;
        for _ in 0..flood {
            sidecar.emit(r#"{"type":"connection","state":"open"}"#).await;
        }

        let responder = tokio::spawn(async move {
            let Some(BridgeCommand::Send { request_id, .. }) = sidecar.next_command().await else {
                panic!("expected a send command");
            };
            sidecar
                .emit(&format!(
                    r#"{{"type":"send_result","request_id":"{request_id}","ok":true}}"#
                ))
                .await;
            sidecar
        });

        // Nobody reads events while the reply is in flight.
        session.send(&chat(), &MessagePayload::text("oi")).await.unwrap();
        let mut sidecar = responder.await.unwrap();

        let mut received = 0;
        while received < flood {
            assert!(matches!(
                events.recv().await,
                Some(SessionEvent::ConnectivityChanged(ConnectivityChange::Open))
            ));
            received += 1;
        }

        // Buffered events keep their place ahead of newer ones.
        sidecar
            .emit(r#"{"type":"connection","state":"connecting","qr":"2@after"}"#)
            .await;
        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::ConnectivityChanged(
                ConnectivityChange::ScanRequired { .. }
            ))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_send_times_out() {
        let (session, _events, _pump, _sidecar) = wired(Duration::from_secs(30));

        let result = session.send(&chat(), &MessagePayload::text("oi")).await;

        assert!(matches!(result, Err(TransportError::Timeout(d)) if d == Duration::from_secs(30)));
        assert!(session.pending.is_empty());
    }

    #[tokio::test]
    async fn close_sends_shutdown_and_stops_the_pump() {
        let (session, mut events, pump, mut sidecar) = wired(Duration::from_secs(5));

        session.close().await;

        assert_eq!(sidecar.next_command().await, Some(BridgeCommand::Shutdown));
        assert_eq!(pump.await.unwrap(), PumpExit::ShutdownSent);
        assert!(events.recv().await.is_none());

        // A second close and later sends do not hang.
        session.close().await;
        assert!(matches!(
            session.send(&chat(), &MessagePayload::text("late")).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn eof_ends_events_and_fails_in_flight_sends() {
        let (session, mut events, pump, mut sidecar) = wired(Duration::from_secs(5));

        let in_flight = tokio::spawn({
            let session = session.clone();
            async move { session.send(&chat(), &MessagePayload::text("oi")).await }
        });
        // Wait until the command reached the sidecar, then hang up.
        assert!(matches!(
            sidecar.next_command().await,
            Some(BridgeCommand::Send { .. })
        ));
        drop(sidecar);

        assert_eq!(pump.await.unwrap(), PumpExit::Eof);
        assert!(events.recv().await.is_none());
        assert!(matches!(
            in_flight.await.unwrap(),
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn spawn_failure_is_a_connect_error() {
        let transport = SidecarTransport::new(BridgeConfig {
            command: "/nonexistent/vitrine-bridge".to_string(),
            ..BridgeConfig::default()
        });
        let options = ConnectOptions {
            device_label: "vitrine".to_string(),
            auth_dir: std::env::temp_dir().join("vitrine-auth"),
        };

        assert!(matches!(
            transport.connect(&options).await,
            Err(TransportError::Connect(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn real_process_reports_events_and_honors_shutdown() {
        let transport = SidecarTransport::new(BridgeConfig {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"printf '{"type":"connection","state":"open"}\n'; printf '{"type":"connection","state":"connecting","qr":"%s"}\n' "$VITRINE_DEVICE_LABEL"; read -r _cmd"#
                    .to_string(),
            ],
            ..BridgeConfig::default()
        });
        let options = ConnectOptions {
            device_label: "loja".to_string(),
            auth_dir: std::env::temp_dir().join("vitrine-auth"),
        };

        let Connection {
            session,
            mut events,
        } = transport.connect(&options).await.unwrap();

        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::ConnectivityChanged(ConnectivityChange::Open))
        ));
        match events.recv().await {
            Some(SessionEvent::ConnectivityChanged(ConnectivityChange::ScanRequired { code })) => {
                assert_eq!(code, "loja")
            }
            other => panic!("unexpected {other:?}"),
        }

        session.close().await;
        assert!(events.recv().await.is_none());
    }
}
