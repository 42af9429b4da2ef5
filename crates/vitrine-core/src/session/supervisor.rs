//! Session supervisor: the connection lifecycle state machine.
//!
//! One supervisor owns every piece of mutable lifecycle state (attempt
//! counter, readiness, the pending queue through its [`Outbox`]) and runs
//! session instances one after another:
//!
//! ```text
//! hydrate -> connect -> [Idle] --scan--> [Scanning] --open--> [Open]
//!                                                       |
//!                         close (transient) -> backoff -+-> connect again
//!                         close (logout)    -> purge ---+
//!                         ceiling exceeded  -> Err
//! ```
//!
//! Events from one instance are handled in order by a single loop. A new
//! instance is only connected after the previous one has been detached and
//! closed.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vitrine_types::config::{CommandsConfig, DispatchMode};
use vitrine_types::credential::CredentialSet;
use vitrine_types::error::SupervisorError;
use vitrine_types::message::InboundMessage;
use vitrine_types::session::{
    CloseReason, ConnectivityChange, SessionEvent, StatusSnapshot, SupervisorPhase,
};

use super::box_session::BoxChatSession;
use super::outbox::Outbox;
use super::policy::{ReconnectDecision, ReconnectPolicy, ReconnectState};
use super::transport::{ChatTransport, ConnectOptions, Connection};
use crate::command::router::CommandRouter;
use crate::fs::FileSystem;
use crate::storage::credentials::CredentialBridge;
use crate::storage::object_store::ObjectStore;

/// How one session instance ended.
enum InstanceEnd {
    Closed(CloseReason),
    Shutdown,
}

pub struct SessionSupervisor<T, S, F> {
    transport: T,
    credentials: Arc<CredentialBridge<S, F>>,
    router: Arc<CommandRouter>,
    outbox: Outbox,
    options: ConnectOptions,
    policy: ReconnectPolicy,
    dispatch: DispatchMode,
    workers: Arc<Semaphore>,
    purge_remote_on_logout: bool,
    /// Credential uploads still running in the background.
    mirrors: Mutex<JoinSet<()>>,
    status: watch::Sender<StatusSnapshot>,
    shutdown: CancellationToken,
}

impl<T, S, F> SessionSupervisor<T, S, F>
where
    T: ChatTransport,
    S: ObjectStore + 'static,
    F: FileSystem + 'static,
{
    /// The supervisor sends through the router's outbox, so replies from
    /// handlers and the queue flush share one readiness flag.
    pub fn new(
        transport: T,
        credentials: Arc<CredentialBridge<S, F>>,
        router: Arc<CommandRouter>,
        options: ConnectOptions,
    ) -> Self {
        let outbox = router.outbox().clone();
        let (status, _) = watch::channel(StatusSnapshot::default());
        let defaults = CommandsConfig::default();
        Self {
            transport,
            credentials,
            router,
            outbox,
            options,
            policy: ReconnectPolicy::default(),
            dispatch: defaults.dispatch,
            workers: Arc::new(Semaphore::new(defaults.workers.max(1))),
            purge_remote_on_logout: true,
            mirrors: Mutex::new(JoinSet::new()),
            status,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Concurrent dispatch runs at most `workers` messages at once.
    pub fn with_dispatch(mut self, mode: DispatchMode, workers: usize) -> Self {
        self.dispatch = mode;
        self.workers = Arc::new(Semaphore::new(workers.max(1)));
        self
    }

    pub fn with_purge_remote_on_logout(mut self, purge: bool) -> Self {
        self.purge_remote_on_logout = purge;
        self
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Watch the published status.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run session instances until shutdown or until the reconnect ceiling
    /// is exceeded.
    pub async fn run(&self) -> Result<(), SupervisorError> {
        let mut state = ReconnectState::new();

        loop {
            let reason = match self.run_instance(&mut state).await {
                InstanceEnd::Shutdown => {
                    self.finish_mirrors().await;
                    info!("session supervisor stopped");
                    return Ok(());
                }
                InstanceEnd::Closed(reason) => reason,
            };

            let decision = state.on_close(&reason, &self.policy);
            let attempts = state.attempts();
            self.publish(|s| {
                s.phase = SupervisorPhase::Closed;
                s.connected = false;
                s.reconnect_attempts = attempts;
                s.scan_code = None;
            });

            match decision {
                ReconnectDecision::Restart { attempt, delay } => {
                    warn!(
                        reason = %reason,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "session closed, reconnecting after backoff"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            info!("session supervisor stopped during backoff");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                ReconnectDecision::RestartFresh => {
                    warn!(
                        reason = %reason,
                        "session logged out, discarding credentials; a new scan will be required"
                    );
                    self.discard_credentials().await;
                }
                ReconnectDecision::Terminate { attempts } => {
                    error!(
                        reason = %reason,
                        attempts,
                        "reconnect ceiling exceeded, giving up"
                    );
                    return Err(SupervisorError::ReconnectLimitExceeded { attempts });
                }
            }
        }
    }

    /// Bring up one session instance and process its events until it closes.
    async fn run_instance(&self, state: &mut ReconnectState) -> InstanceEnd {
        if self.shutdown.is_cancelled() {
            return InstanceEnd::Shutdown;
        }

        match self.credentials.hydrate().await {
            Ok(0) => info!("no stored credentials, a credential scan will be required"),
            Ok(files) => info!(files, "restored credentials from remote store"),
            Err(e) => warn!(error = %e, "credential hydration failed, continuing with local state"),
        }

        self.publish(|s| {
            s.phase = SupervisorPhase::Idle;
            s.connected = false;
        });

        let connected = tokio::select! {
            _ = self.shutdown.cancelled() => return InstanceEnd::Shutdown,
            result = self.transport.connect(&self.options) => result,
        };
        let Connection { session, mut events } = match connected {
            Ok(connection) => connection,
            Err(e) => {
                warn!(error = %e, "failed to open session");
                return InstanceEnd::Closed(CloseReason::TransportLost(e.to_string()));
            }
        };

        let session = Arc::new(BoxChatSession::new(session));
        self.outbox.attach(session.clone()).await;
        debug!(device = %self.options.device_label, "session instance started");

        let mut scan_emitted = false;
        let end = loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => break InstanceEnd::Shutdown,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                break InstanceEnd::Closed(CloseReason::TransportLost(
                    "event stream ended".to_string(),
                ));
            };

            match event {
                SessionEvent::CredentialsUpdated(update) => self.on_credentials(update).await,
                SessionEvent::ConnectivityChanged(change) => match change {
                    ConnectivityChange::Connecting => debug!("session connecting"),
                    ConnectivityChange::ScanRequired { code } => {
                        if scan_emitted {
                            debug!("duplicate scan request suppressed");
                            continue;
                        }
                        scan_emitted = true;
                        info!(code = %code, "credential scan required");
                        self.publish(|s| {
                            s.phase = SupervisorPhase::Scanning;
                            s.scan_code = Some(code);
                        });
                    }
                    ConnectivityChange::Open => {
                        state.on_open();
                        let report = self.outbox.mark_ready_and_flush().await;
                        info!(
                            delivered = report.delivered,
                            failed = report.failed,
                            "session open"
                        );
                        self.publish(|s| {
                            s.phase = SupervisorPhase::Open;
                            s.connected = true;
                            s.reconnect_attempts = 0;
                            s.scan_code = None;
                        });
                        self.spawn_mirror("open").await;
                    }
                    ConnectivityChange::Closed { reason } => break InstanceEnd::Closed(reason),
                },
                SessionEvent::MessageBatch(messages) => self.dispatch(messages).await,
                SessionEvent::ReactionBatch(reactions) => {
                    debug!(count = reactions.len(), "reactions received");
                }
                SessionEvent::GroupMembershipChanged(change) => {
                    debug!(
                        conversation = %change.conversation,
                        action = ?change.action,
                        participants = change.participants.len(),
                        "group membership changed"
                    );
                }
            }
        };

        self.outbox.detach().await;
        session.close().await;
        end
    }

    async fn on_credentials(&self, update: CredentialSet) {
        if let Err(e) = self.credentials.persist_local(&update).await {
            warn!(error = %e, files = update.len(), "failed to persist credentials locally");
            return;
        }
        self.spawn_mirror("credentials_updated").await;
    }

    /// Upload the local credential set in the background. Failures are
    /// logged; the local copy stays authoritative until the next mirror.
    async fn spawn_mirror(&self, trigger: &'static str) {
        let credentials = self.credentials.clone();
        let mut mirrors = self.mirrors.lock().await;
        while mirrors.try_join_next().is_some() {}
        mirrors.spawn(async move {
            match credentials.mirror().await {
                Ok(files) => debug!(files, trigger, "credentials mirrored"),
                Err(e) => warn!(error = %e, trigger, "credential mirror failed"),
            }
        });
    }

    /// Wait for every upload started so far.
    async fn finish_mirrors(&self) {
        let mut mirrors = std::mem::take(&mut *self.mirrors.lock().await);
        if !mirrors.is_empty() {
            debug!(pending = mirrors.len(), "waiting for credential uploads");
        }
        while mirrors.join_next().await.is_some() {}
    }

    /// Uploads started before a logout must land before the purge, or they
    /// would write the invalidated set back.
    async fn discard_credentials(&self) {
        self.finish_mirrors().await;
        if let Err(e) = self.credentials.purge_local().await {
            warn!(error = %e, "failed to remove local credentials");
        }
        if self.purge_remote_on_logout {
            match self.credentials.purge_remote().await {
                Ok(deleted) => info!(deleted, "remote credentials purged"),
                Err(e) => warn!(error = %e, "failed to purge remote credentials"),
            }
        }
    }

    async fn dispatch(&self, messages: Vec<InboundMessage>) {
        for message in messages.into_iter().filter(|m| !m.from_self) {
            match self.dispatch {
                DispatchMode::Sequential => {
                    let outcome = self.router.route(message).await;
                    debug!(?outcome, "message routed");
                }
                DispatchMode::Concurrent => {
                    let permit = tokio::select! {
                        _ = self.shutdown.cancelled() => return,
                        permit = self.workers.clone().acquire_owned() => permit,
                    };
                    let Ok(permit) = permit else {
                        return;
                    };
                    let router = self.router.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        let outcome = router.route(message).await;
                        debug!(?outcome, "message routed");
                    });
                }
            }
        }
    }

    fn publish(&self, update: impl FnOnce(&mut StatusSnapshot)) {
        self.status.send_modify(|snapshot| {
            update(snapshot);
            snapshot.last_change = Utc::now();
        });
    }
}
