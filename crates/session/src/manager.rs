//! Session lifecycle state machine.
//!
//! One manager owns one protocol connection. `start` spawns the run loop:
//! connect, consume client events, and on close either stop (invalidated
//! session) or schedule exactly one reconnect. Subscribers observe the
//! lifecycle through a broadcast channel of [`SessionEvent`]s.

use std::{
    sync::{Arc, RwLock as StdRwLock},
    time::Duration,
};

use {
    async_trait::async_trait,
    tokio::{
        sync::{Mutex, broadcast},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

use {
    recado_common::types::Address,
    recado_store::ContactRegistry,
};

use crate::{
    client::{ChatClient, SendPayload},
    creds::CredentialStore,
    error::{Error, Result},
    events::{ClientEvent, SessionEvent, SessionState},
};

/// Disconnect status code meaning the session was invalidated and
/// credentials must be re-paired.
pub const FATAL_STATUS_CODE: u16 = 401;

/// Broadcast capacity; a slow subscriber loses the oldest events.
const EVENT_CAPACITY: usize = 256;

/// Reconnect/retry pacing. Overridable so tests run in milliseconds.
#[derive(Debug, Clone)]
pub struct Timing {
    /// Delay before reconnecting after a retryable disconnect.
    pub reconnect_delay: Duration,
    /// Delay before retrying when `connect` itself fails.
    pub start_retry_delay: Duration,
    /// Upper bound on a single send.
    pub send_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            start_retry_delay: Duration::from_secs(10),
            send_timeout: Duration::from_secs(60),
        }
    }
}

/// Send capability exposed to the dispatcher.
#[async_trait]
pub trait MessageSender: Send + Sync {
    fn is_connected(&self) -> bool;
    async fn send(&self, address: &Address, payload: &SendPayload) -> Result<()>;
}

/// Owns the chat-protocol connection and its reconnect loop.
pub struct SessionManager {
    client: Arc<dyn ChatClient>,
    creds: Arc<dyn CredentialStore>,
    registry: ContactRegistry,
    timing: Timing,
    state: StdRwLock<SessionState>,
    pending_qr: StdRwLock<Option<String>>,
    events: broadcast::Sender<SessionEvent>,
    run_handle: Mutex<Option<JoinHandle<()>>>,
}

enum CloseOutcome {
    Fatal,
    Retryable,
}

impl SessionManager {
    pub fn new(
        client: Arc<dyn ChatClient>,
        creds: Arc<dyn CredentialStore>,
        registry: ContactRegistry,
        timing: Timing,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            client,
            creds,
            registry,
            timing,
            state: StdRwLock::new(SessionState::Disconnected),
            pending_qr: StdRwLock::new(None),
            events,
            run_handle: Mutex::new(None),
        })
    }

    /// Subscribe to lifecycle and message events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// QR payload waiting to be scanned, if pairing is pending.
    #[must_use]
    pub fn pending_qr(&self) -> Option<String> {
        self.pending_qr
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state != next {
            debug!(from = ?*state, to = ?next, "session state");
            *state = next;
        }
    }

    fn set_pending_qr(&self, qr: Option<String>) {
        *self
            .pending_qr
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = qr;
    }

    /// Start the connection run loop. Calling `start` on an already
    /// started manager is a no-op; it is not safe to race two `start`
    /// calls from different tasks against the same fresh manager.
    pub async fn start(self: &Arc<Self>) {
        let mut handle = self.run_handle.lock().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("session manager already started");
            return;
        }
        let manager = Arc::clone(self);
        *handle = Some(tokio::spawn(async move { manager.run().await }));
    }

    /// Stop the run loop and mark the session disconnected.
    pub async fn stop(&self) {
        if let Some(handle) = self.run_handle.lock().await.take() {
            handle.abort();
        }
        self.set_state(SessionState::Disconnected);
    }

    async fn run(self: Arc<Self>) {
        loop {
            match self.connect_once().await {
                Ok(CloseOutcome::Fatal) => {
                    info!("session invalidated; clear credentials and re-pair to recover");
                    return;
                },
                Ok(CloseOutcome::Retryable) => {
                    debug!(delay = ?self.timing.reconnect_delay, "scheduling reconnect");
                    tokio::time::sleep(self.timing.reconnect_delay).await;
                },
                Err(e) => {
                    warn!(error = %e, "session start failed");
                    self.set_state(SessionState::ClosedRetryable);
                    tokio::time::sleep(self.timing.start_retry_delay).await;
                },
            }
        }
    }

    /// One connection attempt: connect, then pump client events until the
    /// connection closes.
    async fn connect_once(self: &Arc<Self>) -> anyhow::Result<CloseOutcome> {
        self.set_state(SessionState::Connecting);
        let credentials = self.creds.load().await?;
        let mut events = self.client.connect(credentials).await?;

        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::CredentialsChanged(creds) => {
                    // Must-not-be-lost write: persist before pulling the
                    // next event, whatever the connection state.
                    if let Err(e) = self.creds.save(&creds).await {
                        warn!(error = %e, "failed to persist credentials");
                    }
                },
                ClientEvent::QrIssued(qr) => {
                    info!("pairing required, QR issued");
                    self.set_state(SessionState::AwaitingPairing);
                    self.set_pending_qr(Some(qr.clone()));
                    let _ = self.events.send(SessionEvent::PairingRequired { qr });
                },
                ClientEvent::Opened => {
                    info!("session connected");
                    self.set_state(SessionState::Connected);
                    self.set_pending_qr(None);
                    let _ = self.events.send(SessionEvent::Connected);
                    let manager = Arc::clone(self);
                    tokio::spawn(async move { manager.sync_contacts().await });
                },
                ClientEvent::MessageReceived(message) => {
                    let _ = self.events.send(SessionEvent::MessageReceived(message));
                },
                ClientEvent::Closed { status_code } => {
                    warn!(?status_code, "session closed");
                    let _ = self.events.send(SessionEvent::Disconnected {
                        reason: status_code,
                    });
                    if status_code == Some(FATAL_STATUS_CODE) {
                        self.set_state(SessionState::ClosedFatal);
                        return Ok(CloseOutcome::Fatal);
                    }
                    self.set_state(SessionState::ClosedRetryable);
                    return Ok(CloseOutcome::Retryable);
                },
            }
        }

        // The client dropped the event channel without a close frame.
        warn!("client event stream ended");
        let _ = self.events.send(SessionEvent::Disconnected { reason: None });
        self.set_state(SessionState::ClosedRetryable);
        Ok(CloseOutcome::Retryable)
    }

    /// Best-effort reconciliation of known chats into the registry.
    /// Partial failure is logged, never raised.
    async fn sync_contacts(&self) {
        let chats = match self.client.list_chats().await {
            Ok(chats) => chats,
            Err(e) => {
                warn!(error = %e, "chat sync unavailable");
                return;
            },
        };

        let mut created = 0usize;
        for chat in chats {
            let Ok(address) = Address::parse(&chat.address) else {
                debug!(address = %chat.address, "skipping unparseable chat address");
                continue;
            };
            let name = chat.name.unwrap_or_else(|| address.local_part().to_string());
            match self.registry.insert_if_absent(&address, &name).await {
                Ok(true) => created += 1,
                Ok(false) => {},
                Err(e) => warn!(address = %address, error = %e, "chat sync insert failed"),
            }
        }
        info!(created, "chat sync pass finished");
    }
}

#[async_trait]
impl MessageSender for SessionManager {
    fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    async fn send(&self, address: &Address, payload: &SendPayload) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        match tokio::time::timeout(self.timing.send_timeout, self.client.send(address, payload))
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::SendFailed(e.to_string())),
            Err(_) => Err(Error::SendTimeout),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use {
        bytes::Bytes,
        futures::stream::BoxStream,
        tokio::sync::{Mutex as TokioMutex, mpsc},
    };

    use {
        recado_common::types::Label,
        recado_store::ContactRegistry,
        sqlx::sqlite::SqlitePoolOptions,
    };

    use super::*;
    use crate::{
        client::{ChatSummary, DownloadRef, MediaKind},
        creds::Credentials,
    };

    /// Scripted client: each `connect` call hands out the next prepared
    /// event stream.
    struct ScriptedClient {
        connects: AtomicUsize,
        streams: TokioMutex<Vec<mpsc::Receiver<ClientEvent>>>,
        chats: Vec<ChatSummary>,
        send_ok: bool,
    }

    impl ScriptedClient {
        fn new(streams: Vec<mpsc::Receiver<ClientEvent>>) -> Self {
            Self {
                connects: AtomicUsize::new(0),
                streams: TokioMutex::new(streams),
                chats: Vec::new(),
                send_ok: true,
            }
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn connect(
            &self,
            _credentials: Option<Credentials>,
        ) -> anyhow::Result<mpsc::Receiver<ClientEvent>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let mut streams = self.streams.lock().await;
            if streams.is_empty() {
                anyhow::bail!("no more scripted connections");
            }
            Ok(streams.remove(0))
        }

        async fn send(&self, _address: &Address, _payload: &SendPayload) -> anyhow::Result<()> {
            if self.send_ok {
                Ok(())
            } else {
                anyhow::bail!("transport refused")
            }
        }

        async fn download(
            &self,
            _reference: &DownloadRef,
            _kind: MediaKind,
        ) -> anyhow::Result<BoxStream<'static, anyhow::Result<Bytes>>> {
            anyhow::bail!("not scripted")
        }

        async fn list_chats(&self) -> anyhow::Result<Vec<ChatSummary>> {
            Ok(self.chats.clone())
        }
    }

    struct NullCreds;

    #[async_trait]
    impl CredentialStore for NullCreds {
        async fn load(&self) -> Result<Option<Credentials>> {
            Ok(None)
        }
        async fn save(&self, _credentials: &Credentials) -> Result<()> {
            Ok(())
        }
        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    async fn registry() -> ContactRegistry {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        recado_store::run_migrations(&pool).await.unwrap();
        ContactRegistry::new(pool)
    }

    fn fast_timing() -> Timing {
        Timing {
            reconnect_delay: Duration::from_millis(10),
            start_retry_delay: Duration::from_millis(10),
            send_timeout: Duration::from_millis(200),
        }
    }

    fn addr() -> Address {
        Address::parse("5215511112222@s.whatsapp.net").unwrap()
    }

    #[tokio::test]
    async fn qr_then_open_reaches_connected() {
        let (tx, rx) = mpsc::channel(8);
        let client = Arc::new(ScriptedClient::new(vec![rx]));
        let manager = SessionManager::new(
            client,
            Arc::new(NullCreds),
            registry().await,
            fast_timing(),
        );
        let mut events = manager.subscribe();
        manager.start().await;

        tx.send(ClientEvent::QrIssued("qr-data".into())).await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::PairingRequired { .. }
        ));
        assert_eq!(manager.state(), SessionState::AwaitingPairing);
        assert_eq!(manager.pending_qr().as_deref(), Some("qr-data"));

        tx.send(ClientEvent::Opened).await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::Connected));
        assert_eq!(manager.state(), SessionState::Connected);
        assert!(manager.pending_qr().is_none());

        manager.stop().await;
    }

    #[tokio::test]
    async fn subscriber_taken_before_start_sees_first_events() {
        let (tx, rx) = mpsc::channel(8);
        // Events already queued before the run loop exists.
        tx.send(ClientEvent::Opened).await.unwrap();
        tx.send(ClientEvent::MessageReceived(crate::events::RawMessage {
            from_me: false,
            address: addr().as_str().to_string(),
            push_name: None,
            payload: Some(crate::events::MessagePayload::text("hola")),
        }))
        .await
        .unwrap();

        let client = Arc::new(ScriptedClient::new(vec![rx]));
        let manager = SessionManager::new(
            client,
            Arc::new(NullCreds),
            registry().await,
            fast_timing(),
        );
        let mut events = manager.subscribe();
        manager.start().await;

        assert!(matches!(events.recv().await.unwrap(), SessionEvent::Connected));
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::MessageReceived(_)
        ));

        manager.stop().await;
    }

    #[tokio::test]
    async fn fatal_close_stops_reconnecting() {
        let (tx, rx) = mpsc::channel(8);
        let client = Arc::new(ScriptedClient::new(vec![rx]));
        let manager = SessionManager::new(
            Arc::clone(&client) as Arc<dyn ChatClient>,
            Arc::new(NullCreds),
            registry().await,
            fast_timing(),
        );
        manager.start().await;

        tx.send(ClientEvent::Closed {
            status_code: Some(FATAL_STATUS_CODE),
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.state(), SessionState::ClosedFatal);
        // No second connect was attempted.
        assert_eq!(client.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retryable_close_schedules_one_reconnect() {
        let (tx1, rx1) = mpsc::channel(8);
        let (_tx2, rx2) = mpsc::channel(8);
        let client = Arc::new(ScriptedClient::new(vec![rx1, rx2]));
        let manager = SessionManager::new(
            Arc::clone(&client) as Arc<dyn ChatClient>,
            Arc::new(NullCreds),
            registry().await,
            fast_timing(),
        );
        manager.start().await;

        tx1.send(ClientEvent::Closed {
            status_code: Some(500),
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.connects.load(Ordering::SeqCst), 2);

        manager.stop().await;
    }

    #[tokio::test]
    async fn send_requires_connected_state() {
        let (_tx, rx) = mpsc::channel(8);
        let client = Arc::new(ScriptedClient::new(vec![rx]));
        let manager = SessionManager::new(
            client,
            Arc::new(NullCreds),
            registry().await,
            fast_timing(),
        );

        let result = manager.send(&addr(), &SendPayload::text("hola")).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn connect_reaching_open_syncs_chats() {
        let (tx, rx) = mpsc::channel(8);
        let mut client = ScriptedClient::new(vec![rx]);
        client.chats = vec![
            ChatSummary {
                address: "5215533334444@s.whatsapp.net".into(),
                name: Some("Luisa".into()),
            },
            ChatSummary {
                address: "98765-432@g.us".into(),
                name: Some("Equipo ventas".into()),
            },
            ChatSummary {
                address: "garbage".into(),
                name: None,
            },
        ];
        let registry = registry().await;
        let manager = SessionManager::new(
            Arc::new(client),
            Arc::new(NullCreds),
            registry.clone(),
            fast_timing(),
        );
        manager.start().await;
        tx.send(ClientEvent::Opened).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let person = Address::parse("5215533334444@s.whatsapp.net").unwrap();
        let group = Address::parse("98765-432@g.us").unwrap();
        assert_eq!(
            registry.get(&person).await.unwrap().unwrap().display_name,
            "Luisa"
        );
        assert_eq!(
            registry.get(&group).await.unwrap().unwrap().label,
            Label::Groups
        );

        manager.stop().await;
    }
}
