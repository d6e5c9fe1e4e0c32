//! Connection lifecycle state machine.
//!
//! Every transition is a compare-and-set on the observable state value, so
//! two transitions can never interleave. Each connect attempt runs under its
//! own [`CancellationToken`] scope, numbered by a generation counter. A
//! superseded attempt never touches the state again.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::protocol::{ConnectParams, EventSink, ProtocolAdapter};
use crate::validation::validate_nickname;

/// Process-visible connection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    /// Unrecoverable local failure or transport breakage.
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Bounds on the suspend points of the lifecycle.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionTimeouts {
    pub connect: Duration,
    pub disconnect: Duration,
}

impl Default for ConnectionTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            disconnect: Duration::from_secs(5),
        }
    }
}

/// Cancellation scope of one connect attempt.
struct Scope {
    generation: u64,
    token: CancellationToken,
}

/// Owns the [`ConnectionState`] and drives the adapter through it.
pub struct ConnectionManager {
    adapter: Arc<dyn ProtocolAdapter>,
    state: watch::Sender<ConnectionState>,
    scope: Mutex<Scope>,
    last_params: Mutex<Option<ConnectParams>>,
    last_error: Mutex<Option<String>>,
    timeouts: ConnectionTimeouts,
}

impl ConnectionManager {
    pub fn new(adapter: Arc<dyn ProtocolAdapter>, timeouts: ConnectionTimeouts) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            adapter,
            state,
            scope: Mutex::new(Scope {
                generation: 0,
                token: CancellationToken::new(),
            }),
            last_params: Mutex::new(None),
            last_error: Mutex::new(None),
            timeouts,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Most recent connection failure, kept after falling back to Disconnected.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn last_params(&self) -> Option<ConnectParams> {
        self.last_params.lock().clone()
    }

    /// Token for the current session scope.
    pub fn scope(&self) -> CancellationToken {
        self.scope.lock().token.clone()
    }

    /// Atomically move to `next` if `allowed` accepts the current state.
    ///
    /// Returns the previous state on success, the current one on refusal.
    fn try_transition<P>(
        &self,
        allowed: P,
        next: ConnectionState,
    ) -> Result<ConnectionState, ConnectionState>
    where
        P: FnOnce(&ConnectionState) -> bool,
    {
        let mut outcome = Err(ConnectionState::Disconnected);
        self.state.send_if_modified(|current| {
            if allowed(current) {
                debug!(from = ?current, to = ?next, "Connection state transition");
                outcome = Ok(std::mem::replace(current, next));
                true
            } else {
                outcome = Err(current.clone());
                false
            }
        });
        outcome
    }

    /// Cancel whatever scope is current and mint a fresh one.
    fn begin_scope(&self) -> (u64, CancellationToken) {
        let mut scope = self.scope.lock();
        scope.token.cancel();
        scope.generation += 1;
        scope.token = CancellationToken::new();
        (scope.generation, scope.token.clone())
    }

    /// True while `generation` is the newest attempt and nobody cancelled it.
    fn is_live(&self, generation: u64) -> bool {
        let scope = self.scope.lock();
        scope.generation == generation && !scope.token.is_cancelled()
    }

    fn is_latest(&self, generation: u64) -> bool {
        self.scope.lock().generation == generation
    }

    /// `Connecting -> next`, only on behalf of the live attempt.
    fn settle_attempt(&self, generation: u64, next: ConnectionState) -> bool {
        self.try_transition(
            |s| *s == ConnectionState::Connecting && self.is_live(generation),
            next,
        )
        .is_ok()
    }

    fn record_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
    }

    /// Open a connection.
    ///
    /// `start_pump` receives the scope of this attempt and returns the sink
    /// handed to the adapter; it runs after the state reaches `Connecting`.
    pub async fn connect<F>(&self, params: ConnectParams, start_pump: F) -> Result<(), SessionError>
    where
        F: FnOnce(CancellationToken) -> EventSink,
    {
        let previous = self
            .try_transition(
                |s| matches!(s, ConnectionState::Disconnected | ConnectionState::Error(_)),
                ConnectionState::Connecting,
            )
            .map_err(|current| match current {
                ConnectionState::Disconnecting => SessionError::ConnectWhileDisconnecting,
                ConnectionState::Connecting => SessionError::AlreadyConnecting,
                _ => SessionError::AlreadyConnected,
            })?;

        let (generation, scope) = self.begin_scope();

        if let Err(e) = validate_nickname(&params.nickname) {
            let message = format!("invalid nickname '{}': {}", params.nickname, e);
            warn!(nick = %params.nickname, error = %e, "Refusing to connect");
            self.record_error(message.clone());
            self.settle_attempt(generation, ConnectionState::Error(message));
            return Err(SessionError::InvalidNickname(e.to_string()));
        }

        if matches!(previous, ConnectionState::Error(_)) {
            // The broken transport is closed before a new one opens
            debug!("Closing failed connection before reconnecting");
            let _ = timeout(self.timeouts.disconnect, self.adapter.disconnect(None)).await;
            if !self.is_live(generation) {
                return Err(SessionError::Cancelled);
            }
        }

        *self.last_params.lock() = Some(params.clone());
        *self.last_error.lock() = None;
        let events = start_pump(scope.clone());

        info!(server = %params.server, nick = %params.nickname, generation, "Connecting");

        let outcome = tokio::select! {
            _ = scope.cancelled() => Err(SessionError::Cancelled),
            res = timeout(self.timeouts.connect, self.adapter.connect(&params, events)) => match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(SessionError::Transport(e)),
                Err(_) => Err(SessionError::Timeout("connection handshake")),
            },
        };

        match outcome {
            Ok(()) => {
                if !self.settle_attempt(generation, ConnectionState::Connected) {
                    warn!(server = %params.server, generation, "Handshake completed after teardown");
                    if self.is_latest(generation) {
                        let _ = timeout(self.timeouts.disconnect, self.adapter.disconnect(None)).await;
                    }
                    return Err(SessionError::Cancelled);
                }
                info!(server = %params.server, "Connected");
                Ok(())
            }
            Err(e) => {
                warn!(server = %params.server, error = %e, generation, "Connection attempt failed");
                if self.settle_attempt(generation, ConnectionState::Disconnected) {
                    self.record_error(e.to_string());
                }
                scope.cancel();
                Err(e)
            }
        }
    }

    /// Close the connection. A no-op when there is nothing to close.
    pub async fn disconnect(&self, reason: Option<&str>) -> Result<(), SessionError> {
        match self.try_transition(|s| *s == ConnectionState::Connected, ConnectionState::Disconnecting) {
            Ok(_) => {}
            Err(ConnectionState::Connecting) => {
                info!("Cancelling connection attempt");
                self.scope().cancel();
                let _ = self.try_transition(
                    |s| *s == ConnectionState::Connecting,
                    ConnectionState::Disconnected,
                );
                return Ok(());
            }
            Err(ConnectionState::Error(_)) => {
                self.scope().cancel();
                let _ = timeout(self.timeouts.disconnect, self.adapter.disconnect(reason)).await;
                let _ = self.try_transition(
                    |s| matches!(s, ConnectionState::Error(_)),
                    ConnectionState::Disconnected,
                );
                return Ok(());
            }
            Err(_) => return Ok(()),
        }

        match timeout(self.timeouts.disconnect, self.adapter.disconnect(reason)).await {
            Ok(Ok(())) => info!("Disconnected"),
            Ok(Err(e)) => {
                warn!(error = %e, "Adapter reported an error while disconnecting");
                self.record_error(e.to_string());
            }
            Err(_) => {
                warn!("Timed out waiting for the adapter to disconnect");
                self.record_error("timed out waiting for disconnect".to_string());
            }
        }
        self.scope().cancel();
        let _ = self.try_transition(
            |s| *s == ConnectionState::Disconnecting,
            ConnectionState::Disconnected,
        );
        Ok(())
    }

    /// Reconnect with the last parameters unless already connected or connecting.
    pub async fn reconnect_if_needed<F>(&self, start_pump: F) -> Result<(), SessionError>
    where
        F: FnOnce(CancellationToken) -> EventSink,
    {
        match self.state() {
            ConnectionState::Connected | ConnectionState::Connecting => return Ok(()),
            ConnectionState::Disconnecting => return Err(SessionError::ConnectWhileDisconnecting),
            ConnectionState::Disconnected | ConnectionState::Error(_) => {}
        }
        let params = self.last_params().ok_or(SessionError::NoConnectionParams)?;
        match self.connect(params, start_pump).await {
            Err(SessionError::AlreadyConnected | SessionError::AlreadyConnecting) => Ok(()),
            other => other,
        }
    }

    /// Unsolicited network loss.
    pub fn connection_lost(&self, reason: &str) {
        if self
            .try_transition(|s| *s == ConnectionState::Connected, ConnectionState::Disconnected)
            .is_ok()
        {
            warn!(reason = %reason, "Connection lost");
            self.record_error(reason.to_string());
            self.scope().cancel();
        }
    }

    /// Move to `Error` from any state and stop delivering events from the
    /// broken connection.
    pub fn fail(&self, message: &str) {
        warn!(error = %message, "Connection failed");
        self.record_error(message.to_string());
        self.scope().cancel();
        let _ = self.try_transition(|_| true, ConnectionState::Error(message.to_string()));
    }

    /// Cancel the scope and settle in `Disconnected`, whatever was in flight.
    pub async fn teardown(&self) {
        self.scope().cancel();
        let previous = self.state.send_replace(ConnectionState::Disconnected);
        debug!(from = ?previous, "Session teardown");
        if matches!(
            previous,
            ConnectionState::Connected | ConnectionState::Error(_)
        ) {
            let _ = timeout(self.timeouts.disconnect, self.adapter.disconnect(None)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::protocol::ServerDescriptor;
    use crate::test_support::MockAdapter;

    fn params(nick: &str) -> ConnectParams {
        ConnectParams::new(ServerDescriptor::parse("irc.test:6667", false).unwrap(), nick)
    }

    fn sink(_scope: CancellationToken) -> EventSink {
        EventSink::channel().0
    }

    fn manager(adapter: &Arc<MockAdapter>) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(
            adapter.clone(),
            ConnectionTimeouts {
                connect: Duration::from_secs(2),
                disconnect: Duration::from_secs(2),
            },
        ))
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let adapter = MockAdapter::new();
        let conn = manager(&adapter);
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        conn.connect(params("alice"), sink).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);

        assert_eq!(
            conn.connect(params("alice"), sink).await,
            Err(SessionError::AlreadyConnected)
        );

        conn.disconnect(Some("bye")).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(adapter.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_handshake_failure_returns_to_disconnected() {
        let adapter = MockAdapter::new();
        adapter.fail_next_connect(TransportError::Handshake("bad password".into()));
        let conn = manager(&adapter);

        let err = conn.connect(params("alice"), sink).await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.last_error().unwrap().contains("bad password"));
    }

    #[tokio::test]
    async fn test_invalid_nickname_moves_to_error() {
        let adapter = MockAdapter::new();
        let conn = manager(&adapter);

        let err = conn.connect(params("9lives"), sink).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidNickname(_)));
        assert!(matches!(conn.state(), ConnectionState::Error(_)));
        assert_eq!(adapter.connect_count(), 0);

        // Error is not terminal
        conn.connect(params("alice"), sink).await.unwrap();
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn test_connect_rejected_while_disconnecting() {
        let adapter = MockAdapter::new();
        let conn = manager(&adapter);
        conn.connect(params("alice"), sink).await.unwrap();

        let gate = adapter.hold_disconnect();
        let disconnecting = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.disconnect(None).await })
        };
        let mut rx = conn.subscribe();
        rx.wait_for(|s| *s == ConnectionState::Disconnecting).await.unwrap();

        assert_eq!(
            conn.connect(params("alice"), sink).await,
            Err(SessionError::ConnectWhileDisconnecting)
        );
        assert_eq!(conn.state(), ConnectionState::Disconnecting);

        gate.notify_one();
        disconnecting.await.unwrap().unwrap();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(adapter.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_is_idempotent() {
        let adapter = MockAdapter::new();
        let conn = manager(&adapter);

        assert_eq!(
            conn.reconnect_if_needed(sink).await,
            Err(SessionError::NoConnectionParams)
        );

        conn.connect(params("alice"), sink).await.unwrap();
        conn.reconnect_if_needed(sink).await.unwrap();
        conn.reconnect_if_needed(sink).await.unwrap();
        assert_eq!(adapter.connect_count(), 1);

        conn.connection_lost("ping timeout");
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.last_error().as_deref(), Some("ping timeout"));

        conn.reconnect_if_needed(sink).await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(adapter.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_teardown_during_handshake_falls_back() {
        let adapter = MockAdapter::new();
        adapter.hang_connect();
        let conn = manager(&adapter);

        let connecting = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.connect(params("alice"), sink).await })
        };
        let mut rx = conn.subscribe();
        rx.wait_for(|s| *s == ConnectionState::Connecting).await.unwrap();

        let old_scope = conn.scope();
        conn.teardown().await;
        assert_eq!(connecting.await.unwrap(), Err(SessionError::Cancelled));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(old_scope.is_cancelled());

        // A fresh scope is minted for the next attempt
        adapter.succeed_connect();
        conn.connect(params("alice"), sink).await.unwrap();
        assert!(!conn.scope().is_cancelled());
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn test_cancelled_attempt_leaves_newer_attempt_alone() {
        let adapter = MockAdapter::new();
        adapter.hang_connect();
        let conn = manager(&adapter);

        let first = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.connect(params("alice"), sink).await })
        };
        let mut rx = conn.subscribe();
        rx.wait_for(|s| *s == ConnectionState::Connecting).await.unwrap();
        conn.teardown().await;

        // The second attempt reaches Connecting before the first one resumes
        let mut second = Box::pin(conn.connect(params("alice"), sink));
        assert!(futures_util::poll!(second.as_mut()).is_pending());
        assert_eq!(conn.state(), ConnectionState::Connecting);

        assert_eq!(first.await.unwrap(), Err(SessionError::Cancelled));
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(!conn.scope().is_cancelled());

        conn.teardown().await;
        assert_eq!(second.await, Err(SessionError::Cancelled));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnect_from_error_replaces_scope() {
        let adapter = MockAdapter::new();
        let conn = manager(&adapter);
        conn.connect(params("alice"), sink).await.unwrap();
        let old_scope = conn.scope();

        conn.fail("connection reset by peer");
        assert!(old_scope.is_cancelled());

        conn.connect(params("alice"), sink).await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(adapter.disconnect_count(), 1);
        assert_eq!(adapter.connect_count(), 2);
        assert!(!conn.scope().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout_is_failure() {
        let adapter = MockAdapter::new();
        adapter.hang_connect();
        let conn = manager(&adapter);

        let err = conn.connect(params("alice"), sink).await.unwrap_err();
        assert_eq!(err, SessionError::Timeout("connection handshake"));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_fail_from_any_state() {
        let adapter = MockAdapter::new();
        let conn = manager(&adapter);
        conn.connect(params("alice"), sink).await.unwrap();

        let scope = conn.scope();
        conn.fail("send failed: broken pipe");
        assert_eq!(
            conn.state(),
            ConnectionState::Error("send failed: broken pipe".into())
        );
        assert!(scope.is_cancelled());

        conn.disconnect(None).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }
}
