//! In-memory protocol adapter for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::TransportError;
use crate::protocol::{
    ChannelRoster, ChannelRosterEntry, ConnectParams, EventSink, Privileges, ProtocolAdapter,
    ProtocolEvent,
};

enum ConnectBehavior {
    Succeed,
    Fail(TransportError),
    Hang,
}

/// Records every line sent and lets tests script the server side.
pub struct MockAdapter {
    sent: Mutex<Vec<String>>,
    rosters: Mutex<HashMap<String, ChannelRoster>>,
    sink: Mutex<Option<EventSink>>,
    behavior: Mutex<ConnectBehavior>,
    disconnect_gate: Mutex<Option<Arc<Notify>>>,
    fail_sends: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            rosters: Mutex::new(HashMap::new()),
            sink: Mutex::new(None),
            behavior: Mutex::new(ConnectBehavior::Succeed),
            disconnect_gate: Mutex::new(None),
            fail_sends: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn fail_next_connect(&self, err: TransportError) {
        *self.behavior.lock() = ConnectBehavior::Fail(err);
    }

    pub fn hang_connect(&self) {
        *self.behavior.lock() = ConnectBehavior::Hang;
    }

    pub fn succeed_connect(&self) {
        *self.behavior.lock() = ConnectBehavior::Succeed;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Block `disconnect` until the returned gate is notified.
    pub fn hold_disconnect(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.disconnect_gate.lock() = Some(gate.clone());
        gate
    }

    /// Replace the roster of `channel`; members are `(nick, prefixes)`.
    pub fn set_roster(&self, channel: &str, members: &[(&str, &str)]) {
        let roster = ChannelRoster {
            channel: channel.to_string(),
            members: members
                .iter()
                .map(|(nick, prefixes)| {
                    ChannelRosterEntry::new(nick, Privileges::from_prefixes(prefixes))
                })
                .collect(),
        };
        self.rosters
            .lock()
            .insert(channel.to_ascii_lowercase(), roster);
    }

    /// The sink handed over by the most recent connect.
    pub fn sink(&self) -> Option<EventSink> {
        self.sink.lock().clone()
    }

    /// Push an event as if it came from the server.
    pub fn emit(&self, event: ProtocolEvent) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }
}

#[async_trait]
impl ProtocolAdapter for MockAdapter {
    async fn connect(
        &self,
        _params: &ConnectParams,
        events: EventSink,
    ) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(events);
        let outcome = match &*self.behavior.lock() {
            ConnectBehavior::Succeed => Some(Ok(())),
            ConnectBehavior::Fail(err) => Some(Err(err.clone())),
            ConnectBehavior::Hang => None,
        };
        match outcome {
            Some(result) => {
                if result.is_err() {
                    self.succeed_connect();
                }
                result
            }
            None => std::future::pending().await,
        }
    }

    async fn disconnect(&self, _reason: Option<&str>) -> Result<(), TransportError> {
        let gate = self.disconnect_gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = None;
        Ok(())
    }

    fn send_raw_line(&self, line: &str) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("broken pipe".into()));
        }
        self.sent.lock().push(line.to_string());
        Ok(())
    }

    fn channel(&self, name: &str) -> Option<ChannelRoster> {
        self.rosters.lock().get(&name.to_ascii_lowercase()).cloned()
    }
}
