//! Request/response correlation for the encrypted Mostro channel.
//!
//! Mode 1 matches replies on the numeric `request_id` we allocated at
//! publish time. Mode 2 matches server-initiated lifecycle messages on
//! `(action, order id)` — those arrive without any id we own (e.g. the
//! counterparty's take produces a `waiting-seller-to-pay` addressed to us).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::message::{Action, MostroMessage};

/// Default deadline for a trade-action reply.
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);

type ReplySlot = oneshot::Sender<Result<MostroMessage>>;
type PendingMap = Arc<Mutex<HashMap<u64, ReplySlot>>>;
type WatcherKey = (Action, Uuid);
type WatcherMap = Arc<Mutex<HashMap<WatcherKey, Vec<(u64, ReplySlot)>>>>;

/// Correlates inbound `MostroMessage`s with outstanding requests.
pub struct RequestCorrelator {
    next_id: AtomicU64,
    next_token: AtomicU64,
    pending: PendingMap,
    watchers: WatcherMap,
    timeout: Duration,
}

impl RequestCorrelator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            next_token: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(HashMap::new())),
            watchers: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    // ── Mode 1: numeric request id ──

    /// Allocate the next request id and its single-shot completion handle.
    ///
    /// Ids start at 0 and are strictly increasing for the process lifetime.
    /// This never blocks; it is synchronous metadata allocation.
    pub fn begin_request(&self) -> (u64, PendingReply) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        (
            id,
            PendingReply {
                id,
                rx,
                pending: Arc::clone(&self.pending),
                timeout: self.timeout,
            },
        )
    }

    /// Fulfil the pending record for `id`. Duplicate deliveries are ignored.
    pub fn deliver(&self, id: u64, message: MostroMessage) -> bool {
        match self.pending.lock().remove(&id) {
            Some(tx) => tx.send(Ok(message)).is_ok(),
            None => {
                debug!(request_id = id, "no pending record for reply");
                false
            }
        }
    }

    /// Drop a record whose publish failed before any reply could arrive.
    pub fn abandon(&self, id: u64) {
        self.pending.lock().remove(&id);
    }

    // ── Mode 2: (action, order id) waiters ──

    /// Register a waiter for a server-initiated message on an order.
    ///
    /// Duplicate keys are allowed; every waiter on a key completes on the
    /// first matching delivery.
    pub fn watch(&self, action: Action, order_id: Uuid, timeout: Duration) -> ActionWaiter {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.watchers
            .lock()
            .entry((action.clone(), order_id))
            .or_default()
            .push((token, tx));
        ActionWaiter {
            key: (action, order_id),
            token,
            rx,
            watchers: Arc::clone(&self.watchers),
            timeout,
        }
    }

    /// Complete every waiter registered on `(action, order_id)`.
    pub fn deliver_action(&self, action: &Action, order_id: Uuid, message: &MostroMessage) -> usize {
        match self.watchers.lock().remove(&(action.clone(), order_id)) {
            Some(entries) => {
                let count = entries.len();
                for (_, tx) in entries {
                    let _ = tx.send(Ok(message.clone()));
                }
                count
            }
            None => 0,
        }
    }

    // ── Teardown ──

    /// Fail every outstanding waiter with `Disconnected`.
    pub fn fail_all(&self) {
        for (_, tx) in self.pending.lock().drain() {
            let _ = tx.send(Err(ClientError::Disconnected));
        }
        for (_, entries) in self.watchers.lock().drain() {
            for (_, tx) in entries {
                let _ = tx.send(Err(ClientError::Disconnected));
            }
        }
    }

    /// The configured reply deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of outstanding Mode-1 records.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Number of outstanding Mode-2 waiters.
    pub fn watcher_len(&self) -> usize {
        self.watchers.lock().values().map(Vec::len).sum()
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new(REQUEST_TIMEOUT)
    }
}

/// Completion handle for a Mode-1 request.
pub struct PendingReply {
    id: u64,
    rx: oneshot::Receiver<Result<MostroMessage>>,
    pending: PendingMap,
    timeout: Duration,
}

impl PendingReply {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Await the reply. On deadline the record is evicted and `Timeout`
    /// is returned; a late reply then only surfaces as a general `dm` event.
    pub async fn wait(self) -> Result<MostroMessage> {
        match tokio::time::timeout(self.timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::Disconnected),
            Err(_) => {
                self.pending.lock().remove(&self.id);
                Err(ClientError::Timeout)
            }
        }
    }
}

/// Completion handle for a Mode-2 waiter.
pub struct ActionWaiter {
    key: WatcherKey,
    token: u64,
    rx: oneshot::Receiver<Result<MostroMessage>>,
    watchers: WatcherMap,
    timeout: Duration,
}

impl ActionWaiter {
    /// Await the first matching message; evicts this waiter on deadline.
    pub async fn wait(self) -> Result<MostroMessage> {
        match tokio::time::timeout(self.timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::Disconnected),
            Err(_) => {
                let mut watchers = self.watchers.lock();
                if let Some(entries) = watchers.get_mut(&self.key) {
                    entries.retain(|(token, _)| *token != self.token);
                    if entries.is_empty() {
                        watchers.remove(&self.key);
                    }
                }
                Err(ClientError::Timeout)
            }
        }
    }
}
