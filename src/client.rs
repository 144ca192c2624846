//! The Mostro client: owns the gateway, correlator and key material, routes
//! inbound events, and drives orders through their trade lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nostr_sdk::prelude::*;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::correlator::{ActionWaiter, RequestCorrelator, REQUEST_TIMEOUT};
use crate::crypto;
use crate::error::{ClientError, Result};
use crate::gateway::RelayGateway;
use crate::keys::{encode_public_key, parse_private_key, parse_public_key, PubkeyEncoding};
use crate::message::{Action, Content, MostroMessage, PaymentRequest};
use crate::order::{MostroInfo, Order, OrderFilters, OrderStatus, ORDER_EVENT_KIND};
use crate::wrap::wrap_payload;

/// Window for the short-lived `search_orders` subscription.
pub const SEARCH_WINDOW: Duration = Duration::from_millis(5_000);

/// How far back the targeted order subscription reaches.
const INFO_LOOKBACK_SECS: u64 = 14 * 24 * 3600;

/// Construction options for [`MostroClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Mostro instance pubkey (hex or npub); enables the targeted order
    /// subscription and outgoing trade actions.
    pub mostro_pubkey: Option<String>,
    /// Relay URLs; must be non-empty.
    pub relays: Vec<String>,
    /// Private key (hex or nsec); enables trade actions and DM receipt.
    pub private_key: Option<String>,
    /// Deadline for trade-action replies.
    pub request_timeout: Duration,
    /// Accumulation window for `search_orders`.
    pub search_window: Duration,
    /// Verbose per-event diagnostics.
    pub debug: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            mostro_pubkey: None,
            relays: Vec::new(),
            private_key: None,
            request_timeout: REQUEST_TIMEOUT,
            search_window: SEARCH_WINDOW,
            debug: false,
        }
    }
}

/// Events surfaced on the client's broadcast channel.
#[derive(Debug, Clone)]
pub enum MostroEvent {
    /// A kind-38383 order document was observed or replaced.
    OrderUpdate { order: Order, raw: Box<Event> },
    /// A Mostro instance published its configuration document.
    Info(MostroInfo),
    /// A decrypted direct message, emitted for every inbound DM whether or
    /// not a waiter matched it.
    Dm {
        message: MostroMessage,
        sender: PublicKey,
    },
}

struct ClientInner {
    gateway: RelayGateway,
    correlator: RequestCorrelator,
    keys: RwLock<Option<Keys>>,
    mostro_pubkey: Option<PublicKey>,
    events_tx: broadcast::Sender<MostroEvent>,
    dm_subscription: Mutex<Option<SubscriptionId>>,
    search_window: Duration,
    debug: bool,
}

/// Client for one or more Mostro instances over a shared relay pool.
///
/// The caller owns the value; teardown via [`disconnect`](Self::disconnect)
/// is deterministic and idempotent.
pub struct MostroClient {
    inner: Arc<ClientInner>,
    router: Mutex<Option<JoinHandle<()>>>,
}

impl MostroClient {
    /// Connect to the configured relays and set up subscriptions: the Mostro
    /// author's kind-38383 documents over the last 14 days (when a pubkey is
    /// configured) and inbound kind-4 DMs to us (when a key is loaded).
    pub async fn connect(options: ClientOptions) -> Result<Self> {
        let keys = options
            .private_key
            .as_deref()
            .map(parse_private_key)
            .transpose()?;
        let mostro_pubkey = options
            .mostro_pubkey
            .as_deref()
            .map(parse_public_key)
            .transpose()?;

        let gateway = RelayGateway::new(options.relays.clone(), keys.clone())?;
        gateway.connect().await?;

        let (events_tx, _) = broadcast::channel(256);
        let inner = Arc::new(ClientInner {
            gateway,
            correlator: RequestCorrelator::new(options.request_timeout),
            keys: RwLock::new(keys),
            mostro_pubkey,
            events_tx,
            dm_subscription: Mutex::new(None),
            search_window: options.search_window,
            debug: options.debug,
        });

        if let Some(mostro) = inner.mostro_pubkey {
            let since =
                Timestamp::from(Timestamp::now().as_u64().saturating_sub(INFO_LOOKBACK_SECS));
            let filter = Filter::new()
                .kind(Kind::Custom(ORDER_EVENT_KIND))
                .author(mostro)
                .since(since);
            inner.gateway.subscribe(filter).await?;
        }
        inner.subscribe_dms().await?;

        let router = tokio::spawn(route_loop(Arc::clone(&inner)));
        Ok(Self {
            inner,
            router: Mutex::new(Some(router)),
        })
    }

    /// Subscribe to the client's event surface.
    pub fn events(&self) -> broadcast::Receiver<MostroEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Our public key in the requested encoding.
    pub fn my_public_key(&self, encoding: PubkeyEncoding) -> Result<String> {
        let keys = self.inner.keys.read();
        let keys = keys.as_ref().ok_or(ClientError::KeyNotSet)?;
        encode_public_key(&keys.public_key(), encoding)
    }

    /// Replace the private key. Every outstanding waiter fails with
    /// `Disconnected`; the DM subscription is re-pointed at the new pubkey.
    pub async fn update_private_key(&self, private_key: &str) -> Result<()> {
        let keys = parse_private_key(private_key)?;
        *self.inner.keys.write() = Some(keys);
        self.inner.correlator.fail_all();
        self.inner.subscribe_dms().await
    }

    // ── Trade actions ──

    /// Publish a new order. Defaults are filled (`status = pending`,
    /// `created_at = now`); negative amounts are rejected.
    pub async fn submit_order(&self, order: &Order) -> Result<MostroMessage> {
        if order.amount < 0 {
            return Err(ClientError::InvalidAmount);
        }
        let mut order = order.clone();
        if order.status.is_none() {
            order.status = Some(OrderStatus::Pending);
        }
        if order.created_at.is_none() {
            order.created_at = Some(Timestamp::now().as_u64());
        }
        self.inner
            .dispatch(Action::NewOrder, None, Some(Content::Order(order)))
            .await
    }

    /// Take a sell order, optionally fixing the sats amount for
    /// market-priced orders.
    pub async fn take_sell(&self, order: &Order, amount: Option<i64>) -> Result<MostroMessage> {
        let id = require_id(order)?;
        self.inner
            .dispatch(Action::TakeSell, Some(id), amount.map(Content::Amount))
            .await
    }

    /// Take a buy order.
    pub async fn take_buy(&self, order: &Order, amount: Option<i64>) -> Result<MostroMessage> {
        let id = require_id(order)?;
        self.inner
            .dispatch(Action::TakeBuy, Some(id), amount.map(Content::Amount))
            .await
    }

    /// Attach a Lightning invoice to an order we are buying on.
    pub async fn add_invoice(
        &self,
        order: &Order,
        invoice: &str,
        amount: Option<i64>,
    ) -> Result<MostroMessage> {
        let id = require_id(order)?;
        let content = Content::PaymentRequest(PaymentRequest::new(None, invoice, amount));
        self.inner
            .dispatch(Action::AddInvoice, Some(id), Some(content))
            .await
    }

    /// Release the held sats to the buyer.
    pub async fn release(&self, order: &Order) -> Result<MostroMessage> {
        self.inner
            .dispatch(Action::Release, Some(require_id(order)?), None)
            .await
    }

    /// Tell the seller the fiat payment was sent.
    pub async fn fiat_sent(&self, order: &Order) -> Result<MostroMessage> {
        self.inner
            .dispatch(Action::FiatSent, Some(require_id(order)?), None)
            .await
    }

    /// Cancel the order (or initiate a cooperative cancel once taken).
    pub async fn cancel(&self, order: &Order) -> Result<MostroMessage> {
        self.inner
            .dispatch(Action::Cancel, Some(require_id(order)?), None)
            .await
    }

    /// Open a dispute on an active order.
    pub async fn dispute(&self, order: &Order) -> Result<MostroMessage> {
        self.inner
            .dispatch(Action::Dispute, Some(require_id(order)?), None)
            .await
    }

    /// Rate the counterparty after a completed trade (1–5).
    pub async fn rate_user(&self, order: &Order, rating: u8) -> Result<MostroMessage> {
        self.inner
            .dispatch(
                Action::RateUser,
                Some(require_id(order)?),
                Some(Content::RatingUser(rating)),
            )
            .await
    }

    /// Register for a server-initiated lifecycle message on an order, e.g.
    /// `waiting-seller-to-pay` after the counterparty takes our buy.
    pub fn wait_for_action(&self, action: Action, order_id: Uuid) -> ActionWaiter {
        let timeout = self.inner.correlator.timeout();
        self.inner.correlator.watch(action, order_id, timeout)
    }

    /// Send an out-of-band NIP-04 DM to a counterparty peer (hex or npub).
    pub async fn send_peer_dm(&self, peer: &str, text: &str) -> Result<EventId> {
        let keys = self
            .inner
            .keys
            .read()
            .clone()
            .ok_or(ClientError::KeyNotSet)?;
        let peer = parse_public_key(peer)?;
        let ciphertext = crypto::encrypt_nip04(keys.secret_key(), &peer, text)?;
        let event = EventBuilder::new(Kind::EncryptedDirectMessage, ciphertext)
            .tag(Tag::public_key(peer))
            .sign_with_keys(&keys)
            .map_err(|e| ClientError::Nostr(e.to_string()))?;
        self.inner.gateway.publish(&event).await
    }

    // ── Search ──

    /// Search public orders with a short-lived subscription. Accumulates
    /// matches over the search window, then closes the subscription.
    /// Replaced documents collapse to the latest per order id.
    pub async fn search_orders(&self, filters: &OrderFilters) -> Result<Vec<Order>> {
        let mut relay_filter = Filter::new().kind(Kind::Custom(ORDER_EVENT_KIND));
        if !filters.authors.is_empty() {
            let authors: Vec<PublicKey> = filters
                .authors
                .iter()
                .filter_map(|a| parse_public_key(a).ok())
                .collect();
            relay_filter = relay_filter.authors(authors);
        }

        let mut notifications = self.inner.gateway.notifications();
        let subscription = self.inner.gateway.subscribe(relay_filter).await?;

        let mut found: HashMap<Uuid, Order> = HashMap::new();
        let deadline = tokio::time::Instant::now() + self.inner.search_window;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            let notification = match tokio::time::timeout(remaining, notifications.recv()).await {
                Ok(Ok(notification)) => notification,
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!(skipped, "search fell behind the notification stream");
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => break,
            };
            if let RelayPoolNotification::Event {
                subscription_id,
                event,
                ..
            } = notification
            {
                if subscription_id != subscription || !filters.matches(&event) {
                    continue;
                }
                if let Some(order) = Order::from_event(&event) {
                    if let Some(id) = order.id {
                        match found.get(&id) {
                            Some(prev) if prev.created_at >= order.created_at => {}
                            _ => {
                                found.insert(id, order);
                            }
                        }
                    }
                }
            }
        }

        self.inner.gateway.unsubscribe(&subscription).await;
        Ok(found.into_values().collect())
    }

    /// Feed a raw event through the router. The spawned router task calls
    /// this for every relay notification; it is public so tests and custom
    /// transports can inject events directly.
    pub fn handle_event(&self, event: Event) {
        self.inner.route(event);
    }

    /// Stop the router, fail outstanding waiters with `Disconnected`, and
    /// shut the relay pool down. Idempotent.
    pub async fn disconnect(&self) {
        if let Some(router) = self.router.lock().take() {
            router.abort();
        }
        self.inner.correlator.fail_all();
        self.inner.gateway.disconnect().await;
    }
}

impl ClientInner {
    /// (Re-)subscribe to inbound kind-4 DMs addressed to our pubkey.
    async fn subscribe_dms(&self) -> Result<()> {
        let my_pubkey = match self.keys.read().as_ref() {
            Some(keys) => keys.public_key(),
            None => return Ok(()),
        };
        let filter = Filter::new()
            .kind(Kind::EncryptedDirectMessage)
            .pubkey(my_pubkey)
            .since(Timestamp::now());
        let new_id = self.gateway.subscribe(filter).await?;
        let old = self.dm_subscription.lock().replace(new_id);
        if let Some(old) = old {
            self.gateway.unsubscribe(&old).await;
        }
        Ok(())
    }

    /// Classify and route one inbound event.
    fn route(&self, event: Event) {
        if self.debug {
            debug!(kind = %event.kind, id = %event.id, "event received");
        }
        if event.kind == Kind::Custom(ORDER_EVENT_KIND) {
            self.route_document(event);
        } else if event.kind == Kind::EncryptedDirectMessage {
            self.route_dm(event);
        } else {
            debug!(kind = %event.kind, "ignoring event kind");
        }
    }

    fn route_document(&self, event: Event) {
        if let Some(info) = MostroInfo::from_event(&event) {
            let _ = self.events_tx.send(MostroEvent::Info(info));
        } else if let Some(order) = Order::from_event(&event) {
            let _ = self.events_tx.send(MostroEvent::OrderUpdate {
                order,
                raw: Box::new(event),
            });
        }
        // anything else is a malformed document: dropped silently
    }

    fn route_dm(&self, event: Event) {
        let keys = match self.keys.read().clone() {
            Some(keys) => keys,
            None => return,
        };
        let plaintext =
            match crypto::decrypt_nip04(keys.secret_key(), &event.pubkey, &event.content) {
                Ok(plaintext) => plaintext,
                Err(_) => {
                    debug!(sender = %event.pubkey, "dropping DM we cannot decrypt");
                    return;
                }
            };
        let message: MostroMessage = match serde_json::from_str(&plaintext) {
            Ok(message) => message,
            Err(e) => {
                warn!(sender = %event.pubkey, "dropping malformed message: {e}");
                return;
            }
        };

        if let Some(request_id) = message.request_id() {
            if self.correlator.deliver(request_id, message.clone()) {
                debug!(request_id, "reply matched pending request");
            }
        }
        if let Some(order_id) = message.order_id() {
            let matched = self
                .correlator
                .deliver_action(message.action(), order_id, &message);
            if matched > 0 {
                debug!(action = %message.action(), %order_id, matched, "lifecycle waiters completed");
            }
        }
        let _ = self.events_tx.send(MostroEvent::Dm {
            message,
            sender: event.pubkey,
        });
    }

    /// Allocate a request id, build the payload, gift-wrap it to the Mostro
    /// instance, publish, and await the correlated reply.
    async fn dispatch(
        &self,
        action: Action,
        order_id: Option<Uuid>,
        content: Option<Content>,
    ) -> Result<MostroMessage> {
        let keys = self.keys.read().clone().ok_or(ClientError::KeyNotSet)?;
        let mostro = self
            .mostro_pubkey
            .ok_or_else(|| ClientError::Config("no mostro pubkey configured".into()))?;

        let (request_id, reply) = self.correlator.begin_request();
        let message = MostroMessage::order(action.clone(), request_id, order_id, content);
        let payload = serde_json::to_string(&message)
            .map_err(|e| ClientError::MalformedMessage(e.to_string()))?;

        let wrap = wrap_payload(&keys, &mostro, payload)?;
        if let Err(e) = self.gateway.publish(&wrap).await {
            self.correlator.abandon(request_id);
            return Err(e);
        }
        info!(%action, request_id, "trade action published");
        reply.wait().await
    }
}

async fn route_loop(inner: Arc<ClientInner>) {
    let mut notifications = inner.gateway.notifications();
    loop {
        match notifications.recv().await {
            Ok(RelayPoolNotification::Event { event, .. }) => inner.route(*event),
            Ok(RelayPoolNotification::Shutdown) => break,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "router fell behind the notification stream");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("router stopped");
}

fn require_id(order: &Order) -> Result<Uuid> {
    order.id.ok_or(ClientError::MissingOrderId)
}
