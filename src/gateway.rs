//! Thin wrapper over the nostr-sdk relay pool.
//!
//! One pool is shared by every subscription. The gateway only adds
//! connection-state tracking and the crate's error taxonomy on top.

use std::sync::atomic::{AtomicBool, Ordering};

use nostr_sdk::prelude::*;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{ClientError, Result};

/// Gateway to the configured relay set.
pub struct RelayGateway {
    client: Client,
    relays: Vec<String>,
    connected: AtomicBool,
}

impl RelayGateway {
    /// Build a gateway over `relays`, optionally with a signer for NIP-42
    /// relay auth. The relay list must be non-empty.
    pub fn new(relays: Vec<String>, signer: Option<Keys>) -> Result<Self> {
        if relays.is_empty() {
            return Err(ClientError::Config(
                "at least one relay url is required".into(),
            ));
        }
        let client = match signer {
            Some(keys) => Client::new(keys),
            None => Client::default(),
        };
        Ok(Self {
            client,
            relays,
            connected: AtomicBool::new(false),
        })
    }

    /// Connect the pool. Idempotent; repeated calls share the one pool.
    pub async fn connect(&self) -> Result<()> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for url in &self.relays {
            if let Err(e) = self.client.add_relay(url.as_str()).await {
                self.connected.store(false, Ordering::SeqCst);
                return Err(ClientError::Config(format!("invalid relay {url}: {e}")));
            }
        }
        self.client.connect().await;
        info!("relay gateway connected to {} relay(s)", self.relays.len());
        Ok(())
    }

    /// Open a long-lived subscription; events arrive on the notification
    /// stream until `unsubscribe`.
    pub async fn subscribe(&self, filter: Filter) -> Result<SubscriptionId> {
        self.ensure_connected()?;
        let output = self
            .client
            .subscribe(filter, None)
            .await
            .map_err(|e| ClientError::Nostr(e.to_string()))?;
        debug!(subscription = %output.val, "subscribed");
        Ok(output.val)
    }

    /// Close a single subscription.
    pub async fn unsubscribe(&self, id: &SubscriptionId) {
        self.client.unsubscribe(id.clone()).await;
    }

    /// Publish a signed event; resolves once at least one relay accepted it.
    pub async fn publish(&self, event: &Event) -> Result<EventId> {
        self.ensure_connected()?;
        let output = self
            .client
            .send_event(event.clone())
            .await
            .map_err(|e| ClientError::PublishFailed(e.to_string()))?;
        debug!(event = %output.val, "published");
        Ok(output.val)
    }

    /// Pool-wide notification stream (shared broadcast channel).
    pub fn notifications(&self) -> broadcast::Receiver<RelayPoolNotification> {
        self.client.notifications()
    }

    /// Stop every subscription and shut the pool down. Idempotent; the
    /// gateway is uninitialized afterwards.
    pub async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        self.client.unsubscribe_all().await;
        self.client.disconnect().await;
        info!("relay gateway disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn relays(&self) -> &[String] {
        &self.relays
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_relay_list_rejected() {
        assert!(matches!(
            RelayGateway::new(vec![], None),
            Err(ClientError::Config(_))
        ));
    }

    #[tokio::test]
    async fn use_before_connect_is_not_connected() {
        let gateway =
            RelayGateway::new(vec!["wss://relay.example.com".into()], None).unwrap();
        assert!(!gateway.is_connected());

        let result = gateway.subscribe(Filter::new().limit(1)).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));

        let keys = Keys::generate();
        let event = EventBuilder::text_note("x").sign_with_keys(&keys).unwrap();
        assert!(matches!(
            gateway.publish(&event).await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let gateway =
            RelayGateway::new(vec!["wss://relay.example.com".into()], None).unwrap();
        gateway.disconnect().await;
        gateway.disconnect().await;
        assert!(!gateway.is_connected());
    }
}
