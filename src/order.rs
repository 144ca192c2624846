//! Order documents: the kind-38383 tag schema, client-side filtering and
//! projection into typed records, plus the Mostro instance info document.

use std::fmt;

use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Parameterized-replaceable kind used by Mostro for orders and instance info.
pub const ORDER_EVENT_KIND: u16 = 38383;

/// `z` tag value marking an order document.
pub const DOCUMENT_ORDER: &str = "order";

// ── Order model ──────────────────────────────────────────────────

/// Side of a P2P order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Buy,
    Sell,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Buy => "buy",
            OrderKind::Sell => "sell",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(OrderKind::Buy),
            "sell" => Some(OrderKind::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade lifecycle state carried on the `s` tag.
///
/// The set is open on the wire; unrecognized values survive as `Unknown` so
/// new server states never break deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Pending,
    WaitingBuyerInvoice,
    WaitingSellerToPay,
    Active,
    FiatSent,
    InProgress,
    Success,
    Canceled,
    CooperativelyCanceled,
    InDispute,
    Expired,
    Unknown(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::WaitingBuyerInvoice => "waiting-buyer-invoice",
            OrderStatus::WaitingSellerToPay => "waiting-seller-to-pay",
            OrderStatus::Active => "active",
            OrderStatus::FiatSent => "fiat-sent",
            OrderStatus::InProgress => "in-progress",
            OrderStatus::Success => "success",
            OrderStatus::Canceled => "canceled",
            OrderStatus::CooperativelyCanceled => "cooperatively-canceled",
            OrderStatus::InDispute => "in-dispute",
            OrderStatus::Expired => "expired",
            OrderStatus::Unknown(s) => s,
        }
    }

    /// Whether the order is finished from the client's perspective.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Success
                | OrderStatus::Canceled
                | OrderStatus::CooperativelyCanceled
                | OrderStatus::Expired
        )
    }
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        match s {
            "pending" => OrderStatus::Pending,
            "waiting-buyer-invoice" => OrderStatus::WaitingBuyerInvoice,
            "waiting-seller-to-pay" => OrderStatus::WaitingSellerToPay,
            "active" => OrderStatus::Active,
            "fiat-sent" => OrderStatus::FiatSent,
            "in-progress" => OrderStatus::InProgress,
            "success" => OrderStatus::Success,
            "canceled" => OrderStatus::Canceled,
            "cooperatively-canceled" => OrderStatus::CooperativelyCanceled,
            "in-dispute" => OrderStatus::InDispute,
            "expired" => OrderStatus::Expired,
            other => OrderStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(OrderStatus::from(s.as_str()))
    }
}

/// Fiat amount: a single value or an accepted `min-max` range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FiatAmount {
    Amount(i64),
    Range(i64, i64),
}

impl FiatAmount {
    /// Parse the `fa` tag text: `"100"` or `"100-500"`.
    pub fn from_tag(s: &str) -> Option<Self> {
        match s.split_once('-') {
            Some((min, max)) => Some(FiatAmount::Range(
                min.trim().parse().ok()?,
                max.trim().parse().ok()?,
            )),
            None => Some(FiatAmount::Amount(s.trim().parse().ok()?)),
        }
    }
}

impl fmt::Display for FiatAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiatAmount::Amount(n) => write!(f, "{n}"),
            FiatAmount::Range(min, max) => write!(f, "{min}-{max}"),
        }
    }
}

/// A P2P order as observed on a relay or submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Set by the Mostro instance; absent on a not-yet-submitted order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub kind: OrderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    /// Sats amount; 0 encodes "market price".
    #[serde(default)]
    pub amount: i64,
    pub fiat_code: String,
    pub fiat_amount: FiatAmount,
    /// Comma-separated list, e.g. `"cash, bank transfer"`.
    pub payment_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
}

impl Order {
    /// New order form with the fields a maker must provide.
    pub fn new(
        kind: OrderKind,
        fiat_code: impl Into<String>,
        fiat_amount: FiatAmount,
        payment_method: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            kind,
            status: None,
            amount: 0,
            fiat_code: fiat_code.into(),
            fiat_amount,
            payment_method: payment_method.into(),
            platform: None,
            created_at: None,
        }
    }

    /// Project a kind-38383 event into an `Order`.
    ///
    /// Events with missing or malformed mandatory tags yield `None`; they are
    /// not an error from the caller's perspective.
    pub fn from_event(event: &Event) -> Option<Self> {
        if event.kind != Kind::Custom(ORDER_EVENT_KIND) {
            return None;
        }
        if tag_value(event, "z") != Some(DOCUMENT_ORDER) {
            return None;
        }

        let id = match tag_value(event, "d").map(Uuid::parse_str) {
            Some(Ok(id)) => Some(id),
            Some(Err(_)) => {
                debug!(event = %event.id, "dropping order event with non-uuid d tag");
                return None;
            }
            None => return None,
        };
        let kind = match tag_value(event, "k").and_then(OrderKind::from_str_opt) {
            Some(k) => k,
            None => {
                debug!(event = %event.id, "dropping order event without buy/sell tag");
                return None;
            }
        };
        let fiat_code = tag_value(event, "f")?.to_string();
        let fiat_amount = tag_value(event, "fa").and_then(FiatAmount::from_tag)?;

        Some(Self {
            id,
            kind,
            status: tag_value(event, "s").map(OrderStatus::from),
            amount: tag_value(event, "amt").and_then(|v| v.parse().ok()).unwrap_or(0),
            fiat_code,
            fiat_amount,
            payment_method: tag_value(event, "pm").unwrap_or_default().to_string(),
            platform: tag_value(event, "y").map(str::to_string),
            created_at: Some(event.created_at.as_u64()),
        })
    }
}

// ── Filtering ────────────────────────────────────────────────────

/// Structured predicate over kind-38383 order events.
///
/// A missing field imposes no constraint. `authors` is not matched against
/// tags — it is forwarded to the relay as a standard `authors` filter.
#[derive(Debug, Clone, Default)]
pub struct OrderFilters {
    /// `z` tag, typically `"order"`.
    pub document_type: Option<String>,
    /// `k` tag.
    pub kind: Option<OrderKind>,
    /// `f` tag, uppercase ISO code.
    pub currency: Option<String>,
    /// `s` tag.
    pub status: Option<OrderStatus>,
    /// `y` tag.
    pub platform: Option<String>,
    /// Matched case-insensitively against the comma-split `pm` tag;
    /// non-empty intersection wins.
    pub payment_methods: Vec<String>,
    /// Relay-side author prefilter (hex or npub).
    pub authors: Vec<String>,
}

impl OrderFilters {
    /// True iff every non-empty filter field is satisfied by the event's tags.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref doc) = self.document_type {
            if tag_value(event, "z") != Some(doc.as_str()) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if tag_value(event, "k") != Some(kind.as_str()) {
                return false;
            }
        }
        if let Some(ref currency) = self.currency {
            if tag_value(event, "f") != Some(currency.as_str()) {
                return false;
            }
        }
        if let Some(ref status) = self.status {
            if tag_value(event, "s") != Some(status.as_str()) {
                return false;
            }
        }
        if let Some(ref platform) = self.platform {
            if tag_value(event, "y") != Some(platform.as_str()) {
                return false;
            }
        }
        if !self.payment_methods.is_empty() {
            let offered: Vec<String> = tag_value(event, "pm")
                .unwrap_or_default()
                .split(',')
                .map(|m| m.trim().to_lowercase())
                .collect();
            let wanted = self
                .payment_methods
                .iter()
                .any(|m| offered.iter().any(|o| o == &m.to_lowercase()));
            if !wanted {
                return false;
            }
        }
        true
    }
}

// ── Mostro instance info ─────────────────────────────────────────

/// Configuration document each Mostro instance publishes as kind 38383.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MostroInfo {
    pub mostro_pubkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mostro_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mostro_commit_id: Option<String>,
    #[serde(default)]
    pub max_order_amount: u64,
    #[serde(default)]
    pub min_order_amount: u64,
    pub expiration_hours: u64,
    pub expiration_seconds: u64,
    #[serde(default)]
    pub fee: f64,
    pub hold_invoice_expiration_window: u64,
    pub invoice_expiration_window: u64,
}

impl MostroInfo {
    /// Recognize an info document by its `mostro_pubkey` tag and project it.
    pub fn from_event(event: &Event) -> Option<Self> {
        if event.kind != Kind::Custom(ORDER_EVENT_KIND) {
            return None;
        }
        let mostro_pubkey = tag_value(event, "mostro_pubkey")?.to_string();

        let num = |key: &str| tag_value(event, key).and_then(|v| v.parse::<u64>().ok());

        Some(Self {
            mostro_pubkey,
            mostro_version: tag_value(event, "mostro_version").map(str::to_string),
            mostro_commit_id: tag_value(event, "mostro_commit_id").map(str::to_string),
            max_order_amount: num("max_order_amount").unwrap_or(0),
            min_order_amount: num("min_order_amount").unwrap_or(0),
            expiration_hours: num("expiration_hours").unwrap_or(24),
            expiration_seconds: num("expiration_seconds").unwrap_or(900),
            fee: tag_value(event, "fee").and_then(|v| v.parse().ok()).unwrap_or(0.0),
            hold_invoice_expiration_window: num("hold_invoice_expiration_window").unwrap_or(120),
            invoice_expiration_window: num("invoice_expiration_window").unwrap_or(120),
        })
    }
}

/// First value of the first tag whose key matches.
pub(crate) fn tag_value<'a>(event: &'a Event, key: &str) -> Option<&'a str> {
    event.tags.iter().find_map(|tag| {
        let s = tag.as_slice();
        if s.first().map(|v| v.as_str()) == Some(key) {
            s.get(1).map(|v| v.as_str())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_event(tags: &[(&str, &str)]) -> Event {
        let keys = Keys::generate();
        let tag_list: Vec<Tag> = tags
            .iter()
            .map(|(k, v)| Tag::custom(TagKind::custom(*k), vec![v.to_string()]))
            .collect();
        EventBuilder::new(Kind::Custom(ORDER_EVENT_KIND), "")
            .tags(tag_list)
            .sign_with_keys(&keys)
            .unwrap()
    }

    fn sell_usd_event() -> Event {
        order_event(&[
            ("z", "order"),
            ("k", "sell"),
            ("f", "USD"),
            ("d", "2c47f655-8295-49c3-a7a5-47e6d69ff4c9"),
            ("s", "pending"),
            ("fa", "100"),
            ("amt", "0"),
            ("pm", "cash, bank transfer"),
            ("y", "mostrop2p"),
        ])
    }

    #[test]
    fn extract_order_from_event() {
        let order = Order::from_event(&sell_usd_event()).unwrap();
        assert_eq!(order.kind, OrderKind::Sell);
        assert_eq!(order.status, Some(OrderStatus::Pending));
        assert_eq!(order.fiat_code, "USD");
        assert_eq!(order.fiat_amount, FiatAmount::Amount(100));
        assert_eq!(order.amount, 0);
        assert_eq!(order.platform.as_deref(), Some("mostrop2p"));
    }

    #[test]
    fn malformed_order_dropped_silently() {
        // no d tag
        let event = order_event(&[("z", "order"), ("k", "sell"), ("f", "USD"), ("fa", "50")]);
        assert!(Order::from_event(&event).is_none());

        // d tag is not a uuid
        let event = order_event(&[
            ("z", "order"),
            ("k", "sell"),
            ("f", "USD"),
            ("fa", "50"),
            ("d", "not-a-uuid"),
        ]);
        assert!(Order::from_event(&event).is_none());
    }

    #[test]
    fn fiat_amount_tag_forms() {
        assert_eq!(FiatAmount::from_tag("100"), Some(FiatAmount::Amount(100)));
        assert_eq!(
            FiatAmount::from_tag("100-500"),
            Some(FiatAmount::Range(100, 500))
        );
        assert_eq!(FiatAmount::from_tag("lots"), None);
        assert_eq!(FiatAmount::Range(100, 500).to_string(), "100-500");
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(OrderFilters::default().matches(&sell_usd_event()));
    }

    #[test]
    fn filter_on_kind_and_currency() {
        let filters = OrderFilters {
            document_type: Some("order".into()),
            kind: Some(OrderKind::Sell),
            currency: Some("USD".into()),
            ..Default::default()
        };
        assert!(filters.matches(&sell_usd_event()));

        let buy = order_event(&[
            ("z", "order"),
            ("k", "buy"),
            ("f", "USD"),
            ("d", "7a0566a2-5d91-43a4-a1ab-2ea0b4929a69"),
        ]);
        assert!(!filters.matches(&buy));

        let ves = order_event(&[
            ("z", "order"),
            ("k", "sell"),
            ("f", "VES"),
            ("d", "9dbdb34a-9f65-4da8-b162-6bd163f2a1d8"),
        ]);
        assert!(!filters.matches(&ves));
    }

    #[test]
    fn payment_methods_match_is_case_insensitive() {
        let filters = OrderFilters {
            payment_methods: vec!["Bank Transfer".into()],
            ..Default::default()
        };
        assert!(filters.matches(&sell_usd_event()));

        let filters = OrderFilters {
            payment_methods: vec!["zelle".into()],
            ..Default::default()
        };
        assert!(!filters.matches(&sell_usd_event()));
    }

    #[test]
    fn status_unknown_round_trips() {
        let status = OrderStatus::from("settled-by-admin");
        assert_eq!(status, OrderStatus::Unknown("settled-by-admin".into()));
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            "\"settled-by-admin\""
        );
        assert!(!status.is_terminal());
        assert!(OrderStatus::Success.is_terminal());
    }

    #[test]
    fn mostro_info_defaults() {
        let keys = Keys::generate();
        let event = order_event(&[
            ("z", "info"),
            ("mostro_pubkey", &keys.public_key().to_hex()),
            ("mostro_version", "0.12.4"),
            ("max_order_amount", "1000000"),
            ("fee", "0.006"),
        ]);
        let info = MostroInfo::from_event(&event).unwrap();
        assert_eq!(info.max_order_amount, 1_000_000);
        assert_eq!(info.expiration_hours, 24);
        assert_eq!(info.expiration_seconds, 900);
        assert_eq!(info.hold_invoice_expiration_window, 120);
        assert_eq!(info.invoice_expiration_window, 120);
        assert!((info.fee - 0.006).abs() < f64::EPSILON);
    }

    #[test]
    fn info_shape_requires_mostro_pubkey_tag() {
        assert!(MostroInfo::from_event(&sell_usd_event()).is_none());
    }

    #[test]
    fn order_serde_round_trip() {
        let mut order = Order::new(
            OrderKind::Buy,
            "EUR",
            FiatAmount::Range(50, 150),
            "SEPA",
        );
        order.id = Some(Uuid::new_v4());
        order.status = Some(OrderStatus::Pending);

        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, back);
    }
}
