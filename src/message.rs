//! The Mostro wire message: a tagged sum over `order` and `cant-do`
//! kernels, with an action-selected heterogeneous `content` union.
//!
//! Unknown actions deserialize to `Action::Unknown` rather than failing, so
//! the client keeps working against newer server versions.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::order::Order;

/// Protocol version carried in every message kernel.
pub const PROTOCOL_VERSION: u8 = 1;

// ── Actions ──────────────────────────────────────────────────────

/// Closed action set of the Mostro protocol, plus a forward-compatibility
/// escape hatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    NewOrder,
    TakeSell,
    TakeBuy,
    PayInvoice,
    AddInvoice,
    FiatSent,
    FiatSentOk,
    Release,
    Released,
    Cancel,
    Canceled,
    WaitingBuyerInvoice,
    WaitingSellerToPay,
    BuyerTookOrder,
    HoldInvoicePaymentAccepted,
    HoldInvoicePaymentSettled,
    HoldInvoicePaymentCanceled,
    CooperativeCancelInitiatedByYou,
    CooperativeCancelInitiatedByPeer,
    CooperativeCancelAccepted,
    Rate,
    RateUser,
    RateReceived,
    Dispute,
    DisputeInitiatedByYou,
    DisputeInitiatedByPeer,
    CantDo,
    OutOfRangeFiatAmount,
    IsNotYourDispute,
    NotFound,
    IncorrectInvoiceAmount,
    InvalidSatsAmount,
    OutOfRangeSatsAmount,
    PaymentFailed,
    InvoiceUpdated,
    Unknown(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::NewOrder => "new-order",
            Action::TakeSell => "take-sell",
            Action::TakeBuy => "take-buy",
            Action::PayInvoice => "pay-invoice",
            Action::AddInvoice => "add-invoice",
            Action::FiatSent => "fiat-sent",
            Action::FiatSentOk => "fiat-sent-ok",
            Action::Release => "release",
            Action::Released => "released",
            Action::Cancel => "cancel",
            Action::Canceled => "canceled",
            Action::WaitingBuyerInvoice => "waiting-buyer-invoice",
            Action::WaitingSellerToPay => "waiting-seller-to-pay",
            Action::BuyerTookOrder => "buyer-took-order",
            Action::HoldInvoicePaymentAccepted => "hold-invoice-payment-accepted",
            Action::HoldInvoicePaymentSettled => "hold-invoice-payment-settled",
            Action::HoldInvoicePaymentCanceled => "hold-invoice-payment-canceled",
            Action::CooperativeCancelInitiatedByYou => "cooperative-cancel-initiated-by-you",
            Action::CooperativeCancelInitiatedByPeer => "cooperative-cancel-initiated-by-peer",
            Action::CooperativeCancelAccepted => "cooperative-cancel-accepted",
            Action::Rate => "rate",
            Action::RateUser => "rate-user",
            Action::RateReceived => "rate-received",
            Action::Dispute => "dispute",
            Action::DisputeInitiatedByYou => "dispute-initiated-by-you",
            Action::DisputeInitiatedByPeer => "dispute-initiated-by-peer",
            Action::CantDo => "cant-do",
            Action::OutOfRangeFiatAmount => "out-of-range-fiat-amount",
            Action::IsNotYourDispute => "is-not-your-dispute",
            Action::NotFound => "not-found",
            Action::IncorrectInvoiceAmount => "incorrect-invoice-amount",
            Action::InvalidSatsAmount => "invalid-sats-amount",
            Action::OutOfRangeSatsAmount => "out-of-range-sats-amount",
            Action::PaymentFailed => "payment-failed",
            Action::InvoiceUpdated => "invoice-updated",
            Action::Unknown(s) => s,
        }
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s {
            "new-order" => Action::NewOrder,
            "take-sell" => Action::TakeSell,
            "take-buy" => Action::TakeBuy,
            "pay-invoice" => Action::PayInvoice,
            "add-invoice" => Action::AddInvoice,
            "fiat-sent" => Action::FiatSent,
            "fiat-sent-ok" => Action::FiatSentOk,
            "release" => Action::Release,
            "released" => Action::Released,
            "cancel" => Action::Cancel,
            "canceled" => Action::Canceled,
            "waiting-buyer-invoice" => Action::WaitingBuyerInvoice,
            "waiting-seller-to-pay" => Action::WaitingSellerToPay,
            "buyer-took-order" => Action::BuyerTookOrder,
            "hold-invoice-payment-accepted" => Action::HoldInvoicePaymentAccepted,
            "hold-invoice-payment-settled" => Action::HoldInvoicePaymentSettled,
            "hold-invoice-payment-canceled" => Action::HoldInvoicePaymentCanceled,
            "cooperative-cancel-initiated-by-you" => Action::CooperativeCancelInitiatedByYou,
            "cooperative-cancel-initiated-by-peer" => Action::CooperativeCancelInitiatedByPeer,
            "cooperative-cancel-accepted" => Action::CooperativeCancelAccepted,
            "rate" => Action::Rate,
            "rate-user" => Action::RateUser,
            "rate-received" => Action::RateReceived,
            "dispute" => Action::Dispute,
            "dispute-initiated-by-you" => Action::DisputeInitiatedByYou,
            "dispute-initiated-by-peer" => Action::DisputeInitiatedByPeer,
            "cant-do" => Action::CantDo,
            "out-of-range-fiat-amount" => Action::OutOfRangeFiatAmount,
            "is-not-your-dispute" => Action::IsNotYourDispute,
            "not-found" => Action::NotFound,
            "incorrect-invoice-amount" => Action::IncorrectInvoiceAmount,
            "invalid-sats-amount" => Action::InvalidSatsAmount,
            "out-of-range-sats-amount" => Action::OutOfRangeSatsAmount,
            "payment-failed" => Action::PaymentFailed,
            "invoice-updated" => Action::InvoiceUpdated,
            other => Action::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Action {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Action::from(s.as_str()))
    }
}

// ── Content union ────────────────────────────────────────────────

/// Counterparty identity disclosed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Peer {
    pub pubkey: String,
}

/// Dispute reference with the solver tokens each side receives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisputeInfo {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_token: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_token: Option<u16>,
}

/// Wire form of a payment request: `[order|null, invoice]` when no amount is
/// attached, `[order|null, invoice, amount]` when one is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PaymentRequest {
    WithAmount(Option<Order>, String, i64),
    Bare(Option<Order>, String),
}

impl PaymentRequest {
    pub fn new(order: Option<Order>, invoice: impl Into<String>, amount: Option<i64>) -> Self {
        match amount {
            Some(amount) => PaymentRequest::WithAmount(order, invoice.into(), amount),
            None => PaymentRequest::Bare(order, invoice.into()),
        }
    }

    pub fn invoice(&self) -> &str {
        match self {
            PaymentRequest::WithAmount(_, invoice, _) | PaymentRequest::Bare(_, invoice) => invoice,
        }
    }
}

/// Heterogeneous message content, selected by the action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Content {
    Order(Order),
    PaymentRequest(PaymentRequest),
    Amount(i64),
    TextMessage(String),
    Peer(Peer),
    /// Bare rating value on the wire; internal bookkeeping lives in
    /// [`crate::rating::Rating`].
    RatingUser(u8),
    Dispute(DisputeInfo),
}

// ── Message kernels ──────────────────────────────────────────────

/// Body of an `order`-channel message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageKernel {
    pub version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    pub action: Action,
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
}

/// Body of a `cant-do` refusal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CantDoKernel {
    pub version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
    pub action: Action,
    #[serde(default)]
    pub content: Option<Content>,
}

/// A message exchanged with a Mostro instance. Exactly one key is populated
/// on the wire: `{"order": {…}}` or `{"cant-do": {…}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum MostroMessage {
    Order(MessageKernel),
    CantDo(CantDoKernel),
}

impl MostroMessage {
    /// Build an outgoing `order`-channel message.
    pub fn order(
        action: Action,
        request_id: u64,
        id: Option<Uuid>,
        content: Option<Content>,
    ) -> Self {
        MostroMessage::Order(MessageKernel {
            version: PROTOCOL_VERSION,
            id,
            request_id: Some(request_id),
            action,
            content,
            created_at: None,
        })
    }

    pub fn action(&self) -> &Action {
        match self {
            MostroMessage::Order(k) => &k.action,
            MostroMessage::CantDo(k) => &k.action,
        }
    }

    pub fn request_id(&self) -> Option<u64> {
        match self {
            MostroMessage::Order(k) => k.request_id,
            MostroMessage::CantDo(k) => k.request_id,
        }
    }

    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            MostroMessage::Order(k) => k.id,
            MostroMessage::CantDo(k) => k.id,
        }
    }

    pub fn content(&self) -> Option<&Content> {
        match self {
            MostroMessage::Order(k) => k.content.as_ref(),
            MostroMessage::CantDo(k) => k.content.as_ref(),
        }
    }

    /// The server's refusal text, when this is a `cant-do`.
    pub fn refusal_text(&self) -> Option<&str> {
        match self {
            MostroMessage::CantDo(k) => match k.content {
                Some(Content::TextMessage(ref text)) => Some(text),
                _ => None,
            },
            MostroMessage::Order(_) => None,
        }
    }
}
