//! Client-side library for the Mostro P2P exchange protocol over Nostr.
//!
//! This crate lets an application discover P2P Bitcoin orders published by
//! Mostro instances, drive an order through its trade lifecycle over the
//! encrypted message channel, and exchange out-of-band DMs with the
//! counterparty peer. WebSocket transport and the cryptographic primitives
//! come from `nostr-sdk`; this crate adds the protocol on top: order
//! filtering, gift-wrapped payload construction, request/response
//! correlation and the typed trade-action surface.

pub mod client;
pub mod correlator;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod keys;
pub mod message;
pub mod order;
pub mod rating;
pub mod wrap;

// Re-export commonly used types
pub use client::{ClientOptions, MostroClient, MostroEvent, SEARCH_WINDOW};
pub use correlator::{ActionWaiter, PendingReply, RequestCorrelator, REQUEST_TIMEOUT};
pub use error::{ClientError, Result};
pub use gateway::RelayGateway;
pub use keys::{
    encode_public_key, ephemeral_keys, parse_private_key, parse_public_key, PubkeyEncoding,
};
pub use message::{
    Action, CantDoKernel, Content, DisputeInfo, MessageKernel, MostroMessage, PaymentRequest,
    Peer, PROTOCOL_VERSION,
};
pub use order::{
    FiatAmount, MostroInfo, Order, OrderFilters, OrderKind, OrderStatus, ORDER_EVENT_KIND,
};
pub use rating::Rating;
pub use wrap::{unwrap_gift_wrap, wrap_payload, WRAP_TIMESTAMP_WINDOW};

// Re-export nostr-sdk for convenience
pub use nostr_sdk;
