//! Error types for Mostro client operations.

use thiserror::Error;

/// Error type covering every fallible operation in the crate.
///
/// Inbound cryptographic and parse failures (`DecryptFailed`,
/// `MalformedMessage`) are handled locally by the event router — logged and
/// dropped — and only surface to callers that invoke the codec directly.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Key string is neither 64 hex chars nor a bech32 `nsec`/`npub`.
    #[error("invalid key format: expected 64 hex chars or bech32")]
    InvalidKeyFormat,

    /// Bech32 payload did not decode to a valid key.
    #[error("malformed bech32 key")]
    InvalidBech32,

    /// A trade action or DM was attempted without a loaded private key.
    #[error("no private key set")]
    KeyNotSet,

    /// The relay gateway was used before `connect` (or after `disconnect`).
    #[error("relay gateway is not connected")]
    NotConnected,

    /// Every connected relay rejected the event.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// NIP-04/NIP-44 decryption failed (bad MAC, padding or encoding).
    #[error("decryption failed")]
    DecryptFailed,

    /// An inbound DM or payload did not parse as a Mostro message.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// No reply arrived before the correlator deadline.
    #[error("request timed out")]
    Timeout,

    /// The client was torn down while the request was outstanding.
    #[error("client disconnected")]
    Disconnected,

    /// A negative amount was passed to `submit_order`.
    #[error("invalid amount: must be >= 0")]
    InvalidAmount,

    /// The order passed to a trade action carries no id.
    #[error("order has no id")]
    MissingOrderId,

    /// Construction-time validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Wrapped failure from the underlying Nostr library.
    #[error("nostr error: {0}")]
    Nostr(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
