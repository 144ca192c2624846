//! Key material handling: private key parsing, public key encoding,
//! ephemeral key generation for gift wraps.

use nostr_sdk::prelude::*;

use crate::error::{ClientError, Result};

/// Output encoding for a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubkeyEncoding {
    /// 64-char lowercase hex.
    Hex,
    /// Bech32 `npub1…`.
    Npub,
}

/// Parse a private key from 64 hex chars (case-insensitive) or bech32 `nsec1…`.
pub fn parse_private_key(input: &str) -> Result<Keys> {
    let input = input.trim();
    if input.starts_with("nsec1") {
        let secret = SecretKey::from_bech32(input).map_err(|_| ClientError::InvalidBech32)?;
        Ok(Keys::new(secret))
    } else if is_hex64(input) {
        let secret = SecretKey::from_hex(input).map_err(|_| ClientError::InvalidKeyFormat)?;
        Ok(Keys::new(secret))
    } else {
        Err(ClientError::InvalidKeyFormat)
    }
}

/// Parse a public key from 64 hex chars or bech32 `npub1…`.
pub fn parse_public_key(input: &str) -> Result<PublicKey> {
    let input = input.trim();
    if input.starts_with("npub1") {
        PublicKey::from_bech32(input).map_err(|_| ClientError::InvalidBech32)
    } else if is_hex64(input) {
        PublicKey::from_hex(input).map_err(|_| ClientError::InvalidKeyFormat)
    } else {
        Err(ClientError::InvalidKeyFormat)
    }
}

/// Project a public key into the requested encoding.
pub fn encode_public_key(pubkey: &PublicKey, encoding: PubkeyEncoding) -> Result<String> {
    match encoding {
        PubkeyEncoding::Hex => Ok(pubkey.to_hex()),
        PubkeyEncoding::Npub => pubkey
            .to_bech32()
            .map_err(|e| ClientError::Nostr(e.to_string())),
    }
}

/// Fresh secp256k1 keypair from the OS CSPRNG. One per gift wrap.
pub fn ephemeral_keys() -> Keys {
    Keys::generate()
}

fn is_hex64(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_private_key() {
        let hex = "0101010101010101010101010101010101010101010101010101010101010101";
        let keys = parse_private_key(hex).unwrap();
        assert_eq!(keys.secret_key().to_secret_hex(), hex);
    }

    #[test]
    fn parse_hex_is_case_insensitive() {
        let generated = Keys::generate();
        let upper = generated.secret_key().to_secret_hex().to_uppercase();
        let keys = parse_private_key(&upper).unwrap();
        assert_eq!(keys.public_key(), generated.public_key());
    }

    #[test]
    fn parse_nsec_private_key() {
        let generated = Keys::generate();
        let nsec = generated.secret_key().to_bech32().unwrap();
        let keys = parse_private_key(&nsec).unwrap();
        assert_eq!(keys.public_key(), generated.public_key());
    }

    #[test]
    fn reject_wrong_shape() {
        assert!(matches!(
            parse_private_key("deadbeef"),
            Err(ClientError::InvalidKeyFormat)
        ));
        assert!(matches!(
            parse_private_key("npub1notasecret"),
            Err(ClientError::InvalidKeyFormat)
        ));
    }

    #[test]
    fn reject_malformed_nsec() {
        assert!(matches!(
            parse_private_key("nsec1qqqqqqqq"),
            Err(ClientError::InvalidBech32)
        ));
    }

    #[test]
    fn public_key_encodings_agree() {
        let keys = Keys::generate();
        let hex = encode_public_key(&keys.public_key(), PubkeyEncoding::Hex).unwrap();
        let npub = encode_public_key(&keys.public_key(), PubkeyEncoding::Npub).unwrap();
        assert_eq!(hex.len(), 64);
        assert!(npub.starts_with("npub1"));
        assert_eq!(parse_public_key(&hex).unwrap(), parse_public_key(&npub).unwrap());
    }

    #[test]
    fn ephemeral_keys_are_unique() {
        assert_ne!(ephemeral_keys().public_key(), ephemeral_keys().public_key());
    }
}
