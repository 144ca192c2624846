//! Event encryption and signing.
//!
//! NIP-04 (legacy kind-4 DMs) and NIP-44 v2 (gift-wrap payloads) stay
//! separate codepaths to remain bit-compatible with the deployed Mostro
//! ecosystem, which still speaks NIP-04 on the DM channel.

use nostr_sdk::prelude::*;

use crate::error::{ClientError, Result};

/// NIP-44 v2 encryption: HKDF conversation key, ChaCha20, HMAC-SHA256.
pub fn encrypt_nip44(
    sender: &SecretKey,
    recipient: &PublicKey,
    plaintext: &str,
) -> Result<String> {
    nip44::encrypt(sender, recipient, plaintext, nip44::Version::V2)
        .map_err(|e| ClientError::Nostr(e.to_string()))
}

/// NIP-44 v2 decryption. MAC or decoding failure maps to `DecryptFailed`.
pub fn decrypt_nip44(local: &SecretKey, peer: &PublicKey, ciphertext: &str) -> Result<String> {
    nip44::decrypt(local, peer, ciphertext).map_err(|_| ClientError::DecryptFailed)
}

/// NIP-04 encryption for legacy kind-4 direct messages.
pub fn encrypt_nip04(
    sender: &SecretKey,
    recipient: &PublicKey,
    plaintext: &str,
) -> Result<String> {
    nip04::encrypt(sender, recipient, plaintext).map_err(|e| ClientError::Nostr(e.to_string()))
}

/// NIP-04 decryption. Any failure maps to `DecryptFailed`.
pub fn decrypt_nip04(local: &SecretKey, peer: &PublicKey, ciphertext: &str) -> Result<String> {
    nip04::decrypt(local, peer, ciphertext).map_err(|_| ClientError::DecryptFailed)
}

/// Compute the event id over the canonical serialization and schnorr-sign it.
pub fn finalize_event(unsigned: UnsignedEvent, keys: &Keys) -> Result<Event> {
    unsigned
        .sign_with_keys(keys)
        .map_err(|e| ClientError::Nostr(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nip44_round_trip() {
        let alice = Keys::generate();
        let bob = Keys::generate();

        let ciphertext =
            encrypt_nip44(alice.secret_key(), &bob.public_key(), "hodl in peace").unwrap();
        let plaintext =
            decrypt_nip44(bob.secret_key(), &alice.public_key(), &ciphertext).unwrap();
        assert_eq!(plaintext, "hodl in peace");
    }

    #[test]
    fn nip04_round_trip() {
        let alice = Keys::generate();
        let bob = Keys::generate();

        let ciphertext =
            encrypt_nip04(alice.secret_key(), &bob.public_key(), "legacy dm").unwrap();
        let plaintext =
            decrypt_nip04(bob.secret_key(), &alice.public_key(), &ciphertext).unwrap();
        assert_eq!(plaintext, "legacy dm");
    }

    #[test]
    fn nip44_wrong_key_fails() {
        let alice = Keys::generate();
        let bob = Keys::generate();
        let mallory = Keys::generate();

        let ciphertext = encrypt_nip44(alice.secret_key(), &bob.public_key(), "secret").unwrap();
        let result = decrypt_nip44(mallory.secret_key(), &alice.public_key(), &ciphertext);
        assert!(matches!(result, Err(ClientError::DecryptFailed)));
    }

    #[test]
    fn finalize_produces_verifiable_event() {
        let keys = Keys::generate();
        let unsigned = EventBuilder::text_note("signed payload").build(keys.public_key());
        let event = finalize_event(unsigned, &keys).unwrap();
        assert!(event.verify().is_ok());
        assert_eq!(event.pubkey, keys.public_key());
    }
}
