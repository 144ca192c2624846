//! NIP-59 gift wrapping for outgoing Mostro traffic.
//!
//! Every wrap uses a fresh ephemeral signer and a past-biased random
//! timestamp. Both are privacy-critical: a fixed key or the current time
//! would let relays correlate a client's trade activity.

use nostr_sdk::prelude::*;
use rand::Rng;

use crate::crypto;
use crate::error::{ClientError, Result};
use crate::keys::ephemeral_keys;

/// Width of the timestamp smear window: two days, per NIP-59.
pub const WRAP_TIMESTAMP_WINDOW: u64 = 2 * 24 * 3600;

/// Wrap a JSON payload for `recipient` as a signed kind-1059 event.
///
/// The inner rumor is an unsigned kind-1 event authored by `sender` whose id
/// is 32 fresh random bytes — not the recipient-derivable hash. This is a
/// Mostro convention: the rumor id never links back to its content.
pub fn wrap_payload(sender: &Keys, recipient: &PublicKey, payload: String) -> Result<Event> {
    let ephemeral = ephemeral_keys();

    let mut rumor = EventBuilder::text_note(payload).build(sender.public_key());
    rumor.id = Some(random_rumor_id()?);

    let ciphertext = crypto::encrypt_nip44(ephemeral.secret_key(), recipient, &rumor.as_json())?;

    EventBuilder::new(Kind::GiftWrap, ciphertext)
        .tag(Tag::public_key(*recipient))
        .custom_created_at(smeared_timestamp())
        .sign_with_keys(&ephemeral)
        .map_err(|e| ClientError::Nostr(e.to_string()))
}

/// Recover the inner rumor from a kind-1059 event addressed to `recipient`.
pub fn unwrap_gift_wrap(recipient: &Keys, event: &Event) -> Result<UnsignedEvent> {
    let plaintext = crypto::decrypt_nip44(recipient.secret_key(), &event.pubkey, &event.content)?;
    UnsignedEvent::from_json(plaintext).map_err(|e| ClientError::MalformedMessage(e.to_string()))
}

fn random_rumor_id() -> Result<EventId> {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes[..]);
    EventId::from_slice(&bytes).map_err(|e| ClientError::Nostr(e.to_string()))
}

/// Uniform timestamp in `[now - WRAP_TIMESTAMP_WINDOW, now]`.
fn smeared_timestamp() -> Timestamp {
    let now = Timestamp::now().as_u64();
    Timestamp::from(now - rand::thread_rng().gen_range(0..=WRAP_TIMESTAMP_WINDOW))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_round_trip() {
        let sender = Keys::generate();
        let recipient = Keys::generate();
        let payload = r#"{"order":{"version":1,"request_id":0,"action":"release","content":null}}"#;

        let wrap = wrap_payload(&sender, &recipient.public_key(), payload.to_string()).unwrap();
        assert_eq!(wrap.kind, Kind::GiftWrap);
        assert!(wrap.verify().is_ok());

        let rumor = unwrap_gift_wrap(&recipient, &wrap).unwrap();
        assert_eq!(rumor.pubkey, sender.public_key());
        assert_eq!(rumor.content, payload);
    }

    #[test]
    fn wrap_author_is_ephemeral() {
        let sender = Keys::generate();
        let recipient = Keys::generate();

        let a = wrap_payload(&sender, &recipient.public_key(), "{}".into()).unwrap();
        let b = wrap_payload(&sender, &recipient.public_key(), "{}".into()).unwrap();

        assert_ne!(a.pubkey, sender.public_key());
        // fresh key per wrap
        assert_ne!(a.pubkey, b.pubkey);
    }

    #[test]
    fn wrap_tags_recipient() {
        let sender = Keys::generate();
        let recipient = Keys::generate();
        let wrap = wrap_payload(&sender, &recipient.public_key(), "{}".into()).unwrap();

        let tagged = wrap.tags.iter().any(|tag| {
            let s = tag.as_slice();
            s.first().map(|v| v.as_str()) == Some("p")
                && s.get(1).map(|v| v.as_str()) == Some(recipient.public_key().to_hex().as_str())
        });
        assert!(tagged);
    }

    #[test]
    fn wrap_timestamp_within_smear_window() {
        let sender = Keys::generate();
        let recipient = Keys::generate();

        for _ in 0..16 {
            let before = Timestamp::now().as_u64();
            let wrap = wrap_payload(&sender, &recipient.public_key(), "{}".into()).unwrap();
            let after = Timestamp::now().as_u64();

            let created = wrap.created_at.as_u64();
            assert!(created <= after);
            assert!(created >= before - WRAP_TIMESTAMP_WINDOW);
        }
    }

    #[test]
    fn rumor_id_is_randomized() {
        let sender = Keys::generate();
        let recipient = Keys::generate();
        let wrap =
            wrap_payload(&sender, &recipient.public_key(), "same payload".into()).unwrap();
        let rumor = unwrap_gift_wrap(&recipient, &wrap).unwrap();

        // the id must not be the derivable hash of the rumor fields
        let mut derivable = rumor.clone();
        derivable.id = None;
        derivable.ensure_id();
        assert_ne!(rumor.id, derivable.id);
    }
}
