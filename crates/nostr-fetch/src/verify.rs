//! The injected signature-verification capability (§1, §6).

use crate::types::Event;

/// Schnorr signature verification over secp256k1, against the event's
/// canonical id. Injected so callers can swap in a faster or
/// hardware-backed verifier; the default delegates to the `nostr` crate.
pub trait Verifier: Send + Sync {
    fn verify(&self, event: &Event) -> bool;
}

/// Verifies via `nostr::Event::verify`, which checks both that `id` is the
/// correct hash of the canonical serialization and that `sig` is a valid
/// Schnorr signature over it by `pubkey`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultVerifier;

impl Verifier for DefaultVerifier {
    fn verify(&self, event: &Event) -> bool {
        event.verify().is_ok()
    }
}

/// Checks only the event's structural schema (§3): well-formed id/pubkey/sig
/// lengths and a tag shape of "sequence of sequence of strings", independent
/// of signature validity. `nostr::Event`'s deserialization already enforces
/// the hex-length invariants, so a successfully-deserialized `Event` has
/// passed schema validation; this additionally checks the id is the correct
/// hash of the event's content, per the §3 invariant.
pub fn validate_schema(event: &Event) -> bool {
    event.verify_id().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::{EventBuilder, Keys, Kind};

    #[test]
    fn valid_event_passes_schema_and_signature_checks() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hello")
            .sign_with_keys(&keys)
            .unwrap();

        assert!(validate_schema(&event));
        assert!(DefaultVerifier.verify(&event));
    }

    #[test]
    fn tampered_content_fails_signature_but_not_necessarily_schema() {
        let keys = Keys::generate();
        let mut event = EventBuilder::new(Kind::TextNote, "hello")
            .sign_with_keys(&keys)
            .unwrap();
        event.content = "tampered".into();

        // the id no longer matches the (now-tampered) content
        assert!(!validate_schema(&event));
        assert!(!DefaultVerifier.verify(&event));
    }
}
