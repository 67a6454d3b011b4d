//! Identifier generation for conversations.
//!
//! Conversation ids are opaque strings on the wire: callers may bring their own,
//! and ids minted here are hyphenated UUIDs.
//!
//! ## Cargo features used by this module
//! - `uuid_v7`: mint time-ordered `UUIDv7` ids instead of random `UUIDv4`.

use uuid::Uuid;

/// Generate an ID intended to have good insert locality.
///
/// With feature `uuid_v7` enabled, this uses `Uuid::now_v7()`.
/// Otherwise it falls back to `Uuid::new_v4()`.
#[inline]
#[must_use]
fn uuid_time_ordered() -> Uuid {
    #[cfg(feature = "uuid_v7")]
    {
        Uuid::now_v7()
    }
    #[cfg(not(feature = "uuid_v7"))]
    {
        Uuid::new_v4()
    }
}

/// Mint a fresh conversation identifier.
#[must_use]
pub fn new_conversation_id() -> String {
    uuid_time_ordered().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_uuids() {
        let id = new_conversation_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_ids_are_unique() {
        let first = new_conversation_id();
        let second = new_conversation_id();
        assert_ne!(first, second);
    }
}
