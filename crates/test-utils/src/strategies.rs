//! Proptest strategies shared by Kinship crates.
//!
//! Generators produce well-formed inputs (bucket names, keys, timestamps,
//! credentials) while exploring edge cases through random variation.
//!
//! # Usage
//!
//! ```no_run
//! use kinship_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(batch in strategies::arb_write_batch()) {
//!         // apply the batch and check an invariant
//!     }
//! }
//! ```

use chrono::{DateTime, TimeZone, Utc};
use kinship_types::{FamilyId, PersonId, UserId};
use proptest::prelude::*;

/// Generates a bucket name of 1-24 characters matching `[a-z][a-zA-Z0-9_-]{0,23}`.
pub fn arb_bucket_name() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9_-]{0,23}"
}

/// Generates a raw key of 1-16 random bytes.
pub fn arb_key_bytes() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 1..16)
}

/// Generates a raw value of 0-63 random bytes.
pub fn arb_value() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..64)
}

/// Generates 1-20 writes against a single bucket; `None` means delete.
///
/// Keys are drawn from a small alphabet so deletes and overwrites hit
/// existing entries often.
pub fn arb_write_batch() -> impl Strategy<Value = Vec<(Vec<u8>, Option<Vec<u8>>)>> {
    let key = proptest::collection::vec(0u8..4, 1..3);
    proptest::collection::vec((key, proptest::option::weighted(0.75, arb_value())), 1..20)
}

/// Generates a [`DateTime<Utc>`] between 2000-01-01 and 2030-01-01 at second precision.
pub fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (946_684_800i64..1_893_456_000i64).prop_map(|secs| {
        Utc.timestamp_opt(secs, 0).single().unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH))
    })
}

/// Generates a distinct, ascending run of 1-12 timestamps.
pub fn arb_ascending_timestamps() -> impl Strategy<Value = Vec<DateTime<Utc>>> {
    proptest::collection::btree_set(arb_timestamp(), 1..12).prop_map(|set| set.into_iter().collect())
}

/// Generates a display name such as `Ada Lovelace`.
pub fn arb_person_name() -> impl Strategy<Value = String> {
    ("[A-Z][a-z]{1,9}", "[A-Z][a-z]{1,11}").prop_map(|(first, last)| format!("{first} {last}"))
}

/// Generates a lowercase email address.
pub fn arb_email() -> impl Strategy<Value = String> {
    ("[a-z][a-z0-9.]{0,15}", "[a-z]{2,10}", prop::sample::select(vec!["com", "org", "net"]))
        .prop_map(|(local, domain, tld)| format!("{local}@{domain}.{tld}"))
}

/// Generates a password within the default length policy (8-72 bytes).
pub fn arb_password() -> impl Strategy<Value = String> {
    "[ -~]{8,72}"
}

/// Generates an allocated [`UserId`] in the range 1-9,999.
pub fn arb_user_id() -> impl Strategy<Value = UserId> {
    (1u64..10_000).prop_map(UserId::new)
}

/// Generates an allocated [`FamilyId`] in the range 1-9,999.
pub fn arb_family_id() -> impl Strategy<Value = FamilyId> {
    (1u64..10_000).prop_map(FamilyId::new)
}

/// Generates an allocated [`PersonId`] in the range 1-9,999.
pub fn arb_person_id() -> impl Strategy<Value = PersonId> {
    (1u64..10_000).prop_map(PersonId::new)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn prop_ascending_timestamps_are_sorted(stamps in arb_ascending_timestamps()) {
            prop_assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn prop_email_has_one_at_sign(email in arb_email()) {
            prop_assert_eq!(email.matches('@').count(), 1);
        }

        #[test]
        fn prop_password_within_policy(password in arb_password()) {
            prop_assert!((8..=72).contains(&password.len()));
        }
    }
}
