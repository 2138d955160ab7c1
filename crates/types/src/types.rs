//! Record identifiers.
//!
//! Every record stored by Kinship is keyed by a `u64` allocated from its
//! bucket. The newtypes below keep a `PersonId` from being passed where a
//! `FamilyId` is expected. The value `0` is reserved to mean "not yet
//! allocated".

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generates a newtype identifier wrapping `u64`.
///
/// Each identifier gets `Key` and `PackField` implementations so it can be
/// used directly as a bucket key, an index term, or a record field.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident, $prefix:expr
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Sentinel for a record that has not been assigned an id.
            pub const UNASSIGNED: Self = Self(0);

            /// Creates a new identifier from a raw value.
            #[inline]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw numeric value.
            #[inline]
            pub const fn value(self) -> u64 {
                self.0
            }

            /// Returns true if this id still needs allocation.
            #[inline]
            pub const fn is_unassigned(self) -> bool {
                self.0 == 0
            }
        }

        impl From<u64> for $name {
            #[inline]
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", $prefix, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                s.parse::<u64>().map(Self)
            }
        }

        impl crate::key::Key for $name {
            const KIND: crate::key::KeyKind = crate::key::KeyKind::U64;

            fn encode_key(&self, buf: &mut Vec<u8>) {
                crate::key::Key::encode_key(&self.0, buf);
            }

            fn decode_key(buf: &[u8]) -> Option<(Self, usize)> {
                <u64 as crate::key::Key>::decode_key(buf).map(|(raw, used)| (Self(raw), used))
            }
        }

        impl crate::key::IntKey for $name {
            fn from_u64(value: u64) -> Self {
                Self(value)
            }

            fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl crate::pack::PackField for $name {
            fn write_to(&self, out: &mut Vec<u8>) {
                crate::pack::PackField::write_to(&self.0, out);
            }

            fn read_from(reader: &mut crate::pack::Reader<'_>) -> Result<Self, crate::pack::PackError> {
                <u64 as crate::pack::PackField>::read_from(reader).map(Self)
            }
        }

        impl crate::pack::Pack for $name {
            fn pack(&mut self, buf: &mut crate::pack::PackBuffer<'_>) -> Result<(), crate::pack::PackError> {
                buf.field(self)
            }
        }
    };
}

define_id!(
    /// Identifier of a registered account.
    ///
    /// User `1` is the administrator account.
    UserId, "user"
);

define_id!(
    /// Identifier of a family group.
    FamilyId, "family"
);

define_id!(
    /// Identifier of a person (parent or child) inside a family.
    PersonId, "person"
);

define_id!(
    /// Identifier of an uploaded image.
    ImageId, "image"
);

define_id!(
    /// Identifier of a journal post.
    PostId, "post"
);

define_id!(
    /// Identifier of a height measurement.
    HeightId, "height"
);

define_id!(
    /// Identifier of a weight measurement.
    WeightId, "weight"
);

define_id!(
    /// Identifier of a developmental milestone.
    MilestoneId, "milestone"
);

impl UserId {
    /// The administrator account.
    pub const ADMIN: Self = Self(1);
}
