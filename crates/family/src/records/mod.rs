//! Stored records.
//!
//! Every record packs its fields in a fixed order behind a version tag and is
//! keyed by an integer id allocated on first save. Foreign keys are plain ids
//! with no enforced referential integrity.

/// Implements [`kinship_state::Record`] for a struct with an `id` field.
macro_rules! impl_record {
    ($record:ty, $id:ty) => {
        impl kinship_state::Record for $record {
            type Id = $id;

            fn id(&self) -> $id {
                self.id
            }

            fn set_id(&mut self, id: $id) {
                self.id = id;
            }
        }
    };
}

/// Implements [`kinship_types::PackEnum`] from a variant-to-tag table.
macro_rules! pack_enum {
    ($name:ident { $($variant:ident = $tag:literal),+ $(,)? }) => {
        impl kinship_types::PackEnum for $name {
            const NAME: &'static str = stringify!($name);

            fn to_tag(&self) -> u8 {
                match self {
                    $($name::$variant => $tag,)+
                }
            }

            fn from_tag(tag: u8) -> Option<Self> {
                match tag {
                    $($tag => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

mod family;
mod growth;
mod image;
mod person;
mod post;
mod user;

pub use family::Family;
pub use growth::{Height, Milestone, MilestoneType, Weight};
pub use image::Image;
pub use person::{Gender, Person, PersonType};
pub use post::Post;
pub use user::{TokenGrant, User, UserStatus};
