//! People tracked inside a family.

use chrono::{DateTime, Utc};
use kinship_types::{FamilyId, ImageId, Pack, PackBuffer, PackError, PersonId};
use serde::{Deserialize, Serialize};

/// Role of a person in their family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersonType {
    /// A parent or guardian.
    Parent,
    /// A child whose growth is tracked.
    #[default]
    Child,
}

pack_enum!(PersonType { Parent = 0, Child = 1 });

/// Recorded gender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    /// Male.
    Male,
    /// Female.
    Female,
    /// Not recorded.
    #[default]
    Undisclosed,
}

pack_enum!(Gender { Male = 0, Female = 1, Undisclosed = 2 });

/// A parent or child.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    /// Allocated id.
    pub id: PersonId,
    /// Family the person belongs to.
    pub family_id: FamilyId,
    /// Parent or child.
    pub person_type: PersonType,
    /// Recorded gender.
    pub gender: Gender,
    /// Display name.
    pub name: String,
    /// Date of birth (midnight UTC).
    pub birthday: DateTime<Utc>,
    /// Profile picture, if one was uploaded.
    pub image_id: Option<ImageId>,
}

impl Pack for Person {
    fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError> {
        buf.version(1)?;
        buf.field(&mut self.id)?;
        buf.field(&mut self.name)?;
        buf.field(&mut self.birthday)?;
        buf.field(&mut self.family_id)?;
        buf.enumeration(&mut self.person_type)?;
        buf.enumeration(&mut self.gender)?;
        buf.field(&mut self.image_id)
    }
}

impl_record!(Person, PersonId);

impl Person {
    /// Creates an unsaved child record.
    pub fn child(family_id: FamilyId, name: impl Into<String>, birthday: DateTime<Utc>) -> Self {
        Self { family_id, name: name.into(), birthday, person_type: PersonType::Child, ..Self::default() }
    }

    /// Creates an unsaved parent record.
    pub fn parent(family_id: FamilyId, name: impl Into<String>, birthday: DateTime<Utc>) -> Self {
        Self { family_id, name: name.into(), birthday, person_type: PersonType::Parent, ..Self::default() }
    }
}
