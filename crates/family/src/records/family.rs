//! Family groups.

use kinship_types::{FamilyId, Pack, PackBuffer, PackError, UserId};
use serde::{Deserialize, Serialize};

/// A named group of people managed by one or more accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Family {
    /// Allocated id.
    pub id: FamilyId,
    /// Display name.
    pub name: String,
    /// Accounts allowed to manage the family.
    pub owning_users: Vec<UserId>,
}

impl Pack for Family {
    fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError> {
        buf.version(1)?;
        buf.field(&mut self.id)?;
        buf.field(&mut self.name)?;
        buf.field(&mut self.owning_users)
    }
}

impl_record!(Family, FamilyId);

impl Family {
    /// Creates an unsaved family owned by `owner`.
    pub fn new(name: impl Into<String>, owner: UserId) -> Self {
        Self { id: FamilyId::UNASSIGNED, name: name.into(), owning_users: vec![owner] }
    }

    /// Whether `user` manages this family.
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owning_users.contains(&user)
    }

    /// Adds `user` as an owner; returns `false` if already one.
    pub fn add_owner(&mut self, user: UserId) -> bool {
        if self.is_owned_by(user) {
            return false;
        }
        self.owning_users.push(user);
        true
    }

    /// Removes `user` from the owners; returns `false` if not one.
    pub fn remove_owner(&mut self, user: UserId) -> bool {
        let before = self.owning_users.len();
        self.owning_users.retain(|owner| *owner != user);
        self.owning_users.len() != before
    }
}
