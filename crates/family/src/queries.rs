//! Read queries composing bucket reads with index lookups.
//!
//! Every query takes the transaction to read from, so a caller can combine
//! several queries against one consistent snapshot (or against its own
//! uncommitted writes). Lookups through an index skip targets whose record
//! has since been raw-deleted.

use kinship_state::Window;
use kinship_store::{ReadAccess, StorageBackend};
use kinship_types::{FamilyId, ImageId, PersonId, PostId, UserId};

use crate::{
    db::FamilyDb,
    error::Result,
    records::{Family, Height, Image, Milestone, Person, Post, User, Weight},
};

/// Trims and lowercases an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl<B: StorageBackend> FamilyDb<B> {
    // --- Users ---

    /// The account with `id`.
    ///
    /// # Errors
    ///
    /// Returns a state error if the record cannot be read.
    pub fn user<T: ReadAccess + ?Sized>(&self, tx: &T, id: UserId) -> Result<Option<User>> {
        Ok(self.users.get(tx, &id)?)
    }

    /// The id registered for `email`, compared after normalization.
    ///
    /// # Errors
    ///
    /// Returns a state error if the mapping cannot be read.
    pub fn user_id_by_email<T: ReadAccess + ?Sized>(&self, tx: &T, email: &str) -> Result<Option<UserId>> {
        Ok(self.emails.read(tx, &normalize_email(email))?)
    }

    /// The account registered for `email`.
    ///
    /// # Errors
    ///
    /// Returns a state error if a record cannot be read.
    pub fn user_by_email<T: ReadAccess + ?Sized>(&self, tx: &T, email: &str) -> Result<Option<User>> {
        match self.user_id_by_email(tx, email)? {
            Some(id) => self.user(tx, id),
            None => Ok(None),
        }
    }

    /// Every account in id order.
    ///
    /// # Errors
    ///
    /// Returns a state error if a record cannot be read.
    pub fn all_users<T: ReadAccess + ?Sized>(&self, tx: &T) -> Result<Vec<User>> {
        Ok(self.users.all(tx)?)
    }

    // --- Families ---

    /// The family with `id`.
    ///
    /// # Errors
    ///
    /// Returns a state error if the record cannot be read.
    pub fn family<T: ReadAccess + ?Sized>(&self, tx: &T, id: FamilyId) -> Result<Option<Family>> {
        Ok(self.families.get(tx, &id)?)
    }

    /// Every family in id order.
    ///
    /// # Errors
    ///
    /// Returns a state error if a record cannot be read.
    pub fn all_families<T: ReadAccess + ?Sized>(&self, tx: &T) -> Result<Vec<Family>> {
        Ok(self.families.all(tx)?)
    }

    /// Families `user` owns, in id order.
    ///
    /// # Errors
    ///
    /// Returns a state error if the index or a record cannot be read.
    pub fn families_for_user<T: ReadAccess + ?Sized>(&self, tx: &T, user: UserId) -> Result<Vec<Family>> {
        Ok(self.families.lookup(tx, &self.families_by_owner, &user, Window::all())?)
    }

    // --- People ---

    /// The person with `id`.
    ///
    /// # Errors
    ///
    /// Returns a state error if the record cannot be read.
    pub fn person<T: ReadAccess + ?Sized>(&self, tx: &T, id: PersonId) -> Result<Option<Person>> {
        Ok(self.people.get(tx, &id)?)
    }

    /// Every person in id order.
    ///
    /// # Errors
    ///
    /// Returns a state error if a record cannot be read.
    pub fn all_people<T: ReadAccess + ?Sized>(&self, tx: &T) -> Result<Vec<Person>> {
        Ok(self.people.all(tx)?)
    }

    /// People in `family`, in id order.
    ///
    /// # Errors
    ///
    /// Returns a state error if the index or a record cannot be read.
    pub fn people_in_family<T: ReadAccess + ?Sized>(
        &self,
        tx: &T,
        family: FamilyId,
        window: Window,
    ) -> Result<Vec<Person>> {
        Ok(self.people.lookup(tx, &self.people_by_family, &family, window)?)
    }

    /// Raw index targets for `family`, including entries whose person was
    /// deleted without going through [`FamilyDb::remove_person`].
    ///
    /// # Errors
    ///
    /// Returns a state error if the index cannot be read.
    pub fn person_ids_in_family<T: ReadAccess + ?Sized>(
        &self,
        tx: &T,
        family: FamilyId,
        window: Window,
    ) -> Result<Vec<PersonId>> {
        Ok(self.people_by_family.read_term_targets(tx, &family, window)?)
    }

    /// People in every family `user` owns, grouped by family.
    ///
    /// # Errors
    ///
    /// Returns a state error if an index or a record cannot be read.
    pub fn people_for_user<T: ReadAccess + ?Sized>(&self, tx: &T, user: UserId) -> Result<Vec<Person>> {
        let mut people = Vec::new();
        for family in self.families_for_user(tx, user)? {
            people.extend(self.people_in_family(tx, family.id, Window::all())?);
        }
        Ok(people)
    }

    // --- Images ---

    /// The image with `id`.
    ///
    /// # Errors
    ///
    /// Returns a state error if the record cannot be read.
    pub fn image<T: ReadAccess + ?Sized>(&self, tx: &T, id: ImageId) -> Result<Option<Image>> {
        Ok(self.images.get(tx, &id)?)
    }

    /// Images shared with `family`, in id order.
    ///
    /// # Errors
    ///
    /// Returns a state error if the index or a record cannot be read.
    pub fn images_for_family<T: ReadAccess + ?Sized>(
        &self,
        tx: &T,
        family: FamilyId,
        window: Window,
    ) -> Result<Vec<Image>> {
        Ok(self.images.lookup(tx, &self.images_by_family, &family, window)?)
    }

    // --- Posts and measurements ---

    /// The post with `id`.
    ///
    /// # Errors
    ///
    /// Returns a state error if the record cannot be read.
    pub fn post<T: ReadAccess + ?Sized>(&self, tx: &T, id: PostId) -> Result<Option<Post>> {
        Ok(self.posts.get(tx, &id)?)
    }

    /// Every post in id order.
    ///
    /// # Errors
    ///
    /// Returns a state error if a record cannot be read.
    pub fn all_posts<T: ReadAccess + ?Sized>(&self, tx: &T) -> Result<Vec<Post>> {
        Ok(self.posts.all(tx)?)
    }

    /// Posts about `person`, ordered by entry date.
    ///
    /// # Errors
    ///
    /// Returns a state error if the index or a record cannot be read.
    pub fn posts_for_person<T: ReadAccess + ?Sized>(
        &self,
        tx: &T,
        person: PersonId,
        window: Window,
    ) -> Result<Vec<Post>> {
        Ok(self.posts.lookup(tx, &self.posts_by_person, &person, window)?)
    }

    /// Heights of `person`, ordered by measurement date.
    ///
    /// # Errors
    ///
    /// Returns a state error if the index or a record cannot be read.
    pub fn heights_for_person<T: ReadAccess + ?Sized>(
        &self,
        tx: &T,
        person: PersonId,
        window: Window,
    ) -> Result<Vec<Height>> {
        Ok(self.heights.lookup(tx, &self.heights_by_person, &person, window)?)
    }

    /// Weights of `person`, ordered by measurement date.
    ///
    /// # Errors
    ///
    /// Returns a state error if the index or a record cannot be read.
    pub fn weights_for_person<T: ReadAccess + ?Sized>(
        &self,
        tx: &T,
        person: PersonId,
        window: Window,
    ) -> Result<Vec<Weight>> {
        Ok(self.weights.lookup(tx, &self.weights_by_person, &person, window)?)
    }

    /// Milestones of `person`, ordered by date.
    ///
    /// # Errors
    ///
    /// Returns a state error if the index or a record cannot be read.
    pub fn milestones_for_person<T: ReadAccess + ?Sized>(
        &self,
        tx: &T,
        person: PersonId,
        window: Window,
    ) -> Result<Vec<Milestone>> {
        Ok(self.milestones.lookup(tx, &self.milestones_by_person, &person, window)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }
}
