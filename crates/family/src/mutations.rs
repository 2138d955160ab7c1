//! Record writes and cascading removal.
//!
//! Saves go through the record's collection, so index entries are always
//! re-derived in the same transaction. Removing a person or a family also
//! removes the records that only make sense with it.

use kinship_state::Window;
use kinship_store::{StorageBackend, WriteAccess};
use kinship_types::{FamilyId, HeightId, ImageId, MilestoneId, PersonId, PostId, UserId, WeightId};
use tracing::debug;

use crate::{
    db::FamilyDb,
    error::{DomainError, Result},
    records::{Family, Height, Image, Milestone, Person, Post, Weight},
};

fn require_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DomainError::InvalidArgument { message: format!("{kind} name must not be empty") });
    }
    Ok(())
}

fn require_measurement(kind: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(DomainError::InvalidArgument {
            message: format!("{kind} must be a positive number, got {value}"),
        });
    }
    Ok(())
}

impl<B: StorageBackend> FamilyDb<B> {
    /// Saves `family`, allocating its id if unassigned.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidArgument`] for a blank name.
    pub fn save_family(&self, tx: &mut dyn WriteAccess, family: &mut Family) -> Result<FamilyId> {
        require_name("family", &family.name)?;
        Ok(self.families.upsert(tx, family)?)
    }

    /// Adds `user` to the owners of `family`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if the family does not exist.
    pub fn add_family_owner(&self, tx: &mut dyn WriteAccess, family: FamilyId, user: UserId) -> Result<()> {
        let mut record =
            self.family(&*tx, family)?.ok_or(DomainError::NotFound { kind: "family", id: family.value() })?;
        if record.add_owner(user) {
            self.families.upsert(tx, &mut record)?;
        }
        Ok(())
    }

    /// Makes `family` the default family of `user`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if either record is missing, or
    /// [`DomainError::InvalidArgument`] if `user` does not own `family`.
    pub fn set_primary_family(&self, tx: &mut dyn WriteAccess, user: UserId, family: FamilyId) -> Result<()> {
        let mut account =
            self.user(&*tx, user)?.ok_or(DomainError::NotFound { kind: "user", id: user.value() })?;
        let group =
            self.family(&*tx, family)?.ok_or(DomainError::NotFound { kind: "family", id: family.value() })?;
        if !group.is_owned_by(user) {
            return Err(DomainError::InvalidArgument { message: format!("{user} does not own {family}") });
        }
        account.primary_family_id = Some(family);
        self.users.upsert(tx, &mut account)?;
        Ok(())
    }

    /// Saves `person`, allocating its id if unassigned.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidArgument`] for a blank name.
    pub fn save_person(&self, tx: &mut dyn WriteAccess, person: &mut Person) -> Result<PersonId> {
        require_name("person", &person.name)?;
        Ok(self.people.upsert(tx, person)?)
    }

    /// Saves image metadata.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidArgument`] for a blank file name.
    pub fn save_image(&self, tx: &mut dyn WriteAccess, image: &mut Image) -> Result<ImageId> {
        require_name("image file", &image.filename)?;
        Ok(self.images.upsert(tx, image)?)
    }

    /// Saves a journal post.
    ///
    /// # Errors
    ///
    /// Returns a state error if the write fails.
    pub fn save_post(&self, tx: &mut dyn WriteAccess, post: &mut Post) -> Result<PostId> {
        Ok(self.posts.upsert(tx, post)?)
    }

    /// Saves a height measurement.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidArgument`] unless `inches` is positive.
    pub fn save_height(&self, tx: &mut dyn WriteAccess, height: &mut Height) -> Result<HeightId> {
        require_measurement("height", height.inches)?;
        Ok(self.heights.upsert(tx, height)?)
    }

    /// Saves a weight measurement.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidArgument`] unless `pounds` is positive.
    pub fn save_weight(&self, tx: &mut dyn WriteAccess, weight: &mut Weight) -> Result<WeightId> {
        require_measurement("weight", weight.pounds)?;
        Ok(self.weights.upsert(tx, weight)?)
    }

    /// Saves a milestone.
    ///
    /// # Errors
    ///
    /// Returns a state error if the write fails.
    pub fn save_milestone(&self, tx: &mut dyn WriteAccess, milestone: &mut Milestone) -> Result<MilestoneId> {
        Ok(self.milestones.upsert(tx, milestone)?)
    }

    /// Removes a post.
    ///
    /// # Errors
    ///
    /// Returns a state error if the delete fails.
    pub fn remove_post(&self, tx: &mut dyn WriteAccess, id: PostId) -> Result<Option<Post>> {
        Ok(self.posts.remove(tx, &id)?)
    }

    /// Removes a height measurement.
    ///
    /// # Errors
    ///
    /// Returns a state error if the delete fails.
    pub fn remove_height(&self, tx: &mut dyn WriteAccess, id: HeightId) -> Result<Option<Height>> {
        Ok(self.heights.remove(tx, &id)?)
    }

    /// Removes a weight measurement.
    ///
    /// # Errors
    ///
    /// Returns a state error if the delete fails.
    pub fn remove_weight(&self, tx: &mut dyn WriteAccess, id: WeightId) -> Result<Option<Weight>> {
        Ok(self.weights.remove(tx, &id)?)
    }

    /// Removes a milestone.
    ///
    /// # Errors
    ///
    /// Returns a state error if the delete fails.
    pub fn remove_milestone(&self, tx: &mut dyn WriteAccess, id: MilestoneId) -> Result<Option<Milestone>> {
        Ok(self.milestones.remove(tx, &id)?)
    }

    /// Removes image metadata and clears it from any person using it as a
    /// profile picture.
    ///
    /// # Errors
    ///
    /// Returns a state error if a read or delete fails.
    pub fn remove_image(&self, tx: &mut dyn WriteAccess, id: ImageId) -> Result<Option<Image>> {
        let Some(image) = self.images.remove(tx, &id)? else {
            return Ok(None);
        };
        for mut person in self.all_people(&*tx)? {
            if person.image_id == Some(id) {
                person.image_id = None;
                self.people.upsert(tx, &mut person)?;
            }
        }
        Ok(Some(image))
    }

    /// Removes a person with their posts, measurements, milestones and
    /// profile picture.
    ///
    /// # Errors
    ///
    /// Returns a state error if a read or delete fails; the caller's
    /// transaction should then be dropped.
    pub fn remove_person(&self, tx: &mut dyn WriteAccess, id: PersonId) -> Result<Option<Person>> {
        let posts = self.posts_by_person.read_term_targets(&*tx, &id, Window::all())?;
        let heights = self.heights_by_person.read_term_targets(&*tx, &id, Window::all())?;
        let weights = self.weights_by_person.read_term_targets(&*tx, &id, Window::all())?;
        let milestones = self.milestones_by_person.read_term_targets(&*tx, &id, Window::all())?;

        for post in &posts {
            self.posts.remove(tx, post)?;
        }
        for height in &heights {
            self.heights.remove(tx, height)?;
        }
        for weight in &weights {
            self.weights.remove(tx, weight)?;
        }
        for milestone in &milestones {
            self.milestones.remove(tx, milestone)?;
        }

        let removed = self.people.remove(tx, &id)?;
        if let Some(image) = removed.as_ref().and_then(|person| person.image_id) {
            self.remove_image(tx, image)?;
        }
        debug!(
            person = %id,
            posts = posts.len(),
            heights = heights.len(),
            weights = weights.len(),
            milestones = milestones.len(),
            "Removed person"
        );
        Ok(removed)
    }

    /// Removes a family with all of its people and images. Owners whose
    /// primary family it was are left without one.
    ///
    /// # Errors
    ///
    /// See [`FamilyDb::remove_person`].
    pub fn remove_family(&self, tx: &mut dyn WriteAccess, id: FamilyId) -> Result<Option<Family>> {
        for person in self.person_ids_in_family(&*tx, id, Window::all())? {
            self.remove_person(tx, person)?;
        }
        for image in self.images_by_family.read_term_targets(&*tx, &id, Window::all())? {
            self.remove_image(tx, image)?;
        }
        let removed = self.families.remove(tx, &id)?;
        if let Some(family) = &removed {
            for owner in &family.owning_users {
                let Some(mut account) = self.users.get(&*tx, owner)? else {
                    continue;
                };
                if account.primary_family_id == Some(id) {
                    account.primary_family_id = None;
                    self.users.upsert(tx, &mut account)?;
                }
            }
            debug!(family = %family.id, owners = family.owning_users.len(), "Removed family");
        }
        Ok(removed)
    }
}
