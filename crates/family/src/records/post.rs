//! Journal posts.

use chrono::{DateTime, Utc};
use kinship_types::{Pack, PackBuffer, PackError, PersonId, PostId};
use serde::{Deserialize, Serialize};

/// A dated journal entry about a person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Allocated id.
    pub id: PostId,
    /// Person the entry is about.
    pub person_id: PersonId,
    /// Date the entry describes.
    pub entry_date: DateTime<Utc>,
    /// Entry text.
    pub content: String,
}

impl Pack for Post {
    fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError> {
        buf.version(1)?;
        buf.field(&mut self.id)?;
        buf.field(&mut self.person_id)?;
        buf.field(&mut self.entry_date)?;
        buf.field(&mut self.content)
    }
}

impl_record!(Post, PostId);
