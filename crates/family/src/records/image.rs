//! Uploaded images. Only metadata is stored; files live on disk.

use kinship_types::{FamilyId, ImageId, Pack, PackBuffer, PackError, UserId};
use serde::{Deserialize, Serialize};

/// Metadata of an uploaded image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Allocated id.
    pub id: ImageId,
    /// Uploading account.
    pub owner_id: UserId,
    /// Family the image is shared with.
    pub family_id: FamilyId,
    /// Stored file name.
    pub filename: String,
}

impl Pack for Image {
    fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError> {
        buf.version(1)?;
        buf.field(&mut self.id)?;
        buf.field(&mut self.owner_id)?;
        buf.field(&mut self.family_id)?;
        buf.field(&mut self.filename)
    }
}

impl_record!(Image, ImageId);
