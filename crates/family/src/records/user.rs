//! Accounts and the tokens issued to them.

use chrono::{DateTime, Utc};
use kinship_types::{FamilyId, Pack, PackBuffer, PackError, UserId};
use serde::{Deserialize, Serialize};

/// Whether an account may sign in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    /// Normal account.
    #[default]
    Active,
    /// Sign-in refused.
    Suspended,
}

pack_enum!(UserStatus { Active = 0, Suspended = 1 });

/// A registered account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Allocated id; user 1 is the administrator.
    pub id: UserId,
    /// Normalized (trimmed, lowercase) email address.
    pub email: String,
    /// Sign-in status.
    pub status: UserStatus,
    /// Last successful sign-in, if any.
    pub last_login: Option<DateTime<Utc>>,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Family shown by default; added in version 2.
    pub primary_family_id: Option<FamilyId>,
}

impl Pack for User {
    fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError> {
        let version = buf.version(2)?;
        buf.field(&mut self.id)?;
        buf.field(&mut self.email)?;
        buf.enumeration(&mut self.status)?;
        buf.field(&mut self.last_login)?;
        buf.field(&mut self.first_name)?;
        buf.field(&mut self.last_name)?;
        if version >= 2 {
            buf.field(&mut self.primary_family_id)?;
        }
        Ok(())
    }
}

impl_record!(User, UserId);

impl User {
    /// Display name, falling back to the email address.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() { self.email.clone() } else { full.to_string() }
    }
}

/// An issued password-reset or refresh token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenGrant {
    /// Account the token acts for.
    pub user_id: UserId,
    /// Instant after which the token is refused.
    pub expires_at: DateTime<Utc>,
}

impl Pack for TokenGrant {
    fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError> {
        buf.version(1)?;
        buf.field(&mut self.user_id)?;
        buf.field(&mut self.expires_at)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use chrono::TimeZone;
    use kinship_types::pack;

    use super::*;

    /// Layout written before `primary_family_id` existed.
    #[derive(Debug, Clone, Default)]
    struct UserV1 {
        id: UserId,
        email: String,
        status: UserStatus,
        last_login: Option<DateTime<Utc>>,
        first_name: String,
        last_name: String,
    }

    impl Pack for UserV1 {
        fn pack(&mut self, buf: &mut PackBuffer<'_>) -> Result<(), PackError> {
            buf.version(1)?;
            buf.field(&mut self.id)?;
            buf.field(&mut self.email)?;
            buf.enumeration(&mut self.status)?;
            buf.field(&mut self.last_login)?;
            buf.field(&mut self.first_name)?;
            buf.field(&mut self.last_name)
        }
    }

    fn sample() -> User {
        User {
            id: UserId::new(7),
            email: "ada@example.com".to_string(),
            status: UserStatus::Suspended,
            last_login: Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).single(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            primary_family_id: Some(FamilyId::new(3)),
        }
    }

    #[test]
    fn test_user_reads_back_equal() {
        let user = sample();
        let bytes = pack::encode(&user).unwrap();
        assert_eq!(pack::decode::<User>(&bytes).unwrap(), user);
    }

    #[test]
    fn test_version_one_bytes_decode_with_default_primary_family() {
        let old = UserV1 {
            id: UserId::new(7),
            email: "ada@example.com".to_string(),
            status: UserStatus::Active,
            last_login: None,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        };
        let bytes = pack::encode(&old).unwrap();

        let user: User = pack::decode(&bytes).unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.last_name, "Lovelace");
        assert_eq!(user.primary_family_id, None);
    }

    #[test]
    fn test_unknown_status_tag_is_rejected() {
        let mut bytes = pack::encode(&sample()).unwrap();
        // version, id, email length + bytes, then the status tag
        let status_at = 1 + 1 + 1 + "ada@example.com".len();
        bytes[status_at] = 9;
        let err = pack::decode::<User>(&bytes).unwrap_err();
        assert!(matches!(err, PackError::InvalidTag { .. }));
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        let mut user = sample();
        assert_eq!(user.display_name(), "Ada Lovelace");
        user.first_name.clear();
        user.last_name.clear();
        assert_eq!(user.display_name(), "ada@example.com");
    }
}
