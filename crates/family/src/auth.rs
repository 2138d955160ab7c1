//! Accounts, passwords and tokens.
//!
//! Passwords are stored as argon2id PHC strings in the `password` bucket,
//! separate from the account record. Three kinds of token are issued:
//!
//! - **Session tokens** are stateless: `base64(user_id.expiry)` followed by
//!   `.` and `base64(hmac_sha256(secret, payload))`. Nothing is stored, so
//!   they cannot be revoked before they expire.
//! - **Refresh tokens** are random, stored with an expiry, and consumed on
//!   use. Exchanging one yields a new session and a new refresh token.
//! - **Reset tokens** are random, stored with an expiry, and consumed by
//!   [`Authenticator::reset_password`].
//!
//! Hashing is deliberately slow, so it always happens before the write
//! transaction is opened.

use std::time::Duration;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use kinship_state::Bucket;
use kinship_store::StorageBackend;
use kinship_types::{UserId, config::AuthConfig};
use sha2::Sha256;
use snafu::ResultExt;
use tracing::{debug, info};

use crate::{
    db::FamilyDb,
    error::{ConfigSnafu, DomainError, Result},
    queries::normalize_email,
    records::{TokenGrant, User, UserStatus},
};

type HmacSha256 = Hmac<Sha256>;

/// Registration details for a new account.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    /// Email address; normalized before storage.
    pub email: String,
    /// Plain-text password.
    pub password: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
}

/// Verified contents of a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClaims {
    /// Account the session belongs to.
    pub user_id: UserId,
    /// Instant the session stops being accepted.
    pub expires_at: DateTime<Utc>,
}

/// Tokens handed out by a successful sign-in or refresh.
#[derive(Debug, Clone)]
pub struct LoginTokens {
    /// The signed-in account.
    pub user: User,
    /// Signed session token.
    pub session: String,
    /// Single-use refresh token.
    pub refresh: String,
}

/// Registers users and issues and checks their credentials.
pub struct Authenticator {
    config: AuthConfig,
    argon2: Argon2<'static>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("session_ttl", &self.config.session_ttl)
            .field("refresh_ttl", &self.config.refresh_ttl)
            .field("reset_ttl", &self.config.reset_ttl)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Creates an authenticator from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Config`] if the configuration is invalid, or
    /// [`DomainError::PasswordHash`] if argon2 rejects the cost parameters.
    pub fn new(config: AuthConfig) -> Result<Self> {
        config.validate().context(ConfigSnafu)?;
        let params =
            Params::new(config.argon2_memory_kib, config.argon2_iterations, config.argon2_parallelism, None)
                .map_err(|e| DomainError::PasswordHash { message: e.to_string() })?;
        Ok(Self { argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params), config })
    }

    /// Whether `user` is the administrator.
    pub fn is_admin(user: UserId) -> bool {
        user == UserId::ADMIN
    }

    // --- Registration and passwords ---

    /// Registers a new account.
    ///
    /// # Errors
    ///
    /// - [`DomainError::InvalidArgument`] if the email is not an address
    /// - [`DomainError::PasswordInvalid`] if the password length is outside policy
    /// - [`DomainError::EmailTaken`] if another account uses the email
    pub fn add_user<B: StorageBackend>(&self, db: &FamilyDb<B>, new_user: NewUser) -> Result<User> {
        let email = normalize_email(&new_user.email);
        if !email.contains('@') {
            return Err(DomainError::InvalidArgument { message: format!("{email:?} is not an email address") });
        }
        if db.read(|tx| db.user_id_by_email(tx, &email))?.is_some() {
            return Err(DomainError::EmailTaken { email });
        }
        let hash = self.hash_password(&new_user.password)?;

        let user = db.update(|tx| {
            // Another writer may have registered the address while we hashed.
            if db.emails.has_key(&*tx, &email)? {
                return Err(DomainError::EmailTaken { email: email.clone() });
            }
            let mut user = User {
                email: email.clone(),
                first_name: new_user.first_name.trim().to_string(),
                last_name: new_user.last_name.trim().to_string(),
                ..User::default()
            };
            let id = db.users.upsert(tx, &mut user)?;
            db.passwords.write(tx, &id, &hash)?;
            db.emails.write(tx, &email, &id)?;
            Ok(user)
        })?;
        info!(user_id = user.id.value(), email = %user.email, "Registered user");
        Ok(user)
    }

    /// Replaces the password of `user` after checking the current one.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::BadCredentials`] if `current` does not match, or
    /// [`DomainError::PasswordInvalid`] if `new` is outside policy.
    pub fn change_password<B: StorageBackend>(
        &self,
        db: &FamilyDb<B>,
        user: UserId,
        current: &str,
        new: &str,
    ) -> Result<()> {
        let stored = db.read(|tx| Ok(db.passwords.read(tx, &user)?))?;
        if !stored.is_some_and(|hash| self.verify_password(current, &hash)) {
            return Err(DomainError::BadCredentials);
        }
        let hash = self.hash_password(new)?;
        db.update(|tx| Ok(db.passwords.write(tx, &user, &hash)?))
    }

    /// Issues a password reset token for the account registered as `email`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NoUser`] if no account uses the address.
    pub fn request_password_reset<B: StorageBackend>(&self, db: &FamilyDb<B>, email: &str) -> Result<String> {
        let expires_at = expiry(Utc::now(), self.config.reset_ttl)?;
        let token = random_token();
        db.update(|tx| {
            let user_id = db
                .user_id_by_email(&*tx, email)?
                .ok_or_else(|| DomainError::NoUser { email: normalize_email(email) })?;
            db.reset_tokens.write(tx, &token, &TokenGrant { user_id, expires_at })?;
            debug!(user_id = user_id.value(), "Issued password reset token");
            Ok(())
        })?;
        Ok(token)
    }

    /// Sets a new password using a reset token. The token is consumed even
    /// if it has expired.
    ///
    /// # Errors
    ///
    /// - [`DomainError::PasswordInvalid`] if `new` is outside policy
    /// - [`DomainError::InvalidToken`] if the token is unknown or already used
    /// - [`DomainError::TokenExpired`] if the token has expired
    pub fn reset_password<B: StorageBackend>(&self, db: &FamilyDb<B>, token: &str, new: &str) -> Result<UserId> {
        let hash = self.hash_password(new)?;
        let grant = take_grant(db, &db.reset_tokens, token)?;
        db.update(|tx| Ok(db.passwords.write(tx, &grant.user_id, &hash)?))?;
        info!(user_id = grant.user_id.value(), "Password reset");
        Ok(grant.user_id)
    }

    /// Deletes an account, its credentials and outstanding tokens, and
    /// removes it from the owners of its families.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if the account does not exist.
    pub fn remove_user<B: StorageBackend>(&self, db: &FamilyDb<B>, user: UserId) -> Result<User> {
        let removed = db.update(|tx| {
            let record =
                db.users.remove(tx, &user)?.ok_or(DomainError::NotFound { kind: "user", id: user.value() })?;
            db.passwords.delete(tx, &user)?;
            db.emails.delete(tx, &record.email)?;
            for mut family in db.families_for_user(&*tx, user)? {
                family.remove_owner(user);
                db.families.upsert(tx, &mut family)?;
            }
            for bucket in [&db.refresh_tokens, &db.reset_tokens] {
                let mut stale = Vec::new();
                bucket.iterate_all(&*tx, |token, grant| {
                    if grant.user_id == user {
                        stale.push(token);
                    }
                    true
                })?;
                for token in &stale {
                    bucket.delete(tx, token)?;
                }
            }
            Ok(record)
        })?;
        info!(user_id = user.value(), "Removed user");
        Ok(removed)
    }

    // --- Sign-in ---

    /// Checks credentials and issues session and refresh tokens.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NoUser`] for an unknown email, or
    /// [`DomainError::BadCredentials`] for a wrong password or a suspended
    /// account.
    pub fn authenticate<B: StorageBackend>(
        &self,
        db: &FamilyDb<B>,
        email: &str,
        password: &str,
    ) -> Result<LoginTokens> {
        let (user, hash) = db.read(|tx| {
            let user =
                db.user_by_email(tx, email)?.ok_or_else(|| DomainError::NoUser { email: normalize_email(email) })?;
            let hash = db.passwords.read(tx, &user.id)?;
            Ok((user, hash))
        })?;
        if user.status == UserStatus::Suspended || !hash.is_some_and(|hash| self.verify_password(password, &hash)) {
            return Err(DomainError::BadCredentials);
        }

        let now = Utc::now();
        let refresh = random_token();
        let refresh_grant = TokenGrant { user_id: user.id, expires_at: expiry(now, self.config.refresh_ttl)? };
        let user = db.update(|tx| {
            let mut user = db.user(&*tx, user.id)?.ok_or(DomainError::BadCredentials)?;
            user.last_login = Some(now);
            db.users.upsert(tx, &mut user)?;
            db.refresh_tokens.write(tx, &refresh, &refresh_grant)?;
            Ok(user)
        })?;
        let session = self.issue_session_at(user.id, now)?;
        debug!(user_id = user.id.value(), "Signed in");
        Ok(LoginTokens { user, session, refresh })
    }

    /// Exchanges a refresh token for new tokens. The presented token is
    /// consumed.
    ///
    /// # Errors
    ///
    /// - [`DomainError::InvalidToken`] if the token is unknown or already used
    /// - [`DomainError::TokenExpired`] if the token has expired
    /// - [`DomainError::BadCredentials`] if the account is gone or suspended
    pub fn refresh<B: StorageBackend>(&self, db: &FamilyDb<B>, token: &str) -> Result<LoginTokens> {
        let grant = take_grant(db, &db.refresh_tokens, token)?;
        let now = Utc::now();
        let refresh = random_token();
        let refresh_grant = TokenGrant { user_id: grant.user_id, expires_at: expiry(now, self.config.refresh_ttl)? };
        let user = db.update(|tx| {
            let user = db.user(&*tx, grant.user_id)?.ok_or(DomainError::BadCredentials)?;
            if user.status == UserStatus::Suspended {
                return Err(DomainError::BadCredentials);
            }
            db.refresh_tokens.write(tx, &refresh, &refresh_grant)?;
            Ok(user)
        })?;
        let session = self.issue_session_at(user.id, now)?;
        Ok(LoginTokens { user, session, refresh })
    }

    /// Revokes a refresh token. Unknown tokens are ignored.
    ///
    /// # Errors
    ///
    /// Returns a state error if the store fails.
    pub fn logout<B: StorageBackend>(&self, db: &FamilyDb<B>, refresh_token: &str) -> Result<()> {
        db.update(|tx| {
            db.refresh_tokens.delete(tx, &refresh_token.to_string())?;
            Ok(())
        })
    }

    // --- Session tokens ---

    /// Signs a session token for `user` valid from now.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidArgument`] if the expiry overflows.
    pub fn issue_session(&self, user: UserId) -> Result<String> {
        self.issue_session_at(user, Utc::now())
    }

    /// Signs a session token for `user` valid from `now`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidArgument`] if the expiry overflows.
    pub fn issue_session_at(&self, user: UserId, now: DateTime<Utc>) -> Result<String> {
        let expires_at = expiry(now, self.config.session_ttl)?;
        let payload = format!("{}.{}", user.value(), expires_at.timestamp());
        let signature = self.mac()?.chain_update(payload.as_bytes()).finalize().into_bytes();
        Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(payload), URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Checks the signature and expiry of a session token.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidToken`] for a malformed or badly signed
    /// token, or [`DomainError::TokenExpired`] once it has expired.
    pub fn verify_session(&self, token: &str) -> Result<SessionClaims> {
        self.verify_session_at(token, Utc::now())
    }

    /// Checks a session token as of `now`.
    ///
    /// # Errors
    ///
    /// See [`Authenticator::verify_session`].
    pub fn verify_session_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims> {
        let (payload, signature) = token.split_once('.').ok_or(DomainError::InvalidToken)?;
        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| DomainError::InvalidToken)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| DomainError::InvalidToken)?;
        self.mac()?.chain_update(&payload).verify_slice(&signature).map_err(|_| DomainError::InvalidToken)?;

        let payload = String::from_utf8(payload).map_err(|_| DomainError::InvalidToken)?;
        let (user, expires) = payload.split_once('.').ok_or(DomainError::InvalidToken)?;
        let user_id = UserId::new(user.parse().map_err(|_| DomainError::InvalidToken)?);
        let expires_at = expires
            .parse()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or(DomainError::InvalidToken)?;
        if now >= expires_at {
            return Err(DomainError::TokenExpired);
        }
        Ok(SessionClaims { user_id, expires_at })
    }

    // --- Internals ---

    fn check_password_policy(&self, password: &str) -> Result<()> {
        let (min, max) = (self.config.password_min_len, self.config.password_max_len);
        if !(min..=max).contains(&password.len()) {
            return Err(DomainError::PasswordInvalid { min, max });
        }
        Ok(())
    }

    fn hash_password(&self, password: &str) -> Result<String> {
        self.check_password_policy(password)?;
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| DomainError::PasswordHash { message: e.to_string() })?;
        Ok(hash.to_string())
    }

    fn verify_password(&self, password: &str, stored: &str) -> bool {
        PasswordHash::new(stored).is_ok_and(|hash| self.argon2.verify_password(password.as_bytes(), &hash).is_ok())
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.config.session_secret.as_bytes())
            .map_err(|e| DomainError::SessionKey { message: e.to_string() })
    }
}

/// Removes and returns a stored grant, refusing it if expired.
fn take_grant<B: StorageBackend>(
    db: &FamilyDb<B>,
    bucket: &Bucket<String, TokenGrant>,
    token: &str,
) -> Result<TokenGrant> {
    let token = token.to_string();
    let grant = db.update(|tx| {
        let grant = bucket.read(&*tx, &token)?;
        if grant.is_some() {
            bucket.delete(tx, &token)?;
        }
        Ok(grant)
    })?;
    let grant = grant.ok_or(DomainError::InvalidToken)?;
    if Utc::now() >= grant.expires_at {
        return Err(DomainError::TokenExpired);
    }
    Ok(grant)
}

fn random_token() -> String {
    hex::encode(rand::random::<[u8; 20]>())
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| DomainError::InvalidArgument { message: format!("token lifetime {ttl:?} is too long") })
}
