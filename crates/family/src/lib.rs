//! Family records, queries and authentication for Kinship.
//!
//! [`FamilyDb`] owns the persisted layout: a collection per record type, the
//! indexes that relate them, and the auth buckets. Reads and writes go through
//! caller-supplied transactions so several operations can share one snapshot
//! or commit together:
//!
//! ```no_run
//! use kinship_family::{FamilyDb, records::{Family, Person}};
//! use kinship_types::UserId;
//! # fn main() -> kinship_family::Result<()> {
//! let db = FamilyDb::open_in_memory()?;
//! let family = db.update(|tx| {
//!     let family = db.save_family(tx, &mut Family::new("Lovelace", UserId::new(1)))?;
//!     let mut ada = Person::child(family, "Ada", chrono::Utc::now());
//!     db.save_person(tx, &mut ada)?;
//!     Ok(family)
//! })?;
//! let people = db.read(|tx| db.people_in_family(tx, family, Default::default()))?;
//! assert_eq!(people.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! [`Authenticator`] handles registration, password hashing and tokens;
//! [`growth`] derives ages and growth charts from measurements.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod db;
mod error;
pub mod growth;
mod mutations;
mod queries;
pub mod records;
pub mod telemetry;

pub use auth::{Authenticator, LoginTokens, NewUser, SessionClaims};
pub use db::{FamilyDb, REBUILD_INDEXES_PROCESS, names};
pub use error::{DomainError, Result};
pub use kinship_state::Window;
pub use queries::normalize_email;
