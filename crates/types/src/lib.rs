//! Core types, key encodings and record codecs for Kinship.
//!
//! This crate provides the foundational pieces shared by the store, the typed
//! state layer and the family domain:
//! - Strongly typed record identifiers (`UserId`, `PersonId`, ...)
//! - Order-preserving key encodings ([`Key`])
//! - The versioned record codec ([`pack`]) used for every stored record
//! - Postcard helpers for internal bookkeeping values ([`codec`])
//! - Configuration structs with validation ([`config`])
//! - Stable error codes ([`ErrorCode`])

pub mod codec;
pub mod config;
pub mod error;
pub mod key;
pub mod pack;
pub mod types;

pub use codec::{CodecError, decode, encode};
pub use error::ErrorCode;
pub use key::{IntKey, Key, KeyKind};
pub use pack::{Pack, PackBuffer, PackEnum, PackError, PackField};
pub use types::*;
