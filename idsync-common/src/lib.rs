//! # idsync Common Library
//!
//! Shared code for the identity synchronization proxy:
//! - Directory record model and LDIF block parsing
//! - Registration shape classifier
//! - Database initialization and row models
//! - Configuration loading
//! - Error types

pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod record;

pub use classify::{classify, RegistrationKind};
pub use error::{Error, Result};
pub use record::{parse_ldif, Record};
