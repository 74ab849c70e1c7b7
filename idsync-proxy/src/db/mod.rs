//! Database operations
//!
//! Every function takes any SQLite executor so the same query runs against
//! the pool or inside an open transaction.

pub mod attributes;
pub mod entities;
pub mod touches;

pub use attributes::*;
pub use entities::*;
pub use touches::*;

use idsync_common::{Error, Result};
use uuid::Uuid;

fn parse_guid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::InvalidInput(format!("Invalid guid '{}': {}", value, e)))
}
