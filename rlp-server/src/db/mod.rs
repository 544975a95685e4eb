//! Data access for rlp-server
//!
//! Each multi-step operation (casting a vote, closing voting, funding,
//! booking) runs inside one sqlx transaction so the checks and writes it
//! performs are atomic. Functions return `rlp_common::Result`; handlers
//! convert to HTTP errors.

pub mod digests;
pub mod members;
pub mod proposals;
pub mod studio;
pub mod treasury;
pub mod votes;

use chrono::{DateTime, Utc};
use rlp_common::{time, Error, Result};
use std::str::FromStr;
use uuid::Uuid;

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Invalid stored id '{}': {}", value, e)))
}

/// Parse a stored enum column
pub(crate) fn parse_column<T>(value: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    value.parse().map_err(Error::Internal)
}

pub(crate) fn parse_optional_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(time::parse_db).transpose()
}

/// One page of a listing plus the unpaged total
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}
