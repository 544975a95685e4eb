//! # RLP Common Library
//!
//! Shared code for the record label platform including:
//! - Governance rules (tiers, vote weights, results, proposal lifecycle)
//! - Treasury ledger math
//! - Studio availability and pricing
//! - Request validation
//! - CSV export
//! - Database bootstrap
//! - Event types (PlatformEvent enum) and SSE helpers
//! - Configuration loading

pub mod config;
pub mod csv;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod governance;
pub mod sse;
pub mod studio;
pub mod time;
pub mod treasury;
pub mod validation;

pub use error::{Error, Result};
pub use governance::{MembershipTier, ProposalStatus, VoteChoice};
