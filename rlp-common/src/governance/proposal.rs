//! Proposal lifecycle
//!
//! Status moves forward only:
//!
//! ```text
//! draft → submitted → active_voting → approved → funded → completed
//!                                   ↘ rejected
//! ```
//!
//! Draft, submitted and active_voting proposals may also be cancelled.
//! Cancellation is a soft flag; nothing is deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::funding::funding_percentage;
use super::voting::{evaluate, is_voting_active, ProposalResults, VoteTally};

/// Proposal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Draft,
    Submitted,
    ActiveVoting,
    Approved,
    Rejected,
    Funded,
    Completed,
    Cancelled,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Draft => "draft",
            ProposalStatus::Submitted => "submitted",
            ProposalStatus::ActiveVoting => "active_voting",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Funded => "funded",
            ProposalStatus::Completed => "completed",
            ProposalStatus::Cancelled => "cancelled",
        }
    }

    /// Whether `next` is a legal successor of this status
    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Submitted, ActiveVoting)
                | (ActiveVoting, Approved)
                | (ActiveVoting, Rejected)
                | (Approved, Funded)
                | (Funded, Completed)
                | (Draft, Cancelled)
                | (Submitted, Cancelled)
                | (ActiveVoting, Cancelled)
        )
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ProposalStatus::Draft),
            "submitted" => Ok(ProposalStatus::Submitted),
            "active_voting" => Ok(ProposalStatus::ActiveVoting),
            "approved" => Ok(ProposalStatus::Approved),
            "rejected" => Ok(ProposalStatus::Rejected),
            "funded" => Ok(ProposalStatus::Funded),
            "completed" => Ok(ProposalStatus::Completed),
            "cancelled" => Ok(ProposalStatus::Cancelled),
            other => Err(format!("Unknown proposal status: {}", other)),
        }
    }
}

/// What the requested funds are for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalCategory {
    StudioEquipment,
    ArtistFunding,
    Marketing,
    Event,
    Release,
    Community,
    Other,
}

impl ProposalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalCategory::StudioEquipment => "studio_equipment",
            ProposalCategory::ArtistFunding => "artist_funding",
            ProposalCategory::Marketing => "marketing",
            ProposalCategory::Event => "event",
            ProposalCategory::Release => "release",
            ProposalCategory::Community => "community",
            ProposalCategory::Other => "other",
        }
    }
}

impl fmt::Display for ProposalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "studio_equipment" => Ok(ProposalCategory::StudioEquipment),
            "artist_funding" => Ok(ProposalCategory::ArtistFunding),
            "marketing" => Ok(ProposalCategory::Marketing),
            "event" => Ok(ProposalCategory::Event),
            "release" => Ok(ProposalCategory::Release),
            "community" => Ok(ProposalCategory::Community),
            "other" => Ok(ProposalCategory::Other),
            other => Err(format!("Unknown proposal category: {}", other)),
        }
    }
}

/// A funding proposal (`dao_proposals` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: ProposalCategory,
    /// Normalized (lowercase) wallet of the proposing member
    pub proposer_wallet: String,
    pub funding_goal_cents: i64,
    pub current_funding_cents: i64,
    pub status: ProposalStatus,
    /// Minimum total cast weight (for + against + abstain) for a valid result
    pub quorum_weight: i64,
    /// Percent of for/(for+against) weight required to pass
    pub approval_threshold: i64,
    pub voting_duration_days: i64,
    pub votes_for_weight: i64,
    pub votes_against_weight: i64,
    pub votes_abstain_weight: i64,
    pub voter_count: i64,
    pub voting_starts_at: Option<DateTime<Utc>>,
    pub voting_ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    /// Voting is open at `now`
    pub fn is_voting_active(&self, now: DateTime<Utc>) -> bool {
        match self.voting_ends_at {
            Some(ends_at) => {
                let started = self.voting_starts_at.map_or(true, |s| s <= now);
                started && is_voting_active(ends_at, self.status, now)
            }
            None => false,
        }
    }

    /// Voting window has elapsed while still in active_voting
    pub fn voting_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ProposalStatus::ActiveVoting
            && self.voting_ends_at.is_some_and(|ends_at| ends_at <= now)
    }

    /// Running tally stored on the proposal row
    pub fn tally(&self) -> VoteTally {
        VoteTally {
            for_weight: self.votes_for_weight,
            against_weight: self.votes_against_weight,
            abstain_weight: self.votes_abstain_weight,
            voter_count: self.voter_count,
        }
    }

    /// Evaluate the current tally against this proposal's quorum and threshold
    pub fn results(&self) -> ProposalResults {
        evaluate(&self.tally(), self.quorum_weight, self.approval_threshold)
    }

    pub fn funding_percentage(&self) -> f64 {
        funding_percentage(self.current_funding_cents, self.funding_goal_cents)
    }
}
