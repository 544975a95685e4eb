//! Vote aggregation and result determination

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::proposal::ProposalStatus;
use super::tier::MembershipTier;

/// Ballot choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    For,
    Against,
    Abstain,
}

impl VoteChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteChoice::For => "for",
            VoteChoice::Against => "against",
            VoteChoice::Abstain => "abstain",
        }
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "for" => Ok(VoteChoice::For),
            "against" => Ok(VoteChoice::Against),
            "abstain" => Ok(VoteChoice::Abstain),
            other => Err(format!("Unknown vote choice: {}", other)),
        }
    }
}

/// A cast vote (`dao_votes` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub voter_wallet: String,
    pub choice: VoteChoice,
    /// Tier at the time the vote was cast
    pub tier: MembershipTier,
    /// Weight frozen at cast time; later tier changes do not re-weight
    pub weight: i64,
    pub reason: Option<String>,
    pub cast_at: DateTime<Utc>,
}

/// Weighted totals per choice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub for_weight: i64,
    pub against_weight: i64,
    pub abstain_weight: i64,
    pub voter_count: i64,
}

impl VoteTally {
    /// Add one ballot
    pub fn record(&mut self, choice: VoteChoice, weight: i64) {
        match choice {
            VoteChoice::For => self.for_weight += weight,
            VoteChoice::Against => self.against_weight += weight,
            VoteChoice::Abstain => self.abstain_weight += weight,
        }
        self.voter_count += 1;
    }

    /// All cast weight, abstentions included
    pub fn total_weight(&self) -> i64 {
        self.for_weight + self.against_weight + self.abstain_weight
    }
}

/// Aggregate a set of votes
pub fn tally(votes: &[Vote]) -> VoteTally {
    let mut tally = VoteTally::default();
    for vote in votes {
        tally.record(vote.choice, vote.weight);
    }
    tally
}

/// Outcome of evaluating a tally
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProposalResults {
    pub tally: VoteTally,
    pub total_weight: i64,
    pub approval_percentage: f64,
    pub quorum_weight: i64,
    pub approval_threshold: i64,
    pub quorum_met: bool,
    pub passed: bool,
}

impl ProposalResults {
    /// Status a proposal moves to when voting closes with this result
    pub fn outcome(&self) -> ProposalStatus {
        if self.passed {
            ProposalStatus::Approved
        } else {
            ProposalStatus::Rejected
        }
    }
}

/// Percent of decisive weight that voted for
///
/// Abstentions are not decisive. Returns 0 when nothing decisive was cast.
pub fn approval_percentage(for_weight: i64, against_weight: i64) -> f64 {
    let decisive = for_weight + against_weight;
    if decisive <= 0 {
        return 0.0;
    }
    for_weight as f64 / decisive as f64 * 100.0
}

/// Open for ballots: in active_voting and the end time is still ahead
pub fn is_voting_active(ends_at: DateTime<Utc>, status: ProposalStatus, now: DateTime<Utc>) -> bool {
    status == ProposalStatus::ActiveVoting && ends_at > now
}

/// Apply quorum and threshold to a tally
///
/// Quorum counts every cast weight; approval counts only for/against.
pub fn evaluate(tally: &VoteTally, quorum_weight: i64, approval_threshold: i64) -> ProposalResults {
    let total_weight = tally.total_weight();
    let approval = approval_percentage(tally.for_weight, tally.against_weight);
    let quorum_met = total_weight >= quorum_weight;
    let passed = quorum_met && approval >= approval_threshold as f64;

    ProposalResults {
        tally: *tally,
        total_weight,
        approval_percentage: approval,
        quorum_weight,
        approval_threshold,
        quorum_met,
        passed,
    }
}
