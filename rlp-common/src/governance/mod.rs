//! DAO governance rules
//!
//! Pure functions and types behind proposals, weighted voting and funding.
//! Persistence lives in rlp-server; nothing here touches the database.

mod funding;
mod inputs;
mod proposal;
mod tier;
mod voting;

pub use funding::{check_contribution, funding_percentage, remaining_funding};
pub use inputs::{
    CastVote, NewMember, NewProposal, DESCRIPTION_MAX, DESCRIPTION_MIN, FUNDING_GOAL_MAX_CENTS,
    TITLE_MAX, TITLE_MIN, VOTING_DAYS_MAX, VOTING_DAYS_MIN,
};
pub use proposal::{Proposal, ProposalCategory, ProposalStatus};
pub use tier::{vote_weight, MembershipTier};
pub use voting::{
    approval_percentage, evaluate, is_voting_active, tally, ProposalResults, Vote, VoteChoice,
    VoteTally,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A DAO member (`dao_members` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub wallet_address: String,
    pub display_name: String,
    pub email: Option<String>,
    pub tier: MembershipTier,
    pub active: bool,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    pub fn vote_weight(&self) -> u32 {
        self.tier.vote_weight()
    }
}
