//! Governance request payloads and their validation rules

use serde::{Deserialize, Serialize};

use super::proposal::ProposalCategory;
use super::tier::MembershipTier;
use super::voting::VoteChoice;
use crate::validation::{is_valid_email, normalize_wallet, ValidationErrors};

pub const TITLE_MIN: usize = 5;
pub const TITLE_MAX: usize = 200;
pub const DESCRIPTION_MIN: usize = 20;
pub const DESCRIPTION_MAX: usize = 10_000;
/// 10M currency units
pub const FUNDING_GOAL_MAX_CENTS: i64 = 1_000_000_000;
pub const VOTING_DAYS_MIN: i64 = 1;
pub const VOTING_DAYS_MAX: i64 = 30;
pub const DISPLAY_NAME_MIN: usize = 2;
pub const DISPLAY_NAME_MAX: usize = 50;
pub const VOTE_REASON_MAX: usize = 1_000;

fn default_voting_days() -> i64 {
    7
}

fn default_quorum_weight() -> i64 {
    10
}

fn default_approval_threshold() -> i64 {
    50
}

/// Create-proposal payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProposal {
    pub title: String,
    pub description: String,
    pub category: ProposalCategory,
    pub proposer_wallet: String,
    pub funding_goal_cents: i64,
    #[serde(default = "default_voting_days")]
    pub voting_duration_days: i64,
    #[serde(default = "default_quorum_weight")]
    pub quorum_weight: i64,
    #[serde(default = "default_approval_threshold")]
    pub approval_threshold: i64,
    /// Submit immediately instead of saving as draft
    #[serde(default)]
    pub submit: bool,
}

impl NewProposal {
    /// Check all fields; on success the proposer wallet is normalized in place
    pub fn validate(&mut self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check_length("title", &self.title, TITLE_MIN, TITLE_MAX);
        errors.check_length("description", &self.description, DESCRIPTION_MIN, DESCRIPTION_MAX);
        errors.check_range("funding_goal_cents", self.funding_goal_cents, 1, FUNDING_GOAL_MAX_CENTS);
        errors.check_range(
            "voting_duration_days",
            self.voting_duration_days,
            VOTING_DAYS_MIN,
            VOTING_DAYS_MAX,
        );
        errors.check_range("quorum_weight", self.quorum_weight, 1, i64::from(u32::MAX));
        errors.check_range("approval_threshold", self.approval_threshold, 1, 100);

        match normalize_wallet(&self.proposer_wallet) {
            Some(wallet) => self.proposer_wallet = wallet,
            None => errors.add("proposer_wallet", "must be 0x followed by 40 hex digits"),
        }

        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        errors.into_result()
    }
}

/// Join-the-DAO payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMember {
    pub wallet_address: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub tier: MembershipTier,
}

impl NewMember {
    pub fn validate(&mut self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check_length("display_name", &self.display_name, DISPLAY_NAME_MIN, DISPLAY_NAME_MAX);

        if let Some(email) = &self.email {
            if email.trim().is_empty() {
                self.email = None;
            } else if !is_valid_email(email) {
                errors.add("email", "is not a valid email address");
            }
        }

        match normalize_wallet(&self.wallet_address) {
            Some(wallet) => self.wallet_address = wallet,
            None => errors.add("wallet_address", "must be 0x followed by 40 hex digits"),
        }

        self.display_name = self.display_name.trim().to_string();
        self.email = self.email.as_ref().map(|e| e.trim().to_string());
        errors.into_result()
    }
}

/// Cast-vote payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastVote {
    pub voter_wallet: String,
    pub choice: VoteChoice,
    #[serde(default)]
    pub reason: Option<String>,
}

impl CastVote {
    pub fn validate(&mut self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(reason) = &self.reason {
            if reason.trim().is_empty() {
                self.reason = None;
            } else {
                errors.check_length("reason", reason, 1, VOTE_REASON_MAX);
            }
        }

        match normalize_wallet(&self.voter_wallet) {
            Some(wallet) => self.voter_wallet = wallet,
            None => errors.add("voter_wallet", "must be 0x followed by 40 hex digits"),
        }

        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> String {
        format!("0x{}", "C".repeat(40))
    }

    fn proposal() -> NewProposal {
        NewProposal {
            title: "  Summer showcase  ".to_string(),
            description: "Rent the warehouse venue for the label summer showcase night".to_string(),
            category: ProposalCategory::Event,
            proposer_wallet: wallet(),
            funding_goal_cents: 250_000,
            voting_duration_days: 7,
            quorum_weight: 10,
            approval_threshold: 60,
            submit: false,
        }
    }

    #[test]
    fn test_valid_proposal_normalizes() {
        let mut p = proposal();
        p.validate().unwrap();
        assert_eq!(p.title, "Summer showcase");
        assert_eq!(p.proposer_wallet, format!("0x{}", "c".repeat(40)));
    }

    #[test]
    fn test_invalid_proposal_reports_every_field() {
        let mut p = proposal();
        p.title = "Hi".to_string();
        p.description = "short".to_string();
        p.funding_goal_cents = 0;
        p.voting_duration_days = 45;
        p.approval_threshold = 101;
        p.proposer_wallet = "nope".to_string();

        let errors = p.validate().unwrap_err();
        for field in [
            "title",
            "description",
            "funding_goal_cents",
            "voting_duration_days",
            "approval_threshold",
            "proposer_wallet",
        ] {
            assert!(errors.has(field), "expected error on {}", field);
        }
    }

    #[test]
    fn test_funding_goal_upper_bound() {
        let mut p = proposal();
        p.funding_goal_cents = FUNDING_GOAL_MAX_CENTS + 1;
        assert!(p.validate().unwrap_err().has("funding_goal_cents"));
    }

    #[test]
    fn test_proposal_defaults_from_json() {
        let json = serde_json::json!({
            "title": "Mastering budget",
            "description": "Cover mastering costs for the upcoming compilation record",
            "category": "release",
            "proposer_wallet": wallet(),
            "funding_goal_cents": 50_000
        });
        let p: NewProposal = serde_json::from_value(json).unwrap();
        assert_eq!(p.voting_duration_days, 7);
        assert_eq!(p.quorum_weight, 10);
        assert_eq!(p.approval_threshold, 50);
        assert!(!p.submit);
    }

    #[test]
    fn test_member_blank_email_dropped() {
        let mut m = NewMember {
            wallet_address: wallet(),
            display_name: "DJ Lumen".to_string(),
            email: Some("   ".to_string()),
            tier: MembershipTier::Silver,
        };
        m.validate().unwrap();
        assert!(m.email.is_none());
    }

    #[test]
    fn test_member_bad_email() {
        let mut m = NewMember {
            wallet_address: wallet(),
            display_name: "DJ Lumen".to_string(),
            email: Some("lumen-at-label".to_string()),
            tier: MembershipTier::Silver,
        };
        assert!(m.validate().unwrap_err().has("email"));
    }

    #[test]
    fn test_vote_reason_too_long() {
        let mut v = CastVote {
            voter_wallet: wallet(),
            choice: VoteChoice::For,
            reason: Some("x".repeat(VOTE_REASON_MAX + 1)),
        };
        assert!(v.validate().unwrap_err().has("reason"));
    }

    #[test]
    fn test_vote_normalizes_wallet() {
        let mut v = CastVote {
            voter_wallet: wallet(),
            choice: VoteChoice::Against,
            reason: None,
        };
        v.validate().unwrap();
        assert_eq!(v.voter_wallet, wallet().to_ascii_lowercase());
    }
}
