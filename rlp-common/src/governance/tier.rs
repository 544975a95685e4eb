//! Membership tiers and vote weights

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Membership tier held by a DAO member
///
/// The tier is the only input to a member's vote weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MembershipTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl MembershipTier {
    /// All tiers, lowest first
    pub const ALL: [MembershipTier; 4] = [
        MembershipTier::Bronze,
        MembershipTier::Silver,
        MembershipTier::Gold,
        MembershipTier::Platinum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipTier::Bronze => "Bronze",
            MembershipTier::Silver => "Silver",
            MembershipTier::Gold => "Gold",
            MembershipTier::Platinum => "Platinum",
        }
    }

    /// Multiplier applied to each vote cast by a member of this tier
    pub fn vote_weight(&self) -> u32 {
        vote_weight(*self)
    }
}

/// Vote multiplier lookup
pub fn vote_weight(tier: MembershipTier) -> u32 {
    match tier {
        MembershipTier::Bronze => 1,
        MembershipTier::Silver => 2,
        MembershipTier::Gold => 3,
        MembershipTier::Platinum => 5,
    }
}

impl fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipTier {
    type Err = String;

    /// Case-insensitive parse ("gold", "Gold", "GOLD")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bronze" => Ok(MembershipTier::Bronze),
            "silver" => Ok(MembershipTier::Silver),
            "gold" => Ok(MembershipTier::Gold),
            "platinum" => Ok(MembershipTier::Platinum),
            other => Err(format!("Unknown membership tier: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_weights() {
        assert_eq!(vote_weight(MembershipTier::Bronze), 1);
        assert_eq!(vote_weight(MembershipTier::Silver), 2);
        assert_eq!(vote_weight(MembershipTier::Gold), 3);
        assert_eq!(vote_weight(MembershipTier::Platinum), 5);
    }

    #[test]
    fn test_weights_increase_with_tier() {
        let weights: Vec<u32> = MembershipTier::ALL.iter().map(|t| t.vote_weight()).collect();
        assert!(weights.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("gold".parse::<MembershipTier>().unwrap(), MembershipTier::Gold);
        assert_eq!("PLATINUM".parse::<MembershipTier>().unwrap(), MembershipTier::Platinum);
        assert_eq!(" Silver ".parse::<MembershipTier>().unwrap(), MembershipTier::Silver);
        assert!("diamond".parse::<MembershipTier>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for tier in MembershipTier::ALL {
            assert_eq!(tier.to_string().parse::<MembershipTier>().unwrap(), tier);
        }
    }
}
