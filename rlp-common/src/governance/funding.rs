//! Funding progress for approved proposals

use crate::{Error, Result};

/// Percent of the goal raised, clamped to 0..=100
///
/// A non-positive goal yields 0.
pub fn funding_percentage(current_cents: i64, goal_cents: i64) -> f64 {
    if goal_cents <= 0 {
        return 0.0;
    }
    (current_cents as f64 / goal_cents as f64 * 100.0).clamp(0.0, 100.0)
}

/// Amount still needed to reach the goal
pub fn remaining_funding(current_cents: i64, goal_cents: i64) -> i64 {
    (goal_cents - current_cents).max(0)
}

/// Validate a contribution; funding may never exceed the goal
pub fn check_contribution(current_cents: i64, goal_cents: i64, amount_cents: i64) -> Result<()> {
    if amount_cents <= 0 {
        return Err(Error::InvalidInput(
            "Contribution amount must be positive".to_string(),
        ));
    }
    let remaining = remaining_funding(current_cents, goal_cents);
    if amount_cents > remaining {
        return Err(Error::Conflict(format!(
            "Contribution of {} exceeds remaining goal of {}",
            amount_cents, remaining
        )));
    }
    Ok(())
}
