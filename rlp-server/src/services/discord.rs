//! Discord webhook notifications

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use rlp_common::csv::format_cents;
use rlp_common::governance::{Proposal, ProposalResults, ProposalStatus};
use rlp_common::studio::StudioSession;

use super::{http_client, rate_limiter, DirectRateLimiter};

pub const COLOR_INFO: u32 = 0x5865F2;
pub const COLOR_SUCCESS: u32 = 0x57F287;
pub const COLOR_FAILURE: u32 = 0xED4245;
pub const COLOR_STUDIO: u32 = 0xFEE75C;

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Webhook rejected message ({0}): {1}")]
    Rejected(u16, String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new(title: impl Into<String>, description: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            color,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.to_string(),
            value: value.into(),
            inline: true,
        });
        self
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    username: &'a str,
    embeds: [&'a Embed; 1],
}

/// Discord caps embed descriptions at 4096 characters
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max - 1).collect();
    out.push('…');
    out
}

pub fn proposal_submitted(proposal: &Proposal) -> Embed {
    Embed::new(
        format!("New proposal: {}", proposal.title),
        truncate(&proposal.description, 300),
        COLOR_INFO,
    )
    .field("Category", proposal.category.as_str())
    .field("Goal", format_cents(proposal.funding_goal_cents))
    .field("Proposer", &proposal.proposer_wallet)
}

pub fn voting_opened(proposal: &Proposal) -> Embed {
    let ends = proposal
        .voting_ends_at
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    Embed::new(
        format!("Voting open: {}", proposal.title),
        "Members can now cast weighted votes.",
        COLOR_INFO,
    )
    .field("Ends", ends)
    .field("Quorum weight", proposal.quorum_weight.to_string())
    .field("Approval threshold", format!("{}%", proposal.approval_threshold))
}

pub fn voting_closed(proposal: &Proposal, results: &ProposalResults) -> Embed {
    let (verdict, color) = match results.outcome() {
        ProposalStatus::Approved => ("approved", COLOR_SUCCESS),
        _ => ("rejected", COLOR_FAILURE),
    };
    let reason = if results.quorum_met {
        format!("{:.1}% approval", results.approval_percentage)
    } else {
        format!(
            "quorum not met ({} of {} weight)",
            results.total_weight, results.quorum_weight
        )
    };
    Embed::new(
        format!("Proposal {}: {}", verdict, proposal.title),
        reason,
        color,
    )
    .field("For", results.tally.for_weight.to_string())
    .field("Against", results.tally.against_weight.to_string())
    .field("Abstain", results.tally.abstain_weight.to_string())
    .field("Voters", results.tally.voter_count.to_string())
}

pub fn funding_reached(proposal: &Proposal) -> Embed {
    Embed::new(
        format!("Fully funded: {}", proposal.title),
        format!(
            "The treasury has paid out the full {} goal.",
            format_cents(proposal.funding_goal_cents)
        ),
        COLOR_SUCCESS,
    )
}

pub fn booking_created(session: &StudioSession) -> Embed {
    let who = session
        .artist_name
        .clone()
        .unwrap_or_else(|| session.booker_name.clone());
    Embed::new(
        format!("Studio booked: {}", session.room.display_name()),
        format!(
            "{} on {} {:02}:00-{:02}:00",
            who,
            session.session_date,
            session.start_hour,
            session.end_hour()
        ),
        COLOR_STUDIO,
    )
    .field("Hours", session.duration_hours.to_string())
    .field("Total", format_cents(session.total_cents))
}

pub struct DiscordWebhook {
    http: reqwest::Client,
    url: String,
    limiter: DirectRateLimiter,
}

impl DiscordWebhook {
    pub fn new(url: String) -> Result<Self, DiscordError> {
        Ok(Self {
            http: http_client(Duration::from_secs(10)).map_err(|e| DiscordError::Network(e.to_string()))?,
            url,
            // Discord allows ~30 webhook messages per minute
            limiter: rate_limiter(1),
        })
    }

    pub async fn send(&self, embed: &Embed) -> Result<(), DiscordError> {
        self.limiter.until_ready().await;

        let payload = WebhookPayload {
            username: "Label DAO",
            embeds: [embed],
        };
        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DiscordError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiscordError::Rejected(status.as_u16(), body));
        }
        debug!(title = %embed.title, "Discord notification delivered");
        Ok(())
    }
}
