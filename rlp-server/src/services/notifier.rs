//! Fire-and-forget fan-out to Discord and email
//!
//! Each method spawns its delivery and returns immediately. Unconfigured
//! integrations are skipped.

use std::sync::Arc;
use tracing::{debug, warn};

use rlp_common::governance::{Member, Proposal, ProposalResults, Vote};
use rlp_common::studio::StudioSession;

use super::discord::{self, DiscordWebhook, Embed};
use super::email::{self, EmailMessage, ResendClient};

#[derive(Clone, Default)]
pub struct Notifier {
    discord: Option<Arc<DiscordWebhook>>,
    email: Option<Arc<ResendClient>>,
}

impl Notifier {
    pub fn new(discord: Option<DiscordWebhook>, email: Option<ResendClient>) -> Self {
        Self {
            discord: discord.map(Arc::new),
            email: email.map(Arc::new),
        }
    }

    /// No integrations configured
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn discord_enabled(&self) -> bool {
        self.discord.is_some()
    }

    pub fn email_enabled(&self) -> bool {
        self.email.is_some()
    }

    fn post(&self, embed: Embed) {
        let Some(webhook) = self.discord.clone() else {
            debug!(title = %embed.title, "Discord not configured; skipping");
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = webhook.send(&embed).await {
                warn!(title = %embed.title, error = %e, "Discord notification failed");
            }
        });
    }

    fn mail(&self, message: EmailMessage) {
        let Some(client) = self.email.clone() else {
            debug!(subject = %message.subject, "Email not configured; skipping");
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = client.send(&message).await {
                warn!(to = %message.to, subject = %message.subject, error = %e, "Email delivery failed");
            }
        });
    }

    pub fn proposal_submitted(&self, proposal: &Proposal) {
        self.post(discord::proposal_submitted(proposal));
    }

    pub fn voting_opened(&self, proposal: &Proposal) {
        self.post(discord::voting_opened(proposal));
    }

    pub fn voting_closed(&self, proposal: &Proposal, results: &ProposalResults) {
        self.post(discord::voting_closed(proposal, results));
    }

    pub fn funding_reached(&self, proposal: &Proposal) {
        self.post(discord::funding_reached(proposal));
    }

    /// Discord announcement plus a confirmation to the booker
    pub fn booking_created(&self, session: &StudioSession) {
        self.post(discord::booking_created(session));
        self.mail(email::booking_confirmation(session));
    }

    /// Receipt to the voter, when they gave an email address
    pub fn vote_cast(&self, voter: &Member, vote: &Vote, proposal: &Proposal) {
        if let Some(address) = &voter.email {
            self.mail(email::vote_receipt(address, &voter.display_name, vote, proposal));
        }
    }
}
