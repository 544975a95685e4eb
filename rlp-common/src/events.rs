//! Platform events
//!
//! Every state change the API makes is announced on the [`EventBus`]. The
//! `/events` SSE endpoint forwards them to connected clients and the
//! notifier reacts to a subset of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::governance::{MembershipTier, ProposalStatus, VoteChoice};
use crate::studio::{SessionStatus, StudioRoom};
use crate::treasury::TransactionKind;

/// Platform event types, serialized with a `type` tag for SSE clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlatformEvent {
    MemberJoined {
        wallet_address: String,
        display_name: String,
        tier: MembershipTier,
        timestamp: DateTime<Utc>,
    },

    MemberTierChanged {
        wallet_address: String,
        old_tier: MembershipTier,
        new_tier: MembershipTier,
        timestamp: DateTime<Utc>,
    },

    ProposalCreated {
        proposal_id: Uuid,
        title: String,
        status: ProposalStatus,
        timestamp: DateTime<Utc>,
    },

    /// Any lifecycle transition other than creation and voting close
    ProposalStatusChanged {
        proposal_id: Uuid,
        title: String,
        old_status: ProposalStatus,
        new_status: ProposalStatus,
        timestamp: DateTime<Utc>,
    },

    VoteCast {
        proposal_id: Uuid,
        voter_wallet: String,
        choice: VoteChoice,
        weight: i64,
        votes_for_weight: i64,
        votes_against_weight: i64,
        votes_abstain_weight: i64,
        timestamp: DateTime<Utc>,
    },

    VotingClosed {
        proposal_id: Uuid,
        title: String,
        outcome: ProposalStatus,
        approval_percentage: f64,
        quorum_met: bool,
        timestamp: DateTime<Utc>,
    },

    ProposalFunded {
        proposal_id: Uuid,
        title: String,
        amount_cents: i64,
        current_funding_cents: i64,
        funding_goal_cents: i64,
        timestamp: DateTime<Utc>,
    },

    TreasuryTransactionRecorded {
        transaction_id: Uuid,
        kind: TransactionKind,
        amount_cents: i64,
        balance_cents: i64,
        timestamp: DateTime<Utc>,
    },

    StudioSessionBooked {
        session_id: Uuid,
        room: StudioRoom,
        session_date: chrono::NaiveDate,
        start_hour: u32,
        duration_hours: u32,
        booker_name: String,
        total_cents: i64,
        timestamp: DateTime<Utc>,
    },

    StudioSessionStatusChanged {
        session_id: Uuid,
        old_status: SessionStatus,
        new_status: SessionStatus,
        timestamp: DateTime<Utc>,
    },

    RoomPricingUpdated {
        room: StudioRoom,
        hourly_rate_cents: i64,
        half_day_rate_cents: i64,
        full_day_rate_cents: i64,
        timestamp: DateTime<Utc>,
    },

    DigestGenerated {
        digest_id: Uuid,
        week_start: DateTime<Utc>,
        status: String,
        timestamp: DateTime<Utc>,
    },
}

impl PlatformEvent {
    /// SSE `event:` name
    pub fn event_type(&self) -> &'static str {
        match self {
            PlatformEvent::MemberJoined { .. } => "MemberJoined",
            PlatformEvent::MemberTierChanged { .. } => "MemberTierChanged",
            PlatformEvent::ProposalCreated { .. } => "ProposalCreated",
            PlatformEvent::ProposalStatusChanged { .. } => "ProposalStatusChanged",
            PlatformEvent::VoteCast { .. } => "VoteCast",
            PlatformEvent::VotingClosed { .. } => "VotingClosed",
            PlatformEvent::ProposalFunded { .. } => "ProposalFunded",
            PlatformEvent::TreasuryTransactionRecorded { .. } => "TreasuryTransactionRecorded",
            PlatformEvent::StudioSessionBooked { .. } => "StudioSessionBooked",
            PlatformEvent::StudioSessionStatusChanged { .. } => "StudioSessionStatusChanged",
            PlatformEvent::RoomPricingUpdated { .. } => "RoomPricingUpdated",
            PlatformEvent::DigestGenerated { .. } => "DigestGenerated",
        }
    }
}

/// Broadcast channel for [`PlatformEvent`]s
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlatformEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Receive every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.tx.subscribe()
    }

    /// Emit to all subscribers; `Err` when nobody is listening
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlatformEvent,
    ) -> Result<usize, broadcast::error::SendError<PlatformEvent>> {
        self.tx.send(event)
    }

    /// Emit, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: PlatformEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier_event() -> PlatformEvent {
        PlatformEvent::MemberTierChanged {
            wallet_address: format!("0x{}", "1".repeat(40)),
            old_tier: MembershipTier::Bronze,
            new_tier: MembershipTier::Gold,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_serialized_with_type_tag() {
        let json = serde_json::to_value(tier_event()).unwrap();
        assert_eq!(json["type"], "MemberTierChanged");
        assert_eq!(json["new_tier"], "Gold");
        assert_eq!(tier_event().event_type(), "MemberTierChanged");
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(tier_event()).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "MemberTierChanged");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        assert!(bus.emit(tier_event()).is_err());
        // Lossy emit must not panic
        bus.emit_lossy(tier_event());
        assert_eq!(bus.capacity(), 4);
    }
}
