//! Background loops: the voting sweeper and the weekly digest schedule
//!
//! Both loops stop when their `CancellationToken` is cancelled.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, Utc, Weekday};
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use rlp_common::config::DigestConfig;
use rlp_common::events::{EventBus, PlatformEvent};
use rlp_common::governance::{Proposal, ProposalResults, ProposalStatus};
use rlp_common::{time, Error, Result};

use super::digest::DigestService;
use super::Notifier;
use crate::db;

/// Fires once a week at a fixed UTC weekday and time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyCadence {
    weekday: Weekday,
    target: NaiveTime,
}

impl WeeklyCadence {
    pub fn new(weekday: Weekday, hour: u32, minute: u32) -> Result<Self> {
        let target = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| Error::Config(format!("invalid digest time {:02}:{:02}", hour, minute)))?;
        Ok(Self { weekday, target })
    }

    pub fn from_config(config: &DigestConfig) -> Result<Self> {
        let weekday: Weekday = config
            .weekday
            .parse()
            .map_err(|_| Error::Config(format!("invalid digest weekday '{}'", config.weekday)))?;
        Self::new(weekday, config.hour, config.minute)
    }

    /// First trigger at or after `now`
    pub fn next_run_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let ahead = (7 + self.weekday.num_days_from_monday() as i64
            - now.weekday().num_days_from_monday() as i64)
            % 7;
        let candidate = (now.date_naive() + ChronoDuration::days(ahead))
            .and_time(self.target)
            .and_utc();
        if candidate < now {
            candidate + ChronoDuration::days(7)
        } else {
            candidate
        }
    }
}

fn duration_until(next: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Generate the previous week's digest on every cadence tick
pub fn spawn_digest_scheduler(
    digests: DigestService,
    cadence: WeeklyCadence,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = cadence.next_run_from(now);
            let wait = duration_until(next, now);
            info!(
                next_run_utc = %next.to_rfc3339(),
                wait_seconds = wait.as_secs(),
                "Scheduled weekly digest"
            );

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Digest scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let week_start = time::previous_week_start(time::now());
            match digests.generate(week_start).await {
                Ok(digest) => info!(digest_id = %digest.id, week_start = %week_start, "Weekly digest completed"),
                Err(e) => error!(week_start = %week_start, error = %e, "Weekly digest failed"),
            }

            // Step past the trigger so the same tick cannot fire twice
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    })
}

/// Close voting on a proposal, then broadcast and notify the result
pub async fn close_and_announce(
    pool: &SqlitePool,
    event_bus: &EventBus,
    notifier: &Notifier,
    id: Uuid,
) -> Result<(Proposal, ProposalResults)> {
    let now = time::now();
    let (proposal, results) = db::proposals::close_voting(pool, id, now).await?;

    info!(
        proposal_id = %id,
        outcome = %proposal.status,
        approval = results.approval_percentage,
        quorum_met = results.quorum_met,
        "Voting closed"
    );
    event_bus.emit_lossy(PlatformEvent::VotingClosed {
        proposal_id: id,
        title: proposal.title.clone(),
        outcome: proposal.status,
        approval_percentage: results.approval_percentage,
        quorum_met: results.quorum_met,
        timestamp: now,
    });
    event_bus.emit_lossy(PlatformEvent::ProposalStatusChanged {
        proposal_id: id,
        title: proposal.title.clone(),
        old_status: ProposalStatus::ActiveVoting,
        new_status: proposal.status,
        timestamp: now,
    });
    notifier.voting_closed(&proposal, &results);

    Ok((proposal, results))
}

/// Close every proposal whose voting window has ended; returns how many closed
pub async fn sweep_expired(pool: &SqlitePool, event_bus: &EventBus, notifier: &Notifier) -> Result<usize> {
    let expired = db::proposals::expired_voting(pool, time::now()).await?;
    let mut closed = 0;
    for id in expired {
        match close_and_announce(pool, event_bus, notifier, id).await {
            Ok(_) => closed += 1,
            // Closed manually between the scan and now
            Err(Error::Conflict(msg)) => debug!(proposal_id = %id, "Skipping sweep: {}", msg),
            Err(e) => warn!(proposal_id = %id, error = %e, "Failed to close expired proposal"),
        }
    }
    Ok(closed)
}

/// Run [`sweep_expired`] every `interval`
pub fn spawn_voting_sweeper(
    pool: SqlitePool,
    event_bus: EventBus,
    notifier: Notifier,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Voting sweeper started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Voting sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }
            match sweep_expired(&pool, &event_bus, &notifier).await {
                Ok(0) => {}
                Ok(n) => info!(closed = n, "Closed expired proposals"),
                Err(e) => error!(error = %e, "Voting sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_utc(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    fn monday_nine() -> WeeklyCadence {
        WeeklyCadence::new(Weekday::Mon, 9, 0).unwrap()
    }

    #[test]
    fn next_run_later_same_day() {
        // 2026-03-02 is a Monday
        let now = parse_utc("2026-03-02T08:15:00Z");
        assert_eq!(monday_nine().next_run_from(now), parse_utc("2026-03-02T09:00:00Z"));
    }

    #[test]
    fn next_run_next_week_when_past_trigger() {
        let now = parse_utc("2026-03-02T09:00:01Z");
        assert_eq!(monday_nine().next_run_from(now), parse_utc("2026-03-09T09:00:00Z"));
    }

    #[test]
    fn next_run_immediate_when_exact_trigger() {
        let now = parse_utc("2026-03-02T09:00:00Z");
        assert_eq!(monday_nine().next_run_from(now), now);
    }

    #[test]
    fn next_run_from_midweek() {
        let now = parse_utc("2026-03-05T20:00:00Z");
        assert_eq!(monday_nine().next_run_from(now), parse_utc("2026-03-09T09:00:00Z"));
        let friday = WeeklyCadence::new(Weekday::Fri, 17, 30).unwrap();
        assert_eq!(friday.next_run_from(now), parse_utc("2026-03-06T17:30:00Z"));
    }

    #[test]
    fn cadence_from_config() {
        let config = DigestConfig {
            weekday: "friday".to_string(),
            hour: 18,
            ..Default::default()
        };
        let cadence = WeeklyCadence::from_config(&config).unwrap();
        assert_eq!(cadence, WeeklyCadence::new(Weekday::Fri, 18, 0).unwrap());

        let bad = DigestConfig {
            weekday: "someday".to_string(),
            ..Default::default()
        };
        assert!(WeeklyCadence::from_config(&bad).is_err());
        assert!(WeeklyCadence::new(Weekday::Mon, 24, 0).is_err());
    }
}
