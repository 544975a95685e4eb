//! Weekly AI digest generation
//!
//! Stats for a Monday-to-Monday UTC window are gathered from the database,
//! turned into a prompt, and written up by the chat-completion API. Without
//! an API key (or when every attempt fails) a plain-text digest is rendered
//! from the stats instead, so a row is always stored. Narration runs in the
//! background after the text is saved.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use rlp_common::csv::format_cents;
use rlp_common::events::{EventBus, PlatformEvent};
use rlp_common::{time, Result};

use super::openai::OpenAiClient;
use super::playht::PlayHtClient;
use crate::db::{self, digests::Digest, digests::DigestStatus};

const SYSTEM_PROMPT: &str = "You write the weekly community digest for an independent record \
label run as a DAO. Be warm and concise. Use short paragraphs, no markdown headings, and only \
the numbers you are given.";

/// Activity totals for one digest window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyStats {
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub proposals_created: i64,
    pub proposals_approved: i64,
    pub proposals_rejected: i64,
    pub votes_cast: i64,
    pub vote_weight: i64,
    pub treasury_inflow_cents: i64,
    pub treasury_outflow_cents: i64,
    pub treasury_balance_cents: i64,
    pub sessions_booked: i64,
    pub hours_booked: i64,
}

impl WeeklyStats {
    pub fn is_quiet(&self) -> bool {
        self.proposals_created == 0
            && self.proposals_approved == 0
            && self.proposals_rejected == 0
            && self.votes_cast == 0
            && self.treasury_inflow_cents == 0
            && self.treasury_outflow_cents == 0
            && self.sessions_booked == 0
    }
}

/// Gather stats for `[week_start, week_start + 7 days)`
pub async fn collect_stats(pool: &SqlitePool, week_start: DateTime<Utc>) -> Result<WeeklyStats> {
    let week_end = week_start + Duration::days(7);

    let activity = db::proposals::activity_between(pool, week_start, week_end).await?;
    let (votes_cast, vote_weight) = db::votes::votes_between(pool, week_start, week_end).await?;
    let (inflow, outflow) = db::treasury::flow_between(pool, week_start, week_end).await?;
    let balance = db::treasury::balance(pool).await?;
    let (sessions, hours) = db::studio::bookings_between(pool, week_start, week_end).await?;

    Ok(WeeklyStats {
        week_start,
        week_end,
        proposals_created: activity.created,
        proposals_approved: activity.approved,
        proposals_rejected: activity.rejected,
        votes_cast,
        vote_weight,
        treasury_inflow_cents: inflow,
        treasury_outflow_cents: outflow,
        treasury_balance_cents: balance,
        sessions_booked: sessions,
        hours_booked: hours,
    })
}

pub fn digest_title(week_start: DateTime<Utc>) -> String {
    format!("Week of {}", week_start.format("%B %-d, %Y"))
}

fn stat_lines(stats: &WeeklyStats) -> Vec<String> {
    vec![
        format!("New proposals: {}", stats.proposals_created),
        format!(
            "Votes closed: {} approved, {} rejected",
            stats.proposals_approved, stats.proposals_rejected
        ),
        format!(
            "Ballots cast: {} (total weight {})",
            stats.votes_cast, stats.vote_weight
        ),
        format!(
            "Treasury: +{} in, -{} out, balance {}",
            format_cents(stats.treasury_inflow_cents),
            format_cents(stats.treasury_outflow_cents),
            format_cents(stats.treasury_balance_cents)
        ),
        format!(
            "Studio: {} sessions booked, {} hours",
            stats.sessions_booked, stats.hours_booked
        ),
    ]
}

pub fn build_prompt(stats: &WeeklyStats) -> String {
    let mut prompt = format!(
        "Write the digest for the week of {} to {}.\n\nThis week's numbers:\n",
        stats.week_start.format("%Y-%m-%d"),
        (stats.week_end - Duration::days(1)).format("%Y-%m-%d"),
    );
    for line in stat_lines(stats) {
        prompt.push_str("- ");
        prompt.push_str(&line);
        prompt.push('\n');
    }
    if stats.is_quiet() {
        prompt.push_str("\nIt was a quiet week; keep it to two sentences.\n");
    } else {
        prompt.push_str("\nEnd with one line inviting members to vote or book the studio.\n");
    }
    prompt
}

/// Plain digest used when no model is available
pub fn fallback_digest(stats: &WeeklyStats) -> String {
    let mut text = format!(
        "{}\n\n",
        if stats.is_quiet() {
            "A quiet week at the label."
        } else {
            "Here is what happened at the label this week."
        }
    );
    for line in stat_lines(stats) {
        text.push_str(&line);
        text.push('\n');
    }
    text
}

/// Generates, stores and narrates digests
#[derive(Clone)]
pub struct DigestService {
    db: SqlitePool,
    event_bus: EventBus,
    openai: Option<Arc<OpenAiClient>>,
    playht: Option<Arc<PlayHtClient>>,
    narrate: bool,
}

impl DigestService {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        openai: Option<OpenAiClient>,
        playht: Option<PlayHtClient>,
        narrate: bool,
    ) -> Self {
        Self {
            db,
            event_bus,
            openai: openai.map(Arc::new),
            playht: playht.map(Arc::new),
            narrate,
        }
    }

    /// Generate (or regenerate) the digest for the week starting `week_start`
    pub async fn generate(&self, week_start: DateTime<Utc>) -> Result<Digest> {
        let week_start = time::week_start(week_start);
        let stats = collect_stats(&self.db, week_start).await?;

        let (content, model, status, error) = match &self.openai {
            Some(client) => match client.complete(SYSTEM_PROMPT, &build_prompt(&stats)).await {
                Ok(text) => (text, Some(client.model().to_string()), DigestStatus::Generated, None),
                Err(e) => {
                    warn!(week_start = %week_start, error = %e, "Digest generation failed; storing fallback");
                    (fallback_digest(&stats), None, DigestStatus::Failed, Some(e.to_string()))
                }
            },
            None => (fallback_digest(&stats), None, DigestStatus::Generated, None),
        };

        let stats_json = serde_json::to_value(&stats)
            .map_err(|e| rlp_common::Error::Internal(format!("Serialize digest stats failed: {}", e)))?;
        let now = time::now();
        let digest = db::digests::upsert_digest(
            &self.db,
            &Digest {
                id: Uuid::new_v4(),
                week_start,
                week_end: stats.week_end,
                title: digest_title(week_start),
                content,
                stats: stats_json,
                model,
                audio_url: None,
                status,
                error,
                created_at: now,
                updated_at: now,
            },
        )
        .await?;

        info!(digest_id = %digest.id, week_start = %week_start, status = %digest.status, "Digest stored");
        self.event_bus.emit_lossy(PlatformEvent::DigestGenerated {
            digest_id: digest.id,
            week_start,
            status: digest.status.to_string(),
            timestamp: now,
        });

        if self.narrate && digest.status == DigestStatus::Generated {
            self.spawn_narration(&digest);
        }
        Ok(digest)
    }

    fn spawn_narration(&self, digest: &Digest) {
        let Some(playht) = self.playht.clone() else {
            return;
        };
        let service = self.clone();
        let (id, week_start, generated_at) = (digest.id, digest.week_start, digest.updated_at);
        let text = format!("{}.\n\n{}", digest.title, digest.content);

        tokio::spawn(async move {
            let (audio_url, status, error) = match playht.narrate(&text).await {
                Ok(url) => (Some(url), DigestStatus::Narrated, None),
                Err(e) => {
                    warn!(digest_id = %id, error = %e, "Narration failed");
                    (None, DigestStatus::Generated, Some(e.to_string()))
                }
            };
            let now = time::now();
            match db::digests::set_narration(
                &service.db,
                id,
                generated_at,
                audio_url.as_deref(),
                status,
                error.as_deref(),
                now,
            )
            .await
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!(digest_id = %id, "Digest regenerated during narration; result dropped");
                    return;
                }
                Err(e) => {
                    warn!(digest_id = %id, error = %e, "Failed to store narration result");
                    return;
                }
            }
            if status == DigestStatus::Narrated {
                service.event_bus.emit_lossy(PlatformEvent::DigestGenerated {
                    digest_id: id,
                    week_start,
                    status: status.to_string(),
                    timestamp: now,
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::playht::PollSettings;
    use crate::services::retry::RetryConfig;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stats() -> WeeklyStats {
        let week_start = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        WeeklyStats {
            week_start,
            week_end: week_start + Duration::days(7),
            proposals_created: 2,
            proposals_approved: 1,
            proposals_rejected: 0,
            votes_cast: 6,
            vote_weight: 14,
            treasury_inflow_cents: 50_000,
            treasury_outflow_cents: 12_550,
            treasury_balance_cents: 137_450,
            sessions_booked: 3,
            hours_booked: 10,
        }
    }

    #[test]
    fn test_prompt_includes_window_and_numbers() {
        let prompt = build_prompt(&stats());
        assert!(prompt.contains("2026-03-02 to 2026-03-08"));
        assert!(prompt.contains("Ballots cast: 6 (total weight 14)"));
        assert!(prompt.contains("+500.00 in, -125.50 out, balance 1374.50"));
        assert!(prompt.contains("inviting members"));
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let a = fallback_digest(&stats());
        let b = fallback_digest(&stats());
        assert_eq!(a, b);
        assert!(a.starts_with("Here is what happened"));
        assert!(a.contains("Studio: 3 sessions booked, 10 hours"));
    }

    #[test]
    fn test_quiet_week() {
        let start = stats().week_start;
        let quiet = WeeklyStats {
            week_start: start,
            week_end: start + Duration::days(7),
            proposals_created: 0,
            proposals_approved: 0,
            proposals_rejected: 0,
            votes_cast: 0,
            vote_weight: 0,
            treasury_inflow_cents: 0,
            treasury_outflow_cents: 0,
            treasury_balance_cents: 1_000,
            sessions_booked: 0,
            hours_booked: 0,
        };
        assert!(quiet.is_quiet());
        assert!(fallback_digest(&quiet).starts_with("A quiet week"));
        assert!(build_prompt(&quiet).contains("two sentences"));
    }

    #[test]
    fn test_title() {
        assert_eq!(digest_title(stats().week_start), "Week of March 2, 2026");
    }

    #[tokio::test]
    async fn test_generate_without_model_stores_fallback() {
        let pool = rlp_common::db::init_memory_database().await.unwrap();
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let service = DigestService::new(pool.clone(), bus, None, None, true);

        let week = Utc.with_ymd_and_hms(2026, 3, 4, 15, 30, 0).unwrap();
        let digest = service.generate(week).await.unwrap();
        assert_eq!(digest.week_start, Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap());
        assert_eq!(digest.status, DigestStatus::Generated);
        assert!(digest.model.is_none());
        assert!(digest.content.starts_with("A quiet week"));
        assert_eq!(digest.stats["votes_cast"], 0);

        match rx.recv().await.unwrap() {
            PlatformEvent::DigestGenerated { digest_id, .. } => assert_eq!(digest_id, digest.id),
            other => panic!("unexpected event {:?}", other),
        }

        // Regenerating replaces the row and keeps its id
        let again = service.generate(week).await.unwrap();
        assert_eq!(again.id, digest.id);
        assert_eq!(db::digests::list_digests(&pool, 10).await.unwrap().len(), 1);
    }

    fn openai(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new(
            "sk-test".into(),
            Some(server.uri()),
            Some("gpt-4o-mini".into()),
            RetryConfig::new(2, 1, 1),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_model_failure_stores_fallback_as_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let pool = rlp_common::db::init_memory_database().await.unwrap();
        let service = DigestService::new(pool, EventBus::new(16), Some(openai(&server)), None, false);

        let digest = service.generate(stats().week_start).await.unwrap();
        assert_eq!(digest.status, DigestStatus::Failed);
        assert!(digest.model.is_none());
        assert!(digest.content.starts_with("A quiet week"));
        assert!(digest.error.as_deref().unwrap().contains("2 attempts"));
    }

    #[tokio::test]
    async fn test_model_text_stored_then_narrated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Quiet but steady."}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tts"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "job-1",
                "status": "complete",
                "output": {"url": "https://cdn.play.ht/job-1.mp3"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let playht = PlayHtClient::new(
            "user".into(),
            "key".into(),
            None,
            Some(server.uri()),
            PollSettings {
                interval: std::time::Duration::from_millis(1),
                max_polls: 1,
            },
        )
        .unwrap();
        let pool = rlp_common::db::init_memory_database().await.unwrap();
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let service = DigestService::new(pool.clone(), bus, Some(openai(&server)), Some(playht), true);

        let digest = service.generate(stats().week_start).await.unwrap();
        assert_eq!(digest.status, DigestStatus::Generated);
        assert_eq!(digest.content, "Quiet but steady.");
        assert_eq!(digest.model.as_deref(), Some("gpt-4o-mini"));

        // Stored event, then the narrated event from the background task
        for expected in ["generated", "narrated"] {
            let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
                .await
                .expect("event should arrive")
                .unwrap();
            match event {
                PlatformEvent::DigestGenerated { status, .. } => assert_eq!(status, expected),
                other => panic!("unexpected event {:?}", other),
            }
        }

        let stored = db::digests::get_by_week(&pool, digest.week_start).await.unwrap().unwrap();
        assert_eq!(stored.status, DigestStatus::Narrated);
        assert_eq!(stored.audio_url.as_deref(), Some("https://cdn.play.ht/job-1.mp3"));
    }
}
