//! Transactional email through the Resend API

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use rlp_common::csv::format_cents;
use rlp_common::governance::{Proposal, Vote};
use rlp_common::studio::StudioSession;

use super::{http_client, rate_limiter, DirectRateLimiter};

pub const RESEND_BASE_URL: &str = "https://api.resend.com";
pub const DEFAULT_FROM: &str = "Label Studio <studio@example.com>";

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Resend rejected message ({0}): {1}")]
    Rejected(u16, String),
}

/// A rendered message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Minimal escaping for text interpolated into HTML bodies
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn booking_confirmation(session: &StudioSession) -> EmailMessage {
    EmailMessage {
        to: session.booker_email.clone(),
        subject: format!(
            "Booking received: {} on {}",
            session.room.display_name(),
            session.session_date
        ),
        html: format!(
            "<p>Hi {name},</p>\
             <p>We received your booking for <strong>{room}</strong> on {date}, \
             {start:02}:00-{end:02}:00 ({hours} h).</p>\
             <p>Total: {total}. Status: {status}.</p>\
             <p>Reference: {id}</p>",
            name = escape_html(&session.booker_name),
            room = session.room.display_name(),
            date = session.session_date,
            start = session.start_hour,
            end = session.end_hour(),
            hours = session.duration_hours,
            total = format_cents(session.total_cents),
            status = session.status,
            id = session.id,
        ),
    }
}

pub fn vote_receipt(to: &str, display_name: &str, vote: &Vote, proposal: &Proposal) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: format!("Vote recorded: {}", proposal.title),
        html: format!(
            "<p>Hi {name},</p>\
             <p>Your <strong>{choice}</strong> vote on \"{title}\" was recorded \
             with weight {weight} ({tier}).</p>\
             <p>Receipt: {id}</p>",
            name = escape_html(display_name),
            choice = vote.choice,
            title = escape_html(&proposal.title),
            weight = vote.weight,
            tier = vote.tier,
            id = vote.id,
        ),
    }
}

pub struct ResendClient {
    http: reqwest::Client,
    api_key: String,
    from: String,
    base_url: String,
    limiter: DirectRateLimiter,
}

impl ResendClient {
    pub fn new(
        api_key: String,
        from: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, EmailError> {
        Ok(Self {
            http: http_client(Duration::from_secs(15)).map_err(|e| EmailError::Network(e.to_string()))?,
            api_key,
            from: from.unwrap_or_else(|| DEFAULT_FROM.to_string()),
            base_url: base_url
                .unwrap_or_else(|| RESEND_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            // Resend default limit is 2 requests per second
            limiter: rate_limiter(2),
        })
    }

    pub async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        self.limiter.until_ready().await;

        let request = SendRequest {
            from: self.from.as_str(),
            to: [message.to.as_str()],
            subject: &message.subject,
            html: &message.html,
        };
        let response = self
            .http
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmailError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected(status.as_u16(), body));
        }
        debug!(subject = %message.subject, "Email accepted by Resend");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rlp_common::studio::{SessionStatus, StudioRoom};
    use uuid::Uuid;
    use wiremock::matchers::{bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session() -> StudioSession {
        let now = chrono::Utc::now();
        StudioSession {
            id: Uuid::new_v4(),
            room: StudioRoom::MixSuite,
            session_date: NaiveDate::from_ymd_opt(2030, 1, 2).unwrap(),
            start_hour: 10,
            duration_hours: 4,
            booker_name: "Lee <script>".to_string(),
            booker_email: "lee@label.fm".to_string(),
            artist_name: None,
            notes: None,
            total_cents: 22_000,
            status: SessionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_booking_confirmation() {
        let message = booking_confirmation(&session());
        assert_eq!(message.to, "lee@label.fm");
        assert_eq!(message.subject, "Booking received: Mix Suite on 2030-01-02");
        assert!(message.html.contains("10:00-14:00"));
        assert!(message.html.contains("220.00"));
        assert!(message.html.contains("Lee &lt;script&gt;"));
    }

    #[tokio::test]
    async fn test_send_posts_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(bearer_token("re_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "em_1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ResendClient::new("re_test".into(), None, Some(server.uri())).unwrap();
        client.send(&booking_confirmation(&session())).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests[0].body_json().unwrap();
        assert_eq!(body["from"], DEFAULT_FROM);
        assert_eq!(body["to"], serde_json::json!(["lee@label.fm"]));
        assert_eq!(body["subject"], "Booking received: Mix Suite on 2030-01-02");
        assert!(body["html"].as_str().unwrap().contains("Lee &lt;script&gt;"));
    }

    #[tokio::test]
    async fn test_send_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid to"))
            .mount(&server)
            .await;

        let client = ResendClient::new("re_test".into(), None, Some(server.uri())).unwrap();
        let err = client.send(&booking_confirmation(&session())).await.unwrap_err();
        assert!(matches!(err, EmailError::Rejected(422, _)));
    }
}
