//! Play.ht text-to-speech client
//!
//! Narration is asynchronous on Play.ht's side: a job is created, then
//! polled at a fixed interval until it completes, fails, or the poll
//! budget runs out.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use super::{http_client, rate_limiter, DirectRateLimiter};

const PLAYHT_BASE_URL: &str = "https://api.play.ht/api/v2";
pub const DEFAULT_VOICE: &str =
    "s3://voice-cloning-zero-shot/d9ff78ba-d016-47f6-b0ef-dd630f59414e/female-cs/manifest.json";

#[derive(Debug, Error)]
pub enum PlayHtError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Narration job {0} failed")]
    JobFailed(String),

    #[error("Narration job {job_id} not complete after {polls} polls")]
    TimedOut { job_id: String, polls: u32 },
}

#[derive(Debug, Serialize)]
struct CreateJob<'a> {
    text: &'a str,
    voice: &'a str,
    output_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Option<JobOutput>,
}

#[derive(Debug, Deserialize)]
struct JobOutput {
    url: Option<String>,
}

/// Where a polled job stands
#[derive(Debug, PartialEq, Eq)]
enum JobState {
    Complete(String),
    Failed,
    Running,
}

impl JobStatus {
    fn state(&self) -> JobState {
        let url = self.output.as_ref().and_then(|o| o.url.clone());
        match (self.status.as_deref(), url) {
            (Some("complete") | Some("completed"), Some(url)) => JobState::Complete(url),
            (Some("failed") | Some("error"), _) => JobState::Failed,
            _ => JobState::Running,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_polls: 30,
        }
    }
}

pub struct PlayHtClient {
    http: reqwest::Client,
    user_id: String,
    api_key: String,
    voice: String,
    base_url: String,
    poll: PollSettings,
    limiter: DirectRateLimiter,
}

impl PlayHtClient {
    pub fn new(
        user_id: String,
        api_key: String,
        voice: Option<String>,
        base_url: Option<String>,
        poll: PollSettings,
    ) -> Result<Self, PlayHtError> {
        Ok(Self {
            http: http_client(Duration::from_secs(30)).map_err(|e| PlayHtError::Network(e.to_string()))?,
            user_id,
            api_key,
            voice: voice.unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            base_url: base_url
                .unwrap_or_else(|| PLAYHT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            poll,
            limiter: rate_limiter(2),
        })
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("AUTHORIZATION", &self.api_key)
            .header("X-USER-ID", &self.user_id)
            .header("accept", "application/json")
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<JobStatus, PlayHtError> {
        self.limiter.until_ready().await;
        let response = builder
            .send()
            .await
            .map_err(|e| PlayHtError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlayHtError::Api(status.as_u16(), body));
        }
        response
            .json()
            .await
            .map_err(|e| PlayHtError::Parse(e.to_string()))
    }

    /// Narrate `text`, returning the audio URL
    pub async fn narrate(&self, text: &str) -> Result<String, PlayHtError> {
        let body = CreateJob {
            text,
            voice: &self.voice,
            output_format: "mp3",
        };
        let job = self
            .send(
                self.request(reqwest::Method::POST, format!("{}/tts", self.base_url))
                    .json(&body),
            )
            .await?;
        info!(job_id = %job.id, "Narration job created");

        if let JobState::Complete(url) = job.state() {
            return Ok(url);
        }

        for poll in 1..=self.poll.max_polls {
            tokio::time::sleep(self.poll.interval).await;
            let status = self
                .send(self.request(
                    reqwest::Method::GET,
                    format!("{}/tts/{}", self.base_url, job.id),
                ))
                .await?;
            debug!(job_id = %job.id, poll, status = ?status.status, "Polled narration job");

            match status.state() {
                JobState::Complete(url) => return Ok(url),
                JobState::Failed => return Err(PlayHtError::JobFailed(job.id)),
                JobState::Running => {}
            }
        }

        Err(PlayHtError::TimedOut {
            job_id: job.id,
            polls: self.poll.max_polls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn status(json: &str) -> JobStatus {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_job_states() {
        assert_eq!(
            status(r#"{"id":"j1","status":"complete","output":{"url":"https://x/a.mp3"}}"#).state(),
            JobState::Complete("https://x/a.mp3".to_string())
        );
        assert_eq!(status(r#"{"id":"j1","status":"failed"}"#).state(), JobState::Failed);
        assert_eq!(status(r#"{"id":"j1","status":"generating"}"#).state(), JobState::Running);
        // Complete without a URL yet keeps polling
        assert_eq!(status(r#"{"id":"j1","status":"complete"}"#).state(), JobState::Running);
        assert_eq!(status(r#"{"id":"j1"}"#).state(), JobState::Running);
    }

    #[test]
    fn test_defaults() {
        let client =
            PlayHtClient::new("user".into(), "key".into(), None, None, PollSettings::default()).unwrap();
        assert_eq!(client.voice, DEFAULT_VOICE);
        assert_eq!(client.base_url, PLAYHT_BASE_URL);
    }

    fn client(server: &MockServer, max_polls: u32) -> PlayHtClient {
        PlayHtClient::new(
            "user-1".into(),
            "secret".into(),
            None,
            Some(server.uri()),
            PollSettings {
                interval: Duration::from_millis(1),
                max_polls,
            },
        )
        .expect("client should build")
    }

    async fn mount_job_created(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/tts"))
            .and(header("AUTHORIZATION", "secret"))
            .and(header("X-USER-ID", "user-1"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"id": "job-7", "status": "pending"})),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_narrate_polls_until_complete() {
        let server = MockServer::start().await;
        mount_job_created(&server).await;
        Mock::given(method("GET"))
            .and(path("/tts/job-7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "job-7", "status": "generating"})),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tts/job-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "job-7",
                "status": "complete",
                "output": {"url": "https://cdn.play.ht/job-7.mp3"}
            })))
            .mount(&server)
            .await;

        let url = client(&server, 5).narrate("Week of March 2").await.unwrap();
        assert_eq!(url, "https://cdn.play.ht/job-7.mp3");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 4);
        let body: serde_json::Value = requests[0].body_json().unwrap();
        assert_eq!(body["text"], "Week of March 2");
        assert_eq!(body["output_format"], "mp3");
    }

    #[tokio::test]
    async fn test_narrate_job_failed() {
        let server = MockServer::start().await;
        mount_job_created(&server).await;
        Mock::given(method("GET"))
            .and(path("/tts/job-7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "job-7", "status": "failed"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, 5).narrate("text").await.unwrap_err();
        assert!(matches!(err, PlayHtError::JobFailed(ref id) if id == "job-7"));
    }

    #[tokio::test]
    async fn test_narrate_gives_up_after_poll_budget() {
        let server = MockServer::start().await;
        mount_job_created(&server).await;
        Mock::given(method("GET"))
            .and(path("/tts/job-7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "job-7", "status": "generating"})),
            )
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server, 3).narrate("text").await.unwrap_err();
        assert!(matches!(err, PlayHtError::TimedOut { polls: 3, .. }));
    }

    #[tokio::test]
    async fn test_create_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tts"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = client(&server, 3).narrate("text").await.unwrap_err();
        assert!(matches!(err, PlayHtError::Api(401, ref body) if body == "bad key"));
    }
}
