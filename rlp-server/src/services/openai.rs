//! Chat-completions client used for weekly digests

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::retry::{is_retryable_error, is_retryable_status, RetryConfig};
use super::{http_client, rate_limiter, DirectRateLimiter};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Error)]
pub enum OpenAiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Response contained no message content")]
    EmptyResponse,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl OpenAiError {
    fn is_retryable(&self) -> bool {
        match self {
            OpenAiError::Network(_) => true,
            OpenAiError::Api(status, _) => reqwest::StatusCode::from_u16(*status)
                .map(is_retryable_status)
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryConfig,
    limiter: DirectRateLimiter,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        retry: RetryConfig,
    ) -> Result<Self, OpenAiError> {
        let http = http_client(Duration::from_secs(60)).map_err(|e| OpenAiError::Network(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            retry,
            limiter: rate_limiter(2),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One completion, retried on transient failures up to `max_attempts`
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, OpenAiError> {
        let mut attempt = 0;
        loop {
            tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
            attempt += 1;

            match self.complete_once(system, user).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && self.retry.can_retry(attempt) => {
                    warn!(attempt, max = self.retry.max_attempts, "OpenAI request failed, retrying: {}", e);
                }
                Err(e) if e.is_retryable() => {
                    return Err(OpenAiError::Exhausted {
                        attempts: attempt,
                        last: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn complete_once(&self, system: &str, user: &str) -> Result<String, OpenAiError> {
        self.limiter.until_ready().await;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.7,
            max_tokens: 1200,
        };

        debug!(model = %self.model, "Requesting chat completion");
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if is_retryable_error(&e) {
                    OpenAiError::Network(e.to_string())
                } else {
                    OpenAiError::Api(e.status().map_or(0, |s| s.as_u16()), e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenAiError::Api(status.as_u16(), body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| OpenAiError::Parse(e.to_string()))?;
        extract_content(body)
    }
}

fn extract_content(body: ChatResponse) -> Result<String, OpenAiError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(OpenAiError::EmptyResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_content() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  Big week.  "}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_content(body).unwrap(), "Big week.");
    }

    #[test]
    fn test_empty_choices() {
        let body: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(extract_content(body), Err(OpenAiError::EmptyResponse)));

        let body: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(matches!(extract_content(body), Err(OpenAiError::EmptyResponse)));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(OpenAiError::Network("reset".into()).is_retryable());
        assert!(OpenAiError::Api(503, String::new()).is_retryable());
        assert!(OpenAiError::Api(429, String::new()).is_retryable());
        assert!(!OpenAiError::Api(401, String::new()).is_retryable());
        assert!(!OpenAiError::EmptyResponse.is_retryable());
    }

    #[test]
    fn test_defaults() {
        let client = OpenAiClient::new("key".into(), None, None, RetryConfig::default()).unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.base_url, DEFAULT_BASE_URL);

        let client = OpenAiClient::new(
            "key".into(),
            Some("http://localhost:9999/v1/".into()),
            Some("gpt-4o".into()),
            RetryConfig::default(),
        )
        .unwrap();
        assert_eq!(client.base_url, "http://localhost:9999/v1");
        assert_eq!(client.model(), "gpt-4o");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_exhausts_attempts() {
        // Nothing listens on port 9; connection is refused immediately
        let client = OpenAiClient::new(
            "key".into(),
            Some("http://127.0.0.1:9".into()),
            None,
            RetryConfig::new(2, 1, 1),
        )
        .unwrap();
        let err = client.complete("system", "user").await.unwrap_err();
        assert!(matches!(err, OpenAiError::Exhausted { attempts: 2, .. }));
    }

    fn mock_client(server: &MockServer, attempts: u32) -> OpenAiClient {
        OpenAiClient::new(
            "sk-test".into(),
            Some(format!("{}/v1", server.uri())),
            None,
            RetryConfig::new(attempts, 1, 1),
        )
        .expect("client should build")
    }

    fn completion(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": text}}]
        }))
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(json!({"model": DEFAULT_MODEL})))
            .respond_with(completion("A busy week at the label."))
            .expect(1)
            .mount(&server)
            .await;

        let text = mock_client(&server, 3).complete("system", "user").await.unwrap();
        assert_eq!(text, "A busy week at the label.");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests[1].body_json().unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .expect(1)
            .mount(&server)
            .await;

        let err = mock_client(&server, 3).complete("system", "user").await.unwrap_err();
        assert!(matches!(err, OpenAiError::Api(401, ref body) if body == "invalid key"));
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let err = mock_client(&server, 2).complete("system", "user").await.unwrap_err();
        assert!(matches!(err, OpenAiError::Exhausted { attempts: 2, .. }));
    }
}
