//! Survey response payloads and the submitters that deliver them.

use std::sync::Mutex;

use async_trait::async_trait;
use engage_types::{AnswerSet, EngageError, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub nonce: String,
    /// Seconds since the Unix epoch, with millisecond precision.
    pub client_created_at: f64,
    /// Local UTC offset in seconds.
    pub client_created_at_utc_offset: i32,
    pub id: String,
    pub answers: AnswerSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyPayload {
    pub response: SurveyResponse,
    pub session_id: String,
}

impl SurveyPayload {
    /// Stamp a new payload with a fresh nonce and the current local time.
    pub fn new(survey_id: impl Into<String>, answers: AnswerSet, session_id: impl Into<String>) -> Self {
        let now = chrono::Local::now();
        Self {
            response: SurveyResponse {
                nonce: uuid::Uuid::new_v4().to_string(),
                client_created_at: now.timestamp_millis() as f64 / 1000.0,
                client_created_at_utc_offset: now.offset().local_minus_utc(),
                id: survey_id.into(),
                answers,
            },
            session_id: session_id.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SurveySubmitter trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SurveySubmitter: Send + Sync {
    async fn submit_survey(&self, payload: &SurveyPayload, survey_id: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// HttpSurveySubmitter
// ---------------------------------------------------------------------------

/// Posts responses to `{base_url}/conversations/{conversation_id}/surveys/{survey_id}/responses`.
#[derive(Debug)]
pub struct HttpSurveySubmitter {
    client: reqwest::Client,
    base_url: String,
    conversation_id: String,
    token: String,
}

impl HttpSurveySubmitter {
    pub fn new(base_url: impl Into<String>, conversation_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            conversation_id: conversation_id.into(),
            token: token.into(),
        }
    }

    fn endpoint(&self, survey_id: &str) -> String {
        format!(
            "{}/conversations/{}/surveys/{}/responses",
            self.base_url, self.conversation_id, survey_id
        )
    }
}

#[async_trait]
impl SurveySubmitter for HttpSurveySubmitter {
    async fn submit_survey(&self, payload: &SurveyPayload, survey_id: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.endpoint(survey_id))
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .map_err(|e| EngageError::Submission {
                status: 0,
                message: e.to_string(),
                retryable: true,
            })?;

        let status = resp.status();
        if status.is_success() {
            tracing::info!(%survey_id, status = status.as_u16(), "Survey response accepted");
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(map_error(status, &body))
    }
}

fn map_error(status: reqwest::StatusCode, body: &str) -> EngageError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string());
    EngageError::Submission {
        status: status.as_u16(),
        message,
        retryable: status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS,
    }
}

// ---------------------------------------------------------------------------
// RecordingSubmitter
// ---------------------------------------------------------------------------

/// Keeps every accepted payload in memory. Can be told to fail the first
/// `n` attempts with a retryable error.
pub struct RecordingSubmitter {
    payloads: Mutex<Vec<SurveyPayload>>,
    failures_left: Mutex<usize>,
    attempts: Mutex<usize>,
}

impl RecordingSubmitter {
    pub fn new() -> Self {
        Self::failing(0)
    }

    pub fn failing(failures: usize) -> Self {
        Self {
            payloads: Mutex::new(Vec::new()),
            failures_left: Mutex::new(failures),
            attempts: Mutex::new(0),
        }
    }

    pub fn payloads(&self) -> Vec<SurveyPayload> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

impl Default for RecordingSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SurveySubmitter for RecordingSubmitter {
    async fn submit_survey(&self, payload: &SurveyPayload, survey_id: &str) -> Result<()> {
        *self.attempts.lock().unwrap() += 1;
        {
            let mut failures = self.failures_left.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(EngageError::Submission {
                    status: 503,
                    message: format!("simulated outage for survey {survey_id}"),
                    retryable: true,
                });
            }
        }
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}
