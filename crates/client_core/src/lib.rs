use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    domain::CandidateId,
    protocol::{
        CandidateResult, ErrorBody, LoginRequest, LoginResponse, QuestionSet, SubmissionRequest,
    },
};
use tracing::{info, warn};
use url::Url;

pub mod clock;
pub mod controller;
pub mod driver;
pub mod error;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{
    AnswerSource, SaveOutcome, SessionController, SessionDependencies, SessionEvent,
    SessionSnapshot, SubmitOutcome, TickOutcome,
};
pub use driver::{DriverConfig, DriverExit, DriverHandle, SessionDriver};
pub use error::{PortalError, SessionError};

/// Source of the questions and campaign settings for one candidate.
#[async_trait]
pub trait CampaignProvider: Send + Sync {
    async fn fetch_questions(&self, candidate_id: &CandidateId) -> Result<QuestionSet, PortalError>;
}

/// Receives the finished answer set. Never retried by the caller on its own.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn submit(&self, request: &SubmissionRequest) -> Result<(), PortalError>;
}

#[async_trait]
pub trait ResultsProvider: Send + Sync {
    async fn fetch_results(&self, candidate_id: &CandidateId)
        -> Result<CandidateResult, PortalError>;
}

/// HTTP client for the interview API.
#[derive(Clone)]
pub struct PortalClient {
    http: Client,
    api_url: String,
}

impl PortalClient {
    pub fn new(api_url: impl Into<String>) -> Result<Self, PortalError> {
        let api_url = api_url.into();
        Url::parse(&api_url).map_err(|source| PortalError::InvalidUrl {
            url: api_url.clone(),
            source,
        })?;
        Ok(Self {
            http: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub async fn authenticate(
        &self,
        email: &str,
        temp_password: &str,
    ) -> Result<LoginResponse, PortalError> {
        let endpoint = format!("{}/auth/candidate", self.api_url);
        let res = self
            .http
            .post(&endpoint)
            .json(&LoginRequest {
                email: email.trim().to_lowercase(),
                temp_password: temp_password.to_string(),
            })
            .send()
            .await
            .map_err(PortalError::Connectivity)?;
        let res = check_status(res, "Invalid credentials").await?;
        let profile: LoginResponse = res
            .json()
            .await
            .map_err(|source| PortalError::Decode { endpoint, source })?;
        info!(candidate_id = %profile.id, status = ?profile.status, "candidate authenticated");
        Ok(profile)
    }
}

#[async_trait]
impl CampaignProvider for PortalClient {
    async fn fetch_questions(&self, candidate_id: &CandidateId) -> Result<QuestionSet, PortalError> {
        let endpoint = format!("{}/candidates/{candidate_id}/questions", self.api_url);
        let res = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(PortalError::Connectivity)?;
        let res = check_status(res, "Failed to fetch questions").await?;
        res.json()
            .await
            .map_err(|source| PortalError::Decode { endpoint, source })
    }
}

#[async_trait]
impl SubmissionSink for PortalClient {
    async fn submit(&self, request: &SubmissionRequest) -> Result<(), PortalError> {
        let endpoint = format!(
            "{}/candidates/{}/submit",
            self.api_url, request.candidate_id
        );
        let res = self
            .http
            .post(&endpoint)
            .json(&request.body())
            .send()
            .await
            .map_err(PortalError::Connectivity)?;
        check_status(res, "Failed to submit interview").await?;
        Ok(())
    }
}

#[async_trait]
impl ResultsProvider for PortalClient {
    async fn fetch_results(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<CandidateResult, PortalError> {
        let endpoint = format!("{}/candidates/{candidate_id}/results", self.api_url);
        let res = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(PortalError::Connectivity)?;
        let res = check_status(res, "Failed to fetch results").await?;
        res.json()
            .await
            .map_err(|source| PortalError::Decode { endpoint, source })
    }
}

/// Passes successful responses through; turns anything else into
/// [`PortalError::Rejected`], preferring the API's own `error` message.
async fn check_status(res: Response, fallback: &str) -> Result<Response, PortalError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let url = res.url().to_string();
    let body = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|body| body.error)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string());
    warn!(%url, status = status.as_u16(), "interview API rejected request: {message}");
    Err(PortalError::rejected(status.as_u16(), message))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
