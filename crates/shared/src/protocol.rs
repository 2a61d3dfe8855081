use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AnswerSet, Campaign, CampaignId, CandidateId, CandidateStatus, Question,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub temp_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub id: CandidateId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub campaign_id: CampaignId,
    pub campaign: CampaignRef,
    pub status: CandidateStatus,
}

impl LoginResponse {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Body the API returns alongside a non-success status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    pub questions: Vec<Question>,
    pub campaign: Campaign,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    pub answers: AnswerSet,
    pub interview_started_at: DateTime<Utc>,
    pub interview_completed_at: DateTime<Utc>,
}

/// Everything the submission sink needs for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRequest {
    pub candidate_id: CandidateId,
    pub answers: AnswerSet,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl SubmissionRequest {
    pub fn body(&self) -> SubmitBody {
        SubmitBody {
            answers: self.answers.clone(),
            interview_started_at: self.started_at,
            interview_completed_at: self.completed_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Passed,
    Failed,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub technical: f64,
    pub behavioral: f64,
    pub logical: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionScore {
    pub question: String,
    pub score: f64,
    pub max_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResult {
    pub name: String,
    pub email: String,
    pub campaign: String,
    pub rank: u32,
    pub total_candidates: u32,
    pub scores: ScoreSummary,
    pub passing_score: f64,
    pub status: ResultStatus,
    #[serde(default)]
    pub time_taken: Option<u32>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub breakdown: Vec<QuestionScore>,
}

impl CandidateResult {
    /// Share of candidates ranked at or below this one, in percent.
    pub fn percentile(&self) -> f64 {
        if self.total_candidates == 0 || self.rank == 0 || self.rank > self.total_candidates {
            return 0.0;
        }
        let total = f64::from(self.total_candidates);
        (total - f64::from(self.rank) + 1.0) / total * 100.0
    }

    pub fn passed(&self) -> bool {
        self.status == ResultStatus::Passed
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
