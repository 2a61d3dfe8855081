use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use shared::{
    domain::{AnswerKind, Campaign, CampaignId, CandidateId, Question, QuestionId},
    protocol::{QuestionSet, SubmissionRequest},
};
use storage::{LocalStore, MemoryStore, StoreScope};

use crate::{
    clock::ManualClock,
    controller::{SessionController, SessionDependencies},
    error::PortalError,
    session::CANDIDATE_ID_KEY,
    CampaignProvider, SubmissionSink,
};

pub const CANDIDATE: &str = "cand-42";

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
}

pub fn question(id: &str, answer_type: AnswerKind, options: Option<&[&str]>) -> Question {
    Question {
        id: QuestionId::new(id),
        title: format!("Question {id}"),
        description: String::new(),
        answer_type,
        marks: 10,
        options: options.map(|options| options.iter().map(|o| o.to_string()).collect()),
        code_template: None,
        rubric: None,
        file_types: None,
        rating_scale: None,
    }
}

pub fn question_set(duration_minutes: u32) -> QuestionSet {
    QuestionSet {
        questions: vec![
            question("q1", AnswerKind::CodeEditor, None),
            question("q2", AnswerKind::Essay, None),
            question(
                "q3",
                AnswerKind::MultipleChoice,
                Some(&["string", "number", "symbol"]),
            ),
        ],
        campaign: Campaign {
            id: CampaignId::new("camp-1"),
            name: "Frontend Developer Hiring".into(),
            description: String::new(),
            duration_per_candidate: duration_minutes,
            questions_per_candidate: 3,
            passing_score: 70.0,
        },
    }
}

#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SubmissionRequest>>,
    reject_with: Mutex<Option<u16>>,
}

impl RecordingSink {
    pub fn rejecting(status: u16) -> Self {
        let sink = Self::default();
        sink.set_rejecting(Some(status));
        sink
    }

    pub fn set_rejecting(&self, status: Option<u16>) {
        *self.reject_with.lock().unwrap() = status;
    }

    pub fn calls(&self) -> Vec<SubmissionRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionSink for RecordingSink {
    async fn submit(&self, request: &SubmissionRequest) -> Result<(), PortalError> {
        self.calls.lock().unwrap().push(request.clone());
        match *self.reject_with.lock().unwrap() {
            Some(status) => Err(PortalError::rejected(status, "Failed to submit interview")),
            None => Ok(()),
        }
    }
}

/// Sink whose submission never completes.
pub struct StalledSink;

#[async_trait]
impl SubmissionSink for StalledSink {
    async fn submit(&self, _request: &SubmissionRequest) -> Result<(), PortalError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

pub struct StaticProvider {
    pub result: Mutex<Option<Result<QuestionSet, PortalError>>>,
}

impl StaticProvider {
    pub fn ok(question_set: QuestionSet) -> Self {
        Self {
            result: Mutex::new(Some(Ok(question_set))),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            result: Mutex::new(Some(Err(PortalError::rejected(
                status,
                "Failed to fetch questions",
            )))),
        }
    }
}

#[async_trait]
impl CampaignProvider for StaticProvider {
    async fn fetch_questions(
        &self,
        _candidate_id: &CandidateId,
    ) -> Result<QuestionSet, PortalError> {
        self.result
            .lock()
            .unwrap()
            .take()
            .expect("fetch_questions called more than once")
    }
}

pub struct Harness {
    pub controller: SessionController,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub clock: ManualClock,
}

pub fn harness(duration_minutes: u32) -> Harness {
    harness_with_sink(duration_minutes, RecordingSink::default())
}

pub fn harness_with_sink(duration_minutes: u32, sink: RecordingSink) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(sink);
    let clock = ManualClock::new(at(11, 45));
    let controller = SessionController::new(
        CandidateId::new(CANDIDATE),
        question_set(duration_minutes),
        SessionDependencies {
            store: store.clone(),
            sink: sink.clone(),
            clock: Arc::new(clock.clone()),
        },
    );
    Harness {
        controller,
        store,
        sink,
        clock,
    }
}

pub async fn logged_in_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .put(StoreScope::Session, CANDIDATE_ID_KEY, CANDIDATE)
        .await
        .unwrap();
    store
}
