use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use shared::{
    domain::{AnswerSet, AnswerValue, CandidateStatus, QuestionId},
    error::ErrorCode,
    protocol::{QuestionScore, ResultStatus, ScoreSummary},
};
use tokio::net::TcpListener;

use super::*;

#[derive(Clone, Default)]
struct ServerState {
    logins: Arc<Mutex<Vec<Value>>>,
    submissions: Arc<Mutex<Vec<(String, Value)>>>,
}

/// The canned result the results view used to render before it was wired to
/// the API.
fn sample_result() -> CandidateResult {
    CandidateResult {
        name: "Sarah Johnson".into(),
        email: "sarah.j@email.com".into(),
        campaign: "Frontend Developer Hiring".into(),
        rank: 1,
        total_candidates: 75,
        scores: ScoreSummary {
            technical: 95.0,
            behavioral: 90.0,
            logical: 88.0,
            total: 92.8,
        },
        passing_score: 70.0,
        status: ResultStatus::Passed,
        time_taken: Some(42),
        completed_at: None,
        breakdown: vec![
            QuestionScore {
                question: "Implement Binary Search".into(),
                score: 95.0,
                max_score: 100.0,
            },
            QuestionScore {
                question: "Explain React Hooks".into(),
                score: 48.0,
                max_score: 50.0,
            },
            QuestionScore {
                question: "JavaScript Data Types".into(),
                score: 23.0,
                max_score: 25.0,
            },
        ],
    }
}

async fn handle_login(State(state): State<ServerState>, Json(body): Json<Value>) -> impl IntoResponse {
    state.logins.lock().unwrap().push(body.clone());
    if body["tempPassword"] != "Temp#123" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid email or temporary password" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "id": "cand-42",
            "email": body["email"],
            "firstName": "Ada",
            "lastName": "Lovelace",
            "campaignId": "camp-1",
            "campaign": { "name": "Backend Hiring" },
            "status": "invited"
        })),
    )
}

async fn handle_questions(Path(candidate_id): Path<String>) -> impl IntoResponse {
    if candidate_id != "cand-42" {
        return (StatusCode::NOT_FOUND, Json(json!({}))).into_response();
    }
    Json(json!({
        "questions": [
            {
                "id": "q1",
                "title": "Implement Binary Search",
                "description": "Return the index of the target.",
                "answerType": "code_editor",
                "marks": 100,
                "codeTemplate": "function search(xs, x) {}"
            },
            {
                "id": "q2",
                "title": "JavaScript Data Types",
                "answerType": "multiple_choice",
                "marks": 25,
                "options": ["string", "number", "symbol"]
            }
        ],
        "campaign": {
            "id": "camp-1",
            "name": "Backend Hiring",
            "description": "",
            "durationPerCandidate": 30,
            "questionsPerCandidate": 2,
            "passingScore": 70
        }
    }))
    .into_response()
}

async fn handle_submit(
    State(state): State<ServerState>,
    Path(candidate_id): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    state
        .submissions
        .lock()
        .unwrap()
        .push((candidate_id.clone(), body));
    if candidate_id == "cand-locked" {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    }
}

async fn handle_results(Path(_candidate_id): Path<String>) -> Json<CandidateResult> {
    Json(sample_result())
}

async fn spawn_portal_server() -> Result<(String, ServerState), std::io::Error> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/auth/candidate", post(handle_login))
        .route("/api/candidates/:candidate_id/questions", get(handle_questions))
        .route("/api/candidates/:candidate_id/submit", post(handle_submit))
        .route("/api/candidates/:candidate_id/results", get(handle_results))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api"), state))
}

#[test]
fn rejects_malformed_api_url() {
    let err = PortalClient::new("not a url").err().expect("must fail");
    assert!(matches!(err, PortalError::InvalidUrl { .. }));
}

#[test]
fn trailing_slash_is_trimmed() {
    let client = PortalClient::new("http://localhost:3000/api/").expect("client");
    assert_eq!(client.api_url(), "http://localhost:3000/api");
}

#[tokio::test]
async fn authenticate_lowercases_email() {
    let (api_url, state) = spawn_portal_server().await.expect("spawn server");
    let client = PortalClient::new(api_url).expect("client");

    let profile = client
        .authenticate(" Ada@Example.COM ", "Temp#123")
        .await
        .expect("login");

    assert_eq!(profile.id.as_str(), "cand-42");
    assert_eq!(profile.status, CandidateStatus::Invited);
    let logins = state.logins.lock().unwrap().clone();
    assert_eq!(logins[0]["email"], "ada@example.com");
    assert_eq!(logins[0]["tempPassword"], "Temp#123");
}

#[tokio::test]
async fn authenticate_surfaces_api_error_message() {
    let (api_url, _state) = spawn_portal_server().await.expect("spawn server");
    let client = PortalClient::new(api_url).expect("client");

    let err = client
        .authenticate("ada@example.com", "wrong")
        .await
        .expect_err("must fail");

    assert!(err.is_recoverable());
    assert_eq!(err.code(), Some(ErrorCode::Unauthorized));
    assert_eq!(err.user_message(), "Invalid email or temporary password");
}

#[tokio::test]
async fn fetches_questions_and_campaign() {
    let (api_url, _state) = spawn_portal_server().await.expect("spawn server");
    let client = PortalClient::new(api_url).expect("client");

    let set = client
        .fetch_questions(&CandidateId::new("cand-42"))
        .await
        .expect("questions");

    assert_eq!(set.questions.len(), 2);
    assert_eq!(
        set.questions[0].code_template.as_deref(),
        Some("function search(xs, x) {}")
    );
    assert_eq!(set.campaign.duration_per_candidate, 30);
}

#[tokio::test]
async fn missing_body_error_falls_back_to_default_message() {
    let (api_url, _state) = spawn_portal_server().await.expect("spawn server");
    let client = PortalClient::new(api_url).expect("client");

    let err = client
        .fetch_questions(&CandidateId::new("cand-unknown"))
        .await
        .expect_err("must fail");

    match &err {
        PortalError::Rejected { status, .. } => assert_eq!(*status, 404),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.user_message(), "Failed to fetch questions");
}

#[tokio::test]
async fn submit_posts_answers_with_timestamps() {
    let (api_url, state) = spawn_portal_server().await.expect("spawn server");
    let client = PortalClient::new(api_url).expect("client");
    let mut answers = AnswerSet::new();
    answers.set(QuestionId::new("q1"), AnswerValue::Text("return -1;".into()));
    answers.toggle_choice(QuestionId::new("q2"), "symbol");

    client
        .submit(&SubmissionRequest {
            candidate_id: CandidateId::new("cand-42"),
            answers,
            started_at: Utc.with_ymd_and_hms(2026, 3, 2, 11, 45, 0).unwrap(),
            completed_at: Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
        })
        .await
        .expect("submit");

    let submissions = state.submissions.lock().unwrap().clone();
    assert_eq!(submissions.len(), 1);
    let (candidate_id, body) = &submissions[0];
    assert_eq!(candidate_id, "cand-42");
    assert_eq!(body["answers"], json!({ "q1": "return -1;", "q2": ["symbol"] }));
    assert_eq!(body["interviewStartedAt"], "2026-03-02T11:45:00Z");
    assert_eq!(body["interviewCompletedAt"], "2026-03-02T12:00:00Z");
}

#[tokio::test]
async fn rejected_submission_is_recoverable() {
    let (api_url, _state) = spawn_portal_server().await.expect("spawn server");
    let client = PortalClient::new(api_url).expect("client");

    let err = client
        .submit(&SubmissionRequest {
            candidate_id: CandidateId::new("cand-locked"),
            answers: AnswerSet::new(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
        })
        .await
        .expect_err("must fail");

    assert!(err.is_recoverable());
    assert_eq!(err.code(), Some(ErrorCode::Validation));
    assert_eq!(err.user_message(), "Failed to submit interview");
}

#[tokio::test]
async fn unreachable_api_is_a_connectivity_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let client = PortalClient::new(format!("http://{addr}/api")).expect("client");

    let err = client
        .fetch_questions(&CandidateId::new("cand-42"))
        .await
        .expect_err("must fail");

    assert!(matches!(err, PortalError::Connectivity(_)));
    assert!(err.is_recoverable());
    assert_eq!(err.user_message(), "Connection error. Please try again.");
}

#[tokio::test]
async fn fetches_results_from_the_api() {
    let (api_url, _state) = spawn_portal_server().await.expect("spawn server");
    let client = PortalClient::new(api_url).expect("client");

    let result = client
        .fetch_results(&CandidateId::new("cand-42"))
        .await
        .expect("results");

    assert_eq!(result, sample_result());
    assert!(result.passed());
    assert_eq!(format!("{:.1}", result.percentile()), "100.0");
}
