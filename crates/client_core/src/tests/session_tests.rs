use chrono::Duration as ChronoDuration;
use shared::{
    domain::{CampaignId, CandidateStatus},
    protocol::CampaignRef,
};
use storage::MemoryStore;

use super::*;
use crate::{clock::ManualClock, test_support::at};

fn profile(id: &str) -> LoginResponse {
    LoginResponse {
        id: CandidateId::new(id),
        email: "ada@example.com".into(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        campaign_id: CampaignId::new("camp-1"),
        campaign: CampaignRef {
            name: "Backend Hiring".into(),
        },
        status: CandidateStatus::Invited,
    }
}

#[tokio::test]
async fn login_replaces_previous_session() {
    let store = MemoryStore::new();
    record_login(&store, &profile("cand-1")).await.expect("first");
    record_start_time(&store, at(9, 0)).await.expect("start");

    record_login(&store, &profile("cand-2")).await.expect("second");

    assert_eq!(
        current_candidate(&store).await.expect("candidate"),
        Some(CandidateId::new("cand-2"))
    );
    assert!(stored_start_time(&store).await.expect("start").is_none());
    let stored = candidate_profile(&store)
        .await
        .expect("profile")
        .expect("present");
    assert_eq!(stored.full_name(), "Ada Lovelace");
}

#[tokio::test]
async fn blank_candidate_id_counts_as_logged_out() {
    let store = MemoryStore::new();
    store
        .put(StoreScope::Session, CANDIDATE_ID_KEY, "  ")
        .await
        .expect("put");
    assert!(current_candidate(&store).await.expect("candidate").is_none());
}

#[tokio::test]
async fn time_taken_falls_back_to_elapsed_since_start() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(at(12, 0));
    assert_eq!(time_taken_or_elapsed(&store, &clock).await.expect("none"), 0);

    record_start_time(&store, at(11, 20)).await.expect("start");
    clock.advance(ChronoDuration::seconds(59));
    assert_eq!(
        time_taken_or_elapsed(&store, &clock).await.expect("elapsed"),
        40
    );

    record_time_taken(&store, 25).await.expect("taken");
    assert_eq!(time_taken_or_elapsed(&store, &clock).await.expect("taken"), 25);
}

#[tokio::test]
async fn corrupt_time_taken_is_reported() {
    let store = MemoryStore::new();
    store
        .put(StoreScope::Session, TIME_TAKEN_KEY, "soon")
        .await
        .expect("put");
    assert!(time_taken(&store).await.is_err());
}

#[test]
fn whole_minutes_round_down_and_clamp() {
    assert_eq!(whole_minutes_between(at(11, 45), at(12, 0)), 15);
    assert_eq!(
        whole_minutes_between(at(11, 45), at(11, 45) + ChronoDuration::seconds(119)),
        1
    );
    assert_eq!(whole_minutes_between(at(12, 0), at(11, 0)), 0);
}
