//! Session-scope bookkeeping shared by the login, interview and results steps.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use shared::{domain::CandidateId, protocol::LoginResponse};
use storage::{load_json, save_json, LocalStore, StoreScope};
use tracing::info;

use crate::clock::Clock;

pub const CANDIDATE_ID_KEY: &str = "candidate_id";
pub const CANDIDATE_DATA_KEY: &str = "candidate_data";
pub const START_TIME_KEY: &str = "interview_start_time";
pub const TIME_TAKEN_KEY: &str = "interview_time_taken";

/// Local-scope key of the answer snapshot for one candidate.
pub fn answers_key(candidate_id: &CandidateId) -> String {
    format!("interview_answers:{candidate_id}")
}

/// Replaces whatever session was stored with the freshly authenticated one.
pub async fn record_login(store: &dyn LocalStore, profile: &LoginResponse) -> Result<()> {
    store.clear_scope(StoreScope::Session).await?;
    store
        .put(StoreScope::Session, CANDIDATE_ID_KEY, profile.id.as_str())
        .await?;
    save_json(store, StoreScope::Session, CANDIDATE_DATA_KEY, profile).await?;
    info!(candidate_id = %profile.id, "candidate session recorded");
    Ok(())
}

pub async fn current_candidate(store: &dyn LocalStore) -> Result<Option<CandidateId>> {
    Ok(store
        .get(StoreScope::Session, CANDIDATE_ID_KEY)
        .await?
        .filter(|id| !id.trim().is_empty())
        .map(CandidateId))
}

pub async fn candidate_profile(store: &dyn LocalStore) -> Result<Option<LoginResponse>> {
    load_json(store, StoreScope::Session, CANDIDATE_DATA_KEY).await
}

pub async fn stored_start_time(store: &dyn LocalStore) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = store.get(StoreScope::Session, START_TIME_KEY).await? else {
        return Ok(None);
    };
    let parsed = DateTime::parse_from_rfc3339(&raw)
        .with_context(|| format!("corrupt interview start time '{raw}'"))?;
    Ok(Some(parsed.with_timezone(&Utc)))
}

pub async fn record_start_time(store: &dyn LocalStore, started_at: DateTime<Utc>) -> Result<()> {
    store
        .put(StoreScope::Session, START_TIME_KEY, &started_at.to_rfc3339())
        .await
}

pub async fn record_time_taken(store: &dyn LocalStore, minutes: u32) -> Result<()> {
    store
        .put(StoreScope::Session, TIME_TAKEN_KEY, &minutes.to_string())
        .await
}

pub async fn time_taken(store: &dyn LocalStore) -> Result<Option<u32>> {
    let Some(raw) = store.get(StoreScope::Session, TIME_TAKEN_KEY).await? else {
        return Ok(None);
    };
    let minutes = raw
        .trim()
        .parse()
        .with_context(|| format!("corrupt interview time taken '{raw}'"))?;
    Ok(Some(minutes))
}

/// Recorded time taken, or the time elapsed since the stored start when the
/// interview was never submitted from this session.
pub async fn time_taken_or_elapsed(store: &dyn LocalStore, clock: &dyn Clock) -> Result<u32> {
    if let Some(minutes) = time_taken(store).await? {
        return Ok(minutes);
    }
    Ok(stored_start_time(store)
        .await?
        .map(|started_at| whole_minutes_between(started_at, clock.now()))
        .unwrap_or(0))
}

pub async fn clear_session(store: &dyn LocalStore) -> Result<()> {
    store.clear_scope(StoreScope::Session).await?;
    info!("candidate session cleared");
    Ok(())
}

/// Whole minutes from `start` to `end`, rounded down and never negative.
pub fn whole_minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    let millis = (end - start).num_milliseconds().max(0);
    u32::try_from(millis / 60_000).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
