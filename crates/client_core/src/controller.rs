//! Timed interview session: countdown, autosave and the submit transition.
//!
//! The controller owns all mutable interview state. It never schedules
//! anything itself; [`crate::driver::SessionDriver`] (or a test) calls
//! [`SessionController::tick`] once per second and
//! [`SessionController::autosave_tick`] every [`AUTOSAVE_INTERVAL`].
//!
//! State only moves forward, `InProgress -> Submitting -> Submitted`, except
//! that a failed submission rolls `Submitting` back to `InProgress` so the
//! candidate can retry by hand.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use shared::{
    domain::{AnswerSet, AnswerValue, Campaign, CandidateId, Question, QuestionId, SubmissionState},
    protocol::{QuestionSet, SubmissionRequest},
};
use storage::{load_json, save_json, LocalStore, StoreScope};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    error::SessionError,
    session::{self, answers_key, whole_minutes_between},
    CampaignProvider, SubmissionSink,
};

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);
/// Remaining-time marks, in seconds, that each raise one warning.
pub const WARNING_THRESHOLDS: [u32; 2] = [300, 60];

const EVENT_CAPACITY: usize = 64;

/// Where the answers of a freshly started session come from.
#[derive(Debug, Clone)]
pub enum AnswerSource {
    Empty,
    /// Last snapshot written to the local store for this candidate.
    Restore,
    Provided(AnswerSet),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    TimeWarning { threshold_secs: u32 },
    Autosaved { at: DateTime<Utc>, answered: usize },
    TimeExpired,
    Submitted { elapsed_minutes: u32, forced: bool },
    SubmitFailed { message: String, forced: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not counting: not started, already at zero, or no longer in progress.
    Inactive,
    Running { remaining_secs: u32 },
    Warning { remaining_secs: u32, threshold_secs: u32 },
    /// Countdown reached zero and the forced submission ran.
    Expired { submitted: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { at: DateTime<Utc> },
    /// Nothing to write: no answers yet, or the interview is already over.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted { elapsed_minutes: u32 },
    AlreadySubmitted,
    InFlight,
}

/// Read-only view for displays.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SubmissionState,
    pub remaining_secs: u32,
    pub last_saved: Option<DateTime<Utc>>,
    pub answered: usize,
    pub total_questions: usize,
    pub elapsed_minutes: u32,
}

pub struct SessionDependencies {
    pub store: Arc<dyn LocalStore>,
    pub sink: Arc<dyn SubmissionSink>,
    pub clock: Arc<dyn Clock>,
}

pub struct SessionController {
    candidate_id: CandidateId,
    campaign: Campaign,
    questions: Vec<Question>,
    store: Arc<dyn LocalStore>,
    sink: Arc<dyn SubmissionSink>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<SessionEvent>,
    state: SubmissionState,
    started_at: Option<DateTime<Utc>>,
    remaining_secs: u32,
    answers: AnswerSet,
    last_saved: Option<DateTime<Utc>>,
    warned: [bool; WARNING_THRESHOLDS.len()],
    frozen_elapsed: Option<u32>,
}

/// Holds the state at `Submitting` and rolls it back to `InProgress` unless
/// completed, including when the submitting future is dropped mid-flight.
struct SubmittingGuard<'a> {
    state: &'a mut SubmissionState,
    completed: bool,
}

impl<'a> SubmittingGuard<'a> {
    fn enter(state: &'a mut SubmissionState) -> Self {
        *state = SubmissionState::Submitting;
        Self {
            state,
            completed: false,
        }
    }

    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        *self.state = if self.completed {
            SubmissionState::Submitted
        } else {
            SubmissionState::InProgress
        };
    }
}

impl SessionController {
    pub fn new(
        candidate_id: CandidateId,
        question_set: QuestionSet,
        dependencies: SessionDependencies,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            candidate_id,
            campaign: question_set.campaign,
            questions: question_set.questions,
            store: dependencies.store,
            sink: dependencies.sink,
            clock: dependencies.clock,
            events,
            state: SubmissionState::InProgress,
            started_at: None,
            remaining_secs: 0,
            answers: AnswerSet::new(),
            last_saved: None,
            warned: [false; WARNING_THRESHOLDS.len()],
            frozen_elapsed: None,
        }
    }

    /// Builds a controller for the candidate recorded in the session scope.
    ///
    /// Any failure here ends the session: the caller should send the
    /// candidate back to login rather than run without questions.
    pub async fn load(
        provider: &dyn CampaignProvider,
        dependencies: SessionDependencies,
    ) -> Result<Self, SessionError> {
        let candidate_id = session::current_candidate(&*dependencies.store)
            .await?
            .ok_or_else(|| SessionError::Reauthenticate("Please login first".to_string()))?;

        let question_set = provider
            .fetch_questions(&candidate_id)
            .await
            .map_err(|err| {
                warn!(candidate_id = %candidate_id, "failed to load interview questions: {err}");
                SessionError::Reauthenticate(format!("Failed to load interview questions: {err}"))
            })?;

        if question_set.questions.is_empty() {
            return Err(SessionError::NoQuestions);
        }

        Ok(Self::new(candidate_id, question_set, dependencies))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn start(
        &mut self,
        duration_minutes: u32,
        source: AnswerSource,
    ) -> Result<(), SessionError> {
        if self.started_at.is_some() {
            return Err(SessionError::AlreadyStarted);
        }
        let remaining_secs = duration_minutes
            .checked_mul(60)
            .filter(|secs| *secs > 0)
            .ok_or(SessionError::InvalidDuration)?;

        let store = &*self.store;
        let started_at = match session::stored_start_time(store).await? {
            Some(started_at) => started_at,
            None => {
                let now = self.clock.now();
                session::record_start_time(store, now).await?;
                now
            }
        };

        if let Some(minutes) = session::time_taken(store).await? {
            self.started_at = Some(started_at);
            self.remaining_secs = 0;
            self.state = SubmissionState::Submitted;
            self.frozen_elapsed = Some(minutes);
            info!(
                candidate_id = %self.candidate_id,
                elapsed_minutes = minutes,
                "interview already submitted in this session"
            );
            return Ok(());
        }

        let answers = match source {
            AnswerSource::Empty => AnswerSet::new(),
            AnswerSource::Provided(answers) => answers,
            AnswerSource::Restore => self.restore_answers().await?,
        };

        self.answers = answers;
        self.remaining_secs = remaining_secs;
        self.state = SubmissionState::InProgress;
        self.started_at = Some(started_at);
        info!(
            candidate_id = %self.candidate_id,
            duration_minutes,
            restored = self.answers.len(),
            "interview started"
        );
        Ok(())
    }

    async fn restore_answers(&self) -> Result<AnswerSet> {
        let key = answers_key(&self.candidate_id);
        let saved: Option<AnswerSet> = load_json(&*self.store, StoreScope::Local, &key).await?;
        Ok(saved
            .unwrap_or_default()
            .iter()
            .filter(|(question_id, _)| self.question(question_id).is_some())
            .map(|(question_id, value)| (question_id.clone(), value.clone()))
            .collect())
    }

    /// Advances the countdown by one second.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.started_at.is_none()
            || self.state != SubmissionState::InProgress
            || self.remaining_secs == 0
        {
            return TickOutcome::Inactive;
        }

        let before = self.remaining_secs;
        self.remaining_secs -= 1;
        let remaining_secs = self.remaining_secs;

        if remaining_secs == 0 {
            info!(candidate_id = %self.candidate_id, "interview time expired");
            self.emit(SessionEvent::TimeExpired);
            let submitted = matches!(
                self.force_submit().await,
                Ok(SubmitOutcome::Submitted { .. } | SubmitOutcome::AlreadySubmitted)
            );
            return TickOutcome::Expired { submitted };
        }

        let mut outcome = TickOutcome::Running { remaining_secs };
        for (index, threshold_secs) in WARNING_THRESHOLDS.into_iter().enumerate() {
            if !self.warned[index] && before >= threshold_secs && remaining_secs < threshold_secs {
                self.warned[index] = true;
                warn!(candidate_id = %self.candidate_id, remaining_secs, "interview time warning");
                self.emit(SessionEvent::TimeWarning { threshold_secs });
                outcome = TickOutcome::Warning {
                    remaining_secs,
                    threshold_secs,
                };
            }
        }
        outcome
    }

    pub async fn autosave_tick(&mut self) -> Result<SaveOutcome, SessionError> {
        if self.started_at.is_none() || self.state != SubmissionState::InProgress {
            return Ok(SaveOutcome::Skipped);
        }
        let outcome = self.save().await?;
        if let SaveOutcome::Saved { at } = outcome {
            self.emit(SessionEvent::Autosaved {
                at,
                answered: self.answers.len(),
            });
        }
        Ok(outcome)
    }

    /// Writes the current answers to the local store. An empty answer set is
    /// never written, and nothing is written once the interview is submitted.
    pub async fn save(&mut self) -> Result<SaveOutcome, SessionError> {
        if self.started_at.is_none() {
            return Err(SessionError::NotStarted);
        }
        if self.answers.is_empty() || self.state == SubmissionState::Submitted {
            return Ok(SaveOutcome::Skipped);
        }
        persist_answers(&*self.store, &self.candidate_id, &self.answers).await?;
        let at = self.clock.now();
        self.last_saved = Some(at);
        debug!(candidate_id = %self.candidate_id, answered = self.answers.len(), "answers saved");
        Ok(SaveOutcome::Saved { at })
    }

    pub async fn submit(&mut self) -> Result<SubmitOutcome, SessionError> {
        self.submit_with(false).await
    }

    /// Submission triggered by the countdown reaching zero.
    pub async fn force_submit(&mut self) -> Result<SubmitOutcome, SessionError> {
        self.submit_with(true).await
    }

    async fn submit_with(&mut self, forced: bool) -> Result<SubmitOutcome, SessionError> {
        let Some(started_at) = self.started_at else {
            return Err(SessionError::NotStarted);
        };
        match self.state {
            SubmissionState::Submitted => return Ok(SubmitOutcome::AlreadySubmitted),
            SubmissionState::Submitting => return Ok(SubmitOutcome::InFlight),
            SubmissionState::InProgress => {}
        }

        let (completed_at, result) = {
            let guard = SubmittingGuard::enter(&mut self.state);

            if !self.answers.is_empty() {
                match persist_answers(&*self.store, &self.candidate_id, &self.answers).await {
                    Ok(()) => self.last_saved = Some(self.clock.now()),
                    Err(err) => warn!(
                        candidate_id = %self.candidate_id,
                        "saving answers before submit failed: {err:#}"
                    ),
                }
            }

            let request = SubmissionRequest {
                candidate_id: self.candidate_id.clone(),
                answers: self.answers.clone(),
                started_at,
                completed_at: self.clock.now(),
            };
            let result = self.sink.submit(&request).await;
            if result.is_ok() {
                guard.complete();
            }
            (request.completed_at, result)
        };

        match result {
            Ok(()) => {
                let elapsed_minutes = whole_minutes_between(started_at, completed_at);
                self.frozen_elapsed = Some(elapsed_minutes);
                self.finish_submission(elapsed_minutes).await;
                info!(
                    candidate_id = %self.candidate_id,
                    elapsed_minutes,
                    forced,
                    answered = self.answers.len(),
                    "interview submitted"
                );
                self.emit(SessionEvent::Submitted {
                    elapsed_minutes,
                    forced,
                });
                Ok(SubmitOutcome::Submitted { elapsed_minutes })
            }
            Err(err) => {
                warn!(candidate_id = %self.candidate_id, forced, "interview submission failed: {err}");
                self.emit(SessionEvent::SubmitFailed {
                    message: err.user_message(),
                    forced,
                });
                Err(SessionError::Submission(err))
            }
        }
    }

    /// Local bookkeeping after the API accepted the submission. Failures are
    /// logged only; the submission itself already succeeded.
    async fn finish_submission(&self, elapsed_minutes: u32) {
        let store = &*self.store;
        if let Err(err) = session::record_time_taken(store, elapsed_minutes).await {
            warn!(candidate_id = %self.candidate_id, "failed to record time taken: {err:#}");
        }
        if let Err(err) = store
            .remove(StoreScope::Local, &answers_key(&self.candidate_id))
            .await
        {
            warn!(candidate_id = %self.candidate_id, "failed to drop answer snapshot: {err:#}");
        }
    }

    /// Save & Exit: keeps the answer snapshot, forgets the candidate session.
    pub async fn logout(&mut self) -> Result<(), SessionError> {
        if self.started_at.is_some() && self.state == SubmissionState::InProgress {
            self.save().await?;
        }
        session::clear_session(&*self.store).await?;
        info!(candidate_id = %self.candidate_id, "candidate logged out");
        Ok(())
    }

    pub fn elapsed_minutes(&self) -> u32 {
        if let Some(frozen) = self.frozen_elapsed {
            return frozen;
        }
        self.started_at
            .map(|started_at| whole_minutes_between(started_at, self.clock.now()))
            .unwrap_or(0)
    }

    pub fn set_text_answer(
        &mut self,
        question_id: &QuestionId,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.ensure_editable(question_id)?;
        self.answers
            .set(question_id.clone(), AnswerValue::Text(text.into()));
        Ok(())
    }

    pub fn toggle_choice(&mut self, question_id: &QuestionId, option: &str) -> Result<(), SessionError> {
        let question = self.ensure_editable(question_id)?;
        if let Some(options) = &question.options {
            if !options.iter().any(|candidate| candidate == option) {
                return Err(SessionError::UnknownOption {
                    question_id: question_id.clone(),
                    option: option.to_string(),
                });
            }
        }
        self.answers.toggle_choice(question_id.clone(), option);
        Ok(())
    }

    pub fn clear_answer(&mut self, question_id: &QuestionId) -> Result<(), SessionError> {
        self.ensure_editable(question_id)?;
        self.answers.remove(question_id);
        Ok(())
    }

    fn ensure_editable(&self, question_id: &QuestionId) -> Result<&Question, SessionError> {
        if self.started_at.is_none() {
            return Err(SessionError::NotStarted);
        }
        if self.state != SubmissionState::InProgress || self.remaining_secs == 0 {
            return Err(SessionError::NotInProgress);
        }
        self.question(question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.clone()))
    }

    pub fn question(&self, question_id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|question| &question.id == question_id)
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn campaign(&self) -> &Campaign {
        &self.campaign
    }

    pub fn candidate_id(&self) -> &CandidateId {
        &self.candidate_id
    }

    pub fn answers(&self) -> &AnswerSet {
        &self.answers
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            remaining_secs: self.remaining_secs,
            last_saved: self.last_saved,
            answered: self.answered_count(),
            total_questions: self.questions.len(),
            elapsed_minutes: self.elapsed_minutes(),
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

async fn persist_answers(
    store: &dyn LocalStore,
    candidate_id: &CandidateId,
    answers: &AnswerSet,
) -> Result<()> {
    save_json(store, StoreScope::Local, &answers_key(candidate_id), answers).await
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
