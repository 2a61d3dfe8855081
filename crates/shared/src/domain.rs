use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(CandidateId);
id_newtype!(CampaignId);
id_newtype!(QuestionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    CodeEditor,
    Essay,
    MultipleChoice,
    Rating,
    FileUpload,
    #[serde(other)]
    Other,
}

impl AnswerKind {
    pub fn label(self) -> &'static str {
        match self {
            AnswerKind::CodeEditor => "code editor",
            AnswerKind::Essay => "essay",
            AnswerKind::MultipleChoice => "multiple choice",
            AnswerKind::Rating => "rating",
            AnswerKind::FileUpload => "file upload",
            AnswerKind::Other => "free text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Invited,
    NotStarted,
    InProgress,
    Completed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub answer_type: AnswerKind,
    pub marks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_scale: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Minutes allotted to each candidate.
    pub duration_per_candidate: u32,
    pub questions_per_candidate: u32,
    pub passing_score: f64,
}

/// A single answer. Free-text kinds carry a string, multiple choice a set of
/// selected options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Choices(BTreeSet<String>),
}

impl AnswerValue {
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Text(text) => text.trim().is_empty(),
            AnswerValue::Choices(choices) => choices.is_empty(),
        }
    }
}

/// Answers keyed by question id. Unanswered questions have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSet(BTreeMap<QuestionId, AnswerValue>);

impl AnswerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, question_id: &QuestionId) -> Option<&AnswerValue> {
        self.0.get(question_id)
    }

    pub fn contains(&self, question_id: &QuestionId) -> bool {
        self.0.contains_key(question_id)
    }

    /// Stores `value`, or drops the entry when the value is blank.
    pub fn set(&mut self, question_id: QuestionId, value: AnswerValue) {
        if value.is_blank() {
            self.0.remove(&question_id);
        } else {
            self.0.insert(question_id, value);
        }
    }

    pub fn remove(&mut self, question_id: &QuestionId) -> Option<AnswerValue> {
        self.0.remove(question_id)
    }

    /// Flips `option` in a multiple-choice answer. A text answer under the same
    /// id is replaced.
    pub fn toggle_choice(&mut self, question_id: QuestionId, option: &str) {
        let mut choices = match self.0.remove(&question_id) {
            Some(AnswerValue::Choices(choices)) => choices,
            _ => BTreeSet::new(),
        };
        if !choices.remove(option) {
            choices.insert(option.to_string());
        }
        self.set(question_id, AnswerValue::Choices(choices));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &AnswerValue)> {
        self.0.iter()
    }
}

impl FromIterator<(QuestionId, AnswerValue)> for AnswerSet {
    fn from_iter<T: IntoIterator<Item = (QuestionId, AnswerValue)>>(iter: T) -> Self {
        let mut set = AnswerSet::new();
        for (question_id, value) in iter {
            set.set(question_id, value);
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    InProgress,
    Submitting,
    Submitted,
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
