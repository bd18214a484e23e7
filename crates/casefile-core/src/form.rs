//! Form catalog types: summaries and full definitions.
//!
//! A definition is content-addressed by its `(form_id, version)` pair and is
//! never mutated in place; a newer version replaces it wholesale.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Lightweight descriptor used to detect staleness without transferring the
/// full definition. Identity is `id`; staleness is decided by `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSummary {
  pub id:          i64,
  pub version:     i64,
  pub code:        String,
  pub description: String,
}

impl FormSummary {
  /// True when `self` describes a strictly newer version of `local`'s form.
  pub fn supersedes(&self, local: &FormSummary) -> bool {
    self.id == local.id && self.version > local.version
  }
}

// ─── Questions ───────────────────────────────────────────────────────────────

/// How many options a question accepts, and whether one of them carries text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
  Single,
  Multiple,
  SingleWithText,
  MultipleWithText,
}

impl QuestionType {
  pub fn accepts_multiple(self) -> bool {
    matches!(self, Self::Multiple | Self::MultipleWithText)
  }

  /// Integer code stored in the `question_type` column.
  pub fn code(self) -> i64 {
    match self {
      Self::Single => 0,
      Self::Multiple => 1,
      Self::SingleWithText => 2,
      Self::MultipleWithText => 3,
    }
  }

  pub fn from_code(code: i64) -> Result<Self> {
    match code {
      0 => Ok(Self::Single),
      1 => Ok(Self::Multiple),
      2 => Ok(Self::SingleWithText),
      3 => Ok(Self::MultipleWithText),
      other => Err(Error::UnknownQuestionType(other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
  pub id:           i64,
  pub text:         String,
  /// The option accepts a user-entered text alongside the selection.
  pub is_free_text: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
  pub id:        i64,
  pub code:      String,
  pub text:      String,
  #[serde(rename = "type")]
  pub kind:      QuestionType,
  pub mandatory: bool,
  pub options:   Vec<AnswerOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
  pub id:          i64,
  pub code:        String,
  pub description: String,
  pub questions:   Vec<Question>,
}

// ─── Definition ──────────────────────────────────────────────────────────────

/// The full ordered sections/questions/options for one `(form_id, version)`.
///
/// Cached as a single value so that the summary and the sections it describes
/// are always replaced together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDefinition {
  pub summary:  FormSummary,
  pub sections: Vec<Section>,
}

impl FormDefinition {
  pub fn form_id(&self) -> i64 { self.summary.id }

  pub fn version(&self) -> i64 { self.summary.version }

  /// All questions in definition order, across sections.
  pub fn questions(&self) -> impl Iterator<Item = &Question> {
    self.sections.iter().flat_map(|s| s.questions.iter())
  }

  pub fn question(&self, question_id: i64) -> Option<&Question> {
    self.questions().find(|q| q.id == question_id)
  }

  /// The id of the section that holds `question_id`.
  pub fn section_of(&self, question_id: i64) -> Option<i64> {
    self
      .sections
      .iter()
      .find(|s| s.questions.iter().any(|q| q.id == question_id))
      .map(|s| s.id)
  }

  pub fn question_count(&self) -> usize {
    self.sections.iter().map(|s| s.questions.len()).sum()
  }
}
