//! Answer and persisted-question types.
//!
//! Answers are never patched in place. Re-answering a question deletes every
//! row for that `(beneficiary, question)` and inserts a fresh, unsynced set;
//! the only in-place mutation is flipping `synced` once the remote accepts a
//! row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::form::QuestionType;

// ─── Persisted question ──────────────────────────────────────────────────────

/// Addresses one question of one form version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionKey {
  pub form_id:      i64,
  pub form_version: i64,
  pub question_id:  i64,
}

/// Records that a question of a given form version has been interacted with.
/// Owns the answer rows for that question and an optional note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
  pub key:           QuestionKey,
  pub question_type: QuestionType,
  pub section_id:    Option<i64>,
  pub note:          Option<String>,
}

/// Input describing the question entity to create on first write.
#[derive(Debug, Clone)]
pub struct NewQuestion {
  pub key:           QuestionKey,
  pub question_type: QuestionType,
  pub section_id:    Option<i64>,
}

// ─── Answer ──────────────────────────────────────────────────────────────────

/// One selected option (with optional free text) for one
/// `(beneficiary, question)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
  pub answer_id:      Uuid,
  pub beneficiary_id: i64,
  pub form_id:        i64,
  pub form_version:   i64,
  pub question_id:    i64,
  pub option_id:      i64,
  pub selected:       bool,
  pub is_free_text:   bool,
  pub user_text:      Option<String>,
  /// True only after the remote confirmed the row.
  pub synced:         bool,
  pub fill_date:      DateTime<Utc>,
}

impl Answer {
  pub fn question_key(&self) -> QuestionKey {
    QuestionKey {
      form_id:      self.form_id,
      form_version: self.form_version,
      question_id:  self.question_id,
    }
  }
}

/// Input to [`crate::store::RecordStore::replace_answers`] for one selected
/// option. The row id, `synced = false` and `fill_date` are set by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnswer {
  pub option_id:    i64,
  pub is_free_text: bool,
  pub user_text:    Option<String>,
}

/// A whole-set replacement of one beneficiary's answers to one question.
#[derive(Debug, Clone)]
pub struct ReplaceAnswers {
  pub beneficiary_id: i64,
  pub question:       NewQuestion,
  pub answers:        Vec<NewAnswer>,
}

// ─── Query predicate ─────────────────────────────────────────────────────────

/// Predicate for [`crate::store::RecordStore::query_answers`]. Every `Some`
/// field must match; `None` fields are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerFilter {
  pub beneficiary_id:  Option<i64>,
  pub form_id:         Option<i64>,
  pub form_version:    Option<i64>,
  pub question_id:     Option<i64>,
  pub synced:          Option<bool>,
  /// Only beneficiaries that already carry a server-assigned (positive) id.
  pub registered_only: bool,
}

impl AnswerFilter {
  pub fn for_beneficiary(beneficiary_id: i64) -> Self {
    Self { beneficiary_id: Some(beneficiary_id), ..Self::default() }
  }

  /// Every unsynced answer of a registered beneficiary.
  pub fn pending_sync() -> Self {
    Self {
      synced: Some(false),
      registered_only: true,
      ..Self::default()
    }
  }

  pub fn form(mut self, form_id: i64, form_version: i64) -> Self {
    self.form_id = Some(form_id);
    self.form_version = Some(form_version);
    self
  }

  pub fn question(mut self, question_id: i64) -> Self {
    self.question_id = Some(question_id);
    self
  }

  pub fn matches(&self, answer: &Answer) -> bool {
    self.beneficiary_id.is_none_or(|b| b == answer.beneficiary_id)
      && self.form_id.is_none_or(|f| f == answer.form_id)
      && self.form_version.is_none_or(|v| v == answer.form_version)
      && self.question_id.is_none_or(|q| q == answer.question_id)
      && self.synced.is_none_or(|s| s == answer.synced)
      && (!self.registered_only || answer.beneficiary_id > 0)
  }
}

// ─── Wire records ────────────────────────────────────────────────────────────

/// The form of an answer sent to the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
  pub beneficiary_id: i64,
  pub form_id:        i64,
  pub form_version:   i64,
  pub question_id:    i64,
  pub option_id:      i64,
  pub user_text:      Option<String>,
  pub fill_date:      DateTime<Utc>,
}

impl From<&Answer> for AnswerRecord {
  fn from(a: &Answer) -> Self {
    Self {
      beneficiary_id: a.beneficiary_id,
      form_id:        a.form_id,
      form_version:   a.form_version,
      question_id:    a.question_id,
      option_id:      a.option_id,
      user_text:      a.user_text.clone(),
      fill_date:      a.fill_date,
    }
  }
}

/// A set of answers pushed in one remote call. Either every row in it is
/// accepted or none is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerBatch {
  /// Stable digest over the batch's row ids; identical retries share it.
  pub idempotency_key: String,
  pub beneficiary_id:  i64,
  pub form_id:         i64,
  pub answers:         Vec<AnswerRecord>,
}
