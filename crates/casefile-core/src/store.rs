//! The `RecordStore` trait: durable storage for beneficiaries, persisted
//! questions and answers.
//!
//! Implemented by storage backends (e.g. `casefile-store-sqlite`). The engine
//! depends on this abstraction, not on any concrete backend. Every method is
//! one transaction: either all of its writes apply or none do.

use std::future::Future;

use uuid::Uuid;

use crate::{
  answer::{Answer, AnswerFilter, NewQuestion, QuestionRecord, ReplaceAnswers},
  beneficiary::{Beneficiary, BeneficiaryProfile},
};

/// Rows removed by [`RecordStore::purge_form_versions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeCount {
  pub questions: usize,
  pub answers:   usize,
}

pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Beneficiaries ─────────────────────────────────────────────────────

  /// Persist a new beneficiary under the next free temporary (negative) id.
  fn create_beneficiary(
    &self,
    profile: BeneficiaryProfile,
  ) -> impl Future<Output = Result<Beneficiary, Self::Error>> + Send + '_;

  fn get_beneficiary(
    &self,
    beneficiary_id: i64,
  ) -> impl Future<Output = Result<Option<Beneficiary>, Self::Error>> + Send + '_;

  /// All beneficiaries, newest (highest id) first.
  fn list_beneficiaries(
    &self,
  ) -> impl Future<Output = Result<Vec<Beneficiary>, Self::Error>> + Send + '_;

  fn update_profile(
    &self,
    beneficiary_id: i64,
    profile: BeneficiaryProfile,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Replace a temporary id with the server-assigned one, carrying answers
  /// and form assignments along.
  fn assign_beneficiary_id(
    &self,
    temporary_id: i64,
    permanent_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn set_assigned_forms(
    &self,
    beneficiary_id: i64,
    added: Vec<i64>,
    removed: Vec<i64>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Adopt `permanent_id` and apply the form delta in one transaction.
  /// With `permanent_id == beneficiary_id` only the delta applies.
  fn record_registration(
    &self,
    beneficiary_id: i64,
    permanent_id: i64,
    added: Vec<i64>,
    removed: Vec<i64>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Questions ─────────────────────────────────────────────────────────

  /// Every persisted question entity of one form version.
  fn questions_for_form(
    &self,
    form_id: i64,
    form_version: i64,
  ) -> impl Future<Output = Result<Vec<QuestionRecord>, Self::Error>> + Send + '_;

  /// Set or clear the note on a question, creating the entity if needed.
  fn set_note(
    &self,
    question: NewQuestion,
    note: Option<String>,
  ) -> impl Future<Output = Result<QuestionRecord, Self::Error>> + Send + '_;

  /// Delete every question entity, note and answer of `form_id` whose
  /// version is lower than `below_version`.
  fn purge_form_versions(
    &self,
    form_id: i64,
    below_version: i64,
  ) -> impl Future<Output = Result<PurgeCount, Self::Error>> + Send + '_;

  // ── Answers ───────────────────────────────────────────────────────────

  fn query_answers<'a>(
    &'a self,
    filter: &'a AnswerFilter,
  ) -> impl Future<Output = Result<Vec<Answer>, Self::Error>> + Send + 'a;

  /// Delete every answer of `(beneficiary, question)` and insert the given
  /// set as fresh unsynced rows, in one transaction. Returns the new rows.
  fn replace_answers(
    &self,
    input: ReplaceAnswers,
  ) -> impl Future<Output = Result<Vec<Answer>, Self::Error>> + Send + '_;

  /// Flip `synced` on the given rows. Rows that no longer exist are skipped.
  /// Returns the number of rows flipped.
  fn mark_synced(
    &self,
    answer_ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}

