use casefile_core::{
  ValidationError,
  answer::AnswerFilter,
  form::{QuestionType, Section},
  store::RecordStore,
};

use super::support::*;
use crate::SyncError;

fn mixed_sections() -> Vec<Section> {
  vec![Section {
    id:          1,
    code:        "S1".into(),
    description: "main".into(),
    questions:   vec![
      question(100, QuestionType::Single, true),
      question(101, QuestionType::Multiple, false),
      question(102, QuestionType::SingleWithText, true),
    ],
  }]
}

/// Harness with form 10 v1 installed and one unregistered beneficiary.
async fn setup() -> (Harness, i64) {
  let h = harness().await;
  h.gateway.publish(10, 1, mixed_sections());
  h.engine.reconciler.refresh().await.unwrap();
  let b = h.beneficiary("A").await;
  (h, b.beneficiary_id)
}

async fn stored_options(h: &Harness, beneficiary_id: i64, question_id: i64) -> Vec<i64> {
  let filter = AnswerFilter::for_beneficiary(beneficiary_id).question(question_id);
  h.store
    .query_answers(&filter)
    .await
    .unwrap()
    .into_iter()
    .map(|a| a.option_id)
    .collect()
}

#[tokio::test]
async fn single_choice_keeps_only_latest_option() {
  let (h, b) = setup().await;
  let view = h.engine.answers.build_view(10, b).await.unwrap();

  let view = h.engine.answers.apply_selection(&view, 100, 0).await.unwrap();
  let view = h.engine.answers.apply_selection(&view, 100, 1).await.unwrap();

  assert_eq!(stored_options(&h, b, 100).await, vec![2]);
  let q = view.question(100).unwrap();
  assert!(q.is_saved);
  assert!(!q.is_synced);

  let rebuilt = h.engine.answers.build_view(10, b).await.unwrap();
  assert_eq!(rebuilt, view);
}

#[tokio::test]
async fn multi_choice_rewrites_the_whole_set() {
  let (h, b) = setup().await;
  let mut view = h.engine.answers.build_view(10, b).await.unwrap();
  for index in [0, 1, 2, 0] {
    view = h.engine.answers.apply_selection(&view, 101, index).await.unwrap();
  }
  assert_eq!(stored_options(&h, b, 101).await, vec![2, 3]);
}

#[tokio::test]
async fn free_text_is_saved_trimmed() {
  let (h, b) = setup().await;
  let view = h.engine.answers.build_view(10, b).await.unwrap();
  let view = h.engine.answers.apply_selection(&view, 102, 0).await.unwrap();
  let view = h
    .engine
    .answers
    .apply_free_text(&view, 102, 2, "  needs a ramp ")
    .await
    .unwrap();

  let rows = h
    .store
    .query_answers(&AnswerFilter::for_beneficiary(b).question(102))
    .await
    .unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].option_id, 3);
  assert!(rows[0].is_free_text);
  assert_eq!(rows[0].user_text.as_deref(), Some("needs a ramp"));
  assert_eq!(view.question(102).unwrap().options[2].user_text.as_deref(), Some("needs a ramp"));
}

#[tokio::test]
async fn blank_free_text_writes_nothing() {
  let (h, b) = setup().await;
  let view = h.engine.answers.build_view(10, b).await.unwrap();
  let next = h.engine.answers.apply_free_text(&view, 102, 2, "   ").await.unwrap();
  assert_eq!(next, view);
  assert!(stored_options(&h, b, 102).await.is_empty());
}

#[tokio::test]
async fn bad_targets_are_rejected_without_writing() {
  let (h, b) = setup().await;
  let view = h.engine.answers.build_view(10, b).await.unwrap();

  let err = h.engine.answers.apply_selection(&view, 100, 7).await.unwrap_err();
  assert!(matches!(err, SyncError::OptionOutOfRange { question_id: 100, index: 7 }));

  let err = h.engine.answers.apply_selection(&view, 999, 0).await.unwrap_err();
  assert!(matches!(err, SyncError::UnknownQuestion { form_id: 10, question_id: 999 }));

  assert!(h.unsynced().await.is_empty());
}

#[tokio::test]
async fn failed_write_does_not_advance_the_view() {
  let (h, b) = setup().await;
  let view = h.engine.answers.build_view(10, b).await.unwrap();
  let view = h.engine.answers.apply_selection(&view, 100, 0).await.unwrap();

  h.store.fail_writes(true);
  let err = h.engine.answers.apply_selection(&view, 100, 1).await.unwrap_err();
  assert!(matches!(err, SyncError::Persistence(_)));

  // Caller still holds the last good view, and it matches storage.
  assert_eq!(stored_options(&h, b, 100).await, vec![1]);
  assert_eq!(h.engine.answers.build_view(10, b).await.unwrap(), view);

  h.store.fail_writes(false);
  let view = h.engine.answers.apply_selection(&view, 100, 1).await.unwrap();
  assert_eq!(view.question(100).unwrap().selected_options().count(), 1);
  assert_eq!(stored_options(&h, b, 100).await, vec![2]);
}

#[tokio::test]
async fn notes_attach_and_clear() {
  let (h, b) = setup().await;
  let view = h.engine.answers.build_view(10, b).await.unwrap();

  let view = h
    .engine
    .answers
    .attach_note(&view, 101, Some("revisit with family".into()))
    .await
    .unwrap();
  assert!(view.question(101).unwrap().is_note_attached);
  assert!(h.engine.answers.build_view(10, b).await.unwrap().question(101).unwrap().is_note_attached);

  let view = h.engine.answers.attach_note(&view, 101, Some("  ".into())).await.unwrap();
  assert!(!view.question(101).unwrap().is_note_attached);
}

#[tokio::test]
async fn finalize_requires_mandatory_answers() {
  let (h, b) = setup().await;
  let view = h.engine.answers.build_view(10, b).await.unwrap();
  let view = h.engine.answers.apply_selection(&view, 100, 0).await.unwrap();

  let err = h.engine.answers.finalize(10, b).await.unwrap_err();
  assert!(matches!(
    err,
    SyncError::Validation(ValidationError::MandatoryUnanswered(ref codes)) if codes == &["Q102"]
  ));

  h.engine.answers.apply_selection(&view, 102, 1).await.unwrap();
  let done = h.engine.answers.finalize(10, b).await.unwrap();
  assert_eq!(done.answered_count(), 2);
}

fn mandatory_multiple_section() -> Vec<Section> {
  vec![Section {
    id:          1,
    code:        "S1".into(),
    description: "main".into(),
    questions:   vec![question(300, QuestionType::Multiple, true)],
  }]
}

#[tokio::test]
async fn clearing_every_option_unsaves_the_question() {
  let h = harness().await;
  h.gateway.publish(30, 1, mandatory_multiple_section());
  h.engine.reconciler.refresh().await.unwrap();
  let b = h.beneficiary("A").await.beneficiary_id;

  let view = h.engine.answers.build_view(30, b).await.unwrap();
  let view = h.engine.answers.apply_selection(&view, 300, 0).await.unwrap();
  assert!(view.question(300).unwrap().is_saved);

  let view = h.engine.answers.apply_selection(&view, 300, 0).await.unwrap();
  assert!(stored_options(&h, b, 300).await.is_empty());
  assert!(!view.question(300).unwrap().is_saved);
  assert_eq!(view, h.engine.answers.build_view(30, b).await.unwrap());

  let err = h.engine.answers.finalize(30, b).await.unwrap_err();
  assert!(matches!(
    err,
    SyncError::Validation(ValidationError::MandatoryUnanswered(ref codes)) if codes == &["Q300"]
  ));
}

#[tokio::test]
async fn views_of_superseded_versions_are_refused() {
  let (h, b) = setup().await;
  let old = h.engine.answers.build_view(10, b).await.unwrap();

  h.gateway.publish(10, 2, mixed_sections());
  h.engine.reconciler.refresh().await.unwrap();

  let err = h.engine.answers.apply_selection(&old, 100, 0).await.unwrap_err();
  assert!(matches!(err, SyncError::StaleForm { form_id: 10, version: 1 }));
  assert!(h.unsynced().await.is_empty());
}

#[tokio::test]
async fn filled_forms_lists_completely_answered_assigned_forms() {
  let (h, b) = setup().await;
  h.store.set_assigned_forms(b, vec![10], vec![]).await.unwrap();

  let mut view = h.engine.answers.build_view(10, b).await.unwrap();
  view = h.engine.answers.apply_selection(&view, 100, 0).await.unwrap();
  view = h.engine.answers.apply_selection(&view, 101, 0).await.unwrap();
  assert!(h.engine.answers.filled_forms(b).await.unwrap().is_empty());

  h.engine.answers.apply_selection(&view, 102, 0).await.unwrap();
  let filled = h.engine.answers.filled_forms(b).await.unwrap();
  assert_eq!(filled.len(), 1);
  assert_eq!(filled[0].form_id, 10);
  assert!(!filled[0].synced);
}

#[tokio::test]
async fn views_need_a_known_beneficiary() {
  let (h, _) = setup().await;
  let err = h.engine.answers.build_view(10, 404).await.unwrap_err();
  assert!(matches!(err, SyncError::BeneficiaryNotFound(404)));
}
