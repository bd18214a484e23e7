use std::time::Duration;

use casefile_core::{
  answer::{NewAnswer, NewQuestion, QuestionKey, ReplaceAnswers},
  form::QuestionType,
  gateway::GatewayError,
  store::RecordStore,
};

use super::support::*;
use crate::{SyncError, SyncStatus};

/// Answer `question_id` of `form_id` v1 directly through the store, so no
/// background pass is started.
async fn seed(h: &Harness, beneficiary_id: i64, form_id: i64, question_id: i64) {
  h.store
    .replace_answers(ReplaceAnswers {
      beneficiary_id,
      question: NewQuestion {
        key:           QuestionKey { form_id, form_version: 1, question_id },
        question_type: QuestionType::Single,
        section_id:    Some(1),
      },
      answers: vec![NewAnswer { option_id: 1, is_free_text: false, user_text: None }],
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn sync_converges_to_everything_synced() {
  let h = harness().await;
  h.registered("A", 42).await;
  for q in 1..=5 {
    seed(&h, 42, 10, q).await;
  }
  assert_eq!(h.engine.dispatcher.unsynced_count().await.unwrap(), 5);

  let report = h.engine.dispatcher.sync_unsynced_data().await.unwrap();
  assert_eq!(report.batches, 1);
  assert_eq!(report.synced_answers, 5);
  assert!(h.unsynced().await.is_empty());

  let pushed = h.gateway.pushed();
  assert_eq!(pushed.len(), 1);
  assert_eq!((pushed[0].beneficiary_id, pushed[0].form_id), (42, 10));
  assert_eq!(pushed[0].answers.len(), 5);

  let again = h.engine.dispatcher.sync_unsynced_data().await.unwrap();
  assert_eq!(again.batches, 0);
  assert_eq!(h.gateway.pushed_rows(), 5);
  assert_eq!(h.engine.dispatcher.status(), SyncStatus::Synced { answers: 0 });
}

#[tokio::test]
async fn temporary_beneficiaries_are_not_pushed() {
  let h = harness().await;
  let temp = h.beneficiary("T").await;
  seed(&h, temp.beneficiary_id, 10, 1).await;

  let report = h.engine.dispatcher.sync_unsynced_data().await.unwrap();
  assert_eq!(report.batches, 0);
  assert_eq!(h.gateway.calls("push_answers"), 0);
  assert_eq!(h.unsynced().await.len(), 1);
}

#[tokio::test]
async fn rejected_batch_stays_unsynced_until_retry() {
  let h = harness().await;
  h.registered("A", 42).await;
  seed(&h, 42, 10, 1).await;
  seed(&h, 42, 10, 2).await;

  h.gateway.fail_pushes_for_form(10, GatewayError::Network("timeout".into()));
  let mut status = h.engine.dispatcher.subscribe();
  let err = h.engine.dispatcher.sync_unsynced_data().await.unwrap_err();
  assert!(err.is_retryable());
  assert_eq!(h.unsynced().await.len(), 2);
  assert!(matches!(*status.borrow_and_update(), SyncStatus::Failed { .. }));

  h.gateway.accept_pushes();
  let report = h.engine.dispatcher.sync_unsynced_data().await.unwrap();
  assert_eq!(report.synced_answers, 2);
  assert!(h.unsynced().await.is_empty());
  assert_eq!(*status.borrow_and_update(), SyncStatus::Synced { answers: 2 });
}

#[tokio::test]
async fn accepted_batches_commit_even_when_another_fails() {
  let h = harness().await;
  h.registered("A", 42).await;
  seed(&h, 42, 10, 1).await;
  seed(&h, 42, 11, 1).await;
  h.gateway.fail_pushes_for_form(11, GatewayError::Rejected {
    status:  422,
    message: "unknown question".into(),
  });

  let err = h.engine.dispatcher.sync_unsynced_data().await.unwrap_err();
  assert!(matches!(err, SyncError::Rejected { status: 422, .. }));

  let left: Vec<i64> = h.unsynced().await.iter().map(|a| a.form_id).collect();
  assert_eq!(left, vec![11]);
}

#[tokio::test]
async fn overlapping_passes_push_each_row_once() {
  let h = harness().await;
  h.registered("A", 42).await;
  h.registered("B", 43).await;
  for q in 1..=3 {
    seed(&h, 42, 10, q).await;
    seed(&h, 43, 10, q).await;
  }
  h.gateway.set_push_delay(Duration::from_millis(20));

  let d = &h.engine.dispatcher;
  let (a, b, background) = tokio::join!(
    d.sync_unsynced_data(),
    d.sync_unsynced_data(),
    d.spawn_sync(),
  );
  a.unwrap();
  b.unwrap();
  background.unwrap();

  assert_eq!(h.gateway.pushed_rows(), 6);
  assert!(h.unsynced().await.is_empty());
}

#[tokio::test]
async fn idempotency_key_is_stable_across_retries() {
  let h = harness().await;
  h.registered("A", 42).await;
  seed(&h, 42, 10, 1).await;

  h.gateway.fail_pushes_for_form(10, GatewayError::Network("timeout".into()));
  h.engine.dispatcher.sync_unsynced_data().await.unwrap_err();
  h.gateway.accept_pushes();
  h.engine.dispatcher.sync_unsynced_data().await.unwrap();

  let ids = h.store.query_answers(&Default::default()).await.unwrap();
  let expected = crate::dispatch::idempotency_key(&[ids[0].answer_id]);
  assert_eq!(h.gateway.pushed()[0].idempotency_key, expected);
}
