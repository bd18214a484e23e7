//! Pushes unsynced answers of registered beneficiaries to the remote.
//!
//! Passes are single-flight: a pass takes the dispatcher's mutex and then
//! scans for pending rows, so a pass that waited behind another never sees
//! rows the first one already flipped. A row's `synced` flag is only set
//! after the remote accepted the batch holding it.

use std::{collections::BTreeMap, sync::Arc};

use casefile_core::{
  answer::{Answer, AnswerBatch, AnswerFilter, AnswerRecord},
  gateway::RemoteGateway,
  store::RecordStore,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::{
  sync::{Mutex, watch},
  task::JoinHandle,
};
use uuid::Uuid;

use crate::{Result, SyncError};

/// Last observed state of the background sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
  Idle,
  Running,
  Synced { answers: usize },
  Failed { message: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
  /// Batches accepted by the remote.
  pub batches:        usize,
  /// Rows flipped to synced.
  pub synced_answers: usize,
}

/// Group pending answers into one batch per `(beneficiary, form)`, in key
/// order. Each batch carries the ids of its rows.
pub fn batches(pending: Vec<Answer>) -> Vec<(AnswerBatch, Vec<Uuid>)> {
  let mut groups: BTreeMap<(i64, i64), Vec<Answer>> = BTreeMap::new();
  for a in pending {
    groups.entry((a.beneficiary_id, a.form_id)).or_default().push(a);
  }

  groups
    .into_iter()
    .map(|((beneficiary_id, form_id), rows)| {
      let ids: Vec<Uuid> = rows.iter().map(|a| a.answer_id).collect();
      let batch = AnswerBatch {
        idempotency_key: idempotency_key(&ids),
        beneficiary_id,
        form_id,
        answers: rows.iter().map(AnswerRecord::from).collect(),
      };
      (batch, ids)
    })
    .collect()
}

/// SHA-256 over the sorted row ids, hex encoded. Independent of row order.
pub fn idempotency_key(ids: &[Uuid]) -> String {
  let mut sorted = ids.to_vec();
  sorted.sort();

  let mut hasher = Sha256::new();
  for id in &sorted {
    hasher.update(id.as_bytes());
  }
  hex::encode(hasher.finalize())
}

pub struct SyncDispatcher<S, G> {
  store:   Arc<S>,
  gateway: Arc<G>,
  pass:    Arc<Mutex<()>>,
  status:  Arc<watch::Sender<SyncStatus>>,
}

impl<S, G> Clone for SyncDispatcher<S, G> {
  fn clone(&self) -> Self {
    Self {
      store:   self.store.clone(),
      gateway: self.gateway.clone(),
      pass:    self.pass.clone(),
      status:  self.status.clone(),
    }
  }
}

impl<S, G> SyncDispatcher<S, G>
where
  S: RecordStore + 'static,
  G: RemoteGateway + 'static,
{
  pub fn new(store: Arc<S>, gateway: Arc<G>) -> Self {
    let (status, _) = watch::channel(SyncStatus::Idle);
    Self {
      store,
      gateway,
      pass: Arc::new(Mutex::new(())),
      status: Arc::new(status),
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<SyncStatus> { self.status.subscribe() }

  pub fn status(&self) -> SyncStatus { self.status.borrow().clone() }

  /// Number of rows a pass would currently try to push.
  pub async fn unsynced_count(&self) -> Result<usize> {
    let pending = self
      .store
      .query_answers(&AnswerFilter::pending_sync())
      .await
      .map_err(SyncError::persistence)?;
    Ok(pending.len())
  }

  /// Push every pending answer. Every batch is attempted; accepted batches
  /// are committed even when others fail, in which case the first failure
  /// is returned.
  pub async fn sync_unsynced_data(&self) -> Result<SyncReport> {
    let _pass = self.pass.lock().await;
    self.status.send_replace(SyncStatus::Running);

    let result = self.run_pass().await;
    self.status.send_replace(match &result {
      Ok(report) => SyncStatus::Synced { answers: report.synced_answers },
      Err(e) => SyncStatus::Failed { message: e.to_string() },
    });
    result
  }

  /// Run a pass in the background. Failures are logged and published on
  /// [`SyncDispatcher::subscribe`]; nothing is returned to the caller.
  pub fn spawn_sync(&self) -> JoinHandle<()> {
    let this = self.clone();
    tokio::spawn(async move {
      match this.sync_unsynced_data().await {
        Ok(report) if report.batches > 0 => {
          tracing::info!(
            batches = report.batches,
            answers = report.synced_answers,
            "background sync finished"
          );
        }
        Ok(_) => {}
        Err(error) => tracing::warn!(%error, "background sync failed"),
      }
    })
  }

  async fn run_pass(&self) -> Result<SyncReport> {
    let pending = self
      .store
      .query_answers(&AnswerFilter::pending_sync())
      .await
      .map_err(SyncError::persistence)?;

    let mut report = SyncReport::default();
    if pending.is_empty() {
      return Ok(report);
    }

    let mut first_failure = None;
    for (batch, ids) in batches(pending) {
      match self.gateway.push_answers(&batch).await {
        Ok(()) => {
          let flipped = self
            .store
            .mark_synced(ids)
            .await
            .map_err(SyncError::persistence)?;
          report.batches += 1;
          report.synced_answers += flipped;
          tracing::debug!(
            beneficiary_id = batch.beneficiary_id,
            form_id = batch.form_id,
            flipped,
            "batch accepted"
          );
        }
        Err(error) => {
          tracing::warn!(
            beneficiary_id = batch.beneficiary_id,
            form_id = batch.form_id,
            %error,
            "batch push failed"
          );
          first_failure.get_or_insert(error);
        }
      }
    }

    match first_failure {
      Some(error) => Err(error.into()),
      None => Ok(report),
    }
  }
}
