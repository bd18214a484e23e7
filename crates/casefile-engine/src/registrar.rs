//! Beneficiary lifecycle: local creation under a temporary id, profile
//! edits, and registration with the remote.

use std::sync::Arc;

use casefile_core::{
  beneficiary::{Beneficiary, BeneficiaryRequest, FormAssignment, ProfileDraft},
  gateway::RemoteGateway,
  store::RecordStore,
};
use chrono::NaiveDate;

use crate::{Result, SyncError, dispatch::SyncDispatcher};

pub struct Registrar<S, G> {
  store:      Arc<S>,
  gateway:    Arc<G>,
  dispatcher: SyncDispatcher<S, G>,
}

impl<S, G> Registrar<S, G>
where
  S: RecordStore + 'static,
  G: RemoteGateway + 'static,
{
  pub fn new(store: Arc<S>, gateway: Arc<G>, dispatcher: SyncDispatcher<S, G>) -> Self {
    Self { store, gateway, dispatcher }
  }

  /// Validate `draft` and persist it as a new, unregistered beneficiary.
  pub async fn create(&self, draft: ProfileDraft, today: NaiveDate) -> Result<Beneficiary> {
    let profile = draft.finalize(today)?;
    let beneficiary = self
      .store
      .create_beneficiary(profile)
      .await
      .map_err(SyncError::persistence)?;
    tracing::info!(beneficiary_id = beneficiary.beneficiary_id, "beneficiary created");
    Ok(beneficiary)
  }

  pub async fn update_profile(
    &self,
    beneficiary_id: i64,
    draft: ProfileDraft,
    today: NaiveDate,
  ) -> Result<Beneficiary> {
    let profile = draft.finalize(today)?;
    self.get(beneficiary_id).await?;
    self
      .store
      .update_profile(beneficiary_id, profile)
      .await
      .map_err(SyncError::persistence)?;
    self.get(beneficiary_id).await
  }

  /// Send the beneficiary and its form selection to the remote.
  ///
  /// A beneficiary still under a temporary id takes the id the remote
  /// assigns, carrying its answers along, and its answers become eligible
  /// for sync.
  pub async fn register(
    &self,
    beneficiary_id: i64,
    forms: FormAssignment,
  ) -> Result<Beneficiary> {
    let beneficiary = self.get(beneficiary_id).await?;
    let request = BeneficiaryRequest::new(&beneficiary, &forms);

    let assigned = self.gateway.save_beneficiary(&request).await?;
    if assigned <= 0 {
      return Err(SyncError::IncorrectFormat(format!(
        "remote assigned non-positive beneficiary id {assigned}"
      )));
    }

    // The id change and the form delta commit together, so a failure leaves
    // the beneficiary under `beneficiary_id` and `register` can be retried.
    let removed = if beneficiary.is_registered() { forms.removed } else { vec![] };
    self
      .store
      .record_registration(beneficiary_id, assigned, forms.added, removed)
      .await
      .map_err(SyncError::persistence)?;

    tracing::info!(from = beneficiary_id, to = assigned, "beneficiary registered");
    self.dispatcher.spawn_sync();
    self.get(assigned).await
  }

  async fn get(&self, beneficiary_id: i64) -> Result<Beneficiary> {
    self
      .store
      .get_beneficiary(beneficiary_id)
      .await
      .map_err(SyncError::persistence)?
      .ok_or(SyncError::BeneficiaryNotFound(beneficiary_id))
  }
}
