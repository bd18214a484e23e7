//! The `RemoteGateway` trait: the core's view of the remote system.
//!
//! Every call is a single request/response attempt. Retry policy belongs to
//! the callers (reconciler and sync dispatcher).

use std::future::Future;

use thiserror::Error;

use crate::{
  answer::AnswerBatch,
  beneficiary::{BeneficiaryRequest, City, County},
  form::{FormSummary, Section},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
  /// Transport failure, timeout or a transient server status.
  #[error("network error: {0}")]
  Network(String),

  /// The remote answered with a body that could not be used.
  #[error("incorrect format: {0}")]
  IncorrectFormat(String),

  #[error("request rejected with status {status}: {message}")]
  Rejected { status: u16, message: String },
}

impl GatewayError {
  /// Whether repeating the same call later may succeed.
  pub fn is_retryable(&self) -> bool { matches!(self, Self::Network(_)) }
}

pub trait RemoteGateway: Send + Sync {
  /// Current summary of every form available to the user.
  fn fetch_form_summaries(
    &self,
  ) -> impl Future<Output = Result<Vec<FormSummary>, GatewayError>> + Send + '_;

  /// The sections of the latest version of `form_id`.
  fn fetch_form_definition(
    &self,
    form_id: i64,
  ) -> impl Future<Output = Result<Vec<Section>, GatewayError>> + Send + '_;

  /// Push one batch; success means every answer in it was accepted.
  fn push_answers<'a>(
    &'a self,
    batch: &'a AnswerBatch,
  ) -> impl Future<Output = Result<(), GatewayError>> + Send + 'a;

  fn fetch_counties(
    &self,
  ) -> impl Future<Output = Result<Vec<County>, GatewayError>> + Send + '_;

  fn fetch_cities(
    &self,
    county_id: i64,
  ) -> impl Future<Output = Result<Vec<City>, GatewayError>> + Send + '_;

  /// Create (negative `request.id`) or update a beneficiary. Returns the
  /// server-assigned id.
  fn save_beneficiary<'a>(
    &'a self,
    request: &'a BeneficiaryRequest,
  ) -> impl Future<Output = Result<i64, GatewayError>> + Send + 'a;
}
