//! Error type shared by every engine component.

use casefile_core::{ValidationError, gateway::GatewayError};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("network error: {0}")]
  Network(String),

  #[error("incorrect format: {0}")]
  IncorrectFormat(String),

  #[error("remote rejected the request with status {status}: {message}")]
  Rejected { status: u16, message: String },

  /// The record store or the local cache failed.
  #[error("persistence error: {0}")]
  Persistence(#[source] BoxError),

  #[error("validation failed: {0}")]
  Validation(#[from] ValidationError),

  #[error("form {0} is not cached")]
  FormNotCached(i64),

  /// A newer version of the form was installed while the caller held a view
  /// of the older one.
  #[error("form {form_id} version {version} is no longer current")]
  StaleForm { form_id: i64, version: i64 },

  #[error("question {question_id} is not part of form {form_id}")]
  UnknownQuestion { form_id: i64, question_id: i64 },

  #[error("option index {index} is out of range for question {question_id}")]
  OptionOutOfRange { question_id: i64, index: usize },

  #[error("beneficiary not found: {0}")]
  BeneficiaryNotFound(i64),

  #[error("background task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

impl SyncError {
  pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Persistence(Box::new(err))
  }

  /// Whether repeating the operation later may succeed.
  pub fn is_retryable(&self) -> bool { matches!(self, Self::Network(_)) }
}

impl From<GatewayError> for SyncError {
  fn from(err: GatewayError) -> Self {
    match err {
      GatewayError::Network(m) => Self::Network(m),
      GatewayError::IncorrectFormat(m) => Self::IncorrectFormat(m),
      GatewayError::Rejected { status, message } => {
        Self::Rejected { status, message }
      }
    }
  }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
