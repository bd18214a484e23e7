//! Error types for `casefile-core`.

use chrono::NaiveDate;
use thiserror::Error;

use crate::beneficiary::ProfileFieldKind;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown question type code: {0}")]
  UnknownQuestionType(i64),

  #[error("unknown civil status code: {0}")]
  UnknownCivilStatus(i64),

  #[error("unknown gender code: {0}")]
  UnknownGender(i64),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// A user-facing validation failure that blocks finalisation of a form or a
/// beneficiary profile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("required field missing: {0:?}")]
  MissingField(ProfileFieldKind),

  #[error("a city cannot be chosen before a county")]
  CountyNotSelected,

  #[error("birth date {0} is in the future")]
  BirthDateInFuture(NaiveDate),

  /// Codes of the mandatory questions that have no saved answer.
  #[error("mandatory questions unanswered: {}", .0.join(", "))]
  MandatoryUnanswered(Vec<String>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
