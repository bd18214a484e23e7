//! The `LocalCache` trait and its key layout.
//!
//! The cache is a versioned-by-convention key/value store: a form value
//! embeds its own summary (and so its version), which the reconciler compares
//! before replacing it.

use std::future::Future;

/// Prefix shared by every cached form definition.
pub const FORM_PREFIX: &str = "form/";

/// Key of the cached county list.
pub const COUNTIES_KEY: &str = "counties";

/// Key of one cached [`crate::form::FormDefinition`].
pub fn form_key(form_id: i64) -> String { format!("{FORM_PREFIX}{form_id}") }

/// Key of the cached city list for one county.
pub fn cities_key(county_id: i64) -> String { format!("cities/{county_id}") }

/// Abstraction over the local key/value cache.
///
/// A single `set` replaces a value atomically; there are no multi-key
/// transactions.
pub trait LocalCache: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The value stored under `key`, if any.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<serde_json::Value>, Self::Error>> + Send + 'a;

  /// Store `value` under `key`, replacing any previous value.
  fn set(
    &self,
    key: String,
    value: serde_json::Value,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Every key starting with `prefix`, in ascending order.
  fn keys<'a>(
    &'a self,
    prefix: &'a str,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;
}
