//! Typed access to the local cache: installed form definitions and
//! reference lists.
//!
//! A value that no longer decodes is logged and treated as absent, so the
//! next reconciliation fetches it again.

use std::sync::Arc;

use casefile_core::{
  beneficiary::{City, County},
  cache::{COUNTIES_KEY, FORM_PREFIX, LocalCache, cities_key, form_key},
  form::{FormDefinition, FormSummary},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{Result, SyncError};

pub struct Catalog<C> {
  cache: Arc<C>,
}

impl<C> Clone for Catalog<C> {
  fn clone(&self) -> Self { Self { cache: self.cache.clone() } }
}

impl<C: LocalCache> Catalog<C> {
  pub fn new(cache: Arc<C>) -> Self { Self { cache } }

  // ── Forms ─────────────────────────────────────────────────────────────

  /// Summaries of every installed form, ordered by form id.
  pub async fn form_summaries(&self) -> Result<Vec<FormSummary>> {
    let keys = self
      .cache
      .keys(FORM_PREFIX)
      .await
      .map_err(SyncError::persistence)?;

    let mut summaries = Vec::with_capacity(keys.len());
    for key in keys {
      if let Some(def) = self.read::<FormDefinition>(&key).await? {
        summaries.push(def.summary);
      }
    }
    summaries.sort_by_key(|s| s.id);
    Ok(summaries)
  }

  pub async fn form(&self, form_id: i64) -> Result<Option<FormDefinition>> {
    self.read(&form_key(form_id)).await
  }

  /// Like [`Catalog::form`] but a missing form is an error.
  pub async fn require_form(&self, form_id: i64) -> Result<FormDefinition> {
    self.form(form_id).await?.ok_or(SyncError::FormNotCached(form_id))
  }

  /// Replace the cached definition of `definition.form_id()` in one write.
  pub async fn install(&self, definition: &FormDefinition) -> Result<()> {
    self.write(form_key(definition.form_id()), definition).await
  }

  // ── Reference lists ───────────────────────────────────────────────────

  pub async fn counties(&self) -> Result<Option<Vec<County>>> {
    self.read(COUNTIES_KEY).await
  }

  pub async fn set_counties(&self, counties: &[County]) -> Result<()> {
    self.write(COUNTIES_KEY.to_owned(), counties).await
  }

  pub async fn cities(&self, county_id: i64) -> Result<Option<Vec<City>>> {
    self.read(&cities_key(county_id)).await
  }

  pub async fn set_cities(&self, county_id: i64, cities: &[City]) -> Result<()> {
    self.write(cities_key(county_id), cities).await
  }

  pub async fn forget_cities(&self, county_id: i64) -> Result<()> {
    self
      .cache
      .remove(&cities_key(county_id))
      .await
      .map_err(SyncError::persistence)
  }

  // ── Plumbing ──────────────────────────────────────────────────────────

  async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    let Some(value) = self.cache.get(key).await.map_err(SyncError::persistence)?
    else {
      return Ok(None);
    };

    match serde_json::from_value(value) {
      Ok(v) => Ok(Some(v)),
      Err(e) => {
        tracing::warn!(key, error = %e, "discarding undecodable cache entry");
        Ok(None)
      }
    }
  }

  async fn write<T: Serialize + ?Sized>(&self, key: String, value: &T) -> Result<()> {
    let value = serde_json::to_value(value).map_err(SyncError::persistence)?;
    self.cache.set(key, value).await.map_err(SyncError::persistence)
  }
}
