//! County and city lists, served from the cache and fetched on first use.

use std::sync::Arc;

use casefile_core::{
  beneficiary::{City, County},
  cache::LocalCache,
  gateway::RemoteGateway,
};

use crate::{Result, catalog::Catalog};

pub struct ReferenceData<C, G> {
  catalog: Catalog<C>,
  gateway: Arc<G>,
}

impl<C: LocalCache, G: RemoteGateway> ReferenceData<C, G> {
  pub fn new(catalog: Catalog<C>, gateway: Arc<G>) -> Self { Self { catalog, gateway } }

  pub async fn counties(&self) -> Result<Vec<County>> {
    if let Some(cached) = self.catalog.counties().await? {
      return Ok(cached);
    }
    let counties = self.gateway.fetch_counties().await?;
    self.catalog.set_counties(&counties).await?;
    tracing::debug!(count = counties.len(), "cached county list");
    Ok(counties)
  }

  pub async fn cities(&self, county_id: i64) -> Result<Vec<City>> {
    if let Some(cached) = self.catalog.cities(county_id).await? {
      return Ok(cached);
    }
    let cities = self.gateway.fetch_cities(county_id).await?;
    self.catalog.set_cities(county_id, &cities).await?;
    tracing::debug!(county_id, count = cities.len(), "cached city list");
    Ok(cities)
  }

  /// Drop the cached lists and fetch the county list again.
  pub async fn reload(&self) -> Result<Vec<County>> {
    let counties = self.gateway.fetch_counties().await?;
    self.catalog.set_counties(&counties).await?;
    for county in &counties {
      self.catalog.forget_cities(county.id).await?;
    }
    Ok(counties)
  }
}
