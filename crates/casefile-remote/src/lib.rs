//! [`RemoteGateway`] over the casefile HTTP/JSON API.
//!
//! | Call                    | Request                        |
//! |-------------------------|--------------------------------|
//! | `fetch_form_summaries`  | `GET /forms`                   |
//! | `fetch_form_definition` | `GET /forms/{id}`              |
//! | `push_answers`          | `POST /answers`                |
//! | `fetch_counties`        | `GET /counties`                |
//! | `fetch_cities`          | `GET /counties/{id}/cities`    |
//! | `save_beneficiary`      | `POST /beneficiaries` or `PUT /beneficiaries/{id}` |
//!
//! Bodies are the serde forms of the `casefile-core` types.

use std::time::Duration;

use casefile_core::{
  answer::AnswerBatch,
  beneficiary::{BeneficiaryRequest, City, County},
  form::{FormSummary, Section},
  gateway::{GatewayError, RemoteGateway},
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};

/// Header carrying [`AnswerBatch::idempotency_key`].
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Connection settings for the remote API.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
  pub base_url: String,
  /// Sent as a bearer token when present.
  pub token:    Option<String>,
  pub timeout:  Duration,
}

/// Body of a successful beneficiary save.
#[derive(Debug, Deserialize)]
struct SavedBeneficiary {
  id: i64,
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpGateway {
  client: Client,
  config: GatewayConfig,
}

impl HttpGateway {
  pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
    let client = Client::builder()
      .timeout(config.timeout)
      .build()
      .map_err(|e| GatewayError::Network(format!("failed to build HTTP client: {e}")))?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    match &self.config.token {
      Some(token) => req.bearer_auth(token),
      None => req,
    }
  }

  async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response, GatewayError> {
    let resp = self
      .auth(req)
      .send()
      .await
      .map_err(|e| transport_error(what, e))?;

    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    tracing::debug!(%status, what, "remote returned an error status");
    Err(status_error(status, message))
  }

  async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
    let what = format!("GET {path}");
    let resp = self.send(self.client.get(self.url(path)), &what).await?;
    decode(resp, &what).await
  }
}

/// Transient statuses are retryable; any other failure status is a
/// rejection.
fn status_error(status: StatusCode, message: String) -> GatewayError {
  if status.is_server_error()
    || status == StatusCode::REQUEST_TIMEOUT
    || status == StatusCode::TOO_MANY_REQUESTS
  {
    GatewayError::Network(format!("{status}: {message}"))
  } else {
    GatewayError::Rejected { status: status.as_u16(), message }
  }
}

fn transport_error(what: &str, err: reqwest::Error) -> GatewayError {
  if err.is_decode() {
    GatewayError::IncorrectFormat(format!("{what}: {err}"))
  } else {
    GatewayError::Network(format!("{what}: {err}"))
  }
}

async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T, GatewayError> {
  let body = resp.bytes().await.map_err(|e| transport_error(what, e))?;
  if body.is_empty() {
    return Err(GatewayError::IncorrectFormat(format!("{what}: empty body")));
  }
  serde_json::from_slice(&body)
    .map_err(|e| GatewayError::IncorrectFormat(format!("{what}: {e}")))
}

impl RemoteGateway for HttpGateway {
  async fn fetch_form_summaries(&self) -> Result<Vec<FormSummary>, GatewayError> {
    self.get_json("/forms").await
  }

  async fn fetch_form_definition(&self, form_id: i64) -> Result<Vec<Section>, GatewayError> {
    self.get_json(&format!("/forms/{form_id}")).await
  }

  async fn push_answers(&self, batch: &AnswerBatch) -> Result<(), GatewayError> {
    let req = self
      .client
      .post(self.url("/answers"))
      .header(IDEMPOTENCY_HEADER, &batch.idempotency_key)
      .json(batch);
    self.send(req, "POST /answers").await?;
    tracing::debug!(
      beneficiary_id = batch.beneficiary_id,
      form_id = batch.form_id,
      answers = batch.answers.len(),
      "pushed answer batch"
    );
    Ok(())
  }

  async fn fetch_counties(&self) -> Result<Vec<County>, GatewayError> {
    self.get_json("/counties").await
  }

  async fn fetch_cities(&self, county_id: i64) -> Result<Vec<City>, GatewayError> {
    self.get_json(&format!("/counties/{county_id}/cities")).await
  }

  async fn save_beneficiary(&self, request: &BeneficiaryRequest) -> Result<i64, GatewayError> {
    let (req, what) = if request.id > 0 {
      let path = format!("/beneficiaries/{}", request.id);
      (self.client.put(self.url(&path)), format!("PUT {path}"))
    } else {
      (self.client.post(self.url("/beneficiaries")), "POST /beneficiaries".to_owned())
    };
    let resp = self.send(req.json(request), &what).await?;
    let saved: SavedBeneficiary = decode(resp, &what).await?;
    Ok(saved.id)
  }
}
