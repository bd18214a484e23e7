//! Test doubles and fixtures shared by the engine tests.

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use casefile_core::{
  answer::{Answer, AnswerBatch, AnswerFilter, NewQuestion, QuestionRecord, ReplaceAnswers},
  cache::LocalCache,
  beneficiary::{
    Beneficiary, BeneficiaryProfile, BeneficiaryRequest, City, CivilStatus, County, Gender,
    Place, ProfileDraft,
  },
  form::{AnswerOption, FormSummary, Question, QuestionType, Section},
  gateway::{GatewayError, RemoteGateway},
  store::{PurgeCount, RecordStore},
};
use casefile_store_sqlite::SqliteStore;
use chrono::NaiveDate;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::Engine;

// ─── Scripted gateway ────────────────────────────────────────────────────────

#[derive(Default)]
struct Script {
  summaries:      Vec<FormSummary>,
  definitions:    HashMap<i64, Result<Vec<Section>, GatewayError>>,
  push_failures:  HashMap<i64, GatewayError>,
  pushed:         Vec<AnswerBatch>,
  counties:       Vec<County>,
  cities:         HashMap<i64, Vec<City>>,
  saved:          Vec<BeneficiaryRequest>,
  next_id:        i64,
  assigned_id:    Option<i64>,
  calls:          HashMap<&'static str, usize>,
}

/// A [`RemoteGateway`] answering from in-memory state the test controls.
#[derive(Default)]
pub struct ScriptedGateway {
  script:               Mutex<Script>,
  push_delay:           Mutex<Option<Duration>>,
  hold_definitions:     AtomicBool,
  definition_requested: Notify,
}

impl ScriptedGateway {
  fn with<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
    f(&mut self.script.lock().unwrap())
  }

  /// Publish `version` of form `id` with the given sections.
  pub fn publish(&self, id: i64, version: i64, sections: Vec<Section>) {
    self.with(|s| {
      s.summaries.retain(|f| f.id != id);
      s.summaries.push(summary(id, version));
      s.definitions.insert(id, Ok(sections));
    });
  }

  pub fn fail_definition(&self, id: i64, error: GatewayError) {
    self.with(|s| s.definitions.insert(id, Err(error)));
  }

  pub fn fail_pushes_for_form(&self, form_id: i64, error: GatewayError) {
    self.with(|s| s.push_failures.insert(form_id, error));
  }

  pub fn accept_pushes(&self) { self.with(|s| s.push_failures.clear()); }

  pub fn set_push_delay(&self, delay: Duration) {
    *self.push_delay.lock().unwrap() = Some(delay);
  }

  /// While set, definition fetches never complete.
  pub fn hold_definitions(&self, hold: bool) {
    self.hold_definitions.store(hold, Ordering::SeqCst);
  }

  /// Resolves once a held definition fetch has started.
  pub async fn definition_requested(&self) { self.definition_requested.notified().await }

  pub fn pushed(&self) -> Vec<AnswerBatch> { self.with(|s| s.pushed.clone()) }

  /// Total rows across every accepted batch.
  pub fn pushed_rows(&self) -> usize {
    self.with(|s| s.pushed.iter().map(|b| b.answers.len()).sum())
  }

  pub fn set_counties(&self, counties: Vec<County>) { self.with(|s| s.counties = counties); }

  pub fn set_cities(&self, county_id: i64, cities: Vec<City>) {
    self.with(|s| s.cities.insert(county_id, cities));
  }

  pub fn saved(&self) -> Vec<BeneficiaryRequest> { self.with(|s| s.saved.clone()) }

  /// Make `save_beneficiary` answer with `id` instead of the next counter.
  pub fn assign_id(&self, id: i64) { self.with(|s| s.assigned_id = Some(id)); }

  pub fn calls(&self, name: &str) -> usize {
    self.with(|s| s.calls.get(name).copied().unwrap_or(0))
  }

  fn record(&self, name: &'static str) {
    self.with(|s| *s.calls.entry(name).or_default() += 1);
  }
}

impl RemoteGateway for ScriptedGateway {
  async fn fetch_form_summaries(&self) -> Result<Vec<FormSummary>, GatewayError> {
    self.record("fetch_form_summaries");
    Ok(self.with(|s| s.summaries.clone()))
  }

  async fn fetch_form_definition(&self, form_id: i64) -> Result<Vec<Section>, GatewayError> {
    self.record("fetch_form_definition");
    if self.hold_definitions.load(Ordering::SeqCst) {
      self.definition_requested.notify_one();
      std::future::pending::<()>().await;
    }
    self.with(|s| {
      s.definitions
        .get(&form_id)
        .cloned()
        .unwrap_or_else(|| Err(GatewayError::Rejected { status: 404, message: "no form".into() }))
    })
  }

  async fn push_answers(&self, batch: &AnswerBatch) -> Result<(), GatewayError> {
    self.record("push_answers");
    let delay = *self.push_delay.lock().unwrap();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    self.with(|s| {
      if let Some(err) = s.push_failures.get(&batch.form_id) {
        return Err(err.clone());
      }
      s.pushed.push(batch.clone());
      Ok(())
    })
  }

  async fn fetch_counties(&self) -> Result<Vec<County>, GatewayError> {
    self.record("fetch_counties");
    Ok(self.with(|s| s.counties.clone()))
  }

  async fn fetch_cities(&self, county_id: i64) -> Result<Vec<City>, GatewayError> {
    self.record("fetch_cities");
    Ok(self.with(|s| s.cities.get(&county_id).cloned().unwrap_or_default()))
  }

  async fn save_beneficiary(&self, request: &BeneficiaryRequest) -> Result<i64, GatewayError> {
    self.record("save_beneficiary");
    Ok(self.with(|s| {
      s.saved.push(request.clone());
      if request.id > 0 {
        return request.id;
      }
      s.assigned_id.take().unwrap_or_else(|| {
        s.next_id += 1;
        100 + s.next_id
      })
    }))
  }
}

// ─── Failing store ───────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FlakyError {
  #[error("injected write failure")]
  Injected,

  #[error(transparent)]
  Store(#[from] casefile_store_sqlite::Error),
}

fn injected(flag: &AtomicBool) -> Result<(), FlakyError> {
  if flag.load(Ordering::SeqCst) {
    return Err(FlakyError::Injected);
  }
  Ok(())
}

/// Wraps a [`SqliteStore`]. Answer, note and registration writes fail while
/// `fail_writes` is set; version purges fail while `fail_purges` is set.
pub struct FlakyStore {
  inner:       SqliteStore,
  fail_writes: AtomicBool,
  fail_purges: AtomicBool,
}

impl FlakyStore {
  pub fn new(inner: SqliteStore) -> Self {
    Self { inner, fail_writes: AtomicBool::new(false), fail_purges: AtomicBool::new(false) }
  }

  pub fn fail_writes(&self, fail: bool) { self.fail_writes.store(fail, Ordering::SeqCst); }

  pub fn fail_purges(&self, fail: bool) { self.fail_purges.store(fail, Ordering::SeqCst); }

  fn check(&self) -> Result<(), FlakyError> { injected(&self.fail_writes) }
}

impl RecordStore for FlakyStore {
  type Error = FlakyError;

  async fn create_beneficiary(&self, profile: BeneficiaryProfile) -> Result<Beneficiary, FlakyError> {
    Ok(self.inner.create_beneficiary(profile).await?)
  }

  async fn get_beneficiary(&self, id: i64) -> Result<Option<Beneficiary>, FlakyError> {
    Ok(self.inner.get_beneficiary(id).await?)
  }

  async fn list_beneficiaries(&self) -> Result<Vec<Beneficiary>, FlakyError> {
    Ok(self.inner.list_beneficiaries().await?)
  }

  async fn update_profile(&self, id: i64, profile: BeneficiaryProfile) -> Result<(), FlakyError> {
    Ok(self.inner.update_profile(id, profile).await?)
  }

  async fn assign_beneficiary_id(&self, temporary: i64, permanent: i64) -> Result<(), FlakyError> {
    Ok(self.inner.assign_beneficiary_id(temporary, permanent).await?)
  }

  async fn set_assigned_forms(
    &self,
    id: i64,
    added: Vec<i64>,
    removed: Vec<i64>,
  ) -> Result<(), FlakyError> {
    Ok(self.inner.set_assigned_forms(id, added, removed).await?)
  }

  async fn record_registration(
    &self,
    id: i64,
    permanent_id: i64,
    added: Vec<i64>,
    removed: Vec<i64>,
  ) -> Result<(), FlakyError> {
    self.check()?;
    Ok(self.inner.record_registration(id, permanent_id, added, removed).await?)
  }

  async fn questions_for_form(&self, form_id: i64, version: i64) -> Result<Vec<QuestionRecord>, FlakyError> {
    Ok(self.inner.questions_for_form(form_id, version).await?)
  }

  async fn set_note(&self, question: NewQuestion, note: Option<String>) -> Result<QuestionRecord, FlakyError> {
    self.check()?;
    Ok(self.inner.set_note(question, note).await?)
  }

  async fn purge_form_versions(&self, form_id: i64, below: i64) -> Result<PurgeCount, FlakyError> {
    injected(&self.fail_purges)?;
    Ok(self.inner.purge_form_versions(form_id, below).await?)
  }

  async fn query_answers(&self, filter: &AnswerFilter) -> Result<Vec<Answer>, FlakyError> {
    Ok(self.inner.query_answers(filter).await?)
  }

  async fn replace_answers(&self, input: ReplaceAnswers) -> Result<Vec<Answer>, FlakyError> {
    self.check()?;
    Ok(self.inner.replace_answers(input).await?)
  }

  async fn mark_synced(&self, ids: Vec<Uuid>) -> Result<usize, FlakyError> {
    Ok(self.inner.mark_synced(ids).await?)
  }
}

// ─── Failing cache ───────────────────────────────────────────────────────────

/// Wraps a [`SqliteStore`] as the cache; `set` fails while `fail_sets` is set.
pub struct FlakyCache {
  inner:     SqliteStore,
  fail_sets: AtomicBool,
}

impl FlakyCache {
  pub fn new(inner: SqliteStore) -> Self { Self { inner, fail_sets: AtomicBool::new(false) } }

  pub fn fail_sets(&self, fail: bool) { self.fail_sets.store(fail, Ordering::SeqCst); }
}

impl LocalCache for FlakyCache {
  type Error = FlakyError;

  async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, FlakyError> {
    Ok(self.inner.get(key).await?)
  }

  async fn set(&self, key: String, value: serde_json::Value) -> Result<(), FlakyError> {
    injected(&self.fail_sets)?;
    Ok(self.inner.set(key, value).await?)
  }

  async fn remove(&self, key: &str) -> Result<(), FlakyError> { Ok(self.inner.remove(key).await?) }

  async fn keys(&self, prefix: &str) -> Result<Vec<String>, FlakyError> {
    Ok(self.inner.keys(prefix).await?)
  }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

pub struct Harness {
  pub engine:  Engine<FlakyStore, FlakyCache, ScriptedGateway>,
  pub store:   Arc<FlakyStore>,
  pub cache:   Arc<FlakyCache>,
  pub sqlite:  SqliteStore,
  pub gateway: Arc<ScriptedGateway>,
}

pub async fn harness() -> Harness {
  let sqlite = SqliteStore::open_in_memory().await.expect("in-memory store");
  let store = Arc::new(FlakyStore::new(sqlite.clone()));
  let cache = Arc::new(FlakyCache::new(sqlite.clone()));
  let gateway = Arc::new(ScriptedGateway::default());
  let engine = Engine::new(store.clone(), cache.clone(), gateway.clone());
  Harness { engine, store, cache, sqlite, gateway }
}

impl Harness {
  /// A beneficiary under a temporary id.
  pub async fn beneficiary(&self, name: &str) -> Beneficiary {
    self.store.create_beneficiary(profile(name)).await.unwrap()
  }

  /// A beneficiary already known to the remote under `id`.
  pub async fn registered(&self, name: &str, id: i64) -> Beneficiary {
    let b = self.beneficiary(name).await;
    self.store.assign_beneficiary_id(b.beneficiary_id, id).await.unwrap();
    self.store.get_beneficiary(id).await.unwrap().unwrap()
  }

  pub async fn unsynced(&self) -> Vec<Answer> {
    self
      .store
      .query_answers(&AnswerFilter { synced: Some(false), ..Default::default() })
      .await
      .unwrap()
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

pub fn summary(id: i64, version: i64) -> FormSummary {
  FormSummary {
    id,
    version,
    code: format!("F{id}"),
    description: format!("form {id}"),
  }
}

pub fn options(n: i64) -> Vec<AnswerOption> {
  (1..=n)
    .map(|id| AnswerOption { id, text: format!("option {id}"), is_free_text: false })
    .collect()
}

pub fn question(id: i64, kind: QuestionType, mandatory: bool) -> Question {
  let mut options = options(3);
  if matches!(kind, QuestionType::SingleWithText | QuestionType::MultipleWithText) {
    options[2].is_free_text = true;
  }
  Question {
    id,
    code: format!("Q{id}"),
    text: format!("question {id}"),
    kind,
    mandatory,
    options,
  }
}

/// One section holding single-choice questions with the given ids.
pub fn sections(question_ids: &[i64]) -> Vec<Section> {
  vec![Section {
    id:          1,
    code:        "S1".into(),
    description: "main".into(),
    questions:   question_ids
      .iter()
      .map(|&id| question(id, QuestionType::Single, false))
      .collect(),
  }]
}

pub fn profile(name: &str) -> BeneficiaryProfile {
  BeneficiaryProfile {
    name:         name.into(),
    birth_date:   NaiveDate::from_ymd_opt(1944, 9, 1).unwrap(),
    civil_status: CivilStatus::Widowed,
    county:       Place { id: 1, name: "Cluj".into() },
    city:         Place { id: 10, name: "Dej".into() },
    gender:       Gender::Female,
  }
}

pub fn draft(name: &str) -> ProfileDraft { ProfileDraft::from_profile(&profile(name)) }

pub fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2026, 10, 18).unwrap() }
