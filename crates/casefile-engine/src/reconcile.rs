//! Form version reconciliation.
//!
//! Compares the remote form summaries against the installed ones and brings
//! every stale or missing form up to date. Forms are fetched concurrently;
//! one form failing never blocks the others.
//!
//! Per form, the order is: fetch the definition, then (under the form's write
//! lock) install the new definition and purge answers of older versions. A
//! failed or empty fetch, or a failed install, leaves both the old definition
//! and its answers in place. Dropping a reconciliation future aborts its
//! outstanding tasks.
//!
//! Answers of versions below the installed one are unreachable: views and
//! writes are scoped to the installed version. A purge that did not run
//! (failed, or its task was aborted after the install) is caught up by the
//! sweep at the start of the next reconciliation.

use std::{collections::HashMap, sync::Arc};

use casefile_core::{
  cache::LocalCache,
  form::{FormDefinition, FormSummary},
  gateway::RemoteGateway,
  store::RecordStore,
};
use tokio::task::JoinSet;

use crate::{Result, SyncError, catalog::Catalog, locks::KeyedLocks};

// ─── Plan ─────────────────────────────────────────────────────────────────────

/// One form whose remote version is newer than the installed one (or that is
/// not installed at all).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormUpdate {
  pub remote:    FormSummary,
  pub installed: Option<i64>,
}

/// Pure comparison of installed and remote summaries.
///
/// Returns the forms needing an update in form id order, plus the number
/// already current. Duplicate remote entries collapse to the highest version.
/// Forms installed locally but absent remotely are left alone.
pub fn plan(local: &[FormSummary], remote: &[FormSummary]) -> (Vec<FormUpdate>, usize) {
  let mut latest: HashMap<i64, &FormSummary> = HashMap::new();
  for s in remote {
    latest
      .entry(s.id)
      .and_modify(|cur| {
        if s.version > cur.version {
          *cur = s;
        }
      })
      .or_insert(s);
  }

  let installed: HashMap<i64, i64> =
    local.iter().map(|s| (s.id, s.version)).collect();

  let mut updates = Vec::new();
  let mut current = 0;
  for remote in latest.into_values() {
    let version = installed.get(&remote.id).copied();
    match version {
      Some(v) if v >= remote.version => current += 1,
      _ => updates.push(FormUpdate { remote: remote.clone(), installed: version }),
    }
  }
  updates.sort_by_key(|u| u.remote.id);
  (updates, current)
}

// ─── Report ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct FormFailure {
  pub form_id: i64,
  pub error:   SyncError,
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
  /// Newly installed summaries, in form id order.
  pub installed:  Vec<FormSummary>,
  pub up_to_date: usize,
  pub failures:   Vec<FormFailure>,
}

impl ReconcileReport {
  pub fn is_complete(&self) -> bool { self.failures.is_empty() }
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

enum Outcome {
  Installed(FormSummary),
  /// A concurrent reconciliation already installed this or a newer version.
  AlreadyCurrent,
}

pub struct Reconciler<S, C, G> {
  store:      Arc<S>,
  catalog:    Catalog<C>,
  gateway:    Arc<G>,
  form_locks: KeyedLocks<i64>,
}

impl<S, C, G> Reconciler<S, C, G>
where
  S: RecordStore + 'static,
  C: LocalCache + 'static,
  G: RemoteGateway + 'static,
{
  /// `form_locks` must be shared with the [`crate::AnswerStore`] writing
  /// answers for the same forms.
  pub fn new(
    store: Arc<S>,
    catalog: Catalog<C>,
    gateway: Arc<G>,
    form_locks: KeyedLocks<i64>,
  ) -> Self {
    Self { store, catalog, gateway, form_locks }
  }

  /// Fetch the remote summaries and reconcile against them.
  pub async fn refresh(&self) -> Result<ReconcileReport> {
    let remote = self.gateway.fetch_form_summaries().await?;
    self.reconcile(remote).await
  }

  /// Bring every form in `remote` up to date. Fails as a whole only when the
  /// installed summaries cannot be read; per-form failures are reported.
  pub async fn reconcile(&self, remote: Vec<FormSummary>) -> Result<ReconcileReport> {
    let local = self.catalog.form_summaries().await?;
    self.sweep(&local).await;
    let (updates, up_to_date) = plan(&local, &remote);

    let mut report = ReconcileReport { up_to_date, ..Default::default() };
    if updates.is_empty() {
      tracing::debug!(forms = up_to_date, "all forms up to date");
      return Ok(report);
    }

    let mut tasks = JoinSet::new();
    let mut task_forms = HashMap::new();
    for update in updates {
      let form_id = update.remote.id;
      let handle = tasks.spawn(update_form(
        self.store.clone(),
        self.catalog.clone(),
        self.gateway.clone(),
        self.form_locks.clone(),
        update,
      ));
      task_forms.insert(handle.id(), form_id);
    }

    while let Some(joined) = tasks.join_next_with_id().await {
      let (task_id, outcome) = match joined {
        Ok((id, outcome)) => (id, outcome),
        Err(e) => (e.id(), Err(SyncError::Task(e))),
      };
      let form_id = task_forms.get(&task_id).copied().unwrap_or_default();

      match outcome {
        Ok(Outcome::Installed(summary)) => report.installed.push(summary),
        Ok(Outcome::AlreadyCurrent) => report.up_to_date += 1,
        Err(error) => {
          tracing::warn!(form_id, %error, "form update failed");
          report.failures.push(FormFailure { form_id, error });
        }
      }
    }

    report.installed.sort_by_key(|s| s.id);
    report.failures.sort_by_key(|f| f.form_id);
    tracing::info!(
      installed = report.installed.len(),
      up_to_date = report.up_to_date,
      failed = report.failures.len(),
      "form reconciliation finished"
    );
    Ok(report)
  }

  /// Drop answers left behind by versions older than the installed ones.
  async fn sweep(&self, installed: &[FormSummary]) {
    for form in installed {
      match self.store.purge_form_versions(form.id, form.version).await {
        Ok(purged) if purged.answers > 0 || purged.questions > 0 => tracing::info!(
          form_id = form.id,
          below = form.version,
          purged_answers = purged.answers,
          "swept superseded answers"
        ),
        Ok(_) => {}
        Err(error) => tracing::warn!(form_id = form.id, %error, "sweep failed"),
      }
    }
  }
}

async fn update_form<S, C, G>(
  store: Arc<S>,
  catalog: Catalog<C>,
  gateway: Arc<G>,
  form_locks: KeyedLocks<i64>,
  update: FormUpdate,
) -> Result<Outcome>
where
  S: RecordStore,
  C: LocalCache,
  G: RemoteGateway,
{
  let summary = update.remote;
  let form_id = summary.id;

  let sections = gateway.fetch_form_definition(form_id).await?;
  if sections.is_empty() {
    return Err(SyncError::IncorrectFormat(format!(
      "form {form_id} version {} has no sections",
      summary.version
    )));
  }

  let _guard = form_locks.write(form_id).await;

  // Re-check under the lock: a concurrent pass may have won the race.
  let installed = catalog.form(form_id).await?;
  if installed.is_some_and(|cur| cur.version() >= summary.version) {
    return Ok(Outcome::AlreadyCurrent);
  }

  let definition = FormDefinition { summary: summary.clone(), sections };
  catalog.install(&definition).await?;

  let purged = store
    .purge_form_versions(form_id, summary.version)
    .await
    .map_err(SyncError::persistence)?;

  tracing::info!(
    form_id,
    from = ?update.installed,
    to = summary.version,
    purged_answers = purged.answers,
    "installed form definition"
  );
  Ok(Outcome::Installed(summary))
}
