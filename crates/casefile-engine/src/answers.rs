//! Answer persistence behind a [`FormFillView`].
//!
//! Every mutation is: copy the question's view state, apply the edit to the
//! copy, replace the persisted answer set in one store transaction, and only
//! then return the advanced view. A failed write returns the error and the
//! caller keeps its previous view. Successful writes trigger a background
//! sync.
//!
//! Writes to one `(beneficiary, question)` are serialised. They also hold the
//! form's shared lock so a reconciliation cannot install a newer version in
//! the middle of a write.

use std::{collections::HashSet, sync::Arc};

use casefile_core::{
  answer::{AnswerFilter, NewQuestion, QuestionKey, ReplaceAnswers},
  beneficiary::Beneficiary,
  cache::LocalCache,
  gateway::RemoteGateway,
  store::RecordStore,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  Result, SyncError,
  catalog::Catalog,
  dispatch::SyncDispatcher,
  locks::KeyedLocks,
  view::{FormFillView, QuestionView},
};

/// A form the beneficiary answered completely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilledForm {
  pub form_id:      i64,
  pub form_version: i64,
  pub description:  String,
  /// Earliest fill date among the form's answers.
  pub filled_on:    DateTime<Utc>,
  pub synced:       bool,
}

pub struct AnswerStore<S, C, G> {
  store:          Arc<S>,
  catalog:        Catalog<C>,
  dispatcher:     SyncDispatcher<S, G>,
  form_locks:     KeyedLocks<i64>,
  question_locks: KeyedLocks<(i64, i64)>,
}

impl<S, C, G> AnswerStore<S, C, G>
where
  S: RecordStore + 'static,
  C: LocalCache + 'static,
  G: RemoteGateway + 'static,
{
  /// `form_locks` must be the set shared with the [`crate::Reconciler`].
  pub fn new(
    store: Arc<S>,
    catalog: Catalog<C>,
    dispatcher: SyncDispatcher<S, G>,
    form_locks: KeyedLocks<i64>,
  ) -> Self {
    Self {
      store,
      catalog,
      dispatcher,
      form_locks,
      question_locks: KeyedLocks::new(),
    }
  }

  /// Build the view of the installed version of `form_id`.
  pub async fn build_view(&self, form_id: i64, beneficiary_id: i64) -> Result<FormFillView> {
    self.require_beneficiary(beneficiary_id).await?;
    let definition = self.catalog.require_form(form_id).await?;

    let filter = AnswerFilter::for_beneficiary(beneficiary_id)
      .form(form_id, definition.version());
    let answers = self
      .store
      .query_answers(&filter)
      .await
      .map_err(SyncError::persistence)?;
    let records = self
      .store
      .questions_for_form(form_id, definition.version())
      .await
      .map_err(SyncError::persistence)?;

    Ok(FormFillView::build(&definition, beneficiary_id, &answers, &records))
  }

  /// Tap option `option_index` of `question_id`.
  pub async fn apply_selection(
    &self,
    view: &FormFillView,
    question_id: i64,
    option_index: usize,
  ) -> Result<FormFillView> {
    let mut question = self.question_of(view, question_id)?;
    if !question.select(option_index) {
      return Err(SyncError::OptionOutOfRange { question_id, index: option_index });
    }
    self.commit(view, question).await
  }

  /// Enter free text on option `option_index` of `question_id`. Blank text
  /// leaves the view and the store untouched.
  pub async fn apply_free_text(
    &self,
    view: &FormFillView,
    question_id: i64,
    option_index: usize,
    text: &str,
  ) -> Result<FormFillView> {
    let mut question = self.question_of(view, question_id)?;
    if option_index >= question.options.len() {
      return Err(SyncError::OptionOutOfRange { question_id, index: option_index });
    }
    if !question.set_free_text(option_index, text) {
      return Ok(view.clone());
    }
    self.commit(view, question).await
  }

  /// Set (or with `None`, clear) the note on `question_id`.
  pub async fn attach_note(
    &self,
    view: &FormFillView,
    question_id: i64,
    note: Option<String>,
  ) -> Result<FormFillView> {
    let question = self.question_of(view, question_id)?;
    let note = note.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty());

    let _form = self.form_locks.read(view.form.id).await;
    self.ensure_current(view).await?;

    let record = self
      .store
      .set_note(new_question(view, &question), note)
      .await
      .map_err(SyncError::persistence)?;

    let mut next = view.clone();
    if let Some(q) = next.question_mut(question_id) {
      q.is_note_attached = record.note.is_some();
    }
    Ok(next)
  }

  /// Check that every mandatory question of the installed version of
  /// `form_id` has a stored answer. The check runs against a freshly built
  /// view, never against one held by the caller.
  pub async fn finalize(&self, form_id: i64, beneficiary_id: i64) -> Result<FormFillView> {
    let view = self.build_view(form_id, beneficiary_id).await?;
    view.validate()?;
    tracing::info!(form_id, beneficiary_id, "form finalised");
    Ok(view)
  }

  /// The assigned forms `beneficiary_id` answered completely, in form id
  /// order. Forms that are not installed are skipped.
  pub async fn filled_forms(&self, beneficiary_id: i64) -> Result<Vec<FilledForm>> {
    let beneficiary = self.require_beneficiary(beneficiary_id).await?;

    let mut filled = Vec::new();
    for form_id in beneficiary.forms {
      let Some(definition) = self.catalog.form(form_id).await? else {
        continue;
      };
      let filter = AnswerFilter::for_beneficiary(beneficiary_id)
        .form(form_id, definition.version());
      let answers = self
        .store
        .query_answers(&filter)
        .await
        .map_err(SyncError::persistence)?;

      let answered: HashSet<i64> = answers.iter().map(|a| a.question_id).collect();
      let complete = definition.questions().all(|q| answered.contains(&q.id));
      let Some(filled_on) = answers.iter().map(|a| a.fill_date).min() else {
        continue;
      };
      if complete {
        filled.push(FilledForm {
          form_id,
          form_version: definition.version(),
          description: definition.summary.description.clone(),
          filled_on,
          synced: answers.iter().all(|a| a.synced),
        });
      }
    }
    filled.sort_by_key(|f| f.form_id);
    Ok(filled)
  }

  // ── Internals ─────────────────────────────────────────────────────────

  fn question_of(&self, view: &FormFillView, question_id: i64) -> Result<QuestionView> {
    view.question(question_id).cloned().ok_or(SyncError::UnknownQuestion {
      form_id: view.form.id,
      question_id,
    })
  }

  async fn require_beneficiary(
    &self,
    beneficiary_id: i64,
  ) -> Result<Beneficiary> {
    self
      .store
      .get_beneficiary(beneficiary_id)
      .await
      .map_err(SyncError::persistence)?
      .ok_or(SyncError::BeneficiaryNotFound(beneficiary_id))
  }

  /// Fails when the installed version differs from the one `view` shows.
  async fn ensure_current(&self, view: &FormFillView) -> Result<()> {
    let installed = self.catalog.require_form(view.form.id).await?;
    if installed.version() != view.form.version {
      return Err(SyncError::StaleForm {
        form_id: view.form.id,
        version: view.form.version,
      });
    }
    Ok(())
  }

  async fn commit(&self, view: &FormFillView, mut question: QuestionView) -> Result<FormFillView> {
    let question_id = question.question_id;
    let _form = self.form_locks.read(view.form.id).await;
    let _question = self
      .question_locks
      .write((view.beneficiary_id, question_id))
      .await;
    self.ensure_current(view).await?;

    let input = ReplaceAnswers {
      beneficiary_id: view.beneficiary_id,
      question:       new_question(view, &question),
      answers:        question.to_new_answers(),
    };
    let rows = self
      .store
      .replace_answers(input)
      .await
      .map_err(SyncError::persistence)?;

    tracing::debug!(
      beneficiary_id = view.beneficiary_id,
      form_id = view.form.id,
      question_id,
      answers = rows.len(),
      "answers replaced"
    );

    question.is_saved = !rows.is_empty();
    question.is_synced = false;
    let mut next = view.clone();
    if let Some(q) = next.question_mut(question_id) {
      *q = question;
    }

    self.dispatcher.spawn_sync();
    Ok(next)
  }
}

fn new_question(view: &FormFillView, question: &QuestionView) -> NewQuestion {
  NewQuestion {
    key:           QuestionKey {
      form_id:      view.form.id,
      form_version: view.form.version,
      question_id:  question.question_id,
    },
    question_type: question.kind,
    section_id:    Some(question.section_id),
  }
}
