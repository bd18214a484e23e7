//! The derived, per-question fill state of one form for one beneficiary.
//!
//! A view is a pure function of the cached definition, the persisted answers
//! and the persisted question entities. It is never the source of truth:
//! after every mutation callers rebuild it (or take the one returned by
//! [`crate::AnswerStore`]) and compare with [`FormFillView::changed_questions`].

use std::collections::HashMap;

use casefile_core::{
  ValidationError,
  answer::{Answer, NewAnswer, QuestionRecord},
  form::{FormDefinition, FormSummary, Question, QuestionType},
};
use serde::Serialize;

/// Shown for an option that arrived without text.
pub const FALLBACK_OPTION_TEXT: &str = "Other";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionView {
  pub option_id:    i64,
  pub text:         String,
  pub is_free_text: bool,
  pub selected:     bool,
  pub user_text:    Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionView {
  pub question_id:      i64,
  pub section_id:       i64,
  pub code:             String,
  pub text:             String,
  pub kind:             QuestionType,
  pub mandatory:        bool,
  pub options:          Vec<OptionView>,
  pub is_note_attached: bool,
  /// At least one answer row is persisted.
  pub is_saved:         bool,
  /// Saved, and every persisted row has been accepted by the remote.
  pub is_synced:        bool,
}

impl QuestionView {
  fn new(section_id: i64, q: &Question) -> Self {
    Self {
      question_id: q.id,
      section_id,
      code: q.code.clone(),
      text: q.text.clone(),
      kind: q.kind,
      mandatory: q.mandatory,
      options: q
        .options
        .iter()
        .map(|o| OptionView {
          option_id:    o.id,
          text:         if o.text.trim().is_empty() {
            FALLBACK_OPTION_TEXT.to_owned()
          } else {
            o.text.clone()
          },
          is_free_text: o.is_free_text,
          selected:     false,
          user_text:    None,
        })
        .collect(),
      is_note_attached: false,
      is_saved: false,
      is_synced: false,
    }
  }

  pub fn selected_options(&self) -> impl Iterator<Item = &OptionView> {
    self.options.iter().filter(|o| o.selected)
  }

  /// Apply a tap on the option at `index`. Multi-choice questions toggle it;
  /// single-choice questions select it and clear every other option.
  ///
  /// Returns `false` when `index` is out of range.
  pub fn select(&mut self, index: usize) -> bool {
    if index >= self.options.len() {
      return false;
    }
    if self.kind.accepts_multiple() {
      let option = &mut self.options[index];
      option.selected = !option.selected;
    } else {
      for (i, option) in self.options.iter_mut().enumerate() {
        option.selected = i == index;
      }
    }
    true
  }

  /// Record free text on the option at `index`, selecting it. Text that is
  /// empty after trimming changes nothing.
  ///
  /// Returns `false` when nothing changed.
  pub fn set_free_text(&mut self, index: usize, text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() || index >= self.options.len() {
      return false;
    }
    let single = !self.kind.accepts_multiple();
    for (i, option) in self.options.iter_mut().enumerate() {
      if i == index {
        option.selected = true;
        option.user_text = Some(text.to_owned());
      } else if single {
        option.selected = false;
      }
    }
    true
  }

  /// The answer rows that persist the current selection.
  pub fn to_new_answers(&self) -> Vec<NewAnswer> {
    self
      .selected_options()
      .map(|o| NewAnswer {
        option_id:    o.option_id,
        is_free_text: o.is_free_text,
        user_text:    o.user_text.clone(),
      })
      .collect()
  }
}

/// The fill state of one form version for one beneficiary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormFillView {
  pub form:           FormSummary,
  pub beneficiary_id: i64,
  /// Questions in definition order across sections.
  pub questions:      Vec<QuestionView>,
}

impl FormFillView {
  /// `answers` and `records` may contain rows of other questions or forms;
  /// only those matching the definition's form and version are used.
  pub fn build(
    definition: &FormDefinition,
    beneficiary_id: i64,
    answers: &[Answer],
    records: &[QuestionRecord],
  ) -> Self {
    let form_id = definition.form_id();
    let version = definition.version();

    let mut by_question: HashMap<i64, Vec<&Answer>> = HashMap::new();
    for a in answers.iter().filter(|a| {
      a.beneficiary_id == beneficiary_id
        && a.form_id == form_id
        && a.form_version == version
    }) {
      by_question.entry(a.question_id).or_default().push(a);
    }

    let noted: HashMap<i64, bool> = records
      .iter()
      .filter(|r| r.key.form_id == form_id && r.key.form_version == version)
      .map(|r| (r.key.question_id, r.note.is_some()))
      .collect();

    let mut questions = Vec::with_capacity(definition.question_count());
    for section in &definition.sections {
      for q in &section.questions {
        let mut view = QuestionView::new(section.id, q);
        let rows = by_question.get(&q.id).map(Vec::as_slice).unwrap_or_default();

        for option in &mut view.options {
          if let Some(row) = rows.iter().find(|a| a.option_id == option.option_id) {
            option.selected = row.selected;
            option.user_text = row.user_text.clone();
          }
        }
        debug_assert!(
          view.kind.accepts_multiple() || view.selected_options().count() <= 1,
          "single-choice question {} has several selected options",
          q.id
        );

        view.is_saved = !rows.is_empty();
        view.is_synced = view.is_saved && rows.iter().all(|a| a.synced);
        view.is_note_attached = noted.get(&q.id).copied().unwrap_or(false);
        questions.push(view);
      }
    }

    Self { form: definition.summary.clone(), beneficiary_id, questions }
  }

  pub fn question(&self, question_id: i64) -> Option<&QuestionView> {
    self.questions.iter().find(|q| q.question_id == question_id)
  }

  pub(crate) fn question_mut(&mut self, question_id: i64) -> Option<&mut QuestionView> {
    self.questions.iter_mut().find(|q| q.question_id == question_id)
  }

  /// Index to open the form at for `question_id`; the first question when
  /// the form has no such question.
  pub fn position(&self, question_id: i64) -> usize {
    self
      .questions
      .iter()
      .position(|q| q.question_id == question_id)
      .unwrap_or(0)
  }

  pub fn answered_count(&self) -> usize {
    self.questions.iter().filter(|q| q.is_saved).count()
  }

  pub fn is_synced(&self) -> bool {
    self.questions.iter().filter(|q| q.is_saved).all(|q| q.is_synced)
  }

  /// Every mandatory question carries a saved answer.
  pub fn validate(&self) -> Result<(), ValidationError> {
    let missing: Vec<String> = self
      .questions
      .iter()
      .filter(|q| q.mandatory && !q.is_saved)
      .map(|q| q.code.clone())
      .collect();
    if missing.is_empty() {
      Ok(())
    } else {
      Err(ValidationError::MandatoryUnanswered(missing))
    }
  }

  /// Ids of the questions whose state differs between `self` and `newer`,
  /// including questions present in only one of them.
  pub fn changed_questions(&self, newer: &FormFillView) -> Vec<i64> {
    let before: HashMap<i64, &QuestionView> =
      self.questions.iter().map(|q| (q.question_id, q)).collect();

    let mut changed: Vec<i64> = newer
      .questions
      .iter()
      .filter(|q| before.get(&q.question_id).is_none_or(|old| **old != **q))
      .map(|q| q.question_id)
      .collect();
    changed.extend(
      self
        .questions
        .iter()
        .filter(|q| newer.question(q.question_id).is_none())
        .map(|q| q.question_id),
    );
    changed
  }
}
