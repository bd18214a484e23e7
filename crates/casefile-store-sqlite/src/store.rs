//! [`SqliteStore`], the SQLite implementation of [`RecordStore`].

use std::{collections::HashMap, path::Path};

use casefile_core::{
  answer::{Answer, AnswerFilter, NewQuestion, QuestionRecord, ReplaceAnswers},
  beneficiary::{Beneficiary, BeneficiaryProfile},
  store::{PurgeCount, RecordStore},
};
use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  encode::{
    encode_date, encode_dt, encode_uuid, RawAnswer, RawBeneficiary, RawQuestion,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Casefile record store and local cache backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Read beneficiaries matching `where_clause` together with their forms.
  async fn load_beneficiaries(
    &self,
    where_clause: &'static str,
    id: Option<i64>,
  ) -> Result<Vec<Beneficiary>> {
    let (raws, assignments): (Vec<RawBeneficiary>, Vec<(i64, i64)>) = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM beneficiaries {where_clause} ORDER BY beneficiary_id DESC",
          RawBeneficiary::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let raws = if let Some(id) = id {
          stmt
            .query_map(rusqlite::params![id], RawBeneficiary::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          stmt
            .query_map([], RawBeneficiary::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut stmt = conn.prepare(
          "SELECT beneficiary_id, form_id FROM beneficiary_forms ORDER BY form_id",
        )?;
        let assignments = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((raws, assignments))
      })
      .await?;

    let mut forms: HashMap<i64, Vec<i64>> = HashMap::new();
    for (beneficiary_id, form_id) in assignments {
      forms.entry(beneficiary_id).or_default().push(form_id);
    }

    raws
      .into_iter()
      .map(|raw| raw.into_beneficiary(&forms))
      .collect()
  }
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  // ── Beneficiaries ─────────────────────────────────────────────────────────

  async fn create_beneficiary(
    &self,
    profile: BeneficiaryProfile,
  ) -> Result<Beneficiary> {
    let created_at = Utc::now();
    let at_str     = encode_dt(created_at);
    let p          = profile.clone();

    let beneficiary_id: i64 = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let lowest: Option<i64> =
          tx.query_row("SELECT MIN(beneficiary_id) FROM beneficiaries", [], |r| {
            r.get(0)
          })?;
        let id = lowest.unwrap_or(0).min(0) - 1;
        tx.execute(
          "INSERT INTO beneficiaries (
             beneficiary_id, name, birth_date, civil_status,
             county_id, county, city_id, city, gender, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            id,
            p.name,
            encode_date(p.birth_date),
            p.civil_status.code(),
            p.county.id,
            p.county.name,
            p.city.id,
            p.city.name,
            p.gender.code(),
            at_str,
          ],
        )?;
        tx.commit()?;
        Ok(id)
      })
      .await?;

    tracing::debug!(beneficiary_id, "created beneficiary with temporary id");

    Ok(Beneficiary { beneficiary_id, profile, forms: vec![], created_at })
  }

  async fn get_beneficiary(&self, beneficiary_id: i64) -> Result<Option<Beneficiary>> {
    Ok(
      self
        .load_beneficiaries("WHERE beneficiary_id = ?1", Some(beneficiary_id))
        .await?
        .into_iter()
        .next(),
    )
  }

  async fn list_beneficiaries(&self) -> Result<Vec<Beneficiary>> {
    self.load_beneficiaries("", None).await
  }

  async fn update_profile(
    &self,
    beneficiary_id: i64,
    profile: BeneficiaryProfile,
  ) -> Result<()> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE beneficiaries
           SET name = ?2, birth_date = ?3, civil_status = ?4,
               county_id = ?5, county = ?6, city_id = ?7, city = ?8, gender = ?9
           WHERE beneficiary_id = ?1",
          rusqlite::params![
            beneficiary_id,
            profile.name,
            encode_date(profile.birth_date),
            profile.civil_status.code(),
            profile.county.id,
            profile.county.name,
            profile.city.id,
            profile.city.name,
            profile.gender.code(),
          ],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::BeneficiaryNotFound(beneficiary_id));
    }
    Ok(())
  }

  async fn assign_beneficiary_id(
    &self,
    temporary_id: i64,
    permanent_id: i64,
  ) -> Result<()> {
    let renamed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let renamed = rename_beneficiary(&tx, temporary_id, permanent_id)?;
        if renamed == Rename::Done {
          tx.commit()?;
        }
        Ok(renamed)
      })
      .await?;

    renamed.check(temporary_id, permanent_id)?;
    tracing::debug!(temporary_id, permanent_id, "beneficiary registered");
    Ok(())
  }

  async fn set_assigned_forms(
    &self,
    beneficiary_id: i64,
    added: Vec<i64>,
    removed: Vec<i64>,
  ) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        apply_form_delta(&tx, beneficiary_id, &added, &removed)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn record_registration(
    &self,
    beneficiary_id: i64,
    permanent_id: i64,
    added: Vec<i64>,
    removed: Vec<i64>,
  ) -> Result<()> {
    let renamed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let renamed = rename_beneficiary(&tx, beneficiary_id, permanent_id)?;
        if renamed == Rename::Done {
          apply_form_delta(&tx, permanent_id, &added, &removed)?;
          tx.commit()?;
        }
        Ok(renamed)
      })
      .await?;

    renamed.check(beneficiary_id, permanent_id)?;
    tracing::debug!(beneficiary_id, permanent_id, "registration recorded");
    Ok(())
  }

  // ── Questions ─────────────────────────────────────────────────────────────

  async fn questions_for_form(
    &self,
    form_id: i64,
    form_version: i64,
  ) -> Result<Vec<QuestionRecord>> {
    let raws: Vec<RawQuestion> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM questions
           WHERE form_id = ?1 AND form_version = ?2
           ORDER BY question_id",
          RawQuestion::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![form_id, form_version], RawQuestion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawQuestion::into_record).collect()
  }

  async fn set_note(
    &self,
    question: NewQuestion,
    note: Option<String>,
  ) -> Result<QuestionRecord> {
    let key = question.key;
    let raw: RawQuestion = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO questions (form_id, form_version, question_id, question_type, section_id)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (form_id, form_version, question_id) DO NOTHING",
          rusqlite::params![
            key.form_id,
            key.form_version,
            key.question_id,
            question.question_type.code(),
            question.section_id,
          ],
        )?;
        tx.execute(
          "UPDATE questions SET note = ?4
           WHERE form_id = ?1 AND form_version = ?2 AND question_id = ?3",
          rusqlite::params![key.form_id, key.form_version, key.question_id, note],
        )?;
        let sql = format!(
          "SELECT {} FROM questions
           WHERE form_id = ?1 AND form_version = ?2 AND question_id = ?3",
          RawQuestion::COLUMNS
        );
        let raw = tx.query_row(
          &sql,
          rusqlite::params![key.form_id, key.form_version, key.question_id],
          RawQuestion::from_row,
        )?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.into_record()
  }

  async fn purge_form_versions(
    &self,
    form_id: i64,
    below_version: i64,
  ) -> Result<PurgeCount> {
    let count = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let answers = tx.execute(
          "DELETE FROM answers WHERE form_id = ?1 AND form_version < ?2",
          rusqlite::params![form_id, below_version],
        )?;
        let questions = tx.execute(
          "DELETE FROM questions WHERE form_id = ?1 AND form_version < ?2",
          rusqlite::params![form_id, below_version],
        )?;
        tx.commit()?;
        Ok(PurgeCount { questions, answers })
      })
      .await?;

    tracing::debug!(
      form_id,
      below_version,
      questions = count.questions,
      answers = count.answers,
      "purged superseded form data"
    );
    Ok(count)
  }

  // ── Answers ───────────────────────────────────────────────────────────────

  async fn query_answers(&self, filter: &AnswerFilter) -> Result<Vec<Answer>> {
    let f = filter.clone();

    let raws: Vec<RawAnswer> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM answers
           WHERE (?1 IS NULL OR beneficiary_id = ?1)
             AND (?2 IS NULL OR form_id = ?2)
             AND (?3 IS NULL OR form_version = ?3)
             AND (?4 IS NULL OR question_id = ?4)
             AND (?5 IS NULL OR synced = ?5)
             AND (?6 = 0 OR beneficiary_id > 0)
           ORDER BY beneficiary_id, form_id, question_id, option_id",
          RawAnswer::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              f.beneficiary_id,
              f.form_id,
              f.form_version,
              f.question_id,
              f.synced,
              f.registered_only,
            ],
            RawAnswer::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAnswer::into_answer).collect()
  }

  async fn replace_answers(&self, input: ReplaceAnswers) -> Result<Vec<Answer>> {
    let fill_date = Utc::now();
    let key       = input.question.key;

    let answers: Vec<Answer> = input
      .answers
      .into_iter()
      .map(|a| Answer {
        answer_id:      Uuid::new_v4(),
        beneficiary_id: input.beneficiary_id,
        form_id:        key.form_id,
        form_version:   key.form_version,
        question_id:    key.question_id,
        option_id:      a.option_id,
        selected:       true,
        is_free_text:   a.is_free_text,
        user_text:      a.user_text,
        synced:         false,
        fill_date,
      })
      .collect();

    let rows: Vec<(String, i64, bool, Option<String>)> = answers
      .iter()
      .map(|a| {
        (encode_uuid(a.answer_id), a.option_id, a.is_free_text, a.user_text.clone())
      })
      .collect();
    let beneficiary_id = input.beneficiary_id;
    let question_type  = input.question.question_type.code();
    let section_id     = input.question.section_id;
    let fill_date_str  = encode_dt(fill_date);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO questions (form_id, form_version, question_id, question_type, section_id)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (form_id, form_version, question_id) DO NOTHING",
          rusqlite::params![
            key.form_id,
            key.form_version,
            key.question_id,
            question_type,
            section_id,
          ],
        )?;
        tx.execute(
          "DELETE FROM answers
           WHERE beneficiary_id = ?1 AND form_id = ?2 AND question_id = ?3",
          rusqlite::params![beneficiary_id, key.form_id, key.question_id],
        )?;
        for (answer_id, option_id, is_free_text, user_text) in rows {
          tx.execute(
            "INSERT INTO answers (
               answer_id, beneficiary_id, form_id, form_version, question_id,
               option_id, selected, is_free_text, user_text, synced, fill_date
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8, 0, ?9)",
            rusqlite::params![
              answer_id,
              beneficiary_id,
              key.form_id,
              key.form_version,
              key.question_id,
              option_id,
              is_free_text,
              user_text,
              fill_date_str,
            ],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(answers)
  }

  async fn mark_synced(&self, answer_ids: Vec<Uuid>) -> Result<usize> {
    let ids: Vec<String> = answer_ids.into_iter().map(encode_uuid).collect();

    let flipped = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut flipped = 0;
        {
          let mut stmt = tx.prepare(
            "UPDATE answers SET synced = 1 WHERE answer_id = ?1 AND synced = 0",
          )?;
          for id in &ids {
            flipped += stmt.execute(rusqlite::params![id])?;
          }
        }
        tx.commit()?;
        Ok(flipped)
      })
      .await?;

    Ok(flipped)
  }
}

// ─── Transaction helpers ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rename {
  Done,
  Missing,
  Taken,
}

impl Rename {
  fn check(self, from: i64, to: i64) -> Result<()> {
    match self {
      Rename::Done => Ok(()),
      Rename::Missing => Err(Error::BeneficiaryNotFound(from)),
      Rename::Taken => Err(Error::BeneficiaryIdTaken(to)),
    }
  }
}

fn beneficiary_exists(tx: &rusqlite::Transaction<'_>, id: i64) -> rusqlite::Result<bool> {
  Ok(
    tx.query_row(
      "SELECT 1 FROM beneficiaries WHERE beneficiary_id = ?1",
      rusqlite::params![id],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false),
  )
}

/// Move `from` to `to`. Renaming an id to itself only checks it exists.
fn rename_beneficiary(
  tx: &rusqlite::Transaction<'_>,
  from: i64,
  to: i64,
) -> rusqlite::Result<Rename> {
  if !beneficiary_exists(tx, from)? {
    return Ok(Rename::Missing);
  }
  if from == to {
    return Ok(Rename::Done);
  }
  if beneficiary_exists(tx, to)? {
    return Ok(Rename::Taken);
  }
  // ON UPDATE CASCADE carries answers and form assignments along.
  tx.execute(
    "UPDATE beneficiaries SET beneficiary_id = ?2 WHERE beneficiary_id = ?1",
    rusqlite::params![from, to],
  )?;
  Ok(Rename::Done)
}

fn apply_form_delta(
  tx: &rusqlite::Transaction<'_>,
  beneficiary_id: i64,
  added: &[i64],
  removed: &[i64],
) -> rusqlite::Result<()> {
  for form_id in removed {
    tx.execute(
      "DELETE FROM beneficiary_forms WHERE beneficiary_id = ?1 AND form_id = ?2",
      rusqlite::params![beneficiary_id, form_id],
    )?;
  }
  for form_id in added {
    tx.execute(
      "INSERT OR IGNORE INTO beneficiary_forms (beneficiary_id, form_id)
       VALUES (?1, ?2)",
      rusqlite::params![beneficiary_id, form_id],
    )?;
  }
  Ok(())
}
