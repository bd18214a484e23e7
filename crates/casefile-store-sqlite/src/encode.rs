//! Encoding and decoding helpers between domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, calendar dates as `YYYY-MM-DD`,
//! UUIDs as hyphenated lowercase strings and enumerations as integer codes.

use std::collections::HashMap;

use casefile_core::{
  answer::{Answer, QuestionKey, QuestionRecord},
  beneficiary::{Beneficiary, BeneficiaryProfile, CivilStatus, Gender, Place},
  form::QuestionType,
};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Dates ────────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `answers` row.
pub struct RawAnswer {
  pub answer_id:      String,
  pub beneficiary_id: i64,
  pub form_id:        i64,
  pub form_version:   i64,
  pub question_id:    i64,
  pub option_id:      i64,
  pub selected:       bool,
  pub is_free_text:   bool,
  pub user_text:      Option<String>,
  pub synced:         bool,
  pub fill_date:      String,
}

impl RawAnswer {
  /// Column list matching [`RawAnswer::from_row`].
  pub const COLUMNS: &'static str = "answer_id, beneficiary_id, form_id, \
     form_version, question_id, option_id, selected, is_free_text, user_text, \
     synced, fill_date";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      answer_id:      row.get(0)?,
      beneficiary_id: row.get(1)?,
      form_id:        row.get(2)?,
      form_version:   row.get(3)?,
      question_id:    row.get(4)?,
      option_id:      row.get(5)?,
      selected:       row.get(6)?,
      is_free_text:   row.get(7)?,
      user_text:      row.get(8)?,
      synced:         row.get(9)?,
      fill_date:      row.get(10)?,
    })
  }

  pub fn into_answer(self) -> Result<Answer> {
    Ok(Answer {
      answer_id:      decode_uuid(&self.answer_id)?,
      beneficiary_id: self.beneficiary_id,
      form_id:        self.form_id,
      form_version:   self.form_version,
      question_id:    self.question_id,
      option_id:      self.option_id,
      selected:       self.selected,
      is_free_text:   self.is_free_text,
      user_text:      self.user_text,
      synced:         self.synced,
      fill_date:      decode_dt(&self.fill_date)?,
    })
  }
}

/// Raw values read directly from a `questions` row.
pub struct RawQuestion {
  pub form_id:       i64,
  pub form_version:  i64,
  pub question_id:   i64,
  pub question_type: i64,
  pub section_id:    Option<i64>,
  pub note:          Option<String>,
}

impl RawQuestion {
  pub const COLUMNS: &'static str =
    "form_id, form_version, question_id, question_type, section_id, note";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      form_id:       row.get(0)?,
      form_version:  row.get(1)?,
      question_id:   row.get(2)?,
      question_type: row.get(3)?,
      section_id:    row.get(4)?,
      note:          row.get(5)?,
    })
  }

  pub fn into_record(self) -> Result<QuestionRecord> {
    Ok(QuestionRecord {
      key:           QuestionKey {
        form_id:      self.form_id,
        form_version: self.form_version,
        question_id:  self.question_id,
      },
      question_type: QuestionType::from_code(self.question_type)?,
      section_id:    self.section_id,
      note:          self.note,
    })
  }
}

/// Raw values read directly from a `beneficiaries` row.
pub struct RawBeneficiary {
  pub beneficiary_id: i64,
  pub name:           String,
  pub birth_date:     String,
  pub civil_status:   i64,
  pub county_id:      i64,
  pub county:         String,
  pub city_id:        i64,
  pub city:           String,
  pub gender:         i64,
  pub created_at:     String,
}

impl RawBeneficiary {
  pub const COLUMNS: &'static str = "beneficiary_id, name, birth_date, \
     civil_status, county_id, county, city_id, city, gender, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      beneficiary_id: row.get(0)?,
      name:           row.get(1)?,
      birth_date:     row.get(2)?,
      civil_status:   row.get(3)?,
      county_id:      row.get(4)?,
      county:         row.get(5)?,
      city_id:        row.get(6)?,
      city:           row.get(7)?,
      gender:         row.get(8)?,
      created_at:     row.get(9)?,
    })
  }

  /// Combine with the `beneficiary_forms` rows, grouped by beneficiary id.
  pub fn into_beneficiary(
    self,
    forms: &HashMap<i64, Vec<i64>>,
  ) -> Result<Beneficiary> {
    Ok(Beneficiary {
      beneficiary_id: self.beneficiary_id,
      profile:        BeneficiaryProfile {
        name:         self.name,
        birth_date:   decode_date(&self.birth_date)?,
        civil_status: CivilStatus::from_code(self.civil_status)?,
        county:       Place { id: self.county_id, name: self.county },
        city:         Place { id: self.city_id, name: self.city },
        gender:       Gender::from_code(self.gender)?,
      },
      forms:          forms.get(&self.beneficiary_id).cloned().unwrap_or_default(),
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}
