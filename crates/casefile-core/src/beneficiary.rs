//! Beneficiaries, the subjects a form is filled out about.
//!
//! A beneficiary is created on the device with a temporary negative id and
//! adopts the server-assigned id once registration succeeds.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, ValidationError};

// ─── Reference data ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct County {
  pub id:   i64,
  pub name: String,
  pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
  pub id:   i64,
  pub name: String,
}

/// A resolved county or city reference as stored on a beneficiary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
  pub id:   i64,
  pub name: String,
}

impl From<County> for Place {
  fn from(c: County) -> Self { Self { id: c.id, name: c.name } }
}

impl From<City> for Place {
  fn from(c: City) -> Self { Self { id: c.id, name: c.name } }
}

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CivilStatus {
  NotMarried,
  Married,
  Divorced,
  Widowed,
}

impl CivilStatus {
  pub const ALL: [Self; 4] =
    [Self::NotMarried, Self::Married, Self::Divorced, Self::Widowed];

  pub fn code(self) -> i64 {
    match self {
      Self::NotMarried => 0,
      Self::Married => 1,
      Self::Divorced => 2,
      Self::Widowed => 3,
    }
  }

  pub fn from_code(code: i64) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|s| s.code() == code)
      .ok_or(Error::UnknownCivilStatus(code))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
  Male,
  Female,
}

impl Gender {
  pub fn code(self) -> i64 {
    match self {
      Self::Male => 0,
      Self::Female => 1,
    }
  }

  pub fn from_code(code: i64) -> Result<Self> {
    match code {
      0 => Ok(Self::Male),
      1 => Ok(Self::Female),
      other => Err(Error::UnknownGender(other)),
    }
  }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// A complete, validated beneficiary profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryProfile {
  pub name:         String,
  pub birth_date:   NaiveDate,
  pub civil_status: CivilStatus,
  pub county:       Place,
  pub city:         Place,
  pub gender:       Gender,
}

impl BeneficiaryProfile {
  /// Age in whole years on `today`.
  pub fn age_on(&self, today: NaiveDate) -> i32 {
    let mut age = today.year() - self.birth_date.year();
    if (today.month(), today.day())
      < (self.birth_date.month(), self.birth_date.day())
    {
      age -= 1;
    }
    age
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beneficiary {
  /// Negative until the server assigns a permanent id.
  pub beneficiary_id: i64,
  pub profile:        BeneficiaryProfile,
  /// Ids of the forms assigned to this beneficiary.
  pub forms:          Vec<i64>,
  pub created_at:     DateTime<Utc>,
}

impl Beneficiary {
  pub fn is_registered(&self) -> bool { self.beneficiary_id > 0 }
}

// ─── Profile fields ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileFieldKind {
  Name,
  BirthDate,
  CivilStatus,
  County,
  City,
  Gender,
}

impl ProfileFieldKind {
  /// Field order on the add/edit screen.
  pub const ALL: [Self; 6] = [
    Self::Name,
    Self::BirthDate,
    Self::CivilStatus,
    Self::County,
    Self::City,
    Self::Gender,
  ];
}

/// The value held by one profile input slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ProfileField {
  Name(String),
  BirthDate(NaiveDate),
  CivilStatus(CivilStatus),
  County(Place),
  City(Place),
  Gender(Gender),
}

impl ProfileField {
  pub fn kind(&self) -> ProfileFieldKind {
    match self {
      Self::Name(_) => ProfileFieldKind::Name,
      Self::BirthDate(_) => ProfileFieldKind::BirthDate,
      Self::CivilStatus(_) => ProfileFieldKind::CivilStatus,
      Self::County(_) => ProfileFieldKind::County,
      Self::City(_) => ProfileFieldKind::City,
      Self::Gender(_) => ProfileFieldKind::Gender,
    }
  }

  /// Text shown inside the field.
  pub fn display(&self) -> String {
    match self {
      Self::Name(n) => n.clone(),
      Self::BirthDate(d) => d.format("%d/%m/%Y").to_string(),
      Self::CivilStatus(s) => format!("{s:?}"),
      Self::County(p) | Self::City(p) => p.name.clone(),
      Self::Gender(g) => format!("{g:?}"),
    }
  }
}

/// An add/edit session over a profile. Each slot holds its resolved value or
/// nothing; [`ProfileDraft::finalize`] turns a complete draft into a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDraft {
  name:         Option<String>,
  birth_date:   Option<NaiveDate>,
  civil_status: Option<CivilStatus>,
  county:       Option<Place>,
  city:         Option<Place>,
  gender:       Option<Gender>,
}

impl ProfileDraft {
  pub fn new() -> Self { Self::default() }

  /// A draft pre-filled for editing an existing profile.
  pub fn from_profile(profile: &BeneficiaryProfile) -> Self {
    Self {
      name:         Some(profile.name.clone()),
      birth_date:   Some(profile.birth_date),
      civil_status: Some(profile.civil_status),
      county:       Some(profile.county.clone()),
      city:         Some(profile.city.clone()),
      gender:       Some(profile.gender),
    }
  }

  /// Fill one slot. Choosing a different county clears the city.
  pub fn set(&mut self, field: ProfileField) {
    match field {
      ProfileField::Name(n) => self.name = Some(n.trim().to_string()),
      ProfileField::BirthDate(d) => self.birth_date = Some(d),
      ProfileField::CivilStatus(s) => self.civil_status = Some(s),
      ProfileField::County(p) => {
        if self.county.as_ref().is_some_and(|c| c.id != p.id) {
          self.city = None;
        }
        self.county = Some(p);
      }
      ProfileField::City(p) => self.city = Some(p),
      ProfileField::Gender(g) => self.gender = Some(g),
    }
  }

  pub fn clear(&mut self, kind: ProfileFieldKind) {
    match kind {
      ProfileFieldKind::Name => self.name = None,
      ProfileFieldKind::BirthDate => self.birth_date = None,
      ProfileFieldKind::CivilStatus => self.civil_status = None,
      ProfileFieldKind::County => {
        self.county = None;
        self.city = None;
      }
      ProfileFieldKind::City => self.city = None,
      ProfileFieldKind::Gender => self.gender = None,
    }
  }

  pub fn get(&self, kind: ProfileFieldKind) -> Option<ProfileField> {
    match kind {
      ProfileFieldKind::Name => self.name.clone().map(ProfileField::Name),
      ProfileFieldKind::BirthDate => self.birth_date.map(ProfileField::BirthDate),
      ProfileFieldKind::CivilStatus => {
        self.civil_status.map(ProfileField::CivilStatus)
      }
      ProfileFieldKind::County => self.county.clone().map(ProfileField::County),
      ProfileFieldKind::City => self.city.clone().map(ProfileField::City),
      ProfileFieldKind::Gender => self.gender.map(ProfileField::Gender),
    }
  }

  /// The id of the chosen county; city lookups are keyed on it.
  pub fn county_id(&self) -> Option<i64> { self.county.as_ref().map(|c| c.id) }

  pub fn is_complete(&self) -> bool {
    ProfileFieldKind::ALL.iter().all(|k| self.get(*k).is_some())
  }

  pub fn finalize(
    self,
    today: NaiveDate,
  ) -> Result<BeneficiaryProfile, ValidationError> {
    use ProfileFieldKind as K;

    if self.city.is_some() && self.county.is_none() {
      return Err(ValidationError::CountyNotSelected);
    }
    let name = self
      .name
      .filter(|n| !n.is_empty())
      .ok_or(ValidationError::MissingField(K::Name))?;
    let birth_date =
      self.birth_date.ok_or(ValidationError::MissingField(K::BirthDate))?;
    if birth_date > today {
      return Err(ValidationError::BirthDateInFuture(birth_date));
    }

    Ok(BeneficiaryProfile {
      name,
      birth_date,
      civil_status: self
        .civil_status
        .ok_or(ValidationError::MissingField(K::CivilStatus))?,
      county: self.county.ok_or(ValidationError::MissingField(K::County))?,
      city: self.city.ok_or(ValidationError::MissingField(K::City))?,
      gender: self.gender.ok_or(ValidationError::MissingField(K::Gender))?,
    })
  }
}

// ─── Registration ────────────────────────────────────────────────────────────

/// Forms to assign to or withdraw from a beneficiary. For a beneficiary that
/// is not registered yet, `added` is the full selection and `removed` is
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormAssignment {
  pub added:   Vec<i64>,
  pub removed: Vec<i64>,
}

/// Body sent to the remote to create or update a beneficiary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryRequest {
  /// The local id; negative for a beneficiary the server has not seen.
  pub id:               i64,
  pub name:             String,
  pub birth_date:       NaiveDate,
  pub civil_status:     CivilStatus,
  pub county_id:        i64,
  pub city_id:          i64,
  pub gender:           Gender,
  /// Full form selection, sent only on creation.
  pub form_ids:         Option<Vec<i64>>,
  pub added_form_ids:   Vec<i64>,
  pub removed_form_ids: Vec<i64>,
}

impl BeneficiaryRequest {
  pub fn new(beneficiary: &Beneficiary, forms: &FormAssignment) -> Self {
    let p = &beneficiary.profile;
    let is_new = !beneficiary.is_registered();
    Self {
      id:               beneficiary.beneficiary_id,
      name:             p.name.clone(),
      birth_date:       p.birth_date,
      civil_status:     p.civil_status,
      county_id:        p.county.id,
      city_id:          p.city.id,
      gender:           p.gender,
      form_ids:         is_new.then(|| forms.added.clone()),
      added_form_ids:   if is_new { vec![] } else { forms.added.clone() },
      removed_form_ids: if is_new { vec![] } else { forms.removed.clone() },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn place(id: i64, name: &str) -> Place { Place { id, name: name.into() } }

  fn complete_draft() -> ProfileDraft {
    let mut d = ProfileDraft::new();
    d.set(ProfileField::Name("  Ana Pop ".into()));
    d.set(ProfileField::BirthDate(date(1950, 3, 14)));
    d.set(ProfileField::CivilStatus(CivilStatus::Widowed));
    d.set(ProfileField::County(place(1, "Cluj")));
    d.set(ProfileField::City(place(7, "Dej")));
    d.set(ProfileField::Gender(Gender::Female));
    d
  }

  #[test]
  fn complete_draft_finalizes() {
    let draft = complete_draft();
    assert!(draft.is_complete());
    let profile = draft.finalize(date(2024, 1, 1)).unwrap();
    assert_eq!(profile.name, "Ana Pop");
    assert_eq!(profile.city.id, 7);
    assert_eq!(profile.age_on(date(2024, 3, 13)), 73);
    assert_eq!(profile.age_on(date(2024, 3, 14)), 74);
  }

  #[test]
  fn missing_field_is_reported() {
    let mut draft = complete_draft();
    draft.clear(ProfileFieldKind::Gender);
    assert!(!draft.is_complete());
    assert_eq!(
      draft.finalize(date(2024, 1, 1)),
      Err(ValidationError::MissingField(ProfileFieldKind::Gender)),
    );
  }

  #[test]
  fn changing_county_clears_city() {
    let mut draft = complete_draft();
    draft.set(ProfileField::County(place(1, "Cluj")));
    assert!(draft.get(ProfileFieldKind::City).is_some());
    draft.set(ProfileField::County(place(2, "Alba")));
    assert!(draft.get(ProfileFieldKind::City).is_none());
    assert_eq!(draft.county_id(), Some(2));
  }

  #[test]
  fn city_without_county_is_rejected() {
    let mut draft = complete_draft();
    draft.county = None;
    assert_eq!(
      draft.finalize(date(2024, 1, 1)),
      Err(ValidationError::CountyNotSelected),
    );
  }

  #[test]
  fn future_birth_date_is_rejected() {
    let mut draft = complete_draft();
    draft.set(ProfileField::BirthDate(date(2030, 1, 1)));
    assert!(matches!(
      draft.finalize(date(2024, 1, 1)),
      Err(ValidationError::BirthDateInFuture(_)),
    ));
  }

  #[test]
  fn birth_date_displays_day_first() {
    assert_eq!(ProfileField::BirthDate(date(1950, 3, 4)).display(), "04/03/1950");
  }

  #[test]
  fn request_for_new_beneficiary_sends_full_selection() {
    let profile = complete_draft().finalize(date(2024, 1, 1)).unwrap();
    let mut b = Beneficiary {
      beneficiary_id: -1,
      profile,
      forms: vec![],
      created_at: Utc::now(),
    };
    let forms = FormAssignment { added: vec![1, 2], removed: vec![3] };

    let req = BeneficiaryRequest::new(&b, &forms);
    assert_eq!(req.form_ids, Some(vec![1, 2]));
    assert!(req.added_form_ids.is_empty() && req.removed_form_ids.is_empty());

    b.beneficiary_id = 40;
    let req = BeneficiaryRequest::new(&b, &forms);
    assert_eq!(req.form_ids, None);
    assert_eq!(req.removed_form_ids, vec![3]);
  }
}
