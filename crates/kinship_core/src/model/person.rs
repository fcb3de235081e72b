//! Person record model.
//!
//! # Responsibility
//! - Define the person record, its fuzzy genealogical dates and places.
//! - Provide create (`PersonDraft`) and partial update (`PersonPatch`) shapes.
//!
//! # Invariants
//! - At least one of `first_names` / `last_name` is non-blank.
//! - `is_alive == true` implies `death_date == None`.
//! - A death date is never definitely before the birth date.
//! - A residence never ends definitely before it starts.

use crate::error::ValidationError;
use crate::model::tree::{TreeId, Visibility};
use crate::model::{double_option, is_blank, is_blank_opt};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Stable person identifier.
pub type PersonId = Uuid;

/// Two `circa` dates closer than this many years are never considered ordered.
const CIRCA_TOLERANCE_YEARS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "other" => Some(Self::Other),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// How much of a recorded date is actually known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    #[default]
    Exact,
    /// Year and month are known; the day is a placeholder.
    Month,
    /// Only the year is known.
    Year,
    /// The year is an estimate.
    Circa,
    /// The stored date carries no ordering information.
    Unknown,
}

impl DatePrecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Month => "month",
            Self::Year => "year",
            Self::Circa => "circa",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "exact" => Some(Self::Exact),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            "circa" => Some(Self::Circa),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    fn granularity(self) -> u8 {
        match self {
            Self::Exact => 0,
            Self::Month => 1,
            Self::Year => 2,
            Self::Circa => 3,
            Self::Unknown => 4,
        }
    }
}

/// A calendar date paired with its precision tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenealogyDate {
    pub date: NaiveDate,
    pub precision: DatePrecision,
}

impl GenealogyDate {
    pub fn new(date: NaiveDate, precision: DatePrecision) -> Self {
        Self { date, precision }
    }

    /// Exact calendar date. Returns `None` for impossible dates.
    pub fn exact(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(|date| Self::new(date, DatePrecision::Exact))
    }

    /// Year-only date, anchored on January 1st.
    pub fn year(year: i32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, 1, 1).map(|date| Self::new(date, DatePrecision::Year))
    }

    /// Estimated year, anchored on January 1st.
    pub fn circa(year: i32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, 1, 1).map(|date| Self::new(date, DatePrecision::Circa))
    }

    /// Returns whether `self` is certainly earlier than `other`.
    ///
    /// Both dates are compared at the coarser of their two precisions, so a
    /// `year` date of 1900 is not before an `exact` date in 1900. Dates with
    /// `unknown` precision are never ordered.
    pub fn is_definitely_before(&self, other: &GenealogyDate) -> bool {
        let coarsest = if self.precision.granularity() >= other.precision.granularity() {
            self.precision
        } else {
            other.precision
        };
        match coarsest {
            DatePrecision::Unknown => false,
            DatePrecision::Circa => self.date.year() + CIRCA_TOLERANCE_YEARS < other.date.year(),
            DatePrecision::Year => self.date.year() < other.date.year(),
            DatePrecision::Month => {
                (self.date.year(), self.date.month()) < (other.date.year(), other.date.month())
            }
            DatePrecision::Exact => self.date < other.date,
        }
    }

    /// Ordering used for layout: earliest first, precision ignored.
    pub fn chronological_cmp(&self, other: &GenealogyDate) -> Ordering {
        self.date.cmp(&other.date)
    }
}

/// A named place, optionally geocoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Place {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latitude: None,
            longitude: None,
        }
    }
}

/// A place a person lived, with an optional interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Residence {
    pub place: Place,
    #[serde(default)]
    pub from: Option<GenealogyDate>,
    #[serde(default)]
    pub to: Option<GenealogyDate>,
}

/// One person in a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub tree_id: TreeId,
    pub first_names: String,
    pub last_name: String,
    pub maiden_name: Option<String>,
    /// `None` serializes as `null`, the fifth gender value.
    pub gender: Option<Gender>,
    pub birth_date: Option<GenealogyDate>,
    pub death_date: Option<GenealogyDate>,
    pub birth_place: Option<Place>,
    pub death_place: Option<Place>,
    pub is_alive: bool,
    /// Opaque media reference of the profile photo.
    pub profile_photo: Option<String>,
    pub occupation: Option<String>,
    pub residences: Vec<Residence>,
    pub nationality: Option<String>,
    pub biography: Option<String>,
    pub privacy: Visibility,
}

impl Person {
    /// Builds a person from creation attributes with a generated id.
    pub fn from_draft(tree_id: TreeId, draft: PersonDraft) -> Self {
        Self::from_draft_with_id(Uuid::new_v4(), tree_id, draft)
    }

    /// Builds a person from creation attributes with a caller-provided id.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn from_draft_with_id(id: PersonId, tree_id: TreeId, draft: PersonDraft) -> Self {
        Self {
            id,
            tree_id,
            first_names: draft.first_names.trim().to_string(),
            last_name: draft.last_name.trim().to_string(),
            maiden_name: draft.maiden_name,
            gender: draft.gender,
            birth_date: draft.birth_date,
            death_date: draft.death_date,
            birth_place: draft.birth_place,
            death_place: draft.death_place,
            is_alive: draft.is_alive,
            profile_photo: draft.profile_photo,
            occupation: draft.occupation,
            residences: draft.residences,
            nationality: draft.nationality,
            biography: draft.biography,
            privacy: draft.privacy,
        }
    }

    /// Checks record-local invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if is_blank(&self.first_names) && is_blank(&self.last_name) {
            return Err(ValidationError::EmptyName);
        }
        if self.is_alive && self.death_date.is_some() {
            return Err(ValidationError::AliveWithDeathDate(self.id));
        }
        if let (Some(birth), Some(death)) = (&self.birth_date, &self.death_date) {
            if death.is_definitely_before(birth) {
                return Err(ValidationError::DeathBeforeBirth(self.id));
            }
        }
        for (index, residence) in self.residences.iter().enumerate() {
            if let (Some(from), Some(to)) = (&residence.from, &residence.to) {
                if to.is_definitely_before(from) {
                    return Err(ValidationError::ResidenceEndsBeforeStart {
                        person: self.id,
                        index,
                    });
                }
            }
        }
        Ok(())
    }

    /// Display name assembled from first and last names.
    pub fn full_name(&self) -> String {
        match (is_blank(&self.first_names), is_blank(&self.last_name)) {
            (false, false) => format!("{} {}", self.first_names, self.last_name),
            (false, true) => self.first_names.clone(),
            _ => self.last_name.clone(),
        }
    }

    pub fn has_full_name(&self) -> bool {
        !is_blank(&self.first_names) && !is_blank(&self.last_name)
    }

    pub fn has_photo(&self) -> bool {
        !is_blank_opt(self.profile_photo.as_deref())
    }

    pub fn has_biography(&self) -> bool {
        !is_blank_opt(self.biography.as_deref())
    }

    pub fn has_birth_place(&self) -> bool {
        self.birth_place
            .as_ref()
            .is_some_and(|place| !is_blank(&place.name))
    }

    /// Oldest-first ordering: dated persons before undated, then by name and id.
    pub fn birth_order_cmp(&self, other: &Person) -> Ordering {
        let by_birth = match (&self.birth_date, &other.birth_date) {
            (Some(left), Some(right)) => left.chronological_cmp(right),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_birth
            .then_with(|| self.last_name.cmp(&other.last_name))
            .then_with(|| self.first_names.cmp(&other.first_names))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Attributes accepted when creating a person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonDraft {
    pub first_names: String,
    pub last_name: String,
    pub maiden_name: Option<String>,
    pub gender: Option<Gender>,
    pub birth_date: Option<GenealogyDate>,
    pub death_date: Option<GenealogyDate>,
    pub birth_place: Option<Place>,
    pub death_place: Option<Place>,
    pub is_alive: bool,
    pub profile_photo: Option<String>,
    pub occupation: Option<String>,
    pub residences: Vec<Residence>,
    pub nationality: Option<String>,
    pub biography: Option<String>,
    pub privacy: Visibility,
}

impl Default for PersonDraft {
    fn default() -> Self {
        Self {
            first_names: String::new(),
            last_name: String::new(),
            maiden_name: None,
            gender: None,
            birth_date: None,
            death_date: None,
            birth_place: None,
            death_place: None,
            is_alive: true,
            profile_photo: None,
            occupation: None,
            residences: Vec::new(),
            nationality: None,
            biography: None,
            privacy: Visibility::Family,
        }
    }
}

impl PersonDraft {
    pub fn named(first_names: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_names: first_names.into(),
            last_name: last_name.into(),
            ..Self::default()
        }
    }
}

/// Partial update of a person.
///
/// Outer `None` leaves a field untouched; `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_names: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub maiden_name: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub gender: Option<Option<Gender>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub birth_date: Option<Option<GenealogyDate>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub death_date: Option<Option<GenealogyDate>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub birth_place: Option<Option<Place>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub death_place: Option<Option<Place>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_alive: Option<bool>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_photo: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub occupation: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residences: Option<Vec<Residence>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub nationality: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub biography: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<Visibility>,
}

impl PersonPatch {
    /// Applies present fields onto `person`. Validation is the caller's job.
    pub fn apply_to(&self, person: &mut Person) {
        if let Some(value) = &self.first_names {
            person.first_names = value.trim().to_string();
        }
        if let Some(value) = &self.last_name {
            person.last_name = value.trim().to_string();
        }
        if let Some(value) = &self.maiden_name {
            person.maiden_name = value.clone();
        }
        if let Some(value) = self.gender {
            person.gender = value;
        }
        if let Some(value) = self.birth_date {
            person.birth_date = value;
        }
        if let Some(value) = self.death_date {
            person.death_date = value;
        }
        if let Some(value) = &self.birth_place {
            person.birth_place = value.clone();
        }
        if let Some(value) = &self.death_place {
            person.death_place = value.clone();
        }
        if let Some(value) = self.is_alive {
            person.is_alive = value;
        }
        if let Some(value) = &self.profile_photo {
            person.profile_photo = value.clone();
        }
        if let Some(value) = &self.occupation {
            person.occupation = value.clone();
        }
        if let Some(value) = &self.residences {
            person.residences = value.clone();
        }
        if let Some(value) = &self.nationality {
            person.nationality = value.clone();
        }
        if let Some(value) = &self.biography {
            person.biography = value.clone();
        }
        if let Some(value) = self.privacy {
            person.privacy = value;
        }
    }
}
