//! Parent-child and union edge models.
//!
//! # Invariants
//! - `ParentChildRelationship::parent_id != child_id`.
//! - `FamilyUnion` partners are stored normalized: `person1_id < person2_id`.
//!   Partner order carries no meaning.
//! - A union never ends definitely before it starts.

use crate::error::ValidationError;
use crate::model::double_option;
use crate::model::person::{GenealogyDate, PersonId, Place};
use crate::model::tree::TreeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type RelationshipId = Uuid;
pub type UnionId = Uuid;

/// Kind of parent-child edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    #[default]
    Biological,
    Adopted,
    Step,
    Foster,
}

impl RelationshipType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Biological => "biological",
            Self::Adopted => "adopted",
            Self::Step => "step",
            Self::Foster => "foster",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "biological" => Some(Self::Biological),
            "adopted" => Some(Self::Adopted),
            "step" => Some(Self::Step),
            "foster" => Some(Self::Foster),
            _ => None,
        }
    }

    /// Biological and adopted edges are preferred when generation paths tie.
    pub fn is_lineal(self) -> bool {
        matches!(self, Self::Biological | Self::Adopted)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnionType {
    #[default]
    Marriage,
    CivilUnion,
    Partnership,
    Engagement,
    Other,
}

impl UnionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Marriage => "marriage",
            Self::CivilUnion => "civil_union",
            Self::Partnership => "partnership",
            Self::Engagement => "engagement",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "marriage" => Some(Self::Marriage),
            "civil_union" => Some(Self::CivilUnion),
            "partnership" => Some(Self::Partnership),
            "engagement" => Some(Self::Engagement),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Death,
    Divorce,
    Separation,
    Annulment,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Death => "death",
            Self::Divorce => "divorce",
            Self::Separation => "separation",
            Self::Annulment => "annulment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "death" => Some(Self::Death),
            "divorce" => Some(Self::Divorce),
            "separation" => Some(Self::Separation),
            "annulment" => Some(Self::Annulment),
            _ => None,
        }
    }
}

/// Directed parent → child edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentChildRelationship {
    pub id: RelationshipId,
    pub tree_id: TreeId,
    pub parent_id: PersonId,
    pub child_id: PersonId,
    /// Partnership of the parents this child belongs to, if recorded.
    pub union_id: Option<UnionId>,
    pub relationship_type: RelationshipType,
    pub birth_order: Option<u32>,
}

impl ParentChildRelationship {
    pub fn from_draft(tree_id: TreeId, draft: RelationshipDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            tree_id,
            parent_id: draft.parent_id,
            child_id: draft.child_id,
            union_id: draft.union_id,
            relationship_type: draft.relationship_type,
            birth_order: draft.birth_order,
        }
    }

    pub fn involves(&self, person_id: PersonId) -> bool {
        self.parent_id == person_id || self.child_id == person_id
    }
}

/// Attributes accepted when adding a parent-child edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDraft {
    pub parent_id: PersonId,
    pub child_id: PersonId,
    #[serde(default)]
    pub union_id: Option<UnionId>,
    #[serde(default)]
    pub relationship_type: RelationshipType,
    #[serde(default)]
    pub birth_order: Option<u32>,
}

impl RelationshipDraft {
    pub fn new(parent_id: PersonId, child_id: PersonId, relationship_type: RelationshipType) -> Self {
        Self {
            parent_id,
            child_id,
            union_id: None,
            relationship_type,
            birth_order: None,
        }
    }
}

/// Returns the order-independent key of a partner pair.
pub fn normalize_pair(first: PersonId, second: PersonId) -> (PersonId, PersonId) {
    if first <= second {
        (first, second)
    } else {
        (second, first)
    }
}

/// Partnership between two persons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyUnion {
    pub id: UnionId,
    pub tree_id: TreeId,
    pub person1_id: PersonId,
    pub person2_id: PersonId,
    pub union_type: UnionType,
    pub start_date: Option<GenealogyDate>,
    pub end_date: Option<GenealogyDate>,
    pub start_place: Option<Place>,
    pub end_place: Option<Place>,
    pub end_reason: Option<EndReason>,
    pub is_current: bool,
}

impl FamilyUnion {
    /// Builds a union with a generated id and normalized partner order.
    pub fn from_draft(tree_id: TreeId, draft: UnionDraft) -> Self {
        let (person1_id, person2_id) = normalize_pair(draft.person1_id, draft.person2_id);
        Self {
            id: Uuid::new_v4(),
            tree_id,
            person1_id,
            person2_id,
            union_type: draft.union_type,
            start_date: draft.start_date,
            end_date: draft.end_date,
            start_place: draft.start_place,
            end_place: draft.end_place,
            end_reason: draft.end_reason,
            is_current: draft.is_current,
        }
    }

    pub fn pair_key(&self) -> (PersonId, PersonId) {
        normalize_pair(self.person1_id, self.person2_id)
    }

    pub fn involves(&self, person_id: PersonId) -> bool {
        self.person1_id == person_id || self.person2_id == person_id
    }

    /// Returns the other partner when `person_id` is one of the two.
    pub fn partner_of(&self, person_id: PersonId) -> Option<PersonId> {
        if self.person1_id == person_id {
            Some(self.person2_id)
        } else if self.person2_id == person_id {
            Some(self.person1_id)
        } else {
            None
        }
    }

    /// Checks record-local invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.person1_id == self.person2_id {
            return Err(ValidationError::SelfReference(self.person1_id));
        }
        if let (Some(start), Some(end)) = (&self.start_date, &self.end_date) {
            if end.is_definitely_before(start) {
                return Err(ValidationError::UnionEndsBeforeStart(self.id));
            }
        }
        Ok(())
    }

    /// Returns whether both unions are active at a common point in time.
    ///
    /// Two current unions always overlap. Otherwise both need a known start;
    /// a missing end is open-ended and ends are exclusive.
    pub fn overlaps(&self, other: &FamilyUnion) -> bool {
        if self.is_current && other.is_current {
            return true;
        }
        let (Some(self_start), Some(other_start)) = (&self.start_date, &other.start_date) else {
            return false;
        };
        let self_ends_first = self
            .end_date
            .as_ref()
            .is_some_and(|end| !other_start.is_definitely_before(end));
        let other_ends_first = other
            .end_date
            .as_ref()
            .is_some_and(|end| !self_start.is_definitely_before(end));
        !(self_ends_first || other_ends_first)
    }
}

/// Attributes accepted when adding a union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionDraft {
    pub person1_id: PersonId,
    pub person2_id: PersonId,
    #[serde(default)]
    pub union_type: UnionType,
    #[serde(default)]
    pub start_date: Option<GenealogyDate>,
    #[serde(default)]
    pub end_date: Option<GenealogyDate>,
    #[serde(default)]
    pub start_place: Option<Place>,
    #[serde(default)]
    pub end_place: Option<Place>,
    #[serde(default)]
    pub end_reason: Option<EndReason>,
    #[serde(default)]
    pub is_current: bool,
}

impl UnionDraft {
    pub fn new(person1_id: PersonId, person2_id: PersonId, union_type: UnionType) -> Self {
        Self {
            person1_id,
            person2_id,
            union_type,
            start_date: None,
            end_date: None,
            start_place: None,
            end_place: None,
            end_reason: None,
            is_current: true,
        }
    }
}

/// Partial update of a union. Partners cannot change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub union_type: Option<UnionType>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<Option<GenealogyDate>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<Option<GenealogyDate>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_place: Option<Option<Place>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_place: Option<Option<Place>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_reason: Option<Option<EndReason>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_current: Option<bool>,
}

impl UnionPatch {
    pub fn apply_to(&self, union: &mut FamilyUnion) {
        if let Some(value) = self.union_type {
            union.union_type = value;
        }
        if let Some(value) = self.start_date {
            union.start_date = value;
        }
        if let Some(value) = self.end_date {
            union.end_date = value;
        }
        if let Some(value) = &self.start_place {
            union.start_place = value.clone();
        }
        if let Some(value) = &self.end_place {
            union.end_place = value.clone();
        }
        if let Some(value) = self.end_reason {
            union.end_reason = value;
        }
        if let Some(value) = self.is_current {
            union.is_current = value;
        }
    }
}
