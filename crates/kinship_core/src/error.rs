//! Engine error taxonomy.
//!
//! # Responsibility
//! - Classify every engine failure as validation, conflict or not-found.
//! - Carry enough ids for callers to attach per-field feedback.
//!
//! # Invariants
//! - A returned error means the triggering mutation left no trace.
//! - Read paths (generations, views, statistics) only ever return
//!   `NotFoundError`.

use crate::model::person::PersonId;
use crate::model::relationship::{RelationshipId, RelationshipType, UnionId};
use crate::model::tree::TreeId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Malformed input or a mutation that would break a structural invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Both first names and last name are blank.
    EmptyName,
    /// Tree name is blank.
    EmptyTreeName,
    /// `is_alive` is set while a death date is recorded.
    AliveWithDeathDate(PersonId),
    /// Death date is definitely before birth date.
    DeathBeforeBirth(PersonId),
    /// Residence `index` ends before it starts.
    ResidenceEndsBeforeStart { person: PersonId, index: usize },
    /// Union end date is definitely before its start date.
    UnionEndsBeforeStart(UnionId),
    /// Parent equals child, or both union partners are the same person.
    SelfReference(PersonId),
    /// Parent is already a descendant of child.
    CycleDetected { parent: PersonId, child: PersonId },
    /// Referenced person belongs to another tree.
    CrossTreeReference { person: PersonId, tree: TreeId },
    /// Relationship names a union the parent is not part of.
    UnionMismatch { union: UnionId, parent: PersonId },
    /// Input could not be decoded into an operation.
    MalformedInput(String),
}

impl ValidationError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyName => "empty_name",
            Self::EmptyTreeName => "empty_tree_name",
            Self::AliveWithDeathDate(_) => "alive_with_death_date",
            Self::DeathBeforeBirth(_) => "death_before_birth",
            Self::ResidenceEndsBeforeStart { .. } => "residence_ends_before_start",
            Self::UnionEndsBeforeStart(_) => "union_ends_before_start",
            Self::SelfReference(_) => "self_reference",
            Self::CycleDetected { .. } => "cycle_detected",
            Self::CrossTreeReference { .. } => "cross_tree_reference",
            Self::UnionMismatch { .. } => "union_mismatch",
            Self::MalformedInput(_) => "malformed_input",
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "first names or last name must not be blank"),
            Self::EmptyTreeName => write!(f, "tree name must not be blank"),
            Self::AliveWithDeathDate(id) => {
                write!(f, "person {id} is marked alive but has a death date")
            }
            Self::DeathBeforeBirth(id) => write!(f, "person {id} dies before being born"),
            Self::ResidenceEndsBeforeStart { person, index } => write!(
                f,
                "residence #{index} of person {person} ends before it starts"
            ),
            Self::UnionEndsBeforeStart(id) => write!(f, "union {id} ends before it starts"),
            Self::SelfReference(id) => write!(f, "person {id} cannot be related to itself"),
            Self::CycleDetected { parent, child } => write!(
                f,
                "parent {parent} -> child {child} would make {parent} its own ancestor"
            ),
            Self::CrossTreeReference { person, tree } => {
                write!(f, "person {person} belongs to another tree {tree}")
            }
            Self::UnionMismatch { union, parent } => {
                write!(f, "parent {parent} is not a partner in union {union}")
            }
            Self::MalformedInput(message) => write!(f, "malformed input: {message}"),
        }
    }
}

impl Error for ValidationError {}

/// Mutation collides with existing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    /// Same (parent, child, type) edge already exists.
    DuplicateRelationship {
        existing: RelationshipId,
        relationship_type: RelationshipType,
    },
    /// A union of the same pair is active over an overlapping interval.
    DuplicateUnion { existing: UnionId },
    /// Restricted delete of a person that edges still reference.
    PersonStillReferenced {
        person: PersonId,
        relationships: usize,
        unions: usize,
    },
}

impl ConflictError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateRelationship { .. } => "duplicate_relationship",
            Self::DuplicateUnion { .. } => "duplicate_union",
            Self::PersonStillReferenced { .. } => "person_still_referenced",
        }
    }
}

impl Display for ConflictError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateRelationship {
                existing,
                relationship_type,
            } => write!(
                f,
                "{} relationship already exists: {existing}",
                relationship_type.as_str()
            ),
            Self::DuplicateUnion { existing } => {
                write!(f, "overlapping union already exists: {existing}")
            }
            Self::PersonStillReferenced {
                person,
                relationships,
                unions,
            } => write!(
                f,
                "person {person} is still referenced by {relationships} relationship(s) and {unions} union(s)"
            ),
        }
    }
}

impl Error for ConflictError {}

/// Referenced entity does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundError {
    Tree(TreeId),
    Person(PersonId),
    Relationship(RelationshipId),
    Union(UnionId),
}

impl NotFoundError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Tree(_) => "tree_not_found",
            Self::Person(_) => "person_not_found",
            Self::Relationship(_) => "relationship_not_found",
            Self::Union(_) => "union_not_found",
        }
    }
}

impl Display for NotFoundError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tree(id) => write!(f, "tree not found: {id}"),
            Self::Person(id) => write!(f, "person not found: {id}"),
            Self::Relationship(id) => write!(f, "relationship not found: {id}"),
            Self::Union(id) => write!(f, "union not found: {id}"),
        }
    }
}

impl Error for NotFoundError {}

/// Any failure raised by the in-memory engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    Validation(ValidationError),
    Conflict(ConflictError),
    NotFound(NotFoundError),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(err) => err.code(),
            Self::Conflict(err) => err.code(),
            Self::NotFound(err) => err.code(),
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Conflict(err) => write!(f, "{err}"),
            Self::NotFound(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Conflict(err) => Some(err),
            Self::NotFound(err) => Some(err),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ConflictError> for EngineError {
    fn from(value: ConflictError) -> Self {
        Self::Conflict(value)
    }
}

impl From<NotFoundError> for EngineError {
    fn from(value: NotFoundError) -> Self {
        Self::NotFound(value)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
