//! Write-time gatekeeper for the person arena and the relationship graph.
//!
//! # Responsibility
//! - Decide whether a candidate mutation keeps every structural invariant.
//! - Never mutate; callers commit only after every check passed.
//!
//! # Invariants
//! - Checks run in a fixed order: referential, self-reference, duplicate,
//!   acyclicity. The first failure wins.
//! - The parent-child edge set stays acyclic: an edge parent -> child is
//!   rejected when `parent` is already reachable from `child`.

use crate::engine::person_store::PersonStore;
use crate::engine::relationship_graph::RelationshipGraph;
use crate::error::{ConflictError, EngineError, NotFoundError, ValidationError};
use crate::model::person::{Person, PersonId};
use crate::model::relationship::{FamilyUnion, ParentChildRelationship};
use std::collections::HashSet;

/// How a person delete treats edges that still reference the person.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonDeleteMode {
    /// Reject the delete with `ConflictError` while edges remain.
    #[default]
    Restrict,
    /// Remove every referencing relationship and union first.
    Cascade,
}

impl PersonDeleteMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Restrict => "restrict",
            Self::Cascade => "cascade",
        }
    }
}

/// Stateless validator over a person arena and its graph.
pub struct IntegrityValidator;

impl IntegrityValidator {
    /// Record-local person checks (names, alive flag, date ordering).
    pub fn check_person(person: &Person) -> Result<(), ValidationError> {
        person.validate()
    }

    /// Checks a candidate parent-child edge before it is committed.
    pub fn check_relationship(
        persons: &PersonStore,
        graph: &RelationshipGraph,
        candidate: &ParentChildRelationship,
    ) -> Result<(), EngineError> {
        ensure_member(persons, candidate.parent_id)?;
        ensure_member(persons, candidate.child_id)?;
        if let Some(union_id) = candidate.union_id {
            let union = graph.union(union_id).ok_or(NotFoundError::Union(union_id))?;
            if !union.involves(candidate.parent_id) {
                return Err(ValidationError::UnionMismatch {
                    union: union_id,
                    parent: candidate.parent_id,
                }
                .into());
            }
        }

        if candidate.parent_id == candidate.child_id {
            return Err(ValidationError::SelfReference(candidate.parent_id).into());
        }

        if let Some(existing) = graph.child_edges_of(candidate.parent_id).find(|edge| {
            edge.id != candidate.id
                && edge.child_id == candidate.child_id
                && edge.relationship_type == candidate.relationship_type
        }) {
            return Err(ConflictError::DuplicateRelationship {
                existing: existing.id,
                relationship_type: existing.relationship_type,
            }
            .into());
        }

        if Self::would_create_cycle(graph, candidate.parent_id, candidate.child_id) {
            return Err(ValidationError::CycleDetected {
                parent: candidate.parent_id,
                child: candidate.child_id,
            }
            .into());
        }
        Ok(())
    }

    /// Checks a candidate union. `candidate.id` is ignored when looking for
    /// overlaps, so the same routine validates updates.
    pub fn check_union(
        persons: &PersonStore,
        graph: &RelationshipGraph,
        candidate: &FamilyUnion,
    ) -> Result<(), EngineError> {
        ensure_member(persons, candidate.person1_id)?;
        ensure_member(persons, candidate.person2_id)?;
        candidate.validate()?;

        let pair = candidate.pair_key();
        if let Some(existing) = graph.unions_of(candidate.person1_id).into_iter().find(|union| {
            union.id != candidate.id && union.pair_key() == pair && union.overlaps(candidate)
        }) {
            return Err(ConflictError::DuplicateUnion {
                existing: existing.id,
            }
            .into());
        }
        Ok(())
    }

    /// Checks whether a person may be removed under `mode`.
    pub fn check_person_delete(
        persons: &PersonStore,
        graph: &RelationshipGraph,
        person_id: PersonId,
        mode: PersonDeleteMode,
    ) -> Result<(), EngineError> {
        persons.get_person(person_id)?;
        if mode == PersonDeleteMode::Cascade {
            return Ok(());
        }
        let relationships = graph.relationships_involving(person_id).len();
        let unions = graph.unions_involving(person_id).len();
        if relationships > 0 || unions > 0 {
            return Err(ConflictError::PersonStillReferenced {
                person: person_id,
                relationships,
                unions,
            }
            .into());
        }
        Ok(())
    }

    /// Returns whether adding `parent -> child` would close a directed cycle,
    /// i.e. whether `parent` is already a descendant of `child`.
    ///
    /// Iterative depth-first search bounded by the visited set, so it
    /// terminates even on corrupt input.
    pub fn would_create_cycle(graph: &RelationshipGraph, parent: PersonId, child: PersonId) -> bool {
        if parent == child {
            return true;
        }
        let mut visited = HashSet::new();
        let mut stack = vec![child];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for edge in graph.child_edges_of(current) {
                if edge.child_id == parent {
                    return true;
                }
                if !visited.contains(&edge.child_id) {
                    stack.push(edge.child_id);
                }
            }
        }
        false
    }
}

fn ensure_member(persons: &PersonStore, person_id: PersonId) -> Result<(), EngineError> {
    let person = persons.get_person(person_id)?;
    if person.tree_id != persons.tree_id() {
        return Err(ValidationError::CrossTreeReference {
            person: person_id,
            tree: person.tree_id,
        }
        .into());
    }
    Ok(())
}
