//! Tree mutations and the change sets they produce.
//!
//! # Responsibility
//! - Define the closed set of mutating operations on one tree.
//! - Apply an operation to a working snapshot after `IntegrityValidator`
//!   accepted it, and describe the result as a `MutationBatch` for the
//!   persistence collaborator.
//!
//! # Invariants
//! - Every check runs before the first write, so a failed operation leaves
//!   the snapshot untouched.
//! - Batch order respects references: edges are detached or removed before
//!   the records they point to.

use crate::engine::integrity::{IntegrityValidator, PersonDeleteMode};
use crate::engine::snapshot::TreeSnapshot;
use crate::error::{EngineResult, NotFoundError};
use crate::model::person::{Person, PersonDraft, PersonId, PersonPatch};
use crate::model::relationship::{
    FamilyUnion, ParentChildRelationship, RelationshipDraft, RelationshipId, UnionDraft, UnionId,
    UnionPatch,
};
use crate::model::tree::Tree;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Id of the entity a mutation created or touched.
pub type EntityId = Uuid;

/// One mutating operation on a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TreeOperation {
    CreatePerson {
        person: PersonDraft,
    },
    UpdatePerson {
        person_id: PersonId,
        patch: PersonPatch,
    },
    DeletePerson {
        person_id: PersonId,
        /// Falls back to the configured default when absent.
        #[serde(default)]
        mode: Option<PersonDeleteMode>,
    },
    AddRelationship {
        relationship: RelationshipDraft,
    },
    RemoveRelationship {
        relationship_id: RelationshipId,
    },
    AddUnion {
        union: UnionDraft,
    },
    UpdateUnion {
        union_id: UnionId,
        patch: UnionPatch,
    },
    RemoveUnion {
        union_id: UnionId,
    },
    SetRootPerson {
        person_id: Option<PersonId>,
    },
}

impl TreeOperation {
    /// Stable operation name used in log events.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreatePerson { .. } => "create_person",
            Self::UpdatePerson { .. } => "update_person",
            Self::DeletePerson { .. } => "delete_person",
            Self::AddRelationship { .. } => "add_relationship",
            Self::RemoveRelationship { .. } => "remove_relationship",
            Self::AddUnion { .. } => "add_union",
            Self::UpdateUnion { .. } => "update_union",
            Self::RemoveUnion { .. } => "remove_union",
            Self::SetRootPerson { .. } => "set_root_person",
        }
    }
}

/// One persisted effect of a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    UpsertPerson(Person),
    DeletePerson(PersonId),
    UpsertRelationship(ParentChildRelationship),
    DeleteRelationship(RelationshipId),
    UpsertUnion(FamilyUnion),
    DeleteUnion(UnionId),
    DeleteAttachmentsOf(PersonId),
    UpdateTree(Tree),
}

/// Ordered change set of one validated mutation. Committed atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationBatch {
    changes: Vec<StoreChange>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: StoreChange) {
        self.changes.push(change);
    }

    pub fn changes(&self) -> &[StoreChange] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Result of applying one operation to a working snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub entity_id: EntityId,
    pub batch: MutationBatch,
}

impl MutationOutcome {
    fn single(entity_id: EntityId, change: StoreChange) -> Self {
        let mut batch = MutationBatch::new();
        batch.push(change);
        Self { entity_id, batch }
    }
}

impl TreeSnapshot {
    /// Validates and applies `operation` in place.
    ///
    /// The snapshot version is not changed here; the owner bumps it once the
    /// batch is durably committed.
    pub fn apply(
        &mut self,
        operation: &TreeOperation,
        default_delete_mode: PersonDeleteMode,
    ) -> EngineResult<MutationOutcome> {
        match operation {
            TreeOperation::CreatePerson { person } => {
                let created = self.persons.create_person(person.clone())?;
                Ok(MutationOutcome::single(
                    created.id,
                    StoreChange::UpsertPerson(created),
                ))
            }
            TreeOperation::UpdatePerson { person_id, patch } => {
                let updated = self.persons.update_person(*person_id, patch)?;
                Ok(MutationOutcome::single(
                    updated.id,
                    StoreChange::UpsertPerson(updated),
                ))
            }
            TreeOperation::DeletePerson { person_id, mode } => {
                self.delete_person(*person_id, mode.unwrap_or(default_delete_mode))
            }
            TreeOperation::AddRelationship { relationship } => {
                let candidate = ParentChildRelationship::from_draft(self.tree.id, relationship.clone());
                IntegrityValidator::check_relationship(&self.persons, &self.graph, &candidate)?;
                self.graph.add_parent_child(candidate.clone());
                Ok(MutationOutcome::single(
                    candidate.id,
                    StoreChange::UpsertRelationship(candidate),
                ))
            }
            TreeOperation::RemoveRelationship { relationship_id } => {
                self.graph
                    .remove_parent_child(*relationship_id)
                    .ok_or(NotFoundError::Relationship(*relationship_id))?;
                Ok(MutationOutcome::single(
                    *relationship_id,
                    StoreChange::DeleteRelationship(*relationship_id),
                ))
            }
            TreeOperation::AddUnion { union } => {
                let candidate = FamilyUnion::from_draft(self.tree.id, union.clone());
                IntegrityValidator::check_union(&self.persons, &self.graph, &candidate)?;
                self.graph.add_union(candidate.clone());
                Ok(MutationOutcome::single(
                    candidate.id,
                    StoreChange::UpsertUnion(candidate),
                ))
            }
            TreeOperation::UpdateUnion { union_id, patch } => {
                let mut candidate = self
                    .graph
                    .union(*union_id)
                    .cloned()
                    .ok_or(NotFoundError::Union(*union_id))?;
                patch.apply_to(&mut candidate);
                IntegrityValidator::check_union(&self.persons, &self.graph, &candidate)?;
                self.graph.add_union(candidate.clone());
                Ok(MutationOutcome::single(
                    candidate.id,
                    StoreChange::UpsertUnion(candidate),
                ))
            }
            TreeOperation::RemoveUnion { union_id } => self.remove_union(*union_id),
            TreeOperation::SetRootPerson { person_id } => {
                if let Some(person_id) = person_id {
                    self.persons.get_person(*person_id)?;
                }
                self.tree.root_person_id = *person_id;
                Ok(MutationOutcome::single(
                    self.tree.id,
                    StoreChange::UpdateTree(self.tree.clone()),
                ))
            }
        }
    }

    fn delete_person(
        &mut self,
        person_id: PersonId,
        mode: PersonDeleteMode,
    ) -> EngineResult<MutationOutcome> {
        IntegrityValidator::check_person_delete(&self.persons, &self.graph, person_id, mode)?;

        let mut batch = MutationBatch::new();
        let removed_relationships = self.graph.relationships_involving(person_id);
        let removed_unions = self.graph.unions_involving(person_id);

        for relationship in self.detach_from_unions(&removed_unions, &removed_relationships) {
            batch.push(StoreChange::UpsertRelationship(relationship));
        }
        for id in &removed_relationships {
            self.graph.remove_parent_child(*id);
            batch.push(StoreChange::DeleteRelationship(*id));
        }
        for id in &removed_unions {
            self.graph.remove_union(*id);
            batch.push(StoreChange::DeleteUnion(*id));
        }
        if self.remove_attachments_of(person_id) > 0 {
            batch.push(StoreChange::DeleteAttachmentsOf(person_id));
        }
        if self.tree.root_person_id == Some(person_id) {
            self.tree.root_person_id = None;
            batch.push(StoreChange::UpdateTree(self.tree.clone()));
        }
        self.persons.delete_person(person_id)?;
        batch.push(StoreChange::DeletePerson(person_id));

        log::debug!(
            "event=person_delete module=engine mode={} relationships={} unions={}",
            mode.as_str(),
            removed_relationships.len(),
            removed_unions.len()
        );
        Ok(MutationOutcome {
            entity_id: person_id,
            batch,
        })
    }

    fn remove_union(&mut self, union_id: UnionId) -> EngineResult<MutationOutcome> {
        if self.graph.union(union_id).is_none() {
            return Err(NotFoundError::Union(union_id).into());
        }
        let mut batch = MutationBatch::new();
        let targets = BTreeSet::from([union_id]);
        for relationship in self.detach_from_unions(&targets, &BTreeSet::new()) {
            batch.push(StoreChange::UpsertRelationship(relationship));
        }
        self.graph.remove_union(union_id);
        batch.push(StoreChange::DeleteUnion(union_id));
        Ok(MutationOutcome {
            entity_id: union_id,
            batch,
        })
    }

    /// Clears `union_id` on surviving relationships that point at a union
    /// about to be removed. Returns the rewritten relationships.
    fn detach_from_unions(
        &mut self,
        unions: &BTreeSet<UnionId>,
        skip: &BTreeSet<RelationshipId>,
    ) -> Vec<ParentChildRelationship> {
        let mut detached = Vec::new();
        for union_id in unions {
            let affected: Vec<ParentChildRelationship> = self
                .graph
                .relationships_in_union(*union_id)
                .into_iter()
                .filter(|relationship| !skip.contains(&relationship.id))
                .cloned()
                .collect();
            for mut relationship in affected {
                relationship.union_id = None;
                self.graph.add_parent_child(relationship.clone());
                detached.push(relationship);
            }
        }
        detached
    }
}

#[cfg(test)]
mod tests {
    use super::{StoreChange, TreeOperation};
    use crate::engine::integrity::PersonDeleteMode;
    use crate::engine::snapshot::TreeSnapshot;
    use crate::error::{ConflictError, EngineError, NotFoundError, ValidationError};
    use crate::model::person::{PersonDraft, PersonId};
    use crate::model::relationship::{
        RelationshipDraft, RelationshipType, UnionDraft, UnionPatch, UnionType,
    };
    use crate::model::tree::Tree;
    use uuid::Uuid;

    const RESTRICT: PersonDeleteMode = PersonDeleteMode::Restrict;

    fn snapshot() -> TreeSnapshot {
        TreeSnapshot::empty(Tree::new(Uuid::new_v4(), "Mutations"))
    }

    fn create(snap: &mut TreeSnapshot, name: &str) -> PersonId {
        snap.apply(
            &TreeOperation::CreatePerson {
                person: PersonDraft::named(name, "Mutation"),
            },
            RESTRICT,
        )
        .unwrap()
        .entity_id
    }

    fn add_edge(snap: &mut TreeSnapshot, parent: PersonId, child: PersonId) -> Uuid {
        snap.apply(
            &TreeOperation::AddRelationship {
                relationship: RelationshipDraft::new(parent, child, RelationshipType::Biological),
            },
            RESTRICT,
        )
        .unwrap()
        .entity_id
    }

    #[test]
    fn rejected_cycle_leaves_snapshot_identical() {
        let mut snap = snapshot();
        let (a, b, c) = (create(&mut snap, "A"), create(&mut snap, "B"), create(&mut snap, "C"));
        add_edge(&mut snap, a, b);
        add_edge(&mut snap, b, c);
        let before = snap.clone();

        let err = snap
            .apply(
                &TreeOperation::AddRelationship {
                    relationship: RelationshipDraft::new(c, a, RelationshipType::Adopted),
                },
                RESTRICT,
            )
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::Validation(ValidationError::CycleDetected { parent: c, child: a })
        );
        assert_eq!(snap, before);
    }

    #[test]
    fn restricted_delete_is_blocked_and_cascade_removes_edges() {
        let mut snap = snapshot();
        let (a, b, c) = (create(&mut snap, "A"), create(&mut snap, "B"), create(&mut snap, "C"));
        let edge = add_edge(&mut snap, a, b);
        let union = snap
            .apply(
                &TreeOperation::AddUnion {
                    union: UnionDraft::new(a, c, UnionType::Marriage),
                },
                RESTRICT,
            )
            .unwrap()
            .entity_id;

        let err = snap
            .apply(
                &TreeOperation::DeletePerson {
                    person_id: a,
                    mode: None,
                },
                RESTRICT,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Conflict(ConflictError::PersonStillReferenced { .. })
        ));
        assert!(snap.persons().contains(a));

        let outcome = snap
            .apply(
                &TreeOperation::DeletePerson {
                    person_id: a,
                    mode: Some(PersonDeleteMode::Cascade),
                },
                RESTRICT,
            )
            .unwrap();
        assert_eq!(
            outcome.batch.changes().last(),
            Some(&StoreChange::DeletePerson(a))
        );
        assert!(snap.graph().relationship(edge).is_none());
        assert!(snap.graph().union(union).is_none());

        let err = snap
            .apply(
                &TreeOperation::RemoveRelationship {
                    relationship_id: edge,
                },
                RESTRICT,
            )
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::NotFound(NotFoundError::Relationship(edge))
        );
    }

    #[test]
    fn removing_union_detaches_children() {
        let mut snap = snapshot();
        let (a, b, c) = (create(&mut snap, "A"), create(&mut snap, "B"), create(&mut snap, "C"));
        let union = snap
            .apply(
                &TreeOperation::AddUnion {
                    union: UnionDraft::new(a, b, UnionType::Marriage),
                },
                RESTRICT,
            )
            .unwrap()
            .entity_id;
        let mut draft = RelationshipDraft::new(a, c, RelationshipType::Biological);
        draft.union_id = Some(union);
        let edge = snap
            .apply(&TreeOperation::AddRelationship { relationship: draft }, RESTRICT)
            .unwrap()
            .entity_id;

        let outcome = snap
            .apply(&TreeOperation::RemoveUnion { union_id: union }, RESTRICT)
            .unwrap();
        assert_eq!(outcome.batch.len(), 2);
        assert_eq!(snap.graph().relationship(edge).unwrap().union_id, None);
    }

    #[test]
    fn ending_a_union_allows_a_new_current_one() {
        let mut snap = snapshot();
        let (a, b) = (create(&mut snap, "A"), create(&mut snap, "B"));
        let first = snap
            .apply(
                &TreeOperation::AddUnion {
                    union: UnionDraft::new(a, b, UnionType::Engagement),
                },
                RESTRICT,
            )
            .unwrap()
            .entity_id;
        let marriage = TreeOperation::AddUnion {
            union: UnionDraft::new(b, a, UnionType::Marriage),
        };
        assert!(snap.apply(&marriage, RESTRICT).is_err());

        snap.apply(
            &TreeOperation::UpdateUnion {
                union_id: first,
                patch: UnionPatch {
                    is_current: Some(false),
                    ..UnionPatch::default()
                },
            },
            RESTRICT,
        )
        .unwrap();
        snap.apply(&marriage, RESTRICT).unwrap();
        assert_eq!(snap.graph().union_count(), 2);
    }

    #[test]
    fn deleting_root_person_clears_tree_root() {
        let mut snap = snapshot();
        let a = create(&mut snap, "A");
        snap.apply(&TreeOperation::SetRootPerson { person_id: Some(a) }, RESTRICT)
            .unwrap();
        assert_eq!(snap.tree().root_person_id, Some(a));

        snap.apply(
            &TreeOperation::DeletePerson {
                person_id: a,
                mode: None,
            },
            RESTRICT,
        )
        .unwrap();
        assert_eq!(snap.tree().root_person_id, None);
    }

    #[test]
    fn operations_decode_from_tagged_json() {
        let person = Uuid::new_v4();
        let json = format!(r#"{{"op": "delete_person", "person_id": "{person}", "mode": "cascade"}}"#);
        let operation: TreeOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(
            operation,
            TreeOperation::DeletePerson {
                person_id: person,
                mode: Some(PersonDeleteMode::Cascade)
            }
        );
        assert_eq!(operation.name(), "delete_person");
    }
}
