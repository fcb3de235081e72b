//! Consistent in-memory state of one tree.
//!
//! # Responsibility
//! - Bundle the tree record, its person arena, its edge graph and attachment
//!   counts into one value readers can share behind an `Arc`.
//! - Carry a `version` that changes with every committed mutation.
//!
//! # Invariants
//! - A published snapshot is never mutated; writers work on a clone.

use crate::engine::integrity::IntegrityValidator;
use crate::engine::person_store::PersonStore;
use crate::engine::relationship_graph::RelationshipGraph;
use crate::model::attachment::{AttachmentKind, PersonAttachment};
use crate::model::person::{Person, PersonId};
use crate::model::relationship::{FamilyUnion, ParentChildRelationship};
use crate::model::tree::Tree;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct TreeSnapshot {
    pub(crate) tree: Tree,
    pub(crate) persons: PersonStore,
    pub(crate) graph: RelationshipGraph,
    pub(crate) attachments: Vec<PersonAttachment>,
    media_by_person: HashMap<PersonId, usize>,
    version: u64,
}

impl TreeSnapshot {
    /// Snapshot of a tree with no persons or edges.
    pub fn empty(tree: Tree) -> Self {
        let persons = PersonStore::new(tree.id);
        Self {
            tree,
            persons,
            graph: RelationshipGraph::new(),
            attachments: Vec::new(),
            media_by_person: HashMap::new(),
            version: 0,
        }
    }

    /// Assembles a snapshot from records loaded by a store adapter.
    ///
    /// Records of other trees, edges with dangling endpoints and edges that
    /// would break acyclicity or uniqueness are dropped.
    pub fn from_records(
        tree: Tree,
        persons: Vec<Person>,
        relationships: Vec<ParentChildRelationship>,
        unions: Vec<FamilyUnion>,
        attachments: Vec<PersonAttachment>,
    ) -> Self {
        let tree_id = tree.id;
        let loaded = (persons.len(), relationships.len(), unions.len());
        let persons = PersonStore::from_persons(tree_id, persons);
        let mut tree = tree;
        if tree
            .root_person_id
            .is_some_and(|root| !persons.contains(root))
        {
            tree.root_person_id = None;
        }
        let unions: Vec<FamilyUnion> = unions
            .into_iter()
            .filter(|union| {
                union.tree_id == tree_id
                    && union.person1_id != union.person2_id
                    && persons.contains(union.person1_id)
                    && persons.contains(union.person2_id)
            })
            .collect();
        let mut graph = RelationshipGraph::from_edges(Vec::new(), unions);

        // Persisted edges are replayed through the structural checks so a
        // corrupt store can never hand readers a cyclic graph.
        let mut relationships = relationships;
        relationships.sort_by_key(|edge| edge.id);
        for edge in relationships {
            let admissible = edge.tree_id == tree_id
                && persons.contains(edge.parent_id)
                && persons.contains(edge.child_id)
                && edge.union_id.map_or(true, |id| graph.union(id).is_some())
                && !graph.child_edges_of(edge.parent_id).any(|existing| {
                    existing.child_id == edge.child_id
                        && existing.relationship_type == edge.relationship_type
                })
                && !IntegrityValidator::would_create_cycle(&graph, edge.parent_id, edge.child_id);
            if admissible {
                graph.add_parent_child(edge);
            }
        }

        let kept = (persons.len(), graph.relationship_count(), graph.union_count());
        if loaded != kept {
            log::warn!(
                "event=snapshot_load module=engine status=partial tree={} dropped_persons={} dropped_relationships={} dropped_unions={}",
                tree_id,
                loaded.0 - kept.0,
                loaded.1 - kept.1,
                loaded.2 - kept.2
            );
        }
        let attachments: Vec<PersonAttachment> = attachments
            .into_iter()
            .filter(|attachment| {
                attachment.tree_id == tree_id && persons.contains(attachment.person_id)
            })
            .collect();

        let mut snapshot = Self {
            tree,
            persons,
            graph,
            attachments,
            media_by_person: HashMap::new(),
            version: 0,
        };
        snapshot.reindex_attachments();
        snapshot
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn persons(&self) -> &PersonStore {
        &self.persons
    }

    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    pub fn attachments(&self) -> &[PersonAttachment] {
        &self.attachments
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Number of media attachments of one person.
    pub fn media_count_of(&self, person_id: PersonId) -> usize {
        self.media_by_person.get(&person_id).copied().unwrap_or(0)
    }

    pub fn attachment_count(&self, kind: AttachmentKind) -> usize {
        self.attachments
            .iter()
            .filter(|attachment| attachment.kind == kind)
            .count()
    }

    pub(crate) fn remove_attachments_of(&mut self, person_id: PersonId) -> usize {
        let before = self.attachments.len();
        self.attachments
            .retain(|attachment| attachment.person_id != person_id);
        self.media_by_person.remove(&person_id);
        before - self.attachments.len()
    }

    pub(crate) fn push_attachment(&mut self, attachment: PersonAttachment) {
        if attachment.kind == AttachmentKind::Media {
            *self.media_by_person.entry(attachment.person_id).or_default() += 1;
        }
        self.attachments.push(attachment);
    }

    fn reindex_attachments(&mut self) {
        self.media_by_person.clear();
        for attachment in &self.attachments {
            if attachment.kind == AttachmentKind::Media {
                *self.media_by_person.entry(attachment.person_id).or_default() += 1;
            }
        }
    }
}
