//! Edge storage for parent-child relationships and unions.
//!
//! # Responsibility
//! - Hold both edge sets keyed by id, with per-person indexes in both
//!   directions for O(degree) neighbor queries.
//! - Stay mechanical: no business rule is checked here.
//!
//! # Invariants
//! - Index entries exist only for persons with at least one edge, so two
//!   graphs with equal edge sets compare equal.

use crate::model::person::PersonId;
use crate::model::relationship::{
    FamilyUnion, ParentChildRelationship, RelationshipId, UnionId,
};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipGraph {
    relationships: HashMap<RelationshipId, ParentChildRelationship>,
    unions: HashMap<UnionId, FamilyUnion>,
    /// child -> edges where the person is the child.
    parent_edges: HashMap<PersonId, BTreeSet<RelationshipId>>,
    /// parent -> edges where the person is the parent.
    child_edges: HashMap<PersonId, BTreeSet<RelationshipId>>,
    union_edges: HashMap<PersonId, BTreeSet<UnionId>>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from persisted edges.
    pub fn from_edges(
        relationships: impl IntoIterator<Item = ParentChildRelationship>,
        unions: impl IntoIterator<Item = FamilyUnion>,
    ) -> Self {
        let mut graph = Self::new();
        for relationship in relationships {
            graph.add_parent_child(relationship);
        }
        for union in unions {
            graph.add_union(union);
        }
        graph
    }

    /// Inserts or replaces a parent-child edge.
    pub fn add_parent_child(&mut self, relationship: ParentChildRelationship) {
        if let Some(previous) = self.remove_parent_child(relationship.id) {
            log::debug!(
                "event=graph_replace_edge module=graph relationship={}",
                previous.id
            );
        }
        self.parent_edges
            .entry(relationship.child_id)
            .or_default()
            .insert(relationship.id);
        self.child_edges
            .entry(relationship.parent_id)
            .or_default()
            .insert(relationship.id);
        self.relationships.insert(relationship.id, relationship);
    }

    pub fn remove_parent_child(&mut self, id: RelationshipId) -> Option<ParentChildRelationship> {
        let relationship = self.relationships.remove(&id)?;
        remove_index_entry(&mut self.parent_edges, relationship.child_id, id);
        remove_index_entry(&mut self.child_edges, relationship.parent_id, id);
        Some(relationship)
    }

    /// Inserts or replaces a union edge.
    pub fn add_union(&mut self, union: FamilyUnion) {
        self.remove_union(union.id);
        self.union_edges
            .entry(union.person1_id)
            .or_default()
            .insert(union.id);
        self.union_edges
            .entry(union.person2_id)
            .or_default()
            .insert(union.id);
        self.unions.insert(union.id, union);
    }

    pub fn remove_union(&mut self, id: UnionId) -> Option<FamilyUnion> {
        let union = self.unions.remove(&id)?;
        remove_index_entry(&mut self.union_edges, union.person1_id, id);
        remove_index_entry(&mut self.union_edges, union.person2_id, id);
        Some(union)
    }

    pub fn relationship(&self, id: RelationshipId) -> Option<&ParentChildRelationship> {
        self.relationships.get(&id)
    }

    pub fn union(&self, id: UnionId) -> Option<&FamilyUnion> {
        self.unions.get(&id)
    }

    pub fn parents_of(&self, person_id: PersonId) -> BTreeSet<PersonId> {
        self.parent_edges_of(person_id)
            .map(|relationship| relationship.parent_id)
            .collect()
    }

    pub fn children_of(&self, person_id: PersonId) -> BTreeSet<PersonId> {
        self.child_edges_of(person_id)
            .map(|relationship| relationship.child_id)
            .collect()
    }

    /// Unions the person takes part in, ordered by union id.
    pub fn unions_of(&self, person_id: PersonId) -> Vec<&FamilyUnion> {
        self.union_edges
            .get(&person_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.unions.get(id))
            .collect()
    }

    /// Edges where `person_id` is the child.
    pub fn parent_edges_of(
        &self,
        person_id: PersonId,
    ) -> impl Iterator<Item = &ParentChildRelationship> + '_ {
        self.parent_edges
            .get(&person_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.relationships.get(id))
    }

    /// Edges where `person_id` is the parent.
    pub fn child_edges_of(
        &self,
        person_id: PersonId,
    ) -> impl Iterator<Item = &ParentChildRelationship> + '_ {
        self.child_edges
            .get(&person_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.relationships.get(id))
    }

    /// Ids of every parent-child edge touching the person.
    pub fn relationships_involving(&self, person_id: PersonId) -> BTreeSet<RelationshipId> {
        let as_child = self.parent_edges.get(&person_id).into_iter().flatten();
        let as_parent = self.child_edges.get(&person_id).into_iter().flatten();
        as_child.chain(as_parent).copied().collect()
    }

    /// Ids of every union touching the person.
    pub fn unions_involving(&self, person_id: PersonId) -> BTreeSet<UnionId> {
        self.union_edges
            .get(&person_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Relationships pointing at `union_id` through their parents' context.
    pub fn relationships_in_union(&self, union_id: UnionId) -> Vec<&ParentChildRelationship> {
        let mut found: Vec<&ParentChildRelationship> = self
            .relationships
            .values()
            .filter(|relationship| relationship.union_id == Some(union_id))
            .collect();
        found.sort_by_key(|relationship| relationship.id);
        found
    }

    pub fn relationships(&self) -> impl Iterator<Item = &ParentChildRelationship> {
        self.relationships.values()
    }

    pub fn unions(&self) -> impl Iterator<Item = &FamilyUnion> {
        self.unions.values()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn union_count(&self) -> usize {
        self.unions.len()
    }
}

fn remove_index_entry<K>(
    index: &mut HashMap<PersonId, BTreeSet<K>>,
    person_id: PersonId,
    id: K,
) where
    K: Ord,
{
    if let Some(ids) = index.get_mut(&person_id) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(&person_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RelationshipGraph;
    use crate::model::relationship::{
        FamilyUnion, ParentChildRelationship, RelationshipDraft, RelationshipType, UnionDraft,
        UnionType,
    };
    use uuid::Uuid;

    fn edge(parent: Uuid, child: Uuid) -> ParentChildRelationship {
        ParentChildRelationship::from_draft(
            Uuid::nil(),
            RelationshipDraft::new(parent, child, RelationshipType::Biological),
        )
    }

    #[test]
    fn neighbors_are_indexed_both_ways() {
        let (mother, father, child) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut graph = RelationshipGraph::new();
        graph.add_parent_child(edge(mother, child));
        graph.add_parent_child(edge(father, child));

        assert_eq!(graph.parents_of(child).len(), 2);
        assert!(graph.children_of(mother).contains(&child));
        assert!(graph.children_of(child).is_empty());
        assert_eq!(graph.relationships_involving(child).len(), 2);
    }

    #[test]
    fn removing_all_edges_restores_empty_graph() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut graph = RelationshipGraph::new();
        let relationship = edge(a, b);
        let union = FamilyUnion::from_draft(Uuid::nil(), UnionDraft::new(a, b, UnionType::Other));
        let (relationship_id, union_id) = (relationship.id, union.id);
        graph.add_parent_child(relationship);
        graph.add_union(union);

        assert!(graph.remove_parent_child(relationship_id).is_some());
        assert!(graph.remove_union(union_id).is_some());
        assert!(graph.remove_union(union_id).is_none());
        assert_eq!(graph, RelationshipGraph::new());
    }

    #[test]
    fn unions_are_visible_from_both_partners() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut graph = RelationshipGraph::new();
        graph.add_union(FamilyUnion::from_draft(
            Uuid::nil(),
            UnionDraft::new(b, a, UnionType::Marriage),
        ));
        assert_eq!(graph.unions_of(a).len(), 1);
        assert_eq!(graph.unions_of(b).len(), 1);
        assert_eq!(graph.unions_of(a)[0].partner_of(a), Some(b));
    }
}
