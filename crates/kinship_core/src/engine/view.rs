//! Bounded, laid-out subgraphs for the rendering layer.
//!
//! # Responsibility
//! - Extract the descendant, ascendant or hourglass neighborhood of a root
//!   person, depth-limited per direction.
//! - Resolve per-node parent/child/spouse lists restricted to the view and
//!   assign deterministic layered coordinates.
//!
//! # Invariants
//! - Every node and edge of a view exists in the source snapshot.
//! - `max_generations == 0` yields the root alone, with empty lists.
//! - Node generation is the signed traversal depth: descendants positive,
//!   ancestors negative. Attached spouses share their partner's generation.
//! - Within a generation nodes are ordered oldest first; `x` is centred on 0
//!   and `y = generation * row_height`.

use crate::engine::snapshot::TreeSnapshot;
use crate::error::NotFoundError;
use crate::model::person::{Person, PersonId};
use crate::model::relationship::{FamilyUnion, ParentChildRelationship};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Which neighborhood of the root a view covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    Descendant,
    Ascendant,
    Hourglass,
}

impl ViewMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Descendant => "descendant",
            Self::Ascendant => "ascendant",
            Self::Hourglass => "hourglass",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "descendant" => Some(Self::Descendant),
            "ascendant" => Some(Self::Ascendant),
            "hourglass" => Some(Self::Hourglass),
            _ => None,
        }
    }

    fn directions(self) -> &'static [Direction] {
        match self {
            Self::Descendant => &[Direction::Down],
            Self::Ascendant => &[Direction::Up],
            Self::Hourglass => &[Direction::Down, Direction::Up],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Down,
    Up,
}

impl Direction {
    fn step(self) -> i32 {
        match self {
            Self::Down => 1,
            Self::Up => -1,
        }
    }
}

/// How a node entered the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Root,
    /// Reached through parent-child edges.
    Lineage,
    /// Partner of a lineage node, not expanded further.
    Spouse,
}

/// Layout and inclusion settings for view extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewLayout {
    pub row_height: f64,
    pub column_width: f64,
    pub include_spouses: bool,
}

impl Default for ViewLayout {
    fn default() -> Self {
        Self {
            row_height: 180.0,
            column_width: 220.0,
            include_spouses: true,
        }
    }
}

/// One person as rendered in a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonNode {
    pub person: Person,
    pub role: NodeRole,
    /// Signed depth from the view root along the walk. May differ from
    /// `GenerationResolver` levels where paths reconverge.
    pub generation: i32,
    pub x: f64,
    pub y: f64,
    /// Parents included in the view.
    pub parents: Vec<PersonId>,
    /// Children included in the view, by birth order then birth date.
    pub children: Vec<PersonId>,
    /// Partners included in the view.
    pub spouses: Vec<PersonId>,
    pub parents_total: usize,
    pub children_total: usize,
    pub unions_total: usize,
    pub media_count: usize,
    pub has_more_ancestors: bool,
    pub has_more_descendants: bool,
}

/// A bounded subgraph ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewGraph {
    pub root_person_id: PersonId,
    pub mode: ViewMode,
    pub max_generations: u32,
    /// Ordered by generation, then `x`.
    pub nodes: Vec<PersonNode>,
    pub relationships: Vec<ParentChildRelationship>,
    pub unions: Vec<FamilyUnion>,
}

impl ViewGraph {
    pub fn node(&self, person_id: PersonId) -> Option<&PersonNode> {
        self.nodes.iter().find(|node| node.person.id == person_id)
    }

    pub fn person_ids(&self) -> BTreeSet<PersonId> {
        self.nodes.iter().map(|node| node.person.id).collect()
    }
}

/// Single extraction routine shared by all view modes.
pub struct ViewBuilder<'a> {
    snapshot: &'a TreeSnapshot,
    layout: ViewLayout,
}

impl<'a> ViewBuilder<'a> {
    pub fn new(snapshot: &'a TreeSnapshot, layout: ViewLayout) -> Self {
        Self { snapshot, layout }
    }

    pub fn build(
        &self,
        root: PersonId,
        mode: ViewMode,
        max_generations: u32,
    ) -> Result<ViewGraph, NotFoundError> {
        self.snapshot.persons().get_person(root)?;

        let mut included: BTreeMap<PersonId, (i32, NodeRole)> = BTreeMap::new();
        included.insert(root, (0, NodeRole::Root));
        for direction in mode.directions() {
            self.walk(root, *direction, max_generations, &mut included);
        }
        if self.layout.include_spouses && max_generations > 0 {
            self.attach_spouses(&mut included);
        }

        let graph = self.snapshot.graph();
        let mut relationships: Vec<ParentChildRelationship> = graph
            .relationships()
            .filter(|edge| {
                included.contains_key(&edge.parent_id) && included.contains_key(&edge.child_id)
            })
            .cloned()
            .collect();
        relationships.sort_by_key(|edge| edge.id);
        let mut unions: Vec<FamilyUnion> = graph
            .unions()
            .filter(|union| {
                included.contains_key(&union.person1_id)
                    && included.contains_key(&union.person2_id)
            })
            .cloned()
            .collect();
        unions.sort_by_key(|union| union.id);

        let nodes = self.layout_nodes(&included, &relationships, &unions)?;
        Ok(ViewGraph {
            root_person_id: root,
            mode,
            max_generations,
            nodes,
            relationships,
            unions,
        })
    }

    fn walk(
        &self,
        root: PersonId,
        direction: Direction,
        max_generations: u32,
        included: &mut BTreeMap<PersonId, (i32, NodeRole)>,
    ) {
        let graph = self.snapshot.graph();
        let mut queue = VecDeque::from([(root, 0_u32)]);
        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_generations {
                continue;
            }
            let next = match direction {
                Direction::Down => graph.children_of(current),
                Direction::Up => graph.parents_of(current),
            };
            for neighbor in next {
                if included.contains_key(&neighbor) {
                    continue;
                }
                let generation = direction.step() * (depth as i32 + 1);
                included.insert(neighbor, (generation, NodeRole::Lineage));
                queue.push_back((neighbor, depth + 1));
            }
        }
    }

    fn attach_spouses(&self, included: &mut BTreeMap<PersonId, (i32, NodeRole)>) {
        let graph = self.snapshot.graph();
        let mut spouses = BTreeMap::new();
        for (person_id, (generation, _)) in included.iter() {
            for union in graph.unions_of(*person_id) {
                if let Some(partner) = union.partner_of(*person_id) {
                    if !included.contains_key(&partner) {
                        spouses.entry(partner).or_insert((*generation, NodeRole::Spouse));
                    }
                }
            }
        }
        included.extend(spouses);
    }

    fn layout_nodes(
        &self,
        included: &BTreeMap<PersonId, (i32, NodeRole)>,
        relationships: &[ParentChildRelationship],
        unions: &[FamilyUnion],
    ) -> Result<Vec<PersonNode>, NotFoundError> {
        let persons = self.snapshot.persons();
        let graph = self.snapshot.graph();

        let mut rows: BTreeMap<i32, Vec<&Person>> = BTreeMap::new();
        for (person_id, (generation, _)) in included {
            rows.entry(*generation)
                .or_default()
                .push(persons.get_person(*person_id)?);
        }

        let mut nodes = Vec::with_capacity(included.len());
        for (generation, mut row) in rows {
            row.sort_by(|left, right| left.birth_order_cmp(right));
            let centre = (row.len() as f64 - 1.0) / 2.0;
            for (index, person) in row.into_iter().enumerate() {
                let id = person.id;
                let role = included.get(&id).map_or(NodeRole::Lineage, |(_, role)| *role);

                let mut parent_ids: Vec<&Person> = relationships
                    .iter()
                    .filter(|edge| edge.child_id == id)
                    .map(|edge| edge.parent_id)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .map(|parent| persons.get_person(parent))
                    .collect::<Result<_, _>>()?;
                parent_ids.sort_by(|left, right| left.birth_order_cmp(right));

                let mut child_edges: Vec<&ParentChildRelationship> = relationships
                    .iter()
                    .filter(|edge| edge.parent_id == id)
                    .collect();
                child_edges.sort_by(|left, right| {
                    compare_children(
                        left,
                        right,
                        persons.get_person(left.child_id).ok(),
                        persons.get_person(right.child_id).ok(),
                    )
                });
                let mut children: Vec<PersonId> = Vec::new();
                for edge in child_edges {
                    if !children.contains(&edge.child_id) {
                        children.push(edge.child_id);
                    }
                }

                let mut spouse_unions: Vec<&FamilyUnion> =
                    unions.iter().filter(|union| union.involves(id)).collect();
                spouse_unions.sort_by(|left, right| compare_unions(left, right));
                let mut spouses: Vec<PersonId> = Vec::new();
                for union in spouse_unions {
                    if let Some(partner) = union.partner_of(id) {
                        if !spouses.contains(&partner) {
                            spouses.push(partner);
                        }
                    }
                }

                let all_parents = graph.parents_of(id);
                let all_children = graph.children_of(id);
                nodes.push(PersonNode {
                    person: person.clone(),
                    role,
                    generation,
                    x: (index as f64 - centre) * self.layout.column_width,
                    y: f64::from(generation) * self.layout.row_height,
                    parents: parent_ids.into_iter().map(|parent| parent.id).collect(),
                    children,
                    spouses,
                    parents_total: all_parents.len(),
                    children_total: all_children.len(),
                    unions_total: graph.unions_of(id).len(),
                    media_count: self.snapshot.media_count_of(id),
                    has_more_ancestors: all_parents
                        .iter()
                        .any(|parent| !included.contains_key(parent)),
                    has_more_descendants: all_children
                        .iter()
                        .any(|child| !included.contains_key(child)),
                });
            }
        }
        Ok(nodes)
    }
}

fn compare_children(
    left: &ParentChildRelationship,
    right: &ParentChildRelationship,
    left_person: Option<&Person>,
    right_person: Option<&Person>,
) -> Ordering {
    let by_order = match (left.birth_order, right.birth_order) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_order.then_with(|| match (left_person, right_person) {
        (Some(a), Some(b)) => a.birth_order_cmp(b),
        _ => left.child_id.cmp(&right.child_id),
    })
}

fn compare_unions(left: &FamilyUnion, right: &FamilyUnion) -> Ordering {
    let by_start = match (&left.start_date, &right.start_date) {
        (Some(a), Some(b)) => a.chronological_cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_start.then_with(|| left.id.cmp(&right.id))
}

#[cfg(test)]
mod tests {
    use super::{NodeRole, ViewBuilder, ViewLayout, ViewMode};
    use crate::engine::mutation::TreeOperation;
    use crate::engine::snapshot::TreeSnapshot;
    use crate::engine::{GenerationResolver, PersonDeleteMode};
    use crate::error::NotFoundError;
    use crate::model::person::{GenealogyDate, PersonDraft, PersonId};
    use crate::model::relationship::{RelationshipDraft, RelationshipType, UnionDraft, UnionType};
    use crate::model::tree::Tree;
    use uuid::Uuid;

    fn snapshot() -> TreeSnapshot {
        TreeSnapshot::empty(Tree::new(Uuid::new_v4(), "View test"))
    }

    fn person(snapshot: &mut TreeSnapshot, name: &str, born: Option<i32>) -> PersonId {
        let mut draft = PersonDraft::named(name, "View");
        draft.birth_date = born.and_then(GenealogyDate::year);
        let outcome = snapshot
            .apply(
                &TreeOperation::CreatePerson { person: draft },
                PersonDeleteMode::Restrict,
            )
            .unwrap();
        outcome.entity_id
    }

    fn link(snapshot: &mut TreeSnapshot, parent: PersonId, child: PersonId) {
        snapshot
            .apply(
                &TreeOperation::AddRelationship {
                    relationship: RelationshipDraft::new(
                        parent,
                        child,
                        RelationshipType::Biological,
                    ),
                },
                PersonDeleteMode::Restrict,
            )
            .unwrap();
    }

    fn marry(snapshot: &mut TreeSnapshot, a: PersonId, b: PersonId) {
        snapshot
            .apply(
                &TreeOperation::AddUnion {
                    union: UnionDraft::new(a, b, UnionType::Marriage),
                },
                PersonDeleteMode::Restrict,
            )
            .unwrap();
    }

    #[test]
    fn zero_generations_is_root_only() {
        let mut snap = snapshot();
        let a = person(&mut snap, "A", None);
        let b = person(&mut snap, "B", None);
        let c = person(&mut snap, "C", None);
        link(&mut snap, a, b);
        link(&mut snap, c, a);
        marry(&mut snap, a, c);

        for mode in [ViewMode::Descendant, ViewMode::Ascendant, ViewMode::Hourglass] {
            let view = ViewBuilder::new(&snap, ViewLayout::default())
                .build(a, mode, 0)
                .unwrap();
            assert_eq!(view.nodes.len(), 1);
            let root = &view.nodes[0];
            assert_eq!(root.role, NodeRole::Root);
            assert!(root.parents.is_empty() && root.children.is_empty() && root.spouses.is_empty());
            assert!(view.relationships.is_empty() && view.unions.is_empty());
            assert!(root.has_more_descendants);
            assert!(root.has_more_ancestors);
        }
    }

    #[test]
    fn hourglass_merges_both_directions() {
        let mut snap = snapshot();
        let grandparent = person(&mut snap, "G", Some(1900));
        let parent = person(&mut snap, "P", Some(1930));
        let root = person(&mut snap, "R", Some(1960));
        let child = person(&mut snap, "C", Some(1990));
        link(&mut snap, grandparent, parent);
        link(&mut snap, parent, root);
        link(&mut snap, root, child);

        let view = ViewBuilder::new(&snap, ViewLayout::default())
            .build(root, ViewMode::Hourglass, 1)
            .unwrap();
        assert_eq!(view.person_ids().len(), 3);
        assert_eq!(view.node(parent).unwrap().generation, -1);
        assert_eq!(view.node(child).unwrap().generation, 1);
        assert!(view.node(grandparent).is_none());
        assert!(view.node(parent).unwrap().has_more_ancestors);
        assert_eq!(view.node(root).unwrap().parents, vec![parent]);
        assert_eq!(view.node(parent).unwrap().y, -180.0);
    }

    #[test]
    fn siblings_are_laid_out_oldest_first() {
        let mut snap = snapshot();
        let root = person(&mut snap, "R", Some(1900));
        let young = person(&mut snap, "Young", Some(1935));
        let old = person(&mut snap, "Old", Some(1925));
        let undated = person(&mut snap, "Undated", None);
        for child in [young, old, undated] {
            link(&mut snap, root, child);
        }

        let view = ViewBuilder::new(&snap, ViewLayout::default())
            .build(root, ViewMode::Descendant, 1)
            .unwrap();
        let row: Vec<PersonId> = view
            .nodes
            .iter()
            .filter(|node| node.generation == 1)
            .map(|node| node.person.id)
            .collect();
        assert_eq!(row, vec![old, young, undated]);
        assert_eq!(view.node(old).unwrap().x, -220.0);
        assert_eq!(view.node(young).unwrap().x, 0.0);
        assert_eq!(view.node(root).unwrap().children, vec![old, young, undated]);
    }

    #[test]
    fn spouses_attach_without_expansion() {
        let mut snap = snapshot();
        let root = person(&mut snap, "R", None);
        let child = person(&mut snap, "C", None);
        let partner = person(&mut snap, "S", None);
        let partner_parent = person(&mut snap, "SP", None);
        link(&mut snap, root, child);
        link(&mut snap, partner_parent, partner);
        marry(&mut snap, child, partner);

        let view = ViewBuilder::new(&snap, ViewLayout::default())
            .build(root, ViewMode::Descendant, 2)
            .unwrap();
        let spouse = view.node(partner).unwrap();
        assert_eq!(spouse.role, NodeRole::Spouse);
        assert_eq!(spouse.generation, 1);
        assert!(view.node(partner_parent).is_none());
        assert_eq!(view.node(child).unwrap().spouses, vec![partner]);

        let without = ViewBuilder::new(
            &snap,
            ViewLayout {
                include_spouses: false,
                ..ViewLayout::default()
            },
        )
        .build(root, ViewMode::Descendant, 2)
        .unwrap();
        assert!(without.node(partner).is_none());
        assert!(without.unions.is_empty());
    }

    #[test]
    fn node_generation_is_walk_depth_not_resolver_level() {
        let mut snap = snapshot();
        let q = person(&mut snap, "Q", Some(1900));
        let r = person(&mut snap, "R", Some(1930));
        let x = person(&mut snap, "X", Some(1955));
        let y = person(&mut snap, "Y", Some(1980));
        let n = person(&mut snap, "N", Some(2005));
        link(&mut snap, q, r);
        link(&mut snap, r, x);
        link(&mut snap, x, y);
        link(&mut snap, y, n);
        link(&mut snap, q, n);

        let view = ViewBuilder::new(&snap, ViewLayout::default())
            .build(r, ViewMode::Hourglass, 3)
            .unwrap();
        assert_eq!(view.node(n).unwrap().generation, 3);
        assert_eq!(view.node(q).unwrap().generation, -1);

        let levels = GenerationResolver::new(snap.persons(), snap.graph())
            .resolve(r)
            .unwrap();
        assert_eq!(levels.get(n), Some(0));
    }

    #[test]
    fn unknown_root_is_not_found() {
        let snap = snapshot();
        let ghost = Uuid::new_v4();
        let err = ViewBuilder::new(&snap, ViewLayout::default())
            .build(ghost, ViewMode::Descendant, 3)
            .unwrap_err();
        assert_eq!(err, NotFoundError::Person(ghost));
    }
}
