//! Generation levels relative to a root person.
//!
//! # Responsibility
//! - Assign an integer generation to every person reachable from a root
//!   through parent-child edges in either direction.
//!
//! # Invariants
//! - The root is generation 0; children are `g + 1`, parents are `g - 1`.
//! - A person keeps the generation of its shortest path (edge count) from
//!   the root. Among equally short paths, the one with fewer step/foster
//!   edges wins; remaining ties go to the lowest predecessor id.
//! - Unreachable persons are absent from the result.
//! - Cost is O(V + E) per resolution.

use crate::engine::person_store::PersonStore;
use crate::engine::relationship_graph::RelationshipGraph;
use crate::error::NotFoundError;
use crate::model::person::PersonId;
use std::collections::{BTreeMap, HashMap};

/// Resolved generation levels for one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generations {
    root: PersonId,
    levels: HashMap<PersonId, i32>,
}

impl Generations {
    pub fn root(&self) -> PersonId {
        self.root
    }

    /// Generation of `person_id`, or `None` when unreachable from the root.
    pub fn get(&self, person_id: PersonId) -> Option<i32> {
        self.levels.get(&person_id).copied()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn min(&self) -> i32 {
        self.levels.values().copied().min().unwrap_or(0)
    }

    pub fn max(&self) -> i32 {
        self.levels.values().copied().max().unwrap_or(0)
    }

    /// Distance between the oldest and the youngest resolved generation.
    pub fn span(&self) -> u32 {
        self.max().abs_diff(self.min())
    }

    pub fn iter(&self) -> impl Iterator<Item = (PersonId, i32)> + '_ {
        self.levels.iter().map(|(id, level)| (*id, *level))
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    generation: i32,
    soft_edges: u32,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        self.soft_edges < other.soft_edges
    }
}

/// Breadth-first generation resolver over a validated graph.
pub struct GenerationResolver<'a> {
    persons: &'a PersonStore,
    graph: &'a RelationshipGraph,
}

impl<'a> GenerationResolver<'a> {
    pub fn new(persons: &'a PersonStore, graph: &'a RelationshipGraph) -> Self {
        Self { persons, graph }
    }

    /// Resolves generations from `root`.
    ///
    /// The search is level-synchronous: every person first reached at edge
    /// distance `d + 1` is settled only after all persons at distance `d`
    /// proposed a candidate, which makes the step/foster tie-break exact.
    pub fn resolve(&self, root: PersonId) -> Result<Generations, NotFoundError> {
        self.persons.get_person(root)?;

        let mut settled: HashMap<PersonId, Candidate> = HashMap::new();
        settled.insert(
            root,
            Candidate {
                generation: 0,
                soft_edges: 0,
            },
        );
        let mut frontier = vec![root];

        while !frontier.is_empty() {
            let mut proposals: BTreeMap<PersonId, Candidate> = BTreeMap::new();
            for current in &frontier {
                let Some(from) = settled.get(current).copied() else {
                    continue;
                };
                let downward = self
                    .graph
                    .child_edges_of(*current)
                    .map(|edge| (edge.child_id, from.generation + 1, edge.relationship_type));
                let upward = self
                    .graph
                    .parent_edges_of(*current)
                    .map(|edge| (edge.parent_id, from.generation - 1, edge.relationship_type));

                for (neighbor, generation, relationship_type) in downward.chain(upward) {
                    if settled.contains_key(&neighbor) {
                        continue;
                    }
                    let candidate = Candidate {
                        generation,
                        soft_edges: from.soft_edges + u32::from(!relationship_type.is_lineal()),
                    };
                    match proposals.get(&neighbor) {
                        Some(existing) if !candidate.beats(existing) => {}
                        _ => {
                            proposals.insert(neighbor, candidate);
                        }
                    }
                }
            }

            frontier = proposals.keys().copied().collect();
            settled.extend(proposals);
        }

        let levels = settled
            .into_iter()
            .map(|(id, candidate)| (id, candidate.generation))
            .collect();
        Ok(Generations { root, levels })
    }
}
