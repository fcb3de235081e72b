//! Tree-wide aggregates.
//!
//! # Responsibility
//! - Count persons, edges and attachments of one snapshot.
//! - Score how complete the recorded person data is.
//!
//! # Invariants
//! - Read-only: the same snapshot always yields identical statistics.
//! - Persons unreachable from the root still count everywhere except
//!   `generations_count`.

use crate::engine::generation::GenerationResolver;
use crate::engine::snapshot::TreeSnapshot;
use crate::model::attachment::AttachmentKind;
use crate::model::person::Person;
use serde::{Deserialize, Serialize};

/// Informative fields scored per person, equally weighted.
const COMPLETENESS_FIELDS: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeStatistics {
    pub total_persons: usize,
    pub living_count: usize,
    pub deceased_count: usize,
    /// `max - min` generation among persons resolved from the root.
    pub generations_count: u32,
    pub with_photo_count: usize,
    pub with_biography_count: usize,
    /// Mean share of filled informative fields, in `0.0..=1.0`.
    pub completeness_score: f64,
    pub relationship_count: usize,
    pub union_count: usize,
    pub media_count: usize,
    pub capsule_link_count: usize,
}

pub struct StatisticsEngine;

impl StatisticsEngine {
    /// Computes statistics for `snapshot`.
    ///
    /// Generations are resolved from the tree root, or from the oldest
    /// person when no root is designated.
    pub fn compute(snapshot: &TreeSnapshot) -> TreeStatistics {
        let persons = snapshot.persons();
        let graph = snapshot.graph();

        let mut living_count = 0;
        let mut with_photo_count = 0;
        let mut with_biography_count = 0;
        let mut filled_share = 0.0;
        for person in persons.iter() {
            if person.is_alive {
                living_count += 1;
            }
            if person.has_photo() {
                with_photo_count += 1;
            }
            if person.has_biography() {
                with_biography_count += 1;
            }
            filled_share += completeness_of(person);
        }

        let total_persons = persons.len();
        let completeness_score = if total_persons == 0 {
            0.0
        } else {
            filled_share / total_persons as f64
        };

        let root = snapshot
            .tree()
            .root_person_id
            .or_else(|| persons.list_persons().first().map(|person| person.id));
        let generations_count = root
            .and_then(|root| GenerationResolver::new(persons, graph).resolve(root).ok())
            .map_or(0, |generations| generations.span());

        TreeStatistics {
            total_persons,
            living_count,
            deceased_count: total_persons - living_count,
            generations_count,
            with_photo_count,
            with_biography_count,
            completeness_score,
            relationship_count: graph.relationship_count(),
            union_count: graph.union_count(),
            media_count: snapshot.attachment_count(AttachmentKind::Media),
            capsule_link_count: snapshot.attachment_count(AttachmentKind::CapsuleLink),
        }
    }
}

fn completeness_of(person: &Person) -> f64 {
    let filled = [
        person.has_full_name(),
        person.birth_date.is_some(),
        person.has_birth_place(),
        person.has_photo(),
        person.has_biography(),
    ]
    .into_iter()
    .filter(|filled| *filled)
    .count();
    filled as f64 / COMPLETENESS_FIELDS
}
