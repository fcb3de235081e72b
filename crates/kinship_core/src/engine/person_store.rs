//! In-memory person arena of one tree.
//!
//! # Responsibility
//! - Own the person records of a tree, keyed by stable id.
//! - Enforce record-local validation on create and update.
//!
//! # Invariants
//! - Every stored person has `tree_id == self.tree_id`.
//! - Every stored person passed `IntegrityValidator::check_person`.
//! - Removing a person does not touch edges; callers clear references first.

use crate::engine::integrity::IntegrityValidator;
use crate::error::{NotFoundError, ValidationError};
use crate::model::person::{Person, PersonDraft, PersonId, PersonPatch};
use crate::model::tree::TreeId;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PersonStore {
    tree_id: TreeId,
    persons: HashMap<PersonId, Person>,
}

impl PersonStore {
    pub fn new(tree_id: TreeId) -> Self {
        Self {
            tree_id,
            persons: HashMap::new(),
        }
    }

    /// Builds a store from persisted records, skipping records of other trees.
    pub fn from_persons(tree_id: TreeId, persons: impl IntoIterator<Item = Person>) -> Self {
        let persons = persons
            .into_iter()
            .filter(|person| person.tree_id == tree_id)
            .map(|person| (person.id, person))
            .collect();
        Self { tree_id, persons }
    }

    pub fn tree_id(&self) -> TreeId {
        self.tree_id
    }

    /// Validates and inserts a new person.
    pub fn create_person(&mut self, draft: PersonDraft) -> Result<Person, ValidationError> {
        let person = Person::from_draft(self.tree_id, draft);
        IntegrityValidator::check_person(&person)?;
        self.persons.insert(person.id, person.clone());
        Ok(person)
    }

    /// Applies a partial update. The stored record is replaced only when the
    /// patched record validates.
    pub fn update_person(
        &mut self,
        id: PersonId,
        patch: &PersonPatch,
    ) -> Result<Person, UpdatePersonError> {
        let mut updated = self.get_person(id)?.clone();
        patch.apply_to(&mut updated);
        IntegrityValidator::check_person(&updated)?;
        self.persons.insert(id, updated.clone());
        Ok(updated)
    }

    /// Removes a person record.
    pub fn delete_person(&mut self, id: PersonId) -> Result<Person, NotFoundError> {
        self.persons.remove(&id).ok_or(NotFoundError::Person(id))
    }

    pub fn get_person(&self, id: PersonId) -> Result<&Person, NotFoundError> {
        self.persons.get(&id).ok_or(NotFoundError::Person(id))
    }

    pub fn contains(&self, id: PersonId) -> bool {
        self.persons.contains_key(&id)
    }

    /// Lists persons oldest first (see `Person::birth_order_cmp`).
    pub fn list_persons(&self) -> Vec<&Person> {
        let mut persons: Vec<&Person> = self.persons.values().collect();
        persons.sort_by(|left, right| left.birth_order_cmp(right));
        persons
    }

    pub fn iter(&self) -> impl Iterator<Item = &Person> {
        self.persons.values()
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }
}

/// Update failure: either the person is missing or the patch is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePersonError {
    NotFound(NotFoundError),
    Validation(ValidationError),
}

impl From<NotFoundError> for UpdatePersonError {
    fn from(value: NotFoundError) -> Self {
        Self::NotFound(value)
    }
}

impl From<ValidationError> for UpdatePersonError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<UpdatePersonError> for crate::error::EngineError {
    fn from(value: UpdatePersonError) -> Self {
        match value {
            UpdatePersonError::NotFound(err) => Self::NotFound(err),
            UpdatePersonError::Validation(err) => Self::Validation(err),
        }
    }
}
