//! Persistence contract of the genealogy engine.
//!
//! # Responsibility
//! - Load every record of one tree so the engine can assemble a snapshot.
//! - Commit validated `MutationBatch`es atomically.
//!
//! # Invariants
//! - `commit` applies either the whole batch or nothing.
//! - Adapters never validate domain rules; they receive batches the engine
//!   already accepted.

use crate::db::DbError;
use crate::engine::mutation::MutationBatch;
use crate::engine::snapshot::TreeSnapshot;
use crate::model::attachment::PersonAttachment;
use crate::model::person::{Person, PersonId};
use crate::model::relationship::{FamilyUnion, ParentChildRelationship};
use crate::model::tree::{Tree, TreeId, UserId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    TreeNotFound(TreeId),
    /// Connection schema is not at the version this build writes.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be decoded into the domain model.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::TreeNotFound(id) => write!(f, "tree not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "tree store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "tree store requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid genealogy data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Storage collaborator of `GenealogyService`.
pub trait TreeStore: Send + Sync {
    fn insert_tree(&self, tree: &Tree) -> StoreResult<()>;
    /// Removes a tree with all of its persons, edges and attachments.
    fn delete_tree(&self, tree_id: TreeId) -> StoreResult<()>;
    /// Lists trees of one owner ordered by name.
    fn list_trees(&self, owner_id: UserId) -> StoreResult<Vec<Tree>>;

    fn load_tree(&self, tree_id: TreeId) -> StoreResult<Tree>;
    fn load_persons(&self, tree_id: TreeId) -> StoreResult<Vec<Person>>;
    fn load_relationships(&self, tree_id: TreeId) -> StoreResult<Vec<ParentChildRelationship>>;
    fn load_unions(&self, tree_id: TreeId) -> StoreResult<Vec<FamilyUnion>>;
    fn load_attachments(&self, tree_id: TreeId) -> StoreResult<Vec<PersonAttachment>>;

    /// Returns the tree a person belongs to, if the person exists anywhere.
    fn locate_person(&self, person_id: PersonId) -> StoreResult<Option<TreeId>>;

    /// Records an attachment supplied by the media or capsule layer.
    fn insert_attachment(&self, attachment: &PersonAttachment) -> StoreResult<()>;

    /// Persists one validated batch atomically.
    fn commit(&self, tree_id: TreeId, batch: &MutationBatch) -> StoreResult<()>;

    /// Loads every record of `tree_id` into a fresh snapshot.
    fn load_snapshot(&self, tree_id: TreeId) -> StoreResult<TreeSnapshot> {
        let tree = self.load_tree(tree_id)?;
        Ok(TreeSnapshot::from_records(
            tree,
            self.load_persons(tree_id)?,
            self.load_relationships(tree_id)?,
            self.load_unions(tree_id)?,
            self.load_attachments(tree_id)?,
        ))
    }
}
