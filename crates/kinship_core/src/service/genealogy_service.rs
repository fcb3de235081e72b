//! Genealogy use-case service.
//!
//! # Responsibility
//! - Expose `mutate`, `get_view`, `get_statistics` and the tree lifecycle to
//!   the FFI and CLI layers.
//! - Serialize writers per tree and hand readers consistent snapshots.
//!
//! # Invariants
//! - One writer per tree at a time; different trees never share a lock
//!   beyond the brief slot lookup.
//! - A snapshot is published only after its batch was committed, so readers
//!   never observe a partial or unpersisted mutation.
//! - Log lines carry ids, counts and codes only, never person data.
//! - Reads report an unknown root or person as `NotFoundError`, even when
//!   the id belongs to another tree.
//! - A tree deleted through the service stays gone for its lifetime.

use crate::config::EngineConfig;
use crate::engine::generation::{GenerationResolver, Generations};
use crate::engine::mutation::{EntityId, TreeOperation};
use crate::engine::snapshot::TreeSnapshot;
use crate::engine::statistics::{StatisticsEngine, TreeStatistics};
use crate::engine::view::{ViewBuilder, ViewGraph, ViewMode};
use crate::error::{EngineError, NotFoundError, ValidationError};
use crate::model::attachment::{AttachmentId, AttachmentKind, PersonAttachment};
use crate::model::person::{Person, PersonId};
use crate::model::tree::{Tree, TreeDraft, TreeId, UserId};
use crate::repo::tree_store::{StoreError, TreeStore};
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

/// Errors returned by service operations.
#[derive(Debug)]
pub enum GenealogyError {
    Engine(EngineError),
    Store(StoreError),
}

impl GenealogyError {
    /// Error family: `validation`, `conflict`, `not_found` or `store`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Engine(EngineError::Validation(_)) => "validation",
            Self::Engine(EngineError::Conflict(_)) => "conflict",
            Self::Engine(EngineError::NotFound(_)) => "not_found",
            Self::Store(_) => "store",
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Engine(err) => err.code(),
            Self::Store(_) => "store_error",
        }
    }
}

impl Display for GenealogyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Engine(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GenealogyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Engine(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<EngineError> for GenealogyError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<ValidationError> for GenealogyError {
    fn from(value: ValidationError) -> Self {
        Self::Engine(value.into())
    }
}

impl From<NotFoundError> for GenealogyError {
    fn from(value: NotFoundError) -> Self {
        Self::Engine(value.into())
    }
}

impl From<StoreError> for GenealogyError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::TreeNotFound(id) => Self::Engine(NotFoundError::Tree(id).into()),
            other => Self::Store(other),
        }
    }
}

pub type GenealogyResult<T> = Result<T, GenealogyError>;

/// Per-tree state: writer gate, published snapshot and generation cache.
struct TreeSlot {
    write_gate: Mutex<()>,
    snapshot: RwLock<Arc<TreeSnapshot>>,
    generations: Mutex<HashMap<(PersonId, u64), Arc<Generations>>>,
}

impl TreeSlot {
    fn new(snapshot: TreeSnapshot) -> Self {
        Self {
            write_gate: Mutex::new(()),
            snapshot: RwLock::new(Arc::new(snapshot)),
            generations: Mutex::new(HashMap::new()),
        }
    }

    fn current(&self) -> Arc<TreeSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, snapshot: TreeSnapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Loaded trees plus tombstones of trees deleted through this service.
#[derive(Default)]
struct SlotMap {
    live: HashMap<TreeId, Arc<TreeSlot>>,
    /// A loader that raced a delete must not resurrect the tree.
    deleted: HashSet<TreeId>,
}

/// Genealogy service facade over a `TreeStore`.
pub struct GenealogyService<S: TreeStore> {
    store: S,
    config: EngineConfig,
    slots: Mutex<SlotMap>,
}

impl<S: TreeStore> GenealogyService<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            slots: Mutex::new(SlotMap::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Creates an empty tree.
    pub fn create_tree(&self, owner_id: UserId, draft: TreeDraft) -> GenealogyResult<Tree> {
        let tree = draft.into_tree(owner_id)?;
        self.store.insert_tree(&tree)?;
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .insert(tree.id, Arc::new(TreeSlot::new(TreeSnapshot::empty(tree.clone()))));
        info!("event=tree_create module=service status=ok tree={}", tree.id);
        Ok(tree)
    }

    /// Deletes a tree and everything it owns.
    pub fn delete_tree(&self, tree_id: TreeId) -> GenealogyResult<()> {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .get(&tree_id)
            .cloned();
        let _gate = slot
            .as_ref()
            .map(|slot| slot.write_gate.lock().unwrap_or_else(PoisonError::into_inner));

        // Tombstone first: loaders already past the slot lookup are refused
        // when they try to insert.
        {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.deleted.insert(tree_id);
            slots.live.remove(&tree_id);
        }
        if let Err(err) = self.store.delete_tree(tree_id) {
            self.slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .deleted
                .remove(&tree_id);
            warn!("event=tree_delete module=service status=error tree={tree_id}");
            return Err(err.into());
        }
        info!("event=tree_delete module=service status=ok tree={tree_id}");
        Ok(())
    }

    pub fn list_trees(&self, owner_id: UserId) -> GenealogyResult<Vec<Tree>> {
        Ok(self.store.list_trees(owner_id)?)
    }

    pub fn get_tree(&self, tree_id: TreeId) -> GenealogyResult<Tree> {
        Ok(self.snapshot(tree_id)?.tree().clone())
    }

    /// Consistent snapshot of a tree as of now.
    pub fn snapshot(&self, tree_id: TreeId) -> GenealogyResult<Arc<TreeSnapshot>> {
        Ok(self.slot(tree_id)?.current())
    }

    /// Persons of a tree, oldest first.
    pub fn list_persons(&self, tree_id: TreeId) -> GenealogyResult<Vec<Person>> {
        let snapshot = self.snapshot(tree_id)?;
        Ok(snapshot
            .persons()
            .list_persons()
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn get_person(&self, tree_id: TreeId, person_id: PersonId) -> GenealogyResult<Person> {
        let snapshot = self.snapshot(tree_id)?;
        let person = snapshot.persons().get_person(person_id)?;
        Ok(person.clone())
    }

    /// Validates, commits and publishes one operation.
    ///
    /// Returns the id of the created or touched entity (the tree id for
    /// `SetRootPerson`).
    pub fn mutate(&self, tree_id: TreeId, operation: &TreeOperation) -> GenealogyResult<EntityId> {
        let started_at = Instant::now();
        let slot = self.slot(tree_id)?;
        let _gate = slot.write_gate.lock().unwrap_or_else(PoisonError::into_inner);

        let mut working = TreeSnapshot::clone(&slot.current());
        let result = working
            .apply(operation, self.config.default_delete_mode)
            .map_err(|err| self.locate_foreign(tree_id, err))
            .and_then(|outcome| {
                self.store.commit(tree_id, &outcome.batch)?;
                Ok(outcome)
            });

        match result {
            Ok(outcome) => {
                working.bump_version();
                let version = working.version();
                slot.publish(working);
                info!(
                    "event=tree_mutate module=service status=ok op={} tree={} entity={} changes={} version={} duration_ms={}",
                    operation.name(),
                    tree_id,
                    outcome.entity_id,
                    outcome.batch.len(),
                    version,
                    started_at.elapsed().as_millis()
                );
                Ok(outcome.entity_id)
            }
            Err(err) => {
                warn!(
                    "event=tree_mutate module=service status=error op={} tree={} error_kind={} error_code={} duration_ms={}",
                    operation.name(),
                    tree_id,
                    err.kind(),
                    err.code(),
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    /// Builds a bounded view. `max_generations` is clamped by configuration.
    pub fn get_view(
        &self,
        tree_id: TreeId,
        root_person_id: PersonId,
        mode: ViewMode,
        max_generations: u32,
    ) -> GenealogyResult<ViewGraph> {
        let started_at = Instant::now();
        let snapshot = self.snapshot(tree_id)?;
        let depth = self.config.clamp_generations(max_generations);
        let view = ViewBuilder::new(&snapshot, self.config.view_layout())
            .build(root_person_id, mode, depth)?;
        info!(
            "event=tree_view module=service status=ok tree={} mode={} depth={} nodes={} version={} duration_ms={}",
            tree_id,
            mode.as_str(),
            depth,
            view.nodes.len(),
            snapshot.version(),
            started_at.elapsed().as_millis()
        );
        Ok(view)
    }

    /// Tree-wide statistics of the current snapshot.
    pub fn get_statistics(&self, tree_id: TreeId) -> GenealogyResult<TreeStatistics> {
        let started_at = Instant::now();
        let snapshot = self.snapshot(tree_id)?;
        let statistics = StatisticsEngine::compute(&snapshot);
        info!(
            "event=tree_stats module=service status=ok tree={} persons={} version={} duration_ms={}",
            tree_id,
            statistics.total_persons,
            snapshot.version(),
            started_at.elapsed().as_millis()
        );
        Ok(statistics)
    }

    /// Generation levels from `root_person_id`, or from the tree root when
    /// `None`.
    pub fn get_generations(
        &self,
        tree_id: TreeId,
        root_person_id: Option<PersonId>,
    ) -> GenealogyResult<Arc<Generations>> {
        let slot = self.slot(tree_id)?;
        let snapshot = slot.current();
        let root = root_person_id
            .or(snapshot.tree().root_person_id)
            .ok_or_else(|| {
                ValidationError::MalformedInput("no root person given and none designated".into())
            })?;

        let key = (root, snapshot.version());
        if self.config.cache_generations {
            let cache = slot.generations.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.get(&key) {
                return Ok(Arc::clone(cached));
            }
        }

        let generations = GenerationResolver::new(snapshot.persons(), snapshot.graph())
            .resolve(root)
            .map(Arc::new)?;
        // A publish between `current()` and here clears the cache; inserting
        // under the old version key is then harmless.
        if self.config.cache_generations {
            slot.generations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, Arc::clone(&generations));
        }
        Ok(generations)
    }

    /// Records a media or capsule link supplied by an outer layer.
    pub fn record_attachment(
        &self,
        tree_id: TreeId,
        person_id: PersonId,
        kind: AttachmentKind,
        target_ref: &str,
    ) -> GenealogyResult<AttachmentId> {
        let slot = self.slot(tree_id)?;
        let _gate = slot.write_gate.lock().unwrap_or_else(PoisonError::into_inner);

        let mut working = TreeSnapshot::clone(&slot.current());
        working
            .persons()
            .get_person(person_id)
            .map_err(|err| self.locate_foreign(tree_id, err.into()))?;
        let attachment = PersonAttachment::new(tree_id, person_id, kind, target_ref);
        let attachment_id = attachment.id;
        self.store.insert_attachment(&attachment)?;
        working.push_attachment(attachment);
        working.bump_version();
        slot.publish(working);
        info!(
            "event=attachment_record module=service status=ok tree={} kind={}",
            tree_id,
            kind.as_str()
        );
        Ok(attachment_id)
    }

    fn slot(&self, tree_id: TreeId) -> GenealogyResult<Arc<TreeSlot>> {
        {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.deleted.contains(&tree_id) {
                return Err(NotFoundError::Tree(tree_id).into());
            }
            if let Some(slot) = slots.live.get(&tree_id) {
                return Ok(Arc::clone(slot));
            }
        }

        // Loaded outside the map lock so trees load in parallel; a racing
        // loader of the same tree loses to whichever slot landed first.
        let snapshot = self.store.load_snapshot(tree_id)?;
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.deleted.contains(&tree_id) {
            return Err(NotFoundError::Tree(tree_id).into());
        }
        let slot = slots
            .live
            .entry(tree_id)
            .or_insert_with(|| Arc::new(TreeSlot::new(snapshot)));
        Ok(Arc::clone(slot))
    }

    /// Reports a person of another tree as a cross-tree reference instead
    /// of a plain not-found. Write paths only; reads keep `NotFoundError`.
    fn locate_foreign(&self, tree_id: TreeId, err: EngineError) -> GenealogyError {
        if let EngineError::NotFound(NotFoundError::Person(person)) = err {
            if let Ok(Some(owner)) = self.store.locate_person(person) {
                if owner != tree_id {
                    return ValidationError::CrossTreeReference {
                        person,
                        tree: owner,
                    }
                    .into();
                }
            }
        }
        err.into()
    }
}
