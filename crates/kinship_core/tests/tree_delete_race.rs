use kinship_core::db::open_db;
use kinship_core::engine::MutationBatch;
use kinship_core::model::attachment::PersonAttachment;
use kinship_core::model::person::{Person, PersonDraft, PersonId};
use kinship_core::model::relationship::{FamilyUnion, ParentChildRelationship};
use kinship_core::model::tree::{Tree, TreeDraft, TreeId, UserId};
use kinship_core::{
    EngineConfig, EngineError, GenealogyError, GenealogyService, NotFoundError, SqliteTreeStore,
    StoreResult, TreeOperation, TreeStore,
};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;
use uuid::Uuid;

/// Store that parks the first snapshot load until the test releases it.
struct ParkedLoadStore {
    inner: SqliteTreeStore,
    park: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl TreeStore for ParkedLoadStore {
    fn insert_tree(&self, tree: &Tree) -> StoreResult<()> {
        self.inner.insert_tree(tree)
    }

    fn delete_tree(&self, tree_id: TreeId) -> StoreResult<()> {
        self.inner.delete_tree(tree_id)
    }

    fn list_trees(&self, owner_id: UserId) -> StoreResult<Vec<Tree>> {
        self.inner.list_trees(owner_id)
    }

    fn load_tree(&self, tree_id: TreeId) -> StoreResult<Tree> {
        self.inner.load_tree(tree_id)
    }

    fn load_persons(&self, tree_id: TreeId) -> StoreResult<Vec<Person>> {
        self.inner.load_persons(tree_id)
    }

    fn load_relationships(&self, tree_id: TreeId) -> StoreResult<Vec<ParentChildRelationship>> {
        self.inner.load_relationships(tree_id)
    }

    fn load_unions(&self, tree_id: TreeId) -> StoreResult<Vec<FamilyUnion>> {
        self.inner.load_unions(tree_id)
    }

    fn load_attachments(&self, tree_id: TreeId) -> StoreResult<Vec<PersonAttachment>> {
        let parked = self.park.lock().unwrap().take();
        if let Some((started, release)) = parked {
            started.send(()).unwrap();
            release.recv().unwrap();
        }
        self.inner.load_attachments(tree_id)
    }

    fn locate_person(&self, person_id: PersonId) -> StoreResult<Option<TreeId>> {
        self.inner.locate_person(person_id)
    }

    fn insert_attachment(&self, attachment: &PersonAttachment) -> StoreResult<()> {
        self.inner.insert_attachment(attachment)
    }

    fn commit(&self, tree_id: TreeId, batch: &MutationBatch) -> StoreResult<()> {
        self.inner.commit(tree_id, batch)
    }
}

fn is_tree_not_found(err: &GenealogyError, tree_id: TreeId) -> bool {
    matches!(
        err,
        GenealogyError::Engine(EngineError::NotFound(NotFoundError::Tree(id))) if *id == tree_id
    )
}

#[test]
fn loader_racing_a_delete_does_not_resurrect_the_tree() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kinship.sqlite3");

    let tree_id = {
        let store = SqliteTreeStore::try_new(open_db(&path).unwrap()).unwrap();
        let seeding = GenealogyService::new(store, EngineConfig::default());
        let tree_id = seeding
            .create_tree(Uuid::new_v4(), TreeDraft::named("Racing"))
            .unwrap()
            .id;
        let person = PersonDraft {
            first_names: "Only".to_string(),
            ..PersonDraft::default()
        };
        seeding
            .mutate(tree_id, &TreeOperation::CreatePerson { person })
            .unwrap();
        tree_id
    };

    let (started_tx, started_rx) = channel();
    let (release_tx, release_rx) = channel();
    let store = ParkedLoadStore {
        inner: SqliteTreeStore::try_new(open_db(&path).unwrap()).unwrap(),
        park: Mutex::new(Some((started_tx, release_rx))),
    };
    let service = GenealogyService::new(store, EngineConfig::default());

    std::thread::scope(|scope| {
        let reader = scope.spawn(|| service.get_statistics(tree_id));

        started_rx.recv().unwrap();
        service.delete_tree(tree_id).unwrap();
        release_tx.send(()).unwrap();

        let raced = reader.join().unwrap().unwrap_err();
        assert!(is_tree_not_found(&raced, tree_id));
    });

    let later = service.get_statistics(tree_id).unwrap_err();
    assert!(is_tree_not_found(&later, tree_id));
    assert!(is_tree_not_found(&service.get_tree(tree_id).unwrap_err(), tree_id));
}
