use kinship_core::db::open_db_in_memory;
use kinship_core::model::person::{GenealogyDate, PersonDraft, PersonId};
use kinship_core::model::relationship::{
    RelationshipDraft, RelationshipType, UnionDraft, UnionType,
};
use kinship_core::model::tree::{TreeDraft, TreeId};
use kinship_core::{
    ConflictError, EngineConfig, EngineError, GenealogyError, GenealogyService, NotFoundError,
    PersonDeleteMode, SqliteTreeStore, TreeOperation, ValidationError, ViewMode,
};
use std::collections::BTreeSet;
use uuid::Uuid;

fn service_with(config: EngineConfig) -> GenealogyService<SqliteTreeStore> {
    let store = SqliteTreeStore::try_new(open_db_in_memory().unwrap()).unwrap();
    GenealogyService::new(store, config)
}

fn service() -> GenealogyService<SqliteTreeStore> {
    service_with(EngineConfig::default())
}

fn new_tree(service: &GenealogyService<SqliteTreeStore>) -> TreeId {
    service
        .create_tree(Uuid::new_v4(), TreeDraft::named("Family"))
        .unwrap()
        .id
}

fn person(
    service: &GenealogyService<SqliteTreeStore>,
    tree_id: TreeId,
    first_names: &str,
    birth_year: i32,
) -> PersonId {
    let person = PersonDraft {
        first_names: first_names.to_string(),
        last_name: "Test".to_string(),
        birth_date: GenealogyDate::year(birth_year),
        ..PersonDraft::default()
    };
    service
        .mutate(tree_id, &TreeOperation::CreatePerson { person })
        .unwrap()
}

fn link(
    service: &GenealogyService<SqliteTreeStore>,
    tree_id: TreeId,
    parent: PersonId,
    child: PersonId,
) -> Result<Uuid, GenealogyError> {
    let relationship = RelationshipDraft::new(parent, child, RelationshipType::Biological);
    service.mutate(tree_id, &TreeOperation::AddRelationship { relationship })
}

fn marry(
    service: &GenealogyService<SqliteTreeStore>,
    tree_id: TreeId,
    a: PersonId,
    b: PersonId,
) -> Result<Uuid, GenealogyError> {
    let union = UnionDraft::new(a, b, UnionType::Marriage);
    service.mutate(tree_id, &TreeOperation::AddUnion { union })
}

/// Builds A -> B -> C and designates A as root.
fn chain(
    service: &GenealogyService<SqliteTreeStore>,
) -> (TreeId, PersonId, PersonId, PersonId) {
    let tree_id = new_tree(service);
    let a = person(service, tree_id, "A", 1900);
    let b = person(service, tree_id, "B", 1930);
    let c = person(service, tree_id, "C", 1960);
    link(service, tree_id, a, b).unwrap();
    link(service, tree_id, b, c).unwrap();
    service
        .mutate(tree_id, &TreeOperation::SetRootPerson { person_id: Some(a) })
        .unwrap();
    (tree_id, a, b, c)
}

#[test]
fn descendant_view_respects_generation_limit() {
    let service = service();
    let (tree_id, a, b, c) = chain(&service);

    let view = service
        .get_view(tree_id, a, ViewMode::Descendant, 2)
        .unwrap();
    assert_eq!(view.person_ids(), BTreeSet::from([a, b, c]));
    assert_eq!(view.node(a).unwrap().generation, 0);
    assert_eq!(view.node(b).unwrap().generation, 1);
    assert_eq!(view.node(c).unwrap().generation, 2);

    let shallow = service
        .get_view(tree_id, a, ViewMode::Descendant, 1)
        .unwrap();
    assert_eq!(shallow.person_ids(), BTreeSet::from([a, b]));
    assert!(shallow.node(b).unwrap().has_more_descendants);
}

#[test]
fn ascendant_view_walks_up_to_the_generation_limit() {
    let service = service();
    let (tree_id, a, b, c) = chain(&service);

    let shallow = service
        .get_view(tree_id, c, ViewMode::Ascendant, 1)
        .unwrap();
    assert_eq!(shallow.person_ids(), BTreeSet::from([b, c]));
    assert_eq!(shallow.node(c).unwrap().generation, 0);
    assert_eq!(shallow.node(b).unwrap().generation, -1);
    assert!(shallow.node(b).unwrap().has_more_ancestors);
    assert_eq!(shallow.node(c).unwrap().parents, vec![b]);

    let full = service
        .get_view(tree_id, c, ViewMode::Ascendant, 2)
        .unwrap();
    assert_eq!(full.person_ids(), BTreeSet::from([a, b, c]));
    assert_eq!(full.node(a).unwrap().generation, -2);
    assert!(!full.node(a).unwrap().has_more_ancestors);

    // Walking up from B never pulls in its descendant C.
    let from_middle = service
        .get_view(tree_id, b, ViewMode::Ascendant, 3)
        .unwrap();
    assert_eq!(from_middle.person_ids(), BTreeSet::from([a, b]));
    assert!(from_middle.node(b).unwrap().has_more_descendants);
}

#[test]
fn zero_depth_view_is_root_only_in_every_mode() {
    let service = service();
    let (tree_id, _, b, _) = chain(&service);

    for mode in [ViewMode::Descendant, ViewMode::Ascendant, ViewMode::Hourglass] {
        let view = service.get_view(tree_id, b, mode, 0).unwrap();
        assert_eq!(view.person_ids(), BTreeSet::from([b]));
        assert!(view.relationships.is_empty());
        assert!(view.unions.is_empty());
    }
}

#[test]
fn hourglass_view_is_a_subset_of_the_tree() {
    let service = service();
    let (tree_id, a, b, c) = chain(&service);
    let spouse = person(&service, tree_id, "S", 1932);
    marry(&service, tree_id, b, spouse).unwrap();

    let view = service
        .get_view(tree_id, b, ViewMode::Hourglass, 3)
        .unwrap();
    let snapshot = service.snapshot(tree_id).unwrap();
    for node in &view.nodes {
        assert!(snapshot.persons().contains(node.person.id));
    }
    for relationship in &view.relationships {
        assert_eq!(
            snapshot.graph().relationship(relationship.id),
            Some(relationship)
        );
    }
    for union in &view.unions {
        assert_eq!(snapshot.graph().union(union.id), Some(union));
    }
    assert_eq!(view.node(a).unwrap().generation, -1);
    assert_eq!(view.node(c).unwrap().generation, 1);
    assert_eq!(view.node(b).unwrap().spouses, vec![spouse]);
}

#[test]
fn cycle_is_rejected_and_graph_is_unchanged() {
    let service = service();
    let (tree_id, a, _, c) = chain(&service);
    let before = service.snapshot(tree_id).unwrap();

    let err = link(&service, tree_id, c, a).unwrap_err();
    assert!(matches!(
        err,
        GenealogyError::Engine(EngineError::Validation(ValidationError::CycleDetected { .. }))
    ));

    let after = service.snapshot(tree_id).unwrap();
    let edges = |snapshot: &kinship_core::TreeSnapshot| {
        let mut edges: Vec<_> = snapshot.graph().relationships().cloned().collect();
        edges.sort_by_key(|edge| edge.id);
        edges
    };
    assert_eq!(edges(&before), edges(&after));
    assert_eq!(before.version(), after.version());
}

#[test]
fn duplicate_current_marriage_is_a_conflict() {
    let service = service();
    let tree_id = new_tree(&service);
    let a = person(&service, tree_id, "A", 1900);
    let b = person(&service, tree_id, "B", 1902);

    marry(&service, tree_id, a, b).unwrap();
    let err = marry(&service, tree_id, a, b).unwrap_err();
    assert_eq!(err.kind(), "conflict");
    assert!(matches!(
        err,
        GenealogyError::Engine(EngineError::Conflict(ConflictError::DuplicateUnion { .. }))
    ));
}

#[test]
fn restricted_delete_blocks_and_cascade_removes_edges() {
    let service = service();
    let (tree_id, _, b, _) = chain(&service);
    let spouse = person(&service, tree_id, "S", 1931);
    let union_id = marry(&service, tree_id, b, spouse).unwrap();
    let edges: Vec<Uuid> = service
        .snapshot(tree_id)
        .unwrap()
        .graph()
        .relationships_involving(b)
        .into_iter()
        .collect();
    assert_eq!(edges.len(), 2);

    let restricted = service
        .mutate(tree_id, &TreeOperation::DeletePerson { person_id: b, mode: None })
        .unwrap_err();
    assert_eq!(restricted.code(), "person_still_referenced");

    service
        .mutate(
            tree_id,
            &TreeOperation::DeletePerson {
                person_id: b,
                mode: Some(PersonDeleteMode::Cascade),
            },
        )
        .unwrap();

    for relationship_id in edges {
        let err = service
            .mutate(tree_id, &TreeOperation::RemoveRelationship { relationship_id })
            .unwrap_err();
        assert!(matches!(
            err,
            GenealogyError::Engine(EngineError::NotFound(NotFoundError::Relationship(_)))
        ));
    }
    let err = service
        .mutate(tree_id, &TreeOperation::RemoveUnion { union_id })
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
    assert!(matches!(
        service.get_person(tree_id, b),
        Err(GenealogyError::Engine(EngineError::NotFound(NotFoundError::Person(_))))
    ));
}

#[test]
fn configured_cascade_default_applies_when_mode_is_absent() {
    let config = EngineConfig {
        default_delete_mode: PersonDeleteMode::Cascade,
        ..EngineConfig::default()
    };
    let service = service_with(config);
    let (tree_id, a, b, c) = chain(&service);

    service
        .mutate(tree_id, &TreeOperation::DeletePerson { person_id: b, mode: None })
        .unwrap();

    let snapshot = service.snapshot(tree_id).unwrap();
    assert_eq!(snapshot.graph().relationship_count(), 0);
    assert!(snapshot.graph().children_of(a).is_empty());
    assert!(snapshot.graph().parents_of(c).is_empty());
}

#[test]
fn statistics_are_idempotent_and_track_mutations() {
    let service = service();
    let (tree_id, _, _, c) = chain(&service);

    let first = service.get_statistics(tree_id).unwrap();
    let second = service.get_statistics(tree_id).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.total_persons, 3);
    assert_eq!(first.generations_count, 2);
    assert_eq!(first.relationship_count, 2);

    service
        .record_attachment(
            tree_id,
            c,
            kinship_core::model::attachment::AttachmentKind::Media,
            "media://portrait",
        )
        .unwrap();
    let third = service.get_statistics(tree_id).unwrap();
    assert_eq!(third.media_count, 1);
    assert_ne!(first, third);
}

#[test]
fn generations_are_cached_per_version() {
    let service = service();
    let (tree_id, a, b, c) = chain(&service);

    let first = service.get_generations(tree_id, None).unwrap();
    let second = service.get_generations(tree_id, None).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(first.get(a), Some(0));
    assert_eq!(first.get(c), Some(2));

    let from_b = service.get_generations(tree_id, Some(b)).unwrap();
    assert_eq!(from_b.get(a), Some(-1));

    let d = person(&service, tree_id, "D", 1990);
    link(&service, tree_id, c, d).unwrap();
    let refreshed = service.get_generations(tree_id, None).unwrap();
    assert!(!std::sync::Arc::ptr_eq(&first, &refreshed));
    assert_eq!(refreshed.get(d), Some(3));
}

#[test]
fn generations_without_any_root_are_rejected() {
    let service = service();
    let tree_id = new_tree(&service);
    person(&service, tree_id, "Solo", 1950);

    let err = service.get_generations(tree_id, None).unwrap_err();
    assert_eq!(err.code(), "malformed_input");
}

#[test]
fn person_of_another_tree_is_a_cross_tree_reference() {
    let service = service();
    let first = new_tree(&service);
    let second = new_tree(&service);
    let local = person(&service, first, "Local", 1950);
    let foreign = person(&service, second, "Foreign", 1980);

    let err = link(&service, first, local, foreign).unwrap_err();
    assert!(matches!(
        err,
        GenealogyError::Engine(EngineError::Validation(ValidationError::CrossTreeReference {
            person,
            tree,
        })) if person == foreign && tree == second
    ));

    let missing = link(&service, first, local, Uuid::new_v4()).unwrap_err();
    assert_eq!(missing.kind(), "not_found");
}

#[test]
fn reads_rooted_at_a_person_of_another_tree_are_not_found() {
    let service = service();
    let (tree_id, _, _, _) = chain(&service);
    let other = new_tree(&service);
    let foreign = person(&service, other, "Foreign", 1970);

    let view = service
        .get_view(tree_id, foreign, ViewMode::Descendant, 2)
        .unwrap_err();
    assert_eq!(view.kind(), "not_found");
    assert!(matches!(
        view,
        GenealogyError::Engine(EngineError::NotFound(NotFoundError::Person(id))) if id == foreign
    ));

    let generations = service
        .get_generations(tree_id, Some(foreign))
        .unwrap_err();
    assert_eq!(generations.code(), "person_not_found");

    let lookup = service.get_person(tree_id, foreign).unwrap_err();
    assert_eq!(lookup.kind(), "not_found");
}

#[test]
fn unknown_tree_is_not_found() {
    let service = service();
    let err = service.get_statistics(Uuid::new_v4()).unwrap_err();
    assert!(matches!(
        err,
        GenealogyError::Engine(EngineError::NotFound(NotFoundError::Tree(_)))
    ));
}

#[test]
fn blank_tree_name_is_rejected() {
    let service = service();
    let err = service
        .create_tree(Uuid::new_v4(), TreeDraft::named("   "))
        .unwrap_err();
    assert_eq!(err.code(), "empty_tree_name");
}

#[test]
fn deleting_a_tree_removes_it_with_its_persons() {
    let service = service();
    let owner = Uuid::new_v4();
    let tree_id = service
        .create_tree(owner, TreeDraft::named("Short-lived"))
        .unwrap()
        .id;
    let lone = person(&service, tree_id, "Lone", 1970);
    assert_eq!(service.list_trees(owner).unwrap().len(), 1);

    service.delete_tree(tree_id).unwrap();

    assert!(service.list_trees(owner).unwrap().is_empty());
    assert_eq!(service.get_tree(tree_id).unwrap_err().kind(), "not_found");
    assert!(service.get_person(tree_id, lone).is_err());
}

#[test]
fn writers_on_different_trees_run_in_parallel() {
    let service = service();
    let trees: Vec<TreeId> = (0..4).map(|_| new_tree(&service)).collect();

    std::thread::scope(|scope| {
        for &tree_id in &trees {
            let service = &service;
            scope.spawn(move || {
                let mut previous = person(service, tree_id, "Gen0", 1800);
                for generation in 1..6 {
                    let next = person(service, tree_id, "Gen", 1800 + generation * 25);
                    link(service, tree_id, previous, next).unwrap();
                    previous = next;
                }
            });
        }
    });

    for tree_id in trees {
        let stats = service.get_statistics(tree_id).unwrap();
        assert_eq!(stats.total_persons, 6);
        assert_eq!(stats.relationship_count, 5);
    }
}
