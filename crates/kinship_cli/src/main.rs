//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise `kinship_core` end to end on an in-memory database.
//! - Keep output deterministic apart from generated ids.

use kinship_core::db::open_db_in_memory;
use kinship_core::model::person::PersonDraft;
use kinship_core::model::relationship::{RelationshipDraft, RelationshipType};
use kinship_core::model::tree::TreeDraft;
use kinship_core::{
    core_version, EngineConfig, GenealogyService, SqliteTreeStore, TreeOperation, ViewMode,
};
use std::error::Error;
use uuid::Uuid;

fn main() -> Result<(), Box<dyn Error>> {
    println!("kinship_core version={}", core_version());

    let store = SqliteTreeStore::try_new(open_db_in_memory()?)?;
    let service = GenealogyService::new(store, EngineConfig::default());
    let tree = service.create_tree(Uuid::new_v4(), TreeDraft::named("Demo"))?;

    let mut ids = Vec::new();
    for first_names in ["Ada", "Ben", "Cleo"] {
        let person = PersonDraft {
            first_names: first_names.to_string(),
            last_name: "Example".to_string(),
            ..PersonDraft::default()
        };
        ids.push(service.mutate(tree.id, &TreeOperation::CreatePerson { person })?);
    }
    for pair in ids.windows(2) {
        let relationship = RelationshipDraft::new(pair[0], pair[1], RelationshipType::Biological);
        service.mutate(tree.id, &TreeOperation::AddRelationship { relationship })?;
    }

    let view = service.get_view(tree.id, ids[0], ViewMode::Descendant, 2)?;
    println!("view mode={} nodes={}", view.mode.as_str(), view.nodes.len());
    for node in &view.nodes {
        println!(
            "  gen={} name={} x={} y={}",
            node.generation,
            node.person.full_name(),
            node.x,
            node.y
        );
    }

    let stats = service.get_statistics(tree.id)?;
    println!(
        "stats persons={} generations={} relationships={} completeness={:.2}",
        stats.total_persons,
        stats.generations_count,
        stats.relationship_count,
        stats.completeness_score
    );
    Ok(())
}
