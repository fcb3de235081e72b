//! In-memory genealogy engine: person arena, edge graph, validation and
//! the derived reads (generations, views, statistics).

pub mod generation;
pub mod integrity;
pub mod mutation;
pub mod person_store;
pub mod relationship_graph;
pub mod snapshot;
pub mod statistics;
pub mod view;

pub use generation::{GenerationResolver, Generations};
pub use integrity::{IntegrityValidator, PersonDeleteMode};
pub use mutation::{EntityId, MutationBatch, MutationOutcome, StoreChange, TreeOperation};
pub use person_store::{PersonStore, UpdatePersonError};
pub use relationship_graph::RelationshipGraph;
pub use snapshot::TreeSnapshot;
pub use statistics::{StatisticsEngine, TreeStatistics};
pub use view::{NodeRole, PersonNode, ViewBuilder, ViewGraph, ViewLayout, ViewMode};
