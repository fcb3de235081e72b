//! Use-case services over the engine and a `TreeStore`.

pub mod genealogy_service;

pub use genealogy_service::{GenealogyError, GenealogyResult, GenealogyService};
