//! Flutter bridge over `kinship_core`.

pub mod api;
