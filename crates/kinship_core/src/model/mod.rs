//! Genealogy domain model.
//!
//! # Responsibility
//! - Define the canonical records the engine reasons about: trees, persons,
//!   parent-child relationships, unions and opaque person attachments.
//! - Keep enum value sets stable so serialized forms survive process
//!   boundaries unchanged.
//!
//! # Invariants
//! - Every record is identified by a stable `Uuid` and belongs to exactly one
//!   tree.
//! - Record-local rules (names, date ordering) live next to the record in a
//!   `validate()` method; graph rules live in `engine::integrity`.

pub mod attachment;
pub mod person;
pub mod relationship;
pub mod tree;

use serde::{Deserialize, Deserializer};

/// Deserializes a field that distinguishes "absent" from explicit `null`.
///
/// Absent fields stay `None` through `#[serde(default)]`; a present field
/// (including `null`) becomes `Some(..)`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub(crate) fn is_blank_opt(value: Option<&str>) -> bool {
    value.map_or(true, is_blank)
}
