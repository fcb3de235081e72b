//! Person attachments: media assets and memory-capsule links.
//!
//! The engine never dereferences `target_ref`; attachments are only counted.

use crate::model::person::PersonId;
use crate::model::tree::TreeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AttachmentId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// A `PersonMedia` record (photo, document, recording).
    Media,
    /// A `CapsulePersonLink` record.
    CapsuleLink,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Media => "media",
            Self::CapsuleLink => "capsule_link",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "media" => Some(Self::Media),
            "capsule_link" => Some(Self::CapsuleLink),
            _ => None,
        }
    }
}

/// Opaque foreign reference attached to a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonAttachment {
    pub id: AttachmentId,
    pub tree_id: TreeId,
    pub person_id: PersonId,
    pub kind: AttachmentKind,
    pub target_ref: String,
}

impl PersonAttachment {
    pub fn new(
        tree_id: TreeId,
        person_id: PersonId,
        kind: AttachmentKind,
        target_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tree_id,
            person_id,
            kind,
            target_ref: target_ref.into(),
        }
    }
}
