//! Tree aggregate model.
//!
//! # Invariants
//! - A tree owns every person, relationship, union and attachment that
//!   references its id; no record crosses tree boundaries.
//! - `root_person_id`, when set, names a person of the same tree.

use crate::error::ValidationError;
use crate::model::person::PersonId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stable tree identifier.
pub type TreeId = Uuid;

/// Owning user reference. Opaque to the engine.
pub type UserId = Uuid;

/// Audience of a tree or of one person record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Owner only.
    #[default]
    Private,
    /// Members of the tree.
    Family,
    /// Anyone with the link.
    Public,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Family => "family",
            Self::Public => "public",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "private" => Some(Self::Private),
            "family" => Some(Self::Family),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

/// Root aggregate of one family tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub id: TreeId,
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    /// Default root for generation resolution and statistics.
    pub root_person_id: Option<PersonId>,
    pub visibility: Visibility,
    /// Free-form client settings. Never interpreted by the engine.
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl Tree {
    /// Creates a private tree with a generated id and no root person.
    pub fn new(owner_id: UserId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            description: None,
            root_person_id: None,
            visibility: Visibility::Private,
            settings: BTreeMap::new(),
        }
    }
}

/// Attributes accepted when creating a tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeDraft {
    pub name: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl TreeDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builds a tree owned by `owner_id`. Rejects a blank name.
    pub fn into_tree(self, owner_id: UserId) -> Result<Tree, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyTreeName);
        }
        let mut tree = Tree::new(owner_id, name);
        tree.description = self.description;
        tree.visibility = self.visibility;
        tree.settings = self.settings;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::{Tree, TreeDraft, Visibility};
    use crate::error::ValidationError;
    use uuid::Uuid;

    #[test]
    fn new_tree_is_private_without_root() {
        let tree = Tree::new(Uuid::new_v4(), "Lindqvist family");
        assert_eq!(tree.visibility, Visibility::Private);
        assert!(tree.root_person_id.is_none());
        assert!(tree.settings.is_empty());
    }

    #[test]
    fn visibility_text_roundtrips() {
        for value in [Visibility::Private, Visibility::Family, Visibility::Public] {
            assert_eq!(Visibility::parse(value.as_str()), Some(value));
        }
        assert_eq!(Visibility::parse("secret"), None);
    }

    #[test]
    fn draft_trims_name_and_rejects_blank() {
        let owner = Uuid::new_v4();
        let tree = TreeDraft::named("  Berg  ").into_tree(owner).unwrap();
        assert_eq!(tree.name, "Berg");
        assert_eq!(tree.owner_id, owner);
        assert_eq!(
            TreeDraft::named(" ").into_tree(owner),
            Err(ValidationError::EmptyTreeName)
        );
    }
}
