//! Shared identifier and kind types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a workflow document.
pub type DocId = Uuid;

/// Identifier of a single work item inside a document.
pub type ItemId = Uuid;

/// Allocate a new time-ordered document id.
pub fn new_doc_id() -> DocId {
    Uuid::now_v7()
}

/// Allocate a new time-ordered item id.
pub fn new_item_id() -> ItemId {
    Uuid::now_v7()
}

/// The three work-item collections a workflow document carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Character,
    Scene,
    Video,
}

impl ItemKind {
    /// Stable lowercase name, used in routes and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Character => "character",
            ItemKind::Scene => "scene",
            ItemKind::Video => "video",
        }
    }

    /// Parse a kind from its route segment.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "character" | "characters" => Some(ItemKind::Character),
            "scene" | "scenes" => Some(ItemKind::Scene),
            "video" | "videos" => Some(ItemKind::Video),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
