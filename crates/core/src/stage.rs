//! Pipeline stage state machine: forward order, transitions, and the pure
//! auto-advance decision.
//!
//! Forward order:
//! `idle → script → script_done → characters → characters_done → scenes →
//! scenes_done → videos → videos_done → merging → completed`.
//!
//! `stopped`/`failed` are carried in the document status, not the stage; the
//! stage value freezes wherever the failure occurred.

use serde::{Deserialize, Serialize};

use crate::document::{WorkflowDocument, WorkflowStatus};
use crate::types::ItemKind;

/// A named phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Script,
    ScriptDone,
    Characters,
    CharactersDone,
    Scenes,
    ScenesDone,
    Videos,
    VideosDone,
    Merging,
    Completed,
}

impl Stage {
    /// The item collection an active stage works on, if any.
    pub fn active_collection(&self) -> Option<ItemKind> {
        match self {
            Stage::Characters => Some(ItemKind::Character),
            Stage::Scenes => Some(ItemKind::Scene),
            Stage::Videos => Some(ItemKind::Video),
            _ => None,
        }
    }

    /// The `<stage>_done` marker for an active stage.
    pub fn done_stage(&self) -> Option<Stage> {
        match self {
            Stage::Script => Some(Stage::ScriptDone),
            Stage::Characters => Some(Stage::CharactersDone),
            Stage::Scenes => Some(Stage::ScenesDone),
            Stage::Videos => Some(Stage::VideosDone),
            _ => None,
        }
    }

    /// The next active stage a `continue` command enters from a `*_done`
    /// marker. `videos_done` continues into merging.
    pub fn next_after_done(&self) -> Option<Stage> {
        match self {
            Stage::ScriptDone => Some(Stage::Characters),
            Stage::CharactersDone => Some(Stage::Scenes),
            Stage::ScenesDone => Some(Stage::Videos),
            Stage::VideosDone => Some(Stage::Merging),
            _ => None,
        }
    }

    /// The active stage that owns the given item collection.
    pub fn for_kind(kind: ItemKind) -> Stage {
        match kind {
            ItemKind::Character => Stage::Characters,
            ItemKind::Scene => Stage::Scenes,
            ItemKind::Video => Stage::Videos,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::Script => "script",
            Stage::ScriptDone => "script_done",
            Stage::Characters => "characters",
            Stage::CharactersDone => "characters_done",
            Stage::Scenes => "scenes",
            Stage::ScenesDone => "scenes_done",
            Stage::Videos => "videos",
            Stage::VideosDone => "videos_done",
            Stage::Merging => "merging",
            Stage::Completed => "completed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Auto-advance decision
// ---------------------------------------------------------------------------

/// The transition an advance evaluation decided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageAdvance {
    pub to: Stage,
    pub status: WorkflowStatus,
}

/// Decide whether a document's current stage can advance to its `_done`
/// marker.
///
/// Evaluated on every status read, not only after a batch completes, so a
/// restart mid-batch still converges. Returns `None` (no-op) unless:
/// - the document is in an active stage with status `running`, and
/// - every item of that stage's collection is terminal.
///
/// The resulting status is `failed` only when the final content-producing
/// stage (`videos`) completed with zero successes; any other outcome yields
/// `waiting` so failed items stay visible for manual retry.
pub fn evaluate_advance(doc: &WorkflowDocument) -> Option<StageAdvance> {
    if doc.status != WorkflowStatus::Running {
        return None;
    }
    let kind = doc.stage.active_collection()?;
    let items = doc.items(kind);
    if items.iter().any(|item| !item.is_terminal()) {
        return None;
    }

    let to = doc
        .stage
        .done_stage()
        .expect("active stage always has a done marker");
    let succeeded = items.iter().filter(|item| item.output_url().is_some()).count();
    let status = if doc.stage == Stage::Videos && succeeded == 0 {
        WorkflowStatus::Failed
    } else {
        WorkflowStatus::Waiting
    };
    Some(StageAdvance { to, status })
}
