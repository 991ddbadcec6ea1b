//! Progress computation for status reads.

use serde::Serialize;

use crate::document::{WorkItem, WorkflowDocument, WorkflowStatus};
use crate::stage::Stage;
use crate::types::ItemKind;

/// Per-collection item counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageProgress {
    pub total: usize,
    pub done: usize,
    pub error: usize,
    pub in_flight: usize,
}

/// Progress snapshot returned alongside the document from a status read.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowProgress {
    pub stage: Stage,
    pub status: WorkflowStatus,
    pub characters: StageProgress,
    pub scenes: StageProgress,
    pub videos: StageProgress,
    /// Terminal items across all collections as a percentage, 100 once the
    /// document itself is completed.
    pub percent: u8,
}

fn collection_progress(doc: &WorkflowDocument, kind: ItemKind) -> StageProgress {
    let items = doc.items(kind);
    let mut progress = StageProgress {
        total: items.len(),
        ..Default::default()
    };
    for item in items {
        if item.is_terminal() {
            if item.output_url().is_some() {
                progress.done += 1;
            } else {
                progress.error += 1;
            }
        } else if item.is_awaiting() {
            progress.in_flight += 1;
        }
    }
    progress
}

/// Compute a progress snapshot for a document.
pub fn compute_progress(doc: &WorkflowDocument) -> WorkflowProgress {
    let characters = collection_progress(doc, ItemKind::Character);
    let scenes = collection_progress(doc, ItemKind::Scene);
    let videos = collection_progress(doc, ItemKind::Video);

    let total = characters.total + scenes.total + videos.total;
    let terminal = characters.done
        + characters.error
        + scenes.done
        + scenes.error
        + videos.done
        + videos.error;
    let percent = if doc.status == WorkflowStatus::Completed {
        100
    } else if total == 0 {
        0
    } else {
        ((terminal as f64 / total as f64) * 100.0) as u8
    };

    WorkflowProgress {
        stage: doc.stage,
        status: doc.status,
        characters,
        scenes,
        videos,
        percent,
    }
}
