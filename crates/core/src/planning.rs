//! Item planning: seeding collections from parsed script input and deriving
//! video items from completed scene images.

use serde::{Deserialize, Serialize};

use crate::document::{
    CharacterItem, FrameMode, ItemStatus, SceneItem, VideoItem, WorkflowDocument, WorkflowStatus,
};
use crate::error::CoreError;
use crate::stage::Stage;
use crate::types::DocId;

/// One character entry from a parsed script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSeed {
    pub name: String,
    pub prompt: String,
}

/// One scene entry from a parsed script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSeed {
    pub image_prompt: String,
    pub video_prompt: String,
}

/// Parsed script data used to seed a new workflow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptInput {
    pub characters: Vec<CharacterSeed>,
    pub scenes: Vec<SceneSeed>,
}

impl ScriptInput {
    /// A script must produce at least one scene; characters are optional.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.scenes.is_empty() {
            return Err(CoreError::Validation(
                "Script input must contain at least one scene".to_string(),
            ));
        }
        for (i, scene) in self.scenes.iter().enumerate() {
            if scene.image_prompt.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "Scene at index {i} has an empty image prompt"
                )));
            }
        }
        Ok(())
    }
}

/// Build a document seeded from parsed script data, positioned at the start
/// of the character stage.
///
/// When the script declares no characters, the character stage is vacuously
/// complete and the document enters `characters_done`/`waiting` directly.
pub fn seed_document(
    id: DocId,
    title: impl Into<String>,
    input: &ScriptInput,
    frame_mode: FrameMode,
) -> Result<WorkflowDocument, CoreError> {
    input.validate()?;

    let mut doc = WorkflowDocument::new(id, title);
    doc.frame_mode = frame_mode;
    doc.characters = input
        .characters
        .iter()
        .map(|c| CharacterItem::new(c.name.clone(), c.prompt.clone()))
        .collect();
    doc.scenes = input
        .scenes
        .iter()
        .map(|s| SceneItem::new(s.image_prompt.clone(), s.video_prompt.clone()))
        .collect();

    if doc.characters.is_empty() {
        doc.stage = Stage::CharactersDone;
        doc.status = WorkflowStatus::Waiting;
    } else {
        doc.stage = Stage::Characters;
        doc.status = WorkflowStatus::Running;
    }
    Ok(doc)
}

/// Derive video items from the completed scenes of a document.
///
/// Only scenes whose image reached `done` participate; failed scenes are
/// skipped so a partially successful scene stage still yields videos.
///
/// - `first_last`: one video per consecutive completed-scene pair
///   (N-1 items for N >= 2; a single completed scene degrades to one
///   single-frame item).
/// - `single_image`: one video per completed scene.
pub fn plan_video_items(scenes: &[SceneItem], mode: FrameMode) -> Vec<VideoItem> {
    let completed: Vec<&SceneItem> = scenes
        .iter()
        .filter(|s| s.image_status == ItemStatus::Done && s.output_url.is_some())
        .collect();

    match mode {
        FrameMode::SingleImage => completed
            .iter()
            .enumerate()
            .map(|(i, scene)| {
                VideoItem::new(
                    i as u32,
                    scene.video_prompt.clone(),
                    scene.output_url.clone().unwrap_or_default(),
                    None,
                )
            })
            .collect(),
        FrameMode::FirstLast => {
            if completed.len() == 1 {
                let scene = completed[0];
                return vec![VideoItem::new(
                    0,
                    scene.video_prompt.clone(),
                    scene.output_url.clone().unwrap_or_default(),
                    None,
                )];
            }
            completed
                .windows(2)
                .enumerate()
                .map(|(i, pair)| {
                    VideoItem::new(
                        i as u32,
                        pair[0].video_prompt.clone(),
                        pair[0].output_url.clone().unwrap_or_default(),
                        pair[1].output_url.clone(),
                    )
                })
                .collect()
        }
    }
}
