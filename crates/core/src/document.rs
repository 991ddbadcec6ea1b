//! The workflow document and its work items.
//!
//! A [`WorkflowDocument`] is the single mutable record for one pipeline run:
//! current stage, overall status, and the three ordered item collections
//! (characters, scenes, videos). It is owned exclusively by the orchestrator;
//! everything else reads it or submits patches through the document updater.
//!
//! Update identity is the positional index within a collection, because
//! callers reference items by index. Patches are per-kind partial structs;
//! applying a patch enforces the terminal-state invariant (exactly one of
//! `output_url` / `error`, job handle cleared).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::stage::Stage;
use crate::types::{new_item_id, DocId, ItemId, ItemKind};

/// Error message recorded on items killed by an explicit stop.
pub const STOPPED_BY_USER: &str = "Stopped by user";

/// Error message recorded on items that were marked in-progress but never
/// received a job handle (crash between submission and persistence).
pub const INTERRUPTED_RETRY: &str = "Generation interrupted, please retry";

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Overall status of a workflow document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// A stage is actively generating.
    Running,
    /// The current stage finished; a `continue` command is expected.
    Waiting,
    /// Stopped by the user; non-terminal items were errored out.
    Stopped,
    /// The final content-producing stage yielded zero successes, or the
    /// merge call failed.
    Failed,
    /// Post-merge with some failed videos; irrecoverable.
    Partial,
    /// Merged video produced; nothing left to do.
    Completed,
}

/// Status of a character or scene-image item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Generating,
    Uploading,
    Done,
    Error,
}

impl ItemStatus {
    /// `done` and `error` are equally terminal for stage advancement.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Error)
    }

    /// Statuses that denote an in-flight asynchronous provider job.
    pub fn is_awaiting(&self) -> bool {
        matches!(self, ItemStatus::Generating | ItemStatus::Uploading)
    }
}

/// Status of a video item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Pending,
    Submitting,
    Polling,
    Done,
    Error,
}

impl VideoStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Done | VideoStatus::Error)
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self, VideoStatus::Submitting | VideoStatus::Polling)
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Common view over the three item kinds, used by stage advancement,
/// stop, and resume logic.
pub trait WorkItem {
    fn item_id(&self) -> ItemId;
    fn is_terminal(&self) -> bool;
    /// True when the status denotes an in-flight asynchronous job.
    fn is_awaiting(&self) -> bool;
    fn job_handle(&self) -> Option<&str>;
    fn output_url(&self) -> Option<&str>;
    /// Force the item into the `error` terminal state with the given message.
    fn fail(&mut self, message: &str);
}

/// One character reference image to generate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterItem {
    pub id: ItemId,
    pub name: String,
    pub prompt: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CharacterItem {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: new_item_id(),
            name: name.into(),
            prompt: prompt.into(),
            status: ItemStatus::Pending,
            output_url: None,
            job_handle: None,
            error: None,
        }
    }
}

/// One scene: a still image now, a video clip later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneItem {
    pub id: ItemId,
    pub image_prompt: String,
    pub video_prompt: String,
    pub image_status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SceneItem {
    pub fn new(image_prompt: impl Into<String>, video_prompt: impl Into<String>) -> Self {
        Self {
            id: new_item_id(),
            image_prompt: image_prompt.into(),
            video_prompt: video_prompt.into(),
            image_status: ItemStatus::Pending,
            output_url: None,
            job_handle: None,
            error: None,
        }
    }
}

/// One video clip, derived from completed scene images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoItem {
    pub id: ItemId,
    /// Position among the planned videos (stable across retries).
    pub index: u32,
    pub prompt: String,
    pub first_frame_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_frame_url: Option<String>,
    pub status: VideoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VideoItem {
    pub fn new(
        index: u32,
        prompt: impl Into<String>,
        first_frame_url: impl Into<String>,
        last_frame_url: Option<String>,
    ) -> Self {
        Self {
            id: new_item_id(),
            index,
            prompt: prompt.into(),
            first_frame_url: first_frame_url.into(),
            last_frame_url,
            status: VideoStatus::Pending,
            job_handle: None,
            output_url: None,
            error: None,
        }
    }
}

impl WorkItem for CharacterItem {
    fn item_id(&self) -> ItemId {
        self.id
    }
    fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
    fn is_awaiting(&self) -> bool {
        self.status.is_awaiting()
    }
    fn job_handle(&self) -> Option<&str> {
        self.job_handle.as_deref()
    }
    fn output_url(&self) -> Option<&str> {
        self.output_url.as_deref()
    }
    fn fail(&mut self, message: &str) {
        self.status = ItemStatus::Error;
        self.error = Some(message.to_string());
        self.output_url = None;
        self.job_handle = None;
    }
}

impl WorkItem for SceneItem {
    fn item_id(&self) -> ItemId {
        self.id
    }
    fn is_terminal(&self) -> bool {
        self.image_status.is_terminal()
    }
    fn is_awaiting(&self) -> bool {
        self.image_status.is_awaiting()
    }
    fn job_handle(&self) -> Option<&str> {
        self.job_handle.as_deref()
    }
    fn output_url(&self) -> Option<&str> {
        self.output_url.as_deref()
    }
    fn fail(&mut self, message: &str) {
        self.image_status = ItemStatus::Error;
        self.error = Some(message.to_string());
        self.output_url = None;
        self.job_handle = None;
    }
}

impl WorkItem for VideoItem {
    fn item_id(&self) -> ItemId {
        self.id
    }
    fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
    fn is_awaiting(&self) -> bool {
        self.status.is_awaiting()
    }
    fn job_handle(&self) -> Option<&str> {
        self.job_handle.as_deref()
    }
    fn output_url(&self) -> Option<&str> {
        self.output_url.as_deref()
    }
    fn fail(&mut self, message: &str) {
        self.status = VideoStatus::Error;
        self.error = Some(message.to_string());
        self.output_url = None;
        self.job_handle = None;
    }
}

// ---------------------------------------------------------------------------
// Patches
// ---------------------------------------------------------------------------

/// Serde helper distinguishing "field absent" from "field explicitly null".
///
/// `Option<Option<T>>`: outer `None` = leave unchanged, `Some(None)` = clear,
/// `Some(Some(v))` = set.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            None => serializer.serialize_none(),
            Some(inner) => inner.serialize(serializer),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Ok(Some(Option::<T>::deserialize(deserializer)?))
    }
}

/// Partial update for a character item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub output_url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub job_handle: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub error: Option<Option<String>>,
}

/// Partial update for a scene item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_status: Option<ItemStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub output_url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub job_handle: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub error: Option<Option<String>>,
}

/// Partial update for a video item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VideoStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub output_url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub job_handle: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub error: Option<Option<String>>,
}

/// A patch for one item, tagged by collection kind.
#[derive(Debug, Clone)]
pub enum ItemPatch {
    Character(CharacterPatch),
    Scene(ScenePatch),
    Video(VideoPatch),
}

impl ItemPatch {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemPatch::Character(_) => ItemKind::Character,
            ItemPatch::Scene(_) => ItemKind::Scene,
            ItemPatch::Video(_) => ItemKind::Video,
        }
    }

    /// Convenience patch marking an item terminal-done with an output url.
    pub fn done(kind: ItemKind, output_url: String) -> Self {
        match kind {
            ItemKind::Character => ItemPatch::Character(CharacterPatch {
                status: Some(ItemStatus::Done),
                output_url: Some(Some(output_url)),
                job_handle: Some(None),
                error: Some(None),
                ..Default::default()
            }),
            ItemKind::Scene => ItemPatch::Scene(ScenePatch {
                image_status: Some(ItemStatus::Done),
                output_url: Some(Some(output_url)),
                job_handle: Some(None),
                error: Some(None),
                ..Default::default()
            }),
            ItemKind::Video => ItemPatch::Video(VideoPatch {
                status: Some(VideoStatus::Done),
                output_url: Some(Some(output_url)),
                job_handle: Some(None),
                error: Some(None),
                ..Default::default()
            }),
        }
    }

    /// Convenience patch marking an item terminal-error with a message.
    pub fn failed(kind: ItemKind, message: String) -> Self {
        match kind {
            ItemKind::Character => ItemPatch::Character(CharacterPatch {
                status: Some(ItemStatus::Error),
                error: Some(Some(message)),
                job_handle: Some(None),
                output_url: Some(None),
                ..Default::default()
            }),
            ItemKind::Scene => ItemPatch::Scene(ScenePatch {
                image_status: Some(ItemStatus::Error),
                error: Some(Some(message)),
                job_handle: Some(None),
                output_url: Some(None),
                ..Default::default()
            }),
            ItemKind::Video => ItemPatch::Video(VideoPatch {
                status: Some(VideoStatus::Error),
                error: Some(Some(message)),
                job_handle: Some(None),
                output_url: Some(None),
                ..Default::default()
            }),
        }
    }

    /// Convenience patch recording a freshly issued job handle.
    pub fn handle(kind: ItemKind, job_handle: String) -> Self {
        match kind {
            ItemKind::Character => ItemPatch::Character(CharacterPatch {
                status: Some(ItemStatus::Generating),
                job_handle: Some(Some(job_handle)),
                ..Default::default()
            }),
            ItemKind::Scene => ItemPatch::Scene(ScenePatch {
                image_status: Some(ItemStatus::Generating),
                job_handle: Some(Some(job_handle)),
                ..Default::default()
            }),
            ItemKind::Video => ItemPatch::Video(VideoPatch {
                status: Some(VideoStatus::Polling),
                job_handle: Some(Some(job_handle)),
                ..Default::default()
            }),
        }
    }

    /// Convenience patch marking an item in-progress before submission.
    ///
    /// No job handle yet: the handle is persisted in a second patch once the
    /// provider returns it, so a crash in between is detectable on resume.
    pub fn in_progress(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Character => ItemPatch::Character(CharacterPatch {
                status: Some(ItemStatus::Generating),
                error: Some(None),
                ..Default::default()
            }),
            ItemKind::Scene => ItemPatch::Scene(ScenePatch {
                image_status: Some(ItemStatus::Generating),
                error: Some(None),
                ..Default::default()
            }),
            ItemKind::Video => ItemPatch::Video(VideoPatch {
                status: Some(VideoStatus::Submitting),
                error: Some(None),
                ..Default::default()
            }),
        }
    }
}

impl CharacterItem {
    /// Apply a partial patch, then enforce terminal-state invariants.
    pub fn apply(&mut self, patch: &CharacterPatch) {
        if let Some(prompt) = &patch.prompt {
            self.prompt = prompt.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(output_url) = &patch.output_url {
            self.output_url = output_url.clone();
        }
        if let Some(job_handle) = &patch.job_handle {
            self.job_handle = job_handle.clone();
        }
        if let Some(error) = &patch.error {
            self.error = error.clone();
        }
        if self.status.is_terminal() {
            self.job_handle = None;
            match self.status {
                ItemStatus::Done => self.error = None,
                ItemStatus::Error => self.output_url = None,
                _ => {}
            }
        }
    }
}

impl SceneItem {
    pub fn apply(&mut self, patch: &ScenePatch) {
        if let Some(image_prompt) = &patch.image_prompt {
            self.image_prompt = image_prompt.clone();
        }
        if let Some(video_prompt) = &patch.video_prompt {
            self.video_prompt = video_prompt.clone();
        }
        if let Some(status) = patch.image_status {
            self.image_status = status;
        }
        if let Some(output_url) = &patch.output_url {
            self.output_url = output_url.clone();
        }
        if let Some(job_handle) = &patch.job_handle {
            self.job_handle = job_handle.clone();
        }
        if let Some(error) = &patch.error {
            self.error = error.clone();
        }
        if self.image_status.is_terminal() {
            self.job_handle = None;
            match self.image_status {
                ItemStatus::Done => self.error = None,
                ItemStatus::Error => self.output_url = None,
                _ => {}
            }
        }
    }
}

impl VideoItem {
    pub fn apply(&mut self, patch: &VideoPatch) {
        if let Some(prompt) = &patch.prompt {
            self.prompt = prompt.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(output_url) = &patch.output_url {
            self.output_url = output_url.clone();
        }
        if let Some(job_handle) = &patch.job_handle {
            self.job_handle = job_handle.clone();
        }
        if let Some(error) = &patch.error {
            self.error = error.clone();
        }
        if self.status.is_terminal() {
            self.job_handle = None;
            match self.status {
                VideoStatus::Done => self.error = None,
                VideoStatus::Error => self.output_url = None,
                _ => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Frame mode
// ---------------------------------------------------------------------------

/// How video items are derived from completed scene images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    /// One video per consecutive completed-scene pair (first + last frame).
    FirstLast,
    /// One video per completed scene (single starting frame).
    SingleImage,
}

impl Default for FrameMode {
    fn default() -> Self {
        FrameMode::FirstLast
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// The single mutable record for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub id: DocId,
    pub title: String,
    pub stage: Stage,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub frame_mode: FrameMode,
    #[serde(default)]
    pub characters: Vec<CharacterItem>,
    #[serde(default)]
    pub scenes: Vec<SceneItem>,
    #[serde(default)]
    pub videos: Vec<VideoItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_video_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDocument {
    /// Create an empty document in the `idle` stage.
    pub fn new(id: DocId, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            stage: Stage::Idle,
            status: WorkflowStatus::Waiting,
            frame_mode: FrameMode::default(),
            characters: Vec::new(),
            scenes: Vec::new(),
            videos: Vec::new(),
            merged_video_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of items in the given collection.
    pub fn item_count(&self, kind: ItemKind) -> usize {
        match kind {
            ItemKind::Character => self.characters.len(),
            ItemKind::Scene => self.scenes.len(),
            ItemKind::Video => self.videos.len(),
        }
    }

    /// Dynamic view of one collection for kind-generic logic.
    pub fn items(&self, kind: ItemKind) -> Vec<&dyn WorkItem> {
        match kind {
            ItemKind::Character => self.characters.iter().map(|i| i as &dyn WorkItem).collect(),
            ItemKind::Scene => self.scenes.iter().map(|i| i as &dyn WorkItem).collect(),
            ItemKind::Video => self.videos.iter().map(|i| i as &dyn WorkItem).collect(),
        }
    }

    /// Apply a per-item patch at a positional index.
    ///
    /// Returns `Validation` when the index is out of range for the patch's
    /// collection.
    pub fn apply_item_patch(&mut self, index: usize, patch: &ItemPatch) -> Result<(), CoreError> {
        let len = self.item_count(patch.kind());
        if index >= len {
            return Err(CoreError::Validation(format!(
                "{} index {index} out of range (len {len})",
                patch.kind()
            )));
        }
        match patch {
            ItemPatch::Character(p) => self.characters[index].apply(p),
            ItemPatch::Scene(p) => self.scenes[index].apply(p),
            ItemPatch::Video(p) => self.videos[index].apply(p),
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Fail every non-terminal item across all collections with `message`.
    ///
    /// Returns the number of items changed.
    pub fn fail_all_non_terminal(&mut self, message: &str) -> usize {
        let mut changed = 0;
        for item in self.characters.iter_mut() {
            if !item.is_terminal() {
                item.fail(message);
                changed += 1;
            }
        }
        for item in self.scenes.iter_mut() {
            if !item.is_terminal() {
                item.fail(message);
                changed += 1;
            }
        }
        for item in self.videos.iter_mut() {
            if !item.is_terminal() {
                item.fail(message);
                changed += 1;
            }
        }
        if changed > 0 {
            self.updated_at = Utc::now();
        }
        changed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
