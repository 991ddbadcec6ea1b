//! Shared fixtures for the orchestrator integration tests: a configurable
//! mock provider, a mock merge service, and document builders.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reelflow_core::document::{
    ItemStatus, SceneItem, VideoItem, WorkItem, WorkflowDocument, WorkflowStatus,
};
use reelflow_core::error::{CoreError, CoreResult};
use reelflow_core::planning::{CharacterSeed, SceneSeed, ScriptInput};
use reelflow_core::retry::RetryPolicy;
use reelflow_core::stage::Stage;
use reelflow_core::types::{new_doc_id, DocId};
use reelflow_pipeline::Orchestrator;
use reelflow_provider::traits::{
    GenerationParams, GenerationProvider, JobResult, JobState, MergeService, SubmitOutcome,
};
use reelflow_store::{DocumentStore, DocumentUpdater, MemoryStore};

/// How the mock provider answers submissions.
#[derive(Clone, Copy)]
pub enum SubmitMode {
    /// Return the output url synchronously.
    Inline,
    /// Return a job handle; the outcome comes from polling.
    Queued,
    /// Reject every submission.
    Reject,
}

/// How the mock provider answers job-status queries.
#[derive(Clone, Copy)]
pub enum PollMode {
    Succeed,
    Fail,
    /// Report `running` forever; only cancellation or timeout ends it.
    Hang,
}

pub struct MockProvider {
    submit: SubmitMode,
    poll: PollMode,
    pub submissions: AtomicUsize,
    pub polls: AtomicUsize,
}

impl MockProvider {
    pub fn new(submit: SubmitMode, poll: PollMode) -> Arc<Self> {
        Arc::new(Self {
            submit,
            poll,
            submissions: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
        })
    }

    fn submit(&self) -> CoreResult<SubmitOutcome> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst);
        match self.submit {
            SubmitMode::Inline => Ok(SubmitOutcome::Completed {
                output_url: format!("http://img/{n}"),
            }),
            SubmitMode::Queued => Ok(SubmitOutcome::Queued {
                job_handle: format!("job-{n}"),
            }),
            SubmitMode::Reject => Err(CoreError::Submission("provider rejected job".into())),
        }
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    async fn text_to_image(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> CoreResult<SubmitOutcome> {
        self.submit()
    }

    async fn image_to_edit(
        &self,
        _ref_urls: &[String],
        _prompt: &str,
        _params: &GenerationParams,
    ) -> CoreResult<SubmitOutcome> {
        self.submit()
    }

    async fn image_to_video(
        &self,
        _first_frame_url: &str,
        _last_frame_url: Option<&str>,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> CoreResult<SubmitOutcome> {
        self.submit()
    }

    async fn get_job_result(&self, job_handle: &str) -> CoreResult<JobResult> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.poll {
            PollMode::Succeed => JobResult {
                status: JobState::Succeeded,
                output_url: Some(format!("http://out/{job_handle}")),
                error: None,
            },
            PollMode::Fail => JobResult {
                status: JobState::Failed,
                output_url: None,
                error: Some("render crashed".into()),
            },
            PollMode::Hang => JobResult {
                status: JobState::Running,
                output_url: None,
                error: None,
            },
        })
    }
}

pub struct MockMerge {
    fail: bool,
    pub calls: AtomicUsize,
}

impl MockMerge {
    pub fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MergeService for MockMerge {
    async fn merge(&self, output_urls: &[String]) -> CoreResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(CoreError::Provider("merge backend unavailable".into()))
        } else {
            Ok(format!("http://final/merged-{}.mp4", output_urls.len()))
        }
    }
}

pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<MockProvider>,
    pub merge: Arc<MockMerge>,
    pub orchestrator: Orchestrator,
}

pub fn build_env(submit: SubmitMode, poll: PollMode) -> TestEnv {
    build_env_with_merge(submit, poll, false)
}

pub fn build_env_with_merge(submit: SubmitMode, poll: PollMode, merge_fails: bool) -> TestEnv {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider::new(submit, poll);
    let merge = MockMerge::new(merge_fails);
    let updater = DocumentUpdater::new(RetryPolicy {
        max_attempts: 20,
        base_delay: Duration::from_millis(1),
        max_jitter: Duration::from_millis(1),
    });
    let orchestrator = Orchestrator::with_updater(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        Arc::clone(&provider) as Arc<dyn GenerationProvider>,
        Arc::clone(&merge) as Arc<dyn MergeService>,
        updater,
    );
    TestEnv {
        store,
        provider,
        merge,
        orchestrator,
    }
}

pub fn script(characters: usize, scenes: usize) -> ScriptInput {
    ScriptInput {
        characters: (0..characters)
            .map(|i| CharacterSeed {
                name: format!("char-{i}"),
                prompt: format!("portrait of char-{i}"),
            })
            .collect(),
        scenes: (0..scenes)
            .map(|i| SceneSeed {
                image_prompt: format!("scene-{i}"),
                video_prompt: format!("motion-{i}"),
            })
            .collect(),
    }
}

/// A document waiting after a fully successful scene stage.
pub async fn insert_doc_after_scenes(store: &MemoryStore, scene_urls: &[&str]) -> DocId {
    let mut doc = WorkflowDocument::new(new_doc_id(), "t");
    doc.stage = Stage::ScenesDone;
    doc.status = WorkflowStatus::Waiting;
    doc.scenes = scene_urls
        .iter()
        .enumerate()
        .map(|(i, url)| {
            let mut scene = SceneItem::new(format!("img-{i}"), format!("motion-{i}"));
            scene.image_status = ItemStatus::Done;
            scene.output_url = Some(url.to_string());
            scene
        })
        .collect();
    let id = doc.id;
    store.insert(&doc).await.unwrap();
    id
}

/// A document waiting after the video stage, with the given per-video
/// outcomes (`Some(url)` done, `None` errored).
pub async fn insert_doc_after_videos(store: &MemoryStore, outcomes: &[Option<&str>]) -> DocId {
    let mut doc = WorkflowDocument::new(new_doc_id(), "t");
    doc.stage = Stage::VideosDone;
    doc.status = WorkflowStatus::Waiting;
    doc.videos = outcomes
        .iter()
        .enumerate()
        .map(|(i, outcome)| {
            let mut video = VideoItem::new(i as u32, format!("motion-{i}"), "http://frame", None);
            match outcome {
                Some(url) => {
                    video.status = reelflow_core::document::VideoStatus::Done;
                    video.output_url = Some(url.to_string());
                }
                None => video.fail("render crashed"),
            }
            video
        })
        .collect();
    let id = doc.id;
    store.insert(&doc).await.unwrap();
    id
}

/// A running document whose scene items are mid-generation, with or without
/// persisted job handles.
pub async fn insert_doc_mid_scenes(store: &MemoryStore, handles: &[Option<&str>]) -> DocId {
    let mut doc = WorkflowDocument::new(new_doc_id(), "t");
    doc.stage = Stage::Scenes;
    doc.status = WorkflowStatus::Running;
    doc.scenes = handles
        .iter()
        .enumerate()
        .map(|(i, handle)| {
            let mut scene = SceneItem::new(format!("img-{i}"), format!("motion-{i}"));
            scene.image_status = ItemStatus::Generating;
            scene.job_handle = handle.map(str::to_string);
            scene
        })
        .collect();
    let id = doc.id;
    store.insert(&doc).await.unwrap();
    id
}

/// Poll the store until `pred` holds for the document, failing the test
/// after a (virtual) minute.
pub async fn wait_until<F>(store: &MemoryStore, id: DocId, what: &str, pred: F) -> WorkflowDocument
where
    F: Fn(&WorkflowDocument) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    loop {
        let doc = store.read(id).await.unwrap().value;
        if pred(&doc) {
            return doc;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}; last state: {doc:#?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
