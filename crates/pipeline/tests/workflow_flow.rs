//! End-to-end orchestrator tests over the in-memory store and a mock
//! provider: staged progression, stop, resume, retry, and merge outcomes.
//!
//! All tests run under a paused clock so the multi-second poll intervals
//! elapse instantly.

mod common;

use assert_matches::assert_matches;
use common::{
    build_env, build_env_with_merge, insert_doc_after_scenes, insert_doc_after_videos,
    insert_doc_mid_scenes, script, wait_until, PollMode, SubmitMode,
};
use reelflow_core::document::{
    CharacterItem, ItemStatus, WorkItem, WorkflowDocument, WorkflowStatus, INTERRUPTED_RETRY,
    STOPPED_BY_USER,
};
use reelflow_core::error::CoreError;
use reelflow_core::stage::Stage;
use reelflow_core::types::{new_doc_id, ItemKind};
use reelflow_pipeline::StartWorkflowInput;
use reelflow_store::DocumentStore;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn start_input(characters: usize, scenes: usize) -> StartWorkflowInput {
    StartWorkflowInput {
        title: "test workflow".to_string(),
        script: script(characters, scenes),
        frame_mode: Default::default(),
    }
}

fn waiting_at(stage: Stage) -> impl Fn(&WorkflowDocument) -> bool {
    move |doc| doc.stage == stage && doc.status == WorkflowStatus::Waiting
}

// ---------------------------------------------------------------------------
// Staged progression
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn start_runs_character_stage_to_waiting() {
    let env = build_env(SubmitMode::Inline, PollMode::Succeed);
    let doc = env.orchestrator.start_workflow(start_input(2, 3)).await.unwrap();
    assert_eq!(doc.stage, Stage::Characters);
    assert_eq!(doc.status, WorkflowStatus::Running);

    let doc = wait_until(
        &env.store,
        doc.id,
        "character stage to finish",
        waiting_at(Stage::CharactersDone),
    )
    .await;

    assert!(doc.characters.iter().all(|c| c.status == ItemStatus::Done));
    assert!(doc.characters.iter().all(|c| c.output_url.is_some()));
    assert_eq!(env.provider.submissions.load(Ordering::SeqCst), 2);
    // Inline completions never poll.
    assert_eq!(env.provider.polls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn full_flow_reaches_completed_with_merged_video() {
    let env = build_env(SubmitMode::Inline, PollMode::Succeed);
    let doc = env.orchestrator.start_workflow(start_input(2, 3)).await.unwrap();
    let id = doc.id;

    wait_until(&env.store, id, "characters", waiting_at(Stage::CharactersDone)).await;
    env.orchestrator.continue_workflow(id).await.unwrap();
    wait_until(&env.store, id, "scenes", waiting_at(Stage::ScenesDone)).await;

    env.orchestrator.continue_workflow(id).await.unwrap();
    let doc = wait_until(&env.store, id, "videos", waiting_at(Stage::VideosDone)).await;
    // first_last over three completed scenes yields two clips.
    assert_eq!(doc.videos.len(), 2);
    assert!(doc.videos[0].last_frame_url.is_some());

    env.orchestrator.continue_workflow(id).await.unwrap();
    let doc = wait_until(&env.store, id, "merge", |doc| {
        doc.stage == Stage::Completed
    })
    .await;

    assert_eq!(doc.status, WorkflowStatus::Completed);
    assert!(doc.merged_video_url.is_some());
    assert_eq!(env.merge.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn queued_jobs_poll_to_done() {
    let env = build_env(SubmitMode::Queued, PollMode::Succeed);
    let doc = env.orchestrator.start_workflow(start_input(1, 1)).await.unwrap();

    let doc = wait_until(
        &env.store,
        doc.id,
        "queued character to finish",
        waiting_at(Stage::CharactersDone),
    )
    .await;

    let character = &doc.characters[0];
    assert_eq!(character.status, ItemStatus::Done);
    assert_eq!(character.output_url.as_deref(), Some("http://out/job-0"));
    // Terminal items never keep their handle.
    assert!(character.job_handle.is_none());
    assert!(env.provider.polls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn continue_is_rejected_while_running() {
    let env = build_env(SubmitMode::Queued, PollMode::Hang);
    let doc = env.orchestrator.start_workflow(start_input(1, 1)).await.unwrap();

    let err = env.orchestrator.continue_workflow(doc.id).await.unwrap_err();
    assert_matches!(err, CoreError::Validation(_));
}

#[tokio::test(start_paused = true)]
async fn all_videos_failing_marks_workflow_failed() {
    let env = build_env(SubmitMode::Reject, PollMode::Succeed);
    let id = insert_doc_after_scenes(&env.store, &["u0", "u1", "u2"]).await;

    env.orchestrator.continue_workflow(id).await.unwrap();
    let doc = wait_until(&env.store, id, "video stage to settle", |doc| {
        doc.stage == Stage::VideosDone
    })
    .await;

    // Zero successes in the final content stage is failed, not waiting.
    assert_eq!(doc.status, WorkflowStatus::Failed);
    assert_eq!(doc.videos.len(), 2);
    assert!(doc.videos.iter().all(|v| v.error.is_some()));
}

// ---------------------------------------------------------------------------
// Stop
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stop_errors_every_non_terminal_item() {
    let env = build_env(SubmitMode::Queued, PollMode::Hang);
    let doc = env.orchestrator.start_workflow(start_input(2, 2)).await.unwrap();
    let id = doc.id;

    wait_until(&env.store, id, "characters to get handles", |doc| {
        doc.characters.iter().all(|c| c.job_handle.is_some())
    })
    .await;

    let doc = env.orchestrator.stop_workflow(id).await.unwrap();
    assert_eq!(doc.status, WorkflowStatus::Stopped);
    // The stage freezes where it was.
    assert_eq!(doc.stage, Stage::Characters);
    for character in &doc.characters {
        assert_eq!(character.status, ItemStatus::Error);
        assert_eq!(character.error.as_deref(), Some(STOPPED_BY_USER));
        assert!(character.job_handle.is_none());
    }
    // Pending scene items are swept up by the same stop.
    assert!(doc
        .scenes
        .iter()
        .all(|s| s.error.as_deref() == Some(STOPPED_BY_USER)));
    assert_eq!(env.provider.submissions.load(Ordering::SeqCst), 2);

    // Cancelled pollers wind down and stop querying the provider.
    wait_until(&env.store, id, "pipelines to drain", |_| {
        env.orchestrator.active_ops(id) == 0
    })
    .await;
    let polls_after_stop = env.provider.polls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(env.provider.polls.load(Ordering::SeqCst), polls_after_stop);
}

// ---------------------------------------------------------------------------
// Resume
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn resume_repolls_handles_without_resubmitting() {
    // Submission is rejecting, so any accidental resubmission would surface
    // as an errored item and a nonzero counter.
    let env = build_env(SubmitMode::Reject, PollMode::Succeed);
    let id = insert_doc_mid_scenes(&env.store, &[Some("job-a"), Some("job-b")]).await;

    env.orchestrator.resume_workflow(id).await.unwrap();
    let doc = wait_until(&env.store, id, "resume to settle", waiting_at(Stage::ScenesDone)).await;

    assert!(doc.scenes.iter().all(|s| s.image_status == ItemStatus::Done));
    assert_eq!(doc.scenes[0].output_url.as_deref(), Some("http://out/job-a"));
    assert_eq!(env.provider.submissions.load(Ordering::SeqCst), 0);
    assert!(env.provider.polls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test(start_paused = true)]
async fn resume_errors_items_stuck_without_handles() {
    let env = build_env(SubmitMode::Reject, PollMode::Succeed);
    let id = insert_doc_mid_scenes(&env.store, &[None, Some("job-b")]).await;

    env.orchestrator.resume_workflow(id).await.unwrap();
    let doc = wait_until(&env.store, id, "resume to settle", waiting_at(Stage::ScenesDone)).await;

    assert_eq!(doc.scenes[0].image_status, ItemStatus::Error);
    assert_eq!(doc.scenes[0].error.as_deref(), Some(INTERRUPTED_RETRY));
    assert_eq!(doc.scenes[1].image_status, ItemStatus::Done);
    assert_eq!(env.provider.submissions.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn resume_is_a_noop_for_waiting_documents() {
    let env = build_env(SubmitMode::Reject, PollMode::Succeed);
    let id = insert_doc_after_scenes(&env.store, &["u0"]).await;

    let doc = env.orchestrator.resume_workflow(id).await.unwrap();
    assert_eq!(doc.stage, Stage::ScenesDone);
    assert_eq!(doc.status, WorkflowStatus::Waiting);
    assert_eq!(env.provider.polls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn retry_reruns_failed_item_with_new_prompt() {
    let env = build_env(SubmitMode::Inline, PollMode::Succeed);

    let mut doc = WorkflowDocument::new(new_doc_id(), "t");
    doc.stage = Stage::CharactersDone;
    doc.status = WorkflowStatus::Waiting;
    let mut failed = CharacterItem::new("hero", "first attempt");
    failed.fail("provider rejected job");
    doc.characters.push(failed);
    let id = doc.id;
    env.store.insert(&doc).await.unwrap();

    env.orchestrator
        .retry_item(id, ItemKind::Character, 0, Some("better prompt".into()))
        .await
        .unwrap();

    let doc = wait_until(&env.store, id, "retried item to finish", |doc| {
        doc.characters[0].status == ItemStatus::Done
    })
    .await;

    assert_eq!(doc.characters[0].prompt, "better prompt");
    assert!(doc.characters[0].output_url.is_some());
    assert!(doc.characters[0].error.is_none());
    // The stage was already done; retry does not move it.
    assert_eq!(doc.stage, Stage::CharactersDone);
    assert_eq!(doc.status, WorkflowStatus::Waiting);
}

#[tokio::test(start_paused = true)]
async fn retry_out_of_range_index_is_rejected() {
    let env = build_env(SubmitMode::Inline, PollMode::Succeed);
    let id = insert_doc_after_scenes(&env.store, &["u0"]).await;

    let err = env
        .orchestrator
        .retry_item(id, ItemKind::Scene, 5, None)
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Validation(_));
}

// ---------------------------------------------------------------------------
// Merge outcomes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn merge_with_failed_clips_is_partial() {
    let env = build_env(SubmitMode::Inline, PollMode::Succeed);
    let id = insert_doc_after_videos(&env.store, &[Some("v0"), None, Some("v2")]).await;

    env.orchestrator.continue_workflow(id).await.unwrap();
    let doc = wait_until(&env.store, id, "merge", |doc| doc.stage == Stage::Completed).await;

    assert_eq!(doc.status, WorkflowStatus::Partial);
    assert!(doc.merged_video_url.is_some());
}

#[tokio::test(start_paused = true)]
async fn merge_failure_marks_workflow_failed() {
    let env = build_env_with_merge(SubmitMode::Inline, PollMode::Succeed, true);
    let id = insert_doc_after_videos(&env.store, &[Some("v0")]).await;

    env.orchestrator.continue_workflow(id).await.unwrap();
    let doc = wait_until(&env.store, id, "merge to fail", |doc| {
        doc.status == WorkflowStatus::Failed
    })
    .await;

    assert_eq!(doc.stage, Stage::Merging);
    assert!(doc.merged_video_url.is_none());
}
