//! Workspace actions, app management and editor deploys

use std::sync::Mutex;

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use camsync::errors::AgentError;
use camsync::models::app::CloudApplication;
use camsync::models::flow::FlowDocument;
use camsync::models::model::ModelDescriptor;
use camsync::models::platform::UserInfo;
use camsync::sync::equivalence::ReconciliationDecision;
use camsync::sync::prompt::{FixedPrompter, Prefer, Prompter};
use camsync::sync::reconciler::SyncOutcome;
use camsync::workers::flow_watcher;
use camsync::workspace::actions::WorkspaceAction;

use crate::fakes::{cloud_app, signed_in, workspace, Fakes, FLOW_A, FLOW_B, PRESET_ID};

/// Remembers what it was asked and told
#[derive(Default)]
struct RecordingPrompter {
    confirm: bool,
    questions: Mutex<Vec<String>>,
    notes: Mutex<Vec<String>>,
}

impl RecordingPrompter {
    fn confirming(confirm: bool) -> Self {
        Self {
            confirm,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Prompter for RecordingPrompter {
    async fn choose_side(
        &self,
        _app: &CloudApplication,
        _decision: ReconciliationDecision,
    ) -> Option<Prefer> {
        None
    }

    async fn confirm(&self, question: &str) -> bool {
        self.questions.lock().unwrap().push(question.to_string());
        self.confirm
    }

    async fn notify(&self, message: &str) {
        self.notes.lock().unwrap().push(message.to_string());
    }
}

fn hosted_model() -> ModelDescriptor {
    ModelDescriptor::new("0", "custom")
        .with_checksum("x1")
        .with_source_url("https://files.test/custom_1")
}

// ================================= ACTIONS ====================================== //

#[tokio::test]
async fn test_new_action_saves_current_application_first() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", FLOW_B, None);
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_A);
        state.apps.push(app.clone());
    }
    let ws = workspace(&fakes, Some(app)).await;
    let prompter = RecordingPrompter::confirming(true);

    let outcome = assert_ok!(ws.apply_action(WorkspaceAction::New, &prompter).await);

    assert_eq!(outcome, SyncOutcome::Created { app_id: "101".to_string() });
    assert_eq!(prompter.questions.lock().unwrap().len(), 1);
    assert_eq!(fakes.app("1").unwrap().flow_data.as_str(), FLOW_A);

    let created = fakes.app("101").unwrap();
    assert_eq!(created.app_name, "Untitled");
    assert!(created.flow_data.is_empty());
    assert!(fakes.state().flow.is_empty());
    assert_eq!(ws.binding().await.app_id(), Some("101"));
}

#[tokio::test]
async fn test_declined_save_still_switches() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", FLOW_B, None);
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_A);
        state.apps.push(app.clone());
        state.apps.push(cloud_app("2", "porch", FLOW_B, None));
    }
    let ws = workspace(&fakes, Some(app.clone())).await;

    let action = WorkspaceAction::App {
        app_id: "2".to_string(),
    };
    let outcome = assert_ok!(ws.apply_action(action, &RecordingPrompter::confirming(false)).await);

    assert_eq!(
        outcome,
        SyncOutcome::LoadedToDevice {
            app_id: "2".to_string(),
            model: None
        }
    );
    assert_eq!(fakes.app("1").unwrap(), app);
    assert!(fakes.state().updates.is_empty());
    assert_eq!(ws.binding().await.app_id(), Some("2"));
}

#[tokio::test]
async fn test_unbound_device_data_is_kept_as_new_application() {
    let fakes = Fakes::new();
    fakes.state().flow = FlowDocument::new(FLOW_A);
    let ws = workspace(&fakes, None).await;

    assert_ok!(
        ws.apply_action(WorkspaceAction::New, &RecordingPrompter::confirming(true))
            .await
    );

    let state = fakes.state();
    assert_eq!(state.drafts.len(), 2);
    assert_eq!(state.drafts[0].app_name.as_deref(), Some("Door"));
    assert_eq!(state.drafts[1].app_name.as_deref(), Some("Untitled"));
    drop(state);
    // the saved copy is not bound, the new application is
    assert_eq!(ws.binding().await.app_id(), Some("102"));
}

#[tokio::test]
async fn test_unreadable_device_blocks_switch() {
    let fakes = Fakes::new();
    fakes.state().apps.push(cloud_app("2", "porch", FLOW_B, None));
    fakes.fail("get_flows");
    let ws = workspace(&fakes, None).await;

    let action = WorkspaceAction::App {
        app_id: "2".to_string(),
    };
    let err = assert_err!(ws.apply_action(action, &FixedPrompter::deferred()).await);

    assert!(matches!(err, AgentError::NetworkFailure(_)));
    let state = fakes.state();
    assert!(state.drafts.is_empty());
    assert_eq!(state.deploys, 0);
}

#[tokio::test]
async fn test_clone_action() {
    let fakes = Fakes::new();
    fakes.state().apps.push(cloud_app("1", "door", FLOW_A, None));
    let ws = workspace(&fakes, None).await;

    let action = WorkspaceAction::Clone {
        app_id: "1".to_string(),
    };
    let outcome = assert_ok!(ws.apply_action(action, &FixedPrompter::deferred()).await);

    assert_eq!(outcome, SyncOutcome::Created { app_id: "101".to_string() });
    let copy = fakes.app("101").unwrap();
    assert_eq!(copy.app_name, "door_clone");
    assert_eq!(copy.flow_data.as_str(), FLOW_A);
    assert_eq!(fakes.state().flow.as_str(), FLOW_A);
    // the source is untouched
    assert_eq!(fakes.app("1").unwrap().app_name, "door");
}

#[tokio::test]
async fn test_model_action_with_preset_skips_download() {
    let fakes = Fakes::new();
    fakes
        .state()
        .model_snapshots
        .insert(PRESET_ID.to_string(), ModelDescriptor::new(PRESET_ID, "person"));
    let ws = workspace(&fakes, None).await;

    let action = WorkspaceAction::Model {
        model_id: PRESET_ID.to_string(),
    };
    let outcome = assert_ok!(ws.apply_action(action, &FixedPrompter::deferred()).await);

    assert_eq!(outcome, SyncOutcome::Created { app_id: "101".to_string() });
    let created = fakes.app("101").unwrap();
    assert_eq!(created.app_name, "person");
    assert_eq!(created.flow_data.as_str(), FLOW_B);

    let state = fakes.state();
    assert_eq!(state.device_uploads.len(), 1);
    assert!(state.device_uploads[0].binary.is_none());
    assert!(state.fetched.is_empty());
    assert_eq!(
        state.local_model.descriptor.as_ref().map(|m| m.model_id.as_str()),
        Some(PRESET_ID)
    );
}

#[tokio::test]
async fn test_model_action_downloads_once() {
    let fakes = Fakes::new();
    {
        let mut state = fakes.state();
        state.model_snapshots.insert(
            "77".to_string(),
            ModelDescriptor::new("77", "helmet").with_source_url("https://files.test/helmet"),
        );
        state
            .blobs
            .insert("https://files.test/helmet".to_string(), b"helmet-model".to_vec());
    }
    let ws = workspace(&fakes, None).await;

    let action = WorkspaceAction::Model {
        model_id: "77".to_string(),
    };
    let outcome = assert_ok!(ws.apply_action(action, &FixedPrompter::deferred()).await);

    assert_eq!(outcome, SyncOutcome::Created { app_id: "101".to_string() });
    let state = fakes.state();
    assert_eq!(state.fetched.len(), 1);
    assert_eq!(state.device_uploads.len(), 1);
    assert_eq!(
        state.device_uploads[0].binary.as_deref(),
        Some(&b"helmet-model"[..])
    );
    assert_eq!(state.flow.as_str(), FLOW_B);
    assert_eq!(state.deploys, 1);
    drop(state);
    assert_eq!(ws.binding().await.app_id(), Some("101"));
}

#[tokio::test]
async fn test_unknown_model_creates_nothing() {
    let fakes = Fakes::new();
    let ws = workspace(&fakes, None).await;

    let action = WorkspaceAction::Model {
        model_id: "55".to_string(),
    };
    let err = assert_err!(ws.apply_action(action, &FixedPrompter::deferred()).await);

    assert!(matches!(err, AgentError::NotFound(_)));
    assert!(fakes.state().drafts.is_empty());
}

#[tokio::test]
async fn test_normal_action_never_asks_to_save() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", FLOW_A, None);
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_A);
        state.apps.push(app.clone());
    }
    let ws = workspace(&fakes, Some(app)).await;
    let prompter = RecordingPrompter::confirming(true);

    let outcome = assert_ok!(ws.apply_action(WorkspaceAction::Normal, &prompter).await);

    assert_eq!(outcome, SyncOutcome::InSync { app_id: "1".to_string() });
    assert!(prompter.questions.lock().unwrap().is_empty());
}

// ============================== APP MANAGEMENT ================================ //

#[tokio::test]
async fn test_deleting_bound_application_moves_to_next() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", FLOW_A, Some(hosted_model()));
    {
        let mut state = fakes.state();
        state.apps.push(app.clone());
        state.apps.push(cloud_app("2", "porch", FLOW_B, None));
    }
    let ws = workspace(&fakes, Some(app)).await;

    let outcome = assert_ok!(ws.delete("1").await);

    assert_eq!(
        outcome,
        Some(SyncOutcome::LoadedToDevice {
            app_id: "2".to_string(),
            model: None
        })
    );
    let state = fakes.state();
    assert_eq!(state.deleted, vec!["1".to_string()]);
    assert_eq!(state.removed_files, vec!["custom_1".to_string()]);
    assert_eq!(state.flow.as_str(), FLOW_B);
    drop(state);
    assert_eq!(ws.binding().await.app_id(), Some("2"));
}

#[tokio::test]
async fn test_failed_model_removal_does_not_fail_delete() {
    let fakes = Fakes::new();
    fakes
        .state()
        .apps
        .push(cloud_app("1", "door", FLOW_A, Some(hosted_model())));
    fakes.fail("remove_file");
    let ws = workspace(&fakes, None).await;

    let outcome = assert_ok!(ws.delete("1").await);

    assert_eq!(outcome, None);
    let state = fakes.state();
    assert_eq!(state.deleted, vec!["1".to_string()]);
    assert!(state.removed_files.is_empty());
    assert_eq!(state.deploys, 0);
}

#[tokio::test]
async fn test_deleting_last_application_unbinds() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", FLOW_A, None);
    fakes.state().apps.push(app.clone());
    let ws = workspace(&fakes, Some(app)).await;

    assert_eq!(assert_ok!(ws.delete("1").await), None);

    assert_eq!(ws.binding().await.app(), None);
    let stored = fakes.state().platform_info.clone().unwrap();
    assert!(stored.app_info.is_none());
    // the session survives the unbind
    assert_eq!(stored.user_info.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn test_rename_bound_application() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", FLOW_A, None);
    fakes.state().apps.push(app.clone());
    let ws = workspace(&fakes, Some(app)).await;

    assert_ok!(ws.rename("1", "  porch ").await);

    assert_eq!(fakes.app("1").unwrap().app_name, "porch");
    assert_eq!(ws.status().await.app_name.as_deref(), Some("porch"));
    let stored = fakes.state().platform_info.clone().unwrap();
    assert_eq!(stored.app_info.unwrap().app_name, "porch");

    let err = assert_err!(ws.rename("1", "   ").await);
    assert!(matches!(err, AgentError::ValidationError(_)));
    assert_eq!(fakes.state().updates.len(), 1);
}

#[tokio::test]
async fn test_select_loads_only_other_applications() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", FLOW_A, None);
    {
        let mut state = fakes.state();
        state.apps.push(app.clone());
        state.apps.push(cloud_app("2", "porch", FLOW_B, None));
    }
    let ws = workspace(&fakes, Some(app)).await;

    assert_eq!(assert_ok!(ws.select("1").await), None);
    assert_eq!(fakes.state().deploys, 0);

    let outcome = assert_ok!(ws.select("2").await).unwrap();
    assert_eq!(outcome.app_id(), "2");
    assert_eq!(fakes.state().deploys, 1);
}

#[tokio::test]
async fn test_status_and_account() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", r#"[{"id":"u","type":"ui-base"}]"#, None);
    fakes.state().nickname = "grace".to_string();
    let ws = workspace(&fakes, Some(app)).await;

    let status = ws.status().await;
    assert!(status.signed_in);
    assert_eq!(status.nickname.as_deref(), Some("ada"));
    assert_eq!(status.app_id.as_deref(), Some("1"));
    assert!(status.has_dashboard);

    assert_eq!(assert_ok!(ws.refresh_account().await), "grace");
    assert_eq!(ws.status().await.nickname.as_deref(), Some("grace"));
}

#[tokio::test]
async fn test_startup_sync_waits_for_sign_in() {
    let fakes = Fakes::new();
    fakes.state().flow = FlowDocument::new(FLOW_A);
    let ws = workspace(&fakes, None).await;
    ws.session().replace(&UserInfo::default()).await;

    assert_eq!(assert_ok!(ws.startup_sync().await), None);
    assert!(fakes.state().drafts.is_empty());

    ws.session().replace(&signed_in()).await;
    let outcome = assert_ok!(ws.startup_sync().await).unwrap();
    assert_eq!(outcome, SyncOutcome::Created { app_id: "101".to_string() });
}

// ============================== EDITOR DEPLOYS ================================ //

#[tokio::test]
async fn test_editor_deploy_is_saved_to_bound_application() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", FLOW_B, None);
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_B);
        state.apps.push(app.clone());
    }
    let ws = workspace(&fakes, Some(app)).await;
    let prompter = RecordingPrompter::default();

    // first look only records the revision
    flow_watcher::check_once(&*fakes, &ws, &prompter).await;
    assert_eq!(ws.binding().await.revision(), Some("rev-0"));
    assert!(fakes.state().updates.is_empty());

    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_A);
        state.rev = Some("rev-9".to_string());
    }
    flow_watcher::check_once(&*fakes, &ws, &prompter).await;

    assert_eq!(fakes.app("1").unwrap().flow_data.as_str(), FLOW_A);
    assert_eq!(ws.binding().await.revision(), Some("rev-9"));
    assert!(prompter.notes.lock().unwrap().is_empty());

    // same revision again: nothing new
    flow_watcher::check_once(&*fakes, &ws, &prompter).await;
    assert_eq!(fakes.state().updates.len(), 1);
}

#[tokio::test]
async fn test_own_deploys_are_not_saved_back() {
    let fakes = Fakes::new();
    fakes.state().apps.push(cloud_app("1", "door", FLOW_A, None));
    let ws = workspace(&fakes, None).await;

    assert_ok!(ws.load("1").await);
    flow_watcher::check_once(&*fakes, &ws, &RecordingPrompter::default()).await;

    assert!(fakes.state().updates.is_empty());
    assert_eq!(ws.binding().await.revision(), Some("rev-1"));
}

#[tokio::test]
async fn test_account_change_is_adopted() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", FLOW_B, None);
    fakes.state().apps.push(app.clone());
    let ws = workspace(&fakes, Some(app)).await;
    let prompter = RecordingPrompter::default();
    flow_watcher::check_once(&*fakes, &ws, &prompter).await;

    {
        let mut state = fakes.state();
        let stored = state.platform_info.as_mut().unwrap();
        stored.user_info.refresh_token = Some("refresh-2".to_string());
        stored.app_info = None;
        state.flow = FlowDocument::new(FLOW_A);
        state.rev = Some("rev-9".to_string());
    }
    flow_watcher::check_once(&*fakes, &ws, &prompter).await;

    assert_eq!(prompter.notes.lock().unwrap().len(), 1);
    assert!(fakes.state().updates.is_empty());
    assert_eq!(ws.session().refresh_token().await.as_deref(), Some("refresh-2"));
    assert_eq!(ws.binding().await.app(), None);
}

#[tokio::test]
async fn test_workspace_follows_application_stored_on_device() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", FLOW_B, None);
    let other = cloud_app("2", "porch", FLOW_A, None);
    fakes.state().apps.push(app.clone());
    let ws = workspace(&fakes, Some(app)).await;
    let prompter = RecordingPrompter::default();
    flow_watcher::check_once(&*fakes, &ws, &prompter).await;

    {
        let mut state = fakes.state();
        state.platform_info.as_mut().unwrap().app_info = Some(other.clone());
        state.rev = Some("rev-9".to_string());
    }
    flow_watcher::check_once(&*fakes, &ws, &prompter).await;

    assert_eq!(prompter.notes.lock().unwrap().len(), 1);
    let binding = ws.binding().await;
    assert_eq!(binding.app(), Some(&other));
    assert_eq!(binding.revision(), Some("rev-9"));
    assert!(fakes.state().updates.is_empty());
}

#[tokio::test]
async fn test_device_is_an_alias_for_local() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", FLOW_B, None);
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_A);
        state.apps.push(app.clone());
    }
    let ws = workspace(&fakes, Some(app)).await;

    let prompter: Box<dyn Prompter> =
        Box::new(FixedPrompter::new(Some("device".parse().unwrap()), false));
    let outcome = assert_ok!(ws.sync(prompter.as_ref()).await);
    assert!(matches!(outcome, SyncOutcome::SavedToCloud { .. }));
    assert_eq!(fakes.app("1").unwrap().flow_data.as_str(), FLOW_A);
}
