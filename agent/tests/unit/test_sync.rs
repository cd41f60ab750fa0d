//! Reconciliation tests

use tokio_test::{assert_err, assert_ok};

use camsync::errors::AgentError;
use camsync::models::flow::{EngineState, FlowDocument};
use camsync::models::model::ModelDescriptor;
use camsync::sync::equivalence::{flows_equal, models_equal, ReconciliationDecision};
use camsync::sync::prompt::{FixedPrompter, Prefer};
use camsync::sync::reconciler::SyncOutcome;
use camsync::sync::transfer::DownloadOutcome;

use crate::fakes::{cloud_app, local_model, workspace, Fakes, FLOW_A, FLOW_B};

fn device_model(checksum: &str) -> ModelDescriptor {
    ModelDescriptor::new("0", "custom").with_checksum(checksum)
}

#[test]
fn test_empty_flow_representations_are_equivalent() {
    assert!(flows_equal(&FlowDocument::new(""), &FlowDocument::new("[]")));
    assert!(flows_equal(&FlowDocument::new("[]"), &FlowDocument::new("")));
}

#[test]
fn test_model_equivalence() {
    // hosted models match whatever the checksum says
    let hosted = ModelDescriptor::new("10002", "helmet").with_checksum("h1");
    assert!(models_equal(None, Some(&hosted)));
    assert!(models_equal(Some(&device_model("zz")), Some(&hosted)));

    // device models match on checksum only, null included
    assert!(models_equal(Some(&device_model("x1")), Some(&device_model("x1"))));
    assert!(!models_equal(Some(&device_model("x1")), Some(&device_model("x0"))));
    let unsummed = ModelDescriptor::new("0", "custom");
    assert!(models_equal(Some(&unsummed), Some(&unsummed)));
    assert!(models_equal(None, Some(&unsummed)));
}

#[tokio::test]
async fn test_empty_flows_with_same_model_are_in_sync() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", "", Some(ModelDescriptor::new("10002", "helmet")));
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new("[]");
        state.local_model = local_model("x1");
        state.apps.push(app.clone());
    }
    let ws = workspace(&fakes, Some(app.clone())).await;

    let prompter = FixedPrompter::new(Some(Prefer::Local), true);
    let outcome = assert_ok!(ws.sync(&prompter).await);

    assert_eq!(outcome, SyncOutcome::InSync { app_id: "1".to_string() });
    assert_eq!(fakes.app("1").unwrap(), app);
    let state = fakes.state();
    assert!(state.updates.is_empty());
    assert!(state.drafts.is_empty());
    assert!(state.device_uploads.is_empty());
    assert!(state.puts.is_empty());
    assert_eq!(state.deploys, 0);
}

#[tokio::test]
async fn test_overwrite_cloud_takes_local_flow() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", FLOW_B, None);
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_A);
        state.apps.push(app.clone());
    }
    let ws = workspace(&fakes, Some(app)).await;

    let prompter = FixedPrompter::new(Some(Prefer::Local), false);
    let outcome = assert_ok!(ws.sync(&prompter).await);

    assert_eq!(
        outcome,
        SyncOutcome::SavedToCloud {
            app_id: "1".to_string(),
            model_uploaded: false
        }
    );
    assert_eq!(fakes.app("1").unwrap().flow_data.as_str(), FLOW_A);
    // the device keeps running what it ran
    assert_eq!(fakes.state().deploys, 0);
    assert_eq!(
        ws.binding().await.app().unwrap().flow_data.as_str(),
        FLOW_A
    );
}

#[tokio::test]
async fn test_changed_device_model_is_uploaded() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "porch", FLOW_B, Some(device_model("x0")));
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_B);
        state.local_model = local_model("x1");
        state.apps.push(app.clone());
    }
    let ws = workspace(&fakes, Some(app)).await;

    let prompter = FixedPrompter::new(Some(Prefer::Local), false);
    let outcome = assert_ok!(ws.sync(&prompter).await);

    assert_eq!(
        outcome,
        SyncOutcome::SavedToCloud {
            app_id: "1".to_string(),
            model_uploaded: true
        }
    );
    let model = fakes.app("1").unwrap().model_data.unwrap();
    assert_eq!(model.source_url(), Some("https://files.test/custom_1"));
    assert_eq!(model.checksum(), Some("x1"));

    let state = fakes.state();
    assert_eq!(state.upload_targets, vec!["custom_1".to_string()]);
    assert_eq!(
        state.puts,
        vec![("https://upload.test/custom_1".to_string(), b"device-model".len())]
    );
}

#[tokio::test]
async fn test_flow_without_model_node_ignores_device_model() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", "[]", None);
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_A);
        state.local_model = local_model("x1");
        state.apps.push(app.clone());
    }
    // the device model is never asked for
    fakes.fail("get_local_model");
    let ws = workspace(&fakes, Some(app)).await;

    let outcome = assert_ok!(ws.save().await);

    assert_eq!(
        outcome,
        SyncOutcome::SavedToCloud {
            app_id: "1".to_string(),
            model_uploaded: false
        }
    );
    let saved = fakes.app("1").unwrap();
    assert_eq!(saved.flow_data.as_str(), FLOW_A);
    assert_eq!(saved.model_data, None);
    let state = fakes.state();
    assert!(state.upload_targets.is_empty());
    assert!(state.puts.is_empty());
}

#[tokio::test]
async fn test_undecided_mismatch_changes_nothing() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "porch", FLOW_B, Some(device_model("x0")));
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_B);
        state.local_model = local_model("x1");
        state.apps.push(app.clone());
    }
    let ws = workspace(&fakes, Some(app.clone())).await;

    let outcome = assert_ok!(ws.sync(&FixedPrompter::deferred()).await);

    assert_eq!(
        outcome,
        SyncOutcome::NeedsDecision {
            app_id: "1".to_string(),
            decision: ReconciliationDecision::LocalNewer
        }
    );
    assert_eq!(fakes.app("1").unwrap(), app);
    let state = fakes.state();
    assert!(state.updates.is_empty());
    assert!(state.puts.is_empty());
    assert_eq!(state.deploys, 0);
    assert_eq!(state.platform_saves, 0);
}

#[tokio::test]
async fn test_save_twice_is_idempotent() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "porch", "[]", None);
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_B);
        state.local_model = local_model("x1");
        state.apps.push(app.clone());
    }
    let ws = workspace(&fakes, Some(app)).await;

    let first = assert_ok!(ws.save().await);
    assert_eq!(
        first,
        SyncOutcome::SavedToCloud {
            app_id: "1".to_string(),
            model_uploaded: true
        }
    );
    let after_first = fakes.app("1").unwrap();

    let second = assert_ok!(ws.save().await);
    assert_eq!(second, SyncOutcome::InSync { app_id: "1".to_string() });

    assert_eq!(fakes.app("1").unwrap(), after_first);
    let state = fakes.state();
    assert_eq!(state.updates.len(), 1);
    assert_eq!(state.puts.len(), 1);
}

#[tokio::test]
async fn test_failed_put_leaves_cloud_record_alone() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "porch", "[]", Some(device_model("x0")));
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_B);
        state.local_model = local_model("x1");
        state.apps.push(app.clone());
    }
    fakes.fail("put");
    let ws = workspace(&fakes, Some(app.clone())).await;

    let err = assert_err!(ws.save().await);

    assert!(matches!(err, AgentError::NetworkFailure(_)));
    assert_eq!(fakes.app("1").unwrap(), app);
    assert!(fakes.state().updates.is_empty());
    assert_eq!(ws.binding().await.app(), Some(&app));
}

#[tokio::test]
async fn test_failed_device_read_keeps_source_url() {
    let fakes = Fakes::new();
    let hosted = device_model("x0").with_source_url("https://files.test/custom_1");
    let app = cloud_app("1", "porch", FLOW_B, Some(hosted));
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_B);
        state.local_model = local_model("x1");
        state.apps.push(app.clone());
    }
    fakes.fail("get_model_file");
    let ws = workspace(&fakes, Some(app)).await;

    let err = assert_err!(ws.sync(&FixedPrompter::new(Some(Prefer::Local), false)).await);

    assert!(matches!(err, AgentError::NetworkFailure(_)));
    let model = fakes.app("1").unwrap().model_data.unwrap();
    assert_eq!(model.source_url(), Some("https://files.test/custom_1"));
    assert_eq!(model.checksum(), Some("x0"));
    assert!(fakes.state().upload_targets.is_empty());
}

#[tokio::test]
async fn test_overwrite_device_downloads_model() {
    let fakes = Fakes::new();
    let hosted = device_model("x0").with_source_url("https://files.test/custom_1");
    let app = cloud_app("1", "door", FLOW_B, Some(hosted));
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_A);
        state.local_model = local_model("x1");
        state.engine = EngineState::Stop;
        state
            .blobs
            .insert("https://files.test/custom_1".to_string(), b"cloud-model".to_vec());
        state.apps.push(app.clone());
    }
    let ws = workspace(&fakes, Some(app)).await;

    let outcome = assert_ok!(ws.sync(&FixedPrompter::new(Some(Prefer::Cloud), false)).await);

    assert_eq!(
        outcome,
        SyncOutcome::LoadedToDevice {
            app_id: "1".to_string(),
            model: Some(DownloadOutcome::Downloaded)
        }
    );
    let state = fakes.state();
    assert_eq!(state.flow.as_str(), FLOW_B);
    assert_eq!(state.local_model.checksum.as_deref(), Some("x0"));
    assert_eq!(state.engine, EngineState::Start);
    assert!(state.fetched[0].starts_with("https://files.test/custom_1?timestamp="));
    assert_eq!(
        state.device_uploads[0].binary.as_deref(),
        Some(&b"cloud-model"[..])
    );
    assert!(state.updates.is_empty());
    drop(state);

    let binding = ws.binding().await;
    assert_eq!(binding.revision(), Some("rev-1"));
    assert_eq!(binding.app_id(), Some("1"));
}

#[tokio::test]
async fn test_failed_download_leaves_device_alone() {
    let fakes = Fakes::new();
    let hosted = device_model("x0").with_source_url("https://files.test/custom_1");
    let app = cloud_app("1", "door", FLOW_B, Some(hosted));
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_A);
        state.local_model = local_model("x1");
        state.apps.push(app.clone());
    }
    fakes.fail("fetch");
    let ws = workspace(&fakes, Some(app.clone())).await;

    let err = assert_err!(ws.load("1").await);

    assert!(matches!(err, AgentError::NetworkFailure(_)));
    let state = fakes.state();
    assert_eq!(state.flow.as_str(), FLOW_A);
    assert_eq!(state.local_model, local_model("x1"));
    assert!(state.device_uploads.is_empty());
    assert_eq!(state.deploys, 0);
    drop(state);
    assert_eq!(ws.binding().await.app(), Some(&app));
}

#[tokio::test]
async fn test_load_skips_model_already_on_device() {
    let fakes = Fakes::new();
    let hosted = device_model("x1").with_source_url("https://files.test/custom_1");
    let app = cloud_app("1", "porch", FLOW_B, Some(hosted));
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_A);
        state.local_model = local_model("x1");
        state.apps.push(app.clone());
    }
    let ws = workspace(&fakes, None).await;

    let outcome = assert_ok!(ws.load("1").await);

    assert_eq!(
        outcome,
        SyncOutcome::LoadedToDevice {
            app_id: "1".to_string(),
            model: Some(DownloadOutcome::AlreadyPresent)
        }
    );
    let state = fakes.state();
    assert!(state.fetched.is_empty());
    assert!(state.device_uploads.is_empty());
    assert_eq!(state.flow.as_str(), FLOW_B);
    assert_eq!(state.deploys, 1);
}

#[tokio::test]
async fn test_load_model_without_source() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "porch", FLOW_B, Some(ModelDescriptor::new("0", "custom")));
    {
        let mut state = fakes.state();
        state.apps.push(app.clone());
    }
    // without a checksum there is nothing to compare against
    fakes.fail("get_local_model");
    let ws = workspace(&fakes, None).await;

    let outcome = assert_ok!(ws.load("1").await);

    assert_eq!(
        outcome,
        SyncOutcome::LoadedToDevice {
            app_id: "1".to_string(),
            model: Some(DownloadOutcome::NoSource)
        }
    );
    let state = fakes.state();
    assert!(state.fetched.is_empty());
    assert!(state.device_uploads.is_empty());
    assert_eq!(state.flow.as_str(), FLOW_B);
}

#[tokio::test]
async fn test_unsummed_download_skips_device_read() {
    let fakes = Fakes::new();
    let hosted = ModelDescriptor::new("0", "custom").with_source_url("https://files.test/custom_1");
    let app = cloud_app("1", "porch", FLOW_B, Some(hosted));
    {
        let mut state = fakes.state();
        state
            .blobs
            .insert("https://files.test/custom_1".to_string(), b"cloud-model".to_vec());
        state.apps.push(app.clone());
    }
    fakes.fail("get_local_model");
    let ws = workspace(&fakes, None).await;

    let outcome = assert_ok!(ws.load("1").await);

    assert_eq!(
        outcome,
        SyncOutcome::LoadedToDevice {
            app_id: "1".to_string(),
            model: Some(DownloadOutcome::Downloaded)
        }
    );
    assert_eq!(fakes.state().device_uploads.len(), 1);
}

#[tokio::test]
async fn test_unbound_device_creates_application() {
    let fakes = Fakes::new();
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_B);
        state.local_model = local_model("x1");
    }
    let ws = workspace(&fakes, None).await;

    let outcome = assert_ok!(ws.sync(&FixedPrompter::deferred()).await);

    assert_eq!(outcome, SyncOutcome::Created { app_id: "101".to_string() });
    let created = fakes.app("101").unwrap();
    // named after the first tab of the flow
    assert_eq!(created.app_name, "Porch");
    assert_eq!(created.flow_data.as_str(), FLOW_B);
    let model = created.model_data.unwrap();
    assert_eq!(model.source_url(), Some("https://files.test/custom_101"));
    assert_eq!(model.checksum(), Some("x1"));

    assert_eq!(ws.binding().await.app_id(), Some("101"));
    let stored = fakes.state().platform_info.clone().unwrap();
    assert_eq!(stored.app_info.unwrap().app_id, "101");
}

#[tokio::test]
async fn test_vanished_application_is_recreated() {
    let fakes = Fakes::new();
    fakes.state().flow = FlowDocument::new(FLOW_A);
    let gone = cloud_app("7", "old", FLOW_A, None);
    let ws = workspace(&fakes, Some(gone)).await;

    let outcome = assert_ok!(ws.sync(&FixedPrompter::deferred()).await);

    assert_eq!(outcome.app_id(), "101");
    assert_eq!(ws.binding().await.app_id(), Some("101"));
}

#[tokio::test]
async fn test_unreachable_cloud_aborts_sync() {
    let fakes = Fakes::new();
    let app = cloud_app("1", "door", FLOW_B, None);
    fakes.state().apps.push(app.clone());
    fakes.fail("view_app");
    let ws = workspace(&fakes, Some(app.clone())).await;

    let err = assert_err!(ws.sync(&FixedPrompter::deferred()).await);

    assert!(matches!(err, AgentError::NetworkFailure(_)));
    assert!(fakes.state().drafts.is_empty());
    assert_eq!(ws.binding().await.app(), Some(&app));
}
