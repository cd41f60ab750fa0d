//! Local/cloud state comparison
//!
//! Everything here is pure: no I/O, no clock, same inputs same answer.

use serde::Serialize;

use crate::models::app::CloudApplication;
use crate::models::flow::FlowDocument;
use crate::models::model::ModelDescriptor;

/// How local state relates to a cloud application record. Computed per
/// attempt and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationDecision {
    InSync,
    /// Only the device moved since the last bind
    LocalNewer,
    /// Only the cloud record moved since the last bind
    CloudNewer,
    /// Both moved, or there is no bound snapshot to tell
    Conflict,
}

/// `""` and `"[]"` are the same empty flow; anything else compares as text
pub fn flows_equal(a: &FlowDocument, b: &FlowDocument) -> bool {
    if a.is_empty() && b.is_empty() {
        return true;
    }
    a.as_str() == b.as_str()
}

/// Whether the device model matches what `cloud_model` records. Only
/// device-local models are compared, by checksum; a cloud-hosted model is
/// always considered present.
pub fn models_equal(
    local_model: Option<&ModelDescriptor>,
    cloud_model: Option<&ModelDescriptor>,
) -> bool {
    let Some(cloud_model) = cloud_model else {
        return true;
    };
    if !cloud_model.is_local() {
        return true;
    }
    let local_checksum = local_model.and_then(|m| m.checksum());
    local_checksum == cloud_model.checksum()
}

/// Local flow and model against a cloud record
pub fn is_equivalent(
    local_flow: &FlowDocument,
    local_model: Option<&ModelDescriptor>,
    app: &CloudApplication,
) -> bool {
    flows_equal(local_flow, &app.flow_data) && models_equal(local_model, app.model_data.as_ref())
}

/// Classify a mismatch using the snapshot recorded at the last bind
pub fn decide(
    local_flow: &FlowDocument,
    local_model: Option<&ModelDescriptor>,
    app: &CloudApplication,
    bound: Option<&CloudApplication>,
) -> ReconciliationDecision {
    if is_equivalent(local_flow, local_model, app) {
        return ReconciliationDecision::InSync;
    }
    let Some(bound) = bound.filter(|b| b.app_id == app.app_id) else {
        return ReconciliationDecision::Conflict;
    };

    let cloud_unchanged = flows_equal(&app.flow_data, &bound.flow_data)
        && app.model_data.as_ref().map(|m| m.checksum())
            == bound.model_data.as_ref().map(|m| m.checksum());
    let local_unchanged = is_equivalent(local_flow, local_model, bound);

    match (cloud_unchanged, local_unchanged) {
        (true, false) => ReconciliationDecision::LocalNewer,
        (false, true) => ReconciliationDecision::CloudNewer,
        _ => ReconciliationDecision::Conflict,
    }
}
