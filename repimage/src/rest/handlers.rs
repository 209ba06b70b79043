use axum::{Json, body::Bytes, extract::State};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::admission::{AdmissionError, AdmissionResponse, AdmissionReview, admit_pods};
use crate::mirror::MirrorMapCache;
use crate::reference::RewritePolicy;

/// Shared application state
pub struct AppState {
    pub cache: Arc<MirrorMapCache>,
    pub policy: RewritePolicy,
}

/// Handle an AdmissionReview for pods.
///
/// Always answers 200 with an AdmissionReview; failures are reported through
/// the response status message.
pub async fn serve_pods(State(state): State<Arc<AppState>>, body: Bytes) -> Json<AdmissionReview> {
    let response = match AdmissionReview::from_slice(&body) {
        Ok(AdmissionReview {
            request: Some(request),
            ..
        }) => {
            // One snapshot for the whole request, refreshes don't affect it
            let map = state.cache.get_snapshot().await;
            admit_pods(&request, &map, &state.policy)
        }
        Ok(_) => reject(AdmissionError::MissingRequest),
        Err(e) => reject(e),
    };

    info!(
        uid = %response.uid,
        allowed = response.allowed,
        patched = response.patch.is_some(),
        "Sending admission response"
    );

    Json(AdmissionReview::respond(response))
}

fn reject(err: AdmissionError) -> AdmissionResponse {
    error!(error = %err, "Rejecting admission review");
    AdmissionResponse::from_error(&err)
}

/// Liveness probe
pub async fn healthz() -> &'static str {
    "ok"
}

/// Version information
#[derive(Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
}

/// Get service version
pub async fn get_version() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Currently active mirror map
#[derive(Serialize, Deserialize)]
pub struct MirrorsInfo {
    pub origin: String,
    pub loaded_at: String,
    pub entries: BTreeMap<String, String>,
}

/// Show the active mirror map and where it came from
pub async fn get_mirrors(State(state): State<Arc<AppState>>) -> Json<MirrorsInfo> {
    state.cache.initialize().await;
    let current = state.cache.current();
    Json(MirrorsInfo {
        origin: current.origin.to_string(),
        loaded_at: humantime::format_rfc3339_seconds(current.loaded_at).to_string(),
        entries: current.map.to_sorted(),
    })
}
