//! Pod image mutation.
//!
//! Rewrites every container and init container image of a Pod and answers
//! with a single `replace /spec` JSON Patch when anything changed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use super::error::{AdmissionError, Result};
use super::review::{AdmissionRequest, AdmissionResponse, GroupVersionResource};
use crate::mirror::MirrorMap;
use crate::reference::{RewritePolicy, rewrite_image};

/// Pod as far as mutation is concerned. Unknown fields are carried through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_containers: Vec<Container>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Container {
    pub fn name(&self) -> &str {
        self.other
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// One JSON Patch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchOperation<T> {
    pub op: String,
    pub path: String,
    pub value: T,
}

impl<T> PatchOperation<T> {
    pub fn replace(path: &str, value: T) -> Self {
        Self {
            op: "replace".to_string(),
            path: path.to_string(),
            value,
        }
    }
}

/// Rewrite images of init containers and containers in place, in order.
///
/// Returns how many images changed.
pub fn rewrite_pod_images(spec: &mut PodSpec, map: &MirrorMap, policy: &RewritePolicy) -> usize {
    let mut changed = 0;
    for container in spec
        .init_containers
        .iter_mut()
        .chain(spec.containers.iter_mut())
    {
        let Some(image) = container.image.as_deref().filter(|image| !image.is_empty()) else {
            continue;
        };
        let rewritten = rewrite_image(image, map, policy);
        if rewritten != image {
            info!(
                container = %container.name(),
                from = %image,
                to = %rewritten,
                "Rewriting container image"
            );
            container.image = Some(rewritten);
            changed += 1;
        }
    }
    changed
}

/// Decode a raw Pod, rewrite its images and build the patch document.
///
/// `Ok(None)` means no image changed.
pub fn mutate_pod(raw: &[u8], map: &MirrorMap, policy: &RewritePolicy) -> Result<Option<Vec<u8>>> {
    let mut pod: Pod = serde_json::from_slice(raw).map_err(AdmissionError::Decode)?;

    if rewrite_pod_images(&mut pod.spec, map, policy) == 0 {
        return Ok(None);
    }

    let patch = [PatchOperation::replace("/spec", &pod.spec)];
    serde_json::to_vec(&patch)
        .map(Some)
        .map_err(AdmissionError::PatchEncode)
}

/// Mutation entrypoint for one admission request.
///
/// Never fails: errors come back as a denial with a result message. The
/// request uid is copied to the response.
pub fn admit_pods(
    request: &AdmissionRequest,
    map: &MirrorMap,
    policy: &RewritePolicy,
) -> AdmissionResponse {
    debug!(
        uid = %request.uid,
        namespace = request.namespace.as_deref().unwrap_or_default(),
        "Admitting pod"
    );

    let response = match try_admit_pods(request, map, policy) {
        Ok(Some(patch)) => AdmissionResponse::patched(patch),
        Ok(None) => AdmissionResponse::allow(),
        Err(e) => {
            error!(uid = %request.uid, error = %e, "Pod admission failed");
            AdmissionResponse::from_error(&e)
        }
    };
    response.with_uid(request.uid.clone())
}

fn try_admit_pods(
    request: &AdmissionRequest,
    map: &MirrorMap,
    policy: &RewritePolicy,
) -> Result<Option<Vec<u8>>> {
    let expected = GroupVersionResource::pods();
    if request.resource != expected {
        return Err(AdmissionError::UnexpectedResource {
            expected,
            actual: request.resource.clone(),
        });
    }

    let object = request
        .object
        .as_ref()
        .ok_or(AdmissionError::MissingObject)?;

    mutate_pod(object.get().as_bytes(), map, policy)
}
