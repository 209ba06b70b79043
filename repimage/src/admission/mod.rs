//! Admission webhook: envelope types and the pod mutation handler.

pub mod error;
pub mod pods;
pub mod review;

pub use error::AdmissionError;
pub use pods::{Container, PatchOperation, Pod, PodSpec, admit_pods, mutate_pod, rewrite_pod_images};
pub use review::{
    AdmissionRequest, AdmissionResponse, AdmissionReview, GroupVersionResource, PatchType, Status,
};
