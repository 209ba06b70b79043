//! repimage: mutating admission webhook that redirects Pod image pulls
//! through a registry mirror.
//!
//! # Example
//! ```ignore
//! use repimage::{MirrorMap, RewritePolicy, rewrite_image};
//!
//! let map = MirrorMap::defaults_for("m.daocloud.io");
//! let policy = RewritePolicy::new("m.daocloud.io", ["quay.io"]);
//! assert_eq!(
//!     rewrite_image("nginx", &map, &policy),
//!     "m.daocloud.io/docker.io/library/nginx"
//! );
//! ```

pub mod admission;
pub mod config;
pub mod mirror;
pub mod reference;
pub mod rest;

pub use admission::{AdmissionError, AdmissionResponse, AdmissionReview, admit_pods};
pub use mirror::{MirrorCacheConfig, MirrorError, MirrorMap, MirrorMapCache};
pub use reference::{RewritePolicy, rewrite_image};
