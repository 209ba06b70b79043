//! Mirror mapping: which registry domains are redirected, and to where.

mod cache;
pub mod error;
mod map;
mod source;

pub use cache::{CacheGeneration, MirrorCacheConfig, MirrorMapCache};
pub use error::{MirrorError, Result};
pub use map::{DEFAULT_MIRRORED_DOMAINS, MirrorMap};
pub use source::{DEFAULT_MIRROR_LIST_URL, FileSource, MapOrigin, MappingSource, UrlSource};
