//! HTTP surface of the webhook.

mod handlers;
mod routes;

pub use handlers::{AppState, MirrorsInfo, VersionInfo};
pub use routes::create_router;
