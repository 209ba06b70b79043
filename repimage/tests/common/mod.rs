//! Shared test utilities for repimage integration tests.

use axum::Router;
use repimage::mirror::MappingSource;
use repimage::rest::{AppState, create_router};
use repimage::{MirrorMapCache, RewritePolicy};
use reqwest::{Client, Response as ReqwestResponse};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub const PREFIX: &str = "m.daocloud.io";

/// Serve `router` on an OS-assigned local port until the returned sender fires.
pub async fn serve(router: Router) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    (addr, shutdown_tx)
}

/// Test server wrapper running the webhook router.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub cache: Arc<MirrorMapCache>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    /// Webhook with the built-in default map and no ignored domains.
    pub async fn spawn() -> Self {
        Self::spawn_with(Vec::new(), &[]).await
    }

    /// Webhook over the given mapping sources and ignore list; refresh disabled.
    pub async fn spawn_with(sources: Vec<Box<dyn MappingSource>>, ignore_domains: &[&str]) -> Self {
        let cache = Arc::new(MirrorMapCache::with_sources(
            PREFIX,
            sources,
            Duration::ZERO,
        ));

        let app_state = Arc::new(AppState {
            cache: Arc::clone(&cache),
            policy: RewritePolicy::new(PREFIX, ignore_domains.iter().copied()),
        });

        let (addr, shutdown_tx) = serve(create_router(app_state)).await;

        Self {
            addr,
            client: Client::new(),
            cache,
            shutdown_tx,
        }
    }

    /// Get base URL for the webhook.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Perform a GET request.
    pub async fn get(&self, path: &str) -> ReqwestResponse {
        self.client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await
            .expect("Request failed")
    }

    /// Perform a POST request with JSON body.
    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> ReqwestResponse {
        self.client
            .post(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    /// Perform a POST request with a raw body.
    pub async fn post_raw(&self, path: &str, body: &'static str) -> ReqwestResponse {
        self.client
            .post(format!("{}{}", self.base_url(), path))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("Request failed")
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        self.cache.shutdown();
    }
}
