use anyhow::Context;
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use repimage::config::{parse_ignore_domains, parse_interval, parse_timeout};
use repimage::mirror::DEFAULT_MIRROR_LIST_URL;
use repimage::rest::{AppState, create_router};
use repimage::{MirrorCacheConfig, MirrorMapCache, RewritePolicy};

#[derive(Parser)]
#[command(name = "repimage")]
#[command(about = "Mutating admission webhook that rewrites Pod images to a registry mirror")]
struct Args {
    /// Image mirror prefix
    #[arg(long, env = "REPIMAGE_PREFIX", default_value = "m.daocloud.io")]
    prefix: String,

    /// Comma-separated list of domains to ignore (not replace)
    #[arg(long, env = "REPIMAGE_IGNORE_DOMAINS", default_value = "")]
    ignore_domains: String,

    /// Mapping file (domain=mirror per line), tried before the URL
    #[arg(long, env = "ALLOWLIST_FILE")]
    allowlist_file: Option<PathBuf>,

    /// Mapping list URL
    #[arg(long, env = "ALLOWLIST_URL", default_value = DEFAULT_MIRROR_LIST_URL)]
    allowlist_url: String,

    /// Mapping refresh interval ("0" disables refresh)
    #[arg(long, env = "ALLOWLIST_UPDATE_INTERVAL", default_value = "1h", value_parser = parse_interval)]
    allowlist_update_interval: Duration,

    /// Timeout for one mapping list download
    #[arg(long, env = "ALLOWLIST_FETCH_TIMEOUT", default_value = "30s", value_parser = parse_timeout)]
    allowlist_fetch_timeout: Duration,

    /// Path to TLS certificate file
    #[arg(long, env = "REPIMAGE_CERT", default_value = "./certs/serverCert.pem")]
    cert: PathBuf,

    /// Path to TLS key file
    #[arg(long, env = "REPIMAGE_KEY", default_value = "./certs/serverKey.pem")]
    key: PathBuf,

    /// Listen address
    #[arg(short, long, env = "REPIMAGE_LISTEN", default_value = "[::]:443")]
    listen: SocketAddr,

    /// Serve plain HTTP instead of TLS (for use behind a TLS-terminating proxy)
    #[arg(long, env = "REPIMAGE_PLAIN_HTTP")]
    plain_http: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("repimage=info".parse()?))
        .init();

    let args = Args::parse();

    let ignore_domains = parse_ignore_domains(&args.ignore_domains);
    info!(
        prefix = %args.prefix,
        ignore_domains = ?ignore_domains,
        "Starting repimage"
    );
    let policy = RewritePolicy::new(args.prefix.clone(), ignore_domains);

    // Mirror map cache: first load happens here, before we accept requests
    let cache_config = MirrorCacheConfig {
        prefix: args.prefix.clone(),
        file: args.allowlist_file.clone(),
        url: Some(args.allowlist_url.clone()).filter(|url| !url.is_empty()),
        refresh_interval: args.allowlist_update_interval,
        fetch_timeout: args.allowlist_fetch_timeout,
    };
    let cache = Arc::new(
        MirrorMapCache::new(&cache_config).context("Failed to create mirror map cache")?,
    );
    cache.initialize().await;

    let app_state = Arc::new(AppState {
        cache: Arc::clone(&cache),
        policy,
    });
    let router = create_router(app_state);

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
    });

    if args.plain_http {
        info!("Listening on http://{}", args.listen);
        axum_server::bind(args.listen)
            .handle(handle)
            .serve(router.into_make_service())
            .await
            .context("HTTP server error")?;
    } else {
        // Both ring (reqwest) and aws-lc-rs (axum-server) are linked, pick one explicitly
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            debug!("Process-level rustls crypto provider already installed");
        }
        let tls = RustlsConfig::from_pem_file(&args.cert, &args.key)
            .await
            .with_context(|| {
                format!(
                    "Failed to load TLS material from {} and {}",
                    args.cert.display(),
                    args.key.display()
                )
            })?;
        info!("Listening on https://{}", args.listen);
        axum_server::bind_rustls(args.listen, tls)
            .handle(handle)
            .serve(router.into_make_service())
            .await
            .context("HTTPS server error")?;
    }

    cache.shutdown();
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
