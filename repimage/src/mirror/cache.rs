//! Process-wide mirror map cache with background refresh.
//!
//! Readers get an `Arc<MirrorMap>` for the current generation and keep using it
//! for as long as they like; a refresh builds a complete new map off to the side
//! and publishes it with a single pointer swap, so no reader ever sees a mix of
//! two generations.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::error::Result;
use super::map::MirrorMap;
use super::source::{
    DEFAULT_MIRROR_LIST_URL, FileSource, MapOrigin, MappingSource, UrlSource,
};

/// Cache configuration, usually filled in from command line flags.
#[derive(Debug, Clone)]
pub struct MirrorCacheConfig {
    /// Mirror prefix used for the built-in default table.
    pub prefix: String,
    /// Local mapping file, tried first.
    pub file: Option<PathBuf>,
    /// Remote mapping list, tried second.
    pub url: Option<String>,
    /// Zero disables background refresh.
    pub refresh_interval: Duration,
    /// Upper bound for one URL load.
    pub fetch_timeout: Duration,
}

impl Default for MirrorCacheConfig {
    fn default() -> Self {
        Self {
            prefix: "m.daocloud.io".to_string(),
            file: None,
            url: Some(DEFAULT_MIRROR_LIST_URL.to_string()),
            refresh_interval: Duration::from_secs(60 * 60),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// One published cache generation.
#[derive(Debug)]
pub struct CacheGeneration {
    pub map: Arc<MirrorMap>,
    pub origin: MapOrigin,
    pub loaded_at: SystemTime,
}

pub struct MirrorMapCache {
    sources: Vec<Box<dyn MappingSource>>,
    defaults: Arc<MirrorMap>,
    refresh_interval: Duration,
    current: ArcSwap<CacheGeneration>,
    initialized: OnceCell<()>,
    refresher: Mutex<Option<JoinHandle<()>>>,
}

impl MirrorMapCache {
    /// Build the file -> URL -> defaults chain described by `config`.
    pub fn new(config: &MirrorCacheConfig) -> Result<Self> {
        let mut sources: Vec<Box<dyn MappingSource>> = Vec::new();
        if let Some(path) = &config.file {
            sources.push(Box::new(FileSource::new(path.clone())));
        }
        if let Some(url) = &config.url {
            sources.push(Box::new(UrlSource::new(url.clone(), config.fetch_timeout)?));
        }
        Ok(Self::with_sources(
            &config.prefix,
            sources,
            config.refresh_interval,
        ))
    }

    /// Build a cache over an explicit source chain. The built-in defaults for
    /// `prefix` are always the last resort.
    pub fn with_sources(
        prefix: &str,
        sources: Vec<Box<dyn MappingSource>>,
        refresh_interval: Duration,
    ) -> Self {
        let defaults = Arc::new(MirrorMap::defaults_for(prefix));
        let current = ArcSwap::from_pointee(CacheGeneration {
            map: Arc::clone(&defaults),
            origin: MapOrigin::Default,
            loaded_at: SystemTime::now(),
        });
        Self {
            sources,
            defaults,
            refresh_interval,
            current,
            initialized: OnceCell::new(),
            refresher: Mutex::new(None),
        }
    }

    /// Run the first load and start background refresh.
    ///
    /// Runs once per cache no matter how many callers race here; later calls
    /// return immediately, concurrent first calls wait for the one load.
    pub async fn initialize(self: &Arc<Self>) {
        self.initialized
            .get_or_init(|| async {
                self.refresh().await;
                self.spawn_refresher();
            })
            .await;
    }

    /// Current mapping. Initializes the cache on first use, after that this is
    /// a pointer load and never waits on I/O.
    pub async fn get_snapshot(self: &Arc<Self>) -> Arc<MirrorMap> {
        self.initialize().await;
        self.snapshot()
    }

    /// Current mapping without triggering initialization.
    pub fn snapshot(&self) -> Arc<MirrorMap> {
        Arc::clone(&self.current.load().map)
    }

    /// Current generation: map, origin and load time read together.
    pub fn current(&self) -> Arc<CacheGeneration> {
        self.current.load_full()
    }

    pub fn origin(&self) -> MapOrigin {
        self.current.load().origin.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Walk the source chain once and publish the result.
    ///
    /// When every source fails the previous successful generation stays in
    /// place; the built-in defaults are only published if nothing better was
    /// ever loaded.
    pub async fn refresh(&self) -> MapOrigin {
        let (map, origin) = match self.load().await {
            Some(loaded) => loaded,
            None => {
                let previous = self.current.load();
                if previous.origin != MapOrigin::Default {
                    warn!(
                        origin = %previous.origin,
                        entries = previous.map.len(),
                        "All mapping sources failed, keeping previous mirror map"
                    );
                    return previous.origin.clone();
                }
                info!("Using built-in default mirror map");
                (Arc::clone(&self.defaults), MapOrigin::Default)
            }
        };

        let entries = map.len();
        self.current.store(Arc::new(CacheGeneration {
            map,
            origin: origin.clone(),
            loaded_at: SystemTime::now(),
        }));
        info!(origin = %origin, entries, "Mirror map updated");
        origin
    }

    async fn load(&self) -> Option<(Arc<MirrorMap>, MapOrigin)> {
        for source in &self.sources {
            match source.fetch().await {
                Ok(map) => {
                    debug!(origin = %source.origin(), entries = map.len(), "Loaded mirror map");
                    return Some((Arc::new(map), source.origin()));
                }
                Err(e) => {
                    warn!(origin = %source.origin(), error = %e, "Failed to load mirror map");
                }
            }
        }
        None
    }

    fn spawn_refresher(self: &Arc<Self>) {
        if self.refresh_interval.is_zero() {
            info!("Background mirror map refresh disabled");
            return;
        }

        let interval = self.refresh_interval;
        let cache = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.refresh().await;
            }
        });

        info!(interval = ?interval, "Started background mirror map refresh");
        *self
            .refresher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Stop background refresh. The current mapping stays readable.
    pub fn shutdown(&self) {
        let handle = self
            .refresher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!("Stopped background mirror map refresh");
        }
    }
}

impl Drop for MirrorMapCache {
    fn drop(&mut self) {
        if let Some(handle) = self
            .refresher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::error::MirrorError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source that hands out a scripted sequence of results, repeating the last one.
    struct ScriptedSource {
        results: Vec<Option<MirrorMap>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(results: Vec<Option<MirrorMap>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    results,
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    #[async_trait::async_trait]
    impl MappingSource for ScriptedSource {
        fn origin(&self) -> MapOrigin {
            MapOrigin::Url("scripted".to_string())
        }

        async fn fetch(&self) -> Result<MirrorMap> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let index = call.min(self.results.len() - 1);
            self.results[index]
                .clone()
                .ok_or_else(|| MirrorError::Empty("scripted".to_string()))
        }
    }

    fn map_of(pairs: &[(&str, &str)]) -> MirrorMap {
        pairs.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_unreachable_sources_fall_back_to_defaults() {
        let config = MirrorCacheConfig {
            file: Some(PathBuf::from("/nonexistent/file.txt")),
            url: Some("http://127.0.0.1:1/allowlist.txt".to_string()),
            refresh_interval: Duration::ZERO,
            fetch_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let cache = Arc::new(MirrorMapCache::new(&config).unwrap());

        let snapshot = cache.get_snapshot().await;
        assert_eq!(*snapshot, MirrorMap::defaults_for("m.daocloud.io"));
        assert_eq!(snapshot.len(), 6);
        assert_eq!(cache.origin(), MapOrigin::Default);
    }

    #[tokio::test]
    async fn test_file_source_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config-allowlist.txt");
        std::fs::write(
            &path,
            "docker.io=custom.mirror.io/docker.io\ngcr.io=custom.mirror.io/gcr.io\n",
        )
        .unwrap();

        let config = MirrorCacheConfig {
            file: Some(path.clone()),
            url: Some("http://127.0.0.1:1/allowlist.txt".to_string()),
            refresh_interval: Duration::ZERO,
            ..Default::default()
        };
        let cache = Arc::new(MirrorMapCache::new(&config).unwrap());

        let snapshot = cache.get_snapshot().await;
        assert_eq!(snapshot.get("docker.io"), Some("custom.mirror.io/docker.io"));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(cache.origin(), MapOrigin::File(path));
    }

    #[tokio::test]
    async fn test_initialize_runs_once() {
        let (source, calls) = ScriptedSource::new(vec![Some(map_of(&[("docker.io", "a.io/docker.io")]))]);
        let cache = Arc::new(MirrorMapCache::with_sources(
            "m.daocloud.io",
            vec![Box::new(source)],
            Duration::ZERO,
        ));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move { cache.initialize().await }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        cache.initialize().await;
        let _ = cache.get_snapshot().await;

        assert!(cache.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_snapshot_before_initialize_is_defaults() {
        let (source, calls) = ScriptedSource::new(vec![Some(map_of(&[("docker.io", "a.io/docker.io")]))]);
        let cache = MirrorMapCache::with_sources("mirror.local", vec![Box::new(source)], Duration::ZERO);

        assert_eq!(*cache.snapshot(), MirrorMap::defaults_for("mirror.local"));
        assert!(!cache.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_map() {
        let first = map_of(&[("docker.io", "a.io/docker.io")]);
        let (source, _) = ScriptedSource::new(vec![Some(first.clone()), None]);
        let cache = Arc::new(MirrorMapCache::with_sources(
            "m.daocloud.io",
            vec![Box::new(source)],
            Duration::ZERO,
        ));

        assert_eq!(*cache.get_snapshot().await, first);
        let origin = cache.refresh().await;
        assert_eq!(origin, MapOrigin::Url("scripted".to_string()));
        assert_eq!(*cache.snapshot(), first);
    }

    #[tokio::test]
    async fn test_held_snapshot_survives_refresh() {
        let first = map_of(&[("docker.io", "a.io/docker.io")]);
        let second = map_of(&[("quay.io", "b.io/quay.io")]);
        let (source, _) = ScriptedSource::new(vec![Some(first.clone()), Some(second.clone())]);
        let cache = Arc::new(MirrorMapCache::with_sources(
            "m.daocloud.io",
            vec![Box::new(source)],
            Duration::ZERO,
        ));

        let held = cache.get_snapshot().await;
        cache.refresh().await;

        assert_eq!(*held, first);
        assert_eq!(*cache.snapshot(), second);
    }

    #[tokio::test]
    async fn test_background_refresh_runs_on_interval() {
        let (source, calls) = ScriptedSource::new(vec![Some(map_of(&[("docker.io", "a.io/docker.io")]))]);
        let cache = Arc::new(MirrorMapCache::with_sources(
            "m.daocloud.io",
            vec![Box::new(source)],
            Duration::from_millis(20),
        ));

        cache.initialize().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        cache.shutdown();

        let after_shutdown = calls.load(Ordering::SeqCst);
        assert!(after_shutdown >= 3, "only {} loads", after_shutdown);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_shutdown);
    }

    #[tokio::test]
    async fn test_zero_interval_disables_refresh() {
        let (source, calls) = ScriptedSource::new(vec![Some(map_of(&[("docker.io", "a.io/docker.io")]))]);
        let cache = Arc::new(MirrorMapCache::with_sources(
            "m.daocloud.io",
            vec![Box::new(source)],
            Duration::ZERO,
        ));

        cache.initialize().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
