//! LRU cache of compiled workspace VMs.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use appforge_core::config::VmConfig;
use appforge_core::{ForgeError, Result};
use lru::LruCache;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::instance::VmInstance;
use super::loader::VmCodeLoader;
use super::store::VmStore;

type BuildCell = Arc<OnceCell<Arc<VmInstance>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub entries: usize,
    pub capacity: usize,
    pub builds: u64,
    pub hits: u64,
}

/// Caches `VmInstance`s keyed by `(workspace_id, code_hash)`.
///
/// Concurrent requests for the same key share a single build. `invalidate` is the
/// only way entries leave the cache apart from LRU eviction.
pub struct VmPool {
    store: Arc<VmStore>,
    loader: Arc<dyn VmCodeLoader>,
    config: VmConfig,
    cache: Mutex<LruCache<String, Arc<VmInstance>>>,
    inflight: Mutex<HashMap<String, BuildCell>>,
    /// Bumped on invalidate so builds started earlier are not cached
    generations: Mutex<HashMap<String, u64>>,
    builds: AtomicU64,
    hits: AtomicU64,
}

impl VmPool {
    pub fn new(store: Arc<VmStore>, loader: Arc<dyn VmCodeLoader>, config: VmConfig) -> Self {
        let capacity = NonZeroUsize::new(config.pool_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            loader,
            config,
            cache: Mutex::new(LruCache::new(capacity)),
            inflight: Mutex::new(HashMap::new()),
            generations: Mutex::new(HashMap::new()),
            builds: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<VmStore> {
        &self.store
    }

    fn cache_key(workspace_id: &str, hash: &str) -> String {
        format!("{workspace_id}:{hash}")
    }

    fn generation(&self, workspace_id: &str) -> u64 {
        lock(&self.generations).get(workspace_id).copied().unwrap_or(0)
    }

    /// Returns the VM for the workspace's currently deployed code, building it if needed.
    ///
    /// # Errors
    ///
    /// Propagates loader failures and script compile errors (`ForgeError::Script`).
    pub async fn get_or_create(&self, workspace_id: &str) -> Result<Arc<VmInstance>> {
        let loaded = self.loader.load_code(workspace_id).await?;
        let key = Self::cache_key(workspace_id, &loaded.hash);

        if let Some(vm) = lock(&self.cache).get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(vm));
        }

        let generation = self.generation(workspace_id);
        let cell: BuildCell = {
            // Cache and inflight are checked under the inflight lock, which is also
            // held while a finished build moves from one to the other.
            let mut inflight = lock(&self.inflight);
            if let Some(vm) = lock(&self.cache).get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(vm));
            }
            Arc::clone(inflight.entry(key.clone()).or_default())
        };

        let result = cell
            .get_or_try_init(|| async {
                let store = Arc::clone(&self.store);
                let config = self.config.clone();
                let ws = workspace_id.to_string();
                let code = loaded.code.clone();
                let hash = loaded.hash.clone();
                self.builds.fetch_add(1, Ordering::Relaxed);
                debug!(workspace_id, hash = %hash, "[VmPool] Building VM");
                let built = tokio::task::spawn_blocking(move || {
                    VmInstance::build(store, &ws, &code, &hash, &config)
                })
                .await
                .map_err(|e| ForgeError::internal(format!("VM build task failed: {e}")))?;
                built.map(Arc::new).map_err(ForgeError::from)
            })
            .await
            .cloned();

        {
            let mut inflight = lock(&self.inflight);
            if let Ok(vm) = &result {
                if self.generation(workspace_id) == generation {
                    lock(&self.cache).put(key.clone(), Arc::clone(vm));
                }
            }
            if inflight.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                inflight.remove(&key);
            }
        }

        result
    }

    /// Drops every cached VM of the workspace, whatever its code hash.
    pub fn invalidate(&self, workspace_id: &str) {
        *lock(&self.generations)
            .entry(workspace_id.to_string())
            .or_insert(0) += 1;

        let prefix = format!("{workspace_id}:");
        lock(&self.inflight).retain(|key, _| !key.starts_with(&prefix));

        let mut cache = lock(&self.cache);
        let stale: Vec<String> = cache
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            cache.pop(key);
        }
        info!(workspace_id, removed = stale.len(), "[VmPool] Invalidated workspace VMs");
    }

    pub fn stats(&self) -> PoolStats {
        let cache = lock(&self.cache);
        PoolStats {
            entries: cache.len(),
            capacity: cache.cap().get(),
            builds: self.builds.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }

    pub fn close(&self) {
        lock(&self.cache).clear();
        lock(&self.inflight).clear();
        debug!("[VmPool] Closed");
    }
}
