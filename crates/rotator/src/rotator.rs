//! Rotator: pool, namespace registry and least-recently-used leasing
//!
//! All state sits behind a single mutex. Every operation takes the lock once
//! and never awaits, so a lease's select-then-stamp is atomic with respect to
//! other leases and to pool or namespace updates.
//!
//! Time is read through `tokio::time::Instant`, which lets tests pause and
//! advance the clock instead of sleeping.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::namespace::{Namespace, NamespaceConfig, Stamp, whole_millis};

/// Key of the namespace that exists from construction and is used when a
/// lease names no namespace.
pub const DEFAULT_NAMESPACE: &str = "_global";

/// Construction-time policy.
#[derive(Debug, Clone, Copy)]
pub struct RotatorSettings {
    /// Cooldown for the default namespace and for namespaces created
    /// without an explicit cooldown.
    pub default_cooldown: Duration,
    /// Upper bound of the random back-dating applied to newly added proxies.
    pub max_jitter: Duration,
}

impl Default for RotatorSettings {
    fn default() -> Self {
        Self {
            default_cooldown: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

struct Registry {
    pool: Vec<String>,
    namespaces: HashMap<String, Namespace>,
}

/// In-memory proxy scheduler with per-namespace cooldowns.
///
/// Share across threads or tasks with `Arc<Rotator>`.
pub struct Rotator {
    registry: Mutex<Registry>,
    settings: RotatorSettings,
    epoch: Instant,
}

impl Default for Rotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Rotator {
    /// Create a rotator with default settings and an empty pool.
    pub fn new() -> Self {
        Self::with_settings(RotatorSettings::default())
    }

    pub fn with_settings(settings: RotatorSettings) -> Self {
        let mut namespaces = HashMap::new();
        namespaces.insert(
            DEFAULT_NAMESPACE.to_string(),
            Namespace::new(settings.default_cooldown),
        );
        info!(
            default_cooldown_ms = whole_millis(settings.default_cooldown),
            "rotator initialized"
        );
        Self {
            registry: Mutex::new(Registry {
                pool: Vec::new(),
                namespaces,
            }),
            settings,
            epoch: Instant::now(),
        }
    }

    /// Replace the proxy pool and reconcile every namespace against it.
    ///
    /// An empty list is ignored and the previous pool is kept, so callers can
    /// pass through optional updates without clearing the pool. Duplicates
    /// collapse to one entry.
    pub fn set_pool<I, S>(&self, proxies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let proxies: Vec<String> = proxies
            .into_iter()
            .map(Into::into)
            .filter(|p| seen.insert(p.clone()))
            .collect();
        if proxies.is_empty() {
            debug!("empty proxy list ignored, keeping current pool");
            return;
        }

        let mut registry = self.lock();
        let now = self.now();
        let Registry { pool, namespaces } = &mut *registry;
        *pool = proxies;

        let (mut added, mut removed) = (0, 0);
        for namespace in namespaces.values_mut() {
            let (a, r) = namespace.reconcile(pool.as_slice(), now, self.settings.max_jitter);
            added = added.max(a);
            removed = removed.max(r);
        }
        crate::metrics::record_pool_size(pool.len());
        info!(proxies = pool.len(), added, removed, "proxy pool replaced");
    }

    /// Create or update a namespace.
    ///
    /// An existing namespace keeps its last-used stamps; only the supplied
    /// policy fields change. Either way the namespace is reconciled against
    /// the current pool.
    pub fn set_namespace(&self, config: NamespaceConfig) {
        let mut registry = self.lock();
        let now = self.now();
        let Registry { pool, namespaces } = &mut *registry;

        let namespace = match namespaces.entry(config.key) {
            Entry::Occupied(entry) => {
                debug!(namespace = %entry.key(), "namespace updated");
                let namespace = entry.into_mut();
                if let Some(cooldown) = config.cooldown {
                    namespace.cooldown = cooldown;
                }
                namespace
            }
            Entry::Vacant(entry) => {
                let cooldown = config.cooldown.unwrap_or(self.settings.default_cooldown);
                info!(
                    namespace = %entry.key(),
                    cooldown_ms = whole_millis(cooldown),
                    "namespace created"
                );
                entry.insert(Namespace::new(cooldown))
            }
        };
        namespace.reconcile(pool.as_slice(), now, self.settings.max_jitter);
    }

    /// Apply `set_namespace` to each config in order.
    pub fn set_namespaces<I>(&self, configs: I)
    where
        I: IntoIterator<Item = NamespaceConfig>,
    {
        for config in configs {
            self.set_namespace(config);
        }
    }

    /// Proxies currently eligible in `namespace`, least recently used first.
    ///
    /// An empty list means the namespace exists but everything is cooling
    /// down. Does not modify any stamps.
    pub fn list_available(&self, namespace: &str) -> Result<Vec<String>> {
        let registry = self.lock();
        let now = self.now();
        let ns = registry
            .namespaces
            .get(namespace)
            .ok_or_else(|| Error::UnknownNamespace(namespace.to_string()))?;
        Ok(ns.eligible(now).into_iter().map(str::to_string).collect())
    }

    /// Lease the least recently used eligible proxy.
    ///
    /// `None` leases from the default namespace. The chosen proxy is stamped
    /// with the current time before the lock is released, so no concurrent
    /// lease in the same namespace can pick it until its cooldown elapses.
    pub fn lease(&self, namespace: Option<&str>) -> Result<String> {
        let key = namespace.unwrap_or(DEFAULT_NAMESPACE);
        let outcome = {
            let mut registry = self.lock();
            let now = self.now();
            match registry.namespaces.get_mut(key) {
                None => Err(Error::UnknownNamespace(key.to_string())),
                Some(ns) => {
                    let least_recent = ns.eligible(now).first().map(|id| id.to_string());
                    match least_recent {
                        Some(proxy) => {
                            ns.stamp(&proxy, now);
                            Ok(proxy)
                        }
                        None => Err(Error::NoAvailableResource {
                            namespace: key.to_string(),
                            retry_after: ns.retry_after(now),
                        }),
                    }
                }
            }
        };

        match &outcome {
            Ok(proxy) => {
                debug!(namespace = key, proxy = %proxy, "proxy leased");
                crate::metrics::record_lease(key, "leased");
            }
            Err(e @ Error::UnknownNamespace(_)) => {
                debug!(namespace = key, error = %e, "lease refused");
                // Caller-supplied keys must not mint new label values
                crate::metrics::record_lease(crate::metrics::UNKNOWN_NAMESPACE, e.label());
            }
            Err(e) => {
                debug!(namespace = key, error = %e, "lease refused");
                crate::metrics::record_lease(key, e.label());
            }
        }
        outcome
    }

    /// Snapshot of the current pool.
    pub fn pool(&self) -> Vec<String> {
        self.lock().pool.clone()
    }

    /// Sorted keys of all configured namespaces, default included.
    pub fn namespaces(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().namespaces.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Cooldown of `namespace`, if it exists.
    pub fn cooldown(&self, namespace: &str) -> Option<Duration> {
        self.lock().namespaces.get(namespace).map(|ns| ns.cooldown)
    }

    /// Status summary for logging or a health endpoint.
    ///
    /// Overall status: every namespace has an eligible proxy → healthy,
    /// some do → degraded, none do (or the pool is empty) → unhealthy.
    pub fn status(&self) -> serde_json::Value {
        let registry = self.lock();
        let now = self.now();

        let mut keys: Vec<&String> = registry.namespaces.keys().collect();
        keys.sort();

        let mut namespaces = Vec::with_capacity(keys.len());
        let mut serviceable = 0usize;
        for key in keys {
            let ns = &registry.namespaces[key];
            let (available, cooling_down) = ns.counts(now);
            if available > 0 {
                serviceable += 1;
            }
            namespaces.push(serde_json::json!({
                "key": key,
                "cooldown_ms": whole_millis(ns.cooldown),
                "available": available,
                "cooling_down": cooling_down
            }));
        }

        let total = registry.namespaces.len();
        let status = if serviceable == total && !registry.pool.is_empty() {
            "healthy"
        } else if serviceable > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": status,
            "proxies_total": registry.pool.len(),
            "namespaces_total": total,
            "namespaces": namespaces
        })
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // Mutations never run caller code under the lock, so a poisoned
        // registry is still consistent.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> Stamp {
        Stamp::from_elapsed(self.epoch.elapsed())
    }
}
