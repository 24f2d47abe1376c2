//! Device inventory caching
//!
//! Holds at most one inventory snapshot per process. Snapshots are
//! immutable once built and published by swapping an `Arc`, so readers
//! never observe a partially refreshed list. A failed refresh falls back to
//! the previous snapshot (even an expired one) or to an empty list.

use crate::client::{AuthContext, DeviceRecord, Things5Client};
use crate::error::{Result, Things5Error};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Immutable view of the organization's devices at one point in time
#[derive(Debug, Clone)]
pub struct InventorySnapshot {
    /// Devices as returned by the platform
    pub devices: Vec<DeviceRecord>,

    /// Wall-clock time of the fetch
    pub fetched_at: DateTime<Utc>,

    /// Organization the snapshot was fetched for
    pub owner_scope: String,

    loaded_at: Instant,
}

impl InventorySnapshot {
    /// Time since the snapshot was fetched
    pub fn age(&self) -> Duration {
        self.loaded_at.elapsed()
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

/// Cache state report
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheInfo {
    pub cached: bool,
    pub devices: usize,
    pub age_seconds: u64,
    pub expires_in_seconds: u64,
    pub owner_scope: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// TTL cache over the platform's device inventory
pub struct InventoryCache {
    client: Arc<dyn Things5Client>,
    ttl: Duration,
    fetch_timeout: Duration,
    snapshot: RwLock<Option<Arc<InventorySnapshot>>>,
}

impl InventoryCache {
    /// Create a new inventory cache
    pub fn new(client: Arc<dyn Things5Client>, ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            client,
            ttl,
            fetch_timeout,
            snapshot: RwLock::new(None),
        }
    }

    /// Devices visible to the caller, from cache when fresh
    ///
    /// Never fails: fetch errors fall back to the last snapshot or an
    /// empty list.
    pub async fn get_devices(&self, auth: &AuthContext, force: bool) -> Vec<DeviceRecord> {
        self.get_snapshot(auth, force)
            .await
            .map(|snapshot| snapshot.devices.clone())
            .unwrap_or_default()
    }

    /// Current snapshot for the caller's organization, refreshed if stale or forced
    ///
    /// A snapshot fetched for another organization counts as stale and is
    /// never served, not even as a fallback.
    pub async fn get_snapshot(
        &self,
        auth: &AuthContext,
        force: bool,
    ) -> Option<Arc<InventorySnapshot>> {
        let organization_id = match self.bounded(self.client.organization_id(auth)).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Cannot resolve the caller's organization: {}", e.sanitized_message());
                return None;
            }
        };

        let current = self
            .snapshot
            .read()
            .await
            .clone()
            .filter(|snapshot| snapshot.owner_scope == organization_id);

        if let Some(snapshot) = &current {
            if !force && snapshot.is_fresh(self.ttl) {
                debug!("Using cached inventory ({} devices)", snapshot.devices.len());
                return current;
            }
        }

        // Fetch happens outside the lock; concurrent stale readers may fetch twice.
        match self.fetch(auth, organization_id).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                let connected = snapshot.devices.iter().filter(|d| d.is_connected).count();
                info!(
                    "Loaded {} devices for {} ({} connected, {} disconnected)",
                    snapshot.devices.len(),
                    snapshot.owner_scope,
                    connected,
                    snapshot.devices.len() - connected
                );
                *self.snapshot.write().await = Some(snapshot.clone());
                Some(snapshot)
            }
            Err(e) => {
                if let Some(stale) = current {
                    warn!(
                        "Inventory refresh failed, serving stale snapshot ({}s old): {}",
                        stale.age().as_secs(),
                        e.sanitized_message()
                    );
                    Some(stale)
                } else {
                    warn!(
                        "Inventory refresh failed with no snapshot to fall back on: {}",
                        e.sanitized_message()
                    );
                    None
                }
            }
        }
    }

    async fn fetch(&self, auth: &AuthContext, organization_id: String) -> Result<InventorySnapshot> {
        let devices = self
            .bounded(self.client.list_devices(auth, &organization_id))
            .await?;
        Ok(InventorySnapshot {
            devices,
            fetched_at: Utc::now(),
            owner_scope: organization_id,
            loaded_at: Instant::now(),
        })
    }

    /// Run a platform call under the fetch timeout
    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.fetch_timeout, call)
            .await
            .map_err(|_| {
                Things5Error::timeout(format!(
                    "Inventory fetch exceeded {}ms",
                    self.fetch_timeout.as_millis()
                ))
            })?
    }

    /// Discard the snapshot
    pub async fn clear(&self) {
        *self.snapshot.write().await = None;
        info!("Inventory cache cleared");
    }

    /// Report cache state without refreshing
    pub async fn info(&self) -> CacheInfo {
        match self.snapshot.read().await.as_ref() {
            Some(snapshot) => {
                let age = snapshot.age();
                CacheInfo {
                    cached: true,
                    devices: snapshot.devices.len(),
                    age_seconds: age.as_secs(),
                    expires_in_seconds: self.ttl.saturating_sub(age).as_secs(),
                    owner_scope: Some(snapshot.owner_scope.clone()),
                    fetched_at: Some(snapshot.fetched_at),
                }
            }
            None => CacheInfo {
                cached: false,
                devices: 0,
                age_seconds: 0,
                expires_in_seconds: 0,
                owner_scope: None,
                fetched_at: None,
            },
        }
    }

    /// Human-readable inventory listing for agent context
    pub fn summary(devices: &[DeviceRecord]) -> String {
        if devices.is_empty() {
            return "No devices available.".to_string();
        }

        let (connected, disconnected): (Vec<_>, Vec<_>) =
            devices.iter().partition(|d| d.is_connected);

        let mut summary = format!("Available devices ({} total):\n", devices.len());
        for (label, group) in [("Connected", connected), ("Disconnected", disconnected)] {
            if group.is_empty() {
                continue;
            }
            summary.push_str(&format!("\n{} ({}):\n", label, group.len()));
            for device in group {
                summary.push_str(&format!("  - {} ({})\n", device.name, device.serial));
            }
        }
        summary
    }

    /// Devices whose name or serial contains `term`; the first `limit` devices without a term
    pub fn suggest<'a>(
        devices: &'a [DeviceRecord],
        term: Option<&str>,
        limit: usize,
    ) -> Vec<&'a DeviceRecord> {
        let term = term.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty());

        match term {
            None => devices.iter().take(limit).collect(),
            Some(term) => devices
                .iter()
                .filter(|d| {
                    d.name.to_lowercase().contains(&term) || d.serial.to_lowercase().contains(&term)
                })
                .take(limit)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockThings5Client;

    fn device(id: &str, name: &str, connected: bool) -> DeviceRecord {
        DeviceRecord {
            id: id.to_string(),
            name: name.to_string(),
            serial: format!("SN-{id}"),
            is_connected: connected,
            model_ref: None,
            firmware_ref: None,
            active: Some(true),
        }
    }

    fn cache_with(client: Arc<MockThings5Client>) -> InventoryCache {
        InventoryCache::new(client, Duration::from_secs(120), Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_within_ttl() {
        let client = Arc::new(MockThings5Client::new().with_devices(vec![device("1", "Frigo", true)]));
        let cache = cache_with(client.clone());
        let auth = AuthContext::new("token");

        assert_eq!(cache.get_devices(&auth, false).await.len(), 1);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.get_devices(&auth, false).await.len(), 1);
        assert_eq!(client.device_list_calls(), 1);

        cache.get_devices(&auth, true).await;
        assert_eq!(client.device_list_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_after_ttl() {
        let client = Arc::new(MockThings5Client::new().with_devices(vec![device("1", "Frigo", true)]));
        let cache = cache_with(client.clone());
        let auth = AuthContext::new("token");

        cache.get_devices(&auth, false).await;
        tokio::time::advance(Duration::from_secs(121)).await;
        cache.get_devices(&auth, false).await;
        assert_eq!(client.device_list_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fallback_on_failure() {
        let client = Arc::new(MockThings5Client::new().with_devices(vec![device("1", "Frigo", true)]));
        let cache = cache_with(client.clone());
        let auth = AuthContext::new("token");

        cache.get_devices(&auth, false).await;
        tokio::time::advance(Duration::from_secs(300)).await;
        client.set_inventory_failing(true);

        let devices = cache.get_devices(&auth, false).await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_is_not_shared_across_organizations() {
        let client = Arc::new(
            MockThings5Client::new()
                .with_tenant("token-a", "org-a", vec![device("a1", "Frigo A", true)])
                .with_tenant("token-b", "org-b", vec![device("b1", "Frigo B", true)]),
        );
        let cache = cache_with(client.clone());
        let alice = AuthContext::new("token-a");
        let bob = AuthContext::new("token-b");

        assert_eq!(cache.get_devices(&alice, false).await[0].id, "a1");
        let devices = cache.get_devices(&bob, false).await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "b1");
        assert_eq!(client.device_list_calls(), 2);
        assert_eq!(cache.info().await.owner_scope.as_deref(), Some("org-b"));

        // Another organization's snapshot is no fallback either
        client.set_inventory_failing(true);
        assert!(cache.get_devices(&alice, false).await.is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_organization_serves_nothing() {
        let client = Arc::new(MockThings5Client::new().with_devices(vec![device("1", "Frigo", true)]));
        let cache = cache_with(client.clone());
        let auth = AuthContext::new("token");

        assert_eq!(cache.get_devices(&auth, false).await.len(), 1);
        client.set_failing(true);
        assert!(cache.get_devices(&auth, true).await.is_empty());
        assert!(cache.info().await.cached);
    }

    #[tokio::test]
    async fn test_empty_without_snapshot() {
        let client = Arc::new(MockThings5Client::new().with_devices(vec![device("1", "Frigo", true)]));
        client.set_failing(true);
        let cache = cache_with(client);

        assert!(cache.get_devices(&AuthContext::new("token"), false).await.is_empty());
        assert!(!cache.info().await.cached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_info_and_clear() {
        let client = Arc::new(MockThings5Client::new().with_devices(vec![device("1", "Frigo", true)]));
        let cache = cache_with(client);
        let auth = AuthContext::new("token");

        cache.get_devices(&auth, false).await;
        tokio::time::advance(Duration::from_secs(30)).await;

        let info = cache.info().await;
        assert!(info.cached);
        assert_eq!(info.devices, 1);
        assert_eq!(info.age_seconds, 30);
        assert_eq!(info.expires_in_seconds, 90);
        assert_eq!(info.owner_scope.as_deref(), Some("org-1"));

        cache.clear().await;
        assert!(!cache.info().await.cached);
    }

    #[test]
    fn test_summary_and_suggest() {
        let devices = vec![
            device("1", "Frigo Cucina", true),
            device("2", "Forno", false),
            device("3", "Frigo Sala", true),
        ];

        let summary = InventoryCache::summary(&devices);
        assert!(summary.starts_with("Available devices (3 total)"));
        assert!(summary.contains("Connected (2)"));
        assert!(summary.contains("Disconnected (1)"));
        assert!(summary.contains("  - Forno (SN-2)"));
        assert_eq!(InventoryCache::summary(&[]), "No devices available.");

        let hits = InventoryCache::suggest(&devices, Some("frigo"), 5);
        assert_eq!(hits.len(), 2);
        let hits = InventoryCache::suggest(&devices, None, 2);
        assert_eq!(hits.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["1", "2"]);
        assert!(InventoryCache::suggest(&devices, Some("oven"), 5).is_empty());
    }
}
