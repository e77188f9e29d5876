use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};

use crate::models::Record;
use crate::testbed::{ResourceKind, Testbed};

/// One consistent view of the published topology. Never mutated after creation;
/// a refresh builds a new snapshot and swaps it in whole.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub sites: Vec<Record>,
    pub hosts: Vec<Record>,
    pub facility_ports: Vec<Record>,
    pub links: Vec<Record>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn records(&self, kind: ResourceKind) -> &[Record] {
        match kind {
            ResourceKind::Sites => &self.sites,
            ResourceKind::Hosts => &self.hosts,
            ResourceKind::FacilityPorts => &self.facility_ports,
            ResourceKind::Links => &self.links,
        }
    }

    fn records_mut(&mut self, kind: ResourceKind) -> &mut Vec<Record> {
        match kind {
            ResourceKind::Sites => &mut self.sites,
            ResourceKind::Hosts => &mut self.hosts,
            ResourceKind::FacilityPorts => &mut self.facility_ports,
            ResourceKind::Links => &mut self.links,
        }
    }
}

/// Shared handle to the latest topology snapshot
#[derive(Clone, Default)]
pub struct ResourceCache {
    current: Arc<RwLock<Arc<Snapshot>>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    /// Cached records of one kind, or `None` when that kind has not been loaded
    pub async fn records(&self, kind: ResourceKind) -> Option<Vec<Record>> {
        let snap = self.snapshot().await;
        let records = snap.records(kind);
        if records.is_empty() {
            None
        } else {
            Some(records.to_vec())
        }
    }

    pub async fn replace(&self, snapshot: Snapshot) {
        *self.current.write().await = Arc::new(snapshot);
    }

    /// Fetch every resource kind and swap in the result. A kind that fails to
    /// load keeps its previous records.
    pub async fn refresh(&self, testbed: &dyn Testbed, max_fetch: usize) -> anyhow::Result<()> {
        let previous = self.snapshot().await;
        let mut next = Snapshot::default();
        let mut failures = 0;

        for &kind in ResourceKind::ALL {
            match testbed.list_resources(None, kind, max_fetch).await {
                Ok(records) => {
                    tracing::debug!("Cached {} {}", records.len(), kind.as_str());
                    *next.records_mut(kind) = records;
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!("Failed to refresh {}: {:#}", kind.as_str(), e);
                    *next.records_mut(kind) = previous.records(kind).to_vec();
                }
            }
        }

        if failures == ResourceKind::ALL.len() {
            return Err(anyhow::anyhow!("all resource fetches failed"));
        }

        next.refreshed_at = Some(Utc::now());
        tracing::info!(
            "Resource cache refreshed: {} sites, {} hosts, {} facility ports, {} links",
            next.sites.len(),
            next.hosts.len(),
            next.facility_ports.len(),
            next.links.len()
        );
        self.replace(next).await;
        Ok(())
    }
}

/// Periodically refreshes a [`ResourceCache`] in the background
pub struct CacheRefresher {
    cache: ResourceCache,
    testbed: Arc<dyn Testbed>,
    interval_secs: u64,
    max_fetch: usize,
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl CacheRefresher {
    pub fn new(
        cache: ResourceCache,
        testbed: Arc<dyn Testbed>,
        interval_secs: u64,
        max_fetch: usize,
    ) -> Self {
        Self {
            cache,
            testbed,
            interval_secs: interval_secs.max(1),
            max_fetch,
            stop_tx: None,
        }
    }

    /// Start refreshing; the first refresh runs immediately
    pub fn start(&mut self) {
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        self.stop_tx = Some(stop_tx);

        let cache = self.cache.clone();
        let testbed = self.testbed.clone();
        let interval_secs = self.interval_secs;
        let max_fetch = self.max_fetch;

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs));

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = cache.refresh(testbed.as_ref(), max_fetch).await {
                            tracing::warn!("Error refreshing resource cache: {}", e);
                        }
                    }
                    _ = &mut stop_rx => {
                        tracing::info!("Cache refresher stopped");
                        break;
                    }
                }
            }
        });
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testbed::fake::FakeTestbed;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn testbed() -> FakeTestbed {
        FakeTestbed::new()
            .with_resources(ResourceKind::Sites, json!([{"name": "STAR"}, {"name": "UCSD"}]))
            .with_resources(ResourceKind::Links, json!([{"name": "link-1"}]))
    }

    #[tokio::test]
    async fn test_refresh_swaps_snapshot() {
        let cache = ResourceCache::new();
        assert!(cache.records(ResourceKind::Sites).await.is_none());

        let before = cache.snapshot().await;
        cache.refresh(&testbed(), 100).await.unwrap();
        let after = cache.snapshot().await;

        assert!(before.sites.is_empty());
        assert_eq!(after.sites.len(), 2);
        assert!(after.refreshed_at.is_some());
        assert_eq!(cache.records(ResourceKind::Links).await.unwrap().len(), 1);
        assert!(cache.records(ResourceKind::Hosts).await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_uses_no_token_and_respects_limit() {
        let tb = testbed();
        let cache = ResourceCache::new();
        cache.refresh(&tb, 1).await.unwrap();
        assert_eq!(cache.snapshot().await.sites.len(), 1);
        assert_eq!(tb.resource_calls.load(Ordering::SeqCst), 4);
        assert!(tb.tokens.lock().unwrap().iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous() {
        let cache = ResourceCache::new();
        cache.refresh(&testbed(), 100).await.unwrap();

        let failing = FakeTestbed::new().failing("down");
        assert!(cache.refresh(&failing, 100).await.is_err());
        assert_eq!(cache.snapshot().await.sites.len(), 2);
    }

    #[tokio::test]
    async fn test_refresher_runs_and_stops() {
        let tb: Arc<FakeTestbed> = Arc::new(testbed());
        let cache = ResourceCache::new();
        let mut refresher = CacheRefresher::new(cache.clone(), tb.clone(), 3600, 50);
        refresher.start();

        for _ in 0..50 {
            if cache.snapshot().await.refreshed_at.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        refresher.stop();
        assert_eq!(cache.snapshot().await.sites.len(), 2);
    }
}
