//! In-process snapshot store.

use async_trait::async_trait;
use chrono::Utc;
use meshctx_shared::{AdjacencyList, Result, Snapshot, SnapshotId};
use tokio::sync::RwLock;

use crate::TopologyStore;

/// Keeps snapshots in memory. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: RwLock<Vec<Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[async_trait]
impl TopologyStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn save_snapshot(&self, adjacency_list: &AdjacencyList) -> Result<SnapshotId> {
        let snapshot = Snapshot::capture(adjacency_list.clone(), Utc::now());
        let id = snapshot.id;
        self.snapshots.write().await.push(snapshot);
        Ok(id)
    }

    async fn latest_snapshot(&self) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        // Ties on created_at fall back to the time-ordered id.
        Ok(snapshots
            .iter()
            .max_by_key(|s| (s.created_at, s.id.0))
            .cloned())
    }

    async fn snapshot_count(&self) -> Result<u64> {
        Ok(self.len().await as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshctx_shared::Workload;

    #[tokio::test]
    async fn empty_store_returns_none() {
        let store = MemoryStore::new();
        assert!(store.latest_snapshot().await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn returns_most_recent_snapshot() {
        let store = MemoryStore::new();
        let first: AdjacencyList = [(Workload::from("a"), Workload::from("b"))]
            .into_iter()
            .collect();
        let second: AdjacencyList = [(Workload::from("a"), Workload::from("c"))]
            .into_iter()
            .collect();

        store.save_snapshot(&first).await.unwrap();
        let id = store.save_snapshot(&second).await.unwrap();

        let latest = store.latest_snapshot().await.unwrap().unwrap();
        assert_eq!(latest.id, id);
        assert_eq!(latest.adjacency_list, second);
        assert_eq!(store.len().await, 2);
        assert_eq!(store.snapshot_count().await.unwrap(), 2);
    }
}
