//! In-memory history store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{HistoryError, HistoryRecord, HistoryStore, RunSummary, TimeRange};

type RunKey = (String, i64);

/// History kept in process memory. Lost on restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistoryStore {
    runs: Arc<RwLock<HashMap<RunKey, Vec<HistoryRecord>>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, record: HistoryRecord) -> Result<(), HistoryError> {
        let mut runs = self.runs.write().await;
        let records = runs
            .entry((record.migration_id.clone(), record.start_time))
            .or_default();

        match records.binary_search_by_key(&record.seq, |r| r.seq) {
            Ok(pos) if records[pos].same_checkpoint(&record) => Ok(()),
            Ok(_) => Err(record.conflict()),
            Err(pos) => {
                records.insert(pos, record);
                Ok(())
            }
        }
    }

    async fn query(
        &self,
        migration_id: &str,
        range: TimeRange,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let runs = self.runs.read().await;

        let mut keys: Vec<&RunKey> = runs
            .keys()
            .filter(|(id, start)| id == migration_id && range.contains(*start))
            .collect();
        keys.sort_by_key(|(_, start)| *start);

        Ok(keys
            .into_iter()
            .filter_map(|key| runs.get(key))
            .flat_map(|records| records.iter().cloned())
            .collect())
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunSummary>, HistoryError> {
        let runs = self.runs.read().await;

        let mut summaries: Vec<RunSummary> = runs
            .iter()
            .filter_map(|((migration_id, start_time), records)| {
                records.first().map(|r| RunSummary {
                    migration_id: migration_id.clone(),
                    start_time: *start_time,
                    viewer_domain: r.viewer_domain.clone(),
                })
            })
            .collect();

        summaries.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| a.migration_id.cmp(&b.migration_id))
        });
        summaries.truncate(limit);
        Ok(summaries)
    }
}
