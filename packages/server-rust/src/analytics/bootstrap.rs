//! Periodic creation of the analytics tables.

use std::sync::Arc;

use async_trait::async_trait;
use profile_core::TableSchema;
use tracing::debug;

use super::AnalyticsStore;
use crate::runtime::{BoundedFanOut, ScheduledTask};

/// Ensures every analytics table exists. Creating a table is idempotent, so
/// the scheduler can rerun this forever.
pub struct TableBootstrapTask {
    store: Arc<dyn AnalyticsStore>,
    tables: Vec<TableSchema>,
    fan_out: BoundedFanOut,
}

impl TableBootstrapTask {
    /// Bootstraps the profile, post and friend tables.
    #[must_use]
    pub fn new(store: Arc<dyn AnalyticsStore>, concurrency: usize) -> Self {
        Self::with_tables(store, TableSchema::all(), concurrency)
    }

    #[must_use]
    pub fn with_tables(
        store: Arc<dyn AnalyticsStore>,
        tables: Vec<TableSchema>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            tables,
            fan_out: BoundedFanOut::new(concurrency),
        }
    }
}

#[async_trait]
impl ScheduledTask for TableBootstrapTask {
    fn name(&self) -> &'static str {
        "create_tables"
    }

    async fn run(&self) -> anyhow::Result<()> {
        let store = &self.store;
        self.fan_out
            .run(self.tables.iter().map(|table| store.create_table(table)))
            .await?;
        debug!(store = store.name(), tables = self.tables.len(), "analytics tables ensured");
        Ok(())
    }
}
