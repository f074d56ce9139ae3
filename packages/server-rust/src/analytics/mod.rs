//! Analytical store boundary and the table bootstrap task.

pub mod bootstrap;
pub mod clickhouse;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use profile_core::TableSchema;
use tracing::debug;

pub use bootstrap::TableBootstrapTask;
pub use clickhouse::{create_table_sql, ClickHouseStore};

/// Destination for analytics tables.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Creates `schema`'s table unless it already exists.
    async fn create_table(&self, schema: &TableSchema) -> anyhow::Result<()>;
}

/// Stands in when no analytics endpoint is configured. Accepts every table
/// and keeps no state.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledAnalyticsStore;

#[async_trait]
impl AnalyticsStore for DisabledAnalyticsStore {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn create_table(&self, schema: &TableSchema) -> anyhow::Result<()> {
        debug!(table = %schema.name, "analytics disabled, skipping table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_store_accepts_every_table_repeatedly() {
        let store = DisabledAnalyticsStore;
        for _ in 0..3 {
            for schema in TableSchema::all() {
                store.create_table(&schema).await.unwrap();
            }
        }
        assert_eq!(store.name(), "disabled");
        assert_eq!(std::mem::size_of::<DisabledAnalyticsStore>(), 0);
    }
}
