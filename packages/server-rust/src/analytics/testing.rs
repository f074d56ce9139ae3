//! Analytics store double shared by the bootstrap and lifecycle tests.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use profile_core::TableSchema;

use super::AnalyticsStore;

/// [`AnalyticsStore`] that only records what it was asked to create.
#[derive(Debug, Default)]
pub(crate) struct RecordingAnalyticsStore {
    created: Mutex<Vec<String>>,
    fail_table: Option<String>,
    delay: Duration,
}

impl RecordingAnalyticsStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes `create_table` fail for the table named `table`.
    pub(crate) fn failing_on(mut self, table: &str) -> Self {
        self.fail_table = Some(table.to_string());
        self
    }

    /// Makes every `create_table` take `delay`.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Table names created so far, in completion order.
    pub(crate) fn created(&self) -> Vec<String> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl AnalyticsStore for RecordingAnalyticsStore {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn create_table(&self, schema: &TableSchema) -> anyhow::Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_table.as_deref() == Some(schema.name.as_str()) {
            anyhow::bail!("table {} rejected", schema.name);
        }
        self.created.lock().push(schema.name.clone());
        Ok(())
    }
}
