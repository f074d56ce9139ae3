//! `ClickHouse` over its HTTP interface.

use async_trait::async_trait;
use profile_core::TableSchema;
use tracing::info;

use super::AnalyticsStore;
use crate::service::config::AnalyticsConfig;

/// DDL that creates `schema` as a `MergeTree` table if it is missing.
#[must_use]
pub fn create_table_sql(schema: &TableSchema) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}) ENGINE = MergeTree() ORDER BY tuple()",
        schema.name,
        schema.column_list()
    )
}

/// Runs statements against one `ClickHouse` database.
#[derive(Debug, Clone)]
pub struct ClickHouseStore {
    client: reqwest::Client,
    url: String,
    database: String,
    user: String,
    password: String,
}

impl ClickHouseStore {
    /// Returns `None` when no endpoint is configured.
    #[must_use]
    pub fn from_config(config: &AnalyticsConfig) -> Option<Self> {
        let url = config.url.as_ref()?;
        Some(Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    /// Sends one statement as the request body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server answers with a
    /// non-success status; the server's message is included.
    pub async fn execute(&self, sql: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .post(format!("{}/", self.url))
            .query(&[("database", self.database.as_str())])
            .basic_auth(&self.user, Some(&self.password))
            .body(sql.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("ClickHouse returned {status}: {}", body.trim());
        }
        Ok(())
    }
}

#[async_trait]
impl AnalyticsStore for ClickHouseStore {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    async fn create_table(&self, schema: &TableSchema) -> anyhow::Result<()> {
        self.execute(&create_table_sql(schema)).await?;
        info!(table = %schema.name, "analytics table ensured");
        Ok(())
    }
}
