//! ClickHouse health checks and schema bootstrap.

use crate::client::{persistence_error, ClickHouseClient};
use crate::schema::{all_tables, create_database};
use pulse_core::Result;
use telemetry::health;
use tracing::{debug, error};

/// Check ClickHouse connection health.
pub async fn check_connection(client: &ClickHouseClient) -> bool {
    match client.inner().query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            debug!("ClickHouse connection healthy");
            health().clickhouse.set_healthy();
            true
        }
        Err(e) => {
            error!("ClickHouse health check failed: {}", e);
            health().clickhouse.set_unhealthy(e.to_string());
            false
        }
    }
}

/// Create the database and every table if missing.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    let database = &client.config().database;

    client
        .server_client()
        .query(&create_database(database))
        .execute()
        .await
        .map_err(|e| persistence_error("create database", e))?;

    for ddl in all_tables() {
        client
            .inner()
            .query(ddl)
            .execute()
            .await
            .map_err(|e| persistence_error("execute DDL", e))?;
    }

    debug!(database = %database, "ClickHouse schema initialized");
    Ok(())
}
