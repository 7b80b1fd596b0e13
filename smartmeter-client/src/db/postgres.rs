use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use time::PrimitiveDateTime;

use super::{decode_registered, BackendKind, ConnectionConfig, Repository, RepositoryError, Result};
use crate::domain::{format_timestamp, Device, RegisteredDevice, UsageReading};

// Unquoted identifiers fold to lower case, so the usage column is stored as
// `power_usage_kwh`; statements below still spell it the same way as the
// other backends.
const SCHEMA: [&str; 4] = [
    "DROP TABLE IF EXISTS power_usage",
    r#"
    CREATE TABLE power_usage (
        id SERIAL PRIMARY KEY,
        timestamp VARCHAR(50) NOT NULL,
        device_id BIGINT NOT NULL,
        power_usage_kWh DOUBLE PRECISION NOT NULL
    )
    "#,
    "DROP TABLE IF EXISTS device_metadata",
    r#"
    CREATE TABLE device_metadata (
        device_id BIGINT NOT NULL,
        customer_id BIGINT NOT NULL,
        latitude DOUBLE PRECISION,
        longitude DOUBLE PRECISION,
        building_type VARCHAR(50),
        region VARCHAR(50)
    )
    "#,
];

pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(config.host.as_deref().unwrap_or("localhost"))
            .port(config.port.unwrap_or(5432))
            .username(config.user.as_deref().unwrap_or("postgres"))
            .password(config.password.as_deref().unwrap_or(""))
            .database(config.database.as_deref().unwrap_or("test"));

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|source| RepositoryError::Connect {
                backend: BackendKind::Postgres,
                source,
            })?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Repository for PgRepository {
    fn backend(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn reset_schema(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn insert_device(&self, device: &Device) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO device_metadata
                (device_id, customer_id, latitude, longitude, building_type, region)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(i64::from(device.device_id))
        .bind(i64::from(device.customer_id))
        .bind(device.latitude)
        .bind(device.longitude)
        .bind(device.building_type.as_str())
        .bind(&device.region)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_reading(&self, reading: &UsageReading) -> Result<()> {
        sqlx::query("INSERT INTO power_usage (timestamp, device_id, power_usage_kWh) VALUES ($1, $2, $3)")
            .bind(reading.timestamp_iso()?)
            .bind(i64::from(reading.device_id))
            .bind(reading.power_usage_kwh)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_devices(&self) -> Result<Vec<RegisteredDevice>> {
        let rows = sqlx::query_as::<_, (i64, String, Option<String>)>(
            "SELECT device_id, building_type, region FROM device_metadata ORDER BY device_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_registered).collect()
    }

    async fn delete_readings_older_than(&self, cutoff: PrimitiveDateTime) -> Result<u64> {
        let res = sqlx::query("DELETE FROM power_usage WHERE timestamp < $1")
            .bind(format_timestamp(cutoff)?)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn count_readings(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM power_usage")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
