use std::{fmt, str::FromStr};

use serde::Deserialize;
use time::PrimitiveDateTime;

use crate::domain::{Device, RegisteredDevice, UsageReading};

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("failed to connect to {backend}: {source}")]
    Connect {
        backend: BackendKind,
        #[source]
        source: sqlx::Error,
    },
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("cannot render timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
    #[error("invalid row in {table}: {reason}")]
    Decode { table: &'static str, reason: String },
    #[error("{0} support was not compiled into this build")]
    DriverUnavailable(BackendKind),
}

pub type Result<T, E = RepositoryError> = std::result::Result<T, E>;

/// Which relational engine backs the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Mysql,
    #[serde(alias = "postgresql")]
    Postgres,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Mysql => "mysql",
            BackendKind::Postgres => "postgres",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unsupported db type: {0} (expected sqlite, mysql or postgres)")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(BackendKind::Sqlite),
            "mysql" => Ok(BackendKind::Mysql),
            "postgres" | "postgresql" => Ok(BackendKind::Postgres),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// Connection options shared by all backends. Unset fields fall back to the
/// backend's defaults; for SQLite only `database` (the file path) is used.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub port: Option<u16>,
}

impl ConnectionConfig {
    /// Fields set in `other` win.
    pub fn merged_with(mut self, other: ConnectionConfig) -> Self {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.user.is_some() {
            self.user = other.user;
        }
        if other.password.is_some() {
            self.password = other.password;
        }
        if other.database.is_some() {
            self.database = other.database;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        self
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("port", &self.port)
            .finish()
    }
}

/// Storage for device metadata and usage readings.
///
/// Every write is its own committed unit. Implementations hold a single
/// connection; callers drive them sequentially.
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Drop and recreate `power_usage` and `device_metadata`.
    async fn reset_schema(&self) -> Result<()>;

    async fn insert_device(&self, device: &Device) -> Result<()>;

    async fn insert_reading(&self, reading: &UsageReading) -> Result<()>;

    async fn list_devices(&self) -> Result<Vec<RegisteredDevice>>;

    /// Delete every reading with a timestamp strictly before `cutoff`.
    /// Returns the number of rows removed.
    async fn delete_readings_older_than(&self, cutoff: PrimitiveDateTime) -> Result<u64>;

    async fn count_readings(&self) -> Result<u64>;

    async fn close(&self);
}

/// Open a repository for `backend`. Fails before touching any table when the
/// backend is unreachable or was compiled out.
pub async fn connect(backend: BackendKind, config: &ConnectionConfig) -> Result<Box<dyn Repository>> {
    tracing::info!(
        backend = %backend,
        host = config.host.as_deref().unwrap_or("default"),
        database = config.database.as_deref().unwrap_or("default"),
        "connecting to storage"
    );

    match backend {
        BackendKind::Sqlite => connect_sqlite(config).await,
        BackendKind::Mysql => connect_mysql(config).await,
        BackendKind::Postgres => connect_postgres(config).await,
    }
}

#[cfg(feature = "sqlite")]
async fn connect_sqlite(config: &ConnectionConfig) -> Result<Box<dyn Repository>> {
    Ok(Box::new(sqlite::SqliteRepository::connect(config).await?))
}

#[cfg(not(feature = "sqlite"))]
async fn connect_sqlite(_config: &ConnectionConfig) -> Result<Box<dyn Repository>> {
    Err(RepositoryError::DriverUnavailable(BackendKind::Sqlite))
}

#[cfg(feature = "mysql")]
async fn connect_mysql(config: &ConnectionConfig) -> Result<Box<dyn Repository>> {
    Ok(Box::new(mysql::MySqlRepository::connect(config).await?))
}

#[cfg(not(feature = "mysql"))]
async fn connect_mysql(_config: &ConnectionConfig) -> Result<Box<dyn Repository>> {
    Err(RepositoryError::DriverUnavailable(BackendKind::Mysql))
}

#[cfg(feature = "postgres")]
async fn connect_postgres(config: &ConnectionConfig) -> Result<Box<dyn Repository>> {
    Ok(Box::new(postgres::PgRepository::connect(config).await?))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_config: &ConnectionConfig) -> Result<Box<dyn Repository>> {
    Err(RepositoryError::DriverUnavailable(BackendKind::Postgres))
}

/// Narrow a stored integer id back to the domain type.
#[cfg_attr(not(any(feature = "sqlite", feature = "mysql", feature = "postgres")), allow(dead_code))]
fn decode_id(table: &'static str, column: &str, raw: i64) -> Result<u32> {
    u32::try_from(raw).map_err(|_| RepositoryError::Decode {
        table,
        reason: format!("{column} {raw} out of range"),
    })
}

#[cfg_attr(not(any(feature = "sqlite", feature = "mysql", feature = "postgres")), allow(dead_code))]
fn decode_registered(raw: (i64, String, Option<String>)) -> Result<RegisteredDevice> {
    let (device_id, building_type, region) = raw;
    Ok(RegisteredDevice {
        device_id: decode_id("device_metadata", "device_id", device_id)?,
        building_type: building_type.parse().map_err(|e: crate::domain::UnknownBuildingType| RepositoryError::Decode {
            table: "device_metadata",
            reason: e.to_string(),
        })?,
        region,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_selector_accepts_known_names() {
        assert_eq!("sqlite".parse(), Ok(BackendKind::Sqlite));
        assert_eq!("MySQL".parse(), Ok(BackendKind::Mysql));
        assert_eq!("postgresql".parse(), Ok(BackendKind::Postgres));
    }

    #[test]
    fn backend_selector_rejects_unknown_names() {
        assert_eq!(
            "oracle".parse::<BackendKind>(),
            Err(UnknownBackend("oracle".to_string()))
        );
    }

    #[test]
    fn merged_config_prefers_override_fields() {
        let base = ConnectionConfig {
            host: Some("db.internal".to_string()),
            port: Some(5433),
            ..Default::default()
        };
        let merged = base.merged_with(ConnectionConfig {
            port: Some(6000),
            database: Some("meters".to_string()),
            ..Default::default()
        });
        assert_eq!(merged.host.as_deref(), Some("db.internal"));
        assert_eq!(merged.port, Some(6000));
        assert_eq!(merged.database.as_deref(), Some("meters"));
    }

    #[test]
    fn debug_output_hides_password() {
        let cfg = ConnectionConfig {
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }

    #[test]
    fn registered_row_with_unknown_building_is_a_decode_error() {
        let err = decode_registered((1, "warehouse".to_string(), None)).unwrap_err();
        assert!(matches!(err, RepositoryError::Decode { table: "device_metadata", .. }));
    }

    #[test]
    fn negative_ids_are_rejected() {
        assert!(decode_id("device_metadata", "device_id", -1).is_err());
        assert_eq!(decode_id("device_metadata", "device_id", 7).unwrap(), 7);
    }
}
