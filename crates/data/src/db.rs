use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;
use tradegate_core::*;

/// Run embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// A PostgreSQL-backed settings store (`settings` table).
pub struct PostgresSettingsStore {
    pub pool: PgPool,
}

impl PostgresSettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn rows(&self, tenant: TenantId, mainkey: &str, subkey: Option<&str>) -> Result<Vec<(String, String)>, SettingsError> {
        let rows = sqlx::query(
            "SELECT subkey, value
             FROM settings
             WHERE uuid = $1 AND mainkey = $2 AND ($3::TEXT IS NULL OR subkey = $3)
             ORDER BY subkey ASC",
        )
        .bind(tenant.0)
        .bind(mainkey)
        .bind(subkey)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>("subkey"), r.get::<String, _>("value")))
            .collect())
    }
}

fn backend(e: sqlx::Error) -> SettingsError {
    SettingsError::Backend(e.to_string())
}

#[async_trait]
impl SettingsStore for PostgresSettingsStore {
    async fn get(
        &self,
        tenant: TenantId,
        mainkey: &str,
        subkey: Option<&str>,
    ) -> Result<Option<SettingValue>, SettingsError> {
        let tenant = resolve_tenant(tenant, mainkey);
        Ok(collapse_rows(self.rows(tenant, mainkey, subkey).await?))
    }

    async fn entries(&self, tenant: TenantId, mainkey: &str) -> Result<Vec<(String, SettingValue)>, SettingsError> {
        let tenant = resolve_tenant(tenant, mainkey);
        let rows = self.rows(tenant, mainkey, None).await?;
        Ok(rows
            .into_iter()
            .map(|(subkey, raw)| (subkey, SettingValue::decode(&raw)))
            .collect())
    }

    async fn set(
        &self,
        tenant: TenantId,
        mainkey: &str,
        subkey: &str,
        value: &SettingValue,
    ) -> Result<bool, SettingsError> {
        let tenant = resolve_tenant(tenant, mainkey);
        let result = sqlx::query(
            "INSERT INTO settings (uuid, mainkey, subkey, value)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (uuid, mainkey, subkey) DO UPDATE SET value = EXCLUDED.value
             WHERE settings.value IS DISTINCT FROM EXCLUDED.value",
        )
        .bind(tenant.0)
        .bind(mainkey)
        .bind(subkey)
        .bind(value.encode())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        debug!(%tenant, mainkey, subkey, changed = result.rows_affected(), "Setting stored");
        Ok(result.rows_affected() > 0)
    }

    async fn delete(
        &self,
        tenant: TenantId,
        mainkey: &str,
        subkey: Option<&str>,
    ) -> Result<bool, SettingsError> {
        let tenant = resolve_tenant(tenant, mainkey);
        let result = sqlx::query(
            "DELETE FROM settings
             WHERE uuid = $1 AND mainkey = $2 AND ($3::TEXT IS NULL OR subkey = $3)",
        )
        .bind(tenant.0)
        .bind(mainkey)
        .bind(subkey)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }
}
