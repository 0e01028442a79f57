use async_trait::async_trait;
use keepsake_core::models::ConfigEntry;
use keepsake_core::AppError;
use sqlx::{PgPool, Postgres};

/// Key/value configuration storage. A row with `user_id = NULL` is the
/// system-wide default for its key; a row with a user id overrides that
/// default for one user.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    /// Fetch the value at exactly one scope. Hierarchy resolution (user
    /// value falling back to system value) belongs to the config resolver,
    /// not the repository.
    async fn get(&self, user_id: Option<i64>, key: &str) -> Result<Option<String>, AppError>;

    async fn list(&self, user_id: Option<i64>) -> Result<Vec<ConfigEntry>, AppError>;

    async fn upsert(&self, user_id: Option<i64>, key: &str, value: &str) -> Result<(), AppError>;
}

/// Postgres-backed config repository.
#[derive(Clone)]
pub struct PgConfigRepository {
    pool: PgPool,
}

impl PgConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigRepository for PgConfigRepository {
    async fn get(&self, user_id: Option<i64>, key: &str) -> Result<Option<String>, AppError> {
        let value: Option<String> = sqlx::query_scalar(
            r#"
            SELECT config_value FROM configs
            WHERE config_key = $1 AND user_id IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(key)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn list(&self, user_id: Option<i64>) -> Result<Vec<ConfigEntry>, AppError> {
        let rows: Vec<ConfigEntry> = sqlx::query_as::<Postgres, ConfigEntry>(
            r#"
            SELECT user_id, config_key, config_value FROM configs
            WHERE user_id IS NOT DISTINCT FROM $1
            ORDER BY config_key
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    #[tracing::instrument(skip(self, value), fields(db.table = "configs", db.operation = "upsert", config_key = %key))]
    async fn upsert(&self, user_id: Option<i64>, key: &str, value: &str) -> Result<(), AppError> {
        // NULL user ids keep ON CONFLICT from matching, so update first
        // and insert only when no row was touched.
        let updated = sqlx::query(
            r#"
            UPDATE configs SET config_value = $3
            WHERE config_key = $1 AND user_id IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(key)
        .bind(user_id)
        .bind(value)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                "INSERT INTO configs (user_id, config_key, config_value) VALUES ($1, $2, $3)",
            )
            .bind(user_id)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}
