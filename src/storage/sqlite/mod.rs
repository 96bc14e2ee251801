//! SQLite entity store for prison records.

use std::time::Duration;

use async_trait::async_trait;
use sea_query::{Expr, Query, SqliteQueryBuilder};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::entities::Prison;
use crate::storage::schema::{Prisons, CREATE_PRISON_TABLE};
use crate::storage::{EntityStore, Result, StorageError};

/// SQLite implementation of `EntityStore<Prison>`.
pub struct SqlitePrisonStore {
    pool: SqlitePool,
}

impl SqlitePrisonStore {
    /// Create a new SQLite prison store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `dsn`.
    ///
    /// In-memory databases live and die with their connection, so those get
    /// a single connection that is never recycled.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let options = if dsn.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new()
        };

        let pool = options.connect(dsn).await?;
        Ok(Self::new(pool))
    }

    /// Create the prison table if it does not exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_PRISON_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn encode_id(id: Uuid) -> String {
        id.simple().to_string()
    }

    fn decode_row(row: &SqliteRow) -> Result<Prison> {
        let raw_id: String = row.try_get("id")?;
        let id = Uuid::parse_str(&raw_id)
            .map_err(|e| StorageError::Corrupt(format!("invalid id '{}': {}", raw_id, e)))?;

        Ok(Prison {
            id,
            name_ru: row.try_get("name_ru")?,
            name_ua: row.try_get("name_ua")?,
            subject: row.try_get("subject")?,
            object_type: row.try_get("object_type")?,
            lat: row.try_get("lat")?,
            lon: row.try_get("lon")?,
            address: row.try_get("address")?,
            management: row.try_get("management")?,
            employees_count: row.try_get("employees_count")?,
            prisoners_count: row.try_get("prisoners_count")?,
            staff: row.try_get("staff")?,
            contacts: row.try_get("contacts")?,
        })
    }
}

#[async_trait]
impl EntityStore<Prison> for SqlitePrisonStore {
    async fn create(&self, entity: Prison) -> Result<()> {
        let query = Query::insert()
            .into_table(Prisons::Table)
            .columns(Prisons::COLUMNS)
            .values_panic([
                Self::encode_id(entity.id).into(),
                entity.name_ru.into(),
                entity.name_ua.into(),
                entity.subject.into(),
                entity.object_type.into(),
                entity.lat.into(),
                entity.lon.into(),
                entity.address.into(),
                entity.management.into(),
                entity.employees_count.into(),
                entity.prisoners_count.into(),
                entity.staff.into(),
                entity.contacts.into(),
            ])
            .to_string(SqliteQueryBuilder);

        // Dropping the transaction without commit rolls it back.
        let mut tx = self.pool.begin().await?;
        sqlx::query(&query).execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Prison>> {
        let query = Query::select()
            .columns(Prisons::COLUMNS)
            .from(Prisons::Table)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode_row).collect()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Prison> {
        let query = Query::select()
            .columns(Prisons::COLUMNS)
            .from(Prisons::Table)
            .and_where(Expr::col(Prisons::Id).eq(Self::encode_id(id)))
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).fetch_optional(&self.pool).await? {
            Some(row) => Self::decode_row(&row),
            None => Err(StorageError::NotFound(id)),
        }
    }
}
