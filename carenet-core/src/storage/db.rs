use super::Repository;
use crate::error::{CarenetError, Result};
use crate::model::{Entity, EntityKey, ParentKey};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::marker::PhantomData;
use std::path::Path;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .create_if_missing(true),
            )
            .await?;

        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection, since every
    /// `:memory:` connection would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Stores each entity as a JSON document in a table named after its kind.
pub struct SqliteRepository<E: Entity> {
    pool: SqlitePool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> SqliteRepository<E> {
    pub async fn new(db: &Database) -> Result<Self> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                data TEXT NOT NULL
            )
            "#,
            E::KIND
        ))
        .execute(db.pool())
        .await?;

        Ok(Self {
            pool: db.pool().clone(),
            _entity: PhantomData,
        })
    }

    fn decode(rows: Vec<(String,)>) -> Result<Vec<E>> {
        rows.into_iter()
            .map(|(data,)| serde_json::from_str(&data).map_err(CarenetError::from))
            .collect()
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for SqliteRepository<E> {
    async fn find_by_key(&self, key: E::Key) -> Result<Option<E>> {
        let row = sqlx::query_as::<_, (String,)>(&format!(
            "SELECT data FROM {} WHERE id = ?1",
            E::KIND
        ))
        .bind(key.raw())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((data,)) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn find_all(&self) -> Result<Vec<E>> {
        let rows = sqlx::query_as::<_, (String,)>(&format!(
            "SELECT data FROM {} ORDER BY id",
            E::KIND
        ))
        .fetch_all(&self.pool)
        .await?;

        Self::decode(rows)
    }

    async fn find_by_parent(&self, parent: ParentKey) -> Result<Vec<E>> {
        let rows = sqlx::query_as::<_, (String,)>(&format!(
            "SELECT data FROM {} WHERE json_extract(data, ?1) = ?2 ORDER BY id",
            E::KIND
        ))
        .bind(format!("$.{}", parent.field()))
        .bind(parent.raw())
        .fetch_all(&self.pool)
        .await?;

        Self::decode(rows)
    }

    async fn insert(&self, entity: E) -> Result<E> {
        let data = serde_json::to_string(&entity)?;
        let inserted = sqlx::query(&format!(
            "INSERT INTO {} (id, data) VALUES (?1, ?2)",
            E::KIND
        ))
        .bind(entity.key().raw())
        .bind(&data)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(entity),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                CarenetError::Conflict(format!("{} {} already exists", E::KIND, entity.key())),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace(&self, key: E::Key, mut entity: E) -> Result<Option<E>> {
        entity.set_key(key);
        let data = serde_json::to_string(&entity)?;
        let result = sqlx::query(&format!("UPDATE {} SET data = ?1 WHERE id = ?2", E::KIND))
            .bind(&data)
            .bind(key.raw())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            Ok(None)
        } else {
            Ok(Some(entity))
        }
    }

    async fn delete(&self, key: E::Key) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?1", E::KIND))
            .bind(key.raw())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
