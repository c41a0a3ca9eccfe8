use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ratify_types::{Draft, DraftStatus, DraftUpdate, Fingerprint, NewDraft};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};

use crate::{DraftStore, Error, new_draft_id};

/// A draft as stored in the database.
#[derive(Debug, FromRow)]
struct DraftRow {
  draft_id: String,
  name: String,
  resource_id: Option<String>,
  content: Json<serde_json::Value>,
  created_by: String,
  updated_by: String,
  status: String,
  process_instance_id: Option<String>,
  base_version: Option<String>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl TryFrom<DraftRow> for Draft {
  type Error = Error;

  fn try_from(row: DraftRow) -> Result<Self, Self::Error> {
    let status = DraftStatus::parse(&row.status).ok_or_else(|| Error::Corrupt {
      draft_id: row.draft_id.clone(),
      message: format!("unknown status '{}'", row.status),
    })?;

    Ok(Draft {
      draft_id: row.draft_id,
      name: row.name,
      resource_id: row.resource_id,
      content: row.content.0,
      created_by: row.created_by,
      updated_by: row.updated_by,
      status,
      process_instance_id: row.process_instance_id,
      base_version: row.base_version.map(Fingerprint::new),
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

/// SQLite-based draft store implementation.
pub struct SqliteDraftStore {
  pool: SqlitePool,
}

impl SqliteDraftStore {
  /// Create a new SQLite draft store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }
}

#[async_trait]
impl DraftStore for SqliteDraftStore {
  async fn get(&self, draft_id: &str) -> Result<Draft, Error> {
    let row: Option<DraftRow> = sqlx::query_as(
      r#"
            SELECT draft_id, name, resource_id, content, created_by, updated_by, status,
                   process_instance_id, base_version, created_at, updated_at
            FROM drafts
            WHERE draft_id = ?
            "#,
    )
    .bind(draft_id)
    .fetch_optional(&self.pool)
    .await?;

    row
      .ok_or_else(|| Error::NotFound(draft_id.to_string()))?
      .try_into()
  }

  async fn create(&self, draft: NewDraft) -> Result<String, Error> {
    let draft_id = new_draft_id();
    let now = Utc::now();

    sqlx::query(
      r#"
            INSERT INTO drafts (draft_id, name, resource_id, content, created_by, updated_by, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&draft_id)
    .bind(&draft.name)
    .bind(&draft.resource_id)
    .bind(Json(&draft.content))
    .bind(&draft.created_by)
    .bind(&draft.created_by)
    .bind(DraftStatus::Draft.as_str())
    .bind(now)
    .bind(now)
    .execute(&self.pool)
    .await?;

    Ok(draft_id)
  }

  async fn update(&self, draft_id: &str, update: &DraftUpdate) -> Result<Draft, Error> {
    let result = sqlx::query(
      r#"
            UPDATE drafts
            SET status = COALESCE(?, status),
                process_instance_id = COALESCE(?, process_instance_id),
                base_version = CASE WHEN ? THEN NULL ELSE COALESCE(?, base_version) END,
                resource_id = CASE WHEN ? THEN NULL ELSE COALESCE(?, resource_id) END,
                content = COALESCE(?, content),
                updated_by = COALESCE(?, updated_by),
                updated_at = ?
            WHERE draft_id = ?
            "#,
    )
    .bind(update.status.map(|s| s.as_str()))
    .bind(&update.process_instance_id)
    .bind(update.detach_resource)
    .bind(update.base_version.as_ref().map(|v| v.as_str().to_string()))
    .bind(update.detach_resource)
    .bind(&update.resource_id)
    .bind(update.content.clone().map(Json))
    .bind(&update.updated_by)
    .bind(Utc::now())
    .bind(draft_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(draft_id.to_string()));
    }

    self.get(draft_id).await
  }

  async fn delete(&self, draft_id: &str) -> Result<(), Error> {
    let result = sqlx::query("DELETE FROM drafts WHERE draft_id = ?")
      .bind(draft_id)
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(draft_id.to_string()));
    }

    Ok(())
  }
}
