//! Per-kind resource counts and creation-ordered listings.
//!
//! Every quota-governed table carries `id`, `tenant_id`, and `created_at`.
//! The queries here are the two shapes the billing engine needs: the true
//! unbounded count for admission checks, and the creation-ordered id
//! listing the visibility limiter bounds.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::plan::ResourceKind;

/// Count every record of a kind for a tenant.
///
/// This is the unbounded total, deliberately not the visibility-limited
/// view: admission decisions must see records hidden by a quota cap.
pub async fn count_for_tenant(
    pool: &PgPool,
    kind: ResourceKind,
    tenant_id: Uuid,
) -> Result<i64, DbError> {
    // Table names come from the closed ResourceKind enum, never from input.
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE tenant_id = $1",
        kind.table_name()
    );

    let result: (i64,) = sqlx::query_as(&sql)
        .bind(tenant_id)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)?;

    Ok(result.0)
}

/// List record ids of a kind for a tenant in creation order, oldest first.
///
/// `limit` of `None` returns every row. The `id` tie-break keeps the
/// ordering stable when two rows share a creation timestamp.
pub async fn list_ids_by_creation(
    pool: &PgPool,
    kind: ResourceKind,
    tenant_id: Uuid,
    limit: Option<i64>,
) -> Result<Vec<Uuid>, DbError> {
    let sql = format!(
        "SELECT id FROM {} WHERE tenant_id = $1 ORDER BY created_at ASC, id ASC LIMIT $2",
        kind.table_name()
    );

    // A NULL limit is LIMIT ALL in Postgres.
    let rows: Vec<(Uuid,)> = sqlx::query_as(&sql)
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
