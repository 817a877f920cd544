//! Pipeline Repository
//!
//! Stages only touch their owning pipeline to refresh its freshness stamp.

use sqlx::PgConnection;

/// Bump the pipeline's last modification time
pub async fn touch_last_modified(
    conn: &mut PgConnection,
    pipeline_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE pipeline SET last_modified = now() WHERE id = $1")
        .bind(pipeline_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}
