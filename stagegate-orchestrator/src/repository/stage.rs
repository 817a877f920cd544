//! Stage Repository
//!
//! SQL statements for stages and their prerequisites. Every function runs on
//! a borrowed connection so the store can group them in one transaction.

use sqlx::{PgConnection, Postgres, QueryBuilder};
use stagegate_core::domain::stage::{Prerequisite, Stage};
use stagegate_core::ordering::OrderShift;

use crate::persistence::{StageActionRow, StagePosition, StageRow};

/// Find one stage joined with its prerequisites (one row per prerequisite)
pub async fn find_with_prerequisites(
    conn: &mut PgConnection,
    pipeline_id: i64,
    stage_id: i64,
) -> Result<Vec<StageRow>, sqlx::Error> {
    sqlx::query_as::<_, StageRow>(
        r#"
        SELECT pipeline_stage.id, pipeline_stage.pipeline_id, pipeline_stage.name,
               pipeline_stage.build_order, pipeline_stage.enabled, pipeline_stage.last_modified,
               pipeline_stage_prerequisite.parameter, pipeline_stage_prerequisite.expected_value
        FROM pipeline_stage
        LEFT OUTER JOIN pipeline_stage_prerequisite
            ON pipeline_stage_prerequisite.pipeline_stage_id = pipeline_stage.id
        WHERE pipeline_stage.pipeline_id = $1
          AND pipeline_stage.id = $2
        ORDER BY pipeline_stage_prerequisite.id ASC
        "#,
    )
    .bind(pipeline_id)
    .bind(stage_id)
    .fetch_all(&mut *conn)
    .await
}

/// List the stages of a pipeline joined with their prerequisites
pub async fn list_with_prerequisites(
    conn: &mut PgConnection,
    pipeline_id: i64,
) -> Result<Vec<StageRow>, sqlx::Error> {
    sqlx::query_as::<_, StageRow>(
        r#"
        SELECT pipeline_stage.id, pipeline_stage.pipeline_id, pipeline_stage.name,
               pipeline_stage.build_order, pipeline_stage.enabled, pipeline_stage.last_modified,
               pipeline_stage_prerequisite.parameter, pipeline_stage_prerequisite.expected_value
        FROM pipeline_stage
        LEFT OUTER JOIN pipeline_stage_prerequisite
            ON pipeline_stage_prerequisite.pipeline_stage_id = pipeline_stage.id
        WHERE pipeline_stage.pipeline_id = $1
        ORDER BY pipeline_stage.build_order ASC, pipeline_stage_prerequisite.id ASC
        "#,
    )
    .bind(pipeline_id)
    .fetch_all(&mut *conn)
    .await
}

/// List stages joined with prerequisites and action placements.
///
/// Action bodies stay out of the join; only placement columns and the
/// definition id are selected.
pub async fn list_graph(
    conn: &mut PgConnection,
    pipeline_id: i64,
) -> Result<Vec<StageActionRow>, sqlx::Error> {
    sqlx::query_as::<_, StageActionRow>(
        r#"
        SELECT stage_r.id, stage_r.pipeline_id, stage_r.name, stage_r.build_order,
               stage_r.enabled, stage_r.last_modified, stage_r.parameter, stage_r.expected_value,
               action_r.id AS pipeline_action_id, action_r.action_id,
               action_r.action_last_modified, action_r.action_args, action_r.action_enabled
        FROM (
            SELECT pipeline_stage.id, pipeline_stage.pipeline_id, pipeline_stage.name,
                   pipeline_stage.build_order, pipeline_stage.enabled, pipeline_stage.last_modified,
                   pipeline_stage_prerequisite.id AS prerequisite_id,
                   pipeline_stage_prerequisite.parameter, pipeline_stage_prerequisite.expected_value
            FROM pipeline_stage
            LEFT OUTER JOIN pipeline_stage_prerequisite
                ON pipeline_stage.id = pipeline_stage_prerequisite.pipeline_stage_id
            WHERE pipeline_stage.pipeline_id = $1
        ) AS stage_r
        LEFT OUTER JOIN (
            SELECT pipeline_action.id, action.id AS action_id, action.name AS action_name,
                   action.last_modified AS action_last_modified,
                   pipeline_action.args AS action_args, pipeline_action.enabled AS action_enabled,
                   pipeline_action.pipeline_stage_id
            FROM action
            JOIN pipeline_action ON pipeline_action.action_id = action.id
        ) AS action_r ON action_r.pipeline_stage_id = stage_r.id
        ORDER BY stage_r.build_order, action_r.action_name, action_r.id, stage_r.prerequisite_id ASC
        "#,
    )
    .bind(pipeline_id)
    .fetch_all(&mut *conn)
    .await
}

/// Lock a stage row and read its pipeline and build order
pub async fn find_position_for_update(
    conn: &mut PgConnection,
    stage_id: i64,
) -> Result<Option<StagePosition>, sqlx::Error> {
    sqlx::query_as::<_, StagePosition>(
        "SELECT pipeline_id, build_order FROM pipeline_stage WHERE id = $1 FOR UPDATE",
    )
    .bind(stage_id)
    .fetch_optional(&mut *conn)
    .await
}

/// Ids of every stage in a pipeline
pub async fn list_ids(conn: &mut PgConnection, pipeline_id: i64) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT id FROM pipeline_stage WHERE pipeline_id = $1 ORDER BY build_order ASC",
    )
    .bind(pipeline_id)
    .fetch_all(&mut *conn)
    .await
}

/// Count the stages of a pipeline
pub async fn count_by_pipeline(
    conn: &mut PgConnection,
    pipeline_id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT count(id) FROM pipeline_stage WHERE pipeline_id = $1")
        .bind(pipeline_id)
        .fetch_one(&mut *conn)
        .await
}

/// Insert an enabled stage row, returning its generated id and timestamp
pub async fn create(
    conn: &mut PgConnection,
    pipeline_id: i64,
    name: &str,
    build_order: i32,
) -> Result<(i64, chrono::DateTime<chrono::Utc>), sqlx::Error> {
    sqlx::query_as::<_, (i64, chrono::DateTime<chrono::Utc>)>(
        r#"
        INSERT INTO pipeline_stage (pipeline_id, name, build_order, enabled)
        VALUES ($1, $2, $3, TRUE)
        RETURNING id, last_modified
        "#,
    )
    .bind(pipeline_id)
    .bind(name)
    .bind(build_order)
    .fetch_one(&mut *conn)
    .await
}

/// Update name, build order and enabled flag of a stage
pub async fn update(conn: &mut PgConnection, stage: &Stage) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE pipeline_stage
        SET name = $1, build_order = $2, enabled = $3, last_modified = now()
        WHERE id = $4
        "#,
    )
    .bind(&stage.name)
    .bind(stage.build_order)
    .bind(stage.enabled)
    .bind(stage.id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a stage row
pub async fn delete(conn: &mut PgConnection, stage_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM pipeline_stage WHERE id = $1")
        .bind(stage_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete every stage row of a pipeline
pub async fn delete_by_pipeline(
    conn: &mut PgConnection,
    pipeline_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM pipeline_stage WHERE pipeline_id = $1")
        .bind(pipeline_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// Insert the prerequisites of a stage in one statement
pub async fn create_prerequisites(
    conn: &mut PgConnection,
    stage_id: i64,
    prerequisites: &[Prerequisite],
) -> Result<(), sqlx::Error> {
    if prerequisites.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO pipeline_stage_prerequisite (pipeline_stage_id, parameter, expected_value) ",
    );
    builder.push_values(prerequisites, |mut row, prerequisite| {
        row.push_bind(stage_id)
            .push_bind(prerequisite.parameter.clone())
            .push_bind(prerequisite.expected_value.clone());
    });
    builder.build().execute(&mut *conn).await?;

    Ok(())
}

/// Delete every prerequisite of a stage
pub async fn delete_prerequisites(
    conn: &mut PgConnection,
    stage_id: i64,
) -> Result<u64, sqlx::Error> {
    tracing::debug!("Deleting prerequisites for stage {}", stage_id);

    let result = sqlx::query("DELETE FROM pipeline_stage_prerequisite WHERE pipeline_stage_id = $1")
        .bind(stage_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// Shift the build order of every stage of the pipeline inside the range
pub async fn shift_build_orders(
    conn: &mut PgConnection,
    pipeline_id: i64,
    shift: OrderShift,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE pipeline_stage
        SET build_order = build_order + $1, last_modified = now()
        WHERE pipeline_id = $2
          AND build_order >= $3
          AND build_order <= $4
        "#,
    )
    .bind(shift.delta)
    .bind(pipeline_id)
    .bind(shift.first)
    .bind(shift.last)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
