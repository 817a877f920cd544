//! Action Repository
//!
//! Reads shared action definitions and removes stage placements.

use sqlx::{PgConnection, PgPool};
use stagegate_core::domain::action::{ActionDefinition, Parameter};

/// Find an action definition with its default parameters
pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<ActionDefinition>, sqlx::Error> {
    let Some(row) = sqlx::query_as::<_, ActionRow>(
        r#"
        SELECT id, name, description, enabled, last_modified
        FROM action
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let parameters = sqlx::query_as::<_, ParameterRow>(
        r#"
        SELECT name, type, value, description
        FROM action_parameter
        WHERE action_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(Some(ActionDefinition {
        id: row.id,
        name: row.name,
        description: row.description,
        enabled: row.enabled,
        last_modified: row.last_modified,
        parameters: parameters.into_iter().map(|r| r.into()).collect(),
    }))
}

/// Delete every action placement of a stage
pub async fn delete_placements_by_stage(
    conn: &mut PgConnection,
    stage_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM pipeline_action WHERE pipeline_stage_id = $1")
        .bind(stage_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ActionRow {
    id: i64,
    name: String,
    description: Option<String>,
    enabled: bool,
    last_modified: chrono::DateTime<chrono::Utc>,
}

#[derive(sqlx::FromRow)]
struct ParameterRow {
    name: String,
    #[sqlx(rename = "type")]
    param_type: String,
    value: String,
    description: String,
}

impl From<ParameterRow> for Parameter {
    fn from(row: ParameterRow) -> Self {
        Parameter {
            name: row.name,
            param_type: row.param_type,
            value: row.value,
            description: row.description,
        }
    }
}
