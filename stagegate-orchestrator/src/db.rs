use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::config::Config;

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create pipeline table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            last_modified TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Build orders are checked at commit so ranged shifts may pass through
    // transient duplicates
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_stage (
            id BIGSERIAL PRIMARY KEY,
            pipeline_id BIGINT NOT NULL REFERENCES pipeline(id) ON DELETE CASCADE,
            name VARCHAR(255) NOT NULL,
            build_order INTEGER NOT NULL CHECK (build_order > 0),
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            last_modified TIMESTAMPTZ NOT NULL DEFAULT now(),
            CONSTRAINT pipeline_stage_build_order_key UNIQUE (pipeline_id, build_order)
                DEFERRABLE INITIALLY DEFERRED
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_stage_prerequisite (
            id BIGSERIAL PRIMARY KEY,
            pipeline_stage_id BIGINT NOT NULL REFERENCES pipeline_stage(id) ON DELETE CASCADE,
            parameter TEXT NOT NULL,
            expected_value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create action definition tables
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS action (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            description TEXT,
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            last_modified TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS action_parameter (
            id BIGSERIAL PRIMARY KEY,
            action_id BIGINT NOT NULL REFERENCES action(id) ON DELETE CASCADE,
            name VARCHAR(255) NOT NULL,
            type VARCHAR(50) NOT NULL DEFAULT 'string',
            value TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create action placement table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_action (
            id BIGSERIAL PRIMARY KEY,
            pipeline_stage_id BIGINT NOT NULL REFERENCES pipeline_stage(id),
            action_id BIGINT NOT NULL REFERENCES action(id),
            args TEXT NOT NULL DEFAULT '[]',
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            last_modified TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_stage_pipeline_id ON pipeline_stage(pipeline_id, build_order)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_stage_prerequisite_stage_id ON pipeline_stage_prerequisite(pipeline_stage_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_action_stage_id ON pipeline_action(pipeline_stage_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_action_parameter_action_id ON action_parameter(action_id, id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
