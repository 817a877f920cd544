//! Postgres implementation of the persistence port

use std::ops::DerefMut;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};
use stagegate_core::domain::stage::{Prerequisite, Stage};
use stagegate_core::ordering::OrderShift;

use super::{
    Persistence, StageActionRow, StagePosition, StageRow, StageStatements, StageTransaction,
};
use crate::error::Result;
use crate::repository::{pipeline_repository, stage_repository};

/// Postgres connection, pooled or inside a transaction
pub struct PgSession<C>(C);

pub type PgPooledSession = PgSession<PoolConnection<Postgres>>;
pub type PgTransaction = PgSession<sqlx::Transaction<'static, Postgres>>;

impl<C> PgSession<C>
where
    C: DerefMut<Target = PgConnection>,
{
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.0
    }
}

#[async_trait]
impl<C> StageStatements for PgSession<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    async fn select_stage(&mut self, pipeline_id: i64, stage_id: i64) -> Result<Vec<StageRow>> {
        let rows =
            stage_repository::find_with_prerequisites(self.connection(), pipeline_id, stage_id)
                .await?;
        Ok(rows)
    }

    async fn select_stages(&mut self, pipeline_id: i64) -> Result<Vec<StageRow>> {
        let rows = stage_repository::list_with_prerequisites(self.connection(), pipeline_id).await?;
        Ok(rows)
    }

    async fn select_stage_graph(&mut self, pipeline_id: i64) -> Result<Vec<StageActionRow>> {
        let rows = stage_repository::list_graph(self.connection(), pipeline_id).await?;
        Ok(rows)
    }

    async fn lock_stage(&mut self, stage_id: i64) -> Result<Option<StagePosition>> {
        let position =
            stage_repository::find_position_for_update(self.connection(), stage_id).await?;
        Ok(position)
    }

    async fn select_stage_ids(&mut self, pipeline_id: i64) -> Result<Vec<i64>> {
        let ids = stage_repository::list_ids(self.connection(), pipeline_id).await?;
        Ok(ids)
    }

    async fn count_stages(&mut self, pipeline_id: i64) -> Result<i64> {
        let count = stage_repository::count_by_pipeline(self.connection(), pipeline_id).await?;
        Ok(count)
    }

    async fn insert_stage(
        &mut self,
        pipeline_id: i64,
        name: &str,
        build_order: i32,
    ) -> Result<(i64, chrono::DateTime<chrono::Utc>)> {
        let created =
            stage_repository::create(self.connection(), pipeline_id, name, build_order).await?;
        Ok(created)
    }

    async fn update_stage(&mut self, stage: &Stage) -> Result<bool> {
        let updated = stage_repository::update(self.connection(), stage).await?;
        Ok(updated)
    }

    async fn delete_stage(&mut self, stage_id: i64) -> Result<bool> {
        let deleted = stage_repository::delete(self.connection(), stage_id).await?;
        Ok(deleted)
    }

    async fn delete_pipeline_stages(&mut self, pipeline_id: i64) -> Result<u64> {
        let deleted = stage_repository::delete_by_pipeline(self.connection(), pipeline_id).await?;
        Ok(deleted)
    }

    async fn insert_prerequisites(
        &mut self,
        stage_id: i64,
        prerequisites: &[Prerequisite],
    ) -> Result<()> {
        stage_repository::create_prerequisites(self.connection(), stage_id, prerequisites).await?;
        Ok(())
    }

    async fn delete_prerequisites(&mut self, stage_id: i64) -> Result<u64> {
        let deleted = stage_repository::delete_prerequisites(self.connection(), stage_id).await?;
        Ok(deleted)
    }

    async fn shift_build_orders(&mut self, pipeline_id: i64, shift: OrderShift) -> Result<u64> {
        let shifted =
            stage_repository::shift_build_orders(self.connection(), pipeline_id, shift).await?;
        Ok(shifted)
    }

    async fn touch_pipeline(&mut self, pipeline_id: i64) -> Result<()> {
        if !pipeline_repository::touch_last_modified(self.connection(), pipeline_id).await? {
            tracing::warn!("Pipeline {} not found while updating last_modified", pipeline_id);
        }
        Ok(())
    }
}

#[async_trait]
impl StageTransaction for PgTransaction {
    async fn commit(self) -> Result<()> {
        self.0.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.0.rollback().await?;
        Ok(())
    }
}

/// Persistence backed by a Postgres pool
#[derive(Debug, Clone)]
pub struct PgPersistence {
    pool: PgPool,
}

impl PgPersistence {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Persistence for PgPersistence {
    type Session = PgPooledSession;
    type Transaction = PgTransaction;

    async fn session(&self) -> Result<Self::Session> {
        Ok(PgSession(self.pool.acquire().await?))
    }

    async fn begin(&self) -> Result<Self::Transaction> {
        Ok(PgSession(self.pool.begin().await?))
    }
}
