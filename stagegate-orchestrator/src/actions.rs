//! Action collaborators
//!
//! Action definitions and their placements are managed elsewhere. The stage
//! core only hydrates definitions by id and removes the placements of a
//! stage it deletes.

use std::ops::DerefMut;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use stagegate_core::domain::action::ActionDefinition;

use crate::error::{Result, StageError};
use crate::persistence::PgSession;
use crate::repository::action_repository;

/// Read access to shared action definitions
#[async_trait]
pub trait ActionDefinitions: Send + Sync {
    /// Load a definition with its default parameters
    async fn load_action_by_id(&self, action_id: i64) -> Result<ActionDefinition>;
}

/// Removal of action placements, run inside the caller's transaction
#[async_trait]
pub trait ActionPlacements<Tx: Send>: Send + Sync {
    /// Delete every placement of a stage on behalf of `actor_id`
    async fn delete_by_stage(&self, tx: &mut Tx, stage_id: i64, actor_id: i64) -> Result<()>;
}

/// Action definitions read from Postgres
#[derive(Debug, Clone)]
pub struct PgActionDefinitions {
    pool: PgPool,
}

impl PgActionDefinitions {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActionDefinitions for PgActionDefinitions {
    async fn load_action_by_id(&self, action_id: i64) -> Result<ActionDefinition> {
        action_repository::find_by_id(&self.pool, action_id)
            .await?
            .ok_or(StageError::ActionNotFound(action_id))
    }
}

/// Placement removal through the stage transaction's connection
#[derive(Debug, Clone, Copy, Default)]
pub struct PgActionPlacements;

#[async_trait]
impl<C> ActionPlacements<PgSession<C>> for PgActionPlacements
where
    C: DerefMut<Target = PgConnection> + Send,
{
    async fn delete_by_stage(
        &self,
        tx: &mut PgSession<C>,
        stage_id: i64,
        actor_id: i64,
    ) -> Result<()> {
        let removed =
            action_repository::delete_placements_by_stage(tx.connection(), stage_id).await?;

        tracing::info!(
            stage_id,
            actor_id,
            removed,
            "Action placements deleted"
        );

        Ok(())
    }
}
