//! Persistence port
//!
//! The stage store talks to storage only through these traits. A
//! [`Persistence`] hands out plain sessions for reads and transactions for
//! multi-statement writes; both speak [`StageStatements`]. Every statement
//! binds its values as parameters.
//!
//! All persistence is trait-based so the store can be exercised without a
//! database.

mod postgres;

#[cfg(test)]
pub(crate) mod memory;

pub use postgres::{PgPersistence, PgPooledSession, PgSession, PgTransaction};

use async_trait::async_trait;
use stagegate_core::domain::stage::{Prerequisite, Stage};
use stagegate_core::ordering::OrderShift;

use crate::error::Result;

/// Stage joined with at most one of its prerequisites
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StageRow {
    pub id: i64,
    pub pipeline_id: i64,
    pub name: String,
    pub build_order: i32,
    pub enabled: bool,
    pub last_modified: chrono::DateTime<chrono::Utc>,
    pub parameter: Option<String>,
    pub expected_value: Option<String>,
}

impl StageRow {
    pub fn prerequisite(&self) -> Option<Prerequisite> {
        match (&self.parameter, &self.expected_value) {
            (Some(parameter), Some(expected_value)) => {
                Some(Prerequisite::new(parameter, expected_value))
            }
            _ => None,
        }
    }

    /// Stage without prerequisites or actions
    pub fn to_stage(&self) -> Stage {
        Stage {
            id: self.id,
            pipeline_id: self.pipeline_id,
            name: self.name.clone(),
            build_order: self.build_order,
            enabled: self.enabled,
            last_modified: self.last_modified,
            prerequisites: vec![],
            actions: vec![],
        }
    }
}

/// Stage row further joined with at most one action placement
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StageActionRow {
    #[sqlx(flatten)]
    pub stage: StageRow,
    pub pipeline_action_id: Option<i64>,
    pub action_id: Option<i64>,
    pub action_last_modified: Option<chrono::DateTime<chrono::Utc>>,
    pub action_args: Option<String>,
    pub action_enabled: Option<bool>,
}

/// Placement columns of a graph row, present only when all of them are
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementColumns {
    pub pipeline_action_id: i64,
    pub action_id: i64,
    pub last_modified: chrono::DateTime<chrono::Utc>,
    pub args: String,
    pub enabled: bool,
}

impl StageActionRow {
    pub fn placement(&self) -> Option<PlacementColumns> {
        Some(PlacementColumns {
            pipeline_action_id: self.pipeline_action_id?,
            action_id: self.action_id?,
            last_modified: self.action_last_modified?,
            args: self.action_args.clone()?,
            enabled: self.action_enabled?,
        })
    }
}

/// Persisted placement of a stage, read under a row lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct StagePosition {
    pub pipeline_id: i64,
    pub build_order: i32,
}

/// Statements issued by the stage store
#[async_trait]
pub trait StageStatements: Send {
    /// One row per prerequisite of the stage, or one row without prerequisite
    async fn select_stage(&mut self, pipeline_id: i64, stage_id: i64) -> Result<Vec<StageRow>>;

    /// Rows of every stage, ascending by build order
    async fn select_stages(&mut self, pipeline_id: i64) -> Result<Vec<StageRow>>;

    /// Rows of every stage crossed with its prerequisites and placements,
    /// ordered by build order, action name, placement id
    async fn select_stage_graph(&mut self, pipeline_id: i64) -> Result<Vec<StageActionRow>>;

    /// Lock a stage row for the rest of the transaction and return where it sits
    async fn lock_stage(&mut self, stage_id: i64) -> Result<Option<StagePosition>>;

    async fn select_stage_ids(&mut self, pipeline_id: i64) -> Result<Vec<i64>>;

    async fn count_stages(&mut self, pipeline_id: i64) -> Result<i64>;

    /// Insert an enabled stage, returning generated id and timestamp
    async fn insert_stage(
        &mut self,
        pipeline_id: i64,
        name: &str,
        build_order: i32,
    ) -> Result<(i64, chrono::DateTime<chrono::Utc>)>;

    /// Write name, build order and enabled flag; false if no such stage
    async fn update_stage(&mut self, stage: &Stage) -> Result<bool>;

    async fn delete_stage(&mut self, stage_id: i64) -> Result<bool>;

    async fn delete_pipeline_stages(&mut self, pipeline_id: i64) -> Result<u64>;

    async fn insert_prerequisites(
        &mut self,
        stage_id: i64,
        prerequisites: &[Prerequisite],
    ) -> Result<()>;

    async fn delete_prerequisites(&mut self, stage_id: i64) -> Result<u64>;

    async fn shift_build_orders(&mut self, pipeline_id: i64, shift: OrderShift) -> Result<u64>;

    /// Refresh the owning pipeline's last modification time
    async fn touch_pipeline(&mut self, pipeline_id: i64) -> Result<()>;
}

/// Open transaction; dropping it without commit discards its writes
#[async_trait]
pub trait StageTransaction: StageStatements {
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// Source of sessions and transactions
#[async_trait]
pub trait Persistence: Send + Sync {
    type Session: StageStatements;
    type Transaction: StageTransaction;

    async fn session(&self) -> Result<Self::Session>;

    async fn begin(&self) -> Result<Self::Transaction>;
}
