//! Stage Store
//!
//! Owns stage and prerequisite records and keeps the build orders of a
//! pipeline dense over `1..=N`. Every write that touches more than one row
//! runs in a single transaction and is rolled back on the first error.

use std::sync::Arc;

use stagegate_core::domain::stage::Stage;
use stagegate_core::dto::stage::CreateStage;
use stagegate_core::ordering::OrderShift;

use crate::actions::ActionPlacements;
use crate::error::{Result, StageError};
use crate::persistence::{
    Persistence, StageActionRow, StagePosition, StageStatements, StageTransaction,
};
use crate::service::composition::group_stages;

pub struct StageStore<P: Persistence> {
    persistence: P,
    placements: Arc<dyn ActionPlacements<P::Transaction>>,
}

impl<P: Persistence> StageStore<P> {
    pub fn new(persistence: P, placements: Arc<dyn ActionPlacements<P::Transaction>>) -> Self {
        Self {
            persistence,
            placements,
        }
    }

    /// Get a stage with its prerequisites
    pub async fn load_stage(&self, pipeline_id: i64, stage_id: i64) -> Result<Stage> {
        let mut session = self.persistence.session().await?;
        let rows = session.select_stage(pipeline_id, stage_id).await?;

        group_stages(&rows)
            .into_iter()
            .next()
            .ok_or(StageError::StageNotFound {
                pipeline_id,
                stage_id,
            })
    }

    /// List the stages of a pipeline in build order
    pub async fn load_all_stages(&self, pipeline_id: i64) -> Result<Vec<Stage>> {
        let mut session = self.persistence.session().await?;
        let rows = session.select_stages(pipeline_id).await?;
        Ok(group_stages(&rows))
    }

    /// Flattened stage, prerequisite and placement rows of a pipeline
    pub async fn load_graph_rows(&self, pipeline_id: i64) -> Result<Vec<StageActionRow>> {
        let mut session = self.persistence.session().await?;
        session.select_stage_graph(pipeline_id).await
    }

    pub async fn count_stages(&self, pipeline_id: i64) -> Result<i64> {
        let mut session = self.persistence.session().await?;
        session.count_stages(pipeline_id).await
    }

    /// Append a new enabled stage at the end of its pipeline
    pub async fn insert_stage(&self, req: CreateStage) -> Result<Stage> {
        validate_stage_name(&req.name)?;

        let mut tx = self.persistence.begin().await?;
        let outcome = insert_in(&mut tx, req).await;
        let stage = settle(tx, outcome).await?;

        tracing::info!(
            "Stage created: {} ({}) at position {} of pipeline {}",
            stage.name,
            stage.id,
            stage.build_order,
            stage.pipeline_id
        );

        Ok(stage)
    }

    /// Persist name, build order and enabled flag, then replace prerequisites.
    ///
    /// The build order must stay within `1..=count`; reordering without
    /// duplicates goes through [`StageStore::move_stage`].
    pub async fn update_stage(&self, stage: &Stage) -> Result<()> {
        validate_stage_name(&stage.name)?;

        let mut tx = self.persistence.begin().await?;
        let outcome = update_in(&mut tx, stage).await;
        settle(tx, outcome).await?;

        tracing::info!("Stage updated: {} ({})", stage.name, stage.id);

        Ok(())
    }

    /// Delete a stage and close the gap it leaves in the build order
    pub async fn delete_stage(&self, stage: &Stage, actor_id: i64) -> Result<()> {
        let mut tx = self.persistence.begin().await?;
        let outcome = self.delete_in(&mut tx, stage, actor_id).await;
        settle(tx, outcome).await?;

        tracing::info!(
            "Stage deleted: {} ({}) from pipeline {} by {}",
            stage.name,
            stage.id,
            stage.pipeline_id,
            actor_id
        );

        Ok(())
    }

    /// Delete every stage of a pipeline, returning how many were removed
    pub async fn delete_all_stages(&self, pipeline_id: i64, actor_id: i64) -> Result<u64> {
        let mut tx = self.persistence.begin().await?;
        let outcome = self.delete_all_in(&mut tx, pipeline_id, actor_id).await;
        let deleted = settle(tx, outcome).await?;

        tracing::info!(
            "Deleted {} stages from pipeline {} by {}",
            deleted,
            pipeline_id,
            actor_id
        );

        Ok(deleted)
    }

    /// Move a stage to `new_build_order`, shifting the stages in between.
    ///
    /// Moving a stage onto its own position writes nothing. Otherwise the
    /// shift is computed from the persisted position, not from `stage`.
    pub async fn move_stage(&self, stage: &Stage, new_build_order: i32) -> Result<Stage> {
        if stage.build_order == new_build_order {
            tracing::debug!("Stage {} already at position {}", stage.id, new_build_order);
            return Ok(stage.clone());
        }

        let mut tx = self.persistence.begin().await?;
        let outcome = move_in(&mut tx, stage, new_build_order).await;
        let moved = settle(tx, outcome).await?;

        tracing::info!(
            "Stage moved: {} ({}) from position {} to {}",
            stage.name,
            stage.id,
            stage.build_order,
            new_build_order
        );

        Ok(moved)
    }

    async fn delete_in(&self, tx: &mut P::Transaction, stage: &Stage, actor_id: i64) -> Result<()> {
        let position = locate(tx, stage).await?;
        let count = tx.count_stages(position.pipeline_id).await?;

        self.placements
            .delete_by_stage(tx, stage.id, actor_id)
            .await?;
        tx.delete_prerequisites(stage.id).await?;
        if !tx.delete_stage(stage.id).await? {
            return Err(StageError::StageNotFound {
                pipeline_id: stage.pipeline_id,
                stage_id: stage.id,
            });
        }

        if let Some(shift) = OrderShift::for_removal(position.build_order, to_build_order(count)?)
        {
            let shifted = tx.shift_build_orders(stage.pipeline_id, shift).await?;
            tracing::debug!("Moved {} stages up after deleting stage {}", shifted, stage.id);
        }

        tx.touch_pipeline(stage.pipeline_id).await
    }

    async fn delete_all_in(
        &self,
        tx: &mut P::Transaction,
        pipeline_id: i64,
        actor_id: i64,
    ) -> Result<u64> {
        let stage_ids = tx.select_stage_ids(pipeline_id).await?;

        for stage_id in stage_ids {
            self.placements
                .delete_by_stage(tx, stage_id, actor_id)
                .await?;
            tx.delete_prerequisites(stage_id).await?;
        }

        let deleted = tx.delete_pipeline_stages(pipeline_id).await?;
        tx.touch_pipeline(pipeline_id).await?;
        Ok(deleted)
    }
}

async fn insert_in<S: StageStatements>(tx: &mut S, req: CreateStage) -> Result<Stage> {
    let count = tx.count_stages(req.pipeline_id).await?;
    let build_order = to_build_order(count + 1)?;

    let (id, last_modified) = tx
        .insert_stage(req.pipeline_id, &req.name, build_order)
        .await?;

    let mut stage = Stage {
        id,
        pipeline_id: req.pipeline_id,
        name: req.name,
        build_order,
        enabled: true,
        last_modified,
        prerequisites: Vec::with_capacity(req.prerequisites.len()),
        actions: vec![],
    };
    for prerequisite in req.prerequisites {
        stage.add_prerequisite(prerequisite);
    }

    tx.insert_prerequisites(id, &stage.prerequisites).await?;
    tx.touch_pipeline(stage.pipeline_id).await?;

    Ok(stage)
}

/// Lock the stage row and read its persisted position
async fn locate<S: StageStatements>(tx: &mut S, stage: &Stage) -> Result<StagePosition> {
    match tx.lock_stage(stage.id).await? {
        Some(position) if position.pipeline_id == stage.pipeline_id => Ok(position),
        _ => Err(StageError::StageNotFound {
            pipeline_id: stage.pipeline_id,
            stage_id: stage.id,
        }),
    }
}

async fn check_build_order<S: StageStatements>(
    tx: &mut S,
    pipeline_id: i64,
    build_order: i32,
) -> Result<()> {
    let count = to_build_order(tx.count_stages(pipeline_id).await?)?;
    if !(1..=count).contains(&build_order) {
        return Err(StageError::InvalidRequest(format!(
            "Build order {build_order} is outside 1..={count}"
        )));
    }
    Ok(())
}

async fn update_in<S: StageStatements>(tx: &mut S, stage: &Stage) -> Result<()> {
    locate(tx, stage).await?;
    check_build_order(tx, stage.pipeline_id, stage.build_order).await?;
    write_stage(tx, stage).await
}

async fn write_stage<S: StageStatements>(tx: &mut S, stage: &Stage) -> Result<()> {
    if !tx.update_stage(stage).await? {
        return Err(StageError::StageNotFound {
            pipeline_id: stage.pipeline_id,
            stage_id: stage.id,
        });
    }

    tx.delete_prerequisites(stage.id).await?;
    tx.insert_prerequisites(stage.id, &stage.prerequisites)
        .await?;
    tx.touch_pipeline(stage.pipeline_id).await
}

async fn move_in<S: StageStatements>(
    tx: &mut S,
    stage: &Stage,
    new_build_order: i32,
) -> Result<Stage> {
    let position = locate(tx, stage).await?;
    check_build_order(tx, position.pipeline_id, new_build_order).await?;

    if let Some(shift) = OrderShift::for_move(position.build_order, new_build_order) {
        let shifted = tx.shift_build_orders(position.pipeline_id, shift).await?;
        tracing::debug!(
            "Shifted {} stages by {} to make room for stage {}",
            shifted,
            shift.delta,
            stage.id
        );
    }

    let mut moved = stage.clone();
    moved.build_order = new_build_order;
    write_stage(tx, &moved).await?;

    Ok(moved)
}

/// Commit on success, roll back and return the original error otherwise
async fn settle<T, Tx: StageTransaction>(tx: Tx, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("Rollback failed after '{}': {}", err, rollback_err);
            }
            Err(err)
        }
    }
}

fn to_build_order(count: i64) -> Result<i32> {
    i32::try_from(count)
        .map_err(|_| StageError::InvalidRequest(format!("Stage count {count} is out of range")))
}

// =============================================================================
// Validation
// =============================================================================

fn validate_stage_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StageError::InvalidRequest(
            "Stage name cannot be empty".to_string(),
        ));
    }

    if name.len() > 255 {
        return Err(StageError::InvalidRequest(
            "Stage name is too long (max 255 characters)".to_string(),
        ));
    }

    Ok(())
}
