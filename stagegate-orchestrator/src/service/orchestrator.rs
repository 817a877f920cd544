//! Stage Orchestrator
//!
//! Public face of the stage core. Delegates stage management to the
//! [`StageStore`], assembles full pipeline graphs with hydrated actions and
//! answers whether a stage may run for a build.

use std::sync::Arc;

use sqlx::PgPool;
use stagegate_core::domain::build::PipelineBuild;
use stagegate_core::domain::stage::Stage;
use stagegate_core::dto::stage::CreateStage;
use stagegate_core::prerequisite::{Evaluator, ExpectedValueExpander};

use crate::actions::{ActionDefinitions, ActionPlacements, PgActionDefinitions, PgActionPlacements};
use crate::config::Config;
use crate::error::Result;
use crate::persistence::{PgPersistence, Persistence};
use crate::service::composition::{StageGraph, compose_action};
use crate::service::stage::StageStore;

pub struct StageOrchestrator<P: Persistence> {
    store: StageStore<P>,
    actions: Arc<dyn ActionDefinitions>,
    evaluator: Evaluator,
}

impl StageOrchestrator<PgPersistence> {
    /// Orchestrator over a Postgres pool
    pub fn postgres(
        pool: PgPool,
        config: &Config,
        expander: Arc<dyn ExpectedValueExpander>,
    ) -> Self {
        let store = StageStore::new(
            PgPersistence::new(pool.clone()),
            Arc::new(PgActionPlacements),
        );
        let evaluator =
            Evaluator::with_shared(expander).with_pass_limit(config.placeholder_pass_limit);

        Self::new(store, Arc::new(PgActionDefinitions::new(pool)), evaluator)
    }
}

impl<P: Persistence> StageOrchestrator<P> {
    pub fn new(
        store: StageStore<P>,
        actions: Arc<dyn ActionDefinitions>,
        evaluator: Evaluator,
    ) -> Self {
        Self {
            store,
            actions,
            evaluator,
        }
    }

    /// Build a Postgres-free orchestrator from its parts
    pub fn with_parts(
        persistence: P,
        placements: Arc<dyn ActionPlacements<P::Transaction>>,
        actions: Arc<dyn ActionDefinitions>,
    ) -> Self {
        Self::new(
            StageStore::new(persistence, placements),
            actions,
            Evaluator::default(),
        )
    }

    pub async fn load_stage(&self, pipeline_id: i64, stage_id: i64) -> Result<Stage> {
        self.store.load_stage(pipeline_id, stage_id).await
    }

    pub async fn load_all_stages(&self, pipeline_id: i64) -> Result<Vec<Stage>> {
        self.store.load_all_stages(pipeline_id).await
    }

    /// Every stage of a pipeline with prerequisites and hydrated actions.
    ///
    /// Actions keep the row order of the graph query (action name, then
    /// placement id). The first failing hydration or decode aborts the
    /// whole load.
    ///
    /// Graph rows and action definitions are read by separate statements
    /// outside a transaction, so a definition edited in between is seen in
    /// its newer form.
    pub async fn load_full_pipeline_stages(&self, pipeline_id: i64) -> Result<Vec<Stage>> {
        let rows = self.store.load_graph_rows(pipeline_id).await?;
        let graph = StageGraph::from_rows(&rows);

        let mut stages = Vec::new();
        for (mut stage, placements) in graph.into_parts() {
            stage.actions.reserve(placements.len());
            for placement in &placements {
                let definition = self.actions.load_action_by_id(placement.action_id).await?;
                stage
                    .actions
                    .push(compose_action(definition, placement, stage.id)?);
            }
            stages.push(stage);
        }

        tracing::debug!(
            "Loaded {} stages with {} actions for pipeline {}",
            stages.len(),
            stages.iter().map(|s| s.actions.len()).sum::<usize>(),
            pipeline_id
        );

        Ok(stages)
    }

    pub async fn insert_stage(&self, req: CreateStage) -> Result<Stage> {
        self.store.insert_stage(req).await
    }

    pub async fn update_stage(&self, stage: &Stage) -> Result<()> {
        self.store.update_stage(stage).await
    }

    pub async fn delete_stage(&self, stage: &Stage, actor_id: i64) -> Result<()> {
        self.store.delete_stage(stage, actor_id).await
    }

    pub async fn delete_all_stages(&self, pipeline_id: i64, actor_id: i64) -> Result<u64> {
        self.store.delete_all_stages(pipeline_id, actor_id).await
    }

    pub async fn move_stage(&self, stage: &Stage, new_build_order: i32) -> Result<Stage> {
        self.store.move_stage(stage, new_build_order).await
    }

    pub async fn count_stages(&self, pipeline_id: i64) -> Result<i64> {
        self.store.count_stages(pipeline_id).await
    }

    /// Whether every applicable prerequisite of `stage` matches `build`
    pub fn is_eligible(&self, stage: &Stage, build: &PipelineBuild) -> Result<bool> {
        Ok(self.evaluator.is_eligible(stage, build)?)
    }
}
