//! In-memory persistence for tests
//!
//! Transactions work on a private copy of the state and publish it on
//! commit. Every statement is journaled, and any statement can be made to
//! fail with [`MemoryPersistence::fail_on`].

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stagegate_core::domain::action::ActionDefinition;
use stagegate_core::domain::stage::{Prerequisite, Stage};
use stagegate_core::ordering::OrderShift;

use super::{
    Persistence, StageActionRow, StagePosition, StageRow, StageStatements, StageTransaction,
};
use crate::actions::{ActionDefinitions, ActionPlacements};
use crate::error::{Result, StageError};

#[derive(Debug, Clone)]
pub(crate) struct StoredStage {
    pub id: i64,
    pub pipeline_id: i64,
    pub name: String,
    pub build_order: i32,
    pub enabled: bool,
    pub last_modified: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct StoredPlacement {
    pub id: i64,
    pub stage_id: i64,
    pub action_id: i64,
    pub args: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryState {
    next_id: i64,
    pub pipelines: BTreeMap<i64, chrono::DateTime<chrono::Utc>>,
    pub stages: BTreeMap<i64, StoredStage>,
    /// (prerequisite id, stage id, prerequisite)
    pub prerequisites: Vec<(i64, i64, Prerequisite)>,
    pub actions: BTreeMap<i64, ActionDefinition>,
    pub placements: Vec<StoredPlacement>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn stage_rows(&self, stage: &StoredStage) -> Vec<StageRow> {
        let base = StageRow {
            id: stage.id,
            pipeline_id: stage.pipeline_id,
            name: stage.name.clone(),
            build_order: stage.build_order,
            enabled: stage.enabled,
            last_modified: stage.last_modified,
            parameter: None,
            expected_value: None,
        };

        let rows: Vec<StageRow> = self
            .prerequisites
            .iter()
            .filter(|(_, stage_id, _)| *stage_id == stage.id)
            .map(|(_, _, p)| StageRow {
                parameter: Some(p.parameter.clone()),
                expected_value: Some(p.expected_value.clone()),
                ..base.clone()
            })
            .collect();

        if rows.is_empty() { vec![base] } else { rows }
    }

    fn pipeline_stages(&self, pipeline_id: i64) -> Vec<&StoredStage> {
        let mut stages: Vec<&StoredStage> = self
            .stages
            .values()
            .filter(|s| s.pipeline_id == pipeline_id)
            .collect();
        stages.sort_by_key(|s| s.build_order);
        stages
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MemoryState>,
    journal: Mutex<Vec<String>>,
    faults: Mutex<HashSet<&'static str>>,
}

/// Test persistence holding stages, prerequisites, actions and placements
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryPersistence {
    shared: Arc<Shared>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pipeline(&self, pipeline_id: i64) {
        let epoch = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH;
        self.shared
            .state
            .lock()
            .unwrap()
            .pipelines
            .insert(pipeline_id, epoch);
    }

    pub fn add_stage(&self, pipeline_id: i64, name: &str, build_order: i32) -> i64 {
        let mut state = self.shared.state.lock().unwrap();
        let id = state.next_id();
        state.stages.insert(
            id,
            StoredStage {
                id,
                pipeline_id,
                name: name.to_string(),
                build_order,
                enabled: true,
                last_modified: chrono::Utc::now(),
            },
        );
        id
    }

    pub fn add_prerequisite(&self, stage_id: i64, parameter: &str, expected_value: &str) {
        let mut state = self.shared.state.lock().unwrap();
        let id = state.next_id();
        state
            .prerequisites
            .push((id, stage_id, Prerequisite::new(parameter, expected_value)));
    }

    pub fn add_action(&self, definition: ActionDefinition) {
        self.shared
            .state
            .lock()
            .unwrap()
            .actions
            .insert(definition.id, definition);
    }

    pub fn add_placement(&self, stage_id: i64, action_id: i64, args: Option<&str>) -> i64 {
        let mut state = self.shared.state.lock().unwrap();
        let id = state.next_id();
        state.placements.push(StoredPlacement {
            id,
            stage_id,
            action_id,
            args: args.map(str::to_string),
            enabled: true,
        });
        id
    }

    /// Make every later execution of `statement` fail with a storage error
    pub fn fail_on(&self, statement: &'static str) {
        self.shared.faults.lock().unwrap().insert(statement);
    }

    pub fn journal(&self) -> Vec<String> {
        self.shared.journal.lock().unwrap().clone()
    }

    pub fn clear_journal(&self) {
        self.shared.journal.lock().unwrap().clear();
    }

    pub fn state(&self) -> MemoryState {
        self.shared.state.lock().unwrap().clone()
    }

    /// (name, build order) of the committed stages, ascending by order
    pub fn ordering(&self, pipeline_id: i64) -> Vec<(String, i32)> {
        self.state()
            .pipeline_stages(pipeline_id)
            .into_iter()
            .map(|s| (s.name.clone(), s.build_order))
            .collect()
    }

    fn open(&self, autocommit: bool) -> MemorySession {
        MemorySession {
            shared: self.shared.clone(),
            working: self.state(),
            autocommit,
        }
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    type Session = MemorySession;
    type Transaction = MemorySession;

    async fn session(&self) -> Result<Self::Session> {
        Ok(self.open(true))
    }

    async fn begin(&self) -> Result<Self::Transaction> {
        self.shared.journal.lock().unwrap().push("begin".to_string());
        Ok(self.open(false))
    }
}

#[async_trait]
impl ActionDefinitions for MemoryPersistence {
    async fn load_action_by_id(&self, action_id: i64) -> Result<ActionDefinition> {
        self.state()
            .actions
            .get(&action_id)
            .cloned()
            .ok_or(StageError::ActionNotFound(action_id))
    }
}

/// Session or transaction over the memory state
pub(crate) struct MemorySession {
    shared: Arc<Shared>,
    working: MemoryState,
    autocommit: bool,
}

impl MemorySession {
    fn enter(&mut self, statement: &'static str) -> Result<()> {
        self.shared
            .journal
            .lock()
            .unwrap()
            .push(statement.to_string());

        if self.shared.faults.lock().unwrap().contains(statement) {
            return Err(StageError::Storage(sqlx::Error::Protocol(format!(
                "injected failure in {statement}"
            ))));
        }
        if self.autocommit {
            self.working = self.shared.state.lock().unwrap().clone();
        }
        Ok(())
    }

    fn written(&mut self) {
        if self.autocommit {
            *self.shared.state.lock().unwrap() = self.working.clone();
        }
    }

    fn delete_placements(&mut self, stage_id: i64) -> Result<u64> {
        self.enter("delete_placements")?;
        let before = self.working.placements.len();
        self.working.placements.retain(|p| p.stage_id != stage_id);
        self.written();
        Ok((before - self.working.placements.len()) as u64)
    }
}

#[async_trait]
impl StageStatements for MemorySession {
    async fn select_stage(&mut self, pipeline_id: i64, stage_id: i64) -> Result<Vec<StageRow>> {
        self.enter("select_stage")?;
        Ok(self
            .working
            .stages
            .get(&stage_id)
            .filter(|s| s.pipeline_id == pipeline_id)
            .map(|s| self.working.stage_rows(s))
            .unwrap_or_default())
    }

    async fn select_stages(&mut self, pipeline_id: i64) -> Result<Vec<StageRow>> {
        self.enter("select_stages")?;
        Ok(self
            .working
            .pipeline_stages(pipeline_id)
            .into_iter()
            .flat_map(|s| self.working.stage_rows(s))
            .collect())
    }

    async fn select_stage_graph(&mut self, pipeline_id: i64) -> Result<Vec<StageActionRow>> {
        self.enter("select_stage_graph")?;
        let state = &self.working;
        let mut rows = Vec::new();

        for stage in state.pipeline_stages(pipeline_id) {
            let mut placements: Vec<(&StoredPlacement, &ActionDefinition)> = state
                .placements
                .iter()
                .filter(|p| p.stage_id == stage.id)
                .filter_map(|p| state.actions.get(&p.action_id).map(|a| (p, a)))
                .collect();
            placements.sort_by(|(pa, a), (pb, b)| a.name.cmp(&b.name).then(pa.id.cmp(&pb.id)));

            let stage_rows = state.stage_rows(stage);
            if placements.is_empty() {
                rows.extend(stage_rows.into_iter().map(|stage| StageActionRow {
                    stage,
                    pipeline_action_id: None,
                    action_id: None,
                    action_last_modified: None,
                    action_args: None,
                    action_enabled: None,
                }));
                continue;
            }

            for (placement, action) in placements {
                rows.extend(stage_rows.iter().cloned().map(|stage| StageActionRow {
                    stage,
                    pipeline_action_id: Some(placement.id),
                    action_id: Some(action.id),
                    action_last_modified: Some(action.last_modified),
                    action_args: placement.args.clone(),
                    action_enabled: Some(placement.enabled),
                }));
            }
        }

        Ok(rows)
    }

    async fn lock_stage(&mut self, stage_id: i64) -> Result<Option<StagePosition>> {
        self.enter("lock_stage")?;
        Ok(self.working.stages.get(&stage_id).map(|s| StagePosition {
            pipeline_id: s.pipeline_id,
            build_order: s.build_order,
        }))
    }

    async fn select_stage_ids(&mut self, pipeline_id: i64) -> Result<Vec<i64>> {
        self.enter("select_stage_ids")?;
        Ok(self
            .working
            .pipeline_stages(pipeline_id)
            .into_iter()
            .map(|s| s.id)
            .collect())
    }

    async fn count_stages(&mut self, pipeline_id: i64) -> Result<i64> {
        self.enter("count_stages")?;
        Ok(self.working.pipeline_stages(pipeline_id).len() as i64)
    }

    async fn insert_stage(
        &mut self,
        pipeline_id: i64,
        name: &str,
        build_order: i32,
    ) -> Result<(i64, chrono::DateTime<chrono::Utc>)> {
        self.enter("insert_stage")?;
        let id = self.working.next_id();
        let last_modified = chrono::Utc::now();
        self.working.stages.insert(
            id,
            StoredStage {
                id,
                pipeline_id,
                name: name.to_string(),
                build_order,
                enabled: true,
                last_modified,
            },
        );
        self.written();
        Ok((id, last_modified))
    }

    async fn update_stage(&mut self, stage: &Stage) -> Result<bool> {
        self.enter("update_stage")?;
        let Some(stored) = self.working.stages.get_mut(&stage.id) else {
            return Ok(false);
        };
        stored.name = stage.name.clone();
        stored.build_order = stage.build_order;
        stored.enabled = stage.enabled;
        stored.last_modified = chrono::Utc::now();
        self.written();
        Ok(true)
    }

    async fn delete_stage(&mut self, stage_id: i64) -> Result<bool> {
        self.enter("delete_stage")?;
        let deleted = self.working.stages.remove(&stage_id).is_some();
        self.written();
        Ok(deleted)
    }

    async fn delete_pipeline_stages(&mut self, pipeline_id: i64) -> Result<u64> {
        self.enter("delete_pipeline_stages")?;
        let before = self.working.stages.len();
        self.working.stages.retain(|_, s| s.pipeline_id != pipeline_id);
        self.written();
        Ok((before - self.working.stages.len()) as u64)
    }

    async fn insert_prerequisites(
        &mut self,
        stage_id: i64,
        prerequisites: &[Prerequisite],
    ) -> Result<()> {
        self.enter("insert_prerequisites")?;
        for prerequisite in prerequisites {
            let id = self.working.next_id();
            self.working
                .prerequisites
                .push((id, stage_id, prerequisite.clone()));
        }
        self.written();
        Ok(())
    }

    async fn delete_prerequisites(&mut self, stage_id: i64) -> Result<u64> {
        self.enter("delete_prerequisites")?;
        let before = self.working.prerequisites.len();
        self.working
            .prerequisites
            .retain(|(_, owner, _)| *owner != stage_id);
        self.written();
        Ok((before - self.working.prerequisites.len()) as u64)
    }

    async fn shift_build_orders(&mut self, pipeline_id: i64, shift: OrderShift) -> Result<u64> {
        self.enter("shift_build_orders")?;
        let mut shifted = 0;
        for stage in self.working.stages.values_mut() {
            if stage.pipeline_id == pipeline_id && shift.contains(stage.build_order) {
                stage.build_order = shift.apply(stage.build_order);
                shifted += 1;
            }
        }
        self.written();
        Ok(shifted)
    }

    async fn touch_pipeline(&mut self, pipeline_id: i64) -> Result<()> {
        self.enter("touch_pipeline")?;
        if let Some(last_modified) = self.working.pipelines.get_mut(&pipeline_id) {
            *last_modified = chrono::Utc::now();
        }
        self.written();
        Ok(())
    }
}

#[async_trait]
impl StageTransaction for MemorySession {
    async fn commit(mut self) -> Result<()> {
        self.enter("commit")?;
        *self.shared.state.lock().unwrap() = self.working;
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        self.enter("rollback")?;
        Ok(())
    }
}

/// Placement removal working on the memory transaction
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MemoryPlacements;

#[async_trait]
impl ActionPlacements<MemorySession> for MemoryPlacements {
    async fn delete_by_stage(
        &self,
        tx: &mut MemorySession,
        stage_id: i64,
        _actor_id: i64,
    ) -> Result<()> {
        tx.delete_placements(stage_id)?;
        Ok(())
    }
}
