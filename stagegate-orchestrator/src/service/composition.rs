//! Stage graph composition
//!
//! Rebuilds stages from flattened join rows. A stage appears on one row per
//! (prerequisite, placement) pair, so rows are merged by id in first-seen
//! order: an index map finds the entry, an insertion-ordered vector keeps
//! the output deterministic.

use std::collections::{HashMap, HashSet};

use stagegate_core::domain::action::{Action, ActionDefinition};
use stagegate_core::domain::stage::Stage;
use stagegate_core::parameters::{decode_overrides, merge_parameters};

use crate::error::{Result, StageError};
use crate::persistence::{PlacementColumns, StageActionRow, StageRow};

/// Stages merged from join rows, with deduplicated prerequisites
#[derive(Debug, Default)]
pub struct StageAccumulator {
    positions: HashMap<i64, usize>,
    stages: Vec<Stage>,
}

impl StageAccumulator {
    /// Merge a row, returning the position of its stage
    pub fn push(&mut self, row: &StageRow) -> usize {
        let stages = &mut self.stages;
        let position = *self.positions.entry(row.id).or_insert_with(|| {
            stages.push(row.to_stage());
            stages.len() - 1
        });

        if let Some(prerequisite) = row.prerequisite() {
            self.stages[position].add_prerequisite(prerequisite);
        }
        position
    }

    pub fn into_stages(self) -> Vec<Stage> {
        self.stages
    }
}

/// Merge stage rows into stages in first-seen order
pub fn group_stages(rows: &[StageRow]) -> Vec<Stage> {
    let mut accumulator = StageAccumulator::default();
    for row in rows {
        accumulator.push(row);
    }
    accumulator.into_stages()
}

/// Stages of a pipeline with the placements still to hydrate
#[derive(Debug, Default)]
pub struct StageGraph {
    accumulator: StageAccumulator,
    placements: Vec<Vec<PlacementColumns>>,
    seen_placements: HashSet<i64>,
}

impl StageGraph {
    pub fn from_rows(rows: &[StageActionRow]) -> Self {
        let mut graph = Self::default();
        for row in rows {
            graph.push(row);
        }
        graph
    }

    fn push(&mut self, row: &StageActionRow) {
        let position = self.accumulator.push(&row.stage);
        if position == self.placements.len() {
            self.placements.push(Vec::new());
        }

        if let Some(placement) = row.placement() {
            if self.seen_placements.insert(placement.pipeline_action_id) {
                self.placements[position].push(placement);
            }
        }
    }

    /// Stages paired with their placements, both in first-seen order
    pub fn into_parts(self) -> impl Iterator<Item = (Stage, Vec<PlacementColumns>)> {
        self.accumulator
            .into_stages()
            .into_iter()
            .zip(self.placements)
    }
}

/// Build the stage-scoped action of a placement from its hydrated definition
pub fn compose_action(
    definition: ActionDefinition,
    placement: &PlacementColumns,
    stage_id: i64,
) -> Result<Action> {
    let overrides = decode_overrides(&placement.args).map_err(|source| StageError::Decode {
        pipeline_action_id: placement.pipeline_action_id,
        source,
    })?;

    Ok(Action {
        id: definition.id,
        pipeline_action_id: placement.pipeline_action_id,
        pipeline_stage_id: stage_id,
        name: definition.name,
        enabled: placement.enabled,
        last_modified: placement.last_modified,
        parameters: merge_parameters(&definition.parameters, overrides),
    })
}
