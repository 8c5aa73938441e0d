//! Job files: settings plus an ordered list of steps to replay.

use bevy::prelude::*;
use serde::Deserialize;

use foliage::placement::{deselect_all, select};
use foliage::{
    FoliageCopy, FoliageError, FoliageOperator, FoliagePlaceholder, FoliageResult,
    FoliageSettings, FoliageSource,
};

pub const JOB_VERSION: u32 = 1;

#[derive(Debug, Clone, Deserialize)]
pub struct ScatterJob {
    pub version: u32,
    #[serde(default)]
    pub settings: FoliageSettings,
    pub steps: Vec<JobStep>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum JobStep {
    /// Run an operator, as if its panel button was pressed.
    Run(FoliageOperator),
    /// Add objects to the selection.
    Select(SelectionTarget),
    ClearSelection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum SelectionTarget {
    BaseMeshes,
    /// Placeholders in these slots.
    Placeholders(Vec<usize>),
    /// Copies in these slots, for every source.
    Copies(Vec<usize>),
}

impl ScatterJob {
    pub fn from_ron_str(text: &str) -> FoliageResult<Self> {
        let job: ScatterJob = ron::from_str(text)?;
        if job.version != JOB_VERSION {
            return Err(FoliageError::Parse(format!(
                "unsupported job version {} (expected {JOB_VERSION})",
                job.version
            )));
        }
        job.settings.validate()?;
        Ok(job)
    }
}

/// Apply a selection step. Returns how many objects were newly selected.
pub fn apply_selection(world: &mut World, target: &SelectionTarget) -> usize {
    let entities: Vec<Entity> = match target {
        SelectionTarget::BaseMeshes => world
            .query_filtered::<Entity, With<FoliageSource>>()
            .iter(world)
            .collect(),
        SelectionTarget::Placeholders(slots) => world
            .query::<(Entity, &FoliagePlaceholder)>()
            .iter(world)
            .filter(|(_, p)| slots.contains(&p.slot))
            .map(|(e, _)| e)
            .collect(),
        SelectionTarget::Copies(slots) => world
            .query::<(Entity, &FoliageCopy)>()
            .iter(world)
            .filter(|(_, c)| slots.contains(&c.slot))
            .map(|(e, _)| e)
            .collect(),
    };

    for &entity in &entities {
        select(world, entity);
    }
    entities.len()
}

pub fn clear_selection(world: &mut World) {
    deselect_all(world);
}
