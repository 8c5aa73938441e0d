//! Bevy plugin wiring the placement operators into an app.
//!
//! Requests are buffered as messages and executed one at a time by an
//! exclusive system. Each request produces exactly one report.

use bevy::ecs::message::Messages;
use bevy::prelude::*;

use crate::error::FoliageResult;
use crate::placement::{execute_operator, init_placement_world, FoliageOperator, OperatorOutcome};
use crate::settings::FoliageSettings;

/// Ask for an operator to run on the next update.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorRequest(pub FoliageOperator);

/// Outcome of one [`OperatorRequest`].
#[derive(Message, Debug)]
pub struct OperatorReport {
    pub operator: FoliageOperator,
    pub result: FoliageResult<OperatorOutcome>,
}

#[derive(Default)]
pub struct FoliagePlacementPlugin {
    pub settings: FoliageSettings,
}

impl Plugin for FoliagePlacementPlugin {
    fn build(&self, app: &mut App) {
        init_placement_world(app.world_mut(), self.settings.clone());
        app.add_message::<OperatorRequest>();
        app.add_message::<OperatorReport>();
        app.add_systems(Update, run_operator_requests);
    }
}

fn run_operator_requests(world: &mut World) {
    let requests: Vec<OperatorRequest> = world
        .resource_mut::<Messages<OperatorRequest>>()
        .drain()
        .collect();

    for OperatorRequest(operator) in requests {
        let result = execute_operator(world, operator);
        if let Err(e) = &result {
            error!("{:?} failed: {}", operator, e);
        }
        world
            .resource_mut::<Messages<OperatorReport>>()
            .write(OperatorReport { operator, result });
    }
}
