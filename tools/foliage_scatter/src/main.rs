//! Headless foliage scatter tool.
//!
//! Reads a job file (default `jobs/clump.ron`), replays its steps against the
//! placement plugin and writes the resulting placeholder and copy transforms
//! as RON (default `foliage_scene.ron`).
//!
//! Usage: `foliage_scatter [job.ron] [output.ron] [settings.ron]`
//!
//! A settings file, when given, replaces the job's own settings.

mod job;

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use bevy::ecs::message::Messages;
use bevy::log::LogPlugin;
use bevy::prelude::*;

use foliage::{
    export_scene, FoliagePlacementPlugin, FoliageSettings, OperatorReport, OperatorRequest,
};

use job::{apply_selection, clear_selection, JobStep, ScatterJob};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let job_path = PathBuf::from(args.next().unwrap_or_else(|| "jobs/clump.ron".to_string()));
    let output_path = PathBuf::from(args.next().unwrap_or_else(|| "foliage_scene.ron".to_string()));

    let text = fs::read_to_string(&job_path)
        .with_context(|| format!("failed to read job file {job_path:?}"))?;
    let mut job = ScatterJob::from_ron_str(&text)
        .with_context(|| format!("failed to parse job file {job_path:?}"))?;
    if let Some(settings_path) = args.next().map(PathBuf::from) {
        job.settings = FoliageSettings::load(&settings_path)
            .with_context(|| format!("failed to load settings {settings_path:?}"))?;
        info!("Using settings from {:?}", settings_path);
    }

    let mut app = App::new();
    app.add_plugins((MinimalPlugins, LogPlugin::default()));
    app.add_plugins(FoliagePlacementPlugin {
        settings: job.settings.clone(),
    });

    app.finish();
    app.cleanup();

    info!("Running {} step(s) from {:?}", job.steps.len(), job_path);

    for (i, step) in job.steps.iter().enumerate() {
        match step {
            JobStep::Run(operator) => {
                app.world_mut()
                    .resource_mut::<Messages<OperatorRequest>>()
                    .write(OperatorRequest(*operator));
                app.update();

                let reports: Vec<OperatorReport> = app
                    .world_mut()
                    .resource_mut::<Messages<OperatorReport>>()
                    .drain()
                    .collect();
                for report in reports {
                    match report.result {
                        Ok(outcome) => info!("step {}: {:?} -> {:?}", i, report.operator, outcome),
                        Err(e) => bail!("step {i}: {:?} failed: {e}", report.operator),
                    }
                }
            }
            JobStep::Select(target) => {
                let count = apply_selection(app.world_mut(), target);
                if count == 0 {
                    warn!("step {}: {:?} matched nothing", i, target);
                }
            }
            JobStep::ClearSelection => clear_selection(app.world_mut()),
        }
    }

    let export = export_scene(app.world_mut());
    let text = ron::ser::to_string_pretty(&export, ron::ser::PrettyConfig::default())
        .context("failed to serialize scene")?;

    // Write to a temp file first so a failed run never leaves a truncated output
    let temp_path = output_path.with_extension("ron.tmp");
    fs::write(&temp_path, text).with_context(|| format!("failed to write {temp_path:?}"))?;
    fs::rename(&temp_path, &output_path)
        .with_context(|| format!("failed to move output into {output_path:?}"))?;

    info!(
        "Wrote {} placeholder(s) and {} copy set(s) to {:?}",
        export.placeholders.len(),
        export.copy_sets.len(),
        output_path
    );
    Ok(())
}
