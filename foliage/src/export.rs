//! Serializable snapshot of the placed clump.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::collections::{CollectionKey, CollectionRepository, SceneCollections};
use crate::placement::{FoliageCopy, FoliagePlaceholder};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedTransform {
    pub slot: usize,
    pub translation: [f32; 3],
    /// Quaternion as xyzw.
    pub rotation: [f32; 4],
    pub scale: f32,
}

impl ExportedTransform {
    fn new(slot: usize, transform: &Transform) -> Self {
        Self {
            slot,
            translation: transform.translation.to_array(),
            rotation: transform.rotation.to_array(),
            scale: transform.scale.x,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedCopySet {
    pub source: String,
    pub copies: Vec<ExportedTransform>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SceneExport {
    pub placeholders_hidden: bool,
    pub placeholders: Vec<ExportedTransform>,
    pub copy_sets: Vec<ExportedCopySet>,
}

/// Collect placeholders and copies, each ordered by slot. Copy sets are ordered by source name.
pub fn export_scene(world: &mut World) -> SceneExport {
    let collections = world.resource::<SceneCollections>();
    let placeholders_hidden = collections.is_hidden(CollectionKey::Placeholders);

    let mut placeholders: Vec<ExportedTransform> = collections
        .list(CollectionKey::Placeholders)
        .iter()
        .filter_map(|&e| {
            let slot = world.get::<FoliagePlaceholder>(e)?.slot;
            Some(ExportedTransform::new(slot, world.get::<Transform>(e)?))
        })
        .collect();
    placeholders.sort_by_key(|t| t.slot);

    let mut sources: Vec<Entity> = world
        .query::<&FoliageCopy>()
        .iter(world)
        .map(|c| c.source)
        .collect();
    sources.sort();
    sources.dedup();

    let collections = world.resource::<SceneCollections>();
    let mut copy_sets: Vec<ExportedCopySet> = sources
        .into_iter()
        .map(|source| {
            let mut copies: Vec<ExportedTransform> = collections
                .list(CollectionKey::Copies(source))
                .iter()
                .filter_map(|&e| {
                    let slot = world.get::<FoliageCopy>(e)?.slot;
                    Some(ExportedTransform::new(slot, world.get::<Transform>(e)?))
                })
                .collect();
            copies.sort_by_key(|t| t.slot);
            ExportedCopySet {
                source: world
                    .get::<Name>(source)
                    .map(|n| n.as_str().to_owned())
                    .unwrap_or_else(|| format!("{source:?}")),
                copies,
            }
        })
        .collect();
    copy_sets.sort_by(|a, b| a.source.cmp(&b.source));

    SceneExport {
        placeholders_hidden,
        placeholders,
        copy_sets,
    }
}
