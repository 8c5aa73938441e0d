//! Placeholder and foliage copy bookkeeping.
//!
//! Placeholders are transform-only entities tagged with their slot. Copies are
//! clones of a source mesh aligned to a placeholder, tagged with the source
//! entity and the slot they follow. Every operator runs to completion against
//! the `World` before returning.

use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::base_mesh::{MeshData, BASE_MESH_NAME, UV_MARGIN};
use crate::collections::{CollectionKey, CollectionRepository, SceneCollections};
use crate::error::{FoliageError, FoliageResult};
use crate::settings::{FoliageSettings, UnitSettings};
use crate::transform::{
    align_copy, placeholder_from_copy, random_transform, transforms_match, ScatterParams,
};

pub const PLACEHOLDER_NAME: &str = "FoliagePlaceholder";

/// Tolerance when checking placeholders against live copies.
const STALE_EPSILON: f32 = 1e-3;

/// Marker transform for one instance.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoliagePlaceholder {
    pub slot: usize,
}

/// A mesh clone aligned to the placeholder in `slot`.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoliageCopy {
    pub source: Entity,
    pub slot: usize,
}

/// Mesh object that can be copied into a clump.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct FoliageSource;

#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Selected;

#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct ActiveObject(pub Option<Entity>);

/// Random source threaded through every generator call.
#[derive(Resource)]
pub struct FoliageRng(pub StdRng);

impl FoliageRng {
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self(StdRng::seed_from_u64(seed)),
            None => Self(StdRng::from_entropy()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FoliageOperator {
    /// Switch the scene to Metric units at 0.01 scale.
    ApplyUnrealUnits,
    /// Add the blade template mesh.
    AddBaseMesh,
    /// Align copies to a new set of placeholders.
    Spawn,
    /// Align copies to the current placeholders.
    Replace,
    /// Show or hide the placeholders.
    TogglePlaceholders,
}

/// What happened to the placeholder collection before a fresh spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderSetup {
    /// The collection did not exist yet.
    Created,
    /// The collection existed and its members were removed.
    Cleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderRefresh {
    /// Only the selected placeholders got new transforms.
    RespawnedSelected(usize),
    /// The whole set was replaced.
    Regenerated { count: usize, setup: PlaceholderSetup },
    /// Placeholders were left as they are.
    Kept,
}

/// Where the meshes to copy came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceResolution {
    /// Sources of the selected copies.
    FromSelectedCopies(Vec<Entity>),
    /// No copies were selected, so the selected source meshes are used.
    FromSelectedMeshes(Vec<Entity>),
    /// Nothing to copy.
    Empty,
}

impl SourceResolution {
    pub fn sources(&self) -> &[Entity] {
        match self {
            SourceResolution::FromSelectedCopies(s) | SourceResolution::FromSelectedMeshes(s) => s,
            SourceResolution::Empty => &[],
        }
    }
}

/// Result of comparing the placeholder set with the selected copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderRepair {
    Consistent,
    /// Placeholders were stale and got rebuilt from this many copies.
    Rebuilt(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementSummary {
    /// `None` when no copies were selected.
    pub repair: Option<PlaceholderRepair>,
    pub placeholders: PlaceholderRefresh,
    pub sources: SourceResolution,
    pub copies_spawned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorOutcome {
    UnitsApplied,
    BaseMeshAdded(Entity),
    Placed(PlacementSummary),
    PlaceholdersToggled { hidden: bool },
}

/// Selected objects grouped by role.
#[derive(Debug, Clone, Default)]
pub struct SelectionSnapshot {
    /// (entity, slot), ordered by slot.
    pub placeholders: Vec<(Entity, usize)>,
    /// Ordered by (source, slot).
    pub copies: Vec<(Entity, FoliageCopy)>,
    /// Selected meshes that are neither placeholders nor copies.
    pub sources: Vec<Entity>,
    /// Whether any selected object carries mesh data.
    pub any_mesh: bool,
}

/// Insert the resources placement needs.
pub fn init_placement_world(world: &mut World, settings: FoliageSettings) {
    world.insert_resource(FoliageRng::new(settings.seed));
    world.insert_resource(settings);
    world.init_resource::<UnitSettings>();
    world.init_resource::<SceneCollections>();
    world.init_resource::<ActiveObject>();
}

pub fn select(world: &mut World, entity: Entity) {
    world.entity_mut(entity).insert(Selected);
}

pub fn deselect_all(world: &mut World) {
    let selected: Vec<Entity> = world
        .query_filtered::<Entity, With<Selected>>()
        .iter(world)
        .collect();
    for entity in selected {
        world.entity_mut(entity).remove::<Selected>();
    }
}

pub fn snapshot_selection(world: &mut World) -> SelectionSnapshot {
    let mut snapshot = SelectionSnapshot::default();
    let mut query = world.query_filtered::<(
        Entity,
        Option<&FoliagePlaceholder>,
        Option<&FoliageCopy>,
        Has<FoliageSource>,
        Has<MeshData>,
    ), With<Selected>>();

    for (entity, placeholder, copy, is_source, has_mesh) in query.iter(world) {
        snapshot.any_mesh |= has_mesh;
        if let Some(placeholder) = placeholder {
            snapshot.placeholders.push((entity, placeholder.slot));
        } else if let Some(copy) = copy {
            snapshot.copies.push((entity, *copy));
        } else if is_source || has_mesh {
            // Any selected mesh can be copied, tagged or not
            snapshot.sources.push(entity);
        }
    }

    snapshot.placeholders.sort_by_key(|(_, slot)| *slot);
    snapshot.copies.sort_by_key(|(_, c)| (c.source, c.slot));
    snapshot.sources.sort();
    snapshot
}

/// Check the operator's preconditions without touching the world.
pub fn check_available(world: &mut World, operator: FoliageOperator) -> FoliageResult<()> {
    let has_placeholders = world
        .resource::<SceneCollections>()
        .contains(CollectionKey::Placeholders);
    let selection = snapshot_selection(world);

    let reason = match operator {
        FoliageOperator::ApplyUnrealUnits | FoliageOperator::AddBaseMesh => None,
        FoliageOperator::Spawn => (!selection.any_mesh && selection.placeholders.is_empty())
            .then_some("select a mesh or a placeholder"),
        FoliageOperator::Replace => {
            if !selection.any_mesh {
                Some("select a mesh")
            } else if !has_placeholders {
                Some("no placeholders have been spawned")
            } else {
                None
            }
        }
        FoliageOperator::TogglePlaceholders => {
            (!has_placeholders).then_some("no placeholders have been spawned")
        }
    };

    match reason {
        Some(reason) => Err(FoliageError::OperatorUnavailable { operator, reason }),
        None => Ok(()),
    }
}

/// Run one operator. Failed preconditions leave the world untouched.
pub fn execute_operator(
    world: &mut World,
    operator: FoliageOperator,
) -> FoliageResult<OperatorOutcome> {
    if operator != FoliageOperator::ApplyUnrealUnits {
        world.resource::<UnitSettings>().require_unreal_units()?;
    }
    check_available(world, operator)?;

    match operator {
        FoliageOperator::ApplyUnrealUnits => {
            world.resource_mut::<UnitSettings>().apply_unreal_units();
            info!("Applied Unreal units (Metric, scale 0.01)");
            Ok(OperatorOutcome::UnitsApplied)
        }
        FoliageOperator::AddBaseMesh => Ok(OperatorOutcome::BaseMeshAdded(add_base_mesh(world))),
        FoliageOperator::Spawn | FoliageOperator::Replace => {
            let settings = world.resource::<FoliageSettings>().clone();
            settings.validate()?;
            let regenerate = operator == FoliageOperator::Spawn;

            let summary = world.resource_scope(|world, mut collections: Mut<SceneCollections>| {
                world.resource_scope(|world, mut rng: Mut<FoliageRng>| {
                    place_foliage(
                        world,
                        &mut *collections,
                        &mut rng.0,
                        &settings,
                        regenerate,
                    )
                })
            });
            info!(
                "{:?}: placeholders {:?}, {} copies from {} source(s)",
                operator,
                summary.placeholders,
                summary.copies_spawned,
                summary.sources.sources().len()
            );
            Ok(OperatorOutcome::Placed(summary))
        }
        FoliageOperator::TogglePlaceholders => {
            let hidden = world.resource_scope(|world, mut collections: Mut<SceneCollections>| {
                toggle_placeholders(world, &mut *collections)
            });
            info!("Placeholders {}", if hidden { "hidden" } else { "shown" });
            Ok(OperatorOutcome::PlaceholdersToggled { hidden })
        }
    }
}

/// Spawn the unwrapped blade template and make it the only selected object.
pub fn add_base_mesh(world: &mut World) -> Entity {
    let mut mesh = MeshData::blade();
    mesh.unwrap_planar(UV_MARGIN);

    deselect_all(world);
    let entity = world
        .spawn((
            Name::new(BASE_MESH_NAME),
            FoliageSource,
            mesh,
            Transform::IDENTITY,
            Selected,
        ))
        .id();
    world.resource_mut::<ActiveObject>().0 = Some(entity);
    info!("Added base mesh {:?}", entity);
    entity
}

/// Shared body of Spawn (`regenerate = true`) and Replace.
pub fn place_foliage<C: CollectionRepository, R: Rng + ?Sized>(
    world: &mut World,
    collections: &mut C,
    rng: &mut R,
    settings: &FoliageSettings,
    regenerate: bool,
) -> PlacementSummary {
    let mut selection = snapshot_selection(world);

    let repair = repair_stale_placeholders(world, collections, &selection);
    if matches!(repair, Some(PlaceholderRepair::Rebuilt(_))) {
        // Slots and placeholder entities changed underneath the snapshot
        selection = snapshot_selection(world);
    }

    let params = settings.scatter_params();
    let placeholders = if !regenerate {
        PlaceholderRefresh::Kept
    } else if !selection.placeholders.is_empty() {
        respawn_selected_placeholders(world, rng, &params, &selection.placeholders);
        PlaceholderRefresh::RespawnedSelected(selection.placeholders.len())
    } else {
        let setup = reset_placeholders(world, collections);
        let spawned =
            spawn_placeholders(world, collections, rng, &params, settings.foliage_count);
        PlaceholderRefresh::Regenerated {
            count: spawned.len(),
            setup,
        }
    };

    let sources = resolve_sources(&selection);
    let copies_spawned = rebuild_copies(world, collections, sources.sources(), &selection);

    PlacementSummary {
        repair,
        placeholders,
        sources,
        copies_spawned,
    }
}

/// Despawn the current placeholders, creating the collection if needed.
pub fn reset_placeholders<C: CollectionRepository>(
    world: &mut World,
    collections: &mut C,
) -> PlaceholderSetup {
    let setup = if collections.contains(CollectionKey::Placeholders) {
        PlaceholderSetup::Cleared
    } else {
        PlaceholderSetup::Created
    };
    collections.get_or_create(CollectionKey::Placeholders);
    for entity in collections.clear(CollectionKey::Placeholders) {
        world.despawn(entity);
    }
    setup
}

fn spawn_placeholder<C: CollectionRepository>(
    world: &mut World,
    collections: &mut C,
    slot: usize,
    transform: Transform,
) -> Entity {
    let visibility = if collections.is_hidden(CollectionKey::Placeholders) {
        Visibility::Hidden
    } else {
        Visibility::Inherited
    };
    let entity = world
        .spawn((
            Name::new(PLACEHOLDER_NAME),
            FoliagePlaceholder { slot },
            transform,
            visibility,
        ))
        .id();
    collections.link(CollectionKey::Placeholders, entity);
    entity
}

/// Spawn `count` placeholders in slots `0..count`.
pub fn spawn_placeholders<C: CollectionRepository, R: Rng + ?Sized>(
    world: &mut World,
    collections: &mut C,
    rng: &mut R,
    params: &ScatterParams,
    count: usize,
) -> Vec<Entity> {
    (0..count)
        .map(|slot| {
            let transform = random_transform(rng, params, slot).to_transform();
            spawn_placeholder(world, collections, slot, transform)
        })
        .collect()
}

/// Give the listed placeholders new transforms, keeping their slots.
pub fn respawn_selected_placeholders<R: Rng + ?Sized>(
    world: &mut World,
    rng: &mut R,
    params: &ScatterParams,
    placeholders: &[(Entity, usize)],
) {
    for &(entity, slot) in placeholders {
        let transform = random_transform(rng, params, slot).to_transform();
        if let Some(mut current) = world.get_mut::<Transform>(entity) {
            *current = transform;
        }
    }
}

fn slotted_transforms<T: Component>(
    world: &World,
    entities: &[Entity],
    slot_of: impl Fn(&T) -> usize,
) -> Vec<(Entity, usize, Transform)> {
    let mut out: Vec<_> = entities
        .iter()
        .filter_map(|&e| {
            let slot = slot_of(world.get::<T>(e)?);
            Some((e, slot, *world.get::<Transform>(e)?))
        })
        .collect();
    out.sort_by_key(|(_, slot, _)| *slot);
    out
}

/// Compare the placeholder set against the copies of the first selected copy's
/// source. A count mismatch or a moved first member means the placeholders are
/// stale; they are then rebuilt from the live copy transforms, that source's
/// copies are renumbered to match and every other copy set is realigned.
pub fn repair_stale_placeholders<C: CollectionRepository>(
    world: &mut World,
    collections: &mut C,
    selection: &SelectionSnapshot,
) -> Option<PlaceholderRepair> {
    let (_, first) = selection.copies.first()?;
    let source = first.source;

    let copies = slotted_transforms::<FoliageCopy>(
        world,
        collections.list(CollectionKey::Copies(source)),
        |c| c.slot,
    );
    let placeholders = slotted_transforms::<FoliagePlaceholder>(
        world,
        collections.list(CollectionKey::Placeholders),
        |p| p.slot,
    );

    let first_matches = match (placeholders.first(), copies.first()) {
        (Some((_, _, p)), Some((_, _, c))) => {
            transforms_match(p, &placeholder_from_copy(c), STALE_EPSILON)
        }
        (None, None) => true,
        _ => false,
    };
    if placeholders.len() == copies.len() && first_matches {
        return Some(PlaceholderRepair::Consistent);
    }

    warn!(
        "Placeholders are stale ({} placeholders, {} copies); rebuilding from copies",
        placeholders.len(),
        copies.len()
    );
    reset_placeholders(world, collections);
    for (slot, (copy, _, transform)) in copies.iter().enumerate() {
        spawn_placeholder(world, collections, slot, placeholder_from_copy(transform));
        if let Some(mut tag) = world.get_mut::<FoliageCopy>(*copy) {
            tag.slot = slot;
        }
    }

    // Copies of every other source follow the rebuilt placeholders
    let mut others: Vec<Entity> = collections
        .keys()
        .into_iter()
        .filter_map(|key| match key {
            CollectionKey::Copies(other) if other != source => Some(other),
            _ => None,
        })
        .collect();
    others.sort();
    if !others.is_empty() {
        rebuild_copies(world, collections, &others, selection);
    }
    Some(PlaceholderRepair::Rebuilt(copies.len()))
}

pub fn resolve_sources(selection: &SelectionSnapshot) -> SourceResolution {
    if !selection.copies.is_empty() {
        let mut sources: Vec<Entity> = selection.copies.iter().map(|(_, c)| c.source).collect();
        sources.dedup();
        SourceResolution::FromSelectedCopies(sources)
    } else if !selection.sources.is_empty() {
        SourceResolution::FromSelectedMeshes(selection.sources.clone())
    } else {
        SourceResolution::Empty
    }
}

/// Replace the copies of each source with one copy per placeholder. Copies that
/// were selected come back selected.
pub fn rebuild_copies<C: CollectionRepository>(
    world: &mut World,
    collections: &mut C,
    sources: &[Entity],
    selection: &SelectionSnapshot,
) -> usize {
    let placeholders = slotted_transforms::<FoliagePlaceholder>(
        world,
        collections.list(CollectionKey::Placeholders),
        |p| p.slot,
    );

    let mut spawned = 0;
    for &source in sources {
        let Some(mesh) = world.get::<MeshData>(source).cloned() else {
            warn!("Source {:?} has no mesh data, skipping", source);
            continue;
        };
        let name = world
            .get::<Name>(source)
            .map(|n| n.as_str().to_owned())
            .unwrap_or_else(|| format!("{source:?}"));

        let key = CollectionKey::Copies(source);
        collections.get_or_create(key);
        for old in collections.clear(key) {
            world.despawn(old);
        }

        for (_, slot, transform) in &placeholders {
            let tag = FoliageCopy {
                source,
                slot: *slot,
            };
            let mut entity = world.spawn((
                Name::new(format!("{name}_copy")),
                tag,
                mesh.clone(),
                align_copy(transform),
            ));
            if selection.copies.iter().any(|(_, c)| *c == tag) {
                entity.insert(Selected);
            }
            let id = entity.id();
            collections.link(key, id);
            spawned += 1;
        }
    }
    spawned
}

/// Flip placeholder visibility. Returns the new hidden state.
pub fn toggle_placeholders<C: CollectionRepository>(world: &mut World, collections: &mut C) -> bool {
    let hidden = !collections.is_hidden(CollectionKey::Placeholders);
    collections.set_hidden(CollectionKey::Placeholders, hidden);
    let visibility = if hidden {
        Visibility::Hidden
    } else {
        Visibility::Inherited
    };
    for &entity in collections.list(CollectionKey::Placeholders) {
        if let Ok(mut e) = world.get_entity_mut(entity) {
            e.insert(visibility);
        }
    }
    hidden
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::UnitSystem;
    use crate::transform::RotationPolicy;

    fn test_world(count: usize) -> World {
        let mut world = World::new();
        init_placement_world(
            &mut world,
            FoliageSettings {
                foliage_count: count,
                seed: Some(1234),
                ..default()
            },
        );
        world.resource_mut::<UnitSettings>().apply_unreal_units();
        world
    }

    fn placeholders(world: &World) -> Vec<Entity> {
        world
            .resource::<SceneCollections>()
            .list(CollectionKey::Placeholders)
            .to_vec()
    }

    fn copies(world: &World, source: Entity) -> Vec<Entity> {
        world
            .resource::<SceneCollections>()
            .list(CollectionKey::Copies(source))
            .to_vec()
    }

    fn placed(outcome: FoliageResult<OperatorOutcome>) -> PlacementSummary {
        match outcome {
            Ok(OperatorOutcome::Placed(summary)) => summary,
            other => panic!("expected placement, got {other:?}"),
        }
    }

    #[test]
    fn test_units_gate_every_operator() {
        let mut world = World::new();
        init_placement_world(&mut world, FoliageSettings::default());
        world.resource_mut::<UnitSettings>().system = UnitSystem::Imperial;

        let result = execute_operator(&mut world, FoliageOperator::AddBaseMesh);
        assert!(matches!(result, Err(FoliageError::UnitsNotConfigured)));
        // Nothing was spawned
        assert_eq!(world.query::<&FoliageSource>().iter(&world).count(), 0);

        assert!(matches!(
            execute_operator(&mut world, FoliageOperator::ApplyUnrealUnits),
            Ok(OperatorOutcome::UnitsApplied)
        ));
        assert!(execute_operator(&mut world, FoliageOperator::AddBaseMesh).is_ok());
    }

    #[test]
    fn test_add_base_mesh_selects_it() {
        let mut world = test_world(4);
        let other = world.spawn((Name::new("other"), Selected)).id();

        let Ok(OperatorOutcome::BaseMeshAdded(mesh)) =
            execute_operator(&mut world, FoliageOperator::AddBaseMesh)
        else {
            panic!("base mesh not added");
        };
        assert!(world.get::<Selected>(other).is_none());
        assert!(world.get::<Selected>(mesh).is_some());
        assert_eq!(world.resource::<ActiveObject>().0, Some(mesh));
        assert_eq!(world.get::<MeshData>(mesh).map(|m| m.uvs.len()), Some(5));
    }

    #[test]
    fn test_availability_checks() {
        let mut world = test_world(4);
        assert!(matches!(
            execute_operator(&mut world, FoliageOperator::Spawn),
            Err(FoliageError::OperatorUnavailable { .. })
        ));
        assert!(execute_operator(&mut world, FoliageOperator::TogglePlaceholders).is_err());

        add_base_mesh(&mut world);
        // Mesh selected but no placeholders yet
        assert!(matches!(
            execute_operator(&mut world, FoliageOperator::Replace),
            Err(FoliageError::OperatorUnavailable {
                operator: FoliageOperator::Replace,
                ..
            })
        ));
        assert!(!world
            .resource::<SceneCollections>()
            .contains(CollectionKey::Placeholders));
    }

    #[test]
    fn test_spawn_creates_placeholders_and_copies() {
        let mut world = test_world(8);
        let source = add_base_mesh(&mut world);

        let summary = placed(execute_operator(&mut world, FoliageOperator::Spawn));
        assert_eq!(summary.repair, None);
        assert_eq!(
            summary.placeholders,
            PlaceholderRefresh::Regenerated {
                count: 8,
                setup: PlaceholderSetup::Created
            }
        );
        assert_eq!(summary.sources, SourceResolution::FromSelectedMeshes(vec![source]));
        assert_eq!(summary.copies_spawned, 8);

        let placeholder_entities = placeholders(&world);
        let copy_entities = copies(&world, source);
        assert_eq!(placeholder_entities.len(), 8);
        assert_eq!(copy_entities.len(), 8);

        for (slot, (&p, &c)) in placeholder_entities.iter().zip(&copy_entities).enumerate() {
            assert_eq!(world.get::<FoliagePlaceholder>(p), Some(&FoliagePlaceholder { slot }));
            assert_eq!(world.get::<FoliageCopy>(c), Some(&FoliageCopy { source, slot }));
            let pt = *world.get::<Transform>(p).unwrap();
            let ct = *world.get::<Transform>(c).unwrap();
            assert!(transforms_match(&align_copy(&pt), &ct, 1e-5));
        }

        // A second spawn clears the old set
        let summary = placed(execute_operator(&mut world, FoliageOperator::Spawn));
        assert_eq!(
            summary.placeholders,
            PlaceholderRefresh::Regenerated {
                count: 8,
                setup: PlaceholderSetup::Cleared
            }
        );
        assert_eq!(world.query::<&FoliagePlaceholder>().iter(&world).count(), 8);
        assert_eq!(world.query::<&FoliageCopy>().iter(&world).count(), 8);
    }

    #[test]
    fn test_spawn_respawns_selected_placeholders_in_place() {
        let mut world = test_world(4);
        let source = add_base_mesh(&mut world);
        execute_operator(&mut world, FoliageOperator::Spawn).unwrap();

        let before: Vec<Transform> = placeholders(&world)
            .iter()
            .map(|&e| *world.get::<Transform>(e).unwrap())
            .collect();

        let target = placeholders(&world)[2];
        deselect_all(&mut world);
        select(&mut world, target);
        select(&mut world, source);

        let summary = placed(execute_operator(&mut world, FoliageOperator::Spawn));
        assert_eq!(summary.placeholders, PlaceholderRefresh::RespawnedSelected(1));

        let after = placeholders(&world);
        assert_eq!(after.len(), 4);
        assert_eq!(after[2], target);
        for (i, &e) in after.iter().enumerate() {
            let t = *world.get::<Transform>(e).unwrap();
            if i != 2 {
                assert_eq!(t, before[i]);
            }
        }
        // Slot 2 keeps its quadrant (+, +)
        let moved = world.get::<Transform>(target).unwrap().translation;
        assert!(moved.x >= 0.0 && moved.y >= 0.0);

        // Copies follow the respawned placeholder
        let copy = copies(&world, source)[2];
        let ct = *world.get::<Transform>(copy).unwrap();
        assert!(transforms_match(
            &align_copy(world.get::<Transform>(target).unwrap()),
            &ct,
            1e-5
        ));
    }

    #[test]
    fn test_replace_keeps_placeholders() {
        let mut world = test_world(4);
        let source = add_base_mesh(&mut world);
        execute_operator(&mut world, FoliageOperator::Spawn).unwrap();
        let before = placeholders(&world);
        let old_copies = copies(&world, source);

        let summary = placed(execute_operator(&mut world, FoliageOperator::Replace));
        assert_eq!(summary.placeholders, PlaceholderRefresh::Kept);
        assert_eq!(placeholders(&world), before);

        let new_copies = copies(&world, source);
        assert_eq!(new_copies.len(), 4);
        assert!(old_copies.iter().all(|&e| world.get_entity(e).is_err()));
    }

    #[test]
    fn test_selected_copy_resolves_source_and_stays_selected() {
        let mut world = test_world(4);
        let source = add_base_mesh(&mut world);
        execute_operator(&mut world, FoliageOperator::Spawn).unwrap();

        let copy = copies(&world, source)[1];
        deselect_all(&mut world);
        select(&mut world, copy);

        let summary = placed(execute_operator(&mut world, FoliageOperator::Replace));
        assert_eq!(summary.repair, Some(PlaceholderRepair::Consistent));
        assert_eq!(summary.sources, SourceResolution::FromSelectedCopies(vec![source]));

        let selected: Vec<FoliageCopy> = world
            .query_filtered::<&FoliageCopy, With<Selected>>()
            .iter(&world)
            .copied()
            .collect();
        assert_eq!(selected, vec![FoliageCopy { source, slot: 1 }]);
    }

    #[test]
    fn test_stale_placeholders_rebuilt_from_copies() {
        let mut world = test_world(4);
        let source = add_base_mesh(&mut world);
        execute_operator(&mut world, FoliageOperator::Spawn).unwrap();

        // Move the first copy by hand and drop the last one
        let copy_entities = copies(&world, source);
        let moved = Transform::from_xyz(3.0, 4.0, 0.0);
        *world.get_mut::<Transform>(copy_entities[0]).unwrap() = moved;
        world.despawn(copy_entities[3]);
        world
            .resource_mut::<SceneCollections>()
            .get_or_create(CollectionKey::Copies(source))
            .members
            .retain(|&e| e != copy_entities[3]);

        deselect_all(&mut world);
        select(&mut world, copy_entities[0]);

        let summary = placed(execute_operator(&mut world, FoliageOperator::Replace));
        assert_eq!(summary.repair, Some(PlaceholderRepair::Rebuilt(3)));
        assert_eq!(summary.copies_spawned, 3);

        let placeholder_entities = placeholders(&world);
        assert_eq!(placeholder_entities.len(), 3);
        let first = *world.get::<Transform>(placeholder_entities[0]).unwrap();
        assert!(transforms_match(&first, &placeholder_from_copy(&moved), 1e-5));

        // Rebuilt copies line up with the moved copy
        let first_copy = copies(&world, source)[0];
        assert!(transforms_match(
            world.get::<Transform>(first_copy).unwrap(),
            &moved,
            1e-4
        ));
        assert!(world.get::<Selected>(first_copy).is_some());
    }

    #[test]
    fn test_moved_first_copy_marks_placeholders_stale() {
        let mut world = test_world(4);
        let source = add_base_mesh(&mut world);
        execute_operator(&mut world, FoliageOperator::Spawn).unwrap();

        let copy_entities = copies(&world, source);
        let before: Vec<Transform> = copy_entities
            .iter()
            .map(|&e| *world.get::<Transform>(e).unwrap())
            .collect();

        // Same count, only the slot 0 copy moved
        let moved = Transform::from_xyz(-6.0, 2.0, 0.0);
        *world.get_mut::<Transform>(copy_entities[0]).unwrap() = moved;

        deselect_all(&mut world);
        select(&mut world, copy_entities[2]);

        let summary = placed(execute_operator(&mut world, FoliageOperator::Replace));
        assert_eq!(summary.repair, Some(PlaceholderRepair::Rebuilt(4)));

        let placeholder_entities = placeholders(&world);
        assert_eq!(placeholder_entities.len(), 4);
        let first = world.get::<Transform>(placeholder_entities[0]).unwrap();
        assert!(transforms_match(first, &placeholder_from_copy(&moved), 1e-5));
        for slot in 1..4 {
            let t = world.get::<Transform>(placeholder_entities[slot]).unwrap();
            assert!(transforms_match(t, &placeholder_from_copy(&before[slot]), 1e-4));
        }

        let selected: Vec<FoliageCopy> = world
            .query_filtered::<&FoliageCopy, With<Selected>>()
            .iter(&world)
            .copied()
            .collect();
        assert_eq!(selected, vec![FoliageCopy { source, slot: 2 }]);
    }

    #[test]
    fn test_repair_realigns_other_sources() {
        let mut world = test_world(4);
        let a = add_base_mesh(&mut world);
        let b = world
            .spawn((
                Name::new("Blade_B"),
                FoliageSource,
                MeshData::blade(),
                Transform::IDENTITY,
                Selected,
            ))
            .id();
        execute_operator(&mut world, FoliageOperator::Spawn).unwrap();
        assert_eq!(copies(&world, a).len(), 4);
        assert_eq!(copies(&world, b).len(), 4);

        let moved = Transform::from_xyz(5.0, -5.0, 0.0);
        let a_copies = copies(&world, a);
        *world.get_mut::<Transform>(a_copies[0]).unwrap() = moved;
        deselect_all(&mut world);
        select(&mut world, a_copies[1]);

        let summary = placed(execute_operator(&mut world, FoliageOperator::Replace));
        assert_eq!(summary.repair, Some(PlaceholderRepair::Rebuilt(4)));
        assert_eq!(summary.sources, SourceResolution::FromSelectedCopies(vec![a]));

        // B's copies follow the rebuilt placeholders too
        let b_copies = copies(&world, b);
        assert_eq!(b_copies.len(), 4);
        assert!(transforms_match(
            world.get::<Transform>(b_copies[0]).unwrap(),
            &moved,
            1e-4
        ));

        // Going through B afterwards finds nothing to repair
        deselect_all(&mut world);
        select(&mut world, b_copies[3]);
        let summary = placed(execute_operator(&mut world, FoliageOperator::Replace));
        assert_eq!(summary.repair, Some(PlaceholderRepair::Consistent));
    }

    #[test]
    fn test_untagged_mesh_is_copied() {
        let mut world = test_world(4);
        let mesh = world
            .spawn((Name::new("Blade"), MeshData::blade(), Transform::IDENTITY, Selected))
            .id();

        let summary = placed(execute_operator(&mut world, FoliageOperator::Spawn));
        assert_eq!(summary.sources, SourceResolution::FromSelectedMeshes(vec![mesh]));
        assert_eq!(summary.copies_spawned, 4);
        assert_eq!(copies(&world, mesh).len(), 4);
        for e in copies(&world, mesh) {
            assert_eq!(world.get::<FoliageCopy>(e).map(|c| c.source), Some(mesh));
        }
    }

    #[test]
    fn test_spawn_with_only_placeholders_selected_leaves_copies() {
        let mut world = test_world(4);
        let source = add_base_mesh(&mut world);
        execute_operator(&mut world, FoliageOperator::Spawn).unwrap();
        let old_copies = copies(&world, source);

        deselect_all(&mut world);
        let first = placeholders(&world)[0];
        select(&mut world, first);
        let summary = placed(execute_operator(&mut world, FoliageOperator::Spawn));
        assert_eq!(summary.sources, SourceResolution::Empty);
        assert_eq!(summary.copies_spawned, 0);
        assert_eq!(copies(&world, source), old_copies);
    }

    #[test]
    fn test_toggle_placeholders() {
        let mut world = test_world(4);
        add_base_mesh(&mut world);
        execute_operator(&mut world, FoliageOperator::Spawn).unwrap();

        let outcome = execute_operator(&mut world, FoliageOperator::TogglePlaceholders).unwrap();
        assert_eq!(outcome, OperatorOutcome::PlaceholdersToggled { hidden: true });
        for e in placeholders(&world) {
            assert_eq!(world.get::<Visibility>(e), Some(&Visibility::Hidden));
        }

        // New placeholders inherit the hidden state
        execute_operator(&mut world, FoliageOperator::Spawn).unwrap();
        for e in placeholders(&world) {
            assert_eq!(world.get::<Visibility>(e), Some(&Visibility::Hidden));
        }

        let outcome = execute_operator(&mut world, FoliageOperator::TogglePlaceholders).unwrap();
        assert_eq!(outcome, OperatorOutcome::PlaceholdersToggled { hidden: false });
        for e in placeholders(&world) {
            assert_eq!(world.get::<Visibility>(e), Some(&Visibility::Inherited));
        }
    }

    #[test]
    fn test_invalid_settings_abort_before_mutation() {
        let mut world = test_world(4);
        add_base_mesh(&mut world);
        world.resource_mut::<FoliageSettings>().max_scale_offset = -150.0;

        assert!(matches!(
            execute_operator(&mut world, FoliageOperator::Spawn),
            Err(FoliageError::InvalidSettings(_))
        ));
        assert!(!world
            .resource::<SceneCollections>()
            .contains(CollectionKey::Placeholders));
    }

    #[test]
    fn test_seeded_spawn_is_reproducible() {
        let spawn = |policy| {
            let mut world = World::new();
            init_placement_world(
                &mut world,
                FoliageSettings {
                    seed: Some(77),
                    rotation_policy: policy,
                    ..default()
                },
            );
            world.resource_mut::<UnitSettings>().apply_unreal_units();
            add_base_mesh(&mut world);
            execute_operator(&mut world, FoliageOperator::Spawn).unwrap();
            placeholders(&world)
                .iter()
                .map(|&e| *world.get::<Transform>(e).unwrap())
                .collect::<Vec<_>>()
        };

        assert_eq!(spawn(RotationPolicy::DistanceScaled), spawn(RotationPolicy::DistanceScaled));
        assert_ne!(spawn(RotationPolicy::DistanceScaled), spawn(RotationPolicy::UniformRandom));
    }
}
