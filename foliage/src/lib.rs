//! Foliage clump placement.
//!
//! Scatters placeholder transforms around the origin and keeps copies of a
//! source mesh aligned to them. Scene state lives in a Bevy `World`.

pub mod base_mesh;
pub mod collections;
pub mod error;
pub mod export;
pub mod placement;
pub mod plugin;
pub mod settings;
pub mod transform;

pub use base_mesh::MeshData;
pub use collections::{CollectionKey, CollectionRepository, SceneCollections};
pub use error::{FoliageError, FoliageResult};
pub use export::{export_scene, SceneExport};
pub use placement::{
    execute_operator, FoliageCopy, FoliageOperator, FoliagePlaceholder, FoliageSource,
    OperatorOutcome, Selected,
};
pub use plugin::{FoliagePlacementPlugin, OperatorReport, OperatorRequest};
pub use settings::{FoliageSettings, UnitSettings};
pub use transform::{random_transform, PlacementTransform, RotationPolicy, ScatterParams};
