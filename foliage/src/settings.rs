//! User-facing placement options and scene unit settings.

use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{FoliageError, FoliageResult};
use crate::transform::{RotationPolicy, ScatterParams};

/// Unit scale expected by the game engine the clumps are exported to (1 unit = 1 cm).
pub const UNREAL_UNIT_SCALE: f32 = 0.01;
/// View clip distance applied together with the unit scale.
pub const UNREAL_CLIP_END: f32 = 10_000.0;

/// Placement options, mirrored from the tool panel.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoliageSettings {
    /// Number of placeholders per spawn. Multiples of 4 give an even quadrant spread.
    pub foliage_count: usize,
    /// Random position offset from the origin.
    pub max_distance: f32,
    /// Max tilt in degrees.
    pub max_rotation: f32,
    /// Random scale offset in percent.
    pub max_scale_offset: f32,
    pub rotation_policy: RotationPolicy,
    /// Fixed seed for reproducible scatters. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for FoliageSettings {
    fn default() -> Self {
        Self {
            foliage_count: 12,
            max_distance: 20.0,
            max_rotation: 10.0,
            max_scale_offset: 50.0,
            rotation_policy: RotationPolicy::DistanceScaled,
            seed: None,
        }
    }
}

impl FoliageSettings {
    pub fn scatter_params(&self) -> ScatterParams {
        ScatterParams {
            max_rotation_degrees: self.max_rotation,
            max_distance: self.max_distance,
            max_scale_offset_percent: self.max_scale_offset,
            rotation_policy: self.rotation_policy,
        }
    }

    pub fn validate(&self) -> FoliageResult<()> {
        if !self.max_distance.is_finite() || self.max_distance < 0.0 {
            return Err(FoliageError::InvalidSettings(format!(
                "max_distance must be >= 0, got {}",
                self.max_distance
            )));
        }
        if !self.max_rotation.is_finite() || self.max_rotation < 0.0 {
            return Err(FoliageError::InvalidSettings(format!(
                "max_rotation must be >= 0, got {}",
                self.max_rotation
            )));
        }
        // A scale of zero or below collapses or mirrors the copies
        if !self.max_scale_offset.is_finite() || self.max_scale_offset <= -100.0 {
            return Err(FoliageError::InvalidSettings(format!(
                "max_scale_offset must be > -100, got {}",
                self.max_scale_offset
            )));
        }
        Ok(())
    }

    pub fn from_ron_str(text: &str) -> FoliageResult<Self> {
        let settings: FoliageSettings = ron::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> FoliageResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron_str(&text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitSystem {
    None,
    Metric,
    Imperial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthUnit {
    Adaptive,
    Centimeters,
    Meters,
}

/// Scene unit configuration.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct UnitSettings {
    pub system: UnitSystem,
    pub scale_length: f32,
    pub length_unit: LengthUnit,
    pub clip_end: f32,
}

impl Default for UnitSettings {
    fn default() -> Self {
        Self {
            system: UnitSystem::Metric,
            scale_length: 1.0,
            length_unit: LengthUnit::Meters,
            clip_end: 1000.0,
        }
    }
}

impl UnitSettings {
    /// Metric at 0.01 scale in meters, with the view clip pushed out to 100m.
    pub fn apply_unreal_units(&mut self) {
        self.system = UnitSystem::Metric;
        self.scale_length = UNREAL_UNIT_SCALE;
        self.length_unit = LengthUnit::Meters;
        self.clip_end = UNREAL_CLIP_END;
    }

    pub fn is_unreal_units(&self) -> bool {
        let rounded = (self.scale_length * 100.0).round() / 100.0;
        self.system == UnitSystem::Metric && rounded == UNREAL_UNIT_SCALE
    }

    pub fn require_unreal_units(&self) -> FoliageResult<()> {
        if self.is_unreal_units() {
            Ok(())
        } else {
            Err(FoliageError::UnitsNotConfigured)
        }
    }
}
