//! Randomized placement transforms for foliage clumps.
//!
//! Authoring space is Z-up: instances are scattered on the XY plane around the
//! origin and the canonical blade mesh is authored along +X.

use bevy::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// World up axis of the authoring space.
pub const WORLD_UP: Vec3 = Vec3::Z;

/// Rotation applied on top of a placeholder's orientation when aligning a copy.
/// Compensates for the base mesh being authored along +X instead of +Z.
pub const COPY_AXIS_OFFSET_DEGREES: f32 = -90.0;

/// How the per-instance tilt about local Y is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RotationPolicy {
    /// Tilt grows with distance from the origin, reaching the max at `max_distance`.
    #[default]
    DistanceScaled,
    /// Tilt is drawn uniformly, unrelated to distance.
    UniformRandom,
}

/// Inputs to [`random_transform`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatterParams {
    pub max_rotation_degrees: f32,
    pub max_distance: f32,
    /// Offset from 100%; may be negative.
    pub max_scale_offset_percent: f32,
    pub rotation_policy: RotationPolicy,
}

/// A generated instance placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: f32,
    /// Tilt about the instance's local Y axis, in degrees.
    pub yaw_degrees: f32,
}

impl PlacementTransform {
    /// `Translation * Scale * Rotation`.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.translation)
            * Mat4::from_scale(Vec3::splat(self.scale))
            * Mat4::from_quat(self.rotation)
    }

    pub fn rotation_matrix(&self) -> Mat3 {
        Mat3::from_quat(self.rotation)
    }

    pub fn to_transform(&self) -> Transform {
        Transform {
            translation: self.translation,
            rotation: self.rotation,
            scale: Vec3::splat(self.scale),
        }
    }
}

/// Axis signs for a slot. Every run of four consecutive slots covers all four
/// quadrants in the order (-,+), (-,-), (+,+), (+,-).
pub fn quadrant_signs(slot: usize) -> Vec2 {
    let x = if slot % 4 < 2 { -1.0 } else { 1.0 };
    let y = if slot % 2 == 0 { 1.0 } else { -1.0 };
    Vec2::new(x, y)
}

/// Uniform draw in [0, 1] with whole-percent resolution.
fn unit_percent<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    rng.gen_range(0..=100u32) as f32 / 100.0
}

/// Inclusive scale bounds (as factors, not percent) for a scale offset.
pub fn scale_bounds(max_scale_offset_percent: f32) -> (f32, f32) {
    let a: f32 = 100.0;
    let b = 100.0 + max_scale_offset_percent;
    (a.min(b) / 100.0, a.max(b) / 100.0)
}

/// Radial frame for a position on the ground plane: X points away from the
/// origin, Z is world up. Positions at the origin use +X.
pub fn radial_basis(position: Vec3) -> Mat3 {
    let flat = Vec3::new(position.x, position.y, 0.0);
    let x_axis = flat.try_normalize().unwrap_or(Vec3::X);
    let z_axis = WORLD_UP;
    let y_axis = z_axis.cross(x_axis).normalize();
    Mat3::from_cols(x_axis, y_axis, z_axis)
}

/// Generate the placement for one instance in slot `slot`.
pub fn random_transform<R: Rng + ?Sized>(
    rng: &mut R,
    params: &ScatterParams,
    slot: usize,
) -> PlacementTransform {
    let signs = quadrant_signs(slot);
    let x = params.max_distance * unit_percent(rng) * signs.x;
    let y = params.max_distance * unit_percent(rng) * signs.y;
    let translation = Vec3::new(x, y, 0.0);

    let yaw_degrees = match params.rotation_policy {
        RotationPolicy::DistanceScaled => {
            if params.max_distance > 0.0 {
                let ratio = (translation.length() / params.max_distance).min(1.0);
                params.max_rotation_degrees * ratio
            } else {
                0.0
            }
        }
        RotationPolicy::UniformRandom => params.max_rotation_degrees * unit_percent(rng),
    };

    let (scale_min, scale_max) = scale_bounds(params.max_scale_offset_percent);
    let scale = if scale_max > scale_min {
        rng.gen_range(scale_min..=scale_max)
    } else {
        scale_min
    };

    let rotation = radial_basis(translation) * Mat3::from_rotation_y(yaw_degrees.to_radians());

    PlacementTransform {
        translation,
        rotation: Quat::from_mat3(&rotation).normalize(),
        scale,
        yaw_degrees,
    }
}

/// Copy rotation for a placeholder rotation.
pub fn align_copy_rotation(placeholder: Quat) -> Quat {
    placeholder * Quat::from_rotation_y(COPY_AXIS_OFFSET_DEGREES.to_radians())
}

/// Transform a foliage copy takes when aligned to a placeholder.
pub fn align_copy(placeholder: &Transform) -> Transform {
    Transform {
        translation: placeholder.translation,
        rotation: align_copy_rotation(placeholder.rotation),
        scale: placeholder.scale,
    }
}

/// Inverse of [`align_copy`]: the placeholder a copy was aligned to.
pub fn placeholder_from_copy(copy: &Transform) -> Transform {
    Transform {
        translation: copy.translation,
        rotation: (copy.rotation
            * Quat::from_rotation_y(-COPY_AXIS_OFFSET_DEGREES.to_radians()))
        .normalize(),
        scale: copy.scale,
    }
}

/// Loose comparison used to decide whether two transforms still describe the same placement.
pub fn transforms_match(a: &Transform, b: &Transform, epsilon: f32) -> bool {
    a.translation.abs_diff_eq(b.translation, epsilon)
        && a.scale.abs_diff_eq(b.scale, epsilon)
        // q and -q are the same rotation
        && a.rotation.dot(b.rotation).abs() >= 1.0 - epsilon
}
