//! The grass blade template copied into clumps.

use bevy::asset::RenderAssetUsages;
use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::prelude::*;

pub const BASE_MESH_NAME: &str = "PivotPainter2_BaseMesh";

/// Margin kept around the UV island.
pub const UV_MARGIN: f32 = 0.001;

/// Polygon mesh data attached to mesh objects in the scene.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    /// Polygons as vertex index loops.
    pub faces: Vec<Vec<u32>>,
    /// One UV per vertex. Empty until unwrapped.
    pub uvs: Vec<Vec2>,
}

impl MeshData {
    /// Blade authored along +X in the XY plane: a quad base tapering to a tip at x = 50.
    pub fn blade() -> Self {
        Self {
            positions: vec![
                Vec3::new(0.0, 2.0, 0.0),
                Vec3::new(0.0, -2.0, 0.0),
                Vec3::new(25.0, -1.0, 0.0),
                Vec3::new(25.0, 1.0, 0.0),
                Vec3::new(50.0, 0.0, 0.0),
            ],
            faces: vec![vec![0, 1, 2, 3], vec![4, 3, 2]],
            uvs: Vec::new(),
        }
    }

    /// Planar unwrap of the XY plane into the unit square, preserving aspect ratio.
    pub fn unwrap_planar(&mut self, margin: f32) {
        if self.positions.is_empty() {
            self.uvs.clear();
            return;
        }

        let mut min = Vec2::splat(f32::MAX);
        let mut max = Vec2::splat(f32::MIN);
        for p in &self.positions {
            min = min.min(p.truncate());
            max = max.max(p.truncate());
        }
        let extent = (max - min).max_element().max(f32::EPSILON);
        let usable = 1.0 - 2.0 * margin;

        self.uvs = self
            .positions
            .iter()
            .map(|p| Vec2::splat(margin) + (p.truncate() - min) / extent * usable)
            .collect();
    }

    /// Fan-triangulated index list.
    pub fn triangle_indices(&self) -> Vec<u32> {
        let mut indices = Vec::new();
        for face in &self.faces {
            for i in 1..face.len().saturating_sub(1) {
                indices.push(face[0]);
                indices.push(face[i]);
                indices.push(face[i + 1]);
            }
        }
        indices
    }

    /// Build a renderable mesh. Normals face +Z.
    pub fn to_mesh(&self) -> Mesh {
        let positions: Vec<[f32; 3]> = self.positions.iter().map(|p| p.to_array()).collect();
        let normals = vec![[0.0, 0.0, 1.0]; positions.len()];
        let uvs: Vec<[f32; 2]> = if self.uvs.len() == self.positions.len() {
            self.uvs.iter().map(|uv| uv.to_array()).collect()
        } else {
            vec![[0.0, 0.0]; positions.len()]
        };

        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
        mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
        mesh.insert_indices(Indices::U32(self.triangle_indices()));
        mesh
    }
}
