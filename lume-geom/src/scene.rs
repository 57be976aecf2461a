//! Raw scene handed over by an importer.
//!
//! Everything is stored in flat arrays and cross-referenced by index. The
//! compiler only reads this data, except for the merge stage (which rewrites
//! mesh indices) and the pre-transform.

use glam::{Mat4, Vec2, Vec3};

pub const MAX_UV_CHANNELS: usize = 4;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RawVertex {
    pub position: Vec3,
    pub uvs: [Vec2; MAX_UV_CHANNELS],
    pub color: [u8; 4],
    pub normal: Vec3,
    pub tangent: Vec3,
    pub binormal: Vec3,
    pub uv_count: u8,
    pub color_count: u8,
    pub normal_count: u8,
    pub tangent_count: u8,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RawFacet {
    pub vertices: [u32; 3],
    pub mesh: u32,
    pub material: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawMesh {
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawMaterialInstance {
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawNode {
    pub name: String,
    pub meshes: Vec<u32>,
    pub children: Vec<RawNode>,
}

#[derive(Clone, Debug, Default)]
pub struct RawScene {
    pub meshes: Vec<RawMesh>,
    pub vertices: Vec<RawVertex>,
    pub facets: Vec<RawFacet>,
    pub material_instances: Vec<RawMaterialInstance>,
    pub root: RawNode,
}

impl RawScene {
    pub fn find_mesh(&self, name: &str) -> Option<usize> {
        self.meshes.iter().position(|m| m.name == name)
    }

    pub fn find_material(&self, name: &str) -> Option<usize> {
        self.material_instances.iter().position(|m| m.name == name)
    }

    /// Applies `transform` to every vertex. Directions use the matching
    /// linear part (normals use its inverse transpose).
    pub fn transform(&mut self, transform: &Mat4) {
        let linear = glam::Mat3::from_mat4(*transform);
        let normal_matrix = linear.inverse().transpose();

        for v in &mut self.vertices {
            v.position = transform.transform_point3(v.position);
            v.normal = normal_matrix * v.normal;
            v.tangent = linear * v.tangent;
            v.binormal = linear * v.binormal;
        }
    }
}
