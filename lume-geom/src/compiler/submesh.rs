//! Splits the raw facet list into per-material submeshes with their own
//! vertex arrays.

use crate::scene::{MAX_UV_CHANNELS, RawScene};
use glam::{Vec2, Vec3};
use log::warn;

const UNMAPPED: u32 = u32::MAX;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct CompilerVertex {
    pub position: Vec3,
    pub uvs: [Vec2; MAX_UV_CHANNELS],
    pub color: [u8; 4],
    pub normal: Vec3,
    pub tangent: Vec3,
    pub binormal: Vec3,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LodLevel {
    pub screen_area: f32,
    pub indices: Vec<u32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompilerSubMesh {
    pub vertices: Vec<CompilerVertex>,
    /// Full detail triangles.
    pub indices: Vec<u32>,
    /// Simplified levels 1..n, all indexing `vertices`.
    pub lods: Vec<LodLevel>,
    pub material: u32,
    pub uv_count: u8,
    pub has_color: bool,
    pub has_normal: bool,
    pub has_btn: bool,
}

impl CompilerSubMesh {
    pub fn positions(&self) -> Vec<Vec3> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    /// Index buffer for `level`. Levels past the last generated one reuse the
    /// coarsest available.
    pub fn lod_indices(&self, level: usize) -> &[u32] {
        if level == 0 {
            return &self.indices;
        }
        self.lods
            .get(level - 1)
            .or(self.lods.last())
            .map_or(&self.indices, |lod| &lod.indices)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompilerMesh {
    pub name: String,
    pub submeshes: Vec<CompilerSubMesh>,
}

impl CompilerMesh {
    pub fn lod_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.lods.len()).max().unwrap_or(0) + 1
    }
}

/// Facets must arrive grouped by mesh and, inside a mesh, by material.
/// Vertices are shared inside a submesh when facets reference the same raw
/// vertex index.
pub fn build_compiler_meshes(scene: &RawScene) -> Vec<CompilerMesh> {
    let mut meshes: Vec<CompilerMesh> = scene
        .meshes
        .iter()
        .map(|m| CompilerMesh { name: m.name.clone(), submeshes: Vec::new() })
        .collect();

    let mut vertex_remap = vec![UNMAPPED; scene.vertices.len()];
    let mut touched: Vec<u32> = Vec::new();
    let mut material_to_submesh = vec![UNMAPPED; scene.material_instances.len()];
    let mut current_mesh: Option<u32> = None;
    let mut current_material = 0;

    for facet in &scene.facets {
        if current_mesh != Some(facet.mesh) {
            assert!(
                current_mesh.is_none_or(|m| m < facet.mesh),
                "facets are not grouped by mesh (mesh {} after {:?})",
                facet.mesh,
                current_mesh
            );
            current_mesh = Some(facet.mesh);
            material_to_submesh.fill(UNMAPPED);
        }

        let mesh = &mut meshes[facet.mesh as usize];
        let material = facet.material as usize;

        if material_to_submesh[material] == UNMAPPED {
            material_to_submesh[material] = mesh.submeshes.len() as u32;
            mesh.submeshes.push(CompilerSubMesh { material: facet.material, ..Default::default() });

            for raw in touched.drain(..) {
                vertex_remap[raw as usize] = UNMAPPED;
            }
            current_material = facet.material;
        } else {
            assert_eq!(
                current_material, facet.material,
                "facets of mesh '{}' are not grouped by material",
                mesh.name
            );
        }

        let submesh = &mut mesh.submeshes[material_to_submesh[material] as usize];

        for &raw in &facet.vertices {
            if vertex_remap[raw as usize] == UNMAPPED {
                vertex_remap[raw as usize] = submesh.vertices.len() as u32;
                touched.push(raw);

                let src = &scene.vertices[raw as usize];
                let mut vertex = CompilerVertex {
                    position: src.position,
                    uvs: [Vec2::ZERO; MAX_UV_CHANNELS],
                    color: src.color,
                    normal: src.normal,
                    tangent: src.tangent,
                    binormal: src.binormal,
                };

                submesh.has_btn |= src.tangent_count > 0;
                submesh.has_normal |= src.normal_count > 0;
                submesh.has_color |= src.color_count > 0;

                // The first vertex settles the channel count. Later vertices
                // with fewer channels leave the missing ones zeroed.
                let available = (src.uv_count as usize).min(MAX_UV_CHANNELS);
                if submesh.vertices.is_empty() {
                    submesh.uv_count = src.uv_count;
                } else if src.uv_count < submesh.uv_count {
                    warn!(
                        "Found a vertex with an inconsistent set of uvs (expecting {}, found {}) in mesh '{}'",
                        submesh.uv_count, src.uv_count, mesh.name
                    );
                }
                vertex.uvs[..available].copy_from_slice(&src.uvs[..available]);

                submesh.vertices.push(vertex);
            }

            let local = vertex_remap[raw as usize];
            debug_assert!((local as usize) < submesh.vertices.len());
            submesh.indices.push(local);
        }
    }

    meshes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::*;

    fn vertex(x: f32, uv_count: u8) -> RawVertex {
        RawVertex {
            position: Vec3::new(x, 0.0, 0.0),
            uvs: [Vec2::splat(x); MAX_UV_CHANNELS],
            uv_count,
            ..Default::default()
        }
    }

    fn facet(vertices: [u32; 3], mesh: u32, material: u32) -> RawFacet {
        RawFacet { vertices, mesh, material }
    }

    fn scene(vertices: Vec<RawVertex>, facets: Vec<RawFacet>, meshes: usize, materials: usize) -> RawScene {
        RawScene {
            meshes: (0..meshes).map(|i| RawMesh { name: format!("mesh{}", i) }).collect(),
            vertices,
            facets,
            material_instances: (0..materials).map(|i| RawMaterialInstance { name: format!("mat{}", i) }).collect(),
            root: RawNode::default(),
        }
    }

    #[test]
    fn splits_by_mesh_and_material_and_shares_vertices() {
        let vertices = (0..6).map(|i| vertex(i as f32, 1)).collect();
        let facets = vec![
            facet([0, 1, 2], 0, 1),
            facet([2, 1, 3], 0, 1),
            facet([3, 4, 5], 0, 0),
            facet([0, 1, 2], 1, 1),
        ];
        let meshes = build_compiler_meshes(&scene(vertices, facets, 2, 2));

        assert_eq!(meshes.len(), 2);
        let first = &meshes[0];
        assert_eq!(first.submeshes.len(), 2);
        assert_eq!(first.submeshes[0].material, 1);
        assert_eq!(first.submeshes[0].vertices.len(), 4);
        assert_eq!(first.submeshes[0].indices, vec![0, 1, 2, 2, 1, 3]);

        // vertex 3 was already used by the previous submesh, it gets a fresh slot
        assert_eq!(first.submeshes[1].material, 0);
        assert_eq!(first.submeshes[1].indices, vec![0, 1, 2]);
        assert_eq!(first.submeshes[1].vertices[0].position.x, 3.0);

        assert_eq!(meshes[1].submeshes.len(), 1);
        assert_eq!(meshes[1].submeshes[0].vertices.len(), 3);

        for mesh in &meshes {
            for sub in &mesh.submeshes {
                assert!(sub.indices.iter().all(|&i| (i as usize) < sub.vertices.len()));
            }
        }
    }

    #[test]
    fn first_vertex_sets_uv_count() {
        let vertices = vec![vertex(0.0, 2), vertex(1.0, 2), vertex(2.0, 2), vertex(3.0, 1)];
        let facets = vec![facet([0, 1, 2], 0, 0), facet([1, 2, 3], 0, 0)];
        let meshes = build_compiler_meshes(&scene(vertices, facets, 1, 1));

        let sub = &meshes[0].submeshes[0];
        assert_eq!(sub.uv_count, 2);
        assert_eq!(sub.vertices[3].uvs[0], Vec2::splat(3.0));
        assert_eq!(sub.vertices[3].uvs[1], Vec2::ZERO);

        let vertices = vec![vertex(0.0, 1), vertex(1.0, 3), vertex(2.0, 3)];
        let meshes = build_compiler_meshes(&scene(vertices, vec![facet([0, 1, 2], 0, 0)], 1, 1));
        assert_eq!(meshes[0].submeshes[0].uv_count, 1);
    }

    #[test]
    fn presence_flags_accumulate() {
        let mut vertices: Vec<RawVertex> = (0..3).map(|i| vertex(i as f32, 0)).collect();
        vertices[2].tangent_count = 1;
        vertices[1].color_count = 1;
        let meshes = build_compiler_meshes(&scene(vertices, vec![facet([0, 1, 2], 0, 0)], 1, 1));

        let sub = &meshes[0].submeshes[0];
        assert!(sub.has_btn);
        assert!(sub.has_color);
        assert!(!sub.has_normal);
    }

    #[test]
    #[should_panic(expected = "not grouped by material")]
    fn interleaved_materials_are_rejected() {
        let vertices = (0..3).map(|i| vertex(i as f32, 0)).collect();
        let facets = vec![facet([0, 1, 2], 0, 0), facet([0, 1, 2], 0, 1), facet([0, 1, 2], 0, 0)];
        build_compiler_meshes(&scene(vertices, facets, 1, 2));
    }

    #[test]
    fn lod_indices_fall_back_to_coarsest() {
        let sub = CompilerSubMesh {
            indices: vec![0, 1, 2, 2, 1, 3],
            lods: vec![LodLevel { screen_area: 0.5, indices: vec![0, 1, 2] }],
            ..Default::default()
        };
        assert_eq!(sub.lod_indices(0).len(), 6);
        assert_eq!(sub.lod_indices(1).len(), 3);
        assert_eq!(sub.lod_indices(2).len(), 3);
    }
}
