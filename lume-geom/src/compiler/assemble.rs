//! Lays out the mesh/LOD/submesh/cluster tables and the GPU blob.

use super::optimizer::ClusterOptimizer;
use super::partition::{ClusterOutput, ClusterSettings, partition_submesh};
use super::submesh::CompilerMesh;
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::resource::{BBox, Cluster, GeomResource, Lod, MaterialInstanceRef, Mesh, SubMesh, encode_mesh_name};
use crate::scene::RawMaterialInstance;
use crate::{BLOB_ALIGNMENT, Vertex, VertexExtras};
use glam::Vec3;
use log::{debug, info};
use rayon::prelude::*;

/// One independently partitioned index list.
#[derive(Copy, Clone, Debug)]
struct Unit {
    mesh: usize,
    level: usize,
    submesh: usize,
}

fn checked<T: TryFrom<usize>>(table: &'static str, count: usize) -> Result<T> {
    T::try_from(count).map_err(|_| Error::TableOverflow { table, count })
}

fn align_up(offset: usize) -> usize {
    offset.div_ceil(BLOB_ALIGNMENT) * BLOB_ALIGNMENT
}

/// Average edge length over every level's triangles.
fn world_pixel_size(mesh: &CompilerMesh) -> f32 {
    let mut total = 0.0f64;
    let mut edges = 0usize;
    for submesh in &mesh.submeshes {
        let levels = std::iter::once(&submesh.indices).chain(submesh.lods.iter().map(|l| &l.indices));
        for indices in levels {
            for tri in indices.chunks_exact(3) {
                let p = [tri[0], tri[1], tri[2]].map(|i| submesh.vertices[i as usize].position);
                total += (p[0].distance(p[1]) + p[1].distance(p[2]) + p[2].distance(p[0])) as f64;
                edges += 3;
            }
        }
    }
    if edges == 0 { 0.0 } else { (total / edges as f64) as f32 }
}

/// Screen area of `level`, taken from the first submesh that has it.
fn level_screen_area(mesh: &CompilerMesh, level: usize) -> f32 {
    if level == 0 {
        return 1.0;
    }
    mesh.submeshes
        .iter()
        .find_map(|s| s.lods.get(level - 1))
        .map_or(0.0, |l| l.screen_area)
}

/// Resolves each raw material by name against the descriptor bindings.
pub fn resolve_default_materials(
    materials: &[RawMaterialInstance],
    descriptor: &Descriptor,
) -> Vec<MaterialInstanceRef> {
    materials
        .iter()
        .map(|m| match descriptor.find_material(&m.name) {
            Some(binding) => binding.instance,
            None => {
                debug!("No default instance bound to material '{}'", m.name);
                MaterialInstanceRef::NULL
            }
        })
        .collect()
}

pub fn assemble(
    meshes: &[CompilerMesh],
    materials: &[RawMaterialInstance],
    descriptor: &Descriptor,
    optimizer: &dyn ClusterOptimizer,
) -> Result<GeomResource> {
    let settings = ClusterSettings::from_precision(descriptor.target_precision);

    let mut units = Vec::new();
    for (m, mesh) in meshes.iter().enumerate() {
        for level in 0..mesh.lod_count() {
            for s in 0..mesh.submeshes.len() {
                units.push(Unit { mesh: m, level, submesh: s });
            }
        }
    }

    let outputs: Vec<ClusterOutput> = units
        .par_iter()
        .map(|unit| {
            let submesh = &meshes[unit.mesh].submeshes[unit.submesh];
            partition_submesh(submesh, submesh.lod_indices(unit.level), &settings, optimizer)
        })
        .collect::<Result<_>>()?;

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut extras: Vec<VertexExtras> = Vec::new();
    let mut indices: Vec<u16> = Vec::new();
    let mut submesh_entries = Vec::with_capacity(units.len());

    for (unit, output) in units.iter().zip(outputs) {
        let cluster_start: u16 = checked("cluster", clusters.len())?;
        let index_base: u32 = checked("index", indices.len())?;
        let vertex_base: u32 = checked("vertex", vertices.len())?;
        for mut cluster in output.clusters {
            assert!(cluster.vertex_count as usize <= crate::MAX_CLUSTER_VERTICES);
            cluster.index_start += index_base;
            cluster.vertex_start += vertex_base;
            clusters.push(cluster);
        }
        indices.extend(output.indices.iter().map(|&i| {
            assert!(i < 0xFFFF, "cluster index {} collides with the restart value", i);
            i as u16
        }));
        vertices.extend(output.vertices);
        extras.extend(output.extras);

        let submesh = &meshes[unit.mesh].submeshes[unit.submesh];
        debug!(
            "Mesh '{}' LOD {} material {}: {} clusters",
            meshes[unit.mesh].name,
            unit.level,
            submesh.material,
            clusters.len() - cluster_start as usize
        );
        submesh_entries.push(SubMesh {
            cluster_start,
            cluster_count: checked("cluster", clusters.len() - cluster_start as usize)?,
            material: checked("material instance", submesh.material as usize)?,
        });
    }
    assert!(!clusters.is_empty(), "compiled resource has no clusters");
    checked::<u16>("cluster", clusters.len())?;

    let mut mesh_entries = Vec::with_capacity(meshes.len());
    let mut lod_entries = Vec::new();
    let mut bbox = BBox::EMPTY;
    let mut next_submesh = 0usize;
    for mesh in meshes {
        let lod_start = checked("lod", lod_entries.len())?;
        let mut mesh_bbox = BBox::EMPTY;
        for level in 0..mesh.lod_count() {
            let submesh_start = next_submesh;
            next_submesh += mesh.submeshes.len();
            for entry in &submesh_entries[submesh_start..next_submesh] {
                let start = entry.cluster_start as usize;
                for cluster in &clusters[start..start + entry.cluster_count as usize] {
                    mesh_bbox.extend(Vec3::from_array(cluster.bbox.min));
                    mesh_bbox.extend(Vec3::from_array(cluster.bbox.max));
                }
            }
            lod_entries.push(Lod {
                screen_area: level_screen_area(mesh, level),
                submesh_start: checked("submesh", submesh_start)?,
                submesh_count: checked("submesh", mesh.submeshes.len())?,
            });
        }
        if !mesh_bbox.is_empty() {
            bbox.extend(Vec3::from_array(mesh_bbox.min));
            bbox.extend(Vec3::from_array(mesh_bbox.max));
        }
        mesh_entries.push(Mesh {
            name: encode_mesh_name(&mesh.name),
            world_pixel_size: world_pixel_size(mesh),
            bbox: mesh_bbox,
            lod_count: checked("lod", mesh.lod_count())?,
            lod_start,
        });
    }
    checked::<u16>("submesh", submesh_entries.len())?;
    checked::<u16>("lod", lod_entries.len())?;
    checked::<u16>("mesh", mesh_entries.len())?;

    let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
    let extras_bytes: &[u8] = bytemuck::cast_slice(&extras);
    let index_bytes: &[u8] = bytemuck::cast_slice(&indices);
    let vertex_offset = 0;
    let extras_offset = align_up(vertex_offset + vertex_bytes.len());
    let index_offset = align_up(extras_offset + extras_bytes.len());
    let mut data = vec![0u8; align_up(index_offset + index_bytes.len())];
    data[vertex_offset..vertex_offset + vertex_bytes.len()].copy_from_slice(vertex_bytes);
    data[extras_offset..extras_offset + extras_bytes.len()].copy_from_slice(extras_bytes);
    data[index_offset..index_offset + index_bytes.len()].copy_from_slice(index_bytes);

    info!(
        "Assembled {} meshes, {} LODs, {} submeshes, {} clusters, {} vertices, {} indices ({} byte blob)",
        mesh_entries.len(),
        lod_entries.len(),
        submesh_entries.len(),
        clusters.len(),
        vertices.len(),
        indices.len(),
        data.len()
    );

    Ok(GeomResource {
        meshes: mesh_entries,
        lods: lod_entries,
        submeshes: submesh_entries,
        clusters,
        default_material_instances: resolve_default_materials(materials, descriptor),
        data,
        runtime_space: [0; 6],
        bbox,
        vertex_offset: vertex_offset as u64,
        extras_offset: extras_offset as u64,
        index_offset: index_offset as u64,
        vertex_count: checked("vertex", vertices.len())?,
        index_count: checked("index", indices.len())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::optimizer::Meshopt;
    use crate::compiler::submesh::{CompilerSubMesh, CompilerVertex, LodLevel};
    use crate::descriptor::MaterialBinding;
    use approx::assert_relative_eq;
    use glam::Vec2;

    fn quad(offset: Vec3, material: u32) -> CompilerSubMesh {
        let corners = [Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y];
        CompilerSubMesh {
            vertices: corners
                .iter()
                .map(|&p| CompilerVertex {
                    position: p + offset,
                    uvs: [Vec2::new(p.x, p.y), Vec2::ZERO, Vec2::ZERO, Vec2::ZERO],
                    normal: Vec3::Z,
                    ..Default::default()
                })
                .collect(),
            indices: vec![0, 1, 2, 0, 2, 3],
            material,
            uv_count: 1,
            has_normal: true,
            ..Default::default()
        }
    }

    fn materials(names: &[&str]) -> Vec<RawMaterialInstance> {
        names.iter().map(|n| RawMaterialInstance { name: n.to_string() }).collect()
    }

    fn scene_meshes() -> Vec<CompilerMesh> {
        let mut lodded = quad(Vec3::ZERO, 0);
        lodded.lods.push(LodLevel { screen_area: 0.25, indices: vec![0, 1, 2] });
        vec![
            CompilerMesh { name: "Table".into(), submeshes: vec![lodded, quad(Vec3::Z, 1)] },
            CompilerMesh { name: "Chair".into(), submeshes: vec![quad(Vec3::new(5.0, 0.0, 0.0), 1)] },
        ]
    }

    #[test]
    fn blob_regions_are_aligned_and_ordered() {
        let geom = assemble(&scene_meshes(), &materials(&["Wood", "Metal"]), &Descriptor::default(), &Meshopt).unwrap();

        for offset in [geom.vertex_offset, geom.extras_offset, geom.index_offset] {
            assert_eq!(offset % BLOB_ALIGNMENT as u64, 0);
        }
        assert!(geom.vertex_offset < geom.extras_offset);
        assert!(geom.extras_offset < geom.index_offset);
        assert!(geom.index_offset <= geom.data.len() as u64);
        assert_eq!(geom.data.len() % BLOB_ALIGNMENT, 0);
        assert_eq!(geom.runtime_space, [0; 6]);
    }

    #[test]
    fn tables_reference_contiguous_ranges() {
        let geom = assemble(&scene_meshes(), &materials(&["Wood", "Metal"]), &Descriptor::default(), &Meshopt).unwrap();

        assert_eq!(geom.meshes.len(), 2);
        assert_eq!(geom.meshes[0].name(), "Table");
        assert_eq!((geom.meshes[0].lod_start, geom.meshes[0].lod_count), (0, 2));
        assert_eq!((geom.meshes[1].lod_start, geom.meshes[1].lod_count), (2, 1));
        assert_eq!(geom.lods[0].screen_area, 1.0);
        assert_eq!(geom.lods[1].screen_area, 0.25);

        let mut next_submesh = 0;
        for lod in &geom.lods {
            assert_eq!(lod.submesh_start, next_submesh);
            next_submesh += lod.submesh_count;
        }
        assert_eq!(next_submesh as usize, geom.submeshes.len());

        let mut next_cluster = 0;
        let mut next_index = 0;
        for submesh in &geom.submeshes {
            assert_eq!(submesh.cluster_start, next_cluster);
            next_cluster += submesh.cluster_count;
            for cluster in &geom.clusters[submesh.cluster_start as usize..next_cluster as usize] {
                assert_eq!(cluster.index_start, next_index);
                next_index += cluster.index_count;
            }
        }
        assert_eq!(next_cluster as usize, geom.clusters.len());
        assert_eq!(next_index, geom.index_count);

        // Second LOD of the table: the lodded quad keeps one triangle, the
        // other submesh falls back to its full detail.
        let lod = geom.lods[1];
        let counts: Vec<u32> = (lod.submesh_start..lod.submesh_start + lod.submesh_count)
            .map(|s| {
                let entry = geom.submeshes[s as usize];
                geom.clusters[entry.cluster_start as usize..(entry.cluster_start + entry.cluster_count) as usize]
                    .iter()
                    .map(|c| c.index_count)
                    .sum()
            })
            .collect();
        assert_eq!(counts, vec![3, 6]);
        assert_eq!(geom.submesh_index(1, 1), Some(4));
    }

    #[test]
    fn bounds_and_pixel_size() {
        let geom = assemble(&scene_meshes(), &materials(&["Wood", "Metal"]), &Descriptor::default(), &Meshopt).unwrap();

        assert_eq!(geom.meshes[0].bbox.min, [0.0, 0.0, 0.0]);
        assert_eq!(geom.meshes[0].bbox.max, [1.0, 1.0, 1.0]);
        assert_eq!(geom.bbox.max, [6.0, 1.0, 1.0]);

        let expected = (4.0 + 2.0 * 2f32.sqrt()) / 6.0;
        assert_relative_eq!(geom.meshes[1].world_pixel_size, expected, epsilon = 1e-5);
    }

    #[test]
    fn unmatched_material_gets_null_reference() {
        let descriptor = Descriptor {
            materials: vec![MaterialBinding { name: "Metal".into(), instance: MaterialInstanceRef(42) }],
            ..Default::default()
        };
        let geom = assemble(&scene_meshes(), &materials(&["Wood", "Metal", "Glass"]), &descriptor, &Meshopt).unwrap();

        assert_eq!(
            geom.default_material_instances,
            vec![MaterialInstanceRef::NULL, MaterialInstanceRef(42), MaterialInstanceRef::NULL]
        );
    }

    #[test]
    #[should_panic(expected = "no clusters")]
    fn empty_input_is_an_invariant_violation() {
        let meshes = vec![CompilerMesh { name: "Empty".into(), submeshes: vec![CompilerSubMesh::default()] }];
        let _ = assemble(&meshes, &[], &Descriptor::default(), &Meshopt);
    }

    #[test]
    fn parallel_layout_is_deterministic() {
        let a = assemble(&scene_meshes(), &materials(&["Wood", "Metal"]), &Descriptor::default(), &Meshopt).unwrap();
        let b = assemble(&scene_meshes(), &materials(&["Wood", "Metal"]), &Descriptor::default(), &Meshopt).unwrap();
        assert_eq!(a, b);
    }
}
