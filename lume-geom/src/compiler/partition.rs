//! Bounding-box BSP over position and UV space that cuts one index list
//! into clusters small enough for 16-bit storage.

use super::optimizer::ClusterOptimizer;
use super::quantize::{Dequantization, quantize_vertex};
use super::submesh::CompilerSubMesh;
use crate::error::Result;
use crate::resource::{BBox, Cluster};
use crate::{MAX_CLUSTER_VERTICES, Vertex, VertexExtras};
use glam::{Vec2, Vec3};
use log::warn;

const OVERDRAW_THRESHOLD: f32 = 1.05;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClusterSettings {
    /// Largest position or UV extent a cluster may span on any axis.
    pub max_extent: f32,
    pub max_vertices: usize,
}

impl ClusterSettings {
    /// One quantization step of a 16-bit axis equals `precision`.
    pub fn from_precision(precision: f32) -> Self {
        Self { max_extent: precision * 65535.0, max_vertices: MAX_CLUSTER_VERTICES }
    }
}

/// Clusters of one index list. `index_start`/`vertex_start` are relative to
/// the arrays in this output, and indices are local to their cluster.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterOutput {
    pub clusters: Vec<Cluster>,
    pub vertices: Vec<Vertex>,
    pub extras: Vec<VertexExtras>,
    pub indices: Vec<u32>,
}

struct Bounds {
    pos_min: Vec3,
    pos_max: Vec3,
    uv_min: Vec2,
    uv_max: Vec2,
    /// Sorted submesh vertex ids referenced by the triangles.
    unique: Vec<u32>,
}

impl Bounds {
    fn compute(submesh: &CompilerSubMesh, indices: &[u32], triangles: &[u32]) -> Self {
        let mut unique: Vec<u32> = triangles
            .iter()
            .flat_map(|&t| indices[t as usize * 3..t as usize * 3 + 3].iter().copied())
            .collect();
        unique.sort_unstable();
        unique.dedup();

        let mut bounds = Self {
            pos_min: Vec3::splat(f32::MAX),
            pos_max: Vec3::splat(f32::MIN),
            uv_min: Vec2::splat(f32::MAX),
            uv_max: Vec2::splat(f32::MIN),
            unique: Vec::new(),
        };
        for &v in &unique {
            let vertex = &submesh.vertices[v as usize];
            bounds.pos_min = bounds.pos_min.min(vertex.position);
            bounds.pos_max = bounds.pos_max.max(vertex.position);
            bounds.uv_min = bounds.uv_min.min(vertex.uvs[0]);
            bounds.uv_max = bounds.uv_max.max(vertex.uvs[0]);
        }
        bounds.unique = unique;
        bounds
    }

    /// Extents along x, y, z, u, v.
    fn extents(&self) -> [f32; 5] {
        let pos = self.pos_max - self.pos_min;
        let uv = self.uv_max - self.uv_min;
        [pos.x, pos.y, pos.z, uv.x, uv.y]
    }

    fn fits(&self, settings: &ClusterSettings) -> bool {
        self.extents().iter().all(|&e| e <= settings.max_extent) && self.unique.len() <= settings.max_vertices
    }
}

fn axis_value(submesh: &CompilerSubMesh, vertex: u32, axis: usize) -> f32 {
    let v = &submesh.vertices[vertex as usize];
    match axis {
        0..=2 => v.position[axis],
        _ => v.uvs[0][axis - 3],
    }
}

/// Splits at the middle of the widest axis by triangle centroid. Falls back
/// to halving the list when every centroid lands on one side.
fn split(submesh: &CompilerSubMesh, indices: &[u32], mut triangles: Vec<u32>, bounds: &Bounds) -> (Vec<u32>, Vec<u32>) {
    let extents = bounds.extents();
    let mut axis = 0;
    for (i, &e) in extents.iter().enumerate().skip(1) {
        if e > extents[axis] {
            axis = i;
        }
    }
    let (min, max) = match axis {
        0..=2 => (bounds.pos_min[axis], bounds.pos_max[axis]),
        _ => (bounds.uv_min[axis - 3], bounds.uv_max[axis - 3]),
    };
    let mid = (min + max) * 0.5;

    let (left, right): (Vec<u32>, Vec<u32>) = triangles.iter().partition(|&&t| {
        let corners = &indices[t as usize * 3..t as usize * 3 + 3];
        let centroid = corners.iter().map(|&v| axis_value(submesh, v, axis)).sum::<f32>() / 3.0;
        centroid < mid
    });

    if left.is_empty() || right.is_empty() {
        let right = triangles.split_off(triangles.len() / 2);
        return (triangles, right);
    }
    (left, right)
}

/// Partitions `indices` (triangles over `submesh.vertices`) into clusters.
/// Clusters come out in depth-first, left-first order.
pub fn partition_submesh(
    submesh: &CompilerSubMesh,
    indices: &[u32],
    settings: &ClusterSettings,
    optimizer: &dyn ClusterOptimizer,
) -> Result<ClusterOutput> {
    let mut output = ClusterOutput::default();
    let triangle_count = indices.len() / 3;
    if triangle_count == 0 {
        return Ok(output);
    }

    let mut stack = vec![(0..triangle_count as u32).collect::<Vec<u32>>()];
    while let Some(triangles) = stack.pop() {
        let bounds = Bounds::compute(submesh, indices, &triangles);
        if triangles.len() == 1 || bounds.fits(settings) {
            if !bounds.fits(settings) {
                warn!(
                    "Triangle spans {:?}, beyond the cluster extent {}; its vertices will not meet the target precision",
                    bounds.extents(),
                    settings.max_extent
                );
            }
            seal_cluster(&mut output, submesh, indices, &triangles, &bounds, optimizer)?;
            continue;
        }

        let (left, right) = split(submesh, indices, triangles, &bounds);
        stack.push(right);
        stack.push(left);
    }
    Ok(output)
}

fn seal_cluster(
    output: &mut ClusterOutput,
    submesh: &CompilerSubMesh,
    indices: &[u32],
    triangles: &[u32],
    bounds: &Bounds,
    optimizer: &dyn ClusterOptimizer,
) -> Result<()> {
    let unique = &bounds.unique;
    let vertex_count = unique.len();

    let local: Vec<u32> = triangles
        .iter()
        .flat_map(|&t| indices[t as usize * 3..t as usize * 3 + 3].iter())
        .map(|v| unique.binary_search(v).unwrap_or_else(|i| i) as u32)
        .collect();
    let positions: Vec<Vec3> = unique.iter().map(|&v| submesh.vertices[v as usize].position).collect();

    let mut local = optimizer.optimize_vertex_cache(&local, vertex_count);
    optimizer.optimize_overdraw(&mut local, &positions, OVERDRAW_THRESHOLD)?;
    let remap = optimizer.optimize_vertex_fetch_remap(&local, vertex_count);

    let params = Dequantization::from_bounds(bounds.pos_min, bounds.pos_max, bounds.uv_min, bounds.uv_max);
    let mut vertices = vec![Vertex::default(); vertex_count];
    let mut extras = vec![VertexExtras::default(); vertex_count];
    let mut used = 0;
    for (old, &new) in remap.iter().enumerate() {
        if new == u32::MAX {
            continue;
        }
        let (vertex, extra) = quantize_vertex(&params, &submesh.vertices[unique[old] as usize], submesh.has_btn);
        vertices[new as usize] = vertex;
        extras[new as usize] = extra;
        used += 1;
    }
    vertices.truncate(used);
    extras.truncate(used);

    output.clusters.push(Cluster {
        pos_scale_u_scale: params.pos_scale.extend(params.uv_scale.x).to_array(),
        pos_translation_v_scale: params.pos_center.extend(params.uv_scale.y).to_array(),
        uv_translation: params.uv_min.to_array(),
        vertex_count: used as u32,
        index_count: local.len() as u32,
        index_start: output.indices.len() as u32,
        vertex_start: output.vertices.len() as u32,
        bbox: BBox::from_min_max(bounds.pos_min, bounds.pos_max),
    });
    output.indices.extend(local.iter().map(|&i| remap[i as usize]));
    output.vertices.extend(vertices);
    output.extras.extend(extras);
    Ok(())
}
