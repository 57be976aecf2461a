//! Seams to the external mesh routines, backed by `meshopt`.

use crate::error::{Error, Result};
use glam::Vec3;
use meshopt::VertexDataAdapter;

/// Index buffer simplification. Never adds vertices, only returns a subset
/// of triangles over the same vertex array.
pub trait Simplifier: Sync {
    fn simplify(
        &self,
        positions: &[Vec3],
        indices: &[u32],
        target_index_count: usize,
        target_error: f32,
    ) -> Result<Vec<u32>>;
}

/// Reordering passes run on every sealed cluster.
pub trait ClusterOptimizer: Sync {
    fn optimize_vertex_cache(&self, indices: &[u32], vertex_count: usize) -> Vec<u32>;

    fn optimize_overdraw(&self, indices: &mut [u32], positions: &[Vec3], threshold: f32) -> Result<()>;

    /// `remap[old] = new`, or `u32::MAX` for vertices no index references.
    fn optimize_vertex_fetch_remap(&self, indices: &[u32], vertex_count: usize) -> Vec<u32>;
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Meshopt;

fn position_adapter(positions: &[Vec3]) -> Result<VertexDataAdapter<'_>> {
    VertexDataAdapter::new(bytemuck::cast_slice(positions), size_of::<Vec3>(), 0)
        .map_err(|err| Error::Optimizer(format!("{:?}", err)))
}

impl Simplifier for Meshopt {
    fn simplify(
        &self,
        positions: &[Vec3],
        indices: &[u32],
        target_index_count: usize,
        target_error: f32,
    ) -> Result<Vec<u32>> {
        let adapter = position_adapter(positions)?;
        Ok(meshopt::simplify(indices, &adapter, target_index_count, target_error))
    }
}

impl ClusterOptimizer for Meshopt {
    fn optimize_vertex_cache(&self, indices: &[u32], vertex_count: usize) -> Vec<u32> {
        meshopt::optimize_vertex_cache(indices, vertex_count)
    }

    fn optimize_overdraw(&self, indices: &mut [u32], positions: &[Vec3], threshold: f32) -> Result<()> {
        let adapter = position_adapter(positions)?;
        meshopt::optimize_overdraw_in_place(indices, &adapter, threshold);
        Ok(())
    }

    fn optimize_vertex_fetch_remap(&self, indices: &[u32], vertex_count: usize) -> Vec<u32> {
        meshopt::optimize_vertex_fetch_remap(indices, vertex_count)
    }
}
