use super::optimizer::Simplifier;
use super::submesh::{CompilerMesh, CompilerSubMesh, LodLevel};
use crate::descriptor::{Descriptor, LodDescriptor};
use crate::error::Result;
use log::debug;

/// Absolute error handed to the simplifier for every level.
pub const LOD_TARGET_ERROR: f32 = 1e-2;

/// `index_count * reduction`, rounded down to whole triangles.
pub fn lod_target_index_count(index_count: usize, reduction: f32) -> usize {
    ((index_count as f32 * reduction + 0.005) as usize) / 3 * 3
}

/// Builds the configured LOD chain of every submesh whose mesh appears in
/// the descriptor. Each level simplifies the previous one.
pub fn generate_lods(meshes: &mut [CompilerMesh], descriptor: &Descriptor, simplifier: &dyn Simplifier) -> Result<()> {
    for mesh in meshes {
        let Some(desc) = descriptor.find_mesh(&mesh.name) else {
            continue;
        };
        if desc.lods.is_empty() {
            continue;
        }

        for submesh in &mut mesh.submeshes {
            generate_submesh_lods(submesh, &desc.lods, simplifier)?;
            debug!(
                "Mesh '{}' material {}: {} triangles, LODs {:?}",
                mesh.name,
                submesh.material,
                submesh.indices.len() / 3,
                submesh.lods.iter().map(|l| l.indices.len() / 3).collect::<Vec<_>>()
            );
        }
    }
    Ok(())
}

pub fn generate_submesh_lods(
    submesh: &mut CompilerSubMesh,
    lods: &[LodDescriptor],
    simplifier: &dyn Simplifier,
) -> Result<()> {
    let positions = submesh.positions();
    let mut index_count = submesh.indices.len();

    for lod in lods {
        let target = lod_target_index_count(index_count, lod.reduction);
        let source = submesh.lods.last().map_or(&submesh.indices, |l| &l.indices);
        if source.len() < target {
            break;
        }

        let indices = simplifier.simplify(&positions, source, target, LOD_TARGET_ERROR)?;
        index_count = indices.len();
        submesh.lods.push(LodLevel { screen_area: lod.screen_area, indices });
    }
    Ok(())
}
