//! Collapses every mergeable mesh into one synthetic mesh.

use crate::descriptor::Descriptor;
use crate::scene::{RawMesh, RawNode, RawScene};
use crate::MERGED_MESH_NAME;
use log::{info, warn};

/// Rewrites the scene so that all mergeable meshes become a single mesh
/// placed after the kept ones. Returns the old-to-new mesh index table, or
/// `None` when there was nothing to do.
///
/// Meshes the descriptor does not mention are mergeable. Facets are re-sorted
/// by (mesh, material) afterwards, since remapping breaks their grouping.
pub fn merge_meshes(scene: &mut RawScene, descriptor: &Descriptor) -> Option<Vec<u32>> {
    let listed: Vec<_> = descriptor
        .meshes
        .iter()
        .filter(|m| m.original_name != MERGED_MESH_NAME)
        .collect();

    if !listed.is_empty() && listed.iter().all(|m| !m.merge) {
        warn!("Every mesh is marked as non-mergeable, skipping the merge");
        return None;
    }

    let mut mergeable = vec![true; scene.meshes.len()];
    for mesh in listed {
        match scene.find_mesh(&mesh.original_name) {
            Some(index) => mergeable[index] = mesh.merge,
            None => warn!(
                "Mesh '{}' is no longer part of the scene, treating it as mergeable",
                mesh.original_name
            ),
        }
    }

    let kept = mergeable.iter().filter(|m| !**m).count() as u32;
    let mut next = 0;
    let remap: Vec<u32> = mergeable
        .iter()
        .map(|&merge| {
            if merge {
                kept
            } else {
                next += 1;
                next - 1
            }
        })
        .collect();

    for facet in &mut scene.facets {
        facet.mesh = remap[facet.mesh as usize];
    }
    scene.facets.sort_by_key(|f| (f.mesh, f.material));

    let mut meshes: Vec<RawMesh> = std::mem::take(&mut scene.meshes)
        .into_iter()
        .zip(&mergeable)
        .filter(|(_, merge)| !**merge)
        .map(|(mesh, _)| mesh)
        .collect();
    if mergeable.iter().any(|m| *m) {
        meshes.push(RawMesh { name: MERGED_MESH_NAME.to_string() });
    }

    info!(
        "Merged {} of {} meshes into '{}'",
        mergeable.iter().filter(|m| **m).count(),
        mergeable.len(),
        MERGED_MESH_NAME
    );

    scene.meshes = meshes;
    remap_nodes(&mut scene.root, &remap);
    Some(remap)
}

fn remap_nodes(node: &mut RawNode, remap: &[u32]) {
    for mesh in &mut node.meshes {
        *mesh = remap[*mesh as usize];
    }
    node.meshes.sort_unstable();
    node.meshes.dedup();
    for child in &mut node.children {
        remap_nodes(child, remap);
    }
}
