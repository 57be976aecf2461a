//! Wavefront OBJ import into a `RawScene`.

use anyhow::{Context, Result};
use glam::{Vec2, Vec3};
use log::{debug, warn};
use lume_geom::{RawFacet, RawMaterialInstance, RawMesh, RawNode, RawScene, RawVertex};
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_MATERIAL: &str = "default";

/// Objects sharing a name become one mesh. Faces without a material use a
/// `default` material appended after the file's own.
pub fn import_obj(path: &Path) -> Result<RawScene> {
    let (models, materials) = tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS)
        .with_context(|| format!("Failed to load OBJ file: {}", path.display()))?;

    let mut scene = RawScene::default();
    match materials {
        Ok(materials) => {
            scene.material_instances = materials
                .into_iter()
                .map(|m| RawMaterialInstance { name: m.name })
                .collect();
        }
        Err(err) => warn!("No materials loaded for {}: {}", path.display(), err),
    }

    let mut mesh_by_name: HashMap<String, u32> = HashMap::new();
    let mut default_material = None;

    for model in models {
        let mesh = &model.mesh;
        let mesh_index = *mesh_by_name.entry(model.name.clone()).or_insert_with(|| {
            scene.meshes.push(RawMesh { name: model.name.clone() });
            scene.meshes.len() as u32 - 1
        });

        let material = match mesh.material_id {
            Some(id) if id < scene.material_instances.len() => id as u32,
            _ => *default_material.get_or_insert_with(|| {
                scene.material_instances.push(RawMaterialInstance { name: DEFAULT_MATERIAL.to_string() });
                scene.material_instances.len() as u32 - 1
            }),
        };

        let vertex_count = mesh.positions.len() / 3;
        let has_normals = mesh.normals.len() == vertex_count * 3;
        let has_uvs = mesh.texcoords.len() == vertex_count * 2;
        let has_colors = mesh.vertex_color.len() == vertex_count * 3;

        let base = scene.vertices.len() as u32;
        for i in 0..vertex_count {
            let mut vertex = RawVertex {
                position: Vec3::from_slice(&mesh.positions[i * 3..i * 3 + 3]),
                ..Default::default()
            };
            if has_normals {
                vertex.normal = Vec3::from_slice(&mesh.normals[i * 3..i * 3 + 3]);
                vertex.normal_count = 1;
            }
            if has_uvs {
                vertex.uvs[0] = Vec2::from_slice(&mesh.texcoords[i * 2..i * 2 + 2]);
                vertex.uv_count = 1;
            }
            if has_colors {
                let c = &mesh.vertex_color[i * 3..i * 3 + 3];
                vertex.color = [c[0], c[1], c[2], 1.0].map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8);
                vertex.color_count = 1;
            }
            scene.vertices.push(vertex);
        }

        if has_normals && has_uvs {
            generate_tangents(&mut scene.vertices[base as usize..], &mesh.indices);
        }

        scene.facets.extend(mesh.indices.chunks_exact(3).map(|tri| RawFacet {
            vertices: [base + tri[0], base + tri[1], base + tri[2]],
            mesh: mesh_index,
            material,
        }));
        debug!("Imported '{}': {} vertices, {} faces", model.name, vertex_count, mesh.indices.len() / 3);
    }

    scene.facets.sort_by_key(|f| (f.mesh, f.material));
    scene.root = RawNode {
        name: path.file_stem().map_or_else(String::new, |s| s.to_string_lossy().into_owned()),
        meshes: Vec::new(),
        children: scene
            .meshes
            .iter()
            .enumerate()
            .map(|(i, m)| RawNode { name: m.name.clone(), meshes: vec![i as u32], children: Vec::new() })
            .collect(),
    };
    Ok(scene)
}

/// Tangent frames from UV gradients, accumulated per vertex and
/// orthogonalized against the normal. The binormal keeps the handedness of
/// the UV mapping.
fn generate_tangents(vertices: &mut [RawVertex], indices: &[u32]) {
    let mut tangents = vec![Vec3::ZERO; vertices.len()];
    let mut bitangents = vec![Vec3::ZERO; vertices.len()];

    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| i as usize);
        let e1 = vertices[b].position - vertices[a].position;
        let e2 = vertices[c].position - vertices[a].position;
        let d1 = vertices[b].uvs[0] - vertices[a].uvs[0];
        let d2 = vertices[c].uvs[0] - vertices[a].uvs[0];

        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() < 1e-12 {
            continue;
        }
        let r = 1.0 / det;
        let sdir = (e1 * d2.y - e2 * d1.y) * r;
        let tdir = (e2 * d1.x - e1 * d2.x) * r;
        for i in [a, b, c] {
            tangents[i] += sdir;
            bitangents[i] += tdir;
        }
    }

    for ((vertex, t), b) in vertices.iter_mut().zip(tangents).zip(bitangents) {
        let n = vertex.normal;
        let Some(tangent) = (t - n * n.dot(t)).try_normalize() else {
            continue;
        };
        let handedness = if n.cross(tangent).dot(b) < 0.0 { -1.0 } else { 1.0 };
        vertex.tangent = tangent;
        vertex.binormal = n.cross(tangent) * handedness;
        vertex.tangent_count = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lume_geom::compiler::quantize::binormal_sign;
    use std::io::Write;

    const TWO_OBJECTS: &str = "\
o Floor
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
o Lamp
v 0 0 2
v 1 0 2
v 0 1 2
f 5 6 7
";

    fn write_obj(dir: &tempfile::TempDir, text: &str) -> std::path::PathBuf {
        let path = dir.path().join("room.obj");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        path
    }

    #[test]
    fn objects_become_meshes() {
        let dir = tempfile::tempdir().unwrap();
        let scene = import_obj(&write_obj(&dir, TWO_OBJECTS)).unwrap();

        let names: Vec<&str> = scene.meshes.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Floor", "Lamp"]);
        assert_eq!(scene.facets.len(), 3);
        assert_eq!(scene.facets.iter().filter(|f| f.mesh == 0).count(), 2);
        assert_eq!(scene.vertices.len(), 7);
        assert!(scene.facets.iter().all(|f| f.vertices.iter().all(|&v| (v as usize) < scene.vertices.len())));

        assert_eq!(scene.material_instances.len(), 1);
        assert_eq!(scene.material_instances[0].name, DEFAULT_MATERIAL);

        assert_eq!(scene.root.name, "room");
        assert_eq!(scene.root.children.len(), 2);
    }

    #[test]
    fn texcoords_are_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let scene = import_obj(&write_obj(&dir, TWO_OBJECTS)).unwrap();

        let floor = scene.facets.iter().find(|f| f.mesh == 0).unwrap();
        let v = &scene.vertices[floor.vertices[0] as usize];
        assert_eq!(v.uv_count, 1);
        assert_eq!(v.normal_count, 0);

        let lamp = scene.facets.iter().find(|f| f.mesh == 1).unwrap();
        assert_eq!(scene.vertices[lamp.vertices[0] as usize].uv_count, 0);
    }

    fn panel(uvs: [[f32; 2]; 4]) -> String {
        let mut text = String::from("o Panel\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n");
        for [u, v] in uvs {
            text.push_str(&format!("vt {} {}\n", u, v));
        }
        text.push_str("vn 0 0 1\nf 1/1/1 2/2/1 3/3/1 4/4/1\n");
        text
    }

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-4, "{:?} != {:?}", a, b);
    }

    #[test]
    fn tangent_frame_follows_uv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let scene = import_obj(&write_obj(&dir, &panel([[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]))).unwrap();

        for v in &scene.vertices {
            assert_eq!(v.tangent_count, 1);
            assert_close(v.tangent, Vec3::X);
            assert_close(v.binormal, Vec3::Y);
            assert_eq!(binormal_sign(v.normal, v.tangent, v.binormal), 1.0);
        }
    }

    #[test]
    fn mirrored_uvs_flip_the_binormal_sign() {
        let dir = tempfile::tempdir().unwrap();
        let scene = import_obj(&write_obj(&dir, &panel([[1.0, 0.0], [0.0, 0.0], [0.0, 1.0], [1.0, 1.0]]))).unwrap();

        for v in &scene.vertices {
            assert_close(v.tangent, Vec3::NEG_X);
            assert_close(v.binormal, Vec3::Y);
            assert_eq!(binormal_sign(v.normal, v.tangent, v.binormal), -1.0);
        }
    }

    #[test]
    fn no_tangents_without_normals() {
        let dir = tempfile::tempdir().unwrap();
        let scene = import_obj(&write_obj(&dir, TWO_OBJECTS)).unwrap();
        assert!(scene.vertices.iter().all(|v| v.tangent_count == 0));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(import_obj(&dir.path().join("missing.obj")).is_err());
    }
}
