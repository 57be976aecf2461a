//! Human-readable summary of what an imported scene contains.

use crate::compiler::validate_scene;
use crate::error::Result;
use crate::scene::{RawNode, RawScene};
use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MeshDetails {
    pub name: String,
    pub face_count: usize,
    pub uv_count: u8,
    pub color_count: u8,
    pub normal_count: u8,
    pub tangent_count: u8,
    pub materials: Vec<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NodeDetails {
    pub name: String,
    pub meshes: Vec<u32>,
    pub children: Vec<NodeDetails>,
}

impl From<&RawNode> for NodeDetails {
    fn from(node: &RawNode) -> Self {
        Self {
            name: node.name.clone(),
            meshes: node.meshes.clone(),
            children: node.children.iter().map(NodeDetails::from).collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Details {
    pub face_count: usize,
    pub materials: Vec<String>,
    pub meshes: Vec<MeshDetails>,
    pub root: NodeDetails,
}

impl Details {
    /// Fails with the same errors `GeomCompiler::compile` reports for a
    /// malformed scene.
    pub fn from_scene(scene: &RawScene) -> Result<Self> {
        validate_scene(scene)?;

        let mut meshes: Vec<MeshDetails> = scene
            .meshes
            .iter()
            .map(|m| MeshDetails { name: m.name.clone(), ..Default::default() })
            .collect();

        let mut usage = vec![vec![false; scene.material_instances.len()]; scene.meshes.len()];

        for facet in &scene.facets {
            let mesh = &mut meshes[facet.mesh as usize];
            mesh.face_count += 1;

            for &vi in &facet.vertices {
                let v = &scene.vertices[vi as usize];
                mesh.uv_count = mesh.uv_count.max(v.uv_count);
                mesh.color_count = mesh.color_count.max(v.color_count);
                mesh.normal_count = mesh.normal_count.max(v.normal_count);
                mesh.tangent_count = mesh.tangent_count.max(v.tangent_count);
            }

            usage[facet.mesh as usize][facet.material as usize] = true;
        }

        for (mesh, used) in meshes.iter_mut().zip(&usage) {
            mesh.materials = used.iter().enumerate().filter(|(_, u)| **u).map(|(i, _)| i).collect();
        }

        Ok(Self {
            face_count: meshes.iter().map(|m| m.face_count).sum(),
            materials: scene.material_instances.iter().map(|m| m.name.clone()).collect(),
            meshes,
            root: NodeDetails::from(&scene.root),
        })
    }

    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
