//! The compile pipeline: merge, pre-transform, submesh building, LODs,
//! clustering with quantization, and final assembly.

pub mod optimizer;
pub mod merge;
pub mod submesh;
pub mod lod;
pub mod quantize;
pub mod partition;
pub mod assemble;

pub use optimizer::{ClusterOptimizer, Meshopt, Simplifier};

use crate::descriptor::Descriptor;
use crate::details::Details;
use crate::error::{Error, Result};
use crate::resource::GeomResource;
use crate::scene::RawScene;
use log::info;

/// Compiles one raw scene with one descriptor. Consumed by [`compile`].
///
/// [`compile`]: GeomCompiler::compile
pub struct GeomCompiler {
    descriptor: Descriptor,
    scene: RawScene,
    simplifier: Box<dyn Simplifier>,
    optimizer: Box<dyn ClusterOptimizer>,
}

impl GeomCompiler {
    pub fn new(descriptor: Descriptor, scene: RawScene) -> Self {
        Self {
            descriptor,
            scene,
            simplifier: Box::new(Meshopt),
            optimizer: Box::new(Meshopt),
        }
    }

    pub fn with_simplifier(mut self, simplifier: impl Simplifier + 'static) -> Self {
        self.simplifier = Box::new(simplifier);
        self
    }

    pub fn with_optimizer(mut self, optimizer: impl ClusterOptimizer + 'static) -> Self {
        self.optimizer = Box::new(optimizer);
        self
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn scene(&self) -> &RawScene {
        &self.scene
    }

    /// Summary of the scene as imported, before merging.
    pub fn details(&self) -> Result<Details> {
        Details::from_scene(&self.scene)
    }

    pub fn compile(mut self) -> Result<GeomResource> {
        self.descriptor.check()?;
        validate_scene(&self.scene)?;

        if self.descriptor.merge_meshes {
            info!("Merging meshes");
            if let Some(remap) = merge::merge_meshes(&mut self.scene, &self.descriptor) {
                info!("Merged mesh table: {:?}", remap);
            }
        }

        if !self.descriptor.pre_transform.is_identity() {
            info!("Applying pre-transform");
            self.scene.transform(&self.descriptor.pre_transform.matrix());
        }

        let mut meshes = submesh::build_compiler_meshes(&self.scene);
        info!(
            "Built {} meshes with {} submeshes",
            meshes.len(),
            meshes.iter().map(|m| m.submeshes.len()).sum::<usize>()
        );

        info!("Generating LODs");
        lod::generate_lods(&mut meshes, &self.descriptor, self.simplifier.as_ref())?;

        info!("Building clusters (target precision {})", self.descriptor.target_precision);
        assemble::assemble(
            &meshes,
            &self.scene.material_instances,
            &self.descriptor,
            self.optimizer.as_ref(),
        )
    }
}

/// Rejects scenes the pipeline cannot compile before any stage runs.
pub fn validate_scene(scene: &RawScene) -> Result<()> {
    if scene.facets.is_empty() {
        return Err(Error::InvalidScene("scene has no triangles".into()));
    }
    for (i, facet) in scene.facets.iter().enumerate() {
        if facet.mesh as usize >= scene.meshes.len() {
            return Err(Error::InvalidScene(format!("facet {} references missing mesh {}", i, facet.mesh)));
        }
        if facet.material as usize >= scene.material_instances.len() {
            return Err(Error::InvalidScene(format!(
                "facet {} references missing material {}",
                i, facet.material
            )));
        }
        if let Some(v) = facet.vertices.iter().find(|&&v| v as usize >= scene.vertices.len()) {
            return Err(Error::InvalidScene(format!("facet {} references missing vertex {}", i, v)));
        }
    }
    Ok(())
}
