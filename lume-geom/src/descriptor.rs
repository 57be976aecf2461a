//! Resolved compile settings for one static geometry resource.
//!
//! The descriptor is read once and then only borrowed by the pipeline.

use crate::error::{Error, Result};
use crate::resource::MaterialInstanceRef;
use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodDescriptor {
    /// Fraction of the previous level's index count to aim for.
    pub reduction: f32,
    /// Screen area at which the renderer switches to this level.
    pub screen_area: f32,
}

impl Default for LodDescriptor {
    fn default() -> Self {
        Self { reduction: 0.7, screen_area: 1.0 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshDescriptor {
    pub original_name: String,
    pub merge: bool,
    pub lods: Vec<LodDescriptor>,
}

impl Default for MeshDescriptor {
    fn default() -> Self {
        Self { original_name: String::new(), merge: true, lods: Vec::new() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialBinding {
    pub name: String,
    #[serde(default)]
    pub instance: MaterialInstanceRef,
}

/// Scale, rotation (degrees) and translation applied to the raw scene.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreTransform {
    pub scale: [f32; 3],
    pub rotation: [f32; 3],
    pub translation: [f32; 3],
}

impl Default for PreTransform {
    fn default() -> Self {
        Self { scale: [1.0; 3], rotation: [0.0; 3], translation: [0.0; 3] }
    }
}

impl PreTransform {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// `T * R * S`, with pitch about X, yaw about Y and roll about Z.
    pub fn matrix(&self) -> Mat4 {
        let [pitch, yaw, roll] = self.rotation.map(f32::to_radians);
        let rotation = Quat::from_euler(EulerRot::YXZ, yaw, pitch, roll);
        Mat4::from_scale_rotation_translation(
            Vec3::from_array(self.scale),
            rotation,
            Vec3::from_array(self.translation),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Descriptor {
    pub import_asset: PathBuf,
    pub merge_meshes: bool,
    pub pre_transform: PreTransform,
    pub meshes: Vec<MeshDescriptor>,
    pub materials: Vec<MaterialBinding>,
    /// Largest tolerated position error in world units.
    pub target_precision: f32,
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            import_asset: PathBuf::new(),
            merge_meshes: true,
            pre_transform: PreTransform::default(),
            meshes: Vec::new(),
            materials: Vec::new(),
            target_precision: 0.001,
        }
    }
}

impl Descriptor {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn find_mesh(&self, name: &str) -> Option<&MeshDescriptor> {
        self.meshes.iter().find(|m| m.original_name == name)
    }

    pub fn find_material(&self, name: &str) -> Option<&MaterialBinding> {
        self.materials.iter().find(|m| m.name == name)
    }

    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !(self.target_precision.is_finite() && self.target_precision > 0.0) {
            errors.push(format!("target_precision must be positive, found {}", self.target_precision));
        }

        if self.pre_transform.scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            errors.push(format!("pre_transform.scale must be finite and non-zero, found {:?}", self.pre_transform.scale));
        }

        let mut names = HashSet::new();
        for mesh in &self.meshes {
            if !names.insert(mesh.original_name.as_str()) {
                errors.push(format!("Mesh '{}' is listed more than once", mesh.original_name));
            }
            for (i, lod) in mesh.lods.iter().enumerate() {
                if !(lod.reduction > 0.0 && lod.reduction <= 1.0) {
                    errors.push(format!(
                        "Mesh '{}' LOD {} has reduction {} outside (0, 1]",
                        mesh.original_name, i + 1, lod.reduction
                    ));
                }
                if !(lod.screen_area.is_finite() && lod.screen_area >= 0.0) {
                    errors.push(format!(
                        "Mesh '{}' LOD {} has an invalid screen area {}",
                        mesh.original_name, i + 1, lod.screen_area
                    ));
                }
            }
        }

        let mut materials = HashSet::new();
        for material in &self.materials {
            if !materials.insert(material.name.as_str()) {
                errors.push(format!("Material '{}' is bound more than once", material.name));
            }
        }

        errors
    }

    pub fn check(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() { Ok(()) } else { Err(Error::Validation(errors)) }
    }
}
