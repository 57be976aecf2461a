use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod scene;
pub mod descriptor;
pub mod details;
pub mod resource;
pub mod compiler;

pub use error::{Error, Result};
pub use scene::{RawFacet, RawMaterialInstance, RawMesh, RawNode, RawScene, RawVertex};
pub use descriptor::{Descriptor, MaterialBinding, MeshDescriptor, LodDescriptor, PreTransform};
pub use details::Details;
pub use resource::{Cluster, GeomResource, Lod, MaterialInstanceRef, Mesh, SubMesh};
pub use compiler::GeomCompiler;

/// Name given to the synthetic mesh that collects every mergeable mesh.
pub const MERGED_MESH_NAME: &str = "MERGED_MESH";

/// Largest number of vertices a cluster may reference. 0xFFFF stays reserved
/// as the restart sentinel of the 16-bit index buffer.
pub const MAX_CLUSTER_VERTICES: usize = 65534;

/// Alignment of every region inside the GPU blob.
pub const BLOB_ALIGNMENT: usize = 64;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub extra: i16, // bit 0: binormal sign (0: +1, 1: -1)
}

impl Vertex {
    pub const BINORMAL_SIGN_BIT: i16 = 1;

    pub fn binormal_sign(&self) -> f32 {
        if self.extra & Self::BINORMAL_SIGN_BIT != 0 { -1.0 } else { 1.0 }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct VertexExtras {
    pub uv: [u16; 2],
    pub oct_normal: [u8; 2],
    pub oct_tangent: [u8; 2],
}
