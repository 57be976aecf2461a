//! The compiled static geometry resource and its on-disk format.
//!
//! Tables are written entry by entry with `bincode` (little-endian, fixed-size
//! integers, no padding), so the byte layout follows the field order below.

use crate::error::{Error, Result};
use crate::{Vertex, VertexExtras};
use glam::{Vec2, Vec3};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

pub const MESH_NAME_LEN: usize = 32;

/// Reference to a material instance resource. Zero means "no default".
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialInstanceRef(pub u64);

impl MaterialInstanceRef {
    pub const NULL: Self = Self(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Default for BBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BBox {
    pub const EMPTY: Self = Self { min: [f32::MAX; 3], max: [f32::MIN; 3] };

    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self { min: min.to_array(), max: max.to_array() }
    }

    pub fn extend(&mut self, p: Vec3) {
        self.min = Vec3::from_array(self.min).min(p).to_array();
        self.max = Vec3::from_array(self.max).max(p).to_array();
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.min[i] > self.max[i])
    }

    pub fn contains(&self, p: Vec3) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: [u8; MESH_NAME_LEN],
    /// Average world-space edge length over every LOD of the mesh.
    pub world_pixel_size: f32,
    pub bbox: BBox,
    pub lod_count: u16,
    pub lod_start: u16,
}

impl Mesh {
    pub fn name(&self) -> &str {
        let end = self.name.iter().position(|b| *b == 0).unwrap_or(MESH_NAME_LEN);
        std::str::from_utf8(&self.name[..end]).unwrap_or("")
    }
}

/// Packs `name` into a NUL-terminated fixed field, cutting at a character
/// boundary when it does not fit.
pub fn encode_mesh_name(name: &str) -> [u8; MESH_NAME_LEN] {
    let mut end = name.len().min(MESH_NAME_LEN - 1);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = [0u8; MESH_NAME_LEN];
    out[..end].copy_from_slice(&name.as_bytes()[..end]);
    out
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lod {
    pub screen_area: f32,
    pub submesh_start: u16,
    pub submesh_count: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubMesh {
    pub cluster_start: u16,
    pub cluster_count: u16,
    pub material: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub pos_scale_u_scale: [f32; 4],       // xyz: position scale, w: U scale
    pub pos_translation_v_scale: [f32; 4], // xyz: position translation, w: V scale
    pub uv_translation: [f32; 2],
    pub vertex_count: u32,
    pub index_count: u32,
    pub index_start: u32,
    pub vertex_start: u32,
    pub bbox: BBox,
}

impl Cluster {
    pub fn pos_scale(&self) -> Vec3 {
        Vec3::from_slice(&self.pos_scale_u_scale[..3])
    }

    pub fn pos_translation(&self) -> Vec3 {
        Vec3::from_slice(&self.pos_translation_v_scale[..3])
    }

    pub fn uv_scale(&self) -> Vec2 {
        Vec2::new(self.pos_scale_u_scale[3], self.pos_translation_v_scale[3])
    }

    pub fn uv_translation(&self) -> Vec2 {
        Vec2::from_array(self.uv_translation)
    }

    pub fn dequantize_position(&self, v: &Vertex) -> Vec3 {
        let q = Vec3::new(v.x as f32, v.y as f32, v.z as f32);
        ((q + 32768.0) / 32767.5 - 1.0) * self.pos_scale() + self.pos_translation()
    }

    pub fn dequantize_uv(&self, e: &VertexExtras) -> Vec2 {
        let q = Vec2::new(e.uv[0] as f32, e.uv[1] as f32) / 65535.0;
        q * self.uv_scale() + self.uv_translation()
    }
}

pub type RuntimeAllocation = [u64; 6];

#[derive(Clone, Debug, PartialEq)]
pub struct GeomResource {
    pub meshes: Vec<Mesh>,
    pub lods: Vec<Lod>,
    pub submeshes: Vec<SubMesh>,
    pub clusters: Vec<Cluster>,
    pub default_material_instances: Vec<MaterialInstanceRef>,
    /// Vertices, extras and 16-bit indices, each region 64-byte aligned.
    pub data: Vec<u8>,
    pub runtime_space: RuntimeAllocation,
    pub bbox: BBox,
    pub vertex_offset: u64,
    pub extras_offset: u64,
    pub index_offset: u64,
    pub vertex_count: u32,
    pub index_count: u32,
}

fn table_len(table: &'static str, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::TableOverflow { table, count: len })
}

fn read_table<R: Read, T: serde::de::DeserializeOwned>(reader: &mut R) -> Result<Vec<T>> {
    let len: u16 = bincode::deserialize_from(&mut *reader)?;
    (0..len).map(|_| Ok(bincode::deserialize_from(&mut *reader)?)).collect()
}

fn write_table<W: Write, T: Serialize>(writer: &mut W, table: &'static str, entries: &[T]) -> Result<()> {
    bincode::serialize_into(&mut *writer, &table_len(table, entries.len())?)?;
    for entry in entries {
        bincode::serialize_into(&mut *writer, entry)?;
    }
    Ok(())
}

fn check_range(entry: &str, index: usize, target: &str, start: u64, count: u64, len: u64) -> Result<()> {
    if start + count > len {
        return Err(Error::InvalidResource(format!(
            "{} {} references {} range [{}, +{}) outside {} entries",
            entry, index, target, start, count, len
        )));
    }
    Ok(())
}

impl GeomResource {
    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn lods(&self) -> &[Lod] {
        &self.lods
    }

    pub fn submeshes(&self) -> &[SubMesh] {
        &self.submeshes
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn default_material_instances(&self) -> &[MaterialInstanceRef] {
        &self.default_material_instances
    }

    fn region(&self, offset: u64, count: usize, stride: usize) -> &[u8] {
        let start = offset as usize;
        &self.data[start..start + count * stride]
    }

    pub fn vertices(&self) -> Vec<Vertex> {
        self.region(self.vertex_offset, self.vertex_count as usize, size_of::<Vertex>())
            .chunks_exact(size_of::<Vertex>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    pub fn vertex_extras(&self) -> Vec<VertexExtras> {
        self.region(self.extras_offset, self.vertex_count as usize, size_of::<VertexExtras>())
            .chunks_exact(size_of::<VertexExtras>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    pub fn indices(&self) -> Vec<u16> {
        self.region(self.index_offset, self.index_count as usize, size_of::<u16>())
            .chunks_exact(size_of::<u16>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    pub fn find_mesh_index(&self, name: &str) -> Option<usize> {
        self.meshes.iter().position(|m| m.name() == name)
    }

    /// Index of the full-detail submesh of `mesh` drawn with `material`.
    pub fn submesh_index(&self, mesh: usize, material: u16) -> Option<usize> {
        let lod = self.lods.get(self.meshes.get(mesh)?.lod_start as usize)?;
        let start = lod.submesh_start as usize;
        let end = start + lod.submesh_count as usize;
        (start..end).find(|&i| self.submeshes.get(i).is_some_and(|s| s.material == material))
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_table(writer, "mesh", &self.meshes)?;
        write_table(writer, "lod", &self.lods)?;
        write_table(writer, "submesh", &self.submeshes)?;
        write_table(writer, "cluster", &self.clusters)?;
        write_table(writer, "material instance", &self.default_material_instances)?;

        bincode::serialize_into(&mut *writer, &(self.data.len() as u64))?;
        writer.write_all(&self.data)?;

        bincode::serialize_into(&mut *writer, &self.runtime_space)?;
        bincode::serialize_into(&mut *writer, &self.bbox)?;
        bincode::serialize_into(&mut *writer, &(self.vertex_offset, self.extras_offset, self.index_offset))?;
        bincode::serialize_into(&mut *writer, &(self.vertex_count, self.index_count))?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let meshes = read_table(reader)?;
        let lods = read_table(reader)?;
        let submeshes = read_table(reader)?;
        let clusters = read_table(reader)?;
        let default_material_instances = read_table(reader)?;

        let data_len: u64 = bincode::deserialize_from(&mut *reader)?;
        let mut data = Vec::new();
        (&mut *reader).take(data_len).read_to_end(&mut data)?;
        if data.len() as u64 != data_len {
            return Err(Error::InvalidResource(format!(
                "blob declares {} bytes but only {} remain",
                data_len,
                data.len()
            )));
        }

        let runtime_space = bincode::deserialize_from(&mut *reader)?;
        let bbox = bincode::deserialize_from(&mut *reader)?;
        let (vertex_offset, extras_offset, index_offset) = bincode::deserialize_from(&mut *reader)?;
        let (vertex_count, index_count) = bincode::deserialize_from(&mut *reader)?;

        let geom = Self {
            meshes,
            lods,
            submeshes,
            clusters,
            default_material_instances,
            data,
            runtime_space,
            bbox,
            vertex_offset,
            extras_offset,
            index_offset,
            vertex_count,
            index_count,
        };
        geom.validate_layout()?;
        Ok(geom)
    }

    /// Every table range must stay inside the table it points into, and every
    /// blob region inside the blob.
    fn validate_layout(&self) -> Result<()> {
        for (i, mesh) in self.meshes.iter().enumerate() {
            check_range("mesh", i, "lod", mesh.lod_start as u64, mesh.lod_count as u64, self.lods.len() as u64)?;
        }
        for (i, lod) in self.lods.iter().enumerate() {
            check_range(
                "lod",
                i,
                "submesh",
                lod.submesh_start as u64,
                lod.submesh_count as u64,
                self.submeshes.len() as u64,
            )?;
        }
        for (i, submesh) in self.submeshes.iter().enumerate() {
            check_range(
                "submesh",
                i,
                "cluster",
                submesh.cluster_start as u64,
                submesh.cluster_count as u64,
                self.clusters.len() as u64,
            )?;
            check_range(
                "submesh",
                i,
                "material instance",
                submesh.material as u64,
                1,
                self.default_material_instances.len() as u64,
            )?;
        }
        for (i, cluster) in self.clusters.iter().enumerate() {
            check_range(
                "cluster",
                i,
                "vertex",
                cluster.vertex_start as u64,
                cluster.vertex_count as u64,
                self.vertex_count as u64,
            )?;
            check_range(
                "cluster",
                i,
                "index",
                cluster.index_start as u64,
                cluster.index_count as u64,
                self.index_count as u64,
            )?;
        }

        let regions = [
            ("vertex", self.vertex_offset, self.vertex_count as u64 * size_of::<Vertex>() as u64),
            ("extras", self.extras_offset, self.vertex_count as u64 * size_of::<VertexExtras>() as u64),
            ("index", self.index_offset, self.index_count as u64 * size_of::<u16>() as u64),
        ];
        for (name, offset, size) in regions {
            if offset.checked_add(size).is_none_or(|end| end > self.data.len() as u64) {
                return Err(Error::InvalidResource(format!(
                    "{} region [{}, +{}) exceeds blob of {} bytes",
                    name, offset, size, self.data.len()
                )));
            }
        }
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::with_capacity(1024 * 1024, file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };
        let mut bytes: &[u8] = &mmap;
        Self::read_from(&mut bytes)
    }
}
