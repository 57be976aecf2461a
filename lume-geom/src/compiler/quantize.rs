//! Per-cluster fixed point encoding of vertices.
//!
//! Positions are stored relative to the cluster box, so the same world
//! position encodes differently in two clusters.

use super::submesh::CompilerVertex;
use crate::{Vertex, VertexExtras};
use glam::{Vec2, Vec3};

const MIN_SCALE: f32 = 1e-6;

/// Affine transform that maps stored values back to position and UV space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Dequantization {
    pub pos_center: Vec3,
    pub pos_scale: Vec3,
    pub uv_min: Vec2,
    pub uv_scale: Vec2,
}

impl Dequantization {
    pub fn from_bounds(pos_min: Vec3, pos_max: Vec3, uv_min: Vec2, uv_max: Vec2) -> Self {
        Self {
            pos_center: (pos_min + pos_max) * 0.5,
            pos_scale: ((pos_max - pos_min) * 0.5).max(Vec3::splat(MIN_SCALE)),
            uv_min,
            uv_scale: (uv_max - uv_min).max(Vec2::splat(MIN_SCALE)),
        }
    }

    pub fn quantize_position(&self, p: Vec3) -> [i16; 3] {
        let q = ((p - self.pos_center) / self.pos_scale + 1.0) * 32767.5 - 32768.0;
        q.to_array().map(|c| c.round() as i16)
    }

    pub fn quantize_uv(&self, uv: Vec2) -> [u16; 2] {
        let q = (uv - self.uv_min) / self.uv_scale * 65535.0;
        q.to_array().map(|c| c.round() as u16)
    }
}

fn sign_not_zero(v: Vec2) -> Vec2 {
    Vec2::new(if v.x >= 0.0 { 1.0 } else { -1.0 }, if v.y >= 0.0 { 1.0 } else { -1.0 })
}

/// Maps a direction onto the [-1, 1]^2 octahedral square.
pub fn encode_octahedral(n: Vec3) -> Vec2 {
    let n = n / (n.x.abs() + n.y.abs() + n.z.abs());
    let p = Vec2::new(n.x, n.y);
    if n.z < 0.0 {
        (Vec2::ONE - Vec2::new(p.y, p.x).abs()) * sign_not_zero(p)
    } else {
        p
    }
}

pub fn decode_octahedral(e: Vec2) -> Vec3 {
    let mut n = Vec3::new(e.x, e.y, 1.0 - e.x.abs() - e.y.abs());
    let t = (-n.z).max(0.0);
    n.x += if n.x >= 0.0 { -t } else { t };
    n.y += if n.y >= 0.0 { -t } else { t };
    n.normalize()
}

pub fn octahedral_to_unorm8(e: Vec2) -> [u8; 2] {
    e.to_array().map(|c| ((c * 0.5 + 0.5) * 255.0).round() as u8)
}

pub fn unorm8_to_octahedral(q: [u8; 2]) -> Vec2 {
    Vec2::new(q[0] as f32, q[1] as f32) / 255.0 * 2.0 - 1.0
}

/// Zero length directions encode as +Z.
pub fn encode_direction(v: Vec3) -> [u8; 2] {
    octahedral_to_unorm8(encode_octahedral(v.try_normalize().unwrap_or(Vec3::Z)))
}

pub fn decode_direction(q: [u8; 2]) -> Vec3 {
    decode_octahedral(unorm8_to_octahedral(q))
}

/// Handedness of the tangent frame.
pub fn binormal_sign(normal: Vec3, tangent: Vec3, binormal: Vec3) -> f32 {
    if normal.cross(tangent).dot(binormal) >= 0.0 { 1.0 } else { -1.0 }
}

/// Encodes one vertex against `params`. Without a full tangent basis the
/// binormal sign is positive.
pub fn quantize_vertex(params: &Dequantization, v: &CompilerVertex, has_btn: bool) -> (Vertex, VertexExtras) {
    let [x, y, z] = params.quantize_position(v.position);
    let negative = has_btn && binormal_sign(v.normal, v.tangent, v.binormal) < 0.0;

    let vertex = Vertex { x, y, z, extra: if negative { Vertex::BINORMAL_SIGN_BIT } else { 0 } };
    let extras = VertexExtras {
        uv: params.quantize_uv(v.uvs[0]),
        oct_normal: encode_direction(v.normal),
        oct_tangent: encode_direction(v.tangent),
    };
    (vertex, extras)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{BBox, Cluster};

    fn cluster_for(params: &Dequantization) -> Cluster {
        Cluster {
            pos_scale_u_scale: [params.pos_scale.x, params.pos_scale.y, params.pos_scale.z, params.uv_scale.x],
            pos_translation_v_scale: [params.pos_center.x, params.pos_center.y, params.pos_center.z, params.uv_scale.y],
            uv_translation: params.uv_min.to_array(),
            vertex_count: 0,
            index_count: 0,
            index_start: 0,
            vertex_start: 0,
            bbox: BBox::EMPTY,
        }
    }

    #[test]
    fn box_corners_use_full_range() {
        let params = Dequantization::from_bounds(Vec3::splat(-1.0), Vec3::new(3.0, 1.0, 2.0), Vec2::ZERO, Vec2::ONE);
        assert_eq!(params.quantize_position(Vec3::splat(-1.0)), [-32768; 3]);
        assert_eq!(params.quantize_position(Vec3::new(3.0, 1.0, 2.0)), [32767; 3]);
        assert_eq!(params.quantize_uv(Vec2::ONE), [65535; 2]);
        assert_eq!(params.quantize_uv(Vec2::ZERO), [0; 2]);
    }

    #[test]
    fn position_round_trip_stays_within_precision() {
        let precision = 0.001;
        let max_extent = precision * 65535.0;
        let min = Vec3::new(12.5, -40.0, 3.25);
        let max = min + Vec3::new(max_extent, max_extent * 0.5, 0.0);
        let params = Dequantization::from_bounds(min, max, Vec2::ZERO, Vec2::ONE);
        let cluster = cluster_for(&params);

        for i in 0..=100 {
            let t = i as f32 / 100.0;
            let p = min.lerp(max, t) + Vec3::new(0.0, (t * 7.0).sin().abs() * max_extent * 0.5 * (1.0 - t), 0.0);
            let p = p.clamp(min, max);
            let [x, y, z] = params.quantize_position(p);
            let back = cluster.dequantize_position(&Vertex { x, y, z, extra: 0 });
            let err = (back - p).abs().max_element();
            assert!(err <= precision, "error {} at {:?}", err, p);
        }
    }

    #[test]
    fn flat_cluster_does_not_divide_by_zero() {
        let params = Dequantization::from_bounds(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0), Vec2::ZERO, Vec2::ZERO);
        assert_eq!(params.pos_scale.z, MIN_SCALE);
        let q = params.quantize_position(Vec3::new(0.5, 0.5, 0.0));
        assert_eq!(q[2], 0);
        assert_eq!(params.quantize_uv(Vec2::ZERO), [0, 0]);
    }

    #[test]
    fn octahedral_round_trip_is_close() {
        let max_angle = 2.0f32.to_radians();
        for i in 0..40 {
            for j in 0..80 {
                let theta = std::f32::consts::PI * (i as f32 + 0.5) / 40.0;
                let phi = std::f32::consts::TAU * j as f32 / 80.0;
                let n = Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
                let back = decode_direction(encode_direction(n));
                let angle = n.dot(back).clamp(-1.0, 1.0).acos();
                assert!(angle <= max_angle, "{:?} -> {:?} ({} rad)", n, back, angle);
            }
        }
    }

    #[test]
    fn octahedral_axes() {
        assert_eq!(encode_direction(Vec3::Z), [128, 128]);
        assert_eq!(encode_direction(Vec3::ZERO), [128, 128]);
        assert!((decode_direction(encode_direction(Vec3::NEG_Z)) - Vec3::NEG_Z).length() < 1e-2);
        assert!((decode_direction(encode_direction(Vec3::X)) - Vec3::X).length() < 1e-2);
    }

    #[test]
    fn binormal_sign_bit() {
        let v = CompilerVertex {
            normal: Vec3::Z,
            tangent: Vec3::X,
            binormal: Vec3::NEG_Y,
            ..Default::default()
        };
        let params = Dequantization::from_bounds(Vec3::ZERO, Vec3::ONE, Vec2::ZERO, Vec2::ONE);

        let (with_basis, _) = quantize_vertex(&params, &v, true);
        assert_eq!(with_basis.binormal_sign(), -1.0);

        let (without_basis, _) = quantize_vertex(&params, &v, false);
        assert_eq!(without_basis.extra, 0);

        let right_handed = CompilerVertex { binormal: Vec3::Y, ..v };
        let (vertex, _) = quantize_vertex(&params, &right_handed, true);
        assert_eq!(vertex.binormal_sign(), 1.0);
    }
}
