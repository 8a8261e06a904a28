use std::collections::HashMap;
use std::ops::Range;

use anyhow::{anyhow, Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Interleaved vertex layout shared by every mesh the backdrop draws.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Indexed triangle mesh with optional material groups.
///
/// `groups` partitions `indices` into ranges drawn with different materials;
/// an empty list means the whole mesh uses material 0.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub groups: Vec<Range<u32>>,
}

// (normal, u axis, v axis) with u x v == normal so faces wind CCW from outside.
const BOX_FACE_AXES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
];

impl MeshData {
    /// Builds an axis-aligned box centred on the origin with one group per face.
    pub fn cuboid(size: Vec3) -> Self {
        let half = size * 0.5;
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        let mut groups = Vec::with_capacity(6);

        for (normal, u_axis, v_axis) in BOX_FACE_AXES {
            let base = vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = (normal + u_axis * su + v_axis * sv) * half;
                // wgpu samples with v pointing down.
                let uv = Vec2::new((su + 1.0) * 0.5, 1.0 - (sv + 1.0) * 0.5);
                vertices.push(Vertex {
                    position: position.to_array(),
                    normal: normal.to_array(),
                    uv: uv.to_array(),
                });
            }
            let start = indices.len() as u32;
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
            groups.push(start..indices.len() as u32);
        }

        Self {
            vertices,
            indices,
            groups,
        }
    }

    /// Number of material slots this mesh expects.
    pub fn material_slots(&self) -> usize {
        self.groups.len().max(1)
    }

    /// Index range drawn with material `slot`.
    pub fn group_range(&self, slot: usize) -> Option<Range<u32>> {
        if self.groups.is_empty() {
            return (slot == 0).then(|| 0..self.indices.len() as u32);
        }
        self.groups.get(slot).cloned()
    }
}

/// Parses a Wavefront OBJ document into a single-group mesh.
///
/// Positions, texture coordinates and normals are supported; polygons are
/// fan-triangulated and missing normals are derived from face winding.
pub fn load_obj_from_str(data: &str) -> Result<MeshData> {
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    let mut normals = Vec::new();
    let mut triangles: Vec<[Corner; 3]> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_floats(parts)
                    .map(Vec3::from_array)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vt" => uvs.push(
                parse_floats(parts)
                    .map(Vec2::from_array)
                    .with_context(|| format!("invalid texture coordinate on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_floats(parts)
                    .map(Vec3::from_array)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "f" => {
                let polygon = parse_polygon(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                for i in 1..polygon.len() - 1 {
                    triangles.push([polygon[0], polygon[i], polygon[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ document does not define any vertices"));
    }

    let mut mesh = assemble(&positions, &uvs, &normals, &triangles)?;
    if mesh
        .vertices
        .iter()
        .any(|vertex| vertex.normal == [0.0, 0.0, 0.0])
    {
        derive_normals(&mut mesh);
    }
    Ok(mesh)
}

fn parse_floats<'a, const N: usize>(mut parts: impl Iterator<Item = &'a str>) -> Result<[f32; N]> {
    let mut values = [0.0; N];
    for value in values.iter_mut() {
        *value = parts
            .next()
            .ok_or_else(|| anyhow!("expected {N} components"))?
            .parse::<f32>()?;
    }
    Ok(values)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Corner {
    position: i32,
    uv: i32,
    normal: i32,
}

fn parse_polygon<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<Corner>> {
    let mut corners = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let position = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let mut optional = || {
            segments
                .next()
                .filter(|segment| !segment.is_empty())
                .map(str::parse::<i32>)
                .transpose()
                .map(Option::unwrap_or_default)
        };
        let uv = optional()?;
        let normal = optional()?;
        corners.push(Corner {
            position,
            uv,
            normal,
        });
    }
    if corners.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(corners)
}

fn assemble(
    positions: &[Vec3],
    uvs: &[Vec2],
    normals: &[Vec3],
    triangles: &[[Corner; 3]],
) -> Result<MeshData> {
    let mut lookup: HashMap<Corner, u32> = HashMap::new();
    let mut mesh = MeshData::default();

    for corner in triangles.iter().flatten() {
        if let Some(index) = lookup.get(corner) {
            mesh.indices.push(*index);
            continue;
        }
        let position = resolve_index(corner.position, positions.len())
            .map(|i| positions[i])
            .ok_or_else(|| anyhow!("vertex index {} is out of range", corner.position))?;
        let uv = resolve_index(corner.uv, uvs.len())
            .map(|i| Vec2::new(uvs[i].x, 1.0 - uvs[i].y))
            .unwrap_or(Vec2::ZERO);
        let normal = resolve_index(corner.normal, normals.len())
            .map(|i| normals[i])
            .unwrap_or(Vec3::ZERO);
        let index = mesh.vertices.len() as u32;
        mesh.vertices.push(Vertex {
            position: position.to_array(),
            normal: normal.to_array(),
            uv: uv.to_array(),
        });
        lookup.insert(*corner, index);
        mesh.indices.push(index);
    }

    Ok(mesh)
}

/// OBJ indices are 1-based, negative values count back from the end.
fn resolve_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let back = index.unsigned_abs() as usize;
        (back <= len).then(|| len - back)
    } else {
        None
    }
}

fn derive_normals(mesh: &mut MeshData) {
    let mut accum = vec![Vec3::ZERO; mesh.vertices.len()];
    for triangle in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let p0 = Vec3::from_array(mesh.vertices[a].position);
        let p1 = Vec3::from_array(mesh.vertices[b].position);
        let p2 = Vec3::from_array(mesh.vertices[c].position);
        let normal = (p1 - p0).cross(p2 - p0);
        if normal.length_squared() > f32::EPSILON {
            let normal = normal.normalize();
            accum[a] += normal;
            accum[b] += normal;
            accum[c] += normal;
        }
    }
    for (vertex, normal) in mesh.vertices.iter_mut().zip(accum) {
        vertex.normal = normal.normalize_or_zero().to_array();
    }
}
