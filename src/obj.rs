use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Floats per interleaved vertex: `position.xyz`, `normal.xyz`, `uv.xy`.
pub const VERTEX_STRIDE: usize = 8;

/// GPU ready mesh buffers for one named object of an OBJ file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjMesh {
    pub name: String,
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl ObjMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }
}

/// All objects of an OBJ file, in declaration order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjGroup {
    pub children: Vec<ObjMesh>,
}

/// Parses an OBJ file from memory, splitting it at `o` and `g` statements.
///
/// Vertex attributes are shared by the whole file as the format requires.
/// Faces declared before any `o`/`g` land in a child named `default`.
/// Objects without faces are dropped.
pub fn load_obj_group_from_str(data: &str) -> Result<ObjGroup> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut blocks: Vec<(String, Vec<[FaceIndex; 3]>)> = vec![("default".to_string(), Vec::new())];

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
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "vt" => uvs.push(
                parse_vec2(parts)
                    .with_context(|| format!("invalid texture coordinate on line {}", line_no + 1))?,
            ),
            "o" | "g" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                let name = if name.is_empty() {
                    format!("object{}", blocks.len())
                } else {
                    name
                };
                blocks.push((name, Vec::new()));
            }
            "f" => {
                let polygon = parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                if let Some((_, faces)) = blocks.last_mut() {
                    triangulate_face(&polygon, faces);
                }
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }

    let attributes = Attributes {
        positions: &positions,
        normals: &normals,
        uvs: &uvs,
    };
    let mut children = Vec::new();
    for (name, faces) in blocks {
        if faces.is_empty() {
            continue;
        }
        let mut mesh = build_mesh(&name, &attributes, &faces)
            .with_context(|| format!("invalid object {name}"))?;
        if needs_normals(&mesh.vertices) {
            compute_normals(&mut mesh);
        }
        children.push(mesh);
    }

    if children.is_empty() {
        return Err(anyhow!("OBJ file does not define any faces"));
    }
    Ok(ObjGroup { children })
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let x = parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?;
    let y = parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?;
    let z = parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?;
    Ok(Vec3::new(x, y, z))
}

fn parse_vec2<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let u = parts
        .next()
        .ok_or_else(|| anyhow!("missing texture component"))?
        .parse::<f32>()?;
    let v = match parts.next() {
        Some(value) => value.parse::<f32>()?,
        None => 0.0,
    };
    Ok(Vec2::new(u, v))
}

fn parse_index(segment: Option<&str>) -> Result<i32> {
    match segment {
        None | Some("") => Ok(0),
        Some(value) => Ok(value.parse::<i32>()?),
    }
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let vt = parse_index(segments.next())?;
        let vn = parse_index(segments.next())?;
        indices.push(FaceIndex { v, vt, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

fn triangulate_face(polygon: &[FaceIndex], faces: &mut Vec<[FaceIndex; 3]>) {
    for i in 1..(polygon.len() - 1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    normal: Option<usize>,
    uv: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vt: i32,
    vn: i32,
}

struct Attributes<'a> {
    positions: &'a [Vec3],
    normals: &'a [Vec3],
    uvs: &'a [Vec2],
}

fn build_mesh(name: &str, attributes: &Attributes<'_>, faces: &[[FaceIndex; 3]]) -> Result<ObjMesh> {
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for face in faces {
        for idx in face {
            let position = fix_index(idx.v, attributes.positions.len())
                .ok_or_else(|| anyhow!("invalid vertex index {}", idx.v))?;
            let key = Key {
                position,
                normal: fix_index(idx.vn, attributes.normals.len()),
                uv: fix_index(idx.vt, attributes.uvs.len()),
            };
            let next_index = (vertices.len() / VERTEX_STRIDE) as u32;
            let entry = lookup.entry(key).or_insert_with(|| {
                let p = attributes.positions[key.position];
                let n = key
                    .normal
                    .map(|i| attributes.normals[i])
                    .unwrap_or(Vec3::ZERO);
                let uv = key.uv.map(|i| attributes.uvs[i]).unwrap_or(Vec2::ZERO);
                vertices.extend_from_slice(&[p.x, p.y, p.z, n.x, n.y, n.z, uv.x, uv.y]);
                next_index
            });
            indices.push(*entry);
        }
    }

    Ok(ObjMesh {
        name: name.to_string(),
        vertices,
        indices,
    })
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = index.unsigned_abs() as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

fn needs_normals(vertices: &[f32]) -> bool {
    vertices
        .chunks_exact(VERTEX_STRIDE)
        .any(|chunk| chunk[3] == 0.0 && chunk[4] == 0.0 && chunk[5] == 0.0)
}

fn compute_normals(mesh: &mut ObjMesh) {
    let mut accum = vec![Vec3::ZERO; mesh.vertex_count()];
    let position = |vertices: &[f32], i: usize| {
        Vec3::from_slice(&vertices[i * VERTEX_STRIDE..i * VERTEX_STRIDE + 3])
    };

    for triangle in mesh.indices.chunks_exact(3) {
        let (i0, i1, i2) = (
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        );
        let p0 = position(&mesh.vertices, i0);
        let p1 = position(&mesh.vertices, i1);
        let p2 = position(&mesh.vertices, i2);
        let normal = (p1 - p0).cross(p2 - p0);
        if normal.length_squared() > f32::EPSILON {
            let normal = normal.normalize();
            accum[i0] += normal;
            accum[i1] += normal;
            accum[i2] += normal;
        }
    }

    for (i, normal) in accum.into_iter().enumerate() {
        let normal = normal.normalize_or_zero();
        let base = i * VERTEX_STRIDE + 3;
        mesh.vertices[base..base + 3].copy_from_slice(&normal.to_array());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_SHARDS: &str = "
v 0 0 0
v 1 0 0
v 0 1 0
v 0 0 1
vt 0 0
vt 1 0
vt 0 1
o ShardA
f 1/1 2/2 3/3
o ShardB
f 1 2 4
g ShardC
f 1 3 4 2
";

    #[test]
    fn splits_objects_into_children() {
        let group = load_obj_group_from_str(THREE_SHARDS).unwrap();
        let names: Vec<_> = group.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["ShardA", "ShardB", "ShardC"]);
        assert_eq!(group.children[0].indices, vec![0, 1, 2]);
        // Quad is fanned into two triangles.
        assert_eq!(group.children[2].indices.len(), 6);
        assert_eq!(group.children[2].vertex_count(), 4);
    }

    #[test]
    fn keeps_texture_coordinates() {
        let group = load_obj_group_from_str(THREE_SHARDS).unwrap();
        let shard = &group.children[0];
        let uv = &shard.vertices[VERTEX_STRIDE + 6..VERTEX_STRIDE + 8];
        assert_eq!(uv, [1.0, 0.0]);
    }

    #[test]
    fn computes_missing_normals() {
        let mesh = &load_obj_group_from_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n")
            .unwrap()
            .children[0];
        assert_eq!(mesh.name, "default");
        for chunk in mesh.vertices.chunks_exact(VERTEX_STRIDE) {
            let normal = Vec3::new(chunk[3], chunk[4], chunk[5]);
            assert!((normal - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn negative_indices_are_relative() {
        let mesh = &load_obj_group_from_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n")
            .unwrap()
            .children[0];
        assert_eq!(&mesh.vertices[VERTEX_STRIDE..VERTEX_STRIDE + 3], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        assert!(load_obj_group_from_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n").is_err());
    }

    #[test]
    fn file_without_faces_is_an_error() {
        assert!(load_obj_group_from_str("v 0 0 0\n").is_err());
        assert!(load_obj_group_from_str("# nothing\n").is_err());
    }
}
