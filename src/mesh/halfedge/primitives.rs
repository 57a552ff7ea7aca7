// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::f32::consts::PI;

use super::*;

/// A regular tetrahedron of the given edge-adjacent circumradius, centered at
/// the origin. The smallest possible closed triangulated surface: 4 vertices,
/// 4 faces, every vertex a cone point (angle defect 2*PI - 3*(PI/3) = PI).
pub fn tetrahedron(radius: f32) -> Result<HalfEdgeMesh> {
    let verts = [
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(1.0, -1.0, -1.0),
        Vec3::new(-1.0, 1.0, -1.0),
        Vec3::new(-1.0, -1.0, 1.0),
    ]
    .map(|v| v.normalize() * radius);

    HalfEdgeMesh::build_from_polygons::<u32, _>(
        &verts,
        &[[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]],
    )
}

/// A cube with the given edge length, centered at the origin, with every
/// quad face split into two triangles so the result is a valid triangulated
/// input for the propagation engine.
pub fn triangulated_cube(size: f32) -> Result<HalfEdgeMesh> {
    let h = size * 0.5;

    let v1 = Vec3::new(-h, -h, -h);
    let v2 = Vec3::new(h, -h, -h);
    let v3 = Vec3::new(h, -h, h);
    let v4 = Vec3::new(-h, -h, h);
    let v5 = Vec3::new(-h, h, -h);
    let v6 = Vec3::new(-h, h, h);
    let v7 = Vec3::new(h, h, h);
    let v8 = Vec3::new(h, h, -h);

    let quads: [[u32; 4]; 6] = [
        [0, 1, 2, 3], // bottom
        [4, 5, 6, 7], // top
        [4, 7, 1, 0], // front
        [3, 2, 6, 5], // back
        [5, 4, 0, 3], // left
        [6, 2, 1, 7], // right
    ];

    let triangles: Vec<[u32; 3]> = quads
        .iter()
        .flat_map(|q| [[q[0], q[1], q[2]], [q[0], q[2], q[3]]])
        .collect();

    HalfEdgeMesh::build_from_polygons(&[v1, v2, v3, v4, v5, v6, v7, v8], &triangles)
}

/// A regular icosahedron of the given circumradius, centered at the origin.
/// Every vertex has degree 5, making it a convenient fixture for exercising
/// saddle-free cone points whose angle defect is `2*PI - 5*(PI/3) = PI/3`.
pub fn icosahedron(radius: f32) -> Result<HalfEdgeMesh> {
    let phi = (1.0 + 5.0_f32.sqrt()) / 2.0;

    let raw = [
        Vec3::new(-1.0, phi, 0.0),
        Vec3::new(1.0, phi, 0.0),
        Vec3::new(-1.0, -phi, 0.0),
        Vec3::new(1.0, -phi, 0.0),
        Vec3::new(0.0, -1.0, phi),
        Vec3::new(0.0, 1.0, phi),
        Vec3::new(0.0, -1.0, -phi),
        Vec3::new(0.0, 1.0, -phi),
        Vec3::new(phi, 0.0, -1.0),
        Vec3::new(phi, 0.0, 1.0),
        Vec3::new(-phi, 0.0, -1.0),
        Vec3::new(-phi, 0.0, 1.0),
    ];
    let verts: Vec<Vec3> = raw.iter().map(|v| v.normalize() * radius).collect();

    let faces: [[u32; 3]; 20] = [
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    HalfEdgeMesh::build_from_polygons(&verts, &faces)
}

/// A single quad, split into two triangles, located at `center` and oriented
/// along its `normal` and `right` vectors with given `size`. An intrinsically
/// flat surface: every internal vertex has angle sum exactly `2*PI` and the
/// boundary has no cone points at all.
pub fn flat_square(center: Vec3, normal: Vec3, right: Vec3, size: Vec2) -> Result<HalfEdgeMesh> {
    let normal = normal.normalize();
    let right = right.normalize();
    let forward = normal.cross(right);

    let hsize = size * 0.5;

    let v1 = center + hsize.x * right + hsize.y * forward;
    let v2 = center - hsize.x * right + hsize.y * forward;
    let v3 = center - hsize.x * right - hsize.y * forward;
    let v4 = center + hsize.x * right - hsize.y * forward;

    HalfEdgeMesh::build_from_polygons(&[v1, v2, v3, v4], &[[0, 1, 2], [0, 2, 3]])
}

/// A triangulated disk of `num_vertices` boundary points and a center vertex,
/// left with an open boundary (no outer face). Exercises propagation across a
/// mesh boundary and the wraparound of boundary halfedges.
pub fn open_disk(center: Vec3, radius: f32, num_vertices: usize) -> Result<HalfEdgeMesh> {
    if num_vertices < 3 {
        bail!("An open disk needs at least three boundary vertices")
    }

    let angle_delta = (2.0 * PI) / num_vertices as f32;
    let mut verts = vec![center];
    verts.extend((0..num_vertices).map(|i| {
        let q = Quat::from_rotation_y(angle_delta * i as f32);
        center + q * (Vec3::Z * radius)
    }));

    let hub = 0u32;
    let faces: Vec<[u32; 3]> = (0..num_vertices)
        .map(|i| {
            let a = 1 + i as u32;
            let b = 1 + ((i + 1) % num_vertices) as u32;
            [hub, a, b]
        })
        .collect();

    HalfEdgeMesh::build_from_polygons(&verts, &faces)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tetrahedron_has_four_faces() {
        let mesh = tetrahedron(1.0).unwrap();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_faces(), 4);
    }

    #[test]
    fn icosahedron_is_triangulated() {
        let mesh = icosahedron(1.0).unwrap();
        assert_eq!(mesh.num_vertices(), 12);
        assert_eq!(mesh.num_faces(), 20);
        assert!(mesh.connectivity().is_triangulated());
    }

    #[test]
    fn flat_square_has_two_triangles() {
        let mesh = flat_square(Vec3::ZERO, Vec3::Y, Vec3::X, Vec2::splat(2.0)).unwrap();
        assert_eq!(mesh.num_faces(), 2);
    }

    #[test]
    fn open_disk_has_a_boundary() {
        let mesh = open_disk(Vec3::ZERO, 1.0, 6).unwrap();
        assert_eq!(mesh.num_vertices(), 7);
        assert_eq!(mesh.num_faces(), 6);
        let conn = mesh.connectivity();
        assert!(conn
            .iter_halfedges()
            .any(|(h, _)| conn.is_boundary_halfedge(h)));
    }
}
