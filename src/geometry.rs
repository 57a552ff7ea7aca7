// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The numeric kernel consumed by the propagation engine: unfolding
//! triangles into a shared 2D plane, projecting a 3D triangle to 2D,
//! segment/ray/line intersection, parametric position along a segment, and
//! the saddle-vertex predicate. Kept behind the `Kernel` trait so the engine
//! never hard-codes a particular numeric strategy, the way the teacher keeps
//! mesh traversal behind the `*Traversal` trait family rather than inlining
//! slotmap lookups everywhere.

use glam::{Vec2, Vec3};

use crate::error::GeodesicError;
use crate::mesh::halfedge::{MeshConnectivity, Positions, VertexId, VertexTraversalHelpers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeOrder {
    Smaller,
    Equal,
    Larger,
}

/// The numeric and geometric capability the propagation engine is built
/// against. The engine never reaches for `glam` trigonometry directly; every
/// geometric construction used by the algorithm is named here.
pub trait Kernel {
    /// Computes the 2D layout of a 3D triangle given the already-known 2D
    /// placement of one of its edges. `known_indices` names which two corners
    /// of `tri3` correspond to `segment2.0`/`segment2.1`; the remaining corner
    /// is placed on the opposite side of the segment's supporting line from
    /// `away_from`, which is how unfolding avoids re-folding the new triangle
    /// back onto the one it came from.
    fn flatten_triangle_3_along_segment_2(
        &self,
        tri3: [Vec3; 3],
        known_indices: (usize, usize),
        segment2: (Vec2, Vec2),
        away_from: Vec2,
    ) -> Result<[Vec2; 3], GeodesicError>;

    /// Projects a 3D triangle to a 2D triangle with the same edge lengths,
    /// corner 0 at the origin and corner 1 on the positive x axis.
    fn project_triangle_3_to_triangle_2(&self, tri3: [Vec3; 3]) -> [Vec2; 3];

    fn construct_triangle_location_2(&self, tri2: [Vec2; 3], bary: [f32; 3]) -> Vec2;

    fn construct_triangle_location_3(&self, tri3: [Vec3; 3], bary: [f32; 3]) -> Vec3;

    /// Intersects segment `seg` with the ray from `ray_origin` through
    /// `ray_through`. `None` if the ray does not cross the segment.
    fn intersect_segment_ray(
        &self,
        seg: (Vec2, Vec2),
        ray_origin: Vec2,
        ray_through: Vec2,
    ) -> Option<Vec2>;

    /// Intersects segment `seg` with the infinite line through `line_a` and
    /// `line_b`. `None` if the line is parallel to the segment or crosses its
    /// supporting line outside of `[0, 1]`.
    fn intersect_segment_line(
        &self,
        seg: (Vec2, Vec2),
        line_a: Vec2,
        line_b: Vec2,
    ) -> Option<Vec2>;

    fn compute_squared_distance_2(&self, p: Vec2, q: Vec2) -> f32;

    /// Parametric position of `p` along segment `a -> b`, assuming `p` lies on
    /// the segment's supporting line. Clamped to `[0, 1]`.
    fn parametric_distance_along_segment_2(&self, a: Vec2, b: Vec2, p: Vec2) -> f32;

    /// Compares where `line1` crosses `seg1` against where `line2` crosses
    /// `seg2`, in terms of the crossing points' parametric position along
    /// their respective segments.
    fn compare_relative_intersection_along_segment_2(
        &self,
        seg1: (Vec2, Vec2),
        line1: (Vec2, Vec2),
        seg2: (Vec2, Vec2),
        line2: (Vec2, Vec2),
    ) -> RelativeOrder;

    /// A vertex is a saddle point when the sum of the angles of its incident
    /// faces exceeds 2*PI (negative curvature / angle excess).
    fn is_saddle_vertex(&self, mesh: &MeshConnectivity, positions: &Positions, v: VertexId) -> bool;
}

/// The default kernel: ordinary `f32` arithmetic via `glam`, with a single
/// tolerance used for degeneracy checks and the saddle predicate.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanKernel {
    pub tolerance: f32,
}

impl Default for EuclideanKernel {
    fn default() -> Self {
        Self { tolerance: 1e-5 }
    }
}

impl EuclideanKernel {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    /// Finds the point at distance `dist_from_s0`/`dist_from_s1` from `s0`/`s1`
    /// respectively, on the opposite side of line `s0 -> s1` from
    /// `away_from`. This is the circle-circle intersection used to place the
    /// third corner of an unfolded triangle.
    fn unfold_apex(
        &self,
        s0: Vec2,
        s1: Vec2,
        dist_from_s0: f32,
        dist_from_s1: f32,
        away_from: Vec2,
    ) -> Result<Vec2, GeodesicError> {
        let base = s1 - s0;
        let d = base.length();
        if d <= self.tolerance {
            return Err(GeodesicError::NumericOverflow);
        }
        // Triangle inequality, with a little slack for floating point error
        // accumulated across many unfoldings.
        let slack = self.tolerance.max(1e-4) * (dist_from_s0 + dist_from_s1 + d).max(1.0);
        if d > dist_from_s0 + dist_from_s1 + slack
            || d < (dist_from_s0 - dist_from_s1).abs() - slack
        {
            return Err(GeodesicError::NumericOverflow);
        }

        let a = (dist_from_s0 * dist_from_s0 - dist_from_s1 * dist_from_s1 + d * d) / (2.0 * d);
        let h_sq = (dist_from_s0 * dist_from_s0 - a * a).max(0.0);
        let h = h_sq.sqrt();

        let dir = base / d;
        let normal = Vec2::new(-dir.y, dir.x);
        let mid = s0 + dir * a;

        let candidate_pos = mid + normal * h;
        let candidate_neg = mid - normal * h;

        let side = |p: Vec2| cross2(base, p - s0);
        let away_side = side(away_from);

        Ok(if away_side >= 0.0 {
            if side(candidate_neg) < 0.0 {
                candidate_neg
            } else {
                candidate_pos
            }
        } else if side(candidate_pos) > 0.0 {
            candidate_pos
        } else {
            candidate_neg
        })
    }
}

fn cross2(u: Vec2, v: Vec2) -> f32 {
    u.x * v.y - u.y * v.x
}

impl Kernel for EuclideanKernel {
    fn flatten_triangle_3_along_segment_2(
        &self,
        tri3: [Vec3; 3],
        known_indices: (usize, usize),
        segment2: (Vec2, Vec2),
        away_from: Vec2,
    ) -> Result<[Vec2; 3], GeodesicError> {
        let (i0, i1) = known_indices;
        let i2 = 3 - i0 - i1;

        let d0 = tri3[i0].distance(tri3[i2]);
        let d1 = tri3[i1].distance(tri3[i2]);

        let apex = self.unfold_apex(segment2.0, segment2.1, d0, d1, away_from)?;

        let mut out = [Vec2::ZERO; 3];
        out[i0] = segment2.0;
        out[i1] = segment2.1;
        out[i2] = apex;
        Ok(out)
    }

    fn project_triangle_3_to_triangle_2(&self, tri3: [Vec3; 3]) -> [Vec2; 3] {
        let d01 = tri3[0].distance(tri3[1]);
        let d02 = tri3[0].distance(tri3[2]);
        let d12 = tri3[1].distance(tri3[2]);

        let p0 = Vec2::ZERO;
        let p1 = Vec2::new(d01, 0.0);

        if d01 <= self.tolerance {
            return [p0, p1, Vec2::new(0.0, d02)];
        }

        let cos_a = ((d01 * d01 + d02 * d02 - d12 * d12) / (2.0 * d01 * d02)).clamp(-1.0, 1.0);
        let angle = cos_a.acos();
        let p2 = Vec2::new(d02 * angle.cos(), d02 * angle.sin());

        [p0, p1, p2]
    }

    fn construct_triangle_location_2(&self, tri2: [Vec2; 3], bary: [f32; 3]) -> Vec2 {
        tri2[0] * bary[0] + tri2[1] * bary[1] + tri2[2] * bary[2]
    }

    fn construct_triangle_location_3(&self, tri3: [Vec3; 3], bary: [f32; 3]) -> Vec3 {
        tri3[0] * bary[0] + tri3[1] * bary[1] + tri3[2] * bary[2]
    }

    fn intersect_segment_ray(
        &self,
        seg: (Vec2, Vec2),
        ray_origin: Vec2,
        ray_through: Vec2,
    ) -> Option<Vec2> {
        self.intersect_impl(seg, ray_origin, ray_through, true)
    }

    fn intersect_segment_line(&self, seg: (Vec2, Vec2), line_a: Vec2, line_b: Vec2) -> Option<Vec2> {
        self.intersect_impl(seg, line_a, line_b, false)
    }

    fn compute_squared_distance_2(&self, p: Vec2, q: Vec2) -> f32 {
        (p - q).length_squared()
    }

    fn parametric_distance_along_segment_2(&self, a: Vec2, b: Vec2, p: Vec2) -> f32 {
        let d = b - a;
        let len_sq = d.length_squared();
        if len_sq <= self.tolerance {
            return 0.0;
        }
        ((p - a).dot(d) / len_sq).clamp(0.0, 1.0)
    }

    fn compare_relative_intersection_along_segment_2(
        &self,
        seg1: (Vec2, Vec2),
        line1: (Vec2, Vec2),
        seg2: (Vec2, Vec2),
        line2: (Vec2, Vec2),
    ) -> RelativeOrder {
        let t1 = self
            .intersect_segment_line(seg1, line1.0, line1.1)
            .map(|p| self.parametric_distance_along_segment_2(seg1.0, seg1.1, p));
        let t2 = self
            .intersect_segment_line(seg2, line2.0, line2.1)
            .map(|p| self.parametric_distance_along_segment_2(seg2.0, seg2.1, p));

        match (t1, t2) {
            (Some(a), Some(b)) => {
                if (a - b).abs() <= self.tolerance {
                    RelativeOrder::Equal
                } else if a < b {
                    RelativeOrder::Smaller
                } else {
                    RelativeOrder::Larger
                }
            }
            // Degenerate: a ray failed to cross its segment. There's no
            // principled order to report; callers treat this as a tie.
            _ => RelativeOrder::Equal,
        }
    }

    fn is_saddle_vertex(&self, mesh: &MeshConnectivity, positions: &Positions, v: VertexId) -> bool {
        let Ok(faces) = mesh.at_vertex(v).adjacent_faces() else {
            return false;
        };

        let mut angle_sum = 0.0f32;
        for f in faces {
            let verts = mesh.face_vertices(f);
            let Some(idx) = verts.iter().position(|&x| x == v) else {
                continue;
            };
            let p0 = positions[v];
            let p1 = positions[verts[(idx + 1) % 3]];
            let p2 = positions[verts[(idx + 2) % 3]];
            let e1 = p1 - p0;
            let e2 = p2 - p0;
            if e1.length_squared() <= self.tolerance || e2.length_squared() <= self.tolerance {
                continue;
            }
            let cos_a = e1.normalize().dot(e2.normalize()).clamp(-1.0, 1.0);
            angle_sum += cos_a.acos();
        }

        angle_sum > 2.0 * std::f32::consts::PI + self.tolerance
    }
}

impl EuclideanKernel {
    fn intersect_impl(
        &self,
        seg: (Vec2, Vec2),
        origin: Vec2,
        through: Vec2,
        ray: bool,
    ) -> Option<Vec2> {
        let d1 = seg.1 - seg.0;
        let d2 = through - origin;
        let denom = cross2(d1, d2);
        if denom.abs() <= self.tolerance {
            return None;
        }

        let diff = origin - seg.0;
        let t = cross2(diff, d2) / denom;
        let s = cross2(diff, d1) / denom;

        let eps = self.tolerance;
        if t < -eps || t > 1.0 + eps {
            return None;
        }
        if ray && s < -eps {
            return None;
        }

        Some(seg.0 + d1 * t.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projecting_unit_triangle_preserves_edge_lengths() {
        let kernel = EuclideanKernel::default();
        let tri3 = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let tri2 = kernel.project_triangle_3_to_triangle_2(tri3);
        assert!((tri2[0].distance(tri2[1]) - 1.0).abs() < 1e-4);
        assert!((tri2[0].distance(tri2[2]) - 1.0).abs() < 1e-4);
        assert!((tri2[1].distance(tri2[2]) - 2.0_f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn unfolding_shares_the_given_edge_and_avoids_folding_back() {
        let kernel = EuclideanKernel::default();
        let tri3 = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.5, 0.5, 0.0),
        ];
        let segment2 = (Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0));
        let away_from = Vec2::new(0.5, 1.0);
        let tri2 = kernel
            .flatten_triangle_3_along_segment_2(tri3, (0, 1), segment2, away_from)
            .unwrap();
        assert_eq!(tri2[0], segment2.0);
        assert_eq!(tri2[1], segment2.1);
        // The apex should land on the opposite side from `away_from`.
        assert!(tri2[2].y < 0.0);
    }

    #[test]
    fn ray_intersection_finds_midpoint_crossing() {
        let kernel = EuclideanKernel::default();
        let seg = (Vec2::new(0.0, -1.0), Vec2::new(0.0, 1.0));
        let hit = kernel
            .intersect_segment_ray(seg, Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0))
            .unwrap();
        assert!(hit.distance(Vec2::new(0.0, 0.0)) < 1e-4);
    }

    #[test]
    fn flat_square_vertex_is_not_a_saddle() {
        let mesh = crate::mesh::halfedge::primitives::flat_square(
            Vec3::ZERO,
            Vec3::Y,
            Vec3::X,
            glam::Vec2::splat(2.0),
        )
        .unwrap();
        let kernel = EuclideanKernel::default();
        let conn = mesh.connectivity();
        let (v, _) = conn.iter_vertices().next().unwrap();
        assert!(!kernel.is_saddle_vertex(conn, mesh.positions(), v));
    }
}
