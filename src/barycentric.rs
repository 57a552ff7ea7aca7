// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Classifies a barycentric triple relative to the face it was computed
//! against: strictly inside, on one of the three edges, or at one of the
//! three corners.

use crate::error::GeodesicError;

/// The corner/edge indices below are relative to a face's halfedge cycle
/// starting at its canonical (first) halfedge: corner `i` is the source
/// vertex of the `i`-th halfedge in that cycle. A vanishing barycentric
/// coordinate `bary[i]` puts the point on the edge opposite corner `i`, the
/// halfedge from corner `(i+1)%3` to corner `(i+2)%3` — that edge is what
/// `Edge(i)` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaryClass {
    Internal,
    Edge(u8),
    Vertex(u8),
}

/// Classifies `bary`, a triple that must sum to one within `tolerance`.
/// Fails with `InvalidFaceLocation` if any coordinate is negative (beyond
/// tolerance) or the triple does not sum to one.
pub fn classify(bary: [f32; 3], tolerance: f32) -> Result<BaryClass, GeodesicError> {
    let sum = bary[0] + bary[1] + bary[2];
    if (sum - 1.0).abs() > tolerance {
        return Err(GeodesicError::InvalidFaceLocation);
    }
    if bary.iter().any(|&b| b < -tolerance) {
        return Err(GeodesicError::InvalidFaceLocation);
    }

    let zeros: SmallVecIdx = bary
        .iter()
        .enumerate()
        .filter(|(_, &b)| b.abs() <= tolerance)
        .map(|(i, _)| i as u8)
        .collect();

    match zeros.len() {
        0 => Ok(BaryClass::Internal),
        1 => Ok(BaryClass::Edge(zeros[0])),
        2 => {
            // The nonzero coordinate's index is the vertex.
            let nonzero = (0..3u8).find(|i| !zeros.contains(i)).unwrap();
            Ok(BaryClass::Vertex(nonzero))
        }
        _ => {
            // All three vanish: impossible given the sum-to-one check above,
            // but guard against pathological tolerances.
            Err(GeodesicError::InvalidFaceLocation)
        }
    }
}

type SmallVecIdx = smallvec::SmallVec<[u8; 3]>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_internal_point() {
        assert_eq!(
            classify([0.3, 0.3, 0.4], 1e-5).unwrap(),
            BaryClass::Internal
        );
    }

    #[test]
    fn classifies_edge_point() {
        assert_eq!(classify([0.5, 0.5, 0.0], 1e-5).unwrap(), BaryClass::Edge(2));
    }

    #[test]
    fn classifies_vertex_point() {
        assert_eq!(
            classify([1.0, 0.0, 0.0], 1e-5).unwrap(),
            BaryClass::Vertex(0)
        );
    }

    #[test]
    fn rejects_negative_coordinate() {
        assert!(classify([1.2, -0.2, 0.0], 1e-5).is_err());
    }

    #[test]
    fn rejects_non_unit_sum() {
        assert!(classify([0.5, 0.5, 0.5], 1e-5).is_err());
    }
}
