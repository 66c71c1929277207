//! Convex query volumes built from half-spaces
//!
//! A [`Frustum`] is an open pyramid: an apex (the sensor origin) and four
//! boundary rays. Each pair of adjacent rays spans one plane through the apex.
//!
//! Normals point *outward*. A point is inside when its signed distance to
//! every plane is `<= 0`. There are no near/far caps.

use nalgebra::Vector3;
use thiserror::Error;

/// Below this sine/cosine a pair of vectors is treated as parallel/perpendicular.
const DEGENERACY_EPSILON: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("direction {index} has zero length or non-finite components")]
    ZeroDirection { index: usize },
    #[error("directions {first} and {second} are collinear")]
    Collinear { first: usize, second: usize },
    #[error("direction {index} lies on the plane it is meant to orient")]
    Coplanar { index: usize },
    #[error("direction {index} breaks convexity; give directions in cyclic order")]
    NotConvex { index: usize },
    #[error("plane {index} is not representable; origin is too far out")]
    NonFinitePlane { index: usize },
}

/// Unit vector along `dir`, or `None` for zero or non-finite input.
///
/// Scales by the largest component first so huge finite inputs don't
/// overflow the norm.
fn unit_direction(dir: &Vector3<f64>) -> Option<Vector3<f64>> {
    if !dir.iter().all(|c| c.is_finite()) {
        return None;
    }
    let scale = dir.amax();
    if scale == 0.0 {
        return None;
    }
    (dir / scale).try_normalize(0.0)
}

/// Oriented plane `normal · p = offset` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    normal: Vector3<f64>,
    offset: f64,
}

impl Plane {
    /// Plane through `point` with the given normal (normalized here).
    pub fn through(point: &Vector3<f64>, normal: Vector3<f64>) -> Self {
        let normal = normal.normalize();
        Self {
            offset: normal.dot(point),
            normal,
        }
    }

    pub fn normal(&self) -> &Vector3<f64> {
        &self.normal
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Positive on the side the normal points to.
    pub fn signed_distance(&self, point: &Vector3<f64>) -> f64 {
        self.normal.dot(point) - self.offset
    }
}

/// Four-sided viewing volume with its apex at `origin`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    origin: Vector3<f64>,
    planes: [Plane; 4],
}

impl Frustum {
    /// Build from an apex and four boundary directions relative to it.
    ///
    /// The directions must be given in cyclic order around the viewing axis
    /// (either winding works). Inputs that cannot bound a convex volume are
    /// rejected instead of producing a predicate that answers wrongly.
    pub fn new(origin: Vector3<f64>, directions: [Vector3<f64>; 4]) -> Result<Self, GeometryError> {
        let mut units = [Vector3::zeros(); 4];
        for (index, dir) in directions.iter().enumerate() {
            units[index] = unit_direction(dir).ok_or(GeometryError::ZeroDirection { index })?;
        }

        let mut planes = Vec::with_capacity(4);
        for i in 0..4 {
            let next = (i + 1) % 4;
            let opposite = (i + 2) % 4;

            let cross = units[i].cross(&units[next]);
            if cross.norm() < DEGENERACY_EPSILON {
                return Err(GeometryError::Collinear {
                    first: i,
                    second: next,
                });
            }

            let mut normal = cross.normalize();
            let side = normal.dot(&units[opposite]);
            if side.abs() < DEGENERACY_EPSILON {
                return Err(GeometryError::Coplanar { index: opposite });
            }
            if side > 0.0 {
                normal = -normal;
            }

            let plane = Plane::through(&origin, normal);
            if !plane.offset.is_finite() {
                return Err(GeometryError::NonFinitePlane { index: i });
            }
            planes.push(plane);
        }

        // Every boundary ray must sit on or inside every plane, otherwise the
        // directions were not convex in the given order.
        for plane in &planes {
            for (index, unit) in units.iter().enumerate() {
                if plane.normal.dot(unit) > DEGENERACY_EPSILON {
                    return Err(GeometryError::NotConvex { index });
                }
            }
        }

        Ok(Self {
            origin,
            planes: std::array::from_fn(|i| planes[i]),
        })
    }

    /// Build from an apex and four corner points in world coordinates.
    pub fn from_corners(
        origin: Vector3<f64>,
        corners: [Vector3<f64>; 4],
    ) -> Result<Self, GeometryError> {
        Self::new(origin, corners.map(|corner| corner - origin))
    }

    pub fn origin(&self) -> &Vector3<f64> {
        &self.origin
    }

    pub fn planes(&self) -> &[Plane; 4] {
        &self.planes
    }

    pub fn contains(&self, point: &Vector3<f64>) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(point) <= 0.0)
    }

    pub fn contains_xyz(&self, x: f64, y: f64, z: f64) -> bool {
        self.contains(&Vector3::new(x, y, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Symmetric 90° pyramid opening along +x.
    fn forward_pyramid(origin: Vector3<f64>) -> Frustum {
        Frustum::new(
            origin,
            [
                Vector3::new(1.0, 1.0, 1.0),
                Vector3::new(1.0, -1.0, 1.0),
                Vector3::new(1.0, -1.0, -1.0),
                Vector3::new(1.0, 1.0, -1.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn point_ahead_is_inside_point_behind_is_outside() {
        let frustum = forward_pyramid(Vector3::zeros());
        assert!(frustum.contains_xyz(5.0, 0.0, 0.0));
        assert!(!frustum.contains_xyz(-5.0, 0.0, 0.0));
    }

    #[test]
    fn lateral_bounds() {
        let frustum = forward_pyramid(Vector3::zeros());
        assert!(frustum.contains_xyz(2.0, 1.9, -1.9));
        assert!(!frustum.contains_xyz(2.0, 2.1, 0.0));
        assert!(!frustum.contains_xyz(2.0, 0.0, -2.1));
        // Apex and boundary rays count as inside.
        assert!(frustum.contains_xyz(0.0, 0.0, 0.0));
        assert!(frustum.contains_xyz(3.0, 3.0, 3.0));
    }

    #[test]
    fn winding_does_not_matter() {
        let reversed = Frustum::new(
            Vector3::zeros(),
            [
                Vector3::new(1.0, 1.0, -1.0),
                Vector3::new(1.0, -1.0, -1.0),
                Vector3::new(1.0, -1.0, 1.0),
                Vector3::new(1.0, 1.0, 1.0),
            ],
        )
        .unwrap();
        assert!(reversed.contains_xyz(5.0, 0.0, 0.0));
        assert!(!reversed.contains_xyz(-5.0, 0.0, 0.0));
    }

    #[test]
    fn translated_origin() {
        let frustum = forward_pyramid(Vector3::new(10.0, -3.0, 2.0));
        assert!(frustum.contains_xyz(15.0, -3.0, 2.0));
        assert!(!frustum.contains_xyz(5.0, 0.0, 0.0));
    }

    #[test]
    fn corners_match_directions() {
        let origin = Vector3::new(1.0, 1.0, 0.0);
        let by_corners = Frustum::from_corners(
            origin,
            [
                Vector3::new(2.0, 2.0, 1.0),
                Vector3::new(2.0, 0.0, 1.0),
                Vector3::new(2.0, 0.0, -1.0),
                Vector3::new(2.0, 2.0, -1.0),
            ],
        )
        .unwrap();
        assert_eq!(by_corners, forward_pyramid(origin));
    }

    #[test]
    fn planes_are_unit_and_pass_through_origin() {
        let origin = Vector3::new(0.5, 0.25, -4.0);
        let frustum = forward_pyramid(origin);
        for plane in frustum.planes() {
            assert!((plane.normal().norm() - 1.0).abs() < 1e-12);
            assert!(plane.signed_distance(&origin).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_direction_is_degenerate() {
        let err = Frustum::new(
            Vector3::zeros(),
            [
                Vector3::new(1.0, 1.0, 1.0),
                Vector3::zeros(),
                Vector3::new(1.0, -1.0, -1.0),
                Vector3::new(1.0, 1.0, -1.0),
            ],
        )
        .unwrap_err();
        assert_eq!(err, GeometryError::ZeroDirection { index: 1 });
    }

    #[test]
    fn collinear_neighbours_are_degenerate() {
        let err = Frustum::new(
            Vector3::zeros(),
            [
                Vector3::new(1.0, 1.0, 1.0),
                Vector3::new(2.0, 2.0, 2.0),
                Vector3::new(1.0, -1.0, -1.0),
                Vector3::new(1.0, 1.0, -1.0),
            ],
        )
        .unwrap_err();
        assert_eq!(err, GeometryError::Collinear { first: 0, second: 1 });
    }

    #[test]
    fn flat_fan_is_degenerate() {
        let err = Frustum::new(
            Vector3::zeros(),
            [
                Vector3::new(1.0, 1.0, 0.0),
                Vector3::new(1.0, 0.5, 0.0),
                Vector3::new(1.0, -0.5, 0.0),
                Vector3::new(1.0, -1.0, 0.0),
            ],
        )
        .unwrap_err();
        assert_eq!(err, GeometryError::Coplanar { index: 2 });
    }

    #[test]
    fn crossed_ordering_is_rejected() {
        let err = Frustum::new(
            Vector3::zeros(),
            [
                Vector3::new(1.0, 1.0, 1.0),
                Vector3::new(1.0, -1.0, -1.0),
                Vector3::new(1.0, -1.0, 1.0),
                Vector3::new(1.0, 1.0, -1.0),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, GeometryError::NotConvex { .. }));
    }

    #[test]
    fn huge_directions_keep_their_shape() {
        let s = 1e160;
        let frustum = Frustum::new(
            Vector3::zeros(),
            [
                Vector3::new(s, s, s),
                Vector3::new(s, -s, s),
                Vector3::new(s, -s, -s),
                Vector3::new(s, s, -s),
            ],
        )
        .unwrap();
        assert_eq!(frustum, forward_pyramid(Vector3::zeros()));
        assert!(frustum.contains_xyz(5.0, 0.0, 0.0));
        assert!(!frustum.contains_xyz(-5.0, 0.0, 0.0));
        for plane in frustum.planes() {
            assert!(plane.normal().iter().all(|c| c.is_finite()));
        }
    }

    #[test]
    fn tiny_directions_are_not_zero() {
        let s = 1e-200;
        let frustum = Frustum::new(
            Vector3::zeros(),
            [
                Vector3::new(s, s, s),
                Vector3::new(s, -s, s),
                Vector3::new(s, -s, -s),
                Vector3::new(s, s, -s),
            ],
        )
        .unwrap();
        assert!(frustum.contains_xyz(5.0, 0.0, 0.0));
    }

    #[test]
    fn origin_beyond_float_range_is_rejected() {
        let origin = Vector3::new(1.5e308, 0.0, -1.5e308);
        let err = Frustum::new(
            origin,
            [
                Vector3::new(1.0, 1.0, 1.0),
                Vector3::new(1.0, -1.0, 1.0),
                Vector3::new(1.0, -1.0, -1.0),
                Vector3::new(1.0, 1.0, -1.0),
            ],
        )
        .unwrap_err();
        assert_eq!(err, GeometryError::NonFinitePlane { index: 0 });
    }
}
