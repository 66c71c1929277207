//! Decoded query volumes
//!
//! The request layer hands over whatever it decoded; this module checks the
//! shape before any geometry is built.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::QueryError;
use crate::geometry::Frustum;

/// Number of boundary directions a query volume must carry
pub const DIRECTION_COUNT: usize = 4;

/// Apex plus boundary directions, as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrustumQuery {
    pub origin: [f64; 3],
    pub directions: Vec<[f64; 3]>,
}

impl FrustumQuery {
    pub fn new(origin: [f64; 3], directions: Vec<[f64; 3]>) -> Self {
        Self { origin, directions }
    }

    /// Validate and build the frustum.
    pub fn to_frustum(&self) -> Result<Frustum, QueryError> {
        if self.directions.len() != DIRECTION_COUNT {
            return Err(QueryError::InvalidQueryInput(format!(
                "expected {} directions, got {}",
                DIRECTION_COUNT,
                self.directions.len()
            )));
        }
        if !self.origin.iter().all(|c| c.is_finite()) {
            return Err(QueryError::InvalidQueryInput(
                "origin has non-finite coordinates".to_string(),
            ));
        }
        if let Some(index) = self
            .directions
            .iter()
            .position(|d| !d.iter().all(|c| c.is_finite()))
        {
            return Err(QueryError::InvalidQueryInput(format!(
                "direction {index} has non-finite coordinates"
            )));
        }

        let origin = Vector3::from(self.origin);
        let directions = std::array::from_fn(|i| Vector3::from(self.directions[i]));
        Ok(Frustum::new(origin, directions)?)
    }
}
