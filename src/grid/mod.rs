//! Search box and its discretisation into cubic partitions

use nalgebra::Vector3;
use thiserror::Error;

/// Default partition granularity in Angstroms
pub const DEFAULT_GRANULARITY: f64 = 0.15625;

/// Errors that can occur when constructing a search box
#[derive(Error, Debug)]
pub enum BoxError {
    #[error("non-finite box geometry")]
    NonFinite,

    #[error("box span must be positive in every dimension")]
    InvalidSpan,

    #[error("granularity must be positive, got {0}")]
    InvalidGranularity(f64),
}

/// Rectangular search region discretised into cubic partitions.
///
/// `span` is the half-extent: the box reaches from `center - span` to
/// `center + span`. Each axis is cut into `num_partitions` cells of edge
/// `partition_size`, which together tile the box exactly.
#[derive(Debug, Clone)]
pub struct SearchBox {
    pub center: Vector3<f64>,
    pub span: Vector3<f64>,
    pub corner1: Vector3<f64>,
    pub corner2: Vector3<f64>,
    pub num_partitions: [usize; 3],
    pub partition_size: Vector3<f64>,
    partition_size_inverse: Vector3<f64>,
}

impl SearchBox {
    pub fn new(
        center: Vector3<f64>,
        span: Vector3<f64>,
        granularity: f64,
    ) -> Result<Self, BoxError> {
        if !(center.iter().all(|c| c.is_finite()) && span.iter().all(|s| s.is_finite())) {
            return Err(BoxError::NonFinite);
        }
        if span.iter().any(|&s| s <= 0.0) {
            return Err(BoxError::InvalidSpan);
        }
        if !(granularity.is_finite() && granularity > 0.0) {
            return Err(BoxError::InvalidGranularity(granularity));
        }

        let corner1 = center - span;
        let corner2 = center + span;
        let mut num_partitions = [0usize; 3];
        let mut partition_size = Vector3::zeros();
        let mut partition_size_inverse = Vector3::zeros();
        for k in 0..3 {
            let extent = 2.0 * span[k];
            num_partitions[k] = (extent / granularity).ceil().max(1.0) as usize;
            partition_size[k] = extent / num_partitions[k] as f64;
            partition_size_inverse[k] = 1.0 / partition_size[k];
        }

        Ok(Self {
            center,
            span,
            corner1,
            corner2,
            num_partitions,
            partition_size,
            partition_size_inverse,
        })
    }

    pub fn contains(&self, p: &Vector3<f64>) -> bool {
        (0..3).all(|k| self.corner1[k] <= p[k] && p[k] <= self.corner2[k])
    }

    /// Componentwise clamp of `p` into the box
    pub fn project(&self, p: &Vector3<f64>) -> Vector3<f64> {
        Vector3::from_fn(|k, _| p[k].clamp(self.corner1[k], self.corner2[k]))
    }

    /// Squared distance from `p` to the axis-aligned cell [corner1, corner2];
    /// zero when `p` is inside
    pub fn cell_distance_sqr(
        corner1: &Vector3<f64>,
        corner2: &Vector3<f64>,
        p: &Vector3<f64>,
    ) -> f64 {
        let mut sum = 0.0;
        for k in 0..3 {
            let d = if p[k] < corner1[k] {
                corner1[k] - p[k]
            } else if p[k] > corner2[k] {
                p[k] - corner2[k]
            } else {
                0.0
            };
            sum += d * d;
        }
        sum
    }

    /// Squared distance from `p` to its projection onto the box
    pub fn project_distance_sqr(&self, p: &Vector3<f64>) -> f64 {
        Self::cell_distance_sqr(&self.corner1, &self.corner2, p)
    }

    /// Index of the partition containing the projection of `p`
    pub fn partition_index(&self, p: &Vector3<f64>) -> [usize; 3] {
        let q = self.project(p);
        let mut index = [0usize; 3];
        for k in 0..3 {
            let i = ((q[k] - self.corner1[k]) * self.partition_size_inverse[k]) as usize;
            index[k] = i.min(self.num_partitions[k] - 1);
        }
        index
    }

    /// Low corner of partition `index`. An index component equal to
    /// `num_partitions` is allowed so the high corner of the last cell can
    /// be formed as the low corner of the one-past-the-end cell.
    pub fn partition_corner1(&self, index: [usize; 3]) -> Vector3<f64> {
        Vector3::from_fn(|k, _| self.corner1[k] + self.partition_size[k] * index[k] as f64)
    }

    /// Row-major offset of partition `index` into a flattened cell array
    pub fn partition_offset(&self, index: [usize; 3]) -> usize {
        debug_assert!((0..3).all(|k| index[k] < self.num_partitions[k]));
        (index[0] * self.num_partitions[1] + index[1]) * self.num_partitions[2] + index[2]
    }

    /// Total number of partitions
    pub fn num_cells(&self) -> usize {
        self.num_partitions[0] * self.num_partitions[1] * self.num_partitions[2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> SearchBox {
        SearchBox::new(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(5.0, 5.0, 5.0),
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let c = Vector3::zeros();
        let s = Vector3::new(5.0, 5.0, 5.0);
        assert!(SearchBox::new(Vector3::new(f64::NAN, 0.0, 0.0), s, 1.0).is_err());
        assert!(SearchBox::new(c, Vector3::new(5.0, 0.0, 5.0), 1.0).is_err());
        assert!(SearchBox::new(c, s, 0.0).is_err());
        assert!(SearchBox::new(c, s, -0.5).is_err());
    }

    #[test]
    fn test_partitions_tile_the_box() {
        let b = SearchBox::new(
            Vector3::zeros(),
            Vector3::new(5.0, 4.0, 3.3),
            DEFAULT_GRANULARITY,
        )
        .unwrap();
        for k in 0..3 {
            let covered = b.partition_size[k] * b.num_partitions[k] as f64;
            assert!((covered - 2.0 * b.span[k]).abs() < 1e-12);
            assert!(b.partition_size[k] <= DEFAULT_GRANULARITY + 1e-12);
        }
    }

    #[test]
    fn test_project_clamps() {
        let b = unit_box();
        let inside = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(b.project(&inside), inside);
        let outside = Vector3::new(100.0, 2.0, -100.0);
        let p = b.project(&outside);
        assert_eq!(p, Vector3::new(6.0, 2.0, -2.0));
        assert_eq!(b.project_distance_sqr(&inside), 0.0);
        assert!(b.project_distance_sqr(&outside) > 0.0);
    }

    #[test]
    fn test_cell_distance_sqr() {
        let c1 = Vector3::new(0.0, 0.0, 0.0);
        let c2 = Vector3::new(1.0, 1.0, 1.0);
        assert_eq!(
            SearchBox::cell_distance_sqr(&c1, &c2, &Vector3::new(0.5, 0.5, 0.5)),
            0.0
        );
        assert_eq!(
            SearchBox::cell_distance_sqr(&c1, &c2, &Vector3::new(2.0, 0.5, 0.5)),
            1.0
        );
        assert_eq!(
            SearchBox::cell_distance_sqr(&c1, &c2, &Vector3::new(-1.0, 2.0, 0.5)),
            2.0
        );
    }

    #[test]
    fn test_partition_index_of_corner_round_trips() {
        let b = unit_box();
        for index in [[0, 0, 0], [3, 4, 5], [9, 9, 9], [2, 0, 7]] {
            // Nudge off the corner so the cell is unambiguous.
            let p = b.partition_corner1(index) + Vector3::new(1e-9, 1e-9, 1e-9);
            assert_eq!(b.partition_index(&p), index);
        }
    }

    #[test]
    fn test_partition_index_clamps_to_box() {
        let b = unit_box();
        let far = Vector3::new(1e3, -1e3, 0.0);
        let index = b.partition_index(&far);
        assert_eq!(index[0], b.num_partitions[0] - 1);
        assert_eq!(index[1], 0);
    }

    #[test]
    fn test_partition_offset_is_row_major() {
        let b = unit_box();
        assert_eq!(b.num_partitions, [10, 10, 10]);
        assert_eq!(b.partition_offset([0, 0, 0]), 0);
        assert_eq!(b.partition_offset([0, 0, 1]), 1);
        assert_eq!(b.partition_offset([0, 1, 0]), 10);
        assert_eq!(b.partition_offset([1, 0, 0]), 100);
        assert_eq!(b.num_cells(), 1000);
    }
}
