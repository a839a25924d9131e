use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    #[error("Grid dimension along axis {axis} is zero")]
    EmptyDimension { axis: usize },

    #[error("A {dims:?} grid needs {expected} samples, but {found} were provided")]
    SampleCountMismatch {
        dims: [usize; 3],
        expected: usize,
        found: usize,
    },

    #[error("Grid shapes differ: {left:?} vs {right:?}")]
    ShapeMismatch { left: [usize; 3], right: [usize; 3] },

    #[error("A {dims:?} grid has more samples than can be addressed")]
    TooLarge { dims: [usize; 3] },
}

/// Total number of samples in a grid of shape `dims`, or `None` on overflow.
pub fn sample_count(dims: [usize; 3]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Read-only access to a dense 3-D array of samples.
///
/// Implemented by [`GridField`] itself and by [`TiledView`], so the detector can
/// search a periodic supercell without materialising it.
pub trait SampleGrid: Sync {
    fn dims(&self) -> [usize; 3];

    /// Sample at an in-bounds index.
    fn value(&self, index: [usize; 3]) -> f64;

    fn len(&self) -> usize {
        self.dims().iter().product()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts a row-major flat index (last axis fastest) into a grid index.
    #[inline]
    fn unravel(&self, flat: usize) -> [usize; 3] {
        let [_, d1, d2] = self.dims();
        [flat / (d1 * d2), (flat / d2) % d1, flat % d2]
    }
}

/// A scalar field sampled on a regular grid spanning one unit cell.
///
/// Samples are stored row-major with the last axis varying fastest. The field is
/// implicitly periodic: index `i` along an axis is equivalent to `i mod dims`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridField {
    dims: [usize; 3],
    samples: Vec<f64>,
}

impl GridField {
    /// Wraps a sample buffer.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::EmptyDimension`] if any dimension is zero and
    /// [`GridError::SampleCountMismatch`] if `samples` does not hold exactly
    /// `dims[0] * dims[1] * dims[2]` values.
    pub fn new(dims: [usize; 3], samples: Vec<f64>) -> Result<Self, GridError> {
        if let Some(axis) = dims.iter().position(|&d| d == 0) {
            return Err(GridError::EmptyDimension { axis });
        }
        let expected = sample_count(dims).ok_or(GridError::TooLarge { dims })?;
        if samples.len() != expected {
            return Err(GridError::SampleCountMismatch {
                dims,
                expected,
                found: samples.len(),
            });
        }
        Ok(Self { dims, samples })
    }

    /// Builds a field by evaluating `f` at every grid index in storage order.
    pub fn from_fn(
        dims: [usize; 3],
        mut f: impl FnMut([usize; 3]) -> f64,
    ) -> Result<Self, GridError> {
        let capacity = sample_count(dims).ok_or(GridError::TooLarge { dims })?;
        let mut samples = Vec::with_capacity(capacity);
        for i in 0..dims[0] {
            for j in 0..dims[1] {
                for k in 0..dims[2] {
                    samples.push(f([i, j, k]));
                }
            }
        }
        Self::new(dims, samples)
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    #[inline]
    pub fn flat_index(&self, [i, j, k]: [usize; 3]) -> usize {
        (i * self.dims[1] + j) * self.dims[2] + k
    }

    /// Sample at an in-bounds index, or `None` outside `[0, dims)`.
    pub fn get(&self, index: [usize; 3]) -> Option<f64> {
        if index.iter().zip(&self.dims).any(|(&i, &d)| i >= d) {
            return None;
        }
        Some(self.samples[self.flat_index(index)])
    }

    /// Sample at any integer index, wrapped periodically into the cell.
    pub fn periodic(&self, index: [isize; 3]) -> f64 {
        let wrapped = [0, 1, 2].map(|axis| index[axis].rem_euclid(self.dims[axis] as isize) as usize);
        self.samples[self.flat_index(wrapped)]
    }

    pub fn min_value(&self) -> f64 {
        self.samples.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max_value(&self) -> f64 {
        self.samples.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// A virtual `reps[0] x reps[1] x reps[2]` periodic tiling of this field.
    pub fn tiled(&self, reps: [usize; 3]) -> TiledView<'_> {
        TiledView { field: self, reps }
    }

    /// Point-wise `self - other`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::ShapeMismatch`] when the two grids differ in shape.
    pub fn difference(&self, other: &GridField) -> Result<GridField, GridError> {
        if self.dims != other.dims {
            return Err(GridError::ShapeMismatch {
                left: self.dims,
                right: other.dims,
            });
        }
        let samples = self
            .samples
            .iter()
            .zip(&other.samples)
            .map(|(a, b)| a - b)
            .collect();
        Ok(GridField {
            dims: self.dims,
            samples,
        })
    }
}

impl SampleGrid for GridField {
    fn dims(&self) -> [usize; 3] {
        self.dims
    }

    #[inline]
    fn value(&self, index: [usize; 3]) -> f64 {
        self.samples[self.flat_index(index)]
    }
}

/// Periodic supercell over a borrowed [`GridField`]; indices are folded back
/// into the original cell on access.
#[derive(Debug, Clone, Copy)]
pub struct TiledView<'a> {
    field: &'a GridField,
    reps: [usize; 3],
}

impl TiledView<'_> {
    pub fn reps(&self) -> [usize; 3] {
        self.reps
    }
}

impl SampleGrid for TiledView<'_> {
    fn dims(&self) -> [usize; 3] {
        let base = self.field.dims;
        [0, 1, 2].map(|axis| base[axis] * self.reps[axis])
    }

    #[inline]
    fn value(&self, index: [usize; 3]) -> f64 {
        let base = self.field.dims;
        self.field
            .value([index[0] % base[0], index[1] % base[1], index[2] % base[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(dims: [usize; 3]) -> GridField {
        GridField::from_fn(dims, |[i, j, k]| (i * 100 + j * 10 + k) as f64).unwrap()
    }

    #[test]
    fn new_rejects_zero_dimensions() {
        assert_eq!(
            GridField::new([2, 0, 2], vec![]),
            Err(GridError::EmptyDimension { axis: 1 })
        );
    }

    #[test]
    fn new_rejects_sample_count_mismatch() {
        let err = GridField::new([2, 2, 2], vec![0.0; 7]).unwrap_err();
        assert_eq!(
            err,
            GridError::SampleCountMismatch {
                dims: [2, 2, 2],
                expected: 8,
                found: 7
            }
        );
    }

    #[test]
    fn sample_count_overflow_is_an_error_not_a_panic() {
        let dims = [4_000_000, 4_000_000, 4_000_000];
        assert_eq!(sample_count(dims), None);
        assert_eq!(sample_count([2, 3, 4]), Some(24));
        assert_eq!(GridField::new(dims, Vec::new()), Err(GridError::TooLarge { dims }));
    }

    #[test]
    fn storage_order_has_last_axis_fastest() {
        let field = ramp([2, 3, 4]);
        assert_eq!(field.samples()[1], 1.0);
        assert_eq!(field.samples()[4], 10.0);
        assert_eq!(field.samples()[12], 100.0);
        assert_eq!(field.get([1, 2, 3]), Some(123.0));
        assert_eq!(field.get([2, 0, 0]), None);
        assert_eq!(field.unravel(field.flat_index([1, 2, 3])), [1, 2, 3]);
    }

    #[test]
    fn periodic_indexing_wraps_in_both_directions() {
        let field = ramp([2, 3, 4]);
        assert_eq!(field.periodic([-1, 0, 0]), field.periodic([1, 0, 0]));
        assert_eq!(field.periodic([0, 3, 5]), 1.0);
        assert_eq!(field.periodic([-2, -3, -4]), 0.0);
    }

    #[test]
    fn tiled_view_repeats_the_cell() {
        let field = ramp([2, 3, 4]);
        let view = field.tiled([3, 3, 3]);
        assert_eq!(view.dims(), [6, 9, 12]);
        assert_eq!(view.len(), 27 * field.len());
        assert_eq!(view.value([3, 4, 5]), field.value([1, 1, 1]));
        assert_eq!(view.value([5, 8, 11]), field.value([1, 2, 3]));
    }

    #[test]
    fn difference_requires_matching_shapes() {
        let a = ramp([2, 2, 2]);
        let b = GridField::new([2, 2, 2], vec![1.0; 8]).unwrap();
        let diff = a.difference(&b).unwrap();
        assert_eq!(diff.get([1, 1, 1]), Some(110.0));

        let c = ramp([2, 2, 3]);
        assert!(matches!(
            a.difference(&c),
            Err(GridError::ShapeMismatch { .. })
        ));
    }
}
