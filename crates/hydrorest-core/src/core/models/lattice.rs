use nalgebra::{Matrix3, Point3, Vector3};
use thiserror::Error;

const DEGENERATE_VOLUME_EPSILON: f64 = 1e-8;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LatticeError {
    #[error("Lattice vectors are degenerate (cell volume {volume:.3e} Å^3)")]
    Degenerate { volume: f64 },
    #[error("Invalid cell parameter '{name}': {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// The periodic cell of a crystal structure.
///
/// Lattice vectors are stored as the rows of a 3x3 matrix in Angstroms, so a
/// fractional coordinate `f` maps to the Cartesian point `Mᵀ·f`. The inverse is
/// cached at construction because fractional conversions dominate the workload.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Lattice {
    /// Builds a lattice from its three cell vectors.
    ///
    /// # Errors
    ///
    /// Returns [`LatticeError::Degenerate`] if the vectors span (almost) no volume.
    pub fn from_vectors(
        a: Vector3<f64>,
        b: Vector3<f64>,
        c: Vector3<f64>,
    ) -> Result<Self, LatticeError> {
        let matrix = Matrix3::from_rows(&[a.transpose(), b.transpose(), c.transpose()]);
        let volume = matrix.determinant();
        if !volume.is_finite() || volume.abs() < DEGENERATE_VOLUME_EPSILON {
            return Err(LatticeError::Degenerate { volume });
        }
        let inverse = matrix
            .try_inverse()
            .ok_or(LatticeError::Degenerate { volume })?;
        Ok(Self { matrix, inverse })
    }

    pub fn cubic(a: f64) -> Result<Self, LatticeError> {
        Self::orthorhombic(a, a, a)
    }

    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Result<Self, LatticeError> {
        Self::from_parameters([a, b, c], [90.0, 90.0, 90.0])
    }

    /// Builds a lattice from cell lengths (Å) and angles (degrees) using the
    /// conventional orientation: `a` along x, `b` in the xy-plane.
    ///
    /// # Errors
    ///
    /// Returns [`LatticeError::InvalidParameter`] for non-positive lengths, angles
    /// outside `(0, 180)`, or angle combinations that cannot close a cell.
    pub fn from_parameters(lengths: [f64; 3], angles: [f64; 3]) -> Result<Self, LatticeError> {
        const LENGTH_NAMES: [&str; 3] = ["a", "b", "c"];
        const ANGLE_NAMES: [&str; 3] = ["alpha", "beta", "gamma"];

        for (&name, &value) in LENGTH_NAMES.iter().zip(&lengths) {
            if !(value.is_finite() && value > 0.0) {
                return Err(LatticeError::InvalidParameter { name, value });
            }
        }
        for (&name, &value) in ANGLE_NAMES.iter().zip(&angles) {
            if !(value.is_finite() && value > 0.0 && value < 180.0) {
                return Err(LatticeError::InvalidParameter { name, value });
            }
        }

        let [a, b, c] = lengths;
        let [alpha, beta, gamma] = angles.map(f64::to_radians);
        let (cos_alpha, cos_beta, cos_gamma) = (alpha.cos(), beta.cos(), gamma.cos());
        let sin_gamma = gamma.sin();

        let c_x = c * cos_beta;
        let c_y = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c_z_squared = c * c - c_x * c_x - c_y * c_y;
        if c_z_squared <= 0.0 {
            return Err(LatticeError::InvalidParameter {
                name: "alpha",
                value: angles[0],
            });
        }

        Self::from_vectors(
            Vector3::new(a, 0.0, 0.0),
            Vector3::new(b * cos_gamma, b * sin_gamma, 0.0),
            Vector3::new(c_x, c_y, c_z_squared.sqrt()),
        )
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn vector(&self, axis: usize) -> Vector3<f64> {
        self.matrix.row(axis).transpose()
    }

    /// Cell lengths in Å and angles (alpha, beta, gamma) in degrees.
    pub fn parameters(&self) -> ([f64; 3], [f64; 3]) {
        let [a, b, c] = [0, 1, 2].map(|axis| self.vector(axis));
        let angle = |u: &Vector3<f64>, v: &Vector3<f64>| {
            (u.dot(v) / (u.norm() * v.norm()))
                .clamp(-1.0, 1.0)
                .acos()
                .to_degrees()
        };
        (
            [a.norm(), b.norm(), c.norm()],
            [angle(&b, &c), angle(&a, &c), angle(&a, &b)],
        )
    }

    pub fn volume(&self) -> f64 {
        self.matrix.determinant().abs()
    }

    #[inline]
    pub fn to_cartesian(&self, fractional: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.matrix.transpose() * fractional.coords)
    }

    #[inline]
    pub fn to_fractional(&self, cartesian: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.inverse.transpose() * cartesian.coords)
    }

    /// Minimum-image distance in Å between two fractional positions.
    ///
    /// The fractional difference is first wrapped into `[-0.5, 0.5]`; the 27
    /// neighbouring images are then checked so that strongly skewed cells still
    /// yield the true shortest distance.
    pub fn periodic_distance(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
        let wrapped = (b - a).map(|x| x - x.round());
        let to_cartesian = self.matrix.transpose();

        let mut best = f64::INFINITY;
        for i in -1..=1 {
            for j in -1..=1 {
                for k in -1..=1 {
                    let image = wrapped + Vector3::new(i as f64, j as f64, k as f64);
                    best = best.min((to_cartesian * image).norm());
                }
            }
        }
        best
    }
}
