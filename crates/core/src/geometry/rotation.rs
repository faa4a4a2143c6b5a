use std::f64::consts::{FRAC_PI_2, PI};
use std::ops::Mul;

use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

const RTOL: f64 = 1e-5;
const ATOL: f64 = 1e-8;
const DEGENERATE_EPS: f64 = 1e-12;

#[derive(Error, Debug, PartialEq)]
pub enum RotationError {
    #[error("unknown axis '{0}' (accepting only x, y, z)")]
    UnknownAxis(char),
    #[error("got {angles} angles for an axis sequence of length {axes}")]
    SequenceLength { angles: usize, axes: usize },
}

/// A 3-D rotation stored as an orthogonal 3x3 matrix.
///
/// Values are never mutated in place; composition and the 90-degree
/// shortcuts return new rotations. Equality is tolerance based.
#[derive(Clone, Copy, Debug)]
pub struct Rotation {
    matrix: Matrix3<f64>,
}

impl Rotation {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Wraps a matrix as-is. Orthogonality is the caller's responsibility.
    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Exponential map from a rotation vector.
    pub fn exp(rotation_vector: Vector3<f64>) -> Self {
        let angle = rotation_vector.norm();
        if angle == 0.0 {
            return Self::identity();
        }
        Self::from_angle_axis(angle, rotation_vector / angle)
    }

    /// Logarithmic map back to a rotation vector.
    pub fn log(&self) -> Vector3<f64> {
        let (angle, axis) = self.to_angle_axis();
        let v = axis * angle;
        if v.iter().all(|c| c.is_finite()) {
            v
        } else {
            Vector3::zeros()
        }
    }

    pub fn inverse(&self) -> Self {
        Self {
            matrix: self.matrix.transpose(),
        }
    }

    pub fn act(&self, vector: Vector3<f64>) -> Vector3<f64> {
        self.matrix * vector
    }

    pub fn rx(angle: f64) -> Self {
        Self::from_angle_axis(angle, Vector3::x())
    }

    pub fn ry(angle: f64) -> Self {
        Self::from_angle_axis(angle, Vector3::y())
    }

    pub fn rz(angle: f64) -> Self {
        Self::from_angle_axis(angle, Vector3::z())
    }

    /// Rodrigues' formula. `axis` is used as given, without normalization.
    pub fn from_angle_axis(angle: f64, axis: Vector3<f64>) -> Self {
        let omega = axis.cross_matrix();
        Self {
            matrix: Matrix3::identity() + omega * angle.sin() + (omega * omega) * (1.0 - angle.cos()),
        }
    }

    /// Returns `(angle, unit axis)`. Identity maps to `(0, x)`.
    pub fn to_angle_axis(&self) -> (f64, Vector3<f64>) {
        let m = &self.matrix;
        // Skew part of R is sin(angle) * [n]x.
        let skew = Vector3::new(
            m[(2, 1)] - m[(1, 2)],
            m[(0, 2)] - m[(2, 0)],
            m[(1, 0)] - m[(0, 1)],
        ) / 2.0;
        let sin = skew.norm();
        let cos = (m.trace() - 1.0) / 2.0;

        if sin < DEGENERATE_EPS {
            if cos > 0.0 {
                return (0.0, Vector3::x());
            }
            // Half turn: R = 2nn^T - I. Pivot on the largest diagonal entry
            // so the normalizer stays away from zero.
            let pivot = (0..3)
                .max_by(|&a, &b| m[(a, a)].total_cmp(&m[(b, b)]))
                .unwrap_or(0);
            let mut axis: Vector3<f64> = m.column(pivot).into_owned();
            axis[pivot] += 1.0;
            let axis = axis / (2.0 + 2.0 * m[(pivot, pivot)]).sqrt();
            return (PI, axis);
        }

        (sin.atan2(cos), skew / sin)
    }

    /// Builds from a quaternion laid out as `[qx, qy, qz, qw]`.
    pub fn from_quaternion(q: [f64; 4]) -> Self {
        let vector = Vector3::new(q[0], q[1], q[2]);
        let norm = vector.norm();
        if norm == 0.0 {
            return Self::identity();
        }
        Self::from_angle_axis(2.0 * q[3].clamp(-1.0, 1.0).acos(), vector / norm)
    }

    pub fn to_quaternion(&self) -> [f64; 4] {
        let (angle, axis) = self.to_angle_axis();
        let s = (angle / 2.0).sin();
        [axis.x * s, axis.y * s, axis.z * s, (angle / 2.0).cos()]
    }

    /// Composes per-axis rotations left to right, e.g. `"zyx"` gives `Rz * Ry * Rx`.
    pub fn from_euler_angles(angles: &[f64], sequence: &str) -> Result<Self, RotationError> {
        let axes: Vec<char> = sequence.chars().collect();
        if axes.len() != angles.len() {
            return Err(RotationError::SequenceLength {
                angles: angles.len(),
                axes: axes.len(),
            });
        }
        axes.iter()
            .zip(angles)
            .try_fold(Self::identity(), |acc, (&axis, &angle)| {
                let step = match axis {
                    'x' => Self::rx(angle),
                    'y' => Self::ry(angle),
                    'z' => Self::rz(angle),
                    other => return Err(RotationError::UnknownAxis(other)),
                };
                Ok(acc * step)
            })
    }

    /// Decomposes as `Rz(z) * Ry(y) * Rx(x)` and returns `[z, y, x]`.
    pub fn to_euler_angles_zyx(&self) -> [f64; 3] {
        let m = &self.matrix;
        if m[(0, 0)].hypot(m[(1, 0)]) < DEGENERATE_EPS {
            // Gimbal lock: pitch is +-90 degrees and yaw folds into roll.
            let s = -m[(2, 0)].signum();
            let x = (s * m[(0, 1)]).atan2(m[(1, 1)]);
            return [0.0, s * FRAC_PI_2, x];
        }

        let x = m[(2, 1)].atan2(m[(2, 2)]);
        let y = (-m[(2, 0)]).atan2((m[(0, 0)].powi(2) + m[(1, 0)].powi(2)).sqrt());
        let z = m[(1, 0)].atan2(m[(0, 0)]);
        if [z, y, x].iter().all(|a| a.is_finite()) {
            [z, y, x]
        } else {
            log::warn!("Could not find Euler angles for matrix {m:?}; falling back to zeros");
            [0.0; 3]
        }
    }

    pub fn x_axis(&self) -> Vector3<f64> {
        self.matrix.column(0).into_owned()
    }

    pub fn y_axis(&self) -> Vector3<f64> {
        self.matrix.column(1).into_owned()
    }

    pub fn z_axis(&self) -> Vector3<f64> {
        self.matrix.column(2).into_owned()
    }

    /// Same as `self * Rotation::rx(PI / 2)`, computed by swapping columns.
    pub fn rot_90_x(&self) -> Self {
        self.swap_columns(1, 2)
    }

    /// Same as `self * Rotation::ry(-PI / 2)`.
    pub fn rot_90_y(&self) -> Self {
        self.swap_columns(0, 2)
    }

    /// Same as `self * Rotation::rz(PI / 2)`.
    pub fn rot_90_z(&self) -> Self {
        self.swap_columns(0, 1)
    }

    fn swap_columns(&self, a: usize, b: usize) -> Self {
        let mut matrix = self.matrix;
        let col_a = self.matrix.column(a).into_owned();
        let col_b = self.matrix.column(b).into_owned();
        matrix.set_column(a, &col_b);
        matrix.set_column(b, &(-col_a));
        Self { matrix }
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Rotation {
    type Output = Rotation;

    fn mul(self, rhs: Rotation) -> Rotation {
        Rotation {
            matrix: self.matrix * rhs.matrix,
        }
    }
}

impl PartialEq for Rotation {
    fn eq(&self, other: &Self) -> bool {
        all_close(&self.matrix, &other.matrix)
    }
}

fn all_close(a: &Matrix3<f64>, b: &Matrix3<f64>) -> bool {
    a.iter()
        .zip(b.iter())
        .all(|(x, y)| (x - y).abs() <= ATOL + RTOL * y.abs())
}
