//! Small fixed-size math helpers shared by the evaluator and the optimizer

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use std::f64::consts::PI;
use std::ops::{Index, IndexMut};
use thiserror::Error;

/// Errors raised by math primitives on illegal inputs
#[derive(Error, Debug)]
pub enum MathError {
    #[error("cannot normalize a vector of zero length")]
    ZeroNorm,

    #[error("non-finite component in input")]
    NonFinite,
}

/// Flattened index into packed upper-triangular storage; requires i <= j
#[inline]
pub fn restrictive_index(i: usize, j: usize) -> usize {
    debug_assert!(i <= j);
    i + j * (j + 1) / 2
}

/// Flattened index into packed upper-triangular storage for any (i, j)
#[inline]
pub fn permissive_index(i: usize, j: usize) -> usize {
    if i <= j {
        restrictive_index(i, j)
    } else {
        restrictive_index(j, i)
    }
}

/// Packed storage for an n-by-n symmetric matrix, keeping only the
/// n(n+1)/2 entries with i <= j. Addressed through [`restrictive_index`]
/// and [`permissive_index`].
#[derive(Debug, Clone)]
pub struct TriangularMatrix<T> {
    n: usize,
    data: Vec<T>,
}

impl<T: Clone> TriangularMatrix<T> {
    pub fn new(n: usize, value: T) -> Self {
        Self {
            n,
            data: vec![value; n * (n + 1) / 2],
        }
    }
}

impl<T> TriangularMatrix<T> {
    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> Index<usize> for TriangularMatrix<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

impl<T> IndexMut<usize> for TriangularMatrix<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.data[index]
    }
}

/// Builds the rotation of angle |v| about the axis v/|v|. The zero vector
/// yields the identity rotation.
#[inline]
pub fn rotation_from_vector(v: Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_scaled_axis(v)
}

/// Normalizes a raw (w, x, y, z) quaternion.
pub fn unit_quaternion(w: f64, x: f64, y: f64, z: f64) -> Result<UnitQuaternion<f64>, MathError> {
    let q = Quaternion::new(w, x, y, z);
    let norm = q.norm();
    if !norm.is_finite() {
        return Err(MathError::NonFinite);
    }
    if norm == 0.0 {
        return Err(MathError::ZeroNorm);
    }
    Ok(UnitQuaternion::from_quaternion(q))
}

/// True when |q|^2 is within 1e-3 of 1.
#[inline]
pub fn is_normalized(q: &UnitQuaternion<f64>) -> bool {
    (q.as_ref().norm_squared() - 1.0).abs() < 1e-3
}

/// Wraps an angle to [-pi, pi).
#[inline]
pub fn wrap_angle(theta: f64) -> f64 {
    (theta + PI).rem_euclid(2.0 * PI) - PI
}
