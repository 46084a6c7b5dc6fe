//! Pose optimization: conformation state, BFGS local search and the
//! Monte Carlo task driver

pub mod local;
pub mod monte_carlo;

use nalgebra::{UnitQuaternion, Vector3};
use std::ops::{Index, IndexMut};
use thiserror::Error;

/// Errors that can occur during optimization. Fatal to the current task
/// only; the task's slot then carries no result.
#[derive(Error, Debug)]
pub enum OptimizationError {
    #[error("math error: {0}")]
    Math(#[from] crate::math::MathError),
}

/// Ligand degrees of freedom: position, orientation and active torsions
#[derive(Debug, Clone)]
pub struct Conformation {
    pub position: Vector3<f64>,

    /// Always a unit quaternion
    pub orientation: UnitQuaternion<f64>,

    /// Active torsion angles, wrapped to [-pi, pi)
    pub torsions: Vec<f64>,
}

impl Conformation {
    pub fn new(num_active_torsions: usize) -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            torsions: vec![0.0; num_active_torsions],
        }
    }
}

/// A gradient (or step) over the 6+T degrees of freedom: components [0..3)
/// are spatial, [3..6) the axis-angle orientation tangent, [6..6+T) the
/// torsions.
#[derive(Debug, Clone)]
pub struct Change {
    values: Vec<f64>,
}

impl Change {
    pub fn zero(num_active_torsions: usize) -> Self {
        Self {
            values: vec![0.0; 6 + num_active_torsions],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

impl Index<usize> for Change {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.values[index]
    }
}

impl IndexMut<usize> for Change {
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.values[index]
    }
}

/// Energies and gradient of one evaluated conformation
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Free energy (inter + intra)
    pub e: f64,

    /// Inter-molecular free energy
    pub f: f64,

    pub g: Change,
}

impl Evaluation {
    pub fn zero(num_active_torsions: usize) -> Self {
        Self {
            e: 0.0,
            f: 0.0,
            g: Change::zero(num_active_torsions),
        }
    }
}

/// An energy model over conformations. The docking objective is the ligand
/// evaluator; tests substitute analytic surfaces.
pub trait Objective {
    /// Evaluates a conformation, writing energies and gradient into `out`.
    /// Returns false when the partial energy reaches `e_upper_bound`; the
    /// line search treats this as a rejected step, not an error.
    fn evaluate(&self, conf: &Conformation, e_upper_bound: f64, out: &mut Evaluation) -> bool;
}
