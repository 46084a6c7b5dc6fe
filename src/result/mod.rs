//! Docked poses and the RMSD-diverse bounded container they cluster into

use nalgebra::Vector3;
use std::cmp::Ordering;

/// A pose found by local optimization, kept for later clustering
#[derive(Debug, Clone)]
pub struct DockingResult {
    /// Free energy
    pub e: f64,

    /// Inter-molecular free energy
    pub f: f64,

    /// Normalized free energy, filled in by the driver for output
    pub e_nd: f64,

    /// Heavy atom coordinates in original atom order
    pub heavy_atoms: Vec<Vector3<f64>>,

    /// Hydrogen coordinates in original atom order
    pub hydrogens: Vec<Vector3<f64>>,
}

impl DockingResult {
    pub fn new(
        e: f64,
        f: f64,
        heavy_atoms: Vec<Vector3<f64>>,
        hydrogens: Vec<Vector3<f64>>,
    ) -> Self {
        Self {
            e,
            f,
            e_nd: 0.0,
            heavy_atoms,
            hydrogens,
        }
    }
}

/// Mean squared deviation between two atom-order aligned coordinate sets
pub fn rmsd_sqr(a: &[Vector3<f64>], b: &[Vector3<f64>]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    debug_assert!(!a.is_empty());
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(p, q)| (p - q).norm_squared())
        .sum();
    sum / a.len() as f64
}

/// Bounded pose set, kept sorted ascending by free energy. No two members
/// are closer than the RMSD^2 threshold unless one replaced the other by
/// being strictly better in energy.
#[derive(Debug, Clone)]
pub struct ResultContainer {
    capacity: usize,
    required_square_error: f64,
    results: Vec<DockingResult>,
}

impl ResultContainer {
    pub const DEFAULT_CAPACITY: usize = 20;

    /// Default RMSD^2 threshold: (2 A)^2
    pub const DEFAULT_REQUIRED_SQUARE_ERROR: f64 = 4.0;

    pub fn new(capacity: usize, required_square_error: f64) -> Self {
        Self {
            capacity,
            required_square_error,
            results: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[DockingResult] {
        &self.results
    }

    pub fn results_mut(&mut self) -> &mut [DockingResult] {
        &mut self.results
    }

    /// Clusters a candidate into the container
    pub fn push(&mut self, r: DockingResult) {
        if self.results.is_empty() {
            self.results.push(r);
            return;
        }

        // Find the member closest to the candidate.
        let mut index = 0;
        let mut best_square_error = rmsd_sqr(&r.heavy_atoms, &self.results[0].heavy_atoms);
        for (i, existing) in self.results.iter().enumerate().skip(1) {
            let this_square_error = rmsd_sqr(&r.heavy_atoms, &existing.heavy_atoms);
            if this_square_error < best_square_error {
                index = i;
                best_square_error = this_square_error;
            }
        }

        if best_square_error < self.required_square_error {
            // The candidate duplicates an existing pose; keep the better one.
            if r.e < self.results[index].e {
                self.results[index] = r;
            }
        } else if self.results.len() < self.capacity {
            self.results.push(r);
        } else if r.e < self.results[self.results.len() - 1].e {
            // Full container: the candidate displaces the worst member.
            let last = self.results.len() - 1;
            self.results[last] = r;
        }

        self.results
            .sort_by(|a, b| a.e.partial_cmp(&b.e).unwrap_or(Ordering::Equal));
    }

    /// Folds another container's poses into this one
    pub fn merge(&mut self, other: ResultContainer) {
        for r in other.results {
            self.push(r);
        }
    }
}
