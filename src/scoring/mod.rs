//! The semi-empirical scoring function, tabulated per XS type pair

use rayon::prelude::*;

use crate::atom::{XsType, XS_TYPE_SIZE};
use crate::math::permissive_index;

/// Maximum pairwise distance at which the potential is evaluated
pub const CUTOFF: f64 = 8.0;
pub const CUTOFF_SQR: f64 = CUTOFF * CUTOFF;

/// Samples per unit of squared distance
pub const FACTOR: f64 = 256.0;
pub const FACTOR_INVERSE: f64 = 1.0 / FACTOR;

/// Table length per type pair: FACTOR * CUTOFF_SQR + 1
pub const NUM_SAMPLES: usize = 16385;

// Term weights, fixed at build time.
const WEIGHT_GAUSS1: f64 = -0.035579;
const WEIGHT_GAUSS2: f64 = -0.005156;
const WEIGHT_REPULSION: f64 = 0.840245;
const WEIGHT_HYDROPHOBIC: f64 = -0.035069;
const WEIGHT_HBOND: f64 = -0.587439;

/// One tabulated sample: the potential and its derivative over r.
/// Multiplying `dor` by a separation component gives the energy derivative
/// along that component.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringElement {
    pub e: f64,
    pub dor: f64,
}

/// Flattened index of an unordered XS type pair
#[inline]
pub fn type_pair_index(t1: XsType, t2: XsType) -> usize {
    permissive_index(t1 as usize, t2 as usize)
}

/// Tabulated scoring function, indexed by unordered XS type pair.
/// Built once at startup, read-only afterwards.
pub struct ScoringFunction {
    tables: Vec<Vec<ScoringElement>>,
}

impl ScoringFunction {
    /// Samples every type pair on the uniform r^2 grid
    pub fn new() -> Self {
        // rs[i] is the distance at sample i, so rs[last] == CUTOFF.
        let rs: Vec<f64> = (0..NUM_SAMPLES)
            .map(|i| (i as f64 * FACTOR_INVERSE).sqrt())
            .collect();

        // Pairs in packed triangular order, so tables[type_pair_index] lines up.
        let mut pairs = Vec::with_capacity(XS_TYPE_SIZE * (XS_TYPE_SIZE + 1) / 2);
        for (j, &t2) in XsType::ALL.iter().enumerate() {
            for &t1 in &XsType::ALL[..=j] {
                pairs.push((t1, t2));
            }
        }

        let tables = pairs
            .into_par_iter()
            .map(|(t1, t2)| Self::precalculate(t1, t2, &rs))
            .collect();

        Self { tables }
    }

    /// The exact potential for a type pair at squared distance `r2`
    pub fn score(t1: XsType, t2: XsType, r2: f64) -> f64 {
        debug_assert!(r2 <= CUTOFF_SQR);

        // Surface distance between the van der Waals spheres.
        let d = r2.sqrt() - (t1.radius() + t2.radius());

        let mut e = WEIGHT_GAUSS1 * (-(d * 2.0) * (d * 2.0)).exp()
            + WEIGHT_GAUSS2 * (-((d - 3.0) * 0.5) * ((d - 3.0) * 0.5)).exp()
            + WEIGHT_REPULSION * if d > 0.0 { 0.0 } else { d * d };

        if t1.is_hydrophobic() && t2.is_hydrophobic() {
            e += WEIGHT_HYDROPHOBIC
                * if d >= 1.5 {
                    0.0
                } else if d <= 0.5 {
                    1.0
                } else {
                    1.5 - d
                };
        }

        if XsType::hbond(t1, t2) {
            e += WEIGHT_HBOND
                * if d >= 0.0 {
                    0.0
                } else if d <= -0.7 {
                    1.0
                } else {
                    d * -1.428571
                };
        }

        e
    }

    fn precalculate(t1: XsType, t2: XsType, rs: &[f64]) -> Vec<ScoringElement> {
        let mut p = vec![ScoringElement::default(); NUM_SAMPLES];
        for (i, s) in p.iter_mut().enumerate() {
            s.e = Self::score(t1, t2, i as f64 * FACTOR_INVERSE);
        }
        // Forward difference over r, divided by r; the endpoints stay zero.
        for i in 1..NUM_SAMPLES - 1 {
            p[i].dor = (p[i + 1].e - p[i].e) / ((rs[i + 1] - rs[i]) * rs[i]);
        }
        p
    }

    /// Constant-time table lookup by squared distance
    #[inline]
    pub fn evaluate(&self, type_pair_index: usize, r2: f64) -> ScoringElement {
        debug_assert!(r2 <= CUTOFF_SQR);
        self.tables[type_pair_index][(FACTOR * r2) as usize]
    }
}

impl Default for ScoringFunction {
    fn default() -> Self {
        Self::new()
    }
}
