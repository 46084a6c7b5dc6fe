//! BFGS local search with a Wolfe line search on the pose manifold
//!
//! The state is not a flat vector: positions add, the orientation takes an
//! axis-angle increment through quaternion premultiplication, and torsions
//! add modulo 2 pi. The inverse Hessian lives in packed triangular storage.

use nalgebra::Vector3;

use crate::math::{restrictive_index, permissive_index, rotation_from_vector, wrap_angle, TriangularMatrix};
use crate::optimization::{Conformation, Evaluation, Objective};

/// Line search trials per BFGS iteration
pub const NUM_ALPHAS: usize = 5;

/// Step shrink factor between trials
const ALPHA_SHRINK: f64 = 0.1;

/// Armijo sufficient-decrease parameter
const ARMIJO_C1: f64 = 1e-4;

/// Wolfe curvature parameter
const CURVATURE_C2: f64 = 0.9;

/// Minimizes the objective from (`c1`, `ev1`), which must hold a valid
/// evaluation on entry. Iterates descent steps until the line search fails
/// to find an acceptable step length; the best conformation and its
/// evaluation are left in `c1` and `ev1`.
pub fn bfgs<O: Objective>(objective: &O, c1: &mut Conformation, ev1: &mut Evaluation) {
    let n = ev1.g.len();
    let num_torsions = c1.torsions.len();

    // Inverse Hessian approximation, reset to identity.
    let mut h = TriangularMatrix::new(n, 0.0);
    for i in 0..n {
        h[restrictive_index(i, i)] = 1.0;
    }

    let mut p = vec![0.0; n];
    let mut y = vec![0.0; n];
    let mut mhy = vec![0.0; n];
    let mut c2 = c1.clone();
    let mut ev2 = Evaluation::zero(num_torsions);

    loop {
        // Descent direction p = -H g.
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..n {
                sum += h[permissive_index(i, j)] * ev1.g[j];
            }
            p[i] = -sum;
        }

        let mut pg1 = 0.0;
        for i in 0..n {
            pg1 += p[i] * ev1.g[i];
        }

        // Line search: alpha starts at 1 and shrinks. The Armijo bound is
        // folded into the evaluator's upper bound, so a rejected evaluation
        // is a failed trial; an accepted one must also pass the curvature
        // condition.
        let mut alpha = 1.0;
        let mut trial = 0;
        while trial < NUM_ALPHAS {
            c2.position = c1.position + alpha * Vector3::new(p[0], p[1], p[2]);
            debug_assert!(crate::math::is_normalized(&c1.orientation));
            c2.orientation =
                rotation_from_vector(alpha * Vector3::new(p[3], p[4], p[5])) * c1.orientation;
            debug_assert!(crate::math::is_normalized(&c2.orientation));
            for i in 0..num_torsions {
                c2.torsions[i] = wrap_angle(c1.torsions[i] + alpha * p[6 + i]);
            }

            if objective.evaluate(&c2, ev1.e + ARMIJO_C1 * alpha * pg1, &mut ev2) {
                let mut pg2 = 0.0;
                for i in 0..n {
                    pg2 += p[i] * ev2.g[i];
                }
                if pg2 >= CURVATURE_C2 * pg1 {
                    break;
                }
            }
            alpha *= ALPHA_SHRINK;
            trial += 1;
        }
        if trial == NUM_ALPHAS {
            return;
        }

        // Rank-2 update of the inverse Hessian.
        for i in 0..n {
            y[i] = ev2.g[i] - ev1.g[i];
        }
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..n {
                sum += h[permissive_index(i, j)] * y[j];
            }
            mhy[i] = -sum;
        }
        let mut yhy = 0.0;
        for i in 0..n {
            yhy -= y[i] * mhy[i];
        }
        let mut yp = 0.0;
        for i in 0..n {
            yp += y[i] * p[i];
        }
        let ryp = 1.0 / yp;
        let pco = ryp * (ryp * yhy + alpha);
        for i in 0..n {
            for j in i..n {
                h[restrictive_index(i, j)] +=
                    ryp * (mhy[i] * p[j] + mhy[j] * p[i]) + pco * p[i] * p[j];
            }
        }

        std::mem::swap(c1, &mut c2);
        std::mem::swap(ev1, &mut ev2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// f(x) = |position|^2, gradient 2x; orientation and torsions inert.
    struct QuadraticBowl;

    impl Objective for QuadraticBowl {
        fn evaluate(&self, conf: &Conformation, e_upper_bound: f64, out: &mut Evaluation) -> bool {
            let e = conf.position.norm_squared();
            if e >= e_upper_bound {
                out.e = e;
                return false;
            }
            out.e = e;
            out.f = e;
            let g = 2.0 * conf.position;
            out.g[0] = g.x;
            out.g[1] = g.y;
            out.g[2] = g.z;
            for i in 3..6 {
                out.g[i] = 0.0;
            }
            true
        }
    }

    #[test]
    fn test_bfgs_minimizes_quadratic_bowl() {
        let objective = QuadraticBowl;
        let mut c = Conformation::new(0);
        c.position = Vector3::new(1.0, 1.0, 1.0);
        let mut ev = Evaluation::zero(0);
        assert!(objective.evaluate(&c, f64::INFINITY, &mut ev));
        assert_eq!(ev.e, 3.0);

        bfgs(&objective, &mut c, &mut ev);

        // The first iteration takes the shrunken step to 0.8x; the updated
        // Hessian then sends the second step exactly to the minimum.
        assert!(c.position.norm() < 1e-6);
        assert!(ev.e < 1e-12);
        assert!(crate::math::is_normalized(&c.orientation));
    }

    #[test]
    fn test_bfgs_minimizes_shifted_bowl_with_torsions() {
        /// f = |position - a|^2 + sum (torsion_i - b_i)^2
        struct Shifted;
        impl Objective for Shifted {
            fn evaluate(
                &self,
                conf: &Conformation,
                e_upper_bound: f64,
                out: &mut Evaluation,
            ) -> bool {
                let a = Vector3::new(0.3, -0.2, 0.4);
                let b = [0.5, -1.0];
                let dp = conf.position - a;
                let mut e = dp.norm_squared();
                for (t, bi) in conf.torsions.iter().zip(b.iter()) {
                    e += (t - bi) * (t - bi);
                }
                if e >= e_upper_bound {
                    out.e = e;
                    return false;
                }
                out.e = e;
                out.f = e;
                out.g[0] = 2.0 * dp.x;
                out.g[1] = 2.0 * dp.y;
                out.g[2] = 2.0 * dp.z;
                for i in 3..6 {
                    out.g[i] = 0.0;
                }
                for (i, (t, bi)) in conf.torsions.iter().zip(b.iter()).enumerate() {
                    out.g[6 + i] = 2.0 * (t - bi);
                }
                true
            }
        }

        let objective = Shifted;
        let mut c = Conformation::new(2);
        let mut ev = Evaluation::zero(2);
        assert!(objective.evaluate(&c, f64::INFINITY, &mut ev));
        bfgs(&objective, &mut c, &mut ev);

        assert!((c.position - Vector3::new(0.3, -0.2, 0.4)).norm() < 1e-6);
        assert!((c.torsions[0] - 0.5).abs() < 1e-6);
        assert!((c.torsions[1] + 1.0).abs() < 1e-6);
        // Torsions stay wrapped.
        for &t in &c.torsions {
            assert!((-std::f64::consts::PI..std::f64::consts::PI).contains(&t));
        }
    }
}
