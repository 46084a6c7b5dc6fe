//! The per-seed Monte Carlo search task
//!
//! Each task is self-contained: it owns its RNG, scratch buffers and result
//! container, and shares only immutable references to the receptor index and
//! the scoring table. Same seed, same inputs: bit-identical output.

use nalgebra::Vector3;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::ligand::Ligand;
use crate::math;
use crate::optimization::local::bfgs;
use crate::optimization::{Conformation, Evaluation, Objective, OptimizationError};
use crate::receptor::Receptor;
use crate::result::ResultContainer;
use crate::scoring::ScoringFunction;

/// Fixed length of the outer Metropolis loop
pub const NUM_MC_ITERATIONS: usize = 50;

/// The docking energy model: one ligand against the shared receptor index
/// and scoring table
pub struct DockingObjective<'a> {
    pub ligand: &'a Ligand,
    pub scoring: &'a ScoringFunction,
    pub receptor: &'a Receptor,
}

impl Objective for DockingObjective<'_> {
    fn evaluate(&self, conf: &Conformation, e_upper_bound: f64, out: &mut Evaluation) -> bool {
        self.ligand
            .evaluate(conf, self.scoring, self.receptor, e_upper_bound, out)
    }
}

/// Runs one randomized-restart search and returns its pose container.
///
/// The outer loop mutates only the position; BFGS then moves all degrees of
/// freedom. A mutated-and-optimized conformation is accepted only when it
/// improves on the incumbent, and every accepted pose is clustered into the
/// container.
pub fn monte_carlo_task(
    ligand: &Ligand,
    seed: u64,
    scoring: &ScoringFunction,
    receptor: &Receptor,
) -> Result<ResultContainer, OptimizationError> {
    // A conformation is dropped when its energy cannot beat this bound.
    let e_upper_bound = 40.0 * ligand.num_heavy_atoms() as f64;
    let num_torsions = ligand.num_active_torsions;

    let objective = DockingObjective {
        ligand,
        scoring,
        receptor,
    };
    let mut rng = StdRng::seed_from_u64(seed);
    let uniform_11 = Uniform::new(-1.0f64, 1.0);

    // Random initial conformation.
    let mut c0 = Conformation::new(num_torsions);
    c0.position =
        receptor.bounds.center + uniform_11.sample(&mut rng) * receptor.bounds.span;
    c0.orientation = math::unit_quaternion(
        uniform_11.sample(&mut rng),
        uniform_11.sample(&mut rng),
        uniform_11.sample(&mut rng),
        uniform_11.sample(&mut rng),
    )?;
    for torsion in c0.torsions.iter_mut() {
        *torsion = uniform_11.sample(&mut rng);
    }

    let mut ev0 = Evaluation::zero(num_torsions);
    objective.evaluate(&c0, e_upper_bound, &mut ev0);

    let mut results = ResultContainer::new(
        ResultContainer::DEFAULT_CAPACITY,
        ResultContainer::DEFAULT_REQUIRED_SQUARE_ERROR,
    );
    results.push(ligand.compose_result(ev0.e, ev0.f, &c0));

    let mut ev1 = Evaluation::zero(num_torsions);
    for _ in 0..NUM_MC_ITERATIONS {
        let mut c1 = c0.clone();
        c1.position += Vector3::new(
            uniform_11.sample(&mut rng),
            uniform_11.sample(&mut rng),
            uniform_11.sample(&mut rng),
        );
        objective.evaluate(&c1, e_upper_bound, &mut ev1);

        bfgs(&objective, &mut c1, &mut ev1);

        // Accept only improvements.
        if ev1.e < ev0.e {
            results.push(ligand.compose_result(ev1.e, ev1.f, &c1));
            c0 = c1;
            std::mem::swap(&mut ev0, &mut ev1);
        }
    }

    Ok(results)
}
