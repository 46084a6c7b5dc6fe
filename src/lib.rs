//! oxidock: protein-ligand docking with a Monte Carlo / BFGS pose search
//!
//! A rigid receptor is indexed into the partitions of a rectangular search
//! box, the pairwise scoring function is tabulated per atom-type pair, and
//! independent seeded search tasks cluster their low-energy poses into
//! RMSD-diverse containers.

pub mod atom;
pub mod grid;
pub mod io;
pub mod ligand;
pub mod math;
pub mod optimization;
pub mod receptor;
pub mod result;
pub mod scoring;

pub use ligand::Ligand;
pub use receptor::Receptor;
pub use scoring::ScoringFunction;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
