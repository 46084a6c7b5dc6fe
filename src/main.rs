//! Command-line driver: builds the shared scoring table and receptor index,
//! fans seeded search tasks out over a worker pool, and writes the merged
//! poses per ligand.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use nalgebra::Vector3;
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::SystemTime;

use oxidock::grid::{SearchBox, DEFAULT_GRANULARITY};
use oxidock::io::{write_results, write_summary, LigandSummary, PoseSummary};
use oxidock::optimization::monte_carlo::monte_carlo_task;
use oxidock::result::ResultContainer;
use oxidock::{Ligand, Receptor, ScoringFunction};

#[derive(Parser, Debug)]
#[command(
    name = "oxidock",
    version = oxidock::VERSION,
    about = "Protein-ligand docking with a Monte Carlo / BFGS pose search engine"
)]
struct Cli {
    /// PDBQT file containing the rigid receptor
    #[arg(long)]
    receptor: PathBuf,

    /// PDBQT files containing the ligands to dock
    #[arg(long, required = true)]
    ligand: Vec<PathBuf>,

    /// Center of the search box (x,y,z in Angstroms)
    #[arg(long, value_delimiter = ',')]
    center: Vec<f64>,

    /// Size of the search box (x,y,z in Angstroms)
    #[arg(long, value_delimiter = ',')]
    size: Vec<f64>,

    /// Partition granularity of the search box in Angstroms
    #[arg(long, default_value_t = DEFAULT_GRANULARITY)]
    granularity: f64,

    /// Base RNG seed; tasks use seed, seed+1, ... (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Number of independent search tasks per ligand
    #[arg(long, default_value_t = 32)]
    tasks: usize,

    /// Maximum number of binding modes to report
    #[arg(long, default_value_t = ResultContainer::DEFAULT_CAPACITY)]
    modes: usize,

    /// Minimum RMSD between reported modes, in Angstroms
    #[arg(long, default_value_t = 2.0)]
    rmsd: f64,

    /// Output file (single ligand only)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Output directory for batch runs
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Optional JSON energy summary across all ligands
    #[arg(long)]
    summary: Option<PathBuf>,
}

fn parse_triple(values: &[f64], what: &str) -> Result<Vector3<f64>> {
    if values.len() != 3 {
        bail!("--{} expects three comma-separated values", what);
    }
    Ok(Vector3::new(values[0], values[1], values[2]))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let center = parse_triple(&cli.center, "center")?;
    let size = parse_triple(&cli.size, "size")?;
    if cli.out.is_some() && cli.ligand.len() > 1 {
        bail!("--out only applies to a single ligand; use --dir for batches");
    }

    // The stored span is the half-extent.
    let bounds = SearchBox::new(center, size * 0.5, cli.granularity)
        .context("invalid search box")?;
    info!(
        "search box center ({:.3}, {:.3}, {:.3}), size ({:.3}, {:.3}, {:.3}), {} partitions",
        center.x,
        center.y,
        center.z,
        size.x,
        size.y,
        size.z,
        bounds.num_cells()
    );

    info!("precalculating scoring function");
    let scoring = ScoringFunction::new();

    info!("parsing receptor {}", cli.receptor.display());
    let receptor = Receptor::from_pdbqt_file(&cli.receptor, bounds)
        .with_context(|| format!("failed to parse receptor {}", cli.receptor.display()))?;
    info!("receptor has {} heavy atoms", receptor.atoms.len());

    let base_seed = cli.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    });
    info!("base seed {}, {} tasks per ligand", base_seed, cli.tasks);

    let mut summaries = Vec::with_capacity(cli.ligand.len());
    for ligand_path in &cli.ligand {
        info!("parsing ligand {}", ligand_path.display());
        let ligand = match Ligand::from_pdbqt_file(ligand_path) {
            Ok(lig) => lig,
            Err(err) => {
                // A bad ligand aborts only itself; the batch continues.
                warn!("skipping ligand {}: {}", ligand_path.display(), err);
                continue;
            }
        };
        debug!(
            "ligand {} has {} heavy atoms, {} active torsions",
            ligand.name,
            ligand.num_heavy_atoms(),
            ligand.num_active_torsions
        );

        // Independent (ligand, seed) tasks over the worker pool; the shared
        // receptor index and scoring table are read-only.
        let outcomes: Vec<_> = (0..cli.tasks)
            .into_par_iter()
            .map(|i| monte_carlo_task(&ligand, base_seed.wrapping_add(i as u64), &scoring, &receptor))
            .collect();

        // Single-threaded merge fold, in task order for reproducibility.
        let mut merged = ResultContainer::new(cli.modes, cli.rmsd * cli.rmsd);
        let mut aborted = 0usize;
        for outcome in outcomes {
            match outcome {
                Ok(container) => merged.merge(container),
                Err(err) => {
                    aborted += 1;
                    debug!("task aborted: {}", err);
                }
            }
        }
        if aborted > 0 {
            warn!(
                "{}: {} of {} tasks aborted",
                ligand.name, aborted, cli.tasks
            );
        }
        if merged.is_empty() {
            warn!("{}: no pose below the energy ceiling", ligand.name);
            continue;
        }

        // Normalize output energies relative to the best pose's
        // intra-molecular term and the ligand's flexibility.
        let best_intra = merged.results()[0].e - merged.results()[0].f;
        for r in merged.results_mut() {
            r.e_nd = (r.e - best_intra) * ligand.flexibility_penalty_factor;
        }

        let output_path = if let Some(out) = &cli.out {
            out.clone()
        } else {
            let file_name = format!("{}_out.pdbqt", ligand.name);
            match &cli.dir {
                Some(dir) => dir.join(file_name),
                None => PathBuf::from(file_name),
            }
        };
        info!(
            "{}: writing {} poses to {} (best e_nd {:.3})",
            ligand.name,
            merged.len(),
            output_path.display(),
            merged.results()[0].e_nd
        );
        write_results(&output_path, &ligand, merged.results())
            .with_context(|| format!("failed to write {}", output_path.display()))?;

        summaries.push(LigandSummary {
            ligand: ligand.name.clone(),
            poses: merged
                .results()
                .iter()
                .map(|r| PoseSummary {
                    e: r.e,
                    f: r.f,
                    e_nd: r.e_nd,
                })
                .collect(),
        });
    }

    if let Some(summary_path) = &cli.summary {
        info!("writing summary to {}", summary_path.display());
        write_summary(summary_path, &summaries)
            .with_context(|| format!("failed to write {}", summary_path.display()))?;
    }

    info!("docking completed");
    Ok(())
}
