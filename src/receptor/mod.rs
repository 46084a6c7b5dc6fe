//! Receptor ingest and the per-partition spatial index over its heavy atoms

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::atom::{AdType, Atom};
use crate::grid::SearchBox;
use crate::io::{parse_atom_record, IoError};
use crate::scoring::CUTOFF_SQR;

/// A rigid receptor: heavy atoms plus, for every partition of the search
/// box, the indices of the atoms close enough to score against a pose in
/// that cell. Immutable after construction.
#[derive(Debug)]
pub struct Receptor {
    pub atoms: Vec<Atom>,
    /// Flattened row-major cell lists; see [`SearchBox::partition_offset`]
    pub partitions: Vec<Vec<usize>>,
    pub bounds: SearchBox,
}

impl Receptor {
    pub fn from_pdbqt_file<P: AsRef<Path>>(path: P, bounds: SearchBox) -> Result<Self, IoError> {
        let file = File::open(path)?;
        Self::from_pdbqt(BufReader::new(file), bounds)
    }

    /// Parses ATOM/HETATM records, classifying atoms as they stream in.
    ///
    /// Non-polar hydrogens are dropped. A polar hydrogen is consumed to
    /// promote the bonded hetero atom of the same residue to a donor. A
    /// carbon bonded to a hetero atom of the same residue loses its
    /// hydrophobic category. Unknown AutoDock types abort the parse.
    pub fn from_pdbqt<R: BufRead>(reader: R, bounds: SearchBox) -> Result<Self, IoError> {
        let mut atoms: Vec<Atom> = Vec::with_capacity(2048);
        let mut residue = String::from("XXXX");
        let mut residue_start = 0;

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = i + 1;
            if line.starts_with("ATOM") || line.starts_with("HETATM") {
                let record = parse_atom_record(&line, line_number)?;

                if record.residue != residue {
                    residue = record.residue.clone();
                    residue_start = atoms.len();
                }

                match Atom::heavy(record.serial, record.name, record.coordinate, record.ad) {
                    None => {
                        // Only polar hydrogens matter, and only to flag donors.
                        if record.ad == AdType::PolarHydrogen {
                            for b in atoms[residue_start..].iter_mut().rev() {
                                if b.is_hetero() && b.is_neighbor(&record.coordinate, record.ad) {
                                    b.donorize();
                                    break;
                                }
                            }
                        }
                    }
                    Some(mut a) => {
                        if a.is_hetero() {
                            for b in atoms[residue_start..].iter_mut().rev() {
                                if !b.is_hetero() && b.is_neighbor(&a.coordinate, a.ad) {
                                    b.dehydrophobicize();
                                }
                            }
                        } else {
                            for b in atoms[residue_start..].iter().rev() {
                                if b.is_hetero() && b.is_neighbor(&a.coordinate, a.ad) {
                                    a.dehydrophobicize();
                                    break;
                                }
                            }
                        }
                        atoms.push(a);
                    }
                }
            } else if line.starts_with("TER") {
                residue.clear();
                residue.push_str("XXXX");
            }
        }

        Ok(Self::new(atoms, bounds))
    }

    /// Builds the partition index over already-classified heavy atoms.
    ///
    /// An atom lands in a cell's list when its projection distance to the
    /// cell is under the scoring cutoff, so a pose in that cell only ever
    /// scans atoms it can actually interact with. A prefilter against the
    /// whole box keeps the per-cell loop short.
    pub fn new(atoms: Vec<Atom>, bounds: SearchBox) -> Self {
        let within_cutoff: Vec<usize> = atoms
            .iter()
            .enumerate()
            .filter(|(_, a)| bounds.project_distance_sqr(&a.coordinate) < CUTOFF_SQR)
            .map(|(i, _)| i)
            .collect();

        let [nx, ny, nz] = bounds.num_partitions;
        let mut partitions = vec![Vec::new(); bounds.num_cells()];
        for x in 0..nx {
            for y in 0..ny {
                for z in 0..nz {
                    let corner1 = bounds.partition_corner1([x, y, z]);
                    let corner2 = bounds.partition_corner1([x + 1, y + 1, z + 1]);
                    let cell = &mut partitions[bounds.partition_offset([x, y, z])];
                    for &i in &within_cutoff {
                        let d2 =
                            SearchBox::cell_distance_sqr(&corner1, &corner2, &atoms[i].coordinate);
                        if d2 < CUTOFF_SQR {
                            cell.push(i);
                        }
                    }
                }
            }
        }

        Self {
            atoms,
            partitions,
            bounds,
        }
    }
}
