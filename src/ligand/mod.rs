//! Flexible ligand: kinematic frame tree, PDBQT ingest, and the
//! conformation evaluator at the heart of the pose search

use nalgebra::{Rotation3, UnitQuaternion, Vector3};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::atom::{AdType, Atom};
use crate::io::{parse_atom_record, IoError};
use crate::math;
use crate::optimization::{Conformation, Evaluation};
use crate::receptor::Receptor;
use crate::result::DockingResult;
use crate::scoring::{type_pair_index, ScoringFunction, CUTOFF_SQR};

/// Marks a frame range or rotor index that has not been resolved yet
const UNSET: usize = usize::MAX;

/// A rigid fragment of the ligand. Frame 0 is the ROOT; every other frame
/// hangs off its parent through a rotatable bond from the parent's rotor X
/// atom to this frame's rotor Y atom. Atom coordinates inside a frame are
/// relative to the rotor Y atom.
#[derive(Debug, Clone)]
pub struct Frame {
    pub parent: usize,
    pub rotor_x_srn: usize,
    pub rotor_y_srn: usize,
    /// Heavy-atom index of rotor X, inside the parent frame
    pub rotor_x_idx: usize,
    /// Heavy-atom index of rotor Y, inside this frame
    pub rotor_y_idx: usize,
    pub ha_begin: usize,
    pub ha_end: usize,
    pub hy_begin: usize,
    pub hy_end: usize,
    /// Whether the torsion is an optimized degree of freedom
    pub active: bool,
    /// Rotor Y offset from the parent's rotor Y, in parent coordinates
    pub origin_from_parent: Vector3<f64>,
}

/// A hydrogen kept only for output; hydrogens never score
#[derive(Debug, Clone)]
pub struct Hydrogen {
    pub serial: usize,
    pub name: String,
    pub ad: AdType,
    pub coordinate: Vector3<f64>,
}

/// A non-bonded intra-ligand pair with its precomputed table index
#[derive(Debug, Clone, Copy)]
pub struct InteractingPair {
    pub i1: usize,
    pub i2: usize,
    pub type_pair_index: usize,
}

/// A flexible ligand, immutable once parsed
#[derive(Debug)]
pub struct Ligand {
    pub name: String,
    pub frames: Vec<Frame>,
    pub heavy_atoms: Vec<Atom>,
    pub hydrogens: Vec<Hydrogen>,
    pub interacting_pairs: Vec<InteractingPair>,
    pub num_active_torsions: usize,
    /// Normalization factor for output energies, from the torsion count
    pub flexibility_penalty_factor: f64,
}

/// World-space placement of every frame and heavy atom for one conformation
struct FramePlacement {
    origins: Vec<Vector3<f64>>,
    rotations: Vec<Rotation3<f64>>,
    axes: Vec<Vector3<f64>>,
    coordinates: Vec<Vector3<f64>>,
}

impl Ligand {
    pub fn from_pdbqt_file<P: AsRef<Path>>(path: P) -> Result<Self, IoError> {
        let name = path
            .as_ref()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("ligand")
            .to_string();
        let file = File::open(path.as_ref())?;
        Self::from_pdbqt(BufReader::new(file), name)
    }

    /// Parses a ligand PDBQT, building the frame tree from ROOT/BRANCH
    /// records. Atoms of a frame must precede its nested branches.
    pub fn from_pdbqt<R: BufRead>(reader: R, name: impl Into<String>) -> Result<Self, IoError> {
        let mut frames: Vec<Frame> = Vec::with_capacity(16);
        let mut heavy_atoms: Vec<Atom> = Vec::with_capacity(64);
        let mut hydrogens: Vec<Hydrogen> = Vec::with_capacity(32);
        let mut bonds: Vec<Vec<usize>> = Vec::with_capacity(64);
        let mut stack: Vec<usize> = Vec::new();
        let mut line_number = 0;

        for line in reader.lines() {
            let line = line?;
            line_number += 1;

            if line.starts_with("ATOM") || line.starts_with("HETATM") {
                let fidx = *stack
                    .last()
                    .ok_or_else(|| IoError::parse(line_number, "atom record outside ROOT"))?;
                if frames[fidx].ha_end != UNSET {
                    return Err(IoError::parse(
                        line_number,
                        "frame atoms must precede nested branches",
                    ));
                }
                let record = parse_atom_record(&line, line_number)?;
                let begin = frames[fidx].ha_begin;

                match record.ad.xs() {
                    None => {
                        if record.ad == AdType::PolarHydrogen {
                            for b in heavy_atoms[begin..].iter_mut().rev() {
                                if b.is_hetero() && b.is_neighbor(&record.coordinate, record.ad) {
                                    b.donorize();
                                    break;
                                }
                            }
                        }
                        hydrogens.push(Hydrogen {
                            serial: record.serial,
                            name: record.name,
                            ad: record.ad,
                            coordinate: record.coordinate,
                        });
                    }
                    Some(xs) => {
                        let mut a = Atom {
                            serial: record.serial,
                            name: record.name,
                            coordinate: record.coordinate,
                            ad: record.ad,
                            xs,
                        };
                        let i_new = heavy_atoms.len();
                        bonds.push(Vec::with_capacity(4));
                        for i in (begin..i_new).rev() {
                            if heavy_atoms[i].is_neighbor(&a.coordinate, a.ad) {
                                bonds[i_new].push(i);
                                bonds[i].push(i_new);
                                if a.is_hetero() && !heavy_atoms[i].is_hetero() {
                                    heavy_atoms[i].dehydrophobicize();
                                }
                                if !a.is_hetero() && heavy_atoms[i].is_hetero() {
                                    a.dehydrophobicize();
                                }
                            }
                        }
                        // The rotor bond crosses the frame boundary.
                        if fidx != 0 && a.serial == frames[fidx].rotor_y_srn {
                            frames[fidx].rotor_y_idx = i_new;
                            let xi = frames[fidx].rotor_x_idx;
                            bonds[i_new].push(xi);
                            bonds[xi].push(i_new);
                            if a.is_hetero() && !heavy_atoms[xi].is_hetero() {
                                heavy_atoms[xi].dehydrophobicize();
                            }
                            if !a.is_hetero() && heavy_atoms[xi].is_hetero() {
                                a.dehydrophobicize();
                            }
                        }
                        heavy_atoms.push(a);
                    }
                }
            } else if line.starts_with("ROOT") {
                if !frames.is_empty() {
                    return Err(IoError::parse(line_number, "duplicate ROOT record"));
                }
                frames.push(Frame {
                    parent: 0,
                    rotor_x_srn: 0,
                    rotor_y_srn: 0,
                    rotor_x_idx: 0,
                    rotor_y_idx: 0,
                    ha_begin: 0,
                    ha_end: UNSET,
                    hy_begin: 0,
                    hy_end: UNSET,
                    active: true,
                    origin_from_parent: Vector3::zeros(),
                });
                stack.push(0);
            } else if line.starts_with("ENDROOT") {
                if frames.is_empty() {
                    return Err(IoError::parse(line_number, "ENDROOT before ROOT"));
                }
                if frames[0].ha_end == UNSET {
                    frames[0].ha_end = heavy_atoms.len();
                    frames[0].hy_end = hydrogens.len();
                }
                if heavy_atoms.is_empty() {
                    return Err(IoError::parse(line_number, "ROOT contains no heavy atoms"));
                }
            } else if line.starts_with("BRANCH") {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() != 3 {
                    return Err(IoError::parse(
                        line_number,
                        format!("invalid BRANCH record: {}", line),
                    ));
                }
                let rotor_x_srn: usize = parts[1].parse().map_err(|_| {
                    IoError::parse(line_number, format!("invalid BRANCH serial: {}", parts[1]))
                })?;
                let rotor_y_srn: usize = parts[2].parse().map_err(|_| {
                    IoError::parse(line_number, format!("invalid BRANCH serial: {}", parts[2]))
                })?;

                let parent = *stack
                    .last()
                    .ok_or_else(|| IoError::parse(line_number, "BRANCH before ROOT"))?;
                if frames[parent].ha_end == UNSET {
                    frames[parent].ha_end = heavy_atoms.len();
                    frames[parent].hy_end = hydrogens.len();
                }
                let rotor_x_idx = (frames[parent].ha_begin..frames[parent].ha_end)
                    .find(|&i| heavy_atoms[i].serial == rotor_x_srn)
                    .ok_or_else(|| {
                        IoError::parse(
                            line_number,
                            format!("BRANCH rotor X serial {} not in parent frame", rotor_x_srn),
                        )
                    })?;

                frames.push(Frame {
                    parent,
                    rotor_x_srn,
                    rotor_y_srn,
                    rotor_x_idx,
                    rotor_y_idx: UNSET,
                    ha_begin: heavy_atoms.len(),
                    ha_end: UNSET,
                    hy_begin: hydrogens.len(),
                    hy_end: UNSET,
                    active: true,
                    origin_from_parent: Vector3::zeros(),
                });
                stack.push(frames.len() - 1);
            } else if line.starts_with("ENDBRANCH") {
                let fidx = stack
                    .pop()
                    .ok_or_else(|| IoError::parse(line_number, "unmatched ENDBRANCH"))?;
                if fidx == 0 {
                    return Err(IoError::parse(line_number, "unmatched ENDBRANCH"));
                }
                let is_leaf = fidx == frames.len() - 1;
                let f = &mut frames[fidx];
                if f.ha_end == UNSET {
                    f.ha_end = heavy_atoms.len();
                    f.hy_end = hydrogens.len();
                }
                if f.ha_begin == f.ha_end {
                    return Err(IoError::parse(line_number, "empty BRANCH"));
                }
                if f.rotor_y_idx == UNSET {
                    return Err(IoError::parse(
                        line_number,
                        format!("BRANCH rotor Y serial {} not found", f.rotor_y_srn),
                    ));
                }
                // A terminal fragment with a single heavy atom, e.g. -OH or
                // -CH3: its torsion cannot change the score.
                if is_leaf && f.ha_end - f.ha_begin == 1 {
                    f.active = false;
                }
            }
            // TORSDOF, REMARK and other records are informational.
        }

        if frames.is_empty() {
            return Err(IoError::parse(line_number, "missing ROOT record"));
        }
        if stack.len() != 1 {
            return Err(IoError::parse(line_number, "unclosed BRANCH"));
        }
        if frames[0].ha_end == UNSET {
            frames[0].ha_end = heavy_atoms.len();
            frames[0].hy_end = hydrogens.len();
        }
        if heavy_atoms.is_empty() {
            return Err(IoError::parse(line_number, "ligand contains no heavy atoms"));
        }

        Ok(Self::assemble(name.into(), frames, heavy_atoms, hydrogens, bonds))
    }

    /// Converts parsed frames into the evaluator's representation: frame
    /// origins become relative offsets, atom coordinates become frame-local,
    /// and the non-bonded intra-ligand pair list is precomputed.
    fn assemble(
        name: String,
        mut frames: Vec<Frame>,
        mut heavy_atoms: Vec<Atom>,
        mut hydrogens: Vec<Hydrogen>,
        bonds: Vec<Vec<usize>>,
    ) -> Self {
        let num_frames = frames.len();
        let origins: Vec<Vector3<f64>> = frames
            .iter()
            .map(|f| heavy_atoms[f.rotor_y_idx].coordinate)
            .collect();
        for k in 1..num_frames {
            frames[k].origin_from_parent = origins[k] - origins[frames[k].parent];
        }
        for (k, f) in frames.iter().enumerate() {
            for i in f.ha_begin..f.ha_end {
                heavy_atoms[i].coordinate -= origins[k];
            }
            for i in f.hy_begin..f.hy_end {
                hydrogens[i].coordinate -= origins[k];
            }
        }

        // Pairs of heavy atoms in different frames interact unless they are
        // within three consecutive covalent bonds or excluded by the rotor
        // adjacency rules.
        let mut interacting_pairs = Vec::new();
        let mut neighbors: Vec<usize> = Vec::with_capacity(10);
        for k1 in 0..num_frames {
            let f1 = &frames[k1];
            for i in f1.ha_begin..f1.ha_end {
                for &b1 in &bonds[i] {
                    if !neighbors.contains(&b1) {
                        neighbors.push(b1);
                    }
                    for &b2 in &bonds[b1] {
                        if !neighbors.contains(&b2) {
                            neighbors.push(b2);
                        }
                        for &b3 in &bonds[b2] {
                            if !neighbors.contains(&b3) {
                                neighbors.push(b3);
                            }
                        }
                    }
                }
                for (k2, f2) in frames.iter().enumerate().skip(k1 + 1) {
                    let f3 = &frames[f2.parent];
                    for j in f2.ha_begin..f2.ha_end {
                        if k1 == f2.parent && (i == f2.rotor_x_idx || j == f2.rotor_y_idx) {
                            continue;
                        }
                        if k1 > 0
                            && f1.parent == f2.parent
                            && i == f1.rotor_y_idx
                            && j == f2.rotor_y_idx
                        {
                            continue;
                        }
                        if f2.parent > 0
                            && k1 == f3.parent
                            && i == f3.rotor_x_idx
                            && j == f2.rotor_y_idx
                        {
                            continue;
                        }
                        if neighbors.contains(&j) {
                            continue;
                        }
                        interacting_pairs.push(InteractingPair {
                            i1: i,
                            i2: j,
                            type_pair_index: type_pair_index(
                                heavy_atoms[i].xs,
                                heavy_atoms[j].xs,
                            ),
                        });
                    }
                }
                neighbors.clear();
            }
        }

        let num_torsions = num_frames - 1;
        let num_active_torsions = frames.iter().skip(1).filter(|f| f.active).count();
        let num_inactive_torsions = num_torsions - num_active_torsions;
        let flexibility_penalty_factor = 1.0
            / (1.0
                + 0.05846 * (num_active_torsions as f64 + 0.5 * num_inactive_torsions as f64));

        Self {
            name,
            frames,
            heavy_atoms,
            hydrogens,
            interacting_pairs,
            num_active_torsions,
            flexibility_penalty_factor,
        }
    }

    pub fn num_heavy_atoms(&self) -> usize {
        self.heavy_atoms.len()
    }

    /// Forward kinematics: world-space frame origins, rotations, torsion
    /// axes and heavy-atom coordinates for one conformation
    fn place(&self, conf: &Conformation) -> FramePlacement {
        let num_frames = self.frames.len();
        let mut origins = vec![Vector3::zeros(); num_frames];
        let mut orientations = vec![UnitQuaternion::identity(); num_frames];
        let mut rotations = vec![Rotation3::identity(); num_frames];
        let mut axes = vec![Vector3::zeros(); num_frames];
        let mut coordinates = vec![Vector3::zeros(); self.heavy_atoms.len()];

        origins[0] = conf.position;
        orientations[0] = conf.orientation;
        rotations[0] = conf.orientation.to_rotation_matrix();
        let root = &self.frames[0];
        for i in root.ha_begin..root.ha_end {
            coordinates[i] = origins[0] + rotations[0] * self.heavy_atoms[i].coordinate;
        }

        let mut t = 0;
        for k in 1..num_frames {
            let f = &self.frames[k];
            origins[k] = origins[f.parent] + rotations[f.parent] * f.origin_from_parent;
            // Unit vector along the rotor bond, from rotor X to rotor Y.
            axes[k] = (origins[k] - coordinates[f.rotor_x_idx]).normalize();
            let angle = if f.active {
                let a = conf.torsions[t];
                t += 1;
                a
            } else {
                0.0
            };
            orientations[k] = math::rotation_from_vector(axes[k] * angle) * orientations[f.parent];
            rotations[k] = orientations[k].to_rotation_matrix();
            for i in f.ha_begin..f.ha_end {
                coordinates[i] = origins[k] + rotations[k] * self.heavy_atoms[i].coordinate;
            }
        }

        FramePlacement {
            origins,
            rotations,
            axes,
            coordinates,
        }
    }

    /// Computes free energy, inter-molecular energy and the gradient over
    /// the 6+T degrees of freedom for one conformation.
    ///
    /// Returns false as soon as the partial inter-molecular sum reaches
    /// `e_upper_bound`; the line search uses this to reject a step without
    /// paying for the full evaluation. On rejection `out.e` holds the
    /// partial sum and `out.f`/`out.g` are left untouched.
    pub fn evaluate(
        &self,
        conf: &Conformation,
        sf: &ScoringFunction,
        rec: &Receptor,
        e_upper_bound: f64,
        out: &mut Evaluation,
    ) -> bool {
        let placement = self.place(conf);
        let num_heavy_atoms = self.heavy_atoms.len();
        let mut derivatives = vec![Vector3::zeros(); num_heavy_atoms];

        // Inter-molecular term: each atom scans only its partition's list.
        let mut e = 0.0;
        for i in 0..num_heavy_atoms {
            let coordinate = placement.coordinates[i];
            let cell = rec.bounds.partition_index(&coordinate);
            let xs1 = self.heavy_atoms[i].xs;
            let mut derivative = Vector3::zeros();
            for &j in &rec.partitions[rec.bounds.partition_offset(cell)] {
                let r = coordinate - rec.atoms[j].coordinate;
                let r2 = r.norm_squared();
                if r2 < CUTOFF_SQR {
                    let element = sf.evaluate(type_pair_index(xs1, rec.atoms[j].xs), r2);
                    e += element.e;
                    derivative += element.dor * r;
                }
            }
            derivatives[i] = derivative;
            if e >= e_upper_bound {
                out.e = e;
                return false;
            }
        }
        out.f = e;

        // Intra-molecular term over the precomputed non-bonded pairs.
        for pair in &self.interacting_pairs {
            let r = placement.coordinates[pair.i2] - placement.coordinates[pair.i1];
            let r2 = r.norm_squared();
            if r2 < CUTOFF_SQR {
                let element = sf.evaluate(pair.type_pair_index, r2);
                e += element.e;
                let derivative = element.dor * r;
                derivatives[pair.i1] -= derivative;
                derivatives[pair.i2] += derivative;
            }
        }
        out.e = e;

        // Aggregate per-atom derivatives into per-frame force and torque,
        // children before parents.
        let num_frames = self.frames.len();
        let mut forces = vec![Vector3::zeros(); num_frames];
        let mut torques = vec![Vector3::zeros(); num_frames];
        let mut t = self.num_active_torsions;
        for k in (1..num_frames).rev() {
            let f = &self.frames[k];
            for i in f.ha_begin..f.ha_end {
                forces[k] += derivatives[i];
                torques[k] +=
                    (placement.coordinates[i] - placement.origins[k]).cross(&derivatives[i]);
            }
            let force = forces[k];
            let torque = torques[k];
            forces[f.parent] += force;
            torques[f.parent] +=
                torque + (placement.origins[k] - placement.origins[f.parent]).cross(&force);
            if f.active {
                t -= 1;
                out.g[6 + t] = torque.dot(&placement.axes[k]);
            }
        }
        let root = &self.frames[0];
        for i in root.ha_begin..root.ha_end {
            forces[0] += derivatives[i];
            torques[0] += (placement.coordinates[i] - placement.origins[0]).cross(&derivatives[i]);
        }
        out.g[0] = forces[0].x;
        out.g[1] = forces[0].y;
        out.g[2] = forces[0].z;
        out.g[3] = torques[0].x;
        out.g[4] = torques[0].y;
        out.g[5] = torques[0].z;

        true
    }

    /// Materializes a pose: heavy-atom and hydrogen coordinates for the
    /// conformation, with the energies it was evaluated at
    pub fn compose_result(&self, e: f64, f: f64, conf: &Conformation) -> DockingResult {
        let placement = self.place(conf);
        let mut hydrogens = vec![Vector3::zeros(); self.hydrogens.len()];
        for (k, frame) in self.frames.iter().enumerate() {
            for i in frame.hy_begin..frame.hy_end {
                hydrogens[i] =
                    placement.origins[k] + placement.rotations[k] * self.hydrogens[i].coordinate;
            }
        }
        DockingResult::new(e, f, placement.coordinates, hydrogens)
    }

    /// Heavy atoms and hydrogens of a pose in original serial order, ready
    /// for the output writer
    pub fn output_atoms<'a>(
        &'a self,
        result: &DockingResult,
    ) -> Vec<(usize, &'a str, AdType, Vector3<f64>)> {
        let mut rows: Vec<(usize, &str, AdType, Vector3<f64>)> = self
            .heavy_atoms
            .iter()
            .zip(&result.heavy_atoms)
            .map(|(a, &c)| (a.serial, a.name.as_str(), a.ad, c))
            .chain(
                self.hydrogens
                    .iter()
                    .zip(&result.hydrogens)
                    .map(|(h, &c)| (h.serial, h.name.as_str(), h.ad, c)),
            )
            .collect();
        rows.sort_by_key(|row| row.0);
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::XsType;
    use crate::grid::SearchBox;
    use std::f64::consts::PI;
    use std::io::Cursor;

    fn atom_line(serial: usize, name: &str, x: f64, y: f64, z: f64, ad: &str) -> String {
        format!(
            "ATOM  {:>5} {:<4} LIG A   1    {:8.3}{:8.3}{:8.3}  1.00  0.00     0.000 {:<2}",
            serial, name, x, y, z, ad
        )
    }

    // A five-heavy-atom ligand with one rotatable bond:
    //   C1-C2 in the root, then C2-O1 rotor, O1-C3-C4 in the branch,
    //   plus a polar hydrogen on O1.
    fn ether_pdbqt() -> String {
        [
            "ROOT".to_string(),
            atom_line(1, "C1", 0.0, 0.0, 0.0, "C"),
            atom_line(2, "C2", 1.5, 0.0, 0.0, "C"),
            "ENDROOT".to_string(),
            "BRANCH   2   3".to_string(),
            atom_line(3, "O1", 2.9, 0.0, 0.0, "OA"),
            atom_line(4, "H1", 3.0, -0.95, 0.0, "HD"),
            atom_line(5, "C3", 3.4, 1.3, 0.0, "C"),
            atom_line(6, "C4", 4.9, 1.3, 0.0, "C"),
            "ENDBRANCH   2   3".to_string(),
            "TORSDOF 1".to_string(),
        ]
        .join("\n")
    }

    fn ether() -> Ligand {
        Ligand::from_pdbqt(Cursor::new(ether_pdbqt()), "ether").unwrap()
    }

    #[test]
    fn test_parse_frames_and_torsions() {
        let lig = ether();
        assert_eq!(lig.frames.len(), 2);
        assert_eq!(lig.num_heavy_atoms(), 5);
        assert_eq!(lig.hydrogens.len(), 1);
        assert_eq!(lig.num_active_torsions, 1);
        let branch = &lig.frames[1];
        assert_eq!(branch.parent, 0);
        assert_eq!(branch.rotor_x_idx, 1);
        assert_eq!(branch.rotor_y_idx, 2);
        assert!(branch.active);
        // One torsion, all active: 1 / (1 + 0.05846).
        assert!((lig.flexibility_penalty_factor - 1.0 / 1.05846).abs() < 1e-12);
    }

    #[test]
    fn test_parse_classifies_atoms() {
        let lig = ether();
        // C2 and C3 are bonded to the oxygen and lose their hydrophobic
        // category; C1 and C4 keep it.
        assert_eq!(lig.heavy_atoms[0].xs, XsType::HydrophobicCarbon);
        assert_eq!(lig.heavy_atoms[1].xs, XsType::PolarCarbon);
        assert_eq!(lig.heavy_atoms[3].xs, XsType::PolarCarbon);
        assert_eq!(lig.heavy_atoms[4].xs, XsType::HydrophobicCarbon);
        // The polar hydrogen promotes the oxygen to donor-acceptor and is
        // kept only in the hydrogen list.
        assert_eq!(lig.heavy_atoms[2].xs, XsType::OxygenDonorAcceptor);
        assert_eq!(lig.hydrogens[0].serial, 4);
    }

    #[test]
    fn test_interacting_pairs_exclude_one_to_four() {
        let lig = ether();
        // C1..C4 is the only pair separated by more than three bonds.
        assert_eq!(lig.interacting_pairs.len(), 1);
        let pair = &lig.interacting_pairs[0];
        assert_eq!((pair.i1, pair.i2), (0, 4));
    }

    #[test]
    fn test_identity_conformation_restores_file_geometry() {
        let lig = ether();
        // The root origin is the first heavy atom, at the file origin.
        let conf = Conformation::new(lig.num_active_torsions);
        let result = lig.compose_result(0.0, 0.0, &conf);
        let expected = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.5, 0.0, 0.0),
            Vector3::new(2.9, 0.0, 0.0),
            Vector3::new(3.4, 1.3, 0.0),
            Vector3::new(4.9, 1.3, 0.0),
        ];
        for (got, want) in result.heavy_atoms.iter().zip(expected.iter()) {
            assert!((got - want).norm() < 1e-12);
        }
        assert!((result.hydrogens[0] - Vector3::new(3.0, -0.95, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_torsion_rotates_branch_about_bond_axis() {
        let lig = ether();
        let mut conf = Conformation::new(1);
        conf.torsions[0] = PI;
        let result = lig.compose_result(0.0, 0.0, &conf);
        // The rotor bond lies along x, so a half turn flips the branch in y.
        assert!((result.heavy_atoms[2] - Vector3::new(2.9, 0.0, 0.0)).norm() < 1e-9);
        assert!((result.heavy_atoms[3] - Vector3::new(3.4, -1.3, 0.0)).norm() < 1e-9);
        assert!((result.heavy_atoms[4] - Vector3::new(4.9, -1.3, 0.0)).norm() < 1e-9);
        // Root atoms do not move.
        assert!((result.heavy_atoms[0] - Vector3::new(0.0, 0.0, 0.0)).norm() < 1e-12);
        assert!((result.hydrogens[0] - Vector3::new(3.0, 0.95, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_rigid_rotation_of_whole_ligand() {
        let lig = ether();
        let mut conf = Conformation::new(1);
        conf.orientation = math::rotation_from_vector(Vector3::new(0.0, 0.0, PI / 2.0));
        let result = lig.compose_result(0.0, 0.0, &conf);
        // C2 at (1.5, 0, 0) relative to the origin maps to (0, 1.5, 0).
        assert!((result.heavy_atoms[1] - Vector3::new(0.0, 1.5, 0.0)).norm() < 1e-9);
        assert!((result.heavy_atoms[2] - Vector3::new(0.0, 2.9, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_evaluate_matches_brute_force_sum() {
        let lig = ether();
        let sf = ScoringFunction::new();
        let bounds = SearchBox::new(Vector3::new(2.5, 0.5, 0.0), Vector3::new(6.0, 6.0, 6.0), 1.0)
            .unwrap();
        let receptor_atoms = vec![
            Atom::heavy(1, "O".into(), Vector3::new(2.0, 3.0, 1.0), AdType::OxygenA).unwrap(),
            Atom::heavy(2, "C".into(), Vector3::new(-1.0, -2.0, 0.5), AdType::Carbon).unwrap(),
            Atom::heavy(3, "N".into(), Vector3::new(5.0, -1.5, -1.0), AdType::Nitrogen).unwrap(),
        ];
        let rec = Receptor::new(receptor_atoms, bounds);

        let mut conf = Conformation::new(1);
        conf.position = Vector3::new(1.0, 0.3, 0.2);
        conf.orientation = math::rotation_from_vector(Vector3::new(0.2, -0.4, 0.9));
        conf.torsions[0] = 0.7;

        let mut out = Evaluation::zero(1);
        assert!(lig.evaluate(&conf, &sf, &rec, 1e9, &mut out));

        // Reference: direct double loop over all atom pairs.
        let pose = lig.compose_result(out.e, out.f, &conf);
        let mut inter = 0.0;
        for (i, c) in pose.heavy_atoms.iter().enumerate() {
            for a in &rec.atoms {
                let r2 = (c - a.coordinate).norm_squared();
                if r2 < CUTOFF_SQR {
                    inter += sf
                        .evaluate(type_pair_index(lig.heavy_atoms[i].xs, a.xs), r2)
                        .e;
                }
            }
        }
        let mut intra = 0.0;
        for pair in &lig.interacting_pairs {
            let r2 = (pose.heavy_atoms[pair.i2] - pose.heavy_atoms[pair.i1]).norm_squared();
            if r2 < CUTOFF_SQR {
                intra += sf.evaluate(pair.type_pair_index, r2).e;
            }
        }
        assert!((out.f - inter).abs() < 1e-9);
        assert!((out.e - (inter + intra)).abs() < 1e-9);
    }

    #[test]
    fn test_evaluate_rejects_above_upper_bound() {
        let lig = ether();
        let sf = ScoringFunction::new();
        let bounds =
            SearchBox::new(Vector3::zeros(), Vector3::new(6.0, 6.0, 6.0), 1.0).unwrap();
        // A receptor atom right on top of the ligand origin forces a huge
        // repulsion energy.
        let rec = Receptor::new(
            vec![Atom::heavy(1, "C".into(), Vector3::zeros(), AdType::Carbon).unwrap()],
            bounds,
        );
        let conf = Conformation::new(1);
        let mut out = Evaluation::zero(1);
        assert!(!lig.evaluate(&conf, &sf, &rec, 0.5, &mut out));
        assert!(out.e >= 0.5);
    }

    #[test]
    fn test_single_atom_ligand_gradient() {
        let text = [
            "ROOT".to_string(),
            atom_line(1, "C1", 0.0, 0.0, 0.0, "C"),
            "ENDROOT".to_string(),
        ]
        .join("\n");
        let lig = Ligand::from_pdbqt(Cursor::new(text), "probe").unwrap();
        let sf = ScoringFunction::new();
        let bounds =
            SearchBox::new(Vector3::zeros(), Vector3::new(6.0, 6.0, 6.0), 1.0).unwrap();
        let target = Vector3::new(3.0, 1.0, -2.0);
        let rec = Receptor::new(
            vec![Atom::heavy(1, "O".into(), target, AdType::OxygenA).unwrap()],
            bounds,
        );

        let mut conf = Conformation::new(0);
        conf.position = Vector3::new(0.5, -0.5, 0.5);
        let mut out = Evaluation::zero(0);
        assert!(lig.evaluate(&conf, &sf, &rec, 1e9, &mut out));

        let r = conf.position - target;
        let element = sf.evaluate(
            type_pair_index(XsType::HydrophobicCarbon, XsType::OxygenAcceptor),
            r.norm_squared(),
        );
        assert!((out.e - element.e).abs() < 1e-12);
        let expected = element.dor * r;
        assert!((out.g[0] - expected.x).abs() < 1e-12);
        assert!((out.g[1] - expected.y).abs() < 1e-12);
        assert!((out.g[2] - expected.z).abs() < 1e-12);
        // The only atom sits at the frame origin, so there is no torque.
        assert!(out.g[3].abs() < 1e-12);
        assert!(out.g[4].abs() < 1e-12);
        assert!(out.g[5].abs() < 1e-12);
    }

    #[test]
    fn test_inactive_terminal_branch() {
        // A hydroxyl branch with a single heavy atom is parsed but carries
        // no optimized torsion.
        let text = [
            "ROOT".to_string(),
            atom_line(1, "C1", 0.0, 0.0, 0.0, "C"),
            atom_line(2, "C2", 1.5, 0.0, 0.0, "C"),
            "ENDROOT".to_string(),
            "BRANCH   2   3".to_string(),
            atom_line(3, "O1", 2.9, 0.0, 0.0, "OA"),
            "ENDBRANCH   2   3".to_string(),
        ]
        .join("\n");
        let lig = Ligand::from_pdbqt(Cursor::new(text), "hydroxyl").unwrap();
        assert_eq!(lig.frames.len(), 2);
        assert!(!lig.frames[1].active);
        assert_eq!(lig.num_active_torsions, 0);
        // Half-weight in the flexibility penalty.
        assert!((lig.flexibility_penalty_factor - 1.0 / (1.0 + 0.05846 * 0.5)).abs() < 1e-12);
        // Evaluation works with an empty torsion vector.
        let conf = Conformation::new(0);
        let result = lig.compose_result(0.0, 0.0, &conf);
        assert!((result.heavy_atoms[2] - Vector3::new(2.9, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_parse_errors() {
        // No ROOT.
        let text = atom_line(1, "C1", 0.0, 0.0, 0.0, "C");
        assert!(Ligand::from_pdbqt(Cursor::new(text), "x").is_err());

        // Empty branch.
        let text = [
            "ROOT".to_string(),
            atom_line(1, "C1", 0.0, 0.0, 0.0, "C"),
            "ENDROOT".to_string(),
            "BRANCH   1   2".to_string(),
            "ENDBRANCH   1   2".to_string(),
        ]
        .join("\n");
        assert!(Ligand::from_pdbqt(Cursor::new(text), "x").is_err());

        // Unclosed branch.
        let text = [
            "ROOT".to_string(),
            atom_line(1, "C1", 0.0, 0.0, 0.0, "C"),
            "ENDROOT".to_string(),
            "BRANCH   1   2".to_string(),
            atom_line(2, "C2", 1.5, 0.0, 0.0, "C"),
        ]
        .join("\n");
        assert!(Ligand::from_pdbqt(Cursor::new(text), "x").is_err());

        // Unknown atom type aborts the ligand.
        let text = [
            "ROOT".to_string(),
            atom_line(1, "ZN", 0.0, 0.0, 0.0, "Zn"),
            "ENDROOT".to_string(),
        ]
        .join("\n");
        assert!(Ligand::from_pdbqt(Cursor::new(text), "x").is_err());
    }

    #[test]
    fn test_output_atoms_in_serial_order() {
        let lig = ether();
        let conf = Conformation::new(1);
        let result = lig.compose_result(-1.0, -1.0, &conf);
        let rows = lig.output_atoms(&result);
        assert_eq!(rows.len(), 6);
        let serials: Vec<usize> = rows.iter().map(|r| r.0).collect();
        assert_eq!(serials, vec![1, 2, 3, 4, 5, 6]);
        // The hydrogen row keeps its own type.
        assert_eq!(rows[3].2, AdType::PolarHydrogen);
    }
}
