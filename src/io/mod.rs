//! PDBQT record parsing shared by the receptor and ligand ingestors, and
//! output writers for docked poses

use nalgebra::Vector3;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

use crate::atom::AdType;
use crate::ligand::Ligand;
use crate::result::DockingResult;

/// Errors that can occur during file I/O operations
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IoError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        IoError::Parse {
            line,
            message: message.into(),
        }
    }
}

/// A raw ATOM/HETATM record, before heavy/hydrogen classification
#[derive(Debug, Clone)]
pub struct AtomRecord {
    pub serial: usize,
    pub name: String,
    /// Residue sequence columns 23-26, used to detect residue changes
    pub residue: String,
    pub coordinate: Vector3<f64>,
    pub ad: AdType,
}

fn column(line: &str, range: std::ops::Range<usize>, line_number: usize) -> Result<&str, IoError> {
    line.get(range.clone()).ok_or_else(|| {
        IoError::parse(
            line_number,
            format!("record too short for columns {}-{}", range.start + 1, range.end),
        )
    })
}

fn parse_f64(line: &str, range: std::ops::Range<usize>, line_number: usize) -> Result<f64, IoError> {
    let field = column(line, range, line_number)?;
    field.trim().parse::<f64>().map_err(|_| {
        IoError::parse(line_number, format!("invalid coordinate field '{}'", field.trim()))
    })
}

/// Parses the fixed columns of an ATOM/HETATM line
pub fn parse_atom_record(line: &str, line_number: usize) -> Result<AtomRecord, IoError> {
    let serial = column(line, 6..11, line_number)?
        .trim()
        .parse::<usize>()
        .map_err(|_| IoError::parse(line_number, "invalid atom serial number"))?;
    let name = column(line, 12..16, line_number)?.trim().to_string();
    let residue = column(line, 22..26, line_number)?.to_string();
    let x = parse_f64(line, 30..38, line_number)?;
    let y = parse_f64(line, 38..46, line_number)?;
    let z = parse_f64(line, 46..54, line_number)?;

    // The AutoDock type occupies columns 78-79; one-character types may end
    // the line at column 78.
    let ad_str = line
        .get(77..)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| IoError::parse(line_number, "missing AutoDock atom type"))?;
    let ad = AdType::from_pdbqt_string(ad_str).ok_or_else(|| {
        IoError::parse(
            line_number,
            format!("unrecognized AutoDock atom type '{}'", ad_str),
        )
    })?;

    Ok(AtomRecord {
        serial,
        name,
        residue,
        coordinate: Vector3::new(x, y, z),
        ad,
    })
}

/// Writes docked poses as a multi-model PDBQT file, atoms in original
/// serial order with the pose coordinates substituted in.
pub fn write_results<P: AsRef<Path>>(
    path: P,
    ligand: &Ligand,
    results: &[DockingResult],
) -> Result<(), IoError> {
    let mut file = File::create(path)?;

    writeln!(file, "REMARK PDBQT file generated by oxidock {}", crate::VERSION)?;
    writeln!(file, "REMARK {} docked models", results.len())?;

    for (i, result) in results.iter().enumerate() {
        writeln!(file, "MODEL {:>4}", i + 1)?;
        writeln!(
            file,
            "REMARK NORMALIZED FREE ENERGY: {:8.3} KCAL/MOL",
            result.e_nd
        )?;
        writeln!(
            file,
            "REMARK TOTAL/INTER FREE ENERGY: {:8.3} / {:8.3} KCAL/MOL",
            result.e, result.f
        )?;

        for (serial, name, ad, coordinate) in ligand.output_atoms(result) {
            writeln!(
                file,
                "ATOM  {:>5} {:<4} LIG A   1    {:8.3}{:8.3}{:8.3}{:6.2}{:6.2}    {:>2}",
                serial,
                name,
                coordinate.x,
                coordinate.y,
                coordinate.z,
                1.0, // occupancy
                0.0, // temperature factor
                ad.to_pdbqt_string()
            )?;
        }

        writeln!(file, "ENDMDL")?;
    }
    writeln!(file, "END")?;

    Ok(())
}

/// Per-pose energies for the JSON summary
#[derive(Debug, Serialize)]
pub struct PoseSummary {
    pub e: f64,
    pub f: f64,
    pub e_nd: f64,
}

/// Per-ligand entry of the JSON summary
#[derive(Debug, Serialize)]
pub struct LigandSummary {
    pub ligand: String,
    pub poses: Vec<PoseSummary>,
}

/// Writes the per-ligand energy summary as pretty-printed JSON
pub fn write_summary<P: AsRef<Path>>(path: P, summaries: &[LigandSummary]) -> Result<(), IoError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, summaries)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATOM_LINE: &str =
        "ATOM      7  CG  LEU A  12      11.940   2.125   3.250  1.00  0.00     0.031 C ";

    #[test]
    fn test_parse_atom_record() {
        let rec = parse_atom_record(ATOM_LINE, 1).unwrap();
        assert_eq!(rec.serial, 7);
        assert_eq!(rec.name, "CG");
        assert_eq!(rec.residue, "  12");
        assert!((rec.coordinate - Vector3::new(11.940, 2.125, 3.250)).norm() < 1e-12);
        assert_eq!(rec.ad, AdType::Carbon);
    }

    #[test]
    fn test_parse_two_character_type() {
        let line = ATOM_LINE.replace(" C ", " Cl");
        assert_eq!(parse_atom_record(&line, 1).unwrap().ad, AdType::Chlorine);
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let line = ATOM_LINE.replace(" C ", " Zn");
        let err = parse_atom_record(&line, 42).unwrap_err();
        match err {
            IoError::Parse { line, ref message } => {
                assert_eq!(line, 42);
                assert!(message.contains("Zn"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        assert!(parse_atom_record("ATOM      7  CG", 3).is_err());
    }
}
