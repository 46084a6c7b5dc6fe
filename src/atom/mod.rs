//! Atom records and the AutoDock / XS typing tables

use nalgebra::Vector3;
use std::fmt;

/// AutoDock atom types as they appear in PDBQT files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdType {
    Hydrogen,       // H  (non-polar, never stored)
    PolarHydrogen,  // HD
    Carbon,         // C
    AromaticCarbon, // A
    Nitrogen,       // N
    NitrogenA,      // NA (hydrogen bond acceptor)
    OxygenA,        // OA (hydrogen bond acceptor)
    Sulfur,         // S
    SulfurA,        // SA (hydrogen bond acceptor)
    Selenium,       // Se
    Phosphorus,     // P
    Fluorine,       // F
    Chlorine,       // Cl
    Bromine,        // Br
    Iodine,         // I
}

impl AdType {
    /// Parse an AutoDock type string from PDBQT columns 78-79.
    /// Returns `None` for types outside the table.
    pub fn from_pdbqt_string(s: &str) -> Option<Self> {
        match s {
            "H" => Some(AdType::Hydrogen),
            "HD" => Some(AdType::PolarHydrogen),
            "C" => Some(AdType::Carbon),
            "A" => Some(AdType::AromaticCarbon),
            "N" => Some(AdType::Nitrogen),
            "NA" => Some(AdType::NitrogenA),
            "OA" => Some(AdType::OxygenA),
            "S" => Some(AdType::Sulfur),
            "SA" => Some(AdType::SulfurA),
            "Se" => Some(AdType::Selenium),
            "P" => Some(AdType::Phosphorus),
            "F" => Some(AdType::Fluorine),
            "Cl" => Some(AdType::Chlorine),
            "Br" => Some(AdType::Bromine),
            "I" => Some(AdType::Iodine),
            _ => None,
        }
    }

    pub fn to_pdbqt_string(self) -> &'static str {
        match self {
            AdType::Hydrogen => "H",
            AdType::PolarHydrogen => "HD",
            AdType::Carbon => "C",
            AdType::AromaticCarbon => "A",
            AdType::Nitrogen => "N",
            AdType::NitrogenA => "NA",
            AdType::OxygenA => "OA",
            AdType::Sulfur => "S",
            AdType::SulfurA => "SA",
            AdType::Selenium => "Se",
            AdType::Phosphorus => "P",
            AdType::Fluorine => "F",
            AdType::Chlorine => "Cl",
            AdType::Bromine => "Br",
            AdType::Iodine => "I",
        }
    }

    /// Covalent radius in Angstroms, widened by 10% for bond detection
    pub fn covalent_radius(self) -> f64 {
        match self {
            AdType::Hydrogen | AdType::PolarHydrogen => 0.407,
            AdType::Carbon | AdType::AromaticCarbon => 0.847,
            AdType::Nitrogen | AdType::NitrogenA => 0.825,
            AdType::OxygenA => 0.803,
            AdType::Sulfur | AdType::SulfurA => 1.122,
            AdType::Selenium => 1.276,
            AdType::Phosphorus => 1.166,
            AdType::Fluorine => 0.781,
            AdType::Chlorine => 1.089,
            AdType::Bromine => 1.254,
            AdType::Iodine => 1.463,
        }
    }

    pub fn is_hydrogen(self) -> bool {
        matches!(self, AdType::Hydrogen | AdType::PolarHydrogen)
    }

    /// Heavy atoms other than carbon
    pub fn is_hetero(self) -> bool {
        !matches!(
            self,
            AdType::Hydrogen | AdType::PolarHydrogen | AdType::Carbon | AdType::AromaticCarbon
        )
    }

    /// Initial element-level scoring category; `None` for hydrogens
    pub fn xs(self) -> Option<XsType> {
        match self {
            AdType::Hydrogen | AdType::PolarHydrogen => None,
            AdType::Carbon | AdType::AromaticCarbon => Some(XsType::HydrophobicCarbon),
            AdType::Nitrogen => Some(XsType::Nitrogen),
            AdType::NitrogenA => Some(XsType::NitrogenAcceptor),
            AdType::OxygenA => Some(XsType::OxygenAcceptor),
            AdType::Sulfur | AdType::SulfurA | AdType::Selenium => Some(XsType::Sulfur),
            AdType::Phosphorus => Some(XsType::Phosphorus),
            AdType::Fluorine => Some(XsType::Fluorine),
            AdType::Chlorine => Some(XsType::Chlorine),
            AdType::Bromine => Some(XsType::Bromine),
            AdType::Iodine => Some(XsType::Iodine),
        }
    }
}

/// Number of XS scoring categories
pub const XS_TYPE_SIZE: usize = 14;

/// Element-level categories the scoring function operates on. Donor and
/// hydrophobic variants are assigned during ingest, not from the AutoDock
/// type alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XsType {
    HydrophobicCarbon,
    PolarCarbon,
    Nitrogen,
    NitrogenDonor,
    NitrogenAcceptor,
    NitrogenDonorAcceptor,
    OxygenAcceptor,
    OxygenDonorAcceptor,
    Sulfur,
    Phosphorus,
    Fluorine,
    Chlorine,
    Bromine,
    Iodine,
}

impl XsType {
    pub const ALL: [XsType; XS_TYPE_SIZE] = [
        XsType::HydrophobicCarbon,
        XsType::PolarCarbon,
        XsType::Nitrogen,
        XsType::NitrogenDonor,
        XsType::NitrogenAcceptor,
        XsType::NitrogenDonorAcceptor,
        XsType::OxygenAcceptor,
        XsType::OxygenDonorAcceptor,
        XsType::Sulfur,
        XsType::Phosphorus,
        XsType::Fluorine,
        XsType::Chlorine,
        XsType::Bromine,
        XsType::Iodine,
    ];

    /// Van der Waals radius in Angstroms
    pub fn radius(self) -> f64 {
        match self {
            XsType::HydrophobicCarbon | XsType::PolarCarbon => 1.9,
            XsType::Nitrogen
            | XsType::NitrogenDonor
            | XsType::NitrogenAcceptor
            | XsType::NitrogenDonorAcceptor => 1.8,
            XsType::OxygenAcceptor | XsType::OxygenDonorAcceptor => 1.7,
            XsType::Sulfur => 2.0,
            XsType::Phosphorus => 2.1,
            XsType::Fluorine => 1.5,
            XsType::Chlorine => 1.8,
            XsType::Bromine => 2.0,
            XsType::Iodine => 2.2,
        }
    }

    pub fn is_hydrophobic(self) -> bool {
        matches!(
            self,
            XsType::HydrophobicCarbon
                | XsType::Fluorine
                | XsType::Chlorine
                | XsType::Bromine
                | XsType::Iodine
        )
    }

    pub fn is_donor(self) -> bool {
        matches!(
            self,
            XsType::NitrogenDonor | XsType::NitrogenDonorAcceptor | XsType::OxygenDonorAcceptor
        )
    }

    pub fn is_acceptor(self) -> bool {
        matches!(
            self,
            XsType::NitrogenAcceptor
                | XsType::NitrogenDonorAcceptor
                | XsType::OxygenAcceptor
                | XsType::OxygenDonorAcceptor
        )
    }

    /// True when the pair can form a hydrogen bond
    pub fn hbond(t1: XsType, t2: XsType) -> bool {
        (t1.is_donor() && t2.is_acceptor()) || (t2.is_donor() && t1.is_acceptor())
    }
}

/// A heavy atom with its current scoring category
#[derive(Debug, Clone)]
pub struct Atom {
    /// Serial number from the source file
    pub serial: usize,

    /// Atom name, e.g. "CA" or "O1"
    pub name: String,

    /// Cartesian coordinate in Angstroms
    pub coordinate: Vector3<f64>,

    /// AutoDock type
    pub ad: AdType,

    /// Scoring category, reclassified during ingest
    pub xs: XsType,
}

impl Atom {
    /// Builds a heavy atom with its initial scoring category.
    /// Returns `None` for hydrogens, which are never stored as heavy atoms.
    pub fn heavy(serial: usize, name: String, coordinate: Vector3<f64>, ad: AdType) -> Option<Self> {
        ad.xs().map(|xs| Self {
            serial,
            name,
            coordinate,
            ad,
            xs,
        })
    }

    pub fn is_hetero(&self) -> bool {
        self.ad.is_hetero()
    }

    /// True when another atom at `coordinate` with type `ad` is within
    /// covalent-bond distance of this atom
    pub fn is_neighbor(&self, coordinate: &Vector3<f64>, ad: AdType) -> bool {
        let r = self.ad.covalent_radius() + ad.covalent_radius();
        (self.coordinate - coordinate).norm_squared() < r * r
    }

    /// Promote to a hydrogen bond donor. A bonded polar hydrogen causes this.
    pub fn donorize(&mut self) {
        self.xs = match self.xs {
            XsType::Nitrogen => XsType::NitrogenDonor,
            XsType::NitrogenAcceptor => XsType::NitrogenDonorAcceptor,
            XsType::OxygenAcceptor => XsType::OxygenDonorAcceptor,
            other => other,
        };
    }

    /// Drop the hydrophobic classification. A covalent bond to a hetero
    /// atom causes this for carbons.
    pub fn dehydrophobicize(&mut self) {
        if self.xs == XsType::HydrophobicCarbon {
            self.xs = XsType::PolarCarbon;
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({:.3}, {:.3}, {:.3})",
            self.serial,
            self.ad.to_pdbqt_string(),
            self.coordinate.x,
            self.coordinate.y,
            self.coordinate.z
        )
    }
}
