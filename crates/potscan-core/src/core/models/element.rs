use phf::{Map, phf_map};
use std::fmt;
use std::str::FromStr;

/// Atomic number and standard atomic weight (g/mol) keyed by canonical symbol.
#[rustfmt::skip]
static ELEMENT_DATA: Map<&'static str, (u8, f64)> = phf_map! {
    "H"  => (1, 1.008),    "He" => (2, 4.0026),
    "Li" => (3, 6.94),     "Be" => (4, 9.0122),   "B"  => (5, 10.81),    "C"  => (6, 12.011),
    "N"  => (7, 14.007),   "O"  => (8, 15.999),   "F"  => (9, 18.998),   "Ne" => (10, 20.180),
    "Na" => (11, 22.990),  "Mg" => (12, 24.305),  "Al" => (13, 26.982),  "Si" => (14, 28.085),
    "P"  => (15, 30.974),  "S"  => (16, 32.06),   "Cl" => (17, 35.45),   "Ar" => (18, 39.948),
    "K"  => (19, 39.098),  "Ca" => (20, 40.078),  "Sc" => (21, 44.956),  "Ti" => (22, 47.867),
    "V"  => (23, 50.942),  "Cr" => (24, 51.996),  "Mn" => (25, 54.938),  "Fe" => (26, 55.845),
    "Co" => (27, 58.933),  "Ni" => (28, 58.693),  "Cu" => (29, 63.546),  "Zn" => (30, 65.38),
    "Ga" => (31, 69.723),  "Ge" => (32, 72.630),  "As" => (33, 74.922),  "Se" => (34, 78.971),
    "Br" => (35, 79.904),  "Kr" => (36, 83.798),
    "Rb" => (37, 85.468),  "Sr" => (38, 87.62),   "Y"  => (39, 88.906),  "Zr" => (40, 91.224),
    "Nb" => (41, 92.906),  "Mo" => (42, 95.95),   "Tc" => (43, 98.0),    "Ru" => (44, 101.07),
    "Rh" => (45, 102.91),  "Pd" => (46, 106.42),  "Ag" => (47, 107.87),  "Cd" => (48, 112.41),
    "In" => (49, 114.82),  "Sn" => (50, 118.71),  "Sb" => (51, 121.76),  "Te" => (52, 127.60),
    "I"  => (53, 126.90),  "Xe" => (54, 131.29),
    "Cs" => (55, 132.91),  "Ba" => (56, 137.33),  "La" => (57, 138.91),  "Hf" => (72, 178.49),
    "Ta" => (73, 180.95),  "W"  => (74, 183.84),  "Re" => (75, 186.21),  "Os" => (76, 190.23),
    "Ir" => (77, 192.22),  "Pt" => (78, 195.08),  "Au" => (79, 196.97),  "Hg" => (80, 200.59),
    "Tl" => (81, 204.38),  "Pb" => (82, 207.2),   "Bi" => (83, 208.98),
};

/// A chemical element, identified by its canonical symbol (e.g. `"C"`, `"Cl"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Element {
    symbol: &'static str,
    atomic_number: u8,
}

impl Element {
    /// Looks up an element by symbol. Matching is case-insensitive.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let canonical = canonicalize(symbol)?;
        ELEMENT_DATA
            .get_entry(canonical.as_str())
            .map(|(key, &(atomic_number, _))| Self {
                symbol: *key,
                atomic_number,
            })
    }

    pub fn symbol(&self) -> &'static str {
        self.symbol
    }

    pub fn atomic_number(&self) -> u8 {
        self.atomic_number
    }

    /// Standard atomic weight in g/mol.
    pub fn mass(&self) -> f64 {
        ELEMENT_DATA
            .get(self.symbol)
            .map(|&(_, mass)| mass)
            .unwrap_or_default()
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol)
    }
}

impl FromStr for Element {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_symbol(s).ok_or_else(|| format!("unknown element symbol '{}'", s.trim()))
    }
}

fn canonicalize(symbol: &str) -> Option<String> {
    let symbol = symbol.trim();
    let mut chars = symbol.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    let mut canonical = first.to_ascii_uppercase().to_string();
    canonical.extend(chars.map(|c| c.to_ascii_lowercase()));
    Some(canonical)
}
