use super::external::{WorkDir, run_shell};
use super::{Evaluation, Potential, PotentialError, PotentialInput};
use crate::core::models::cell::Cell;
use crate::core::units::{ANGSTROM_PER_NM, KJ_PER_MOL_NM_PER_HARTREE_BOHR, KJ_PER_MOL_PER_HARTREE};
use nalgebra::{Matrix3, Point3, Vector3};
use serde::Deserialize;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, instrument};

const PROGRAM: &str = "s-dftd3";
const OUTPUT_FILE: &str = "dftd3.json";
const MOLECULE_FILE: &str = "dftd3.xyz";
const CRYSTAL_FILE: &str = "dftd3.vasp";

/// Damping function of the D3 correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Damping {
    Zero,
    #[default]
    BeckeJohnson,
}

impl Damping {
    fn flag(self) -> &'static str {
        match self {
            Self::Zero => "--zero",
            Self::BeckeJohnson => "--bj",
        }
    }
}

impl fmt::Display for Damping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => write!(f, "zero"),
            Self::BeckeJohnson => write!(f, "bj"),
        }
    }
}

impl FromStr for Damping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zero" | "d3zero" => Ok(Self::Zero),
            "bj" | "d3bj" | "becke-johnson" => Ok(Self::BeckeJohnson),
            other => Err(format!(
                "unknown damping '{}' (expected 'bj' or 'zero')",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dftd3Settings {
    /// Shell command that starts the program, `s-dftd3` by default.
    pub command: String,
    /// Functional the damping parameters are taken for, e.g. `revpbe`.
    pub functional: String,
    pub damping: Damping,
    /// Adds the Axilrod-Teller-Muto three-body term.
    pub three_body: bool,
    /// Directory to run in. A temporary directory is used when `None`.
    pub work_dir: Option<PathBuf>,
}

impl Dftd3Settings {
    pub fn new(functional: impl Into<String>) -> Self {
        Self {
            command: PROGRAM.to_string(),
            functional: functional.into(),
            damping: Damping::default(),
            three_body: false,
            work_dir: None,
        }
    }
}

/// The subset of the program's JSON report we read.
#[derive(Debug, Deserialize)]
struct Dftd3Report {
    energy: f64,
    #[serde(default)]
    gradient: Option<Vec<f64>>,
    #[serde(default)]
    virial: Option<Vec<f64>>,
}

/// Grimme's D3 dispersion correction computed by the external `s-dftd3`
/// program.
pub struct Dftd3Potential {
    name: String,
    atoms: Vec<usize>,
    settings: Dftd3Settings,
    work_dir: WorkDir,
}

impl Dftd3Potential {
    pub fn new(
        name: impl Into<String>,
        atoms: Vec<usize>,
        settings: Dftd3Settings,
    ) -> Result<Self, PotentialError> {
        let work_dir = WorkDir::new(settings.work_dir.as_deref(), "potscan-dftd3-")?;
        info!(
            "D3({}) correction for '{}' will run in {:?}.",
            settings.damping,
            settings.functional,
            work_dir.path()
        );
        Ok(Self {
            name: name.into(),
            atoms,
            settings,
            work_dir,
        })
    }

    pub fn settings(&self) -> &Dftd3Settings {
        &self.settings
    }

    fn command_line(&self, input_file: &str) -> String {
        let mut line = format!(
            "{} run {} {} {}",
            self.settings.command,
            input_file,
            self.settings.damping.flag(),
            self.settings.functional
        );
        if self.settings.three_body {
            line.push_str(" --atm");
        }
        line.push_str(" --grad --json ");
        line.push_str(OUTPUT_FILE);
        line
    }
}

/// An XYZ file in Å.
fn render_xyz(symbols: &[&'static str], positions: &[Point3<f64>]) -> String {
    let mut xyz = String::new();
    let _ = writeln!(xyz, "{}", positions.len());
    let _ = writeln!(xyz, "potscan");
    for (symbol, position) in symbols.iter().zip(positions) {
        let p = *position * ANGSTROM_PER_NM;
        let _ = writeln!(xyz, "{} {:.10} {:.10} {:.10}", symbol, p.x, p.y, p.z);
    }
    xyz
}

/// A VASP POSCAR file in Å, which needs atoms grouped by species.
///
/// Returns the file and, for each line of the coordinate block, the index of
/// the atom it holds.
fn render_poscar(
    symbols: &[&'static str],
    positions: &[Point3<f64>],
    cell: &Cell,
) -> (String, Vec<usize>) {
    let mut species: Vec<&'static str> = Vec::new();
    for &symbol in symbols {
        if !species.contains(&symbol) {
            species.push(symbol);
        }
    }
    let order: Vec<usize> = species
        .iter()
        .flat_map(|s| (0..symbols.len()).filter(move |&i| symbols[i] == *s))
        .collect();

    let mut poscar = String::new();
    let _ = writeln!(poscar, "potscan");
    let _ = writeln!(poscar, "1.0");
    for i in 0..3 {
        let v = cell.vector(i) * ANGSTROM_PER_NM;
        let _ = writeln!(poscar, "{:.10} {:.10} {:.10}", v.x, v.y, v.z);
    }
    let _ = writeln!(poscar, "{}", species.join(" "));
    let counts: Vec<String> = species
        .iter()
        .map(|s| symbols.iter().filter(|t| *t == s).count().to_string())
        .collect();
    let _ = writeln!(poscar, "{}", counts.join(" "));
    let _ = writeln!(poscar, "Cartesian");
    for &i in &order {
        let p = positions[i] * ANGSTROM_PER_NM;
        let _ = writeln!(poscar, "{:.10} {:.10} {:.10}", p.x, p.y, p.z);
    }
    (poscar, order)
}

/// Converts the JSON report into an [`Evaluation`] in kJ/mol and kJ/mol/nm.
///
/// `order[k]` is the input index of the `k`-th atom of the program's input.
fn parse_report(text: &str, order: &[usize]) -> Result<Evaluation, PotentialError> {
    let invalid = |message: String| PotentialError::Output {
        program: PROGRAM.into(),
        message,
    };
    let report: Dftd3Report =
        serde_json::from_str(text).map_err(|e| invalid(format!("invalid JSON: {}", e)))?;
    let n_atoms = order.len();

    let gradient = report
        .gradient
        .ok_or_else(|| invalid("report has no gradient".into()))?;
    if gradient.len() != 3 * n_atoms {
        return Err(invalid(format!(
            "gradient has {} components, expected {}",
            gradient.len(),
            3 * n_atoms
        )));
    }
    let mut forces = vec![Vector3::zeros(); n_atoms];
    for (chunk, &atom) in gradient.chunks_exact(3).zip(order) {
        forces[atom] = -Vector3::new(chunk[0], chunk[1], chunk[2]) * KJ_PER_MOL_NM_PER_HARTREE_BOHR;
    }

    let virial = match report.virial {
        Some(sigma) if sigma.len() == 9 => {
            -Matrix3::from_row_slice(&sigma) * KJ_PER_MOL_PER_HARTREE
        }
        Some(sigma) => {
            return Err(invalid(format!(
                "virial has {} components, expected 9",
                sigma.len()
            )));
        }
        None => Matrix3::zeros(),
    };

    Ok(Evaluation {
        energy: report.energy * KJ_PER_MOL_PER_HARTREE,
        forces,
        virial,
    })
}

impl Potential for Dftd3Potential {
    fn name(&self) -> &str {
        &self.name
    }

    fn atoms(&self) -> &[usize] {
        &self.atoms
    }

    #[instrument(skip_all, fields(potential = %self.name))]
    fn compute(&mut self, input: &PotentialInput) -> Result<Evaluation, PotentialError> {
        let dir = self.work_dir.path().to_path_buf();
        let (input_file, content, order) = match input.cell {
            Some(cell) => {
                let (poscar, order) = render_poscar(input.symbols, input.positions, cell);
                (CRYSTAL_FILE, poscar, order)
            }
            None => (
                MOLECULE_FILE,
                render_xyz(input.symbols, input.positions),
                (0..input.n_atoms()).collect(),
            ),
        };
        fs::write(dir.join(input_file), content)?;

        let output_path = dir.join(OUTPUT_FILE);
        if output_path.exists() {
            fs::remove_file(&output_path)?;
        }
        run_shell(PROGRAM, &self.command_line(input_file), &dir, None, None)?;

        let report = fs::read_to_string(&output_path).map_err(|e| PotentialError::Output {
            program: PROGRAM.into(),
            message: format!("cannot read {:?}: {}", output_path, e),
        })?;
        let evaluation = parse_report(&report, &order)?;
        debug!("D3 energy: {} kJ/mol", evaluation.energy);
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damping_parses_common_spellings() {
        assert_eq!("BJ".parse::<Damping>(), Ok(Damping::BeckeJohnson));
        assert_eq!("d3zero".parse::<Damping>(), Ok(Damping::Zero));
        assert!("rational".parse::<Damping>().is_err());
        assert_eq!(Damping::default().to_string(), "bj");
    }

    #[test]
    fn poscar_groups_atoms_by_species() {
        let cell = Cell::orthorhombic([1.0, 1.0, 1.0]).unwrap();
        let (poscar, order) = render_poscar(
            &["O", "H", "H", "O"],
            &[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.1, 0.0, 0.0),
                Point3::new(0.0, 0.1, 0.0),
                Point3::new(0.5, 0.5, 0.5),
            ],
            &cell,
        );
        assert_eq!(order, vec![0, 3, 1, 2]);
        let lines: Vec<&str> = poscar.lines().collect();
        assert_eq!(lines[5], "O H");
        assert_eq!(lines[6], "2 2");
        assert_eq!(lines[7], "Cartesian");
        assert_eq!(lines[9], "5.0000000000 5.0000000000 5.0000000000");
    }

    #[test]
    fn report_gradient_is_mapped_back_and_negated() {
        let text = r#"{
            "version": "1.0",
            "energy": -0.001,
            "gradient": [1.0, 0.0, 0.0, 0.0, 2.0, 0.0],
            "virial": [0.1, 0.0, 0.0, 0.0, 0.2, 0.0, 0.0, 0.0, 0.3]
        }"#;
        let eval = parse_report(text, &[1, 0]).unwrap();
        assert!((eval.energy + 0.001 * KJ_PER_MOL_PER_HARTREE).abs() < 1e-9);
        assert!((eval.forces[1].x + KJ_PER_MOL_NM_PER_HARTREE_BOHR).abs() < 1e-6);
        assert!((eval.forces[0].y + 2.0 * KJ_PER_MOL_NM_PER_HARTREE_BOHR).abs() < 1e-6);
        assert!((eval.virial[(2, 2)] + 0.3 * KJ_PER_MOL_PER_HARTREE).abs() < 1e-9);
    }

    #[test]
    fn report_with_wrong_gradient_length_is_rejected() {
        let text = r#"{"energy": 0.0, "gradient": [1.0, 2.0]}"#;
        assert!(matches!(
            parse_report(text, &[0]),
            Err(PotentialError::Output { .. })
        ));
        assert!(parse_report("not json", &[0]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn compute_passes_flags_and_reads_report() {
        let root = tempfile::tempdir().unwrap();
        let fake = "fake() { echo \"$@\" > args.txt; \
            printf '{\"energy\": -0.002, \"gradient\": [0.1, 0, 0, -0.1, 0, 0]}' > dftd3.json; }; fake";
        let settings = Dftd3Settings {
            command: fake.to_string(),
            damping: Damping::Zero,
            three_body: true,
            work_dir: Some(root.path().to_path_buf()),
            ..Dftd3Settings::new("revpbe")
        };
        let mut pot = Dftd3Potential::new("d3", vec![0, 1], settings).unwrap();
        let eval = pot
            .compute(&PotentialInput {
                positions: &[Point3::new(0.0, 0.0, 0.0), Point3::new(0.3, 0.0, 0.0)],
                symbols: &["Ar", "Ar"],
                cell: None,
            })
            .unwrap();

        assert!((eval.energy + 0.002 * KJ_PER_MOL_PER_HARTREE).abs() < 1e-9);
        assert!(eval.forces[0].x < 0.0 && eval.forces[1].x > 0.0);
        assert_eq!(eval.virial, Matrix3::zeros());

        let args = fs::read_to_string(root.path().join("args.txt")).unwrap();
        assert_eq!(
            args.trim(),
            "run dftd3.xyz --zero revpbe --atm --grad --json dftd3.json"
        );
        let xyz = fs::read_to_string(root.path().join(MOLECULE_FILE)).unwrap();
        assert!(xyz.contains("Ar 3.0000000000 0.0000000000 0.0000000000"));
    }
}
