use super::external::{WorkDir, run_shell};
use super::{Evaluation, Potential, PotentialError, PotentialInput};
use crate::core::models::cell::Cell;
use crate::core::models::element::Element;
use crate::core::units::{ANGSTROM_PER_NM, KJ_PER_MOL_NM_PER_EV_ANGSTROM, KJ_PER_MOL_PER_EV};
use nalgebra::{Matrix3, Point3, Vector3};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

const PROGRAM: &str = "SIESTA";
const ENERGY_MARKER: &str = "siesta: E_KS(eV) =";
const PSEUDOPOTENTIAL_EXTENSIONS: [&str; 2] = ["psf", "psml"];

/// Settings of a SIESTA calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct SiestaSettings {
    /// fdf options (functional, basis, SCF settings...) copied verbatim into
    /// every input file.
    pub options: String,
    /// Shell command that starts SIESTA, e.g. `mpirun -np 4 siesta`. The input
    /// file is fed on standard input.
    pub command: String,
    /// Directory holding `<Symbol>.psf` or `<Symbol>.psml` pseudopotentials.
    pub pseudopotential_dir: PathBuf,
    /// Directory to run in. A temporary directory is used when `None`.
    pub work_dir: Option<PathBuf>,
    /// The `SystemLabel`, which names SIESTA's output files.
    pub label: String,
    /// Vacuum (nm) added around isolated systems to build their cell.
    pub vacuum_padding: f64,
}

impl SiestaSettings {
    pub fn new(options: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            options: options.into(),
            command: command.into(),
            pseudopotential_dir: PathBuf::from("."),
            work_dir: None,
            label: "siesta".to_string(),
            vacuum_padding: 1.0,
        }
    }
}

/// Density-functional energies and forces from an external SIESTA executable.
///
/// Every evaluation writes a fresh input file in the same working directory,
/// so options such as `DM.UseSaveDM` reuse the previous frame's density matrix.
pub struct SiestaPotential {
    name: String,
    atoms: Vec<usize>,
    settings: SiestaSettings,
    work_dir: WorkDir,
    staged_species: HashSet<&'static str>,
    n_runs: usize,
}

impl SiestaPotential {
    pub fn new(
        name: impl Into<String>,
        atoms: Vec<usize>,
        settings: SiestaSettings,
    ) -> Result<Self, PotentialError> {
        let work_dir = WorkDir::new(settings.work_dir.as_deref(), "potscan-siesta-")?;
        info!(
            "SIESTA will run in {:?} with command '{}'.",
            work_dir.path(),
            settings.command
        );
        Ok(Self {
            name: name.into(),
            atoms,
            settings,
            work_dir,
            staged_species: HashSet::new(),
            n_runs: 0,
        })
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn settings(&self) -> &SiestaSettings {
        &self.settings
    }

    fn fdf_name(&self) -> String {
        format!("{}.fdf", self.settings.label)
    }

    fn out_name(&self) -> String {
        format!("{}.out", self.settings.label)
    }

    fn forces_name(&self) -> String {
        format!("{}.FA", self.settings.label)
    }

    /// Copies pseudopotentials of species not seen before into the working
    /// directory.
    fn stage_pseudopotentials(&mut self, species: &[Element]) -> Result<(), PotentialError> {
        for element in species {
            let symbol = element.symbol();
            if self.staged_species.contains(symbol) {
                continue;
            }
            let source = PSEUDOPOTENTIAL_EXTENSIONS
                .iter()
                .map(|ext| {
                    self.settings
                        .pseudopotential_dir
                        .join(format!("{}.{}", symbol, ext))
                })
                .find(|path| path.is_file());
            match source {
                Some(source) => {
                    let file_name = source.file_name().unwrap_or_default();
                    let target = self.work_dir.path().join(file_name);
                    if source != target {
                        fs::copy(&source, &target)?;
                    }
                    debug!("Staged pseudopotential {:?} for {}.", source, symbol);
                }
                None => warn!(
                    "No pseudopotential for {} found in {:?}; relying on the fdf options.",
                    symbol, self.settings.pseudopotential_dir
                ),
            }
            self.staged_species.insert(symbol);
        }
        Ok(())
    }

    fn resolve_cell(&self, input: &PotentialInput) -> Result<Cell, PotentialError> {
        if let Some(cell) = input.cell {
            return Ok(*cell);
        }
        bounding_cell(input.positions, self.settings.vacuum_padding).ok_or_else(|| {
            PotentialError::InvalidInput("cannot build a cell for an empty system".into())
        })
    }
}

/// Species in order of first appearance.
fn collect_species(symbols: &[&'static str]) -> Result<Vec<Element>, PotentialError> {
    let mut species: Vec<Element> = Vec::new();
    for &symbol in symbols {
        let element = Element::from_symbol(symbol)
            .ok_or_else(|| PotentialError::InvalidInput(format!("unknown element '{}'", symbol)))?;
        if !species.contains(&element) {
            species.push(element);
        }
    }
    Ok(species)
}

/// A cubic cell enclosing all positions with `padding` of vacuum on each side.
fn bounding_cell(positions: &[Point3<f64>], padding: f64) -> Option<Cell> {
    let first = positions.first()?;
    let (min, max) = positions
        .iter()
        .fold((first.coords, first.coords), |(min, max), p| {
            (min.inf(&p.coords), max.sup(&p.coords))
        });
    let extent = (max - min).max();
    Cell::orthorhombic([extent + 2.0 * padding; 3])
}

/// Renders the fdf input for one configuration. Lengths are written in Å.
///
/// The generated keys come before the user options. fdf reads the first
/// occurrence of a label, so a user option cannot displace the structure or
/// the single-point run settings.
fn render_fdf(
    options: &str,
    label: &str,
    species: &[Element],
    symbols: &[&'static str],
    positions: &[Point3<f64>],
    cell: &Cell,
) -> String {
    let mut fdf = String::new();
    let _ = writeln!(fdf, "# Generated by potscan");
    let _ = writeln!(fdf, "SystemLabel {}", label);
    let _ = writeln!(fdf, "NumberOfAtoms {}", positions.len());
    let _ = writeln!(fdf, "NumberOfSpecies {}", species.len());
    let _ = writeln!(fdf, "%block ChemicalSpeciesLabel");
    for (i, element) in species.iter().enumerate() {
        let _ = writeln!(
            fdf,
            " {} {} {}",
            i + 1,
            element.atomic_number(),
            element.symbol()
        );
    }
    let _ = writeln!(fdf, "%endblock ChemicalSpeciesLabel");

    let _ = writeln!(fdf, "LatticeConstant 1.0 Ang");
    let _ = writeln!(fdf, "%block LatticeVectors");
    for i in 0..3 {
        let v = cell.vector(i) * ANGSTROM_PER_NM;
        let _ = writeln!(fdf, " {:.10} {:.10} {:.10}", v.x, v.y, v.z);
    }
    let _ = writeln!(fdf, "%endblock LatticeVectors");

    let _ = writeln!(fdf, "AtomicCoordinatesFormat Ang");
    let _ = writeln!(fdf, "%block AtomicCoordinatesAndAtomicSpecies");
    for (position, symbol) in positions.iter().zip(symbols) {
        let species_index = species
            .iter()
            .position(|e| e.symbol() == *symbol)
            .map_or(0, |i| i + 1);
        let p = *position * ANGSTROM_PER_NM;
        let _ = writeln!(
            fdf,
            " {:.10} {:.10} {:.10} {}",
            p.x, p.y, p.z, species_index
        );
    }
    let _ = writeln!(fdf, "%endblock AtomicCoordinatesAndAtomicSpecies");

    let _ = writeln!(fdf, "MD.TypeOfRun CG");
    let _ = writeln!(fdf, "MD.NumCGsteps 0");
    let _ = writeln!(fdf, "WriteForces T");
    let _ = writeln!(fdf);
    let _ = writeln!(fdf, "{}", options.trim_end());
    fdf
}

/// Reads the Kohn-Sham energy (eV) of the last SCF cycle from the main output.
fn parse_energy(output: &str) -> Result<f64, PotentialError> {
    let line = output
        .lines()
        .rev()
        .find(|line| line.trim_start().starts_with(ENERGY_MARKER))
        .ok_or_else(|| PotentialError::Output {
            program: PROGRAM.into(),
            message: format!("no '{}' line in output", ENERGY_MARKER),
        })?;
    let value = line.trim_start()[ENERGY_MARKER.len()..].trim();
    value.parse().map_err(|_| PotentialError::Output {
        program: PROGRAM.into(),
        message: format!("invalid energy value '{}'", value),
    })
}

/// Reads forces (eV/Å) from a `.FA` file.
fn parse_forces(content: &str, n_atoms: usize) -> Result<Vec<Vector3<f64>>, PotentialError> {
    let invalid = |message: String| PotentialError::Output {
        program: PROGRAM.into(),
        message,
    };
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let count: usize = lines
        .next()
        .and_then(|l| l.trim().parse().ok())
        .ok_or_else(|| invalid("missing atom count in forces file".into()))?;
    if count != n_atoms {
        return Err(invalid(format!(
            "forces file lists {} atoms, expected {}",
            count, n_atoms
        )));
    }

    let mut forces = Vec::with_capacity(n_atoms);
    for line in lines.take(n_atoms) {
        let values: Vec<f64> = line
            .split_whitespace()
            .skip(1)
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| invalid(format!("invalid forces line '{}'", line.trim())))?;
        if values.len() != 3 {
            return Err(invalid(format!("invalid forces line '{}'", line.trim())));
        }
        forces.push(Vector3::new(values[0], values[1], values[2]));
    }
    if forces.len() != n_atoms {
        return Err(invalid(format!(
            "forces file is truncated: {} of {} atoms",
            forces.len(),
            n_atoms
        )));
    }
    Ok(forces)
}

impl Potential for SiestaPotential {
    fn name(&self) -> &str {
        &self.name
    }

    fn atoms(&self) -> &[usize] {
        &self.atoms
    }

    #[instrument(skip_all, fields(potential = %self.name, run = self.n_runs))]
    fn compute(&mut self, input: &PotentialInput) -> Result<Evaluation, PotentialError> {
        let species = collect_species(input.symbols)?;
        self.stage_pseudopotentials(&species)?;
        let cell = self.resolve_cell(input)?;

        let dir = self.work_dir.path().to_path_buf();
        let fdf = render_fdf(
            &self.settings.options,
            &self.settings.label,
            &species,
            input.symbols,
            input.positions,
            &cell,
        );
        fs::write(dir.join(self.fdf_name()), fdf)?;

        let forces_path = dir.join(self.forces_name());
        if forces_path.exists() {
            fs::remove_file(&forces_path)?;
        }

        run_shell(
            PROGRAM,
            &self.settings.command,
            &dir,
            Some(&self.fdf_name()),
            Some(&self.out_name()),
        )?;
        self.n_runs += 1;

        let output = fs::read_to_string(dir.join(self.out_name()))?;
        let energy = parse_energy(&output)?;
        let forces_content = fs::read_to_string(&forces_path).map_err(|e| PotentialError::Output {
            program: PROGRAM.into(),
            message: format!("cannot read {:?}: {}", forces_path, e),
        })?;
        let forces = parse_forces(&forces_content, input.n_atoms())?;
        debug!("SIESTA energy: {} eV", energy);

        Ok(Evaluation {
            energy: energy * KJ_PER_MOL_PER_EV,
            forces: forces
                .into_iter()
                .map(|f| f * KJ_PER_MOL_NM_PER_EV_ANGSTROM)
                .collect(),
            virial: Matrix3::zeros(),
        })
    }
}
