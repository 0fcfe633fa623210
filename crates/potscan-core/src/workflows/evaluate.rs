use crate::core::io::energy::EnergyWriter;
use crate::core::io::pdb::PdbFile;
use crate::core::io::traits::TopologyFile;
use crate::core::io::xyz::{XyzFrame, XyzTrajectory};
use crate::core::models::cell::Cell;
use crate::core::models::element::Element;
use crate::core::potentials::dftd3::Dftd3Potential;
use crate::core::potentials::nep::{NepError, NepPotential};
use crate::core::potentials::siesta::SiestaPotential;
use crate::core::potentials::{Potential, PotentialError};
use crate::engine::config::{EnergyReport, EvaluationConfig, JobConfig, PotentialSpec};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::system::System;
use std::io;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// What one job produced.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub name: String,
    pub output: PathBuf,
    pub report: EnergyReport,
    pub n_potentials: usize,
    pub frames_written: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSummary {
    pub n_atoms: usize,
    pub n_frames: usize,
    pub jobs: Vec<JobSummary>,
}

/// Evaluates every frame of the trajectory once per job and writes the
/// energies of each job to its output file.
///
/// The topology and trajectory are read once. Each job starts from an empty
/// potential list, attaches its own potentials and walks the whole
/// trajectory.
#[instrument(skip_all, name = "evaluation_workflow")]
pub fn run(
    config: &EvaluationConfig,
    reporter: &ProgressReporter,
) -> Result<EvaluationSummary, EngineError> {
    reporter.message(format!("Loading topology {:?}", config.topology_path));
    let molecular =
        PdbFile::read_from_path(&config.topology_path).map_err(|source| EngineError::Topology {
            path: config.topology_path.clone(),
            source,
        })?;

    reporter.message(format!("Loading trajectory {:?}", config.trajectory_path));
    let trajectory = XyzTrajectory::read_from_path(&config.trajectory_path).map_err(|source| {
        EngineError::Trajectory {
            path: config.trajectory_path.clone(),
            source,
        }
    })?;
    trajectory
        .check_against(&molecular)
        .map_err(EngineError::Mismatch)?;
    info!(
        "Loaded {} atoms and {} frame(s).",
        molecular.n_atoms(),
        trajectory.n_frames()
    );

    let topology_cell = molecular.cell().copied();
    let mut system = System::new(molecular);
    let mut jobs = Vec::with_capacity(config.jobs.len());
    for job in &config.jobs {
        jobs.push(run_job(
            &mut system,
            &trajectory,
            topology_cell,
            job,
            reporter,
        )?);
    }

    Ok(EvaluationSummary {
        n_atoms: system.n_atoms(),
        n_frames: trajectory.n_frames(),
        jobs,
    })
}

#[instrument(skip_all, fields(job = %job.name))]
fn run_job(
    system: &mut System,
    trajectory: &XyzTrajectory,
    topology_cell: Option<Cell>,
    job: &JobConfig,
    reporter: &ProgressReporter,
) -> Result<JobSummary, EngineError> {
    info!(
        "Starting job '{}' with {} potential(s).",
        job.name,
        job.potentials.len()
    );
    system.potentials_mut().clear();
    for spec in &job.potentials {
        let potential = build_potential(spec, system)?;
        system.potentials_mut().push(potential)?;
    }

    let output_error = |source: io::Error| EngineError::Output {
        path: job.output.clone(),
        source,
    };
    let mut writer = EnergyWriter::create(&job.output).map_err(output_error)?;

    reporter.report(Progress::JobStart {
        name: job.name.clone(),
        total_frames: trajectory.n_frames() as u64,
    });
    for (index, frame) in trajectory.frames().iter().enumerate() {
        let energies = evaluate_frame(system, frame, topology_cell, job.report)
            .map_err(|source| EngineError::Frame {
                index,
                source: Box::new(source),
            })?;
        writer
            .write_frame(index, &energies)
            .map_err(output_error)?;
        reporter.report(Progress::FrameEvaluated { index, energies });
    }
    let frames_written = writer.lines_written();
    writer.finish().map_err(output_error)?;
    reporter.report(Progress::JobFinish);

    info!(
        "Job '{}' wrote {} frame(s) to {:?}.",
        job.name, frames_written, job.output
    );
    Ok(JobSummary {
        name: job.name.clone(),
        output: job.output.clone(),
        report: job.report,
        n_potentials: job.potentials.len(),
        frames_written,
    })
}

fn evaluate_frame(
    system: &mut System,
    frame: &XyzFrame,
    topology_cell: Option<Cell>,
    report: EnergyReport,
) -> Result<Vec<f64>, EngineError> {
    system.set_positions(&frame.positions)?;
    system.set_cell(frame.cell.or(topology_cell));
    system.update_potentials()?;

    let not_evaluated = || EngineError::Internal("potentials were not evaluated".into());
    match report {
        EnergyReport::Total => Ok(vec![system.energy_potential().ok_or_else(not_evaluated)?]),
        EnergyReport::Each => (0..system.potentials().len())
            .map(|i| system.potential_energy(i).ok_or_else(not_evaluated))
            .collect(),
    }
}

/// Instantiates the backend described by `spec` for the atoms of `system`.
fn build_potential(spec: &PotentialSpec, system: &System) -> Result<Box<dyn Potential>, EngineError> {
    let atoms = spec.atoms().resolve(system.n_atoms());
    system.molecular().validate_indices(&atoms)?;
    let setup_error = |source: PotentialError| EngineError::PotentialSetup {
        name: spec.name().to_string(),
        source,
    };

    let potential: Box<dyn Potential> = match spec {
        PotentialSpec::Siesta { name, settings, .. } => Box::new(
            SiestaPotential::new(name.clone(), atoms, settings.clone()).map_err(setup_error)?,
        ),
        PotentialSpec::Dftd3 { name, settings, .. } => Box::new(
            Dftd3Potential::new(name.clone(), atoms, settings.clone()).map_err(setup_error)?,
        ),
        PotentialSpec::Nep { name, model, .. } => {
            let nep = NepPotential::from_file(name.clone(), atoms, model)
                .map_err(|e| setup_error(e.into()))?;
            check_nep_elements(&nep, system).map_err(|e| setup_error(e.into()))?;
            Box::new(nep)
        }
    };
    info!(
        "Attached {} potential '{}' to {} atom(s).",
        spec.kind(),
        potential.name(),
        potential.atoms().len()
    );
    if potential.atoms().is_empty() {
        warn!("Potential '{}' acts on no atoms.", potential.name());
    }
    Ok(potential)
}

fn check_nep_elements(nep: &NepPotential, system: &System) -> Result<(), NepError> {
    for &atom in nep.atoms() {
        let symbol = system.atomic_symbols()[atom];
        let known = Element::from_symbol(symbol).and_then(|e| nep.model().type_of(e));
        if known.is_none() {
            return Err(NepError::UnknownElement(symbol.to_string()));
        }
    }
    Ok(())
}
