use crate::core::potentials::dftd3::Dftd3Settings;
use crate::core::potentials::siesta::SiestaSettings;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Job '{0}' has no potentials")]
    EmptyJob(String),
    #[error("Job name '{0}' is used more than once")]
    DuplicateJob(String),
    #[error("Output file {0:?} is written by more than one job")]
    DuplicateOutput(PathBuf),
    #[error("Atom selection of potential '{0}' is empty")]
    EmptySelection(String),
    #[error("Atom {index} appears more than once in the selection of potential '{potential}'")]
    DuplicateAtom { potential: String, index: usize },
}

/// The atoms a potential acts on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AtomSelection {
    #[default]
    All,
    /// Zero-based atom indices, in the order handed to the potential.
    List(Vec<usize>),
}

impl AtomSelection {
    /// Expands the selection for a system of `n_atoms` atoms.
    ///
    /// Indices are not checked here; the engine validates them when the
    /// potential is attached.
    pub fn resolve(&self, n_atoms: usize) -> Vec<usize> {
        match self {
            Self::All => (0..n_atoms).collect(),
            Self::List(indices) => indices.clone(),
        }
    }
}

/// What a job writes for each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnergyReport {
    /// `index total`
    #[default]
    Total,
    /// `index e_0 e_1 ...`, one column per potential in declaration order.
    Each,
}

/// A potential to attach to the system, with its backend settings.
#[derive(Debug, Clone, PartialEq)]
pub enum PotentialSpec {
    Siesta {
        name: String,
        atoms: AtomSelection,
        settings: SiestaSettings,
    },
    Dftd3 {
        name: String,
        atoms: AtomSelection,
        settings: Dftd3Settings,
    },
    Nep {
        name: String,
        atoms: AtomSelection,
        model: PathBuf,
    },
}

impl PotentialSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Siesta { name, .. } | Self::Dftd3 { name, .. } | Self::Nep { name, .. } => name,
        }
    }

    pub fn atoms(&self) -> &AtomSelection {
        match self {
            Self::Siesta { atoms, .. } | Self::Dftd3 { atoms, .. } | Self::Nep { atoms, .. } => {
                atoms
            }
        }
    }

    /// Short backend identifier, as used in configuration files.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Siesta { .. } => "siesta",
            Self::Dftd3 { .. } => "dftd3",
            Self::Nep { .. } => "nep",
        }
    }
}

/// One pass over the trajectory with a fixed set of potentials.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    pub name: String,
    pub output: PathBuf,
    pub report: EnergyReport,
    pub potentials: Vec<PotentialSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationConfig {
    pub topology_path: PathBuf,
    pub trajectory_path: PathBuf,
    pub jobs: Vec<JobConfig>,
}

#[derive(Default)]
pub struct EvaluationConfigBuilder {
    topology_path: Option<PathBuf>,
    trajectory_path: Option<PathBuf>,
    jobs: Vec<JobConfig>,
}

impl EvaluationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topology_path(mut self, path: PathBuf) -> Self {
        self.topology_path = Some(path);
        self
    }
    pub fn trajectory_path(mut self, path: PathBuf) -> Self {
        self.trajectory_path = Some(path);
        self
    }
    pub fn job(mut self, job: JobConfig) -> Self {
        self.jobs.push(job);
        self
    }
    pub fn jobs(mut self, jobs: impl IntoIterator<Item = JobConfig>) -> Self {
        self.jobs.extend(jobs);
        self
    }

    pub fn build(self) -> Result<EvaluationConfig, ConfigError> {
        let topology_path = self
            .topology_path
            .ok_or(ConfigError::MissingParameter("topology_path"))?;
        let trajectory_path = self
            .trajectory_path
            .ok_or(ConfigError::MissingParameter("trajectory_path"))?;
        if self.jobs.is_empty() {
            return Err(ConfigError::MissingParameter("jobs"));
        }

        let mut names = HashSet::new();
        let mut outputs = HashSet::new();
        for job in &self.jobs {
            if !names.insert(job.name.as_str()) {
                return Err(ConfigError::DuplicateJob(job.name.clone()));
            }
            if !outputs.insert(job.output.as_path()) {
                return Err(ConfigError::DuplicateOutput(job.output.clone()));
            }
            if job.potentials.is_empty() {
                return Err(ConfigError::EmptyJob(job.name.clone()));
            }
            for spec in &job.potentials {
                let AtomSelection::List(list) = spec.atoms() else {
                    continue;
                };
                if list.is_empty() {
                    return Err(ConfigError::EmptySelection(spec.name().to_string()));
                }
                let mut seen = HashSet::new();
                if let Some(&index) = list.iter().find(|&&i| !seen.insert(i)) {
                    return Err(ConfigError::DuplicateAtom {
                        potential: spec.name().to_string(),
                        index,
                    });
                }
            }
        }

        Ok(EvaluationConfig {
            topology_path,
            trajectory_path,
            jobs: self.jobs,
        })
    }
}
