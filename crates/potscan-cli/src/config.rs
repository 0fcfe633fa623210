use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use potscan::core::potentials::dftd3::{Damping, Dftd3Settings};
use potscan::core::potentials::siesta::SiestaSettings;
use potscan::engine::config as core_config;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Placeholder in a NEP `model` path replaced by the replica index.
const REPLICA_PLACEHOLDER: &str = "{i}";

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum PartialReport {
    #[default]
    Total,
    Each,
}

impl From<PartialReport> for core_config::EnergyReport {
    fn from(p: PartialReport) -> Self {
        match p {
            PartialReport::Total => Self::Total,
            PartialReport::Each => Self::Each,
        }
    }
}

impl std::str::FromStr for PartialReport {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "total" => Ok(Self::Total),
            "each" => Ok(Self::Each),
            other => Err(CliError::Config(format!(
                "Invalid report '{}'. Expected 'total' or 'each'.",
                other
            ))),
        }
    }
}

/// `atoms = "all"` or `atoms = [0, 1, 2]`.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum PartialSelection {
    Keyword(String),
    List(Vec<usize>),
}

impl PartialSelection {
    fn resolve(selection: Option<Self>) -> Result<core_config::AtomSelection> {
        match selection {
            None => Ok(core_config::AtomSelection::All),
            Some(Self::Keyword(word)) if word == "all" => Ok(core_config::AtomSelection::All),
            Some(Self::Keyword(word)) => Err(CliError::Config(format!(
                "Invalid atom selection '{}'. Use \"all\" or a list of indices.",
                word
            ))),
            Some(Self::List(indices)) => Ok(core_config::AtomSelection::List(indices)),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "kebab-case",
    deny_unknown_fields
)]
enum PartialPotential {
    Siesta {
        name: Option<String>,
        atoms: Option<PartialSelection>,
        command: String,
        options: Option<String>,
        options_file: Option<PathBuf>,
        pseudopotential_dir: Option<PathBuf>,
        work_dir: Option<PathBuf>,
        label: Option<String>,
        vacuum_padding: Option<f64>,
    },
    Dftd3 {
        name: Option<String>,
        atoms: Option<PartialSelection>,
        functional: String,
        damping: Option<String>,
        three_body: Option<bool>,
        command: Option<String>,
        work_dir: Option<PathBuf>,
    },
    Nep {
        name: Option<String>,
        atoms: Option<PartialSelection>,
        model: String,
        replicas: Option<usize>,
    },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialJob {
    name: String,
    output: Option<PathBuf>,
    report: Option<PartialReport>,
    #[serde(default, rename = "potential")]
    potentials: Vec<PartialPotential>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PartialEvaluationConfig {
    topology: Option<PathBuf>,
    trajectory: Option<PathBuf>,
    #[serde(default, rename = "job")]
    jobs: Vec<PartialJob>,
    /// Directory relative paths in the file are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
    /// Paths set with `--set`, relative to the working directory.
    #[serde(skip)]
    topology_override: Option<PathBuf>,
    #[serde(skip)]
    trajectory_override: Option<PathBuf>,
}

fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl PartialEvaluationConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::from_str_in(&content, base_dir).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn from_str_in(content: &str, base_dir: PathBuf) -> std::result::Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        config.base_dir = base_dir;
        Ok(config)
    }

    pub fn merge_with_cli(mut self, args: &RunArgs) -> Result<core_config::EvaluationConfig> {
        self.apply_set_values(&args.set_values)?;

        let topology = match args.topology.as_ref().or(self.topology_override.as_ref()) {
            Some(path) => path.clone(),
            None => resolve_path(
                &self.base_dir,
                self.topology.as_deref().ok_or_else(|| {
                    CliError::Config(
                        "`topology` is required either in the config file or via --topology."
                            .to_string(),
                    )
                })?,
            ),
        };
        let trajectory = match args.trajectory.as_ref().or(self.trajectory_override.as_ref()) {
            Some(path) => path.clone(),
            None => resolve_path(
                &self.base_dir,
                self.trajectory.as_deref().ok_or_else(|| {
                    CliError::Config(
                        "`trajectory` is required either in the config file or via --trajectory."
                            .to_string(),
                    )
                })?,
            ),
        };

        for wanted in &args.jobs {
            if !self.jobs.iter().any(|job| &job.name == wanted) {
                return Err(CliError::Argument(format!(
                    "No job named '{}' in the config file.",
                    wanted
                )));
            }
        }

        let output_base = args.output_dir.as_deref().unwrap_or(&self.base_dir);
        let mut jobs = Vec::new();
        for job in &self.jobs {
            if !args.jobs.is_empty() && !args.jobs.contains(&job.name) {
                debug!("Skipping job '{}' not selected on the command line.", job.name);
                continue;
            }
            jobs.push(self.merge_job(job, output_base)?);
        }

        core_config::EvaluationConfigBuilder::new()
            .topology_path(topology)
            .trajectory_path(trajectory)
            .jobs(jobs)
            .build()
            .map_err(|e| CliError::Config(e.to_string()))
    }

    fn merge_job(&self, job: &PartialJob, output_base: &Path) -> Result<core_config::JobConfig> {
        let output = job
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("energy_{}.txt", job.name)));

        let mut potentials = Vec::new();
        for partial in &job.potentials {
            potentials.extend(self.merge_potential(partial)?);
        }

        Ok(core_config::JobConfig {
            name: job.name.clone(),
            output: resolve_path(output_base, &output),
            report: job.report.unwrap_or_default().into(),
            potentials,
        })
    }

    /// Converts one `[[job.potential]]` table, expanding NEP replicas.
    fn merge_potential(&self, partial: &PartialPotential) -> Result<Vec<core_config::PotentialSpec>> {
        let base = &self.base_dir;
        match partial.clone() {
            PartialPotential::Siesta {
                name,
                atoms,
                command,
                options,
                options_file,
                pseudopotential_dir,
                work_dir,
                label,
                vacuum_padding,
            } => {
                let options = match (options, options_file) {
                    (Some(_), Some(_)) => {
                        return Err(CliError::Config(
                            "SIESTA potential accepts `options` or `options-file`, not both."
                                .to_string(),
                        ));
                    }
                    (Some(text), None) => text,
                    (None, Some(path)) => {
                        let path = resolve_path(base, &path);
                        std::fs::read_to_string(&path).map_err(|e| CliError::FileParsing {
                            path,
                            source: e.into(),
                        })?
                    }
                    (None, None) => {
                        warn!("SIESTA potential has no options; SIESTA defaults will apply.");
                        String::new()
                    }
                };
                let mut settings = SiestaSettings::new(options, command);
                settings.pseudopotential_dir =
                    resolve_path(base, pseudopotential_dir.as_deref().unwrap_or(Path::new(".")));
                settings.work_dir = work_dir.map(|dir| resolve_path(base, &dir));
                if let Some(label) = label {
                    settings.label = label;
                }
                if let Some(padding) = vacuum_padding {
                    if padding < 0.0 {
                        return Err(CliError::Config(format!(
                            "`vacuum-padding` must be non-negative, got {}.",
                            padding
                        )));
                    }
                    settings.vacuum_padding = padding;
                }
                Ok(vec![core_config::PotentialSpec::Siesta {
                    name: name.unwrap_or_else(|| "siesta".to_string()),
                    atoms: PartialSelection::resolve(atoms)?,
                    settings,
                }])
            }
            PartialPotential::Dftd3 {
                name,
                atoms,
                functional,
                damping,
                three_body,
                command,
                work_dir,
            } => {
                let mut settings = Dftd3Settings::new(functional);
                if let Some(damping) = damping {
                    settings.damping = damping.parse::<Damping>().map_err(CliError::Config)?;
                }
                settings.three_body = three_body.unwrap_or(false);
                if let Some(command) = command {
                    settings.command = command;
                }
                settings.work_dir = work_dir.map(|dir| resolve_path(base, &dir));
                Ok(vec![core_config::PotentialSpec::Dftd3 {
                    name: name.unwrap_or_else(|| "dftd3".to_string()),
                    atoms: PartialSelection::resolve(atoms)?,
                    settings,
                }])
            }
            PartialPotential::Nep {
                name,
                atoms,
                model,
                replicas,
            } => {
                let atoms = PartialSelection::resolve(atoms)?;
                let name = name.unwrap_or_else(|| "nep".to_string());
                let has_placeholder = model.contains(REPLICA_PLACEHOLDER);
                match (replicas, has_placeholder) {
                    (None, false) => Ok(vec![core_config::PotentialSpec::Nep {
                        name,
                        atoms,
                        model: resolve_path(base, Path::new(&model)),
                    }]),
                    (Some(0), _) => Err(CliError::Config(
                        "`replicas` must be at least 1.".to_string(),
                    )),
                    (Some(n), true) => Ok((0..n)
                        .map(|i| core_config::PotentialSpec::Nep {
                            name: format!("{}_{}", name, i),
                            atoms: atoms.clone(),
                            model: resolve_path(
                                base,
                                Path::new(&model.replace(REPLICA_PLACEHOLDER, &i.to_string())),
                            ),
                        })
                        .collect()),
                    (Some(_), false) => Err(CliError::Config(format!(
                        "`replicas` requires a `model` path containing '{}'.",
                        REPLICA_PLACEHOLDER
                    ))),
                    (None, true) => Err(CliError::Config(format!(
                        "`model` contains '{}' but `replicas` is not set.",
                        REPLICA_PLACEHOLDER
                    ))),
                }
            }
        }
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value_str) = kv_pair.split_once('=').ok_or_else(|| {
                CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                ))
            })?;

            match key {
                "topology" => self.topology_override = Some(PathBuf::from(value_str)),
                "trajectory" => self.trajectory_override = Some(PathBuf::from(value_str)),
                _ => {
                    let (job_name, field) = key
                        .strip_prefix("job.")
                        .and_then(|rest| rest.rsplit_once('.'))
                        .ok_or_else(|| {
                            CliError::Config(format!(
                                "Unsupported configuration key for --set: '{}'",
                                key
                            ))
                        })?;
                    let job = self
                        .jobs
                        .iter_mut()
                        .find(|job| job.name == job_name)
                        .ok_or_else(|| {
                            CliError::Config(format!("No job named '{}' for --set.", job_name))
                        })?;
                    match field {
                        "output" => job.output = Some(PathBuf::from(value_str)),
                        "report" => job.report = Some(value_str.parse()?),
                        _ => {
                            return Err(CliError::Config(format!(
                                "Unsupported configuration key for --set: '{}'",
                                key
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use core_config::{AtomSelection, EnergyReport, PotentialSpec};
    use std::fs;

    const SCAN_CONFIG: &str = r#"
topology = "data/topo.pdb"
trajectory = "data/C2H6.test.xyz"

[[job]]
name = "siesta"
output = "energy_siesta.txt"

[[job.potential]]
type = "siesta"
command = "mpirun -np 4 siesta"
pseudopotential-dir = "data"
options = """
xc.functional GGA
xc.authors revPBE
"""

[[job.potential]]
type = "dftd3"
functional = "revpbe"
damping = "bj"

[[job]]
name = "nep"
output = "energy_nep.txt"
report = "each"

[[job.potential]]
type = "nep"
model = "train/potential_{i}/nep.txt"
replicas = 4
"#;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["potscan", "run", "-c", "scan.toml"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
            other => panic!("Expected 'run' subcommand, got {:?}", other),
        }
    }

    fn parse(content: &str) -> PartialEvaluationConfig {
        PartialEvaluationConfig::from_str_in(content, PathBuf::from("/scan")).unwrap()
    }

    #[test]
    fn loads_jobs_and_resolves_paths_against_config_dir() {
        let config = parse(SCAN_CONFIG).merge_with_cli(&run_args(&[])).unwrap();

        assert_eq!(config.topology_path, PathBuf::from("/scan/data/topo.pdb"));
        assert_eq!(config.jobs.len(), 2);

        let siesta_job = &config.jobs[0];
        assert_eq!(siesta_job.output, PathBuf::from("/scan/energy_siesta.txt"));
        assert_eq!(siesta_job.report, EnergyReport::Total);
        match &siesta_job.potentials[0] {
            PotentialSpec::Siesta { settings, atoms, .. } => {
                assert_eq!(settings.command, "mpirun -np 4 siesta");
                assert_eq!(settings.pseudopotential_dir, PathBuf::from("/scan/data"));
                assert!(settings.options.contains("xc.authors revPBE"));
                assert_eq!(*atoms, AtomSelection::All);
            }
            other => panic!("Expected SIESTA potential, got {:?}", other),
        }
        match &siesta_job.potentials[1] {
            PotentialSpec::Dftd3 { settings, .. } => {
                assert_eq!(settings.functional, "revpbe");
                assert_eq!(settings.damping, Damping::BeckeJohnson);
                assert_eq!(settings.command, "s-dftd3");
            }
            other => panic!("Expected D3 potential, got {:?}", other),
        }
    }

    #[test]
    fn nep_replicas_expand_into_a_committee() {
        let config = parse(SCAN_CONFIG).merge_with_cli(&run_args(&[])).unwrap();
        let nep_job = &config.jobs[1];
        assert_eq!(nep_job.report, EnergyReport::Each);
        assert_eq!(nep_job.potentials.len(), 4);
        match &nep_job.potentials[3] {
            PotentialSpec::Nep { name, model, .. } => {
                assert_eq!(name, "nep_3");
                assert_eq!(model, &PathBuf::from("/scan/train/potential_3/nep.txt"));
            }
            other => panic!("Expected NEP potential, got {:?}", other),
        }
    }

    #[test]
    fn cli_arguments_and_set_values_override_the_file() {
        let args = run_args(&[
            "-t",
            "other.pdb",
            "-o",
            "/results",
            "--job",
            "nep",
            "-S",
            "job.nep.report=total",
            "-S",
            "trajectory=/abs/traj.xyz",
        ]);
        let config = parse(SCAN_CONFIG).merge_with_cli(&args).unwrap();

        assert_eq!(config.topology_path, PathBuf::from("other.pdb"));
        assert_eq!(config.trajectory_path, PathBuf::from("/abs/traj.xyz"));
        assert_eq!(config.jobs.len(), 1);
        assert_eq!(config.jobs[0].name, "nep");
        assert_eq!(config.jobs[0].report, EnergyReport::Total);
        assert_eq!(config.jobs[0].output, PathBuf::from("/results/energy_nep.txt"));
    }

    #[test]
    fn set_paths_stay_relative_to_the_working_directory() {
        let args = run_args(&[
            "-S",
            "topology=runs/topo.pdb",
            "-S",
            "trajectory=runs/traj.xyz",
        ]);
        let config = parse(SCAN_CONFIG).merge_with_cli(&args).unwrap();
        assert_eq!(config.topology_path, PathBuf::from("runs/topo.pdb"));
        assert_eq!(config.trajectory_path, PathBuf::from("runs/traj.xyz"));

        let args = run_args(&["-t", "flag.pdb", "-S", "topology=set.pdb"]);
        let config = parse(SCAN_CONFIG).merge_with_cli(&args).unwrap();
        assert_eq!(config.topology_path, PathBuf::from("flag.pdb"));
    }

    #[test]
    fn unknown_job_and_set_keys_are_rejected() {
        let result = parse(SCAN_CONFIG).merge_with_cli(&run_args(&["--job", "missing"]));
        assert!(matches!(result, Err(CliError::Argument(_))));

        for set in ["job.nep.colour=red", "cutoff=3", "job.nep.report=sum", "noequals"] {
            let result = parse(SCAN_CONFIG).merge_with_cli(&run_args(&["-S", set]));
            assert!(matches!(result, Err(CliError::Config(_))), "{}", set);
        }
    }

    #[test]
    fn invalid_replica_settings_are_rejected() {
        let cases = [
            "model = \"nep_{i}.txt\"",
            "model = \"nep.txt\"\nreplicas = 2",
            "model = \"nep_{i}.txt\"\nreplicas = 0",
        ];
        for case in cases {
            let content = format!(
                "topology = \"t.pdb\"\ntrajectory = \"t.xyz\"\n[[job]]\nname = \"n\"\n[[job.potential]]\ntype = \"nep\"\n{}\n",
                case
            );
            let result = parse(&content).merge_with_cli(&run_args(&[]));
            assert!(matches!(result, Err(CliError::Config(_))), "{}", case);
        }
    }

    #[test]
    fn default_output_name_and_atom_list() {
        let content = r#"
topology = "t.pdb"
trajectory = "t.xyz"
[[job]]
name = "d3"
[[job.potential]]
type = "dftd3"
functional = "pbe0"
damping = "zero"
three-body = true
atoms = [0, 2]
"#;
        let config = parse(content).merge_with_cli(&run_args(&[])).unwrap();
        assert_eq!(config.jobs[0].output, PathBuf::from("/scan/energy_d3.txt"));
        match &config.jobs[0].potentials[0] {
            PotentialSpec::Dftd3 { atoms, settings, .. } => {
                assert_eq!(*atoms, AtomSelection::List(vec![0, 2]));
                assert_eq!(settings.damping, Damping::Zero);
                assert!(settings.three_body);
            }
            other => panic!("Expected D3 potential, got {:?}", other),
        }
    }

    #[test]
    fn missing_topology_and_empty_job_list_are_reported() {
        let result = parse("trajectory = \"t.xyz\"").merge_with_cli(&run_args(&[]));
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("topology")));

        let result =
            parse("topology = \"t.pdb\"\ntrajectory = \"t.xyz\"").merge_with_cli(&run_args(&[]));
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("jobs")));
    }

    #[test]
    fn unknown_fields_fail_to_parse() {
        assert!(PartialEvaluationConfig::from_str_in("frames = 3", PathBuf::new()).is_err());
        let content = "[[job]]\nname = \"n\"\n[[job.potential]]\ntype = \"nep\"\nmodel = \"m\"\ncutoff = 5\n";
        assert!(PartialEvaluationConfig::from_str_in(content, PathBuf::new()).is_err());
    }

    #[test]
    fn siesta_options_file_is_read_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("siesta.fdf"), "PAO.BasisSize DZP\n").unwrap();
        let content = r#"
topology = "t.pdb"
trajectory = "t.xyz"
[[job]]
name = "dft"
[[job.potential]]
type = "siesta"
command = "siesta"
options-file = "siesta.fdf"
vacuum-padding = 0.5
"#;
        let config_path = dir.path().join("scan.toml");
        fs::write(&config_path, content).unwrap();

        let config = PartialEvaluationConfig::from_file(&config_path)
            .unwrap()
            .merge_with_cli(&run_args(&[]))
            .unwrap();
        match &config.jobs[0].potentials[0] {
            PotentialSpec::Siesta { settings, .. } => {
                assert_eq!(settings.options, "PAO.BasisSize DZP\n");
                assert_eq!(settings.vacuum_padding, 0.5);
                assert_eq!(settings.pseudopotential_dir, dir.path().join("."));
            }
            other => panic!("Expected SIESTA potential, got {:?}", other),
        }
    }
}
