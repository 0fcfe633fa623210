use crate::cli::RunArgs;
use crate::config::PartialEvaluationConfig;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use potscan::engine::config::EnergyReport;
use potscan::engine::progress::ProgressReporter;
use potscan::workflows;
use tracing::info;

pub fn run(args: RunArgs) -> Result<()> {
    let partial_config = PartialEvaluationConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_with_cli(&args)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Evaluating {} job(s) on {}...",
        config.jobs.len(),
        config.trajectory_path.display()
    );
    let summary = workflows::evaluate::run(&config, &reporter)?;

    println!(
        "Evaluated {} frame(s) of {} atom(s).",
        summary.n_frames, summary.n_atoms
    );
    for job in &summary.jobs {
        let columns = match job.report {
            EnergyReport::Total => "total energy".to_string(),
            EnergyReport::Each => format!("{} energies", job.n_potentials),
        };
        println!(
            "✓ Job '{}' ({}) written to: {}",
            job.name,
            columns,
            job.output.display()
        );
    }
    Ok(())
}
