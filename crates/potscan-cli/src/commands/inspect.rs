use crate::cli::InspectArgs;
use crate::error::{CliError, Result};
use potscan::core::potentials::nep::model::NepModel;
use std::fmt::Write as _;
use tracing::info;

pub fn run(args: InspectArgs) -> Result<()> {
    info!("Reading NEP model from {:?}", args.model);
    let model = NepModel::load(&args.model).map_err(|e| CliError::FileParsing {
        path: args.model.clone(),
        source: e.into(),
    })?;
    print!("{}", describe(&model));
    Ok(())
}

fn describe(model: &NepModel) -> String {
    let symbols: Vec<&str> = model.elements.iter().map(|e| e.symbol()).collect();
    let mut text = String::new();
    let _ = writeln!(text, "Version:      {:?}", model.version);
    let _ = writeln!(text, "Elements:     {}", symbols.join(" "));
    let _ = writeln!(
        text,
        "Cutoffs:      {} Å (radial), {} Å (angular)",
        model.rc_radial, model.rc_angular
    );
    let _ = writeln!(
        text,
        "n_max:        {} (radial), {} (angular)",
        model.n_max_radial, model.n_max_angular
    );
    let _ = writeln!(
        text,
        "Basis size:   {} (radial), {} (angular)",
        model.basis_size_radial, model.basis_size_angular
    );
    let _ = writeln!(
        text,
        "l_max:        {} (3-body), {} (4-body), {} (5-body)",
        model.l_max, model.l_max_4body, model.l_max_5body
    );
    let _ = writeln!(
        text,
        "Descriptor:   {} components ({} radial, {} angular)",
        model.dim(),
        model.dim_radial(),
        model.dim_angular()
    );
    let _ = writeln!(
        text,
        "Network:      {} network(s) with {} hidden neurons",
        model.anns.len(),
        model.num_neurons
    );
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// A single-element nep3 model with a two-component descriptor.
    const TINY_MODEL: &str = "\
nep3 1 C
cutoff 4.0 3.0
n_max 0 0
basis_size 0 0
l_max 1 0 0
ANN 1 0
0.1
0.2
0.3
0.4
0.5
0.6
0.7
1.0
1.0
";

    #[test]
    fn describe_lists_model_dimensions() {
        let model: NepModel = TINY_MODEL.parse().unwrap();
        let text = describe(&model);
        assert!(text.contains("Elements:     C\n"));
        assert!(text.contains("Cutoffs:      4 Å (radial), 3 Å (angular)"));
        assert!(text.contains("l_max:        1 (3-body), 0 (4-body), 0 (5-body)"));
        assert!(text.contains("Descriptor:   2 components (1 radial, 1 angular)"));
        assert!(text.contains("1 network(s) with 1 hidden neurons"));
    }

    #[test]
    fn run_reads_model_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nep.txt");
        fs::write(&path, TINY_MODEL).unwrap();
        assert!(run(InspectArgs { model: path }).is_ok());
    }

    #[test]
    fn missing_model_is_a_parsing_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(InspectArgs {
            model: dir.path().join("absent.txt"),
        });
        assert!(matches!(result, Err(CliError::FileParsing { .. })));
    }
}
