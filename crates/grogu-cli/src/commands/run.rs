use crate::cli::RunArgs;
use crate::config::PartialRunConfig;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use grogu::{
    core::io::{
        magnopy::MagnopyFile,
        model::TightBindingModel,
        traits::{ExchangeFormat, HamiltonianSource},
    },
    engine::progress::ProgressReporter,
    workflows::{self, exchange::ExchangeResult},
};
use tracing::{info, warn};

pub fn run(args: RunArgs) -> Result<()> {
    let partial_config = PartialRunConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let (config, options) = partial_config.merge_with_cli(&args)?;

    info!("Loading tight-binding model from {:?}", &args.model);
    let hamiltonian =
        TightBindingModel::read_from_path(&args.model).map_err(|source| CliError::Model {
            path: args.model.clone(),
            source,
        })?;
    info!(
        atoms = hamiltonian.layout().n_atoms(),
        dimension = hamiltonian.dimension(),
        offsets = hamiltonian.offsets().len(),
        "Model loaded."
    );

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting exchange calculation...");
    info!("Invoking the core exchange workflow...");
    let result = workflows::exchange::run(&hamiltonian, &config, &reporter)?;

    if result.pairs.is_empty() {
        warn!("Workflow completed but no pairs were selected.");
        println!("Warning: no pairs were selected, only on-site anisotropies are written.");
    }

    MagnopyFile::write_to_path(&result.to_exchange_file(), &options, &args.output).map_err(
        |source| CliError::Output {
            path: args.output.clone(),
            source,
        },
    )?;

    print!("{}", summary(&result));
    println!("✓ Exchange parameters written to: {}", args.output.display());
    Ok(())
}

/// Table of isotropic exchange, DM vectors and anisotropy diagonals.
fn summary(result: &ExchangeResult) -> String {
    let unit = result.energy_unit.name();
    let mut out = String::new();

    if !result.pairs.is_empty() {
        out.push_str(&format!(
            "\n{:<16} {:<16} {:>12} {:>10} {:>14} {:>14}\n",
            "Entity 1", "Entity 2", "Ruc", "d [Å]", &format!("J_iso [{unit}]"), &format!("|D| [{unit}]")
        ));
        for pair in &result.pairs {
            let Some(tensor) = pair.exchange() else {
                continue;
            };
            let ruc = pair.ruc();
            out.push_str(&format!(
                "{:<16} {:<16} {:>12} {:>10.4} {:>14.6e} {:>14.6e}\n",
                pair.tag1(),
                pair.tag2(),
                format!("[{} {} {}]", ruc.x, ruc.y, ruc.z),
                pair.distance(),
                tensor.iso,
                tensor.dm.norm()
            ));
        }
    }

    if !result.entities.is_empty() {
        out.push_str(&format!(
            "\n{:<16} {:>14} {:>14} {:>14}\n",
            "Entity",
            &format!("Kxx [{unit}]"),
            &format!("Kyy [{unit}]"),
            &format!("Kzz [{unit}]")
        ));
        for entity in &result.entities {
            let Some(anisotropy) = entity.anisotropy() else {
                continue;
            };
            let k = anisotropy.components();
            out.push_str(&format!(
                "{:<16} {:>14.6e} {:>14.6e} {:>14.6e}\n",
                entity.tag(),
                k[0],
                k[1],
                k[2]
            ));
        }
    }
    out
}
