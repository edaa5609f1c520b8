//! Command-line parsing. Dispatch lives in `main.rs`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "biosim",
    version,
    about = "Pharmacokinetic, binding, epidemic and enzyme-kinetics models"
)]
pub struct Cli {
    /// TOML file overriding model parameters and solver settings.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Oral dose absorbed from the gut into the blood (ODE).
    GutBlood(OutputArgs),
    /// Closed-form concentration curve for a single oral dose.
    OralDose(OutputArgs),
    /// Ligand-receptor binding approaching equilibrium.
    Binding(OutputArgs),
    /// SIRS epidemic with waning immunity.
    Sirs(OutputArgs),
    /// SEIRS epidemic (SIRS with a latent compartment).
    Seirs(OutputArgs),
    /// NADH calibration and Michaelis-Menten fit of the assay data.
    Enzyme(ExportArgs),
    /// Peak infection of the SIRS model across transmission rates.
    Sweep(SweepArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct ExportArgs {
    /// Write the results as CSV.
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Write the results as JSON.
    #[arg(long)]
    pub json: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    #[command(flatten)]
    pub export: ExportArgs,

    /// Change between consecutive samples below which a component counts as
    /// settled.
    #[arg(long, default_value_t = 1e-3)]
    pub steady_threshold: f64,
}

#[derive(Debug, Args, Clone)]
pub struct SweepArgs {
    /// Transmission rates to simulate, e.g. `--beta 0.2,0.3,0.5`.
    #[arg(long, value_delimiter = ',', num_args = 1.., required = true)]
    pub beta: Vec<f64>,

    #[command(flatten)]
    pub export: ExportArgs,
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::{CommandFactory, Parser};

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_sweep_values() {
        let cli = Cli::try_parse_from(["biosim", "sweep", "--beta", "0.2,0.4", "--json", "out.json"])
            .expect("parse");
        match cli.command {
            Command::Sweep(args) => {
                assert_eq!(args.beta, vec![0.2, 0.4]);
                assert!(args.export.json.is_some());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["biosim", "binding", "--config", "run.toml"]).expect("parse");
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("run.toml")));
        assert!(Cli::try_parse_from(["biosim", "sweep"]).is_err());
    }
}
