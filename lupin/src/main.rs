mod run_fit;
mod run_simulate;

use clap::{Parser, Subcommand};
use run_fit::*;
use run_simulate::*;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LUPIN",
    long_about = "Latent factors Uncovered from multiple views and groups by variational INference\n\
		  Input is a long-form table with columns `view`, `group` (optional),\n\
		  `sample`, `feature` and `value`; missing values are allowed."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Fit a multi-view, multi-group factor model",
        long_about = "Fit a multi-view, multi-group factor model by coordinate ascent\n\
		      variational inference. Loadings are shared across the groups of a view\n\
		      and factors across the views of a group. Outputs:\n\
		      (1) {out}.factors.{group}.{mean,sd}.parquet\n\
		      (2) {out}.loadings.{view}.{mean,sd}.parquet\n\
		      (3) {out}.r2.tsv.gz, {out}.elbo.tsv.gz and {out}.training.json\n"
    )]
    Fit(FitArgs),

    /// simulate a long-form table from a sparse factor model
    Simulate(SimulateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.commands {
        Commands::Fit(args) => {
            run_fit(args)?;
        }
        Commands::Simulate(args) => {
            run_simulate(args)?;
        }
    }

    Ok(())
}
