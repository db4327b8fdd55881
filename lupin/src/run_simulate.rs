use clap::Args;
use log::info;
use lupin::simulate::{simulate_multiview, SimOptions};
use matrix_util::common_io::{mkdir, write_lines};
use matrix_util::traits::IoOps;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// features per view (comma-separated)
    #[arg(long, value_delimiter(','), default_value = "50,30")]
    view_dims: Vec<usize>,

    /// samples per group (comma-separated)
    #[arg(long, value_delimiter(','), default_value = "100")]
    group_dims: Vec<usize>,

    /// number of true factors
    #[arg(long, short = 'k', default_value_t = 5)]
    factors: usize,

    /// fraction of non-zero loadings
    #[arg(long, default_value_t = 0.5)]
    loading_density: f64,

    /// noise precision
    #[arg(long, default_value_t = 4.0)]
    noise_precision: f64,

    /// fraction of missing entries
    #[arg(long, default_value_t = 0.0)]
    missing_fraction: f64,

    /// random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

///
/// Write `{out}.tsv.gz` (long form) along with the true factors
/// `{out}.z.{group}.parquet` and loadings `{out}.w.{view}.parquet`
///
pub fn run_simulate(args: SimulateArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let sim = simulate_multiview(&SimOptions {
        view_dims: args.view_dims,
        group_dims: args.group_dims,
        factors: args.factors,
        loading_density: args.loading_density,
        noise_precision: args.noise_precision,
        missing_fraction: args.missing_fraction,
        seed: args.seed,
    })?;

    mkdir(&args.out)?;

    let mut lines: Vec<Box<str>> = vec!["view\tgroup\tsample\tfeature\tvalue".into()];
    lines.extend(sim.to_long_records().into_iter().map(|r| {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            r.view, r.group, r.sample, r.feature, r.value
        )
        .into_boxed_str()
    }));
    let data_file = format!("{}.tsv.gz", args.out);
    write_lines(&lines, &data_file)?;
    info!("wrote {} record(s) to {}", lines.len() - 1, data_file);

    for (group, z) in sim.group_names.iter().zip(sim.factors.iter()) {
        z.to_parquet(None, None, &format!("{}.z.{}.parquet", args.out, group))?;
    }
    for (view, w) in sim.view_names.iter().zip(sim.loadings.iter()) {
        w.to_parquet(None, None, &format!("{}.w.{}.parquet", args.out, view))?;
    }

    info!("Done");
    Ok(())
}
