use clap::{ArgAction, Args};
use log::info;
use lupin::input::read_long_table;
use lupin::save::save_fitted;
use lupin::*;

#[derive(Args, Debug)]
pub struct FitArgs {
    /// long-form data file (`.tsv` or `.tsv.gz`)
    #[arg(required = true)]
    data_file: Box<str>,

    /// Output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// number of latent factors
    #[arg(long, short = 'k', default_value_t = 10)]
    factors: usize,

    /// restrict to these views (comma-separated)
    #[arg(long, value_delimiter(','))]
    views: Option<Vec<Box<str>>>,

    /// restrict to these groups (comma-separated)
    #[arg(long, value_delimiter(','))]
    groups: Option<Vec<Box<str>>>,

    /// ARD prior on the loadings
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    ard_weights: bool,

    /// spike-and-slab prior on the loadings
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    spikeslab_weights: bool,

    /// ARD prior on the factors of each group
    #[arg(long, default_value_t = false)]
    ard_factors: bool,

    /// noise precision per feature; otherwise one per (view, group)
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    noise_per_feature: bool,

    /// center features within each group
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    center_groups: bool,

    /// scale each view to unit variance
    #[arg(long, default_value_t = false)]
    scale_views: bool,

    /// scale each (view, group) block to unit variance
    #[arg(long, default_value_t = false)]
    scale_groups: bool,

    /// maximum number of iterations
    #[arg(long, short = 'i', default_value_t = 1000)]
    iter: usize,

    /// evaluate the ELBO every this many iterations
    #[arg(long, default_value_t = 1)]
    freq_elbo: usize,

    /// start testing convergence at this iteration
    #[arg(long, default_value_t = 1)]
    start_elbo: usize,

    /// drop factors explaining less than this fraction of variance
    #[arg(long)]
    drop_r2: Option<f64>,

    #[arg(long, value_enum, default_value_t = ConvergenceMode::Fast)]
    convergence_mode: ConvergenceMode,

    #[arg(long, value_enum, default_value_t = InitMethod::Random)]
    init: InitMethod,

    /// random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// run the matrix algebra on an accelerator
    #[arg(long, default_value_t = false)]
    gpu_mode: bool,

    #[arg(long, value_enum, default_value_t = GpuDevice::Cuda)]
    gpu_device: GpuDevice,

    /// fall back to the CPU if the accelerator is unavailable
    #[arg(long, default_value_t = false)]
    gpu_fallback: bool,

    /// wall-clock budget in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// maximum number of threads
    #[arg(long, default_value_t = num_cpus::get())]
    threads: usize,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

pub fn run_fit(args: FitArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads.max(1))
        .build_global()?;

    let data_options = DataOptions {
        center_groups: args.center_groups,
        scale_views: args.scale_views,
        scale_groups: args.scale_groups,
    };

    let model_options = ModelOptions {
        factors: args.factors,
        ard_weights: args.ard_weights,
        spikeslab_weights: args.spikeslab_weights,
        ard_factors: args.ard_factors,
        noise_per_feature: args.noise_per_feature,
        views: args.views,
        groups: args.groups,
    };

    let train_options = TrainOptions {
        iter: args.iter,
        freq_elbo: args.freq_elbo,
        drop_r2: args.drop_r2,
        start_elbo: args.start_elbo,
        verbose: args.verbose,
        seed: args.seed,
        convergence_mode: args.convergence_mode,
        gpu_mode: args.gpu_mode,
        gpu_device: args.gpu_device,
        gpu_fallback: args.gpu_fallback,
        init: args.init,
        timeout: args.timeout,
    };

    let records = read_long_table(&args.data_file)?;
    info!("read {} record(s) from {}", records.len(), args.data_file);

    let data = DataContainer::from_long_table(&records, &data_options)?;

    let mut trainer = Trainer::build(data, model_options, train_options)?;
    trainer.run()?;

    save_fitted(&trainer.into_fitted(), &args.out)?;

    info!("Done");
    Ok(())
}
