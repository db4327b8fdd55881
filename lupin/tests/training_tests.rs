use lupin::backend::{CandleBackend, CpuBackend, Mat, MatrixBackend};
use lupin::simulate::{simulate_multiview, SimOptions};
use lupin::*;
use matrix_param::traits::Inference;

fn single_block(nn: usize, dd: usize) -> anyhow::Result<DataContainer> {
    let sim = simulate_multiview(&SimOptions {
        view_dims: vec![dd],
        group_dims: vec![nn],
        factors: 3,
        ..Default::default()
    })?;
    Ok(sim.to_container(&DataOptions::default())?)
}

fn multi_block(missing_fraction: f64) -> anyhow::Result<DataContainer> {
    let sim = simulate_multiview(&SimOptions {
        view_dims: vec![15, 10],
        group_dims: vec![40, 30],
        factors: 3,
        missing_fraction,
        seed: 7,
        ..Default::default()
    })?;
    Ok(sim.to_container(&DataOptions::default())?)
}

fn train_options(iter: usize) -> TrainOptions {
    TrainOptions {
        iter,
        freq_elbo: 1,
        start_elbo: 1,
        seed: 42,
        ..Default::default()
    }
}

fn assert_non_decreasing(elbo: &[f64]) {
    for w in elbo.windows(2) {
        assert!(
            w[1] >= w[0] - 1e-6 * w[0].abs().max(1.0),
            "ELBO went down: {} -> {}",
            w[0],
            w[1]
        );
    }
}

#[test]
fn single_view_single_group() -> anyhow::Result<()> {
    let data = single_block(100, 20)?;
    let model = ModelOptions {
        factors: 5,
        ..Default::default()
    };
    let mut trainer = Trainer::build(data, model, train_options(50))?;
    let state = trainer.run()?.clone();

    assert_eq!(state.status, ConvergenceStatus::MaxIterReached);
    assert_eq!(state.iterations, 50);
    assert_eq!(state.elbo.len(), 50);
    assert_non_decreasing(&state.elbo);

    let z = trainer.graph().factors(0).posterior_mean();
    assert_eq!(z.shape(), (100, 5));
    assert!(z.iter().all(|x| x.is_finite()));

    let last = state.last_elbo.as_ref().map(|t| t.total);
    assert_eq!(last, state.elbo.last().copied());
    Ok(())
}

#[test]
fn zero_factors_is_a_configuration_error() -> anyhow::Result<()> {
    let data = single_block(20, 5)?;
    let model = ModelOptions {
        factors: 0,
        ..Default::default()
    };
    let res = Trainer::build(data, model, train_options(10));
    assert!(matches!(res, Err(LupinError::Configuration(_))));
    Ok(())
}

#[test]
fn unknown_view_is_a_data_error() -> anyhow::Result<()> {
    let data = single_block(20, 5)?;
    let model = ModelOptions {
        factors: 2,
        views: Some(vec!["view_0".into(), "not_there".into()]),
        ..Default::default()
    };
    let res = Trainer::build(data, model, train_options(10));
    assert!(matches!(res, Err(LupinError::Data(_))));
    Ok(())
}

#[test]
fn invalid_train_options() -> anyhow::Result<()> {
    let data = single_block(20, 5)?;
    let opts = TrainOptions {
        drop_r2: Some(1.5),
        ..train_options(10)
    };
    let res = Trainer::build(data, ModelOptions::default(), opts);
    assert!(matches!(res, Err(LupinError::Configuration(_))));
    Ok(())
}

#[test]
fn same_seed_same_fit() -> anyhow::Result<()> {
    let fit = || -> anyhow::Result<(Vec<f64>, nalgebra::DMatrix<f64>)> {
        let model = ModelOptions {
            factors: 4,
            ..Default::default()
        };
        let mut trainer = Trainer::build(multi_block(0.1)?, model, train_options(20))?;
        let elbo = trainer.run()?.elbo.clone();
        Ok((elbo, trainer.graph().loadings(1).posterior_mean().clone()))
    };

    let (elbo_a, w_a) = fit()?;
    let (elbo_b, w_b) = fit()?;
    assert_eq!(elbo_a, elbo_b);
    assert_eq!(w_a, w_b);
    Ok(())
}

#[test]
fn cpu_and_candle_backends_agree() -> anyhow::Result<()> {
    let model = ModelOptions {
        factors: 3,
        ..Default::default()
    };

    let mut cpu = Trainer::build_with_backend(
        multi_block(0.1)?,
        model.clone(),
        train_options(10),
        Box::new(CpuBackend),
    )?;
    cpu.run()?;

    let mut candle = Trainer::build_with_backend(
        multi_block(0.1)?,
        model,
        train_options(10),
        Box::new(CandleBackend::new(candle_core::Device::Cpu)),
    )?;
    candle.run()?;
    assert_eq!(candle.backend_name(), "candle-cpu");

    let close = |a: &nalgebra::DMatrix<f64>, b: &nalgebra::DMatrix<f64>| {
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() <= 1e-4 * x.abs().max(1.0), "{} vs {}", x, y);
        }
    };

    for g in 0..2 {
        close(
            cpu.graph().factors(g).posterior_mean(),
            candle.graph().factors(g).posterior_mean(),
        );
    }
    for m in 0..2 {
        close(
            cpu.graph().loadings(m).posterior_mean(),
            candle.graph().loadings(m).posterior_mean(),
        );
    }
    Ok(())
}

#[test]
fn fast_mode_stops_no_later_than_slow() -> anyhow::Result<()> {
    let iterations = |mode| -> anyhow::Result<usize> {
        let model = ModelOptions {
            factors: 3,
            ..Default::default()
        };
        let opts = TrainOptions {
            convergence_mode: mode,
            ..train_options(300)
        };
        let mut trainer = Trainer::build(single_block(60, 12)?, model, opts)?;
        Ok(trainer.run()?.iterations)
    };
    assert!(iterations(ConvergenceMode::Fast)? <= iterations(ConvergenceMode::Slow)?);
    Ok(())
}

#[test]
fn pruning_removes_weak_factors() -> anyhow::Result<()> {
    let model = ModelOptions {
        factors: 4,
        ..Default::default()
    };

    let mut full = Trainer::build(multi_block(0.0)?, model.clone(), train_options(20))?;
    full.run()?;
    let full = full.into_fitted();

    let opts = TrainOptions {
        drop_r2: Some(0.99),
        ..train_options(20)
    };
    let mut pruned = Trainer::build(multi_block(0.0)?, model, opts)?;
    let state = pruned.run()?.clone();

    assert!(state.active_factors.len() < 4);
    for w in state.num_active_per_iter.windows(2) {
        assert!(w[1] <= w[0]);
    }
    assert_non_decreasing(&state.elbo[state.elbo.len().saturating_sub(2)..]);

    let pruned = pruned.into_fitted();
    assert_eq!(pruned.factor_names().len(), state.active_factors.len());
    assert!(
        pruned.variance_explained()?.total_sum() <= full.variance_explained()?.total_sum() + 1e-8
    );
    Ok(())
}

#[test]
fn gpu_mode_without_device() -> anyhow::Result<()> {
    let opts = TrainOptions {
        gpu_mode: true,
        gpu_fallback: false,
        ..train_options(5)
    };
    if let Err(e) = Trainer::build(single_block(20, 5)?, ModelOptions::default(), opts.clone()) {
        assert!(matches!(e, LupinError::BackendUnavailable(_)));

        let opts = TrainOptions {
            gpu_fallback: true,
            ..opts
        };
        let mut trainer = Trainer::build(single_block(20, 5)?, ModelOptions::default(), opts)?;
        assert_eq!(trainer.backend_name(), "cpu");
        trainer.run()?;
    }
    Ok(())
}

#[test]
fn stop_before_run() -> anyhow::Result<()> {
    let mut trainer = Trainer::build(single_block(20, 5)?, ModelOptions::default(), train_options(10))?;
    trainer
        .stop_handle()
        .store(true, std::sync::atomic::Ordering::Relaxed);
    let state = trainer.run()?;
    assert_eq!(state.status, ConvergenceStatus::ManuallyStopped);
    assert_eq!(state.iterations, 0);
    assert!(state.elbo.is_empty());
    Ok(())
}

#[test]
fn shared_noise_with_missing_entries() -> anyhow::Result<()> {
    let model = ModelOptions {
        factors: 3,
        noise_per_feature: false,
        ard_factors: true,
        ..Default::default()
    };
    let mut trainer = Trainer::build(multi_block(0.3)?, model, train_options(30))?;
    let state = trainer.run()?.clone();
    assert_non_decreasing(&state.elbo);

    assert_eq!(trainer.graph().precision(0, 1).posterior_mean().shape(), (1, 1));
    assert!(trainer.graph().factor_ard().is_some());
    assert_eq!(trainer.graph().factors(1).posterior_mean().shape(), (30, 3));
    Ok(())
}

#[test]
fn plain_gaussian_loadings() -> anyhow::Result<()> {
    let model = ModelOptions {
        factors: 3,
        ard_weights: false,
        spikeslab_weights: false,
        ..Default::default()
    };
    let mut trainer = Trainer::build(multi_block(0.0)?, model, train_options(30))?;
    let state = trainer.run()?.clone();
    assert_non_decreasing(&state.elbo);
    assert!(trainer.graph().loading_ard().is_none());
    assert!(trainer.graph().sparsity().is_none());
    Ok(())
}

#[test]
fn pca_initialisation() -> anyhow::Result<()> {
    let opts = TrainOptions {
        init: InitMethod::Pca,
        ..train_options(20)
    };
    let model = ModelOptions {
        factors: 3,
        ..Default::default()
    };
    let mut trainer = Trainer::build(multi_block(0.1)?, model, opts)?;
    let state = trainer.run()?.clone();
    assert_non_decreasing(&state.elbo);
    Ok(())
}

#[test]
fn no_elbo_evaluation() -> anyhow::Result<()> {
    let opts = TrainOptions {
        freq_elbo: 0,
        drop_r2: Some(0.99),
        ..train_options(15)
    };
    let model = ModelOptions {
        factors: 4,
        ..Default::default()
    };
    let mut trainer = Trainer::build(multi_block(0.0)?, model, opts)?;
    let state = trainer.run()?;

    assert_eq!(state.status, ConvergenceStatus::MaxIterReached);
    assert_eq!(state.iterations, 15);
    assert!(state.elbo.is_empty());
    assert!(state.elbo_iterations.is_empty());
    assert!(state.last_elbo.is_none());
    assert_eq!(state.active_factors, vec![0, 1, 2, 3]);
    Ok(())
}

#[test]
fn last_iteration_is_always_evaluated() -> anyhow::Result<()> {
    let opts = TrainOptions {
        freq_elbo: 5,
        start_elbo: 100,
        ..train_options(23)
    };
    let model = ModelOptions {
        factors: 3,
        ..Default::default()
    };
    let mut trainer = Trainer::build(multi_block(0.1)?, model, opts)?;
    let state = trainer.run()?;

    assert_eq!(state.status, ConvergenceStatus::MaxIterReached);
    assert_eq!(state.elbo_iterations, vec![0, 5, 10, 15, 20, 22]);
    assert_eq!(state.elbo.len(), 6);
    assert_non_decreasing(&state.elbo);
    Ok(())
}

#[test]
fn timeout_stops_between_iterations() -> anyhow::Result<()> {
    let opts = TrainOptions {
        timeout: Some(1e-9),
        convergence_mode: ConvergenceMode::Slow,
        ..train_options(10_000)
    };
    let model = ModelOptions {
        factors: 3,
        ..Default::default()
    };
    let mut trainer = Trainer::build(single_block(30, 8)?, model, opts)?;
    let state = trainer.run()?;

    assert_eq!(state.status, ConvergenceStatus::ManuallyStopped);
    assert!(state.iterations < 10_000);
    assert_eq!(state.num_active_per_iter.len(), state.iterations);
    assert_eq!(state.elbo.len(), state.iterations);
    assert_eq!(state.elbo_iterations.len(), state.elbo.len());
    Ok(())
}

/// Host products, except that `a * b` comes back as NaN
struct NanProducts;

impl MatrixBackend for NanProducts {
    fn name(&self) -> &str {
        "nan"
    }
    fn matmul(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        Ok(Mat::from_element(a.nrows(), b.ncols(), f64::NAN))
    }
    fn matmul_tn(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        CpuBackend.matmul_tn(a, b)
    }
    fn matmul_nt(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        CpuBackend.matmul_nt(a, b)
    }
    fn hadamard(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        CpuBackend.hadamard(a, b)
    }
    fn sub(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        CpuBackend.sub(a, b)
    }
    fn square(&self, a: &Mat) -> Result<Mat> {
        CpuBackend.square(a)
    }
    fn transpose(&self, a: &Mat) -> Result<Mat> {
        CpuBackend.transpose(a)
    }
    fn column_sums(&self, a: &Mat) -> Result<Mat> {
        CpuBackend.column_sums(a)
    }
    fn row_sums(&self, a: &Mat) -> Result<Mat> {
        CpuBackend.row_sums(a)
    }
    fn sum_all(&self, a: &Mat) -> Result<f64> {
        CpuBackend.sum_all(a)
    }
}

#[test]
fn non_finite_parameters_abort_the_run() -> anyhow::Result<()> {
    let model = ModelOptions {
        factors: 2,
        ..Default::default()
    };
    let mut trainer = Trainer::build_with_backend(
        single_block(20, 5)?,
        model,
        train_options(10),
        Box::new(NanProducts),
    )?;
    assert!(matches!(trainer.run(), Err(LupinError::Numerical(_))));
    Ok(())
}

#[test]
fn single_precision_keeps_residuals_exact() -> anyhow::Result<()> {
    let opts = TrainOptions {
        freq_elbo: 0,
        ..train_options(15)
    };
    let model = ModelOptions {
        factors: 3,
        ..Default::default()
    };
    let mut trainer = Trainer::build_with_backend(
        multi_block(0.2)?,
        model,
        opts,
        Box::new(CandleBackend::with_dtype(
            candle_core::Device::Cpu,
            candle_core::DType::F32,
        )),
    )?;
    assert_eq!(trainer.backend_name(), "candle-cpu-f32");
    trainer.run()?;

    let (data, graph) = (trainer.data(), trainer.graph());
    for m in 0..2 {
        for g in 0..2 {
            let block = data.block(m, g);
            let fit = graph.factors(g).posterior_mean()
                * graph.loadings(m).posterior_mean().transpose();
            let expected = (block.data() - fit).component_mul(block.mask());
            for (x, y) in graph.residual(m, g).iter().zip(expected.iter()) {
                assert!((x - y).abs() <= 1e-9 * y.abs().max(1.0), "{} vs {}", x, y);
            }
        }
    }
    Ok(())
}

#[test]
fn factor_term_of_the_elbo() -> anyhow::Result<()> {
    let model = ModelOptions {
        factors: 3,
        ard_factors: false,
        ..Default::default()
    };
    let mut trainer = Trainer::build(multi_block(0.1)?, model, train_options(5))?;
    let state = trainer.run()?.clone();
    let terms = state.last_elbo.as_ref().map(|t| t.factors);

    // unit prior: E[log N(z | 0, 1)] + H[N(mu, v)] = 0.5 (1 + ln v - mu^2 - v)
    let mut expected = 0.0;
    for g in 0..2 {
        let z = trainer.graph().factors(g);
        for (mu, v) in z.posterior_mean().iter().zip(z.posterior_var().iter()) {
            expected += 0.5 * (1.0 + v.ln() - mu * mu - v);
        }
    }
    let terms = terms.ok_or_else(|| anyhow::anyhow!("no ELBO"))?;
    approx::assert_relative_eq!(terms, expected, max_relative = 1e-10);
    Ok(())
}
