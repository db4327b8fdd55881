use lupin::input::read_long_table;
use lupin::save::{save_fitted, TrainingSummary};
use lupin::simulate::{simulate_multiview, SimOptions};
use lupin::*;
use matrix_util::common_io::write_lines;

fn simulated() -> anyhow::Result<lupin::simulate::SimulatedData> {
    Ok(simulate_multiview(&SimOptions {
        view_dims: vec![8, 6],
        group_dims: vec![25, 15],
        factors: 2,
        missing_fraction: 0.1,
        ..Default::default()
    })?)
}

#[test]
fn long_table_to_fit() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("data.tsv.gz");
    let file = file.to_str().ok_or_else(|| anyhow::anyhow!("path"))?;

    let sim = simulated()?;
    let mut lines: Vec<Box<str>> = vec!["view\tgroup\tsample\tfeature\tvalue".into()];
    lines.extend(sim.to_long_records().into_iter().map(|r| {
        format!("{}\t{}\t{}\t{}\t{}", r.view, r.group, r.sample, r.feature, r.value)
            .into_boxed_str()
    }));
    write_lines(&lines, file)?;

    let records = read_long_table(file)?;
    assert_eq!(records.len(), lines.len() - 1);

    let data = DataContainer::from_long_table(&records, &DataOptions::default())?;
    assert_eq!(data.num_views(), 2);
    assert_eq!(data.num_groups(), 2);
    assert_eq!(data.num_features(0), 8);
    assert_eq!(data.num_samples(1), 15);

    let model = ModelOptions {
        factors: 2,
        ..Default::default()
    };
    let opts = TrainOptions {
        iter: 10,
        ..Default::default()
    };
    let mut trainer = Trainer::build(data, model, opts)?;
    trainer.run()?;
    Ok(())
}

#[test]
fn save_fitted_model() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("fit");
    let out = out.to_str().ok_or_else(|| anyhow::anyhow!("path"))?;

    let sim = simulated()?;
    let data = sim.to_container(&DataOptions::default())?;
    let model = ModelOptions {
        factors: 2,
        ..Default::default()
    };
    let opts = TrainOptions {
        iter: 10,
        ..Default::default()
    };
    let mut trainer = Trainer::build(data, model, opts)?;
    trainer.run()?;
    let fitted = trainer.into_fitted();
    save_fitted(&fitted, out)?;

    for suffix in [
        "factors.group_0.mean.parquet",
        "factors.group_1.sd.parquet",
        "loadings.view_0.mean.parquet",
        "loadings.view_1.sd.parquet",
        "r2.tsv.gz",
        "elbo.tsv.gz",
        "training.json",
    ] {
        let file = format!("{}.{}", out, suffix);
        assert!(std::path::Path::new(&file).exists(), "{} is missing", file);
    }

    let json = std::fs::read_to_string(format!("{}.training.json", out))?;
    let summary: TrainingSummary = serde_json::from_str(&json)?;
    assert_eq!(summary.state.iterations, fitted.state.iterations);
    assert_eq!(summary.state.elbo.len(), fitted.state.elbo.len());
    for (a, b) in summary.state.elbo.iter().zip(fitted.state.elbo.iter()) {
        approx::assert_relative_eq!(*a, *b, max_relative = 1e-12);
    }
    assert_eq!(summary.views.len(), 2);
    assert_eq!(summary.factors.len(), fitted.graph.num_factors());
    Ok(())
}
