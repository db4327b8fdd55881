use crate::options::{ModelOptions, TrainOptions};
use crate::trainer::{FittedModel, TrainingState};
use log::info;
use matrix_param::io::ParamIo;
use matrix_util::common_io::{mkdir, open_buf_writer, write_lines};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Content of `{out}.training.json`
#[derive(Serialize, Deserialize, Debug)]
pub struct TrainingSummary {
    pub views: Vec<Box<str>>,
    pub groups: Vec<Box<str>>,
    pub factors: Vec<Box<str>>,
    pub model_options: ModelOptions,
    pub train_options: TrainOptions,
    pub state: TrainingState,
}

///
/// Write a fitted model under the prefix `out`
///
/// * `{out}.factors.{group}.{mean,sd}.parquet` - samples x factors
/// * `{out}.loadings.{view}.{mean,sd}.parquet` - features x factors
/// * `{out}.r2.tsv.gz` - variance explained per view, group and factor
/// * `{out}.elbo.tsv.gz` - ELBO trace
/// * `{out}.training.json` - options and training state
///
pub fn save_fitted(fitted: &FittedModel, out: &str) -> anyhow::Result<()> {
    mkdir(out)?;

    let data = &fitted.data;
    let factor_names = fitted.factor_names();

    for (g, group) in data.group_names().iter().enumerate() {
        fitted.graph.factors(g).to_parquet(
            Some(data.sample_names(g)),
            Some(&factor_names),
            &format!("{}.factors.{}", out, group),
        )?;
    }

    for (m, view) in data.view_names().iter().enumerate() {
        fitted.graph.loadings(m).to_parquet(
            Some(data.feature_names(m)),
            Some(&factor_names),
            &format!("{}.loadings.{}", out, view),
        )?;
    }

    let r2 = fitted.variance_explained()?;
    let mut lines: Vec<Box<str>> = vec!["view\tgroup\tfactor\tr2".into()];
    for (m, view) in data.view_names().iter().enumerate() {
        for (g, group) in data.group_names().iter().enumerate() {
            lines.push(format!("{}\t{}\ttotal\t{}", view, group, r2.total[(m, g)]).into());
            for (k, factor) in factor_names.iter().enumerate() {
                lines.push(
                    format!("{}\t{}\t{}\t{}", view, group, factor, r2.per_factor[m][(g, k)])
                        .into(),
                );
            }
        }
    }
    write_lines(&lines, &format!("{}.r2.tsv.gz", out))?;

    let state = &fitted.state;
    let mut lines: Vec<Box<str>> = vec!["iteration\telbo".into()];
    lines.extend(
        state
            .elbo_iterations
            .iter()
            .zip(state.elbo.iter())
            .map(|(i, e)| format!("{}\t{}", i, e).into_boxed_str()),
    );
    write_lines(&lines, &format!("{}.elbo.tsv.gz", out))?;

    let summary = TrainingSummary {
        views: data.view_names().to_vec(),
        groups: data.group_names().to_vec(),
        factors: factor_names,
        model_options: fitted.model_options.clone(),
        train_options: fitted.train_options.clone(),
        state: state.clone(),
    };
    let json_file = format!("{}.training.json", out);
    let mut writer = open_buf_writer(&json_file)?;
    serde_json::to_writer_pretty(&mut writer, &summary)?;
    writer.flush()?;

    info!("saved the fitted model to {}.*", out);
    Ok(())
}
