use crate::backend::{select_backend, MatrixBackend};
use crate::convergence::{ConvergenceMonitor, ConvergenceStatus};
use crate::data::DataContainer;
use crate::elbo::{self, ElboTerms};
use crate::error::Result;
use crate::model_spec::ModelSpec;
use crate::nodes::NodeGraph;
use crate::options::{ModelOptions, TrainOptions};
use crate::scheduler::UpdateScheduler;
use crate::variance::{variance_explained, VarianceExplained};

use indicatif::{ProgressBar, ProgressDrawTarget};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

/// Progress of a training run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrainingState {
    /// completed iterations
    pub iterations: usize,
    /// evaluated ELBO values
    pub elbo: Vec<f64>,
    /// iteration (0-based) of each ELBO value
    pub elbo_iterations: Vec<usize>,
    pub last_elbo: Option<ElboTerms>,
    /// original indices of the factors still in the model
    pub active_factors: Vec<usize>,
    /// number of factors after each iteration
    pub num_active_per_iter: Vec<usize>,
    pub status: ConvergenceStatus,
    pub elapsed_secs: f64,
}

/// Builds a model from data and options and drives the coordinate
/// ascent loop
pub struct Trainer {
    data: DataContainer,
    spec: ModelSpec,
    model_options: ModelOptions,
    train_options: TrainOptions,
    graph: NodeGraph,
    scheduler: UpdateScheduler,
    backend: Box<dyn MatrixBackend>,
    state: TrainingState,
    stop: Arc<AtomicBool>,
}

/// Outcome of a run, handed over to persistence
pub struct FittedModel {
    pub data: DataContainer,
    pub spec: ModelSpec,
    pub model_options: ModelOptions,
    pub train_options: TrainOptions,
    pub graph: NodeGraph,
    pub state: TrainingState,
    backend: Box<dyn MatrixBackend>,
}

impl Trainer {
    /// Validate the options against the data, open the requested
    /// backend and initialise the nodes
    pub fn build(
        data: DataContainer,
        model_options: ModelOptions,
        train_options: TrainOptions,
    ) -> Result<Self> {
        let (data, spec) = Self::prepare(data, &model_options, &train_options)?;
        let backend = select_backend(&train_options)?;
        Self::assemble(data, spec, model_options, train_options, backend)
    }

    /// Same as [`Trainer::build`] with a caller-supplied backend
    pub fn build_with_backend(
        data: DataContainer,
        model_options: ModelOptions,
        train_options: TrainOptions,
        backend: Box<dyn MatrixBackend>,
    ) -> Result<Self> {
        let (data, spec) = Self::prepare(data, &model_options, &train_options)?;
        Self::assemble(data, spec, model_options, train_options, backend)
    }

    fn prepare(
        data: DataContainer,
        model_options: &ModelOptions,
        train_options: &TrainOptions,
    ) -> Result<(DataContainer, ModelSpec)> {
        train_options.validate()?;

        let data = if model_options.views.is_some() || model_options.groups.is_some() {
            data.select(
                model_options.views.as_deref(),
                model_options.groups.as_deref(),
            )?
        } else {
            data
        };

        let spec = ModelSpec::new(&data, model_options)?;
        Ok((data, spec))
    }

    fn assemble(
        data: DataContainer,
        spec: ModelSpec,
        model_options: ModelOptions,
        train_options: TrainOptions,
        backend: Box<dyn MatrixBackend>,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(train_options.seed);
        let graph = NodeGraph::initialize(&data, &spec, train_options.init, &mut rng)?;
        let scheduler = UpdateScheduler::new(&spec);

        debug!("update order: {:?}", scheduler.order());

        let state = TrainingState {
            active_factors: graph.active_factors().to_vec(),
            ..Default::default()
        };

        Ok(Self {
            data,
            spec,
            model_options,
            train_options,
            graph,
            scheduler,
            backend,
            state,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A flag that ends the run at the next iteration boundary once set
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Iterate until convergence, the iteration budget, or a stop
    /// request
    ///
    /// A decreasing ELBO or a non-finite parameter aborts the run
    /// with a numerical error.
    pub fn run(&mut self) -> Result<&TrainingState> {
        if self.state.status != ConvergenceStatus::Running {
            return Ok(&self.state);
        }

        let Self {
            data,
            graph,
            scheduler,
            backend,
            state,
            stop,
            train_options: opts,
            ..
        } = self;
        let backend: &dyn MatrixBackend = &**backend;

        let timer = Instant::now();
        let mut monitor = ConvergenceMonitor::new(opts, stop.clone());

        let pb = ProgressBar::new(opts.iter as u64);
        if !opts.verbose {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        info!(
            "training {} factor(s) on the {} backend for at most {} iterations",
            graph.num_factors(),
            backend.name(),
            opts.iter
        );

        for iter in 0..opts.iter {
            if monitor.check_interrupt() != ConvergenceStatus::Running {
                info!("stopped at iteration {}", iter);
                break;
            }

            scheduler.sweep(graph, data, backend)?;
            state.iterations = iter + 1;

            let evaluate =
                opts.freq_elbo > 0 && (iter % opts.freq_elbo == 0 || iter + 1 == opts.iter);

            let elbo = if evaluate {
                let terms = elbo::evaluate(graph, data, backend)?;
                let total = terms.total;
                state.elbo.push(total);
                state.elbo_iterations.push(iter);
                state.last_elbo = Some(terms);
                if opts.verbose {
                    info!("[{}] ELBO: {:.4}, {} factor(s)", iter + 1, total, graph.num_factors());
                }
                Some(total)
            } else {
                None
            };

            let drop_r2 = opts.drop_r2;
            let status = monitor.step(iter, elbo, || match drop_r2 {
                Some(min_r2) => {
                    let dropped = graph.drop_factors_below(min_r2, data, backend)?;
                    if !dropped.is_empty() {
                        info!(
                            "dropped factor(s) {:?}, {} left",
                            dropped,
                            graph.num_factors()
                        );
                    }
                    Ok(!dropped.is_empty())
                }
                None => Ok(false),
            })?;

            state.active_factors = graph.active_factors().to_vec();
            state.num_active_per_iter.push(graph.num_factors());
            state.elapsed_secs = timer.elapsed().as_secs_f64();
            pb.inc(1);

            if status != ConvergenceStatus::Running {
                break;
            }
        }
        pb.finish_and_clear();

        state.status = match monitor.status() {
            ConvergenceStatus::Running => ConvergenceStatus::MaxIterReached,
            status => status,
        };
        state.elapsed_secs = timer.elapsed().as_secs_f64();

        info!(
            "{:?} after {} iteration(s), {:.2}s",
            state.status, state.iterations, state.elapsed_secs
        );
        Ok(state)
    }

    pub fn data(&self) -> &DataContainer {
        &self.data
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn into_fitted(self) -> FittedModel {
        FittedModel {
            data: self.data,
            spec: self.spec,
            model_options: self.model_options,
            train_options: self.train_options,
            graph: self.graph,
            state: self.state,
            backend: self.backend,
        }
    }
}

impl FittedModel {
    /// R2 of every (view, group) block, total and per factor
    pub fn variance_explained(&self) -> Result<VarianceExplained> {
        variance_explained(&self.graph, &self.data, &*self.backend)
    }

    /// names of the remaining factors, by original index
    pub fn factor_names(&self) -> Vec<Box<str>> {
        self.graph
            .active_factors()
            .iter()
            .map(|k| format!("factor_{}", k).into_boxed_str())
            .collect()
    }
}
