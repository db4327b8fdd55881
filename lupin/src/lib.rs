//! Multi-view, multi-group latent factor analysis by coordinate
//! ascent variational inference.
//!
//! Data blocks (one per view and group) share a set of latent factors
//! within each group; loadings are shared across the groups of a view.

pub mod backend;
pub mod convergence;
pub mod data;
pub mod elbo;
pub mod error;
pub mod input;
pub mod model_spec;
pub mod nodes;
pub mod options;
pub mod save;
pub mod scheduler;
pub mod simulate;
pub mod trainer;
pub mod variance;

pub use convergence::ConvergenceStatus;
pub use data::{DataContainer, LongRecord};
pub use error::{LupinError, Result};
pub use options::*;
pub use trainer::{FittedModel, Trainer, TrainingState};
