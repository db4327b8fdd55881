use crate::backend::MatrixBackend;
use crate::data::DataContainer;
use crate::error::Result;
use crate::model_spec::ModelSpec;
use crate::nodes::{NodeGraph, NodeKind};

/// One coordinate ascent sweep over the nodes of a model
///
/// Nodes are visited in [`NodeKind::SCHEDULE`] order, skipping those
/// the model doesn't carry, so every update reads the latest state of
/// the nodes before it and last sweep's state of the nodes after it.
pub struct UpdateScheduler {
    order: Vec<NodeKind>,
}

impl UpdateScheduler {
    pub fn new(spec: &ModelSpec) -> Self {
        Self {
            order: NodeKind::SCHEDULE
                .into_iter()
                .filter(|kind| kind.is_present(spec))
                .collect(),
        }
    }

    pub fn order(&self) -> &[NodeKind] {
        &self.order
    }

    pub fn sweep(
        &self,
        graph: &mut NodeGraph,
        data: &DataContainer,
        backend: &dyn MatrixBackend,
    ) -> Result<()> {
        for kind in self.order.iter() {
            (kind.update_fn())(graph, data, backend)?;
        }
        graph.check_finite()
    }
}
