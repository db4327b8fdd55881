use crate::backend::MatrixBackend;
use crate::data::DataContainer;
use crate::error::Result;
use crate::nodes::{column_of, NodeGraph};
use matrix_param::traits::Inference;
use nalgebra::DMatrix;

/// Fraction of the observed sum of squares explained in each
/// (view, group) block
#[derive(Clone, Debug)]
pub struct VarianceExplained {
    /// `M x G`, all factors together
    pub total: DMatrix<f64>,
    /// per view, `G x K`
    pub per_factor: Vec<DMatrix<f64>>,
}

impl VarianceExplained {
    /// largest R2 of each factor over all the blocks
    pub fn max_per_factor(&self) -> Vec<f64> {
        let kk = self.per_factor.first().map(|x| x.ncols()).unwrap_or(0);
        (0..kk)
            .map(|k| {
                self.per_factor
                    .iter()
                    .map(|r2| r2.column(k).iter().copied().fold(f64::NEG_INFINITY, f64::max))
                    .fold(f64::NEG_INFINITY, f64::max)
            })
            .collect()
    }

    /// sum of the total R2 over all blocks
    pub fn total_sum(&self) -> f64 {
        self.total.sum()
    }
}

/// R2 = 1 - SS(observed residual) / SS(observed data), where the
/// residual either uses every factor or factor `k` alone
pub fn variance_explained(
    graph: &NodeGraph,
    data: &DataContainer,
    backend: &dyn MatrixBackend,
) -> Result<VarianceExplained> {
    let (nv, ng, kk) = (data.num_views(), data.num_groups(), graph.num_factors());

    let mut total = DMatrix::zeros(nv, ng);
    let mut per_factor = vec![DMatrix::zeros(ng, kk); nv];

    for m in 0..nv {
        let ew = graph.loadings(m).posterior_mean();
        for g in 0..ng {
            let block = data.block(m, g);
            let ss = backend.sum_all(&backend.square(block.data())?)?;
            if ss <= 0.0 {
                continue;
            }
            let rss = backend.sum_all(&backend.square(graph.residual(m, g))?)?;
            total[(m, g)] = 1.0 - rss / ss;

            let ez = graph.factors(g).posterior_mean();
            for k in 0..kk {
                let fit = backend.matmul_nt(&column_of(ez, k), &column_of(ew, k))?;
                let res = backend.sub(block.data(), &backend.hadamard(block.mask(), &fit)?)?;
                let rss_k = backend.sum_all(&backend.square(&res)?)?;
                per_factor[m][(g, k)] = 1.0 - rss_k / ss;
            }
        }
    }

    Ok(VarianceExplained { total, per_factor })
}
