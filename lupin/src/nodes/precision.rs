use super::*;
use rayon::prelude::*;

/// Expected sum of squared residuals of each feature, `1 x D`
///
/// sum_n o_nd E[(y_nd - z_n' w_d)^2]
///   = colsum(R .* R) + rowsum((O' E[Z^2]) .* E[W^2])' - rowsum((O' E[Z]^2) .* E[W]^2)'
pub(crate) fn expected_ssr(
    mask: &Mat,
    residual: &Mat,
    z: &GaussianMatrix,
    w: &LoadingNode,
    backend: &dyn MatrixBackend,
) -> Result<Mat> {
    let rr = backend.column_sums(&backend.square(residual)?)?;

    let ez = z.posterior_mean();
    let ez2 = z.posterior_second_moment();
    let ez_sq = backend.square(ez)?;
    let ew_sq = backend.square(w.posterior_mean())?;

    let second = backend.hadamard(&backend.matmul_tn(mask, &ez2)?, w.second_moment())?;
    let first = backend.hadamard(&backend.matmul_tn(mask, &ez_sq)?, &ew_sq)?;
    let var_term = backend.row_sums(&backend.sub(&second, &first)?)?;

    Ok(rr + backend.transpose(&var_term)?)
}

/// Noise precision of every (view, group) block
///
/// shape = a0 + n_d / 2, rate = b0 + ssr_d / 2, or pooled over the
/// features of a block when the precision is shared
pub fn update_precision(
    graph: &mut NodeGraph,
    data: &DataContainer,
    backend: &dyn MatrixBackend,
) -> Result<()> {
    let NodeGraph {
        factors,
        loadings,
        precision,
        residuals,
        ..
    } = graph;

    let jobs: Vec<(usize, usize)> = (0..loadings.len())
        .flat_map(|m| (0..factors.len()).map(move |g| (m, g)))
        .collect();

    let factors: &[GaussianMatrix] = factors;
    let loadings: &[LoadingNode] = loadings;
    let residuals: &[Vec<Mat>] = residuals;

    let stats = jobs
        .par_iter()
        .map(|&(m, g)| -> Result<(Mat, Mat)> {
            let block = data.block(m, g);
            let ssr = expected_ssr(
                block.mask(),
                &residuals[m][g],
                &factors[g],
                &loadings[m],
                backend,
            )?;
            let nobs = Mat::from_iterator(
                1,
                ssr.ncols(),
                block.observed_per_feature().into_iter().map(|n| n as f64),
            );
            if precision[m][g].ncols() == 1 && ssr.ncols() != 1 {
                Ok((
                    Mat::from_element(1, 1, 0.5 * nobs.sum()),
                    Mat::from_element(1, 1, 0.5 * ssr.sum()),
                ))
            } else {
                Ok((nobs * 0.5, ssr * 0.5))
            }
        })
        .collect::<Result<Vec<_>>>()?;

    for (&(m, g), (a, b)) in jobs.iter().zip(stats) {
        let tau = &mut precision[m][g];
        tau.update_stat(&a, &b);
        tau.calibrate();
    }
    Ok(())
}
