use super::*;

/// q(theta_mk) = Beta(a0 + sum_d gamma_dk, b0 + sum_d (1 - gamma_dk))
pub fn update_sparsity(
    graph: &mut NodeGraph,
    _data: &DataContainer,
    backend: &dyn MatrixBackend,
) -> Result<()> {
    let NodeGraph {
        loadings,
        sparsity,
        ..
    } = graph;

    let Some(theta) = sparsity.as_mut() else {
        return Ok(());
    };

    let (nv, kk) = (theta.nrows(), theta.ncols());
    let mut on = Mat::zeros(nv, kk);
    let mut off = Mat::zeros(nv, kk);

    for (m, w) in loadings.iter().enumerate() {
        let included = backend.column_sums(w.inclusion())?;
        let dd = w.nrows() as f64;
        for k in 0..kk {
            on[(m, k)] = included[(0, k)];
            off[(m, k)] = dd - included[(0, k)];
        }
    }

    theta.update_stat(&on, &off);
    theta.calibrate();
    Ok(())
}
