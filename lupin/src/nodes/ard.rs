use super::*;

/// q(alpha^W_mk) = Gamma(a0 + D_m / 2, b0 + sum_d E[what_dk^2] / 2)
pub fn update_loading_ard(
    graph: &mut NodeGraph,
    _data: &DataContainer,
    backend: &dyn MatrixBackend,
) -> Result<()> {
    let NodeGraph {
        loadings,
        loading_ard,
        ..
    } = graph;

    let Some(ard) = loading_ard.as_mut() else {
        return Ok(());
    };

    let (nv, kk) = (ard.nrows(), ard.ncols());
    let mut shape = Mat::zeros(nv, kk);
    let mut rate = Mat::zeros(nv, kk);

    for (m, w) in loadings.iter().enumerate() {
        let ss = backend.column_sums(&w.slab_second_moment())?;
        let half_dim = 0.5 * w.nrows() as f64;
        for k in 0..kk {
            shape[(m, k)] = half_dim;
            rate[(m, k)] = 0.5 * ss[(0, k)];
        }
    }

    ard.update_stat(&shape, &rate);
    ard.calibrate();
    Ok(())
}

/// q(alpha^Z_gk) = Gamma(a0 + N_g / 2, b0 + sum_n E[z_nk^2] / 2)
pub fn update_factor_ard(
    graph: &mut NodeGraph,
    _data: &DataContainer,
    backend: &dyn MatrixBackend,
) -> Result<()> {
    let NodeGraph {
        factors,
        factor_ard,
        ..
    } = graph;

    let Some(ard) = factor_ard.as_mut() else {
        return Ok(());
    };

    let (ng, kk) = (ard.nrows(), ard.ncols());
    let mut shape = Mat::zeros(ng, kk);
    let mut rate = Mat::zeros(ng, kk);

    for (g, z) in factors.iter().enumerate() {
        let ss = backend.column_sums(&z.posterior_second_moment())?;
        let half_dim = 0.5 * z.nrows() as f64;
        for k in 0..kk {
            shape[(g, k)] = half_dim;
            rate[(g, k)] = 0.5 * ss[(0, k)];
        }
    }

    ard.update_stat(&shape, &rate);
    ard.calibrate();
    Ok(())
}
