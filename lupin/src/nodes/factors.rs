use super::*;
use rayon::prelude::*;

/// Factors of every group, one factor at a time
///
/// prec = E[alpha_gk] + sum_m O_mg (tau_mg .* E[w_k^2])
/// mean = prec^-1 sum_m (R_mg (tau_mg .* E[w_k]) + E[z_k] .* O_mg (tau_mg .* E[w_k]^2))
///
/// Groups run in parallel; each worker owns the residuals of its group.
pub fn update_factors(
    graph: &mut NodeGraph,
    data: &DataContainer,
    backend: &dyn MatrixBackend,
) -> Result<()> {
    let NodeGraph {
        factors,
        loadings,
        precision,
        factor_ard,
        residuals,
        ..
    } = graph;

    let loadings: &[LoadingNode] = loadings;
    let precision: &[Vec<GammaMatrix>] = precision;
    let factor_ard = factor_ard.as_ref();

    let mut by_group = transpose_blocks(std::mem::take(residuals));

    let out = factors
        .par_iter_mut()
        .zip(by_group.par_iter_mut())
        .enumerate()
        .map(|(g, (z, r_g))| -> Result<()> {
            let nn = data.num_samples(g);
            let taus: Vec<Mat> = (0..loadings.len())
                .map(|m| expected_tau_column(&precision[m][g], data.num_features(m)))
                .collect();

            for k in 0..z.ncols() {
                let alpha = factor_ard.map_or(1.0, |a| a.posterior_mean()[(g, k)]);

                let mut prec = Mat::from_element(nn, 1, alpha);
                let mut num = Mat::zeros(nn, 1);
                let ez_old = column_of(z.posterior_mean(), k);

                for (m, w) in loadings.iter().enumerate() {
                    let mask = data.block(m, g).mask();
                    let ew = column_of(w.posterior_mean(), k);
                    let t_ew = taus[m].component_mul(&ew);
                    let t_ew2 = taus[m].component_mul(&column_of(w.second_moment(), k));
                    let t_ew_sq = t_ew.component_mul(&ew);

                    prec += backend.matmul(mask, &t_ew2)?;
                    num += backend.matmul(&r_g[m], &t_ew)?;
                    num += ez_old.component_mul(&backend.matmul(mask, &t_ew_sq)?);
                }

                z.update_stat_col(&num, &prec, k);
                z.calibrate_col(k);

                let delta = column_of(z.posterior_mean(), k) - ez_old;
                for (m, w) in loadings.iter().enumerate() {
                    let mask = data.block(m, g).mask();
                    let ew = column_of(w.posterior_mean(), k);
                    r_g[m] -= (&delta * ew.transpose()).component_mul(mask);
                }
            }
            Ok(())
        })
        .collect::<Result<Vec<()>>>();

    *residuals = transpose_blocks(by_group);
    out?;
    Ok(())
}
