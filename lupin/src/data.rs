use crate::error::{LupinError, Result};
use crate::options::DataOptions;
use log::info;
use nalgebra::DMatrix;
use std::collections::HashMap;

/// One row of a tidy long-form table
#[derive(Clone, Debug, PartialEq)]
pub struct LongRecord {
    pub view: Box<str>,
    pub group: Box<str>,
    pub sample: Box<str>,
    pub feature: Box<str>,
    /// non-finite values are missing
    pub value: f64,
}

/// Samples x features block of one (view, group) pair
///
/// Missing entries are zero-filled in `data` and flagged 0 in `mask`
#[derive(Clone, Debug)]
pub struct DataBlock {
    data: DMatrix<f64>,
    mask: DMatrix<f64>,
    num_observed: usize,
}

impl DataBlock {
    /// Non-finite entries of `y` are treated as missing
    pub fn from_matrix(y: &DMatrix<f64>) -> Self {
        let mask = y.map(|x| if x.is_finite() { 1.0 } else { 0.0 });
        let data = y.map(|x| if x.is_finite() { x } else { 0.0 });
        let num_observed = mask.iter().filter(|&&o| o > 0.0).count();
        Self {
            data,
            mask,
            num_observed,
        }
    }

    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn mask(&self) -> &DMatrix<f64> {
        &self.mask
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn num_observed(&self) -> usize {
        self.num_observed
    }

    /// Number of observed samples of each feature
    pub fn observed_per_feature(&self) -> Vec<usize> {
        self.mask
            .column_iter()
            .map(|o| o.iter().filter(|&&x| x > 0.0).count())
            .collect()
    }

    /// Sum of squares over the observed entries
    pub fn observed_sum_squares(&self) -> f64 {
        self.data.iter().map(|x| x * x).sum()
    }

    /// Variance of the observed entries of each feature; `None` with
    /// fewer than two observations
    pub fn observed_feature_variances(&self) -> Vec<Option<f64>> {
        self.data
            .column_iter()
            .zip(self.mask.column_iter())
            .map(|(y, o)| {
                let n = o.sum();
                if n < 2.0 {
                    return None;
                }
                let mu = y.dot(&o) / n;
                let ss = y
                    .iter()
                    .zip(o.iter())
                    .map(|(&y, &o)| o * (y - mu) * (y - mu))
                    .sum::<f64>();
                Some(ss / (n - 1.0))
            })
            .collect()
    }

    /// Variance of all observed entries pooled
    pub fn observed_variance(&self) -> Option<f64> {
        let n = self.num_observed as f64;
        if n < 2.0 {
            return None;
        }
        let mu = self.data.sum() / n;
        let ss = self
            .data
            .iter()
            .zip(self.mask.iter())
            .map(|(&y, &o)| o * (y - mu) * (y - mu))
            .sum::<f64>();
        Some(ss / (n - 1.0))
    }

    fn center_columns(&mut self) {
        for (mut y, o) in self.data.column_iter_mut().zip(self.mask.column_iter()) {
            let n = o.sum();
            if n > 0.0 {
                let mu = y.dot(&o) / n;
                y.zip_apply(&o, |y, o| *y = o * (*y - mu));
            }
        }
    }

    fn scale(&mut self, factor: f64) {
        self.data /= factor;
    }
}

/// Per-(view, group) data matrices with names and missing masks
#[derive(Clone, Debug)]
pub struct DataContainer {
    view_names: Vec<Box<str>>,
    group_names: Vec<Box<str>>,
    feature_names: Vec<Vec<Box<str>>>,
    sample_names: Vec<Vec<Box<str>>>,
    /// `blocks[m][g]`
    blocks: Vec<Vec<DataBlock>>,
}

fn default_names(prefix: &str, n: usize) -> Vec<Box<str>> {
    (0..n)
        .map(|i| format!("{}_{}", prefix, i).into_boxed_str())
        .collect()
}

impl DataContainer {
    /// Build from pre-shaped matrices, `blocks[m][g]` of size `N_g x D_m`
    ///
    /// Feature and sample names default to `{view}_{d}` and `{group}_{n}`
    pub fn from_matrices(
        blocks: &[Vec<DMatrix<f64>>],
        view_names: &[Box<str>],
        group_names: &[Box<str>],
        options: &DataOptions,
    ) -> Result<Self> {
        let (num_views, num_groups) = check_shapes(blocks)?;

        if view_names.len() != num_views || group_names.len() != num_groups {
            return Err(LupinError::Configuration(format!(
                "{} view names and {} group names for {} x {} blocks",
                view_names.len(),
                group_names.len(),
                num_views,
                num_groups
            )));
        }

        let feature_names = (0..num_views)
            .map(|m| default_names(&view_names[m], blocks[m][0].ncols()))
            .collect();
        let sample_names = (0..num_groups)
            .map(|g| default_names(&group_names[g], blocks[0][g].nrows()))
            .collect();

        let blocks = blocks
            .iter()
            .map(|row| row.iter().map(DataBlock::from_matrix).collect())
            .collect();

        Self::new(
            blocks,
            view_names.to_vec(),
            group_names.to_vec(),
            feature_names,
            sample_names,
            options,
        )
    }

    /// Build from a long-form table; order of first appearance fixes
    /// the order of views, groups, samples and features
    pub fn from_long_table(records: &[LongRecord], options: &DataOptions) -> Result<Self> {
        if records.is_empty() {
            return Err(LupinError::Configuration("empty data table".into()));
        }

        let mut views = NameIndex::default();
        let mut groups = NameIndex::default();
        let mut features: Vec<NameIndex> = vec![];
        let mut samples: Vec<NameIndex> = vec![];

        let mut cells = Vec::with_capacity(records.len());
        for rec in records {
            let m = views.index(&rec.view);
            let g = groups.index(&rec.group);
            if m == features.len() {
                features.push(NameIndex::default());
            }
            if g == samples.len() {
                samples.push(NameIndex::default());
            }
            let d = features[m].index(&rec.feature);
            let n = samples[g].index(&rec.sample);
            cells.push((m, g, n, d, rec.value));
        }

        let mut ymat: Vec<Vec<DMatrix<f64>>> = (0..views.len())
            .map(|m| {
                (0..groups.len())
                    .map(|g| DMatrix::from_element(samples[g].len(), features[m].len(), f64::NAN))
                    .collect()
            })
            .collect();

        let mut seen: Vec<Vec<DMatrix<bool>>> = ymat
            .iter()
            .map(|row| {
                row.iter()
                    .map(|y| DMatrix::from_element(y.nrows(), y.ncols(), false))
                    .collect()
            })
            .collect();

        for (m, g, n, d, value) in cells {
            if seen[m][g][(n, d)] {
                return Err(LupinError::Data(format!(
                    "duplicate entry: view {}, group {}, sample {}, feature {}",
                    views.names[m], groups.names[g], samples[g].names[n], features[m].names[d]
                )));
            }
            seen[m][g][(n, d)] = true;
            ymat[m][g][(n, d)] = value;
        }

        let blocks = ymat
            .iter()
            .map(|row| row.iter().map(DataBlock::from_matrix).collect())
            .collect();

        Self::new(
            blocks,
            views.names,
            groups.names,
            features.into_iter().map(|x| x.names).collect(),
            samples.into_iter().map(|x| x.names).collect(),
            options,
        )
    }

    fn new(
        mut blocks: Vec<Vec<DataBlock>>,
        view_names: Vec<Box<str>>,
        group_names: Vec<Box<str>>,
        feature_names: Vec<Vec<Box<str>>>,
        sample_names: Vec<Vec<Box<str>>>,
        options: &DataOptions,
    ) -> Result<Self> {
        if options.center_groups {
            blocks
                .iter_mut()
                .flat_map(|row| row.iter_mut())
                .for_each(|b| b.center_columns());
        }

        if options.scale_views {
            for row in blocks.iter_mut() {
                let (s, ss, n) = row.iter().fold((0.0, 0.0, 0usize), |(s, ss, n), b| {
                    (
                        s + b.data().sum(),
                        ss + b.observed_sum_squares(),
                        n + b.num_observed(),
                    )
                });
                if n > 1 {
                    let n = n as f64;
                    let var = (ss - s * s / n) / (n - 1.0);
                    if var > 0.0 {
                        let sd = var.sqrt();
                        row.iter_mut().for_each(|b| b.scale(sd));
                    }
                }
            }
        }

        if options.scale_groups {
            for b in blocks.iter_mut().flat_map(|row| row.iter_mut()) {
                if let Some(sd) = b.observed_variance().map(f64::sqrt) {
                    if sd > 0.0 {
                        b.scale(sd);
                    }
                }
            }
        }

        let ret = Self {
            view_names,
            group_names,
            feature_names,
            sample_names,
            blocks,
        };
        ret.check_observed()?;

        info!(
            "{} view(s) x {} group(s), {} samples, {} features",
            ret.num_views(),
            ret.num_groups(),
            ret.total_samples(),
            (0..ret.num_views()).map(|m| ret.num_features(m)).sum::<usize>()
        );
        Ok(ret)
    }

    fn check_observed(&self) -> Result<()> {
        for (m, row) in self.blocks.iter().enumerate() {
            if row.iter().all(|b| b.num_observed() == 0) {
                return Err(LupinError::Data(format!(
                    "view {} has no observed entries",
                    self.view_names[m]
                )));
            }
        }
        Ok(())
    }

    /// Restrict to the named views and groups (in the given order)
    pub fn select(&self, views: Option<&[Box<str>]>, groups: Option<&[Box<str>]>) -> Result<Self> {
        let view_idx = match views {
            Some(names) => lookup(&self.view_names, names, "view")?,
            None => (0..self.num_views()).collect(),
        };
        let group_idx = match groups {
            Some(names) => lookup(&self.group_names, names, "group")?,
            None => (0..self.num_groups()).collect(),
        };

        if view_idx.is_empty() || group_idx.is_empty() {
            return Err(LupinError::Configuration(
                "no views or no groups selected".into(),
            ));
        }

        let ret = Self {
            view_names: view_idx.iter().map(|&m| self.view_names[m].clone()).collect(),
            group_names: group_idx.iter().map(|&g| self.group_names[g].clone()).collect(),
            feature_names: view_idx
                .iter()
                .map(|&m| self.feature_names[m].clone())
                .collect(),
            sample_names: group_idx
                .iter()
                .map(|&g| self.sample_names[g].clone())
                .collect(),
            blocks: view_idx
                .iter()
                .map(|&m| {
                    group_idx
                        .iter()
                        .map(|&g| self.blocks[m][g].clone())
                        .collect()
                })
                .collect(),
        };
        ret.check_observed()?;
        Ok(ret)
    }

    pub fn num_views(&self) -> usize {
        self.view_names.len()
    }

    pub fn num_groups(&self) -> usize {
        self.group_names.len()
    }

    /// D_m
    pub fn num_features(&self, m: usize) -> usize {
        self.feature_names[m].len()
    }

    /// N_g
    pub fn num_samples(&self, g: usize) -> usize {
        self.sample_names[g].len()
    }

    pub fn total_samples(&self) -> usize {
        self.sample_names.iter().map(|x| x.len()).sum()
    }

    pub fn block(&self, m: usize, g: usize) -> &DataBlock {
        &self.blocks[m][g]
    }

    pub fn view_names(&self) -> &[Box<str>] {
        &self.view_names
    }

    pub fn group_names(&self) -> &[Box<str>] {
        &self.group_names
    }

    pub fn feature_names(&self, m: usize) -> &[Box<str>] {
        &self.feature_names[m]
    }

    pub fn sample_names(&self, g: usize) -> &[Box<str>] {
        &self.sample_names[g]
    }
}

/// Returns (M, G) after checking that every group has the same number
/// of rows in every view and every view the same number of columns in
/// every group
fn check_shapes(blocks: &[Vec<DMatrix<f64>>]) -> Result<(usize, usize)> {
    let num_views = blocks.len();
    if num_views == 0 {
        return Err(LupinError::Configuration("no views".into()));
    }
    let num_groups = blocks[0].len();
    if num_groups == 0 {
        return Err(LupinError::Configuration("no groups".into()));
    }

    for (m, row) in blocks.iter().enumerate() {
        if row.len() != num_groups {
            return Err(LupinError::Configuration(format!(
                "view #{} has {} groups, expected {}",
                m,
                row.len(),
                num_groups
            )));
        }
        let ncols = row[0].ncols();
        if ncols == 0 {
            return Err(LupinError::Configuration(format!(
                "view #{} has no features",
                m
            )));
        }
        for (g, y) in row.iter().enumerate() {
            if y.ncols() != ncols {
                return Err(LupinError::Configuration(format!(
                    "view #{}: {} features in group #{}, {} in group #0",
                    m,
                    y.ncols(),
                    g,
                    ncols
                )));
            }
            let nrows = blocks[0][g].nrows();
            if nrows == 0 {
                return Err(LupinError::Configuration(format!(
                    "group #{} has no samples",
                    g
                )));
            }
            if y.nrows() != nrows {
                return Err(LupinError::Configuration(format!(
                    "group #{}: {} samples in view #{}, {} in view #0",
                    g,
                    y.nrows(),
                    m,
                    nrows
                )));
            }
        }
    }
    Ok((num_views, num_groups))
}

fn lookup(names: &[Box<str>], query: &[Box<str>], what: &str) -> Result<Vec<usize>> {
    query
        .iter()
        .map(|q| {
            names
                .iter()
                .position(|x| x == q)
                .ok_or_else(|| LupinError::Data(format!("{} {} is not in the data", what, q)))
        })
        .collect()
}

#[derive(Default)]
struct NameIndex {
    names: Vec<Box<str>>,
    index: HashMap<Box<str>, usize>,
}

impl NameIndex {
    fn index(&mut self, name: &str) -> usize {
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        let i = self.names.len();
        self.names.push(name.into());
        self.index.insert(name.into(), i);
        i
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn names(xs: &[&str]) -> Vec<Box<str>> {
        xs.iter().map(|&x| x.into()).collect()
    }

    #[test]
    fn centering_skips_missing() -> Result<()> {
        let y = DMatrix::from_row_slice(3, 2, &[1.0, 10.0, 3.0, f64::NAN, 5.0, 20.0]);
        let data = DataContainer::from_matrices(
            &[vec![y]],
            &names(&["rna"]),
            &names(&["all"]),
            &DataOptions::default(),
        )?;
        let block = data.block(0, 0);
        assert_eq!(block.num_observed(), 5);
        assert_abs_diff_eq!(block.data()[(0, 0)], -2.0);
        assert_abs_diff_eq!(block.data()[(0, 1)], -5.0);
        assert_abs_diff_eq!(block.data()[(1, 1)], 0.0);
        assert_abs_diff_eq!(block.mask()[(1, 1)], 0.0);
        assert_eq!(block.observed_per_feature(), vec![3, 2]);
        Ok(())
    }

    #[test]
    fn scale_views_by_pooled_sd() -> Result<()> {
        let blocks = vec![vec![
            DMatrix::from_row_slice(2, 1, &[1.0, 3.0]),
            DMatrix::from_row_slice(3, 1, &[5.0, f64::NAN, 7.0]),
        ]];
        let opts = DataOptions {
            center_groups: false,
            scale_views: true,
            scale_groups: false,
        };
        let data =
            DataContainer::from_matrices(&blocks, &names(&["rna"]), &names(&["x", "y"]), &opts)?;
        // 1, 3, 5, 7 around their mean 4
        let sd = (20.0_f64 / 3.0).sqrt();
        assert_abs_diff_eq!(data.block(0, 0).data()[(0, 0)], 1.0 / sd, epsilon = 1e-12);
        assert_abs_diff_eq!(data.block(0, 1).data()[(2, 0)], 7.0 / sd, epsilon = 1e-12);
        assert_abs_diff_eq!(data.block(0, 1).data()[(1, 0)], 0.0);
        Ok(())
    }

    #[test]
    fn inconsistent_shapes() {
        let blocks = vec![
            vec![DMatrix::zeros(4, 3), DMatrix::zeros(5, 3)],
            vec![DMatrix::zeros(4, 2), DMatrix::zeros(6, 2)],
        ];
        let out = DataContainer::from_matrices(
            &blocks,
            &names(&["a", "b"]),
            &names(&["x", "y"]),
            &DataOptions::default(),
        );
        assert!(matches!(out, Err(LupinError::Configuration(_))));
    }

    #[test]
    fn unobserved_view() {
        let blocks = vec![
            vec![DMatrix::from_element(3, 2, 1.0)],
            vec![DMatrix::from_element(3, 2, f64::NAN)],
        ];
        let out = DataContainer::from_matrices(
            &blocks,
            &names(&["a", "b"]),
            &names(&["x"]),
            &DataOptions::default(),
        );
        assert!(matches!(out, Err(LupinError::Data(_))));
    }

    #[test]
    fn long_table_order_and_duplicates() -> Result<()> {
        let rec = |v: &str, g: &str, s: &str, f: &str, x: f64| LongRecord {
            view: v.into(),
            group: g.into(),
            sample: s.into(),
            feature: f.into(),
            value: x,
        };
        let records = vec![
            rec("rna", "g1", "s1", "f1", 1.0),
            rec("rna", "g1", "s2", "f1", 2.0),
            rec("atac", "g1", "s1", "p1", 3.0),
            rec("rna", "g2", "s3", "f2", 4.0),
        ];
        let opts = DataOptions {
            center_groups: false,
            ..Default::default()
        };
        let data = DataContainer::from_long_table(&records, &opts)?;
        assert_eq!(data.view_names(), &names(&["rna", "atac"])[..]);
        assert_eq!(data.group_names(), &names(&["g1", "g2"])[..]);
        assert_eq!(data.num_samples(0), 2);
        assert_eq!(data.num_features(0), 2);
        assert_abs_diff_eq!(data.block(0, 0).data()[(1, 0)], 2.0);
        assert_eq!(data.block(0, 0).mask()[(0, 1)], 0.0);
        assert_eq!(data.block(1, 1).num_observed(), 0);

        let mut dup = records.clone();
        dup.push(rec("rna", "g1", "s1", "f1", 5.0));
        assert!(matches!(
            DataContainer::from_long_table(&dup, &opts),
            Err(LupinError::Data(_))
        ));
        Ok(())
    }

    #[test]
    fn select_views_and_groups() -> Result<()> {
        let blocks = vec![
            vec![DMatrix::from_element(2, 3, 1.0), DMatrix::from_element(4, 3, 2.0)],
            vec![DMatrix::from_element(2, 1, 1.0), DMatrix::from_element(4, 1, 2.0)],
        ];
        let data = DataContainer::from_matrices(
            &blocks,
            &names(&["a", "b"]),
            &names(&["x", "y"]),
            &DataOptions::default(),
        )?;
        let sub = data.select(Some(&names(&["b"])), Some(&names(&["y"])))?;
        assert_eq!(sub.num_views(), 1);
        assert_eq!(sub.num_features(0), 1);
        assert_eq!(sub.num_samples(0), 4);

        let missing = data.select(Some(&names(&["c"])), None);
        assert!(matches!(missing, Err(LupinError::Data(_))));
        Ok(())
    }
}
