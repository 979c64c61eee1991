//! Stimulus datasets
//!
//! The response drivers only see datasets through [`StimulusDataset`]: a
//! deterministic construction from a JSON configuration, a fixed number of
//! samples, the integration step and a table with one row of arguments per
//! sample. Stimulus geometry (bars, flashes, impulses) lives in the
//! implementations.

use crate::error::{Error, Result};
use crate::table::Table;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::Value;
use std::path::Path;

/// Dataset configuration as a plain JSON mapping
pub type DatasetConfig = serde_json::Map<String, Value>;

/// Base trait for datasets that yield one video per sample
pub trait StimulusDataset<B: Backend>: Sized {
    /// Identifies the dataset class in cache keys
    const NAME: &'static str;

    /// Deterministic construction from a configuration mapping
    fn from_config(config: &DatasetConfig, device: &B::Device) -> Result<Self>;

    /// Configuration that reconstructs this dataset via [`from_config`](Self::from_config)
    fn config(&self) -> DatasetConfig;

    /// Integration time step in seconds
    fn dt(&self) -> f64;

    /// Number of samples
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Video of one sample with shape `(frames, 1, hexals)`
    fn get(&self, index: usize) -> Result<Tensor<B, 3>>;

    /// One row per sample; columns become coordinates on the `sample` axis
    fn arg_table(&self) -> Table;
}

/// Read a float entry from a dataset configuration
pub fn config_f64(config: &DatasetConfig, key: &str) -> Option<f64> {
    config.get(key).and_then(Value::as_f64)
}

/// Train and test folds over `n_samples` indices
///
/// Indices are shuffled once with a seeded generator, so the same seed always
/// yields the same folds. The first `n_samples % folds` folds hold one extra
/// sample.
#[derive(Clone, Debug)]
pub struct CrossValIndices {
    n_samples: usize,
    folds: usize,
    indices: Vec<usize>,
}

impl CrossValIndices {
    pub fn new(n_samples: usize, folds: usize, shuffle: bool, seed: u64) -> Result<Self> {
        if folds == 0 || folds > n_samples {
            return Err(Error::InvalidConfig(format!(
                "cannot split {} samples into {} folds",
                n_samples, folds
            )));
        }
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            let mut rng = StdRng::seed_from_u64(seed);
            indices.shuffle(&mut rng);
        }
        Ok(Self {
            n_samples,
            folds,
            indices,
        })
    }

    pub fn folds(&self) -> usize {
        self.folds
    }

    /// `(train, test)` indices of one fold
    pub fn fold(&self, fold: usize) -> Result<(Vec<usize>, Vec<usize>)> {
        if fold >= self.folds {
            return Err(Error::InvalidConfig(format!(
                "fold {} of {}",
                fold, self.folds
            )));
        }
        let size = |f: usize| {
            self.n_samples / self.folds + usize::from(f < self.n_samples % self.folds)
        };
        let start: usize = (0..fold).map(size).sum();
        let stop = start + size(fold);

        let test = self.indices[start..stop].to_vec();
        let train = self.indices[..start]
            .iter()
            .chain(&self.indices[stop..])
            .copied()
            .collect();
        Ok((train, test))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Vec<usize>, Vec<usize>)> + '_ {
        (0..self.folds).filter_map(move |fold| self.fold(fold).ok())
    }
}

/// Train and validation indices for one fold of a seeded split
pub fn random_data_split(
    fold: usize,
    n_samples: usize,
    n_folds: usize,
    shuffle: bool,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    CrossValIndices::new(n_samples, n_folds, shuffle, seed)?.fold(fold)
}

/// Loads a downloaded file, fetching it first if it is missing.
///
/// A file that fails to load is treated as a broken download: it is deleted
/// and fetched once more. A second failure is returned to the caller.
pub fn fetch_with_retry<T>(
    path: &Path,
    mut fetch: impl FnMut(&Path) -> Result<()>,
    load: impl Fn(&Path) -> Result<T>,
) -> Result<T> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "fetching");
        fetch(path)?;
    }
    match load(path) {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "broken file, fetching again");
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
            fetch(path)?;
            load(path)
        }
    }
}
