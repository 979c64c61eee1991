//! Ensembles of trained networks
//!
//! An [`Ensemble`] is an ordered collection of [`NetworkView`] handles. It is
//! ranked by validation loss when constructed, and can be reordered or
//! filtered temporarily with guards that restore the previous order when they
//! go out of scope, whether the scope ends normally, through `?` or by a panic.
//!
//! ```ignore
//! let mut ensemble = Ensemble::new(views)?;
//! {
//!     let best = ensemble.model_ratio(Some(0.2), None)?;
//!     let set = generic_responses::<Backend, _, Flashes>(&best.views(), &config, &options, &CellIndex::Central)?;
//! } // original order restored here
//! ```

use crate::error::{Error, Result};
use crate::network::{Network, NetworkView};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut, Range};
use std::sync::Arc;

/// Ordered collection of trained-network handles
pub struct Ensemble<B: Backend, V: NetworkView<B>> {
    handles: Vec<Arc<V>>,
    /// Positions into `handles` in the current order
    order: Vec<usize>,
    _backend: PhantomData<B>,
}

impl<B: Backend, V: NetworkView<B>> Ensemble<B, V> {
    /// Creates an ensemble ranked by ascending validation loss.
    ///
    /// When a loss is unavailable the construction order is kept.
    pub fn new(handles: Vec<V>) -> Result<Self> {
        Self::from_shared(handles.into_iter().map(Arc::new).collect())
    }

    fn from_shared(handles: Vec<Arc<V>>) -> Result<Self> {
        if handles.is_empty() {
            return Err(Error::EmptyEnsemble);
        }
        let mut seen = HashSet::new();
        for handle in &handles {
            if !seen.insert(handle.name().to_string()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate network name '{}'",
                    handle.name()
                )));
            }
        }

        let mut ensemble = Self {
            order: (0..handles.len()).collect(),
            handles,
            _backend: PhantomData,
        };
        ensemble.try_rank(false);
        Ok(ensemble)
    }

    /// Sorts the current order by validation loss, keeping it on failure
    fn try_rank(&mut self, reverse: bool) {
        match self.ranked(reverse) {
            Ok(order) => self.order = order,
            Err(err) => tracing::info!(error = %err, "sorting failed, keeping order"),
        }
    }

    fn ranked(&self, reverse: bool) -> Result<Vec<usize>> {
        let losses = self
            .order
            .iter()
            .map(|&i| self.handles[i].validation_loss().map(|loss| (i, loss)))
            .collect::<Result<Vec<(usize, f64)>>>()?;
        let mut ranked = losses;
        if reverse {
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        } else {
            ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        }
        Ok(ranked.into_iter().map(|(i, _)| i).collect())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Handle at a position of the current order
    pub fn get(&self, position: usize) -> Option<&V> {
        self.order.get(position).map(|&i| self.handles[i].as_ref())
    }

    pub fn by_name(&self, name: &str) -> Option<&V> {
        self.iter().find(|v| v.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|v| v.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &V> {
        self.order.iter().map(|&i| self.handles[i].as_ref())
    }

    /// Handles in the current order, as taken by the response drivers
    pub fn views(&self) -> Vec<&V> {
        self.iter().collect()
    }

    /// Sub-ensemble of a range of the current order; handles are shared.
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        let positions = self.order.get(range.clone()).ok_or_else(|| {
            Error::InvalidConfig(format!("{:?} outside of {} networks", range, self.len()))
        })?;
        self.subset(positions)
    }

    /// Sub-ensemble of the positions where `mask` is true
    pub fn select(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.len() {
            return Err(Error::ShapeMismatch(format!(
                "mask of {} for {} networks",
                mask.len(),
                self.len()
            )));
        }
        let positions: Vec<usize> = self
            .order
            .iter()
            .zip(mask)
            .filter(|(_, keep)| **keep)
            .map(|(&i, _)| i)
            .collect();
        self.subset(&positions)
    }

    fn subset(&self, positions: &[usize]) -> Result<Self> {
        Self::from_shared(positions.iter().map(|&i| Arc::clone(&self.handles[i])).collect())
    }

    /// Validation losses in the current order
    pub fn validation_losses(&self) -> Result<Vec<f64>> {
        self.iter().map(|v| v.validation_loss()).collect()
    }

    /// Simulates `movie` with every network, reusing one allocation.
    pub fn simulate(&self, movie: Tensor<B, 4>, dt: f64) -> Result<Vec<Tensor<B, 3>>> {
        let mut network: Option<Network<B, V::Dynamics>> = None;
        let mut outputs = Vec::with_capacity(self.len());
        for view in self.iter() {
            let mut recovered = view.checkpointed_network(network.take())?;
            outputs.push(recovered.simulate(movie.clone(), dt, None)?);
            network = Some(recovered);
        }
        Ok(outputs)
    }

    /// Temporarily ranks by validation loss, descending when `reverse`.
    ///
    /// Ranking is best effort: with a missing loss the order is unchanged.
    pub fn rank_by_validation_error(&mut self, reverse: bool) -> OrderGuard<'_, B, V> {
        let mut guard = OrderGuard::new(self);
        guard.ensemble.try_rank(reverse);
        guard
    }

    /// Temporarily keeps the best and/or worst fraction of the ensemble.
    ///
    /// `best` and `worst` are fractions of the ensemble size and may not add
    /// up to more than one. Without either, the order is left as is.
    pub fn model_ratio(
        &mut self,
        best: Option<f64>,
        worst: Option<f64>,
    ) -> Result<OrderGuard<'_, B, V>> {
        if let (Some(b), Some(w)) = (best, worst) {
            if b + w > 1.0 {
                return Err(Error::InvalidConfig(
                    "best and worst must add up to at most 1".to_string(),
                ));
            }
        }
        let mut guard = OrderGuard::new(self);
        if best.is_none() && worst.is_none() {
            return Ok(guard);
        }

        guard.ensemble.try_rank(false);
        let ranked = guard.ensemble.order.clone();
        let n = ranked.len() as f64;
        let n_best = best.map(|b| (b * n) as usize).unwrap_or(0).min(ranked.len());
        let n_worst = worst.map(|w| (w * n) as usize).unwrap_or(0).min(ranked.len());

        let mut kept = ranked[..n_best].to_vec();
        kept.extend_from_slice(&ranked[ranked.len() - n_worst..]);
        guard.ensemble.order = kept;
        Ok(guard)
    }
}

/// Restores the ensemble order it was created with when dropped
pub struct OrderGuard<'a, B: Backend, V: NetworkView<B>> {
    ensemble: &'a mut Ensemble<B, V>,
    saved: Vec<usize>,
}

impl<'a, B: Backend, V: NetworkView<B>> OrderGuard<'a, B, V> {
    fn new(ensemble: &'a mut Ensemble<B, V>) -> Self {
        let saved = ensemble.order.clone();
        Self { ensemble, saved }
    }
}

impl<B: Backend, V: NetworkView<B>> Deref for OrderGuard<'_, B, V> {
    type Target = Ensemble<B, V>;

    fn deref(&self) -> &Self::Target {
        self.ensemble
    }
}

impl<B: Backend, V: NetworkView<B>> DerefMut for OrderGuard<'_, B, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ensemble
    }
}

impl<B: Backend, V: NetworkView<B>> Drop for OrderGuard<'_, B, V> {
    fn drop(&mut self) {
        self.ensemble.order = std::mem::take(&mut self.saved);
    }
}
