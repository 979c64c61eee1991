//! # Response Analysis
//!
//! Drivers that simulate one or many trained networks over a stimulus dataset
//! and memoize the results per network checkpoint.
//!
//! | Driver | Output |
//! |--------|--------|
//! | [`generic_responses`] | [`LabeledSet`](crate::labeled::LabeledSet) with `stimulus` and `responses` |
//! | [`generic_currents`] | one [`ExperimentData`] per handle |
//! | [`preset_responses`] | `generic_responses` with a [`Preset`] |
//!
//! ## Caching
//!
//! Each handle's result is stored in that handle's [`Memory`] under a key built
//! from the checkpoint, the dataset name, the dataset configuration without
//! performance knobs, and the timing options. On a hit the handle's network is
//! never allocated. On a miss the network allocated for an earlier handle is
//! reused, and only the checkpoint is loaded into it.
//!
//! ```ignore
//! let views: Vec<&MyView> = ensemble.views();
//! let set = generic_responses::<Backend, _, Flashes>(&views, &config, &options, &CellIndex::Central)?;
//! let time = set.coord("time")?;
//! ```

mod currents;
pub mod presets;
mod responses;

pub use currents::{compute_currents, generic_currents, ExperimentData, TargetData};
pub use presets::{preset_responses, Preset};
pub use responses::{compute_responses, generic_responses, CellIndex};

use crate::cache::{CacheKey, Memory};
use crate::connectome::ConnectomeIndex;
use crate::error::{Error, Result};
use crate::network::{CheckpointId, Network, NetworkView};
use burn::tensor::backend::Backend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// All handles must share the first handle's connectome layout
fn check_layout<B: Backend, V: NetworkView<B>>(views: &[&V]) -> Result<Arc<dyn ConnectomeIndex>> {
    let first = views.first().ok_or(Error::EmptyEnsemble)?;
    let connectome = first.connectome();
    for view in &views[1..] {
        if !connectome.same_layout(view.connectome().as_ref()) {
            return Err(Error::ConnectomeMismatch(format!(
                "'{}' and '{}' have different node layouts",
                first.name(),
                view.name()
            )));
        }
    }
    Ok(connectome)
}

/// Runs `compute` for every handle whose result is not cached yet.
///
/// A single network allocation is threaded through the misses.
fn run_cached<B, V, T, A, F>(
    views: &[&V],
    function: &str,
    args: impl Fn(&CheckpointId) -> A,
    mut compute: F,
) -> Result<Vec<(CheckpointId, T)>>
where
    B: Backend,
    V: NetworkView<B>,
    T: Serialize + DeserializeOwned,
    A: Serialize,
    F: FnMut(&mut Network<B, V::Dynamics>) -> Result<T>,
{
    let mut network: Option<Network<B, V::Dynamics>> = None;
    let mut results = Vec::with_capacity(views.len());

    for view in views {
        let checkpoint = view.checkpoint();
        let key = CacheKey::new(function, &args(&checkpoint))?;
        let memory: &Memory = view.memory();

        let result = memory.get_or_compute(&key, || {
            let mut recovered = view.checkpointed_network(network.take())?;
            let result = compute(&mut recovered);
            network = Some(recovered);
            result
        })?;
        results.push((checkpoint, result));
    }

    Ok(results)
}
